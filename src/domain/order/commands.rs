use uuid::Uuid;

use crate::dispatch::Request;
use crate::error::ValidationError;

use super::value_objects::Order;

// ============================================================================
// Order Commands & Queries
// ============================================================================

/// Place a new order. Only constructible through `new`, so a handler never
/// sees an invalid one.
#[derive(Debug, Clone)]
pub struct PlaceOrder {
    customer_name: String,
    items: Vec<String>,
}

impl PlaceOrder {
    pub fn new(customer_name: impl Into<String>, items: Vec<String>) -> Result<Self, ValidationError> {
        let customer_name = customer_name.into().trim().to_string();
        if customer_name.is_empty() {
            return Err(ValidationError::EmptyField("customer_name"));
        }

        if items.is_empty() {
            return Err(ValidationError::NoItems);
        }

        let items = items
            .into_iter()
            .enumerate()
            .map(|(position, item)| {
                let item = item.trim().to_string();
                if item.is_empty() {
                    Err(ValidationError::BlankItem(position))
                } else {
                    Ok(item)
                }
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self { customer_name, items })
    }

    pub fn customer_name(&self) -> &str {
        &self.customer_name
    }

    pub fn items(&self) -> &[String] {
        &self.items
    }

    pub(crate) fn into_parts(self) -> (String, Vec<String>) {
        (self.customer_name, self.items)
    }
}

impl Request for PlaceOrder {
    type Response = Uuid;
    const NAME: &'static str = "PlaceOrder";
}

#[derive(Debug, Clone, Copy)]
pub struct GetOrderById {
    pub order_id: Uuid,
}

impl Request for GetOrderById {
    type Response = Option<Order>;
    const NAME: &'static str = "GetOrderById";
}
