use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::persistence::Entity;

use super::events::OrderPlaced;

// ============================================================================
// Order Entity
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: Uuid,
    pub customer_name: String,
    pub items: Vec<String>,
    pub placed_at: DateTime<Utc>,
}

impl Order {
    /// New order with a freshly generated id
    pub fn new(customer_name: String, items: Vec<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            customer_name,
            items,
            placed_at: Utc::now(),
        }
    }
}

impl Entity for Order {
    const KIND: &'static str = "order";

    fn id(&self) -> Uuid {
        self.id
    }
}

// The consumer side rebuilds the order from the event, keeping its id.
impl From<&OrderPlaced> for Order {
    fn from(event: &OrderPlaced) -> Self {
        Self {
            id: event.order_id,
            customer_name: event.customer_name.clone(),
            items: event.items.clone(),
            placed_at: event.placed_at,
        }
    }
}
