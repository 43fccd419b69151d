use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::dispatch::Notification;

use super::value_objects::Order;

/// Order Placed - emitted once the order is committed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderPlaced {
    #[serde(rename = "id")]
    pub order_id: Uuid,
    #[serde(rename = "customer")]
    pub customer_name: String,
    pub items: Vec<String>,
    #[serde(rename = "timestamp")]
    pub placed_at: DateTime<Utc>,
}

impl Notification for OrderPlaced {
    const NAME: &'static str = "OrderPlaced";
}

impl From<&Order> for OrderPlaced {
    fn from(order: &Order) -> Self {
        Self {
            order_id: order.id,
            customer_name: order.customer_name.clone(),
            items: order.items.clone(),
            placed_at: order.placed_at,
        }
    }
}
