use std::sync::Arc;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::dispatch::{Notification, NotificationBus};
use crate::messaging::EventPublisher;

use super::loan::LoanApplicationSubmitted;
use super::order::OrderPlaced;

// ============================================================================
// Domain Events - what crosses the broker
// ============================================================================
//
// Wire format is JSON, internally tagged by `event_type`:
//
//   {"event_type":"OrderPlaced","id":"…","customer":"Asha","items":["A","B"],"timestamp":"…"}
//   {"event_type":"LoanApplicationSubmitted","id":"…","applicant":"…","loan_type":"…","bank":"…","timestamp":"…"}
//
// An unknown tag or a missing field fails to decode; the consumer treats
// that as a poison message.
//
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event_type")]
pub enum DomainEvent {
    OrderPlaced(OrderPlaced),
    LoanApplicationSubmitted(LoanApplicationSubmitted),
}

impl DomainEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            DomainEvent::OrderPlaced(_) => OrderPlaced::NAME,
            DomainEvent::LoanApplicationSubmitted(_) => LoanApplicationSubmitted::NAME,
        }
    }

    /// Business identifier of the entity the event describes. Used as the
    /// broker partition key and as the consumer's upsert key.
    pub fn key(&self) -> Uuid {
        match self {
            DomainEvent::OrderPlaced(e) => e.order_id,
            DomainEvent::LoanApplicationSubmitted(e) => e.application_id,
        }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}

impl From<OrderPlaced> for DomainEvent {
    fn from(event: OrderPlaced) -> Self {
        DomainEvent::OrderPlaced(event)
    }
}

impl From<LoanApplicationSubmitted> for DomainEvent {
    fn from(event: LoanApplicationSubmitted) -> Self {
        DomainEvent::LoanApplicationSubmitted(event)
    }
}

/// Whether the broker accepted the event. `Failed` never fails the command:
/// the entity is already committed by the time the broker is called.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum BrokerHandoff {
    Queued,
    Failed,
}

// ============================================================================
// Event Emitter - the post-commit path shared by every command handler
// ============================================================================

pub struct EventEmitter {
    notifications: Arc<NotificationBus>,
    publisher: Arc<dyn EventPublisher>,
}

impl EventEmitter {
    pub fn new(notifications: Arc<NotificationBus>, publisher: Arc<dyn EventPublisher>) -> Self {
        Self { notifications, publisher }
    }

    /// Local subscribers first, then the broker. Call only after commit.
    pub async fn emit<N>(&self, event: N) -> BrokerHandoff
    where
        N: Notification + Into<DomainEvent>,
    {
        self.notifications.publish(&event).await;

        let event: DomainEvent = event.into();
        match self.publisher.publish(&event).await {
            Ok(()) => BrokerHandoff::Queued,
            Err(e) => {
                tracing::warn!(
                    event_type = event.event_type(),
                    key = %event.key(),
                    error = %e,
                    "Broker publish failed; entity stays committed, event not queued"
                );
                BrokerHandoff::Failed
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn order_placed() -> OrderPlaced {
        OrderPlaced {
            order_id: Uuid::new_v4(),
            customer_name: "Asha".to_string(),
            items: vec!["A".to_string(), "B".to_string()],
            placed_at: Utc::now(),
        }
    }

    #[test]
    fn test_round_trip_reproduces_event() {
        let events = vec![
            DomainEvent::from(order_placed()),
            DomainEvent::from(LoanApplicationSubmitted {
                application_id: Uuid::new_v4(),
                applicant: "Ravi".to_string(),
                loan_type: "Home Loan".to_string(),
                bank: "Axis Bank".to_string(),
                submitted_at: Utc::now(),
            }),
        ];

        for event in events {
            let bytes = event.to_bytes().unwrap();
            assert_eq!(DomainEvent::from_bytes(&bytes).unwrap(), event);
        }
    }

    #[test]
    fn test_wire_field_names() {
        let placed_at = Utc.with_ymd_and_hms(2026, 1, 2, 3, 4, 5).unwrap();
        let event = DomainEvent::from(OrderPlaced {
            order_id: Uuid::nil(),
            customer_name: "Asha".to_string(),
            items: vec!["A".to_string()],
            placed_at,
        });

        let json: serde_json::Value = serde_json::from_slice(&event.to_bytes().unwrap()).unwrap();

        assert_eq!(json["event_type"], "OrderPlaced");
        assert_eq!(json["id"], Uuid::nil().to_string());
        assert_eq!(json["customer"], "Asha");
        assert_eq!(json["items"][0], "A");
        assert_eq!(json["timestamp"], "2026-01-02T03:04:05Z");
    }

    #[test]
    fn test_unknown_event_type_fails_closed() {
        let payload = br#"{"event_type":"OrderShipped","id":"00000000-0000-0000-0000-000000000000"}"#;
        assert!(DomainEvent::from_bytes(payload).is_err());
    }

    #[test]
    fn test_missing_field_fails_closed() {
        let payload = br#"{"event_type":"OrderPlaced","id":"00000000-0000-0000-0000-000000000000","items":[],"timestamp":"2026-01-02T03:04:05Z"}"#;
        assert!(DomainEvent::from_bytes(payload).is_err());
    }

    #[test]
    fn test_key_is_business_identifier() {
        let placed = order_placed();
        let order_id = placed.order_id;
        let event = DomainEvent::from(placed);

        assert_eq!(event.key(), order_id);
        assert_eq!(event.event_type(), "OrderPlaced");
    }
}
