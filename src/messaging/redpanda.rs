use std::collections::HashSet;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rdkafka::admin::{AdminClient, AdminOptions, NewTopic, TopicReplication};
use rdkafka::client::DefaultClientContext;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::error::{KafkaError, RDKafkaErrorCode};
use rdkafka::message::{Header, Headers, Message, OwnedHeaders, OwnedMessage};
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::util::Timeout;
use rdkafka::{Offset, TopicPartitionList};
use uuid::Uuid;

use crate::config::BrokerConfig;
use crate::error::TransportError;

use super::transport::{Delivery, QueueTransport, QueuedMessage, Subscription};

// ============================================================================
// Redpanda Transport (Kafka protocol via rdkafka)
// ============================================================================
//
// Queue  = topic (single partition, so one reader sees publish order)
// ack    = commit offset + 1 for the delivery's partition
// requeue = seek back to the delivery's offset; the next poll returns it
//
// Auto-commit is off: an offset only advances once the consumer has
// persisted the event.
//
// ============================================================================

const MESSAGE_ID_HEADER: &str = "message_id";
const EVENT_TYPE_HEADER: &str = "event_type";
const SEEK_TIMEOUT: Duration = Duration::from_secs(5);
// Acks run on tokio workers; a sync commit would block one per message.
const ACK_COMMIT_MODE: CommitMode = CommitMode::Async;

fn broker_error(e: KafkaError) -> TransportError {
    TransportError::Broker(e.to_string())
}

fn parse_message_id(value: Option<&str>) -> Option<Uuid> {
    value.and_then(|v| Uuid::parse_str(v.trim()).ok())
}

/// Committed offset is the next one to read, hence `+ 1`.
fn ack_offsets(topic: &str, delivery: &Delivery) -> Result<TopicPartitionList, KafkaError> {
    let mut offsets = TopicPartitionList::new();
    offsets.add_partition_offset(topic, delivery.partition, Offset::Offset(delivery.delivery_tag as i64 + 1))?;
    Ok(offsets)
}

pub struct RedpandaTransport {
    producer: FutureProducer,
    admin: AdminClient<DefaultClientContext>,
    config: BrokerConfig,
}

impl RedpandaTransport {
    pub fn new(config: &BrokerConfig) -> Result<Self, TransportError> {
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", &config.bootstrap_servers)
            .set("message.timeout.ms", config.message_timeout.as_millis().to_string())
            .create()
            .map_err(broker_error)?;

        let admin: AdminClient<DefaultClientContext> = ClientConfig::new()
            .set("bootstrap.servers", &config.bootstrap_servers)
            .create()
            .map_err(broker_error)?;

        tracing::info!(brokers = %config.bootstrap_servers, "Redpanda transport created");

        Ok(Self {
            producer,
            admin,
            config: config.clone(),
        })
    }
}

#[async_trait]
impl QueueTransport for RedpandaTransport {
    async fn declare(&self, queue: &str) -> Result<(), TransportError> {
        let topic = NewTopic::new(queue, 1, TopicReplication::Fixed(1));
        let results = self
            .admin
            .create_topics(&[topic], &AdminOptions::new())
            .await
            .map_err(broker_error)?;

        for result in results {
            match result {
                Ok(name) => tracing::info!(topic = %name, "Topic created"),
                Err((_, RDKafkaErrorCode::TopicAlreadyExists)) => {}
                Err((name, code)) => {
                    return Err(TransportError::Broker(format!(
                        "failed to create topic {name}: {code}"
                    )))
                }
            }
        }
        Ok(())
    }

    async fn publish(&self, queue: &str, message: QueuedMessage) -> Result<(), TransportError> {
        let message_id = message.message_id.to_string();
        let headers = OwnedHeaders::new()
            .insert(Header {
                key: MESSAGE_ID_HEADER,
                value: Some(message_id.as_str()),
            })
            .insert(Header {
                key: EVENT_TYPE_HEADER,
                value: Some(message.event_type.as_str()),
            });

        let record = FutureRecord::to(queue)
            .key(&message.key)
            .payload(&message.payload)
            .headers(headers)
            .timestamp(message.enqueued_at.timestamp_millis());

        self.producer
            .send(record, Timeout::After(self.config.message_timeout))
            .await
            .map_err(|(e, _)| broker_error(e))?;

        tracing::debug!(topic = %queue, key = %message.key, message_id = %message_id, "Published to Redpanda");
        Ok(())
    }

    async fn subscribe(&self, queue: &str) -> Result<Box<dyn Subscription>, TransportError> {
        let consumer: StreamConsumer = ClientConfig::new()
            .set("bootstrap.servers", &self.config.bootstrap_servers)
            .set("group.id", &self.config.consumer_group)
            .set("enable.auto.commit", "false")
            .set("auto.offset.reset", "earliest")
            .set("enable.partition.eof", "false")
            .create()
            .map_err(broker_error)?;

        consumer.subscribe(&[queue]).map_err(broker_error)?;
        tracing::info!(topic = %queue, group = %self.config.consumer_group, "Subscribed to Redpanda topic");

        Ok(Box::new(RedpandaSubscription {
            consumer,
            topic: queue.to_string(),
            requeued: HashSet::new(),
        }))
    }
}

pub struct RedpandaSubscription {
    consumer: StreamConsumer,
    topic: String,
    requeued: HashSet<(i32, i64)>,
}

impl RedpandaSubscription {
    fn to_delivery(&mut self, message: &OwnedMessage) -> Delivery {
        let mut message_id = None;
        let mut event_type = None;
        if let Some(headers) = message.headers() {
            for header in headers.iter() {
                let value = header.value.map(|v| String::from_utf8_lossy(v).into_owned());
                match header.key {
                    MESSAGE_ID_HEADER => message_id = parse_message_id(value.as_deref()),
                    EVENT_TYPE_HEADER => event_type = value,
                    _ => {}
                }
            }
        }

        let enqueued_at = message
            .timestamp()
            .to_millis()
            .and_then(DateTime::from_timestamp_millis)
            .unwrap_or_else(Utc::now);

        let position = (message.partition(), message.offset());
        let redelivered = self.requeued.remove(&position);

        let message_id = message_id.unwrap_or_else(|| {
            let assigned = Uuid::now_v7();
            tracing::warn!(
                topic = %self.topic,
                partition = message.partition(),
                offset = message.offset(),
                assigned_id = %assigned,
                "Message has no valid message_id header, assigned a local id"
            );
            assigned
        });

        Delivery {
            message: QueuedMessage {
                message_id,
                key: message
                    .key()
                    .map(|k| String::from_utf8_lossy(k).into_owned())
                    .unwrap_or_default(),
                event_type: event_type.unwrap_or_default(),
                payload: message.payload().map(<[u8]>::to_vec).unwrap_or_default(),
                enqueued_at,
            },
            delivery_tag: message.offset() as u64,
            partition: message.partition(),
            redelivered,
        }
    }
}

#[async_trait]
impl Subscription for RedpandaSubscription {
    async fn next(&mut self) -> Result<Option<Delivery>, TransportError> {
        let message = self.consumer.recv().await.map_err(broker_error)?.detach();
        Ok(Some(self.to_delivery(&message)))
    }

    async fn ack(&mut self, delivery: &Delivery) -> Result<(), TransportError> {
        let offsets = ack_offsets(&self.topic, delivery).map_err(broker_error)?;
        self.consumer.commit(&offsets, ACK_COMMIT_MODE).map_err(broker_error)
    }

    async fn requeue(&mut self, delivery: &Delivery) -> Result<(), TransportError> {
        let offset = delivery.delivery_tag as i64;
        self.consumer
            .seek(&self.topic, delivery.partition, Offset::Offset(offset), SEEK_TIMEOUT)
            .map_err(broker_error)?;
        self.requeued.insert((delivery.partition, offset));
        Ok(())
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.consumer.unsubscribe();
        tracing::info!(topic = %self.topic, "Unsubscribed from Redpanda topic");
        Ok(())
    }
}
