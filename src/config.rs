use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::utils::RetryConfig;

// ============================================================================
// Application Configuration
// ============================================================================
//
// Loaded once at startup from an optional .env file followed by PIPELINE_*
// environment variables. Every setting has a default that matches a local
// Redpanda + ScyllaDB setup.
//
// ============================================================================

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub broker: BrokerConfig,
    pub storage: StorageConfig,
    pub consumer: ConsumerConfig,
    pub metrics: MetricsConfig,
}

#[derive(Debug, Clone)]
pub struct BrokerConfig {
    pub bootstrap_servers: String,
    pub queue: String,
    pub dead_letter_queue: Option<String>,
    pub consumer_group: String,
    pub message_timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub known_node: String,
    pub keyspace: String,
}

#[derive(Debug, Clone)]
pub struct ConsumerConfig {
    pub max_persist_attempts: u32,
    pub initial_backoff: Duration,
    /// Pause after returning a message to the queue
    pub redelivery_delay: Duration,
}

impl ConsumerConfig {
    pub fn retry_config(&self) -> RetryConfig {
        RetryConfig {
            max_attempts: self.max_persist_attempts,
            initial_delay: self.initial_backoff,
            ..RetryConfig::default()
        }
    }
}

#[derive(Debug, Clone)]
pub struct MetricsConfig {
    pub enabled: bool,
    pub port: u16,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{name} has invalid value {value:?}")]
    Invalid { name: &'static str, value: String },
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let queue = var_or("PIPELINE_QUEUE", "domain-events");
        // An empty value disables dead-lettering.
        let dead_letter_queue = match env::var("PIPELINE_DEAD_LETTER_QUEUE") {
            Ok(value) if value.trim().is_empty() => None,
            Ok(value) => Some(value),
            Err(_) => Some(format!("{queue}.dlq")),
        };

        Ok(Self {
            broker: BrokerConfig {
                bootstrap_servers: var_or("PIPELINE_BROKERS", "127.0.0.1:9092"),
                queue,
                dead_letter_queue,
                consumer_group: var_or("PIPELINE_CONSUMER_GROUP", "command-pipeline-consumer"),
                message_timeout: Duration::from_millis(parse_var("PIPELINE_MESSAGE_TIMEOUT_MS", 5000)?),
            },
            storage: StorageConfig {
                known_node: var_or("PIPELINE_SCYLLA_NODE", "127.0.0.1:9042"),
                keyspace: var_or("PIPELINE_KEYSPACE", "pipeline_ks"),
            },
            consumer: ConsumerConfig {
                max_persist_attempts: parse_var("PIPELINE_PERSIST_ATTEMPTS", 3)?,
                initial_backoff: Duration::from_millis(parse_var("PIPELINE_PERSIST_BACKOFF_MS", 100)?),
                redelivery_delay: Duration::from_millis(parse_var("PIPELINE_REDELIVERY_DELAY_MS", 1000)?),
            },
            metrics: MetricsConfig {
                enabled: parse_var("PIPELINE_METRICS_ENABLED", true)?,
                port: parse_var("PIPELINE_METRICS_PORT", 9090)?,
            },
        })
    }
}

fn var_or(name: &str, default: &str) -> String {
    env::var(name).unwrap_or_else(|_| default.to_string())
}

fn parse_var<T: FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { name, value }),
        Err(_) => Ok(default),
    }
}
