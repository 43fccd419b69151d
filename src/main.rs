use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use command_pipeline::config::AppConfig;
use command_pipeline::domain::loan::UserProfile;
use command_pipeline::messaging::{
    BrokerConsumer, BrokerPublisher, InMemoryTransport, QueueTransport, RedpandaTransport, RepositorySink,
};
use command_pipeline::metrics::{self, Metrics};
use command_pipeline::persistence::{InMemoryRepository, Repository, ScyllaRepository};
use command_pipeline::CommandApi;

#[derive(Parser)]
#[command(name = "command_pipeline", about = "Command dispatch with durable event delivery")]
struct Cli {
    /// Run without Redpanda or ScyllaDB
    #[arg(long, global = true)]
    in_memory: bool,

    #[command(subcommand)]
    mode: Option<Mode>,
}

#[derive(Subcommand, Clone, Copy)]
enum Mode {
    /// Issue sample commands and consume them in the same process
    Demo,
    /// Only run the broker consumer until Ctrl-C
    Consume,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Default to INFO, override with RUST_LOG
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_thread_ids(true))
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,command_pipeline=debug")),
        )
        .init();

    let cli = Cli::parse();
    let mode = cli.mode.unwrap_or(Mode::Demo);
    let config = AppConfig::load()?;

    tracing::info!("🚀 Starting command pipeline");

    // === 1. Prometheus metrics ===
    let metrics = Arc::new(Metrics::new()?);
    if config.metrics.enabled {
        let registry = metrics.registry().clone();
        let port = config.metrics.port;
        std::thread::spawn(move || {
            let result = actix_web::rt::System::new().block_on(metrics::start_metrics_server(registry, port));
            if let Err(e) = result {
                tracing::error!(error = %e, "Metrics server error");
            }
        });
    }

    // === 2. Queue transport ===
    let transport: Arc<dyn QueueTransport> = if cli.in_memory {
        tracing::info!("Using in-memory queue");
        Arc::new(InMemoryTransport::new())
    } else {
        Arc::new(RedpandaTransport::new(&config.broker)?)
    };

    // === 3. Storage, one session per side ===
    if cli.in_memory {
        tracing::info!("Using in-memory repositories");
        let consumer_repository = Arc::new(InMemoryRepository::new());
        match mode {
            Mode::Demo => {
                let command_repository = Arc::new(InMemoryRepository::new());
                run_demo(&config, transport, command_repository, consumer_repository, metrics).await
            }
            Mode::Consume => run_consumer(&config, transport, consumer_repository, metrics).await,
        }
    } else {
        tracing::info!(node = %config.storage.known_node, "Connecting to ScyllaDB...");
        let consumer_repository = Arc::new(ScyllaRepository::connect(&config.storage).await?);
        match mode {
            Mode::Demo => {
                let command_repository = Arc::new(ScyllaRepository::connect(&config.storage).await?);
                run_demo(&config, transport, command_repository, consumer_repository, metrics).await
            }
            Mode::Consume => run_consumer(&config, transport, consumer_repository, metrics).await,
        }
    }
}

fn build_consumer<R: Repository>(
    config: &AppConfig,
    transport: Arc<dyn QueueTransport>,
    repository: Arc<R>,
    metrics: Arc<Metrics>,
) -> BrokerConsumer {
    let consumer = BrokerConsumer::new(
        transport,
        config.broker.queue.clone(),
        Arc::new(RepositorySink::new(repository)),
    )
    .with_retry(config.consumer.retry_config())
    .with_redelivery_delay(config.consumer.redelivery_delay)
    .with_metrics(metrics);

    match &config.broker.dead_letter_queue {
        Some(queue) => consumer.with_dead_letter_queue(queue.clone()),
        None => consumer,
    }
}

async fn run_consumer<R: Repository>(
    config: &AppConfig,
    transport: Arc<dyn QueueTransport>,
    repository: Arc<R>,
    metrics: Arc<Metrics>,
) -> anyhow::Result<()> {
    let consumer = build_consumer(config, transport, repository, metrics);
    consumer.start().await?;

    tracing::info!(queue = %config.broker.queue, "⏳ Consuming until Ctrl-C");
    tokio::signal::ctrl_c().await?;

    consumer.stop().await;
    tracing::info!(stats = ?consumer.stats(), "Consumer finished");
    Ok(())
}

async fn run_demo<R: Repository>(
    config: &AppConfig,
    transport: Arc<dyn QueueTransport>,
    command_repository: Arc<R>,
    consumer_repository: Arc<R>,
    metrics: Arc<Metrics>,
) -> anyhow::Result<()> {
    let consumer = build_consumer(config, transport.clone(), consumer_repository, metrics.clone());
    consumer.start().await?;

    let publisher = Arc::new(
        BrokerPublisher::new(transport, config.broker.queue.clone()).with_metrics(metrics.clone()),
    );
    let api = CommandApi::build(command_repository, publisher, Some(metrics))?;

    tracing::info!("📝 Issuing sample commands");

    let order_id = api
        .place_order("Asha", vec!["A".to_string(), "B".to_string()])
        .await?;
    tracing::info!(order_id = %order_id, "✅ Order placed");

    let receipt = api
        .submit_loan_application("Ravi", "Home Loan", "Axis Bank")
        .await?;
    tracing::info!(
        application_id = %receipt.application_id,
        broker = ?receipt.broker,
        "✅ Loan application submitted"
    );

    let profile = UserProfile {
        age: 32,
        income: 40_000.0,
        credit_score: 720.0,
        location: "Bengaluru".to_string(),
    };
    for result in api.check_eligibility(profile).await? {
        tracing::info!(
            offer = %result.offer.loan_type,
            provider = %result.offer.provider,
            eligible = result.eligible,
            reason = %result.reason,
            "Eligibility"
        );
    }

    tracing::info!("⏳ Waiting for the consumer to persist events...");
    if !consumer.wait_for_settled(2, Duration::from_secs(30)).await {
        tracing::warn!(stats = ?consumer.stats(), "Consumer did not settle every event in time");
    }
    consumer.stop().await;

    tracing::info!(
        confirmations = api.outbox().sent().len(),
        stats = ?consumer.stats(),
        "🎉 Demo complete!"
    );
    Ok(())
}
