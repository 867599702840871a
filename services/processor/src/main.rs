use anyhow::Result;
use odds_processor::{Config, WorkerPool};
use odds_shared::broker::AmqpConnector;
use odds_shared::retry_strategy::RetryStrategy;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    // Structured logging, JSON unless LOG_FORMAT says otherwise
    let use_json = std::env::var("LOG_FORMAT")
        .unwrap_or_else(|_| "json".to_string())
        .eq_ignore_ascii_case("json");

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "processor=info,odds_processor=info,odds_shared=info".into());

    if use_json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }

    tracing::info!(
        service = "processor",
        version = env!("CARGO_PKG_VERSION"),
        log_format = if use_json { "json" } else { "text" },
        "Starting odds processor"
    );

    let config = Config::load()?;
    tracing::info!(
        broker = %config.broker.redacted_uri(),
        request_queue = %config.processor.request_queue,
        concurrency = config.processor.concurrency,
        "Configuration loaded"
    );

    let connector = AmqpConnector::new(&config.broker);
    let strategy = RetryStrategy::new(
        config.broker.connect_max_retries,
        config.broker.connect_retry_delay(),
    );
    let worker_pool = match WorkerPool::connect(&connector, &strategy, config.processor.clone()).await {
        Ok(pool) => Arc::new(pool),
        Err(e) => {
            tracing::error!(error = %e, "Broker unreachable, giving up");
            return Err(e.into());
        }
    };

    let metrics_handle = tokio::spawn(start_metrics_server(config.metrics_port));

    let mut worker_handle = tokio::spawn({
        let worker_pool = worker_pool.clone();
        async move { worker_pool.start().await }
    });

    tracing::info!("Processor running");

    tokio::select! {
        signal = tokio::signal::ctrl_c() => signal?,
        finished = &mut worker_handle => {
            // The consumer only ends on its own when the broker goes away
            metrics_handle.abort();
            return match finished {
                Ok(Ok(())) => Err(anyhow::anyhow!("request stream closed by broker")),
                Ok(Err(e)) => Err(e),
                Err(e) => Err(e.into()),
            };
        }
    }

    tracing::info!("Shutdown signal received");
    worker_pool.stop();
    match worker_handle.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => tracing::error!(error = %e, "Worker pool failed during shutdown"),
        Err(e) => tracing::error!(error = %e, "Worker pool task panicked"),
    }

    metrics_handle.abort();
    tracing::info!("Processor stopped");

    Ok(())
}

async fn start_metrics_server(port: u16) -> Result<()> {
    use axum::{routing::get, Router};
    use std::net::SocketAddr;

    let builder = metrics_exporter_prometheus::PrometheusBuilder::new();
    let handle = builder.install_recorder()?;

    let app = Router::new().route("/metrics", get(|| async move { handle.render() }));

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("Processor metrics listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
