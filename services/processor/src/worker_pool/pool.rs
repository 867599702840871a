//! Worker pool management
//!
//! Owns the broker channel, the request queue subscription and the shutdown
//! token for the consumer.

use anyhow::Result;
use odds_shared::broker::{connect_with_retry, BrokerChannel, BrokerError, Connector};
use odds_shared::retry_strategy::RetryStrategy;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::config::ProcessorConfig;
use crate::estimator::OddsEstimator;

use super::handler::RequestHandler;
use super::worker::Worker;

pub struct WorkerPool {
    channel: Arc<dyn BrokerChannel>,
    config: ProcessorConfig,
    worker: Worker,
    shutdown: CancellationToken,
}

impl WorkerPool {
    pub fn new(channel: Arc<dyn BrokerChannel>, config: ProcessorConfig) -> Self {
        let estimator = Arc::new(OddsEstimator::new(config.max_goals));
        let handler = RequestHandler::new(channel.clone(), estimator, config.error_replies);
        let worker = Worker::new(handler, config.concurrency);

        Self {
            channel,
            config,
            worker,
            shutdown: CancellationToken::new(),
        }
    }

    /// Open the broker channel with bounded retries, then build the pool
    ///
    /// Exhausting the retries is fatal for the process.
    pub async fn connect(
        connector: &dyn Connector,
        strategy: &RetryStrategy,
        config: ProcessorConfig,
    ) -> Result<Self, BrokerError> {
        let channel = connect_with_retry(connector, strategy).await?;
        Ok(Self::new(channel, config))
    }

    /// Declare the request queue and consume it until `stop` is called
    pub async fn start(&self) -> Result<()> {
        let queue = &self.config.request_queue;
        self.channel.declare_queue(queue).await?;
        let deliveries = self.channel.consume(queue, false).await?;

        tracing::info!(
            queue = %queue,
            concurrency = self.config.concurrency,
            error_replies = self.config.error_replies,
            max_goals = self.config.max_goals,
            "Awaiting odds requests"
        );

        self.worker.run(deliveries, self.shutdown.clone()).await
    }

    pub fn stop(&self) {
        tracing::info!("Stopping worker pool");
        self.shutdown.cancel();
    }
}
