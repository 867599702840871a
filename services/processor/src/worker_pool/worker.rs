//! Request consumer loop
//!
//! Pulls deliveries off the request queue and hands each one to the
//! `RequestHandler`. A semaphore bounds how many estimations run at once;
//! with one permit requests are answered strictly one after another.

use anyhow::Result;
use odds_shared::broker::DeliveryStream;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use super::handler::RequestHandler;

#[derive(Clone)]
pub struct Worker {
    handler: RequestHandler,
    permits: Arc<Semaphore>,
}

impl Worker {
    pub fn new(handler: RequestHandler, concurrency: usize) -> Self {
        Self {
            handler,
            permits: Arc::new(Semaphore::new(concurrency.max(1))),
        }
    }

    /// Consume until `shutdown` fires or the broker closes the stream
    ///
    /// Requests already being processed are finished before returning.
    pub async fn run(&self, mut deliveries: DeliveryStream, shutdown: CancellationToken) -> Result<()> {
        tracing::info!(
            concurrency = self.permits.available_permits(),
            "Worker started"
        );

        let mut in_flight = JoinSet::new();

        loop {
            let permit = tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                permit = self.permits.clone().acquire_owned() => permit?,
            };

            let delivery = tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                delivery = deliveries.recv() => delivery,
            };

            let Some(delivery) = delivery else {
                tracing::warn!("Request stream closed by broker");
                break;
            };

            let handler = self.handler.clone();
            in_flight.spawn(async move {
                let _permit = permit;
                // Outcome is already logged and settled by the handler
                let _ = handler.handle(delivery).await;
            });

            while let Some(finished) = in_flight.try_join_next() {
                if let Err(e) = finished {
                    tracing::error!(error = %e, "Request task panicked");
                }
            }
        }

        let remaining = in_flight.len();
        if remaining > 0 {
            tracing::info!(remaining, "Waiting for in-flight requests");
        }
        while let Some(finished) = in_flight.join_next().await {
            if let Err(e) = finished {
                tracing::error!(error = %e, "Request task panicked");
            }
        }

        tracing::info!("Worker stopped");
        Ok(())
    }
}
