//! Per-request processing
//!
//! Decodes one request, runs the estimator off the async runtime, publishes
//! the reply to the caller's queue and settles the delivery. A delivery is
//! acknowledged only after its reply was published; every failure rejects it
//! without requeue.

use odds_shared::broker::{BrokerChannel, BrokerError, Delivery, OutboundMessage};
use odds_shared::codec::{self, CodecError};
use odds_shared::constants::REPLY_CONTENT_TYPE;
use odds_shared::{OddsResult, ServiceError};
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tracing::Instrument;

use crate::estimator::{EstimatorError, OddsEstimator};

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("Protocol violation: {0}")]
    ProtocolViolation(String),

    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error(transparent)]
    Estimation(#[from] EstimatorError),

    #[error("Broker error: {0}")]
    Broker(#[from] BrokerError),

    #[error("Estimator task failed: {0}")]
    Task(String),
}

impl WorkerError {
    pub fn to_service_error(&self) -> ServiceError {
        match self {
            WorkerError::ProtocolViolation(_) => ServiceError::missing_reply_to(),
            WorkerError::Codec(e) => e.to_service_error(),
            WorkerError::Estimation(e) => e.to_service_error(),
            WorkerError::Broker(e) => ServiceError::internal(e.to_string()),
            WorkerError::Task(reason) => ServiceError::internal(reason.clone()),
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            WorkerError::ProtocolViolation(_) => "protocol_violation",
            WorkerError::Codec(_) => "malformed_request",
            WorkerError::Estimation(EstimatorError::InsufficientData(_)) => "insufficient_data",
            WorkerError::Estimation(EstimatorError::NumericDivergence(_)) => "numeric_divergence",
            WorkerError::Broker(_) => "broker",
            WorkerError::Task(_) => "task",
        }
    }
}

#[derive(Clone)]
pub struct RequestHandler {
    channel: Arc<dyn BrokerChannel>,
    estimator: Arc<OddsEstimator>,
    error_replies: bool,
}

impl RequestHandler {
    pub fn new(
        channel: Arc<dyn BrokerChannel>,
        estimator: Arc<OddsEstimator>,
        error_replies: bool,
    ) -> Self {
        Self {
            channel,
            estimator,
            error_replies,
        }
    }

    /// Process one delivery and settle it with the broker
    pub async fn handle(&self, delivery: Delivery) -> Result<OddsResult, WorkerError> {
        let span = tracing::info_span!(
            "handle_request",
            delivery_tag = delivery.delivery_tag,
            correlation_id = delivery.correlation_id.as_deref().unwrap_or("-")
        );
        self.settle(delivery).instrument(span).await
    }

    async fn settle(&self, delivery: Delivery) -> Result<OddsResult, WorkerError> {
        let started = Instant::now();
        let result = self.process(&delivery).await;

        match &result {
            Ok(odds) => {
                if let Err(e) = delivery.ack().await {
                    tracing::error!(error = %e, "Failed to acknowledge request");
                }
                metrics::counter!("odds_requests_processed_total").increment(1);
                tracing::info!(
                    home_win = odds.home_win,
                    draw = odds.draw,
                    away_win = odds.away_win,
                    duration_ms = started.elapsed().as_millis() as u64,
                    "Request answered"
                );
            }
            Err(error) => {
                if self.error_replies {
                    self.send_error_reply(&delivery, error).await;
                }
                if let Err(e) = delivery.reject().await {
                    tracing::error!(error = %e, "Failed to reject request");
                }
                metrics::counter!("odds_requests_failed_total", "kind" => error.kind())
                    .increment(1);
                match error {
                    WorkerError::Estimation(_) | WorkerError::Codec(_) => {
                        tracing::warn!(error = %error, "Request dropped")
                    }
                    _ => tracing::error!(error = %error, "Request dropped"),
                }
            }
        }

        metrics::histogram!("odds_request_duration_seconds")
            .record(started.elapsed().as_secs_f64());

        result
    }

    async fn process(&self, delivery: &Delivery) -> Result<OddsResult, WorkerError> {
        let reply_to = reply_destination(delivery)?;
        let records = codec::decode_request(&delivery.body)?;

        let estimator = self.estimator.clone();
        let started = Instant::now();
        let estimated = tokio::task::spawn_blocking(move || estimator.estimate(&records)).await;
        metrics::histogram!("odds_estimation_duration_seconds")
            .record(started.elapsed().as_secs_f64());
        let estimate = estimated.map_err(|e| WorkerError::Task(e.to_string()))??;

        let body = codec::encode_reply(&estimate.odds)?;
        self.publish_reply(reply_to, delivery.correlation_id.as_deref(), body)
            .await?;

        Ok(estimate.odds)
    }

    async fn publish_reply(
        &self,
        reply_to: &str,
        correlation_id: Option<&str>,
        body: Vec<u8>,
    ) -> Result<(), BrokerError> {
        let mut message = OutboundMessage::new(body).with_content_type(REPLY_CONTENT_TYPE);
        if let Some(correlation_id) = correlation_id {
            message = message.with_correlation_id(correlation_id);
        }
        self.channel.publish(reply_to, message).await
    }

    /// Tell the caller the request failed instead of leaving it to time out
    ///
    /// Needs both a reply queue and a correlation id; without either the
    /// caller could not match the reply anyway.
    async fn send_error_reply(&self, delivery: &Delivery, error: &WorkerError) {
        let (Ok(reply_to), Some(correlation_id)) =
            (reply_destination(delivery), delivery.correlation_id.as_deref())
        else {
            return;
        };

        let body = match codec::encode_error_reply(&error.to_service_error()) {
            Ok(body) => body,
            Err(e) => {
                tracing::error!(error = %e, "Failed to encode error reply");
                return;
            }
        };

        match self.publish_reply(reply_to, Some(correlation_id), body).await {
            Ok(()) => tracing::debug!(reply_to, "Error reply published"),
            Err(e) => tracing::error!(error = %e, "Failed to publish error reply"),
        }
    }
}

fn reply_destination(delivery: &Delivery) -> Result<&str, WorkerError> {
    delivery
        .reply_to
        .as_deref()
        .filter(|queue| !queue.is_empty())
        .ok_or_else(|| WorkerError::ProtocolViolation("request has no reply_to".to_string()))
}
