use odds_shared::broker::{
    connect_with_retry, BrokerChannel, Connector, Delivery, DeliveryStream, OutboundMessage,
};
use odds_shared::codec::{self, Reply};
use odds_shared::constants::REQUEST_CONTENT_TYPE;
use odds_shared::retry_strategy::RetryStrategy;
use odds_shared::{MatchRecord, OddsResult};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn, Instrument};

use super::pending::PendingCalls;
use super::{RpcClientConfig, RpcError};

/// Client side of the odds RPC
///
/// Owns one broker channel, one exclusive reply queue and the single task
/// draining it. Construct once at startup and share behind an `Arc`.
pub struct OddsRpcClient {
    channel: Arc<dyn BrokerChannel>,
    reply_queue: String,
    request_queue: String,
    call_timeout: Duration,
    pending: Arc<PendingCalls>,
    shutdown: CancellationToken,
    consumer: Mutex<Option<JoinHandle<()>>>,
}

impl OddsRpcClient {
    /// Connect, declare the reply queue and start the reply consumer
    ///
    /// Connection attempts are retried with a fixed delay; running out of
    /// attempts returns `RpcError::Connection`.
    pub async fn connect(
        connector: &dyn Connector,
        config: RpcClientConfig,
    ) -> Result<Self, RpcError> {
        let strategy = RetryStrategy::new(config.connect_max_retries, config.connect_retry_delay);
        let channel = connect_with_retry(connector, &strategy)
            .await
            .map_err(RpcError::Connection)?;

        let reply_queue = channel.declare_reply_queue().await?;
        let deliveries = channel.consume(&reply_queue, true).await?;

        let pending = Arc::new(PendingCalls::default());
        let shutdown = CancellationToken::new();
        let consumer = tokio::spawn(consume_replies(
            deliveries,
            pending.clone(),
            shutdown.clone(),
            reply_queue.clone(),
        ));

        info!(
            reply_queue = %reply_queue,
            request_queue = %config.request_queue,
            call_timeout_ms = config.call_timeout.as_millis() as u64,
            "Odds RPC client ready"
        );

        Ok(Self {
            channel,
            reply_queue,
            request_queue: config.request_queue,
            call_timeout: config.call_timeout,
            pending,
            shutdown,
            consumer: Mutex::new(Some(consumer)),
        })
    }

    pub fn reply_queue(&self) -> &str {
        &self.reply_queue
    }

    /// Calls registered and still waiting for a reply
    pub fn pending_calls(&self) -> usize {
        self.pending.len()
    }

    /// Ask the processor for the outcome probabilities of `records[0]`
    ///
    /// `records[1..]` is the training history. Fails with `Timeout` when no
    /// reply arrives within the configured deadline. Dropping the returned
    /// future unregisters the call.
    pub async fn call(&self, records: &[MatchRecord]) -> Result<OddsResult, RpcError> {
        self.call_inner(records, None).await
    }

    /// Like `call`, but returns `Cancelled` as soon as `cancel` fires
    pub async fn call_cancellable(
        &self,
        records: &[MatchRecord],
        cancel: &CancellationToken,
    ) -> Result<OddsResult, RpcError> {
        self.call_inner(records, Some(cancel)).await
    }

    async fn call_inner(
        &self,
        records: &[MatchRecord],
        cancel: Option<&CancellationToken>,
    ) -> Result<OddsResult, RpcError> {
        let payload = codec::encode_request(records).map_err(RpcError::Encode)?;
        let (call, reply) = self.pending.register().ok_or(RpcError::Disconnected)?;
        let correlation_id = call.correlation_id().to_string();

        let span = tracing::info_span!(
            "odds_rpc_call",
            correlation_id = %correlation_id,
            record_count = records.len()
        );

        async move {
            let started = Instant::now();
            metrics::counter!("odds_rpc_calls_total").increment(1);

            let message = OutboundMessage::new(payload)
                .with_correlation_id(correlation_id.clone())
                .with_reply_to(self.reply_queue.clone())
                .with_content_type(REQUEST_CONTENT_TYPE)
                .with_expiration(self.call_timeout);

            let outcome = match self.channel.publish(&self.request_queue, message).await {
                Ok(()) => {
                    debug!("Request published, awaiting reply");
                    tokio::select! {
                        reply = tokio::time::timeout(self.call_timeout, reply) => match reply {
                            Ok(Ok(body)) => decode(&body),
                            Ok(Err(_)) => Err(RpcError::Disconnected),
                            Err(_) => Err(RpcError::Timeout {
                                correlation_id: correlation_id.clone(),
                                timeout: self.call_timeout,
                            }),
                        },
                        _ = cancelled(cancel) => Err(RpcError::Cancelled {
                            correlation_id: correlation_id.clone(),
                        }),
                    }
                }
                Err(e) => Err(RpcError::Broker(e)),
            };

            // Unregisters on timeout and cancellation; a resolved call is already gone
            drop(call);

            metrics::histogram!("odds_rpc_call_duration_seconds")
                .record(started.elapsed().as_secs_f64());

            match &outcome {
                Ok(odds) => debug!(
                    home_win = odds.home_win,
                    draw = odds.draw,
                    away_win = odds.away_win,
                    duration_ms = started.elapsed().as_millis() as u64,
                    "Call answered"
                ),
                Err(e) => {
                    metrics::counter!("odds_rpc_call_failures_total", "kind" => e.kind())
                        .increment(1);
                    warn!(error = %e, "Call failed");
                }
            }

            outcome
        }
        .instrument(span)
        .await
    }

    /// Stop the reply consumer; calls still waiting fail with `Disconnected`
    pub async fn close(&self) {
        self.shutdown.cancel();
        let consumer = self.consumer.lock().take();
        if let Some(handle) = consumer {
            let _ = handle.await;
        }
    }
}

impl Drop for OddsRpcClient {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

fn decode(body: &[u8]) -> Result<OddsResult, RpcError> {
    match codec::decode_reply(body).map_err(RpcError::MalformedReply)? {
        Reply::Odds(odds) => Ok(odds),
        Reply::Error(error) => Err(RpcError::Remote(error)),
    }
}

async fn cancelled(token: Option<&CancellationToken>) {
    match token {
        Some(token) => token.cancelled().await,
        None => std::future::pending().await,
    }
}

/// Drain the reply queue until shutdown or until the broker closes it
async fn consume_replies(
    mut deliveries: DeliveryStream,
    pending: Arc<PendingCalls>,
    shutdown: CancellationToken,
    reply_queue: String,
) {
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                debug!(reply_queue = %reply_queue, "Reply consumer shutting down");
                break;
            }
            delivery = deliveries.recv() => match delivery {
                Some(delivery) => dispatch_reply(&pending, delivery),
                None => {
                    warn!(reply_queue = %reply_queue, "Reply stream closed by broker");
                    break;
                }
            },
        }
    }

    let abandoned = pending.close();
    if abandoned > 0 {
        warn!(abandoned, "Failing calls still waiting for a reply");
    }
}

fn dispatch_reply(pending: &PendingCalls, delivery: Delivery) {
    let Some(correlation_id) = delivery.correlation_id.clone() else {
        warn!(
            delivery_tag = delivery.delivery_tag,
            body_len = delivery.body.len(),
            "Discarding reply without correlation id"
        );
        metrics::counter!("odds_rpc_replies_discarded_total", "reason" => "no_correlation_id")
            .increment(1);
        return;
    };

    if !pending.resolve(&correlation_id, delivery.body) {
        debug!(
            correlation_id = %correlation_id,
            "Discarding reply for unknown or abandoned call"
        );
        metrics::counter!("odds_rpc_replies_discarded_total", "reason" => "unknown_correlation_id")
            .increment(1);
    }
}
