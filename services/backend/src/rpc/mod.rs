//! Odds RPC client
//!
//! Calls travel to the processor over the well-known request queue; replies
//! come back on a private, broker-named queue and are matched to their caller
//! by correlation id alone, so concurrent calls may finish in any order.

mod client;
mod pending;

pub use client::OddsRpcClient;

use odds_shared::broker::BrokerError;
use odds_shared::codec::CodecError;
use odds_shared::constants::*;
use odds_shared::ServiceError;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RpcError {
    /// Broker unreachable after the retry budget; the process should not serve
    #[error("Broker connection failed: {0}")]
    Connection(#[source] BrokerError),

    #[error("Broker error: {0}")]
    Broker(#[from] BrokerError),

    #[error("Could not encode request: {0}")]
    Encode(#[source] CodecError),

    #[error("Malformed reply: {0}")]
    MalformedReply(#[source] CodecError),

    #[error("No reply for call {correlation_id} within {timeout:?}")]
    Timeout {
        correlation_id: String,
        timeout: Duration,
    },

    #[error("Call {correlation_id} was cancelled")]
    Cancelled { correlation_id: String },

    #[error("Reply consumer stopped before the call was answered")]
    Disconnected,

    /// The processor answered with an explicit error reply
    #[error("Processor rejected the call: {0}")]
    Remote(ServiceError),
}

impl RpcError {
    pub fn to_service_error(&self) -> ServiceError {
        match self {
            RpcError::Connection(e) | RpcError::Broker(e) => {
                ServiceError::broker_unavailable(e.to_string())
            }
            RpcError::Encode(e) | RpcError::MalformedReply(e) => e.to_service_error(),
            RpcError::Timeout { correlation_id, .. } => ServiceError::rpc_timeout(correlation_id),
            RpcError::Cancelled { correlation_id } => {
                ServiceError::internal(format!("Call {} was cancelled", correlation_id))
            }
            RpcError::Disconnected => ServiceError::broker_unavailable("reply consumer stopped"),
            RpcError::Remote(e) => e.clone(),
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            RpcError::Connection(_) => "connection",
            RpcError::Broker(_) => "broker",
            RpcError::Encode(_) => "encode",
            RpcError::MalformedReply(_) => "malformed_reply",
            RpcError::Timeout { .. } => "timeout",
            RpcError::Cancelled { .. } => "cancelled",
            RpcError::Disconnected => "disconnected",
            RpcError::Remote(_) => "remote",
        }
    }
}

/// Settings for `OddsRpcClient::connect`
#[derive(Debug, Clone)]
pub struct RpcClientConfig {
    pub request_queue: String,
    /// Deadline for a single call, also sent as the request's broker TTL
    pub call_timeout: Duration,
    pub connect_max_retries: u32,
    pub connect_retry_delay: Duration,
}

impl Default for RpcClientConfig {
    fn default() -> Self {
        Self {
            request_queue: RPC_QUEUE.to_string(),
            call_timeout: Duration::from_secs(DEFAULT_CALL_TIMEOUT_SECS),
            connect_max_retries: DEFAULT_CONNECT_MAX_RETRIES,
            connect_retry_delay: Duration::from_secs(DEFAULT_CONNECT_RETRY_DELAY_SECS),
        }
    }
}

impl RpcClientConfig {
    pub fn with_call_timeout(mut self, call_timeout: Duration) -> Self {
        self.call_timeout = call_timeout;
        self
    }

    pub fn with_connect_retries(mut self, max_retries: u32, delay: Duration) -> Self {
        self.connect_max_retries = max_retries;
        self.connect_retry_delay = delay;
        self
    }
}
