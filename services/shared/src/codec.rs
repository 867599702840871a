//! Wire codec for request and reply bodies
//!
//! Requests are a JSON array of match objects with the target match first.
//! Replies are a JSON object, either the three outcome probabilities or an
//! `{"error": ...}` envelope the processor sends when it cannot compute them.

use serde::Deserialize;
use thiserror::Error;

use crate::errors::ServiceError;
use crate::types::{MatchRecord, OddsResult};

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("Malformed request: {0}")]
    MalformedRequest(#[source] serde_json::Error),

    #[error("Request carries no target match")]
    EmptyRequest,

    #[error("Malformed reply: {reason}")]
    MalformedReply { reason: String },

    #[error("Serialization error: {0}")]
    Serialization(#[source] serde_json::Error),
}

impl CodecError {
    fn malformed_reply(reason: impl std::fmt::Display) -> Self {
        CodecError::MalformedReply {
            reason: reason.to_string(),
        }
    }

    /// Error envelope describing this failure to the caller
    pub fn to_service_error(&self) -> ServiceError {
        match self {
            CodecError::MalformedRequest(e) => ServiceError::malformed_request(e),
            CodecError::EmptyRequest => ServiceError::empty_request(),
            CodecError::MalformedReply { reason } => ServiceError::malformed_request(reason),
            CodecError::Serialization(e) => ServiceError::serialization_error(e),
        }
    }
}

/// A decoded reply body
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    Odds(OddsResult),
    Error(ServiceError),
}

#[derive(Deserialize)]
#[serde(untagged)]
enum WireReply {
    Error { error: ServiceError },
    Odds(OddsResult),
}

#[derive(serde::Serialize)]
struct ErrorEnvelope<'a> {
    error: &'a ServiceError,
}

/// Serialize the target match followed by its history
pub fn encode_request(records: &[MatchRecord]) -> Result<Vec<u8>, CodecError> {
    if records.is_empty() {
        return Err(CodecError::EmptyRequest);
    }
    serde_json::to_vec(records).map_err(CodecError::Serialization)
}

pub fn decode_request(body: &[u8]) -> Result<Vec<MatchRecord>, CodecError> {
    let records: Vec<MatchRecord> =
        serde_json::from_slice(body).map_err(CodecError::MalformedRequest)?;
    if records.is_empty() {
        return Err(CodecError::EmptyRequest);
    }
    Ok(records)
}

pub fn encode_reply(odds: &OddsResult) -> Result<Vec<u8>, CodecError> {
    serde_json::to_vec(odds).map_err(CodecError::Serialization)
}

pub fn encode_error_reply(error: &ServiceError) -> Result<Vec<u8>, CodecError> {
    serde_json::to_vec(&ErrorEnvelope { error }).map_err(CodecError::Serialization)
}

/// Parse a reply body
///
/// Only canonical JSON is accepted. Odds that are out of range or do not sum
/// to one are rejected rather than repaired.
pub fn decode_reply(body: &[u8]) -> Result<Reply, CodecError> {
    let value: serde_json::Value =
        serde_json::from_slice(body).map_err(CodecError::malformed_reply)?;

    match serde_json::from_value::<WireReply>(value).map_err(CodecError::malformed_reply)? {
        WireReply::Error { error } => Ok(Reply::Error(error)),
        WireReply::Odds(odds) => {
            odds.validate().map_err(CodecError::malformed_reply)?;
            Ok(Reply::Odds(odds))
        }
    }
}
