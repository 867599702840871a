/// Shared error types for the odds services
///
/// Design Philosophy:
/// - Standardized error codes so the client can tell processor failures apart
/// - Categorized by error domain (Validation, Protocol, Computation, Network, Internal)
/// - Serializable, because the processor sends these back as explicit error replies
/// - Includes context fields for debugging (error_code, message, context)
///
/// Error codes follow the pattern: <CATEGORY>_<SPECIFIC>_<DETAIL>
use serde::{Deserialize, Serialize};
use std::fmt;

/// Error categories that map to HTTP status codes and logging severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCategory {
    /// Validation errors (400 Bad Request)
    /// The request payload could not be decoded
    Validation,

    /// Protocol violations (400 Bad Request)
    /// A message broke the request/reply contract, e.g. no reply queue
    Protocol,

    /// Estimation errors (422 Unprocessable Entity)
    /// The match history cannot support a model fit
    Computation,

    /// Network/broker errors (503 Service Unavailable)
    /// Broker unreachable or the call deadline passed
    Network,

    /// Internal service errors (500 Internal Server Error)
    Internal,

    /// Resource not found (404 Not Found)
    NotFound,
}

impl ErrorCategory {
    /// Map error category to HTTP status code
    pub fn status_code(&self) -> u16 {
        match self {
            ErrorCategory::Validation => 400,
            ErrorCategory::Protocol => 400,
            ErrorCategory::Computation => 422,
            ErrorCategory::Network => 503,
            ErrorCategory::Internal => 500,
            ErrorCategory::NotFound => 404,
        }
    }
}

/// Standard error codes used across all services
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorCode(pub &'static str);

impl ErrorCode {
    // Validation errors
    pub const VALIDATION_MALFORMED_REQUEST: ErrorCode = ErrorCode("VALIDATION_MALFORMED_REQUEST");
    pub const VALIDATION_EMPTY_REQUEST: ErrorCode = ErrorCode("VALIDATION_EMPTY_REQUEST");

    // Protocol errors
    pub const PROTOCOL_MISSING_REPLY_TO: ErrorCode = ErrorCode("PROTOCOL_MISSING_REPLY_TO");

    // Estimation errors
    pub const COMPUTATION_INSUFFICIENT_DATA: ErrorCode = ErrorCode("COMPUTATION_INSUFFICIENT_DATA");
    pub const COMPUTATION_NUMERIC_DIVERGENCE: ErrorCode =
        ErrorCode("COMPUTATION_NUMERIC_DIVERGENCE");

    // Network errors
    pub const NETWORK_BROKER_UNAVAILABLE: ErrorCode = ErrorCode("NETWORK_BROKER_UNAVAILABLE");
    pub const NETWORK_RPC_TIMEOUT: ErrorCode = ErrorCode("NETWORK_RPC_TIMEOUT");

    // Internal errors
    pub const INTERNAL_UNEXPECTED: ErrorCode = ErrorCode("INTERNAL_UNEXPECTED");
    pub const INTERNAL_SERIALIZATION: ErrorCode = ErrorCode("INTERNAL_SERIALIZATION");

    // Resource errors
    pub const NOT_FOUND_MATCH: ErrorCode = ErrorCode("NOT_FOUND_MATCH");

    pub fn as_str(&self) -> &'static str {
        self.0
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Standardized error structure used across all services
///
/// This provides consistent error reporting with:
/// - Structured error codes for programmatic handling
/// - Human-readable messages
/// - Optional context for debugging
/// - Category-based classification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceError {
    /// Error category (determines status code and log level)
    pub category: ErrorCategory,

    /// Structured error code
    pub code: String,

    /// Human-readable error message
    pub message: String,

    /// Optional additional context (e.g., team ids, row counts)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
}

impl ServiceError {
    /// Create a new ServiceError
    pub fn new(category: ErrorCategory, code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            category,
            code: code.as_str().to_string(),
            message: message.into(),
            context: None,
        }
    }

    /// Add context to an error
    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    pub fn has_code(&self, code: &ErrorCode) -> bool {
        self.code == code.as_str()
    }

    // Validation error constructors
    pub fn malformed_request(error: impl fmt::Display) -> Self {
        Self::new(
            ErrorCategory::Validation,
            ErrorCode::VALIDATION_MALFORMED_REQUEST,
            "Request payload could not be decoded",
        )
        .with_context(error.to_string())
    }

    pub fn empty_request() -> Self {
        Self::new(
            ErrorCategory::Validation,
            ErrorCode::VALIDATION_EMPTY_REQUEST,
            "Request carries no target match",
        )
    }

    // Protocol error constructors
    pub fn missing_reply_to() -> Self {
        Self::new(
            ErrorCategory::Protocol,
            ErrorCode::PROTOCOL_MISSING_REPLY_TO,
            "Request has no reply_to queue",
        )
    }

    // Estimation error constructors
    pub fn insufficient_data(reason: impl Into<String>) -> Self {
        Self::new(
            ErrorCategory::Computation,
            ErrorCode::COMPUTATION_INSUFFICIENT_DATA,
            "Not enough match history to fit the scoring model",
        )
        .with_context(reason)
    }

    pub fn numeric_divergence(reason: impl Into<String>) -> Self {
        Self::new(
            ErrorCategory::Computation,
            ErrorCode::COMPUTATION_NUMERIC_DIVERGENCE,
            "Scoring model fit did not converge",
        )
        .with_context(reason)
    }

    // Network error constructors
    pub fn broker_unavailable(endpoint: impl Into<String>) -> Self {
        Self::new(
            ErrorCategory::Network,
            ErrorCode::NETWORK_BROKER_UNAVAILABLE,
            "Message broker unavailable",
        )
        .with_context(endpoint)
    }

    pub fn rpc_timeout(correlation_id: impl fmt::Display) -> Self {
        Self::new(
            ErrorCategory::Network,
            ErrorCode::NETWORK_RPC_TIMEOUT,
            "No reply before the call deadline",
        )
        .with_context(format!("correlation_id: {}", correlation_id))
    }

    // Resource not found constructors
    pub fn match_not_found(match_api_id: i64) -> Self {
        Self::new(
            ErrorCategory::NotFound,
            ErrorCode::NOT_FOUND_MATCH,
            format!("Match not found: {}", match_api_id),
        )
    }

    // Internal error constructors
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorCategory::Internal, ErrorCode::INTERNAL_UNEXPECTED, message)
    }

    pub fn serialization_error(error: impl fmt::Display) -> Self {
        Self::new(
            ErrorCategory::Internal,
            ErrorCode::INTERNAL_SERIALIZATION,
            "Serialization error",
        )
        .with_context(error.to_string())
    }
}

impl fmt::Display for ServiceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(context) = &self.context {
            write!(f, "[{}] {}: {}", self.code, self.message, context)
        } else {
            write!(f, "[{}] {}", self.code, self.message)
        }
    }
}

impl std::error::Error for ServiceError {}
