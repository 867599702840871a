//! Shared constants for the odds RPC services
//!
//! Defaults used by both the request-serving side and the processor so the
//! two ends of the queue agree on names, limits and tolerances.

/// Well-known request queue every client publishes to and every processor consumes
pub const RPC_QUEUE: &str = "rpc_queue";

/// Content type stamped on request messages (structured JSON carried as plain text)
pub const REQUEST_CONTENT_TYPE: &str = "text/plain";

/// Content type stamped on reply messages
pub const REPLY_CONTENT_TYPE: &str = "application/json";

/// Number of previous matches in the same league and season used as training data
pub const DEFAULT_HISTORY_LIMIT: usize = 10;

/// Highest goal count simulated per side (scores above are truncated)
pub const DEFAULT_MAX_GOALS: usize = 10;

/// Broker connection attempts before giving up
pub const DEFAULT_CONNECT_MAX_RETRIES: u32 = 5;

/// Fixed delay between broker connection attempts
pub const DEFAULT_CONNECT_RETRY_DELAY_SECS: u64 = 5;

/// Upper bound on how long a caller waits for a reply
///
/// The processor rejects failed messages without requeueing them, so a call
/// without a deadline could otherwise wait forever.
pub const DEFAULT_CALL_TIMEOUT_SECS: u64 = 30;

/// Allowed deviation of `home + draw + away` from 1.0
pub const PROBABILITY_TOLERANCE: f64 = 1e-6;

/// Largest score mass allowed above `max_goals` per request
///
/// At 2 expected goals P(goals > 10) is already about 1e-5, so the sum
/// tolerance above would reject ordinary fixtures. Above this bound the
/// fitted rates are outside what the capped distribution can represent.
pub const TRUNCATION_TOLERANCE: f64 = 1e-3;

/// Capacity of the in-process buffer between a broker consumer and its reader
pub const DELIVERY_BUFFER_SIZE: usize = 256;
