pub mod broker;
pub mod codec;
pub mod config;
pub mod constants;
pub mod errors;
pub mod retry_strategy;
pub mod types;

pub use constants::*;
pub use errors::{ErrorCategory, ErrorCode, ServiceError};
pub use types::*;
