//! Odds request worker
//!
//! Consumes estimation requests from the shared request queue and answers
//! each on the caller's reply queue.

mod handler;
mod pool;
mod worker;

pub use handler::{RequestHandler, WorkerError};
pub use pool::WorkerPool;
pub use worker::Worker;
