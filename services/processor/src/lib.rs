pub mod config;
pub mod estimator;
pub mod worker_pool;

pub use config::{Config, ProcessorConfig};
pub use estimator::{Estimate, EstimatorError, OddsEstimator};
pub use worker_pool::{RequestHandler, WorkerError, WorkerPool};
