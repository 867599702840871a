// Library for the request-serving side: the odds RPC client and the service
// that turns a match id into a call.

pub mod config;
pub mod errors;
pub mod history;
pub mod odds;
pub mod rpc;

pub use config::Config;
pub use errors::{AppError, Result};
pub use odds::{MatchSource, OddsService};
pub use rpc::{OddsRpcClient, RpcClientConfig, RpcError};
