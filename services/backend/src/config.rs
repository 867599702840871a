use anyhow::Context;
use odds_shared::config::{rpc_queue_from_env, BrokerConfig};
use odds_shared::constants::*;
use serde::Deserialize;
use std::env;
use std::time::Duration;

use crate::rpc::RpcClientConfig;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub broker: BrokerConfig,
    pub rpc: RpcConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RpcConfig {
    pub request_queue: String,
    pub call_timeout_seconds: u64,
    pub history_limit: usize,
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        Ok(Config {
            broker: BrokerConfig::from_env()?,
            rpc: RpcConfig {
                request_queue: rpc_queue_from_env(),
                call_timeout_seconds: env::var("RPC_CALL_TIMEOUT_SECONDS")
                    .unwrap_or_else(|_| DEFAULT_CALL_TIMEOUT_SECS.to_string())
                    .parse()
                    .context("RPC_CALL_TIMEOUT_SECONDS must be an integer")?,
                history_limit: env::var("ODDS_HISTORY_LIMIT")
                    .unwrap_or_else(|_| DEFAULT_HISTORY_LIMIT.to_string())
                    .parse()
                    .context("ODDS_HISTORY_LIMIT must be an integer")?,
            },
        })
    }

    pub fn rpc_client_config(&self) -> RpcClientConfig {
        RpcClientConfig {
            request_queue: self.rpc.request_queue.clone(),
            call_timeout: Duration::from_secs(self.rpc.call_timeout_seconds),
            connect_max_retries: self.broker.connect_max_retries,
            connect_retry_delay: self.broker.connect_retry_delay(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rpc_client_config_from_settings() {
        let config = Config {
            broker: BrokerConfig {
                host: "rabbitmq".to_string(),
                port: 5672,
                username: "guest".to_string(),
                password: "guest".to_string(),
                vhost: "/".to_string(),
                connect_max_retries: 7,
                connect_retry_delay_seconds: 2,
            },
            rpc: RpcConfig {
                request_queue: "odds_requests".to_string(),
                call_timeout_seconds: 12,
                history_limit: 10,
            },
        };

        let client = config.rpc_client_config();
        assert_eq!(client.request_queue, "odds_requests");
        assert_eq!(client.call_timeout, Duration::from_secs(12));
        assert_eq!(client.connect_max_retries, 7);
        assert_eq!(client.connect_retry_delay, Duration::from_secs(2));
    }
}
