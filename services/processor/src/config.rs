use anyhow::Context;
use odds_shared::config::{rpc_queue_from_env, BrokerConfig};
use odds_shared::constants::DEFAULT_MAX_GOALS;
use serde::Deserialize;
use std::env;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub broker: BrokerConfig,
    pub processor: ProcessorConfig,
    pub metrics_port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProcessorConfig {
    pub request_queue: String,
    /// Requests estimated at the same time
    pub concurrency: usize,
    /// Publish an error envelope instead of staying silent on failure
    pub error_replies: bool,
    pub max_goals: usize,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            request_queue: odds_shared::RPC_QUEUE.to_string(),
            concurrency: 1,
            error_replies: true,
            max_goals: DEFAULT_MAX_GOALS,
        }
    }
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        Ok(Config {
            broker: BrokerConfig::from_env()?,
            processor: ProcessorConfig {
                request_queue: rpc_queue_from_env(),
                concurrency: env::var("PROCESSOR_CONCURRENCY")
                    .unwrap_or_else(|_| "1".to_string())
                    .parse()
                    .context("PROCESSOR_CONCURRENCY must be an integer")?,
                error_replies: env::var("PROCESSOR_ERROR_REPLIES")
                    .unwrap_or_else(|_| "true".to_string())
                    .parse()
                    .context("PROCESSOR_ERROR_REPLIES must be true or false")?,
                max_goals: env::var("PROCESSOR_MAX_GOALS")
                    .unwrap_or_else(|_| DEFAULT_MAX_GOALS.to_string())
                    .parse()
                    .context("PROCESSOR_MAX_GOALS must be an integer")?,
            },
            metrics_port: env::var("PROCESSOR_METRICS_PORT")
                .unwrap_or_else(|_| "9091".to_string())
                .parse()
                .context("PROCESSOR_METRICS_PORT must be a port number")?,
        })
    }
}
