/// Common test utilities and fixtures for integration tests
use async_trait::async_trait;
use chrono::NaiveDate;
use odds_backend::{OddsRpcClient, RpcClientConfig};
use odds_shared::broker::{
    BrokerChannel, BrokerError, Connector, Delivery, DeliveryStream, MemoryBroker,
    OutboundMessage,
};
use odds_shared::{MatchRecord, RPC_QUEUE};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

pub fn record(id: i64, day: u32, home: i64, away: i64, goals: (u32, u32)) -> MatchRecord {
    MatchRecord {
        match_api_id: id,
        country_id: 1729,
        league_id: 1729,
        season: "2014/2015".to_string(),
        stage: day as i32,
        date: NaiveDate::from_ymd_opt(2014, 11, day).unwrap(),
        home_team_api_id: home,
        away_team_api_id: away,
        home_team_goal: goals.0,
        away_team_goal: goals.1,
    }
}

pub fn client_config() -> RpcClientConfig {
    RpcClientConfig::default()
        .with_call_timeout(Duration::from_secs(5))
        .with_connect_retries(1, Duration::from_millis(1))
}

pub async fn connect(broker: &MemoryBroker, config: RpcClientConfig) -> OddsRpcClient {
    OddsRpcClient::connect(broker, config)
        .await
        .expect("memory broker always connects")
}

/// Stands in for the processor: consumes the request queue, replies by hand
pub struct FakeWorker {
    broker: MemoryBroker,
    requests: DeliveryStream,
}

impl FakeWorker {
    pub async fn start(broker: &MemoryBroker) -> Self {
        broker.declare_queue(RPC_QUEUE).await.unwrap();
        let requests = broker.consume(RPC_QUEUE, false).await.unwrap();
        Self {
            broker: broker.clone(),
            requests,
        }
    }

    pub async fn next_request(&mut self) -> Delivery {
        tokio::time::timeout(Duration::from_secs(5), self.requests.recv())
            .await
            .expect("request in time")
            .expect("request queue open")
    }

    /// Reply to `request` with its own correlation id
    pub async fn reply(&self, request: &Delivery, body: Vec<u8>) {
        self.reply_with(
            request.reply_to.as_deref().expect("client sets reply_to"),
            request.correlation_id.clone(),
            body,
        )
        .await;
    }

    pub async fn reply_with(&self, reply_to: &str, correlation_id: Option<String>, body: Vec<u8>) {
        let mut message = OutboundMessage::new(body);
        message.correlation_id = correlation_id;
        self.broker.publish(reply_to, message).await.unwrap();
    }
}

/// Fails the first `failures` connection attempts
pub struct FlakyConnector {
    broker: MemoryBroker,
    failures: u32,
    attempts: AtomicU32,
}

impl FlakyConnector {
    pub fn new(broker: &MemoryBroker, failures: u32) -> Self {
        Self {
            broker: broker.clone(),
            failures,
            attempts: AtomicU32::new(0),
        }
    }

    pub fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Connector for FlakyConnector {
    async fn connect(&self) -> Result<Arc<dyn BrokerChannel>, BrokerError> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
        if attempt <= self.failures {
            return Err(BrokerError::Connection("connection refused".to_string()));
        }
        self.broker.connect().await
    }

    fn endpoint(&self) -> String {
        "flaky://".to_string()
    }
}

/// Poll until `condition` holds, failing the test after two seconds
pub async fn wait_until(condition: impl Fn() -> bool) {
    for _ in 0..200 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not met within 2s");
}
