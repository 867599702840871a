/// Common fixtures and helpers for worker integration tests
use chrono::NaiveDate;
use odds_processor::{ProcessorConfig, WorkerPool};
use odds_shared::broker::{
    AckOutcome, BrokerChannel, DeliveryStream, MemoryBroker, OutboundMessage,
};
use odds_shared::codec;
use odds_shared::retry_strategy::RetryStrategy;
use odds_shared::MatchRecord;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

pub const REQUEST_QUEUE: &str = "rpc_queue";
pub const HOME: i64 = 8634;
pub const AWAY: i64 = 8633;

pub fn record(id: i64, day: u32, home: i64, away: i64, goals: (u32, u32)) -> MatchRecord {
    MatchRecord {
        match_api_id: id,
        country_id: 21518,
        league_id: 21518,
        season: "2015/2016".to_string(),
        stage: day as i32,
        date: NaiveDate::from_ymd_opt(2015, 10, day).unwrap(),
        home_team_api_id: home,
        away_team_api_id: away,
        home_team_goal: goals.0,
        away_team_goal: goals.1,
    }
}

/// Target match followed by ten earlier matches of the same season
pub fn league_request() -> Vec<MatchRecord> {
    vec![
        record(1, 30, HOME, AWAY, (0, 0)),
        record(2, 20, HOME, 10, (2, 1)),
        record(3, 19, AWAY, 11, (0, 0)),
        record(4, 18, 12, HOME, (0, 1)),
        record(5, 17, 13, AWAY, (1, 1)),
        record(6, 16, 10, 11, (1, 0)),
        record(7, 15, 12, 13, (2, 1)),
        record(8, 14, HOME, 12, (2, 1)),
        record(9, 13, AWAY, 10, (0, 0)),
        record(10, 12, 11, HOME, (1, 2)),
        record(11, 11, 13, 10, (0, 1)),
    ]
}

pub fn processor_config() -> ProcessorConfig {
    ProcessorConfig {
        request_queue: REQUEST_QUEUE.to_string(),
        ..Default::default()
    }
}

/// Connect a pool to `broker` and run it in the background
pub async fn start_pool(
    broker: &MemoryBroker,
    config: ProcessorConfig,
) -> (Arc<WorkerPool>, JoinHandle<anyhow::Result<()>>) {
    let strategy = RetryStrategy::new(1, Duration::from_millis(1));
    let pool = Arc::new(
        WorkerPool::connect(broker, &strategy, config)
            .await
            .expect("memory broker always connects"),
    );

    let handle = tokio::spawn({
        let pool = pool.clone();
        async move { pool.start().await }
    });

    wait_until(|| broker.queue_exists(REQUEST_QUEUE)).await;
    (pool, handle)
}

/// A caller-side reply queue and its consumer
pub async fn reply_queue(broker: &MemoryBroker) -> (String, DeliveryStream) {
    let name = broker.declare_reply_queue().await.unwrap();
    let stream = broker.consume(&name, true).await.unwrap();
    (name, stream)
}

pub fn request(body: Vec<u8>, reply_to: &str, correlation_id: &str) -> OutboundMessage {
    OutboundMessage::new(body)
        .with_reply_to(reply_to)
        .with_correlation_id(correlation_id)
}

pub fn encoded(records: &[MatchRecord]) -> Vec<u8> {
    codec::encode_request(records).unwrap()
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

/// Wait for the settlement of `delivery_tag`
pub async fn settlement_of(broker: &MemoryBroker, delivery_tag: u64) -> AckOutcome {
    wait_until(|| broker.settlements().iter().any(|(tag, _)| *tag == delivery_tag)).await;
    broker
        .settlements()
        .into_iter()
        .find(|(tag, _)| *tag == delivery_tag)
        .map(|(_, outcome)| outcome)
        .unwrap()
}
