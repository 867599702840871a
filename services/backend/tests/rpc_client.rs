/// Integration tests for the odds RPC client against the in-memory broker
mod common;

use common::*;
use odds_backend::{OddsRpcClient, RpcError};
use odds_shared::broker::MemoryBroker;
use odds_shared::codec;
use odds_shared::{ErrorCode, MatchRecord, OddsResult, ServiceError};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

fn request_for(target_id: i64) -> Vec<MatchRecord> {
    vec![
        record(target_id, 20, 1, 2, (0, 0)),
        record(target_id + 1, 10, 2, 1, (1, 2)),
    ]
}

fn odds_body(home_win: f64, draw: f64, away_win: f64) -> Vec<u8> {
    codec::encode_reply(&OddsResult::new(home_win, draw, away_win).unwrap()).unwrap()
}

fn target_of(body: &[u8]) -> i64 {
    codec::decode_request(body).unwrap()[0].match_api_id
}

#[tokio::test]
async fn test_call_returns_reply_odds() {
    let broker = MemoryBroker::new();
    let mut worker = FakeWorker::start(&broker).await;
    let client = connect(&broker, client_config()).await;

    let records = request_for(100);
    let call = client.call(&records);
    let serve = async {
        let request = worker.next_request().await;
        assert_eq!(request.reply_to.as_deref(), Some(client.reply_queue()));
        assert!(request.correlation_id.is_some());
        assert_eq!(target_of(&request.body), 100);
        worker.reply(&request, odds_body(0.5, 0.3, 0.2)).await;
    };

    let (result, ()) = tokio::join!(call, serve);
    let odds = result.unwrap();
    assert_eq!((odds.home_win, odds.draw, odds.away_win), (0.5, 0.3, 0.2));
    assert_eq!(client.pending_calls(), 0);
}

#[tokio::test]
async fn test_out_of_order_replies_reach_their_own_callers() {
    let broker = MemoryBroker::new();
    let mut worker = FakeWorker::start(&broker).await;
    let client = connect(&broker, client_config()).await;

    let (first_records, second_records) = (request_for(100), request_for(200));
    let first = client.call(&first_records);
    let second = client.call(&second_records);
    let serve = async {
        let a = worker.next_request().await;
        let b = worker.next_request().await;
        assert_ne!(a.correlation_id, b.correlation_id);

        // Answer in reverse arrival order; odds encode which target they belong to
        for request in [&b, &a] {
            let body = if target_of(&request.body) == 100 {
                odds_body(0.7, 0.2, 0.1)
            } else {
                odds_body(0.1, 0.2, 0.7)
            };
            worker.reply(request, body).await;
        }
    };

    let (first, second, ()) = tokio::join!(first, second, serve);
    assert_eq!(first.unwrap().home_win, 0.7);
    assert_eq!(second.unwrap().away_win, 0.7);
    assert_eq!(client.pending_calls(), 0);
}

#[tokio::test]
async fn test_stray_replies_do_not_resolve_calls() {
    let broker = MemoryBroker::new();
    let mut worker = FakeWorker::start(&broker).await;
    let client = connect(&broker, client_config()).await;

    let records = request_for(100);
    let call = client.call(&records);
    let serve = async {
        let request = worker.next_request().await;
        let reply_to = request.reply_to.clone().unwrap();

        worker
            .reply_with(&reply_to, None, odds_body(0.1, 0.1, 0.8))
            .await;
        worker
            .reply_with(&reply_to, Some("unknown-id".to_string()), odds_body(0.1, 0.8, 0.1))
            .await;
        worker.reply(&request, odds_body(0.6, 0.3, 0.1)).await;
    };

    let (result, ()) = tokio::join!(call, serve);
    assert_eq!(result.unwrap().home_win, 0.6);
}

#[tokio::test]
async fn test_timeout_unregisters_call() {
    let broker = MemoryBroker::new();
    let mut worker = FakeWorker::start(&broker).await;
    let config = client_config().with_call_timeout(Duration::from_millis(100));
    let client = connect(&broker, config).await;

    let result = client.call(&request_for(100)).await;
    match result {
        Err(RpcError::Timeout { timeout, .. }) => assert_eq!(timeout, Duration::from_millis(100)),
        other => panic!("expected timeout, got {:?}", other),
    }
    assert_eq!(client.pending_calls(), 0);

    // A reply arriving after the deadline is discarded
    let late = worker.next_request().await;
    worker.reply(&late, odds_body(0.5, 0.25, 0.25)).await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(client.pending_calls(), 0);
}

#[tokio::test]
async fn test_cancelled_call_unregisters() {
    let broker = MemoryBroker::new();
    let mut worker = FakeWorker::start(&broker).await;
    let client = connect(&broker, client_config()).await;
    let cancel = CancellationToken::new();

    let records = request_for(100);
    let call = client.call_cancellable(&records, &cancel);
    let trigger = async {
        worker.next_request().await;
        cancel.cancel();
    };

    let (result, ()) = tokio::join!(call, trigger);
    assert!(matches!(result, Err(RpcError::Cancelled { .. })));
    assert_eq!(client.pending_calls(), 0);
}

#[tokio::test]
async fn test_dropped_call_unregisters() {
    let broker = MemoryBroker::new();
    let _worker = FakeWorker::start(&broker).await;
    let client = connect(&broker, client_config()).await;

    let abandoned =
        tokio::time::timeout(Duration::from_millis(50), client.call(&request_for(100))).await;
    assert!(abandoned.is_err());
    assert_eq!(client.pending_calls(), 0);
}

#[tokio::test]
async fn test_error_reply_fails_call() {
    let broker = MemoryBroker::new();
    let mut worker = FakeWorker::start(&broker).await;
    let client = connect(&broker, client_config()).await;

    let records = request_for(100);
    let call = client.call(&records);
    let serve = async {
        let request = worker.next_request().await;
        let error = ServiceError::insufficient_data("team 2 has no previous matches");
        worker
            .reply(&request, codec::encode_error_reply(&error).unwrap())
            .await;
    };

    let (result, ()) = tokio::join!(call, serve);
    match result {
        Err(RpcError::Remote(error)) => {
            assert!(error.has_code(&ErrorCode::COMPUTATION_INSUFFICIENT_DATA))
        }
        other => panic!("expected remote error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_malformed_reply_fails_call() {
    let broker = MemoryBroker::new();
    let mut worker = FakeWorker::start(&broker).await;
    let client = connect(&broker, client_config()).await;

    let records = request_for(100);
    let call = client.call(&records);
    let serve = async {
        let request = worker.next_request().await;
        worker
            .reply(&request, b"{'home_team': 0.5, 'draw': 0.25, 'away_team': 0.25}".to_vec())
            .await;
    };

    let (result, ()) = tokio::join!(call, serve);
    assert!(matches!(result, Err(RpcError::MalformedReply(_))));
}

#[tokio::test]
async fn test_empty_request_never_published() {
    let broker = MemoryBroker::new();
    let client = connect(&broker, client_config()).await;

    assert!(matches!(client.call(&[]).await, Err(RpcError::Encode(_))));
    assert!(broker.unroutable().is_empty());
    assert_eq!(client.pending_calls(), 0);
}

#[tokio::test]
async fn test_closed_client_refuses_calls() {
    let broker = MemoryBroker::new();
    let _worker = FakeWorker::start(&broker).await;
    let client = connect(&broker, client_config()).await;

    client.close().await;
    assert!(matches!(
        client.call(&request_for(100)).await,
        Err(RpcError::Disconnected)
    ));
}

#[tokio::test]
async fn test_connect_retries_transient_failures() {
    let broker = MemoryBroker::new();
    let connector = FlakyConnector::new(&broker, 2);
    let config = client_config().with_connect_retries(5, Duration::from_millis(1));

    tokio_test::assert_ok!(OddsRpcClient::connect(&connector, config).await);
    assert_eq!(connector.attempts(), 3);
    assert_eq!(broker.connection_count(), 1);
}

#[tokio::test]
async fn test_connect_gives_up_after_budget() {
    let broker = MemoryBroker::new();
    let connector = FlakyConnector::new(&broker, u32::MAX);
    let config = client_config().with_connect_retries(2, Duration::from_millis(1));

    let result = OddsRpcClient::connect(&connector, config).await;
    assert!(matches!(result, Err(RpcError::Connection(_))));
    assert_eq!(connector.attempts(), 2);
    assert_eq!(broker.connection_count(), 0);
}
