use std::sync::Arc;
use std::time::Duration;

use docshard_rpc::{Document, ProtocolError, RpcPayload, Value, doc};
use docshard_store::{MemoryConnector, Operation, StoreError, TransactionOptions};
use docshard_worker::ActorEventReceiver;
use pretty_assertions::assert_eq;
use serde_json::json;

use super::CoordinatorEvent;
use crate::{CoordinatorNamespace, Error, HeartbeatConfig, ProxyConfig};

const SHARD: &str = "mongo_shard_0";

fn namespace(connector: &MemoryConnector, ping_every: u32) -> CoordinatorNamespace {
	let config = ProxyConfig {
		heartbeat: HeartbeatConfig { interval_ms: 50_000, ping_every },
		..ProxyConfig::default()
	};
	CoordinatorNamespace::new(Arc::new(connector.clone()), &config)
}

fn payload(collection: &str, op: Operation) -> RpcPayload {
	RpcPayload::new(collection, op.kind(), op.to_args())
}

fn insert(document: Document) -> Operation {
	Operation::InsertOne { document, options: Default::default() }
}

/// Waits for the next heartbeat event, skipping connection events.
async fn next_heartbeat(events: &mut ActorEventReceiver<CoordinatorEvent>) -> (u64, Option<bool>, bool) {
	loop {
		if let CoordinatorEvent::Heartbeat { fired, pinged, rearmed } = events.recv().await.unwrap() {
			return (fired, pinged, rearmed);
		}
	}
}

#[tokio::test(start_paused = true)]
async fn pings_once_every_n_wakes() {
	let connector = MemoryConnector::new();
	let namespace = namespace(&connector, 3);
	let mut events = namespace.subscribe(SHARD).unwrap();

	let mut pinged_at = Vec::new();
	for expected in 1..=7 {
		let (fired, pinged, rearmed) = next_heartbeat(&mut events).await;
		assert_eq!(fired, expected);
		assert!(rearmed);
		if pinged == Some(true) {
			pinged_at.push(fired);
		}
	}

	assert_eq!(pinged_at, vec![3, 6]);
	assert_eq!(connector.ping_count(), 2);
	assert_eq!(connector.connect_count(), 1);
	namespace.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn failed_ping_still_rearms() {
	let connector = MemoryConnector::new();
	let namespace = namespace(&connector, 1);
	let mut events = namespace.subscribe(SHARD).unwrap();
	assert_eq!(events.recv().await.unwrap(), CoordinatorEvent::Connected);

	connector.set_reachable(false);
	for expected in 1..=3 {
		assert_eq!(next_heartbeat(&mut events).await, (expected, Some(false), true));
	}
	assert!(namespace.pending_wake(SHARD).is_some());

	connector.set_reachable(true);
	assert_eq!(next_heartbeat(&mut events).await, (4, Some(true), true));
	namespace.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn first_wake_arrives_after_one_interval() {
	let connector = MemoryConnector::new();
	let namespace = namespace(&connector, 10);
	let started = tokio::time::Instant::now();
	let mut events = namespace.subscribe(SHARD).unwrap();

	next_heartbeat(&mut events).await;
	assert!(started.elapsed() >= Duration::from_secs(50));
	assert!(started.elapsed() < Duration::from_secs(51));
	namespace.shutdown().await;
}

#[tokio::test]
async fn transaction_is_all_or_nothing() {
	let connector = MemoryConnector::new();
	let stub = namespace(&connector, 10).stub(SHARD);

	let error = stub
		.run_transaction(
			vec![
				payload("accounts", insert(doc! { "_id" => 1, "balance" => 10 })),
				payload("ledger", insert(doc! { "_id" => "t1" })),
				payload("accounts", insert(doc! { "_id" => 1 })),
			],
			TransactionOptions::default(),
		)
		.await
		.unwrap_err();
	assert!(matches!(error, Error::Store(StoreError::Operation { code: 11000, .. })), "{error}");
	assert!(connector.documents("app", "accounts").is_empty());
	assert!(connector.documents("app", "ledger").is_empty());

	let responses = stub
		.run_transaction(
			vec![payload("accounts", insert(doc! { "_id" => 1 })), payload("ledger", insert(doc! { "_id" => "t1" }))],
			TransactionOptions::default(),
		)
		.await
		.unwrap();
	assert_eq!(responses.len(), 2);
	assert_eq!(responses[0], json!({ "acknowledged": true, "insertedId": 1 }));
	assert_eq!(connector.documents("app", "accounts").len(), 1);
	assert_eq!(connector.documents("app", "ledger").len(), 1);
}

fn update_one(filter: Document, update: Document) -> Operation {
	Operation::UpdateOne { filter, update, options: Default::default() }
}

fn find_one(filter: Document) -> Operation {
	Operation::FindOne { filter, options: Default::default() }
}

#[tokio::test]
async fn transaction_reads_its_own_writes() {
	let connector = MemoryConnector::new();
	let stub = namespace(&connector, 10).stub(SHARD);
	stub.execute(payload("accounts", insert(doc! { "_id" => 1, "balance" => 10 }))).await.unwrap();

	let responses = stub
		.run_transaction(
			vec![
				payload("accounts", update_one(doc! { "_id" => 1 }, doc! { "$inc" => doc! { "balance" => 5 } })),
				payload("accounts", find_one(doc! { "_id" => 1 })),
			],
			TransactionOptions::default(),
		)
		.await
		.unwrap();
	assert_eq!(responses[1], json!({ "_id": 1, "balance": 15 }));
	assert_eq!(connector.documents("app", "accounts"), vec![doc! { "_id" => 1, "balance" => 15 }]);

	// The update only ever touched the transaction's snapshot.
	stub.run_transaction(
		vec![
			payload("accounts", update_one(doc! { "_id" => 1 }, doc! { "$set" => doc! { "balance" => 0 } })),
			payload("accounts", find_one(doc! { "_id" => 1, "balance" => 0 })),
			payload("accounts", insert(doc! { "_id" => 1 })),
		],
		TransactionOptions::default(),
	)
	.await
	.unwrap_err();
	assert_eq!(connector.documents("app", "accounts"), vec![doc! { "_id" => 1, "balance" => 15 }]);
}

#[tokio::test]
async fn oversized_array_padding_is_an_operation_error() {
	let connector = MemoryConnector::new();
	let namespace = namespace(&connector, 10);
	let stub = namespace.stub(SHARD);
	stub.execute(payload("users", insert(doc! { "_id" => 1, "a" => Vec::<Value>::new() }))).await.unwrap();

	for path in ["a.18446744073709551615", "a.1000000000"] {
		let error = stub
			.execute(payload("users", update_one(doc! { "_id" => 1 }, doc! { "$set" => doc! { path => 1 } })))
			.await
			.unwrap_err();
		assert!(matches!(error, Error::Store(StoreError::Operation { code: 2, .. })), "{path}: {error}");
	}
	assert!(namespace.is_live(SHARD));
	assert_eq!(namespace.registry().get(SHARD).map(|r| r.incarnations), Some(1));
	assert_eq!(connector.documents("app", "users"), vec![doc! { "_id" => 1, "a" => Vec::<Value>::new() }]);
}

#[tokio::test]
async fn unsupported_operation_never_reaches_a_coordinator() {
	let connector = MemoryConnector::new();
	let namespace = namespace(&connector, 10);
	let stub = namespace.stub(SHARD);

	let error = stub.execute_json(&json!({ "col": "users", "op": "dropDatabase", "args": [] })).await.unwrap_err();
	assert!(matches!(error, Error::Protocol(ProtocolError::UnsupportedOperation(ref op)) if op == "dropDatabase"), "{error}");
	assert!(!namespace.is_live(SHARD));
	assert_eq!(connector.connect_count(), 0);
}

#[tokio::test]
async fn raw_request_runs_like_typed_one() {
	let connector = MemoryConnector::new();
	let stub = namespace(&connector, 10).stub(SHARD);

	stub.execute_json(&json!({ "col": "users", "op": "insertOne", "args": [{ "_id": 7, "name": "ada" }] })).await.unwrap();
	let found = stub.execute_json(&json!({ "col": "users", "op": "findOne", "args": [{ "_id": 7 }] })).await.unwrap();
	assert_eq!(found, json!({ "_id": 7, "name": "ada" }));
}

#[tokio::test(start_paused = true)]
async fn evicted_instance_is_recreated_with_a_fresh_connection() {
	let connector = MemoryConnector::new();
	let namespace = namespace(&connector, 10);
	let stub = namespace.stub(SHARD);

	stub.execute(payload("users", insert(doc! { "_id" => 1 }))).await.unwrap();
	let wake = namespace.pending_wake(SHARD);
	assert!(wake.is_some());

	assert!(namespace.evict(SHARD));
	assert!(!namespace.is_live(SHARD));
	assert_eq!(namespace.pending_wake(SHARD), wake);

	let found = stub.execute(payload("users", Operation::FindOne { filter: doc! { "_id" => 1 }, options: Default::default() })).await.unwrap();
	assert_eq!(found, json!({ "_id": 1 }));
	assert_eq!(namespace.registry().get(SHARD).map(|r| r.incarnations), Some(2));
	assert_eq!(connector.connect_count(), 2);
	assert_eq!(namespace.pending_wake(SHARD), wake);
	namespace.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn wake_recreates_an_evicted_instance() {
	let connector = MemoryConnector::new();
	let namespace = namespace(&connector, 10);
	namespace.stub(SHARD).execute(payload("users", insert(doc! {}))).await.unwrap();
	namespace.evict(SHARD);
	assert_eq!(namespace.registry().get(SHARD).and_then(|r| r.last_exit), Some("evicted".to_string()));

	tokio::time::sleep(Duration::from_secs(51)).await;

	assert!(namespace.is_live(SHARD));
	assert_eq!(namespace.registry().get(SHARD).map(|r| r.incarnations), Some(2));
	assert!(namespace.pending_wake(SHARD).is_some());
	namespace.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn eviction_keeps_the_keepalive_chain_armed() {
	let connector = MemoryConnector::new();
	let namespace = namespace(&connector, 10);
	namespace.stub(SHARD).execute(payload("users", insert(doc! {}))).await.unwrap();

	// A wake that already left the slot dies with the evicted mailbox.
	namespace.alarm(SHARD).delete();
	assert_eq!(namespace.pending_wake(SHARD), None);
	namespace.evict(SHARD);
	assert!(namespace.pending_wake(SHARD).is_some());

	tokio::time::sleep(Duration::from_secs(51)).await;
	assert!(namespace.is_live(SHARD));
	assert_eq!(namespace.registry().get(SHARD).map(|r| r.incarnations), Some(2));
	assert!(namespace.pending_wake(SHARD).is_some());
	namespace.shutdown().await;
}

#[tokio::test]
async fn unreachable_store_surfaces_connection_errors() {
	let connector = MemoryConnector::new();
	connector.set_reachable(false);
	let stub = namespace(&connector, 10).stub(SHARD);

	let error = stub.execute(payload("users", insert(doc! {}))).await.unwrap_err();
	assert!(matches!(error, Error::Store(StoreError::Connection(_))), "{error}");

	connector.set_reachable(true);
	stub.execute(payload("users", insert(doc! {}))).await.unwrap();
	assert_eq!(connector.documents("app", "users").len(), 1);
}

#[tokio::test]
async fn shut_down_namespace_rejects_calls() {
	let connector = MemoryConnector::new();
	let namespace = namespace(&connector, 10);
	let stub = namespace.stub(SHARD);
	stub.execute(payload("users", insert(doc! {}))).await.unwrap();

	namespace.shutdown().await;

	let error = stub.execute(payload("users", insert(doc! {}))).await.unwrap_err();
	assert!(matches!(error, Error::CoordinatorUnavailable { ref name, .. } if name == SHARD), "{error}");
	assert!(namespace.live_instances().is_empty());
	assert_eq!(namespace.pending_wake(SHARD), None);
}
