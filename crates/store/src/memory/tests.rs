use std::sync::Arc;

use docshard_rpc::{Document, Value, doc};
use pretty_assertions::assert_eq;

use super::MemoryConnector;
use crate::error::codes;
use crate::options::{FindOneAndModifyOptions, FindOptions, InsertManyOptions, ReturnDocument, UpdateOptions};
use crate::{DocumentStore, Operation, Outcome, PoolOptions, StoreConnector, StoreError, Transaction, TransactionOptions};

async fn connect(connector: &MemoryConnector) -> Arc<dyn DocumentStore> {
	connector.connect("app", PoolOptions::default()).await.unwrap()
}

fn insert(document: Document) -> Operation {
	Operation::InsertOne { document, options: Default::default() }
}

fn find(filter: Document) -> Operation {
	Operation::Find { filter, options: FindOptions::default() }
}

async fn all(store: &Arc<dyn DocumentStore>, collection: &str) -> Vec<Document> {
	match store.execute(collection, find(Document::new())).await.unwrap() {
		Outcome::Documents(docs) => docs,
		other => panic!("unexpected outcome {other:?}"),
	}
}

#[tokio::test]
async fn insert_generates_leading_object_id() {
	let connector = MemoryConnector::new();
	let store = connect(&connector).await;
	let Outcome::InsertOne(result) = store.execute("users", insert(doc! { "name" => "ada" })).await.unwrap() else {
		panic!("expected insertOne result");
	};
	assert!(matches!(result.inserted_id, Value::ObjectId(_)));
	let docs = connector.documents("app", "users");
	assert_eq!(docs.len(), 1);
	assert_eq!(docs[0].keys().next().map(String::as_str), Some("_id"));
	assert_eq!(docs[0].get("_id"), Some(&result.inserted_id));
}

#[tokio::test]
async fn duplicate_id_is_rejected() {
	let store = connect(&MemoryConnector::new()).await;
	store.execute("users", insert(doc! { "_id" => 1 })).await.unwrap();
	let error = store.execute("users", insert(doc! { "_id" => 1 })).await.unwrap_err();
	assert_eq!(error.code(), Some(codes::DUPLICATE_KEY));
}

#[tokio::test]
async fn unordered_insert_many_keeps_going() {
	let connector = MemoryConnector::new();
	let store = connect(&connector).await;
	let op = |ordered| Operation::InsertMany {
		documents: vec![doc! { "_id" => 1 }, doc! { "_id" => 1 }, doc! { "_id" => 2 }],
		options: InsertManyOptions { ordered: Some(ordered), ..Default::default() },
	};
	assert!(store.execute("ordered", op(true)).await.is_err());
	assert_eq!(connector.documents("app", "ordered").len(), 1);
	assert!(store.execute("unordered", op(false)).await.is_err());
	assert_eq!(connector.documents("app", "unordered").len(), 2);
}

#[tokio::test]
async fn find_sorts_skips_and_limits() {
	let store = connect(&MemoryConnector::new()).await;
	for n in [3, 1, 4, 1, 5] {
		store.execute("nums", insert(doc! { "n" => n })).await.unwrap();
	}
	let op = Operation::Find {
		filter: doc! { "n" => doc! { "$gt" => 1 } },
		options: FindOptions {
			sort: Some(doc! { "n" => -1 }),
			skip: Some(1),
			limit: Some(-5),
			projection: Some(doc! { "_id" => 0 }),
			..Default::default()
		},
	};
	let Outcome::Documents(docs) = store.execute("nums", op).await.unwrap() else {
		panic!("expected documents");
	};
	assert_eq!(docs, vec![doc! { "n" => 4 }, doc! { "n" => 3 }]);
}

#[tokio::test]
async fn find_one_and_update_returns_requested_image() {
	let store = connect(&MemoryConnector::new()).await;
	store.execute("counters", insert(doc! { "_id" => "hits", "n" => 1 })).await.unwrap();
	let op = |return_document| Operation::FindOneAndUpdate {
		filter: doc! { "_id" => "hits" },
		update: doc! { "$inc" => doc! { "n" => 1 } },
		options: FindOneAndModifyOptions { return_document: Some(return_document), ..Default::default() },
	};
	let before = store.execute("counters", op(ReturnDocument::Before)).await.unwrap();
	assert_eq!(before, Outcome::Document(Some(doc! { "_id" => "hits", "n" => 1 })));
	let after = store.execute("counters", op(ReturnDocument::After)).await.unwrap();
	assert_eq!(after, Outcome::Document(Some(doc! { "_id" => "hits", "n" => 3 })));
}

#[tokio::test]
async fn upsert_reports_generated_id() {
	let connector = MemoryConnector::new();
	let store = connect(&connector).await;
	let op = Operation::UpdateOne {
		filter: doc! { "email" => "a@b" },
		update: doc! { "$set" => doc! { "name" => "ada" } },
		options: UpdateOptions { upsert: Some(true), ..Default::default() },
	};
	let Outcome::Update(result) = store.execute("users", op).await.unwrap() else {
		panic!("expected update result");
	};
	assert_eq!((result.matched_count, result.modified_count, result.upserted_count), (0, 0, 1));
	let docs = connector.documents("app", "users");
	assert_eq!(docs[0].get("_id"), result.upserted_id.as_ref());
	assert_eq!(docs[0].get("email"), Some(&Value::from("a@b")));
}

#[tokio::test]
async fn committed_transaction_applies_all_writes() {
	let connector = MemoryConnector::new();
	let store = connect(&connector).await;
	let txn = Transaction::start(Arc::clone(&store), TransactionOptions::default()).await.unwrap();
	txn.execute("a", insert(doc! { "_id" => 1 })).await.unwrap();
	txn.execute("b", insert(doc! { "_id" => 2 })).await.unwrap();

	// Invisible outside the transaction until commit.
	assert!(all(&store, "a").await.is_empty());
	let inside = txn.execute("a", find(Document::new())).await.unwrap();
	assert_eq!(inside, Outcome::Documents(vec![doc! { "_id" => 1 }]));

	txn.commit().await.unwrap();
	assert_eq!(all(&store, "a").await, vec![doc! { "_id" => 1 }]);
	assert_eq!(all(&store, "b").await, vec![doc! { "_id" => 2 }]);
}

#[tokio::test]
async fn aborted_transaction_leaves_nothing_behind() {
	let connector = MemoryConnector::new();
	let store = connect(&connector).await;
	let txn = Transaction::start(Arc::clone(&store), TransactionOptions::default()).await.unwrap();
	txn.execute("a", insert(doc! { "_id" => 1 })).await.unwrap();
	txn.abort().await;
	assert!(connector.documents("app", "a").is_empty());
}

#[tokio::test]
async fn failed_op_poisons_the_transaction() {
	let store = connect(&MemoryConnector::new()).await;
	let txn = Transaction::start(Arc::clone(&store), TransactionOptions::default()).await.unwrap();
	txn.execute("a", insert(doc! { "_id" => 1 })).await.unwrap();
	assert!(txn.execute("a", insert(doc! { "_id" => 1 })).await.is_err());
	assert!(matches!(txn.execute("a", find(Document::new())).await, Err(StoreError::TransactionAborted)));
	assert!(matches!(txn.commit().await, Err(StoreError::TransactionAborted)));
	assert!(all(&store, "a").await.is_empty());
}

#[tokio::test]
async fn concurrent_write_fails_commit() {
	let connector = MemoryConnector::new();
	let store = connect(&connector).await;
	let txn = Transaction::start(Arc::clone(&store), TransactionOptions::default()).await.unwrap();
	txn.execute("a", insert(doc! { "_id" => 1 })).await.unwrap();
	txn.execute("b", insert(doc! { "_id" => 1 })).await.unwrap();

	store.execute("b", insert(doc! { "_id" => "outside" })).await.unwrap();

	let error = txn.commit().await.unwrap_err();
	assert!(matches!(&error, StoreError::WriteConflict { collection } if collection == "b"));
	assert!(connector.documents("app", "a").is_empty());
	assert_eq!(connector.documents("app", "b"), vec![doc! { "_id" => "outside" }]);
}

#[tokio::test]
async fn reads_elsewhere_do_not_conflict() {
	let store = connect(&MemoryConnector::new()).await;
	let txn = Transaction::start(Arc::clone(&store), TransactionOptions::default()).await.unwrap();
	txn.execute("a", insert(doc! { "_id" => 1 })).await.unwrap();
	store.execute("other", insert(doc! { "_id" => 1 })).await.unwrap();
	all(&store, "a").await;
	txn.commit().await.unwrap();
	assert_eq!(all(&store, "a").await.len(), 1);
}

#[tokio::test]
async fn second_transaction_on_a_session_is_rejected() {
	let store = connect(&MemoryConnector::new()).await;
	let session = store.start_session().await.unwrap();
	store.start_transaction(session, TransactionOptions::default()).await.unwrap();
	assert!(matches!(
		store.start_transaction(session, TransactionOptions::default()).await,
		Err(StoreError::InvalidArgument(_))
	));
	store.end_session(session).await;
	assert!(matches!(store.commit_transaction(session).await, Err(StoreError::NoSuchSession(_))));
}

#[tokio::test]
async fn unreachable_server_fails_connect_ping_and_ops() {
	let connector = MemoryConnector::new();
	let store = connect(&connector).await;
	connector.set_reachable(false);
	assert!(matches!(store.ping().await, Err(StoreError::Connection(_))));
	assert!(matches!(store.execute("a", find(Document::new())).await, Err(StoreError::Connection(_))));
	assert!(matches!(connector.connect("app", PoolOptions::default()).await, Err(StoreError::Connection(_))));
	connector.set_reachable(true);
	store.ping().await.unwrap();
	assert_eq!((connector.connect_count(), connector.ping_count()), (2, 2));
}

#[tokio::test]
async fn aggregate_out_replaces_target() {
	let connector = MemoryConnector::new();
	let store = connect(&connector).await;
	for (k, n) in [("x", 1), ("y", 2), ("x", 3)] {
		store.execute("events", insert(doc! { "k" => k, "n" => n })).await.unwrap();
	}
	let op = Operation::Aggregate {
		pipeline: vec![
			doc! { "$group" => doc! { "_id" => "$k", "total" => doc! { "$sum" => "$n" } } },
			doc! { "$sort" => doc! { "_id" => 1 } },
			doc! { "$out" => "totals" },
		],
		options: Default::default(),
	};
	assert_eq!(store.execute("events", op).await.unwrap(), Outcome::Documents(Vec::new()));
	assert_eq!(
		connector.documents("app", "totals"),
		vec![doc! { "_id" => "x", "total" => 4 }, doc! { "_id" => "y", "total" => 2 }]
	);
}

#[tokio::test]
async fn distinct_flattens_arrays() {
	let store = connect(&MemoryConnector::new()).await;
	store.execute("posts", insert(doc! { "tags" => vec!["a", "b"] })).await.unwrap();
	store.execute("posts", insert(doc! { "tags" => "b" })).await.unwrap();
	store.execute("posts", insert(doc! { "tags" => vec!["c"] })).await.unwrap();
	let op = Operation::Distinct { field: "tags".to_string(), filter: Document::new(), options: Default::default() };
	assert_eq!(store.execute("posts", op).await.unwrap(), Outcome::Values(vec!["a".into(), "b".into(), "c".into()]));
}
