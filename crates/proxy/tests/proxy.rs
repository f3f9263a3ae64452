use std::sync::Arc;

use docshard_proxy::{Collection, Database, Error, Outcome, ProxyConfig, ShardKey, TransactionStep};
use docshard_rpc::{Document, Value, doc};
use docshard_store::options::{CountOptions, FindOneAndModifyOptions, InsertManyOptions, ReturnDocument, UpdateOptions};
use docshard_store::{MemoryConnector, Operation, StoreError, TransactionOptions};
use futures::StreamExt;
use pretty_assertions::assert_eq;

fn init_tracing() {
	let _ = tracing_subscriber::fmt()
		.with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
		.with_test_writer()
		.try_init();
}

async fn database(connector: &MemoryConnector, dev_direct: bool) -> Database {
	init_tracing();
	let config = ProxyConfig { dev_direct, ..ProxyConfig::default() };
	Database::connect(&config, Arc::new(connector.clone())).await.unwrap()
}

async fn seed(users: &Collection) {
	let people = vec![
		doc! { "_id" => 1, "name" => "ada", "age" => 36, "tags" => Value::Array(vec!["math".into(), "code".into()]) },
		doc! { "_id" => 2, "name" => "grace", "age" => 85, "tags" => Value::Array(vec!["navy".into(), "code".into()]) },
		doc! { "_id" => 3, "name" => "alan", "age" => 41, "tags" => Value::Array(vec!["math".into()]) },
		doc! { "_id" => 4, "name" => "edsger", "age" => 72 },
	];
	users.insert_many(people, InsertManyOptions::default()).await.unwrap();
}

fn names(docs: &[Document]) -> Vec<String> {
	docs.iter().filter_map(|d| d.get("name").and_then(Value::as_str)).map(str::to_string).collect()
}

/// Runs the same workload through one collection and records every result.
async fn workload(users: &Collection) -> Vec<String> {
	seed(users).await;
	let mut log = Vec::new();

	let oldest = users.find(doc! {}).sort(doc! { "age" => -1 }).limit(2).to_array().await.unwrap();
	log.push(format!("{:?}", names(&oldest)));

	let updated = users
		.find_one_and_update(
			doc! { "_id" => 3 },
			doc! { "$inc" => doc! { "age" => 1 } },
			FindOneAndModifyOptions { return_document: Some(ReturnDocument::After), ..Default::default() },
		)
		.await
		.unwrap();
	log.push(format!("{updated:?}"));

	let result = users.update_many(doc! { "age" => doc! { "$gt" => 70 } }, doc! { "$set" => doc! { "senior" => true } }, UpdateOptions::default()).await.unwrap();
	log.push(format!("{result:?}"));

	let tags = users.distinct("tags", doc! {}, Default::default()).await.unwrap();
	log.push(format!("{tags:?}"));

	let grouped = users
		.aggregate(vec![])
		.filter(doc! { "age" => doc! { "$lt" => 80 } })
		.group(doc! { "_id" => Value::Null, "total" => doc! { "$sum" => "$age" } })
		.to_array()
		.await
		.unwrap();
	log.push(format!("{grouped:?}"));

	let deleted = users.delete_many(doc! { "senior" => true }, Default::default()).await.unwrap();
	log.push(format!("{deleted:?}"));
	log.push(users.count_documents(doc! {}, CountOptions::default()).await.unwrap().to_string());
	log
}

#[tokio::test]
async fn direct_and_sharded_modes_agree() {
	let sharded = database(&MemoryConnector::new(), false).await;
	let direct = database(&MemoryConnector::new(), true).await;
	let key = ShardKey::from("tenant-1");

	let remote = workload(&sharded.collection("users", Some(&key))).await;
	let local = workload(&direct.collection("users", None)).await;

	assert_eq!(remote, local);
	assert_eq!(remote[0], r#"["grace", "edsger"]"#);
	assert_eq!(remote.last().map(String::as_str), Some("2"));
	sharded.shutdown().await;
}

#[tokio::test]
async fn cursor_terminals_are_repeatable() {
	let connector = MemoryConnector::new();
	let db = database(&connector, false).await;
	let users = db.collection("users", Some(&ShardKey::from(7)));
	seed(&users).await;

	let cursor = users.find(doc! { "age" => doc! { "$gt" => 40 } }).sort(doc! { "age" => 1 }).skip(1).limit(2);
	let first = cursor.to_array().await.unwrap();
	assert_eq!(names(&first), vec!["edsger", "grace"]);
	assert_eq!(cursor.to_array().await.unwrap(), first);
	assert_eq!(cursor.count().await.unwrap(), 2);
	assert_eq!(cursor.next().await.unwrap().as_ref(), first.first());

	let streamed: Vec<Document> = cursor.stream().await.unwrap().collect().await;
	assert_eq!(streamed, first);

	let none = users.find(doc! { "name" => "nobody" }).next().await.unwrap();
	assert_eq!(none, None);
	db.shutdown().await;
}

#[tokio::test]
async fn aggregate_next_leaves_the_pipeline_alone() {
	let db = database(&MemoryConnector::new(), true).await;
	let users = db.collection("users", None);
	seed(&users).await;

	let cursor = users.aggregate(vec![doc! { "$sort" => doc! { "age" => 1 } }]).project(doc! { "name" => 1, "_id" => 0 });
	let before = cursor.pipeline();
	let first = cursor.next().await.unwrap();

	assert_eq!(first, Some(doc! { "name" => "ada" }));
	assert_eq!(cursor.pipeline(), before);
	assert_eq!(cursor.to_array().await.unwrap().len(), 4);
}

#[tokio::test]
async fn insert_one_generates_an_id_through_the_wire() {
	let db = database(&MemoryConnector::new(), false).await;
	let users = db.collection("users", Some(&ShardKey::from("u")));

	let inserted = users.insert_one(doc! { "name" => "barbara" }, Default::default()).await.unwrap();
	assert!(matches!(inserted.inserted_id, Value::ObjectId(_)));

	let found = users.find_one(doc! { "_id" => inserted.inserted_id.clone() }, Default::default()).await.unwrap();
	assert_eq!(found.and_then(|d| d.get("name").cloned()), Some(Value::from("barbara")));
	db.shutdown().await;
}

#[tokio::test]
async fn same_key_reaches_same_coordinator() {
	let connector = MemoryConnector::new();
	let db = database(&connector, false).await;
	let key = ShardKey::from("user:42");
	let router = db.router().unwrap();
	let instance = router.instance_name(router.route(Some(&key)));

	db.collection("users", Some(&key)).insert_one(doc! { "_id" => 1 }, Default::default()).await.unwrap();
	db.collection("orders", Some(&key)).insert_one(doc! { "_id" => 1 }, Default::default()).await.unwrap();

	assert_eq!(db.namespace().unwrap().live_instances(), vec![instance]);
	db.shutdown().await;
}

#[tokio::test]
async fn keyless_collection_sticks_to_one_shard() {
	let connector = MemoryConnector::new();
	let db = database(&connector, false).await;
	let items = db.collection("items", None);

	for id in 0..10 {
		items.insert_one(doc! { "_id" => id }, Default::default()).await.unwrap();
	}

	assert_eq!(db.namespace().unwrap().live_instances().len(), 1);
	assert_eq!(items.count_documents(doc! {}, Default::default()).await.unwrap(), 10);
	db.shutdown().await;
}

fn transfer(from: i32, to: i32, amount: i32) -> Vec<TransactionStep> {
	let update = |id: i32, delta: i32| Operation::UpdateOne {
		filter: doc! { "_id" => id },
		update: doc! { "$inc" => doc! { "balance" => delta } },
		options: UpdateOptions::default(),
	};
	vec![
		TransactionStep::new("accounts", update(from, -amount)),
		TransactionStep::new("accounts", update(to, amount)),
		TransactionStep::new("ledger", Operation::InsertOne { document: doc! { "from" => from, "to" => to, "amount" => amount }, options: Default::default() }),
	]
}

#[tokio::test]
async fn transactions_commit_every_step_or_none() {
	for dev_direct in [false, true] {
		let connector = MemoryConnector::new();
		let db = database(&connector, dev_direct).await;
		let key = ShardKey::from("bank");
		let accounts = db.collection("accounts", Some(&key));
		accounts
			.insert_many(vec![doc! { "_id" => 1, "balance" => 100 }, doc! { "_id" => 2, "balance" => 0 }], Default::default())
			.await
			.unwrap();

		let outcomes = db.run_transaction(transfer(1, 2, 30), TransactionOptions::default(), Some(&key)).await.unwrap();
		assert_eq!(outcomes.len(), 3);
		assert!(matches!(&outcomes[0], Outcome::Update(result) if result.modified_count == 1));
		assert!(matches!(&outcomes[2], Outcome::InsertOne(_)));

		let mut failing = transfer(1, 2, 50);
		failing.push(TransactionStep::new("accounts", Operation::InsertOne { document: doc! { "_id" => 1 }, options: Default::default() }));
		let error = db.run_transaction(failing, TransactionOptions::default(), Some(&key)).await.unwrap_err();
		assert!(matches!(error, Error::Store(StoreError::Operation { code: 11000, .. })), "{error}");

		let balances: Vec<_> = connector.documents("app", "accounts").iter().map(|d| d.get("balance").cloned()).collect();
		assert_eq!(balances, vec![Some(Value::from(70)), Some(Value::from(30))]);
		assert_eq!(connector.documents("app", "ledger").len(), 1);
		db.shutdown().await;
	}
}

#[tokio::test]
async fn invalid_config_is_rejected_before_connecting() {
	let connector = MemoryConnector::new();
	let config = ProxyConfig { shards: 0, dev_direct: true, ..ProxyConfig::default() };
	let result = Database::connect(&config, Arc::new(connector.clone())).await;
	assert!(matches!(result, Err(Error::Config(_))));
	assert_eq!(connector.connect_count(), 0);
}
