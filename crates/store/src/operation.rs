//! Typed operations and their positional wire form.

use docshard_rpc::codec::{self, serialize_document};
use docshard_rpc::{Document, OperationKind, ProtocolError, Value};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;

use crate::SessionId;
use crate::options::{
	AggregateOptions, CountOptions, DeleteOptions, DistinctOptions, FindOneAndDeleteOptions, FindOneAndModifyOptions, FindOptions, InsertManyOptions,
	InsertOneOptions, UpdateOptions,
};

/// One data operation against a collection.
#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
	FindOne { filter: Document, options: FindOptions },
	Find { filter: Document, options: FindOptions },
	FindOneAndUpdate { filter: Document, update: Document, options: FindOneAndModifyOptions },
	FindOneAndDelete { filter: Document, options: FindOneAndDeleteOptions },
	FindOneAndReplace { filter: Document, replacement: Document, options: FindOneAndModifyOptions },
	InsertOne { document: Document, options: InsertOneOptions },
	InsertMany { documents: Vec<Document>, options: InsertManyOptions },
	UpdateOne { filter: Document, update: Document, options: UpdateOptions },
	UpdateMany { filter: Document, update: Document, options: UpdateOptions },
	DeleteOne { filter: Document, options: DeleteOptions },
	DeleteMany { filter: Document, options: DeleteOptions },
	Aggregate { pipeline: Vec<Document>, options: AggregateOptions },
	Distinct { field: String, filter: Document, options: DistinctOptions },
	CountDocuments { filter: Document, options: CountOptions },
}

impl Operation {
	/// Wire kind of this operation.
	pub fn kind(&self) -> OperationKind {
		match self {
			Operation::FindOne { .. } => OperationKind::FindOne,
			Operation::Find { .. } => OperationKind::Find,
			Operation::FindOneAndUpdate { .. } => OperationKind::FindOneAndUpdate,
			Operation::FindOneAndDelete { .. } => OperationKind::FindOneAndDelete,
			Operation::FindOneAndReplace { .. } => OperationKind::FindOneAndReplace,
			Operation::InsertOne { .. } => OperationKind::InsertOne,
			Operation::InsertMany { .. } => OperationKind::InsertMany,
			Operation::UpdateOne { .. } => OperationKind::UpdateOne,
			Operation::UpdateMany { .. } => OperationKind::UpdateMany,
			Operation::DeleteOne { .. } => OperationKind::DeleteOne,
			Operation::DeleteMany { .. } => OperationKind::DeleteMany,
			Operation::Aggregate { .. } => OperationKind::Aggregate,
			Operation::Distinct { .. } => OperationKind::Distinct,
			Operation::CountDocuments { .. } => OperationKind::CountDocuments,
		}
	}

	/// Session bound into the options record, if any.
	pub fn session(&self) -> Option<SessionId> {
		match self {
			Operation::FindOne { options, .. } | Operation::Find { options, .. } => options.session,
			Operation::FindOneAndUpdate { options, .. } | Operation::FindOneAndReplace { options, .. } => options.session,
			Operation::FindOneAndDelete { options, .. } => options.session,
			Operation::InsertOne { options, .. } => options.session,
			Operation::InsertMany { options, .. } => options.session,
			Operation::UpdateOne { options, .. } | Operation::UpdateMany { options, .. } => options.session,
			Operation::DeleteOne { options, .. } | Operation::DeleteMany { options, .. } => options.session,
			Operation::Aggregate { options, .. } => options.session,
			Operation::Distinct { options, .. } => options.session,
			Operation::CountDocuments { options, .. } => options.session,
		}
	}

	/// Binds `session` into the options record at [`OperationKind::session_slot`],
	/// keeping every other option as it was.
	pub fn attach_session(&mut self, session: SessionId) {
		let slot = match self {
			Operation::FindOne { options, .. } | Operation::Find { options, .. } => &mut options.session,
			Operation::FindOneAndUpdate { options, .. } | Operation::FindOneAndReplace { options, .. } => &mut options.session,
			Operation::FindOneAndDelete { options, .. } => &mut options.session,
			Operation::InsertOne { options, .. } => &mut options.session,
			Operation::InsertMany { options, .. } => &mut options.session,
			Operation::UpdateOne { options, .. } | Operation::UpdateMany { options, .. } => &mut options.session,
			Operation::DeleteOne { options, .. } | Operation::DeleteMany { options, .. } => &mut options.session,
			Operation::Aggregate { options, .. } => &mut options.session,
			Operation::Distinct { options, .. } => &mut options.session,
			Operation::CountDocuments { options, .. } => &mut options.session,
		};
		*slot = Some(session);
	}

	/// Returns the operation with `session` bound.
	pub fn with_session(mut self, session: SessionId) -> Self {
		self.attach_session(session);
		self
	}

	/// Decodes codec-encoded positional arguments.
	///
	/// Missing trailing arguments take their driver defaults (empty filter,
	/// default options). Arguments past the options slot are ignored with a
	/// warning.
	pub fn from_args(kind: OperationKind, args: Vec<JsonValue>) -> Result<Self, ProtocolError> {
		if args.len() > kind.arity() {
			tracing::warn!(op = %kind, given = args.len(), accepted = kind.arity(), "operation.args.extra");
		}
		let mut args = Args { kind, items: args.into_iter().take(kind.arity()).map(Some).collect(), index: 0 };

		let op = match kind {
			OperationKind::FindOne => Operation::FindOne { filter: args.filter()?, options: args.options()? },
			OperationKind::Find => Operation::Find { filter: args.filter()?, options: args.options()? },
			OperationKind::FindOneAndUpdate => Operation::FindOneAndUpdate {
				filter: args.filter()?,
				update: args.required_document("update")?,
				options: args.options()?,
			},
			OperationKind::FindOneAndDelete => Operation::FindOneAndDelete { filter: args.filter()?, options: args.options()? },
			OperationKind::FindOneAndReplace => Operation::FindOneAndReplace {
				filter: args.filter()?,
				replacement: args.required_document("replacement")?,
				options: args.options()?,
			},
			OperationKind::InsertOne => Operation::InsertOne { document: args.required_document("document")?, options: args.options()? },
			OperationKind::InsertMany => Operation::InsertMany { documents: args.document_list("documents")?, options: args.options()? },
			OperationKind::UpdateOne => Operation::UpdateOne {
				filter: args.filter()?,
				update: args.required_document("update")?,
				options: args.options()?,
			},
			OperationKind::UpdateMany => Operation::UpdateMany {
				filter: args.filter()?,
				update: args.required_document("update")?,
				options: args.options()?,
			},
			OperationKind::DeleteOne => Operation::DeleteOne { filter: args.filter()?, options: args.options()? },
			OperationKind::DeleteMany => Operation::DeleteMany { filter: args.filter()?, options: args.options()? },
			OperationKind::Aggregate => Operation::Aggregate { pipeline: args.document_list("pipeline")?, options: args.options()? },
			OperationKind::Distinct => Operation::Distinct { field: args.field()?, filter: args.filter()?, options: args.options()? },
			OperationKind::CountDocuments => Operation::CountDocuments { filter: args.filter()?, options: args.options()? },
		};
		Ok(op)
	}

	/// Encodes the operation as positional arguments. Sessions are not encoded;
	/// an options record with nothing set is left off the end.
	pub fn to_args(&self) -> Vec<JsonValue> {
		let mut args = match self {
			Operation::FindOne { filter, options } | Operation::Find { filter, options } => vec![serialize_document(filter), options_json(options)],
			Operation::FindOneAndUpdate { filter, update, options } => vec![serialize_document(filter), serialize_document(update), options_json(options)],
			Operation::FindOneAndDelete { filter, options } => vec![serialize_document(filter), options_json(options)],
			Operation::FindOneAndReplace { filter, replacement, options } => {
				vec![serialize_document(filter), serialize_document(replacement), options_json(options)]
			}
			Operation::InsertOne { document, options } => vec![serialize_document(document), options_json(options)],
			Operation::InsertMany { documents, options } => vec![document_list_json(documents), options_json(options)],
			Operation::UpdateOne { filter, update, options } | Operation::UpdateMany { filter, update, options } => {
				vec![serialize_document(filter), serialize_document(update), options_json(options)]
			}
			Operation::DeleteOne { filter, options } | Operation::DeleteMany { filter, options } => vec![serialize_document(filter), options_json(options)],
			Operation::Aggregate { pipeline, options } => vec![document_list_json(pipeline), options_json(options)],
			Operation::Distinct { field, filter, options } => vec![JsonValue::String(field.clone()), serialize_document(filter), options_json(options)],
			Operation::CountDocuments { filter, options } => vec![serialize_document(filter), options_json(options)],
		};
		if args.last().and_then(JsonValue::as_object).is_some_and(|o| o.is_empty()) {
			args.pop();
		}
		args
	}
}

fn options_json<T: Serialize>(options: &T) -> JsonValue {
	serde_json::to_value(options).unwrap_or_else(|error| {
		tracing::warn!(%error, "operation.options.encode_failed");
		JsonValue::Object(Default::default())
	})
}

fn document_list_json(docs: &[Document]) -> JsonValue {
	JsonValue::Array(docs.iter().map(serialize_document).collect())
}

struct Args {
	kind: OperationKind,
	items: Vec<Option<JsonValue>>,
	index: usize,
}

impl Args {
	fn next(&mut self) -> (usize, Option<JsonValue>) {
		let index = self.index;
		self.index += 1;
		let value = self.items.get_mut(index).and_then(Option::take).filter(|v| !v.is_null());
		(index, value)
	}

	fn invalid(&self, index: usize, what: &str, got: &Value) -> ProtocolError {
		ProtocolError::InvalidPayload(format!("{}: argument {index} ({what}) must be a document, got {}", self.kind, got.type_name()))
	}

	fn filter(&mut self) -> Result<Document, ProtocolError> {
		match self.next() {
			(_, None) => Ok(Document::new()),
			(index, Some(json)) => match codec::deserialize(&json) {
				Value::Document(doc) => Ok(doc),
				other => Err(self.invalid(index, "filter", &other)),
			},
		}
	}

	fn required_document(&mut self, what: &str) -> Result<Document, ProtocolError> {
		match self.next() {
			(index, None) => Err(ProtocolError::InvalidPayload(format!("{}: missing argument {index} ({what})", self.kind))),
			(index, Some(json)) => match codec::deserialize(&json) {
				Value::Document(doc) => Ok(doc),
				other => Err(self.invalid(index, what, &other)),
			},
		}
	}

	fn document_list(&mut self, what: &str) -> Result<Vec<Document>, ProtocolError> {
		let (index, json) = self.next();
		let Some(json) = json else {
			return Err(ProtocolError::InvalidPayload(format!("{}: missing argument {index} ({what})", self.kind)));
		};
		let Value::Array(items) = codec::deserialize(&json) else {
			return Err(ProtocolError::InvalidPayload(format!("{}: argument {index} ({what}) must be an array", self.kind)));
		};
		items
			.into_iter()
			.map(|item| match item {
				Value::Document(doc) => Ok(doc),
				other => Err(self.invalid(index, what, &other)),
			})
			.collect()
	}

	fn field(&mut self) -> Result<String, ProtocolError> {
		match self.next() {
			(_, Some(JsonValue::String(field))) => Ok(field),
			(index, _) => Err(ProtocolError::InvalidPayload(format!("{}: argument {index} (key) must be a string", self.kind))),
		}
	}

	fn options<T: DeserializeOwned + Default>(&mut self) -> Result<T, ProtocolError> {
		match self.next() {
			(_, None) => Ok(T::default()),
			(index, Some(json)) => serde_json::from_value(json)
				.map_err(|error| ProtocolError::InvalidPayload(format!("{}: argument {index} (options): {error}", self.kind))),
		}
	}
}
