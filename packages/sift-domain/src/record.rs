use std::borrow::Cow;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Document keys read for each known field, canonical name first. Datastore adapters use the
/// same lists so pushed-down expressions see the aliases the record accepts.
pub const ID_KEY: &str = "_id";
pub const TITLE_KEYS: &[&str] = &["title", "name"];
pub const PRICE_KEYS: &[&str] = &["price"];
pub const RATING_KEYS: &[&str] = &["stars", "rating"];
pub const REVIEW_KEYS: &[&str] = &["reviews", "reviewCount", "ratingCount"];
pub const CATEGORY_KEYS: &[&str] = &["categoryName", "category"];

/// A product document as stored.
///
/// Field shapes vary between dataset versions: a document may carry a field under several alias
/// keys, numbers as strings, or text as numbers. The document is kept verbatim and the known
/// fields are read through accessors, canonical key first, so decoding only requires a JSON
/// object.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
#[serde(transparent)]
pub struct ProductRecord {
	doc: Map<String, Value>,
}
impl ProductRecord {
	pub fn new(doc: Map<String, Value>) -> Self {
		Self { doc }
	}

	pub fn doc(&self) -> &Map<String, Value> {
		&self.doc
	}

	pub fn to_value(&self) -> Value {
		Value::Object(self.doc.clone())
	}

	pub fn id(&self) -> Option<&Value> {
		self.doc.get(ID_KEY).filter(|value| !value.is_null())
	}

	/// Sets `_id` when the document has none.
	pub fn ensure_id(&mut self, id: impl Into<Value>) {
		if self.id().is_none() {
			self.doc.insert(ID_KEY.to_string(), id.into());
		}
	}

	/// Title text; empty when no title key holds a value.
	pub fn title(&self) -> Cow<'_, str> {
		self.text(TITLE_KEYS).unwrap_or_default()
	}

	pub fn category(&self) -> Option<Cow<'_, str>> {
		self.text(CATEGORY_KEYS)
	}

	pub fn price(&self) -> Option<&Value> {
		self.raw(PRICE_KEYS)
	}

	pub fn stars(&self) -> Option<&Value> {
		self.raw(RATING_KEYS)
	}

	pub fn reviews(&self) -> Option<&Value> {
		self.raw(REVIEW_KEYS)
	}

	/// The value under the first key present, null included.
	fn raw(&self, keys: &[&str]) -> Option<&Value> {
		keys.iter().find_map(|key| self.doc.get(*key))
	}

	/// The first non-null value, rendered as text when it is not a string.
	fn text(&self, keys: &[&str]) -> Option<Cow<'_, str>> {
		keys.iter().find_map(|key| match self.doc.get(*key)? {
			Value::Null => None,
			Value::String(text) => Some(Cow::Borrowed(text.as_str())),
			other => Some(Cow::Owned(other.to_string())),
		})
	}
}
impl From<Map<String, Value>> for ProductRecord {
	fn from(doc: Map<String, Value>) -> Self {
		Self::new(doc)
	}
}

/// A record returned by the retrieval stage, before scoring.
#[derive(Clone, Debug, PartialEq)]
pub struct Candidate {
	pub record: ProductRecord,
	/// Position in datastore retrieval order; ties in final score keep this order.
	pub ordinal: u64,
	/// Native text relevance, when the datastore computes one.
	pub text_score: Option<f64>,
}
