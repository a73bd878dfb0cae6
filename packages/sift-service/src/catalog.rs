//! In-process catalog.
//!
//! Holds decoded records in insertion order and runs every plan stage with the local executor.
//! Used by tests and small deployments that load a fixture file instead of Postgres.

use serde_json::Value;

use sift_domain::{
	local::{self, LocalOutput},
	plan::Stage,
	record::{Candidate, ProductRecord},
};

use crate::{BoxFuture, CatalogStore, Error, Result};

pub struct MemoryCatalog {
	records: Vec<ProductRecord>,
	native_relevance: bool,
}
impl MemoryCatalog {
	/// Records without an `_id` get their 1-based position, like a serial key.
	pub fn new(records: Vec<ProductRecord>) -> Self {
		let records = records
			.into_iter()
			.enumerate()
			.map(|(idx, mut record)| {
				record.ensure_id(idx as u64 + 1);

				record
			})
			.collect();

		Self { records, native_relevance: true }
	}

	pub fn from_documents(docs: Vec<Value>) -> Result<Self> {
		let records = docs
			.into_iter()
			.enumerate()
			.map(|(idx, doc)| {
				serde_json::from_value(doc).map_err(|err| Error::Datastore {
					message: format!("Failed to decode product at position {idx}: {err}"),
				})
			})
			.collect::<Result<Vec<ProductRecord>>>()?;

		Ok(Self::new(records))
	}

	/// Behaves like a plain filter store: no text-relevance score on fetched candidates.
	pub fn without_relevance(self) -> Self {
		Self { native_relevance: false, ..self }
	}

	pub fn len(&self) -> usize {
		self.records.len()
	}

	pub fn is_empty(&self) -> bool {
		self.records.is_empty()
	}

	fn candidates(&self) -> Vec<Candidate> {
		self.records
			.iter()
			.enumerate()
			.map(|(ordinal, record)| Candidate {
				record: record.clone(),
				ordinal: ordinal as u64,
				text_score: None,
			})
			.collect()
	}

	fn run_fetch(&self, stages: &[Stage]) -> Result<Vec<Candidate>> {
		match local::execute(stages, self.candidates()) {
			LocalOutput::Candidates(mut items) => {
				if !self.native_relevance {
					for item in &mut items {
						item.text_score = None;
					}
				}

				Ok(items)
			},
			LocalOutput::Count(_) => Err(Error::Datastore {
				message: "Fetch stages must not end in a count.".to_string(),
			}),
		}
	}

	fn run_count(&self, stages: &[Stage]) -> Result<u64> {
		match local::execute(stages, self.candidates()) {
			LocalOutput::Count(count) => Ok(count),
			LocalOutput::Candidates(_) =>
				Err(Error::Datastore { message: "Count stages must end in a count.".to_string() }),
		}
	}
}
impl CatalogStore for MemoryCatalog {
	fn native_relevance(&self) -> bool {
		self.native_relevance
	}

	fn fetch<'a>(&'a self, stages: &'a [Stage]) -> BoxFuture<'a, Result<Vec<Candidate>>> {
		Box::pin(async move { self.run_fetch(stages) })
	}

	fn count<'a>(&'a self, stages: &'a [Stage]) -> BoxFuture<'a, Result<u64>> {
		Box::pin(async move { self.run_count(stages) })
	}
}
