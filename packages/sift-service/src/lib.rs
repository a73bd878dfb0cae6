pub mod catalog;
pub mod rerank;
pub mod search;

mod error;

pub use catalog::MemoryCatalog;
pub use error::{Error, Result};
pub use search::{PagedResponse, ResponseMode, SearchOutput, SearchRequest, SearchResponse};

use std::{future::Future, pin::Pin, sync::Arc};

use sift_config::{Config, LlmProviderConfig};
use sift_domain::{plan::Stage, record::Candidate};
use sift_providers::llm;
use sift_storage::catalog::PgCatalog;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// A product store that can run retrieval plans.
pub trait CatalogStore
where
	Self: Send + Sync,
{
	/// Whether fetched candidates carry a text-relevance score.
	fn native_relevance(&self) -> bool;

	fn fetch<'a>(&'a self, stages: &'a [Stage]) -> BoxFuture<'a, Result<Vec<Candidate>>>;

	fn count<'a>(&'a self, stages: &'a [Stage]) -> BoxFuture<'a, Result<u64>>;
}

pub trait RerankProvider
where
	Self: Send + Sync,
{
	fn complete<'a>(
		&'a self,
		cfg: &'a LlmProviderConfig,
		system: &'a str,
		user: &'a str,
	) -> BoxFuture<'a, sift_providers::Result<String>>;
}

pub struct SearchService {
	pub cfg: Config,
	pub catalog: Arc<dyn CatalogStore>,
	pub reranker: Arc<dyn RerankProvider>,
}
impl SearchService {
	pub fn new(cfg: Config, catalog: Arc<dyn CatalogStore>) -> Self {
		Self { cfg, catalog, reranker: Arc::new(DefaultProviders) }
	}

	pub fn with_reranker(
		cfg: Config,
		catalog: Arc<dyn CatalogStore>,
		reranker: Arc<dyn RerankProvider>,
	) -> Self {
		Self { cfg, catalog, reranker }
	}
}

struct DefaultProviders;
impl RerankProvider for DefaultProviders {
	fn complete<'a>(
		&'a self,
		cfg: &'a LlmProviderConfig,
		system: &'a str,
		user: &'a str,
	) -> BoxFuture<'a, sift_providers::Result<String>> {
		Box::pin(llm::complete(cfg, system, user))
	}
}

impl CatalogStore for PgCatalog {
	fn native_relevance(&self) -> bool {
		true
	}

	fn fetch<'a>(&'a self, stages: &'a [Stage]) -> BoxFuture<'a, Result<Vec<Candidate>>> {
		Box::pin(async move { Ok(PgCatalog::fetch(self, stages).await?) })
	}

	fn count<'a>(&'a self, stages: &'a [Stage]) -> BoxFuture<'a, Result<u64>> {
		Box::pin(async move { Ok(PgCatalog::count(self, stages).await?) })
	}
}
