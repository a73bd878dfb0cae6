use std::{fs, path::Path, sync::Arc};

use serde_json::Value;

use sift_config::Config;
use sift_service::{MemoryCatalog, ResponseMode, SearchService};
use sift_storage::{catalog::PgCatalog, db::Db};

#[derive(Clone)]
pub struct AppState {
	pub service: Arc<SearchService>,
	pub response_mode: ResponseMode,
}
impl AppState {
	pub async fn new(config: Config) -> color_eyre::Result<Self> {
		let db = Db::connect(&config.storage.postgres).await?;

		db.ensure_schema().await?;

		let service = SearchService::new(config, Arc::new(PgCatalog::new(db)));

		Ok(Self::from_service(service))
	}

	pub fn from_catalog_file(config: Config, path: &Path) -> color_eyre::Result<Self> {
		let raw = fs::read_to_string(path)?;
		let docs: Vec<Value> = serde_json::from_str(&raw)?;
		let catalog = MemoryCatalog::from_documents(docs)?;

		tracing::info!(path = %path.display(), products = catalog.len(), "Catalog file loaded.");

		Ok(Self::from_service(SearchService::new(config, Arc::new(catalog))))
	}

	pub fn from_service(service: SearchService) -> Self {
		let response_mode = ResponseMode::from_config(&service.cfg.search.response_mode);

		Self { service: Arc::new(service), response_mode }
	}
}
