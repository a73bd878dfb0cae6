use serde::Deserialize;
use serde_json::{Map, Value};

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
	pub service: Service,
	pub storage: Storage,
	pub search: Search,
	pub currency: Currency,
	pub rerank: Rerank,
	pub providers: Providers,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Service {
	pub http_bind: String,
	pub log_level: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Storage {
	pub postgres: Postgres,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Postgres {
	pub dsn: String,
	pub pool_max_conns: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Search {
	pub page_size: u32,
	/// Either "paged" (`{items, totalCount, page, totalPages}`) or "items" (bare array).
	#[serde(default = "default_response_mode")]
	pub response_mode: String,
	/// Adds the normalized numeric views and the final score to every returned item.
	#[serde(default = "default_true")]
	pub merge_normalized: bool,
	/// Where normalization, filtering, sorting and pagination run: "datastore" or "local".
	#[serde(default = "default_derive")]
	pub derive: String,
	/// Upper bound on raw matches pulled from the datastore when `derive = "local"`.
	#[serde(default = "default_max_local_candidates")]
	pub max_local_candidates: u32,
	#[serde(default)]
	pub matching: SearchMatching,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SearchMatching {
	pub phrase_boost: f32,
	pub fuzzy_enabled: bool,
	pub fuzzy_boost: f32,
	/// Edit distance tolerated per word by the in-memory matcher.
	pub fuzzy_max_edits: u32,
	/// Trigram word similarity required by the Postgres matcher.
	pub fuzzy_min_similarity: f32,
	pub category_enabled: bool,
	pub category_boost: f32,
}
impl Default for SearchMatching {
	fn default() -> Self {
		Self {
			phrase_boost: 3.0,
			fuzzy_enabled: true,
			fuzzy_boost: 1.5,
			fuzzy_max_edits: 1,
			fuzzy_min_similarity: 0.5,
			category_enabled: true,
			category_boost: 0.5,
		}
	}
}

#[derive(Debug, Clone, Deserialize)]
pub struct Currency {
	pub stored: String,
	pub display: String,
	/// Display units per stored unit.
	pub rate: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Rerank {
	pub enabled: bool,
	pub candidate_limit: u32,
	pub top_k: u32,
	pub deadline_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Providers {
	pub rerank: LlmProviderConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LlmProviderConfig {
	pub provider_id: String,
	/// Wire format of the generation endpoint: "openai" or "gemini".
	pub api_style: String,
	pub api_base: String,
	pub api_key: String,
	pub path: String,
	pub model: String,
	pub temperature: f32,
	pub timeout_ms: u64,
	#[serde(default)]
	pub default_headers: Map<String, Value>,
}

fn default_response_mode() -> String {
	"paged".to_string()
}

fn default_derive() -> String {
	"datastore".to_string()
}

fn default_max_local_candidates() -> u32 {
	5_000
}

fn default_true() -> bool {
	true
}
