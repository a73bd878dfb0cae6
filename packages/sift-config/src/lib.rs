mod error;
mod types;

pub use error::{Error, Result};
pub use types::{
	Config, Currency, LlmProviderConfig, Postgres, Providers, Rerank, Search, SearchMatching,
	Service, Storage,
};

use std::{fs, path::Path};

pub const MAX_RERANK_CANDIDATES: u32 = 100;

pub fn load(path: &Path) -> Result<Config> {
	let raw = fs::read_to_string(path)
		.map_err(|err| Error::ReadConfig { path: path.to_path_buf(), source: err })?;

	let mut cfg: Config = toml::from_str(&raw)
		.map_err(|err| Error::ParseConfig { path: path.to_path_buf(), source: err })?;

	normalize(&mut cfg);

	validate(&cfg)?;

	Ok(cfg)
}

pub fn validate(cfg: &Config) -> Result<()> {
	if cfg.service.http_bind.trim().is_empty() {
		return Err(Error::Validation {
			message: "service.http_bind must be non-empty.".to_string(),
		});
	}
	if cfg.storage.postgres.pool_max_conns == 0 {
		return Err(Error::Validation {
			message: "storage.postgres.pool_max_conns must be greater than zero.".to_string(),
		});
	}
	if cfg.search.page_size == 0 {
		return Err(Error::Validation {
			message: "search.page_size must be greater than zero.".to_string(),
		});
	}
	if !matches!(cfg.search.response_mode.as_str(), "paged" | "items") {
		return Err(Error::Validation {
			message: "search.response_mode must be one of paged or items.".to_string(),
		});
	}
	if !matches!(cfg.search.derive.as_str(), "datastore" | "local") {
		return Err(Error::Validation {
			message: "search.derive must be one of datastore or local.".to_string(),
		});
	}
	if cfg.search.max_local_candidates == 0 {
		return Err(Error::Validation {
			message: "search.max_local_candidates must be greater than zero.".to_string(),
		});
	}

	let matching = &cfg.search.matching;

	for (label, boost) in [
		("search.matching.phrase_boost", matching.phrase_boost),
		("search.matching.fuzzy_boost", matching.fuzzy_boost),
		("search.matching.category_boost", matching.category_boost),
	] {
		if !boost.is_finite() {
			return Err(Error::Validation { message: format!("{label} must be a finite number.") });
		}
		if boost < 0.0 {
			return Err(Error::Validation { message: format!("{label} must be zero or greater.") });
		}
	}

	if matching.phrase_boost == 0.0 {
		return Err(Error::Validation {
			message: "search.matching.phrase_boost must be greater than zero.".to_string(),
		});
	}
	if !(0.0..=1.0).contains(&matching.fuzzy_min_similarity) {
		return Err(Error::Validation {
			message: "search.matching.fuzzy_min_similarity must be in the range 0.0-1.0."
				.to_string(),
		});
	}
	if !cfg.currency.rate.is_finite() || cfg.currency.rate <= 0.0 {
		return Err(Error::Validation {
			message: "currency.rate must be a finite number greater than zero.".to_string(),
		});
	}

	for (label, code) in
		[("currency.stored", &cfg.currency.stored), ("currency.display", &cfg.currency.display)]
	{
		if code.trim().is_empty() {
			return Err(Error::Validation { message: format!("{label} must be non-empty.") });
		}
	}

	if cfg.rerank.candidate_limit == 0 || cfg.rerank.candidate_limit > MAX_RERANK_CANDIDATES {
		return Err(Error::Validation {
			message: format!(
				"rerank.candidate_limit must be in the range 1-{MAX_RERANK_CANDIDATES}."
			),
		});
	}
	if cfg.rerank.top_k == 0 {
		return Err(Error::Validation {
			message: "rerank.top_k must be greater than zero.".to_string(),
		});
	}
	if cfg.rerank.top_k > cfg.rerank.candidate_limit {
		return Err(Error::Validation {
			message: "rerank.top_k must not exceed rerank.candidate_limit.".to_string(),
		});
	}
	if cfg.rerank.deadline_ms == 0 {
		return Err(Error::Validation {
			message: "rerank.deadline_ms must be greater than zero.".to_string(),
		});
	}

	let provider = &cfg.providers.rerank;

	if !matches!(provider.api_style.as_str(), "openai" | "gemini") {
		return Err(Error::Validation {
			message: "providers.rerank.api_style must be one of openai or gemini.".to_string(),
		});
	}
	if !provider.temperature.is_finite() || provider.temperature < 0.0 {
		return Err(Error::Validation {
			message: "providers.rerank.temperature must be a finite number, zero or greater."
				.to_string(),
		});
	}
	if cfg.rerank.enabled {
		for (label, value) in [
			("providers.rerank.api_base", &provider.api_base),
			("providers.rerank.api_key", &provider.api_key),
			("providers.rerank.model", &provider.model),
		] {
			if value.trim().is_empty() {
				return Err(Error::Validation {
					message: format!("{label} must be non-empty when rerank.enabled is true."),
				});
			}
		}

		if provider.timeout_ms == 0 {
			return Err(Error::Validation {
				message: "providers.rerank.timeout_ms must be greater than zero.".to_string(),
			});
		}
	}

	Ok(())
}

fn normalize(cfg: &mut Config) {
	let provider = &mut cfg.providers.rerank;

	provider.api_style = provider.api_style.trim().to_ascii_lowercase();

	if provider.api_key.trim().is_empty() {
		provider.api_key.clear();
	}

	while provider.api_base.ends_with('/') {
		provider.api_base.pop();
	}

	cfg.search.response_mode = cfg.search.response_mode.trim().to_ascii_lowercase();
	cfg.search.derive = cfg.search.derive.trim().to_ascii_lowercase();
}
