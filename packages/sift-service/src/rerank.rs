//! LLM rerank overlay.
//!
//! The model sees the locally ranked candidate window and answers with a JSON array of the
//! candidates it prefers, best first. The answer is only trusted when every element is one of
//! the candidates it was given, unmodified and at most once.

use std::{sync::LazyLock, time::Duration};

use regex::Regex;
use serde_json::Value;

use sift_config::Config;
use sift_domain::record::ProductRecord;

use crate::RerankProvider;

static FENCE_RE: LazyLock<Regex> =
	LazyLock::new(|| Regex::new(r"```[A-Za-z]*").expect("valid regex"));

#[derive(Debug, thiserror::Error)]
pub enum RerankError {
	#[error("Reranker unavailable: {message}")]
	Unavailable { message: String },
	#[error("Reranker returned an invalid response: {message}")]
	InvalidResponse { message: String },
}
impl From<sift_providers::Error> for RerankError {
	fn from(err: sift_providers::Error) -> Self {
		match err {
			sift_providers::Error::SerdeJson(inner) =>
				Self::InvalidResponse { message: inner.to_string() },
			other => Self::Unavailable { message: other.to_string() },
		}
	}
}

/// Reranks `candidates` and returns the chosen records, best first.
pub async fn rerank(
	provider: &dyn RerankProvider,
	cfg: &Config,
	query_text: &str,
	candidates: &[ProductRecord],
) -> Result<Vec<ProductRecord>, RerankError> {
	let order = rerank_order(provider, cfg, query_text, candidates).await?;

	Ok(order.into_iter().filter_map(|idx| candidates.get(idx).cloned()).collect())
}

/// Reranks `candidates` and returns positions into it, best first, at most `rerank.top_k` long.
///
/// Candidates past `rerank.candidate_limit` are not sent. The provider call runs under the
/// `rerank.deadline_ms` deadline with a single attempt.
pub async fn rerank_order(
	provider: &dyn RerankProvider,
	cfg: &Config,
	query_text: &str,
	candidates: &[ProductRecord],
) -> Result<Vec<usize>, RerankError> {
	if candidates.is_empty() {
		return Ok(Vec::new());
	}

	let limit = (cfg.rerank.candidate_limit as usize).min(candidates.len());
	let window: Vec<Value> = candidates[..limit].iter().map(ProductRecord::to_value).collect();
	let top_k = cfg.rerank.top_k as usize;
	let system = build_system_prompt(top_k);
	let user = build_user_prompt(query_text, &window)?;
	let deadline = Duration::from_millis(cfg.rerank.deadline_ms);
	let raw = tokio::time::timeout(
		deadline,
		provider.complete(&cfg.providers.rerank, &system, &user),
	)
	.await
	.map_err(|_| RerankError::Unavailable {
		message: format!("No answer within {} ms.", cfg.rerank.deadline_ms),
	})??;

	parse_rerank_output(&raw, &window, top_k)
}

pub fn build_system_prompt(top_k: usize) -> String {
	format!(
		"You are an expert product curator. You receive a search query and a JSON array of \
product objects. Select the best {top_k} products for the query, judging by user rating \
(stars), number of reviews, and value for the price. Respond with ONLY a JSON array of the \
selected product objects, ordered from best to worst. Each object must be copied exactly as \
given, with no fields added, removed, or changed. Do not include explanations, markdown, or any \
text outside the JSON array."
	)
}

pub fn build_user_prompt(query_text: &str, window: &[Value]) -> Result<String, RerankError> {
	let products = serde_json::to_string(window)
		.map_err(|err| RerankError::InvalidResponse { message: err.to_string() })?;

	Ok(format!("Search query: {query_text:?}\nProducts: {products}"))
}

/// Removes markdown code fences and surrounding whitespace.
pub fn strip_fences(raw: &str) -> String {
	FENCE_RE.replace_all(raw, "").trim().to_string()
}

/// Maps the model's answer back to positions in `window`.
pub fn parse_rerank_output(
	raw: &str,
	window: &[Value],
	top_k: usize,
) -> Result<Vec<usize>, RerankError> {
	let cleaned = strip_fences(raw);
	let parsed: Value = serde_json::from_str(&cleaned).map_err(|err| {
		RerankError::InvalidResponse { message: format!("Answer is not JSON: {err}.") }
	})?;
	let Value::Array(items) = parsed else {
		return Err(RerankError::InvalidResponse {
			message: "Answer is not a JSON array.".to_string(),
		});
	};

	if items.is_empty() && !window.is_empty() {
		return Err(RerankError::InvalidResponse {
			message: "Answer selects no candidates.".to_string(),
		});
	}

	let mut taken = vec![false; window.len()];
	let mut order = Vec::with_capacity(items.len().min(top_k));

	for item in &items {
		let Some(idx) = (0..window.len()).find(|idx| !taken[*idx] && window[*idx] == *item) else {
			return Err(RerankError::InvalidResponse {
				message: "Answer contains an object that is not an unused candidate.".to_string(),
			});
		};

		taken[idx] = true;

		order.push(idx);
	}

	order.truncate(top_k);

	Ok(order)
}

#[cfg(test)]
mod tests {
	use serde_json::json;

	use super::*;

	fn window() -> Vec<Value> {
		vec![
			json!({ "_id": 1, "title": "A", "price": "₹699" }),
			json!({ "_id": 2, "title": "B", "price": 1099 }),
			json!({ "_id": 3, "title": "C" }),
		]
	}

	#[test]
	fn strips_json_fences() {
		assert_eq!(strip_fences("```json\n[1]\n```"), "[1]");
		assert_eq!(strip_fences("  [1]  "), "[1]");
		assert_eq!(strip_fences("```\n[]\n```\n"), "[]");
	}

	#[test]
	fn maps_answer_to_positions_and_truncates() {
		let raw = serde_json::to_string(&json!([window()[2], window()[0], window()[1]]))
			.expect("encode failed");

		assert_eq!(parse_rerank_output(&raw, &window(), 2).expect("parse failed"), vec![2, 0]);
	}

	#[test]
	fn field_order_does_not_matter() {
		let raw = r#"[{"price":1099,"title":"B","_id":2}]"#;

		assert_eq!(parse_rerank_output(raw, &window(), 5).expect("parse failed"), vec![1]);
	}

	#[test]
	fn rejects_altered_duplicate_and_foreign_objects() {
		let altered = r#"[{"_id":1,"title":"A","price":"₹699","note":"great"}]"#;
		let duplicate = serde_json::to_string(&json!([window()[0], window()[0]]))
			.expect("encode failed");
		let foreign = r#"[{"_id":9,"title":"Z"}]"#;

		for raw in [altered, duplicate.as_str(), foreign] {
			assert!(matches!(
				parse_rerank_output(raw, &window(), 5),
				Err(RerankError::InvalidResponse { .. })
			));
		}
	}

	#[test]
	fn rejects_non_arrays_prose_and_empty_answers() {
		for raw in [r#"{"items":[]}"#, "Here are the best products: []", "", "[]"] {
			assert!(matches!(
				parse_rerank_output(raw, &window(), 5),
				Err(RerankError::InvalidResponse { .. })
			));
		}
	}
}
