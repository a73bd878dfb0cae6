//! Search orchestration: validate, plan, execute, score, rerank, shape.

use serde::{Deserialize, Deserializer, Serialize, de::Error as _};
use serde_json::Value;
use tracing::{debug, error, warn};

use sift_domain::{
	currency::CurrencyAdapter,
	local::{self, LocalOutput},
	plan::{self, DerivePlacement, SearchPlan, SearchQuery},
	record::Candidate,
	scoring::{self, ScoredCandidate},
};

use crate::{Error, Result, SearchService, rerank};

/// Largest page a caller may ask for.
pub const MAX_PAGE_SIZE: u32 = 100;

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchRequest {
	#[serde(default, alias = "search", alias = "q")]
	pub text: String,
	/// Inclusive lower price bound, in display currency.
	#[serde(default, deserialize_with = "de_price_bound")]
	pub min_price: Option<f64>,
	/// Inclusive upper price bound, in display currency.
	#[serde(default, deserialize_with = "de_price_bound")]
	pub max_price: Option<f64>,
	/// 1-based. Missing or below 1 means the first page.
	pub page: Option<i64>,
	pub page_size: Option<u32>,
	/// Overrides `rerank.enabled` for this request.
	pub rerank: Option<bool>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum PriceBound {
	Number(f64),
	Text(String),
}

/// Accepts a number or a numeric string. Blank strings count as absent.
fn de_price_bound<'de, D>(deserializer: D) -> std::result::Result<Option<f64>, D::Error>
where
	D: Deserializer<'de>,
{
	match Option::<PriceBound>::deserialize(deserializer)? {
		None => Ok(None),
		Some(PriceBound::Number(value)) => Ok(Some(value)),
		Some(PriceBound::Text(raw)) if raw.trim().is_empty() => Ok(None),
		Some(PriceBound::Text(raw)) => raw
			.trim()
			.parse::<f64>()
			.map(Some)
			.map_err(|_| D::Error::custom(format!("Price bound {raw:?} is not a number."))),
	}
}

#[derive(Clone, Debug, PartialEq)]
pub struct SearchOutput {
	pub items: Vec<Value>,
	pub total_count: u64,
	pub page: u32,
	pub total_pages: u64,
	/// Whether a reranker answer ordered the items.
	pub reranked: bool,
}
impl SearchOutput {
	pub fn into_response(self, mode: ResponseMode) -> SearchResponse {
		match mode {
			ResponseMode::Paged => SearchResponse::Paged(PagedResponse {
				items: self.items,
				total_count: self.total_count,
				page: self.page,
				total_pages: self.total_pages,
			}),
			ResponseMode::Items => SearchResponse::Items(self.items),
		}
	}
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PagedResponse {
	pub items: Vec<Value>,
	pub total_count: u64,
	pub page: u32,
	pub total_pages: u64,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum SearchResponse {
	Paged(PagedResponse),
	Items(Vec<Value>),
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ResponseMode {
	/// `{items, totalCount, page, totalPages}`.
	Paged,
	/// A bare array of items.
	Items,
}
impl ResponseMode {
	pub fn from_config(raw: &str) -> Self {
		match raw {
			"items" => Self::Items,
			_ => Self::Paged,
		}
	}
}

impl SearchService {
	/// One page of results. With reranking on, the first page is reordered by the reranker's
	/// picks; its membership stays the same so later pages continue where it ends.
	pub async fn search(&self, req: SearchRequest) -> Result<SearchOutput> {
		let query = validate_request(&req, self.cfg.search.page_size)?;
		let plan = plan::plan(&query, &self.cfg, self.catalog.native_relevance());
		let rerank_enabled = req.rerank.unwrap_or(self.cfg.rerank.enabled);

		debug!(
			placement = plan.placement.as_str(),
			scoring = plan.scoring.as_str(),
			page = query.page,
			page_size = query.page_size,
			rerank = rerank_enabled,
			"Search plan built."
		);

		let (candidates, total_count) = self.execute(&plan).await?;
		let mut scored = scoring::score_candidates(candidates, plan.scoring);
		let reranked = if rerank_enabled && query.page == 1 {
			let limit = (self.cfg.rerank.candidate_limit as usize).min(scored.len());
			let picks = self.rerank_picks(&query.text, &scored[..limit]).await;
			let reranked = picks.is_some();

			if let Some(picks) = picks {
				scored = promote(scored, &picks);
			}

			reranked
		} else {
			false
		};

		debug!(items = scored.len(), total_count, reranked, "Search page fetched.");

		Ok(self.output(&query, scored, total_count, reranked))
	}

	/// The reranker's top `rerank.top_k` over the best `rerank.candidate_limit` matches, or the
	/// local top `rerank.top_k` when the reranker fails. Always the first page.
	pub async fn top_picks(&self, req: SearchRequest) -> Result<SearchOutput> {
		let req = SearchRequest { page: Some(1), ..req };
		let query = validate_request(&req, self.cfg.rerank.top_k)?;
		let plan = plan::plan(&query, &self.cfg, self.catalog.native_relevance())
			.with_window(0, self.cfg.rerank.candidate_limit as u64);
		let (candidates, total_count) = self.execute(&plan).await?;
		let scored = scoring::score_candidates(candidates, plan.scoring);
		let top_k = self.cfg.rerank.top_k as usize;
		let (picks, reranked) = match self.rerank_picks(&query.text, &scored).await {
			Some(picks) => (picks, true),
			None => ((0..scored.len().min(top_k)).collect(), false),
		};
		let items = promote(scored, &picks).into_iter().take(picks.len()).collect();

		debug!(total_count, reranked, "Top picks selected.");

		Ok(self.output(&query, items, total_count, reranked))
	}

	/// Positions into `window` chosen by the reranker, best first. `None` after a failure.
	async fn rerank_picks(&self, text: &str, window: &[ScoredCandidate]) -> Option<Vec<usize>> {
		if window.is_empty() {
			return None;
		}

		let records: Vec<_> = window.iter().map(|item| item.record.clone()).collect();

		rerank::rerank_order(self.reranker.as_ref(), &self.cfg, text, &records)
			.await
			.inspect_err(|err| {
				warn!(
					error = %err,
					candidates = records.len(),
					"Rerank failed; falling back to local ranking."
				)
			})
			.ok()
	}

	/// Page candidates in final order plus the total match count.
	async fn execute(&self, plan: &SearchPlan) -> Result<(Vec<Candidate>, u64)> {
		let result = match plan.placement {
			DerivePlacement::Datastore => {
				let (page_stages, _) = plan.split_page();
				let (count_stages, _) = plan.split_count();

				tokio::try_join!(
					self.catalog.fetch(&page_stages),
					self.catalog.count(&count_stages)
				)
			},
			DerivePlacement::Local => self.execute_local(plan).await,
		};

		result.inspect_err(|err| error!(error = %err, "Catalog query failed."))
	}

	async fn execute_local(&self, plan: &SearchPlan) -> Result<(Vec<Candidate>, u64)> {
		let (retrieval, page_stages) = plan.split_page();
		let (_, count_stages) = plan.split_count();
		let raw = self.catalog.fetch(&retrieval).await?;
		let cap = self.cfg.search.max_local_candidates as usize;

		// Retrieval asks for one record past the cap; getting it back means the set is truncated
		// and neither the count nor the ranking would be complete.
		if raw.len() > cap {
			return Err(Error::Datastore {
				message: format!(
					"Query matched more than search.max_local_candidates ({cap}) products."
				),
			});
		}

		let total_count = expect_count(local::execute(&count_stages, raw.clone()))?;
		let page = expect_rows(local::execute(&page_stages, raw))?;

		Ok((page, total_count))
	}

	fn output(
		&self,
		query: &SearchQuery,
		scored: Vec<ScoredCandidate>,
		total_count: u64,
		reranked: bool,
	) -> SearchOutput {
		let currency = CurrencyAdapter::from_config(&self.cfg.currency);
		let merge = self.cfg.search.merge_normalized;
		let items = scored.iter().map(|item| shape_item(item, &currency, merge)).collect();

		SearchOutput {
			items,
			total_count,
			page: query.page,
			total_pages: plan::total_pages(total_count, query.page_size),
			reranked,
		}
	}
}

/// Moves the items at `picks` to the front in pick order; the rest keep their relative order.
fn promote(scored: Vec<ScoredCandidate>, picks: &[usize]) -> Vec<ScoredCandidate> {
	let mut slots: Vec<Option<ScoredCandidate>> = scored.into_iter().map(Some).collect();
	let mut ordered: Vec<ScoredCandidate> =
		picks.iter().filter_map(|idx| slots.get_mut(*idx)?.take()).collect();

	ordered.extend(slots.into_iter().flatten());

	ordered
}

/// Checks a raw request and turns it into a planner query.
pub fn validate_request(req: &SearchRequest, default_page_size: u32) -> Result<SearchQuery> {
	let text = req.text.trim();

	if text.is_empty() {
		return Err(invalid("Search text must be non-empty."));
	}

	for (label, bound) in [("minPrice", req.min_price), ("maxPrice", req.max_price)] {
		if let Some(bound) = bound
			&& (!bound.is_finite() || bound < 0.0)
		{
			return Err(invalid(&format!("{label} must be a finite number, zero or greater.")));
		}
	}

	if let (Some(min), Some(max)) = (req.min_price, req.max_price)
		&& min > max
	{
		return Err(invalid("minPrice must not exceed maxPrice."));
	}

	let page_size = match req.page_size {
		Some(size) if size == 0 || size > MAX_PAGE_SIZE =>
			return Err(invalid(&format!("pageSize must be in the range 1-{MAX_PAGE_SIZE}."))),
		Some(size) => size,
		None => default_page_size,
	};

	let page = req.page.unwrap_or(1).clamp(1, u32::MAX as i64) as u32;

	Ok(SearchQuery {
		text: text.to_string(),
		min_price: req.min_price,
		max_price: req.max_price,
		page,
		page_size,
	})
}

/// Serializes a scored record. With `merge_normalized` the numeric views, the display price and
/// the final score are added beside the stored fields, which are left as they are.
pub fn shape_item(
	item: &ScoredCandidate,
	currency: &CurrencyAdapter,
	merge_normalized: bool,
) -> Value {
	let mut value = item.record.to_value();

	if merge_normalized && let Value::Object(map) = &mut value {
		map.insert("priceNumeric".to_string(), Value::from(item.fields.price));
		map.insert("ratingNumeric".to_string(), Value::from(item.fields.rating));
		map.insert("reviewCountNumeric".to_string(), Value::from(item.fields.review_count));
		map.insert(
			"displayPrice".to_string(),
			Value::from(currency.to_display(item.fields.price)),
		);
		map.insert("finalScore".to_string(), Value::from(item.final_score));
	}

	value
}

fn expect_rows(output: LocalOutput) -> Result<Vec<Candidate>> {
	match output {
		LocalOutput::Candidates(items) => Ok(items),
		LocalOutput::Count(_) =>
			Err(Error::Datastore { message: "Local page stages produced a count.".to_string() }),
	}
}

fn expect_count(output: LocalOutput) -> Result<u64> {
	match output {
		LocalOutput::Count(count) => Ok(count),
		LocalOutput::Candidates(_) =>
			Err(Error::Datastore { message: "Local count stages produced rows.".to_string() }),
	}
}

fn invalid(message: &str) -> Error {
	Error::InvalidRequest { message: message.to_string() }
}
