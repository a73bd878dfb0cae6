//! Retrieval plans.
//!
//! A search request becomes an ordered list of declarative stages (match, derive, filter, sort,
//! skip, limit, count) that a datastore adapter compiles into its own query language or that
//! [`crate::local`] runs in process. Plans are built once per request by consuming builder steps
//! and are not mutated afterwards.

use sift_config::Config;

use crate::{currency::CurrencyAdapter, scoring::ScoringMode};

/// A validated search request.
#[derive(Clone, Debug, PartialEq)]
pub struct SearchQuery {
	pub text: String,
	/// Inclusive lower price bound, in display currency.
	pub min_price: Option<f64>,
	/// Inclusive upper price bound, in display currency.
	pub max_price: Option<f64>,
	pub page: u32,
	pub page_size: u32,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum MatchField {
	Title,
	Category,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum MatchMode {
	/// The whole query as a contiguous phrase.
	Phrase,
	/// Every query word, tolerating small edit distances.
	Fuzzy,
	/// Case-insensitive substring.
	Contains,
}

#[derive(Clone, Debug, PartialEq)]
pub struct MatchClause {
	pub field: MatchField,
	pub mode: MatchMode,
	pub boost: f64,
}

/// Disjunctive text match: a record is admitted when any clause matches and its text score is the
/// boost-weighted sum of the clauses that did.
#[derive(Clone, Debug, PartialEq)]
pub struct MatchStage {
	pub text: String,
	pub clauses: Vec<MatchClause>,
	pub fuzzy_max_edits: u32,
	pub fuzzy_min_similarity: f64,
}

/// Price bounds in stored currency, inclusive on both ends.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PriceRange {
	pub min: Option<f64>,
	pub max: Option<f64>,
}
impl PriceRange {
	pub fn contains(&self, price: f64) -> bool {
		self.min.is_none_or(|min| price >= min) && self.max.is_none_or(|max| price <= max)
	}
}

#[derive(Clone, Debug, PartialEq)]
pub enum Stage {
	Match(MatchStage),
	/// Normalized price, rating and review-count views of the raw fields.
	Derive,
	Filter(PriceRange),
	/// Final score descending, ties in retrieval order.
	Sort(ScoringMode),
	Skip(u64),
	Limit(u64),
	Count,
}

/// Where stages after the text match run.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum DerivePlacement {
	/// Pushed into the datastore query.
	Datastore,
	/// The datastore returns raw matches and the rest runs in process.
	Local,
}
impl DerivePlacement {
	pub fn as_str(self) -> &'static str {
		match self {
			Self::Datastore => "datastore",
			Self::Local => "local",
		}
	}
}

#[derive(Clone, Debug, PartialEq)]
pub struct SearchPlan {
	pub placement: DerivePlacement,
	pub scoring: ScoringMode,
	retrieval: Vec<Stage>,
	page: Vec<Stage>,
	count: Vec<Stage>,
}
impl SearchPlan {
	/// Stages for the page query as `(datastore, local)`.
	pub fn split_page(&self) -> (Vec<Stage>, Vec<Stage>) {
		self.split(&self.page)
	}

	/// Stages for the count query as `(datastore, local)`. The count shares match, derive and
	/// filter with the page query and ends in [`Stage::Count`] instead of sort and pagination.
	pub fn split_count(&self) -> (Vec<Stage>, Vec<Stage>) {
		self.split(&self.count)
	}

	/// The same plan with its pagination replaced by `skip`/`limit`.
	pub fn with_window(&self, skip: u64, limit: u64) -> Self {
		let mut page: Vec<Stage> = self
			.page
			.iter()
			.filter(|stage| !matches!(stage, Stage::Skip(_) | Stage::Limit(_)))
			.cloned()
			.collect();

		page.push(Stage::Skip(skip));
		page.push(Stage::Limit(limit));

		Self { page, ..self.clone() }
	}

	pub fn match_stage(&self) -> Option<&MatchStage> {
		self.retrieval.iter().find_map(|stage| match stage {
			Stage::Match(stage) => Some(stage),
			_ => None,
		})
	}

	fn split(&self, tail: &[Stage]) -> (Vec<Stage>, Vec<Stage>) {
		match self.placement {
			DerivePlacement::Datastore =>
				(self.retrieval.iter().chain(tail).cloned().collect(), Vec::new()),
			DerivePlacement::Local => (self.retrieval.clone(), tail.to_vec()),
		}
	}
}

pub fn resolve_placement(cfg: &Config) -> DerivePlacement {
	match cfg.search.derive.as_str() {
		"local" => DerivePlacement::Local,
		_ => DerivePlacement::Datastore,
	}
}

/// `(skip, limit)` for a 1-based page. Pages below 1 are treated as page 1.
pub fn pagination(page: u32, page_size: u32) -> (u64, u64) {
	let page = page.max(1) as u64;

	((page - 1).saturating_mul(page_size as u64), page_size as u64)
}

pub fn total_pages(total_count: u64, page_size: u32) -> u64 {
	if page_size == 0 {
		return 0;
	}

	total_count.div_ceil(page_size as u64)
}

/// Builds the retrieval plan for `query`. `native_relevance` tells whether the datastore attaches
/// a text-relevance score; without one the plan ranks by popularity alone.
pub fn plan(query: &SearchQuery, cfg: &Config, native_relevance: bool) -> SearchPlan {
	PlanBuilder::new(query, cfg, native_relevance)
		.matching()
		.derive()
		.filter()
		.sort()
		.paginate()
		.count()
		.build()
}

struct PlanBuilder<'a> {
	query: &'a SearchQuery,
	cfg: &'a Config,
	placement: DerivePlacement,
	scoring: ScoringMode,
	retrieval: Vec<Stage>,
	shared: Vec<Stage>,
	page: Vec<Stage>,
	count: Vec<Stage>,
}
impl<'a> PlanBuilder<'a> {
	fn new(query: &'a SearchQuery, cfg: &'a Config, native_relevance: bool) -> Self {
		let scoring =
			if native_relevance { ScoringMode::TextRelevance } else { ScoringMode::Popularity };

		Self {
			query,
			cfg,
			placement: resolve_placement(cfg),
			scoring,
			retrieval: Vec::new(),
			shared: Vec::new(),
			page: Vec::new(),
			count: Vec::new(),
		}
	}

	fn matching(self) -> Self {
		let matching = &self.cfg.search.matching;
		let mut clauses = vec![MatchClause {
			field: MatchField::Title,
			mode: MatchMode::Phrase,
			boost: matching.phrase_boost as f64,
		}];

		if matching.fuzzy_enabled {
			clauses.push(MatchClause {
				field: MatchField::Title,
				mode: MatchMode::Fuzzy,
				boost: matching.fuzzy_boost as f64,
			});
		}
		if matching.category_enabled {
			clauses.push(MatchClause {
				field: MatchField::Category,
				mode: MatchMode::Contains,
				boost: matching.category_boost as f64,
			});
		}

		let stage = MatchStage {
			text: self.query.text.clone(),
			clauses,
			fuzzy_max_edits: matching.fuzzy_max_edits,
			fuzzy_min_similarity: matching.fuzzy_min_similarity as f64,
		};
		let mut retrieval = vec![Stage::Match(stage)];

		// One past the cap, so the orchestrator can tell a full set from a truncated one.
		if self.placement == DerivePlacement::Local {
			retrieval.push(Stage::Limit(self.cfg.search.max_local_candidates as u64 + 1));
		}

		Self { retrieval, ..self }
	}

	fn derive(self) -> Self {
		let shared = self.shared.iter().cloned().chain([Stage::Derive]).collect();

		Self { shared, ..self }
	}

	fn filter(self) -> Self {
		if self.query.min_price.is_none() && self.query.max_price.is_none() {
			return self;
		}

		let currency = CurrencyAdapter::from_config(&self.cfg.currency);
		let range = PriceRange {
			min: self.query.min_price.map(|min| currency.to_stored(min)),
			max: self.query.max_price.map(|max| currency.to_stored(max)),
		};
		let shared = self.shared.iter().cloned().chain([Stage::Filter(range)]).collect();

		Self { shared, ..self }
	}

	fn sort(self) -> Self {
		let page = self.shared.iter().cloned().chain([Stage::Sort(self.scoring)]).collect();

		Self { page, ..self }
	}

	fn paginate(self) -> Self {
		let (skip, limit) = pagination(self.query.page, self.query.page_size);
		let page =
			self.page.iter().cloned().chain([Stage::Skip(skip), Stage::Limit(limit)]).collect();

		Self { page, ..self }
	}

	fn count(self) -> Self {
		let count = self.shared.iter().cloned().chain([Stage::Count]).collect();

		Self { count, ..self }
	}

	fn build(self) -> SearchPlan {
		SearchPlan {
			placement: self.placement,
			scoring: self.scoring,
			retrieval: self.retrieval,
			page: self.page,
			count: self.count,
		}
	}
}
