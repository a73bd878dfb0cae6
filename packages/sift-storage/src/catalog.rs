//! Product catalog stored as JSONB documents in Postgres.
//!
//! Plan stages compile into one parameterized statement: a chain of CTEs, one per stage, so a
//! stage always sees exactly the rows its predecessor produced. Retrieval order is `product_id`
//! until a sort stage replaces it with final score descending, `product_id` ascending.

use serde_json::Value;
use sqlx::{Postgres, QueryBuilder};

use sift_domain::{
	normalize::MAX_NUMERIC_CHARS,
	plan::{MatchClause, MatchField, MatchMode, MatchStage, PriceRange, Stage},
	record::{
		CATEGORY_KEYS, Candidate, PRICE_KEYS, ProductRecord, RATING_KEYS, REVIEW_KEYS, TITLE_KEYS,
	},
	scoring::ScoringMode,
};

use crate::{Error, Result, db::Db, models::ProductRow};

const BASE_RELATION: &str = "SELECT product_id, doc, NULL::float8 AS text_score FROM products";
const RETRIEVAL_ORDER: &str = "product_id ASC";
const SCORE_ORDER: &str = "final_score DESC, product_id ASC";
/// Digits with at most one decimal point, matching what `f64` parsing accepts after cleaning.
const NUMERIC_SHAPE: &str = "^([0-9]+\\.?[0-9]*|\\.[0-9]+)$";

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Returns {
	Rows,
	Count,
}

pub struct CompiledQuery {
	pub builder: QueryBuilder<'static, Postgres>,
	pub returns: Returns,
}

pub struct PgCatalog {
	db: Db,
}
impl PgCatalog {
	pub fn new(db: Db) -> Self {
		Self { db }
	}

	pub async fn fetch(&self, stages: &[Stage]) -> Result<Vec<Candidate>> {
		let mut compiled = compile(stages)?;

		if compiled.returns != Returns::Rows {
			return Err(Error::InvalidArgument("Fetch stages must not end in a count.".to_string()));
		}

		let rows: Vec<ProductRow> =
			compiled.builder.build_query_as::<ProductRow>().fetch_all(&self.db.pool).await?;

		rows.into_iter().map(into_candidate).collect()
	}

	pub async fn count(&self, stages: &[Stage]) -> Result<u64> {
		let mut compiled = compile(stages)?;

		if compiled.returns != Returns::Count {
			return Err(Error::InvalidArgument("Count stages must end in a count.".to_string()));
		}

		let count: i64 =
			compiled.builder.build_query_scalar::<i64>().fetch_one(&self.db.pool).await?;

		Ok(count.max(0) as u64)
	}

	/// Inserts raw product documents and returns their assigned ids in input order.
	pub async fn insert_documents(&self, docs: &[Value]) -> Result<Vec<i64>> {
		let mut ids = Vec::with_capacity(docs.len());
		let mut tx = self.db.pool.begin().await?;

		for doc in docs {
			let id: i64 =
				sqlx::query_scalar("INSERT INTO products (doc) VALUES ($1) RETURNING product_id")
					.bind(doc)
					.fetch_one(&mut *tx)
					.await?;

			ids.push(id);
		}

		tx.commit().await?;

		Ok(ids)
	}
}

pub fn compile(stages: &[Stage]) -> Result<CompiledQuery> {
	let mut builder = QueryBuilder::new("WITH s0 AS (");
	let mut step = 0_usize;
	let mut derived = false;
	let mut sorted = false;
	let mut counted = false;

	builder.push(BASE_RELATION).push(")");

	for stage in stages {
		if counted {
			return Err(Error::InvalidArgument("Count must be the last stage.".to_string()));
		}
		if let Stage::Count = stage {
			counted = true;

			continue;
		}

		let prev = format!("s{step}");

		step += 1;

		builder.push(format_args!(", s{step} AS ("));

		match stage {
			Stage::Match(matching) => {
				if derived {
					return Err(Error::InvalidArgument(
						"Match must run before derived fields.".to_string(),
					));
				}

				push_match(&mut builder, matching, &prev)?;
			},
			Stage::Derive => {
				if derived {
					return Err(Error::InvalidArgument("Derive may appear once.".to_string()));
				}

				derived = true;

				builder.push(format_args!(
					"SELECT *, {} AS price_num, {} AS rating_num, trunc({}) AS review_count FROM {prev}",
					amount_expr(PRICE_KEYS),
					amount_expr(RATING_KEYS),
					amount_expr(REVIEW_KEYS),
				));
			},
			Stage::Filter(range) => {
				require_derived(derived, "Filter")?;
				push_filter(&mut builder, range, &prev);
			},
			Stage::Sort(mode) => {
				require_derived(derived, "Sort")?;

				if sorted {
					return Err(Error::InvalidArgument("Sort may appear once.".to_string()));
				}

				sorted = true;

				builder.push(format_args!(
					"SELECT *, {} AS final_score FROM {prev}",
					final_score_expr(*mode)
				));
			},
			Stage::Skip(skip) => {
				builder
					.push(format_args!("SELECT * FROM {prev} ORDER BY {} OFFSET ", order(sorted)))
					.push_bind(to_i64(*skip));
			},
			Stage::Limit(limit) => {
				builder
					.push(format_args!("SELECT * FROM {prev} ORDER BY {} LIMIT ", order(sorted)))
					.push_bind(to_i64(*limit));
			},
			// Handled before the CTE is opened.
			Stage::Count => {},
		}

		builder.push(")");
	}

	let returns = if counted {
		builder.push(format_args!(" SELECT count(*) FROM s{step}"));

		Returns::Count
	} else {
		builder.push(format_args!(
			" SELECT product_id, doc, text_score FROM s{step} ORDER BY {}",
			order(sorted)
		));

		Returns::Rows
	};

	Ok(CompiledQuery { builder, returns })
}

fn push_match(
	builder: &mut QueryBuilder<'static, Postgres>,
	stage: &MatchStage,
	prev: &str,
) -> Result<()> {
	let query = stage.text.trim().to_lowercase();

	if query.is_empty() {
		return Err(Error::InvalidArgument("Match text must be non-empty.".to_string()));
	}
	if stage.clauses.is_empty() {
		return Err(Error::InvalidArgument("Match needs at least one clause.".to_string()));
	}

	builder.push("SELECT product_id, doc, (");

	for (idx, clause) in stage.clauses.iter().enumerate() {
		if idx > 0 {
			builder.push(" + ");
		}

		builder.push("CASE WHEN ");
		push_clause_predicate(builder, clause, stage, &query);
		builder.push(" THEN ").push_bind(clause.boost).push("::float8 * ");
		push_clause_score(builder, clause, &query);
		builder.push(" ELSE 0 END");
	}

	builder.push(format_args!(")::float8 AS text_score FROM {prev} WHERE ("));

	for (idx, clause) in stage.clauses.iter().enumerate() {
		if idx > 0 {
			builder.push(" OR ");
		}

		push_clause_predicate(builder, clause, stage, &query);
	}

	builder.push(")");

	Ok(())
}

fn push_clause_predicate(
	builder: &mut QueryBuilder<'static, Postgres>,
	clause: &MatchClause,
	stage: &MatchStage,
	query: &str,
) {
	let field = field_expr(clause.field);

	match clause.mode {
		MatchMode::Phrase => {
			builder
				.push(format_args!("to_tsvector('simple', {field}) @@ phraseto_tsquery('simple', "))
				.push_bind(query.to_string())
				.push(")");
		},
		MatchMode::Fuzzy => {
			builder
				.push("word_similarity(")
				.push_bind(query.to_string())
				.push(format_args!(", lower({field})) >= "))
				.push_bind(stage.fuzzy_min_similarity)
				.push("::float8");
		},
		MatchMode::Contains => {
			builder
				.push(format_args!("strpos(lower({field}), "))
				.push_bind(query.to_string())
				.push(") > 0");
		},
	}
}

fn push_clause_score(
	builder: &mut QueryBuilder<'static, Postgres>,
	clause: &MatchClause,
	query: &str,
) {
	let field = field_expr(clause.field);

	match clause.mode {
		MatchMode::Phrase => {
			builder
				.push(format_args!(
					"ts_rank_cd(to_tsvector('simple', {field}), phraseto_tsquery('simple', "
				))
				.push_bind(query.to_string())
				.push("))");
		},
		MatchMode::Fuzzy => {
			builder
				.push("word_similarity(")
				.push_bind(query.to_string())
				.push(format_args!(", lower({field}))"));
		},
		MatchMode::Contains => {
			builder.push("1.0");
		},
	}
}

fn push_filter(builder: &mut QueryBuilder<'static, Postgres>, range: &PriceRange, prev: &str) {
	builder.push(format_args!("SELECT * FROM {prev} WHERE TRUE"));

	if let Some(min) = range.min {
		builder.push(" AND price_num >= ").push_bind(min);
	}
	if let Some(max) = range.max {
		builder.push(" AND price_num <= ").push_bind(max);
	}
}

fn require_derived(derived: bool, stage: &str) -> Result<()> {
	if derived {
		return Ok(());
	}

	Err(Error::InvalidArgument(format!("{stage} needs derived fields.")))
}

fn order(sorted: bool) -> &'static str {
	if sorted { SCORE_ORDER } else { RETRIEVAL_ORDER }
}

fn to_i64(value: u64) -> i64 {
	i64::try_from(value).unwrap_or(i64::MAX)
}

fn field_expr(field: MatchField) -> String {
	match field {
		MatchField::Title => text_expr(TITLE_KEYS),
		MatchField::Category => text_expr(CATEGORY_KEYS),
	}
}

/// First present text value among `keys`, or the empty string.
fn text_expr(keys: &[&str]) -> String {
	let values: Vec<String> = keys.iter().map(|key| format!("doc->>'{key}'")).collect();

	format!("coalesce({}, '')", values.join(", "))
}

/// SQL rendition of the field normalizer: JSON numbers pass through, strings are stripped to
/// digits and dots and cast only when well formed, everything else is zero. Negatives clamp to 0.
fn amount_expr(keys: &[&str]) -> String {
	let values: Vec<String> = keys.iter().map(|key| format!("doc->'{key}'")).collect();
	let value = format!("coalesce({})", values.join(", "));
	let cleaned = format!("regexp_replace({value} #>> '{{}}', '[^0-9.]', '', 'g')");

	format!(
		"(CASE jsonb_typeof({value}) \
WHEN 'number' THEN GREATEST(({value})::float8, 0) \
WHEN 'string' THEN (CASE WHEN length({cleaned}) < {MAX_NUMERIC_CHARS} \
AND {cleaned} ~ '{NUMERIC_SHAPE}' THEN GREATEST(({cleaned})::float8, 0) ELSE 0 END) \
ELSE 0 END)"
	)
}

fn final_score_expr(mode: ScoringMode) -> &'static str {
	match mode {
		ScoringMode::TextRelevance =>
			"GREATEST(coalesce(text_score, 0), 0) * (rating_num * log(review_count + 1) + 1)",
		ScoringMode::Popularity => "(rating_num * log(review_count + 1) + 1)",
	}
}

fn into_candidate(row: ProductRow) -> Result<Candidate> {
	let mut record: ProductRecord = serde_json::from_value(row.doc)
		.map_err(|source| Error::Decode { product_id: row.product_id, source })?;

	record.ensure_id(row.product_id);

	Ok(Candidate { record, ordinal: row.product_id.max(0) as u64, text_score: row.text_score })
}
