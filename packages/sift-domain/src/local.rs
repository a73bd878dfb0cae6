//! In-process execution of plan stages.
//!
//! Used by the in-memory catalog for whole plans and by the orchestrator when derived fields are
//! placed locally. Results match what the Postgres adapter computes for the same stages.

use unicode_segmentation::UnicodeSegmentation;

use crate::{
	normalize::{self, NormalizedFields},
	plan::{MatchField, MatchMode, MatchStage, Stage},
	record::{Candidate, ProductRecord},
	scoring::{self, ScoringMode},
};

/// Words shorter than this must match exactly in fuzzy mode.
const FUZZY_MIN_WORD_CHARS: usize = 4;

#[derive(Debug, PartialEq)]
pub enum LocalOutput {
	Candidates(Vec<Candidate>),
	Count(u64),
}

struct Row {
	candidate: Candidate,
	fields: Option<NormalizedFields>,
	final_score: f64,
}
impl Row {
	fn fields(&mut self) -> NormalizedFields {
		*self.fields.get_or_insert_with(|| normalize::normalize_record(&self.candidate.record))
	}
}

/// Runs `stages` in order over `candidates`, which must already be in retrieval order.
pub fn execute(stages: &[Stage], candidates: Vec<Candidate>) -> LocalOutput {
	let mut rows: Vec<Row> = candidates
		.into_iter()
		.map(|candidate| Row { candidate, fields: None, final_score: 0.0 })
		.collect();

	for stage in stages {
		match stage {
			Stage::Match(stage) => {
				rows = rows
					.into_iter()
					.filter_map(|mut row| {
						let score = match_score(stage, &row.candidate.record)?;

						row.candidate.text_score = Some(score);

						Some(row)
					})
					.collect();
			},
			Stage::Derive =>
				for row in &mut rows {
					row.fields();
				},
			Stage::Filter(range) => rows.retain_mut(|row| range.contains(row.fields().price)),
			Stage::Sort(mode) => sort_rows(&mut rows, *mode),
			Stage::Skip(skip) => {
				let skip = usize::try_from(*skip).unwrap_or(usize::MAX).min(rows.len());

				rows.drain(..skip);
			},
			Stage::Limit(limit) => rows.truncate(usize::try_from(*limit).unwrap_or(usize::MAX)),
			Stage::Count => return LocalOutput::Count(rows.len() as u64),
		}
	}

	LocalOutput::Candidates(rows.into_iter().map(|row| row.candidate).collect())
}

/// Boost-weighted text score of `record`, or `None` when no clause matches.
pub fn match_score(stage: &MatchStage, record: &ProductRecord) -> Option<f64> {
	let query = stage.text.trim().to_lowercase();

	if query.is_empty() {
		return None;
	}

	let title = record.title().to_lowercase();
	let category = record.category().map(|text| text.to_lowercase()).unwrap_or_default();
	let mut matched = false;
	let mut total = 0.0;

	for clause in &stage.clauses {
		let haystack = match clause.field {
			MatchField::Title => title.as_str(),
			MatchField::Category => category.as_str(),
		};
		let hit = match clause.mode {
			MatchMode::Phrase => phrase_match(&query, haystack),
			MatchMode::Contains => haystack.contains(query.as_str()),
			MatchMode::Fuzzy => fuzzy_words_match(&query, haystack, stage.fuzzy_max_edits),
		};

		if hit {
			matched = true;
			total += clause.boost;
		}
	}

	matched.then_some(total)
}

/// True when the query words appear in `text` as consecutive whole words.
pub fn phrase_match(query: &str, text: &str) -> bool {
	let query_words: Vec<&str> = query.unicode_words().collect();

	if query_words.is_empty() {
		return false;
	}

	let text_words: Vec<&str> = text.unicode_words().collect();

	text_words.windows(query_words.len()).any(|window| window == query_words.as_slice())
}

/// True when every query word has a word in `text` within the allowed edit distance.
pub fn fuzzy_words_match(query: &str, text: &str, max_edits: u32) -> bool {
	let query_words: Vec<&str> = query.unicode_words().collect();

	if query_words.is_empty() {
		return false;
	}

	let text_words: Vec<&str> = text.unicode_words().collect();

	query_words.iter().all(|word| {
		let allowed =
			if word.chars().count() < FUZZY_MIN_WORD_CHARS { 0 } else { max_edits as usize };

		text_words.iter().any(|candidate| within_edit_distance(word, candidate, allowed))
	})
}

/// Levenshtein distance check that gives up once every path exceeds `max`.
pub fn within_edit_distance(a: &str, b: &str, max: usize) -> bool {
	let a: Vec<char> = a.chars().collect();
	let b: Vec<char> = b.chars().collect();

	if a.len().abs_diff(b.len()) > max {
		return false;
	}
	if max == 0 {
		return a == b;
	}

	let mut prev: Vec<usize> = (0..=b.len()).collect();
	let mut curr = vec![0; b.len() + 1];

	for (i, ca) in a.iter().enumerate() {
		curr[0] = i + 1;

		let mut row_min = curr[0];

		for (j, cb) in b.iter().enumerate() {
			let substitution = prev[j] + usize::from(ca != cb);

			curr[j + 1] = substitution.min(prev[j + 1] + 1).min(curr[j] + 1);
			row_min = row_min.min(curr[j + 1]);
		}

		if row_min > max {
			return false;
		}

		std::mem::swap(&mut prev, &mut curr);
	}

	prev[b.len()] <= max
}

fn sort_rows(rows: &mut [Row], mode: ScoringMode) {
	for row in rows.iter_mut() {
		let fields = row.fields();
		let text_relevance = match mode {
			ScoringMode::TextRelevance => Some(row.candidate.text_score.unwrap_or(0.0)),
			ScoringMode::Popularity => None,
		};

		row.final_score = scoring::score(text_relevance, fields.rating, fields.review_count);
	}

	// Stable: equal scores keep their incoming position.
	rows.sort_by(|a, b| scoring::cmp_score_desc(a.final_score, b.final_score));
}
