use std::cmp::Ordering;

use crate::{
	normalize::{self, NormalizedFields},
	record::{Candidate, ProductRecord},
};

/// Which text-relevance term feeds the final score.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ScoringMode {
	/// The datastore supplies a native relevance score per candidate.
	TextRelevance,
	/// No native relevance: every candidate gets a text relevance of 1 and ranking comes from
	/// engagement alone.
	Popularity,
}
impl ScoringMode {
	pub fn as_str(self) -> &'static str {
		match self {
			Self::TextRelevance => "text_relevance",
			Self::Popularity => "popularity",
		}
	}
}

#[derive(Clone, Debug, PartialEq)]
pub struct ScoredCandidate {
	pub record: ProductRecord,
	pub ordinal: u64,
	pub fields: NormalizedFields,
	pub text_score: f64,
	pub popularity: f64,
	pub final_score: f64,
}

/// `rating * log10(review_count + 1)`. The `+ 1` keeps zero-review records at a popularity of
/// zero instead of negative infinity.
pub fn popularity(rating: f64, review_count: u64) -> f64 {
	rating * (review_count as f64 + 1.0).log10()
}

/// `text_relevance * (popularity + 1)`, so a zero popularity never erases a relevant match.
pub fn final_score(text_relevance: f64, popularity: f64) -> f64 {
	text_relevance * (popularity + 1.0)
}

pub fn score(text_relevance: Option<f64>, rating: f64, review_count: u64) -> f64 {
	let text_relevance = text_relevance.map(clamp_text_score).unwrap_or(1.0);

	final_score(text_relevance, popularity(rating, review_count))
}

pub fn score_candidate(candidate: Candidate, mode: ScoringMode) -> ScoredCandidate {
	let fields = normalize::normalize_record(&candidate.record);
	let text_score = match mode {
		ScoringMode::TextRelevance => candidate.text_score.map(clamp_text_score).unwrap_or(0.0),
		ScoringMode::Popularity => 1.0,
	};
	let popularity = popularity(fields.rating, fields.review_count);

	ScoredCandidate {
		record: candidate.record,
		ordinal: candidate.ordinal,
		fields,
		text_score,
		popularity,
		final_score: final_score(text_score, popularity),
	}
}

/// Scores candidates without changing their order.
pub fn score_candidates(candidates: Vec<Candidate>, mode: ScoringMode) -> Vec<ScoredCandidate> {
	candidates.into_iter().map(|candidate| score_candidate(candidate, mode)).collect()
}

/// Scores, then sorts by final score descending. The sort is stable, so equal scores keep the
/// order the candidates arrived in.
pub fn rank(candidates: Vec<Candidate>, mode: ScoringMode) -> Vec<ScoredCandidate> {
	let mut scored = score_candidates(candidates, mode);

	sort_scored(&mut scored);

	scored
}

pub fn sort_scored(scored: &mut [ScoredCandidate]) {
	scored.sort_by(|a, b| cmp_score_desc(a.final_score, b.final_score));
}

pub fn cmp_score_desc(a: f64, b: f64) -> Ordering {
	b.total_cmp(&a)
}

fn clamp_text_score(score: f64) -> f64 {
	if score.is_finite() && score > 0.0 { score } else { 0.0 }
}
