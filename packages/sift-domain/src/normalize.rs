//! Turns stored price, rating and review-count fields into numbers.
//!
//! Stored values may be absent, JSON numbers, or strings such as `"₹1,299.00"` or `"12,480"`.
//! Every function here returns a number and never an error: malformed input degrades to zero so
//! one bad record cannot fail a page of results.

use serde::Serialize;
use serde_json::Value;

use crate::record::ProductRecord;

/// Cleaned strings at or beyond this length are treated as malformed. Longer digit runs overflow
/// a double, and the datastore transform rejects them the same way.
pub const MAX_NUMERIC_CHARS: usize = 300;

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
pub struct NormalizedFields {
	pub price: f64,
	pub rating: f64,
	pub review_count: u64,
}

pub fn normalize_record(record: &ProductRecord) -> NormalizedFields {
	NormalizedFields {
		price: normalize_price(record.price()),
		rating: normalize_rating(record.stars()),
		review_count: normalize_count(record.reviews()),
	}
}

pub fn normalize_price(raw: Option<&Value>) -> f64 {
	normalize_amount(raw)
}

pub fn normalize_rating(raw: Option<&Value>) -> f64 {
	normalize_amount(raw)
}

pub fn normalize_count(raw: Option<&Value>) -> u64 {
	// Float to integer casts saturate, and the amount is already finite and non-negative.
	normalize_amount(raw).trunc() as u64
}

/// Keeps ASCII digits and decimal points, then parses what is left.
pub fn parse_numeric_text(raw: &str) -> f64 {
	let cleaned: String = raw.chars().filter(|ch| ch.is_ascii_digit() || *ch == '.').collect();

	if cleaned.len() >= MAX_NUMERIC_CHARS {
		return 0.0;
	}

	cleaned.parse::<f64>().unwrap_or(0.0)
}

fn normalize_amount(raw: Option<&Value>) -> f64 {
	let value = match raw {
		Some(Value::Number(number)) => number.as_f64().unwrap_or(0.0),
		Some(Value::String(text)) => parse_numeric_text(text),
		_ => 0.0,
	};

	if value.is_finite() && value > 0.0 { value } else { 0.0 }
}
