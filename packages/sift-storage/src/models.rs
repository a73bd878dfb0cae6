use serde_json::Value;

/// One `products` row as returned by a compiled page query.
#[derive(Debug, sqlx::FromRow)]
pub struct ProductRow {
	pub product_id: i64,
	pub doc: Value,
	pub text_score: Option<f64>,
}
