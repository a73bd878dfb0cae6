use sift_config::Currency;

pub fn to_display_currency(amount_in_stored_unit: f64, rate: f64) -> f64 {
	amount_in_stored_unit * rate
}

pub fn to_stored_currency(amount_in_display_unit: f64, rate: f64) -> f64 {
	amount_in_display_unit / rate
}

/// Fixed-rate conversion between the currency prices are stored in and the one callers see.
///
/// Inbound price bounds are converted to the stored unit once, in the planner. Outbound prices
/// get a separate display field next to the stored one, so no field is converted twice.
#[derive(Clone, Debug, PartialEq)]
pub struct CurrencyAdapter {
	pub stored: String,
	pub display: String,
	pub rate: f64,
}
impl CurrencyAdapter {
	pub fn from_config(cfg: &Currency) -> Self {
		Self { stored: cfg.stored.clone(), display: cfg.display.clone(), rate: cfg.rate }
	}

	pub fn to_display(&self, amount: f64) -> f64 {
		to_display_currency(amount, self.rate)
	}

	pub fn to_stored(&self, amount: f64) -> f64 {
		to_stored_currency(amount, self.rate)
	}
}
