pub mod error;
pub mod llm;

pub use error::{Error, Result};
pub use llm::ApiStyle;

use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderName, HeaderValue};
use serde_json::{Map, Value};

const GEMINI_API_KEY_HEADER: &str = "x-goog-api-key";

pub fn auth_headers(
	style: ApiStyle,
	api_key: &str,
	default_headers: &Map<String, Value>,
) -> Result<HeaderMap> {
	let mut headers = HeaderMap::new();

	match style {
		ApiStyle::OpenAi => {
			headers.insert(AUTHORIZATION, format!("Bearer {api_key}").parse()?);
		},
		ApiStyle::Gemini => {
			headers.insert(HeaderName::from_static(GEMINI_API_KEY_HEADER), api_key.parse()?);
		},
	}

	for (key, value) in default_headers {
		let Some(raw) = value.as_str() else {
			return Err(Error::InvalidConfig {
				message: "Default header values must be strings.".to_string(),
			});
		};

		headers.insert(HeaderName::from_bytes(key.as_bytes())?, HeaderValue::from_str(raw)?);
	}

	Ok(headers)
}
