//! Single-turn text generation against an LLM endpoint.
//!
//! Two wire formats are supported: OpenAI-compatible chat completions and Gemini
//! `generateContent`. Callers get the answer text and decide how to parse it.

use std::time::Duration;

use reqwest::Client;
use serde_json::Value;

use sift_config::LlmProviderConfig;

use crate::{Error, Result};

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ApiStyle {
	OpenAi,
	Gemini,
}
impl ApiStyle {
	pub fn parse(raw: &str) -> Result<Self> {
		match raw.trim().to_ascii_lowercase().as_str() {
			"openai" => Ok(Self::OpenAi),
			"gemini" => Ok(Self::Gemini),
			other => Err(Error::InvalidConfig { message: format!("Unknown api_style {other:?}.") }),
		}
	}
}

/// Sends one system/user prompt pair and returns the generated text.
pub async fn complete(cfg: &LlmProviderConfig, system: &str, user: &str) -> Result<String> {
	let style = ApiStyle::parse(&cfg.api_style)?;
	let client = Client::builder().timeout(Duration::from_millis(cfg.timeout_ms)).build()?;
	let url = format!("{}{}", cfg.api_base, cfg.path);
	let body = build_request_body(style, cfg, system, user);
	let res = client
		.post(url)
		.headers(crate::auth_headers(style, &cfg.api_key, &cfg.default_headers)?)
		.json(&body)
		.send()
		.await?;
	let json: Value = res.error_for_status()?.json().await?;

	parse_completion_text(style, &json)
}

pub fn build_request_body(
	style: ApiStyle,
	cfg: &LlmProviderConfig,
	system: &str,
	user: &str,
) -> Value {
	match style {
		ApiStyle::OpenAi => serde_json::json!({
			"model": cfg.model,
			"temperature": cfg.temperature,
			"messages": [
				{ "role": "system", "content": system },
				{ "role": "user", "content": user }
			],
		}),
		ApiStyle::Gemini => serde_json::json!({
			"systemInstruction": { "parts": [{ "text": system }] },
			"contents": [{ "role": "user", "parts": [{ "text": user }] }],
			"generationConfig": { "temperature": cfg.temperature },
		}),
	}
}

pub fn parse_completion_text(style: ApiStyle, json: &Value) -> Result<String> {
	let text = match style {
		ApiStyle::OpenAi => json
			.get("choices")
			.and_then(|v| v.as_array())
			.and_then(|arr| arr.first())
			.and_then(|choice| choice.get("message"))
			.and_then(|msg| msg.get("content"))
			.and_then(|c| c.as_str())
			.map(str::to_string),
		ApiStyle::Gemini => json
			.get("candidates")
			.and_then(|v| v.as_array())
			.and_then(|arr| arr.first())
			.and_then(|candidate| candidate.get("content"))
			.and_then(|content| content.get("parts"))
			.and_then(|parts| parts.as_array())
			.map(|parts| {
				parts.iter().filter_map(|part| part.get("text").and_then(|t| t.as_str())).collect()
			}),
	};

	match text {
		Some(text) if !text.trim().is_empty() => Ok(text),
		_ => Err(Error::InvalidResponse {
			message: "Completion response is missing answer text.".to_string(),
		}),
	}
}
