use std::time::Duration;

use reqwest::{Client, Url, header::CONTENT_TYPE};

use crate::{Error, Format, Result};

#[derive(Clone, Debug)]
pub struct FetchConfig {
	pub timeout_ms: u64,
	pub user_agent: String,
	pub max_bytes: u64,
}

/// A downloaded document and the format hint derived from its content type.
#[derive(Clone, Debug)]
pub struct Fetched {
	pub bytes: Vec<u8>,
	pub format_hint: String,
}

pub async fn fetch_url(cfg: &FetchConfig, url: &str) -> Result<Fetched> {
	let parsed = Url::parse(url).map_err(|err| fetch_error(url, err.to_string()))?;

	if !matches!(parsed.scheme(), "http" | "https") {
		return Err(fetch_error(url, "only http and https URLs are supported".to_string()));
	}

	let client = Client::builder()
		.timeout(Duration::from_millis(cfg.timeout_ms))
		.user_agent(cfg.user_agent.as_str())
		.build()
		.map_err(|err| fetch_error(url, err.to_string()))?;
	let mut res = client
		.get(parsed)
		.send()
		.await
		.and_then(|res| res.error_for_status())
		.map_err(|err| fetch_error(url, err.to_string()))?;

	if res.content_length().is_some_and(|len| len > cfg.max_bytes) {
		return Err(Error::TooLarge { limit: cfg.max_bytes });
	}

	let format_hint = format_hint_for(
		res.headers().get(CONTENT_TYPE).and_then(|value| value.to_str().ok()).unwrap_or_default(),
	);
	let mut bytes = Vec::new();

	while let Some(chunk) = res.chunk().await.map_err(|err| fetch_error(url, err.to_string()))? {
		if (bytes.len() + chunk.len()) as u64 > cfg.max_bytes {
			return Err(Error::TooLarge { limit: cfg.max_bytes });
		}

		bytes.extend_from_slice(&chunk);
	}

	tracing::debug!(url, bytes = bytes.len(), format = %format_hint, "Fetched remote document.");

	Ok(Fetched { bytes, format_hint })
}

/// Pages without a recognised document type are treated as HTML.
fn format_hint_for(content_type: &str) -> String {
	match Format::from_hint(content_type) {
		Some(format) => format.as_str().to_string(),
		None => Format::Html.as_str().to_string(),
	}
}

fn fetch_error(url: &str, message: String) -> Error {
	Error::Fetch { url: url.to_string(), message }
}
