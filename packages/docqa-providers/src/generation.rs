use std::time::Duration;

use futures::{
	Stream, StreamExt,
	stream::{self, BoxStream},
};
use reqwest::Client;
use serde_json::Value;

use crate::{Error, Result};

/// Incremental answer text, in generation order.
pub type TokenStream = BoxStream<'static, Result<String>>;

pub fn build_prompt(question: &str, context: &[String]) -> String {
	format!(
		"You are a helpful assistant. Answer the following question based *only* on the provided \
		 context. If the answer is not available in the context, say 'I don't know'.\n\n\
		 Context:\n{}\n\nQuestion: {question}\n\nAnswer:",
		context.join("\n\n")
	)
}

pub async fn generate(
	cfg: &docqa_config::LlmProviderConfig,
	question: &str,
	context: &[String],
) -> Result<String> {
	let json: Value =
		send_completion(cfg, question, context, false).await?.error_for_status()?.json().await?;

	parse_completion(json)
}

/// Requests a streamed completion and yields content deltas as they arrive.
pub async fn generate_stream(
	cfg: &docqa_config::LlmProviderConfig,
	question: &str,
	context: &[String],
) -> Result<TokenStream> {
	let res = send_completion(cfg, question, context, true).await?.error_for_status()?;

	Ok(decode_sse(res.bytes_stream()))
}

async fn send_completion(
	cfg: &docqa_config::LlmProviderConfig,
	question: &str,
	context: &[String],
	stream: bool,
) -> Result<reqwest::Response> {
	let timeout = Duration::from_millis(cfg.timeout_ms);
	// A streamed answer may take longer than `timeout` overall, so only stalls are bounded.
	let client = if stream {
		Client::builder().connect_timeout(timeout).read_timeout(timeout).build()?
	} else {
		Client::builder().timeout(timeout).build()?
	};
	let url = format!("{}{}", cfg.api_base, cfg.path);
	let body = serde_json::json!({
		"model": cfg.model,
		"temperature": cfg.temperature,
		"stream": stream,
		"messages": [{ "role": "user", "content": build_prompt(question, context) }],
	});
	let res = client
		.post(url)
		.headers(crate::auth_headers(&cfg.api_key, &cfg.default_headers)?)
		.json(&body)
		.send()
		.await?;

	Ok(res)
}

fn parse_completion(json: Value) -> Result<String> {
	json.get("choices")
		.and_then(|v| v.as_array())
		.and_then(|arr| arr.first())
		.and_then(|choice| choice.get("message"))
		.and_then(|msg| msg.get("content"))
		.and_then(|c| c.as_str())
		.map(|content| content.trim().to_string())
		.ok_or_else(|| Error::InvalidResponse {
			message: "Completion response is missing message content.".to_string(),
		})
}

#[derive(Debug, PartialEq)]
enum SseLine {
	Token(String),
	Done,
	Skip,
}

fn parse_sse_line(line: &str) -> Result<SseLine> {
	let Some(payload) = line.strip_prefix("data:") else {
		return Ok(SseLine::Skip);
	};
	let payload = payload.trim();

	if payload == "[DONE]" {
		return Ok(SseLine::Done);
	}
	if payload.is_empty() {
		return Ok(SseLine::Skip);
	}

	let json: Value = serde_json::from_str(payload)?;
	let content = json
		.get("choices")
		.and_then(|v| v.as_array())
		.and_then(|arr| arr.first())
		.and_then(|choice| choice.get("delta"))
		.and_then(|delta| delta.get("content"))
		.and_then(|c| c.as_str());

	match content {
		Some(text) if !text.is_empty() => Ok(SseLine::Token(text.to_string())),
		_ => Ok(SseLine::Skip),
	}
}

struct SseState<S> {
	body: std::pin::Pin<Box<S>>,
	buffer: Vec<u8>,
	finished: bool,
}

fn decode_sse<S, B, E>(body: S) -> TokenStream
where
	S: Stream<Item = std::result::Result<B, E>> + Send + 'static,
	B: AsRef<[u8]> + Send + 'static,
	E: Into<Error> + Send + 'static,
{
	let state = SseState { body: Box::pin(body), buffer: Vec::new(), finished: false };

	stream::unfold(state, |mut state| async move {
		loop {
			if state.finished {
				return None;
			}

			if let Some(pos) = state.buffer.iter().position(|byte| *byte == b'\n') {
				let line: Vec<u8> = state.buffer.drain(..=pos).collect();
				let line = String::from_utf8_lossy(&line);

				match parse_sse_line(line.trim_end()) {
					Ok(SseLine::Token(token)) => return Some((Ok(token), state)),
					Ok(SseLine::Done) => return None,
					Ok(SseLine::Skip) => continue,
					Err(err) => {
						state.finished = true;

						return Some((Err(err), state));
					},
				}
			}

			match state.body.next().await {
				Some(Ok(bytes)) => state.buffer.extend_from_slice(bytes.as_ref()),
				Some(Err(err)) => {
					state.finished = true;

					return Some((Err(err.into()), state));
				},
				None => {
					state.finished = true;

					let rest = std::mem::take(&mut state.buffer);
					let rest = String::from_utf8_lossy(&rest);

					return match parse_sse_line(rest.trim()) {
						Ok(SseLine::Token(token)) => Some((Ok(token), state)),
						_ => None,
					};
				},
			}
		}
	})
	.boxed()
}
