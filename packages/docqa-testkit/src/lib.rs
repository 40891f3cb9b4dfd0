//! Deterministic in-process collaborators for service and HTTP tests.

use std::sync::{
	Arc, Mutex,
	atomic::{AtomicBool, AtomicUsize, Ordering},
};

use ahash::AHashMap;
use color_eyre::eyre;
use futures::{StreamExt, stream};
use serde_json::Map;

use docqa_config::{
	Config, EmbeddingProviderConfig, Ingest, LlmProviderConfig, Providers as ProviderConfigs,
	Retrieval, Service, Session,
};
use docqa_extract::{FetchConfig, Fetched};
use docqa_service::{BoxFuture, DocqaService, Embedder, Generator, Loader, Providers, TokenStream};

pub const TEST_DIMENSIONS: u32 = 64;

pub fn test_config() -> Config {
	Config {
		service: Service {
			http_bind: "127.0.0.1:0".to_string(),
			log_level: "info".to_string(),
			cors_allow_any: true,
		},
		session: Session::default(),
		ingest: Ingest {
			max_upload_bytes: 64 * 1024,
			max_chars: 200,
			overlap_chars: 20,
			fetch_timeout_ms: 1_000,
			user_agent: "docqa-test".to_string(),
		},
		retrieval: Retrieval::default(),
		providers: ProviderConfigs {
			embedding: EmbeddingProviderConfig {
				provider_id: "test".to_string(),
				api_base: "http://127.0.0.1:9".to_string(),
				api_key: "test-key".to_string(),
				api_key_env: None,
				path: "/embeddings".to_string(),
				model: "vocabulary".to_string(),
				dimensions: TEST_DIMENSIONS,
				timeout_ms: 1_000,
				default_headers: Map::new(),
			},
			llm: LlmProviderConfig {
				provider_id: "test".to_string(),
				api_base: "http://127.0.0.1:9".to_string(),
				api_key: "test-key".to_string(),
				api_key_env: None,
				path: "/chat/completions".to_string(),
				model: "scripted".to_string(),
				temperature: 0.0,
				timeout_ms: 1_000,
				default_headers: Map::new(),
			},
		},
	}
}

/// Bag-of-words embedder: every distinct word gets its own dimension, in first-seen order.
///
/// Texts with disjoint vocabularies are orthogonal, so they score `1 / 3` against each other.
#[derive(Default)]
pub struct VocabEmbedder {
	vocabulary: Mutex<AHashMap<String, usize>>,
	embedded: Mutex<Vec<String>>,
	calls: AtomicUsize,
	fail: AtomicBool,
}
impl VocabEmbedder {
	pub fn new() -> Arc<Self> {
		Arc::new(Self::default())
	}

	/// Every text sent to the embedder so far, in call order.
	pub fn embedded(&self) -> Vec<String> {
		self.embedded.lock().unwrap_or_else(|err| err.into_inner()).clone()
	}

	pub fn calls(&self) -> usize {
		self.calls.load(Ordering::SeqCst)
	}

	pub fn set_failing(&self, fail: bool) {
		self.fail.store(fail, Ordering::SeqCst);
	}

	fn vector_for(&self, text: &str, dimensions: usize) -> Vec<f32> {
		let mut vocabulary = self.vocabulary.lock().unwrap_or_else(|err| err.into_inner());
		let mut vector = vec![0.0_f32; dimensions];

		for word in words(text) {
			let next = vocabulary.len();
			let slot = *vocabulary.entry(word).or_insert(next);

			vector[slot % dimensions] += 1.0;
		}

		let norm = vector.iter().map(|value| value * value).sum::<f32>().sqrt();

		if norm > 0.0 {
			vector.iter_mut().for_each(|value| *value /= norm);
		}

		vector
	}
}

impl Embedder for VocabEmbedder {
	fn embed<'a>(
		&'a self,
		cfg: &'a EmbeddingProviderConfig,
		texts: &'a [String],
	) -> BoxFuture<'a, color_eyre::Result<Vec<Vec<f32>>>> {
		Box::pin(async move {
			self.calls.fetch_add(1, Ordering::SeqCst);

			if self.fail.load(Ordering::SeqCst) {
				return Err(eyre::eyre!("embedding backend unavailable"));
			}

			self.embedded.lock().unwrap_or_else(|err| err.into_inner()).extend_from_slice(texts);

			let dimensions = (cfg.dimensions as usize).max(1);

			Ok(texts.iter().map(|text| self.vector_for(text, dimensions)).collect())
		})
	}
}

/// Answers with a fixed token script and records the context it was given.
pub struct ScriptedGenerator {
	tokens: Vec<String>,
	fail_after: Option<usize>,
	contexts: Mutex<Vec<Vec<String>>>,
}
impl ScriptedGenerator {
	pub fn new(tokens: &[&str]) -> Arc<Self> {
		Arc::new(Self {
			tokens: tokens.iter().map(|token| token.to_string()).collect(),
			fail_after: None,
			contexts: Mutex::new(Vec::new()),
		})
	}

	/// Streams the first `count` tokens, then fails. Buffered answers fail outright.
	pub fn failing_after(tokens: &[&str], count: usize) -> Arc<Self> {
		Arc::new(Self {
			tokens: tokens.iter().map(|token| token.to_string()).collect(),
			fail_after: Some(count),
			contexts: Mutex::new(Vec::new()),
		})
	}

	pub fn contexts(&self) -> Vec<Vec<String>> {
		self.contexts.lock().unwrap_or_else(|err| err.into_inner()).clone()
	}

	fn record(&self, context: &[String]) {
		self.contexts.lock().unwrap_or_else(|err| err.into_inner()).push(context.to_vec());
	}
}

impl Generator for ScriptedGenerator {
	fn answer<'a>(
		&'a self,
		_cfg: &'a LlmProviderConfig,
		_question: &'a str,
		context: &'a [String],
	) -> BoxFuture<'a, color_eyre::Result<String>> {
		Box::pin(async move {
			self.record(context);

			if self.fail_after.is_some() {
				return Err(eyre::eyre!("generation backend unavailable"));
			}

			Ok(self.tokens.concat())
		})
	}

	fn answer_stream<'a>(
		&'a self,
		_cfg: &'a LlmProviderConfig,
		_question: &'a str,
		context: &'a [String],
	) -> BoxFuture<'a, color_eyre::Result<TokenStream>> {
		Box::pin(async move {
			self.record(context);

			let mut items: Vec<color_eyre::Result<String>> = Vec::new();

			for (idx, token) in self.tokens.iter().enumerate() {
				if self.fail_after == Some(idx) {
					items.push(Err(eyre::eyre!("generation stopped after {idx} tokens")));

					break;
				}

				items.push(Ok(token.clone()));
			}

			if self.fail_after.is_some_and(|count| count >= self.tokens.len()) {
				items.push(Err(eyre::eyre!("generation stopped after {} tokens", self.tokens.len())));
			}

			Ok(stream::iter(items).boxed())
		})
	}
}

/// Serves fetched pages from memory and extracts with the real extractor.
#[derive(Default)]
pub struct PageLoader {
	pages: AHashMap<String, Fetched>,
}
impl PageLoader {
	pub fn with_page(mut self, url: &str, body: &str, format_hint: &str) -> Self {
		self.pages.insert(
			url.to_string(),
			Fetched { bytes: body.as_bytes().to_vec(), format_hint: format_hint.to_string() },
		);

		self
	}
}

impl Loader for PageLoader {
	fn extract(&self, bytes: &[u8], format_hint: &str) -> docqa_extract::Result<String> {
		docqa_extract::extract_text(bytes, format_hint)
	}

	fn fetch<'a>(
		&'a self,
		cfg: &'a FetchConfig,
		url: &'a str,
	) -> BoxFuture<'a, docqa_extract::Result<Fetched>> {
		Box::pin(async move {
			let fetched = self.pages.get(url).cloned().ok_or_else(|| docqa_extract::Error::Fetch {
				url: url.to_string(),
				message: "404 Not Found".to_string(),
			})?;

			if fetched.bytes.len() as u64 > cfg.max_bytes {
				return Err(docqa_extract::Error::TooLarge { limit: cfg.max_bytes });
			}

			Ok(fetched)
		})
	}
}

/// A service wired to the given models, using the built-in loader and splitter.
pub fn test_service(
	cfg: Config,
	embedder: Arc<VocabEmbedder>,
	generator: Arc<ScriptedGenerator>,
) -> DocqaService {
	DocqaService::with_providers(cfg, Providers::with_models(embedder, generator))
}

fn words(text: &str) -> impl Iterator<Item = String> + '_ {
	text.split(|ch: char| !ch.is_alphanumeric())
		.filter(|word| !word.is_empty())
		.map(str::to_lowercase)
}
