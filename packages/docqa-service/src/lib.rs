pub mod cache;
pub mod documents;
pub mod index;
pub mod query;
pub mod retrieval;
pub mod session;
pub mod sessions;
pub mod store;
pub mod streaming;
pub mod time_serde;

mod error;

pub use cache::EmbeddingCache;
pub use documents::{DocumentSummary, IngestRequest, IngestResponse, IngestSource};
pub use error::{Error, Result};
pub use index::{AnnIndex, ChunkMatch, DocumentIndex, FlatL2Index};
pub use query::{NO_RELEVANT_ANSWER, QueryRequest, QueryResponse};
pub use retrieval::{Candidate, RetrievalMerger, RetrievedChunk};
pub use session::{AccessClock, Session};
pub use sessions::{
	CreateSessionResponse, RefreshResponse, ServiceHealth, SessionHealth, SessionStatus,
};
pub use store::{SessionHandle, SessionStore};
pub use streaming::{AnswerEvent, AnswerStreamer};

use std::{future::Future, pin::Pin, sync::Arc};

use futures::{StreamExt, stream::BoxStream};

use docqa_config::{Config, EmbeddingProviderConfig, LlmProviderConfig};
use docqa_extract::{FetchConfig, Fetched};
use docqa_providers::{embedding, generation};

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Incremental answer text from a [`Generator`].
pub type TokenStream = BoxStream<'static, color_eyre::Result<String>>;

pub trait Embedder
where
	Self: Send + Sync,
{
	/// Returns one vector per input, in input order.
	fn embed<'a>(
		&'a self,
		cfg: &'a EmbeddingProviderConfig,
		texts: &'a [String],
	) -> BoxFuture<'a, color_eyre::Result<Vec<Vec<f32>>>>;
}

pub trait Generator
where
	Self: Send + Sync,
{
	fn answer<'a>(
		&'a self,
		cfg: &'a LlmProviderConfig,
		question: &'a str,
		context: &'a [String],
	) -> BoxFuture<'a, color_eyre::Result<String>>;

	fn answer_stream<'a>(
		&'a self,
		cfg: &'a LlmProviderConfig,
		question: &'a str,
		context: &'a [String],
	) -> BoxFuture<'a, color_eyre::Result<TokenStream>>;
}

pub trait Loader
where
	Self: Send + Sync,
{
	/// Blocking. Called from the blocking thread pool.
	fn extract(&self, bytes: &[u8], format_hint: &str) -> docqa_extract::Result<String>;

	fn fetch<'a>(
		&'a self,
		cfg: &'a FetchConfig,
		url: &'a str,
	) -> BoxFuture<'a, docqa_extract::Result<Fetched>>;
}

pub trait Splitter
where
	Self: Send + Sync,
{
	/// Every returned chunk holds at most `max_chars` characters.
	fn split(&self, text: &str, max_chars: u32, overlap_chars: u32) -> Vec<String>;
}

#[derive(Clone)]
pub struct Providers {
	pub embedder: Arc<dyn Embedder>,
	pub generator: Arc<dyn Generator>,
	pub loader: Arc<dyn Loader>,
	pub splitter: Arc<dyn Splitter>,
}
impl Providers {
	pub fn new(
		embedder: Arc<dyn Embedder>,
		generator: Arc<dyn Generator>,
		loader: Arc<dyn Loader>,
		splitter: Arc<dyn Splitter>,
	) -> Self {
		Self { embedder, generator, loader, splitter }
	}

	/// Custom models with the built-in loader and splitter.
	pub fn with_models(embedder: Arc<dyn Embedder>, generator: Arc<dyn Generator>) -> Self {
		let provider = Arc::new(DefaultProviders);

		Self { embedder, generator, loader: provider.clone(), splitter: provider }
	}
}

impl Default for Providers {
	fn default() -> Self {
		let provider = Arc::new(DefaultProviders);

		Self {
			embedder: provider.clone(),
			generator: provider.clone(),
			loader: provider.clone(),
			splitter: provider,
		}
	}
}

pub struct DocqaService {
	pub cfg: Config,
	pub sessions: Arc<SessionStore>,
	pub providers: Providers,
}
impl DocqaService {
	pub fn new(cfg: Config) -> Self {
		Self::with_providers(cfg, Providers::default())
	}

	pub fn with_providers(cfg: Config, providers: Providers) -> Self {
		Self { cfg, sessions: Arc::new(SessionStore::new()), providers }
	}

	pub fn idle_timeout(&self) -> time::Duration {
		time::Duration::seconds(i64::try_from(self.cfg.session.idle_timeout_secs).unwrap_or(i64::MAX))
	}

	/// Starts the background eviction sweep on the configured interval.
	pub fn spawn_sweeper(&self) -> tokio::task::JoinHandle<()> {
		self.sessions.clone().spawn_sweeper(
			std::time::Duration::from_secs(self.cfg.session.sweep_interval_secs),
			self.idle_timeout(),
		)
	}

	/// Looks up and touches a session for an operation that uses it.
	pub(crate) fn acquire(
		&self,
		session_id: &str,
		now: time::OffsetDateTime,
	) -> Result<SessionHandle> {
		if self.cfg.session.reject_expired_on_access {
			self.sessions.touch_live(session_id, now, self.idle_timeout())
		} else {
			self.sessions.touch(session_id, now)
		}
	}
}

struct DefaultProviders;

impl Embedder for DefaultProviders {
	fn embed<'a>(
		&'a self,
		cfg: &'a EmbeddingProviderConfig,
		texts: &'a [String],
	) -> BoxFuture<'a, color_eyre::Result<Vec<Vec<f32>>>> {
		Box::pin(async move { Ok(embedding::embed(cfg, texts).await?) })
	}
}

impl Generator for DefaultProviders {
	fn answer<'a>(
		&'a self,
		cfg: &'a LlmProviderConfig,
		question: &'a str,
		context: &'a [String],
	) -> BoxFuture<'a, color_eyre::Result<String>> {
		Box::pin(async move { Ok(generation::generate(cfg, question, context).await?) })
	}

	fn answer_stream<'a>(
		&'a self,
		cfg: &'a LlmProviderConfig,
		question: &'a str,
		context: &'a [String],
	) -> BoxFuture<'a, color_eyre::Result<TokenStream>> {
		Box::pin(async move {
			let tokens = generation::generate_stream(cfg, question, context).await?;

			Ok(tokens.map(|token| token.map_err(color_eyre::Report::from)).boxed())
		})
	}
}

impl Loader for DefaultProviders {
	fn extract(&self, bytes: &[u8], format_hint: &str) -> docqa_extract::Result<String> {
		docqa_extract::extract_text(bytes, format_hint)
	}

	fn fetch<'a>(
		&'a self,
		cfg: &'a FetchConfig,
		url: &'a str,
	) -> BoxFuture<'a, docqa_extract::Result<Fetched>> {
		Box::pin(docqa_extract::fetch_url(cfg, url))
	}
}

impl Splitter for DefaultProviders {
	fn split(&self, text: &str, max_chars: u32, overlap_chars: u32) -> Vec<String> {
		docqa_chunking::split_text(text, &docqa_chunking::ChunkingConfig { max_chars, overlap_chars })
	}
}
