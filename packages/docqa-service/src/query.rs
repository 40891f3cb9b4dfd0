use futures::{StreamExt, future, stream};
use serde::Serialize;
use time::OffsetDateTime;

use crate::{
	DocqaService, Error, Result, TokenStream,
	retrieval::{RetrievalMerger, RetrievedChunk},
	streaming::AnswerStreamer,
};

pub const NO_RELEVANT_ANSWER: &str =
	"No relevant information found in the documents to answer this question.";

#[derive(Clone, Debug)]
pub struct QueryRequest {
	pub session_id: String,
	pub question: String,
	/// Restricts retrieval to these documents. Unknown ids are ignored.
	pub doc_ids: Option<Vec<String>>,
}

#[derive(Clone, Debug, Serialize)]
pub struct QueryResponse {
	pub answer: String,
	pub sources: Vec<RetrievedChunk>,
}

impl DocqaService {
	pub async fn query(&self, req: QueryRequest) -> Result<QueryResponse> {
		let sources = self.retrieve(&req).await?;

		if sources.is_empty() {
			return Ok(QueryResponse { answer: NO_RELEVANT_ANSWER.to_string(), sources });
		}

		let context = context_of(&sources);
		let answer = self
			.providers
			.generator
			.answer(&self.cfg.providers.llm, req.question.trim(), &context)
			.await
			.inspect_err(|err| {
				tracing::error!(
					error = %err,
					session_id = %req.session_id,
					provider_id = %self.cfg.providers.llm.provider_id,
					"Answer generation failed."
				);
			})?;

		Ok(QueryResponse { answer, sources })
	}

	/// Retrieval errors are returned directly; generation errors arrive as an `error` event.
	pub async fn query_stream(&self, req: QueryRequest) -> Result<AnswerStreamer> {
		let sources = self.retrieve(&req).await?;
		let tokens: TokenStream = if sources.is_empty() {
			stream::once(future::ready(Ok(NO_RELEVANT_ANSWER.to_string()))).boxed()
		} else {
			let generator = self.providers.generator.clone();
			let cfg = self.cfg.providers.llm.clone();
			let question = req.question.trim().to_string();
			let context = context_of(&sources);

			stream::once(async move {
				match generator.answer_stream(&cfg, &question, &context).await {
					Ok(tokens) => tokens,
					Err(err) => stream::once(future::ready(Err(err))).boxed(),
				}
			})
			.flatten()
			.boxed()
		};

		Ok(AnswerStreamer::new(sources, tokens))
	}

	async fn retrieve(&self, req: &QueryRequest) -> Result<Vec<RetrievedChunk>> {
		let question = req.question.trim();

		if question.is_empty() {
			return Err(Error::InvalidInput { message: "q must be non-empty.".to_string() });
		}

		let handle = self.acquire(&req.session_id, OffsetDateTime::now_utc())?;
		let candidates = handle.session.lock().await.candidates(req.doc_ids.as_deref());

		if candidates.is_empty() {
			tracing::debug!(session_id = %handle.id, "No documents matched the query filter.");

			return Ok(Vec::new());
		}

		let cfg = &self.cfg.providers.embedding;
		let vectors = self
			.providers
			.embedder
			.embed(cfg, &[question.to_string()])
			.await
			.inspect_err(|err| {
				tracing::error!(
					error = %err,
					session_id = %handle.id,
					provider_id = %cfg.provider_id,
					"Failed to embed query."
				);
			})?;
		let Some(query) = vectors.into_iter().next() else {
			return Err(Error::Upstream { message: "Embedder returned no query vector.".to_string() });
		};

		// Documents keep the dimension they were embedded with.
		if let Some(candidate) =
			candidates.iter().find(|candidate| candidate.index.dimension() != query.len())
		{
			return Err(Error::Upstream {
				message: format!(
					"Query vector dimension mismatch: document {} expects {}, got {}.",
					candidate.doc_id,
					candidate.index.dimension(),
					query.len()
				),
			});
		}

		let sources = RetrievalMerger::new(&self.cfg.retrieval).retrieve(&query, &candidates)?;

		tracing::debug!(
			session_id = %handle.id,
			candidates = candidates.len(),
			sources = sources.len(),
			"Retrieved context."
		);

		Ok(sources)
	}
}

fn context_of(sources: &[RetrievedChunk]) -> Vec<String> {
	sources.iter().map(|source| source.text.clone()).collect()
}
