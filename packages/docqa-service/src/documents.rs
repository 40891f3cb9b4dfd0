use serde::Serialize;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{DocqaService, Error, Result, index::DocumentIndex};
use docqa_extract::FetchConfig;

#[derive(Clone, Debug)]
pub enum IngestSource {
	/// Uploaded bytes; the filename extension selects the format.
	Upload { filename: String, bytes: Vec<u8> },
	/// A page or file fetched over HTTP; the response content type selects the format.
	Url { url: String },
}

#[derive(Clone, Debug)]
pub struct IngestRequest {
	pub session_id: String,
	pub source: IngestSource,
}

#[derive(Clone, Debug, Serialize)]
pub struct IngestResponse {
	pub doc_id: String,
	pub source: String,
	pub chunk_count: usize,
}

#[derive(Clone, Debug, Serialize)]
pub struct DocumentSummary {
	pub doc_id: String,
	pub source: String,
	pub chunk_count: usize,
}

struct LoadedSource {
	label: String,
	bytes: Vec<u8>,
	format_hint: String,
}

impl DocqaService {
	/// Extracts, splits, embeds and indexes one document into a session.
	///
	/// The document becomes visible only once every chunk has a vector.
	pub async fn ingest(&self, req: IngestRequest) -> Result<IngestResponse> {
		let handle = self.acquire(&req.session_id, OffsetDateTime::now_utc())?;
		let LoadedSource { label, bytes, format_hint } = self.load_source(req.source).await?;
		let chunks = self.extract_chunks(label.clone(), bytes, format_hint).await?;

		let mut session = handle.session.lock().await;
		let vectors = session
			.resolve_embeddings(
				self.providers.embedder.as_ref(),
				&self.cfg.providers.embedding,
				&chunks,
			)
			.await
			.inspect_err(|err| {
				tracing::error!(
					error = %err,
					session_id = %handle.id,
					provider_id = %self.cfg.providers.embedding.provider_id,
					"Failed to embed chunks."
				);
			})?;
		let chunk_count = chunks.len();
		let index = DocumentIndex::build(label.clone(), chunks, vectors)?;
		let doc_id = Uuid::new_v4().simple().to_string();

		session.add_document(doc_id.clone(), index, OffsetDateTime::now_utc());

		tracing::info!(
			session_id = %handle.id,
			doc_id = %doc_id,
			source = %label,
			chunk_count,
			"Document ingested."
		);

		Ok(IngestResponse { doc_id, source: label, chunk_count })
	}

	pub async fn list_documents(&self, session_id: &str) -> Result<Vec<DocumentSummary>> {
		let handle = self.acquire(session_id, OffsetDateTime::now_utc())?;
		let session = handle.session.lock().await;

		Ok(session
			.all_documents()
			.map(|(doc_id, index)| DocumentSummary {
				doc_id: doc_id.to_string(),
				source: index.source().to_string(),
				chunk_count: index.chunks().len(),
			})
			.collect())
	}

	pub async fn delete_document(&self, session_id: &str, doc_id: &str) -> Result<()> {
		let handle = self.acquire(session_id, OffsetDateTime::now_utc())?;
		let mut session = handle.session.lock().await;

		if !session.remove_document(doc_id, OffsetDateTime::now_utc()) {
			return Err(Error::NotFound {
				message: format!("Document {doc_id} not found in session {session_id}."),
			});
		}

		tracing::info!(session_id, doc_id, "Document removed.");

		Ok(())
	}

	/// Extraction and splitting are CPU-bound, so both run on a blocking thread.
	async fn extract_chunks(
		&self,
		label: String,
		bytes: Vec<u8>,
		format_hint: String,
	) -> Result<Vec<String>> {
		let loader = self.providers.loader.clone();
		let splitter = self.providers.splitter.clone();
		let max_chars = self.cfg.ingest.max_chars;
		let overlap_chars = self.cfg.ingest.overlap_chars;

		tokio::task::spawn_blocking(move || -> Result<Vec<String>> {
			let text = loader.extract(&bytes, &format_hint)?;

			if text.trim().is_empty() {
				return Err(Error::InvalidInput {
					message: format!("No text could be extracted from {label}."),
				});
			}

			let chunks = splitter.split(&text, max_chars, overlap_chars);

			if chunks.is_empty() {
				return Err(Error::InvalidInput {
					message: format!("No chunks could be produced from {label}."),
				});
			}

			Ok(chunks)
		})
		.await?
	}

	async fn load_source(&self, source: IngestSource) -> Result<LoadedSource> {
		let max_bytes = self.cfg.ingest.max_upload_bytes;

		match source {
			IngestSource::Upload { filename, bytes } => {
				if bytes.len() as u64 > max_bytes {
					return Err(Error::PayloadTooLarge {
						message: format!("Upload exceeds the {max_bytes} byte limit."),
					});
				}

				let format_hint = docqa_extract::hint_from_filename(&filename);

				Ok(LoadedSource { label: filename, bytes, format_hint })
			},
			IngestSource::Url { url } => {
				let url = url.trim().to_string();

				if url.is_empty() {
					return Err(Error::InvalidInput { message: "url must be non-empty.".to_string() });
				}

				let cfg = FetchConfig {
					timeout_ms: self.cfg.ingest.fetch_timeout_ms,
					user_agent: self.cfg.ingest.user_agent.clone(),
					max_bytes,
				};
				let fetched = self.providers.loader.fetch(&cfg, &url).await.inspect_err(|err| {
					tracing::error!(error = %err, url = %url, "Failed to fetch document.");
				})?;

				Ok(LoadedSource { label: url, bytes: fetched.bytes, format_hint: fetched.format_hint })
			},
		}
	}
}
