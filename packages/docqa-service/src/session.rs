use std::sync::{
	Arc,
	atomic::{AtomicI64, AtomicUsize, Ordering},
};

use ahash::AHashSet;
use time::OffsetDateTime;

use crate::{
	Embedder, Error, Result, cache::EmbeddingCache, index::DocumentIndex, retrieval::Candidate,
};
use docqa_config::EmbeddingProviderConfig;

/// Last-activity timestamp that only moves forward.
#[derive(Debug)]
pub struct AccessClock {
	nanos: AtomicI64,
}
impl AccessClock {
	pub fn new(now: OffsetDateTime) -> Self {
		Self { nanos: AtomicI64::new(unix_nanos(now)) }
	}

	pub fn touch(&self, now: OffsetDateTime) {
		self.nanos.fetch_max(unix_nanos(now), Ordering::AcqRel);
	}

	pub fn last_accessed(&self) -> OffsetDateTime {
		OffsetDateTime::from_unix_timestamp_nanos(i128::from(self.nanos.load(Ordering::Acquire)))
			.unwrap_or(OffsetDateTime::UNIX_EPOCH)
	}

	pub fn is_expired(&self, now: OffsetDateTime, timeout: time::Duration) -> bool {
		now - self.last_accessed() > timeout
	}
}

pub struct Session {
	id: String,
	created_at: OffsetDateTime,
	clock: Arc<AccessClock>,
	// Ingestion order; query candidates are enumerated in this order.
	documents: Vec<(String, Arc<DocumentIndex>)>,
	// Mirrors `documents.len()` for readers that do not hold the session lock.
	document_count: Arc<AtomicUsize>,
	cache: EmbeddingCache,
}
impl Session {
	pub fn new(id: String, now: OffsetDateTime) -> Self {
		Self {
			id,
			created_at: now,
			clock: Arc::new(AccessClock::new(now)),
			documents: Vec::new(),
			document_count: Arc::new(AtomicUsize::new(0)),
			cache: EmbeddingCache::default(),
		}
	}

	pub fn id(&self) -> &str {
		&self.id
	}

	pub fn created_at(&self) -> OffsetDateTime {
		self.created_at
	}

	pub fn clock(&self) -> &Arc<AccessClock> {
		&self.clock
	}

	pub fn document_counter(&self) -> &Arc<AtomicUsize> {
		&self.document_count
	}

	pub fn last_accessed(&self) -> OffsetDateTime {
		self.clock.last_accessed()
	}

	pub fn touch(&self, now: OffsetDateTime) {
		self.clock.touch(now);
	}

	pub fn cache(&self) -> &EmbeddingCache {
		&self.cache
	}

	pub fn add_document(&mut self, doc_id: String, index: DocumentIndex, now: OffsetDateTime) {
		let index = Arc::new(index);

		match self.documents.iter_mut().find(|(id, _)| *id == doc_id) {
			Some(entry) => entry.1 = index,
			None => self.documents.push((doc_id, index)),
		}

		self.document_count.store(self.documents.len(), Ordering::Release);
		self.touch(now);
	}

	pub fn remove_document(&mut self, doc_id: &str, now: OffsetDateTime) -> bool {
		let before = self.documents.len();

		self.documents.retain(|(id, _)| id != doc_id);
		self.document_count.store(self.documents.len(), Ordering::Release);
		self.touch(now);

		self.documents.len() != before
	}

	pub fn get_document(&self, doc_id: &str) -> Option<&Arc<DocumentIndex>> {
		self.documents.iter().find(|(id, _)| id == doc_id).map(|(_, index)| index)
	}

	pub fn all_documents(&self) -> impl Iterator<Item = (&str, &Arc<DocumentIndex>)> {
		self.documents.iter().map(|(id, index)| (id.as_str(), index))
	}

	pub fn document_count(&self) -> usize {
		self.documents.len()
	}

	/// Documents to search. With a filter, only ids that exist are kept, in filter order;
	/// unknown ids are skipped.
	pub fn candidates(&self, filter: Option<&[String]>) -> Vec<Candidate> {
		let Some(filter) = filter else {
			return self
				.documents
				.iter()
				.map(|(id, index)| Candidate { doc_id: id.clone(), index: index.clone() })
				.collect();
		};
		let mut seen = AHashSet::new();

		filter
			.iter()
			.filter(|id| seen.insert(id.as_str()))
			.filter_map(|id| {
				self.get_document(id)
					.map(|index| Candidate { doc_id: id.clone(), index: index.clone() })
			})
			.collect()
	}

	/// Returns one vector per chunk, in order, embedding only text the session has not seen.
	///
	/// Repeated text within `chunks` is sent to the embedder once.
	pub async fn resolve_embeddings(
		&mut self,
		embedder: &dyn Embedder,
		cfg: &EmbeddingProviderConfig,
		chunks: &[String],
	) -> Result<Vec<Vec<f32>>> {
		let mut seen = AHashSet::new();
		let missing: Vec<String> = chunks
			.iter()
			.filter(|chunk| !self.cache.contains(chunk))
			.filter(|chunk| seen.insert(chunk.as_str()))
			.cloned()
			.collect();

		if !missing.is_empty() {
			let vectors = embedder.embed(cfg, &missing).await?;

			if vectors.len() != missing.len() {
				return Err(Error::Upstream {
					message: format!(
						"Embedder returned {} vectors for {} inputs.",
						vectors.len(),
						missing.len()
					),
				});
			}
			if vectors.iter().any(|vector| vector.len() != cfg.dimensions as usize) {
				return Err(Error::Upstream {
					message: format!(
						"Embedder returned vectors without the configured dimension {}.",
						cfg.dimensions
					),
				});
			}

			tracing::debug!(
				session_id = %self.id,
				requested = chunks.len(),
				embedded = missing.len(),
				"Embedded uncached chunks."
			);

			for (text, vector) in missing.into_iter().zip(vectors) {
				self.cache.insert(text, vector);
			}
		}

		chunks
			.iter()
			.map(|chunk| {
				self.cache.get(chunk).cloned().ok_or_else(|| Error::Upstream {
					message: "Embedding cache is missing a resolved chunk.".to_string(),
				})
			})
			.collect()
	}
}

fn unix_nanos(at: OffsetDateTime) -> i64 {
	i64::try_from(at.unix_timestamp_nanos()).unwrap_or(i64::MAX)
}
