use std::sync::Arc;

use serde::Serialize;

use crate::{Result, index::DocumentIndex};

/// A document selected for a query, tagged with its id.
#[derive(Clone, Debug)]
pub struct Candidate {
	pub doc_id: String,
	pub index: Arc<DocumentIndex>,
}

/// One merged retrieval result, as returned to callers in `sources`.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RetrievedChunk {
	pub text: String,
	pub score: f32,
	pub doc_id: String,
	pub source: String,
}

#[derive(Clone, Copy, Debug)]
pub struct RetrievalMerger {
	pub k_per_doc: usize,
	pub k_total: usize,
	pub min_score: f32,
}
impl RetrievalMerger {
	pub fn new(cfg: &docqa_config::Retrieval) -> Self {
		Self {
			k_per_doc: cfg.k_per_doc as usize,
			k_total: cfg.k_total as usize,
			min_score: cfg.min_score,
		}
	}

	/// Queries every candidate, keeps the `k_total` best results across all of them, then drops
	/// anything scoring at or below `min_score`.
	///
	/// Equal scores keep candidate order. An empty result means nothing relevant was found.
	pub fn retrieve(&self, query: &[f32], candidates: &[Candidate]) -> Result<Vec<RetrievedChunk>> {
		let mut merged = Vec::with_capacity(candidates.len() * self.k_per_doc);

		for candidate in candidates {
			for hit in candidate.index.query(query, self.k_per_doc)? {
				merged.push(RetrievedChunk {
					text: hit.text,
					score: hit.score,
					doc_id: candidate.doc_id.clone(),
					source: candidate.index.source().to_string(),
				});
			}
		}

		Ok(self.rank(merged))
	}

	fn rank(&self, mut merged: Vec<RetrievedChunk>) -> Vec<RetrievedChunk> {
		merged.sort_by(|a, b| b.score.total_cmp(&a.score));
		merged.truncate(self.k_total);
		merged.retain(|item| item.score > self.min_score);

		merged
	}
}
