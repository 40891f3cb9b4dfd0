use crate::{Error, Result};

/// Nearest-neighbour search over fixed-dimension vectors.
///
/// Vector ids are assigned densely in insertion order, starting at zero.
pub trait AnnIndex
where
	Self: Send + Sync,
{
	fn dimension(&self) -> usize;

	fn len(&self) -> usize;

	fn is_empty(&self) -> bool {
		self.len() == 0
	}

	fn add(&mut self, vectors: &[Vec<f32>]) -> Result<()>;

	/// Returns up to `k` `(id, distance)` pairs, closest first.
	fn search(&self, query: &[f32], k: usize) -> Result<Vec<(usize, f32)>>;
}

/// Exact search by squared Euclidean distance over a contiguous buffer.
#[derive(Debug)]
pub struct FlatL2Index {
	dimension: usize,
	data: Vec<f32>,
}
impl FlatL2Index {
	pub fn new(dimension: usize) -> Self {
		Self { dimension, data: Vec::new() }
	}

	fn check_dimension(&self, len: usize) -> Result<()> {
		if len != self.dimension {
			return Err(Error::InvalidInput {
				message: format!(
					"Vector dimension mismatch: expected {}, got {len}.",
					self.dimension
				),
			});
		}

		Ok(())
	}
}

impl AnnIndex for FlatL2Index {
	fn dimension(&self) -> usize {
		self.dimension
	}

	fn len(&self) -> usize {
		if self.dimension == 0 { 0 } else { self.data.len() / self.dimension }
	}

	fn add(&mut self, vectors: &[Vec<f32>]) -> Result<()> {
		for vector in vectors {
			self.check_dimension(vector.len())?;
		}

		self.data.reserve(vectors.len() * self.dimension);

		for vector in vectors {
			self.data.extend_from_slice(vector);
		}

		Ok(())
	}

	fn search(&self, query: &[f32], k: usize) -> Result<Vec<(usize, f32)>> {
		self.check_dimension(query.len())?;

		let k = k.min(self.len());

		if k == 0 {
			return Ok(Vec::new());
		}

		let mut scored: Vec<(usize, f32)> = self
			.data
			.chunks_exact(self.dimension)
			.enumerate()
			.map(|(id, stored)| (id, squared_l2(stored, query)))
			.collect();

		scored.sort_by(|a, b| a.1.total_cmp(&b.1));
		scored.truncate(k);

		Ok(scored)
	}
}

/// A chunk returned from [`DocumentIndex::query`].
#[derive(Clone, Debug, PartialEq)]
pub struct ChunkMatch {
	pub text: String,
	pub score: f32,
}

/// The searchable form of one ingested document.
pub struct DocumentIndex {
	source: String,
	chunks: Vec<String>,
	index: Box<dyn AnnIndex>,
}
impl DocumentIndex {
	/// Indexes `vectors[i]` under id `i` so that it maps back to `chunks[i]`.
	pub fn build(source: String, chunks: Vec<String>, vectors: Vec<Vec<f32>>) -> Result<Self> {
		if chunks.is_empty() {
			return Err(Error::InvalidInput {
				message: "Document produced no chunks to index.".to_string(),
			});
		}
		if chunks.len() != vectors.len() {
			return Err(Error::InvalidInput {
				message: format!(
					"Chunk and vector counts differ: {} chunks, {} vectors.",
					chunks.len(),
					vectors.len()
				),
			});
		}

		let dimension = vectors[0].len();

		if dimension == 0 {
			return Err(Error::InvalidInput { message: "Vectors must not be empty.".to_string() });
		}

		let mut index = FlatL2Index::new(dimension);

		index.add(&vectors)?;

		Ok(Self { source, chunks, index: Box::new(index) })
	}

	pub fn source(&self) -> &str {
		&self.source
	}

	pub fn chunks(&self) -> &[String] {
		&self.chunks
	}

	pub fn vector_count(&self) -> usize {
		self.index.len()
	}

	pub fn dimension(&self) -> usize {
		self.index.dimension()
	}

	/// Scores are `1 / (1 + distance)`, so they fall in `(0, 1]` and grow as vectors get closer.
	pub fn query(&self, query: &[f32], k: usize) -> Result<Vec<ChunkMatch>> {
		if self.index.is_empty() {
			return Ok(Vec::new());
		}

		let hits = self.index.search(query, k)?;

		Ok(hits
			.into_iter()
			.filter_map(|(id, distance)| {
				self.chunks
					.get(id)
					.map(|text| ChunkMatch { text: text.clone(), score: 1.0 / (1.0 + distance) })
			})
			.collect())
	}
}

impl std::fmt::Debug for DocumentIndex {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("DocumentIndex")
			.field("source", &self.source)
			.field("chunks", &self.chunks.len())
			.field("vectors", &self.index.len())
			.finish()
	}
}

fn squared_l2(a: &[f32], b: &[f32]) -> f32 {
	a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum()
}
