use ahash::AHashMap;

/// Chunk text to vector, shared by every document in a session.
#[derive(Debug, Default)]
pub struct EmbeddingCache {
	vectors: AHashMap<String, Vec<f32>>,
}
impl EmbeddingCache {
	pub fn get(&self, text: &str) -> Option<&Vec<f32>> {
		self.vectors.get(text)
	}

	pub fn contains(&self, text: &str) -> bool {
		self.vectors.contains_key(text)
	}

	/// Keeps the first vector stored for `text`.
	pub fn insert(&mut self, text: String, vector: Vec<f32>) {
		self.vectors.entry(text).or_insert(vector);
	}

	pub fn len(&self) -> usize {
		self.vectors.len()
	}

	pub fn is_empty(&self) -> bool {
		self.vectors.is_empty()
	}
}
