use std::iter;

use unicode_segmentation::UnicodeSegmentation;

/// Character budget for a single chunk and the tail carried into the next one.
#[derive(Clone, Copy, Debug)]
pub struct ChunkingConfig {
	pub max_chars: u32,
	pub overlap_chars: u32,
}

/// Splits `text` into ordered chunks of at most `max_chars` characters.
///
/// Whitespace is collapsed first. Chunks are packed with whole sentences; a sentence that does
/// not fit on its own is cut into overlapping windows. Consecutive chunks share up to
/// `overlap_chars` characters, trimmed forward to a word boundary.
pub fn split_text(text: &str, cfg: &ChunkingConfig) -> Vec<String> {
	let normalized = text.split_whitespace().collect::<Vec<_>>().join(" ");

	if normalized.is_empty() {
		return Vec::new();
	}

	let max_chars = cfg.max_chars.max(1) as usize;
	let overlap_chars = (cfg.overlap_chars as usize).min(max_chars - 1);
	let mut chunks = Vec::new();
	let mut current = String::new();
	let mut current_len = 0_usize;

	for sentence in normalized.split_sentence_bounds() {
		for piece in bounded_pieces(sentence, max_chars, overlap_chars) {
			let piece_len = piece.chars().count();

			if current_len > 0 && current_len + piece_len > max_chars {
				let tail = overlap_tail(&current, overlap_chars);
				let tail_len = tail.chars().count();

				push_chunk(&mut chunks, &current);

				if tail_len + piece_len <= max_chars {
					current = tail;
					current_len = tail_len;
				} else {
					current.clear();
					current_len = 0;
				}
			}

			current.push_str(piece);

			current_len += piece_len;
		}
	}

	push_chunk(&mut chunks, &current);

	tracing::debug!(chunk_count = chunks.len(), max_chars, overlap_chars, "Split text into chunks.");

	chunks
}

fn push_chunk(chunks: &mut Vec<String>, current: &str) {
	let trimmed = current.trim();

	if !trimmed.is_empty() {
		chunks.push(trimmed.to_string());
	}
}

fn bounded_pieces(sentence: &str, max_chars: usize, overlap_chars: usize) -> Vec<&str> {
	let boundaries: Vec<usize> =
		sentence.char_indices().map(|(idx, _)| idx).chain(iter::once(sentence.len())).collect();
	let char_count = boundaries.len() - 1;

	if char_count <= max_chars {
		return vec![sentence];
	}

	let step = max_chars.saturating_sub(overlap_chars).max(1);
	let mut pieces = Vec::new();
	let mut start = 0_usize;

	loop {
		let end = (start + max_chars).min(char_count);

		pieces.push(&sentence[boundaries[start]..boundaries[end]]);

		if end == char_count {
			break;
		}

		start += step;
	}

	pieces
}

fn overlap_tail(text: &str, overlap_chars: usize) -> String {
	if overlap_chars == 0 {
		return String::new();
	}

	let char_count = text.chars().count();

	if char_count <= overlap_chars {
		return text.to_string();
	}

	let skip = char_count - overlap_chars;
	let mut chars = text.char_indices().skip(skip - 1);
	let (Some((_, before)), Some((start, first))) = (chars.next(), chars.next()) else {
		return String::new();
	};
	let tail = &text[start..];
	let mid_word = !before.is_whitespace() && !first.is_whitespace();
	let aligned = match tail.find(char::is_whitespace) {
		Some(pos) if mid_word => &tail[pos..],
		_ => tail,
	};

	aligned.trim_start().to_string()
}
