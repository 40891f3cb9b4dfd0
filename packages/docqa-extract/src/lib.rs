//! Plain-text extraction for uploaded or fetched documents.

mod docx;
mod error;
mod fetch;
mod html;
mod pdf;

pub use error::{Error, Result};
pub use fetch::{FetchConfig, Fetched, fetch_url};

use std::{borrow::Cow, path::Path};

const DOCX_MIME: &str = "application/vnd.openxmlformats-officedocument.wordprocessingml.document";

/// Document formats the extractor understands.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Format {
	Text,
	Html,
	Pdf,
	Docx,
}
impl Format {
	/// Resolves a file extension (with or without the leading dot), a MIME type, or the `url`
	/// pseudo-extension used for fetched pages.
	pub fn from_hint(hint: &str) -> Option<Self> {
		let normalized = hint.split(';').next().unwrap_or_default().trim().to_ascii_lowercase();
		let normalized = normalized.trim_start_matches('.');

		match normalized {
			"txt" | "text" | "md" | "markdown" | "csv" | "json" | "text/plain" | "text/markdown"
			| "text/csv" | "application/json" => Some(Self::Text),
			"html" | "htm" | "url" | "text/html" | "application/xhtml+xml" => Some(Self::Html),
			"pdf" | "application/pdf" => Some(Self::Pdf),
			"docx" | DOCX_MIME => Some(Self::Docx),
			_ => None,
		}
	}

	pub fn as_str(self) -> &'static str {
		match self {
			Self::Text => "text",
			Self::Html => "html",
			Self::Pdf => "pdf",
			Self::Docx => "docx",
		}
	}
}

/// Returns the extension of `filename` as a format hint, or an empty string.
pub fn hint_from_filename(filename: &str) -> String {
	Path::new(filename)
		.extension()
		.and_then(|ext| ext.to_str())
		.map(str::to_ascii_lowercase)
		.unwrap_or_default()
}

/// Extracts plain text from `bytes` according to `hint`.
///
/// Blocking: PDF and DOCX parsing is CPU-bound, so async callers should run this on a blocking
/// thread.
pub fn extract_text(bytes: &[u8], hint: &str) -> Result<String> {
	let format = Format::from_hint(hint).ok_or_else(|| Error::UnsupportedFormat {
		format: if hint.trim().is_empty() { "unknown".to_string() } else { hint.to_string() },
	})?;

	tracing::debug!(format = format.as_str(), bytes = bytes.len(), "Extracting document text.");

	match format {
		Format::Text => Ok(decode_utf8(bytes).into_owned()),
		Format::Html => Ok(html::extract(&decode_utf8(bytes))),
		Format::Pdf => pdf::extract(bytes),
		Format::Docx => docx::extract(bytes),
	}
}

fn decode_utf8(bytes: &[u8]) -> Cow<'_, str> {
	let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);

	String::from_utf8_lossy(bytes)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn resolves_extensions_and_mime_types() {
		assert_eq!(Format::from_hint(".TXT"), Some(Format::Text));
		assert_eq!(Format::from_hint("md"), Some(Format::Text));
		assert_eq!(Format::from_hint("url"), Some(Format::Html));
		assert_eq!(Format::from_hint("text/html; charset=utf-8"), Some(Format::Html));
		assert_eq!(Format::from_hint("application/pdf"), Some(Format::Pdf));
		assert_eq!(Format::from_hint(DOCX_MIME), Some(Format::Docx));
		assert_eq!(Format::from_hint("exe"), None);
	}

	#[test]
	fn hint_from_filename_uses_extension() {
		assert_eq!(hint_from_filename("Report.PDF"), "pdf");
		assert_eq!(hint_from_filename("notes"), "");
	}

	#[test]
	fn plain_text_is_decoded_lossily_without_bom() {
		let text = extract_text(b"\xEF\xBB\xBFhello \xFFworld", "txt").expect("extract failed");

		assert_eq!(text, "hello \u{FFFD}world");
	}

	#[test]
	fn unknown_formats_are_rejected() {
		let err = extract_text(b"MZ", "exe").expect_err("Expected unsupported format.");

		assert!(matches!(err, Error::UnsupportedFormat { ref format } if format == "exe"));
	}
}
