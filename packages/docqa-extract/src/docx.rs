use std::io::{Cursor, Read};

use quick_xml::{Reader, events::Event};
use zip::ZipArchive;

use crate::{Error, Result};

const DOCUMENT_PART: &str = "word/document.xml";

/// Collects paragraph text from the main document part, one paragraph per line.
pub(crate) fn extract(bytes: &[u8]) -> Result<String> {
	let mut archive = ZipArchive::new(Cursor::new(bytes)).map_err(|err| unreadable(err.to_string()))?;
	let mut xml = String::new();

	archive
		.by_name(DOCUMENT_PART)
		.map_err(|_| unreadable(format!("missing {DOCUMENT_PART}")))?
		.read_to_string(&mut xml)
		.map_err(|err| unreadable(err.to_string()))?;

	paragraphs_from_xml(&xml)
}

fn paragraphs_from_xml(xml: &str) -> Result<String> {
	let mut reader = Reader::from_str(xml);
	let mut paragraphs = Vec::new();
	let mut paragraph = String::new();
	let mut in_text = false;

	loop {
		match reader.read_event().map_err(|err| unreadable(err.to_string()))? {
			Event::Start(element) => match element.local_name().as_ref() {
				b"p" => paragraph.clear(),
				b"t" => in_text = true,
				_ => {},
			},
			Event::Empty(element) => match element.local_name().as_ref() {
				b"tab" => paragraph.push('\t'),
				b"br" => paragraph.push('\n'),
				_ => {},
			},
			Event::End(element) => match element.local_name().as_ref() {
				b"p" if !paragraph.trim().is_empty() => paragraphs.push(paragraph.clone()),
				b"t" => in_text = false,
				_ => {},
			},
			Event::Text(text) if in_text => {
				let unescaped = text.unescape().map_err(|err| unreadable(err.to_string()))?;

				paragraph.push_str(&unescaped);
			},
			Event::Eof => break,
			_ => {},
		}
	}

	Ok(paragraphs.join("\n"))
}

fn unreadable(message: String) -> Error {
	Error::Unreadable { format: "docx", message }
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn joins_runs_into_paragraphs() {
		let xml = r#"<?xml version="1.0" encoding="UTF-8"?>
<w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main">
	<w:body>
		<w:p><w:r><w:t>Quarterly </w:t></w:r><w:r><w:t>revenue &amp; costs</w:t></w:r></w:p>
		<w:p/>
		<w:p><w:r><w:t>Second paragraph.</w:t></w:r></w:p>
	</w:body>
</w:document>"#;

		let text = paragraphs_from_xml(xml).expect("parse failed");

		assert_eq!(text, "Quarterly revenue & costs\nSecond paragraph.");
	}

	#[test]
	fn non_zip_input_is_unreadable() {
		let err = extract(b"plain bytes").expect_err("Expected DOCX failure.");

		assert!(matches!(err, Error::Unreadable { format: "docx", .. }));
	}
}
