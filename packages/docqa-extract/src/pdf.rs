use std::panic::{self, AssertUnwindSafe};

use crate::{Error, Result};

pub(crate) fn extract(bytes: &[u8]) -> Result<String> {
	// The PDF parser panics on some malformed inputs.
	let outcome = panic::catch_unwind(AssertUnwindSafe(|| pdf_extract::extract_text_from_mem(bytes)));

	match outcome {
		Ok(Ok(text)) => Ok(text),
		Ok(Err(err)) => Err(Error::Unreadable { format: "pdf", message: err.to_string() }),
		Err(_) => {
			tracing::warn!(bytes = bytes.len(), "PDF parser panicked on input.");

			Err(Error::Unreadable { format: "pdf", message: "PDF structure is invalid.".to_string() })
		},
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn garbage_is_unreadable() {
		let err = extract(b"definitely not a pdf").expect_err("Expected PDF failure.");

		assert!(matches!(err, Error::Unreadable { format: "pdf", .. }));
	}
}
