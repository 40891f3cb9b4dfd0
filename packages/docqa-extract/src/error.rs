pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("Unsupported document format: {format}.")]
	UnsupportedFormat { format: String },
	#[error("Failed to extract {format} content: {message}")]
	Unreadable { format: &'static str, message: String },
	#[error("Document is larger than {limit} bytes.")]
	TooLarge { limit: u64 },
	#[error("Failed to fetch {url}: {message}")]
	Fetch { url: String, message: String },
}
