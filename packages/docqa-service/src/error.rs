pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("Not found: {message}")]
	NotFound { message: String },
	#[error("Gone: {message}")]
	Gone { message: String },
	#[error("Invalid input: {message}")]
	InvalidInput { message: String },
	#[error("Payload too large: {message}")]
	PayloadTooLarge { message: String },
	#[error("Upstream failure: {message}")]
	Upstream { message: String },
}
impl Error {
	pub(crate) fn session_not_found(session_id: &str) -> Self {
		Self::NotFound { message: format!("Session {session_id} is unknown or expired.") }
	}
}

impl From<color_eyre::Report> for Error {
	fn from(err: color_eyre::Report) -> Self {
		Self::Upstream { message: err.to_string() }
	}
}

impl From<docqa_extract::Error> for Error {
	fn from(err: docqa_extract::Error) -> Self {
		match err {
			docqa_extract::Error::UnsupportedFormat { .. }
			| docqa_extract::Error::Unreadable { .. } => Self::InvalidInput { message: err.to_string() },
			docqa_extract::Error::TooLarge { .. } => Self::PayloadTooLarge { message: err.to_string() },
			docqa_extract::Error::Fetch { .. } => Self::Upstream { message: err.to_string() },
		}
	}
}

impl From<tokio::task::JoinError> for Error {
	fn from(err: tokio::task::JoinError) -> Self {
		Self::Upstream { message: format!("Extraction task failed: {err}") }
	}
}
