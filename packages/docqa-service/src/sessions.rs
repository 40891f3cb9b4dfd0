use serde::Serialize;
use time::OffsetDateTime;

use crate::{DocqaService, Error, Result};

#[derive(Clone, Debug, Serialize)]
pub struct CreateSessionResponse {
	pub session_id: String,
}

#[derive(Clone, Debug, Serialize)]
pub struct SessionStatus {
	pub session_id: String,
	pub active: bool,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub remaining_secs: Option<i64>,
	#[serde(with = "crate::time_serde::option", skip_serializing_if = "Option::is_none")]
	pub created_at: Option<OffsetDateTime>,
	#[serde(with = "crate::time_serde::option", skip_serializing_if = "Option::is_none")]
	pub last_accessed: Option<OffsetDateTime>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub document_count: Option<usize>,
}

#[derive(Clone, Debug, Serialize)]
pub struct RefreshResponse {
	pub session_id: String,
	#[serde(with = "crate::time_serde")]
	pub refreshed_at: OffsetDateTime,
	pub remaining_secs: i64,
}

#[derive(Clone, Debug, Serialize)]
pub struct SessionHealth {
	pub session_id: String,
	pub status: &'static str,
}

#[derive(Clone, Debug, Serialize)]
pub struct ServiceHealth {
	pub status: &'static str,
	pub active_sessions: usize,
}

impl DocqaService {
	pub fn create_session(&self) -> CreateSessionResponse {
		let session_id = self.sessions.create(OffsetDateTime::now_utc());

		tracing::info!(session_id = %session_id, "Session created.");

		CreateSessionResponse { session_id }
	}

	/// Reports whether a session is still live. Never fails, never touches the session and
	/// never waits on the session lock.
	pub fn status(&self, session_id: &str, now: OffsetDateTime) -> SessionStatus {
		let Ok(handle) = self.sessions.get(session_id) else {
			return SessionStatus {
				session_id: session_id.to_string(),
				active: false,
				remaining_secs: None,
				created_at: None,
				last_accessed: None,
				document_count: None,
			};
		};
		let last_accessed = handle.clock.last_accessed();
		let remaining = self.idle_timeout() - (now - last_accessed);

		if remaining.is_negative() {
			return SessionStatus {
				session_id: session_id.to_string(),
				active: false,
				remaining_secs: None,
				created_at: Some(handle.created_at),
				last_accessed: Some(last_accessed),
				document_count: None,
			};
		}

		SessionStatus {
			session_id: session_id.to_string(),
			active: true,
			remaining_secs: Some(remaining.whole_seconds()),
			created_at: Some(handle.created_at),
			last_accessed: Some(last_accessed),
			document_count: Some(handle.document_count()),
		}
	}

	pub fn refresh(&self, session_id: &str) -> Result<RefreshResponse> {
		let now = OffsetDateTime::now_utc();

		self.acquire(session_id, now)?;

		Ok(RefreshResponse {
			session_id: session_id.to_string(),
			refreshed_at: now,
			remaining_secs: self.idle_timeout().whole_seconds(),
		})
	}

	/// `Gone` when the session is past its idle timeout but has not been swept yet.
	pub fn health(&self, session_id: &str, now: OffsetDateTime) -> Result<SessionHealth> {
		let handle = self.sessions.get(session_id)?;

		if handle.clock.is_expired(now, self.idle_timeout()) {
			return Err(Error::Gone { message: format!("Session {session_id} has expired.") });
		}

		Ok(SessionHealth { session_id: session_id.to_string(), status: "active" })
	}

	pub fn delete_session(&self, session_id: &str) -> Result<()> {
		self.sessions.delete(session_id)?;

		tracing::info!(session_id, "Session deleted.");

		Ok(())
	}

	pub fn service_health(&self) -> ServiceHealth {
		ServiceHealth { status: "ok", active_sessions: self.sessions.len() }
	}
}
