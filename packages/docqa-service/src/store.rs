use std::{
	sync::{
		Arc, Mutex, MutexGuard,
		atomic::{AtomicUsize, Ordering},
	},
	time::Duration as StdDuration,
};

use ahash::AHashMap;
use time::{Duration, OffsetDateTime};
use tokio::{task::JoinHandle, time::MissedTickBehavior};
use uuid::Uuid;

use crate::{
	Error, Result,
	session::{AccessClock, Session},
};

/// A live session: its activity clock plus exclusive access to its documents and cache.
///
/// `created_at`, `clock` and the document count can be read without taking the session lock.
#[derive(Clone)]
pub struct SessionHandle {
	pub id: String,
	pub created_at: OffsetDateTime,
	pub clock: Arc<AccessClock>,
	pub session: Arc<tokio::sync::Mutex<Session>>,
	document_count: Arc<AtomicUsize>,
}
impl SessionHandle {
	pub fn document_count(&self) -> usize {
		self.document_count.load(Ordering::Acquire)
	}
}

/// Process-wide registry of sessions.
///
/// The registry lock only guards the id map and is never held across an await. Work on a
/// single session goes through that session's own mutex.
#[derive(Default)]
pub struct SessionStore {
	sessions: Mutex<AHashMap<String, SessionHandle>>,
}
impl SessionStore {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn create(&self, now: OffsetDateTime) -> String {
		let id = Uuid::new_v4().simple().to_string();
		let session = Session::new(id.clone(), now);
		let handle = SessionHandle {
			id: id.clone(),
			created_at: session.created_at(),
			clock: session.clock().clone(),
			document_count: session.document_counter().clone(),
			session: Arc::new(tokio::sync::Mutex::new(session)),
		};

		self.lock().insert(id.clone(), handle);

		id
	}

	/// Looks a session up without touching it.
	pub fn get(&self, session_id: &str) -> Result<SessionHandle> {
		self.lock().get(session_id).cloned().ok_or_else(|| Error::session_not_found(session_id))
	}

	pub fn touch(&self, session_id: &str, now: OffsetDateTime) -> Result<SessionHandle> {
		let sessions = self.lock();
		let handle = sessions.get(session_id).ok_or_else(|| Error::session_not_found(session_id))?;

		handle.clock.touch(now);

		Ok(handle.clone())
	}

	/// Like [`touch`](Self::touch), but a session idle for longer than `timeout` is reported as
	/// `Gone` and left untouched for the sweeper.
	pub fn touch_live(
		&self,
		session_id: &str,
		now: OffsetDateTime,
		timeout: Duration,
	) -> Result<SessionHandle> {
		let sessions = self.lock();
		let handle = sessions.get(session_id).ok_or_else(|| Error::session_not_found(session_id))?;

		if handle.clock.is_expired(now, timeout) {
			return Err(Error::Gone { message: format!("Session {session_id} has expired.") });
		}

		handle.clock.touch(now);

		Ok(handle.clone())
	}

	pub fn delete(&self, session_id: &str) -> Result<()> {
		self.lock()
			.remove(session_id)
			.map(|_| ())
			.ok_or_else(|| Error::session_not_found(session_id))
	}

	/// Removes every session idle for longer than `timeout` and returns how many were removed.
	///
	/// Liveness is read and acted on under the registry lock, so a touch that lands before the
	/// entry is evaluated keeps it.
	pub fn sweep_expired(&self, now: OffsetDateTime, timeout: Duration) -> usize {
		let mut sessions = self.lock();
		let before = sessions.len();

		sessions.retain(|_, handle| !handle.clock.is_expired(now, timeout));

		before - sessions.len()
	}

	pub fn len(&self) -> usize {
		self.lock().len()
	}

	pub fn is_empty(&self) -> bool {
		self.lock().is_empty()
	}

	/// Runs [`sweep_expired`](Self::sweep_expired) every `interval` until the task is aborted.
	pub fn spawn_sweeper(self: Arc<Self>, interval: StdDuration, timeout: Duration) -> JoinHandle<()> {
		tokio::spawn(async move {
			let mut ticker = tokio::time::interval(interval);

			ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
			// The first tick completes immediately.
			ticker.tick().await;

			loop {
				ticker.tick().await;

				let removed = self.sweep_expired(OffsetDateTime::now_utc(), timeout);

				if removed > 0 {
					tracing::info!(removed, remaining = self.len(), "Evicted idle sessions.");
				} else {
					tracing::debug!(remaining = self.len(), "Session sweep found nothing to evict.");
				}
			}
		})
	}

	fn lock(&self) -> MutexGuard<'_, AHashMap<String, SessionHandle>> {
		self.sessions.lock().unwrap_or_else(|err| err.into_inner())
	}
}
