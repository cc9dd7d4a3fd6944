//! Cache state machine modelling the feed snapshot lifecycle.

// self
use crate::{_prelude::*, cache::snapshot::FeedSnapshot};

/// Snapshot currently held by the cache together with its freshness window.
#[derive(Clone, Debug)]
pub struct CachePayload {
	/// Snapshot handed out to readers.
	pub snapshot: Arc<FeedSnapshot>,
	/// Monotonic deadline after which the next access triggers a refresh.
	pub expires_at: Instant,
}
impl CachePayload {
	/// Wrap a freshly built snapshot that stays valid for `ttl`.
	pub fn new(snapshot: Arc<FeedSnapshot>, now: Instant, ttl: Duration) -> Self {
		Self { snapshot, expires_at: now + ttl }
	}

	/// Whether the payload has exceeded its freshness window.
	pub fn is_expired(&self, now: Instant) -> bool {
		now >= self.expires_at
	}
}

/// Cache lifecycle states.
#[derive(Clone, Debug)]
pub enum CacheState {
	/// No snapshot and no fetch in progress.
	Empty,
	/// First fetch is underway; nothing can be served yet.
	Loading,
	/// A snapshot is available.
	Ready(CachePayload),
	/// A snapshot is available while its replacement is being fetched.
	Refreshing(CachePayload),
}
impl CacheState {
	/// Retrieve the current payload if available.
	pub fn payload(&self) -> Option<&CachePayload> {
		match self {
			CacheState::Ready(payload) | CacheState::Refreshing(payload) => Some(payload),
			CacheState::Empty | CacheState::Loading => None,
		}
	}
}
