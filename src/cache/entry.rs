//! Cache entry bookkeeping: state transitions, failure tracking, and refresh generations.

// self
use crate::cache::state::{CachePayload, CacheState};

/// Lifecycle holder for the single feed snapshot.
///
/// Every finished refresh attempt, successful or not, bumps the generation so
/// callers that queued behind it can tell their turn has already been served.
#[derive(Clone, Debug)]
pub struct CacheEntry {
	state: CacheState,
	generation: u64,
	error_count: u32,
	last_error: Option<String>,
}
impl CacheEntry {
	/// Create an empty entry.
	pub fn new() -> Self {
		Self { state: CacheState::Empty, generation: 0, error_count: 0, last_error: None }
	}

	/// Inspect the current cache state.
	pub fn state(&self) -> &CacheState {
		&self.state
	}

	/// Number of refresh attempts completed so far.
	pub fn generation(&self) -> u64 {
		self.generation
	}

	/// Consecutive failed refresh attempts.
	pub fn error_count(&self) -> u32 {
		self.error_count
	}

	/// Message of the most recent failure, cleared on success.
	pub fn last_error(&self) -> Option<&str> {
		self.last_error.as_deref()
	}

	/// Retrieve a clone of the cached payload if present.
	pub fn payload(&self) -> Option<CachePayload> {
		self.state.payload().cloned()
	}

	/// Begin the first load; returns false unless the entry is empty.
	pub fn begin_load(&mut self) -> bool {
		match self.state {
			CacheState::Empty => {
				self.state = CacheState::Loading;

				true
			},
			_ => false,
		}
	}

	/// Begin replacing a ready payload; returns false unless the entry is ready.
	pub fn begin_refresh(&mut self) -> bool {
		match std::mem::replace(&mut self.state, CacheState::Empty) {
			CacheState::Ready(payload) => {
				self.state = CacheState::Refreshing(payload);

				true
			},
			state => {
				self.state = state;

				false
			},
		}
	}

	/// Install a new payload after a successful load or refresh.
	pub fn complete_success(&mut self, payload: CachePayload) {
		self.state = CacheState::Ready(payload);
		self.error_count = 0;
		self.last_error = None;
		self.generation += 1;
	}

	/// Record a failed attempt; a previous payload, if any, stays in service.
	pub fn complete_failure(&mut self, reason: impl Into<String>) {
		self.state = match std::mem::replace(&mut self.state, CacheState::Empty) {
			CacheState::Refreshing(payload) | CacheState::Ready(payload) => CacheState::Ready(payload),
			CacheState::Loading | CacheState::Empty => CacheState::Empty,
		};
		self.error_count = self.error_count.saturating_add(1);
		self.last_error = Some(reason.into());
		self.generation += 1;
	}
}
impl Default for CacheEntry {
	fn default() -> Self {
		Self::new()
	}
}
