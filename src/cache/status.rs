//! Status projection of the feed cache for health and admin endpoints.

// crates.io
use serde::{Deserialize, Serialize};
// self
use crate::{
	_prelude::*,
	cache::{entry::CacheEntry, state::CacheState},
	metrics::FeedMetricsSnapshot,
};

/// Public representation of the cache lifecycle state.
#[derive(Clone, Debug, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum FeedState {
	/// No snapshot has been built yet.
	Empty,
	/// The first fetch is running.
	Loading,
	/// A snapshot is being served.
	Ready,
	/// A snapshot is being served while a replacement is fetched.
	Refreshing,
}

/// Point-in-time view of the feed cache.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FeedStatus {
	/// Feed source kind (`url` or `file`).
	pub source: String,
	/// Lifecycle state.
	pub state: FeedState,
	/// Providers in the current snapshot.
	pub idp_count: usize,
	/// Build time of the current snapshot.
	pub built_at: Option<DateTime<Utc>>,
	/// Time the current snapshot stops being fresh.
	pub expires_at: Option<DateTime<Utc>>,
	/// Consecutive failed refreshes.
	pub error_count: u32,
	/// Message of the most recent failure.
	pub last_error: Option<String>,
	/// Ratio of lookups answered from cache.
	pub hit_rate: f64,
	/// Ratio of lookups answered with an expired snapshot.
	pub stale_serve_ratio: f64,
}
impl FeedStatus {
	pub(crate) fn from_components(
		source: &str,
		ttl: Duration,
		entry: &CacheEntry,
		metrics: FeedMetricsSnapshot,
	) -> Self {
		let state = match entry.state() {
			CacheState::Empty => FeedState::Empty,
			CacheState::Loading => FeedState::Loading,
			CacheState::Ready(_) => FeedState::Ready,
			CacheState::Refreshing(_) => FeedState::Refreshing,
		};
		let snapshot = entry.state().payload().map(|payload| payload.snapshot.clone());
		let built_at = snapshot.as_ref().map(|snapshot| snapshot.built_at());
		let expires_at = built_at.and_then(|built_at| {
			TimeDelta::from_std(ttl).ok().and_then(|ttl| built_at.checked_add_signed(ttl))
		});

		Self {
			source: source.to_owned(),
			state,
			idp_count: snapshot.as_ref().map_or(0, |snapshot| snapshot.len()),
			built_at,
			expires_at,
			error_count: entry.error_count(),
			last_error: entry.last_error().map(str::to_owned),
			hit_rate: metrics.hit_rate(),
			stale_serve_ratio: metrics.stale_ratio(),
		}
	}
}
