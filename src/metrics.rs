//! Metrics helpers and feed cache telemetry bookkeeping.
//!
//! [`FeedMetrics`] is always maintained for status reporting. With the `metrics`
//! feature the same events are also emitted through the `metrics` facade.

// std
use std::sync::atomic::{AtomicU64, Ordering};
#[cfg(feature = "prometheus")] use std::sync::OnceLock;
// crates.io
#[cfg(feature = "metrics")] use metrics::Label;
#[cfg(feature = "prometheus")]
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
#[cfg(feature = "metrics")] use smallvec::SmallVec;
// self
use crate::_prelude::*;

#[cfg(feature = "metrics")]
type LabelSet = SmallVec<[Label; 2]>;

#[cfg(feature = "metrics")]
const METRIC_REQUESTS_TOTAL: &str = "idp_discovery_cache_requests_total";
#[cfg(feature = "metrics")]
const METRIC_HITS_TOTAL: &str = "idp_discovery_cache_hits_total";
#[cfg(feature = "metrics")]
const METRIC_STALE_TOTAL: &str = "idp_discovery_cache_stale_total";
#[cfg(feature = "metrics")]
const METRIC_MISSES_TOTAL: &str = "idp_discovery_cache_misses_total";
#[cfg(feature = "metrics")]
const METRIC_REFRESH_TOTAL: &str = "idp_discovery_feed_refresh_total";
#[cfg(feature = "metrics")]
const METRIC_REFRESH_DURATION: &str = "idp_discovery_feed_refresh_duration_seconds";

#[cfg(feature = "prometheus")]
static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Thread-safe counters for one feed cache.
#[derive(Debug, Default)]
pub struct FeedMetrics {
	total_requests: AtomicU64,
	cache_hits: AtomicU64,
	stale_serves: AtomicU64,
	refresh_successes: AtomicU64,
	refresh_errors: AtomicU64,
	last_refresh_micros: AtomicU64,
}
impl FeedMetrics {
	/// Create a new metrics accumulator.
	pub fn new() -> Arc<Self> {
		Arc::new(Self::default())
	}

	/// Record a lookup answered from a cached snapshot.
	pub fn record_hit(&self, stale: bool) {
		self.total_requests.fetch_add(1, Ordering::Relaxed);
		self.cache_hits.fetch_add(1, Ordering::Relaxed);

		if stale {
			self.stale_serves.fetch_add(1, Ordering::Relaxed);
		}
	}

	/// Record a lookup that had to wait for a fetch.
	pub fn record_miss(&self) {
		self.total_requests.fetch_add(1, Ordering::Relaxed);
	}

	/// Record a successful refresh and its fetch latency.
	pub fn record_refresh_success(&self, duration: Duration) {
		self.refresh_successes.fetch_add(1, Ordering::Relaxed);
		self.last_refresh_micros.store(duration.as_micros() as u64, Ordering::Relaxed);
	}

	/// Record a failed refresh.
	pub fn record_refresh_error(&self) {
		self.refresh_errors.fetch_add(1, Ordering::Relaxed);
	}

	/// Take a point-in-time snapshot for status reporting.
	pub fn snapshot(&self) -> FeedMetricsSnapshot {
		FeedMetricsSnapshot {
			total_requests: self.total_requests.load(Ordering::Relaxed),
			cache_hits: self.cache_hits.load(Ordering::Relaxed),
			stale_serves: self.stale_serves.load(Ordering::Relaxed),
			refresh_successes: self.refresh_successes.load(Ordering::Relaxed),
			refresh_errors: self.refresh_errors.load(Ordering::Relaxed),
			last_refresh_micros: match self.last_refresh_micros.load(Ordering::Relaxed) {
				0 => None,
				value => Some(value),
			},
		}
	}
}

/// Read-only copy of [`FeedMetrics`] counters.
#[derive(Clone, Debug)]
pub struct FeedMetricsSnapshot {
	/// Snapshot lookups observed.
	pub total_requests: u64,
	/// Lookups answered from a cached snapshot.
	pub cache_hits: u64,
	/// Lookups answered with an expired snapshot after a failed refresh.
	pub stale_serves: u64,
	/// Successful refreshes.
	pub refresh_successes: u64,
	/// Failed refreshes.
	pub refresh_errors: u64,
	/// Fetch latency of the most recent successful refresh.
	pub last_refresh_micros: Option<u64>,
}
impl FeedMetricsSnapshot {
	/// Ratio of cache hits to total lookups.
	pub fn hit_rate(&self) -> f64 {
		ratio(self.cache_hits, self.total_requests)
	}

	/// Ratio of stale serves to total lookups.
	pub fn stale_ratio(&self) -> f64 {
		ratio(self.stale_serves, self.total_requests)
	}
}

/// Install the default Prometheus recorder backed by `metrics`.
///
/// Multiple invocations are safe; subsequent calls become no-ops once the recorder is installed.
#[cfg(feature = "prometheus")]
pub fn install_default_exporter() -> Result<()> {
	if PROMETHEUS_HANDLE.get().is_some() {
		return Ok(());
	}

	let handle = PrometheusBuilder::new()
		.install_recorder()
		.map_err(|err| Error::Metrics(err.to_string()))?;
	let _ = PROMETHEUS_HANDLE.set(handle);

	Ok(())
}

/// Access the global Prometheus exporter handle when installed.
#[cfg(feature = "prometheus")]
pub fn prometheus_handle() -> Option<&'static PrometheusHandle> {
	PROMETHEUS_HANDLE.get()
}

/// Emit a cache hit, tagging whether it was served stale.
pub fn record_cache_hit(source: &'static str, stale: bool) {
	#[cfg(feature = "metrics")]
	{
		let labels = source_labels(source);

		metrics::counter!(METRIC_REQUESTS_TOTAL, labels.iter()).increment(1);
		metrics::counter!(METRIC_HITS_TOTAL, labels.iter()).increment(1);

		if stale {
			metrics::counter!(METRIC_STALE_TOTAL, labels.iter()).increment(1);
		}
	}
	#[cfg(not(feature = "metrics"))]
	let _ = (source, stale);
}

/// Emit a cache miss that required a feed fetch.
pub fn record_cache_miss(source: &'static str) {
	#[cfg(feature = "metrics")]
	{
		let labels = source_labels(source);

		metrics::counter!(METRIC_REQUESTS_TOTAL, labels.iter()).increment(1);
		metrics::counter!(METRIC_MISSES_TOTAL, labels.iter()).increment(1);
	}
	#[cfg(not(feature = "metrics"))]
	let _ = source;
}

/// Emit a finished refresh attempt; `duration` is recorded for successes only.
pub fn record_refresh(source: &'static str, duration: Option<Duration>) {
	#[cfg(feature = "metrics")]
	{
		let status = if duration.is_some() { "success" } else { "error" };
		let mut labels = source_labels(source);

		if let Some(duration) = duration {
			metrics::histogram!(METRIC_REFRESH_DURATION, labels.iter())
				.record(duration.as_secs_f64());
		}

		labels.push(Label::new("status", status));
		metrics::counter!(METRIC_REFRESH_TOTAL, labels.iter()).increment(1);
	}
	#[cfg(not(feature = "metrics"))]
	let _ = (source, duration);
}

#[cfg(feature = "metrics")]
fn source_labels(source: &'static str) -> LabelSet {
	let mut labels = LabelSet::new();

	labels.push(Label::new("source", source));

	labels
}

fn ratio(part: u64, total: u64) -> f64 {
	if total == 0 { 0.0 } else { part as f64 / total as f64 }
}
