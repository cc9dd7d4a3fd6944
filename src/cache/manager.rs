//! Feed cache coordinating fetches, snapshot installation, and stale fallback.

// crates.io
use reqwest::{Client, redirect::Policy};
use tokio::{
	sync::{Mutex, RwLock},
	time,
};
// self
use crate::{
	_prelude::*,
	cache::{
		entry::CacheEntry, snapshot::FeedSnapshot, state::CachePayload, status::FeedStatus,
	},
	config::{DiscoveryConfig, EntryPolicy, FeedSource, RetryPolicy},
	feed::{parser::parse_feed, retry::RetryExecutor, source::fetch_feed},
	metrics::{self, FeedMetrics},
};

/// Holder of the shared feed snapshot.
///
/// Cloning is cheap and every clone observes the same snapshot. Refreshes are
/// single-flight: concurrent callers that find the snapshot missing or expired
/// queue on one slot, the first performs the fetch, and the rest receive its
/// outcome without fetching again.
#[derive(Clone, Debug)]
pub struct FeedCache {
	settings: Arc<CacheSettings>,
	client: Arc<Client>,
	entry: Arc<RwLock<CacheEntry>>,
	single_flight: Arc<Mutex<()>>,
	metrics: Arc<FeedMetrics>,
}
impl FeedCache {
	/// Build an empty cache with the default reqwest client.
	pub fn new(config: &DiscoveryConfig) -> Result<Self> {
		config.validate()?;

		let client = Client::builder()
			.redirect(Policy::limited(10))
			.user_agent(format!("idp-discovery/{}", env!("CARGO_PKG_VERSION")))
			.connect_timeout(config.retry_policy.attempt_timeout)
			.build()?;

		Self::with_client(config, client)
	}

	/// Build an empty cache using the supplied HTTP client.
	pub fn with_client(config: &DiscoveryConfig, client: Client) -> Result<Self> {
		let settings = CacheSettings {
			source: config.feed_source()?,
			ttl: config.cache_ttl,
			max_response_bytes: config.max_response_bytes,
			retry_policy: config.retry_policy.clone(),
			invalid_entries: config.invalid_entries,
		};

		Ok(Self {
			settings: Arc::new(settings),
			client: Arc::new(client),
			entry: Arc::new(RwLock::new(CacheEntry::new())),
			single_flight: Arc::new(Mutex::new(())),
			metrics: FeedMetrics::new(),
		})
	}

	/// Configured feed source.
	pub fn source(&self) -> &FeedSource {
		&self.settings.source
	}

	/// Lifetime of a snapshot.
	pub fn ttl(&self) -> Duration {
		self.settings.ttl
	}

	/// Access the cache metrics accumulator.
	pub fn metrics(&self) -> Arc<FeedMetrics> {
		self.metrics.clone()
	}

	/// Return the current snapshot, refreshing it first when missing or expired.
	///
	/// A failed refresh falls back to the previous snapshot when one exists;
	/// only a cache that has never been populated fails, with
	/// [`Error::FeedUnavailable`].
	#[tracing::instrument(skip(self), fields(source = self.settings.source.kind()))]
	pub async fn get(&self) -> Result<Arc<FeedSnapshot>> {
		let (payload, generation) = {
			let entry = self.entry.read().await;

			(entry.payload(), entry.generation())
		};

		if let Some(payload) = payload
			&& !payload.is_expired(Instant::now())
		{
			self.observe_hit(false);

			return Ok(payload.snapshot);
		}

		let _guard = self.single_flight.lock().await;
		let shared = {
			let entry = self.entry.read().await;

			(entry.generation() != generation).then(|| Self::shared_outcome(&entry))
		};
		let outcome = match shared {
			Some(outcome) => {
				tracing::debug!("sharing outcome of a concurrent refresh");

				outcome
			},
			None => {
				tracing::debug!("snapshot missing or expired; fetching feed");

				self.refresh_locked(false).await
			},
		};

		self.observe_lookup(outcome)
	}

	/// Fetch the feed now, regardless of the snapshot's age.
	///
	/// Unlike [`Self::get`] a failure is always returned, although a previous
	/// snapshot stays in service.
	#[tracing::instrument(skip(self), fields(source = self.settings.source.kind()))]
	pub async fn refresh(&self) -> Result<Arc<FeedSnapshot>> {
		let _guard = self.single_flight.lock().await;

		self.refresh_locked(true).await.map(|(snapshot, _)| snapshot)
	}

	/// Capture the cache state for status reporting.
	pub async fn status(&self) -> FeedStatus {
		let entry = self.entry.read().await;

		FeedStatus::from_components(
			self.settings.source.kind(),
			self.settings.ttl,
			&entry,
			self.metrics.snapshot(),
		)
	}

	// `Ok((snapshot, stale))`; the waiter observes whatever the finished refresh left behind.
	fn shared_outcome(entry: &CacheEntry) -> Result<(Arc<FeedSnapshot>, bool)> {
		match entry.payload() {
			Some(payload) => {
				let stale = payload.is_expired(Instant::now());

				Ok((payload.snapshot, stale))
			},
			None => Err(Error::FeedUnavailable {
				reason: entry.last_error().unwrap_or("no snapshot available").to_owned(),
			}),
		}
	}

	// Callers must hold `single_flight`. Returns the snapshot and whether it is stale.
	async fn refresh_locked(&self, forced: bool) -> Result<(Arc<FeedSnapshot>, bool)> {
		{
			let mut entry = self.entry.write().await;

			if !entry.begin_refresh() {
				entry.begin_load();
			}
		}

		match self.load().await {
			Ok((snapshot, elapsed)) => {
				let payload = CachePayload::new(snapshot.clone(), Instant::now(), self.settings.ttl);

				self.entry.write().await.complete_success(payload);
				self.observe_refresh(Some(elapsed));

				tracing::info!(idps = snapshot.len(), "installed discovery feed snapshot");

				Ok((snapshot, false))
			},
			Err(err) => {
				let stale = {
					let mut entry = self.entry.write().await;

					entry.complete_failure(err.to_string());
					entry.payload()
				};

				self.observe_refresh(None);

				match stale {
					Some(payload) if !forced => {
						tracing::warn!(error = %err, "feed refresh failed, serving stale snapshot");

						Ok((payload.snapshot, true))
					},
					Some(_) => Err(err),
					None => Err(Error::FeedUnavailable { reason: err.to_string() }),
				}
			},
		}
	}

	async fn load(&self) -> Result<(Arc<FeedSnapshot>, Duration)> {
		let settings = &self.settings;
		let mut executor = RetryExecutor::new(&settings.retry_policy);
		let mut last_error = None;

		while let Some(timeout) = executor.attempt_timeout() {
			let attempt = fetch_feed(&self.client, &settings.source, settings.max_response_bytes, timeout)
				.await
				.and_then(|fetch| {
					let idps = parse_feed(&fetch.body, settings.invalid_entries)?;

					Ok((Arc::new(FeedSnapshot::new(idps, Utc::now())), fetch.elapsed))
				});

			match attempt {
				Ok(loaded) => return Ok(loaded),
				Err(err) => {
					tracing::debug!(error = %err, retries = executor.retries_used(), "feed attempt failed");

					last_error = Some(err);

					let Some(delay) = executor.next_backoff() else { break };

					if !delay.is_zero() {
						time::sleep(delay).await;
					}
				},
			}
		}

		Err(last_error.unwrap_or(Error::FetchTimeout { timeout: settings.retry_policy.deadline }))
	}

	// Every `get` counts once: stale serves as stale hits, anything that waited on a fetch as a miss.
	fn observe_lookup(&self, outcome: Result<(Arc<FeedSnapshot>, bool)>) -> Result<Arc<FeedSnapshot>> {
		match outcome {
			Ok((snapshot, true)) => {
				self.observe_hit(true);

				Ok(snapshot)
			},
			Ok((snapshot, false)) => {
				self.observe_miss();

				Ok(snapshot)
			},
			Err(err) => {
				self.observe_miss();

				Err(err)
			},
		}
	}

	fn observe_hit(&self, stale: bool) {
		metrics::record_cache_hit(self.settings.source.kind(), stale);

		self.metrics.record_hit(stale);
	}

	fn observe_miss(&self) {
		metrics::record_cache_miss(self.settings.source.kind());

		self.metrics.record_miss();
	}

	fn observe_refresh(&self, elapsed: Option<Duration>) {
		metrics::record_refresh(self.settings.source.kind(), elapsed);

		match elapsed {
			Some(elapsed) => self.metrics.record_refresh_success(elapsed),
			None => self.metrics.record_refresh_error(),
		}
	}
}

#[derive(Debug)]
struct CacheSettings {
	source: FeedSource,
	ttl: Duration,
	max_response_bytes: u64,
	retry_policy: RetryPolicy,
	invalid_entries: EntryPolicy,
}
