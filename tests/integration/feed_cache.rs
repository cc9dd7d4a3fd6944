//! Integration tests for feed caching against a live HTTP upstream.

// std
use std::{
	sync::{
		Arc,
		atomic::{AtomicUsize, Ordering},
	},
	time::Duration,
};
// crates.io
use idp_discovery::{DiscoveryConfig, Error, FeedCache, FeedSource, FeedState, Result};
use url::Url;
use wiremock::{
	Mock, MockServer, ResponseTemplate,
	matchers::{header, method, path},
};

const FEED_BODY: &str = include_str!("../fixtures/discofeed.json");
const FEED_PATH: &str = "/Shibboleth.sso/DiscoFeed";

fn config_for(server: &MockServer, ttl: Duration) -> DiscoveryConfig {
	let url = Url::parse(&format!("{}{FEED_PATH}", server.uri())).expect("feed url");

	DiscoveryConfig::new(FeedSource::Url(url), "https://sp.example.org/Shibboleth.sso/Login")
		.expect("config")
		.with_cache_ttl(ttl)
}

fn feed_response() -> ResponseTemplate {
	ResponseTemplate::new(200)
		.set_body_string(FEED_BODY)
		.insert_header("content-type", "application/json")
}

#[tokio::test]
async fn caches_feed_after_initial_fetch() -> Result<()> {
	let _ = tracing_subscriber::fmt::try_init();

	let server = MockServer::start().await;

	Mock::given(method("GET"))
		.and(path(FEED_PATH))
		.and(header("accept", "application/json"))
		.respond_with(feed_response())
		.expect(1)
		.mount(&server)
		.await;

	let cache = FeedCache::new(&config_for(&server, Duration::from_secs(60)))?;
	let first = cache.get().await?;
	let second = cache.get().await?;

	assert_eq!(first.len(), 3);
	assert!(Arc::ptr_eq(&first, &second));
	assert_eq!(cache.status().await.source, "url");

	server.verify().await;
	Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_misses_share_one_fetch() -> Result<()> {
	let _ = tracing_subscriber::fmt::try_init();

	let server = MockServer::start().await;

	Mock::given(method("GET"))
		.and(path(FEED_PATH))
		.respond_with(feed_response().set_delay(Duration::from_millis(200)))
		.expect(1)
		.mount(&server)
		.await;

	let cache = FeedCache::new(&config_for(&server, Duration::from_secs(60)))?;
	let tasks: Vec<_> = (0..16)
		.map(|_| {
			let cache = cache.clone();

			tokio::spawn(async move { cache.get().await })
		})
		.collect();
	let mut snapshots = Vec::with_capacity(tasks.len());

	for task in tasks {
		snapshots.push(task.await.expect("task panicked")?);
	}

	assert!(snapshots.windows(2).all(|pair| Arc::ptr_eq(&pair[0], &pair[1])));

	server.verify().await;
	Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_callers_share_a_failed_first_fetch() -> Result<()> {
	let _ = tracing_subscriber::fmt::try_init();

	let server = MockServer::start().await;

	Mock::given(method("GET"))
		.and(path(FEED_PATH))
		.respond_with(ResponseTemplate::new(503).set_delay(Duration::from_millis(200)))
		.expect(1)
		.mount(&server)
		.await;

	let cache = FeedCache::new(&config_for(&server, Duration::from_secs(60)))?;
	let tasks: Vec<_> = (0..16)
		.map(|_| {
			let cache = cache.clone();

			tokio::spawn(async move { cache.get().await })
		})
		.collect();

	for task in tasks {
		let outcome = task.await.expect("task panicked");

		assert!(matches!(outcome, Err(Error::FeedUnavailable { .. })));
	}

	assert_eq!(cache.status().await.error_count, 1);

	server.verify().await;
	Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_callers_share_one_stale_fallback() -> Result<()> {
	let _ = tracing_subscriber::fmt::try_init();

	let server = MockServer::start().await;
	let requests = Arc::new(AtomicUsize::new(0));
	let counter = requests.clone();

	Mock::given(method("GET"))
		.and(path(FEED_PATH))
		.respond_with(move |_: &wiremock::Request| match counter.fetch_add(1, Ordering::SeqCst) {
			0 => feed_response(),
			_ => ResponseTemplate::new(500).set_delay(Duration::from_millis(200)),
		})
		.expect(2)
		.mount(&server)
		.await;

	let cache = FeedCache::new(&config_for(&server, Duration::from_millis(100)))?;
	let first = cache.get().await?;

	tokio::time::sleep(Duration::from_millis(150)).await;

	let tasks: Vec<_> = (0..16)
		.map(|_| {
			let cache = cache.clone();

			tokio::spawn(async move { cache.get().await })
		})
		.collect();

	for task in tasks {
		let snapshot = task.await.expect("task panicked")?;

		assert!(Arc::ptr_eq(&first, &snapshot));
	}

	assert_eq!(requests.load(Ordering::SeqCst), 2);
	assert_eq!(cache.status().await.error_count, 1);

	server.verify().await;
	Ok(())
}

#[tokio::test]
async fn accepts_any_successful_status() -> Result<()> {
	let _ = tracing_subscriber::fmt::try_init();

	let server = MockServer::start().await;

	Mock::given(method("GET"))
		.and(path(FEED_PATH))
		.respond_with(
			ResponseTemplate::new(203)
				.set_body_string(FEED_BODY)
				.insert_header("content-type", "application/json"),
		)
		.expect(1)
		.mount(&server)
		.await;

	let cache = FeedCache::new(&config_for(&server, Duration::from_secs(60)))?;

	assert_eq!(cache.get().await?.len(), 3);

	server.verify().await;
	Ok(())
}

#[tokio::test]
async fn serves_stale_snapshot_when_upstream_fails() -> Result<()> {
	let _ = tracing_subscriber::fmt::try_init();

	let server = MockServer::start().await;
	let requests = Arc::new(AtomicUsize::new(0));
	let counter = requests.clone();

	Mock::given(method("GET"))
		.and(path(FEED_PATH))
		.respond_with(move |_: &wiremock::Request| match counter.fetch_add(1, Ordering::SeqCst) {
			0 => feed_response(),
			_ => ResponseTemplate::new(500).set_body_string("upstream exploded"),
		})
		.mount(&server)
		.await;

	let cache = FeedCache::new(&config_for(&server, Duration::from_millis(100)))?;
	let first = cache.get().await?;

	tokio::time::sleep(Duration::from_millis(150)).await;

	let second = cache.get().await?;

	assert!(Arc::ptr_eq(&first, &second));
	assert_eq!(requests.load(Ordering::SeqCst), 2);

	let status = cache.status().await;

	assert_eq!(status.state, FeedState::Ready);
	assert_eq!(status.error_count, 1);
	assert!(status.last_error.is_some_and(|err| err.contains("500")));

	Ok(())
}

#[tokio::test]
async fn first_fetch_failure_is_unavailable() -> Result<()> {
	let _ = tracing_subscriber::fmt::try_init();

	let server = MockServer::start().await;

	Mock::given(method("GET"))
		.and(path(FEED_PATH))
		.respond_with(ResponseTemplate::new(503))
		.mount(&server)
		.await;

	let cache = FeedCache::new(&config_for(&server, Duration::from_secs(60)))?;
	let err = cache.get().await.expect_err("no snapshot yet");

	assert!(matches!(err, Error::FeedUnavailable { .. }));
	assert_eq!(err.status_code(), http::StatusCode::SERVICE_UNAVAILABLE);
	assert_eq!(cache.status().await.state, FeedState::Empty);

	Ok(())
}

#[tokio::test]
async fn slow_upstream_counts_as_failure() -> Result<()> {
	let _ = tracing_subscriber::fmt::try_init();

	let server = MockServer::start().await;

	Mock::given(method("GET"))
		.and(path(FEED_PATH))
		.respond_with(feed_response().set_delay(Duration::from_secs(2)))
		.mount(&server)
		.await;

	let mut config = config_for(&server, Duration::from_secs(60));

	config.retry_policy.attempt_timeout = Duration::from_millis(200);

	let cache = FeedCache::new(&config)?;
	let err = cache.get().await.expect_err("timed out");

	assert!(matches!(&err, Error::FeedUnavailable { reason } if reason.contains("timed out")));

	Ok(())
}

#[tokio::test]
async fn retries_recover_from_transient_failures() -> Result<()> {
	let _ = tracing_subscriber::fmt::try_init();

	let server = MockServer::start().await;
	let requests = Arc::new(AtomicUsize::new(0));
	let counter = requests.clone();

	Mock::given(method("GET"))
		.and(path(FEED_PATH))
		.respond_with(move |_: &wiremock::Request| match counter.fetch_add(1, Ordering::SeqCst) {
			0 => ResponseTemplate::new(502),
			_ => feed_response(),
		})
		.mount(&server)
		.await;

	let mut config = config_for(&server, Duration::from_secs(60));

	config.retry_policy.max_retries = 2;
	config.retry_policy.initial_backoff = Duration::from_millis(10);
	config.retry_policy.max_backoff = Duration::from_millis(20);

	let cache = FeedCache::new(&config)?;

	assert_eq!(cache.get().await?.len(), 3);
	assert_eq!(requests.load(Ordering::SeqCst), 2);
	assert_eq!(cache.status().await.error_count, 0);

	Ok(())
}

#[tokio::test]
async fn oversized_feed_is_rejected() -> Result<()> {
	let _ = tracing_subscriber::fmt::try_init();

	let server = MockServer::start().await;

	Mock::given(method("GET"))
		.and(path(FEED_PATH))
		.respond_with(feed_response())
		.mount(&server)
		.await;

	let mut config = config_for(&server, Duration::from_secs(60));

	config.max_response_bytes = 64;

	let cache = FeedCache::new(&config)?;
	let err = cache.get().await.expect_err("guarded");

	assert!(matches!(&err, Error::FeedUnavailable { reason } if reason.contains("max_response_bytes")));

	Ok(())
}
