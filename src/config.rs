//! Discovery configuration and validation.
//!
//! Every option has a default except the feed source and the service-provider login URL.

// std
use std::{cell::RefCell, path::PathBuf};
// crates.io
use rand::{Rng, SeedableRng, rngs::SmallRng};
use serde::{Deserialize, Serialize};
use url::Url;
// self
use crate::_prelude::*;

thread_local! {
	static SMALL_RNG: RefCell<SmallRng> = RefCell::new(SmallRng::from_rng(&mut rand::rng()));
}

/// Default lifetime of a feed snapshot (2 hours).
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(60 * 60 * 2);
/// Default recency cookie name.
pub const DEFAULT_COOKIE_NAME: &str = "_saml_idp";
/// Default number of remembered identity providers.
pub const DEFAULT_MAX_IDP: usize = 3;
/// Default number of search results returned by the search endpoint.
pub const DEFAULT_MAX_RESULTS: usize = 10;
/// Default search query parameter.
pub const DEFAULT_QUERY_PARAMETER: &str = "q";
/// Default parameter carrying the chosen entity towards the service provider.
pub const DEFAULT_RETURN_ID_PARAM: &str = "entityID";
/// Default per-attempt feed fetch timeout.
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(5);
/// Default size guard (64 MiB); federation-wide feeds are large.
pub const DEFAULT_MAX_RESPONSE_BYTES: u64 = 64 * 1_048_576;
/// Scheme assumed for requests whose URI and proxy headers do not name one.
pub const DEFAULT_REQUEST_SCHEME: &str = "https";
/// Locale used when the requested one has no translation.
pub const FALLBACK_LOCALE: &str = "en";

/// Where the discovery feed is read from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FeedSource {
	/// Remote discovery feed, usually the SP's `/Shibboleth.sso/DiscoFeed` handler.
	Url(Url),
	/// Discovery feed stored on the local filesystem.
	Path(PathBuf),
}
impl FeedSource {
	/// Short label used in logs and metrics.
	pub fn kind(&self) -> &'static str {
		match self {
			Self::Url(_) => "url",
			Self::Path(_) => "file",
		}
	}
}

/// How the parser treats feed entries it cannot normalise.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryPolicy {
	/// Drop the entry, log it, and keep parsing.
	#[default]
	Skip,
	/// Fail the whole parse.
	Reject,
}

/// Supported jitter strategies for retry policies.
#[derive(Clone, Debug, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JitterStrategy {
	/// No jitter; deterministic backoff schedule.
	None,
	/// Randomise the delay between 80% and 100% of the computed backoff.
	#[default]
	Full,
}

/// Retry configuration for feed fetches.
///
/// The default performs a single attempt bounded by [`DEFAULT_FETCH_TIMEOUT`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RetryPolicy {
	/// Retries performed after the initial attempt.
	pub max_retries: u32,
	/// Timeout applied to each individual attempt; an elapsed attempt counts as a failure.
	pub attempt_timeout: Duration,
	/// Initial delay before retrying after a failure.
	pub initial_backoff: Duration,
	/// Upper bound applied to exponential backoff growth.
	pub max_backoff: Duration,
	/// Overall deadline bounding the entire fetch sequence.
	pub deadline: Duration,
	/// Strategy used to randomize the computed backoff.
	#[serde(default)]
	pub jitter: JitterStrategy,
}
impl RetryPolicy {
	/// Validate invariants for retry configuration.
	pub fn validate(&self) -> Result<()> {
		if self.attempt_timeout < Duration::from_millis(100) {
			return Err(Error::Validation {
				field: "retry_policy.attempt_timeout",
				reason: "Must be at least 100 ms.".into(),
			});
		}
		if self.initial_backoff.is_zero() {
			return Err(Error::Validation {
				field: "retry_policy.initial_backoff",
				reason: "Must be greater than zero.".into(),
			});
		}
		if self.max_backoff < self.initial_backoff {
			return Err(Error::Validation {
				field: "retry_policy.max_backoff",
				reason: "Must be greater than or equal to initial_backoff.".into(),
			});
		}
		if self.deadline < self.attempt_timeout {
			return Err(Error::Validation {
				field: "retry_policy.deadline",
				reason: "Must be greater than or equal to attempt_timeout.".into(),
			});
		}

		Ok(())
	}

	/// Exponential backoff for the given retry, jittered per [`JitterStrategy`].
	pub fn compute_backoff(&self, attempt: u32) -> Duration {
		let exponent = attempt.min(16);
		let base = self.initial_backoff.saturating_mul(1 << exponent);
		let bounded = base.min(self.max_backoff).max(self.initial_backoff);

		match self.jitter {
			JitterStrategy::None => bounded,
			JitterStrategy::Full =>
				random_within(bounded.mul_f64(0.8).max(self.initial_backoff), bounded),
		}
	}
}
impl Default for RetryPolicy {
	fn default() -> Self {
		Self {
			max_retries: 0,
			attempt_timeout: DEFAULT_FETCH_TIMEOUT,
			initial_backoff: Duration::from_millis(250),
			max_backoff: Duration::from_secs(2),
			deadline: Duration::from_secs(8),
			jitter: JitterStrategy::Full,
		}
	}
}

/// Settings shared by the feed cache, the discovery service, and the endpoints.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DiscoveryConfig {
	/// Remote discovery feed; mutually exclusive with `feed_path`.
	#[serde(default)]
	pub feed_url: Option<Url>,
	/// Discovery feed on disk; mutually exclusive with `feed_url`.
	#[serde(default)]
	pub feed_path: Option<PathBuf>,
	/// Service-provider login handler the redirect endpoint sends users to.
	pub target_sp_url: Url,
	/// Lifetime of a feed snapshot before the next access refreshes it.
	#[serde(default = "default_cache_ttl")]
	pub cache_ttl: Duration,
	/// Name of the recency cookie.
	#[serde(default = "default_cookie_name")]
	pub cookie_name: String,
	/// Number of identity providers remembered in the recency cookie.
	#[serde(default = "default_max_idp")]
	pub max_idp: usize,
	/// Number of results returned by the search endpoint.
	#[serde(default = "default_max_results")]
	pub max_results: usize,
	/// Query parameter holding the search text.
	#[serde(default = "default_query_parameter")]
	pub query_parameter: String,
	/// Query parameter carrying the chosen entity id to the service provider.
	#[serde(default = "default_return_id_param")]
	pub return_id_param: String,
	/// Scheme of incoming requests when neither the URI nor `X-Forwarded-Proto` carries one.
	#[serde(default = "default_request_scheme")]
	pub default_scheme: String,
	/// Maximum size accepted for a feed payload in bytes.
	#[serde(default = "default_max_response_bytes")]
	pub max_response_bytes: u64,
	/// Treatment of feed entries that cannot be normalised.
	#[serde(default)]
	pub invalid_entries: EntryPolicy,
	/// Retry configuration for feed fetch attempts.
	#[serde(default)]
	pub retry_policy: RetryPolicy,
}
impl DiscoveryConfig {
	/// Construct a configuration with default settings.
	pub fn new(source: FeedSource, target_sp_url: impl AsRef<str>) -> Result<Self> {
		let target_sp_url = Url::parse(target_sp_url.as_ref())?;
		let (feed_url, feed_path) = match source {
			FeedSource::Url(url) => (Some(url), None),
			FeedSource::Path(path) => (None, Some(path)),
		};

		Ok(Self {
			feed_url,
			feed_path,
			target_sp_url,
			cache_ttl: DEFAULT_CACHE_TTL,
			cookie_name: DEFAULT_COOKIE_NAME.into(),
			max_idp: DEFAULT_MAX_IDP,
			max_results: DEFAULT_MAX_RESULTS,
			query_parameter: DEFAULT_QUERY_PARAMETER.into(),
			return_id_param: DEFAULT_RETURN_ID_PARAM.into(),
			default_scheme: DEFAULT_REQUEST_SCHEME.into(),
			max_response_bytes: DEFAULT_MAX_RESPONSE_BYTES,
			invalid_entries: EntryPolicy::Skip,
			retry_policy: RetryPolicy::default(),
		})
	}

	/// Override the snapshot lifetime.
	pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
		self.cache_ttl = ttl;

		self
	}

	/// Override the treatment of invalid feed entries.
	pub fn with_invalid_entries(mut self, policy: EntryPolicy) -> Self {
		self.invalid_entries = policy;

		self
	}

	/// Resolve the single configured feed source.
	pub fn feed_source(&self) -> Result<FeedSource> {
		match (&self.feed_url, &self.feed_path) {
			(Some(url), None) => Ok(FeedSource::Url(url.clone())),
			(None, Some(path)) => Ok(FeedSource::Path(path.clone())),
			(Some(_), Some(_)) => Err(Error::Validation {
				field: "feed_url",
				reason: "Set either feed_url or feed_path, not both.".into(),
			}),
			(None, None) => Err(Error::Validation {
				field: "feed_url",
				reason: "No discovery feed source; set feed_url or feed_path.".into(),
			}),
		}
	}

	/// Validate the configuration against the documented constraints.
	pub fn validate(&self) -> Result<()> {
		if let FeedSource::Url(url) = self.feed_source()?
			&& !matches!(url.scheme(), "http" | "https")
		{
			return Err(Error::Validation {
				field: "feed_url",
				reason: format!("Unsupported scheme '{}'.", url.scheme()),
			});
		}

		if self.target_sp_url.cannot_be_a_base() {
			return Err(Error::Validation {
				field: "target_sp_url",
				reason: "Must be an absolute hierarchical URL.".into(),
			});
		}
		if self.cache_ttl.is_zero() {
			return Err(Error::Validation {
				field: "cache_ttl",
				reason: "Must be greater than zero.".into(),
			});
		}

		validate_token("cookie_name", &self.cookie_name)?;
		validate_token("query_parameter", &self.query_parameter)?;
		validate_token("return_id_param", &self.return_id_param)?;

		if !matches!(self.default_scheme.as_str(), "http" | "https") {
			return Err(Error::Validation {
				field: "default_scheme",
				reason: format!("Unsupported scheme '{}'.", self.default_scheme),
			});
		}

		if self.max_idp == 0 {
			return Err(Error::Validation {
				field: "max_idp",
				reason: "Must be greater than zero.".into(),
			});
		}
		if self.max_results == 0 {
			return Err(Error::Validation {
				field: "max_results",
				reason: "Must be greater than zero.".into(),
			});
		}
		if self.max_response_bytes == 0 {
			return Err(Error::Validation {
				field: "max_response_bytes",
				reason: "Must be greater than zero.".into(),
			});
		}

		self.retry_policy.validate()
	}
}

fn random_within(min: Duration, max: Duration) -> Duration {
	if max <= min {
		return max;
	}

	SMALL_RNG.with(|cell| {
		let nanos = (max - min).as_nanos().min(u64::MAX as u128) as u64;

		min + Duration::from_nanos(cell.borrow_mut().random_range(0..=nanos))
	})
}

fn default_cache_ttl() -> Duration {
	DEFAULT_CACHE_TTL
}

fn default_cookie_name() -> String {
	DEFAULT_COOKIE_NAME.into()
}

fn default_max_idp() -> usize {
	DEFAULT_MAX_IDP
}

fn default_max_results() -> usize {
	DEFAULT_MAX_RESULTS
}

fn default_query_parameter() -> String {
	DEFAULT_QUERY_PARAMETER.into()
}

fn default_return_id_param() -> String {
	DEFAULT_RETURN_ID_PARAM.into()
}

fn default_request_scheme() -> String {
	DEFAULT_REQUEST_SCHEME.into()
}

fn default_max_response_bytes() -> u64 {
	DEFAULT_MAX_RESPONSE_BYTES
}

fn validate_token(field: &'static str, value: &str) -> Result<()> {
	if value.is_empty() {
		return Err(Error::Validation { field, reason: "Must not be empty.".into() });
	}
	if !value.bytes().all(|b| b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b'.')) {
		return Err(Error::Validation {
			field,
			reason: "May only contain ASCII letters, numbers, '-', '_', or '.'.".into(),
		});
	}

	Ok(())
}
