//! Crate-wide error types and `Result` alias.

// crates.io
use http::StatusCode;

/// Library-wide result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Unified error type for the discovery crate.
#[allow(missing_docs)]
#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error(transparent)]
	Io(#[from] std::io::Error),

	#[error(transparent)]
	Http(#[from] http::Error),
	#[error(transparent)]
	Reqwest(#[from] reqwest::Error),
	#[error(transparent)]
	Serde(#[from] serde_json::Error),
	#[error(transparent)]
	Url(#[from] url::ParseError),

	#[error("Malformed recency cookie token '{token}': {reason}")]
	CookieDecode { token: String, reason: String },
	#[error("Malformed discovery feed: {0}")]
	FeedFormat(String),
	#[error("Discovery feed unavailable: {reason}")]
	FeedUnavailable { reason: String },
	#[error("Feed fetch timed out after {timeout:?}.")]
	FetchTimeout { timeout: std::time::Duration },
	#[error("Upstream HTTP status {status} from {url}: {body:?}")]
	HttpStatus { status: StatusCode, url: url::Url, body: Option<String> },
	#[error("Invalid request: {0}")]
	InvalidRequest(String),
	#[cfg(feature = "metrics")]
	#[error("Metrics error: {0}")]
	Metrics(String),
	#[error("Unknown identity provider '{entity_id}'.")]
	UnknownEntity { entity_id: String },
	#[error("Validation failed for {field}: {reason}")]
	Validation { field: &'static str, reason: String },
}
impl Error {
	/// HTTP status an endpoint answers with when this error escapes a request.
	pub fn status_code(&self) -> StatusCode {
		match self {
			Self::InvalidRequest(_) | Self::UnknownEntity { .. } | Self::CookieDecode { .. } =>
				StatusCode::BAD_REQUEST,
			Self::FeedUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
			_ => StatusCode::INTERNAL_SERVER_ERROR,
		}
	}

	/// Whether the error is the caller's fault rather than the service's.
	pub fn is_client_error(&self) -> bool {
		self.status_code().is_client_error()
	}
}
