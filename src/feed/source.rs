//! Raw feed retrieval from a URL or a local file.

// crates.io
use reqwest::{Client, header::ACCEPT};
use tokio::{fs, time};
// self
use crate::{_prelude::*, config::FeedSource};

/// Raw bytes returned by a single fetch attempt.
#[derive(Clone, Debug)]
pub struct FeedFetch {
	/// Undecoded feed payload.
	pub body: Vec<u8>,
	/// Time spent on the attempt.
	pub elapsed: Duration,
}

/// Fetch the feed once, failing with [`Error::FetchTimeout`] when `attempt_timeout` elapses.
pub async fn fetch_feed(
	client: &Client,
	source: &FeedSource,
	max_response_bytes: u64,
	attempt_timeout: Duration,
) -> Result<FeedFetch> {
	let start = Instant::now();
	let body = time::timeout(attempt_timeout, read_source(client, source))
		.await
		.map_err(|_| Error::FetchTimeout { timeout: attempt_timeout })??;
	let elapsed = start.elapsed();

	if body.len() as u64 > max_response_bytes {
		return Err(Error::Validation {
			field: "max_response_bytes",
			reason: format!(
				"Feed size {size} bytes exceeds the configured guard of {max_response_bytes} bytes.",
				size = body.len(),
			),
		});
	}

	tracing::debug!(source = source.kind(), bytes = body.len(), ?elapsed, "feed fetch complete");

	Ok(FeedFetch { body, elapsed })
}

async fn read_source(client: &Client, source: &FeedSource) -> Result<Vec<u8>> {
	match source {
		FeedSource::Url(url) => {
			let response =
				client.get(url.clone()).header(ACCEPT, "application/json").send().await?;
			let status = response.status();

			if !status.is_success() {
				let body = response.text().await.ok();

				return Err(Error::HttpStatus { status, url: url.clone(), body });
			}

			Ok(response.bytes().await?.to_vec())
		},
		FeedSource::Path(path) => Ok(fs::read(path).await?),
	}
}
