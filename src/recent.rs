//! Recency cookie codec for recently chosen identity providers.
//!
//! The cookie value is a space-separated list of standard (padded) base64
//! entity ids, most recent first.

// crates.io
use base64::prelude::*;
// self
use crate::_prelude::*;

/// Encode entity ids into a cookie value, preserving order.
pub fn encode<I, S>(ids: I) -> String
where
	I: IntoIterator<Item = S>,
	S: AsRef<str>,
{
	ids.into_iter().map(|id| BASE64_STANDARD.encode(id.as_ref())).collect::<Vec<_>>().join(" ")
}

/// Decode a cookie value, skipping tokens that are not base64-encoded UTF-8.
pub fn decode(value: &str) -> Vec<String> {
	tokens(value)
		.filter_map(|token| match decode_token(token) {
			Ok(id) => Some(id),
			Err(err) => {
				tracing::debug!(error = %err, "skipping malformed recency cookie token");

				None
			},
		})
		.collect()
}

/// Decode a cookie value, failing on the first malformed token.
pub fn decode_strict(value: &str) -> Result<Vec<String>> {
	tokens(value).map(decode_token).collect()
}

/// Move `chosen` to the front of `existing`, dropping duplicates and truncating to `capacity`.
pub fn remember<S>(existing: &[S], chosen: &str, capacity: usize) -> Vec<String>
where
	S: AsRef<str>,
{
	std::iter::once(chosen)
		.chain(existing.iter().map(AsRef::as_ref).filter(|id| *id != chosen))
		.take(capacity)
		.map(str::to_owned)
		.collect()
}

// Servers that quote cookie values containing spaces deliver `"a b"`.
fn tokens(value: &str) -> impl Iterator<Item = &str> {
	let value = value.trim();
	let value = value
		.strip_prefix('"')
		.and_then(|inner| inner.strip_suffix('"'))
		.unwrap_or(value);

	value.split(' ').filter(|token| !token.is_empty())
}

fn decode_token(token: &str) -> Result<String> {
	let bytes = BASE64_STANDARD.decode(token).map_err(|err| Error::CookieDecode {
		token: token.to_owned(),
		reason: err.to_string(),
	})?;

	String::from_utf8(bytes).map_err(|err| Error::CookieDecode {
		token: token.to_owned(),
		reason: err.to_string(),
	})
}
