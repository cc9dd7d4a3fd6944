//! Substring search keys derived from identity provider display names.

// self
use crate::feed::model::IdentityProvider;

/// Build one search key per provider, aligned with the input order.
pub fn build_index(idps: &[IdentityProvider]) -> Vec<String> {
	idps.iter().map(search_key).collect()
}

/// Join every display name with single spaces, then lowercase and trim.
pub fn search_key(idp: &IdentityProvider) -> String {
	let joined = idp.name.values().collect::<Vec<_>>().join(" ");

	joined.to_lowercase().trim().to_owned()
}

/// Lowercase and trim a search token the same way keys are normalised.
pub fn normalize_token(token: &str) -> String {
	token.to_lowercase().trim().to_owned()
}

/// Whether every token occurs somewhere in the key.
///
/// Tokens are expected to be normalised with [`normalize_token`].
pub fn matches_all<S>(key: &str, tokens: &[S]) -> bool
where
	S: AsRef<str>,
{
	tokens.iter().all(|token| key.contains(token.as_ref()))
}
