//! Normalised identity provider records and their localized projection.

// crates.io
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
// self
use crate::config::FALLBACK_LOCALE;

/// Locale-keyed display strings in feed order, e.g. `[("de", "Hochschule Bochum")]`.
///
/// A repeated locale keeps its first position and takes the latest text.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LocalizedText(Vec<(String, String)>);
impl LocalizedText {
	/// Create an empty set of texts.
	pub fn new() -> Self {
		Self::default()
	}

	/// Set the text for `locale`.
	pub fn insert(&mut self, locale: impl Into<String>, text: impl Into<String>) {
		let locale = locale.into();
		let text = text.into();

		match self.0.iter_mut().find(|(known, _)| *known == locale) {
			Some((_, existing)) => *existing = text,
			None => self.0.push((locale, text)),
		}
	}

	/// Text for exactly `locale`.
	pub fn get(&self, locale: &str) -> Option<&str> {
		self.0.iter().find(|(known, _)| known == locale).map(|(_, text)| text.as_str())
	}

	/// Texts in feed order.
	pub fn values(&self) -> impl Iterator<Item = &str> {
		self.0.iter().map(|(_, text)| text.as_str())
	}

	/// Number of locales.
	pub fn len(&self) -> usize {
		self.0.len()
	}

	/// Whether no locale has a text.
	pub fn is_empty(&self) -> bool {
		self.0.is_empty()
	}
}
impl<L, T> FromIterator<(L, T)> for LocalizedText
where
	L: Into<String>,
	T: Into<String>,
{
	fn from_iter<I>(iter: I) -> Self
	where
		I: IntoIterator<Item = (L, T)>,
	{
		let mut text = Self::new();

		for (locale, value) in iter {
			text.insert(locale, value);
		}

		text
	}
}
impl<L, T, const N: usize> From<[(L, T); N]> for LocalizedText
where
	L: Into<String>,
	T: Into<String>,
{
	fn from(pairs: [(L, T); N]) -> Self {
		pairs.into_iter().collect()
	}
}

/// Identity provider entry normalised from the discovery feed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityProvider {
	/// SAML entity id; unique key of the provider.
	pub entity_id: String,
	/// Display names per locale.
	pub name: LocalizedText,
	/// Descriptions per locale.
	pub description: LocalizedText,
	/// URL of the largest advertised logo.
	pub logo: Option<String>,
}
impl IdentityProvider {
	/// Project the provider onto a single locale.
	pub fn localize(&self, locale: &str) -> LocalizedIdentityProvider {
		LocalizedIdentityProvider {
			entity_id: self.entity_id.clone(),
			name: resolve(&self.name, locale).to_owned(),
			description: resolve(&self.description, locale).to_owned(),
			logo: self.logo.clone(),
		}
	}
}

/// Identity provider with name and description resolved to one locale.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalizedIdentityProvider {
	/// SAML entity id.
	pub entity_id: String,
	/// Display name in the resolved locale, or empty.
	pub name: String,
	/// Description in the resolved locale, or empty.
	pub description: String,
	/// URL of the largest logo; serialised as `null` when absent.
	pub logo: Option<String>,
}

impl From<LocalizedIdentityProvider> for Value {
	fn from(idp: LocalizedIdentityProvider) -> Self {
		json!({
			"entity_id": idp.entity_id,
			"name": idp.name,
			"description": idp.description,
			"logo": idp.logo,
		})
	}
}

/// Resolve `locale`, then [`FALLBACK_LOCALE`], then the empty string.
pub fn resolve<'a>(text: &'a LocalizedText, locale: &str) -> &'a str {
	text.get(locale).or_else(|| text.get(FALLBACK_LOCALE)).unwrap_or_default()
}
