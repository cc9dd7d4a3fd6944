//! Immutable pairing of identity providers with their search keys.

// self
use crate::{
	_prelude::*,
	feed::{index::build_index, model::IdentityProvider},
};

/// Identity providers and search index built from one feed fetch.
///
/// `idps[i]` and `index[i]` always describe the same provider; the index is
/// computed on construction and neither list is ever mutated afterwards.
#[derive(Clone, Debug)]
pub struct FeedSnapshot {
	idps: Vec<IdentityProvider>,
	index: Vec<String>,
	built_at: DateTime<Utc>,
}
impl FeedSnapshot {
	/// Build a snapshot, deriving the search index from `idps`.
	pub fn new(idps: Vec<IdentityProvider>, built_at: DateTime<Utc>) -> Self {
		let index = build_index(&idps);

		Self { idps, index, built_at }
	}

	/// Providers in feed order.
	pub fn idps(&self) -> &[IdentityProvider] {
		&self.idps
	}

	/// Search keys aligned with [`Self::idps`].
	pub fn index(&self) -> &[String] {
		&self.index
	}

	/// Wall-clock time the snapshot was built.
	pub fn built_at(&self) -> DateTime<Utc> {
		self.built_at
	}

	/// Number of providers in the snapshot.
	pub fn len(&self) -> usize {
		self.idps.len()
	}

	/// Whether the feed contained no usable provider.
	pub fn is_empty(&self) -> bool {
		self.idps.is_empty()
	}

	/// Providers paired with their search keys, in feed order.
	pub fn entries(&self) -> impl Iterator<Item = (&IdentityProvider, &str)> {
		self.idps.iter().zip(self.index.iter().map(String::as_str))
	}

	/// Look up a provider by exact entity id.
	pub fn find(&self, entity_id: &str) -> Option<&IdentityProvider> {
		self.idps.iter().find(|idp| idp.entity_id == entity_id)
	}

	/// Whether a provider with exactly this entity id exists.
	pub fn contains(&self, entity_id: &str) -> bool {
		self.find(entity_id).is_some()
	}
}
