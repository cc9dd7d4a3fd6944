//! Discovery operations answered from the shared feed cache.

// std
use std::fmt::{Debug, Formatter, Result as FmtResult};
// crates.io
use serde::Serialize;
use serde_json::Value;
use url::Url;
// self
use crate::{
	_prelude::*,
	cache::{manager::FeedCache, snapshot::FeedSnapshot},
	config::DiscoveryConfig,
	feed::{
		index::{matches_all, normalize_token},
		model::LocalizedIdentityProvider,
	},
	recent,
};

/// Post-processing applied to result lists before they leave the service.
///
/// Results arrive as JSON objects with `entity_id`, `name`, `description`, and
/// `logo`; implementations may reshape them freely.
pub trait ResultTransformer: Send + Sync {
	/// Transform a list of localized results.
	fn transform(&self, results: Vec<Value>) -> Vec<Value>;
}

/// Returns results unchanged.
#[derive(Clone, Copy, Debug, Default)]
pub struct IdentityTransformer;
impl ResultTransformer for IdentityTransformer {
	fn transform(&self, results: Vec<Value>) -> Vec<Value> {
		results
	}
}

/// Reshapes results for Select2 widgets: `entity_id` becomes `id`, `name` becomes `text`.
#[derive(Clone, Copy, Debug, Default)]
pub struct Select2Transformer;
impl ResultTransformer for Select2Transformer {
	fn transform(&self, results: Vec<Value>) -> Vec<Value> {
		results
			.into_iter()
			.map(|mut result| {
				if let Value::Object(fields) = &mut result {
					for (from, to) in [("entity_id", "id"), ("name", "text")] {
						if let Some(value) = fields.remove(from) {
							fields.insert(to.into(), value);
						}
					}
				}

				result
			})
			.collect()
	}
}

/// Data handed to login templates.
#[derive(Clone, Debug, Serialize)]
pub struct LoginContext {
	/// Recently chosen providers, localized and post-processed, in cookie order.
	pub recent_idps: Vec<Value>,
	/// Service-provider login handler.
	pub target_sp_url: Url,
	/// Parameter carrying the chosen entity id to the service provider.
	pub return_id_param: String,
}

/// Builder for [`DiscoveryService`].
pub struct DiscoveryServiceBuilder {
	config: DiscoveryConfig,
	cache: Option<FeedCache>,
	transformer: Arc<dyn ResultTransformer>,
}
impl DiscoveryServiceBuilder {
	/// Start from a configuration with the identity post-processor.
	pub fn new(config: DiscoveryConfig) -> Self {
		Self { config, cache: None, transformer: Arc::new(IdentityTransformer) }
	}

	/// Share an existing cache instead of creating one.
	pub fn cache(mut self, cache: FeedCache) -> Self {
		self.cache = Some(cache);

		self
	}

	/// Install a result post-processor.
	pub fn transformer<T>(mut self, transformer: T) -> Self
	where
		T: 'static + ResultTransformer,
	{
		self.transformer = Arc::new(transformer);

		self
	}

	/// Validate the configuration and construct the service.
	pub fn build(self) -> Result<DiscoveryService> {
		self.config.validate()?;

		let cache = match self.cache {
			Some(cache) => cache,
			None => FeedCache::new(&self.config)?,
		};

		Ok(DiscoveryService {
			config: Arc::new(self.config),
			cache,
			transformer: self.transformer,
		})
	}
}
impl Debug for DiscoveryServiceBuilder {
	fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
		f.debug_struct("DiscoveryServiceBuilder").field("config", &self.config).finish_non_exhaustive()
	}
}

/// Entry point for discovery requests; cheap to clone and share across tasks.
#[derive(Clone)]
pub struct DiscoveryService {
	config: Arc<DiscoveryConfig>,
	cache: FeedCache,
	transformer: Arc<dyn ResultTransformer>,
}
impl DiscoveryService {
	/// Build a service with a fresh cache and the identity post-processor.
	pub fn new(config: DiscoveryConfig) -> Result<Self> {
		Self::builder(config).build()
	}

	/// Create a [`DiscoveryServiceBuilder`] for advanced configuration.
	pub fn builder(config: DiscoveryConfig) -> DiscoveryServiceBuilder {
		DiscoveryServiceBuilder::new(config)
	}

	/// Active configuration.
	pub fn config(&self) -> &DiscoveryConfig {
		&self.config
	}

	/// Feed cache backing the service.
	pub fn cache(&self) -> &FeedCache {
		&self.cache
	}

	/// Resolve the saved entity ids against the feed for the login page.
	///
	/// Ids are matched exactly, kept in the given order, and dropped when the
	/// feed no longer lists them.
	#[tracing::instrument(skip(self, saved_ids), fields(saved = saved_ids.len()))]
	pub async fn build_login_context<S>(&self, locale: &str, saved_ids: &[S]) -> Result<LoginContext>
	where
		S: AsRef<str>,
	{
		let snapshot = self.cache.get().await?;
		let recent_idps = saved_ids
			.iter()
			.filter_map(|id| snapshot.find(id.as_ref()))
			.map(|idp| idp.localize(locale))
			.collect();

		Ok(LoginContext {
			recent_idps: self.transform(recent_idps),
			target_sp_url: self.config.target_sp_url.clone(),
			return_id_param: self.config.return_id_param.clone(),
		})
	}

	/// Providers whose names contain every token, case-insensitively, in feed order.
	///
	/// An empty token list matches nothing.
	pub async fn search<S>(&self, tokens: &[S], locale: &str) -> Result<Vec<LocalizedIdentityProvider>>
	where
		S: AsRef<str>,
	{
		if tokens.is_empty() {
			return Ok(Vec::new());
		}

		let snapshot = self.cache.get().await?;

		Ok(search_snapshot(&snapshot, tokens, locale))
	}

	/// Validate a choice and return the updated recency list.
	pub async fn record_choice<S>(&self, entity_id: &str, existing: &[S]) -> Result<Vec<String>>
	where
		S: AsRef<str>,
	{
		let snapshot = self.cache.get().await?;

		if !snapshot.contains(entity_id) {
			return Err(Error::UnknownEntity { entity_id: entity_id.to_owned() });
		}

		Ok(recent::remember(existing, entity_id, self.config.max_idp))
	}

	/// Apply the configured post-processor to localized results.
	pub fn transform(&self, results: Vec<LocalizedIdentityProvider>) -> Vec<Value> {
		self.transformer.transform(results.into_iter().map(Value::from).collect())
	}
}
impl Debug for DiscoveryService {
	fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
		f.debug_struct("DiscoveryService")
			.field("config", &self.config)
			.field("cache", &self.cache)
			.finish_non_exhaustive()
	}
}

fn search_snapshot<S>(
	snapshot: &FeedSnapshot,
	tokens: &[S],
	locale: &str,
) -> Vec<LocalizedIdentityProvider>
where
	S: AsRef<str>,
{
	let tokens: Vec<String> = tokens.iter().map(|token| normalize_token(token.as_ref())).collect();

	snapshot
		.entries()
		.filter(|(_, key)| matches_all(key, &tokens))
		.map(|(idp, _)| idp.localize(locale))
		.collect()
}
