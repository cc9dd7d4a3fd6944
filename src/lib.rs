//! Identity provider discovery core for federated single sign-on: a cached,
//! searchable discovery feed, a recency cookie, and service-provider redirects.

#![deny(clippy::all, missing_docs, unused_crate_dependencies)]

pub mod cache;
pub mod config;
pub mod endpoint;
pub mod feed;
pub mod metrics;
pub mod recent;
pub mod service;

mod error;
mod _prelude {
	pub use std::{
		sync::Arc,
		time::{Duration, SystemTime},
	};

	pub use chrono::{DateTime, TimeDelta, Utc};
	pub use tokio::time::Instant;

	pub use crate::{Error, Result};
}

#[cfg(feature = "prometheus")] pub use crate::metrics::install_default_exporter;
pub use crate::{
	cache::{
		manager::FeedCache,
		snapshot::FeedSnapshot,
		status::{FeedState, FeedStatus},
	},
	config::{DiscoveryConfig, EntryPolicy, FeedSource, JitterStrategy, RetryPolicy},
	error::{Error, Result},
	feed::model::{IdentityProvider, LocalizedIdentityProvider},
	service::{
		DiscoveryService, DiscoveryServiceBuilder, IdentityTransformer, LoginContext,
		ResultTransformer, Select2Transformer,
	},
};
