//! Discovery feed (Shibboleth `DiscoFeed` JSON) normalisation.

// crates.io
use serde::Deserialize;
use serde_json::{Map, Value};
// self
use crate::{
	_prelude::*,
	config::EntryPolicy,
	feed::model::{IdentityProvider, LocalizedText},
};

/// Parse raw feed bytes into normalised identity providers, in feed order.
///
/// The payload must be a JSON list of objects; anything else is an
/// [`Error::FeedFormat`]. Entries lacking an `entityID` or carrying malformed
/// sub-lists are handled according to `policy`.
pub fn parse_feed(raw: &[u8], policy: EntryPolicy) -> Result<Vec<IdentityProvider>> {
	let entries: Vec<Map<String, Value>> = serde_json::from_slice(raw)
		.map_err(|err| Error::FeedFormat(format!("Expected a JSON list of objects: {err}.")))?;
	let mut idps = Vec::with_capacity(entries.len());

	for (position, entry) in entries.into_iter().enumerate() {
		match normalize(entry) {
			Ok(idp) => idps.push(idp),
			Err(reason) => match policy {
				EntryPolicy::Skip => {
					tracing::warn!(position, %reason, "skipping invalid discovery feed entry");
				},
				EntryPolicy::Reject => {
					return Err(Error::FeedFormat(format!("Entry {position}: {reason}")));
				},
			},
		}
	}

	Ok(idps)
}

#[derive(Debug, Deserialize)]
struct FeedEntry {
	#[serde(rename = "entityID", default)]
	entity_id: Option<String>,
	#[serde(rename = "DisplayNames", default)]
	display_names: Vec<LangValue>,
	#[serde(rename = "Descriptions", default)]
	descriptions: Vec<LangValue>,
	#[serde(rename = "Logos", default)]
	logos: Vec<FeedLogo>,
}

#[derive(Debug, Deserialize)]
struct LangValue {
	lang: Option<String>,
	value: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FeedLogo {
	value: Option<String>,
	height: Option<Value>,
	width: Option<Value>,
}
impl FeedLogo {
	fn size(&self) -> u64 {
		pixels(self.height.as_ref()).saturating_add(pixels(self.width.as_ref()))
	}
}

fn normalize(entry: Map<String, Value>) -> std::result::Result<IdentityProvider, String> {
	let entry: FeedEntry =
		serde_json::from_value(Value::Object(entry)).map_err(|err| err.to_string())?;
	let entity_id = match entry.entity_id {
		Some(id) if !id.is_empty() => id,
		_ => return Err("missing entityID".into()),
	};

	Ok(IdentityProvider {
		entity_id,
		name: localized(entry.display_names),
		description: localized(entry.descriptions),
		logo: largest_logo(entry.logos),
	})
}

// Later duplicates of a language overwrite earlier ones in place.
fn localized(pairs: Vec<LangValue>) -> LocalizedText {
	pairs
		.into_iter()
		.filter_map(|pair| Some((pair.lang?, pair.value?)))
		.collect()
}

fn largest_logo(logos: Vec<FeedLogo>) -> Option<String> {
	let mut largest: Option<(u64, FeedLogo)> = None;

	for logo in logos {
		let size = logo.size();

		if largest.as_ref().is_none_or(|(best, _)| size > *best) {
			largest = Some((size, logo));
		}
	}

	largest.and_then(|(_, logo)| logo.value)
}

// Feeds carry dimensions as numbers or numeric strings.
fn pixels(value: Option<&Value>) -> u64 {
	match value {
		Some(Value::Number(number)) =>
			number.as_u64().or_else(|| number.as_f64().map(|f| f.max(0.) as u64)).unwrap_or(0),
		Some(Value::String(text)) => text.trim().parse().unwrap_or(0),
		_ => 0,
	}
}
