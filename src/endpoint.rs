//! Framework-agnostic request handlers built on `http` types.
//!
//! Handlers never fail: errors are mapped onto plain-text responses using
//! [`Error::status_code`], so any server can mount them directly.

// crates.io
use http::{
	HeaderMap, HeaderValue, Request, Response, StatusCode,
	header::{CONTENT_TYPE, COOKIE, HOST, LOCATION, SET_COOKIE},
};
use serde::{Deserialize, Serialize};
use url::{Url, form_urlencoded};
// self
use crate::{
	_prelude::*,
	config::DiscoveryConfig,
	recent,
	service::{DiscoveryService, LoginContext},
};

/// Query parameter carrying the chosen entity id into the redirect endpoint.
pub const REDIRECT_ENTITY_PARAM: &str = "entityID";
/// Query parameter carrying the post-login destination into the redirect endpoint.
pub const REDIRECT_NEXT_PARAM: &str = "next";
/// Query parameter the service provider reads the post-login destination from.
pub const SP_TARGET_PARAM: &str = "target";
/// Proxy header naming the scheme the client used.
pub const X_FORWARDED_PROTO: &str = "x-forwarded-proto";
/// Lifetime of the recency cookie.
pub const RECENCY_COOKIE_LIFETIME: Duration = Duration::from_secs(60 * 60 * 24 * 365);

#[derive(Debug, Deserialize)]
struct RememberRequest {
	#[serde(default)]
	entity_id: Option<String>,
}

#[derive(Debug, Serialize)]
struct SearchResponse {
	results: Vec<serde_json::Value>,
}

/// `GET` search: split the query on whitespace and answer `{"results": [...]}`.
pub async fn search<B>(service: &DiscoveryService, request: &Request<B>, locale: &str) -> Response<String> {
	let outcome = async {
		let config = service.config();
		let query = query_param(request, &config.query_parameter).unwrap_or_default();
		let tokens: Vec<&str> = query.split_whitespace().collect();
		let mut results = service.search(&tokens[..], locale).await?;

		results.truncate(config.max_results);

		json_response(StatusCode::OK, &SearchResponse { results: service.transform(results) })
	};

	outcome.await.unwrap_or_else(error_response)
}

/// `POST` remember-choice: body `{"entity_id": "..."}`; answers with an updated recency cookie.
pub async fn remember_idp<B>(service: &DiscoveryService, request: &Request<B>) -> Response<String>
where
	B: AsRef<[u8]>,
{
	let outcome = async {
		let body: RememberRequest = serde_json::from_slice(request.body().as_ref())
			.map_err(|err| Error::InvalidRequest(format!("Invalid JSON: {err}.")))?;
		let entity_id = body
			.entity_id
			.filter(|id| !id.is_empty())
			.ok_or_else(|| Error::InvalidRequest("entity_id must not be empty.".into()))?;
		let saved = saved_idps(service.config(), request);
		let updated = service.record_choice(&entity_id, &saved).await?;

		tracing::debug!(%entity_id, remembered = updated.len(), "remembered identity provider");

		Response::builder()
			.status(StatusCode::OK)
			.header(SET_COOKIE, recency_cookie(service.config(), &updated)?)
			.body(String::new())
			.map_err(Error::from)
	};

	outcome.await.unwrap_or_else(error_response)
}

/// `GET` redirect: remember `entityID` and send the browser to the service-provider login handler.
///
/// `next` is resolved against the request's own scheme and host and must stay
/// on them; it defaults to the host root. The scheme comes from the request URI,
/// then `X-Forwarded-Proto`, then [`DiscoveryConfig::default_scheme`].
pub async fn redirect<B>(service: &DiscoveryService, request: &Request<B>) -> Response<String> {
	let outcome = async {
		let config = service.config();
		let entity_id = query_param(request, REDIRECT_ENTITY_PARAM)
			.filter(|id| !id.is_empty())
			.ok_or_else(|| Error::InvalidRequest(format!("{REDIRECT_ENTITY_PARAM} is required.")))?;
		let next = query_param(request, REDIRECT_NEXT_PARAM);
		let target = resolve_next(config, request, next.as_deref().unwrap_or("/"))?;
		let saved = saved_idps(config, request);
		let updated = service.record_choice(&entity_id, &saved).await?;
		let mut location = config.target_sp_url.clone();

		location
			.query_pairs_mut()
			.append_pair(&config.return_id_param, &entity_id)
			.append_pair(SP_TARGET_PARAM, target.as_str());

		tracing::debug!(%entity_id, %location, "redirecting to service provider");

		Response::builder()
			.status(StatusCode::FOUND)
			.header(LOCATION, location.as_str())
			.header(SET_COOKIE, recency_cookie(config, &updated)?)
			.body(String::new())
			.map_err(Error::from)
	};

	outcome.await.unwrap_or_else(error_response)
}

/// Build the login-page context from the request's recency cookie.
pub async fn login_context<B>(
	service: &DiscoveryService,
	request: &Request<B>,
	locale: &str,
) -> Result<LoginContext> {
	service.build_login_context(locale, &saved_idps(service.config(), request)).await
}

/// `GET` status: the feed cache status as JSON.
pub async fn status(service: &DiscoveryService) -> Response<String> {
	let status = service.cache().status().await;

	json_response(StatusCode::OK, &status).unwrap_or_else(error_response)
}

/// Decode the recency cookie carried by the request, skipping malformed tokens.
pub fn saved_idps<B>(config: &DiscoveryConfig, request: &Request<B>) -> Vec<String> {
	cookie_value(request.headers(), &config.cookie_name).map(recent::decode).unwrap_or_default()
}

/// `Set-Cookie` value persisting `ids` for [`RECENCY_COOKIE_LIFETIME`].
pub fn recency_cookie<S>(config: &DiscoveryConfig, ids: &[S]) -> Result<HeaderValue>
where
	S: AsRef<str>,
{
	let expires = httpdate::fmt_http_date(SystemTime::now() + RECENCY_COOKIE_LIFETIME);
	let cookie = format!(
		"{name}=\"{value}\"; Expires={expires}; Max-Age={max_age}; Path=/; HttpOnly; SameSite=Lax",
		name = config.cookie_name,
		value = recent::encode(ids),
		max_age = RECENCY_COOKIE_LIFETIME.as_secs(),
	);

	HeaderValue::from_str(&cookie).map_err(|err| Error::Http(err.into()))
}

fn query_param<B>(request: &Request<B>, name: &str) -> Option<String> {
	let query = request.uri().query()?;

	form_urlencoded::parse(query.as_bytes())
		.find(|(key, _)| key == name)
		.map(|(_, value)| value.into_owned())
}

fn cookie_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
	headers
		.get_all(COOKIE)
		.iter()
		.filter_map(|value| value.to_str().ok())
		.flat_map(|header| header.split(';'))
		.filter_map(|pair| pair.trim().split_once('='))
		.find(|(key, _)| *key == name)
		.map(|(_, value)| value)
}

fn request_scheme<'a, B>(config: &'a DiscoveryConfig, request: &'a Request<B>) -> &'a str {
	request
		.uri()
		.scheme_str()
		.or_else(|| {
			request
				.headers()
				.get(X_FORWARDED_PROTO)
				.and_then(|value| value.to_str().ok())
				.and_then(|value| value.split(',').next())
				.map(str::trim)
				.filter(|proto| matches!(*proto, "http" | "https"))
		})
		.unwrap_or(&config.default_scheme)
}

fn resolve_next<B>(config: &DiscoveryConfig, request: &Request<B>, next: &str) -> Result<Url> {
	let host = request
		.headers()
		.get(HOST)
		.and_then(|value| value.to_str().ok())
		.or_else(|| request.uri().authority().map(|authority| authority.as_str()))
		.ok_or_else(|| Error::InvalidRequest("Request carries no host.".into()))?;
	let scheme = request_scheme(config, request);
	let base = Url::parse(&format!("{scheme}://{host}/"))
		.map_err(|err| Error::InvalidRequest(format!("Invalid host '{host}': {err}.")))?;
	let target = base
		.join(next)
		.map_err(|err| Error::InvalidRequest(format!("Invalid next URL: {err}.")))?;

	if target.scheme() != base.scheme()
		|| target.host_str() != base.host_str()
		|| target.port_or_known_default() != base.port_or_known_default()
	{
		return Err(Error::InvalidRequest("next must stay on the current host.".into()));
	}

	Ok(target)
}

fn json_response<T>(status: StatusCode, body: &T) -> Result<Response<String>>
where
	T: Serialize,
{
	Response::builder()
		.status(status)
		.header(CONTENT_TYPE, "application/json")
		.body(serde_json::to_string(body)?)
		.map_err(Error::from)
}

fn error_response(err: Error) -> Response<String> {
	let status = err.status_code();

	if err.is_client_error() {
		tracing::debug!(error = %err, "rejected discovery request");
	} else {
		tracing::warn!(error = %err, "discovery request failed");
	}

	let mut response = Response::new(err.to_string());

	*response.status_mut() = status;
	response
		.headers_mut()
		.insert(CONTENT_TYPE, HeaderValue::from_static("text/plain; charset=utf-8"));

	response
}
