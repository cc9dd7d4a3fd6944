//! Integration tests for the HTTP handlers over a file-backed feed.

// crates.io
use http::{
	Request, Response, StatusCode,
	header::{CONTENT_TYPE, COOKIE, HOST, LOCATION, SET_COOKIE},
};
use idp_discovery::{
	DiscoveryConfig, DiscoveryService, FeedSource, Select2Transformer, endpoint, recent,
};
use serde_json::{Value, json};
use url::{Url, form_urlencoded};

const FEED_FILE: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/tests/fixtures/discofeed.json");
const SP_LOGIN: &str = "https://sp.example.org/Shibboleth.sso/Login";
const DARMSTADT: &str = "https://idp.hrz.tu-darmstadt.de/idp/shibboleth";
const KASSEL: &str = "https://idp.hrz.uni-kassel.de/idp/shibboleth-idp";
const BOCHUM: &str = "https://idp.hs-bochum.de/idp/shibboleth";

fn config() -> DiscoveryConfig {
	DiscoveryConfig::new(FeedSource::Path(FEED_FILE.into()), SP_LOGIN).expect("config")
}

fn service() -> DiscoveryService {
	DiscoveryService::new(config()).expect("service")
}

fn query(pairs: &[(&str, &str)]) -> String {
	let mut serializer = form_urlencoded::Serializer::new(String::new());

	for (key, value) in pairs {
		serializer.append_pair(key, value);
	}

	serializer.finish()
}

fn get(path: &str, pairs: &[(&str, &str)]) -> Request<()> {
	Request::builder()
		.uri(format!("{path}?{}", query(pairs)))
		.header(HOST, "app.example.org")
		.body(())
		.expect("request")
}

fn post(body: &str, saved: &[&str]) -> Request<String> {
	let mut builder = Request::builder().method("POST").uri("/discovery/remember/");

	if !saved.is_empty() {
		builder = builder.header(COOKIE, format!("_saml_idp=\"{}\"", recent::encode(saved)));
	}

	builder.body(body.to_owned()).expect("request")
}

fn json_body(response: &Response<String>) -> Value {
	serde_json::from_str(response.body()).expect("json body")
}

fn cookie_ids(response: &Response<String>) -> Vec<String> {
	let cookie = response.headers()[SET_COOKIE].to_str().expect("ascii cookie");
	let value = cookie
		.split(';')
		.next()
		.and_then(|pair| pair.split_once('='))
		.map(|(_, value)| value)
		.expect("cookie value");

	recent::decode(value)
}

#[tokio::test]
async fn search_returns_localized_matches() {
	let _ = tracing_subscriber::fmt::try_init();

	let service = service();
	let response = endpoint::search(&service, &get("/discovery/search/", &[("q", "Universität")]), "de").await;

	assert_eq!(response.status(), StatusCode::OK);
	assert_eq!(response.headers()[CONTENT_TYPE], "application/json");

	let body = json_body(&response);
	let results = body["results"].as_array().expect("results");

	assert_eq!(results.len(), 2);
	assert_eq!(results[0]["entity_id"], DARMSTADT);
	assert_eq!(results[1]["name"], "Universität Kassel");

	let response = endpoint::search(&service, &get("/discovery/search/", &[("q", "  ")]), "de").await;

	assert_eq!(json_body(&response), json!({ "results": [] }));
}

#[tokio::test]
async fn search_truncates_and_transforms_results() {
	let mut config = config();

	config.max_results = 1;

	let service =
		DiscoveryService::builder(config).transformer(Select2Transformer).build().expect("service");
	let response = endpoint::search(&service, &get("/discovery/search/", &[("q", "a")]), "en").await;
	let body = json_body(&response);
	let results = body["results"].as_array().expect("results");

	assert_eq!(results.len(), 1);
	assert_eq!(results[0]["id"], DARMSTADT);
	assert_eq!(results[0]["text"], "Technische Universität Darmstadt");
}

#[tokio::test]
async fn remember_idp_updates_recency_cookie() {
	let service = service();
	let body = json!({ "entity_id": BOCHUM }).to_string();
	let response = endpoint::remember_idp(&service, &post(&body, &[KASSEL, DARMSTADT])).await;

	assert_eq!(response.status(), StatusCode::OK);
	assert_eq!(cookie_ids(&response), [BOCHUM, KASSEL, DARMSTADT]);

	let cookie = response.headers()[SET_COOKIE].to_str().expect("ascii cookie");

	assert!(cookie.contains("Path=/"));
	assert!(cookie.contains("Expires="));
}

#[tokio::test]
async fn remember_idp_rejects_bad_requests() {
	let service = service();
	let unknown = json!({ "entity_id": "unknown-id" }).to_string();

	for body in ["This is not JSON", r#"{"spam": "ham"}"#, r#"{"entity_id": ""}"#, unknown.as_str()] {
		let response = endpoint::remember_idp(&service, &post(body, &[])).await;

		assert_eq!(response.status(), StatusCode::BAD_REQUEST, "body {body}");
		assert!(response.headers().get(SET_COOKIE).is_none());
	}
}

#[tokio::test]
async fn redirect_sends_choice_to_service_provider() {
	let service = service();
	let request = get("/discovery/redirect/", &[("entityID", DARMSTADT), ("next", "/accounts/profile/")]);
	let response = endpoint::redirect(&service, &request).await;

	assert_eq!(response.status(), StatusCode::FOUND);

	let location = Url::parse(response.headers()[LOCATION].to_str().expect("ascii location"))
		.expect("absolute location");
	let pairs: Vec<(String, String)> = location.query_pairs().into_owned().collect();

	assert!(location.as_str().starts_with(SP_LOGIN));
	assert_eq!(
		pairs,
		[
			("entityID".to_owned(), DARMSTADT.to_owned()),
			("target".to_owned(), "https://app.example.org/accounts/profile/".to_owned()),
		]
	);
	assert_eq!(cookie_ids(&response), [DARMSTADT]);
}

#[tokio::test]
async fn redirect_keeps_plain_http_targets_on_plain_http_hosts() {
	let service = service();
	let mut request =
		get("/discovery/redirect/", &[("entityID", DARMSTADT), ("next", "http://app.example.org/home")]);

	request.headers_mut().insert("x-forwarded-proto", "http".parse().expect("header"));

	let response = endpoint::redirect(&service, &request).await;

	assert_eq!(response.status(), StatusCode::FOUND);

	let location = Url::parse(response.headers()[LOCATION].to_str().expect("ascii location"))
		.expect("absolute location");
	let target = location
		.query_pairs()
		.find(|(key, _)| key == "target")
		.map(|(_, value)| value.into_owned());

	assert_eq!(target.as_deref(), Some("http://app.example.org/home"));
}

#[tokio::test]
async fn redirect_rejects_missing_unknown_and_offsite_requests() {
	let service = service();
	let requests = [
		get("/discovery/redirect/", &[("next", "/")]),
		get("/discovery/redirect/", &[("entityID", "unknown-id")]),
		get("/discovery/redirect/", &[("entityID", KASSEL), ("next", "https://evil.example.com/")]),
	];

	for request in &requests {
		assert_eq!(endpoint::redirect(&service, request).await.status(), StatusCode::BAD_REQUEST);
	}
}

#[tokio::test]
async fn login_context_reads_recency_cookie() {
	let service = service();
	let request = Request::builder()
		.header(COOKIE, format!("_saml_idp=\"{} bm9pc2U=\"", recent::encode([BOCHUM, KASSEL])))
		.body(())
		.expect("request");
	let context = endpoint::login_context(&service, &request, "en").await.expect("context");
	let names: Vec<_> = context.recent_idps.iter().map(|idp| idp["name"].clone()).collect();

	assert_eq!(names, [json!("Bochum University Of Applied Sciences"), json!("Universität Kassel")]);
	assert_eq!(context.target_sp_url.as_str(), SP_LOGIN);
}

#[tokio::test]
async fn missing_feed_maps_to_service_unavailable() {
	let config = DiscoveryConfig::new(FeedSource::Path("/nonexistent/discofeed.json".into()), SP_LOGIN)
		.expect("config");
	let service = DiscoveryService::new(config).expect("service");
	let response = endpoint::search(&service, &get("/discovery/search/", &[("q", "Kassel")]), "en").await;

	assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

	let status = json_body(&endpoint::status(&service).await);

	assert_eq!(status["state"], "Empty");
	assert_eq!(status["error_count"], 1);
}

#[tokio::test]
async fn status_reports_loaded_feed() {
	let service = service();
	let response = endpoint::search(&service, &get("/discovery/search/", &[("q", "Bochum")]), "en").await;

	assert_eq!(response.status(), StatusCode::OK);

	let status = json_body(&endpoint::status(&service).await);

	assert_eq!(status["state"], "Ready");
	assert_eq!(status["idp_count"], 3);
	assert_eq!(status["source"], "file");
}
