#![cfg(feature = "reqwest")]

mod common;

// std
use std::{sync::Arc, time::Duration};
// crates.io
use futures::future;
use httpmock::prelude::*;
use serde_json::json;
// self
use common::{ScriptedTransport, jwt_expiring_in, static_store};
use courier::{
	error::{ConfigError, Error, UpstreamError},
	http::{HttpResponse, ReqwestTransport},
	store::SecretStore,
	token::{TokenEndpointConfig, TokenProvider},
	url::Url,
};

const AUDIENCE: &str = "https://api.example.com";

fn provider(server: &MockServer, store: Arc<dyn SecretStore>) -> TokenProvider<ReqwestTransport> {
	let endpoint =
		Url::parse(&server.url("/oauth/token")).expect("Mock token endpoint should parse.");

	TokenProvider::new(TokenEndpointConfig::new(endpoint, AUDIENCE), store)
}

#[tokio::test]
async fn exchange_posts_client_credentials_as_json() {
	let server = MockServer::start_async().await;
	let token = jwt_expiring_in(3_600);
	let mock = server
		.mock_async(|when, then| {
			when.method(POST)
				.path("/oauth/token")
				.header("content-type", "application/json")
				.json_body(json!({
					"client_id": "c1",
					"client_secret": "s1",
					"audience": AUDIENCE,
					"grant_type": "client_credentials",
				}));
			then.status(200).json_body(json!({ "access_token": token, "token_type": "Bearer" }));
		})
		.await;
	let provider = provider(&server, static_store("c1", "s1"));
	let issued = provider.get_token().await.expect("Token exchange should succeed.");

	assert_eq!(issued.expose(), token);

	mock.assert_async().await;
}

#[tokio::test]
async fn long_lived_tokens_are_reused() {
	let server = MockServer::start_async().await;
	let token = jwt_expiring_in(3_600);
	let mock = server
		.mock_async(|when, then| {
			when.method(POST).path("/oauth/token");
			then.status(200).json_body(json!({ "access_token": token }));
		})
		.await;
	let provider = provider(&server, static_store("c1", "s1"));
	let first = provider.get_token().await.expect("First call should fetch a token.");
	let second = provider.get_token().await.expect("Second call should reuse the token.");

	assert_eq!(first, second);
	assert_eq!(provider.metrics().fetches(), 1);
	assert_eq!(provider.metrics().reuses(), 1);

	mock.assert_calls_async(1).await;
}

#[tokio::test]
async fn tokens_inside_the_expiry_margin_are_refreshed() {
	let server = MockServer::start_async().await;
	let token = jwt_expiring_in(5);
	let mock = server
		.mock_async(|when, then| {
			when.method(POST).path("/oauth/token");
			then.status(200).json_body(json!({ "access_token": token }));
		})
		.await;
	let provider = provider(&server, static_store("c1", "s1"));

	provider.get_token().await.expect("First call should fetch a token.");
	provider.get_token().await.expect("Second call should fetch a fresh token.");

	mock.assert_calls_async(2).await;
}

#[tokio::test]
async fn failed_exchanges_are_retried_on_the_next_call() {
	let token = jwt_expiring_in(3_600);
	let body = json!({ "access_token": token }).to_string();
	let transport = ScriptedTransport::new(Duration::ZERO, move |call, _| match call {
		0 => Ok(HttpResponse::new(503, "unavailable")),
		_ => Ok(HttpResponse::new(200, body.clone())),
	});
	let endpoint =
		Url::parse("https://auth.example.com/oauth/token").expect("Token endpoint should parse.");
	let provider = TokenProvider::<ScriptedTransport>::with_transport(
		TokenEndpointConfig::new(endpoint, AUDIENCE),
		static_store("c1", "s1"),
		transport.clone(),
	);
	let err = provider.get_token().await.expect_err("A 503 should fail the exchange.");

	assert!(matches!(
		err,
		Error::Upstream(UpstreamError::Http { ref service, status: 503, .. })
			if service == "auth.example.com"
	));

	let recovered = provider.get_token().await.expect("The next call should start a new exchange.");

	assert_eq!(recovered.expose(), token);
	assert_eq!(transport.calls(), 2);
	assert_eq!(provider.metrics().failures(), 1);
}

#[tokio::test]
async fn empty_secrets_fail_without_calling_the_endpoint() {
	let server = MockServer::start_async().await;
	let mock = server
		.mock_async(|when, then| {
			when.method(POST).path("/oauth/token");
			then.status(200).json_body(json!({ "access_token": "unused" }));
		})
		.await;
	let provider = provider(&server, static_store("c1", ""));
	let err = provider.get_token().await.expect_err("An empty secret should be rejected.");

	assert!(matches!(err, Error::Config(ConfigError::MissingCredentials)));

	mock.assert_calls_async(0).await;
}

#[tokio::test]
async fn concurrent_callers_share_one_exchange() {
	let server = MockServer::start_async().await;
	let token = jwt_expiring_in(3_600);
	let mock = server
		.mock_async(|when, then| {
			when.method(POST).path("/oauth/token");
			then.status(200)
				.delay(Duration::from_millis(100))
				.json_body(json!({ "access_token": token }));
		})
		.await;
	let provider = provider(&server, static_store("c1", "s1"));
	let tokens = future::join_all((0..5).map(|_| provider.get_token())).await;

	for issued in tokens {
		assert_eq!(issued.expect("Every caller should receive the token.").expose(), token);
	}

	mock.assert_calls_async(1).await;
}

#[tokio::test]
async fn concurrent_callers_replace_a_stale_token_once() {
	let stale = json!({ "access_token": jwt_expiring_in(5) }).to_string();
	let fresh_token = jwt_expiring_in(3_600);
	let fresh = json!({ "access_token": fresh_token }).to_string();
	let transport = ScriptedTransport::new(Duration::from_millis(50), move |call, _| match call {
		0 => Ok(HttpResponse::new(200, stale.clone())),
		_ => Ok(HttpResponse::new(200, fresh.clone())),
	});
	let endpoint =
		Url::parse("https://auth.example.com/oauth/token").expect("Token endpoint should parse.");
	let provider = TokenProvider::<ScriptedTransport>::with_transport(
		TokenEndpointConfig::new(endpoint, AUDIENCE),
		static_store("c1", "s1"),
		transport.clone(),
	);

	provider.get_token().await.expect("The first exchange should succeed.");

	let tokens = future::join_all((0..5).map(|_| provider.get_token())).await;

	for issued in tokens {
		assert_eq!(issued.expect("Every caller should receive the fresh token.").expose(), fresh_token);
	}

	assert_eq!(transport.calls(), 2);
	assert_eq!(provider.metrics().fetches(), 2);
}

#[tokio::test]
async fn uncached_calls_always_reach_the_endpoint() {
	let server = MockServer::start_async().await;
	let token = jwt_expiring_in(3_600);
	let mock = server
		.mock_async(|when, then| {
			when.method(POST).path("/oauth/token");
			then.status(200).json_body(json!({ "access_token": token }));
		})
		.await;
	let provider = provider(&server, static_store("c1", "s1"));

	provider.get_token().await.expect("Cached call should succeed.");
	provider.get_token_without_cache().await.expect("First uncached call should succeed.");
	provider.get_token_without_cache().await.expect("Second uncached call should succeed.");
	provider.get_token().await.expect("Cached token should still be reused.");

	mock.assert_calls_async(3).await;
}

#[tokio::test]
async fn malformed_token_responses_report_the_failing_field() {
	let server = MockServer::start_async().await;
	let _mock = server
		.mock_async(|when, then| {
			when.method(POST).path("/oauth/token");
			then.status(200).json_body(json!({ "token_type": "Bearer" }));
		})
		.await;
	let provider = provider(&server, static_store("c1", "s1"));
	let err = provider.get_token().await.expect_err("A body without access_token should fail.");

	assert!(matches!(
		err,
		Error::Upstream(UpstreamError::TokenResponseParse { status: Some(200), .. })
	));
}
