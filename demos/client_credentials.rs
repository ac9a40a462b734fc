//! Demonstrates a reqwest-backed token provider feeding bearer tokens into the HTTP client.
//!
//! The mock token endpoint is hit once; the second API call reuses the cached token.

// std
use std::sync::Arc;
// crates.io
use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use color_eyre::Result;
use httpmock::prelude::*;
use serde_json::json;
use time::{Duration, OffsetDateTime};
// self
use courier::{
	auth::ClientCredentials,
	client::{HttpClient, HttpLogType, LogOptions},
	store::StaticSecretStore,
	token::{TokenEndpointConfig, TokenProvider},
	url::Url,
};

#[tokio::main]
async fn main() -> Result<()> {
	color_eyre::install()?;

	let server = MockServer::start_async().await;
	let expires_at = OffsetDateTime::now_utc() + Duration::minutes(15);
	let access_token = demo_jwt(expires_at.unix_timestamp());
	let token_mock = server
		.mock_async(|when, then| {
			when.method(POST).path("/oauth/token");
			then.status(200).json_body(json!({ "access_token": access_token }));
		})
		.await;
	let api_mock = server
		.mock_async(|when, then| {
			when.method(GET)
				.path("/v1/orders")
				.header("authorization", format!("Bearer {access_token}"));
			then.status(200).body("[]");
		})
		.await;
	let config = TokenEndpointConfig::new(
		Url::parse(&server.url("/oauth/token"))?,
		"https://orders.example.com",
	);
	let store =
		Arc::new(StaticSecretStore::new(ClientCredentials::new("demo-client", "super-secret")));
	let provider = Arc::new(TokenProvider::new(config, store));
	let client = HttpClient::reqwest()
		.base_url(server.base_url())
		.token_resolver(provider.clone())
		.correlation_id_resolver(|| uuid::Uuid::new_v4().to_string())
		.log_options(LogOptions::new([HttpLogType::Requests, HttpLogType::Responses]))
		.build()?;

	for _ in 0..2 {
		let response = client.get("/v1/orders").await?;

		println!("Orders endpoint answered {} with `{}`.", response.status, response.text());
	}

	println!(
		"Token endpoint calls: {}, cached token reuses: {}.",
		provider.metrics().fetches(),
		provider.metrics().reuses()
	);

	token_mock.assert_calls_async(1).await;
	api_mock.assert_calls_async(2).await;

	Ok(())
}

fn demo_jwt(exp: i64) -> String {
	let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
	let claims = json!({ "canonical_id": "demo-client", "exp": exp });
	let payload = URL_SAFE_NO_PAD.encode(claims.to_string());

	format!("{header}.{payload}.unsigned")
}
