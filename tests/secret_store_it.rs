mod common;

// std
use std::{sync::Arc, time::Duration};
// crates.io
use base64::{Engine, engine::general_purpose::STANDARD};
use bytes::Bytes;
use serde_json::json;
// self
use common::{ScriptedTransport, jwt_expiring_in};
use courier::{
	auth::ClientCredentials,
	error::Error,
	http::HttpResponse,
	store::{
		KmsDecrypt, KmsSecretConfig, KmsSecretStore, ResolverSecretStore, SecretStore,
		SecretValueSource, SecretsManagerConfig, SecretsManagerStore, StoreError, StoreFuture,
	},
	token::{TokenEndpointConfig, TokenProvider},
	url::Url,
};

const SECRET: &str = "super-secret-value";

struct PlaintextKms(Option<&'static str>);
impl KmsDecrypt for PlaintextKms {
	fn decrypt<'a>(
		&'a self,
		_ciphertext: Bytes,
		_key_id: Option<&'a str>,
	) -> StoreFuture<'a, Option<Bytes>> {
		let plaintext = self.0.map(|plaintext| Bytes::from_static(plaintext.as_bytes()));

		Box::pin(async move { Ok(plaintext) })
	}
}

struct FixedSecrets(Option<String>);
impl SecretValueSource for FixedSecrets {
	fn secret_string<'a>(&'a self, _secret_id: &'a str) -> StoreFuture<'a, Option<String>> {
		let value = self.0.clone();

		Box::pin(async move { Ok(value) })
	}
}

fn kms_config() -> KmsSecretConfig {
	serde_json::from_value(json!({
		"client_id": "c1",
		"encrypted_client_secret": STANDARD.encode("ciphertext"),
	}))
	.expect("KMS config should deserialize.")
}

fn secrets_manager_config() -> SecretsManagerConfig {
	serde_json::from_value(json!({ "secret_id": "prod/service/auth" }))
		.expect("Secrets manager config should deserialize.")
}

fn provider(
	store: Arc<dyn SecretStore>,
) -> (TokenProvider<ScriptedTransport>, Arc<ScriptedTransport>) {
	let body = json!({ "access_token": jwt_expiring_in(3_600) }).to_string();
	let transport = ScriptedTransport::new(Duration::ZERO, move |_, request| {
		let sent: serde_json::Value = serde_json::from_slice(
			request.body.as_deref().expect("Token requests should carry a body."),
		)
		.expect("Token request body should be JSON.");

		assert_eq!(sent["client_id"], "c1");
		assert_eq!(sent["client_secret"], SECRET);

		Ok(HttpResponse::new(200, body.clone()))
	});
	let endpoint =
		Url::parse("https://auth.example.com/oauth/token").expect("Token endpoint should parse.");
	let provider = TokenProvider::<ScriptedTransport>::with_transport(
		TokenEndpointConfig::new(endpoint, "https://api.example.com"),
		store,
		transport.clone(),
	);

	(provider, transport)
}

#[tokio::test]
async fn kms_secrets_feed_the_token_exchange() {
	let store = KmsSecretStore::new(PlaintextKms(Some(SECRET)), kms_config());
	let (provider, transport) = provider(Arc::new(store));

	provider.get_token().await.expect("Exchange with a KMS secret should succeed.");

	assert_eq!(transport.calls(), 1);
}

#[tokio::test]
async fn secrets_manager_documents_feed_the_token_exchange() {
	let document = json!({ "Auth0ClientID": "c1", "Auth0ClientSecret": SECRET }).to_string();
	let store = SecretsManagerStore::new(FixedSecrets(Some(document)), secrets_manager_config());
	let (provider, transport) = provider(Arc::new(store));

	provider.get_token().await.expect("Exchange with a managed secret should succeed.");

	assert_eq!(transport.calls(), 1);
}

#[tokio::test]
async fn resolver_secrets_feed_the_token_exchange() {
	let store = ResolverSecretStore::new(|| async { Ok(ClientCredentials::new("c1", SECRET)) });
	let (provider, transport) = provider(Arc::new(store));

	provider.get_token().await.expect("Exchange with a resolved secret should succeed.");

	assert_eq!(transport.calls(), 1);
}

#[tokio::test]
async fn missing_secrets_are_distinguishable_and_skip_the_endpoint() {
	let kms = KmsSecretStore::new(PlaintextKms(None), kms_config());
	let (provider, transport) = provider(Arc::new(kms));
	let err = provider.get_token().await.expect_err("Missing plaintext should fail.");

	assert!(matches!(err, Error::Storage(StoreError::MissingSecret { .. })));
	assert_eq!(transport.calls(), 0);

	let secrets = SecretsManagerStore::new(FixedSecrets(None), secrets_manager_config());
	let err = secrets.fetch_secret().await.expect_err("A secret without a value should fail.");

	assert!(matches!(err, StoreError::MissingSecret { ref store, .. } if store == "secrets_manager"));
}

#[tokio::test]
async fn store_errors_never_contain_secret_material() {
	let truncated = format!(r#"{{"Auth0ClientID":"c1","Auth0ClientSecret":"{SECRET}"#);
	let store = SecretsManagerStore::new(FixedSecrets(Some(truncated)), secrets_manager_config());
	let err = store.fetch_secret().await.expect_err("Truncated JSON should fail to parse.");

	assert!(matches!(err, StoreError::Malformed { .. }));
	assert!(!err.to_string().contains(SECRET));
	assert!(!format!("{err:?}").contains(SECRET));

	let credentials = ClientCredentials::new("c1", SECRET);

	assert!(!format!("{credentials:?}").contains(SECRET));
}
