//! Secret store backed by a managed secrets service holding a JSON credential document.

// self
use crate::{
	_prelude::*,
	auth::ClientCredentials,
	store::{SecretStore, StoreError, StoreFuture},
};

const STORE: &str = "secrets_manager";

/// Secret lookup capability of a managed secrets service.
pub trait SecretValueSource
where
	Self: Send + Sync,
{
	/// Returns the secret string stored under `secret_id`, or `None` when it has no string value.
	fn secret_string<'a>(&'a self, secret_id: &'a str) -> StoreFuture<'a, Option<String>>;
}
impl<M> SecretValueSource for Arc<M>
where
	M: ?Sized + SecretValueSource,
{
	fn secret_string<'a>(&'a self, secret_id: &'a str) -> StoreFuture<'a, Option<String>> {
		M::secret_string(self, secret_id)
	}
}

/// Settings for [`SecretsManagerStore`].
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct SecretsManagerConfig {
	/// Identifier (name or ARN) of the secret.
	pub secret_id: String,
}

/// [`SecretStore`] that parses `{"Auth0ClientID": .., "Auth0ClientSecret": ..}` documents.
#[derive(Debug)]
pub struct SecretsManagerStore<M>
where
	M: SecretValueSource,
{
	source: M,
	config: SecretsManagerConfig,
}
impl<M> SecretsManagerStore<M>
where
	M: SecretValueSource,
{
	/// Creates a store reading `config.secret_id` from `source`.
	pub fn new(source: M, config: SecretsManagerConfig) -> Self {
		Self { source, config }
	}

	async fn fetch(&self) -> Result<ClientCredentials, StoreError> {
		let raw = self
			.source
			.secret_string(&self.config.secret_id)
			.await?
			.filter(|raw| !raw.trim().is_empty())
			.ok_or_else(|| StoreError::MissingSecret {
				store: STORE.into(),
				message: format!("secret `{}` has no string value", self.config.secret_id),
			})?;

		parse_document(&raw)
	}
}
impl<M> SecretStore for SecretsManagerStore<M>
where
	M: SecretValueSource,
{
	fn fetch_secret(&self) -> StoreFuture<'_, ClientCredentials> {
		Box::pin(self.fetch())
	}
}

// serde_json messages quote offending values, so only the location survives.
fn parse_document(raw: &str) -> Result<ClientCredentials, StoreError> {
	let mut de = serde_json::Deserializer::from_str(raw);

	serde_path_to_error::deserialize(&mut de).map_err(|e| {
		let path = e.path().to_string();
		let inner = e.inner();

		StoreError::Malformed {
			store: STORE.into(),
			message: format!(
				"invalid credential document at `{path}` (line {}, column {})",
				inner.line(),
				inner.column()
			),
		}
	})
}
