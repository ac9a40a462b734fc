//! Client id / client secret pairs produced by secret stores.

// self
use crate::{_prelude::*, auth::TokenSecret, error::ConfigError};

/// Client-credentials pair exchanged at a token endpoint.
///
/// Stores build a fresh value on every token refresh because the backing secret may rotate.
/// Both halves deserialize from the `Auth0ClientID` / `Auth0ClientSecret` layout used by the
/// managed secret store, and from the camel-case `clientId` / `clientSecret` spelling. Missing
/// fields deserialize as empty strings so [`ClientCredentials::ensure_complete`] can reject them
/// with a configuration error instead of a parse error.
#[derive(Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ClientCredentials {
	/// OAuth client identifier.
	#[serde(rename = "Auth0ClientID", alias = "clientId", alias = "client_id", default)]
	pub client_id: String,
	/// OAuth client secret.
	#[serde(rename = "Auth0ClientSecret", alias = "clientSecret", alias = "client_secret", default)]
	pub client_secret: TokenSecret,
}
impl ClientCredentials {
	/// Pairs a client id with its secret.
	pub fn new(client_id: impl Into<String>, client_secret: impl Into<TokenSecret>) -> Self {
		Self { client_id: client_id.into(), client_secret: client_secret.into() }
	}

	/// Fails when either half of the pair is empty.
	pub fn ensure_complete(&self) -> Result<(), ConfigError> {
		if self.client_id.is_empty() || self.client_secret.is_empty() {
			return Err(ConfigError::MissingCredentials);
		}

		Ok(())
	}
}
impl Debug for ClientCredentials {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("ClientCredentials")
			.field("client_id", &self.client_id)
			.field("client_secret", &self.client_secret)
			.finish()
	}
}
