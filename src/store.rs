//! Backing secret stores that produce client credentials for token providers.
//!
//! Every store implements [`SecretStore`]. Token providers call it on each refresh and never
//! cache the result, so rotated secrets are picked up on the next token exchange. Store errors
//! describe what went wrong without ever embedding the secret they failed to produce.

pub mod kms;
pub mod memory;
pub mod resolver;
pub mod secrets_manager;

pub use kms::{KmsDecrypt, KmsSecretConfig, KmsSecretStore};
pub use memory::StaticSecretStore;
pub use resolver::ResolverSecretStore;
pub use secrets_manager::{SecretValueSource, SecretsManagerConfig, SecretsManagerStore};

// self
use crate::{_prelude::*, auth::ClientCredentials};

/// Boxed future returned by secret-store operations.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StoreError>> + 'a + Send>>;

/// Capability that yields the client id / client secret pair.
pub trait SecretStore
where
	Self: Send + Sync,
{
	/// Fetches the current credentials.
	fn fetch_secret(&self) -> StoreFuture<'_, ClientCredentials>;
}
impl<S> SecretStore for Arc<S>
where
	S: ?Sized + SecretStore,
{
	fn fetch_secret(&self) -> StoreFuture<'_, ClientCredentials> {
		S::fetch_secret(self)
	}
}

/// Error type produced by [`SecretStore`] implementations.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
pub enum StoreError {
	/// The backing service could not be reached or rejected the call.
	#[error("Secret store `{store}` request failed: {message}.")]
	Unavailable {
		/// Store label.
		store: String,
		/// Human-readable error payload free of secret material.
		message: String,
	},
	/// The backing service answered without a usable secret.
	#[error("Secret store `{store}` returned no secret: {message}.")]
	MissingSecret {
		/// Store label.
		store: String,
		/// Human-readable error payload free of secret material.
		message: String,
	},
	/// The secret exists but cannot be decoded.
	#[error("Secret store `{store}` returned a malformed secret: {message}.")]
	Malformed {
		/// Store label.
		store: String,
		/// Location of the problem (JSON path, byte offset); never the content itself.
		message: String,
	},
}
impl StoreError {
	/// Builds an [`StoreError::Unavailable`] from any displayable cause.
	pub fn unavailable(store: impl Into<String>, cause: impl Display) -> Self {
		Self::Unavailable { store: store.into(), message: cause.to_string() }
	}

	/// Returns the label of the store that produced the error.
	pub fn store(&self) -> &str {
		match self {
			Self::Unavailable { store, .. }
			| Self::MissingSecret { store, .. }
			| Self::Malformed { store, .. } => store,
		}
	}
}
