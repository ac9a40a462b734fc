//! In-process [`SecretStore`] holding fixed credentials for local development and tests.

// self
use crate::{
	_prelude::*,
	auth::ClientCredentials,
	store::{SecretStore, StoreFuture},
};

/// Secret store that always yields the same credentials.
///
/// Credentials can be swapped at runtime with [`StaticSecretStore::rotate`] to mimic a
/// backing secret that changes between refreshes.
#[derive(Clone, Debug, Default)]
pub struct StaticSecretStore(Arc<RwLock<ClientCredentials>>);
impl StaticSecretStore {
	/// Creates a store for the given pair.
	pub fn new(credentials: ClientCredentials) -> Self {
		Self(Arc::new(RwLock::new(credentials)))
	}

	/// Replaces the stored pair.
	pub fn rotate(&self, credentials: ClientCredentials) {
		*self.0.write() = credentials;
	}
}
impl SecretStore for StaticSecretStore {
	fn fetch_secret(&self) -> StoreFuture<'_, ClientCredentials> {
		let credentials = self.0.read().clone();

		Box::pin(async move { Ok(credentials) })
	}
}
