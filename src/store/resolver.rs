//! [`SecretStore`] backed by a caller-supplied async function.

// self
use crate::{
	_prelude::*,
	auth::ClientCredentials,
	store::{SecretStore, StoreError, StoreFuture},
};

/// Secret store that delegates to a closure, for secrets kept in places the crate does not
/// model (environment, vault agents, configuration services).
pub struct ResolverSecretStore<F> {
	resolver: F,
}
impl<F, Fut> ResolverSecretStore<F>
where
	F: Send + Sync + Fn() -> Fut,
	Fut: 'static + Send + Future<Output = Result<ClientCredentials, StoreError>>,
{
	/// Wraps `resolver`; it is invoked once per token refresh.
	pub fn new(resolver: F) -> Self {
		Self { resolver }
	}
}
impl<F, Fut> SecretStore for ResolverSecretStore<F>
where
	F: Send + Sync + Fn() -> Fut,
	Fut: 'static + Send + Future<Output = Result<ClientCredentials, StoreError>>,
{
	fn fetch_secret(&self) -> StoreFuture<'_, ClientCredentials> {
		Box::pin((self.resolver)())
	}
}
impl<F> Debug for ResolverSecretStore<F> {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str("ResolverSecretStore(..)")
	}
}

#[cfg(test)]
mod tests {
	// std
	use std::sync::atomic::{AtomicUsize, Ordering};
	// self
	use super::*;

	#[tokio::test]
	async fn resolver_runs_on_every_fetch() {
		let calls = Arc::new(AtomicUsize::new(0));
		let counter = calls.clone();
		let store = ResolverSecretStore::new(move || {
			let round = counter.fetch_add(1, Ordering::SeqCst);

			async move { Ok(ClientCredentials::new(format!("client-{round}"), "secret")) }
		});

		store.fetch_secret().await.expect("Resolver should yield credentials.");

		let second = store.fetch_secret().await.expect("Resolver should yield credentials.");

		assert_eq!(second.client_id, "client-1");
		assert_eq!(calls.load(Ordering::SeqCst), 2);
	}
}
