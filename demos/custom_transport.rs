//! Demonstrates plugging a custom [`HttpTransport`] under the coalescer and the token provider.
//!
//! 1. Implement [`HttpTransport`] so every call resolves to an [`HttpResponse`], whatever its
//!    status; only network problems become errors.
//! 2. Wrap it in a [`RequestCoalescer`] so concurrent identical requests share one call.
//! 3. Hand the same transport to [`TokenProvider::with_transport`] and watch an upstream
//!    failure surface as an [`UpstreamError`].

// std
use std::sync::{
	Arc,
	atomic::{AtomicUsize, Ordering},
};
// crates.io
use color_eyre::Result;
use futures::future;
// self
use courier::{
	auth::ClientCredentials,
	coalesce::RequestCoalescer,
	error::{Error, TransportError, UpstreamError},
	http::{HttpRequest, HttpResponse, HttpTransport, TransportFuture},
	store::{ResolverSecretStore, StoreError},
	token::{TokenEndpointConfig, TokenProvider},
	url::Url,
};

#[tokio::main]
async fn main() -> Result<()> {
	color_eyre::install()?;

	let transport = Arc::new(InMemoryTransport::default());
	let coalescer = <RequestCoalescer<InMemoryTransport>>::new(transport.clone());
	let responses = future::join_all(
		(0..4).map(|_| coalescer.send(HttpRequest::get("https://catalog.example.com/items"))),
	)
	.await;

	for response in responses {
		println!("Catalog answered: {}.", response?.text());
	}

	println!("Four callers, {} upstream call(s).", transport.calls.load(Ordering::SeqCst));

	let store = Arc::new(ResolverSecretStore::new(|| async {
		Ok::<_, StoreError>(ClientCredentials::new("demo-client", "demo-secret"))
	}));
	let provider = TokenProvider::<InMemoryTransport>::with_transport(
		TokenEndpointConfig::new(
			Url::parse("https://auth.example.com/oauth/token")?,
			"https://catalog.example.com",
		),
		store,
		transport.clone(),
	);

	match provider.get_token().await {
		Ok(_) => println!("The in-memory token endpoint unexpectedly issued a token."),
		Err(Error::Upstream(UpstreamError::Http { service, status, .. })) =>
			println!("Token endpoint `{service}` refused the exchange with status {status}."),
		Err(e) => println!("Token exchange failed: {e}."),
	}

	let offline = TokenProvider::<InMemoryTransport>::with_transport(
		TokenEndpointConfig::new(
			Url::parse("https://offline.example.com/oauth/token")?,
			"https://catalog.example.com",
		),
		Arc::new(ResolverSecretStore::new(|| async {
			Ok::<_, StoreError>(ClientCredentials::new("demo-client", "demo-secret"))
		})),
		transport,
	);

	match offline.get_token().await {
		Ok(_) => println!("The offline endpoint unexpectedly answered."),
		Err(e) => println!("Transport error surfaced by the provider: {e}."),
	}

	Ok(())
}

#[derive(Default)]
struct InMemoryTransport {
	calls: AtomicUsize,
}
impl HttpTransport for InMemoryTransport {
	fn send(&self, request: HttpRequest) -> TransportFuture<'_> {
		self.calls.fetch_add(1, Ordering::SeqCst);

		Box::pin(async move {
			tokio::time::sleep(std::time::Duration::from_millis(25)).await;

			match request.service_name().as_str() {
				"catalog.example.com" => Ok(HttpResponse::new(200, r#"["tea","coffee"]"#)),
				"auth.example.com" => Ok(HttpResponse::new(401, r#"{"error":"invalid_client"}"#)),
				_ => Err(TransportError::Timeout { url: request.full_url() }.into()),
			}
		})
	}
}
