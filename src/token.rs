//! Client-credentials token provider with lazy refresh.
//!
//! A [`TokenProvider`] keeps exactly one shared token future. Callers that arrive while it is
//! in flight await the same exchange; once it settles, the resolved token is reused until its
//! `exp` claim falls within the configured margin. A stale, undecodable, or failed entry is
//! replaced by a fresh exchange the next time someone asks, so failures are never cached.
//!
//! Credentials are read from the [`SecretStore`] on every exchange and never kept in memory
//! between refreshes.

pub mod metrics;

pub use metrics::TokenMetrics;

// std
use std::sync::atomic::{AtomicU64, Ordering};
// crates.io
use futures::{
	FutureExt,
	future::{BoxFuture, Shared},
};
// self
use crate::{
	_prelude::*,
	auth::{self, TokenSecret},
	error::{ConfigError, UpstreamError},
	http::{HttpRequest, HttpTransport},
	obs::{self, OpKind, OpOutcome, OpSpan},
	store::SecretStore,
};
#[cfg(feature = "reqwest")] use crate::http::ReqwestTransport;

type TokenFlight = Shared<BoxFuture<'static, Result<TokenSecret>>>;

/// Boxed future returned by [`TokenResolver::resolve_token`].
pub type TokenFuture<'a> = Pin<Box<dyn Future<Output = Result<TokenSecret>> + 'a + Send>>;

/// Anything able to produce a bearer token for outgoing requests.
pub trait TokenResolver
where
	Self: Send + Sync,
{
	/// Resolves a currently valid token.
	fn resolve_token(&self) -> TokenFuture<'_>;
}
impl<R> TokenResolver for Arc<R>
where
	R: ?Sized + TokenResolver,
{
	fn resolve_token(&self) -> TokenFuture<'_> {
		R::resolve_token(self)
	}
}

/// [`TokenResolver`] backed by an async closure.
pub struct TokenResolverFn<F>(pub F);
impl<F, Fut> TokenResolver for TokenResolverFn<F>
where
	F: Send + Sync + Fn() -> Fut,
	Fut: 'static + Send + Future<Output = Result<TokenSecret>>,
{
	fn resolve_token(&self) -> TokenFuture<'_> {
		Box::pin((self.0)())
	}
}
impl<F> Debug for TokenResolverFn<F> {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str("TokenResolverFn(..)")
	}
}

/// Token endpoint settings.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct TokenEndpointConfig {
	/// Absolute URL of the token endpoint.
	pub token_endpoint: Url,
	/// Audience requested for issued tokens.
	pub audience: String,
	/// A cached token is reused only while its expiry lies further than this in the future.
	#[serde(
		rename = "expiry_margin_secs",
		default = "TokenEndpointConfig::default_expiry_margin",
		deserialize_with = "deserialize_seconds"
	)]
	pub expiry_margin: Duration,
}
impl TokenEndpointConfig {
	const DEFAULT_EXPIRY_MARGIN: Duration = Duration::seconds(10);

	/// Creates a config with the default 10 second expiry margin.
	pub fn new(token_endpoint: Url, audience: impl Into<String>) -> Self {
		Self {
			token_endpoint,
			audience: audience.into(),
			expiry_margin: Self::DEFAULT_EXPIRY_MARGIN,
		}
	}

	/// Overrides the expiry margin; negative values are clamped to zero.
	pub fn with_expiry_margin(mut self, margin: Duration) -> Self {
		self.expiry_margin = if margin.is_negative() { Duration::ZERO } else { margin };

		self
	}

	fn default_expiry_margin() -> Duration {
		Self::DEFAULT_EXPIRY_MARGIN
	}
}

/// Provides bearer tokens from a client-credentials exchange, refreshing lazily.
pub struct TokenProvider<T>
where
	T: ?Sized + HttpTransport,
{
	exchange: Arc<Exchange<T>>,
	current: Mutex<Option<CachedToken>>,
	next_id: AtomicU64,
}
impl<T> TokenProvider<T>
where
	T: ?Sized + HttpTransport,
{
	/// Creates a provider that exchanges credentials through `transport`.
	pub fn with_transport(
		config: TokenEndpointConfig,
		store: Arc<dyn SecretStore>,
		transport: impl Into<Arc<T>>,
	) -> Self {
		Self {
			exchange: Arc::new(Exchange {
				transport: transport.into(),
				store,
				config,
				metrics: Default::default(),
			}),
			current: Default::default(),
			next_id: AtomicU64::new(0),
		}
	}

	/// Returns the endpoint settings.
	pub fn config(&self) -> &TokenEndpointConfig {
		&self.exchange.config
	}

	/// Returns the shared token counters.
	pub fn metrics(&self) -> Arc<TokenMetrics> {
		self.exchange.metrics.clone()
	}

	/// Returns a valid bearer token, reusing the cached one when possible.
	///
	/// Callers that observe the same stale or failed entry start a single replacement exchange
	/// between them; its outcome is returned as-is.
	pub async fn get_token(&self) -> Result<TokenSecret> {
		let span = OpSpan::new(OpKind::Token, "get_token");

		span.instrument(async move {
			let (id, flight, started) = self.current_or_start(None);
			let result = flight.await;

			if started {
				return result;
			}

			let margin = self.exchange.config.expiry_margin;
			let usable = result.as_ref().is_ok_and(|token| {
				auth::is_usable(token.expose(), OffsetDateTime::now_utc(), margin)
			});

			if usable {
				self.exchange.metrics.record_reuse();
				obs::record_op_outcome(OpKind::Token, OpOutcome::Reused);

				return result;
			}

			let (_, replacement, _) = self.current_or_start(Some(id));

			replacement.await
		})
		.await
	}

	/// Performs a fresh exchange, bypassing and leaving untouched the cached token.
	pub async fn get_token_without_cache(&self) -> Result<TokenSecret> {
		let span = OpSpan::new(OpKind::Token, "get_token_without_cache");

		span.instrument(self.exchange.clone().run()).await
	}

	// Joins the current entry unless it is the one the caller already found unusable. The
	// slot is checked and replaced under one lock, so racing callers start one exchange.
	fn current_or_start(&self, stale: Option<u64>) -> (u64, TokenFlight, bool) {
		let mut current = self.current.lock();

		if let Some(cached) = current.as_ref().filter(|cached| Some(cached.id) != stale) {
			return (cached.id, cached.flight.clone(), false);
		}

		let id = self.next_id.fetch_add(1, Ordering::Relaxed);
		let flight = self.exchange.clone().run().boxed().shared();

		*current = Some(CachedToken { id, flight: flight.clone() });

		(id, flight, true)
	}
}
#[cfg(feature = "reqwest")]
impl TokenProvider<ReqwestTransport> {
	/// Creates a provider backed by a default reqwest transport.
	pub fn new(config: TokenEndpointConfig, store: Arc<dyn SecretStore>) -> Self {
		Self::with_transport(config, store, ReqwestTransport::default())
	}
}
impl<T> TokenResolver for TokenProvider<T>
where
	T: ?Sized + HttpTransport,
{
	fn resolve_token(&self) -> TokenFuture<'_> {
		Box::pin(self.get_token())
	}
}
impl<T> Debug for TokenProvider<T>
where
	T: ?Sized + HttpTransport,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("TokenProvider")
			.field("config", &self.exchange.config)
			.field("metrics", &self.exchange.metrics)
			.field("cached", &self.current.lock().is_some())
			.finish()
	}
}

struct CachedToken {
	id: u64,
	flight: TokenFlight,
}

#[derive(Serialize)]
struct TokenRequestBody<'a> {
	client_id: &'a str,
	client_secret: &'a str,
	audience: &'a str,
	grant_type: &'static str,
}

#[derive(Deserialize)]
struct TokenResponseBody {
	access_token: TokenSecret,
}

struct Exchange<T>
where
	T: ?Sized + HttpTransport,
{
	transport: Arc<T>,
	store: Arc<dyn SecretStore>,
	config: TokenEndpointConfig,
	metrics: Arc<TokenMetrics>,
}
impl<T> Exchange<T>
where
	T: ?Sized + HttpTransport,
{
	async fn run(self: Arc<Self>) -> Result<TokenSecret> {
		self.metrics.record_fetch();
		obs::record_op_outcome(OpKind::Token, OpOutcome::Attempt);

		let result = self.exchange().await;

		if result.is_err() {
			self.metrics.record_failure();
		}

		obs::record_result(OpKind::Token, &result);

		result
	}

	async fn exchange(&self) -> Result<TokenSecret> {
		let credentials = self.store.fetch_secret().await?;

		credentials.ensure_complete()?;

		let body = TokenRequestBody {
			client_id: &credentials.client_id,
			client_secret: credentials.client_secret.expose(),
			audience: &self.config.audience,
			grant_type: "client_credentials",
		};
		let request = HttpRequest::post(self.config.token_endpoint.as_str())
			.with_header("accept", "application/json")
			.with_json(&body)
			.map_err(ConfigError::from)?;
		let service = request.service_name();
		let response = self.transport.send(request).await?;

		if !response.is_success() {
			return Err(UpstreamError::from_response(service, &response).into());
		}

		let TokenResponseBody { access_token } = response.json().map_err(|source| {
			UpstreamError::TokenResponseParse { source: Arc::new(source), status: Some(response.status) }
		})?;

		Ok(access_token)
	}
}

fn deserialize_seconds<'de, D>(deserializer: D) -> std::result::Result<Duration, D::Error>
where
	D: serde::Deserializer<'de>,
{
	let secs = u32::deserialize(deserializer)?;

	Ok(Duration::seconds(secs.into()))
}

#[cfg(test)]
mod tests {
	// self
	use super::*;
	use crate::{
		auth::ClientCredentials,
		http::{HttpResponse, TransportFuture},
		store::StaticSecretStore,
	};

	struct FailingTransport;
	impl HttpTransport for FailingTransport {
		fn send(&self, request: HttpRequest) -> TransportFuture<'_> {
			Box::pin(async move { Ok(HttpResponse::new(401, format!("denied {}", request.url))) })
		}
	}

	fn provider() -> TokenProvider<FailingTransport> {
		let config = TokenEndpointConfig::new(
			Url::parse("https://auth.example.com/oauth/token").expect("Endpoint URL should parse."),
			"https://api.example.com",
		);

		TokenProvider::with_transport(
			config,
			Arc::new(StaticSecretStore::new(ClientCredentials::new("c1", "s1"))),
			FailingTransport,
		)
	}

	#[test]
	fn config_deserializes_with_default_margin() {
		let config: TokenEndpointConfig = serde_json::from_str(
			r#"{"token_endpoint":"https://auth.example.com/oauth/token","audience":"aud"}"#,
		)
		.expect("Config should deserialize.");

		assert_eq!(config.expiry_margin, Duration::seconds(10));

		let config: TokenEndpointConfig = serde_json::from_str(
			r#"{"token_endpoint":"https://auth.example.com/oauth/token","audience":"aud","expiry_margin_secs":30}"#,
		)
		.expect("Config should deserialize.");

		assert_eq!(config.expiry_margin, Duration::seconds(30));
	}

	#[tokio::test]
	async fn non_success_status_maps_to_upstream_error() {
		let provider = provider();
		let err = provider.get_token().await.expect_err("A 401 should fail the exchange.");

		assert!(matches!(
			err,
			Error::Upstream(UpstreamError::Http { ref service, status: 401, .. })
				if service == "auth.example.com"
		));
		assert_eq!(provider.metrics().failures(), 1);
	}

	#[tokio::test]
	async fn closures_resolve_tokens() {
		let resolver = TokenResolverFn(|| async { Ok(TokenSecret::new("abc")) });
		let token = resolver.resolve_token().await.expect("Closure resolver should succeed.");

		assert_eq!(token.expose(), "abc");
	}
}
