//! Token-injecting HTTP client for service-to-service calls.
//!
//! [`HttpClient`] sits on top of any [`HttpTransport`] and layers, in order: URL validation,
//! correlation-id propagation, bearer-token injection, request logging, the response cache,
//! single-flight de-duplication, the retry policy, and status mapping. Non-2xx responses become
//! [`UpstreamError::Http`] tagged with the hostname of the dependency.

pub mod cache;
pub mod retry;

pub use cache::{
	CacheError, CacheFuture, CacheOptions, CachedResponse, MemoryResponseCache, ResponseCacheStore,
};
pub use retry::RetryPolicy;

// std
use std::time::Duration as StdDuration;
// crates.io
use http::HeaderName;
// self
use crate::{
	_prelude::*,
	coalesce::{self, RequestCoalescer, RequestKeyProvider},
	error::{ConfigError, UpstreamError},
	http::{HttpRequest, HttpResponse, HttpTransport, Method},
	obs::{self, HttpEvent, OpKind, OpSpan},
	token::TokenResolver,
};
#[cfg(feature = "reqwest")] use crate::http::ReqwestTransport;

/// Produces the correlation id attached to every outgoing request.
pub type CorrelationIdResolver = Arc<dyn Fn() -> String + Send + Sync>;

/// HTTP data the client logs.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HttpLogType {
	/// Outgoing requests.
	Requests,
	/// Successful responses.
	Responses,
}

/// Selects which [`HttpLogType`]s are emitted; errors and retries are always logged.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogOptions {
	/// Enabled log types.
	pub enabled_logs: Vec<HttpLogType>,
}
impl LogOptions {
	/// Enables exactly the given log types.
	pub fn new(enabled_logs: impl IntoIterator<Item = HttpLogType>) -> Self {
		Self { enabled_logs: enabled_logs.into_iter().collect() }
	}

	/// Returns `true` when `log_type` is enabled.
	pub fn is_enabled(&self, log_type: HttpLogType) -> bool {
		self.enabled_logs.contains(&log_type)
	}
}
impl Default for LogOptions {
	fn default() -> Self {
		Self::new([HttpLogType::Requests])
	}
}

/// Builder for [`HttpClient`].
pub struct HttpClientBuilder {
	transport: Arc<dyn HttpTransport>,
	base_url: Option<String>,
	token_resolver: Option<Arc<dyn TokenResolver>>,
	correlation_id_resolver: Option<CorrelationIdResolver>,
	correlation_id_header: String,
	log_options: LogOptions,
	dedup: bool,
	retry: Option<RetryPolicy>,
	cache: Option<Arc<dyn ResponseCacheStore>>,
	cache_options: CacheOptions,
	timeout: Option<StdDuration>,
}
impl HttpClientBuilder {
	const DEFAULT_CORRELATION_ID_HEADER: &'static str = "x-correlation-id";

	/// Prefix applied to requests that do not carry their own base URL.
	pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
		self.base_url = Some(base_url.into());

		self
	}

	/// Injects `Authorization: Bearer <token>` from `resolver` into every request.
	pub fn token_resolver(mut self, resolver: impl 'static + TokenResolver) -> Self {
		self.token_resolver = Some(Arc::new(resolver));

		self
	}

	/// Attaches the id returned by `resolver` to every request.
	pub fn correlation_id_resolver<F>(mut self, resolver: F) -> Self
	where
		F: 'static + Send + Sync + Fn() -> String,
	{
		self.correlation_id_resolver = Some(Arc::new(resolver));

		self
	}

	/// Header carrying the correlation id (defaults to `x-correlation-id`).
	pub fn correlation_id_header(mut self, name: impl Into<String>) -> Self {
		self.correlation_id_header = name.into();

		self
	}

	/// Selects which request/response logs are emitted.
	pub fn log_options(mut self, log_options: LogOptions) -> Self {
		self.log_options = log_options;

		self
	}

	/// Collapses concurrent identical `GET`/`HEAD` requests into one upstream call.
	pub fn dedup(mut self, enabled: bool) -> Self {
		self.dedup = enabled;

		self
	}

	/// Retries failed calls according to `policy`.
	pub fn retry(mut self, policy: RetryPolicy) -> Self {
		self.retry = Some(policy);

		self
	}

	/// Caches successful `GET`/`HEAD` responses in `store`; implies [`dedup`](Self::dedup).
	pub fn cache(mut self, store: impl 'static + ResponseCacheStore) -> Self {
		self.cache = Some(Arc::new(store));

		self
	}

	/// Freshness rules for the response cache (5 minute TTL, stale-if-error on by default).
	pub fn cache_options(mut self, options: CacheOptions) -> Self {
		self.cache_options = options;

		self
	}

	/// Deadline applied to requests that do not set their own.
	pub fn timeout(mut self, timeout: StdDuration) -> Self {
		self.timeout = Some(timeout);

		self
	}

	/// Validates the configuration and builds the client.
	pub fn build(self) -> Result<HttpClient, ConfigError> {
		if HeaderName::from_bytes(self.correlation_id_header.as_bytes()).is_err() {
			return Err(ConfigError::InvalidHeader { name: self.correlation_id_header });
		}
		if let Some(base_url) = &self.base_url {
			Url::parse(base_url)
				.map_err(|source| ConfigError::InvalidUrl { url: base_url.clone(), source })?;
		}

		let coalescer = (self.dedup || self.cache.is_some()).then(|| {
			RequestCoalescer::<dyn HttpTransport, _>::with_key_provider(
				self.transport.clone(),
				MethodScopedKey,
			)
		});

		Ok(HttpClient {
			transport: self.transport,
			coalescer,
			base_url: self.base_url,
			token_resolver: self.token_resolver,
			correlation_id_resolver: self.correlation_id_resolver,
			correlation_id_header: self.correlation_id_header,
			log_options: self.log_options,
			retry: self.retry,
			cache: self.cache,
			cache_options: self.cache_options,
			timeout: self.timeout,
		})
	}
}
impl Debug for HttpClientBuilder {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("HttpClientBuilder")
			.field("base_url", &self.base_url)
			.field("token_resolver_set", &self.token_resolver.is_some())
			.field("correlation_id_header", &self.correlation_id_header)
			.field("log_options", &self.log_options)
			.field("dedup", &self.dedup)
			.field("retry", &self.retry)
			.field("cache_set", &self.cache.is_some())
			.field("cache_options", &self.cache_options)
			.field("timeout", &self.timeout)
			.finish()
	}
}

/// HTTP client wrapper with token injection, retries, caching, and de-duplication.
pub struct HttpClient {
	transport: Arc<dyn HttpTransport>,
	coalescer: Option<RequestCoalescer<dyn HttpTransport, MethodScopedKey>>,
	base_url: Option<String>,
	token_resolver: Option<Arc<dyn TokenResolver>>,
	correlation_id_resolver: Option<CorrelationIdResolver>,
	correlation_id_header: String,
	log_options: LogOptions,
	retry: Option<RetryPolicy>,
	cache: Option<Arc<dyn ResponseCacheStore>>,
	cache_options: CacheOptions,
	timeout: Option<StdDuration>,
}
impl HttpClient {
	/// Starts configuring a client that sends through `transport`.
	pub fn builder(transport: impl HttpTransport) -> HttpClientBuilder {
		HttpClientBuilder {
			transport: Arc::new(transport),
			base_url: None,
			token_resolver: None,
			correlation_id_resolver: None,
			correlation_id_header: HttpClientBuilder::DEFAULT_CORRELATION_ID_HEADER.into(),
			log_options: LogOptions::default(),
			dedup: false,
			retry: None,
			cache: None,
			cache_options: CacheOptions::default(),
			timeout: None,
		}
	}

	/// Sends `request` through the full pipeline.
	pub async fn send(&self, request: HttpRequest) -> Result<HttpResponse> {
		let span = OpSpan::new(OpKind::Http, request.method.as_str());

		obs::record_op_outcome(OpKind::Http, obs::OpOutcome::Attempt);

		let result = span.instrument(self.execute(request)).await;

		obs::record_result(OpKind::Http, &result);

		result
	}

	/// Sends a `GET` request.
	pub async fn get(&self, url: impl Into<String>) -> Result<HttpResponse> {
		self.send(HttpRequest::get(url)).await
	}

	/// Sends a `DELETE` request.
	pub async fn delete(&self, url: impl Into<String>) -> Result<HttpResponse> {
		self.send(HttpRequest::new(Method::Delete, url)).await
	}

	/// Sends a `HEAD` request.
	pub async fn head(&self, url: impl Into<String>) -> Result<HttpResponse> {
		self.send(HttpRequest::new(Method::Head, url)).await
	}

	/// Sends an `OPTIONS` request.
	pub async fn options(&self, url: impl Into<String>) -> Result<HttpResponse> {
		self.send(HttpRequest::new(Method::Options, url)).await
	}

	/// Sends a `POST` request with a JSON body.
	pub async fn post<B>(&self, url: impl Into<String>, body: &B) -> Result<HttpResponse>
	where
		B: ?Sized + Serialize,
	{
		self.send_json(Method::Post, url.into(), body).await
	}

	/// Sends a `PUT` request with a JSON body.
	pub async fn put<B>(&self, url: impl Into<String>, body: &B) -> Result<HttpResponse>
	where
		B: ?Sized + Serialize,
	{
		self.send_json(Method::Put, url.into(), body).await
	}

	/// Sends a `PATCH` request with a JSON body.
	pub async fn patch<B>(&self, url: impl Into<String>, body: &B) -> Result<HttpResponse>
	where
		B: ?Sized + Serialize,
	{
		self.send_json(Method::Patch, url.into(), body).await
	}

	async fn send_json<B>(&self, method: Method, url: String, body: &B) -> Result<HttpResponse>
	where
		B: ?Sized + Serialize,
	{
		let request = HttpRequest::new(method, url).with_json(body).map_err(ConfigError::from)?;

		self.send(request).await
	}

	async fn execute(&self, mut request: HttpRequest) -> Result<HttpResponse> {
		if request.url.trim().is_empty() {
			return Err(ConfigError::MissingUrl.into());
		}
		if request.base_url.is_none() {
			request.base_url = self.base_url.clone();
		}
		if request.timeout.is_none() {
			request.timeout = self.timeout;
		}

		let correlation_id = self.correlation_id_resolver.as_ref().map(|resolve| resolve());

		if let Some(id) = &correlation_id {
			let header = self.correlation_id_header.as_str();

			request.headers.retain(|(name, _)| !name.eq_ignore_ascii_case(header));
			request.headers.push((header.to_owned(), id.clone()));
		}

		let url = request.full_url();
		let event =
			HttpEvent { method: request.method, url: &url, correlation_id: correlation_id.as_deref() };

		if let Some(resolver) = &self.token_resolver {
			if request.has_header("authorization") {
				let error = Error::from(ConfigError::AuthorizationAlreadySet);

				obs::http_error(event, &error);

				return Err(error);
			}

			match resolver.resolve_token().await {
				Ok(token) => request.headers.push(("authorization".into(), token.bearer())),
				Err(error) => {
					obs::http_token_error(event, &error);

					return Err(error);
				},
			}
		}
		if self.log_options.is_enabled(HttpLogType::Requests) {
			obs::http_request(event);
		}

		let cache = self.cache.as_deref().filter(|_| request.method.is_cacheable());
		let key = cache.map(|_| MethodScopedKey.request_key(&request));
		let stale = match cache.zip(key.as_deref()) {
			Some((cache, key)) => match self.lookup(cache, key, event).await {
				CacheLookup::Fresh(response) => {
					self.log_response(event, &response, true);

					return Ok(response);
				},
				CacheLookup::Stale(response) => Some(response),
				CacheLookup::Miss => None,
			},
			None => None,
		};
		let service = request.service_name();
		let outcome = match &self.retry {
			Some(policy) =>
				policy.run(event, || self.attempt(request.clone(), service.as_str())).await,
			None => self.attempt(request, &service).await,
		};

		match outcome {
			Ok(response) => {
				if let (Some(cache), Some(key)) = (cache, key) {
					let entry = CachedResponse::new(response.clone(), OffsetDateTime::now_utc());

					if let Err(error) = cache.store(key, entry).await {
						obs::http_cache_error(event, &error);
					}
				}

				self.log_response(event, &response, false);

				Ok(response)
			},
			Err(error) => {
				if let Some(stale) = stale {
					obs::http_stale_served(event, &error);

					return Ok(stale);
				}

				obs::http_error(event, &error);

				Err(error)
			},
		}
	}

	async fn attempt(&self, request: HttpRequest, service: &str) -> Result<HttpResponse> {
		let response = match &self.coalescer {
			Some(coalescer) if request.method.is_cacheable() => coalescer.send(request).await?,
			_ => self.transport.send(request).await?,
		};

		if !response.is_success() {
			return Err(UpstreamError::from_response(service, &response).into());
		}

		Ok(response)
	}

	async fn lookup(
		&self,
		cache: &dyn ResponseCacheStore,
		key: &str,
		event: HttpEvent<'_>,
	) -> CacheLookup {
		let entry = match cache.find(key).await {
			Ok(Some(entry)) => entry,
			Ok(None) => return CacheLookup::Miss,
			Err(error) => {
				obs::http_cache_error(event, &error);

				return CacheLookup::Miss;
			},
		};

		if entry.is_fresh_at(OffsetDateTime::now_utc(), self.cache_options.ttl) {
			return CacheLookup::Fresh(entry.response);
		}
		if self.cache_options.stale_if_error {
			return CacheLookup::Stale(entry.response);
		}
		if let Err(error) = cache.remove(key).await {
			obs::http_cache_error(event, &error);
		}

		CacheLookup::Miss
	}

	fn log_response(&self, event: HttpEvent<'_>, response: &HttpResponse, from_cache: bool) {
		if self.log_options.is_enabled(HttpLogType::Responses) {
			obs::http_response(event, response.status, from_cache);
		}
	}
}
#[cfg(feature = "reqwest")]
impl HttpClient {
	/// Starts configuring a client backed by a default reqwest transport.
	pub fn reqwest() -> HttpClientBuilder {
		Self::builder(ReqwestTransport::default())
	}
}
impl Debug for HttpClient {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("HttpClient")
			.field("base_url", &self.base_url)
			.field("token_resolver_set", &self.token_resolver.is_some())
			.field("correlation_id_header", &self.correlation_id_header)
			.field("log_options", &self.log_options)
			.field("coalescer", &self.coalescer)
			.field("retry", &self.retry)
			.field("cache_set", &self.cache.is_some())
			.field("cache_options", &self.cache_options)
			.field("timeout", &self.timeout)
			.finish()
	}
}

enum CacheLookup {
	Fresh(HttpResponse),
	Stale(HttpResponse),
	Miss,
}

// `GET` and `HEAD` share a URL but not a response body.
#[derive(Clone, Copy, Debug)]
struct MethodScopedKey;
impl RequestKeyProvider for MethodScopedKey {
	fn request_key(&self, request: &HttpRequest) -> String {
		match request.method {
			Method::Get => coalesce::cache_key(request),
			method => format!("{method} {}", coalesce::cache_key(request)),
		}
	}
}
