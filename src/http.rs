//! Transport primitives shared by the coalescer, token providers, and the HTTP client.
//!
//! [`HttpTransport`] is the crate's only dependency on an HTTP stack. It sends one
//! [`HttpRequest`] and yields the raw [`HttpResponse`] for every status code; only failures to
//! obtain a response (DNS, TCP, TLS, deadlines, unusable URLs) surface as errors. Status
//! interpretation is left to callers so the same transport can back token exchanges and
//! general API calls.

// std
use std::{borrow::Cow, time::Duration as StdDuration};
// crates.io
use time::format_description::well_known::Rfc2822;
// self
use crate::{_prelude::*, error::ConfigError};
#[cfg(feature = "reqwest")] use crate::error::TransportError;

/// Boxed future returned by [`HttpTransport::send`].
pub type TransportFuture<'a> = Pin<Box<dyn Future<Output = Result<HttpResponse>> + 'a + Send>>;

/// Abstraction over HTTP stacks capable of sending a single request.
///
/// Implementations must be `Send + Sync + 'static` so they can sit behind an `Arc` shared by
/// clients, coalescers, and token providers, and the returned future must be `Send` so callers
/// can box it into shared futures.
pub trait HttpTransport
where
	Self: 'static + Send + Sync,
{
	/// Sends `request` and resolves with the response, whatever its status.
	fn send(&self, request: HttpRequest) -> TransportFuture<'_>;
}
impl<T> HttpTransport for Arc<T>
where
	T: ?Sized + HttpTransport,
{
	fn send(&self, request: HttpRequest) -> TransportFuture<'_> {
		T::send(self, request)
	}
}

/// HTTP methods supported by the crate.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
	/// `GET`
	Get,
	/// `POST`
	Post,
	/// `PUT`
	Put,
	/// `PATCH`
	Patch,
	/// `DELETE`
	Delete,
	/// `HEAD`
	Head,
	/// `OPTIONS`
	Options,
}
impl Method {
	/// Returns the canonical upper-case method name.
	pub const fn as_str(self) -> &'static str {
		match self {
			Self::Get => "GET",
			Self::Post => "POST",
			Self::Put => "PUT",
			Self::Patch => "PATCH",
			Self::Delete => "DELETE",
			Self::Head => "HEAD",
			Self::Options => "OPTIONS",
		}
	}

	/// Methods whose successful responses may be served from the response cache.
	pub const fn is_cacheable(self) -> bool {
		matches!(self, Self::Get | Self::Head)
	}
}
impl Display for Method {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Outgoing request description.
///
/// `url` is appended verbatim to `base_url`, matching how services configure a shared base and
/// per-call paths. Headers and query parameters keep their insertion order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HttpRequest {
	/// Request method.
	pub method: Method,
	/// Optional prefix prepended to `url`.
	pub base_url: Option<String>,
	/// Target URL or path.
	pub url: String,
	/// Header name/value pairs.
	pub headers: Vec<(String, String)>,
	/// Query parameters.
	pub query: Vec<(String, String)>,
	/// Request payload.
	pub body: Option<Bytes>,
	/// Deadline for the whole exchange.
	pub timeout: Option<StdDuration>,
}
impl HttpRequest {
	/// Creates a request with no headers, query, or body.
	pub fn new(method: Method, url: impl Into<String>) -> Self {
		Self {
			method,
			base_url: None,
			url: url.into(),
			headers: Vec::new(),
			query: Vec::new(),
			body: None,
			timeout: None,
		}
	}

	/// Shorthand for a `GET` request.
	pub fn get(url: impl Into<String>) -> Self {
		Self::new(Method::Get, url)
	}

	/// Shorthand for a `POST` request.
	pub fn post(url: impl Into<String>) -> Self {
		Self::new(Method::Post, url)
	}

	/// Sets the base URL.
	pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
		self.base_url = Some(base_url.into());

		self
	}

	/// Appends a header.
	pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
		self.headers.push((name.into(), value.into()));

		self
	}

	/// Appends a query parameter.
	pub fn with_query(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
		self.query.push((name.into(), value.into()));

		self
	}

	/// Sets the raw body.
	pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
		self.body = Some(body.into());

		self
	}

	/// Serializes `body` as JSON and sets the matching content type.
	pub fn with_json<B>(self, body: &B) -> Result<Self, serde_json::Error>
	where
		B: ?Sized + Serialize,
	{
		let payload = serde_json::to_vec(body)?;

		Ok(self.with_header("content-type", "application/json").with_body(payload))
	}

	/// Sets the deadline.
	pub fn with_timeout(mut self, timeout: StdDuration) -> Self {
		self.timeout = Some(timeout);

		self
	}

	/// Returns the first header value matching `name`, compared case-insensitively.
	pub fn header(&self, name: &str) -> Option<&str> {
		find_header(&self.headers, name)
	}

	/// Returns `true` if a header named `name` is present.
	pub fn has_header(&self, name: &str) -> bool {
		self.header(name).is_some()
	}

	/// Base URL and URL concatenated as-is.
	pub fn full_url(&self) -> String {
		match &self.base_url {
			Some(base) => format!("{base}{}", self.url),
			None => self.url.clone(),
		}
	}

	/// Parses [`full_url`](Self::full_url) and appends the query parameters.
	pub fn resolved_url(&self) -> Result<Url, ConfigError> {
		let raw = self.full_url();
		let mut url =
			Url::parse(&raw).map_err(|source| ConfigError::InvalidUrl { url: raw, source })?;

		if !self.query.is_empty() {
			url.query_pairs_mut().extend_pairs(self.query.iter());
		}

		Ok(url)
	}

	/// Hostname of the target, or `N/A` when the URL cannot be parsed.
	pub fn service_name(&self) -> String {
		Url::parse(&self.full_url())
			.ok()
			.and_then(|url| url.host_str().map(str::to_owned))
			.unwrap_or_else(|| "N/A".into())
	}
}

/// Response returned by an [`HttpTransport`].
///
/// Cloning is cheap: the body is reference counted so one response can be handed to every
/// waiter of a coalesced request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HttpResponse {
	/// HTTP status code.
	pub status: u16,
	/// Header name/value pairs.
	pub headers: Vec<(String, String)>,
	/// Response payload.
	pub body: Bytes,
}
impl HttpResponse {
	/// Creates a response with the given status and body.
	pub fn new(status: u16, body: impl Into<Bytes>) -> Self {
		Self { status, headers: Vec::new(), body: body.into() }
	}

	/// Appends a header.
	pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
		self.headers.push((name.into(), value.into()));

		self
	}

	/// Returns `true` for 2xx statuses.
	pub fn is_success(&self) -> bool {
		(200..300).contains(&self.status)
	}

	/// Returns the first header value matching `name`, compared case-insensitively.
	pub fn header(&self, name: &str) -> Option<&str> {
		find_header(&self.headers, name)
	}

	/// Body decoded as UTF-8, replacing invalid sequences.
	pub fn text(&self) -> Cow<'_, str> {
		String::from_utf8_lossy(&self.body)
	}

	/// Deserializes the body as JSON, reporting the failing path on error.
	pub fn json<T>(&self) -> Result<T, serde_path_to_error::Error<serde_json::Error>>
	where
		T: serde::de::DeserializeOwned,
	{
		let mut de = serde_json::Deserializer::from_slice(&self.body);

		serde_path_to_error::deserialize(&mut de)
	}

	/// Retry-After hint expressed as a relative duration.
	pub fn retry_after(&self) -> Option<Duration> {
		parse_retry_after(self.header("retry-after")?)
	}
}

/// Thin wrapper around [`ReqwestClient`] so shared HTTP behavior lives in one place.
#[cfg(feature = "reqwest")]
#[derive(Clone, Debug, Default)]
pub struct ReqwestTransport(pub ReqwestClient);
#[cfg(feature = "reqwest")]
impl ReqwestTransport {
	/// Wraps an existing reqwest [`ReqwestClient`].
	pub fn with_client(client: ReqwestClient) -> Self {
		Self(client)
	}

	async fn execute(client: ReqwestClient, request: HttpRequest) -> Result<HttpResponse> {
		let url = request.resolved_url()?;
		let target = url.to_string();
		let method = reqwest::Method::from_bytes(request.method.as_str().as_bytes())
			.map_err(|_| ConfigError::InvalidHeader { name: ":method".into() })?;
		let mut builder = client.request(method, url);

		for (name, value) in &request.headers {
			builder = builder.header(name.as_str(), value.as_str());
		}
		if let Some(body) = request.body {
			builder = builder.body(body);
		}
		if let Some(timeout) = request.timeout {
			builder = builder.timeout(timeout);
		}

		let map_err = |err: ReqwestError| -> Error {
			if err.is_timeout() {
				TransportError::Timeout { url: target.clone() }.into()
			} else if err.is_builder() {
				ConfigError::http_client_build(err).into()
			} else {
				TransportError::network(target.clone(), err).into()
			}
		};
		let response = builder.send().await.map_err(&map_err)?;
		let status = response.status().as_u16();
		let headers = response
			.headers()
			.iter()
			.filter_map(|(name, value)| {
				value.to_str().ok().map(|value| (name.as_str().to_owned(), value.to_owned()))
			})
			.collect();
		let body = response.bytes().await.map_err(&map_err)?;

		Ok(HttpResponse { status, headers, body })
	}
}
#[cfg(feature = "reqwest")]
impl AsRef<ReqwestClient> for ReqwestTransport {
	fn as_ref(&self) -> &ReqwestClient {
		&self.0
	}
}
#[cfg(feature = "reqwest")]
impl HttpTransport for ReqwestTransport {
	fn send(&self, request: HttpRequest) -> TransportFuture<'_> {
		Box::pin(Self::execute(self.0.clone(), request))
	}
}

fn find_header<'a>(headers: &'a [(String, String)], name: &str) -> Option<&'a str> {
	headers
		.iter()
		.find(|(candidate, _)| candidate.eq_ignore_ascii_case(name))
		.map(|(_, value)| value.as_str())
}

fn parse_retry_after(raw: &str) -> Option<Duration> {
	let raw = raw.trim();

	if let Ok(secs) = raw.parse::<u64>() {
		return Some(Duration::seconds(i64::try_from(secs).unwrap_or(i64::MAX)));
	}
	if let Ok(moment) = OffsetDateTime::parse(raw, &Rfc2822) {
		let delta = moment - OffsetDateTime::now_utc();

		if delta.is_positive() {
			return Some(delta);
		}
	}

	None
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn resolved_url_concatenates_base_and_appends_query() {
		let request = HttpRequest::get("/v1/items")
			.with_base_url("https://api.example.com")
			.with_query("page", "2")
			.with_query("filter", "a b");
		let url = request.resolved_url().expect("Request URL should resolve.");

		assert_eq!(url.as_str(), "https://api.example.com/v1/items?page=2&filter=a+b");
		assert_eq!(request.service_name(), "api.example.com");
		assert_eq!(HttpRequest::get("testUrl").service_name(), "N/A");
	}

	#[test]
	fn header_lookup_is_case_insensitive() {
		let request = HttpRequest::get("https://x").with_header("Authorization", "Bearer t");

		assert_eq!(request.header("authorization"), Some("Bearer t"));
		assert!(!request.has_header("x-correlation-id"));
	}

	#[test]
	fn retry_after_accepts_delta_seconds() {
		let response = HttpResponse::new(429, "").with_header("Retry-After", " 7 ");

		assert_eq!(response.retry_after(), Some(Duration::seconds(7)));
		assert_eq!(HttpResponse::new(429, "").retry_after(), None);
	}

	#[test]
	fn json_errors_report_the_failing_path() {
		#[derive(Debug, Deserialize)]
		#[allow(dead_code)]
		struct Payload {
			access_token: String,
		}

		let err = HttpResponse::new(200, r#"{"access_token":42}"#)
			.json::<Payload>()
			.expect_err("Numeric token should fail to decode.");

		assert_eq!(err.path().to_string(), "access_token");
	}
}
