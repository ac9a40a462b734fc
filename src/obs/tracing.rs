// self
use crate::{_prelude::*, client::CacheError, http::Method, obs::OpKind};

/// Type alias that resolves to an instrumented future when tracing is enabled.
#[cfg(feature = "tracing")]
pub type InstrumentedOp<F> = tracing::instrument::Instrumented<F>;
/// Passthrough future type when tracing is disabled.
#[cfg(not(feature = "tracing"))]
pub type InstrumentedOp<F> = F;

/// A span builder used by crate operations.
#[derive(Clone, Debug)]
pub struct OpSpan {
	#[cfg(feature = "tracing")]
	span: tracing::Span,
}
impl OpSpan {
	/// Creates a new span tagged with the provided operation kind + stage.
	pub fn new(kind: OpKind, stage: &'static str) -> Self {
		#[cfg(feature = "tracing")]
		{
			let span = tracing::info_span!("courier.op", op = kind.as_str(), stage);

			Self { span }
		}
		#[cfg(not(feature = "tracing"))]
		{
			let _ = (kind, stage);

			Self {}
		}
	}

	/// Instruments an async block without holding a guard across `.await` points.
	pub fn instrument<Fut>(&self, fut: Fut) -> InstrumentedOp<Fut>
	where
		Fut: Future,
	{
		#[cfg(feature = "tracing")]
		{
			use tracing::Instrument;

			fut.instrument(self.span.clone())
		}
		#[cfg(not(feature = "tracing"))]
		{
			fut
		}
	}
}

/// Request identity attached to every HTTP client event.
///
/// Only routing data is carried; headers and bodies stay out of the log stream.
#[derive(Clone, Copy, Debug)]
pub struct HttpEvent<'a> {
	/// Request method.
	pub method: Method,
	/// Fully qualified URL (base + path).
	pub url: &'a str,
	/// Correlation id forwarded to the dependency, if any.
	pub correlation_id: Option<&'a str>,
}

/// Logs an outgoing request.
pub fn http_request(event: HttpEvent<'_>) {
	#[cfg(feature = "tracing")]
	tracing::info!(
		method = event.method.as_str(),
		url = event.url,
		correlation_id = event.correlation_id,
		"HTTP Request"
	);
	#[cfg(not(feature = "tracing"))]
	let _ = event;
}

/// Logs a successful response.
pub fn http_response(event: HttpEvent<'_>, status: u16, from_cache: bool) {
	#[cfg(feature = "tracing")]
	tracing::info!(
		method = event.method.as_str(),
		url = event.url,
		correlation_id = event.correlation_id,
		status,
		from_cache,
		"HTTP Response"
	);
	#[cfg(not(feature = "tracing"))]
	let _ = (event, status, from_cache);
}

/// Logs a retry scheduled after a failed attempt.
pub fn http_retry(event: HttpEvent<'_>, attempt: u32, delay: std::time::Duration, error: &Error) {
	#[cfg(feature = "tracing")]
	tracing::info!(
		method = event.method.as_str(),
		url = event.url,
		correlation_id = event.correlation_id,
		retry_attempt = attempt,
		delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
		status = error.status(),
		error = %error,
		"HTTP Response Error Retry"
	);
	#[cfg(not(feature = "tracing"))]
	let _ = (event, attempt, delay, error);
}

/// Logs a failure returned to the caller.
pub fn http_error(event: HttpEvent<'_>, error: &Error) {
	#[cfg(feature = "tracing")]
	tracing::warn!(
		method = event.method.as_str(),
		url = event.url,
		correlation_id = event.correlation_id,
		status = error.status(),
		error = %error,
		"HTTP Response Error"
	);
	#[cfg(not(feature = "tracing"))]
	let _ = (event, error);
}

/// Logs a call that never left the process because no bearer token could be resolved.
pub fn http_token_error(event: HttpEvent<'_>, error: &Error) {
	#[cfg(feature = "tracing")]
	tracing::info!(
		method = event.method.as_str(),
		url = event.url,
		correlation_id = event.correlation_id,
		error = %error,
		"HTTP call skipped due to a token error"
	);
	#[cfg(not(feature = "tracing"))]
	let _ = (event, error);
}

/// Logs a stale cache entry served because the upstream call failed.
pub fn http_stale_served(event: HttpEvent<'_>, error: &Error) {
	#[cfg(feature = "tracing")]
	tracing::warn!(
		method = event.method.as_str(),
		url = event.url,
		correlation_id = event.correlation_id,
		error = %error,
		"HTTP Response served from stale cache"
	);
	#[cfg(not(feature = "tracing"))]
	let _ = (event, error);
}

/// Logs a response-cache failure; the call continues as a cache miss.
pub fn http_cache_error(event: HttpEvent<'_>, error: &CacheError) {
	#[cfg(feature = "tracing")]
	tracing::warn!(
		method = event.method.as_str(),
		url = event.url,
		correlation_id = event.correlation_id,
		store = error.store.as_str(),
		error = %error,
		"HTTP Response cache unavailable"
	);
	#[cfg(not(feature = "tracing"))]
	let _ = (event, error);
}
