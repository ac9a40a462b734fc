//! Crate-level error types shared across the coalescer, token providers, stores, and client.
//!
//! Every variant is cheap to clone: a single failure settles a shared future and must reach
//! every awaiter unchanged, so boxed sources are reference counted.

// self
use crate::_prelude::*;

/// Crate-wide result type alias returning [`Error`] by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

type BoxError = Arc<dyn StdError + Send + Sync>;

/// Canonical error exposed by public APIs.
#[derive(Clone, Debug, ThisError)]
pub enum Error {
	/// Secret-store failure.
	#[error("{0}")]
	Storage(
		#[from]
		#[source]
		crate::store::StoreError,
	),
	/// Local configuration problem; never retried.
	#[error(transparent)]
	Config(#[from] ConfigError),
	/// Upstream service answered with a failure or an unusable body.
	#[error(transparent)]
	Upstream(#[from] UpstreamError),
	/// Transport failure (DNS, TCP, TLS, timeout).
	#[error(transparent)]
	Transport(#[from] TransportError),
}
impl Error {
	/// Returns `true` when repeating the same call may succeed.
	pub fn is_retryable(&self) -> bool {
		match self {
			Self::Transport(_) => true,
			Self::Upstream(UpstreamError::Http { status, .. }) =>
				matches!(*status, 408 | 429) || (500..600).contains(status),
			Self::Storage(_) | Self::Config(_) | Self::Upstream(_) => false,
		}
	}

	/// HTTP status reported by the upstream service, when there was one.
	pub fn status(&self) -> Option<u16> {
		match self {
			Self::Upstream(UpstreamError::Http { status, .. }) => Some(*status),
			Self::Upstream(UpstreamError::TokenResponseParse { status, .. }) => *status,
			_ => None,
		}
	}
}

/// Configuration and validation failures.
#[derive(Clone, Debug, ThisError)]
pub enum ConfigError {
	/// HTTP client could not be constructed.
	#[error("HTTP client could not be constructed.")]
	HttpClientBuild {
		/// Underlying transport builder failure.
		#[source]
		source: BoxError,
	},
	/// Request URL cannot be parsed.
	#[error("Request URL `{url}` is invalid.")]
	InvalidUrl {
		/// URL as supplied by the caller.
		url: String,
		/// Underlying parsing failure.
		#[source]
		source: url::ParseError,
	},
	/// Request was issued without a URL.
	#[error("Request URL must be defined.")]
	MissingUrl,
	/// Request payload cannot be serialized as JSON.
	#[error("Request body could not be serialized as JSON.")]
	InvalidBody {
		/// Underlying serializer failure.
		#[source]
		source: Arc<serde_json::Error>,
	},
	/// Header name or value cannot be sent over the wire.
	#[error("Header `{name}` is invalid.")]
	InvalidHeader {
		/// Offending header name.
		name: String,
	},
	/// The caller set an Authorization header on a client that injects its own tokens.
	#[error(
		"Authorization header already specified; build a client with a different (or without a) token resolver."
	)]
	AuthorizationAlreadySet,
	/// Backing store produced a client id or client secret that is empty.
	#[error("Client credentials are incomplete: the client id or client secret is missing.")]
	MissingCredentials,
}
impl ConfigError {
	/// Wraps a transport's builder failure inside [`ConfigError`].
	pub fn http_client_build(src: impl 'static + Send + Sync + StdError) -> Self {
		Self::HttpClientBuild { source: Arc::new(src) }
	}
}
impl From<serde_json::Error> for ConfigError {
	fn from(source: serde_json::Error) -> Self {
		Self::InvalidBody { source: Arc::new(source) }
	}
}

/// Failures reported by (or decoded from) an upstream service.
#[derive(Clone, Debug, ThisError)]
pub enum UpstreamError {
	/// Upstream answered with a non-2xx status.
	#[error("Dependent service `{service}` returned status {status}.")]
	Http {
		/// Hostname of the dependency, or `N/A` when it cannot be derived.
		service: String,
		/// HTTP status code.
		status: u16,
		/// Leading slice of the response body for diagnostics.
		body_preview: String,
		/// Retry-After hint from upstream, if supplied.
		retry_after: Option<Duration>,
	},
	/// Token endpoint responded with JSON that does not carry an access token.
	#[error("Token endpoint returned malformed JSON.")]
	TokenResponseParse {
		/// Structured parsing failure.
		#[source]
		source: Arc<serde_path_to_error::Error<serde_json::Error>>,
		/// HTTP status code, when available.
		status: Option<u16>,
	},
}
impl UpstreamError {
	const BODY_PREVIEW_LIMIT: usize = 512;

	/// Builds an [`UpstreamError::Http`] from a failed response.
	pub fn from_response(service: impl Into<String>, response: &crate::http::HttpResponse) -> Self {
		let text = response.text();
		let body_preview = match text.char_indices().nth(Self::BODY_PREVIEW_LIMIT) {
			Some((idx, _)) => text[..idx].to_owned(),
			None => text.into_owned(),
		};

		Self::Http {
			service: service.into(),
			status: response.status,
			body_preview,
			retry_after: response.retry_after(),
		}
	}

	/// Retry-After hint carried by the failure.
	pub fn retry_after(&self) -> Option<Duration> {
		match self {
			Self::Http { retry_after, .. } => *retry_after,
			Self::TokenResponseParse { .. } => None,
		}
	}
}

/// Transport-level failures (network, IO, deadlines).
#[derive(Clone, Debug, ThisError)]
pub enum TransportError {
	/// Underlying HTTP client reported a network failure.
	#[error("Network error occurred while calling `{url}`.")]
	Network {
		/// Target URL.
		url: String,
		/// Transport-specific network error.
		#[source]
		source: BoxError,
	},
	/// The request exceeded its deadline.
	#[error("Request to `{url}` timed out.")]
	Timeout {
		/// Target URL.
		url: String,
	},
}
impl TransportError {
	/// Wraps a transport-specific network error.
	pub fn network(url: impl Into<String>, src: impl 'static + Send + Sync + StdError) -> Self {
		Self::Network { url: url.into(), source: Arc::new(src) }
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn retryable_classification_follows_status() {
		let http = |status| {
			Error::from(UpstreamError::Http {
				service: "api.example.com".into(),
				status,
				body_preview: String::new(),
				retry_after: None,
			})
		};

		assert!(http(503).is_retryable());
		assert!(http(429).is_retryable());
		assert!(!http(404).is_retryable());
		assert!(!Error::from(ConfigError::MissingCredentials).is_retryable());
		assert!(Error::from(TransportError::Timeout { url: "https://x".into() }).is_retryable());
		assert_eq!(http(418).status(), Some(418));
	}

	#[test]
	fn cloned_errors_keep_their_source() {
		let err = Error::from(TransportError::network(
			"https://api.example.com",
			std::io::Error::other("connection reset"),
		));
		let cloned = err.clone();
		let source = StdError::source(&cloned).expect("Cloned error should expose its source.");

		assert_eq!(source.to_string(), "connection reset");
		assert_eq!(err.to_string(), cloned.to_string());
	}
}
