//! Response caching with a static time-to-live and pluggable storage.
//!
//! [`CacheOptions`] decide when an entry is fresh and whether an expired one may be served after
//! an upstream failure. Entries themselves live in a [`ResponseCacheStore`]; the in-process
//! [`MemoryResponseCache`] is the default, and shared backends (Redis and friends) implement the
//! same three operations.

// std
use std::time::Duration as StdDuration;
// self
use crate::{_prelude::*, http::HttpResponse};

/// Boxed future returned by [`ResponseCacheStore`] operations.
pub type CacheFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, CacheError>> + 'a + Send>>;

/// Storage backend for cached responses.
///
/// Keys come from [`cache_key`](crate::coalesce::cache_key), scoped by method for non-`GET`
/// requests. Stores hold entries regardless of age; freshness is judged by [`CacheOptions`].
pub trait ResponseCacheStore
where
	Self: Send + Sync,
{
	/// Looks up the entry stored under `key`.
	fn find<'a>(&'a self, key: &'a str) -> CacheFuture<'a, Option<CachedResponse>>;

	/// Stores `entry` under `key`, replacing any previous value.
	fn store(&self, key: String, entry: CachedResponse) -> CacheFuture<'_, ()>;

	/// Drops the entry stored under `key`, if any.
	fn remove<'a>(&'a self, key: &'a str) -> CacheFuture<'a, ()>;
}
impl<S> ResponseCacheStore for Arc<S>
where
	S: ?Sized + ResponseCacheStore,
{
	fn find<'a>(&'a self, key: &'a str) -> CacheFuture<'a, Option<CachedResponse>> {
		S::find(self, key)
	}

	fn store(&self, key: String, entry: CachedResponse) -> CacheFuture<'_, ()> {
		S::store(self, key, entry)
	}

	fn remove<'a>(&'a self, key: &'a str) -> CacheFuture<'a, ()> {
		S::remove(self, key)
	}
}

/// Failure reported by a [`ResponseCacheStore`]; the client treats it as a cache miss.
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
#[error("Response cache `{store}` failed: {message}.")]
pub struct CacheError {
	/// Store label.
	pub store: String,
	/// Human-readable error payload.
	pub message: String,
}
impl CacheError {
	/// Builds an error from any displayable cause.
	pub fn new(store: impl Into<String>, cause: impl Display) -> Self {
		Self { store: store.into(), message: cause.to_string() }
	}
}

/// A stored response together with the time it was fetched.
#[derive(Clone, Debug)]
pub struct CachedResponse {
	/// Upstream response.
	pub response: HttpResponse,
	/// Time the response was received.
	pub stored_at: OffsetDateTime,
}
impl CachedResponse {
	/// Wraps `response` received at `stored_at`.
	pub fn new(response: HttpResponse, stored_at: OffsetDateTime) -> Self {
		Self { response, stored_at }
	}

	/// Returns `true` while the entry is younger than `ttl`.
	pub fn is_fresh_at(&self, now: OffsetDateTime, ttl: Duration) -> bool {
		now - self.stored_at < ttl
	}
}

/// Freshness rules applied on top of a [`ResponseCacheStore`].
///
/// Upstream cache headers are ignored in favor of the static TTL.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct CacheOptions {
	/// Lifetime of a stored response.
	#[serde(rename = "ttl_secs", deserialize_with = "deserialize_ttl")]
	pub ttl: Duration,
	/// Serves expired entries when the upstream call fails.
	pub stale_if_error: bool,
}
impl CacheOptions {
	const DEFAULT_TTL: Duration = Duration::minutes(5);

	/// Overrides the TTL; negative values are clamped to zero.
	pub fn ttl(mut self, ttl: Duration) -> Self {
		self.ttl = if ttl.is_negative() { Duration::ZERO } else { ttl };

		self
	}

	/// Toggles serving expired entries when the upstream call fails.
	pub fn stale_if_error(mut self, enabled: bool) -> Self {
		self.stale_if_error = enabled;

		self
	}
}
impl Default for CacheOptions {
	fn default() -> Self {
		Self { ttl: Self::DEFAULT_TTL, stale_if_error: true }
	}
}

/// In-process [`ResponseCacheStore`].
///
/// Once `capacity` entries are stored, inserting a new key evicts the oldest entry.
#[derive(Debug)]
pub struct MemoryResponseCache {
	capacity: usize,
	entries: RwLock<HashMap<String, CachedResponse>>,
}
impl MemoryResponseCache {
	const DEFAULT_CAPACITY: usize = 1_024;

	/// Creates an empty cache holding up to 1024 entries.
	pub fn new() -> Self {
		Self { capacity: Self::DEFAULT_CAPACITY, entries: Default::default() }
	}

	/// Overrides the maximum number of stored entries (at least one).
	pub fn capacity(mut self, capacity: usize) -> Self {
		self.capacity = capacity.max(1);

		self
	}

	/// Number of stored entries, fresh or stale.
	pub fn len(&self) -> usize {
		self.entries.read().len()
	}

	/// Returns `true` when nothing is stored.
	pub fn is_empty(&self) -> bool {
		self.entries.read().is_empty()
	}

	/// Drops every entry.
	pub fn clear(&self) {
		self.entries.write().clear();
	}

	fn insert(&self, key: String, entry: CachedResponse) {
		let mut entries = self.entries.write();

		if !entries.contains_key(&key) && entries.len() >= self.capacity {
			let oldest = entries
				.iter()
				.min_by_key(|(_, entry)| entry.stored_at)
				.map(|(key, _)| key.clone());

			if let Some(oldest) = oldest {
				entries.remove(&oldest);
			}
		}

		entries.insert(key, entry);
	}
}
impl Default for MemoryResponseCache {
	fn default() -> Self {
		Self::new()
	}
}
impl ResponseCacheStore for MemoryResponseCache {
	fn find<'a>(&'a self, key: &'a str) -> CacheFuture<'a, Option<CachedResponse>> {
		let entry = self.entries.read().get(key).cloned();

		Box::pin(async move { Ok(entry) })
	}

	fn store(&self, key: String, entry: CachedResponse) -> CacheFuture<'_, ()> {
		self.insert(key, entry);

		Box::pin(async { Ok(()) })
	}

	fn remove<'a>(&'a self, key: &'a str) -> CacheFuture<'a, ()> {
		self.entries.write().remove(key);

		Box::pin(async { Ok(()) })
	}
}

fn deserialize_ttl<'de, D>(deserializer: D) -> std::result::Result<Duration, D::Error>
where
	D: serde::Deserializer<'de>,
{
	let secs = u64::deserialize(deserializer)?;

	Duration::try_from(StdDuration::from_secs(secs)).map_err(serde::de::Error::custom)
}
