//! Single-flight request coalescing.
//!
//! [`RequestCoalescer`] wraps an [`HttpTransport`] and guarantees that at most one request per
//! cache key is in flight at any instant. Concurrent callers that derive the same key attach to
//! the shared future of the first caller and observe the same response or the same error. Once
//! that future settles, its registry entry is removed, so the next call for the key performs a
//! fresh request: this is concurrency de-duplication, not a time-based cache.
//!
//! The registry only holds weak handles. If every caller awaiting an entry goes away before it
//! settles, the underlying request is dropped and its entry is released with it. A request
//! that never settles while someone is still waiting keeps its entry (and starves later
//! same-key callers) until it does; deadlines belong to the wrapped transport.

pub mod key;

pub use key::*;

// std
use std::sync::{
	Weak,
	atomic::{AtomicU64, Ordering},
};
// crates.io
use futures::{
	FutureExt,
	future::{BoxFuture, Shared, WeakShared},
};
// self
use crate::{
	_prelude::*,
	http::{HttpRequest, HttpResponse, HttpTransport, TransportFuture},
	obs::{self, OpKind, OpOutcome, OpSpan},
};

type Flight = Shared<BoxFuture<'static, Result<HttpResponse>>>;
type Registry = Arc<Mutex<HashMap<String, Pending>>>;

/// Derives the coalescing key of an outgoing request.
///
/// Implementations must be deterministic and pure over the request's cache-relevant fields.
pub trait RequestKeyProvider
where
	Self: 'static + Send + Sync,
{
	/// Returns the key identifying "the same request".
	fn request_key(&self, request: &HttpRequest) -> String;
}
impl<F> RequestKeyProvider for F
where
	F: 'static + Send + Sync + Fn(&HttpRequest) -> String,
{
	fn request_key(&self, request: &HttpRequest) -> String {
		self(request)
	}
}

/// Key provider built on [`cache_key`].
#[derive(Clone, Copy, Debug, Default)]
pub struct DefaultKeyProvider;
impl RequestKeyProvider for DefaultKeyProvider {
	fn request_key(&self, request: &HttpRequest) -> String {
		cache_key(request)
	}
}

/// Transport adapter that collapses concurrent identical requests into one upstream call.
pub struct RequestCoalescer<T, K = DefaultKeyProvider>
where
	T: ?Sized + HttpTransport,
	K: RequestKeyProvider,
{
	transport: Arc<T>,
	key_provider: K,
	registry: Registry,
	next_id: AtomicU64,
}
impl<T> RequestCoalescer<T>
where
	T: ?Sized + HttpTransport,
{
	/// Wraps `transport`, keying requests with [`cache_key`].
	pub fn new(transport: impl Into<Arc<T>>) -> Self {
		Self::with_key_provider(transport, DefaultKeyProvider)
	}
}
impl<T, K> RequestCoalescer<T, K>
where
	T: ?Sized + HttpTransport,
	K: RequestKeyProvider,
{
	/// Wraps `transport`, keying requests with `key_provider`.
	pub fn with_key_provider(transport: impl Into<Arc<T>>, key_provider: K) -> Self {
		Self {
			transport: transport.into(),
			key_provider,
			registry: Default::default(),
			next_id: AtomicU64::new(0),
		}
	}

	/// Sends `request`, sharing the outcome with every concurrent caller of the same key.
	///
	/// The returned future owns everything it needs, so it may outlive `self`.
	pub fn send(
		&self,
		request: HttpRequest,
	) -> impl Future<Output = Result<HttpResponse>> + Send + use<T, K> {
		let key = self.key_provider.request_key(&request);
		let (flight, joined) = self.join_or_start(key, request);
		let span = OpSpan::new(OpKind::CoalescedSend, if joined { "join" } else { "lead" });

		obs::record_op_outcome(
			OpKind::CoalescedSend,
			if joined { OpOutcome::Joined } else { OpOutcome::Attempt },
		);

		span.instrument(async move {
			let result = flight.await;

			if !joined {
				obs::record_result(OpKind::CoalescedSend, &result);
			}

			result
		})
	}

	/// Number of keys with a request currently in flight.
	pub fn in_flight(&self) -> usize {
		// Upgraded handles are dropped only after the lock is released.
		let live = self.registry.lock().values().filter_map(Pending::upgrade).collect::<Vec<_>>();

		live.len()
	}

	/// Returns the wrapped transport.
	pub fn transport(&self) -> &Arc<T> {
		&self.transport
	}

	// Lookup and registration happen under one lock with no suspension point in between, so
	// two callers can never both observe "absent" for the same key. The returned `Shared` must
	// leave the critical section alive: dropping the last strong handle here would run the
	// entry guard while the lock is held.
	fn join_or_start(&self, key: String, request: HttpRequest) -> (Flight, bool) {
		let mut registry = self.registry.lock();

		if let Some(flight) = registry.get(&key).and_then(Pending::upgrade) {
			return (flight, true);
		}

		let id = self.next_id.fetch_add(1, Ordering::Relaxed);
		let guard = EntryGuard { registry: Arc::downgrade(&self.registry), key: key.clone(), id };
		let transport = self.transport.clone();
		let flight = async move {
			let _guard = guard;

			transport.send(request).await
		}
		.boxed()
		.shared();

		if let Some(weak) = flight.downgrade() {
			registry.insert(key, Pending { id, flight: weak });
		}

		(flight, false)
	}
}
impl<T, K> HttpTransport for RequestCoalescer<T, K>
where
	T: ?Sized + HttpTransport,
	K: RequestKeyProvider,
{
	fn send(&self, request: HttpRequest) -> TransportFuture<'_> {
		Box::pin(RequestCoalescer::send(self, request))
	}
}
impl<T, K> Debug for RequestCoalescer<T, K>
where
	T: ?Sized + HttpTransport,
	K: RequestKeyProvider,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("RequestCoalescer").field("in_flight", &self.in_flight()).finish()
	}
}

struct Pending {
	id: u64,
	flight: WeakShared<BoxFuture<'static, Result<HttpResponse>>>,
}
impl Pending {
	fn upgrade(&self) -> Option<Flight> {
		self.flight.upgrade()
	}
}

// Dropped when the in-flight future completes, fails, panics, or is abandoned by every
// awaiter; removes the registry entry unless a newer request already replaced it.
struct EntryGuard {
	registry: Weak<Mutex<HashMap<String, Pending>>>,
	key: String,
	id: u64,
}
impl Drop for EntryGuard {
	fn drop(&mut self) {
		let Some(registry) = self.registry.upgrade() else {
			return;
		};
		let mut registry = registry.lock();

		if registry.get(&self.key).is_some_and(|pending| pending.id == self.id) {
			registry.remove(&self.key);
		}
	}
}
