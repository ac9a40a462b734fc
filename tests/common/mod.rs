#![allow(dead_code)]

// std
use std::{
	sync::{
		Arc,
		atomic::{AtomicUsize, Ordering},
	},
	time::Duration as StdDuration,
};
// crates.io
use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use serde_json::{Value, json};
use time::{Duration, OffsetDateTime};
// self
use courier::{
	auth::ClientCredentials,
	error::Result,
	http::{HttpRequest, HttpResponse, HttpTransport, TransportFuture},
	store::{SecretStore, StaticSecretStore},
};

type Responder = Box<dyn Fn(usize, &HttpRequest) -> Result<HttpResponse> + Send + Sync>;

/// In-process transport that answers after a fixed delay and counts every call.
pub struct ScriptedTransport {
	calls: AtomicUsize,
	delay: StdDuration,
	responder: Responder,
}
impl ScriptedTransport {
	pub fn new<F>(delay: StdDuration, responder: F) -> Arc<Self>
	where
		F: 'static + Send + Sync + Fn(usize, &HttpRequest) -> Result<HttpResponse>,
	{
		Arc::new(Self { calls: AtomicUsize::new(0), delay, responder: Box::new(responder) })
	}

	/// Transport answering every call with `200` and `body`.
	pub fn ok(delay: StdDuration, body: &'static str) -> Arc<Self> {
		Self::new(delay, move |_, _| Ok(HttpResponse::new(200, body)))
	}

	pub fn calls(&self) -> usize {
		self.calls.load(Ordering::SeqCst)
	}
}
impl HttpTransport for ScriptedTransport {
	fn send(&self, request: HttpRequest) -> TransportFuture<'_> {
		let call = self.calls.fetch_add(1, Ordering::SeqCst);
		let result = (self.responder)(call, &request);
		let delay = self.delay;

		Box::pin(async move {
			tokio::time::sleep(delay).await;

			result
		})
	}
}

/// Builds an unsigned compact JWT around `payload`.
pub fn mint_jwt(payload: Value) -> String {
	let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
	let body = URL_SAFE_NO_PAD.encode(payload.to_string());

	format!("{header}.{body}.signature")
}

/// JWT whose `exp` lies `secs` seconds from now.
pub fn jwt_expiring_in(secs: i64) -> String {
	let exp = (OffsetDateTime::now_utc() + Duration::seconds(secs)).unix_timestamp();

	mint_jwt(json!({ "sub": "service", "exp": exp }))
}

pub fn static_store(client_id: &str, client_secret: &str) -> Arc<dyn SecretStore> {
	Arc::new(StaticSecretStore::new(ClientCredentials::new(client_id, client_secret)))
}
