//! Deterministic request fingerprints used by the coalescer and the response cache.

// crates.io
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
// self
use crate::{auth::claims, http::HttpRequest};

/// Prefix used when a request carries no `Authorization` header.
pub const SHARED_PREFIX: &str = "shared";

/// Derives the cache key `{principal}/{base}{url}{query}{body-hash}` for `request`.
///
/// - The principal is the `canonical_id` claim of the bearer token. A token that cannot be
///   decoded gets a random UUID so unrelated callers never share entries, and requests without
///   an `Authorization` header share the [`SHARED_PREFIX`] bucket.
/// - Query parameters serialize as a JSON object in insertion order; they are not sorted, so
///   the same parameters in a different order produce a different key.
/// - The body contributes a SHA-256 hex digest only when present.
/// - The HTTP method does not participate.
pub fn cache_key(request: &HttpRequest) -> String {
	let prefix = principal_prefix(request);
	let url = request.full_url();
	let query = serialize_query(&request.query);
	let body_hash = request
		.body
		.as_ref()
		.map(|body| format!("{:x}", Sha256::digest(body)))
		.unwrap_or_default();

	format!("{prefix}/{url}{query}{body_hash}")
}

fn principal_prefix(request: &HttpRequest) -> String {
	let Some(authorization) = request.header("authorization") else {
		return SHARED_PREFIX.into();
	};
	let token = authorization.strip_prefix("Bearer ").unwrap_or(authorization);

	claims::principal_of(token).unwrap_or_else(|| uuid::Uuid::new_v4().to_string())
}

// `preserve_order` keeps parameters in insertion order; a repeated name keeps its first
// position and its last value.
fn serialize_query(query: &[(String, String)]) -> String {
	if query.is_empty() {
		return String::new();
	}

	let params = query
		.iter()
		.map(|(name, value)| (name.clone(), Value::String(value.clone())))
		.collect::<Map<_, _>>();

	Value::Object(params).to_string()
}
