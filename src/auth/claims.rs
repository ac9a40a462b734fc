//! Narrow view over JWT payload claims.
//!
//! Signatures are not verified: the view only exists to decide whether a cached token is
//! still worth sending and to fingerprint the calling principal. Anything that fails to decode
//! is treated as "no claims", never as a panic.

// crates.io
use jsonwebtoken::{DecodingKey, Validation};
use serde_json::Value;
// self
use crate::_prelude::*;

/// Claim-name suffix that identifies the calling principal (for example
/// `https://claims.example.com/canonical_id`).
pub const PRINCIPAL_CLAIM: &str = "canonical_id";

/// Typed subset of JWT claims used by the crate.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TokenClaims {
	/// Decoded `exp` claim.
	pub expires_at: Option<OffsetDateTime>,
	/// Principal identifier taken from the `canonical_id` claim.
	pub principal: Option<String>,
}
impl TokenClaims {
	/// Decodes the payload of a compact JWT without checking its signature or expiry.
	///
	/// Returns `None` unless the header names a known algorithm and the payload is a JSON
	/// object.
	pub fn decode(token: &str) -> Option<Self> {
		let data = jsonwebtoken::decode::<RawClaims>(
			token.trim(),
			&DecodingKey::from_secret(&[]),
			&unverified(),
		)
		.ok()?;
		let RawClaims { exp, rest } = data.claims;
		let expires_at = exp
			.and_then(|exp| exp.as_i64().or_else(|| exp.as_f64().map(|secs| secs as i64)))
			.and_then(|secs| OffsetDateTime::from_unix_timestamp(secs).ok());
		let principal = rest
			.into_iter()
			.find(|(name, _)| is_principal_claim(name))
			.and_then(|(_, value)| match value {
				Value::String(principal) if !principal.is_empty() => Some(principal),
				_ => None,
			});

		Some(Self { expires_at, principal })
	}

	/// Returns `true` if the token stays valid for longer than `margin` after `now`.
	///
	/// Expiries too close to the representable range to subtract `margin` count as unusable.
	pub fn is_usable_at(&self, now: OffsetDateTime, margin: Duration) -> bool {
		self.expires_at
			.and_then(|exp| exp.checked_sub(margin))
			.is_some_and(|deadline| deadline > now)
	}
}

#[derive(Deserialize)]
struct RawClaims {
	#[serde(default)]
	exp: Option<serde_json::Number>,
	#[serde(flatten)]
	rest: HashMap<String, Value>,
}

// Signature, expiry, and audience checks belong to the issuer and the receiving service.
fn unverified() -> Validation {
	let mut validation = Validation::default();

	validation.insecure_disable_signature_validation();
	validation.validate_exp = false;
	validation.validate_aud = false;
	validation.required_spec_claims.clear();

	validation
}

/// Decodes `token` and checks its expiry against `now` and `margin`.
///
/// Undecodable tokens and tokens without an `exp` claim are never usable.
pub fn is_usable(token: &str, now: OffsetDateTime, margin: Duration) -> bool {
	TokenClaims::decode(token).is_some_and(|claims| claims.is_usable_at(now, margin))
}

/// Extracts the principal identifier from a bearer token, if it carries one.
pub fn principal_of(token: &str) -> Option<String> {
	TokenClaims::decode(token)?.principal
}

fn is_principal_claim(name: &str) -> bool {
	name == PRINCIPAL_CLAIM
		|| name.strip_suffix(PRINCIPAL_CLAIM).is_some_and(|prefix| prefix.ends_with('/'))
}
