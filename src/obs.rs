//! Optional observability helpers.
//!
//! # Feature Flags
//!
//! - Enable `tracing` (on by default) to emit structured spans named `courier.op` with the `op`
//!   and `stage` fields, plus request/response/retry events from the HTTP client.
//! - Enable `metrics` to increment the `courier_op_total` counter for every
//!   attempt/success/failure/join/reuse, labeled by `op` + `outcome`.

mod metrics;
mod tracing;

pub use metrics::*;
pub use tracing::*;

// self
use crate::_prelude::*;

/// Operations observed by the crate.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum OpKind {
	/// Single-flight request coalescing.
	CoalescedSend,
	/// Cached token acquisition.
	Token,
	/// HTTP client call (including retries).
	Http,
}
impl OpKind {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			OpKind::CoalescedSend => "coalesced_send",
			OpKind::Token => "token",
			OpKind::Http => "http",
		}
	}
}
impl Display for OpKind {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Outcome labels recorded for each operation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum OpOutcome {
	/// Entry to an operation.
	Attempt,
	/// Caller attached to work that was already in flight.
	Joined,
	/// Caller was served from a cached value.
	Reused,
	/// Successful completion.
	Success,
	/// Failure propagated back to the caller.
	Failure,
}
impl OpOutcome {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			OpOutcome::Attempt => "attempt",
			OpOutcome::Joined => "joined",
			OpOutcome::Reused => "reused",
			OpOutcome::Success => "success",
			OpOutcome::Failure => "failure",
		}
	}
}
impl Display for OpOutcome {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}
