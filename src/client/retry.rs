//! Retry policy applied by [`HttpClient`](crate::client::HttpClient) around each upstream call.

// std
use std::time::Duration as StdDuration;
// crates.io
use rand::Rng;
// self
use crate::{
	_prelude::*,
	obs::{self, HttpEvent},
};

/// Exponential backoff with jitter.
///
/// Transport failures and 408/429/5xx responses are retried for every method, including `POST`.
/// A `Retry-After` hint replaces the computed delay when present; both are capped at
/// `max_delay`.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
	/// Attempts made after the first one.
	pub max_retries: u32,
	/// Delay before the first retry; doubled on every further attempt.
	#[serde(rename = "base_delay_ms", deserialize_with = "deserialize_millis")]
	pub base_delay: StdDuration,
	/// Upper bound for any single delay.
	#[serde(rename = "max_delay_ms", deserialize_with = "deserialize_millis")]
	pub max_delay: StdDuration,
	/// Honors upstream `Retry-After` hints.
	pub respect_retry_after: bool,
}
impl RetryPolicy {
	const DEFAULT_BASE_DELAY: StdDuration = StdDuration::from_millis(100);
	const DEFAULT_MAX_DELAY: StdDuration = StdDuration::from_secs(30);
	const DEFAULT_MAX_RETRIES: u32 = 3;

	/// Sets the number of retries.
	pub fn max_retries(mut self, max_retries: u32) -> Self {
		self.max_retries = max_retries;

		self
	}

	/// Sets the first backoff delay.
	pub fn base_delay(mut self, delay: StdDuration) -> Self {
		self.base_delay = delay;

		self
	}

	/// Sets the delay cap.
	pub fn max_delay(mut self, delay: StdDuration) -> Self {
		self.max_delay = delay;

		self
	}

	/// Toggles `Retry-After` handling.
	pub fn respect_retry_after(mut self, enabled: bool) -> Self {
		self.respect_retry_after = enabled;

		self
	}

	/// Returns `true` when `error` may be retried after `attempt` retries were already made.
	pub fn should_retry(&self, attempt: u32, error: &Error) -> bool {
		attempt < self.max_retries && error.is_retryable()
	}

	/// Delay before retry number `attempt` (zero based).
	pub fn delay_for(&self, attempt: u32, error: &Error) -> StdDuration {
		let hinted = match error {
			Error::Upstream(upstream) if self.respect_retry_after => upstream
				.retry_after()
				.and_then(|hint| StdDuration::try_from(hint).ok()),
			_ => None,
		};
		let delay = hinted.unwrap_or_else(|| self.backoff(attempt));

		delay.min(self.max_delay)
	}

	/// Runs `op` until it succeeds, fails with a non-retryable error, or retries run out.
	pub(crate) async fn run<F, Fut, T>(&self, event: HttpEvent<'_>, mut op: F) -> Result<T>
	where
		F: FnMut() -> Fut,
		Fut: Future<Output = Result<T>>,
	{
		let mut attempt = 0;

		loop {
			let error = match op().await {
				Ok(value) => return Ok(value),
				Err(e) => e,
			};

			if !self.should_retry(attempt, &error) {
				return Err(error);
			}

			let delay = self.delay_for(attempt, &error);

			attempt += 1;

			obs::http_retry(event, attempt, delay, &error);
			tokio::time::sleep(delay).await;
		}
	}

	// Jitter keeps between half and all of the exponential step.
	fn backoff(&self, attempt: u32) -> StdDuration {
		let step = self.base_delay.saturating_mul(2_u32.saturating_pow(attempt)).min(self.max_delay);
		let factor = rand::rng().random_range(0.5..=1.0);

		step.mul_f64(factor)
	}
}
impl Default for RetryPolicy {
	fn default() -> Self {
		Self {
			max_retries: Self::DEFAULT_MAX_RETRIES,
			base_delay: Self::DEFAULT_BASE_DELAY,
			max_delay: Self::DEFAULT_MAX_DELAY,
			respect_retry_after: true,
		}
	}
}

fn deserialize_millis<'de, D>(deserializer: D) -> std::result::Result<StdDuration, D::Error>
where
	D: serde::Deserializer<'de>,
{
	u64::deserialize(deserializer).map(StdDuration::from_millis)
}

#[cfg(test)]
mod tests {
	// self
	use super::*;
	use crate::error::{TransportError, UpstreamError};

	fn upstream(status: u16, retry_after: Option<Duration>) -> Error {
		UpstreamError::Http {
			service: "api.example.com".into(),
			status,
			body_preview: String::new(),
			retry_after,
		}
		.into()
	}

	#[test]
	fn retries_stop_at_the_limit_and_on_client_errors() {
		let policy = RetryPolicy::default().max_retries(2);
		let timeout = Error::from(TransportError::Timeout { url: "https://x".into() });

		assert!(policy.should_retry(0, &timeout));
		assert!(policy.should_retry(1, &timeout));
		assert!(!policy.should_retry(2, &timeout));
		assert!(!policy.should_retry(0, &upstream(404, None)));
	}

	#[test]
	fn backoff_grows_and_is_capped() {
		let policy = RetryPolicy::default()
			.base_delay(StdDuration::from_millis(100))
			.max_delay(StdDuration::from_millis(250));
		let error = upstream(503, None);
		let first = policy.delay_for(0, &error);
		let third = policy.delay_for(2, &error);

		assert!(first >= StdDuration::from_millis(50) && first <= StdDuration::from_millis(100));
		assert!(third >= StdDuration::from_millis(125) && third <= StdDuration::from_millis(250));
	}

	#[test]
	fn retry_after_overrides_backoff() {
		let policy = RetryPolicy::default();

		assert_eq!(
			policy.delay_for(0, &upstream(429, Some(Duration::seconds(2)))),
			StdDuration::from_secs(2)
		);
		assert!(
			policy.respect_retry_after(false).delay_for(0, &upstream(429, Some(Duration::seconds(2))))
				<= StdDuration::from_millis(100)
		);
	}

	#[test]
	fn policy_deserializes_from_partial_config() {
		let policy: RetryPolicy = serde_json::from_str(r#"{"max_retries":5,"base_delay_ms":20}"#)
			.expect("Retry policy should deserialize.");

		assert_eq!(policy.max_retries, 5);
		assert_eq!(policy.base_delay, StdDuration::from_millis(20));
		assert_eq!(policy.max_delay, StdDuration::from_secs(30));
	}
}
