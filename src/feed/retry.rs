//! Retry budgeting for feed fetches.

// self
use crate::{_prelude::*, config::RetryPolicy};

/// Tracks consumed retries and the overall deadline of one fetch sequence.
#[derive(Debug)]
pub struct RetryExecutor<'a> {
	policy: &'a RetryPolicy,
	deadline: Instant,
	retries_used: u32,
}
impl<'a> RetryExecutor<'a> {
	/// Start a fetch sequence under the supplied policy.
	pub fn new(policy: &'a RetryPolicy) -> Self {
		Self { policy, deadline: Instant::now() + policy.deadline, retries_used: 0 }
	}

	/// Timeout for the next attempt, or `None` once the deadline has passed.
	pub fn attempt_timeout(&self) -> Option<Duration> {
		let timeout = self.remaining_budget().min(self.policy.attempt_timeout);

		(!timeout.is_zero()).then_some(timeout)
	}

	/// Remaining wall-clock budget for the sequence.
	pub fn remaining_budget(&self) -> Duration {
		self.deadline.saturating_duration_since(Instant::now())
	}

	/// Number of retries consumed so far.
	pub fn retries_used(&self) -> u32 {
		self.retries_used
	}

	/// Consume a retry and return the delay to wait before it, or `None` when exhausted.
	pub fn next_backoff(&mut self) -> Option<Duration> {
		if self.retries_used >= self.policy.max_retries {
			return None;
		}

		let attempt = self.retries_used;

		self.retries_used += 1;

		let delay = self.policy.compute_backoff(attempt).min(self.remaining_budget());

		tracing::debug!(retry = self.retries_used, ?delay, "feed fetch retry scheduled");

		Some(delay)
	}
}
