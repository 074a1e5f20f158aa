//! Per-call request context carrying cancellation and deadline state.
//!
//! The cache races every wait and every upstream call against [`RequestContext::done`], so a
//! caller whose context ends returns promptly with [`Error::Cancelled`] instead of blocking on
//! another caller's refresh.

// std
use std::time::Duration as StdDuration;
// crates.io
use tokio::time::{self as tokio_time, Instant};
use tokio_util::sync::CancellationToken;
// self
use crate::{_prelude::*, error::Cancellation};

/// Cancellation and deadline state for one call into the cache.
#[derive(Clone, Debug, Default)]
pub struct RequestContext {
	cancellation: Option<CancellationToken>,
	deadline: Option<Instant>,
}
impl RequestContext {
	/// Context that never cancels and has no deadline.
	pub fn background() -> Self {
		Self::default()
	}

	/// Attaches a cancellation token; cancelling it ends every wait tied to this context.
	pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
		self.cancellation = Some(token);

		self
	}

	/// Sets an absolute deadline, keeping an earlier one if already present.
	pub fn with_deadline(mut self, deadline: Instant) -> Self {
		self.deadline = Some(match self.deadline {
			Some(current) if current < deadline => current,
			_ => deadline,
		});

		self
	}

	/// Sets a deadline `timeout` from now, keeping an earlier one if already present.
	pub fn with_timeout(self, timeout: StdDuration) -> Self {
		self.with_deadline(Instant::now() + timeout)
	}

	/// Returns the configured deadline, if any.
	pub fn deadline(&self) -> Option<Instant> {
		self.deadline
	}

	/// Returns the reason this context has already ended, if it has.
	pub fn error(&self) -> Option<Cancellation> {
		if self.cancellation.as_ref().is_some_and(CancellationToken::is_cancelled) {
			return Some(Cancellation::Cancelled);
		}
		if self.deadline.is_some_and(|deadline| deadline <= Instant::now()) {
			return Some(Cancellation::DeadlineExceeded);
		}

		None
	}

	/// Resolves once the context ends; pends forever for [`RequestContext::background`].
	pub async fn done(&self) -> Cancellation {
		match (&self.cancellation, self.deadline) {
			(Some(token), Some(deadline)) => tokio::select! {
				_ = token.cancelled() => Cancellation::Cancelled,
				_ = tokio_time::sleep_until(deadline) => Cancellation::DeadlineExceeded,
			},
			(Some(token), None) => {
				token.cancelled().await;

				Cancellation::Cancelled
			},
			(None, Some(deadline)) => {
				tokio_time::sleep_until(deadline).await;

				Cancellation::DeadlineExceeded
			},
			(None, None) => std::future::pending().await,
		}
	}

	/// Drives `fut` to completion unless the context ends first.
	pub async fn run<T, F>(&self, fut: F) -> Result<T>
	where
		F: Future<Output = Result<T>>,
	{
		if let Some(reason) = self.error() {
			return Err(reason.into());
		}

		tokio::select! {
			biased;

			reason = self.done() => Err(reason.into()),
			result = fut => result,
		}
	}
}
