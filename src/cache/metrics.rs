// std
use std::sync::atomic::{AtomicU64, Ordering};
// self
use crate::obs::CacheOutcome;

/// Thread-safe counters for cache decisions.
#[derive(Debug, Default)]
pub struct CacheMetrics {
	hits: AtomicU64,
	waits: AtomicU64,
	refreshes: AtomicU64,
	successes: AtomicU64,
	failures: AtomicU64,
	cancellations: AtomicU64,
}
impl CacheMetrics {
	/// Calls answered from a cached token.
	pub fn hits(&self) -> u64 {
		self.hits.load(Ordering::Relaxed)
	}

	/// Times a caller waited on another caller's refresh.
	pub fn waits(&self) -> u64 {
		self.waits.load(Ordering::Relaxed)
	}

	/// Upstream refreshes started.
	pub fn refreshes(&self) -> u64 {
		self.refreshes.load(Ordering::Relaxed)
	}

	/// Upstream refreshes that produced a usable token.
	pub fn successes(&self) -> u64 {
		self.successes.load(Ordering::Relaxed)
	}

	/// Upstream refreshes that failed.
	pub fn failures(&self) -> u64 {
		self.failures.load(Ordering::Relaxed)
	}

	/// Calls that returned early because their context ended.
	pub fn cancellations(&self) -> u64 {
		self.cancellations.load(Ordering::Relaxed)
	}

	pub(crate) fn record(&self, outcome: CacheOutcome) {
		let counter = match outcome {
			CacheOutcome::Hit => &self.hits,
			CacheOutcome::Wait => &self.waits,
			CacheOutcome::Refresh => &self.refreshes,
			CacheOutcome::Success => &self.successes,
			CacheOutcome::Failure => &self.failures,
			CacheOutcome::Cancelled => &self.cancellations,
		};

		counter.fetch_add(1, Ordering::Relaxed);
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn outcomes_land_in_their_own_counter() {
		let metrics = CacheMetrics::default();

		metrics.record(CacheOutcome::Hit);
		metrics.record(CacheOutcome::Hit);
		metrics.record(CacheOutcome::Refresh);
		metrics.record(CacheOutcome::Cancelled);

		assert_eq!(metrics.hits(), 2);
		assert_eq!(metrics.refreshes(), 1);
		assert_eq!(metrics.cancellations(), 1);
		assert_eq!(metrics.waits() + metrics.successes() + metrics.failures(), 0);
	}
}
