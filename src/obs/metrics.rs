// self
use crate::obs::{CacheOutcome, SourceKind};

/// Records a cache outcome via the global metrics recorder (when enabled).
pub fn record_cache_outcome(kind: SourceKind, outcome: CacheOutcome) {
	#[cfg(feature = "metrics")]
	{
		metrics::counter!(
			"bearer_broker_cache_total",
			"source" => kind.as_str(),
			"outcome" => outcome.as_str()
		)
		.increment(1);
	}

	#[cfg(not(feature = "metrics"))]
	{
		let _ = (kind, outcome);
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn record_cache_outcome_without_recorder() {
		record_cache_outcome(SourceKind::Federated, CacheOutcome::Failure);
	}
}
