// self
use crate::{
	_prelude::*,
	auth::{IdentityKey, ScopeKey},
	obs::{CacheOutcome, SourceKind},
};

/// Type alias that resolves to an instrumented future when tracing is enabled.
#[cfg(feature = "tracing")]
pub type InstrumentedRefresh<F> = tracing::instrument::Instrumented<F>;
/// Passthrough future type when tracing is disabled.
#[cfg(not(feature = "tracing"))]
pub type InstrumentedRefresh<F> = F;

/// Span wrapped around one upstream refresh.
#[derive(Clone, Debug)]
pub struct RefreshSpan {
	#[cfg(feature = "tracing")]
	span: tracing::Span,
}
impl RefreshSpan {
	/// Creates a new span tagged with the source kind, stage, and cache coordinates.
	pub fn new(
		kind: SourceKind,
		stage: &'static str,
		identity: &IdentityKey,
		scope: &ScopeKey,
	) -> Self {
		#[cfg(feature = "tracing")]
		{
			let span = tracing::info_span!(
				"bearer_broker.refresh",
				source = kind.as_str(),
				stage,
				identity = %identity,
				scope = %scope,
			);

			Self { span }
		}
		#[cfg(not(feature = "tracing"))]
		{
			let _ = (kind, stage, identity, scope);

			Self {}
		}
	}

	/// Instruments an async block without holding a guard across `.await` points.
	pub fn instrument<Fut>(&self, fut: Fut) -> InstrumentedRefresh<Fut>
	where
		Fut: Future,
	{
		#[cfg(feature = "tracing")]
		{
			use tracing::Instrument;

			fut.instrument(self.span.clone())
		}
		#[cfg(not(feature = "tracing"))]
		{
			fut
		}
	}
}

/// Emits a structured event describing one cache decision.
///
/// Failures and cancellations log at `warn`/`debug` with the error attached; everything else
/// logs at `debug`.
pub fn log_cache_outcome(
	kind: SourceKind,
	outcome: CacheOutcome,
	identity: &IdentityKey,
	scope: &ScopeKey,
	error: Option<&Error>,
) {
	#[cfg(feature = "tracing")]
	{
		match (outcome, error) {
			(CacheOutcome::Failure, Some(err)) => tracing::warn!(
				source = kind.as_str(),
				outcome = outcome.as_str(),
				identity = %identity,
				scope = %scope,
				error = %err,
				"token refresh failed"
			),
			(_, Some(err)) => tracing::debug!(
				source = kind.as_str(),
				outcome = outcome.as_str(),
				identity = %identity,
				scope = %scope,
				error = %err,
				"token request ended early"
			),
			(_, None) => tracing::debug!(
				source = kind.as_str(),
				outcome = outcome.as_str(),
				identity = %identity,
				scope = %scope,
				"token cache decision"
			),
		}
	}
	#[cfg(not(feature = "tracing"))]
	{
		let _ = (kind, outcome, identity, scope, error);
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	fn coordinates() -> (IdentityKey, ScopeKey) {
		let identity = IdentityKey::new("gce_1_1__").expect("Identity fixture should be valid.");
		let scope = crate::auth::ScopeSet::new(["x"]).expect("Scope fixture should be valid.").key();

		(identity, scope)
	}

	#[test]
	fn logging_is_safe_without_subscriber() {
		let (identity, scope) = coordinates();

		log_cache_outcome(SourceKind::Custom, CacheOutcome::Hit, &identity, &scope, None);
	}

	#[tokio::test]
	async fn instrument_wraps_future() {
		let (identity, scope) = coordinates();
		let span = RefreshSpan::new(SourceKind::Metadata, "instrument_wraps_future", &identity, &scope);
		let value = span.instrument(async { 42 }).await;

		assert_eq!(value, 42);
	}
}
