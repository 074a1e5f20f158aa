//! Optional observability helpers for the cache and upstream sources.
//!
//! # Feature Flags
//!
//! - Enable `tracing` (on by default) to run refreshes inside spans named `bearer_broker.refresh`
//!   with `source`, `stage`, `identity`, and `scope` fields, and to emit debug/warn events for
//!   cache decisions.
//! - Enable `metrics` to increment the `bearer_broker_cache_total` counter for every cache
//!   decision, labeled by `source` + `outcome`.

mod metrics;
mod tracing;

pub use metrics::*;
pub use tracing::*;

// self
use crate::_prelude::*;

/// Upstream credential flows known to the crate.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SourceKind {
	/// Instance metadata server.
	Metadata,
	/// Service-account key exchanged through a signed JWT assertion.
	Jwt,
	/// Federated identity exchanged at a security token service.
	Federated,
	/// Service-account impersonation layered on another source.
	Impersonated,
	/// Embedder-provided retriever.
	Custom,
}
impl SourceKind {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			SourceKind::Metadata => "metadata",
			SourceKind::Jwt => "jwt",
			SourceKind::Federated => "federated",
			SourceKind::Impersonated => "impersonated",
			SourceKind::Custom => "custom",
		}
	}
}
impl Display for SourceKind {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Outcome labels recorded for each cache decision.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CacheOutcome {
	/// Served from the cached token.
	Hit,
	/// Waited on another caller's refresh.
	Wait,
	/// Started an upstream refresh.
	Refresh,
	/// Upstream refresh produced a token.
	Success,
	/// Upstream refresh failed.
	Failure,
	/// Caller's context ended first.
	Cancelled,
}
impl CacheOutcome {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			CacheOutcome::Hit => "hit",
			CacheOutcome::Wait => "wait",
			CacheOutcome::Refresh => "refresh",
			CacheOutcome::Success => "success",
			CacheOutcome::Failure => "failure",
			CacheOutcome::Cancelled => "cancelled",
		}
	}
}
impl Display for CacheOutcome {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}
