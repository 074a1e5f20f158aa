//! Concurrent token cache keyed by credential identity and scope key.
//!
//! The index is two levels deep (identity, then scope key). Both levels only take their locks
//! for a lookup or an insert; all waiting happens inside the per-entry coordinator, so callers
//! for unrelated keys never contend.

mod entry;
mod metrics;

pub use metrics::CacheMetrics;

// self
use crate::{
	_prelude::*,
	auth::{IdentityKey, ScopeKey, ScopeSet},
	cache::entry::ScopeEntry,
	clock::{Clock, SystemClock},
	context::RequestContext,
	error::ConfigError,
	retriever::TokenRetriever,
};

type IdentityBucket = RwLock<HashMap<ScopeKey, Arc<ScopeEntry>>>;

/// Time source and margin applied to every expiry check.
pub(crate) struct CachePolicy {
	clock: Arc<dyn Clock>,
	pub(crate) safety_margin: Duration,
}
impl CachePolicy {
	pub(crate) fn now(&self) -> OffsetDateTime {
		self.clock.now()
	}
}

/// Shared cache handing out bearer tokens with single-flight refresh.
///
/// Construct one per process (or per plugin instance) and share it behind an `Arc`. Entries are
/// created on first use and live as long as the cache.
pub struct TokenCache {
	identities: RwLock<HashMap<IdentityKey, Arc<IdentityBucket>>>,
	policy: CachePolicy,
	metrics: Arc<CacheMetrics>,
}
impl TokenCache {
	/// Default minimum remaining validity for a cached token to be handed out.
	pub const DEFAULT_SAFETY_MARGIN: Duration = Duration::seconds(10);

	/// Creates a cache using the system clock and the default safety margin.
	pub fn new() -> Self {
		Self::builder().build()
	}

	/// Returns a builder for tuning the clock and safety margin.
	pub fn builder() -> TokenCacheBuilder {
		TokenCacheBuilder::default()
	}

	/// Returns a bearer token for `retriever` covering `scopes`.
	///
	/// Scopes are normalized first; malformed entries fail with [`Error::Config`] before any
	/// lock is taken.
	pub async fn access_token<I, S>(
		&self,
		ctx: &RequestContext,
		retriever: &Arc<dyn TokenRetriever>,
		scopes: I,
	) -> Result<String>
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		let scopes = ScopeSet::new(scopes).map_err(ConfigError::from)?;

		self.access_token_for(ctx, retriever, &scopes).await
	}

	/// Same as [`TokenCache::access_token`] for an already normalized scope set.
	pub async fn access_token_for(
		&self,
		ctx: &RequestContext,
		retriever: &Arc<dyn TokenRetriever>,
		scopes: &ScopeSet,
	) -> Result<String> {
		let entry = self.entry(retriever, scopes);

		entry.access_token(ctx, &self.policy, &self.metrics).await
	}

	/// Shared counters for cache decisions.
	pub fn metrics(&self) -> Arc<CacheMetrics> {
		self.metrics.clone()
	}

	/// Number of (identity, scope key) entries created so far.
	pub fn len(&self) -> usize {
		self.identities.read().values().map(|bucket| bucket.read().len()).sum()
	}

	/// Returns `true` when no entry has been created yet.
	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	/// Configured safety margin.
	pub fn safety_margin(&self) -> Duration {
		self.policy.safety_margin
	}

	fn entry(&self, retriever: &Arc<dyn TokenRetriever>, scopes: &ScopeSet) -> Arc<ScopeEntry> {
		let bucket = self.bucket(retriever.identity_key());
		let key = scopes.key();

		if let Some(entry) = bucket.read().get(&key) {
			return entry.clone();
		}

		let mut entries = bucket.write();

		entries
			.entry(key)
			.or_insert_with_key(|key| {
				Arc::new(ScopeEntry::new(retriever.clone(), key.clone(), scopes.clone()))
			})
			.clone()
	}

	fn bucket(&self, identity: &IdentityKey) -> Arc<IdentityBucket> {
		if let Some(bucket) = self.identities.read().get(identity) {
			return bucket.clone();
		}

		let mut identities = self.identities.write();

		identities.entry(identity.clone()).or_default().clone()
	}
}
impl Default for TokenCache {
	fn default() -> Self {
		Self::new()
	}
}
impl Debug for TokenCache {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("TokenCache")
			.field("entries", &self.len())
			.field("safety_margin", &self.policy.safety_margin)
			.finish()
	}
}

/// Builder for [`TokenCache`].
#[derive(Default)]
pub struct TokenCacheBuilder {
	clock: Option<Arc<dyn Clock>>,
	safety_margin: Option<Duration>,
}
impl TokenCacheBuilder {
	/// Overrides the time source (defaults to [`SystemClock`]).
	pub fn clock(mut self, clock: impl 'static + Clock) -> Self {
		self.clock = Some(Arc::new(clock));

		self
	}

	/// Overrides the safety margin; negative values clamp to zero.
	pub fn safety_margin(mut self, margin: Duration) -> Self {
		self.safety_margin = Some(if margin.is_negative() { Duration::ZERO } else { margin });

		self
	}

	/// Builds the cache.
	pub fn build(self) -> TokenCache {
		TokenCache {
			identities: RwLock::new(HashMap::new()),
			policy: CachePolicy {
				clock: self.clock.unwrap_or_else(|| Arc::new(SystemClock)),
				safety_margin: self.safety_margin.unwrap_or(TokenCache::DEFAULT_SAFETY_MARGIN),
			},
			metrics: Arc::new(CacheMetrics::default()),
		}
	}
}
impl Debug for TokenCacheBuilder {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("TokenCacheBuilder")
			.field("custom_clock", &self.clock.is_some())
			.field("safety_margin", &self.safety_margin)
			.finish()
	}
}
