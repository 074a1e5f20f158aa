//! Upstream acquisition contract consumed by the token cache.

// self
use crate::{
	_prelude::*,
	auth::{AccessToken, IdentityKey, ScopeSet},
	context::RequestContext,
	obs::SourceKind,
};

/// Boxed future returned by [`TokenRetriever::fetch_token`].
pub type RetrieverFuture<'a> = Pin<Box<dyn Future<Output = Result<AccessToken>> + 'a + Send>>;

/// Performs one upstream token acquisition for a configured credential source.
///
/// The cache never branches on the concrete source; it only partitions by
/// [`identity_key`](TokenRetriever::identity_key) and asks for a token when the cached one is
/// missing or about to expire. Implementations should honor `ctx` for their own I/O, although the
/// cache also races every call against it.
pub trait TokenRetriever
where
	Self: Send + Sync,
{
	/// Stable key partitioning the cache; must not change for the life of the retriever.
	fn identity_key(&self) -> &IdentityKey;

	/// Acquires a fresh token covering `scopes`.
	fn fetch_token<'a>(
		&'a self,
		ctx: &'a RequestContext,
		scopes: &'a ScopeSet,
	) -> RetrieverFuture<'a>;

	/// Label used in spans and metrics.
	fn kind(&self) -> SourceKind {
		SourceKind::Custom
	}
}
impl<T> TokenRetriever for Arc<T>
where
	T: ?Sized + TokenRetriever,
{
	fn identity_key(&self) -> &IdentityKey {
		(**self).identity_key()
	}

	fn fetch_token<'a>(
		&'a self,
		ctx: &'a RequestContext,
		scopes: &'a ScopeSet,
	) -> RetrieverFuture<'a> {
		(**self).fetch_token(ctx, scopes)
	}

	fn kind(&self) -> SourceKind {
		(**self).kind()
	}
}
