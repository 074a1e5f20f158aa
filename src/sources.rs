//! Built-in [`TokenRetriever`] implementations.
//!
//! Every source performs exactly one upstream acquisition per call and never caches; caching and
//! single-flight are the job of [`TokenCache`](crate::cache::TokenCache).

pub mod federated;
pub mod impersonated;
pub mod jwt;
pub mod metadata;

mod common;

pub use common::CLOUD_PLATFORM_SCOPE;
pub use federated::{FederatedSettings, FederatedSource};
pub use impersonated::ImpersonatedSource;
pub use jwt::{JwtSource, ServiceAccountKey};
pub use metadata::MetadataSource;

// self
use crate::{
	_prelude::*,
	auth::{AccessToken, IdentityKey, ScopeSet},
	context::RequestContext,
	obs::SourceKind,
	retriever::{RetrieverFuture, TokenRetriever},
};

/// Adapts an async closure into a [`TokenRetriever`].
///
/// The closure receives owned copies of the context and scope set, so it can move them into the
/// future it returns.
pub struct FnRetriever<F> {
	identity: IdentityKey,
	fetch: F,
}
impl<F, Fut> FnRetriever<F>
where
	F: Send + Sync + Fn(RequestContext, ScopeSet) -> Fut,
	Fut: 'static + Send + Future<Output = Result<AccessToken>>,
{
	/// Wraps `fetch` under the provided identity.
	pub fn new(identity: IdentityKey, fetch: F) -> Self {
		Self { identity, fetch }
	}
}
impl<F, Fut> TokenRetriever for FnRetriever<F>
where
	F: Send + Sync + Fn(RequestContext, ScopeSet) -> Fut,
	Fut: 'static + Send + Future<Output = Result<AccessToken>>,
{
	fn identity_key(&self) -> &IdentityKey {
		&self.identity
	}

	fn fetch_token<'a>(
		&'a self,
		ctx: &'a RequestContext,
		scopes: &'a ScopeSet,
	) -> RetrieverFuture<'a> {
		Box::pin((self.fetch)(ctx.clone(), scopes.clone()))
	}

	fn kind(&self) -> SourceKind {
		SourceKind::Custom
	}
}
impl<F> Debug for FnRetriever<F> {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("FnRetriever").field("identity", &self.identity).finish()
	}
}
