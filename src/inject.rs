//! Bearer credential injection for outbound requests.

// crates.io
use oauth2::http::{HeaderValue, Request, header::AUTHORIZATION};
// self
use crate::{
	_prelude::*,
	auth::ScopeSet,
	cache::TokenCache,
	config::SourceConfig,
	context::RequestContext,
	error::{TokenResponseError, TransportError},
	retriever::TokenRetriever,
	transport::SourceTransport,
};

/// Attaches a resolved `Authorization` value to a request type without tying the crate to a
/// particular HTTP client.
pub trait RequestSigner<R, E>
where
	Self: Send + Sync,
{
	/// Returns `request` carrying `authorization`.
	fn attach_token(&self, request: R, authorization: &HeaderValue) -> Result<R, E>;
}

/// Signer that overwrites the `Authorization` header.
#[derive(Clone, Copy, Debug, Default)]
pub struct HeaderSigner;
impl<B> RequestSigner<Request<B>, Error> for HeaderSigner {
	fn attach_token(
		&self,
		mut request: Request<B>,
		authorization: &HeaderValue,
	) -> Result<Request<B>> {
		request.headers_mut().insert(AUTHORIZATION, authorization.clone());

		Ok(request)
	}
}
#[cfg(feature = "reqwest")]
impl RequestSigner<reqwest::Request, Error> for HeaderSigner {
	fn attach_token(
		&self,
		mut request: reqwest::Request,
		authorization: &HeaderValue,
	) -> Result<reqwest::Request> {
		request.headers_mut().insert(AUTHORIZATION, authorization.clone());

		Ok(request)
	}
}

/// Resolves a token through the cache for every outbound request and sets it as the bearer
/// credential. When no token can be obtained the request is never dispatched.
#[derive(Clone)]
pub struct BearerAuth {
	cache: Arc<TokenCache>,
	retriever: Arc<dyn TokenRetriever>,
	scopes: ScopeSet,
}
impl BearerAuth {
	/// Creates an injector for one retriever and scope set.
	pub fn new(
		cache: Arc<TokenCache>,
		retriever: Arc<dyn TokenRetriever>,
		scopes: ScopeSet,
	) -> Self {
		Self { cache, retriever, scopes }
	}

	/// Builds the retriever and scope set described by `config`.
	pub fn from_config(
		cache: Arc<TokenCache>,
		config: &SourceConfig,
		transport: &SourceTransport,
	) -> Result<Self> {
		Ok(Self::new(cache, config.retriever(transport)?, config.scope_set()?))
	}

	/// Scopes requested for every call.
	pub fn scopes(&self) -> &ScopeSet {
		&self.scopes
	}

	/// Returns `Bearer <token>` as a header value marked sensitive.
	pub async fn header_value(&self, ctx: &RequestContext) -> Result<HeaderValue> {
		let token = self.cache.access_token_for(ctx, &self.retriever, &self.scopes).await?;
		let mut value = HeaderValue::try_from(format!("Bearer {token}"))
			.map_err(|_| TokenResponseError::InvalidHeaderValue)?;

		value.set_sensitive(true);

		Ok(value)
	}

	/// Signs `request` with `signer`.
	pub async fn sign_with<R, S>(&self, ctx: &RequestContext, signer: &S, request: R) -> Result<R>
	where
		S: RequestSigner<R, Error>,
	{
		let value = self.header_value(ctx).await?;

		signer.attach_token(request, &value)
	}

	/// Sets the bearer credential on an [`http::Request`](oauth2::http::Request).
	pub async fn authorize<B>(
		&self,
		ctx: &RequestContext,
		request: Request<B>,
	) -> Result<Request<B>> {
		self.sign_with(ctx, &HeaderSigner, request).await
	}

	/// Sets the bearer credential on a reqwest request.
	#[cfg(feature = "reqwest")]
	pub async fn authorize_reqwest(
		&self,
		ctx: &RequestContext,
		request: reqwest::Request,
	) -> Result<reqwest::Request> {
		self.sign_with(ctx, &HeaderSigner, request).await
	}

	/// Authorizes `request` and dispatches it through `client`.
	#[cfg(feature = "reqwest")]
	pub async fn send(
		&self,
		ctx: &RequestContext,
		client: &ReqwestClient,
		request: reqwest::Request,
	) -> Result<reqwest::Response> {
		let request = self.authorize_reqwest(ctx, request).await?;

		client.execute(request).await.map_err(|e| TransportError::from(e).into())
	}
}
impl Debug for BearerAuth {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("BearerAuth")
			.field("identity", self.retriever.identity_key())
			.field("scopes", &self.scopes)
			.finish()
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;
	use crate::{
		auth::{AccessToken, IdentityKey},
		sources::FnRetriever,
	};

	fn auth(token: &'static str) -> BearerAuth {
		let identity = IdentityKey::new("custom_1_1__").expect("Identity fixture should be valid.");
		let retriever = FnRetriever::new(identity, move |_ctx, _scopes| async move {
			Ok(AccessToken::new(token, OffsetDateTime::now_utc() + Duration::hours(1)))
		});

		BearerAuth::new(Arc::new(TokenCache::new()), Arc::new(retriever), ScopeSet::default())
	}

	#[tokio::test]
	async fn header_value_is_sensitive_bearer() {
		let value = auth("ya29.x")
			.header_value(&RequestContext::background())
			.await
			.expect("Header value should resolve.");

		assert_eq!(value.to_str().expect("Header should be ASCII."), "Bearer ya29.x");
		assert!(value.is_sensitive());
	}

	#[tokio::test]
	async fn unencodable_tokens_are_rejected() {
		let err = auth("bad\ntoken")
			.header_value(&RequestContext::background())
			.await
			.expect_err("Newline in token must be rejected.");

		assert!(matches!(err, Error::InvalidToken(TokenResponseError::InvalidHeaderValue)));
	}
}
