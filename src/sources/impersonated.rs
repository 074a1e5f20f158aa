//! Service-account impersonation layered on any other retriever.

// crates.io
use serde_json::json;
use time::format_description::well_known::Rfc3339;
// self
use crate::{
	_prelude::*,
	auth::{AccessToken, IdentityKey, ScopeSet},
	context::RequestContext,
	error::{ConfigError, TokenResponseError},
	obs::SourceKind,
	retriever::{RetrieverFuture, TokenRetriever},
	sources::common::{self, CLOUD_PLATFORM_SCOPE},
	transport::SourceTransport,
};

/// IAM credentials API used when none is configured.
pub const DEFAULT_IAM_CREDENTIALS_URL: &str = "https://iamcredentials.googleapis.com";

const TOKEN_LIFETIME: &str = "3600s";

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateAccessTokenResponse {
	access_token: String,
	expire_time: String,
}

/// Mints tokens for `target_principal` using a base token from an inner retriever.
///
/// The base token is requested with the `cloud-platform` scope and is not cached; the outer
/// cache entry holds only the impersonated token. The impersonated token is requested for the
/// caller's scopes plus `cloud-platform`. The identity key appends the target so two
/// impersonations layered on one base credential never share an entry.
pub struct ImpersonatedSource {
	identity: IdentityKey,
	base: Arc<dyn TokenRetriever>,
	base_scopes: ScopeSet,
	transport: SourceTransport,
	target_principal: String,
	delegates: Vec<String>,
	endpoint: Url,
}
impl ImpersonatedSource {
	/// Wraps `base` to impersonate `target_principal`.
	pub fn new(
		base: Arc<dyn TokenRetriever>,
		transport: SourceTransport,
		target_principal: impl Into<String>,
	) -> Result<Self> {
		let target_principal = target_principal.into();

		if target_principal.trim().is_empty() {
			return Err(ConfigError::missing("impersonated", "targetPrincipal").into());
		}

		let identity = base
			.identity_key()
			.layered("impersonated", &target_principal)
			.map_err(ConfigError::from)?;
		let base_scopes = ScopeSet::new([CLOUD_PLATFORM_SCOPE]).map_err(ConfigError::from)?;
		let endpoint = generate_token_url(DEFAULT_IAM_CREDENTIALS_URL, &target_principal)?;

		Ok(Self {
			identity,
			base,
			base_scopes,
			transport,
			target_principal,
			delegates: Vec::new(),
			endpoint,
		})
	}

	/// Sets the delegation chain (service-account emails) passed to the IAM API.
	pub fn with_delegates<I, S>(mut self, delegates: I) -> Self
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		self.delegates = delegates.into_iter().map(Into::into).collect();

		self
	}

	/// Points the source at another IAM credentials host.
	pub fn with_iam_url(mut self, iam_url: &str) -> Result<Self> {
		self.endpoint = generate_token_url(iam_url, &self.target_principal)?;

		Ok(self)
	}

	/// Full `generateAccessToken` endpoint this source posts to.
	pub fn endpoint(&self) -> &Url {
		&self.endpoint
	}

	/// Service account being impersonated.
	pub fn target_principal(&self) -> &str {
		&self.target_principal
	}

	async fn fetch(&self, ctx: &RequestContext, scopes: &ScopeSet) -> Result<AccessToken> {
		let base = self.base.fetch_token(ctx, &self.base_scopes).await?;
		let mut requested = scopes.iter().collect::<Vec<_>>();

		if !scopes.contains(CLOUD_PLATFORM_SCOPE) {
			requested.push(CLOUD_PLATFORM_SCOPE);
		}

		let body = json!({
			"scope": requested,
			"delegates": self.delegates,
			"lifetime": TOKEN_LIFETIME,
		});
		let request = common::json_request(&self.endpoint, &base.secret, &body)?;
		let response = self.transport.send(SourceKind::Impersonated, request).await?;

		if !response.status().is_success() {
			return Err(common::error_status(&response));
		}

		let parsed = common::decode_json::<GenerateAccessTokenResponse>(&response)?;

		if parsed.access_token.is_empty() {
			return Err(TokenResponseError::MissingAccessToken.into());
		}

		let expires_at = OffsetDateTime::parse(&parsed.expire_time, &Rfc3339)
			.map_err(TokenResponseError::InvalidExpireTime)?;

		Ok(AccessToken::new(parsed.access_token, expires_at))
	}
}
impl TokenRetriever for ImpersonatedSource {
	fn identity_key(&self) -> &IdentityKey {
		&self.identity
	}

	fn fetch_token<'a>(
		&'a self,
		ctx: &'a RequestContext,
		scopes: &'a ScopeSet,
	) -> RetrieverFuture<'a> {
		Box::pin(self.fetch(ctx, scopes))
	}

	fn kind(&self) -> SourceKind {
		SourceKind::Impersonated
	}
}
impl Debug for ImpersonatedSource {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("ImpersonatedSource")
			.field("identity", &self.identity)
			.field("base", self.base.identity_key())
			.field("target_principal", &self.target_principal)
			.field("delegates", &self.delegates)
			.field("endpoint", &self.endpoint.as_str())
			.finish()
	}
}

fn generate_token_url(iam_url: &str, target: &str) -> Result<Url, ConfigError> {
	common::parse_endpoint(
		"iam_url",
		&format!(
			"{}/v1/projects/-/serviceAccounts/{target}:generateAccessToken",
			iam_url.trim_end_matches('/')
		),
	)
}

#[cfg(all(test, feature = "reqwest"))]
mod tests {
	// self
	use super::*;
	use crate::sources::FnRetriever;

	fn base() -> Arc<dyn TokenRetriever> {
		let identity = IdentityKey::new("gce_1_1__").expect("Identity fixture should be valid.");

		Arc::new(FnRetriever::new(identity, |_ctx, _scopes| async {
			Ok(AccessToken::new("base", OffsetDateTime::now_utc() + Duration::hours(1)))
		}))
	}

	#[test]
	fn identity_and_endpoint_include_target() {
		let target = "sa@p.iam.gserviceaccount.com";
		let source = ImpersonatedSource::new(base(), SourceTransport::default(), target)
			.expect("Impersonation should build.");

		assert_eq!(
			source.identity_key().as_ref(),
			"gce_1_1___impersonated-sa@p.iam.gserviceaccount.com"
		);
		assert_eq!(
			source.endpoint().as_str(),
			"https://iamcredentials.googleapis.com/v1/projects/-/serviceAccounts/sa@p.iam.gserviceaccount.com:generateAccessToken"
		);
		assert!(
			ImpersonatedSource::new(base(), SourceTransport::default(), "  ").is_err(),
			"Blank target must be rejected."
		);
	}
}
