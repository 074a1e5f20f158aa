//! Federated identity source exchanging an external subject token at a security token service.

// std
use std::time::Duration as StdDuration;
// self
use crate::{
	_prelude::*,
	auth::{AccessToken, IdentityKey, ScopeSet},
	clock::{Clock, SystemClock},
	context::RequestContext,
	error::{ConfigError, TransientError},
	obs::SourceKind,
	retriever::{RetrieverFuture, TokenRetriever},
	sources::common::{self, CLOUD_PLATFORM_SCOPE},
	transport::SourceTransport,
};

/// Security token service used when none is configured.
pub const DEFAULT_STS_URL: &str = "https://sts.googleapis.com/v1/token";

const TOKEN_EXCHANGE_GRANT: &str = "urn:ietf:params:oauth:grant-type:token-exchange";
const ACCESS_TOKEN_TYPE: &str = "urn:ietf:params:oauth:token-type:access_token";
const EXCHANGE_TIMEOUT: StdDuration = StdDuration::from_secs(30);

/// Settings for one federated exchange.
#[derive(Clone)]
pub struct FederatedSettings {
	/// Workload identity provider audience.
	pub audience: String,
	/// Type URN of the subject token (for example `urn:ietf:params:oauth:token-type:jwt`).
	pub subject_token_type: String,
	/// External credential presented as the subject token.
	pub subject_token: String,
	/// STS endpoint; [`DEFAULT_STS_URL`] when absent.
	pub token_url: Option<String>,
}
impl Debug for FederatedSettings {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("FederatedSettings")
			.field("audience", &self.audience)
			.field("subject_token_type", &self.subject_token_type)
			.field("subject_token", &"<redacted>")
			.field("token_url", &self.token_url)
			.finish()
	}
}

/// Performs an RFC 8693 token exchange for every refresh.
pub struct FederatedSource {
	identity: IdentityKey,
	transport: SourceTransport,
	audience: String,
	subject_token_type: String,
	subject_token: String,
	token_url: Url,
	timeout: StdDuration,
	clock: Arc<dyn Clock>,
}
impl FederatedSource {
	/// Validates `settings` and builds the source.
	pub fn new(
		identity: IdentityKey,
		transport: SourceTransport,
		settings: FederatedSettings,
	) -> Result<Self> {
		if settings.audience.trim().is_empty() {
			return Err(ConfigError::missing("wif", "audience").into());
		}
		if settings.subject_token_type.trim().is_empty() {
			return Err(ConfigError::missing("wif", "subjectTokenType").into());
		}
		if settings.subject_token.trim().is_empty() {
			return Err(ConfigError::missing("wif", "jwtBearerToken").into());
		}

		let token_url = common::parse_endpoint(
			"token_url",
			settings.token_url.as_deref().filter(|url| !url.is_empty()).unwrap_or(DEFAULT_STS_URL),
		)?;

		Ok(Self {
			identity,
			transport,
			audience: settings.audience,
			subject_token_type: settings.subject_token_type,
			subject_token: settings.subject_token,
			token_url,
			timeout: EXCHANGE_TIMEOUT,
			clock: Arc::new(SystemClock),
		})
	}

	/// Overrides the per-exchange timeout (30 seconds by default).
	pub fn with_timeout(mut self, timeout: StdDuration) -> Self {
		self.timeout = timeout;

		self
	}

	/// Overrides the clock used to anchor relative expiries.
	pub fn with_clock(mut self, clock: impl 'static + Clock) -> Self {
		self.clock = Arc::new(clock);

		self
	}

	/// STS endpoint this source posts to.
	pub fn token_url(&self) -> &Url {
		&self.token_url
	}

	async fn fetch(&self, scopes: &ScopeSet) -> Result<AccessToken> {
		let scope = if scopes.is_empty() {
			None
		} else {
			Some(scopes.with_scope(CLOUD_PLATFORM_SCOPE).map_err(ConfigError::from)?.normalized())
		};
		let mut form = vec![
			("grant_type", TOKEN_EXCHANGE_GRANT),
			("audience", self.audience.as_str()),
			("subject_token_type", self.subject_token_type.as_str()),
			("subject_token", self.subject_token.as_str()),
			("requested_token_type", ACCESS_TOKEN_TYPE),
		];

		if let Some(scope) = scope.as_deref() {
			form.push(("scope", scope));
		}

		let request = common::form_request(&self.token_url, &form)?;
		let response = tokio::time::timeout(
			self.timeout,
			self.transport.send(SourceKind::Federated, request),
		)
		.await
		.map_err(|_| TransientError::TokenEndpoint {
			message: format!("token exchange did not finish within {:?}", self.timeout),
			status: None,
			retry_after: None,
		})??;

		common::parse_token_response(&response, self.clock.now())
	}
}
impl TokenRetriever for FederatedSource {
	fn identity_key(&self) -> &IdentityKey {
		&self.identity
	}

	fn fetch_token<'a>(
		&'a self,
		_ctx: &'a RequestContext,
		scopes: &'a ScopeSet,
	) -> RetrieverFuture<'a> {
		Box::pin(self.fetch(scopes))
	}

	fn kind(&self) -> SourceKind {
		SourceKind::Federated
	}
}
impl Debug for FederatedSource {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("FederatedSource")
			.field("identity", &self.identity)
			.field("audience", &self.audience)
			.field("token_url", &self.token_url.as_str())
			.field("timeout", &self.timeout)
			.finish()
	}
}

#[cfg(all(test, feature = "reqwest"))]
mod tests {
	// self
	use super::*;

	fn settings() -> FederatedSettings {
		FederatedSettings {
			audience: "//iam.googleapis.com/projects/1/locations/global/workloadIdentityPools/p/providers/q"
				.into(),
			subject_token_type: "urn:ietf:params:oauth:token-type:jwt".into(),
			subject_token: "header.payload.sig".into(),
			token_url: None,
		}
	}

	fn build(settings: FederatedSettings) -> Result<FederatedSource> {
		FederatedSource::new(
			IdentityKey::new("wif_1_1__").expect("Identity fixture should be valid."),
			SourceTransport::default(),
			settings,
		)
	}

	#[test]
	fn required_settings_are_enforced() {
		let cases = [
			(FederatedSettings { audience: String::new(), ..settings() }, "audience"),
			(
				FederatedSettings { subject_token_type: " ".into(), ..settings() },
				"subjectTokenType",
			),
			(FederatedSettings { subject_token: String::new(), ..settings() }, "jwtBearerToken"),
		];

		for (settings, field) in cases {
			let err = build(settings).expect_err("Incomplete settings must be rejected.");

			assert!(
				matches!(err, Error::Config(ConfigError::MissingField { field: f, .. }) if f == field),
				"{field}: {err:?}"
			);
		}
	}

	#[test]
	fn token_url_defaults_and_validates() {
		let source = build(settings()).expect("Default settings should build.");

		assert_eq!(source.token_url().as_str(), DEFAULT_STS_URL);

		let err = build(FederatedSettings { token_url: Some("not a url".into()), ..settings() })
			.expect_err("Malformed URL must be rejected.");

		assert!(matches!(err, Error::Config(ConfigError::InvalidEndpoint { .. })));
		assert!(!format!("{:?}", settings()).contains("header.payload.sig"));
	}
}
