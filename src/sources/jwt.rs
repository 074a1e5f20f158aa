//! Service-account key source exchanging an RS256-signed assertion for an access token.

// crates.io
use jsonwebtoken::{Algorithm, EncodingKey, Header};
// self
use crate::{
	_prelude::*,
	auth::{AccessToken, IdentityKey, ScopeSet},
	clock::{Clock, SystemClock},
	context::RequestContext,
	error::{ConfigError, TransientError},
	obs::SourceKind,
	retriever::{RetrieverFuture, TokenRetriever},
	sources::common,
	transport::SourceTransport,
};

/// Token endpoint used when the key does not name one.
pub const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";

const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
const ASSERTION_LIFETIME: Duration = Duration::hours(1);

/// Service-account key material, as found in a downloaded key file.
#[derive(Clone, Deserialize)]
pub struct ServiceAccountKey {
	/// Service-account email, used as the assertion issuer.
	pub client_email: String,
	/// PEM-encoded RSA private key.
	pub private_key: String,
	/// Key identifier placed in the assertion header, when known.
	#[serde(default)]
	pub private_key_id: Option<String>,
	/// Token endpoint; [`DEFAULT_TOKEN_URI`] when absent.
	#[serde(default)]
	pub token_uri: Option<String>,
}
impl ServiceAccountKey {
	/// Creates key material from an email and PEM key.
	pub fn new(client_email: impl Into<String>, private_key: impl Into<String>) -> Self {
		Self {
			client_email: client_email.into(),
			private_key: private_key.into(),
			private_key_id: None,
			token_uri: None,
		}
	}

	/// Sets the key identifier.
	pub fn with_key_id(mut self, key_id: impl Into<String>) -> Self {
		self.private_key_id = Some(key_id.into());

		self
	}

	/// Sets the token endpoint.
	pub fn with_token_uri(mut self, token_uri: impl Into<String>) -> Self {
		self.token_uri = Some(token_uri.into());

		self
	}
}
impl Debug for ServiceAccountKey {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("ServiceAccountKey")
			.field("client_email", &self.client_email)
			.field("private_key", &"<redacted>")
			.field("private_key_id", &self.private_key_id)
			.field("token_uri", &self.token_uri)
			.finish()
	}
}

#[derive(Serialize)]
struct AssertionClaims<'a> {
	iss: &'a str,
	scope: String,
	aud: &'a str,
	iat: i64,
	exp: i64,
}

/// Exchanges a signed JWT assertion at the key's token endpoint.
pub struct JwtSource {
	identity: IdentityKey,
	transport: SourceTransport,
	client_email: String,
	key_id: Option<String>,
	signing_key: EncodingKey,
	token_uri: Url,
	clock: Arc<dyn Clock>,
}
impl JwtSource {
	/// Validates `key` and builds the source.
	///
	/// The PEM is parsed here so a broken key fails at configuration time instead of on the
	/// first outbound request.
	pub fn new(
		identity: IdentityKey,
		transport: SourceTransport,
		key: ServiceAccountKey,
	) -> Result<Self> {
		if key.client_email.trim().is_empty() {
			return Err(ConfigError::missing("jwt", "clientEmail").into());
		}
		if key.private_key.trim().is_empty() {
			return Err(ConfigError::missing("jwt", "privateKey").into());
		}

		let signing_key = EncodingKey::from_rsa_pem(key.private_key.as_bytes())
			.map_err(ConfigError::InvalidSigningKey)?;
		let token_uri = common::parse_endpoint(
			"token_uri",
			key.token_uri.as_deref().filter(|uri| !uri.is_empty()).unwrap_or(DEFAULT_TOKEN_URI),
		)?;

		Ok(Self {
			identity,
			transport,
			client_email: key.client_email,
			key_id: key.private_key_id.filter(|id| !id.is_empty()),
			signing_key,
			token_uri,
			clock: Arc::new(SystemClock),
		})
	}

	/// Overrides the clock used for assertion timestamps and expiries.
	pub fn with_clock(mut self, clock: impl 'static + Clock) -> Self {
		self.clock = Arc::new(clock);

		self
	}

	/// Token endpoint this source posts to.
	pub fn token_uri(&self) -> &Url {
		&self.token_uri
	}

	fn assertion(&self, scopes: &ScopeSet, now: OffsetDateTime) -> Result<String> {
		let mut header = Header::new(Algorithm::RS256);

		header.kid = self.key_id.clone();

		let iat = now.unix_timestamp();
		let claims = AssertionClaims {
			iss: &self.client_email,
			scope: scopes.normalized(),
			aud: self.token_uri.as_str(),
			iat,
			exp: iat + ASSERTION_LIFETIME.whole_seconds(),
		};

		jsonwebtoken::encode(&header, &claims, &self.signing_key)
			.map_err(|e| TransientError::AssertionSigning(e).into())
	}

	async fn fetch(&self, scopes: &ScopeSet) -> Result<AccessToken> {
		let assertion = self.assertion(scopes, self.clock.now())?;
		let request = common::form_request(
			&self.token_uri,
			&[("grant_type", JWT_BEARER_GRANT), ("assertion", &assertion)],
		)?;
		let response = self.transport.send(SourceKind::Jwt, request).await?;

		common::parse_token_response(&response, self.clock.now())
	}
}
impl TokenRetriever for JwtSource {
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
		SourceKind::Jwt
	}
}
impl Debug for JwtSource {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("JwtSource")
			.field("identity", &self.identity)
			.field("client_email", &self.client_email)
			.field("key_id", &self.key_id)
			.field("token_uri", &self.token_uri.as_str())
			.finish()
	}
}
