//! Data-source settings and the factory turning them into retrievers.
//!
//! Settings arrive as the camelCase JSON a plugin stores for each data source:
//!
//! ```json
//! {
//!   "dataSourceId": 7,
//!   "updateVersion": 1700000000,
//!   "routePath": "monitoring",
//!   "routeMethod": "GET",
//!   "scopes": ["https://www.googleapis.com/auth/monitoring.read"],
//!   "authenticationType": "jwt",
//!   "clientEmail": "reader@project.iam.gserviceaccount.com",
//!   "privateKeyPath": "/etc/secrets/reader.json",
//!   "impersonation": { "targetPrincipal": "target@project.iam.gserviceaccount.com" }
//! }
//! ```

// std
use std::{fs, path::Path};
// self
use crate::{
	_prelude::*,
	auth::{CredentialIdentity, IdentityKey, ScopeSet},
	error::ConfigError,
	retriever::TokenRetriever,
	sources::{
		FederatedSettings, FederatedSource, ImpersonatedSource, JwtSource, MetadataSource,
		ServiceAccountKey,
	},
	transport::SourceTransport,
};

/// Settings for one configured credential source.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceConfig {
	/// Plugin route the credential is attached to.
	#[serde(default)]
	pub route_path: String,
	/// HTTP method of that route.
	#[serde(default)]
	pub route_method: String,
	/// Data-source identifier.
	pub data_source_id: i64,
	/// Data-source update version; bumping it yields a fresh cache partition.
	#[serde(default)]
	pub update_version: i64,
	/// Scopes requested for outbound calls.
	#[serde(default)]
	pub scopes: Vec<String>,
	/// Upstream flow selected by `authenticationType`.
	#[serde(flatten)]
	pub auth: AuthConfig,
	/// Optional impersonation layered on the selected flow.
	#[serde(default)]
	pub impersonation: Option<ImpersonationConfig>,
}
impl SourceConfig {
	/// Decodes settings JSON, reporting the failing field path on error.
	pub fn from_json(raw: &str) -> Result<Self> {
		let mut de = serde_json::Deserializer::from_str(raw);

		serde_path_to_error::deserialize(&mut de)
			.map_err(|source| ConfigError::InvalidSettings { source }.into())
	}

	/// Normalized scope set for outbound calls.
	pub fn scope_set(&self) -> Result<ScopeSet> {
		ScopeSet::new(self.scopes.iter().cloned()).map_err(|e| ConfigError::from(e).into())
	}

	/// Cache identity of the retriever built by [`SourceConfig::retriever`].
	pub fn identity(&self) -> Result<IdentityKey> {
		let base = self.base_identity()?;

		match self.impersonation_target()? {
			Some(target) =>
				base.layered("impersonated", target).map_err(|e| ConfigError::from(e).into()),
			None => Ok(base),
		}
	}

	/// Builds the retriever for these settings, wrapping impersonation when configured.
	///
	/// All validation happens here, so a misconfigured data source fails before any token is
	/// requested.
	pub fn retriever(&self, transport: &SourceTransport) -> Result<Arc<dyn TokenRetriever>> {
		let identity = self.base_identity()?;
		let base: Arc<dyn TokenRetriever> = match &self.auth {
			AuthConfig::Gce(gce) => {
				let mut source = MetadataSource::new(identity, transport.clone())?;

				if let Some(host) = gce.metadata_host.as_deref().filter(|host| !host.is_empty()) {
					source = source.with_host(host)?;
				}

				Arc::new(source)
			},
			AuthConfig::Jwt(jwt) =>
				Arc::new(JwtSource::new(identity, transport.clone(), jwt.key()?)?),
			AuthConfig::Wif(wif) =>
				Arc::new(FederatedSource::new(identity, transport.clone(), wif.settings())?),
		};
		let Some(target) = self.impersonation_target()? else {
			return Ok(base);
		};
		let impersonation = self.impersonation.as_ref();
		let mut source = ImpersonatedSource::new(base, transport.clone(), target)?
			.with_delegates(impersonation.map(|i| i.delegates.clone()).unwrap_or_default());

		if let Some(iam_url) = impersonation.and_then(|i| i.iam_url.as_deref()) {
			source = source.with_iam_url(iam_url)?;
		}

		Ok(Arc::new(source))
	}

	fn base_identity(&self) -> Result<IdentityKey> {
		CredentialIdentity::new(self.auth.label(), self.data_source_id, self.update_version)
			.with_route(&self.route_path, &self.route_method)
			.key()
			.map_err(|e| ConfigError::from(e).into())
	}

	fn impersonation_target(&self) -> Result<Option<&str>, ConfigError> {
		let Some(impersonation) = self.impersonation.as_ref() else {
			return Ok(None);
		};
		let fallback = match &self.auth {
			AuthConfig::Wif(wif) => wif.service_account_email.as_deref(),
			_ => None,
		};

		Some(impersonation.target_principal.as_str())
			.filter(|target| !target.trim().is_empty())
			.or(fallback.filter(|email| !email.trim().is_empty()))
			.map(Some)
			.ok_or_else(|| ConfigError::missing("impersonated", "targetPrincipal"))
	}
}

/// Upstream flow settings, tagged by `authenticationType`.
#[derive(Clone, Debug, Deserialize)]
#[serde(tag = "authenticationType", rename_all = "lowercase")]
pub enum AuthConfig {
	/// Instance metadata server.
	Gce(GceConfig),
	/// Service-account key and signed JWT exchange.
	Jwt(JwtConfig),
	/// Workload identity federation.
	Wif(WifConfig),
}
impl AuthConfig {
	/// Label used as the identity prefix.
	pub const fn label(&self) -> &'static str {
		match self {
			Self::Gce(_) => "gce",
			Self::Jwt(_) => "jwt",
			Self::Wif(_) => "wif",
		}
	}
}

/// Metadata server settings.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GceConfig {
	/// Overrides `$GCE_METADATA_HOST` and the default metadata host.
	#[serde(default)]
	pub metadata_host: Option<String>,
}

/// Service-account key settings.
#[derive(Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JwtConfig {
	/// Service-account email; read from the key file when it is a service-account JSON.
	#[serde(default)]
	pub client_email: String,
	/// Inline PEM key; escaped `\n` sequences are restored.
	#[serde(default)]
	pub private_key: Option<String>,
	/// Path to a PEM key or a service-account JSON file; wins over the inline key.
	#[serde(default)]
	pub private_key_path: Option<String>,
	/// Key identifier for the assertion header.
	#[serde(default)]
	pub private_key_id: Option<String>,
	/// Token endpoint override.
	#[serde(default, alias = "tokenUrl")]
	pub token_uri: Option<String>,
}
impl JwtConfig {
	/// Resolves key material from the inline value or the configured file.
	pub fn key(&self) -> Result<ServiceAccountKey, ConfigError> {
		let mut key = ServiceAccountKey {
			client_email: self.client_email.clone(),
			private_key: String::new(),
			private_key_id: self.private_key_id.clone().filter(|id| !id.is_empty()),
			token_uri: self.token_uri.clone().filter(|uri| !uri.is_empty()),
		};

		match self.private_key_path.as_deref().filter(|path| !path.trim().is_empty()) {
			Some(path) => {
				let file = read_key_file(Path::new(path))?;

				key.private_key = file.private_key;

				if key.client_email.is_empty() {
					key.client_email = file.client_email.unwrap_or_default();
				}

				key.private_key_id = key.private_key_id.or(file.private_key_id);
				key.token_uri = key.token_uri.or(file.token_uri);
			},
			None => {
				let inline = self
					.private_key
					.as_deref()
					.filter(|pem| !pem.trim().is_empty())
					.ok_or_else(|| ConfigError::missing("jwt", "privateKey"))?;

				key.private_key = unescape_newlines(inline);
			},
		}

		Ok(key)
	}
}
impl Debug for JwtConfig {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("JwtConfig")
			.field("client_email", &self.client_email)
			.field("private_key", &self.private_key.as_ref().map(|_| "<redacted>"))
			.field("private_key_path", &self.private_key_path)
			.field("private_key_id", &self.private_key_id)
			.field("token_uri", &self.token_uri)
			.finish()
	}
}

/// Workload identity federation settings.
#[derive(Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WifConfig {
	/// Workload identity provider audience.
	#[serde(default)]
	pub audience: String,
	/// STS endpoint override.
	#[serde(default)]
	pub token_url: Option<String>,
	/// Subject token type URN.
	#[serde(default)]
	pub subject_token_type: String,
	/// External JWT presented as the subject token.
	#[serde(default)]
	pub jwt_bearer_token: String,
	/// Impersonation target used when `impersonation.targetPrincipal` is blank.
	#[serde(default)]
	pub service_account_email: Option<String>,
}
impl WifConfig {
	/// Converts into source settings; validation happens in [`FederatedSource::new`].
	pub fn settings(&self) -> FederatedSettings {
		FederatedSettings {
			audience: self.audience.clone(),
			subject_token_type: self.subject_token_type.clone(),
			subject_token: self.jwt_bearer_token.clone(),
			token_url: self.token_url.clone(),
		}
	}
}
impl Debug for WifConfig {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("WifConfig")
			.field("audience", &self.audience)
			.field("token_url", &self.token_url)
			.field("subject_token_type", &self.subject_token_type)
			.field("jwt_bearer_token", &"<redacted>")
			.field("service_account_email", &self.service_account_email)
			.finish()
	}
}

/// Service-account impersonation settings.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImpersonationConfig {
	/// Service account to impersonate.
	#[serde(default)]
	pub target_principal: String,
	/// Delegation chain.
	#[serde(default)]
	pub delegates: Vec<String>,
	/// IAM credentials host override.
	#[serde(default)]
	pub iam_url: Option<String>,
}

#[derive(Deserialize)]
struct ServiceAccountFile {
	#[serde(default)]
	private_key: Option<String>,
	#[serde(default)]
	client_email: Option<String>,
	#[serde(default)]
	private_key_id: Option<String>,
	#[serde(default)]
	token_uri: Option<String>,
}

struct KeyFile {
	private_key: String,
	client_email: Option<String>,
	private_key_id: Option<String>,
	token_uri: Option<String>,
}

fn read_key_file(path: &Path) -> Result<KeyFile, ConfigError> {
	let display = path.display().to_string();
	let data = fs::read_to_string(path)
		.map_err(|source| ConfigError::PrivateKeyRead { path: display.clone(), source })?;
	let is_json = path
		.extension()
		.and_then(|ext| ext.to_str())
		.is_some_and(|ext| ext.eq_ignore_ascii_case("json"));

	if !is_json {
		return Ok(KeyFile {
			private_key: data,
			client_email: None,
			private_key_id: None,
			token_uri: None,
		});
	}

	let file = serde_json::from_str::<ServiceAccountFile>(&data)
		.map_err(|e| ConfigError::ServiceAccountFile { path: display.clone(), source: Some(e) })?;
	let private_key = file
		.private_key
		.filter(|pem| !pem.trim().is_empty())
		.ok_or(ConfigError::ServiceAccountFile { path: display, source: None })?;

	Ok(KeyFile {
		private_key: unescape_newlines(&private_key),
		client_email: file.client_email.filter(|email| !email.is_empty()),
		private_key_id: file.private_key_id.filter(|id| !id.is_empty()),
		token_uri: file.token_uri.filter(|uri| !uri.is_empty()),
	})
}

// Settings UIs sometimes double-escape newlines.
fn unescape_newlines(pem: &str) -> String {
	pem.replace("\\n", "\n")
}
