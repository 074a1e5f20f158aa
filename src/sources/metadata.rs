//! Instance metadata server source.

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

/// Metadata server used when nothing overrides it.
pub const DEFAULT_METADATA_HOST: &str = "http://metadata.google.internal";
/// Environment variable overriding the metadata server host.
pub const METADATA_HOST_ENV: &str = "GCE_METADATA_HOST";

const TOKEN_PATH: &str = "computeMetadata/v1/instance/service-accounts/default/token";
const PROJECT_ID_PATH: &str = "computeMetadata/v1/project/project-id";

/// Fetches tokens for the instance's default service account.
pub struct MetadataSource {
	identity: IdentityKey,
	transport: SourceTransport,
	token_url: Url,
	project_url: Url,
	clock: Arc<dyn Clock>,
}
impl MetadataSource {
	/// Creates a source pointed at `$GCE_METADATA_HOST` or the default metadata host.
	pub fn new(identity: IdentityKey, transport: SourceTransport) -> Result<Self> {
		let host = std::env::var(METADATA_HOST_ENV)
			.ok()
			.filter(|host| !host.trim().is_empty())
			.unwrap_or_else(|| DEFAULT_METADATA_HOST.to_owned());

		Ok(Self {
			identity,
			transport,
			token_url: endpoint(&host, TOKEN_PATH)?,
			project_url: endpoint(&host, PROJECT_ID_PATH)?,
			clock: Arc::new(SystemClock),
		})
	}

	/// Overrides the metadata host; a bare `host:port` is treated as plain HTTP.
	pub fn with_host(mut self, host: &str) -> Result<Self> {
		self.token_url = endpoint(host, TOKEN_PATH)?;
		self.project_url = endpoint(host, PROJECT_ID_PATH)?;

		Ok(self)
	}

	/// Overrides the clock used to anchor relative expiries.
	pub fn with_clock(mut self, clock: impl 'static + Clock) -> Self {
		self.clock = Arc::new(clock);

		self
	}

	/// Token endpoint this source calls, without the scope query.
	pub fn token_url(&self) -> &Url {
		&self.token_url
	}

	/// Resolves the instance's default project ID.
	///
	/// A token for `scopes` is fetched first so a project is only reported for credentials that
	/// can actually authenticate.
	pub async fn project_id(&self, ctx: &RequestContext, scopes: &ScopeSet) -> Result<String> {
		ctx.run(async {
			self.fetch(scopes).await?;

			let request = common::get_request(&self.project_url, &[("Metadata-Flavor", "Google")])?;
			let response = self.transport.send(SourceKind::Metadata, request).await?;

			if !response.status().is_success() {
				return Err(common::error_status(&response));
			}

			let project = String::from_utf8_lossy(response.body()).trim().to_owned();

			if project.is_empty() {
				return Err(TransientError::TokenEndpoint {
					message: "metadata server returned an empty project id".into(),
					status: Some(response.status().as_u16()),
					retry_after: None,
				}
				.into());
			}

			Ok(project)
		})
		.await
	}

	async fn fetch(&self, scopes: &ScopeSet) -> Result<AccessToken> {
		let mut url = self.token_url.clone();

		if !scopes.is_empty() {
			let joined = scopes.iter().collect::<Vec<_>>().join(",");

			url.query_pairs_mut().append_pair("scopes", &joined);
		}

		let request = common::get_request(&url, &[("Metadata-Flavor", "Google")])?;
		let response = self.transport.send(SourceKind::Metadata, request).await?;

		common::parse_token_response(&response, self.clock.now())
	}
}
impl TokenRetriever for MetadataSource {
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
		SourceKind::Metadata
	}
}
impl Debug for MetadataSource {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("MetadataSource")
			.field("identity", &self.identity)
			.field("token_url", &self.token_url.as_str())
			.finish()
	}
}

fn endpoint(host: &str, path: &str) -> Result<Url, ConfigError> {
	let host = host.trim().trim_end_matches('/');
	let base = if host.contains("://") { host.to_owned() } else { format!("http://{host}") };

	common::parse_endpoint("metadata_host", &format!("{base}/{path}"))
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn bare_hosts_default_to_http() {
		assert_eq!(
			endpoint("169.254.169.254", TOKEN_PATH).expect("Bare host should be accepted.").as_str(),
			"http://169.254.169.254/computeMetadata/v1/instance/service-accounts/default/token"
		);
		assert_eq!(
			endpoint("https://metadata.internal:8443/", TOKEN_PATH)
				.expect("URL host should be accepted.")
				.as_str(),
			"https://metadata.internal:8443/computeMetadata/v1/instance/service-accounts/default/token"
		);
		assert_eq!(
			endpoint("127.0.0.1:8080", PROJECT_ID_PATH)
				.expect("Bare host should be accepted.")
				.as_str(),
			"http://127.0.0.1:8080/computeMetadata/v1/project/project-id"
		);
		assert!(endpoint("http://[::1", TOKEN_PATH).is_err());
	}
}
