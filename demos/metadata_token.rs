//! Resolves a metadata-server token through the shared cache against a local mock server, then
//! looks up the instance's default project.

// std
use std::sync::Arc;
// crates.io
use color_eyre::Result;
use httpmock::prelude::*;
// self
use bearer_broker::{
	RequestContext, TokenCache,
	auth::{IdentityKey, ScopeSet},
	retriever::TokenRetriever,
	sources::{CLOUD_PLATFORM_SCOPE, MetadataSource},
	transport::SourceTransport,
};

#[tokio::main]
async fn main() -> Result<()> {
	color_eyre::install()?;

	let server = MockServer::start_async().await;
	let token_mock = server
		.mock_async(|when, then| {
			when.method(GET)
				.path("/computeMetadata/v1/instance/service-accounts/default/token")
				.header("Metadata-Flavor", "Google");
			then.status(200).header("content-type", "application/json").body(
				"{\"access_token\":\"demo-access\",\"token_type\":\"Bearer\",\"expires_in\":900}",
			);
		})
		.await;
	let _project_mock = server
		.mock_async(|when, then| {
			when.method(GET).path("/computeMetadata/v1/project/project-id");
			then.status(200).body("demo-project");
		})
		.await;
	let source = MetadataSource::new(IdentityKey::new("gce_1_1__")?, SourceTransport::default())?
		.with_host(&server.base_url())?;
	let project = source
		.project_id(&RequestContext::background(), &ScopeSet::new([CLOUD_PLATFORM_SCOPE])?)
		.await?;
	let retriever: Arc<dyn TokenRetriever> = Arc::new(source);
	let cache = TokenCache::new();
	let ctx = RequestContext::background();
	let first = cache.access_token(&ctx, &retriever, [CLOUD_PLATFORM_SCOPE]).await?;
	let second = cache.access_token(&ctx, &retriever, [CLOUD_PLATFORM_SCOPE]).await?;

	println!("Project {project} uses token {first}; reused: {}.", first == second);

	// One call for the project lookup, one for the cached token.
	token_mock.assert_calls_async(2).await;

	Ok(())
}
