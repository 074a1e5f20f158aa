// std
use std::{
	error::Error as StdError,
	fmt::{Display, Formatter, Result as FmtResult},
	future::Future,
	pin::Pin,
	sync::Arc,
};
// crates.io
use jsonwebtoken::{Algorithm, DecodingKey, Validation};
use parking_lot::Mutex;
use serde_json::Value;
use time::{Duration, macros};
// self
use bearer_broker::{
	Error, RequestContext,
	auth::{IdentityKey, ScopeSet},
	clock::ManualClock,
	error::{ConfigError, TransientError, TransportError},
	http::{ResponseMetadata, ResponseMetadataSlot, TokenHttpClient},
	oauth2::{
		AsyncHttpClient, HttpClientError, HttpRequest, HttpResponse,
		http::{StatusCode, header::CONTENT_TYPE},
	},
	obs::SourceKind,
	retriever::TokenRetriever,
	sources::{JwtSource, MetadataSource, ServiceAccountKey},
	transport::{SourceTransport, TransportErrorMapper},
};

const PRIVATE_KEY: &str = include_str!("fixtures/service_account_key.pem");
const PUBLIC_KEY: &str = include_str!("fixtures/service_account_pub.pem");
const TOKEN_URI: &str = "https://oauth2.example.test/token";
const CLIENT_EMAIL: &str = "reader@project.iam.gserviceaccount.com";

type HandleFuture<'a, E> =
	Pin<Box<dyn Future<Output = Result<HttpResponse, HttpClientError<E>>> + 'a + Send + Sync>>;

#[derive(Debug)]
enum FakeTransportError {
	Throttled,
}
impl Display for FakeTransportError {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		match self {
			Self::Throttled => write!(f, "Transport throttled."),
		}
	}
}
impl StdError for FakeTransportError {}

#[derive(Clone, Copy)]
struct ThrottledHttpClient {
	retry_after: Duration,
}
impl TokenHttpClient for ThrottledHttpClient {
	type Handle = ThrottledHandle;
	type TransportError = FakeTransportError;

	fn with_metadata(&self, slot: ResponseMetadataSlot) -> Self::Handle {
		ThrottledHandle { slot, retry_after: self.retry_after }
	}
}

struct ThrottledHandle {
	slot: ResponseMetadataSlot,
	retry_after: Duration,
}
impl<'a> AsyncHttpClient<'a> for ThrottledHandle {
	type Error = HttpClientError<FakeTransportError>;
	type Future = HandleFuture<'a, FakeTransportError>;

	fn call(&'a self, _request: HttpRequest) -> Self::Future {
		let slot = self.slot.clone();
		let retry_after = self.retry_after;

		Box::pin(async move {
			assert!(
				slot.take().is_none(),
				"ResponseMetadataSlot must be clear before dispatching a request."
			);
			slot.store(ResponseMetadata { status: Some(429), retry_after: Some(retry_after) });

			Err(HttpClientError::Reqwest(Box::new(FakeTransportError::Throttled)))
		})
	}
}

#[derive(Clone, Default)]
struct RecordingTransportErrorMapper {
	seen: Arc<Mutex<Vec<(SourceKind, Option<ResponseMetadata>)>>>,
}
impl<E> TransportErrorMapper<E> for RecordingTransportErrorMapper
where
	E: 'static + Send + Sync + StdError,
{
	fn map_transport_error(
		&self,
		kind: SourceKind,
		meta: Option<&ResponseMetadata>,
		err: HttpClientError<E>,
	) -> Error {
		let status = meta.and_then(|value| value.status);
		let retry_after = meta.and_then(|value| value.retry_after);

		self.seen.lock().push((kind, meta.cloned()));

		match err {
			HttpClientError::Reqwest(inner) => TransientError::TokenEndpoint {
				message: format!("Fake transport error: {inner}"),
				status,
				retry_after,
			}
			.into(),
			HttpClientError::Http(inner) => ConfigError::from(inner).into(),
			HttpClientError::Io(inner) => TransportError::Io(inner).into(),
			other => TransportError::network(other).into(),
		}
	}
}

struct RecordedRequest {
	uri: String,
	content_type: Option<String>,
	body: Vec<u8>,
}

/// Answers every request with a fixed token body and keeps what it was sent.
#[derive(Clone)]
struct RecordingHttpClient {
	body: &'static str,
	requests: Arc<Mutex<Vec<RecordedRequest>>>,
}
impl RecordingHttpClient {
	fn new(body: &'static str) -> Self {
		Self { body, requests: Arc::default() }
	}
}
impl TokenHttpClient for RecordingHttpClient {
	type Handle = RecordingHandle;
	type TransportError = std::io::Error;

	fn with_metadata(&self, slot: ResponseMetadataSlot) -> Self::Handle {
		RecordingHandle { client: self.clone(), slot }
	}
}

struct RecordingHandle {
	client: RecordingHttpClient,
	slot: ResponseMetadataSlot,
}
impl<'a> AsyncHttpClient<'a> for RecordingHandle {
	type Error = HttpClientError<std::io::Error>;
	type Future = HandleFuture<'a, std::io::Error>;

	fn call(&'a self, request: HttpRequest) -> Self::Future {
		Box::pin(async move {
			self.client.requests.lock().push(RecordedRequest {
				uri: request.uri().to_string(),
				content_type: request
					.headers()
					.get(CONTENT_TYPE)
					.and_then(|value| value.to_str().ok())
					.map(str::to_owned),
				body: request.into_body(),
			});
			self.slot.store(ResponseMetadata { status: Some(200), retry_after: None });

			let mut response = HttpResponse::new(self.client.body.as_bytes().to_vec());

			*response.status_mut() = StatusCode::OK;

			Ok(response)
		})
	}
}

fn identity(value: &str) -> IdentityKey {
	IdentityKey::new(value).expect("Identity fixture should be valid.")
}

#[tokio::test]
async fn throttled_transport_surfaces_metadata() {
	let mapper = RecordingTransportErrorMapper::default();
	let transport = SourceTransport::new(
		ThrottledHttpClient { retry_after: Duration::seconds(5) },
		mapper.clone(),
	);
	let source = MetadataSource::new(identity("gce_1_1__"), transport)
		.expect("Metadata source should build.")
		.with_host("metadata.example.test")
		.expect("Host should be accepted.");
	let err = source
		.fetch_token(&RequestContext::background(), &ScopeSet::default())
		.await
		.expect_err("Request should be throttled with HTTP 429.");

	match err {
		Error::Transient(TransientError::TokenEndpoint { status, retry_after, .. }) => {
			assert_eq!(status, Some(429));
			assert_eq!(retry_after, Some(Duration::seconds(5)));
		},
		other => panic!("Unexpected error variant: {other:?}."),
	}

	let seen = mapper.seen.lock();

	assert_eq!(seen.len(), 1, "Mapper must record a single request.");
	assert_eq!(seen[0].0, SourceKind::Metadata);
	assert_eq!(seen[0].1.as_ref().and_then(|meta| meta.status), Some(429));
}

#[tokio::test]
async fn jwt_source_posts_signed_assertion() {
	let http_client = RecordingHttpClient::new(
		"{\"access_token\":\"ya29.jwt\",\"expires_in\":3600,\"token_type\":\"Bearer\"}",
	);
	let transport =
		SourceTransport::new(http_client.clone(), RecordingTransportErrorMapper::default());
	let clock = ManualClock::new(macros::datetime!(2025-03-01 12:00 UTC));
	let key = ServiceAccountKey::new(CLIENT_EMAIL, PRIVATE_KEY)
		.with_key_id("key-1")
		.with_token_uri(TOKEN_URI);
	let source = JwtSource::new(identity("jwt_2_1__"), transport, key)
		.expect("JWT source should build.")
		.with_clock(clock.clone());
	let scopes = ScopeSet::new(["https://www.googleapis.com/auth/monitoring.read", "openid"])
		.expect("Scope fixture should be valid.");
	let token = source
		.fetch_token(&RequestContext::background(), &scopes)
		.await
		.expect("Assertion exchange should succeed.");

	assert_eq!(token.secret.expose(), "ya29.jwt");
	assert_eq!(token.expires_at, macros::datetime!(2025-03-01 13:00 UTC));

	let requests = http_client.requests.lock();
	let request = requests.first().expect("One request should be recorded.");

	assert_eq!(requests.len(), 1);
	assert_eq!(request.uri, TOKEN_URI);
	assert_eq!(request.content_type.as_deref(), Some("application/x-www-form-urlencoded"));

	let form = url::form_urlencoded::parse(&request.body).into_owned().collect::<Vec<_>>();
	let field = |name: &str| {
		form.iter()
			.find(|(key, _)| key == name)
			.map(|(_, value)| value.clone())
			.expect("Form field should be present.")
	};

	assert_eq!(field("grant_type"), "urn:ietf:params:oauth:grant-type:jwt-bearer");

	let assertion = field("assertion");
	let header = jsonwebtoken::decode_header(&assertion).expect("Assertion header should decode.");

	assert_eq!(header.alg, Algorithm::RS256);
	assert_eq!(header.kid.as_deref(), Some("key-1"));

	let mut validation = Validation::new(Algorithm::RS256);

	validation.validate_exp = false;
	validation.set_audience(&[TOKEN_URI]);

	let claims = jsonwebtoken::decode::<Value>(
		&assertion,
		&DecodingKey::from_rsa_pem(PUBLIC_KEY.as_bytes()).expect("Public key should parse."),
		&validation,
	)
	.expect("Assertion should verify against the public key.")
	.claims;
	let iat = macros::datetime!(2025-03-01 12:00 UTC).unix_timestamp();

	assert_eq!(claims["iss"], CLIENT_EMAIL);
	assert_eq!(claims["aud"], TOKEN_URI);
	assert_eq!(claims["scope"], "https://www.googleapis.com/auth/monitoring.read openid");
	assert_eq!(claims["iat"], iat);
	assert_eq!(claims["exp"], iat + 3600);
}

#[tokio::test]
async fn jwt_source_rejects_tokens_without_expiry() {
	let http_client = RecordingHttpClient::new("{\"access_token\":\"ya29.jwt\"}");
	let transport = SourceTransport::new(http_client, RecordingTransportErrorMapper::default());
	let source = JwtSource::new(
		identity("jwt_2_1__"),
		transport,
		ServiceAccountKey::new(CLIENT_EMAIL, PRIVATE_KEY),
	)
	.expect("JWT source should build.");
	let err = source
		.fetch_token(&RequestContext::background(), &ScopeSet::default())
		.await
		.expect_err("Response without expires_in must be rejected.");

	assert!(matches!(
		err,
		Error::InvalidToken(bearer_broker::error::TokenResponseError::MissingExpiresIn)
	));
	assert_eq!(source.token_uri().as_str(), "https://oauth2.googleapis.com/token");
}
