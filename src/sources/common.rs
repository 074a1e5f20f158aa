//! Request builders and the token endpoint response parser shared by the built-in sources.

// crates.io
use oauth2::{
	HttpRequest, HttpResponse,
	http::{
		Method, Request, StatusCode,
		header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE},
	},
};
use serde::de::DeserializeOwned;
use serde_json::Value;
// self
use crate::{
	_prelude::*,
	auth::{AccessToken, TokenSecret},
	error::{ConfigError, TokenResponseError, TransientError},
	http,
};

/// Scope required by the IAM credentials and STS APIs.
pub const CLOUD_PLATFORM_SCOPE: &str = "https://www.googleapis.com/auth/cloud-platform";

const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";
const JSON_CONTENT_TYPE: &str = "application/json";
const BODY_SNIPPET_LIMIT: usize = 256;

#[derive(Deserialize)]
struct TokenEndpointBody {
	access_token: Option<String>,
	expires_in: Option<i64>,
	error: Option<String>,
	error_description: Option<String>,
}

pub(crate) fn parse_endpoint(endpoint: &'static str, raw: &str) -> Result<Url, ConfigError> {
	Url::parse(raw).map_err(|source| ConfigError::InvalidEndpoint { endpoint, source })
}

pub(crate) fn get_request(url: &Url, headers: &[(&str, &str)]) -> Result<HttpRequest> {
	let mut builder =
		Request::builder().method(Method::GET).uri(url.as_str()).header(ACCEPT, JSON_CONTENT_TYPE);

	for (name, value) in headers {
		builder = builder.header(*name, *value);
	}

	builder.body(Vec::new()).map_err(|e| ConfigError::from(e).into())
}

pub(crate) fn form_request(url: &Url, pairs: &[(&str, &str)]) -> Result<HttpRequest> {
	let body = url::form_urlencoded::Serializer::new(String::new()).extend_pairs(pairs).finish();

	Request::builder()
		.method(Method::POST)
		.uri(url.as_str())
		.header(CONTENT_TYPE, FORM_CONTENT_TYPE)
		.header(ACCEPT, JSON_CONTENT_TYPE)
		.body(body.into_bytes())
		.map_err(|e| ConfigError::from(e).into())
}

pub(crate) fn json_request(url: &Url, bearer: &TokenSecret, body: &Value) -> Result<HttpRequest> {
	Request::builder()
		.method(Method::POST)
		.uri(url.as_str())
		.header(CONTENT_TYPE, JSON_CONTENT_TYPE)
		.header(ACCEPT, JSON_CONTENT_TYPE)
		.header(AUTHORIZATION, bearer.bearer())
		.body(body.to_string().into_bytes())
		.map_err(|e| ConfigError::from(e).into())
}

/// Parses an OAuth-style token endpoint response into an [`AccessToken`] expiring
/// `expires_in` seconds after `now`.
pub(crate) fn parse_token_response(
	response: &HttpResponse,
	now: OffsetDateTime,
) -> Result<AccessToken> {
	if response.status() != StatusCode::OK {
		return Err(error_status(response));
	}

	let body = decode_json::<TokenEndpointBody>(response)?;

	if let Some(code) = body.error.filter(|code| !code.is_empty()) {
		return Err(TransientError::TokenEndpoint {
			message: describe(&code, body.error_description.as_deref()),
			status: Some(response.status().as_u16()),
			retry_after: None,
		}
		.into());
	}

	let token = body
		.access_token
		.filter(|token| !token.is_empty())
		.ok_or(TokenResponseError::MissingAccessToken)?;
	let expires_in = body.expires_in.ok_or(TokenResponseError::MissingExpiresIn)?;

	if expires_in <= 0 {
		return Err(TokenResponseError::NonPositiveExpiresIn.into());
	}

	let expires_at = now
		.checked_add(Duration::seconds(expires_in))
		.ok_or(TokenResponseError::ExpiresInOutOfRange)?;

	Ok(AccessToken::new(token, expires_at))
}

/// Decodes a JSON body, reporting the failing path on error.
pub(crate) fn decode_json<T>(response: &HttpResponse) -> Result<T>
where
	T: DeserializeOwned,
{
	let mut de = serde_json::Deserializer::from_slice(response.body());

	serde_path_to_error::deserialize(&mut de).map_err(|source| {
		TransientError::TokenResponseParse { source, status: Some(response.status().as_u16()) }
			.into()
	})
}

/// Classifies a non-200 response.
///
/// OAuth bodies (`{"error": "...", "error_description": "..."}`) map `invalid_grant` and
/// `invalid_client` onto their own variants; Google API bodies (`{"error": {"message": ...}}`)
/// and anything else become transient failures carrying the status and a body snippet.
pub(crate) fn error_status(response: &HttpResponse) -> Error {
	let status = response.status().as_u16();
	let retry_after = http::retry_after(response.headers());
	let body = serde_json::from_slice::<Value>(response.body()).ok();
	let oauth_code = body.as_ref().and_then(|value| value.get("error")).and_then(Value::as_str);

	if let Some(code) = oauth_code.filter(|code| !code.is_empty()) {
		let description = body
			.as_ref()
			.and_then(|value| value.get("error_description"))
			.and_then(Value::as_str);
		let message = format!(
			"token exchange failed with status {status}: {}",
			describe(code, description)
		);

		return match code {
			"invalid_grant" => Error::InvalidGrant { reason: message },
			"invalid_client" => Error::InvalidClient { reason: message },
			_ => TransientError::TokenEndpoint { message, status: Some(status), retry_after }.into(),
		};
	}

	let detail = body
		.as_ref()
		.and_then(|value| value.pointer("/error/message"))
		.and_then(Value::as_str)
		.map(str::to_owned)
		.unwrap_or_else(|| snippet(response.body()));

	TransientError::TokenEndpoint {
		message: format!("token exchange failed with status {status}: {detail}"),
		status: Some(status),
		retry_after,
	}
	.into()
}

fn describe(code: &str, description: Option<&str>) -> String {
	format!("{code} - {}", description.unwrap_or_default())
}

fn snippet(body: &[u8]) -> String {
	let text = String::from_utf8_lossy(body);

	match text.char_indices().nth(BODY_SNIPPET_LIMIT) {
		Some((cut, _)) => format!("{}...", &text[..cut]),
		None => text.into_owned(),
	}
}
