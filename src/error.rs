//! Crate-level error types shared by the cache, the upstream sources, and the injector.

// self
use crate::_prelude::*;

/// Crate-wide result type alias returning [`Error`] by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Canonical error exposed by public APIs.
#[derive(Debug, ThisError)]
pub enum Error {
	/// Local configuration problem, raised before any cache lock is taken.
	#[error(transparent)]
	Config(#[from] ConfigError),
	/// Temporary upstream failure; a later call may succeed.
	#[error(transparent)]
	Transient(#[from] TransientError),
	/// Transport failure (DNS, TCP, TLS).
	#[error(transparent)]
	Transport(#[from] TransportError),
	/// Upstream answered but the issued token cannot be used.
	#[error(transparent)]
	InvalidToken(#[from] TokenResponseError),
	/// The caller's context ended before a token was available.
	#[error(transparent)]
	Cancelled(#[from] Cancellation),

	/// Upstream rejected the grant or assertion.
	#[error("Upstream rejected the grant: {reason}.")]
	InvalidGrant {
		/// Upstream- or crate-supplied reason string.
		reason: String,
	},
	/// Client authentication failed or credentials are malformed.
	#[error("Client authentication failed: {reason}.")]
	InvalidClient {
		/// Upstream- or crate-supplied reason string.
		reason: String,
	},
}
impl Error {
	/// Returns `true` when the error was produced by a failed upstream refresh.
	pub fn is_refresh_failure(&self) -> bool {
		matches!(
			self,
			Self::Transient(_)
				| Self::Transport(_)
				| Self::InvalidToken(_)
				| Self::InvalidGrant { .. }
				| Self::InvalidClient { .. }
		)
	}

	/// Returns `true` when the caller's context was cancelled or timed out.
	pub fn is_cancelled(&self) -> bool {
		matches!(self, Self::Cancelled(_))
	}
}

/// Reason a [`RequestContext`](crate::context::RequestContext) stopped waiting.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ThisError)]
pub enum Cancellation {
	/// The cancellation token fired.
	#[error("Request context was cancelled.")]
	Cancelled,
	/// The deadline elapsed.
	#[error("Request context deadline exceeded.")]
	DeadlineExceeded,
}

/// Configuration and validation failures.
#[derive(Debug, ThisError)]
pub enum ConfigError {
	/// HTTP client could not be constructed.
	#[error("HTTP client could not be constructed.")]
	HttpClientBuild {
		/// Underlying transport builder failure.
		#[source]
		source: BoxError,
	},
	/// HTTP request construction failed.
	#[error(transparent)]
	HttpRequest(#[from] oauth2::http::Error),
	/// A configured endpoint is not a valid URL.
	#[error("Endpoint `{endpoint}` is not a valid URL.")]
	InvalidEndpoint {
		/// Endpoint label.
		endpoint: &'static str,
		/// Underlying parsing failure.
		#[source]
		source: url::ParseError,
	},
	/// Credential identity failed validation.
	#[error("Credential identity is invalid.")]
	InvalidIdentity(#[from] crate::auth::IdentifierError),
	/// Request scopes cannot be normalized.
	#[error("Requested scopes are invalid.")]
	InvalidScope(#[from] crate::auth::ScopeValidationError),
	/// A required setting was absent or empty.
	#[error("Setting `{field}` is required for {source_kind} credentials.")]
	MissingField {
		/// Source label.
		source_kind: &'static str,
		/// Settings field name.
		field: &'static str,
	},
	/// Settings JSON could not be decoded.
	#[error("Settings could not be decoded.")]
	InvalidSettings {
		/// Structured parsing failure including the field path.
		#[source]
		source: serde_path_to_error::Error<serde_json::Error>,
	},
	/// Private key file could not be read.
	#[error("Private key file `{path}` could not be read.")]
	PrivateKeyRead {
		/// Offending path.
		path: String,
		/// Underlying IO failure.
		#[source]
		source: std::io::Error,
	},
	/// Service-account JSON could not be decoded or lacks a key.
	#[error("Service account file `{path}` does not contain a usable private_key.")]
	ServiceAccountFile {
		/// Offending path.
		path: String,
		/// Underlying parsing failure, when decoding failed.
		#[source]
		source: Option<serde_json::Error>,
	},
	/// JWT signing key is not valid RSA PEM.
	#[error("Private key is not a valid RSA PEM key.")]
	InvalidSigningKey(#[source] jsonwebtoken::errors::Error),
}
impl ConfigError {
	/// Wraps a transport's builder failure inside [`ConfigError`].
	pub fn http_client_build(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::HttpClientBuild { source: Box::new(src) }
	}

	pub(crate) fn missing(source_kind: &'static str, field: &'static str) -> Self {
		Self::MissingField { source_kind, field }
	}
}
#[cfg(feature = "reqwest")]
impl From<ReqwestError> for ConfigError {
	fn from(e: ReqwestError) -> Self {
		Self::http_client_build(e)
	}
}

/// Temporary failure variants (safe to retry on the next call).
#[derive(Debug, ThisError)]
pub enum TransientError {
	/// Upstream returned an unexpected but non-fatal response.
	#[error("Token endpoint returned an unexpected response: {message}.")]
	TokenEndpoint {
		/// Upstream- or crate-supplied message summarizing the failure.
		message: String,
		/// HTTP status code, when available.
		status: Option<u16>,
		/// Retry-After hint from upstream, if supplied.
		retry_after: Option<Duration>,
	},
	/// Upstream responded with malformed JSON that could not be parsed.
	#[error("Token endpoint returned malformed JSON.")]
	TokenResponseParse {
		/// Structured parsing failure.
		#[source]
		source: serde_path_to_error::Error<serde_json::error::Error>,
		/// HTTP status code, when available.
		status: Option<u16>,
	},
	/// Building the signed assertion failed.
	#[error("Signed assertion could not be produced.")]
	AssertionSigning(#[source] jsonwebtoken::errors::Error),
}

/// Transport-level failures (network, IO).
#[derive(Debug, ThisError)]
pub enum TransportError {
	/// Underlying HTTP client reported a network failure.
	#[error("Network error occurred while calling the token endpoint.")]
	Network {
		/// Transport-specific network error.
		#[source]
		source: BoxError,
	},
	/// Underlying IO failure surfaced during transport.
	#[error("I/O error occurred while calling the token endpoint.")]
	Io(#[from] std::io::Error),
}
impl TransportError {
	/// Wraps a transport-specific network error.
	pub fn network(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::Network { source: Box::new(src) }
	}
}
#[cfg(feature = "reqwest")]
impl From<ReqwestError> for TransportError {
	fn from(e: ReqwestError) -> Self {
		Self::network(e)
	}
}

/// Reasons an upstream token response was rejected.
#[derive(Debug, ThisError)]
pub enum TokenResponseError {
	/// Response omitted the access token or returned an empty one.
	#[error("Token response is missing access_token.")]
	MissingAccessToken,
	/// Response omitted `expires_in`.
	#[error("Token response is missing expires_in.")]
	MissingExpiresIn,
	/// Response returned a non-positive `expires_in`.
	#[error("The expires_in value must be positive.")]
	NonPositiveExpiresIn,
	/// Response returned an `expires_in` that overflows the clock.
	#[error("The expires_in value exceeds the supported range.")]
	ExpiresInOutOfRange,
	/// Response carried an RFC 3339 expiry that could not be parsed.
	#[error("Token response expireTime is not RFC 3339.")]
	InvalidExpireTime(#[source] time::error::Parse),
	/// Token contains bytes that are not valid in an HTTP header.
	#[error("Token cannot be encoded as an Authorization header.")]
	InvalidHeaderValue,
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn refresh_failures_are_classified() {
		let transient: Error = TransientError::TokenEndpoint {
			message: "busy".into(),
			status: Some(503),
			retry_after: None,
		}
		.into();
		let cancelled: Error = Cancellation::DeadlineExceeded.into();
		let config: Error = ConfigError::missing("wif", "audience").into();

		assert!(transient.is_refresh_failure());
		assert!(Error::from(TokenResponseError::MissingAccessToken).is_refresh_failure());
		assert!(!cancelled.is_refresh_failure());
		assert!(cancelled.is_cancelled());
		assert!(!config.is_refresh_failure());
		assert_eq!(
			config.to_string(),
			"Setting `audience` is required for wif credentials."
		);
	}
}
