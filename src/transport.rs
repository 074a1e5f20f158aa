//! Type-erased request dispatch shared by the built-in sources.
//!
//! [`SourceTransport`] pairs a [`TokenHttpClient`] with a [`TransportErrorMapper`] once, so
//! sources and configuration code can pass a single cloneable handle around instead of carrying
//! two generic parameters everywhere.

// crates.io
use oauth2::{AsyncHttpClient, HttpClientError, HttpRequest, HttpResponse};
// self
use crate::{
	_prelude::*,
	error::{ConfigError, TransientError, TransportError},
	http::{ResponseMetadata, ResponseMetadataSlot, TokenHttpClient},
	obs::SourceKind,
};
#[cfg(feature = "reqwest")] use crate::http::ReqwestHttpClient;

/// Boxed future returned by [`SourceTransport::send`].
pub type TransportFuture<'a> = Pin<Box<dyn Future<Output = Result<HttpResponse>> + 'a + Send>>;

/// Maps HTTP transport failures into crate [`Error`] values.
pub trait TransportErrorMapper<E>
where
	Self: 'static + Send + Sync,
	E: 'static + Send + Sync + StdError,
{
	/// Converts an [`HttpClientError`] emitted by the transport into a crate error.
	fn map_transport_error(
		&self,
		kind: SourceKind,
		metadata: Option<&ResponseMetadata>,
		error: HttpClientError<E>,
	) -> Error;
}

/// Default mapper for reqwest-backed transports.
#[cfg(feature = "reqwest")]
#[derive(Clone, Debug, Default)]
pub struct ReqwestTransportErrorMapper;
#[cfg(feature = "reqwest")]
impl TransportErrorMapper<ReqwestError> for ReqwestTransportErrorMapper {
	fn map_transport_error(
		&self,
		kind: SourceKind,
		meta: Option<&ResponseMetadata>,
		err: HttpClientError<ReqwestError>,
	) -> Error {
		match err {
			HttpClientError::Reqwest(inner) => map_reqwest_error(kind, meta, *inner),
			HttpClientError::Http(inner) => ConfigError::from(inner).into(),
			HttpClientError::Io(inner) => TransportError::Io(inner).into(),
			HttpClientError::Other(message) => transient(
				format!("{kind} HTTP client error: {message}"),
				meta,
			),
			_ => transient(format!("{kind} HTTP client error"), meta),
		}
	}
}

/// Cloneable handle that sends one upstream request and classifies transport failures.
#[derive(Clone)]
pub struct SourceTransport(Arc<dyn Dispatch>);
impl SourceTransport {
	/// Pairs an HTTP client with the mapper that understands its errors.
	pub fn new<C, M>(http_client: C, mapper: M) -> Self
	where
		C: TokenHttpClient,
		M: TransportErrorMapper<C::TransportError>,
	{
		Self::from_shared(Arc::new(http_client), Arc::new(mapper))
	}

	/// Same as [`SourceTransport::new`] for already shared components.
	pub fn from_shared<C, M>(http_client: Arc<C>, mapper: Arc<M>) -> Self
	where
		C: ?Sized + TokenHttpClient,
		M: ?Sized + TransportErrorMapper<C::TransportError>,
	{
		Self(Arc::new(Dispatcher { http_client, mapper }))
	}

	/// Reqwest transport around an existing client.
	#[cfg(feature = "reqwest")]
	pub fn reqwest(client: ReqwestClient) -> Self {
		Self::new(ReqwestHttpClient::with_client(client), ReqwestTransportErrorMapper)
	}

	/// Sends `request`, returning the raw response whatever its status.
	///
	/// Only failures to obtain a response become errors; status handling is left to the caller.
	pub fn send(&self, kind: SourceKind, request: HttpRequest) -> TransportFuture<'_> {
		self.0.send(kind, request)
	}
}
#[cfg(feature = "reqwest")]
impl Default for SourceTransport {
	fn default() -> Self {
		Self::new(ReqwestHttpClient::default(), ReqwestTransportErrorMapper)
	}
}
impl Debug for SourceTransport {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str("SourceTransport")
	}
}

trait Dispatch
where
	Self: Send + Sync,
{
	fn send(&self, kind: SourceKind, request: HttpRequest) -> TransportFuture<'_>;
}

struct Dispatcher<C, M>
where
	C: ?Sized,
	M: ?Sized,
{
	http_client: Arc<C>,
	mapper: Arc<M>,
}
impl<C, M> Dispatch for Dispatcher<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	fn send(&self, kind: SourceKind, request: HttpRequest) -> TransportFuture<'_> {
		Box::pin(async move {
			let meta = ResponseMetadataSlot::default();
			let handle = self.http_client.with_metadata(meta.clone());

			handle
				.call(request)
				.await
				.map_err(|err| self.mapper.map_transport_error(kind, meta.take().as_ref(), err))
		})
	}
}

#[cfg(feature = "reqwest")]
fn map_reqwest_error(kind: SourceKind, meta: Option<&ResponseMetadata>, err: ReqwestError) -> Error {
	if err.is_builder() {
		return ConfigError::from(err).into();
	}
	if err.is_timeout() {
		return TransientError::TokenEndpoint {
			message: format!("request to the {kind} endpoint timed out"),
			status: meta_status(meta).or_else(|| err.status().map(|code| code.as_u16())),
			retry_after: meta.and_then(|value| value.retry_after),
		}
		.into();
	}

	TransportError::from(err).into()
}

fn transient(message: String, meta: Option<&ResponseMetadata>) -> Error {
	TransientError::TokenEndpoint {
		message,
		status: meta_status(meta),
		retry_after: meta.and_then(|value| value.retry_after),
	}
	.into()
}

fn meta_status(meta: Option<&ResponseMetadata>) -> Option<u16> {
	meta.and_then(|value| value.status)
}
