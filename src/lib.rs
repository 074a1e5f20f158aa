//! Single-flight bearer token cache for plugin HTTP clients: metadata-server, signed-JWT,
//! federated, and impersonated credentials behind one retriever contract, refreshed at most
//! once per identity and scope set no matter how many requests are waiting.

#![deny(clippy::all, missing_docs, unused_crate_dependencies)]

pub mod auth;
pub mod cache;
pub mod clock;
pub mod config;
pub mod context;
pub mod error;
pub mod http;
pub mod inject;
pub mod obs;
pub mod retriever;
pub mod sources;
pub mod transport;

mod _prelude {
	pub use std::{
		collections::HashMap,
		error::Error as StdError,
		fmt::{Debug, Display, Formatter, Result as FmtResult},
		future::Future,
		pin::Pin,
		str::FromStr,
		sync::Arc,
	};

	pub use parking_lot::{Mutex, RwLock};
	#[cfg(feature = "reqwest")]
	pub use reqwest::{Client as ReqwestClient, Error as ReqwestError};
	pub use serde::{Deserialize, Serialize};
	pub use thiserror::Error as ThisError;
	pub use time::{Duration, OffsetDateTime};
	pub use url::Url;

	pub use crate::error::{Error, Result};
}

pub use cache::{TokenCache, TokenCacheBuilder};
pub use context::RequestContext;
pub use error::{Error, Result};
pub use oauth2;
pub use retriever::TokenRetriever;
#[cfg(feature = "reqwest")] pub use reqwest;
pub use tokio_util::sync::CancellationToken;
pub use url;
#[cfg(test)] use {color_eyre as _, httpmock as _, tempfile as _};
