//! Credential identities used to partition the token cache.

// std
use std::{borrow::Borrow, ops::Deref};
// self
use crate::_prelude::*;

const IDENTITY_MAX_LEN: usize = 512;

/// Error returned when identity validation fails.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, ThisError)]
pub enum IdentifierError {
	/// The identity was empty.
	#[error("Identity key cannot be empty.")]
	Empty,
	/// The identity contains whitespace characters.
	#[error("Identity key contains whitespace.")]
	ContainsWhitespace,
	/// The identity exceeded the allowed byte count.
	#[error("Identity key exceeds {max} bytes.")]
	TooLong {
		/// Maximum permitted byte count.
		max: usize,
	},
}

/// Stable, collision-free key identifying one configured credential source.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct IdentityKey(String);
impl IdentityKey {
	/// Creates a new identity after validation.
	pub fn new(value: impl AsRef<str>) -> Result<Self, IdentifierError> {
		let view = value.as_ref();

		validate_view(view)?;

		Ok(Self(view.to_owned()))
	}

	/// Derives a new identity for a credential layered on top of this one.
	pub fn layered(&self, layer: &str, target: &str) -> Result<Self, IdentifierError> {
		Self::new(format!("{}_{layer}-{target}", self.0))
	}
}
impl Deref for IdentityKey {
	type Target = str;

	fn deref(&self) -> &Self::Target {
		&self.0
	}
}
impl AsRef<str> for IdentityKey {
	fn as_ref(&self) -> &str {
		&self.0
	}
}
impl From<IdentityKey> for String {
	fn from(value: IdentityKey) -> Self {
		value.0
	}
}
impl TryFrom<String> for IdentityKey {
	type Error = IdentifierError;

	fn try_from(value: String) -> Result<Self, Self::Error> {
		validate_view(&value)?;

		Ok(Self(value))
	}
}
impl Borrow<str> for IdentityKey {
	fn borrow(&self) -> &str {
		&self.0
	}
}
impl Debug for IdentityKey {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		write!(f, "Identity({})", self.0)
	}
}
impl Display for IdentityKey {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(&self.0)
	}
}
impl FromStr for IdentityKey {
	type Err = IdentifierError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		Self::new(s)
	}
}

/// Components that make up a data-source credential identity.
///
/// The rendered key is `{auth}_{data_source_id}_{update_version}_{route_path}_{route_method}`, so
/// editing a data source (which bumps its version) or routing through another plugin route
/// yields a fresh cache partition.
///
/// The rendered key must pass [`IdentityKey`] validation, so a route path or method containing
/// whitespace (or a key longer than 512 bytes) makes [`CredentialIdentity::key`] fail with
/// [`IdentifierError`] instead of producing a key.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CredentialIdentity {
	/// Authentication type label (`gce`, `jwt`, `wif`, ...).
	pub auth_type: String,
	/// Data-source numeric identifier.
	pub data_source_id: i64,
	/// Data-source update version or timestamp.
	pub update_version: i64,
	/// Plugin route path the credential is attached to.
	pub route_path: String,
	/// Plugin route HTTP method.
	pub route_method: String,
}
impl CredentialIdentity {
	/// Creates identity components for the provided authentication type.
	pub fn new(auth_type: impl Into<String>, data_source_id: i64, update_version: i64) -> Self {
		Self {
			auth_type: auth_type.into(),
			data_source_id,
			update_version,
			route_path: String::new(),
			route_method: String::new(),
		}
	}

	/// Sets the route path and method.
	pub fn with_route(mut self, path: impl Into<String>, method: impl Into<String>) -> Self {
		self.route_path = path.into();
		self.route_method = method.into();

		self
	}

	/// Renders and validates the identity key.
	pub fn key(&self) -> Result<IdentityKey, IdentifierError> {
		IdentityKey::new(format!(
			"{}_{}_{}_{}_{}",
			self.auth_type,
			self.data_source_id,
			self.update_version,
			self.route_path,
			self.route_method
		))
	}
}

fn validate_view(view: &str) -> Result<(), IdentifierError> {
	if view.is_empty() {
		return Err(IdentifierError::Empty);
	}
	if view.chars().any(char::is_whitespace) {
		return Err(IdentifierError::ContainsWhitespace);
	}
	if view.len() > IDENTITY_MAX_LEN {
		return Err(IdentifierError::TooLong { max: IDENTITY_MAX_LEN });
	}

	Ok(())
}
