//! Scope modeling helpers and the canonical scope key used by the cache index.

// std
use std::slice::Iter;
// crates.io
use serde::{Deserializer, Serializer, de::Error as DeError, ser::SerializeSeq};
// self
use crate::_prelude::*;

/// Errors emitted when validating scopes.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
pub enum ScopeValidationError {
	/// Empty scope entries are not allowed.
	#[error("Scope entries cannot be empty.")]
	Empty,
	/// Scopes cannot contain embedded whitespace characters.
	#[error("Scope contains whitespace: {scope}.")]
	ContainsWhitespace {
		/// The offending scope string.
		scope: String,
	},
}

/// Normalized collection of permission scopes.
///
/// Scopes are copied and sorted by byte value so two collections with the same members compare,
/// hash, and render identically regardless of input order. Repeated members are kept, so
/// `["x", "x"]` and `["x"]` are distinct keys. The caller's collection is never touched.
#[derive(Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ScopeSet {
	scopes: Arc<[String]>,
}
impl ScopeSet {
	/// Creates a normalized scope set from any iterator.
	pub fn new<I, S>(scopes: I) -> Result<Self, ScopeValidationError>
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		Ok(Self { scopes: normalize(scopes)? })
	}

	/// Number of scopes, counting repeats.
	pub fn len(&self) -> usize {
		self.scopes.len()
	}

	/// Returns true if no scopes are defined.
	pub fn is_empty(&self) -> bool {
		self.scopes.is_empty()
	}

	/// Returns true if the normalized set contains the provided scope.
	pub fn contains(&self, scope: &str) -> bool {
		self.scopes.binary_search_by(|candidate| candidate.as_str().cmp(scope)).is_ok()
	}

	/// Iterator over normalized scopes.
	pub fn iter(&self) -> ScopeIter<'_> {
		ScopeIter { inner: self.scopes.iter() }
	}

	/// Returns the normalized string representation (space-delimited).
	pub fn normalized(&self) -> String {
		self.scopes.join(" ")
	}

	/// Returns the canonical cache key for this set.
	pub fn key(&self) -> ScopeKey {
		ScopeKey(self.normalized())
	}

	/// Returns a new set that also contains `scope`.
	pub fn with_scope(&self, scope: impl Into<String>) -> Result<Self, ScopeValidationError> {
		Self::new(self.scopes.iter().cloned().chain([scope.into()]))
	}

	/// Returns the underlying slice of scope strings.
	pub fn as_slice(&self) -> &[String] {
		&self.scopes
	}
}
impl Debug for ScopeSet {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_tuple("ScopeSet").field(&self.scopes).finish()
	}
}
impl Display for ScopeSet {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(&self.normalized())
	}
}

/// Iterator over scope strings.
pub struct ScopeIter<'a> {
	inner: Iter<'a, String>,
}
impl<'a> Iterator for ScopeIter<'a> {
	type Item = &'a str;

	fn next(&mut self) -> Option<Self::Item> {
		self.inner.next().map(|s| s.as_str())
	}
}
impl TryFrom<Vec<String>> for ScopeSet {
	type Error = ScopeValidationError;

	fn try_from(value: Vec<String>) -> Result<Self, Self::Error> {
		Self::new(value)
	}
}
impl TryFrom<&[String]> for ScopeSet {
	type Error = ScopeValidationError;

	fn try_from(value: &[String]) -> Result<Self, Self::Error> {
		Self::new(value.iter().cloned())
	}
}
impl<'a> IntoIterator for &'a ScopeSet {
	type IntoIter = ScopeIter<'a>;
	type Item = &'a str;

	fn into_iter(self) -> Self::IntoIter {
		self.iter()
	}
}
impl FromStr for ScopeSet {
	type Err = ScopeValidationError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		if s.is_empty() {
			return Ok(Self::default());
		}
		if s.chars().all(char::is_whitespace) {
			return Err(ScopeValidationError::Empty);
		}

		Self::new(s.split_whitespace())
	}
}
impl Serialize for ScopeSet {
	fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
	where
		S: Serializer,
	{
		let mut seq = serializer.serialize_seq(Some(self.scopes.len()))?;

		for scope in self.scopes.iter() {
			seq.serialize_element(scope)?;
		}

		seq.end()
	}
}
impl<'de> Deserialize<'de> for ScopeSet {
	fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
	where
		D: Deserializer<'de>,
	{
		let values = <Vec<String>>::deserialize(deserializer)?;

		ScopeSet::new(values).map_err(DeError::custom)
	}
}

/// Canonical, comparable form of a [`ScopeSet`]: sorted members joined by one space.
#[derive(Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ScopeKey(String);
impl ScopeKey {
	/// Returns the key as a string slice; empty for an empty scope set.
	pub fn as_str(&self) -> &str {
		&self.0
	}
}
impl From<&ScopeSet> for ScopeKey {
	fn from(value: &ScopeSet) -> Self {
		value.key()
	}
}
impl AsRef<str> for ScopeKey {
	fn as_ref(&self) -> &str {
		&self.0
	}
}
impl Debug for ScopeKey {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		write!(f, "ScopeKey({:?})", self.0)
	}
}
impl Display for ScopeKey {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(&self.0)
	}
}

fn normalize<I, S>(scopes: I) -> Result<Arc<[String]>, ScopeValidationError>
where
	I: IntoIterator<Item = S>,
	S: Into<String>,
{
	let mut sorted = Vec::new();

	for scope in scopes {
		let owned: String = scope.into();

		if owned.is_empty() {
			return Err(ScopeValidationError::Empty);
		}
		if owned.chars().any(char::is_whitespace) {
			return Err(ScopeValidationError::ContainsWhitespace { scope: owned });
		}

		sorted.push(owned);
	}

	sorted.sort_unstable();

	Ok(Arc::from(sorted))
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn member_order_does_not_change_the_key() {
		let permutations = [
			["monitoring.read", "cloud-platform", "Zeta"],
			["cloud-platform", "Zeta", "monitoring.read"],
			["Zeta", "monitoring.read", "cloud-platform"],
		];
		let keys = permutations
			.iter()
			.map(|scopes| ScopeSet::new(*scopes).expect("Scope fixture should be valid.").key())
			.collect::<Vec<_>>();

		assert!(keys.windows(2).all(|pair| pair[0] == pair[1]));
		// Byte order puts uppercase before lowercase.
		assert_eq!(keys[0].as_str(), "Zeta cloud-platform monitoring.read");
	}

	#[test]
	fn caller_collection_is_left_untouched() {
		let raw = vec!["y".to_string(), "x".to_string()];
		let set = ScopeSet::try_from(raw.as_slice()).expect("Slice-based scope set should build.");

		assert_eq!(raw, ["y", "x"]);
		assert_eq!(set.as_slice(), ["x", "y"]);
	}

	#[test]
	fn empty_set_has_empty_key() {
		assert_eq!(ScopeSet::default().key().as_str(), "");
		assert_eq!(ScopeSet::new(Vec::<String>::new()).expect("Empty set is valid.").len(), 0);
	}

	#[test]
	fn repeated_members_stay_distinct() {
		let twice = ScopeSet::new(["x", "x"]).expect("Scope set should be valid.");
		let once = ScopeSet::new(["x"]).expect("Scope set should be valid.");

		assert_eq!(twice.key().as_str(), "x x");
		assert_eq!(twice.len(), 2);
		assert_ne!(twice.key(), once.key());

		let lhs = ScopeSet::new(["profile", "email", "email"]).expect("Scope set should be valid.");
		let rhs = ScopeSet::new(["email", "profile", "email"]).expect("Scope set should be valid.");

		assert_eq!(lhs, rhs);
		assert_eq!(lhs.key().as_str(), "email email profile");
	}

	#[test]
	fn malformed_scopes_are_rejected() {
		assert_eq!(ScopeSet::new([""]), Err(ScopeValidationError::Empty));
		assert!(matches!(
			ScopeSet::new([" profile "]),
			Err(ScopeValidationError::ContainsWhitespace { .. })
		));
		assert!(ScopeSet::from_str("").is_ok(), "Empty string represents an empty scope set.");
		assert!(ScopeSet::from_str("   ").is_err(), "Whitespace-only input must be rejected.");
	}

	#[test]
	fn with_scope_extends_and_normalizes() {
		let scopes = ScopeSet::from_str("monitoring.read").expect("Scope string should parse.");
		let extended = scopes
			.with_scope("https://www.googleapis.com/auth/cloud-platform")
			.expect("Extended scope set should be valid.");

		assert!(extended.contains("monitoring.read"));
		assert_eq!(extended.len(), 2);
		assert_eq!(
			extended.iter().collect::<Vec<_>>(),
			["https://www.googleapis.com/auth/cloud-platform", "monitoring.read"]
		);
	}
}
