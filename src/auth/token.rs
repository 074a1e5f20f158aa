//! Access token values handed out by retrievers and held by the cache.

pub mod secret;

// self
use crate::{_prelude::*, auth::token::secret::TokenSecret};

/// Immutable bearer token paired with its absolute expiry.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessToken {
	/// Bearer secret; callers must avoid logging it.
	pub secret: TokenSecret,
	/// Instant after which upstream no longer honors the token.
	pub expires_at: OffsetDateTime,
}
impl AccessToken {
	/// Wraps a token string and its expiry.
	pub fn new(token: impl Into<String>, expires_at: OffsetDateTime) -> Self {
		Self { secret: TokenSecret::new(token), expires_at }
	}

	/// Builds a token that expires `expires_in` after `issued_at`.
	pub fn expiring_in(
		token: impl Into<String>,
		issued_at: OffsetDateTime,
		expires_in: Duration,
	) -> Self {
		Self::new(token, issued_at + expires_in)
	}

	/// Returns `true` when the token stays valid for longer than `margin` past `now`.
	pub fn is_usable_at(&self, now: OffsetDateTime, margin: Duration) -> bool {
		self.expires_at > now + margin
	}

	/// Remaining lifetime relative to `now`; negative once expired.
	pub fn remaining_at(&self, now: OffsetDateTime) -> Duration {
		self.expires_at - now
	}
}
impl Debug for AccessToken {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("AccessToken")
			.field("secret", &self.secret)
			.field("expires_at", &self.expires_at)
			.finish()
	}
}
