//! Per-(identity, scope key) refresh coordinator.

// crates.io
use tokio::sync::Notify;
// self
use crate::{
	_prelude::*,
	auth::{AccessToken, IdentityKey, ScopeKey, ScopeSet},
	cache::{CacheMetrics, CachePolicy},
	context::RequestContext,
	error::TokenResponseError,
	obs::{self, CacheOutcome, RefreshSpan},
	retriever::TokenRetriever,
};

#[derive(Default)]
struct EntryState {
	token: Option<AccessToken>,
	refreshing: bool,
}

/// Owns one cached token and admits at most one upstream refresh at a time.
pub(crate) struct ScopeEntry {
	identity: IdentityKey,
	scope_key: ScopeKey,
	scopes: ScopeSet,
	retriever: Arc<dyn TokenRetriever>,
	state: Mutex<EntryState>,
	refreshed: Notify,
}
impl ScopeEntry {
	pub(crate) fn new(
		retriever: Arc<dyn TokenRetriever>,
		scope_key: ScopeKey,
		scopes: ScopeSet,
	) -> Self {
		Self {
			identity: retriever.identity_key().clone(),
			scope_key,
			scopes,
			retriever,
			state: Mutex::new(EntryState::default()),
			refreshed: Notify::new(),
		}
	}

	/// Returns a usable token, refreshing it first when it is missing or inside the margin.
	///
	/// Callers that find a refresh in flight wait for it to finish and then re-check. A woken
	/// caller never inherits the refresher's error; it either finds the new token or becomes the
	/// next refresher.
	pub(crate) async fn access_token(
		&self,
		ctx: &RequestContext,
		policy: &CachePolicy,
		metrics: &CacheMetrics,
	) -> Result<String> {
		if let Some(reason) = ctx.error() {
			let err = Error::from(reason);

			self.observe(metrics, CacheOutcome::Cancelled, Some(&err));

			return Err(err);
		}

		loop {
			let notified = {
				let mut state = self.state.lock();

				if let Some(token) =
					state.token.as_ref().filter(|t| t.is_usable_at(policy.now(), policy.safety_margin))
				{
					let secret = token.secret.expose().to_owned();

					drop(state);
					self.observe(metrics, CacheOutcome::Hit, None);

					return Ok(secret);
				}
				if !state.refreshing {
					state.refreshing = true;

					break;
				}

				// Registered before the lock is released, so a refresh finishing in between still
				// wakes this caller.
				self.refreshed.notified()
			};

			self.observe(metrics, CacheOutcome::Wait, None);

			tokio::select! {
				_ = notified => {},
				reason = ctx.done() => {
					let err = Error::from(reason);

					self.observe(metrics, CacheOutcome::Cancelled, Some(&err));

					return Err(err);
				},
			}
		}

		self.refresh(ctx, metrics).await
	}

	async fn refresh(&self, ctx: &RequestContext, metrics: &CacheMetrics) -> Result<String> {
		let mut guard = RefreshGuard { entry: self, token: None };

		self.observe(metrics, CacheOutcome::Refresh, None);

		let span =
			RefreshSpan::new(self.retriever.kind(), "refresh", &self.identity, &self.scope_key);
		let fetched = span
			.instrument(ctx.run(self.retriever.fetch_token(ctx, &self.scopes)))
			.await
			.and_then(|token| {
				if token.secret.is_empty() {
					Err(Error::from(TokenResponseError::MissingAccessToken))
				} else {
					Ok(token)
				}
			});

		match fetched {
			Ok(token) => {
				let secret = token.secret.expose().to_owned();

				guard.token = Some(token);
				self.observe(metrics, CacheOutcome::Success, None);

				Ok(secret)
			},
			Err(err) => {
				let outcome =
					if err.is_cancelled() { CacheOutcome::Cancelled } else { CacheOutcome::Failure };

				self.observe(metrics, outcome, Some(&err));

				Err(err)
			},
		}
	}

	fn observe(&self, metrics: &CacheMetrics, outcome: CacheOutcome, error: Option<&Error>) {
		let kind = self.retriever.kind();

		metrics.record(outcome);
		obs::record_cache_outcome(kind, outcome);
		obs::log_cache_outcome(kind, outcome, &self.identity, &self.scope_key, error);
	}
}

/// Ends a refresh on every exit path, including panics and dropped futures.
struct RefreshGuard<'a> {
	entry: &'a ScopeEntry,
	token: Option<AccessToken>,
}
impl Drop for RefreshGuard<'_> {
	fn drop(&mut self) {
		{
			let mut state = self.entry.state.lock();

			state.refreshing = false;

			if let Some(token) = self.token.take() {
				state.token = Some(token);
			}
		}

		self.entry.refreshed.notify_waiters();
	}
}
