//! Admin credential cache for the IdP's administrative API.

// self
use crate::{
	_prelude::*,
	cache::TtlCache,
	clock::{Clock, SystemClock},
	idp::IdentityProvider,
	metrics::CacheStats,
};

/// Window before real expiry in which a cached admin token is already treated as expired.
pub const ADMIN_TOKEN_SAFETY_MARGIN: Duration = Duration::from_secs(30);

const CACHE_NAME: &str = "admin_token";

/// Shared cache of the client-credentials token used for admin API calls.
#[derive(Clone, Debug)]
pub struct AdminCredentialCache {
	idp: Arc<dyn IdentityProvider>,
	inner: Arc<TtlCache<String>>,
}
impl AdminCredentialCache {
	/// Create a cache reading the system clock.
	pub fn new(idp: Arc<dyn IdentityProvider>) -> Self {
		Self::with_clock(idp, Arc::new(SystemClock))
	}

	/// Create a cache driven by the supplied clock.
	pub fn with_clock(idp: Arc<dyn IdentityProvider>, clock: Arc<dyn Clock>) -> Self {
		Self { idp, inner: Arc::new(TtlCache::new(CACHE_NAME, ADMIN_TOKEN_SAFETY_MARGIN, clock)) }
	}

	/// Return a token valid for at least the safety margin, requesting a new one otherwise.
	///
	/// Missing client credentials surface as [`Error::Configuration`]; an unreachable or refusing
	/// token endpoint as [`Error::DependencyUnavailable`].
	#[tracing::instrument(skip(self))]
	pub async fn get_admin_token(&self) -> Result<Arc<String>> {
		let idp = self.idp.clone();

		self.inner
			.get_or_refresh(move || async move {
				let response =
					idp.client_credentials().await.map_err(|err| err.into_dependency("admin_token"))?;

				tracing::info!(expires_in = response.expires_in, "admin token obtained");

				Ok((response.access_token, Duration::from_secs(response.expires_in)))
			})
			.await
	}

	/// Drop the cached token, e.g. after the admin API rejected it.
	pub async fn invalidate(&self) {
		self.inner.clear().await;
	}

	/// Per-cache counters.
	pub fn stats(&self) -> Arc<CacheStats> {
		self.inner.stats()
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;
	use crate::{clock::ManualClock, idp::testing::FakeIdp};

	#[tokio::test]
	async fn token_is_refreshed_inside_the_safety_margin() {
		let clock = ManualClock::default();
		let idp = Arc::new(FakeIdp::default());
		let cache = AdminCredentialCache::with_clock(idp.clone(), Arc::new(clock.clone()));

		idp.set_token_lifetime(300);

		assert_eq!(*cache.get_admin_token().await.expect("token"), "admin-token-1");

		clock.advance(Duration::from_secs(269));

		assert_eq!(*cache.get_admin_token().await.expect("cached"), "admin-token-1");

		clock.advance(Duration::from_secs(1));

		assert_eq!(*cache.get_admin_token().await.expect("refreshed"), "admin-token-2");
		assert_eq!(idp.token_calls(), 2);
	}

	#[tokio::test]
	async fn token_failure_propagates_as_dependency_unavailable() {
		let idp = Arc::new(FakeIdp::default());
		let cache = AdminCredentialCache::with_clock(idp.clone(), Arc::new(ManualClock::default()));

		idp.fail_token(true);

		let err = cache.get_admin_token().await.unwrap_err();

		assert!(matches!(err, Error::DependencyUnavailable { dependency: "admin_token", .. }));

		idp.fail_token(false);

		assert_eq!(*cache.get_admin_token().await.expect("recovered"), "admin-token-2");
	}
}
