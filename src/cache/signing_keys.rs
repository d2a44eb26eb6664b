//! Signing key cache backed by the IdP's published JWKS.

// crates.io
use jsonwebtoken::jwk::JwkSet;
// self
use crate::{
	_prelude::*,
	cache::TtlCache,
	clock::{Clock, SystemClock},
	idp::IdentityProvider,
	metrics::CacheStats,
};

/// Fixed lifetime of a fetched key set.
pub const SIGNING_KEY_TTL: Duration = Duration::from_secs(3600);

const CACHE_NAME: &str = "signing_keys";

/// Shared cache of the IdP's current public signing keys.
///
/// A fetched set is served unchanged until its TTL elapses, then replaced wholesale. There is no
/// stale fallback: once expired, a failed fetch fails every verification until a fetch succeeds.
#[derive(Clone, Debug)]
pub struct SigningKeyCache {
	idp: Arc<dyn IdentityProvider>,
	inner: Arc<TtlCache<JwkSet>>,
}
impl SigningKeyCache {
	/// Create a cache reading the system clock.
	pub fn new(idp: Arc<dyn IdentityProvider>) -> Self {
		Self::with_clock(idp, Arc::new(SystemClock))
	}

	/// Create a cache driven by the supplied clock.
	pub fn with_clock(idp: Arc<dyn IdentityProvider>, clock: Arc<dyn Clock>) -> Self {
		Self { idp, inner: Arc::new(TtlCache::new(CACHE_NAME, Duration::ZERO, clock)) }
	}

	/// Return the current key set, fetching it when absent or expired.
	///
	/// Transport failures and non-success statuses surface as [`Error::DependencyUnavailable`].
	#[tracing::instrument(skip(self))]
	pub async fn get_keys(&self) -> Result<Arc<JwkSet>> {
		let idp = self.idp.clone();

		self.inner
			.get_or_refresh(move || async move {
				let jwks = idp.fetch_jwks().await.map_err(|err| err.into_dependency("jwks"))?;

				tracing::info!(keys = jwks.keys.len(), "signing keys fetched");

				Ok((jwks, SIGNING_KEY_TTL))
			})
			.await
	}

	/// When the cached key set was fetched, if one is cached.
	pub async fn fetched_at(&self) -> Option<DateTime<Utc>> {
		self.inner.snapshot().await.map(|entry| entry.fetched_at)
	}

	/// Drop the cached key set so the next lookup fetches a fresh one.
	pub async fn invalidate(&self) {
		self.inner.clear().await;
	}

	/// Per-cache counters.
	pub fn stats(&self) -> Arc<CacheStats> {
		self.inner.stats()
	}
}
