//! TTL caches for IdP material: the signing key set and the admin access token.
//!
//! Both caches share [`TtlCache`]: an immutable snapshot swapped under a lock, a single-flight
//! guard so concurrent misses trigger one upstream call, and refresh work that runs on a spawned
//! task so a cancelled caller never aborts a refresh other callers are waiting on.

pub mod admin_token;
pub mod signing_keys;

pub use admin_token::AdminCredentialCache;
pub use signing_keys::SigningKeyCache;

// std
use std::{fmt::Debug, future::Future};
// crates.io
use tokio::sync::{Mutex, RwLock};
// self
use crate::{
	_prelude::*,
	clock::Clock,
	metrics::{self, CacheStats},
};

const MAX_LIFETIME: Duration = Duration::from_secs(365 * 24 * 60 * 60);

/// Cached value together with its validity window.
#[derive(Debug)]
pub struct Expiring<T> {
	/// Shared cached value.
	pub value: Arc<T>,
	/// When the value was stored.
	pub fetched_at: DateTime<Utc>,
	/// When the value stops being valid.
	pub expires_at: DateTime<Utc>,
}
impl<T> Expiring<T> {
	/// Whether the value may still be served at `now`, given a safety `margin` before expiry.
	pub fn is_valid_at(&self, now: DateTime<Utc>, margin: TimeDelta) -> bool {
		now + margin < self.expires_at
	}
}

#[derive(Debug)]
pub(crate) struct TtlCache<T> {
	name: &'static str,
	margin: TimeDelta,
	clock: Arc<dyn Clock>,
	slot: RwLock<Option<Arc<Expiring<T>>>>,
	single_flight: Mutex<()>,
	stats: Arc<CacheStats>,
}
impl<T> TtlCache<T>
where
	T: Debug + Send + Sync + 'static,
{
	pub(crate) fn new(name: &'static str, margin: Duration, clock: Arc<dyn Clock>) -> Self {
		Self {
			name,
			margin: to_delta(margin),
			clock,
			slot: RwLock::new(None),
			single_flight: Mutex::new(()),
			stats: CacheStats::new(),
		}
	}

	pub(crate) fn stats(&self) -> Arc<CacheStats> {
		self.stats.clone()
	}

	pub(crate) async fn snapshot(&self) -> Option<Arc<Expiring<T>>> {
		self.slot.read().await.clone()
	}

	pub(crate) async fn clear(&self) {
		*self.slot.write().await = None;
	}

	/// Return the cached value, or run `fetch` once on behalf of every waiting caller.
	///
	/// `fetch` yields the new value and its lifetime; the future runs on a spawned task.
	pub(crate) async fn get_or_refresh<F, Fut>(self: &Arc<Self>, fetch: F) -> Result<Arc<T>>
	where
		F: FnOnce() -> Fut,
		Fut: Future<Output = Result<(T, Duration)>> + Send + 'static,
	{
		if let Some(value) = self.fresh().await {
			self.observe_hit();

			return Ok(value);
		}

		let cache = self.clone();
		let refresh = fetch();

		tokio::spawn(async move { cache.refresh(refresh).await }).await?
	}

	async fn refresh<Fut>(&self, refresh: Fut) -> Result<Arc<T>>
	where
		Fut: Future<Output = Result<(T, Duration)>>,
	{
		let _guard = self.single_flight.lock().await;

		// Another caller may have refreshed while this one waited for the guard.
		if let Some(value) = self.fresh().await {
			self.observe_hit();

			return Ok(value);
		}

		self.observe_miss();

		let started = Instant::now();

		match refresh.await {
			Ok((value, lifetime)) => {
				let fetched_at = self.clock.now();
				let entry = Arc::new(Expiring {
					value: Arc::new(value),
					fetched_at,
					expires_at: fetched_at + to_delta(lifetime),
				});
				let value = entry.value.clone();

				*self.slot.write().await = Some(entry);

				let elapsed = started.elapsed();

				self.stats.record_refresh_success(elapsed);
				metrics::record_refresh_success(self.name, elapsed);

				tracing::debug!(cache = self.name, elapsed = ?elapsed, ?lifetime, "cache refreshed");

				Ok(value)
			},
			Err(err) => {
				self.clear().await;
				self.stats.record_refresh_error();
				metrics::record_refresh_error(self.name);

				tracing::warn!(cache = self.name, error = %err, "cache refresh failed");

				Err(err)
			},
		}
	}

	async fn fresh(&self) -> Option<Arc<T>> {
		let now = self.clock.now();

		self.slot
			.read()
			.await
			.as_ref()
			.filter(|entry| entry.is_valid_at(now, self.margin))
			.map(|entry| entry.value.clone())
	}

	fn observe_hit(&self) {
		self.stats.record_hit();
		metrics::record_cache_hit(self.name);
	}

	fn observe_miss(&self) {
		self.stats.record_miss();
		metrics::record_cache_miss(self.name);
	}
}

fn to_delta(duration: Duration) -> TimeDelta {
	TimeDelta::from_std(duration.min(MAX_LIFETIME)).unwrap_or_default()
}
