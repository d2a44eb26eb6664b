//! Metrics helpers and per-cache telemetry bookkeeping.
//!
//! Every cache keeps its own [`CacheStats`]; with the `metrics` feature the same events are also
//! published through the `metrics` facade, labelled by cache name.

// std
#[cfg(feature = "prometheus")] use std::sync::OnceLock;
use std::sync::atomic::{AtomicU64, Ordering};
// crates.io
#[cfg(feature = "metrics")] use metrics::Label;
#[cfg(feature = "prometheus")]
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
#[cfg(feature = "metrics")] use smallvec::SmallVec;
// self
use crate::_prelude::*;

#[cfg(feature = "metrics")]
type LabelSet = SmallVec<[Label; 2]>;

#[cfg(feature = "metrics")]
const METRIC_REQUESTS_TOTAL: &str = "helpdesk_auth_cache_requests_total";
#[cfg(feature = "metrics")]
const METRIC_HITS_TOTAL: &str = "helpdesk_auth_cache_hits_total";
#[cfg(feature = "metrics")]
const METRIC_MISSES_TOTAL: &str = "helpdesk_auth_cache_misses_total";
#[cfg(feature = "metrics")]
const METRIC_REFRESH_TOTAL: &str = "helpdesk_auth_cache_refresh_total";
#[cfg(feature = "metrics")]
const METRIC_REFRESH_DURATION: &str = "helpdesk_auth_cache_refresh_duration_seconds";
#[cfg(feature = "metrics")]
const METRIC_DECISIONS_TOTAL: &str = "helpdesk_auth_decisions_total";

/// Shared Prometheus handle installed by [`install_default_exporter`].
#[cfg(feature = "prometheus")]
static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Thread-safe counters for a single cache.
#[derive(Debug, Default)]
pub struct CacheStats {
	total_requests: AtomicU64,
	cache_hits: AtomicU64,
	refresh_successes: AtomicU64,
	refresh_errors: AtomicU64,
	last_refresh_micros: AtomicU64,
}
impl CacheStats {
	/// Create a new accumulator.
	pub fn new() -> Arc<Self> {
		Arc::new(Self::default())
	}

	/// Record a lookup answered from the cache.
	pub fn record_hit(&self) {
		self.total_requests.fetch_add(1, Ordering::Relaxed);
		self.cache_hits.fetch_add(1, Ordering::Relaxed);
	}

	/// Record a lookup that had to go upstream.
	pub fn record_miss(&self) {
		self.total_requests.fetch_add(1, Ordering::Relaxed);
	}

	/// Record a successful refresh and its latency.
	pub fn record_refresh_success(&self, duration: Duration) {
		self.refresh_successes.fetch_add(1, Ordering::Relaxed);
		self.last_refresh_micros
			.store(u64::try_from(duration.as_micros()).unwrap_or(u64::MAX), Ordering::Relaxed);
	}

	/// Record a failed refresh.
	pub fn record_refresh_error(&self) {
		self.refresh_errors.fetch_add(1, Ordering::Relaxed);
	}

	/// Take a point-in-time snapshot.
	pub fn snapshot(&self) -> CacheStatsSnapshot {
		CacheStatsSnapshot {
			total_requests: self.total_requests.load(Ordering::Relaxed),
			cache_hits: self.cache_hits.load(Ordering::Relaxed),
			refresh_successes: self.refresh_successes.load(Ordering::Relaxed),
			refresh_errors: self.refresh_errors.load(Ordering::Relaxed),
			last_refresh_micros: match self.last_refresh_micros.load(Ordering::Relaxed) {
				0 => None,
				value => Some(value),
			},
		}
	}
}

/// Read-only snapshot of [`CacheStats`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CacheStatsSnapshot {
	/// Total number of lookups observed.
	pub total_requests: u64,
	/// Lookups answered from the cache.
	pub cache_hits: u64,
	/// Successful upstream refreshes.
	pub refresh_successes: u64,
	/// Failed upstream refreshes.
	pub refresh_errors: u64,
	/// Microsecond latency of the most recent successful refresh.
	pub last_refresh_micros: Option<u64>,
}
impl CacheStatsSnapshot {
	/// Lookups that went upstream.
	pub fn misses(&self) -> u64 {
		self.total_requests - self.cache_hits
	}

	/// Cache hit rate.
	pub fn hit_rate(&self) -> f64 {
		if self.total_requests == 0 {
			0.0
		} else {
			self.cache_hits as f64 / self.total_requests as f64
		}
	}
}

/// Install the default Prometheus recorder backed by `metrics`.
///
/// Multiple invocations are safe; subsequent calls become no-ops once the recorder is installed.
#[cfg(feature = "prometheus")]
pub fn install_default_exporter() -> Result<()> {
	if PROMETHEUS_HANDLE.get().is_some() {
		return Ok(());
	}

	let handle = PrometheusBuilder::new()
		.install_recorder()
		.map_err(|err| Error::Metrics(err.to_string()))?;
	let _ = PROMETHEUS_HANDLE.set(handle);

	Ok(())
}

/// Access the global Prometheus exporter handle when installed.
#[cfg(feature = "prometheus")]
pub fn prometheus_handle() -> Option<&'static PrometheusHandle> {
	PROMETHEUS_HANDLE.get()
}

/// Publish a cache hit.
pub fn record_cache_hit(cache: &'static str) {
	#[cfg(feature = "metrics")]
	{
		let labels = cache_labels(cache);

		metrics::counter!(METRIC_REQUESTS_TOTAL, labels.iter()).increment(1);
		metrics::counter!(METRIC_HITS_TOTAL, labels.iter()).increment(1);
	}
	#[cfg(not(feature = "metrics"))]
	let _ = cache;
}

/// Publish a cache miss that required an upstream call.
pub fn record_cache_miss(cache: &'static str) {
	#[cfg(feature = "metrics")]
	{
		let labels = cache_labels(cache);

		metrics::counter!(METRIC_REQUESTS_TOTAL, labels.iter()).increment(1);
		metrics::counter!(METRIC_MISSES_TOTAL, labels.iter()).increment(1);
	}
	#[cfg(not(feature = "metrics"))]
	let _ = cache;
}

/// Publish a successful refresh along with its latency.
pub fn record_refresh_success(cache: &'static str, duration: Duration) {
	#[cfg(feature = "metrics")]
	{
		metrics::counter!(METRIC_REFRESH_TOTAL, status_labels(cache, "success").iter())
			.increment(1);
		metrics::histogram!(METRIC_REFRESH_DURATION, cache_labels(cache).iter())
			.record(duration.as_secs_f64());
	}
	#[cfg(not(feature = "metrics"))]
	let _ = (cache, duration);
}

/// Publish a failed refresh.
pub fn record_refresh_error(cache: &'static str) {
	#[cfg(feature = "metrics")]
	{
		metrics::counter!(METRIC_REFRESH_TOTAL, status_labels(cache, "error").iter()).increment(1);
	}
	#[cfg(not(feature = "metrics"))]
	let _ = cache;
}

/// Publish an authorization decision outcome (`permit` or `deny`).
pub fn record_decision(outcome: &'static str) {
	#[cfg(feature = "metrics")]
	{
		metrics::counter!(METRIC_DECISIONS_TOTAL, "outcome" => outcome).increment(1);
	}
	#[cfg(not(feature = "metrics"))]
	let _ = outcome;
}

#[cfg(feature = "metrics")]
fn cache_labels(cache: &'static str) -> LabelSet {
	let mut labels = LabelSet::new();

	labels.push(Label::new("cache", cache));

	labels
}

#[cfg(feature = "metrics")]
fn status_labels(cache: &'static str, status: &'static str) -> LabelSet {
	let mut labels = cache_labels(cache);

	labels.push(Label::new("status", status));

	labels
}
