//! Time sources used for cache TTL comparisons.

// std
use std::{
	fmt::Debug,
	sync::atomic::{AtomicI64, Ordering},
};
// self
use crate::_prelude::*;

/// Supplies the current wall-clock time.
pub trait Clock: Debug + Send + Sync {
	/// Current time.
	fn now(&self) -> DateTime<Utc>;
}

/// Clock backed by the system time.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;
impl Clock for SystemClock {
	fn now(&self) -> DateTime<Utc> {
		Utc::now()
	}
}

/// Manually driven clock for deterministic TTL tests.
///
/// Millisecond resolution; clones share the same underlying instant.
#[derive(Clone, Debug)]
pub struct ManualClock {
	millis: Arc<AtomicI64>,
}
impl ManualClock {
	/// Create a clock frozen at `start`.
	pub fn new(start: DateTime<Utc>) -> Self {
		Self { millis: Arc::new(AtomicI64::new(start.timestamp_millis())) }
	}

	/// Move the clock forward.
	pub fn advance(&self, delta: Duration) {
		let millis = i64::try_from(delta.as_millis()).unwrap_or(i64::MAX);

		self.millis.fetch_add(millis, Ordering::SeqCst);
	}

	/// Jump to an absolute instant.
	pub fn set(&self, at: DateTime<Utc>) {
		self.millis.store(at.timestamp_millis(), Ordering::SeqCst);
	}
}
impl Default for ManualClock {
	fn default() -> Self {
		Self::new(DateTime::<Utc>::default())
	}
}
impl Clock for ManualClock {
	fn now(&self) -> DateTime<Utc> {
		DateTime::<Utc>::from_timestamp_millis(self.millis.load(Ordering::SeqCst))
			.unwrap_or(DateTime::<Utc>::MAX_UTC)
	}
}
