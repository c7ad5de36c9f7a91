//! Time-based staleness policy for cached collections.

use chrono::{DateTime, Duration, Utc};

/// Whether data fetched at `last_fetched_at` must be refreshed at `now`.
///
/// Never-fetched data is always stale. Staleness is purely time-based:
/// pending writes do not make a collection stale.
pub fn is_stale(last_fetched_at: Option<DateTime<Utc>>, ttl: Duration, now: DateTime<Utc>) -> bool {
  match last_fetched_at {
    None => true,
    Some(fetched_at) => now - fetched_at > ttl,
  }
}

/// Fixed time-to-live shared by every resource kind of one engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StalenessPolicy {
  ttl: Duration,
}

impl StalenessPolicy {
  pub fn new(ttl: Duration) -> Self {
    Self { ttl }
  }

  pub fn ttl(&self) -> Duration {
    self.ttl
  }

  pub fn is_stale(&self, last_fetched_at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
    is_stale(last_fetched_at, self.ttl, now)
  }
}

impl Default for StalenessPolicy {
  fn default() -> Self {
    Self::new(Duration::minutes(5))
  }
}
