//! Time sources for staleness decisions.

use chrono::{DateTime, Duration, Utc};
use std::sync::Mutex;

pub trait Clock: Send + Sync {
  fn now(&self) -> DateTime<Utc>;
}

/// Wall clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
  fn now(&self) -> DateTime<Utc> {
    Utc::now()
  }
}

/// Clock that only moves when told to. Lets callers step past a TTL
/// without sleeping.
#[derive(Debug)]
pub struct ManualClock {
  now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
  pub fn new(start: DateTime<Utc>) -> Self {
    Self {
      now: Mutex::new(start),
    }
  }

  pub fn advance(&self, by: Duration) {
    let mut now = self.now.lock().unwrap_or_else(|e| e.into_inner());
    *now += by;
  }
}

impl Default for ManualClock {
  fn default() -> Self {
    Self::new(Utc::now())
  }
}

impl Clock for ManualClock {
  fn now(&self) -> DateTime<Utc> {
    *self.now.lock().unwrap_or_else(|e| e.into_inner())
  }
}
