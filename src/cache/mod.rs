//! In-memory synchronization cache.
//!
//! This module holds the pieces the engine is built from:
//! - Resource kinds and the opaque entities cached for them
//! - A time-based staleness policy
//! - Per-kind cache entries with loading/error state
//! - A log of optimistic mutations that can be replayed backwards

mod clock;
mod entity;
mod staleness;
mod store;
mod tracker;

pub use clock::{Clock, ManualClock, SystemClock};
pub use entity::{Draft, Entity, Fields, Patch, ResourceKind};
pub use staleness::{is_stale, StalenessPolicy};
pub use store::{CacheEntry, Snapshot, StateStore};
pub use tracker::{MutationTracker, PendingMutation, WriteId};
