//! Optimistic synchronization cache for the skill-assessment client.
//!
//! A [`SyncEngine`] keeps one cached collection per [`ResourceKind`],
//! serves reads from cache while they are fresh, applies writes locally
//! before the backend confirms them, and rolls them back if it refuses.

pub mod cache;
pub mod config;
pub mod engine;
pub mod error;
pub mod gateway;
pub mod logging;
pub mod skills;

pub use cache::{Draft, Entity, Patch, ResourceKind, Snapshot};
pub use engine::SyncEngine;
pub use error::{GatewayError, SyncError};
pub use gateway::{HttpGateway, MemoryGateway, ResourceGateway};
