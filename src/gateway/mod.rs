//! The CRUD boundary between the cache and the backend.

mod api_types;
mod http;
mod memory;

use async_trait::async_trait;
use std::sync::Arc;

use crate::cache::{Draft, Entity, Patch, ResourceKind};
use crate::error::GatewayError;

pub use api_types::reserialize;
pub use http::HttpGateway;
pub use memory::{GatewayHold, GatewayOp, MemoryGateway};

/// CRUD access to the collections of a remote API.
///
/// Any `Err` is treated the same way by the engine, whatever the transport
/// detail behind it.
#[async_trait]
pub trait ResourceGateway: Send + Sync + 'static {
  async fn list(&self, kind: &ResourceKind) -> Result<Vec<Entity>, GatewayError>;

  async fn create(&self, kind: &ResourceKind, draft: &Draft) -> Result<Entity, GatewayError>;

  async fn update(&self, kind: &ResourceKind, id: &str, patch: &Patch) -> Result<Entity, GatewayError>;

  async fn delete(&self, kind: &ResourceKind, id: &str) -> Result<(), GatewayError>;
}

#[async_trait]
impl<G: ResourceGateway> ResourceGateway for Arc<G> {
  async fn list(&self, kind: &ResourceKind) -> Result<Vec<Entity>, GatewayError> {
    (**self).list(kind).await
  }

  async fn create(&self, kind: &ResourceKind, draft: &Draft) -> Result<Entity, GatewayError> {
    (**self).create(kind, draft).await
  }

  async fn update(&self, kind: &ResourceKind, id: &str, patch: &Patch) -> Result<Entity, GatewayError> {
    (**self).update(kind, id, patch).await
  }

  async fn delete(&self, kind: &ResourceKind, id: &str) -> Result<(), GatewayError> {
    (**self).delete(kind, id).await
  }
}
