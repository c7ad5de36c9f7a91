//! Error types surfaced by the gateway and the synchronization engine.

use thiserror::Error;

use crate::cache::ResourceKind;

/// How a gateway call failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatewayErrorKind {
  /// Backend unreachable or the request timed out
  Network,
  /// Backend answered with a non-success status
  Rejected,
}

/// Failure reported by a [`ResourceGateway`](crate::gateway::ResourceGateway).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct GatewayError {
  pub kind: GatewayErrorKind,
  /// Human-readable reason
  pub message: String,
  /// Optional machine-readable code from the backend
  pub code: Option<String>,
}

impl GatewayError {
  pub fn network(message: impl Into<String>) -> Self {
    Self {
      kind: GatewayErrorKind::Network,
      message: message.into(),
      code: None,
    }
  }

  pub fn rejected(message: impl Into<String>, code: Option<String>) -> Self {
    Self {
      kind: GatewayErrorKind::Rejected,
      message: message.into(),
      code,
    }
  }
}

/// Errors returned by [`SyncEngine`](crate::engine::SyncEngine) operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SyncError {
  #[error("network failure: {message}")]
  NetworkFailure { message: String },

  #[error("server rejected request: {message}")]
  ServerRejected {
    message: String,
    code: Option<String>,
  },

  #[error("{kind} has no entity with id {id}")]
  NotFound { kind: ResourceKind, id: String },

  /// A load was requested while one was already in flight for the kind.
  /// Only logged; never returned from a public engine operation.
  #[error("load already in flight for {kind}")]
  ConcurrentLoadIgnored { kind: ResourceKind },
}

impl From<GatewayError> for SyncError {
  fn from(err: GatewayError) -> Self {
    match err.kind {
      GatewayErrorKind::Network => SyncError::NetworkFailure {
        message: err.message,
      },
      GatewayErrorKind::Rejected => SyncError::ServerRejected {
        message: err.message,
        code: err.code,
      },
    }
  }
}

pub type SyncResult<T> = std::result::Result<T, SyncError>;
