//! Serde types matching REST API response bodies.
//!
//! Kept apart from the cache types so the wire shapes can vary (bare or
//! `data`-wrapped payloads, string or numeric error codes) without leaking
//! into the engine.

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;

use crate::cache::Entity;

/// Re-serialize a value through JSON to convert between compatible types.
pub fn reserialize<T: DeserializeOwned>(value: impl Serialize) -> serde_json::Result<T> {
  serde_json::from_value(serde_json::to_value(value)?)
}

/// `GET /{kind}` body.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum ApiListResponse {
  Bare(Vec<Entity>),
  Wrapped { data: Vec<Entity> },
}

impl ApiListResponse {
  pub fn into_items(self) -> Vec<Entity> {
    match self {
      ApiListResponse::Bare(items) | ApiListResponse::Wrapped { data: items } => items,
    }
  }
}

/// Body of create/update responses.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum ApiEntityResponse {
  Bare(Entity),
  Wrapped { data: Entity },
}

impl ApiEntityResponse {
  pub fn into_entity(self) -> Entity {
    match self {
      ApiEntityResponse::Bare(entity) | ApiEntityResponse::Wrapped { data: entity } => entity,
    }
  }
}

/// Error body returned with non-2xx responses.
#[derive(Debug, Default, Deserialize)]
pub struct ApiErrorBody {
  pub message: Option<String>,
  pub error: Option<String>,
  pub code: Option<Value>,
}

impl ApiErrorBody {
  pub fn message(&self) -> Option<&str> {
    self.message.as_deref().or(self.error.as_deref())
  }

  pub fn code(&self) -> Option<String> {
    match &self.code {
      Some(Value::String(s)) => Some(s.clone()),
      Some(Value::Number(n)) => Some(n.to_string()),
      _ => None,
    }
  }
}
