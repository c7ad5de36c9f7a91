//! Resource kinds and the opaque entity records cached for them.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Arbitrary JSON fields carried by an entity, draft or patch.
pub type Fields = Map<String, Value>;

/// Fields for an entity that does not exist yet.
pub type Draft = Fields;

/// Partial field update for an existing entity.
pub type Patch = Fields;

/// Name of an independently cached collection (e.g. `userSkills`).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceKind(String);

impl ResourceKind {
  pub fn new(name: impl Into<String>) -> Self {
    Self(name.into())
  }

  pub fn user_skills() -> Self {
    Self::new("userSkills")
  }

  pub fn categories() -> Self {
    Self::new("categories")
  }

  pub fn recommendations() -> Self {
    Self::new("recommendations")
  }

  pub fn as_str(&self) -> &str {
    &self.0
  }
}

impl fmt::Display for ResourceKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.0)
  }
}

impl From<&str> for ResourceKind {
  fn from(name: &str) -> Self {
    Self::new(name)
  }
}

impl From<String> for ResourceKind {
  fn from(name: String) -> Self {
    Self(name)
  }
}

/// A cached record. Only `id` is interpreted; everything else is passed
/// through to and from the gateway untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
  #[serde(deserialize_with = "deserialize_id")]
  pub id: String,
  #[serde(flatten)]
  pub fields: Fields,
}

impl Entity {
  pub fn new(id: impl Into<String>, fields: Fields) -> Self {
    Self {
      id: id.into(),
      fields,
    }
  }

  /// Build a local entity from a draft, ignoring any `id` the draft carries.
  pub fn from_draft(id: impl Into<String>, draft: &Draft) -> Self {
    let mut fields = draft.clone();
    fields.remove("id");
    Self::new(id, fields)
  }

  /// Copy of this entity with `patch` applied on top. The id never changes.
  pub fn merged(&self, patch: &Patch) -> Self {
    let mut merged = self.clone();
    for (key, value) in patch {
      if key != "id" {
        merged.fields.insert(key.clone(), value.clone());
      }
    }
    merged
  }

  pub fn get(&self, field: &str) -> Option<&Value> {
    self.fields.get(field)
  }
}

/// Backends hand out both string and numeric ids; store them as strings.
fn deserialize_id<'de, D>(deserializer: D) -> Result<String, D::Error>
where
  D: Deserializer<'de>,
{
  match Value::deserialize(deserializer)? {
    Value::String(s) => Ok(s),
    Value::Number(n) => Ok(n.to_string()),
    other => Err(serde::de::Error::custom(format!(
      "entity id must be a string or number, got {}",
      other
    ))),
  }
}
