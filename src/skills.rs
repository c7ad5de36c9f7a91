//! Typed view of `userSkills` entities.
//!
//! The engine never looks inside entities; this is for callers that want
//! to validate a draft before sending it or to print skills nicely.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::cache::{Draft, Entity};
use crate::gateway::reserialize;

pub const MAX_RATING: u8 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
  Low,
  Medium,
  High,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Skill {
  pub id: String,
  pub name: String,
  pub rating: u8,
  pub confidence: Option<Confidence>,
  #[serde(default)]
  pub evidence: String,
  pub category: Option<String>,
}

impl TryFrom<&Entity> for Skill {
  type Error = SkillError;

  fn try_from(entity: &Entity) -> Result<Self, Self::Error> {
    reserialize(entity).map_err(|e| SkillError::Malformed(e.to_string()))
  }
}

/// Fields of a skill that does not exist yet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkillDraft {
  pub name: String,
  pub rating: u8,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub confidence: Option<Confidence>,
  #[serde(default)]
  pub evidence: String,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub category: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SkillError {
  #[error("skill name must not be empty")]
  EmptyName,
  #[error("rating {0} is outside 0-10")]
  RatingOutOfRange(u8),
  #[error("malformed skill: {0}")]
  Malformed(String),
}

impl SkillDraft {
  pub fn validate(&self) -> Result<(), SkillError> {
    if self.name.trim().is_empty() {
      return Err(SkillError::EmptyName);
    }
    if self.rating > MAX_RATING {
      return Err(SkillError::RatingOutOfRange(self.rating));
    }
    Ok(())
  }

  /// Validate a raw draft as a skill. Fields beyond the known ones are
  /// allowed and passed through untouched.
  pub fn check(draft: &Draft) -> Result<(), SkillError> {
    let parsed: SkillDraft =
      reserialize(draft).map_err(|e| SkillError::Malformed(e.to_string()))?;
    parsed.validate()
  }
}
