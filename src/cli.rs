use clap::{Parser, Subcommand};
use color_eyre::{eyre::eyre, Result};
use serde_json::{json, Value};
use std::path::PathBuf;

use skillsync::cache::{Fields, ResourceKind, Snapshot};
use skillsync::skills::{Skill, SkillDraft};
use skillsync::{ResourceGateway, SyncEngine};

#[derive(Parser, Debug)]
#[command(name = "skillsync")]
#[command(about = "Fetch and edit skill-assessment collections through the sync cache")]
#[command(version)]
pub struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/skillsync/config.yaml)
  #[arg(short, long, global = true)]
  pub config: Option<PathBuf>,

  /// API base URL, overriding the config file
  #[arg(long, global = true)]
  pub base_url: Option<String>,

  /// Use the in-memory demo backend instead of the REST API
  #[arg(long, global = true)]
  pub memory: bool,

  /// Log to stderr instead of the log file
  #[arg(long, global = true)]
  pub log_stderr: bool,

  #[command(subcommand)]
  pub command: Command,
}

#[derive(Subcommand, Debug, PartialEq)]
pub enum Command {
  /// Fetch a collection
  List {
    kind: String,
    /// Bypass the cache
    #[arg(long)]
    refresh: bool,
    /// Print userSkills as a table
    #[arg(long)]
    table: bool,
  },
  /// Fetch a collection and print its full cache state
  Show { kind: String },
  /// Create an entity from key=value fields
  Add {
    kind: String,
    #[arg(short = 'f', long = "field", value_parser = parse_field)]
    fields: Vec<(String, Value)>,
  },
  /// Patch an entity with key=value fields
  Update {
    kind: String,
    id: String,
    #[arg(short = 'f', long = "field", value_parser = parse_field)]
    fields: Vec<(String, Value)>,
  },
  /// Delete an entity
  Remove { kind: String, id: String },
}

/// Parse `key=value`. The value is read as JSON when it parses as JSON,
/// otherwise it is taken as a plain string.
pub fn parse_field(input: &str) -> Result<(String, Value), String> {
  let (key, raw) = input
    .split_once('=')
    .ok_or_else(|| format!("expected key=value, got '{}'", input))?;
  let key = key.trim();
  if key.is_empty() {
    return Err(format!("missing field name in '{}'", input));
  }
  let value = serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()));
  Ok((key.to_string(), value))
}

fn into_fields(pairs: Vec<(String, Value)>) -> Fields {
  pairs.into_iter().collect()
}

pub async fn execute<G: ResourceGateway>(engine: &SyncEngine<G>, command: Command) -> Result<()> {
  match command {
    Command::List {
      kind,
      refresh,
      table,
    } => {
      let kind = ResourceKind::from(kind);
      let items = engine.fetch(&kind, refresh).await?;
      if table && kind == ResourceKind::user_skills() {
        for entity in &items {
          let skill = Skill::try_from(entity)?;
          println!(
            "{:<8} {:<24} {:>2}/10  {}",
            skill.id,
            skill.name,
            skill.rating,
            skill.category.as_deref().unwrap_or("-")
          );
        }
      } else {
        print_json(&json!(items))?;
      }
    }
    Command::Show { kind } => {
      let kind = ResourceKind::from(kind);
      // A failed fetch is still reported through the snapshot's error field.
      if let Err(err) = engine.fetch(&kind, false).await {
        tracing::warn!(%kind, error = %err, "fetch failed");
      }
      print_json(&snapshot_json(&kind, &engine.snapshot(&kind)))?;
    }
    Command::Add { kind, fields } => {
      let kind = ResourceKind::from(kind);
      let draft = into_fields(fields);
      if draft.is_empty() {
        return Err(eyre!("add needs at least one --field"));
      }
      if kind == ResourceKind::user_skills() {
        SkillDraft::check(&draft)?;
      }
      engine.fetch(&kind, false).await?;
      let created = engine.add(&kind, draft).await?;
      print_json(&json!(created))?;
    }
    Command::Update { kind, id, fields } => {
      let kind = ResourceKind::from(kind);
      let patch = into_fields(fields);
      if patch.is_empty() {
        return Err(eyre!("update needs at least one --field"));
      }
      engine.fetch(&kind, false).await?;
      let updated = engine.update(&kind, &id, patch).await?;
      print_json(&json!(updated))?;
    }
    Command::Remove { kind, id } => {
      let kind = ResourceKind::from(kind);
      engine.fetch(&kind, false).await?;
      engine.remove(&kind, &id).await?;
      println!("removed {} {}", kind, id);
    }
  }
  Ok(())
}

fn snapshot_json(kind: &ResourceKind, snapshot: &Snapshot) -> Value {
  json!({
    "kind": kind,
    "items": snapshot.items,
    "loading": snapshot.loading,
    "error": snapshot.error.as_ref().map(|e| e.to_string()),
    "lastFetchedAt": snapshot.last_fetched_at,
    "pendingIds": snapshot.pending_ids,
  })
}

fn print_json(value: &Value) -> Result<()> {
  let text =
    serde_json::to_string_pretty(value).map_err(|e| eyre!("Failed to render output: {}", e))?;
  println!("{}", text);
  Ok(())
}
