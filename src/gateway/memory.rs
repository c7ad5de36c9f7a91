//! In-process backend.
//!
//! Serves as the CLI's `--memory` demo backend and as the scripted backend
//! of the test-suite: calls are counted per kind, failures can be queued for
//! the next call of an operation, and a hold parks every call until released.

use async_trait::async_trait;
use serde_json::json;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::{OwnedRwLockWriteGuard, RwLock};

use super::ResourceGateway;
use crate::cache::{Draft, Entity, Fields, Patch, ResourceKind};
use crate::error::GatewayError;

/// Gateway operation, for counting calls and scripting failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GatewayOp {
  List,
  Create,
  Update,
  Delete,
}

#[derive(Debug, Default)]
struct MemoryState {
  collections: HashMap<ResourceKind, Vec<Entity>>,
  next_id: u64,
  calls: HashMap<(ResourceKind, GatewayOp), usize>,
  failures: HashMap<GatewayOp, VecDeque<GatewayError>>,
}

/// While alive, every gateway call waits before touching the backend.
pub struct GatewayHold {
  _guard: OwnedRwLockWriteGuard<()>,
}

#[derive(Debug, Default)]
pub struct MemoryGateway {
  state: Mutex<MemoryState>,
  gate: Arc<RwLock<()>>,
}

impl MemoryGateway {
  pub fn new() -> Self {
    Self::default()
  }

  /// Backend pre-filled with sample skills and categories.
  pub fn with_demo_data() -> Self {
    let gateway = Self::new();
    gateway.seed(
      &ResourceKind::categories(),
      vec![
        demo_entity("c1", json!({"name": "Languages"})),
        demo_entity("c2", json!({"name": "Infrastructure"})),
        demo_entity("c3", json!({"name": "Practices"})),
      ],
    );
    gateway.seed(
      &ResourceKind::user_skills(),
      vec![
        demo_entity(
          "1",
          json!({"name": "Rust", "rating": 6, "confidence": "medium",
                 "evidence": "Maintains an internal CLI", "category": "Languages"}),
        ),
        demo_entity(
          "2",
          json!({"name": "Kubernetes", "rating": 4, "confidence": "low",
                 "evidence": "", "category": "Infrastructure"}),
        ),
        demo_entity(
          "3",
          json!({"name": "Code review", "rating": 8, "confidence": "high",
                 "evidence": "Reviews most backend changes", "category": "Practices"}),
        ),
      ],
    );
    gateway.seed(&ResourceKind::recommendations(), Vec::new());
    gateway
  }

  fn state(&self) -> MutexGuard<'_, MemoryState> {
    self.state.lock().unwrap_or_else(|e| e.into_inner())
  }

  /// Replace the server-side collection of `kind`. Numeric ids already in
  /// use are skipped by later creates.
  pub fn seed(&self, kind: &ResourceKind, items: Vec<Entity>) {
    let mut state = self.state();
    let highest = items
      .iter()
      .filter_map(|e| e.id.parse::<u64>().ok())
      .max()
      .unwrap_or(0);
    state.next_id = state.next_id.max(highest);
    state.collections.insert(kind.clone(), items);
  }

  /// Current server-side collection of `kind`.
  pub fn items(&self, kind: &ResourceKind) -> Vec<Entity> {
    self
      .state()
      .collections
      .get(kind)
      .cloned()
      .unwrap_or_default()
  }

  /// Number of calls of `op` issued for `kind`, including held ones.
  pub fn calls(&self, kind: &ResourceKind, op: GatewayOp) -> usize {
    self
      .state()
      .calls
      .get(&(kind.clone(), op))
      .copied()
      .unwrap_or(0)
  }

  /// Make the next call of `op` fail with `error`.
  pub fn fail_next(&self, op: GatewayOp, error: GatewayError) {
    self.state().failures.entry(op).or_default().push_back(error);
  }

  /// Park every call until the returned hold is dropped.
  pub async fn hold(&self) -> GatewayHold {
    GatewayHold {
      _guard: Arc::clone(&self.gate).write_owned().await,
    }
  }

  /// Count the call and pop a scripted failure, if any.
  fn begin_call(&self, kind: &ResourceKind, op: GatewayOp) -> Option<GatewayError> {
    let mut state = self.state();
    *state.calls.entry((kind.clone(), op)).or_default() += 1;
    state.failures.get_mut(&op).and_then(VecDeque::pop_front)
  }

  async fn wait_for_gate(&self) {
    drop(self.gate.read().await);
  }

  async fn call(&self, kind: &ResourceKind, op: GatewayOp) -> Result<(), GatewayError> {
    let scripted = self.begin_call(kind, op);
    self.wait_for_gate().await;
    match scripted {
      Some(err) => Err(err),
      None => Ok(()),
    }
  }
}

fn demo_entity(id: &str, fields: serde_json::Value) -> Entity {
  match fields {
    serde_json::Value::Object(map) => Entity::new(id, map),
    _ => Entity::new(id, Fields::new()),
  }
}

fn not_found(kind: &ResourceKind, id: &str) -> GatewayError {
  GatewayError::rejected(
    format!("{} {} does not exist", kind, id),
    Some("not_found".to_string()),
  )
}

#[async_trait]
impl ResourceGateway for MemoryGateway {
  async fn list(&self, kind: &ResourceKind) -> Result<Vec<Entity>, GatewayError> {
    self.call(kind, GatewayOp::List).await?;
    Ok(self.items(kind))
  }

  async fn create(&self, kind: &ResourceKind, draft: &Draft) -> Result<Entity, GatewayError> {
    self.call(kind, GatewayOp::Create).await?;
    let mut state = self.state();
    state.next_id += 1;
    let entity = Entity::from_draft(state.next_id.to_string(), draft);
    state
      .collections
      .entry(kind.clone())
      .or_default()
      .push(entity.clone());
    Ok(entity)
  }

  async fn update(&self, kind: &ResourceKind, id: &str, patch: &Patch) -> Result<Entity, GatewayError> {
    self.call(kind, GatewayOp::Update).await?;
    let mut state = self.state();
    let slot = state
      .collections
      .get_mut(kind)
      .and_then(|items| items.iter_mut().find(|e| e.id == id))
      .ok_or_else(|| not_found(kind, id))?;
    *slot = slot.merged(patch);
    Ok(slot.clone())
  }

  async fn delete(&self, kind: &ResourceKind, id: &str) -> Result<(), GatewayError> {
    self.call(kind, GatewayOp::Delete).await?;
    let mut state = self.state();
    let items = state
      .collections
      .get_mut(kind)
      .ok_or_else(|| not_found(kind, id))?;
    let index = items
      .iter()
      .position(|e| e.id == id)
      .ok_or_else(|| not_found(kind, id))?;
    items.remove(index);
    Ok(())
  }
}
