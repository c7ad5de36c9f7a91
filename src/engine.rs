//! Synchronization engine: reads through the staleness policy, writes
//! optimistically, and reconciles or reverts once the gateway answers.

use chrono::Duration;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info, warn};

use crate::cache::{
  Clock, Draft, Entity, Patch, ResourceKind, Snapshot, StalenessPolicy, StateStore, SystemClock,
  WriteId,
};
use crate::error::{SyncError, SyncResult};
use crate::gateway::ResourceGateway;

/// Owns the state store and is the only thing allowed to mutate it.
///
/// Cloning is cheap and every clone shares the same store, so one engine can
/// be handed to several tasks. Separate engines never share state.
pub struct SyncEngine<G: ResourceGateway> {
  gateway: Arc<G>,
  store: Arc<Mutex<StateStore>>,
  policy: StalenessPolicy,
  clock: Arc<dyn Clock>,
  next_write: Arc<AtomicU64>,
}

impl<G: ResourceGateway> SyncEngine<G> {
  pub fn new(gateway: G) -> Self {
    Self {
      gateway: Arc::new(gateway),
      store: Arc::new(Mutex::new(StateStore::new())),
      policy: StalenessPolicy::default(),
      clock: Arc::new(SystemClock),
      next_write: Arc::new(AtomicU64::new(0)),
    }
  }

  /// Set how long fetched data stays fresh.
  pub fn with_ttl(mut self, ttl: Duration) -> Self {
    self.policy = StalenessPolicy::new(ttl);
    self
  }

  pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
    self.clock = clock;
    self
  }

  pub fn gateway(&self) -> &G {
    &self.gateway
  }

  pub fn ttl(&self) -> Duration {
    self.policy.ttl()
  }

  fn store(&self) -> MutexGuard<'_, StateStore> {
    lock(&self.store)
  }

  fn next_write(&self) -> WriteId {
    WriteId(self.next_write.fetch_add(1, Ordering::Relaxed) + 1)
  }

  /// Current state of `kind` for display.
  pub fn snapshot(&self, kind: &ResourceKind) -> Snapshot {
    self.store().snapshot(kind)
  }

  /// Return the collection of `kind`, going to the gateway only when the
  /// cached copy is stale or `force_refresh` is set.
  ///
  /// A fetch requested while another one for the same kind is in flight
  /// does not hit the gateway; it returns the items currently cached.
  pub async fn fetch(&self, kind: &ResourceKind, force_refresh: bool) -> SyncResult<Vec<Entity>> {
    {
      let mut store = self.store();
      if !force_refresh && !self.policy.is_stale(store.last_fetched_at(kind), self.clock.now()) {
        debug!(%kind, "cache hit");
        return Ok(store.items(kind));
      }
      if let Err(err) = store.begin_load(kind) {
        debug!(%kind, error = %err, "ignoring load request");
        return Ok(store.items(kind));
      }
    }

    let guard = TransitionGuard::abort_load(&self.store, kind);
    let result = self.gateway.list(kind).await;
    guard.disarm();

    let mut store = self.store();
    match result {
      Ok(items) => {
        info!(%kind, count = items.len(), "loaded");
        store.commit_load(kind, items.clone(), self.clock.now());
        Ok(items)
      }
      Err(err) => {
        let err = SyncError::from(err);
        let undone = store.revert(kind);
        store.fail_load(kind, err.clone());
        warn!(%kind, error = %err, reverted = undone, "load failed");
        Err(err)
      }
    }
  }

  /// Insert `draft` immediately under a temporary id, then create it on the
  /// backend and refresh the collection.
  ///
  /// Returns the server-created entity. If the create succeeds but the
  /// refresh after it fails, the add still succeeds; the refresh error is
  /// left on the kind's snapshot.
  pub async fn add(&self, kind: &ResourceKind, draft: Draft) -> SyncResult<Entity> {
    let write = self.next_write();
    let temporary_id = format!("tmp-{}", write.0);
    self
      .store()
      .apply_add(kind, write, Entity::from_draft(&temporary_id, &draft));
    debug!(%kind, %temporary_id, "optimistic add");

    let guard = TransitionGuard::revert_write(&self.store, kind, write);
    let result = self.gateway.create(kind, &draft).await;
    guard.disarm();

    match result {
      Ok(created) => {
        self
          .store()
          .confirm_add(kind, write, &temporary_id, created.clone());
        info!(%kind, %temporary_id, id = %created.id, "add confirmed");
        if let Err(err) = self.fetch(kind, true).await {
          warn!(%kind, error = %err, "refresh after add failed");
        }
        Ok(created)
      }
      Err(err) => Err(self.revert_failed_write(kind, write, err.into(), "add")),
    }
  }

  /// Apply `patch` to entity `id` immediately, then send it to the backend.
  /// Fails with `NotFound` without any gateway call if `id` is not cached.
  pub async fn update(&self, kind: &ResourceKind, id: &str, patch: Patch) -> SyncResult<Entity> {
    let write = self.next_write();
    self.store().apply_update(kind, write, id, &patch)?;
    debug!(%kind, %id, "optimistic update");

    let guard = TransitionGuard::revert_write(&self.store, kind, write);
    let result = self.gateway.update(kind, id, &patch).await;
    guard.disarm();

    match result {
      Ok(confirmed) => {
        let entity = self.store().confirm_update(kind, write, id, confirmed);
        info!(%kind, %id, "update confirmed");
        Ok(entity)
      }
      Err(err) => Err(self.revert_failed_write(kind, write, err.into(), "update")),
    }
  }

  /// Drop entity `id` immediately, then delete it on the backend.
  /// Fails with `NotFound` without any gateway call if `id` is not cached.
  pub async fn remove(&self, kind: &ResourceKind, id: &str) -> SyncResult<()> {
    let write = self.next_write();
    self.store().apply_remove(kind, write, id)?;
    debug!(%kind, %id, "optimistic remove");

    let guard = TransitionGuard::revert_write(&self.store, kind, write);
    let result = self.gateway.delete(kind, id).await;
    guard.disarm();

    match result {
      Ok(()) => {
        self.store().confirm_remove(kind, write, id);
        info!(%kind, %id, "remove confirmed");
        Ok(())
      }
      Err(err) => Err(self.revert_failed_write(kind, write, err.into(), "remove")),
    }
  }

  fn revert_failed_write(
    &self,
    kind: &ResourceKind,
    write: WriteId,
    err: SyncError,
    operation: &'static str,
  ) -> SyncError {
    let undone = self.store().revert_write(kind, write);
    warn!(%kind, operation, error = %err, reverted = undone, "write failed");
    err
  }
}

impl<G: ResourceGateway> Clone for SyncEngine<G> {
  fn clone(&self) -> Self {
    Self {
      gateway: Arc::clone(&self.gateway),
      store: Arc::clone(&self.store),
      policy: self.policy,
      clock: Arc::clone(&self.clock),
      next_write: Arc::clone(&self.next_write),
    }
  }
}

fn lock(store: &Mutex<StateStore>) -> MutexGuard<'_, StateStore> {
  // Store transitions never panic halfway, so a poisoned lock still guards
  // consistent state.
  store.lock().unwrap_or_else(|e| e.into_inner())
}

enum Transition {
  AbortLoad,
  RevertWrite(WriteId),
}

/// Finishes the store transition of an operation whose future was dropped
/// while the gateway call was outstanding, so no `loading` flag or pending
/// mutation outlives it.
struct TransitionGuard {
  store: Arc<Mutex<StateStore>>,
  kind: ResourceKind,
  transition: Option<Transition>,
}

impl TransitionGuard {
  fn abort_load(store: &Arc<Mutex<StateStore>>, kind: &ResourceKind) -> Self {
    Self {
      store: Arc::clone(store),
      kind: kind.clone(),
      transition: Some(Transition::AbortLoad),
    }
  }

  fn revert_write(store: &Arc<Mutex<StateStore>>, kind: &ResourceKind, write: WriteId) -> Self {
    Self {
      store: Arc::clone(store),
      kind: kind.clone(),
      transition: Some(Transition::RevertWrite(write)),
    }
  }

  fn disarm(mut self) {
    self.transition = None;
  }
}

impl Drop for TransitionGuard {
  fn drop(&mut self) {
    let Some(transition) = self.transition.take() else {
      return;
    };
    let mut store = lock(&self.store);
    match transition {
      Transition::AbortLoad => {
        store.abort_load(&self.kind);
        debug!(kind = %self.kind, "abandoned load released");
      }
      Transition::RevertWrite(write) => {
        let undone = store.revert_write(&self.kind, write);
        debug!(kind = %self.kind, reverted = undone, "abandoned write reverted");
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::{Fields, ManualClock};
  use crate::error::GatewayError;
  use crate::gateway::{GatewayOp, MemoryGateway};
  use chrono::Utc;
  use futures::{poll, FutureExt};
  use serde_json::{json, Value};

  fn fields(value: Value) -> Fields {
    match value {
      Value::Object(map) => map,
      _ => panic!("expected object"),
    }
  }

  fn skill(id: &str, name: &str, rating: i64) -> Entity {
    Entity::new(id, fields(json!({"name": name, "rating": rating})))
  }

  fn skills() -> ResourceKind {
    ResourceKind::user_skills()
  }

  fn engine_with(items: Vec<Entity>) -> (SyncEngine<MemoryGateway>, Arc<ManualClock>) {
    let gateway = MemoryGateway::new();
    gateway.seed(&skills(), items);
    let clock = Arc::new(ManualClock::default());
    let engine = SyncEngine::new(gateway).with_clock(clock.clone());
    (engine, clock)
  }

  fn ids(engine: &SyncEngine<MemoryGateway>) -> Vec<String> {
    engine
      .snapshot(&skills())
      .items
      .into_iter()
      .map(|e| e.id)
      .collect()
  }

  #[tokio::test]
  async fn test_fetch_empty_remote() {
    let (engine, _) = engine_with(Vec::new());
    let items = engine.fetch(&skills(), false).await.unwrap();
    assert!(items.is_empty());

    let snapshot = engine.snapshot(&skills());
    assert!(snapshot.items.is_empty());
    assert!(!snapshot.loading);
    assert!(snapshot.error.is_none());
    assert!(snapshot.last_fetched_at.is_some());
  }

  #[tokio::test]
  async fn test_fetch_within_ttl_hits_cache() {
    let (engine, clock) = engine_with(vec![skill("1", "Rust", 6)]);
    engine.fetch(&skills(), false).await.unwrap();
    clock.advance(Duration::minutes(4));
    let items = engine.fetch(&skills(), false).await.unwrap();

    assert_eq!(items, vec![skill("1", "Rust", 6)]);
    assert_eq!(engine.gateway().calls(&skills(), GatewayOp::List), 1);
  }

  #[tokio::test]
  async fn test_cache_hit_completes_without_suspending() {
    let (engine, _) = engine_with(Vec::new());
    engine.fetch(&skills(), false).await.unwrap();
    let _hold = engine.gateway().hold().await;

    let hit = engine.fetch(&skills(), false).now_or_never();
    assert_eq!(hit, Some(Ok(Vec::new())));
    assert_eq!(engine.gateway().calls(&skills(), GatewayOp::List), 1);
  }

  #[tokio::test]
  async fn test_fetch_after_ttl_refetches_once() {
    let (engine, clock) = engine_with(vec![skill("1", "Rust", 6)]);
    engine.fetch(&skills(), false).await.unwrap();
    clock.advance(Duration::minutes(5) + Duration::seconds(1));
    engine.fetch(&skills(), false).await.unwrap();
    engine.fetch(&skills(), false).await.unwrap();

    assert_eq!(engine.gateway().calls(&skills(), GatewayOp::List), 2);
  }

  #[tokio::test]
  async fn test_custom_ttl() {
    let (engine, clock) = engine_with(Vec::new());
    let engine = engine.with_ttl(Duration::seconds(30));
    engine.fetch(&skills(), false).await.unwrap();
    clock.advance(Duration::seconds(31));
    engine.fetch(&skills(), false).await.unwrap();
    assert_eq!(engine.gateway().calls(&skills(), GatewayOp::List), 2);
  }

  #[tokio::test]
  async fn test_force_refresh_bypasses_cache() {
    let (engine, _) = engine_with(Vec::new());
    engine.fetch(&skills(), false).await.unwrap();
    engine.fetch(&skills(), true).await.unwrap();
    assert_eq!(engine.gateway().calls(&skills(), GatewayOp::List), 2);
  }

  #[tokio::test]
  async fn test_failed_fetch_keeps_items_and_clears_loading() {
    let (engine, clock) = engine_with(vec![skill("1", "Rust", 6)]);
    engine.fetch(&skills(), false).await.unwrap();
    clock.advance(Duration::minutes(10));
    engine
      .gateway()
      .fail_next(GatewayOp::List, GatewayError::network("timed out"));

    let err = engine.fetch(&skills(), false).await.unwrap_err();
    assert_eq!(
      err,
      SyncError::NetworkFailure {
        message: "timed out".to_string()
      }
    );

    let snapshot = engine.snapshot(&skills());
    assert_eq!(snapshot.items, vec![skill("1", "Rust", 6)]);
    assert!(!snapshot.loading);
    assert_eq!(snapshot.error, Some(err));
  }

  #[tokio::test]
  async fn test_concurrent_fetch_is_ignored_not_raised() {
    let (engine, _) = engine_with(vec![skill("1", "Rust", 6)]);
    let hold = engine.gateway().hold().await;

    let kind = skills();
    let first = engine.fetch(&kind, false);
    futures::pin_mut!(first);
    assert!(poll!(first.as_mut()).is_pending());
    assert!(engine.snapshot(&skills()).loading);

    let second = engine.fetch(&skills(), true).await;
    assert_eq!(second, Ok(Vec::new()));

    drop(hold);
    assert_eq!(first.await, Ok(vec![skill("1", "Rust", 6)]));
    assert_eq!(engine.gateway().calls(&skills(), GatewayOp::List), 1);
    assert!(!engine.snapshot(&skills()).loading);
  }

  #[tokio::test]
  async fn test_dropped_fetch_releases_loading() {
    let (engine, _) = engine_with(Vec::new());
    let hold = engine.gateway().hold().await;
    {
      let kind = skills();
      let fetch = engine.fetch(&kind, false);
      futures::pin_mut!(fetch);
      assert!(poll!(fetch.as_mut()).is_pending());
      assert!(engine.snapshot(&skills()).loading);
    }
    assert!(!engine.snapshot(&skills()).loading);
    drop(hold);
  }

  #[tokio::test]
  async fn test_add_is_visible_before_gateway_answers() {
    let (engine, _) = engine_with(Vec::new());
    engine.fetch(&skills(), false).await.unwrap();
    let hold = engine.gateway().hold().await;

    let kind = skills();
    let add = engine.add(&kind, fields(json!({"name": "Rust", "rating": 6})));
    futures::pin_mut!(add);
    assert!(poll!(add.as_mut()).is_pending());

    let snapshot = engine.snapshot(&skills());
    assert_eq!(snapshot.items.len(), 1);
    assert_eq!(snapshot.items[0].get("name"), Some(&json!("Rust")));
    assert!(snapshot.items[0].id.starts_with("tmp-"));
    assert_eq!(snapshot.pending_ids, vec![snapshot.items[0].id.clone()]);

    drop(hold);
    add.await.unwrap();
  }

  #[tokio::test]
  async fn test_add_success_retires_temporary_id() {
    let (engine, _) = engine_with(vec![skill("1", "Rust", 6)]);
    engine.fetch(&skills(), false).await.unwrap();

    let created = engine
      .add(&skills(), fields(json!({"name": "Go", "rating": 4})))
      .await
      .unwrap();
    assert_eq!(created.id, "2");

    let snapshot = engine.snapshot(&skills());
    assert!(snapshot.items.iter().all(|e| !e.id.starts_with("tmp-")));
    assert_eq!(ids(&engine), vec!["1", "2"]);
    assert!(snapshot.pending_ids.is_empty());
    // initial fetch plus the reconciling one
    assert_eq!(engine.gateway().calls(&skills(), GatewayOp::List), 2);
  }

  #[tokio::test]
  async fn test_add_rejected_rolls_back() {
    let (engine, _) = engine_with(vec![skill("1", "Go", 4)]);
    engine.fetch(&skills(), false).await.unwrap();
    let before = engine.snapshot(&skills()).items;
    engine
      .gateway()
      .fail_next(GatewayOp::Create, GatewayError::rejected("duplicate", None));

    let err = engine
      .add(&skills(), fields(json!({"name": "Rust", "rating": 6})))
      .await
      .unwrap_err();
    assert!(matches!(err, SyncError::ServerRejected { ref message, .. } if message == "duplicate"));

    let snapshot = engine.snapshot(&skills());
    assert_eq!(snapshot.items, before);
    assert!(snapshot.pending_ids.is_empty());
    assert_eq!(engine.gateway().calls(&skills(), GatewayOp::List), 1);
  }

  #[tokio::test]
  async fn test_refresh_failure_after_add_still_returns_created() {
    let (engine, _) = engine_with(Vec::new());
    engine.fetch(&skills(), false).await.unwrap();
    engine
      .gateway()
      .fail_next(GatewayOp::List, GatewayError::network("offline"));

    let created = engine
      .add(&skills(), fields(json!({"name": "Rust"})))
      .await
      .unwrap();

    let snapshot = engine.snapshot(&skills());
    assert_eq!(snapshot.items, vec![created]);
    assert!(snapshot.error.is_some());
    assert!(!snapshot.loading);
  }

  #[tokio::test]
  async fn test_concurrent_adds_get_distinct_ids_and_revert_independently() {
    let (engine, _) = engine_with(Vec::new());
    engine.fetch(&skills(), false).await.unwrap();
    let hold = engine.gateway().hold().await;
    // Failures are taken when a call reaches the backend, so this one goes
    // to the first add.
    engine
      .gateway()
      .fail_next(GatewayOp::Create, GatewayError::rejected("nope", None));

    let kind = skills();
    let first = engine.add(&kind, fields(json!({"name": "Rust"})));
    let second = engine.add(&kind, fields(json!({"name": "Go"})));
    futures::pin_mut!(first, second);
    assert!(poll!(first.as_mut()).is_pending());
    assert!(poll!(second.as_mut()).is_pending());

    let pending = ids(&engine);
    assert_eq!(pending.len(), 2);
    assert_ne!(pending[0], pending[1]);

    drop(hold);
    let (first, second) = futures::join!(first, second);
    assert!(matches!(first, Err(SyncError::ServerRejected { .. })));
    let created = second.unwrap();
    assert_eq!(created.get("name"), Some(&json!("Go")));

    let snapshot = engine.snapshot(&skills());
    assert_eq!(snapshot.items, vec![created]);
    assert_eq!(engine.gateway().items(&skills()).len(), 1);
  }

  #[tokio::test]
  async fn test_two_rejected_updates_on_one_entity_restore_it() {
    let (engine, _) = engine_with(vec![skill("1", "Rust", 6)]);
    engine.fetch(&skills(), false).await.unwrap();
    let before = engine.snapshot(&skills()).items;
    let hold = engine.gateway().hold().await;
    engine
      .gateway()
      .fail_next(GatewayOp::Update, GatewayError::rejected("stale", None));
    engine
      .gateway()
      .fail_next(GatewayOp::Update, GatewayError::rejected("stale", None));

    let kind = skills();
    let first = engine.update(&kind, "1", fields(json!({"rating": 9})));
    let second = engine.update(&kind, "1", fields(json!({"rating": 10})));
    futures::pin_mut!(first, second);
    assert!(poll!(first.as_mut()).is_pending());
    assert!(poll!(second.as_mut()).is_pending());
    assert_eq!(engine.snapshot(&skills()).items, vec![skill("1", "Rust", 10)]);

    drop(hold);
    let (first, second) = futures::join!(first, second);
    assert!(first.is_err());
    assert!(second.is_err());

    let snapshot = engine.snapshot(&skills());
    assert_eq!(snapshot.items, before);
    assert!(snapshot.pending_ids.is_empty());
  }

  #[tokio::test]
  async fn test_rejected_update_and_remove_on_one_entity_restore_it() {
    let (engine, _) = engine_with(vec![skill("1", "Rust", 6), skill("2", "Go", 3)]);
    engine.fetch(&skills(), false).await.unwrap();
    let before = engine.snapshot(&skills()).items;
    let hold = engine.gateway().hold().await;
    engine
      .gateway()
      .fail_next(GatewayOp::Update, GatewayError::network("reset"));
    engine
      .gateway()
      .fail_next(GatewayOp::Delete, GatewayError::network("reset"));

    let kind = skills();
    let update = engine.update(&kind, "1", fields(json!({"rating": 9})));
    let remove = engine.remove(&kind, "1");
    futures::pin_mut!(update, remove);
    assert!(poll!(update.as_mut()).is_pending());
    assert!(poll!(remove.as_mut()).is_pending());
    assert_eq!(ids(&engine), vec!["2"]);

    drop(hold);
    let (update, remove) = futures::join!(update, remove);
    assert!(update.is_err());
    assert!(remove.is_err());

    assert_eq!(engine.snapshot(&skills()).items, before);
  }

  #[tokio::test]
  async fn test_newer_update_survives_rejection_of_older_one() {
    let (engine, _) = engine_with(vec![skill("1", "Rust", 6)]);
    engine.fetch(&skills(), false).await.unwrap();
    let hold = engine.gateway().hold().await;
    engine
      .gateway()
      .fail_next(GatewayOp::Update, GatewayError::rejected("stale", None));

    let kind = skills();
    let first = engine.update(&kind, "1", fields(json!({"name": "Rust 2024"})));
    let second = engine.update(&kind, "1", fields(json!({"rating": 10})));
    futures::pin_mut!(first, second);
    assert!(poll!(first.as_mut()).is_pending());
    assert!(poll!(second.as_mut()).is_pending());

    drop(hold);
    assert!(first.await.is_err());
    // Only the rejected rename is undone while the rating change is out.
    assert_eq!(engine.snapshot(&skills()).items, vec![skill("1", "Rust", 10)]);

    second.await.unwrap();
    assert_eq!(engine.snapshot(&skills()).items, vec![skill("1", "Rust", 10)]);
    assert_eq!(
      engine.gateway().items(&skills()),
      vec![skill("1", "Rust", 10)]
    );
  }

  #[tokio::test]
  async fn test_update_absent_id_is_not_found_without_gateway_call() {
    let (engine, _) = engine_with(vec![skill("1", "Rust", 6)]);
    engine.fetch(&skills(), false).await.unwrap();
    let before = engine.snapshot(&skills());

    let err = engine
      .update(&skills(), "42", fields(json!({"rating": 9})))
      .await
      .unwrap_err();
    assert_eq!(
      err,
      SyncError::NotFound {
        kind: skills(),
        id: "42".to_string()
      }
    );
    assert_eq!(engine.snapshot(&skills()), before);
    assert_eq!(engine.gateway().calls(&skills(), GatewayOp::Update), 0);
  }

  #[tokio::test]
  async fn test_update_applies_immediately_and_takes_server_fields() {
    let (engine, _) = engine_with(vec![skill("1", "Rust", 6)]);
    engine.fetch(&skills(), false).await.unwrap();
    let hold = engine.gateway().hold().await;

    let kind = skills();
    let update = engine.update(&kind, "1", fields(json!({"rating": 9})));
    futures::pin_mut!(update);
    assert!(poll!(update.as_mut()).is_pending());
    assert_eq!(engine.snapshot(&skills()).items, vec![skill("1", "Rust", 9)]);

    drop(hold);
    let updated = update.await.unwrap();
    assert_eq!(updated, skill("1", "Rust", 9));
    assert!(engine.snapshot(&skills()).pending_ids.is_empty());
  }

  #[tokio::test]
  async fn test_update_rejected_rolls_back() {
    let (engine, _) = engine_with(vec![skill("1", "Rust", 6), skill("2", "Go", 3)]);
    engine.fetch(&skills(), false).await.unwrap();
    let before = engine.snapshot(&skills()).items;
    engine
      .gateway()
      .fail_next(GatewayOp::Update, GatewayError::network("reset"));

    let result = engine
      .update(&skills(), "2", fields(json!({"rating": 10})))
      .await;
    assert!(matches!(result, Err(SyncError::NetworkFailure { .. })));
    assert_eq!(engine.snapshot(&skills()).items, before);
  }

  #[tokio::test]
  async fn test_remove_success_and_failure() {
    let (engine, _) = engine_with(vec![
      skill("1", "Rust", 6),
      skill("2", "Go", 3),
      skill("3", "Zig", 1),
    ]);
    engine.fetch(&skills(), false).await.unwrap();
    let before = engine.snapshot(&skills()).items;

    engine
      .gateway()
      .fail_next(GatewayOp::Delete, GatewayError::rejected("locked", None));
    assert!(engine.remove(&skills(), "2").await.is_err());
    assert_eq!(engine.snapshot(&skills()).items, before);

    engine.remove(&skills(), "2").await.unwrap();
    assert_eq!(ids(&engine), vec!["1", "3"]);
    assert_eq!(engine.gateway().items(&skills()).len(), 2);
  }

  #[tokio::test]
  async fn test_remove_absent_id_is_not_found() {
    let (engine, _) = engine_with(Vec::new());
    let result = engine.remove(&skills(), "7").await;
    assert!(matches!(result, Err(SyncError::NotFound { .. })));
    assert_eq!(engine.gateway().calls(&skills(), GatewayOp::Delete), 0);
  }

  #[tokio::test]
  async fn test_failing_write_leaves_other_kind_alone() {
    let gateway = MemoryGateway::new();
    gateway.seed(&skills(), vec![skill("1", "Rust", 6)]);
    gateway.seed(
      &ResourceKind::categories(),
      vec![Entity::new("c1", fields(json!({"name": "Languages"})))],
    );
    let engine = SyncEngine::new(gateway);
    engine.fetch(&skills(), false).await.unwrap();
    engine
      .fetch(&ResourceKind::categories(), false)
      .await
      .unwrap();
    let categories = engine.snapshot(&ResourceKind::categories());

    engine
      .gateway()
      .fail_next(GatewayOp::Update, GatewayError::network("down"));
    assert!(engine
      .update(&skills(), "1", fields(json!({"rating": 1})))
      .await
      .is_err());

    assert_eq!(engine.snapshot(&ResourceKind::categories()), categories);
  }

  #[tokio::test]
  async fn test_refresh_during_pending_write_wins() {
    let (engine, _) = engine_with(vec![skill("1", "Rust", 6)]);
    engine.fetch(&skills(), false).await.unwrap();

    let _hold = engine.gateway().hold().await;
    let kind = skills();
    let update = engine.update(&kind, "1", fields(json!({"rating": 9})));
    futures::pin_mut!(update);
    assert!(poll!(update.as_mut()).is_pending());

    // An authoritative refresh lands while the write is still out.
    lock(&engine.store).commit_load(&skills(), vec![skill("1", "Rust", 7)], Utc::now());
    let snapshot = engine.snapshot(&skills());
    assert_eq!(snapshot.items, vec![skill("1", "Rust", 7)]);
    assert!(snapshot.pending_ids.is_empty());
  }

  #[tokio::test]
  async fn test_dropped_write_is_reverted() {
    let (engine, _) = engine_with(vec![skill("1", "Rust", 6)]);
    engine.fetch(&skills(), false).await.unwrap();
    let before = engine.snapshot(&skills()).items;
    let hold = engine.gateway().hold().await;

    {
      let kind = skills();
      let remove = engine.remove(&kind, "1");
      futures::pin_mut!(remove);
      assert!(poll!(remove.as_mut()).is_pending());
      assert!(engine.snapshot(&skills()).items.is_empty());
    }

    assert_eq!(engine.snapshot(&skills()).items, before);
    drop(hold);
  }

  #[tokio::test]
  async fn test_engines_do_not_share_state() {
    let (first, _) = engine_with(vec![skill("1", "Rust", 6)]);
    let (second, _) = engine_with(Vec::new());
    first.fetch(&skills(), false).await.unwrap();
    assert!(second.snapshot(&skills()).items.is_empty());

    let clone = first.clone();
    assert_eq!(clone.snapshot(&skills()).items.len(), 1);
  }

  #[tokio::test]
  async fn test_engine_futures_can_be_spawned() {
    let (engine, _) = engine_with(vec![skill("1", "Rust", 6)]);
    let task = tokio::spawn({
      let engine = engine.clone();
      async move { engine.fetch(&ResourceKind::user_skills(), false).await }
    });
    assert_eq!(task.await.unwrap().unwrap().len(), 1);
    assert_eq!(engine.snapshot(&skills()).items.len(), 1);
  }
}
