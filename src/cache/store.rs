//! Per-kind cache entries and the transitions allowed on them.

use chrono::{DateTime, Utc};
use std::collections::HashMap;

use super::entity::{Entity, Patch, ResourceKind};
use super::tracker::{MutationTracker, PendingMutation, WriteId};
use crate::error::{SyncError, SyncResult};

/// Cached state of one resource kind.
#[derive(Debug, Default, Clone)]
pub struct CacheEntry {
  pub items: Vec<Entity>,
  pub last_fetched_at: Option<DateTime<Utc>>,
  /// At most one fetch is outstanding while this is set
  pub loading: bool,
  pub error: Option<SyncError>,
  pending: MutationTracker,
}

impl CacheEntry {
  pub fn pending(&self) -> &MutationTracker {
    &self.pending
  }

  fn position(&self, id: &str) -> Option<usize> {
    self.items.iter().position(|e| e.id == id)
  }
}

/// Read-only copy of a cache entry handed to the UI.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Snapshot {
  pub items: Vec<Entity>,
  pub loading: bool,
  pub error: Option<SyncError>,
  pub last_fetched_at: Option<DateTime<Utc>>,
  /// Ids of items shown in a not-yet-confirmed state
  pub pending_ids: Vec<String>,
}

/// Holds one [`CacheEntry`] per resource kind. Entries are created on first
/// access and never dropped.
#[derive(Debug, Default)]
pub struct StateStore {
  entries: HashMap<ResourceKind, CacheEntry>,
}

impl StateStore {
  pub fn new() -> Self {
    Self::default()
  }

  fn entry_mut(&mut self, kind: &ResourceKind) -> &mut CacheEntry {
    self.entries.entry(kind.clone()).or_default()
  }

  pub fn entry(&self, kind: &ResourceKind) -> Option<&CacheEntry> {
    self.entries.get(kind)
  }

  pub fn snapshot(&self, kind: &ResourceKind) -> Snapshot {
    match self.entries.get(kind) {
      Some(entry) => Snapshot {
        items: entry.items.clone(),
        loading: entry.loading,
        error: entry.error.clone(),
        last_fetched_at: entry.last_fetched_at,
        pending_ids: entry.pending.pending_ids(),
      },
      None => Snapshot::default(),
    }
  }

  pub fn items(&self, kind: &ResourceKind) -> Vec<Entity> {
    self
      .entries
      .get(kind)
      .map(|e| e.items.clone())
      .unwrap_or_default()
  }

  pub fn last_fetched_at(&self, kind: &ResourceKind) -> Option<DateTime<Utc>> {
    self.entries.get(kind).and_then(|e| e.last_fetched_at)
  }

  pub fn is_loading(&self, kind: &ResourceKind) -> bool {
    self.entries.get(kind).map(|e| e.loading).unwrap_or(false)
  }

  /// Mark a fetch as started. Refuses if one is already in flight.
  pub fn begin_load(&mut self, kind: &ResourceKind) -> SyncResult<()> {
    let entry = self.entry_mut(kind);
    if entry.loading {
      return Err(SyncError::ConcurrentLoadIgnored { kind: kind.clone() });
    }
    entry.loading = true;
    entry.error = None;
    Ok(())
  }

  /// Replace the collection with authoritative server state. Any optimistic
  /// state still pending for the kind is superseded and forgotten.
  pub fn commit_load(&mut self, kind: &ResourceKind, items: Vec<Entity>, now: DateTime<Utc>) {
    let entry = self.entry_mut(kind);
    entry.items = items;
    entry.last_fetched_at = Some(now);
    entry.loading = false;
    entry.error = None;
    entry.pending.clear();
  }

  /// Record a failed fetch. Previously fetched items stay visible.
  pub fn fail_load(&mut self, kind: &ResourceKind, error: SyncError) {
    let entry = self.entry_mut(kind);
    entry.loading = false;
    entry.error = Some(error);
  }

  /// Release the loading flag of a fetch that was abandoned before it
  /// completed.
  pub fn abort_load(&mut self, kind: &ResourceKind) {
    self.entry_mut(kind).loading = false;
  }

  pub fn apply_add(&mut self, kind: &ResourceKind, write: WriteId, entity: Entity) {
    let entry = self.entry_mut(kind);
    entry.pending.record(
      write,
      PendingMutation::Added {
        temporary_id: entity.id.clone(),
        entity: entity.clone(),
      },
    );
    entry.items.push(entity);
  }

  /// Merge `patch` into the entity `id`. Returns the optimistic result, or
  /// `NotFound` without touching the store.
  pub fn apply_update(
    &mut self,
    kind: &ResourceKind,
    write: WriteId,
    id: &str,
    patch: &Patch,
  ) -> SyncResult<Entity> {
    let entry = self.entry_mut(kind);
    let index = entry.position(id).ok_or_else(|| SyncError::NotFound {
      kind: kind.clone(),
      id: id.to_string(),
    })?;
    let before = entry.items[index].clone();
    let after = before.merged(patch);
    entry.pending.record(
      write,
      PendingMutation::Updated {
        id: id.to_string(),
        before,
        after: after.clone(),
        patch: patch.clone(),
      },
    );
    entry.items[index] = after.clone();
    Ok(after)
  }

  /// Drop the entity `id`. Returns its pre-deletion snapshot, or `NotFound`
  /// without touching the store.
  pub fn apply_remove(&mut self, kind: &ResourceKind, write: WriteId, id: &str) -> SyncResult<Entity> {
    let entry = self.entry_mut(kind);
    let index = entry.position(id).ok_or_else(|| SyncError::NotFound {
      kind: kind.clone(),
      id: id.to_string(),
    })?;
    let entity = entry.items.remove(index);
    entry.pending.record(
      write,
      PendingMutation::Removed {
        id: id.to_string(),
        entity: entity.clone(),
        index,
      },
    );
    Ok(entity)
  }

  /// Undo every pending mutation of the kind, newest first, and clear the
  /// loading flag. A kind with nothing pending is left as it is.
  pub fn revert(&mut self, kind: &ResourceKind) -> usize {
    let entry = self.entry_mut(kind);
    let CacheEntry { items, pending, .. } = &mut *entry;
    let undone = pending.revert_all(items);
    entry.loading = false;
    undone
  }

  /// Undo only the mutations recorded by one write.
  pub fn revert_write(&mut self, kind: &ResourceKind, write: WriteId) -> usize {
    let CacheEntry { items, pending, .. } = self.entry_mut(kind);
    pending.revert_write(write, items)
  }

  /// Forget the tracked mutations of a write the backend confirmed.
  pub fn settle_write(&mut self, kind: &ResourceKind, write: WriteId) {
    self.entry_mut(kind).pending.settle(write);
  }

  /// Swap the temporary entity of a confirmed add for the server's copy.
  /// Does nothing to the items if a refresh already replaced the temporary
  /// entity.
  pub fn confirm_add(&mut self, kind: &ResourceKind, write: WriteId, temporary_id: &str, created: Entity) {
    self.settle_write(kind, write);
    let entry = self.entry_mut(kind);

    let Some(index) = entry.position(temporary_id) else {
      return;
    };
    if let Some(existing) = entry.position(&created.id) {
      entry.items[existing] = created;
      entry.items.remove(index);
    } else {
      entry.items[index] = created;
    }
  }

  /// Fold server-returned fields into the entity after a confirmed update.
  /// Server values win over the optimistic guess. Returns the entity as it
  /// now stands, or the server copy if a refresh already dropped it.
  pub fn confirm_update(
    &mut self,
    kind: &ResourceKind,
    write: WriteId,
    id: &str,
    confirmed: Entity,
  ) -> Entity {
    self.settle_write(kind, write);
    let entry = self.entry_mut(kind);
    match entry.position(id) {
      Some(index) => {
        let merged = entry.items[index].merged(&confirmed.fields);
        entry.items[index] = merged.clone();
        merged
      }
      None => confirmed,
    }
  }

  /// Settle a confirmed removal. The entity stays gone even if a revert of
  /// other writes put it back in the meantime.
  pub fn confirm_remove(&mut self, kind: &ResourceKind, write: WriteId, id: &str) {
    self.settle_write(kind, write);
    let entry = self.entry_mut(kind);
    entry.items.retain(|e| e.id != id);
  }
}
