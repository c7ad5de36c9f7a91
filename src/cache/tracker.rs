//! Log of optimistic mutations that have been applied locally but not yet
//! confirmed by the backend.

use super::entity::{Entity, Patch};

/// Identifies the write operation that recorded a mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WriteId(pub u64);

/// A local change together with what is needed to undo it.
#[derive(Debug, Clone, PartialEq)]
pub enum PendingMutation {
  /// Entity inserted locally under a temporary id
  Added { temporary_id: String, entity: Entity },
  /// Entity changed locally; `before` is the pre-mutation snapshot
  Updated {
    id: String,
    before: Entity,
    after: Entity,
    patch: Patch,
  },
  /// Entity deleted locally from position `index`
  Removed {
    id: String,
    entity: Entity,
    index: usize,
  },
}

impl PendingMutation {
  /// Id of the entity this mutation touched.
  pub fn entity_id(&self) -> &str {
    match self {
      PendingMutation::Added { temporary_id, .. } => temporary_id,
      PendingMutation::Updated { id, .. } | PendingMutation::Removed { id, .. } => id,
    }
  }

  fn undo(self, items: &mut Vec<Entity>) {
    match self {
      PendingMutation::Added { temporary_id, .. } => {
        items.retain(|e| e.id != temporary_id);
      }
      PendingMutation::Updated { id, before, .. } => {
        if let Some(slot) = items.iter_mut().find(|e| e.id == id) {
          *slot = before;
        }
      }
      PendingMutation::Removed { id, entity, index } => {
        if !items.iter().any(|e| e.id == id) {
          let index = index.min(items.len());
          items.insert(index, entity);
        }
      }
    }
  }

  /// Re-anchor this mutation on `prior`, the state of its entity once an
  /// earlier write is gone. Returns the state it leaves behind.
  fn rebase(&mut self, prior: Option<Entity>) -> Option<Entity> {
    match self {
      PendingMutation::Added { entity, .. } => Some(entity.clone()),
      PendingMutation::Updated {
        before,
        after,
        patch,
        ..
      } => {
        let prior = prior?;
        *after = prior.merged(patch);
        *before = prior;
        Some(after.clone())
      }
      PendingMutation::Removed { entity, .. } => {
        if let Some(prior) = prior {
          *entity = prior;
        }
        None
      }
    }
  }
}

#[derive(Debug, Clone)]
struct Tracked {
  write: WriteId,
  mutation: PendingMutation,
}

/// Append-only mutation log for one resource kind.
#[derive(Debug, Default, Clone)]
pub struct MutationTracker {
  log: Vec<Tracked>,
}

impl MutationTracker {
  pub fn record(&mut self, write: WriteId, mutation: PendingMutation) {
    self.log.push(Tracked { write, mutation });
  }

  pub fn is_empty(&self) -> bool {
    self.log.is_empty()
  }

  pub fn len(&self) -> usize {
    self.log.len()
  }

  pub fn mutations(&self) -> impl Iterator<Item = &PendingMutation> {
    self.log.iter().map(|t| &t.mutation)
  }

  /// Ids of entities currently visible in a not-yet-confirmed state.
  pub fn pending_ids(&self) -> Vec<String> {
    let mut ids: Vec<String> = Vec::new();
    for tracked in &self.log {
      match &tracked.mutation {
        PendingMutation::Removed { id, .. } => ids.retain(|i| i != id),
        other => {
          let id = other.entity_id();
          if !ids.iter().any(|i| i == id) {
            ids.push(id.to_string());
          }
        }
      }
    }
    ids
  }

  /// Undo every tracked mutation, newest first, and empty the log.
  /// Returns how many mutations were undone.
  pub fn revert_all(&mut self, items: &mut Vec<Entity>) -> usize {
    let count = self.log.len();
    for tracked in self.log.drain(..).rev() {
      tracked.mutation.undo(items);
    }
    count
  }

  /// Undo only the mutations recorded by `write`, newest first.
  ///
  /// Later pending mutations of other writes on the same entity were taken
  /// on top of this write's result. They are rebased onto what the entity
  /// looked like before this write, so undoing writes in any order ends at
  /// the same state as undoing them all.
  pub fn revert_write(&mut self, write: WriteId, items: &mut Vec<Entity>) -> usize {
    let mut count = 0;
    while let Some(position) = self.log.iter().rposition(|t| t.write == write) {
      let tracked = self.log.remove(position);
      self.unwind(tracked.mutation, position, items);
      count += 1;
    }
    count
  }

  /// Undo `mutation`, which sat at `position` in the log before it was taken
  /// out.
  fn unwind(&mut self, mutation: PendingMutation, position: usize, items: &mut Vec<Entity>) {
    let id = mutation.entity_id().to_string();
    let overlapped = self.log[position..]
      .iter()
      .any(|t| t.mutation.entity_id() == id);
    if !overlapped {
      mutation.undo(items);
      return;
    }

    match mutation {
      PendingMutation::Added { temporary_id, .. } => {
        // The entity never existed, so later writes on it have nothing left
        // to undo.
        let mut index = 0;
        self.log.retain(|t| {
          let keep = index < position || t.mutation.entity_id() != temporary_id;
          index += 1;
          keep
        });
        items.retain(|e| e.id != temporary_id);
      }
      PendingMutation::Updated { id, before, .. } => {
        let mut state = Some(before);
        for tracked in &mut self.log[position..] {
          if tracked.mutation.entity_id() == id {
            state = tracked.mutation.rebase(state);
          }
        }
        if let Some(entity) = state {
          if let Some(slot) = items.iter_mut().find(|e| e.id == id) {
            *slot = entity;
          }
        }
      }
      // Nothing can touch an entity while its removal is pending.
      removed @ PendingMutation::Removed { .. } => removed.undo(items),
    }
  }

  /// Forget the mutations of a confirmed write.
  pub fn settle(&mut self, write: WriteId) -> usize {
    let before = self.log.len();
    self.log.retain(|t| t.write != write);
    before - self.log.len()
  }

  pub fn clear(&mut self) {
    self.log.clear();
  }
}
