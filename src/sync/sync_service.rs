use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use log::{debug, info, warn};
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::errors::{Result, ValidationError};
use crate::queue::{ActionTarget, AddIncomePayload, OfflineAction, OfflineActionKind, OfflineQueue};
use crate::storage::StorageBackend;
use crate::sync::write_locks::WriteLocks;

/// Tally of one replay run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplayOutcome {
    pub attempted: usize,
    pub applied: usize,
    pub failed: usize,
}

/// Replays queued offline actions into the remote backend.
///
/// At-least-once semantics: an action is removed from the queue only
/// after its backend call succeeds, and a failing action is left in
/// place for the next run without aborting the scan. Only one replay
/// runs at a time; concurrent calls return an empty outcome.
pub struct SyncService {
    queue: Arc<OfflineQueue>,
    remote: Arc<dyn StorageBackend>,
    locks: Arc<WriteLocks>,
    in_progress: AtomicBool,
}

impl SyncService {
    pub fn new(
        queue: Arc<OfflineQueue>,
        remote: Arc<dyn StorageBackend>,
        locks: Arc<WriteLocks>,
    ) -> Self {
        SyncService {
            queue,
            remote,
            locks,
            in_progress: AtomicBool::new(false),
        }
    }

    pub fn is_replaying(&self) -> bool {
        self.in_progress.load(Ordering::SeqCst)
    }

    pub async fn replay(&self) -> Result<ReplayOutcome> {
        if self.in_progress.swap(true, Ordering::SeqCst) {
            debug!("replay already in progress, skipping");
            return Ok(ReplayOutcome::default());
        }
        let result = self.drain().await;
        self.in_progress.store(false, Ordering::SeqCst);
        result
    }

    async fn drain(&self) -> Result<ReplayOutcome> {
        let actions = self.queue.actions().await?;
        let mut outcome = ReplayOutcome::default();
        if actions.is_empty() {
            return Ok(outcome);
        }
        info!("replaying {} queued offline actions", actions.len());

        for action in actions {
            outcome.attempted += 1;
            let applied = self.apply(&action).await;
            match applied {
                Ok(()) => {
                    // Remove before touching the next action so a crash
                    // can re-apply but never skip
                    self.queue.remove(action.id).await?;
                    outcome.applied += 1;
                }
                Err(e) => {
                    warn!(
                        "replay of {:?} '{}' failed, leaving queued: {e}",
                        action.kind, action.path
                    );
                    outcome.failed += 1;
                }
            }
        }
        info!(
            "replay finished: {} applied, {} still queued",
            outcome.applied, outcome.failed
        );
        Ok(outcome)
    }

    /// Re-derive and run the concrete backend call for one action,
    /// holding the same write locks as a live call on that path.
    async fn apply(&self, action: &OfflineAction) -> Result<()> {
        let target = ActionTarget::parse(&action.path).ok_or_else(|| {
            ValidationError::InvalidInput(format!("unknown action path '{}'", action.path))
        })?;
        let _guards = self.locks.lock_scope(&target.write_scope()).await;

        match (&target, action.kind) {
            (ActionTarget::Goals, OfflineActionKind::Update) => {
                self.remote.update_goals(decode(&action.data)?).await?;
            }
            (ActionTarget::Preferences, OfflineActionKind::Update) => {
                self.remote.update_preferences(decode(&action.data)?).await?;
            }
            (ActionTarget::IncomeSource(_), OfflineActionKind::Add) => {
                let source = decode(&action.data)?;
                self.remote.add_income_source(&source).await?;
            }
            (ActionTarget::IncomeSource(id), OfflineActionKind::Update) => {
                self.remote
                    .update_income_source(id, decode(&action.data)?)
                    .await?;
            }
            (ActionTarget::DailyEntry(date), OfflineActionKind::Add) => {
                let payload: AddIncomePayload = decode(&action.data)?;
                self.remote
                    .add_income_to_day(*date, payload.amount, &payload.source)
                    .await?;
            }
            (ActionTarget::DailyEntry(date), OfflineActionKind::Update) => {
                let entry: crate::models::DailyEntry = decode(&action.data)?;
                if entry.date != *date {
                    return Err(ValidationError::InvalidInput(format!(
                        "entry date {} does not match action path '{}'",
                        entry.date, action.path
                    ))
                    .into());
                }
                self.remote.update_day_entry(entry).await?;
            }
            (ActionTarget::DailyEntry(date), OfflineActionKind::Delete) => {
                self.remote.delete_day_entry(*date).await?;
            }
            (_, kind) => {
                return Err(ValidationError::InvalidInput(format!(
                    "unsupported {kind:?} action for '{}'",
                    action.path
                ))
                .into());
            }
        }
        Ok(())
    }
}

fn decode<T: DeserializeOwned>(data: &Option<Value>) -> Result<T> {
    let value = data
        .clone()
        .ok_or_else(|| ValidationError::InvalidInput("action data missing".to_string()))?;
    Ok(serde_json::from_value(value)?)
}
