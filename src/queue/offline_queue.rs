use std::sync::Arc;

use log::info;
use serde_json::Value;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::constants::OFFLINE_QUEUE_KEY;
use crate::errors::Result;
use crate::queue::queue_model::{OfflineAction, OfflineActionKind};
use crate::storage::kv_store::KvStore;

/// Durable, ordered log of pending mutations. Lives in the local
/// key-value store so it survives a reload; append-only with
/// removal-by-id. The read-modify-write cycle on the serialized list
/// is guarded by a single mutex.
pub struct OfflineQueue {
    kv: Arc<dyn KvStore>,
    write_lock: Mutex<()>,
}

impl OfflineQueue {
    pub fn new(kv: Arc<dyn KvStore>) -> Self {
        OfflineQueue {
            kv,
            write_lock: Mutex::new(()),
        }
    }

    fn load(&self) -> Result<Vec<OfflineAction>> {
        match self.kv.get(OFFLINE_QUEUE_KEY)? {
            Some(raw) => Ok(serde_json::from_str(&raw)?),
            None => Ok(Vec::new()),
        }
    }

    fn persist(&self, actions: &[OfflineAction]) -> Result<()> {
        self.kv
            .set(OFFLINE_QUEUE_KEY, &serde_json::to_string(actions)?)
    }

    pub async fn enqueue(
        &self,
        kind: OfflineActionKind,
        path: String,
        data: Option<Value>,
    ) -> Result<OfflineAction> {
        let _guard = self.write_lock.lock().await;
        let mut actions = self.load()?;
        let action = OfflineAction::new(kind, path, data);
        info!("queueing offline {:?} for '{}'", action.kind, action.path);
        actions.push(action.clone());
        self.persist(&actions)?;
        Ok(action)
    }

    /// Pending actions in insertion order
    pub async fn actions(&self) -> Result<Vec<OfflineAction>> {
        let _guard = self.write_lock.lock().await;
        self.load()
    }

    pub async fn remove(&self, id: Uuid) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let mut actions = self.load()?;
        actions.retain(|a| a.id != id);
        self.persist(&actions)
    }

    pub async fn clear(&self) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        self.kv.remove(OFFLINE_QUEUE_KEY)
    }

    pub async fn len(&self) -> Result<usize> {
        Ok(self.actions().await?.len())
    }

    pub async fn is_empty(&self) -> Result<bool> {
        Ok(self.len().await? == 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::queue_model::paths;
    use crate::storage::kv_store::MemoryKvStore;

    #[tokio::test]
    async fn test_enqueue_preserves_insertion_order() {
        let queue = OfflineQueue::new(Arc::new(MemoryKvStore::new()));
        queue
            .enqueue(OfflineActionKind::Update, paths::GOALS.to_string(), None)
            .await
            .unwrap();
        queue
            .enqueue(
                OfflineActionKind::Update,
                paths::PREFERENCES.to_string(),
                None,
            )
            .await
            .unwrap();

        let actions = queue.actions().await.unwrap();
        assert_eq!(actions.len(), 2);
        assert_eq!(actions[0].path, "goals");
        assert_eq!(actions[1].path, "preferences");
    }

    #[tokio::test]
    async fn test_remove_by_id() {
        let queue = OfflineQueue::new(Arc::new(MemoryKvStore::new()));
        let first = queue
            .enqueue(OfflineActionKind::Update, paths::GOALS.to_string(), None)
            .await
            .unwrap();
        queue
            .enqueue(
                OfflineActionKind::Update,
                paths::PREFERENCES.to_string(),
                None,
            )
            .await
            .unwrap();

        queue.remove(first.id).await.unwrap();
        let actions = queue.actions().await.unwrap();
        assert_eq!(actions.len(), 1);
        assert_eq!(actions[0].path, "preferences");
    }

    #[tokio::test]
    async fn test_queue_survives_reopen() {
        let kv: Arc<MemoryKvStore> = Arc::new(MemoryKvStore::new());

        let queue = OfflineQueue::new(kv.clone());
        queue
            .enqueue(OfflineActionKind::Update, paths::GOALS.to_string(), None)
            .await
            .unwrap();
        drop(queue);

        // A fresh queue over the same store sees the pending action
        let reopened = OfflineQueue::new(kv);
        assert_eq!(reopened.len().await.unwrap(), 1);
    }
}
