use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use reqwest::{Client, StatusCode};
use serde_json::Value;

use crate::errors::{Result, StorageError};

const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Seam over the remote per-user document tree. Paths are slash
/// separated (`users/{uid}/dailyEntries/2024-05-01`); values are JSON
/// documents. Every mutation carries a server-side `updatedAt` stamp.
#[async_trait]
pub trait DocumentClient: Send + Sync {
    async fn get_document(&self, path: &str) -> Result<Option<Value>>;
    async fn put_document(&self, path: &str, value: Value) -> Result<()>;
    async fn delete_document(&self, path: &str) -> Result<()>;
    /// Documents directly under `prefix`, as `(id, document)` pairs
    /// where `id` is the final path segment. Order follows id.
    async fn list_documents(&self, prefix: &str) -> Result<Vec<(String, Value)>>;
}

/// In-process document tree for tests and single-machine hosts. Plays
/// the server role, so it stamps `updatedAt` itself.
#[derive(Default)]
pub struct MemoryDocumentClient {
    documents: DashMap<String, Value>,
}

impl MemoryDocumentClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn document_count(&self) -> usize {
        self.documents.len()
    }
}

#[async_trait]
impl DocumentClient for MemoryDocumentClient {
    async fn get_document(&self, path: &str) -> Result<Option<Value>> {
        Ok(self.documents.get(path).map(|d| d.value().clone()))
    }

    async fn put_document(&self, path: &str, mut value: Value) -> Result<()> {
        if let Value::Object(fields) = &mut value {
            fields.insert(
                "updatedAt".to_string(),
                Value::String(Utc::now().to_rfc3339()),
            );
        }
        self.documents.insert(path.to_string(), value);
        Ok(())
    }

    async fn delete_document(&self, path: &str) -> Result<()> {
        self.documents.remove(path);
        Ok(())
    }

    async fn list_documents(&self, prefix: &str) -> Result<Vec<(String, Value)>> {
        let prefix = format!("{}/", prefix.trim_end_matches('/'));
        let mut documents: Vec<(String, Value)> = self
            .documents
            .iter()
            .filter_map(|entry| {
                let id = entry.key().strip_prefix(&prefix)?;
                // Only direct children; nested paths belong to other collections
                if id.contains('/') {
                    return None;
                }
                Some((id.to_string(), entry.value().clone()))
            })
            .collect();
        documents.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(documents)
    }
}

/// REST client for a hosted document store. `GET`/`PUT`/`DELETE` map
/// onto single documents; listing a collection returns a JSON object
/// keyed by document id. The server stamps `updatedAt`.
pub struct HttpDocumentClient {
    client: Client,
    base_url: String,
}

impl HttpDocumentClient {
    pub fn new(base_url: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;
        Ok(HttpDocumentClient {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }
}

#[async_trait]
impl DocumentClient for HttpDocumentClient {
    async fn get_document(&self, path: &str) -> Result<Option<Value>> {
        let response = self.client.get(self.url(path)).send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(StorageError::RemoteStatus(response.status().as_u16()).into());
        }
        Ok(Some(response.json().await?))
    }

    async fn put_document(&self, path: &str, value: Value) -> Result<()> {
        let response = self.client.put(self.url(path)).json(&value).send().await?;
        if !response.status().is_success() {
            return Err(StorageError::RemoteStatus(response.status().as_u16()).into());
        }
        Ok(())
    }

    async fn delete_document(&self, path: &str) -> Result<()> {
        let response = self.client.delete(self.url(path)).send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(());
        }
        if !response.status().is_success() {
            return Err(StorageError::RemoteStatus(response.status().as_u16()).into());
        }
        Ok(())
    }

    async fn list_documents(&self, prefix: &str) -> Result<Vec<(String, Value)>> {
        let response = self.client.get(self.url(prefix)).send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(Vec::new());
        }
        if !response.status().is_success() {
            return Err(StorageError::RemoteStatus(response.status().as_u16()).into());
        }
        let body: Value = response.json().await?;
        let mut documents: Vec<(String, Value)> = match body {
            Value::Object(map) => map.into_iter().collect(),
            _ => {
                return Err(StorageError::KeyValue(format!(
                    "collection listing for '{prefix}' is not an object"
                ))
                .into())
            }
        };
        documents.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(documents)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_memory_round_trip() {
        let client = MemoryDocumentClient::new();
        client
            .put_document("users/u1/settings/goals", json!({"dailyGoal": 2000.0}))
            .await
            .unwrap();

        let doc = client
            .get_document("users/u1/settings/goals")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(doc["dailyGoal"], json!(2000.0));
        assert!(doc["updatedAt"].is_string());

        client.delete_document("users/u1/settings/goals").await.unwrap();
        assert!(client
            .get_document("users/u1/settings/goals")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_memory_list_direct_children_only() {
        let client = MemoryDocumentClient::new();
        client
            .put_document("users/u1/dailyEntries/2024-05-01", json!({"progress": 1.0}))
            .await
            .unwrap();
        client
            .put_document("users/u1/dailyEntries/2024-05-02", json!({"progress": 2.0}))
            .await
            .unwrap();
        client
            .put_document("users/u1/settings/goals", json!({}))
            .await
            .unwrap();

        let listed = client.list_documents("users/u1/dailyEntries").await.unwrap();
        let ids: Vec<&str> = listed.iter().map(|(id, _)| id.as_str()).collect();
        assert_eq!(ids, vec!["2024-05-01", "2024-05-02"]);

        let listed = client.list_documents("users/u1").await.unwrap();
        assert!(listed.is_empty());
    }
}
