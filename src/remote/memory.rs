use async_trait::async_trait;
use std::collections::BTreeMap;
use tokio::sync::RwLock;

use super::{Document, QuerySnapshot, RemoteCollection, SnapshotReceiver, Subscribers};
use crate::error::{RemoteError, RemoteResult};

/// In-process collection, ordered by document id.
///
/// Useful for tests and demos. [`fail_with`](Self::fail_with) simulates an
/// unreachable backend until [`recover`](Self::recover) is called.
#[derive(Debug)]
pub struct MemoryCollection {
    name: String,
    documents: RwLock<BTreeMap<String, serde_json::Value>>,
    failure: RwLock<Option<String>>,
    subscribers: Subscribers,
}

impl MemoryCollection {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            documents: RwLock::new(BTreeMap::new()),
            failure: RwLock::new(None),
            subscribers: Subscribers::new(),
        }
    }

    /// Makes every later call fail with `message` and pushes the error to
    /// current subscribers.
    pub async fn fail_with(&self, message: impl Into<String>) {
        let message = message.into();
        *self.failure.write().await = Some(message.clone());
        self.subscribers.notify_error(&message).await;
    }

    pub async fn recover(&self) {
        *self.failure.write().await = None;
    }

    pub async fn len(&self) -> usize {
        self.documents.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.documents.read().await.is_empty()
    }

    async fn check_available(&self) -> RemoteResult<()> {
        match self.failure.read().await.as_ref() {
            Some(message) => Err(RemoteError::Unavailable(message.clone())),
            None => Ok(()),
        }
    }

    fn snapshot_of(documents: &BTreeMap<String, serde_json::Value>) -> QuerySnapshot {
        QuerySnapshot::new(
            documents
                .iter()
                .map(|(id, data)| Document::new(id.clone(), data.clone()))
                .collect(),
        )
    }
}

#[async_trait]
impl RemoteCollection for MemoryCollection {
    fn name(&self) -> &str {
        &self.name
    }

    async fn get(&self, id: &str) -> RemoteResult<Option<Document>> {
        self.check_available().await?;
        let documents = self.documents.read().await;
        Ok(documents
            .get(id)
            .map(|data| Document::new(id, data.clone())))
    }

    async fn set(&self, id: &str, data: serde_json::Value) -> RemoteResult<()> {
        self.check_available().await?;
        let mut documents = self.documents.write().await;
        documents.insert(id.to_string(), data);
        self.subscribers.notify(Self::snapshot_of(&documents)).await;
        Ok(())
    }

    async fn delete(&self, id: &str) -> RemoteResult<()> {
        self.check_available().await?;
        let mut documents = self.documents.write().await;
        if documents.remove(id).is_some() {
            self.subscribers.notify(Self::snapshot_of(&documents)).await;
        }
        Ok(())
    }

    async fn query_equal(
        &self,
        field: &str,
        value: serde_json::Value,
    ) -> RemoteResult<QuerySnapshot> {
        self.check_available().await?;
        let documents = self.documents.read().await;
        Ok(QuerySnapshot::new(
            documents
                .iter()
                .filter(|(_, data)| data.get(field) == Some(&value))
                .map(|(id, data)| Document::new(id.clone(), data.clone()))
                .collect(),
        ))
    }

    async fn subscribe(&self) -> SnapshotReceiver {
        // Held until registered so no change slips between snapshot and subscription
        let documents = self.documents.read().await;
        let initial = match self.check_available().await {
            Ok(()) => Ok(Self::snapshot_of(&documents)),
            Err(e) => Err(e),
        };
        self.subscribers.register(initial).await
    }
}
