//! Remote document collections.
//!
//! A [`RemoteCollection`] is the only way the store talks to persistent
//! storage. Documents are JSON objects addressed by a string id, and every
//! collection can push full snapshots of its contents to subscribers.

mod memory;
mod sqlite;

pub use memory::MemoryCollection;
pub use sqlite::{init_db, SqliteCollection};

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use tokio::sync::{mpsc, Mutex};
use uuid::Uuid;

use crate::error::{RemoteError, RemoteResult};

/// Length of generated document ids
pub const DOCUMENT_ID_LEN: usize = 20;

/// Generates a fresh document id.
pub fn new_document_id() -> String {
    let mut id = Uuid::new_v4().simple().to_string();
    id.truncate(DOCUMENT_ID_LEN);
    id
}

/// Reference to a single document in a collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentRef {
    collection: String,
    id: String,
}

impl DocumentRef {
    pub fn new(collection: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            id: id.into(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// Slash-separated path, e.g. `movies/abc123`
    pub fn path(&self) -> String {
        format!("{}/{}", self.collection, self.id)
    }
}

/// A document read from a collection.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub id: String,
    pub data: serde_json::Value,
}

impl Document {
    pub fn new(id: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            id: id.into(),
            data,
        }
    }

    /// Deserializes the document data into `T`.
    pub fn to_object<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        T::deserialize(&self.data)
    }
}

/// Full contents of a collection (or of a query over it), in collection order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QuerySnapshot {
    documents: Vec<Document>,
}

impl QuerySnapshot {
    pub fn new(documents: Vec<Document>) -> Self {
        Self { documents }
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Document> {
        self.documents.iter()
    }

    pub fn documents(&self) -> &[Document] {
        &self.documents
    }
}

impl IntoIterator for QuerySnapshot {
    type Item = Document;
    type IntoIter = std::vec::IntoIter<Document>;

    fn into_iter(self) -> Self::IntoIter {
        self.documents.into_iter()
    }
}

impl<'a> IntoIterator for &'a QuerySnapshot {
    type Item = &'a Document;
    type IntoIter = std::slice::Iter<'a, Document>;

    fn into_iter(self) -> Self::IntoIter {
        self.documents.iter()
    }
}

/// One change notification: a full snapshot, or the error that prevented it.
pub type SnapshotEvent = RemoteResult<QuerySnapshot>;

/// Receiving half of a collection subscription.
pub type SnapshotReceiver = mpsc::UnboundedReceiver<SnapshotEvent>;

/// A document collection living outside this process' control.
#[async_trait]
pub trait RemoteCollection: Send + Sync {
    /// Collection name, e.g. `movies`
    fn name(&self) -> &str;

    /// Reference to a new document with a freshly generated id.
    fn document(&self) -> DocumentRef {
        DocumentRef::new(self.name(), new_document_id())
    }

    /// Reference to the document with the given id.
    fn document_at(&self, id: &str) -> DocumentRef {
        DocumentRef::new(self.name(), id)
    }

    async fn get(&self, id: &str) -> RemoteResult<Option<Document>>;

    /// Creates or fully replaces the document with the given id.
    async fn set(&self, id: &str, data: serde_json::Value) -> RemoteResult<()>;

    /// Removes the document. Deleting a missing document is not an error.
    async fn delete(&self, id: &str) -> RemoteResult<()>;

    /// Returns every document whose top-level `field` equals `value`.
    async fn query_equal(&self, field: &str, value: serde_json::Value)
        -> RemoteResult<QuerySnapshot>;

    /// Subscribes to collection changes.
    ///
    /// The current snapshot is delivered first, followed by a full snapshot
    /// after every change. Dropping the receiver ends the subscription.
    async fn subscribe(&self) -> SnapshotReceiver;
}

/// Fan-out of snapshot events to subscribed receivers.
#[derive(Debug, Default)]
pub(crate) struct Subscribers {
    senders: Mutex<Vec<mpsc::UnboundedSender<SnapshotEvent>>>,
}

impl Subscribers {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Registers a new subscriber, seeding it with `initial` before any
    /// later notification can reach it.
    pub(crate) async fn register(&self, initial: SnapshotEvent) -> SnapshotReceiver {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut senders = self.senders.lock().await;
        if tx.send(initial).is_ok() {
            senders.push(tx);
        }
        rx
    }

    pub(crate) async fn notify(&self, snapshot: QuerySnapshot) {
        let mut senders = self.senders.lock().await;
        senders.retain(|tx| tx.send(Ok(snapshot.clone())).is_ok());
    }

    pub(crate) async fn notify_error(&self, message: &str) {
        let mut senders = self.senders.lock().await;
        senders.retain(|tx| tx.send(Err(RemoteError::Unavailable(message.to_string()))).is_ok());
    }

    #[cfg(test)]
    pub(crate) async fn len(&self) -> usize {
        self.senders.lock().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Movie;
    use serde_json::json;

    #[test]
    fn test_new_document_id_shape() {
        let id = new_document_id();
        assert_eq!(id.len(), DOCUMENT_ID_LEN);
        assert!(id.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(id, new_document_id());
    }

    #[test]
    fn test_document_ref_path() {
        let doc_ref = DocumentRef::new("movies", "abc");
        assert_eq!(doc_ref.id(), "abc");
        assert_eq!(doc_ref.collection(), "movies");
        assert_eq!(doc_ref.path(), "movies/abc");
    }

    #[test]
    fn test_document_to_object() {
        let doc = Document::new(
            "abc",
            json!({"id": "abc", "title": "Dune", "genre": "Sci-Fi", "year": 2021}),
        );
        let movie: Movie = doc.to_object().unwrap();
        assert_eq!(movie.id, "abc");
        assert_eq!(movie.title, "Dune");

        let bad = Document::new("x", json!({"title": 5}));
        assert!(bad.to_object::<Movie>().is_err());
    }

    #[tokio::test]
    async fn test_subscribers_prune_closed_receivers() {
        let subscribers = Subscribers::new();
        let mut kept = subscribers.register(Ok(QuerySnapshot::default())).await;
        let dropped = subscribers.register(Ok(QuerySnapshot::default())).await;
        drop(dropped);

        subscribers
            .notify(QuerySnapshot::new(vec![Document::new("a", json!({}))]))
            .await;
        assert_eq!(subscribers.len().await, 1);

        assert!(kept.recv().await.unwrap().unwrap().is_empty());
        assert_eq!(kept.recv().await.unwrap().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_subscribers_notify_error() {
        let subscribers = Subscribers::new();
        let mut rx = subscribers.register(Ok(QuerySnapshot::default())).await;
        subscribers.notify_error("permission denied").await;

        rx.recv().await.unwrap().unwrap();
        let err = rx.recv().await.unwrap().unwrap_err();
        assert!(err.to_string().contains("permission denied"));
    }
}
