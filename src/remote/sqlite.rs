use async_trait::async_trait;
use chrono::Utc;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::str::FromStr;
use tokio::sync::Mutex;

use super::{Document, QuerySnapshot, RemoteCollection, SnapshotReceiver, Subscribers};
use crate::error::RemoteResult;

/// Initialize the database connection pool and run migrations
pub async fn init_db(path: &Path) -> RemoteResult<SqlitePool> {
    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let db_url = format!("sqlite:{}?mode=rwc", path.display());

    let options = SqliteConnectOptions::from_str(&db_url)?.create_if_missing(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?;

    sqlx::migrate!("./migrations").run(&pool).await?;

    Ok(pool)
}

#[derive(sqlx::FromRow)]
struct DocumentRow {
    id: String,
    data: String,
}

impl DocumentRow {
    fn into_document(self) -> RemoteResult<Document> {
        let data = serde_json::from_str(&self.data)?;
        Ok(Document::new(self.id, data))
    }
}

/// Collection stored as JSON rows in a SQLite `documents` table.
///
/// Change notifications only reach subscribers in this process.
pub struct SqliteCollection {
    pool: SqlitePool,
    name: String,
    subscribers: Subscribers,
    // Serializes writes with their notifications
    write_lock: Mutex<()>,
}

impl SqliteCollection {
    pub fn new(pool: SqlitePool, name: impl Into<String>) -> Self {
        Self {
            pool,
            name: name.into(),
            subscribers: Subscribers::new(),
            write_lock: Mutex::new(()),
        }
    }

    async fn load_all(&self) -> RemoteResult<QuerySnapshot> {
        let rows: Vec<DocumentRow> =
            sqlx::query_as("SELECT id, data FROM documents WHERE collection = ? ORDER BY id")
                .bind(&self.name)
                .fetch_all(&self.pool)
                .await?;

        let documents = rows
            .into_iter()
            .map(DocumentRow::into_document)
            .collect::<RemoteResult<Vec<_>>>()?;
        Ok(QuerySnapshot::new(documents))
    }

    async fn publish(&self) {
        match self.load_all().await {
            Ok(snapshot) => self.subscribers.notify(snapshot).await,
            Err(e) => self.subscribers.notify_error(&e.to_string()).await,
        }
    }
}

impl std::fmt::Debug for SqliteCollection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteCollection")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl RemoteCollection for SqliteCollection {
    fn name(&self) -> &str {
        &self.name
    }

    async fn get(&self, id: &str) -> RemoteResult<Option<Document>> {
        let row: Option<DocumentRow> =
            sqlx::query_as("SELECT id, data FROM documents WHERE collection = ? AND id = ?")
                .bind(&self.name)
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;

        row.map(DocumentRow::into_document).transpose()
    }

    async fn set(&self, id: &str, data: serde_json::Value) -> RemoteResult<()> {
        let data = serde_json::to_string(&data)?;
        let updated_at = Utc::now().to_rfc3339();

        let _guard = self.write_lock.lock().await;
        sqlx::query(
            r#"
            INSERT INTO documents (collection, id, data, updated_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(collection, id) DO UPDATE SET data = excluded.data, updated_at = excluded.updated_at
            "#,
        )
        .bind(&self.name)
        .bind(id)
        .bind(&data)
        .bind(&updated_at)
        .execute(&self.pool)
        .await?;

        self.publish().await;
        Ok(())
    }

    async fn delete(&self, id: &str) -> RemoteResult<()> {
        let _guard = self.write_lock.lock().await;
        let result = sqlx::query("DELETE FROM documents WHERE collection = ? AND id = ?")
            .bind(&self.name)
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() > 0 {
            self.publish().await;
        }
        Ok(())
    }

    async fn query_equal(
        &self,
        field: &str,
        value: serde_json::Value,
    ) -> RemoteResult<QuerySnapshot> {
        let path = format!("$.{}", field);
        let value = serde_json::to_string(&value)?;

        let rows: Vec<DocumentRow> = sqlx::query_as(
            r#"
            SELECT id, data FROM documents
            WHERE collection = ? AND json_extract(data, ?) = json_extract(?, '$')
            ORDER BY id
            "#,
        )
        .bind(&self.name)
        .bind(&path)
        .bind(&value)
        .fetch_all(&self.pool)
        .await?;

        let documents = rows
            .into_iter()
            .map(DocumentRow::into_document)
            .collect::<RemoteResult<Vec<_>>>()?;
        Ok(QuerySnapshot::new(documents))
    }

    async fn subscribe(&self) -> SnapshotReceiver {
        let _guard = self.write_lock.lock().await;
        let initial = self.load_all().await;
        self.subscribers.register(initial).await
    }
}
