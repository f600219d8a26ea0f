//! The movie store.
//!
//! [`MovieStore`] keeps a cache of every movie in the remote collection and
//! routes all writes to it. Writes are fire-and-forget: the call returns as
//! soon as the movie passes local validation, and the remote write runs in
//! the background. The cache is only refreshed by snapshots from the
//! collection, delivered to the observer registered with
//! [`MovieStore::listen_for_updates`].

use serde_json::json;
use std::future::Future;
use std::sync::{Arc, Mutex, OnceLock, PoisonError};
use tokio::sync::RwLock;
use tokio::task::JoinHandle;

use crate::error::{RemoteError, StoreError, StoreResult};
use crate::models::Movie;
use crate::remote::{DocumentRef, QuerySnapshot, RemoteCollection, SnapshotReceiver};

const INVALID_MOVIE: &str = "Invalid Movie!";

/// Shared, live view of the cached movies.
pub type MovieList = Arc<RwLock<Vec<Movie>>>;

/// Receives cache change notifications.
pub trait DataStatus: Send + Sync {
    /// The cache was rebuilt from a new snapshot.
    fn on_data_updated(&self);

    /// The collection reported an error; the cache was left as it was.
    fn on_error(&self, message: &str);
}

/// Holds the one [`MovieStore`] shared by an application.
#[derive(Debug, Default)]
pub struct StoreContext {
    store: OnceLock<Arc<MovieStore>>,
}

impl StoreContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the store, creating it on first call.
    ///
    /// Only the first caller's collection is used; later arguments are
    /// ignored.
    pub fn get_instance(&self, remote: Arc<dyn RemoteCollection>) -> Arc<MovieStore> {
        Arc::clone(self.store.get_or_init(|| Arc::new(MovieStore::new(remote))))
    }
}

pub struct MovieStore {
    movies: MovieList,
    remote: Arc<dyn RemoteCollection>,
    listener: Mutex<Option<JoinHandle<()>>>,
    // Dropping a handle detaches its task, so scheduled writes always run
    pending: Mutex<Vec<JoinHandle<()>>>,
    failures: Arc<Mutex<Vec<RemoteError>>>,
}

impl MovieStore {
    pub fn new(remote: Arc<dyn RemoteCollection>) -> Self {
        Self {
            movies: Arc::new(RwLock::new(Vec::new())),
            remote,
            listener: Mutex::new(None),
            pending: Mutex::new(Vec::new()),
            failures: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Registers `observer` for collection changes, replacing any previous
    /// observer.
    ///
    /// Every snapshot replaces the whole cache and then calls
    /// [`DataStatus::on_data_updated`]. Errors go to
    /// [`DataStatus::on_error`] and leave the cache untouched; later
    /// snapshots are still delivered.
    pub async fn listen_for_updates(&self, observer: Arc<dyn DataStatus>) {
        let events = self.remote.subscribe().await;
        let handle = tokio::spawn(pump_snapshots(events, Arc::clone(&self.movies), observer));

        let previous = lock(&self.listener).replace(handle);
        if let Some(previous) = previous {
            previous.abort();
        }
    }

    /// Returns the live cache. Later snapshots are visible through it.
    pub fn get_movies(&self) -> MovieList {
        Arc::clone(&self.movies)
    }

    /// Assigns `movie` a new document id and saves it.
    ///
    /// Fails with [`StoreError::InvalidArgument`] without writing if the
    /// movie is invalid. The id is assigned either way.
    pub fn add_movie(&self, movie: &mut Movie) -> StoreResult<()> {
        let doc_ref = self.remote.document();
        movie.id = doc_ref.id().to_string();
        self.write_valid(movie, &doc_ref)
    }

    /// Overwrites the movie's fields and saves it under its existing id.
    ///
    /// The fields are changed before validation, so `movie` keeps the new
    /// values even when this returns [`StoreError::InvalidArgument`].
    pub fn update_movie(
        &self,
        movie: &mut Movie,
        title: impl Into<String>,
        genre: impl Into<String>,
        year: i32,
    ) -> StoreResult<()> {
        movie.title = title.into();
        movie.genre = genre.into();
        movie.year = year;
        if !movie.is_saved() {
            return Err(StoreError::InvalidArgument(INVALID_MOVIE.to_string()));
        }
        let doc_ref = self.remote.document_at(&movie.id);
        self.write_valid(movie, &doc_ref)
    }

    /// Removes the movie's document. No validation is done.
    ///
    /// A movie without an id names no document, so deleting it only logs a
    /// warning. Unlike [`update_movie`](Self::update_movie) this never
    /// fails.
    pub fn delete_movie(&self, movie: &Movie) {
        if !movie.is_saved() {
            tracing::warn!("Ignoring delete of unsaved movie '{}'", movie.title);
            return;
        }
        let doc_ref = self.remote.document_at(&movie.id);
        let remote = Arc::clone(&self.remote);
        tracing::debug!("Deleting {}", doc_ref.path());
        self.schedule(async move {
            remote.delete(doc_ref.id()).await.map_err(|e| {
                tracing::warn!("Failed to delete {}: {}", doc_ref.path(), e);
                e
            })
        });
    }

    pub fn valid_movie(movie: &Movie, doc_ref: &DocumentRef) -> bool {
        movie.id == doc_ref.id()
            && !movie.title.is_empty()
            && !movie.genre.is_empty()
            && movie.year > 0
    }

    /// Returns true if any movie has exactly this title.
    ///
    /// A failed query is logged and reported as `false`.
    pub async fn movie_exists(&self, title: &str) -> bool {
        match self.remote.query_equal("title", json!(title)).await {
            Ok(snapshot) => !snapshot.is_empty(),
            Err(e) => {
                tracing::error!("Error checking movie existence: {}", e);
                false
            }
        }
    }

    /// Reads one movie straight from the collection.
    pub async fn get_movie(&self, id: &str) -> StoreResult<Option<Movie>> {
        let doc = self.remote.get(id).await?;
        doc.map(|doc| doc.to_object::<Movie>().map_err(StoreError::Serialization))
            .transpose()
    }

    /// Waits for every write and delete scheduled so far.
    ///
    /// Returns the first remote failure among the writes that finished since
    /// the last flush. Dropping the returned future leaves the writes
    /// running.
    pub async fn flush(&self) -> StoreResult<()> {
        let pending = std::mem::take(&mut *lock(&self.pending));
        for handle in pending {
            if let Err(e) = handle.await {
                tracing::warn!("Background write task failed: {}", e);
            }
        }

        let mut failures = std::mem::take(&mut *lock(&self.failures));
        if failures.len() > 1 {
            tracing::warn!("{} background writes failed", failures.len());
        }
        let result = match failures.drain(..).next() {
            Some(e) => Err(e.into()),
            None => Ok(()),
        };
        result
    }

    fn write_valid(&self, movie: &Movie, doc_ref: &DocumentRef) -> StoreResult<()> {
        if !Self::valid_movie(movie, doc_ref) {
            return Err(StoreError::InvalidArgument(INVALID_MOVIE.to_string()));
        }

        let data = serde_json::to_value(movie).map_err(StoreError::Serialization)?;
        let remote = Arc::clone(&self.remote);
        let doc_ref = doc_ref.clone();
        tracing::debug!("Writing {}", doc_ref.path());
        self.schedule(async move {
            remote.set(doc_ref.id(), data).await.map_err(|e| {
                tracing::warn!("Failed to write {}: {}", doc_ref.path(), e);
                e
            })
        });
        Ok(())
    }

    fn schedule<F>(&self, task: F)
    where
        F: Future<Output = Result<(), RemoteError>> + Send + 'static,
    {
        let failures = Arc::clone(&self.failures);
        let handle = tokio::spawn(async move {
            if let Err(e) = task.await {
                lock(&failures).push(e);
            }
        });

        let mut pending = lock(&self.pending);
        // Finished writes have already recorded any failure
        pending.retain(|handle| !handle.is_finished());
        pending.push(handle);
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Drop for MovieStore {
    fn drop(&mut self) {
        if let Some(listener) = self
            .listener
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            listener.abort();
        }
    }
}

impl std::fmt::Debug for MovieStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MovieStore")
            .field("collection", &self.remote.name())
            .finish_non_exhaustive()
    }
}

async fn pump_snapshots(
    mut events: SnapshotReceiver,
    movies: MovieList,
    observer: Arc<dyn DataStatus>,
) {
    while let Some(event) = events.recv().await {
        let snapshot = match event {
            Ok(snapshot) => snapshot,
            Err(e) => {
                observer.on_error(&e.to_string());
                continue;
            }
        };

        match decode_movies(&snapshot) {
            Ok(decoded) => {
                tracing::debug!("Received snapshot with {} movie(s)", decoded.len());
                {
                    let mut cache = movies.write().await;
                    cache.clear();
                    cache.extend(decoded);
                }
                observer.on_data_updated();
            }
            Err(e) => observer.on_error(&e.to_string()),
        }
    }
}

fn decode_movies(snapshot: &QuerySnapshot) -> StoreResult<Vec<Movie>> {
    snapshot
        .iter()
        .map(|doc| doc.to_object::<Movie>().map_err(StoreError::Serialization))
        .collect()
}
