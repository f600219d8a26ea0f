//! Movie store
//!
//! Keeps a local cache of movies synchronized with a remote document
//! collection and validates every write before it leaves the process.

pub mod config;
pub mod error;
pub mod models;
pub mod remote;
pub mod store;

pub use error::{RemoteError, StoreError};
pub use models::Movie;
pub use remote::{DocumentRef, MemoryCollection, RemoteCollection, SqliteCollection};
pub use store::{DataStatus, MovieList, MovieStore, StoreContext};

pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!version().is_empty());
    }
}
