//! Key-value persistence behind the login session.
//!
//! [`AuthSession`](crate::oauth::auth::AuthSession) treats its store as an
//! opaque string blob store with `get`/`set`/`delete`. Two backends ship with
//! the crate:
//!
//! - [`FileStore`] - JSON file with owner-only permissions
//! - [`MemoryStore`] - process memory, for tests and the attempt store
//!
//! # Security
//!
//! - Values may contain bearer tokens; implementations never log them
//! - File storage uses 0600 permissions on Unix systems
//! - All implementations are thread-safe (`Send + Sync`)
//!
//! # Example
//!
//! ```rust
//! use bloggate::oauth::storage::{KeyValueStore, MemoryStore};
//!
//! # async fn example() -> bloggate::oauth::Result<()> {
//! let store = MemoryStore::new();
//! store.set("google:session", "{}").await?;
//! assert!(store.contains("google:session").await?);
//! store.delete("google:session").await?;
//! # Ok(())
//! # }
//! ```

mod file;
mod memory;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;

pub use file::FileStore;
pub use memory::MemoryStore;

use super::error::{Error, Result};

/// String key-value store.
///
/// `set` replaces the whole value for a key in one step, which is what makes
/// a session either fully present or fully absent.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Value stored under `key`, if any.
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Store `value` under `key`, replacing any previous value.
    async fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Remove `key`. Succeeds when the key is already absent.
    async fn delete(&self, key: &str) -> Result<()>;

    /// Check if a value is stored under `key`.
    async fn contains(&self, key: &str) -> Result<bool> {
        Ok(self.get(key).await?.is_some())
    }
}

/// Blanket implementation for `Arc<T>` where T: KeyValueStore
#[async_trait]
impl<T: KeyValueStore + ?Sized> KeyValueStore for std::sync::Arc<T> {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        (**self).get(key).await
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        (**self).set(key, value).await
    }

    async fn delete(&self, key: &str) -> Result<()> {
        (**self).delete(key).await
    }

    async fn contains(&self, key: &str) -> Result<bool> {
        (**self).contains(key).await
    }
}

/// Blanket implementation for `Box<T>` where T: KeyValueStore
#[async_trait]
impl<T: KeyValueStore + ?Sized> KeyValueStore for Box<T> {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        (**self).get(key).await
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        (**self).set(key, value).await
    }

    async fn delete(&self, key: &str) -> Result<()> {
        (**self).delete(key).await
    }

    async fn contains(&self, key: &str) -> Result<bool> {
        (**self).contains(key).await
    }
}

/// Read and deserialize the JSON value under `key`.
///
/// A value that does not parse is reported as `Error::Storage`.
pub(crate) async fn load_json<T, S>(store: &S, key: &str) -> Result<Option<T>>
where
    T: DeserializeOwned,
    S: KeyValueStore + ?Sized,
{
    let Some(raw) = store.get(key).await? else {
        return Ok(None);
    };
    serde_json::from_str(&raw)
        .map(Some)
        .map_err(|e| Error::storage(format!("Failed to parse value for key '{key}': {e}")))
}

/// Serialize `value` as JSON and store it under `key`.
pub(crate) async fn save_json<T, S>(store: &S, key: &str, value: &T) -> Result<()>
where
    T: Serialize + ?Sized + Sync,
    S: KeyValueStore + ?Sized,
{
    let raw = serde_json::to_string(value)?;
    store.set(key, &raw).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[derive(Debug, PartialEq, Serialize, serde::Deserialize)]
    struct Entry {
        name: String,
        count: u32,
    }

    #[tokio::test]
    async fn test_json_helpers() {
        let store = MemoryStore::new();
        let entry = Entry {
            name: "posts".into(),
            count: 3,
        };

        assert_eq!(load_json::<Entry, _>(&store, "k").await.unwrap(), None);
        save_json(&store, "k", &entry).await.unwrap();
        assert_eq!(load_json::<Entry, _>(&store, "k").await.unwrap(), Some(entry));
    }

    #[tokio::test]
    async fn test_unparseable_value_is_storage_error() {
        let store = MemoryStore::new();
        store.set("k", "{not json").await.unwrap();

        let err = load_json::<Entry, _>(&store, "k").await.unwrap_err();
        assert!(matches!(err, Error::Storage(_)));
        assert!(err.to_string().contains("'k'"));
    }

    #[tokio::test]
    async fn test_arc_and_box_delegate() {
        let inner = MemoryStore::new();
        let shared: Arc<dyn KeyValueStore> = Arc::new(inner.clone());
        let boxed: Box<dyn KeyValueStore> = Box::new(inner.clone());

        shared.set("a", "1").await.unwrap();
        assert_eq!(boxed.get("a").await.unwrap().as_deref(), Some("1"));
        boxed.delete("a").await.unwrap();
        assert!(!inner.contains("a").await.unwrap());
    }

    #[tokio::test]
    async fn test_mock_store_error_propagates() {
        let mut mock = MockKeyValueStore::new();
        mock.expect_get()
            .returning(|_| Err(Error::storage("disk unavailable")));

        let err = load_json::<Entry, _>(&mock, "k").await.unwrap_err();
        assert!(err.to_string().contains("disk unavailable"));
    }
}
