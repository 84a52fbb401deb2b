//! Document persistence for sites and catalog entries
//!
//! `DocumentStore` is the only way the kernel touches storage: get, save,
//! delete and list by document key. Two backends ship with the kernel:
//! - `MemoryStore`: process-local map, used by tests and ephemeral runs
//! - `JsonFileStore`: one pretty-printed JSON file per collection, cached in
//!   memory and rewritten on every write; the cache only takes a change once
//!   the file write succeeded
//!
//! Errors from a backend are returned as-is; nothing here retries.

use parking_lot::Mutex;
use serde::{de::DeserializeOwned, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use crate::catalog::ModuleEntry;
use crate::models::SiteRecord;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Store backend error: {0}")]
    Backend(String),
}

/// A value stored under a unique key.
pub trait Document: Clone + Serialize + DeserializeOwned + Send + Sync + 'static {
    fn key(&self) -> &str;
}

impl Document for SiteRecord {
    fn key(&self) -> &str {
        &self.id
    }
}

impl Document for ModuleEntry {
    fn key(&self) -> &str {
        &self.project_name
    }
}

pub trait DocumentStore<T: Document>: Send + Sync {
    /// Exact-match lookup; absence is not an error.
    fn get(&self, key: &str) -> Result<Option<T>, StoreError>;

    fn save(&self, doc: &T) -> Result<(), StoreError>;

    /// Saves a batch of documents. Backends override this to write once.
    fn save_all(&self, docs: &[T]) -> Result<(), StoreError> {
        for doc in docs {
            self.save(doc)?;
        }
        Ok(())
    }

    /// Removes a document; deleting a missing key is a no-op.
    fn delete(&self, key: &str) -> Result<(), StoreError>;

    fn list(&self) -> Result<Vec<T>, StoreError>;
}

impl<T: Document, S: DocumentStore<T> + ?Sized> DocumentStore<T> for Arc<S> {
    fn get(&self, key: &str) -> Result<Option<T>, StoreError> {
        (**self).get(key)
    }

    fn save(&self, doc: &T) -> Result<(), StoreError> {
        (**self).save(doc)
    }

    fn save_all(&self, docs: &[T]) -> Result<(), StoreError> {
        (**self).save_all(docs)
    }

    fn delete(&self, key: &str) -> Result<(), StoreError> {
        (**self).delete(key)
    }

    fn list(&self) -> Result<Vec<T>, StoreError> {
        (**self).list()
    }
}

pub type SiteStore = dyn DocumentStore<SiteRecord>;
pub type ModuleStore = dyn DocumentStore<ModuleEntry>;

/// Finds the first site registered under `url`.
pub fn find_site_by_url(store: &SiteStore, url: &str) -> Result<Option<SiteRecord>, StoreError> {
    let wanted = url.trim_end_matches('/');
    Ok(store
        .list()?
        .into_iter()
        .find(|site| site.url.trim_end_matches('/') == wanted))
}

pub struct MemoryStore<T> {
    docs: Mutex<BTreeMap<String, T>>,
}

impl<T: Document> MemoryStore<T> {
    pub fn new() -> Self {
        Self {
            docs: Mutex::new(BTreeMap::new()),
        }
    }

    pub fn with_documents(docs: impl IntoIterator<Item = T>) -> Self {
        let store = Self::new();
        {
            let mut map = store.docs.lock();
            for doc in docs {
                map.insert(doc.key().to_string(), doc);
            }
        }
        store
    }

    pub fn len(&self) -> usize {
        self.docs.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.docs.lock().is_empty()
    }
}

impl<T: Document> Default for MemoryStore<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Document> DocumentStore<T> for MemoryStore<T> {
    fn get(&self, key: &str) -> Result<Option<T>, StoreError> {
        Ok(self.docs.lock().get(key).cloned())
    }

    fn save(&self, doc: &T) -> Result<(), StoreError> {
        self.docs.lock().insert(doc.key().to_string(), doc.clone());
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.docs.lock().remove(key);
        Ok(())
    }

    fn list(&self) -> Result<Vec<T>, StoreError> {
        Ok(self.docs.lock().values().cloned().collect())
    }
}

/// JSON file backed collection.
pub struct JsonFileStore<T> {
    storage_path: PathBuf,
    cache: Mutex<BTreeMap<String, T>>,
}

impl<T: Document> JsonFileStore<T> {
    /// Opens (or creates) the collection file at `storage_path`.
    pub fn open<P: Into<PathBuf>>(storage_path: P) -> Result<Self, StoreError> {
        let store = Self {
            storage_path: storage_path.into(),
            cache: Mutex::new(BTreeMap::new()),
        };
        store.load_from_disk()?;
        tracing::debug!(path = %store.storage_path.display(), "json store opened");
        Ok(store)
    }

    fn load_from_disk(&self) -> Result<(), StoreError> {
        if !self.storage_path.exists() {
            if let Some(parent) = self.storage_path.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(&self.storage_path, "[]")?;
        }

        let content = fs::read_to_string(&self.storage_path)?;
        let docs: Vec<T> = if content.trim().is_empty() {
            Vec::new()
        } else {
            serde_json::from_str(&content)?
        };

        *self.cache.lock() = docs
            .into_iter()
            .map(|doc| (doc.key().to_string(), doc))
            .collect();
        Ok(())
    }

    fn save_to_disk(&self, cache: &BTreeMap<String, T>) -> Result<(), StoreError> {
        let docs: Vec<&T> = cache.values().collect();
        let json = serde_json::to_string_pretty(&docs)?;
        fs::write(&self.storage_path, json)?;
        Ok(())
    }
}

impl<T: Document> DocumentStore<T> for JsonFileStore<T> {
    fn get(&self, key: &str) -> Result<Option<T>, StoreError> {
        Ok(self.cache.lock().get(key).cloned())
    }

    fn save(&self, doc: &T) -> Result<(), StoreError> {
        self.save_all(std::slice::from_ref(doc))
    }

    fn save_all(&self, docs: &[T]) -> Result<(), StoreError> {
        if docs.is_empty() {
            return Ok(());
        }
        let mut cache = self.cache.lock();
        let mut next = cache.clone();
        for doc in docs {
            next.insert(doc.key().to_string(), doc.clone());
        }
        self.save_to_disk(&next)?;
        *cache = next;
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<(), StoreError> {
        let mut cache = self.cache.lock();
        if !cache.contains_key(key) {
            return Ok(());
        }
        let mut next = cache.clone();
        next.remove(key);
        self.save_to_disk(&next)?;
        *cache = next;
        Ok(())
    }

    fn list(&self) -> Result<Vec<T>, StoreError> {
        Ok(self.cache.lock().values().cloned().collect())
    }
}
