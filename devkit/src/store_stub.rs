/*!
Store that can be switched to fail

Wraps a `MemoryStore` and answers every write with `StoreError::Backend`
while failing is on. Reads keep working so tests can inspect the state.
*/

use std::sync::atomic::{AtomicBool, Ordering};

use warden_kernel::store::Document;
use warden_kernel::{DocumentStore, MemoryStore, StoreError};

pub struct FlakyStore<T> {
    inner: MemoryStore<T>,
    failing: AtomicBool,
}

impl<T: Document> FlakyStore<T> {
    pub fn new() -> Self {
        Self {
            inner: MemoryStore::new(),
            failing: AtomicBool::new(false),
        }
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    fn check(&self) -> Result<(), StoreError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(StoreError::Backend("write refused".into()));
        }
        Ok(())
    }
}

impl<T: Document> Default for FlakyStore<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Document> DocumentStore<T> for FlakyStore<T> {
    fn get(&self, key: &str) -> Result<Option<T>, StoreError> {
        self.inner.get(key)
    }

    fn save(&self, doc: &T) -> Result<(), StoreError> {
        self.check()?;
        self.inner.save(doc)
    }

    fn save_all(&self, docs: &[T]) -> Result<(), StoreError> {
        self.check()?;
        self.inner.save_all(docs)
    }

    fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.check()?;
        self.inner.delete(key)
    }

    fn list(&self) -> Result<Vec<T>, StoreError> {
        self.inner.list()
    }
}
