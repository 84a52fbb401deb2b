//! Module catalog
//!
//! Registry of every extension module the kernel has heard of, keyed by
//! project name. Each entry tracks the sites currently reporting the module
//! and the newest release seen for it.
//!
//! Mutations are staged in memory and written with a single `persist()` call,
//! so one reconciliation costs one store round-trip. Entries are never removed
//! here: detaching the last site leaves a known module with no users.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use crate::errors::{Result, WardenError};
use crate::models::SnapshotModule;
use crate::store::{ModuleStore, StoreError};
use crate::version;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleEntry {
    pub project_name: String,
    #[serde(default)]
    pub using_sites: BTreeSet<String>,
    #[serde(default)]
    pub latest_release_version: Option<String>,
    #[serde(default)]
    pub is_security_release: bool,
}

impl ModuleEntry {
    pub fn new(project_name: impl Into<String>) -> Self {
        Self {
            project_name: project_name.into(),
            using_sites: BTreeSet::new(),
            latest_release_version: None,
            is_security_release: false,
        }
    }

    /// Merges an observed release into the entry. Returns true if it changed.
    ///
    /// A newer release replaces the latest version and its security flag; the
    /// same release can only raise the security flag; older ones are ignored.
    pub fn observe_release(&mut self, release: &str, is_security: bool) -> bool {
        let current = self.latest_release_version.as_deref();
        let newer = current.map_or(true, |c| version::is_newer(c, release));
        let same = current.is_some_and(|c| version::same_release(c, release));

        if newer {
            self.latest_release_version = Some(release.to_string());
            self.is_security_release = is_security;
            true
        } else if same && is_security && !self.is_security_release {
            self.is_security_release = true;
            true
        } else {
            false
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogPolicy {
    /// Create entries for modules first seen in a snapshot. When off, only
    /// pre-seeded modules are tracked and unknown ones surface as
    /// `ModuleNotFound` during reconciliation.
    pub register_unknown_modules: bool,
}

impl Default for CatalogPolicy {
    fn default() -> Self {
        Self {
            register_unknown_modules: true,
        }
    }
}

pub struct ModuleCatalog {
    store: Arc<ModuleStore>,
    policy: CatalogPolicy,
    /// Working copies of entries touched since the last persist.
    staged: BTreeMap<String, ModuleEntry>,
    dirty: BTreeSet<String>,
}

impl ModuleCatalog {
    pub fn new(store: Arc<ModuleStore>) -> Self {
        Self {
            store,
            policy: CatalogPolicy::default(),
            staged: BTreeMap::new(),
            dirty: BTreeSet::new(),
        }
    }

    pub fn with_policy(mut self, policy: CatalogPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn policy(&self) -> CatalogPolicy {
        self.policy
    }

    /// Exact-match lookup, staged changes included.
    pub fn find_by_project_name(&self, name: &str) -> Result<Option<ModuleEntry>, StoreError> {
        if let Some(entry) = self.staged.get(name) {
            return Ok(Some(entry.clone()));
        }
        self.store.get(name)
    }

    fn stage(&mut self, name: &str) -> Result<Option<&mut ModuleEntry>, StoreError> {
        if !self.staged.contains_key(name) {
            match self.store.get(name)? {
                Some(entry) => {
                    self.staged.insert(name.to_string(), entry);
                }
                None => return Ok(None),
            }
        }
        Ok(self.staged.get_mut(name))
    }

    fn insert_new(&mut self, name: &str) -> &mut ModuleEntry {
        self.dirty.insert(name.to_string());
        self.staged
            .entry(name.to_string())
            .or_insert_with(|| ModuleEntry::new(name))
    }

    /// Creates missing entries and merges release metadata for `modules`.
    ///
    /// Returns the names that were skipped because they are unknown and the
    /// policy forbids registering them. Applying the same list twice leaves
    /// the catalog unchanged the second time.
    pub fn upsert_modules(&mut self, modules: &[SnapshotModule]) -> Result<Vec<String>, StoreError> {
        let register_unknown = self.policy.register_unknown_modules;
        let mut skipped = Vec::new();

        for module in modules {
            let changed = match self.stage(&module.name)? {
                Some(entry) => entry.observe_release(&module.version, module.security),
                None if register_unknown => {
                    tracing::debug!(module = %module.name, "registering new module");
                    self.insert_new(&module.name)
                        .observe_release(&module.version, module.security);
                    true
                }
                None => {
                    skipped.push(module.name.clone());
                    false
                }
            };
            if changed {
                self.dirty.insert(module.name.clone());
            }
        }
        Ok(skipped)
    }

    /// Records a release announced by an external feed; creates the entry if
    /// needed regardless of policy.
    pub fn record_release(&mut self, name: &str, release: &str, is_security: bool) -> Result<bool, StoreError> {
        let changed = match self.stage(name)? {
            Some(entry) => entry.observe_release(release, is_security),
            None => {
                self.insert_new(name).observe_release(release, is_security);
                true
            }
        };
        if changed {
            self.dirty.insert(name.to_string());
        }
        Ok(changed)
    }

    pub fn attach_site(&mut self, name: &str, site_id: &str) -> Result<()> {
        let entry = self
            .stage(name)?
            .ok_or_else(|| WardenError::ModuleNotFound(name.to_string()))?;
        if entry.using_sites.insert(site_id.to_string()) {
            self.dirty.insert(name.to_string());
        }
        Ok(())
    }

    /// Removes `site_id` from the module's users. The entry itself stays.
    pub fn detach_site(&mut self, name: &str, site_id: &str) -> Result<()> {
        let entry = self
            .stage(name)?
            .ok_or_else(|| WardenError::ModuleNotFound(name.to_string()))?;
        if entry.using_sites.remove(site_id) {
            self.dirty.insert(name.to_string());
        }
        Ok(())
    }

    /// Writes every changed entry in one batch. Returns how many were saved.
    ///
    /// On failure the changes stay staged and a later call retries them.
    pub fn persist(&mut self) -> Result<usize, StoreError> {
        if self.dirty.is_empty() {
            self.staged.clear();
            return Ok(0);
        }
        let batch: Vec<ModuleEntry> = self
            .dirty
            .iter()
            .filter_map(|name| self.staged.get(name).cloned())
            .collect();
        self.store.save_all(&batch)?;

        self.dirty.clear();
        self.staged.clear();
        Ok(batch.len())
    }

    /// Drops staged changes without writing them.
    pub fn discard(&mut self) {
        self.dirty.clear();
        self.staged.clear();
    }

    pub fn has_pending_changes(&self) -> bool {
        !self.dirty.is_empty()
    }
}
