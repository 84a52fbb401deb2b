use serde::{Deserialize, Serialize};
use time::{format_description::well_known::Rfc3339, OffsetDateTime};

use crate::catalog::ModuleCatalog;
use crate::errors::{Result, WardenError};
use crate::store::StoreError;
use crate::version;

/// Kind of software a monitored site runs.
///
/// Only `Drupal` sites are handled by the kernel today; other kinds are kept
/// in the store but skipped by every site operation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SiteKind {
    #[default]
    Drupal,
    Other,
}

impl SiteKind {
    pub fn is_handled(self) -> bool {
        matches!(self, SiteKind::Drupal)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SiteModule {
    pub name: String,
    pub installed_version: String,
    pub is_security_update: bool,
}

/// An installed module lagging behind the catalog's latest release.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleUpdate {
    pub name: String,
    pub installed_version: String,
    pub latest_version: String,
    pub is_security_release: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JsLibrary {
    pub name: String,
    pub version: String,
}

/// Persisted state of one monitored site.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SiteRecord {
    pub id: String,
    pub url: String,
    #[serde(default)]
    pub kind: SiteKind,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub core_version: String,
    /// Newest known platform release, fed from outside the reconciler.
    #[serde(default)]
    pub latest_core_version: Option<String>,
    #[serde(default)]
    pub is_security_core_version: bool,
    #[serde(default)]
    pub modules: Vec<SiteModule>,
    #[serde(default)]
    pub js_libraries: Vec<JsLibrary>,
    /// RFC3339 timestamp of the last snapshot that changed the record.
    #[serde(default)]
    pub last_changed: Option<String>,
}

impl SiteRecord {
    pub fn new(id: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            url: url.into(),
            kind: SiteKind::default(),
            name: String::new(),
            core_version: String::new(),
            latest_core_version: None,
            is_security_core_version: false,
            modules: Vec::new(),
            js_libraries: Vec::new(),
            last_changed: None,
        }
    }

    /// Overwrites name, core version, modules and libraries from `snapshot`.
    ///
    /// Modules and libraries are replaced, never appended: the latest
    /// snapshot is authoritative for what is installed now.
    pub fn apply_snapshot(&mut self, snapshot: &Snapshot) {
        self.name = snapshot.site_name.clone();
        self.core_version = snapshot.core.platform.version.clone();
        self.modules = snapshot
            .contrib
            .iter()
            .map(|m| SiteModule {
                name: m.name.clone(),
                installed_version: m.version.clone(),
                is_security_update: m.security,
            })
            .collect();
        self.js_libraries = snapshot
            .js_library
            .iter()
            .map(|l| JsLibrary {
                name: l.name.clone(),
                version: l.version.clone(),
            })
            .collect();
    }

    /// Stamps the record with the current UTC time.
    pub fn touch(&mut self) {
        self.last_changed = OffsetDateTime::now_utc().format(&Rfc3339).ok();
    }

    /// True when the installed core differs from the newest known release.
    ///
    /// A site with no known latest release is never reported as outdated.
    pub fn has_older_core_version(&self) -> bool {
        match &self.latest_core_version {
            Some(latest) => !version::same_release(&self.core_version, latest),
            None => false,
        }
    }

    pub fn get_is_security_core_version(&self) -> bool {
        self.is_security_core_version
    }

    pub fn set_latest_core_release(&mut self, version: impl Into<String>, is_security: bool) {
        self.latest_core_version = Some(version.into());
        self.is_security_core_version = is_security;
    }

    /// Installed modules whose version differs from the catalog's latest
    /// release, in installation order.
    ///
    /// Modules missing from the catalog, or without a known release, are
    /// skipped; only store failures are reported.
    pub fn get_modules_requiring_updates(
        &self,
        catalog: &ModuleCatalog,
    ) -> std::result::Result<Vec<ModuleUpdate>, StoreError> {
        let mut updates = Vec::new();
        for module in &self.modules {
            let Some(entry) = catalog.find_by_project_name(&module.name)? else {
                tracing::debug!(site = %self.url, module = %module.name, "module not in catalog");
                continue;
            };
            let Some(latest) = entry.latest_release_version else { continue };
            if !version::same_release(&module.installed_version, &latest) {
                updates.push(ModuleUpdate {
                    name: module.name.clone(),
                    installed_version: module.installed_version.clone(),
                    latest_version: latest,
                    is_security_release: entry.is_security_release,
                });
            }
        }
        Ok(updates)
    }

    pub fn module_names(&self) -> impl Iterator<Item = &str> {
        self.modules.iter().map(|m| m.name.as_str())
    }
}

// Inbound snapshot, as reported by the site itself.

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Snapshot {
    pub site_name: String,
    pub core: CoreInfo,
    pub contrib: Vec<SnapshotModule>,
    pub js_library: Vec<SnapshotLibrary>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CoreInfo {
    #[serde(alias = "drupal")]
    pub platform: PlatformInfo,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PlatformInfo {
    pub version: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SnapshotModule {
    pub name: String,
    pub version: String,
    #[serde(default)]
    pub security: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SnapshotLibrary {
    pub name: String,
    pub version: String,
}

impl Snapshot {
    /// Validates a raw payload and turns it into a typed snapshot.
    ///
    /// Every required field must be present with the right shape; module
    /// names must be unique and non-empty.
    pub fn from_value(raw: &serde_json::Value) -> Result<Self> {
        let snapshot: Snapshot = serde_json::from_value(raw.clone())
            .map_err(|e| WardenError::MalformedSnapshot(e.to_string()))?;

        let mut seen = std::collections::HashSet::new();
        for module in &snapshot.contrib {
            if module.name.trim().is_empty() {
                return Err(WardenError::MalformedSnapshot(
                    "contrib entry with empty name".into(),
                ));
            }
            if !seen.insert(module.name.as_str()) {
                return Err(WardenError::MalformedSnapshot(format!(
                    "duplicate contrib entry '{}'",
                    module.name
                )));
            }
        }
        Ok(snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn acme() -> serde_json::Value {
        json!({
            "site_name": "Acme",
            "core": { "platform": { "version": "7.50" } },
            "contrib": [ { "name": "views", "version": "3.1", "security": false } ],
            "js_library": []
        })
    }

    #[test]
    fn test_apply_snapshot_on_fresh_record() {
        let snapshot = Snapshot::from_value(&acme()).unwrap();
        let mut site = SiteRecord::new("s1", "https://acme.test");
        site.apply_snapshot(&snapshot);

        assert_eq!(site.name, "Acme");
        assert_eq!(site.core_version, "7.50");
        assert_eq!(
            site.modules,
            vec![SiteModule {
                name: "views".into(),
                installed_version: "3.1".into(),
                is_security_update: false,
            }]
        );
        assert!(site.js_libraries.is_empty());
    }

    #[test]
    fn test_apply_snapshot_replaces_previous_lists() {
        let mut site = SiteRecord::new("s1", "https://acme.test");
        site.modules.push(SiteModule {
            name: "ctools".into(),
            installed_version: "1.0".into(),
            is_security_update: true,
        });
        site.js_libraries.push(JsLibrary { name: "jquery".into(), version: "1.4".into() });

        site.apply_snapshot(&Snapshot::from_value(&acme()).unwrap());
        assert_eq!(site.module_names().collect::<Vec<_>>(), vec!["views"]);
        assert!(site.js_libraries.is_empty());
    }

    #[test]
    fn test_legacy_drupal_core_key_is_accepted() {
        let raw = json!({
            "site_name": "Legacy",
            "core": { "drupal": { "version": "7.12" } },
            "contrib": [],
            "js_library": []
        });
        let snapshot = Snapshot::from_value(&raw).unwrap();
        assert_eq!(snapshot.core.platform.version, "7.12");
    }

    #[test]
    fn test_missing_fields_are_malformed() {
        let mut raw = acme();
        raw.as_object_mut().unwrap().remove("js_library");
        assert!(matches!(Snapshot::from_value(&raw), Err(WardenError::MalformedSnapshot(_))));

        let raw = json!({ "site_name": 42, "core": {}, "contrib": [], "js_library": [] });
        assert!(matches!(Snapshot::from_value(&raw), Err(WardenError::MalformedSnapshot(_))));
    }

    #[test]
    fn test_duplicate_module_names_are_malformed() {
        let mut raw = acme();
        raw["contrib"] = json!([
            { "name": "views", "version": "3.1" },
            { "name": "views", "version": "3.2" }
        ]);
        assert!(matches!(Snapshot::from_value(&raw), Err(WardenError::MalformedSnapshot(_))));
    }

    #[test]
    fn test_core_version_drift() {
        let mut site = SiteRecord::new("s1", "https://acme.test");
        site.core_version = "7.50".into();
        assert!(!site.has_older_core_version());

        site.set_latest_core_release("7.50", true);
        assert!(!site.has_older_core_version());

        site.core_version = "7.6".into();
        assert!(site.has_older_core_version());
        assert!(site.get_is_security_core_version());
    }

    #[test]
    fn test_modules_requiring_updates_cross_references_catalog() {
        use crate::catalog::ModuleEntry;
        use crate::store::MemoryStore;
        use std::sync::Arc;

        let mut views = ModuleEntry::new("views");
        views.observe_release("3.10", true);
        let mut ctools = ModuleEntry::new("ctools");
        ctools.observe_release("1.2", false);
        let catalog = ModuleCatalog::new(Arc::new(MemoryStore::with_documents([views, ctools])));

        let mut site = SiteRecord::new("s1", "https://acme.test");
        site.apply_snapshot(
            &Snapshot::from_value(&json!({
                "site_name": "Acme",
                "core": { "platform": { "version": "7.50" } },
                "contrib": [
                    { "name": "views", "version": "3.9" },
                    { "name": "ctools", "version": "1.2" },
                    { "name": "ghost", "version": "0.1" }
                ],
                "js_library": []
            }))
            .unwrap(),
        );

        let updates = site.get_modules_requiring_updates(&catalog).unwrap();
        assert_eq!(
            updates,
            vec![ModuleUpdate {
                name: "views".into(),
                installed_version: "3.9".into(),
                latest_version: "3.10".into(),
                is_security_release: true,
            }]
        );
    }

    #[test]
    fn test_record_without_kind_defaults_to_drupal() {
        let record: SiteRecord =
            serde_json::from_value(json!({ "id": "s1", "url": "https://acme.test" })).unwrap();
        assert_eq!(record.kind, SiteKind::Drupal);
        assert!(record.kind.is_handled());
    }
}
