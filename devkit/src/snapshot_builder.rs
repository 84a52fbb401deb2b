/*!
Builders for status snapshots as sites send them

Produces the raw JSON payload accepted by `SiteService::process_update`.
*/

use serde_json::{json, Value};

#[derive(Debug, Clone)]
pub struct SnapshotBuilder {
    site_name: String,
    core_version: String,
    contrib: Vec<Value>,
    js_library: Vec<Value>,
}

impl SnapshotBuilder {
    pub fn new(site_name: &str, core_version: &str) -> Self {
        Self {
            site_name: site_name.to_string(),
            core_version: core_version.to_string(),
            contrib: Vec::new(),
            js_library: Vec::new(),
        }
    }

    pub fn module(mut self, name: &str, version: &str) -> Self {
        self.contrib.push(json!({ "name": name, "version": version, "security": false }));
        self
    }

    /// A module whose installed release is itself a security release.
    pub fn security_module(mut self, name: &str, version: &str) -> Self {
        self.contrib.push(json!({ "name": name, "version": version, "security": true }));
        self
    }

    pub fn library(mut self, name: &str, version: &str) -> Self {
        self.js_library.push(json!({ "name": name, "version": version }));
        self
    }

    pub fn build(&self) -> Value {
        json!({
            "site_name": self.site_name,
            "core": { "platform": { "version": self.core_version } },
            "contrib": self.contrib,
            "js_library": self.js_library,
        })
    }
}

/// The snapshot of the "Acme" site used throughout the docs.
pub fn acme() -> Value {
    SnapshotBuilder::new("Acme", "7.50")
        .module("views", "3.1")
        .library("jquery", "1.4.4")
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use warden_kernel::Snapshot;

    #[test]
    fn test_built_snapshot_is_valid() {
        let raw = SnapshotBuilder::new("Blog", "8.9.1")
            .module("ctools", "1.2")
            .security_module("token", "1.7")
            .build();

        let snapshot = Snapshot::from_value(&raw).unwrap();
        assert_eq!(snapshot.site_name, "Blog");
        assert_eq!(snapshot.contrib.len(), 2);
        assert!(snapshot.contrib[1].security);
        assert!(snapshot.js_library.is_empty());
    }

    #[test]
    fn test_acme() {
        let raw = acme();
        assert_eq!(raw["core"]["platform"]["version"], "7.50");
        assert_eq!(raw["contrib"][0]["name"], "views");
    }
}
