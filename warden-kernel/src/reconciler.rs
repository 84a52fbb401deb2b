//! Snapshot reconciliation
//!
//! Merges an inbound snapshot into a site record and the module catalog:
//! 1. validate the payload (nothing is touched if it is malformed)
//! 2. merge module releases into the catalog
//! 3. overwrite the site's name, core version, modules and libraries
//! 4. attach the site to every module it now reports and detach it from the
//!    modules it dropped
//! 5. save the site, then the catalog batch, then raise `DashboardUpdate`
//!
//! A module missing from the catalog only costs a warning; the rest of the
//! site update goes through. Store failures abort the call unchanged.

use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::catalog::ModuleCatalog;
use crate::errors::{Result, WardenError};
use crate::events::{NotificationRouter, Signal};
use crate::models::{SiteRecord, Snapshot};
use crate::store::SiteStore;

/// Result of one reconciliation or cleanup. Never persisted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileOutcome {
    /// False when at least one module could not be linked.
    pub success: bool,
    pub warnings: Vec<String>,
}

impl ReconcileOutcome {
    pub(crate) fn from_warnings(warnings: Vec<String>) -> Self {
        Self {
            success: warnings.is_empty(),
            warnings,
        }
    }
}

pub struct UpdateReconciler {
    router: Arc<dyn NotificationRouter>,
}

impl UpdateReconciler {
    pub fn new(router: Arc<dyn NotificationRouter>) -> Self {
        Self { router }
    }

    /// Validates `raw`, then applies it like `reconcile_snapshot`.
    pub fn reconcile(
        &self,
        sites: &SiteStore,
        catalog: &mut ModuleCatalog,
        site: &mut SiteRecord,
        raw: &serde_json::Value,
    ) -> Result<ReconcileOutcome> {
        let snapshot = Snapshot::from_value(raw)?;
        self.reconcile_snapshot(sites, catalog, site, &snapshot)
    }

    /// Applies a validated snapshot to `site` and `catalog`, saves both and
    /// notifies the dashboard.
    ///
    /// The site is written first. If the catalog batch then fails, the
    /// previous site record is written back so the stored module list and
    /// the catalog links keep describing the same state.
    pub fn reconcile_snapshot(
        &self,
        sites: &SiteStore,
        catalog: &mut ModuleCatalog,
        site: &mut SiteRecord,
        snapshot: &Snapshot,
    ) -> Result<ReconcileOutcome> {
        info!(site = %site.url, modules = snapshot.contrib.len(), "reconciling snapshot");
        let mut working = site.clone();
        let warnings = match Self::merge(catalog, &mut working, snapshot) {
            Ok(warnings) => warnings,
            Err(e) => {
                catalog.discard();
                return Err(e);
            }
        };

        if let Err(e) = sites.save(&working) {
            catalog.discard();
            return Err(e.into());
        }
        if let Err(e) = catalog.persist() {
            catalog.discard();
            if let Err(restore) = sites.save(site) {
                error!(site = %site.url, "failed to restore site after catalog write error: {restore}");
            }
            return Err(e.into());
        }
        *site = working;

        self.router.raise(Signal::DashboardUpdate { site: site.clone() });
        info!(site = %site.url, warnings = warnings.len(), "snapshot reconciled");
        Ok(ReconcileOutcome::from_warnings(warnings))
    }

    fn merge(catalog: &mut ModuleCatalog, site: &mut SiteRecord, snapshot: &Snapshot) -> Result<Vec<String>> {
        let previous: Vec<String> = site.module_names().map(str::to_string).collect();

        let skipped = catalog.upsert_modules(&snapshot.contrib)?;
        if !skipped.is_empty() {
            tracing::debug!(site = %site.url, ?skipped, "modules left out of the catalog");
        }

        let before = site.clone();
        site.apply_snapshot(snapshot);
        if *site != before {
            site.touch();
        }

        let mut warnings = Vec::new();
        for name in site.module_names() {
            recover_missing(catalog.attach_site(name, &site.id), &site.url, &mut warnings)?;
        }

        let current: HashSet<&str> = site.module_names().collect();
        for name in previous.iter().filter(|n| !current.contains(n.as_str())) {
            recover_missing(catalog.detach_site(name, &site.id), &site.url, &mut warnings)?;
        }
        Ok(warnings)
    }

    /// Detaches a deleted site from every module it referenced, persisting
    /// the catalog once for the whole batch. Entries left without users stay.
    pub fn detach_site_modules(
        &self,
        catalog: &mut ModuleCatalog,
        site: &SiteRecord,
    ) -> Result<ReconcileOutcome> {
        let mut warnings = Vec::new();
        for name in site.module_names() {
            match catalog.detach_site(name, &site.id) {
                Ok(()) => {}
                Err(WardenError::ModuleNotFound(_)) => {
                    error!(site = %site.url, "Error getting module [{name}]");
                    warnings.push(format!("module '{name}' not found in catalog"));
                }
                Err(e) => {
                    catalog.discard();
                    return Err(e);
                }
            }
        }

        if let Err(e) = catalog.persist() {
            catalog.discard();
            return Err(e.into());
        }
        Ok(ReconcileOutcome::from_warnings(warnings))
    }
}

/// Turns `ModuleNotFound` into a logged warning; any other error propagates.
fn recover_missing(result: Result<()>, site_url: &str, warnings: &mut Vec<String>) -> Result<()> {
    match result {
        Err(WardenError::ModuleNotFound(name)) => {
            warn!(site = %site_url, module = %name, "module not found in catalog, skipping");
            warnings.push(format!("module '{name}' not found in catalog"));
            Ok(())
        }
        other => other,
    }
}
