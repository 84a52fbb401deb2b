//! Site service
//!
//! Entry point used by the HTTP layer and the binary. Owns the site store,
//! the module catalog and the collaborators, and runs each site operation:
//! register, update, show, delete, refresh, plus release announcements.
//!
//! The catalog sits behind a mutex so that two sites reporting the same
//! module are reconciled one after the other. Listeners are invoked while the
//! catalog lock is held and must not call back into the service.

use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

use crate::catalog::{CatalogPolicy, ModuleCatalog, ModuleEntry};
use crate::errors::{Result, WardenError};
use crate::events::{NotificationRouter, Signal};
use crate::models::{SiteRecord, Snapshot};
use crate::presentation::{self, Section};
use crate::reconciler::{ReconcileOutcome, UpdateReconciler};
use crate::refresh::{self, MessageLevel, RefreshReport, SiteConnection, DEFAULT_REPORT_PATH};
use crate::store::{self, ModuleStore, SiteStore};

pub struct SiteService {
    sites: Arc<SiteStore>,
    catalog: Mutex<ModuleCatalog>,
    reconciler: UpdateReconciler,
    router: Arc<dyn NotificationRouter>,
    connection: Arc<dyn SiteConnection>,
    report_path: String,
}

impl SiteService {
    pub fn new(
        sites: Arc<SiteStore>,
        modules: Arc<ModuleStore>,
        router: Arc<dyn NotificationRouter>,
        connection: Arc<dyn SiteConnection>,
    ) -> Self {
        Self {
            sites,
            catalog: Mutex::new(ModuleCatalog::new(modules)),
            reconciler: UpdateReconciler::new(router.clone()),
            router,
            connection,
            report_path: DEFAULT_REPORT_PATH.to_string(),
        }
    }

    pub fn with_catalog_policy(self, policy: CatalogPolicy) -> Self {
        let catalog = self.catalog.into_inner().with_policy(policy);
        Self {
            catalog: Mutex::new(catalog),
            ..self
        }
    }

    pub fn with_report_path(mut self, report_path: impl Into<String>) -> Self {
        self.report_path = report_path.into();
        self
    }

    /// Creates and stores a new site record for `url`. A URL that is already
    /// registered gives back the existing record.
    pub fn register_site(&self, url: &str) -> Result<SiteRecord> {
        if let Some(existing) = store::find_site_by_url(self.sites.as_ref(), url)? {
            debug!(site = %existing.url, id = %existing.id, "site already registered");
            return Ok(existing);
        }

        let site = SiteRecord::new(Uuid::new_v4().to_string(), url.trim_end_matches('/'));
        self.sites.save(&site)?;
        info!(site = %site.url, id = %site.id, "site registered");
        Ok(site)
    }

    pub fn get_site(&self, site_id: &str) -> Result<SiteRecord> {
        self.sites
            .get(site_id)?
            .ok_or_else(|| WardenError::SiteNotFound(site_id.to_string()))
    }

    pub fn list_sites(&self) -> Result<Vec<SiteRecord>> {
        Ok(self.sites.list()?)
    }

    pub fn find_module(&self, name: &str) -> Result<Option<ModuleEntry>> {
        Ok(self.catalog.lock().find_by_project_name(name)?)
    }

    /// Reconciles a snapshot reported by `site_id`.
    pub fn process_update(&self, site_id: &str, raw: &serde_json::Value) -> Result<ReconcileOutcome> {
        let mut site = self.get_site(site_id)?;
        if !site.kind.is_handled() {
            debug!(site = %site.url, kind = ?site.kind, "update skipped for unhandled site kind");
            return Ok(ReconcileOutcome::from_warnings(Vec::new()));
        }
        let snapshot = Snapshot::from_value(raw)?;

        info!(site = %site.url, "site update started");
        self.router.raise(Signal::SiteUpdate {
            site: site.clone(),
            snapshot: raw.clone(),
        });

        let outcome = {
            let mut catalog = self.catalog.lock();
            self.reconciler
                .reconcile_snapshot(self.sites.as_ref(), &mut catalog, &mut site, &snapshot)?
        };
        info!(site = %site.url, success = outcome.success, "site update finished");
        Ok(outcome)
    }

    /// Sections for the detail view of `site_id`.
    pub fn show(&self, site_id: &str) -> Result<Vec<Section>> {
        let site = self.get_site(site_id)?;
        if !site.kind.is_handled() {
            debug!(site = %site.url, kind = ?site.kind, "show skipped for unhandled site kind");
            return Ok(Vec::new());
        }

        self.router.raise(Signal::SiteShow { site: site.clone() });
        let catalog = self.catalog.lock();
        Ok(presentation::decide(&site, &catalog)?)
    }

    /// Removes `site_id` and detaches it from every module it referenced.
    pub fn delete_site(&self, site_id: &str) -> Result<ReconcileOutcome> {
        let site = self.get_site(site_id)?;

        let outcome = if site.kind.is_handled() {
            let mut catalog = self.catalog.lock();
            self.reconciler.detach_site_modules(&mut catalog, &site)?
        } else {
            ReconcileOutcome::from_warnings(Vec::new())
        };

        self.sites.delete(&site.id)?;
        info!(site = %site.url, detached = site.modules.len(), "site deleted");
        self.router.raise(Signal::SiteDelete { site });
        Ok(outcome)
    }

    /// Asks every listed site to report again. Each site is handled on its
    /// own: failures become warnings in the report and never stop the batch.
    pub async fn refresh(&self, site_ids: &[String]) -> RefreshReport {
        let mut report = RefreshReport::default();

        for site_id in site_ids {
            let site = match self.get_site(site_id) {
                Ok(site) => site,
                Err(e) => {
                    report.add_message(site_id, MessageLevel::Warning, e.to_string());
                    continue;
                }
            };
            if !site.kind.is_handled() {
                debug!(site = %site.url, "refresh skipped for unhandled site kind");
                continue;
            }

            self.router.raise(Signal::SiteRefresh { site: site.clone() });
            refresh::refresh_site(self.connection.as_ref(), &site, &self.report_path, &mut report).await;
        }
        report
    }

    /// Records the newest platform release on every handled site.
    /// Returns how many sites were updated.
    pub fn publish_core_release(&self, version: &str, is_security: bool) -> Result<usize> {
        let mut updated = 0;
        for mut site in self.sites.list()? {
            if !site.kind.is_handled() {
                continue;
            }
            site.set_latest_core_release(version, is_security);
            self.sites.save(&site)?;
            self.router.raise(Signal::DashboardUpdate { site });
            updated += 1;
        }
        info!(version, is_security, sites = updated, "core release published");
        Ok(updated)
    }

    /// Records a module release announced by an external feed.
    pub fn record_module_release(&self, name: &str, version: &str, is_security: bool) -> Result<bool> {
        let mut catalog = self.catalog.lock();
        let changed = catalog.record_release(name, version, is_security)?;
        if let Err(e) = catalog.persist() {
            catalog.discard();
            return Err(e.into());
        }
        Ok(changed)
    }
}
