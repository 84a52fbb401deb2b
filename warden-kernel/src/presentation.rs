//! Detail-view decisions
//!
//! Decides which sections the detail page of a site shows and with which
//! parameters. Rendering belongs to the consumer; this module only reads the
//! site record and the catalog.

use serde::Serialize;
use serde_json::{json, Map, Value};

use crate::catalog::ModuleCatalog;
use crate::models::SiteRecord;
use crate::store::StoreError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum SectionId {
    SecurityUpdateRequired,
    SiteDetails,
    ModuleUpdatesRequired,
    ModulesList,
    JsLibraries,
}

impl SectionId {
    pub fn as_str(self) -> &'static str {
        match self {
            SectionId::SecurityUpdateRequired => "security-update-required",
            SectionId::SiteDetails => "site-details",
            SectionId::ModuleUpdatesRequired => "module-updates-required",
            SectionId::ModulesList => "modules-list",
            SectionId::JsLibraries => "js-libraries",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Section {
    pub id: SectionId,
    pub params: Map<String, Value>,
}

impl Section {
    fn new(id: SectionId) -> Self {
        Self { id, params: Map::new() }
    }

    fn param(mut self, key: &str, value: Value) -> Self {
        self.params.insert(key.to_string(), value);
        self
    }
}

/// Ordered sections for the detail view of `site`:
/// security banner (core outdated and the latest core is a security release),
/// site details, pending module updates (if any), installed modules,
/// javascript libraries (if any).
pub fn decide(site: &SiteRecord, catalog: &ModuleCatalog) -> Result<Vec<Section>, StoreError> {
    let mut sections = Vec::with_capacity(5);

    if site.has_older_core_version() && site.get_is_security_core_version() {
        sections.push(Section::new(SectionId::SecurityUpdateRequired));
    }

    sections.push(
        Section::new(SectionId::SiteDetails)
            .param("coreVersion", json!(site.core_version))
            .param("latestCoreVersion", json!(site.latest_core_version)),
    );

    let updates = site.get_modules_requiring_updates(catalog)?;
    if !updates.is_empty() {
        sections.push(
            Section::new(SectionId::ModuleUpdatesRequired)
                .param("modulesRequiringUpdates", json!(updates)),
        );
    }

    sections.push(Section::new(SectionId::ModulesList).param("modules", json!(site.modules)));

    if !site.js_libraries.is_empty() {
        sections.push(
            Section::new(SectionId::JsLibraries).param("jsLibraries", json!(site.js_libraries)),
        );
    }

    Ok(sections)
}
