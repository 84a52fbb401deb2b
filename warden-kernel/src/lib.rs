//! Warden kernel
//!
//! Ingests the status snapshots reported by monitored sites, keeps a shared
//! catalog of the modules they run, and decides what the detail view of each
//! site shows. The binary (`main.rs`) wires these pieces behind a REST API.

pub mod catalog;
pub mod config;
pub mod errors;
pub mod events;
pub mod http;
pub mod logging;
pub mod models;
pub mod mqtt;
pub mod presentation;
pub mod reconciler;
pub mod refresh;
pub mod service;
pub mod store;
pub mod version;

pub use catalog::{CatalogPolicy, ModuleCatalog, ModuleEntry};
pub use errors::{Result, TransportError, WardenError};
pub use events::{Dispatcher, NotificationRouter, NullRouter, Signal, SignalKind, SignalListener};
pub use models::{SiteKind, SiteRecord, Snapshot};
pub use presentation::{Section, SectionId};
pub use reconciler::{ReconcileOutcome, UpdateReconciler};
pub use refresh::{HttpSiteConnection, RefreshReport, SiteConnection};
pub use service::SiteService;
pub use store::{DocumentStore, JsonFileStore, MemoryStore, StoreError};
