/*!
Test harness for the site service

Wires a `SiteService` over in-memory stores, a `Dispatcher` feeding a
`MockBroker` and a `StubConnection`, and keeps handles on all of them for
assertions.
*/

use anyhow::Result;
use serde_json::Value;
use std::sync::Arc;

use warden_kernel::events::Dispatcher;
use warden_kernel::{
    CatalogPolicy, DocumentStore, MemoryStore, ModuleEntry, ReconcileOutcome, SiteRecord, SiteService,
};

use crate::broker_stub::MockBroker;
use crate::connection_stub::StubConnection;

pub struct TestHarness {
    pub sites: Arc<MemoryStore<SiteRecord>>,
    pub modules: Arc<MemoryStore<ModuleEntry>>,
    pub broker: Arc<MockBroker>,
    pub connection: Arc<StubConnection>,
    pub service: SiteService,
}

impl TestHarness {
    pub fn new() -> Self {
        Self::with_options(CatalogPolicy::default(), StubConnection::new())
    }

    /// Harness whose catalog only links modules it already knows.
    pub fn with_known_modules(names: &[&str]) -> Self {
        let harness = Self::with_options(
            CatalogPolicy {
                register_unknown_modules: false,
            },
            StubConnection::new(),
        );
        for name in names {
            harness
                .modules
                .save(&ModuleEntry::new(*name))
                .expect("memory store");
        }
        harness
    }

    pub fn with_options(policy: CatalogPolicy, connection: StubConnection) -> Self {
        warden_kernel::logging::init("debug");

        let sites: Arc<MemoryStore<SiteRecord>> = Arc::new(MemoryStore::new());
        let modules: Arc<MemoryStore<ModuleEntry>> = Arc::new(MemoryStore::new());
        let broker = Arc::new(MockBroker::new());
        let connection = Arc::new(connection);

        let dispatcher = Arc::new(Dispatcher::new());
        dispatcher.subscribe_all(broker.clone());

        let service = SiteService::new(sites.clone(), modules.clone(), dispatcher, connection.clone())
            .with_catalog_policy(policy);

        Self {
            sites,
            modules,
            broker,
            connection,
            service,
        }
    }

    /// Registers `url` and returns the new record.
    pub fn register(&self, url: &str) -> Result<SiteRecord> {
        Ok(self.service.register_site(url)?)
    }

    /// Registers `url` and feeds it `snapshot` right away.
    pub fn register_with(&self, url: &str, snapshot: &Value) -> Result<(SiteRecord, ReconcileOutcome)> {
        let site = self.register(url)?;
        let outcome = self.service.process_update(&site.id, snapshot)?;
        Ok((self.site(&site.id)?, outcome))
    }

    pub fn site(&self, id: &str) -> Result<SiteRecord> {
        Ok(self.service.get_site(id)?)
    }

    pub fn module(&self, name: &str) -> Option<ModuleEntry> {
        self.modules.get(name).ok().flatten()
    }

    /// Ids of the sites using `name`, sorted.
    pub fn users_of(&self, name: &str) -> Vec<String> {
        self.module(name)
            .map(|m| m.using_sites.into_iter().collect())
            .unwrap_or_default()
    }

    /// Fails unless the broker saw exactly `expected` signals, in order.
    pub fn assert_signals(&self, expected: &[&str]) -> Result<()> {
        let actual = self.broker.signal_names();
        if actual != expected {
            anyhow::bail!("signals mismatch: expected {expected:?}, got {actual:?}");
        }
        Ok(())
    }

    pub fn reset_signals(&self) {
        self.broker.clear();
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}
