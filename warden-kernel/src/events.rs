//! Signals raised by the kernel and the router that delivers them
//!
//! The kernel never knows who listens. It hands a `Signal` to a
//! `NotificationRouter` once its own mutations are applied; delivery is
//! fire-and-forget. `Dispatcher` is the in-process router: listeners are
//! registered per `SignalKind` while the process is wired up and run in
//! registration order. A failing listener is logged and the remaining
//! listeners still run.

use parking_lot::RwLock;
use serde::Serialize;
use std::sync::Arc;

use crate::models::SiteRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum SignalKind {
    SiteUpdate,
    SiteRefresh,
    SiteShow,
    SiteDelete,
    DashboardUpdate,
}

impl SignalKind {
    pub const ALL: [SignalKind; 5] = [
        SignalKind::SiteUpdate,
        SignalKind::SiteRefresh,
        SignalKind::SiteShow,
        SignalKind::SiteDelete,
        SignalKind::DashboardUpdate,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            SignalKind::SiteUpdate => "site-update",
            SignalKind::SiteRefresh => "site-refresh",
            SignalKind::SiteShow => "site-show",
            SignalKind::SiteDelete => "site-delete",
            SignalKind::DashboardUpdate => "dashboard-update",
        }
    }
}

/// A kernel event with its typed payload.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "signal", rename_all = "kebab-case")]
pub enum Signal {
    /// A verified snapshot arrived for `site`, before it is reconciled.
    SiteUpdate {
        site: SiteRecord,
        snapshot: serde_json::Value,
    },
    /// An administrator asked for `site` to report again.
    SiteRefresh { site: SiteRecord },
    /// The detail view of `site` was requested.
    SiteShow { site: SiteRecord },
    /// `site` was removed from the store.
    SiteDelete { site: SiteRecord },
    /// `site` changed and the dashboard should re-evaluate it.
    DashboardUpdate { site: SiteRecord },
}

impl Signal {
    pub fn kind(&self) -> SignalKind {
        match self {
            Signal::SiteUpdate { .. } => SignalKind::SiteUpdate,
            Signal::SiteRefresh { .. } => SignalKind::SiteRefresh,
            Signal::SiteShow { .. } => SignalKind::SiteShow,
            Signal::SiteDelete { .. } => SignalKind::SiteDelete,
            Signal::DashboardUpdate { .. } => SignalKind::DashboardUpdate,
        }
    }

    pub fn site(&self) -> &SiteRecord {
        match self {
            Signal::SiteUpdate { site, .. }
            | Signal::SiteRefresh { site }
            | Signal::SiteShow { site }
            | Signal::SiteDelete { site }
            | Signal::DashboardUpdate { site } => site,
        }
    }
}

pub trait NotificationRouter: Send + Sync {
    fn raise(&self, signal: Signal);
}

pub trait SignalListener: Send + Sync {
    fn name(&self) -> &str;

    fn handle(&self, signal: &Signal) -> anyhow::Result<()>;
}

/// Router that drops every signal.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullRouter;

impl NotificationRouter for NullRouter {
    fn raise(&self, signal: Signal) {
        tracing::trace!(kind = signal.kind().as_str(), "signal dropped");
    }
}

#[derive(Default)]
pub struct Dispatcher {
    listeners: RwLock<Vec<(SignalKind, Arc<dyn SignalListener>)>>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, kind: SignalKind, listener: Arc<dyn SignalListener>) {
        tracing::debug!(kind = kind.as_str(), listener = listener.name(), "listener registered");
        self.listeners.write().push((kind, listener));
    }

    pub fn subscribe_all(&self, listener: Arc<dyn SignalListener>) {
        for kind in SignalKind::ALL {
            self.subscribe(kind, listener.clone());
        }
    }

    pub fn listener_count(&self, kind: SignalKind) -> usize {
        self.listeners.read().iter().filter(|(k, _)| *k == kind).count()
    }
}

impl NotificationRouter for Dispatcher {
    fn raise(&self, signal: Signal) {
        let kind = signal.kind();
        let targets: Vec<Arc<dyn SignalListener>> = self
            .listeners
            .read()
            .iter()
            .filter(|(k, _)| *k == kind)
            .map(|(_, l)| l.clone())
            .collect();

        for listener in targets {
            if let Err(e) = listener.handle(&signal) {
                tracing::warn!(
                    kind = kind.as_str(),
                    listener = listener.name(),
                    site = %signal.site().url,
                    "listener failed: {e:#}"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    struct Collect {
        name: &'static str,
        seen: Mutex<Vec<(SignalKind, String)>>,
        fail: bool,
    }

    impl Collect {
        fn new(name: &'static str, fail: bool) -> Arc<Self> {
            Arc::new(Self { name, seen: Mutex::new(Vec::new()), fail })
        }
    }

    impl SignalListener for Collect {
        fn name(&self) -> &str {
            self.name
        }

        fn handle(&self, signal: &Signal) -> anyhow::Result<()> {
            self.seen.lock().push((signal.kind(), signal.site().id.clone()));
            if self.fail {
                anyhow::bail!("listener {} exploded", self.name);
            }
            Ok(())
        }
    }

    #[test]
    fn test_dispatch_by_kind_in_registration_order() {
        let dispatcher = Dispatcher::new();
        let failing = Collect::new("failing", true);
        let dashboard = Collect::new("dashboard", false);
        dispatcher.subscribe(SignalKind::DashboardUpdate, failing.clone());
        dispatcher.subscribe(SignalKind::DashboardUpdate, dashboard.clone());

        let site = SiteRecord::new("s1", "https://acme.test");
        dispatcher.raise(Signal::DashboardUpdate { site: site.clone() });
        dispatcher.raise(Signal::SiteDelete { site });

        assert_eq!(failing.seen.lock().len(), 1);
        assert_eq!(
            *dashboard.seen.lock(),
            vec![(SignalKind::DashboardUpdate, "s1".to_string())]
        );
    }

    #[test]
    fn test_subscribe_all_and_serialized_tag() {
        let dispatcher = Dispatcher::new();
        dispatcher.subscribe_all(Collect::new("all", false));
        for kind in SignalKind::ALL {
            assert_eq!(dispatcher.listener_count(kind), 1);
        }

        let json = serde_json::to_value(Signal::SiteShow {
            site: SiteRecord::new("s1", "https://acme.test"),
        })
        .unwrap();
        assert_eq!(json["signal"], "site-show");
        assert_eq!(json["site"]["id"], "s1");
    }
}
