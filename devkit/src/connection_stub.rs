/*!
Scripted site connection

Stands in for `HttpSiteConnection`: records every refresh request and fails
the ones aimed at sites marked unreachable.
*/

use futures::future::BoxFuture;
use parking_lot::Mutex;
use std::collections::HashMap;

use warden_kernel::refresh::SiteConnection;
use warden_kernel::{SiteRecord, TransportError};

#[derive(Debug, Clone, Copy)]
enum Failure {
    Unreachable,
    Status(u16),
}

#[derive(Default)]
pub struct StubConnection {
    failures: Mutex<HashMap<String, Failure>>,
    posted: Mutex<Vec<String>>,
}

impl StubConnection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests to sites whose URL starts with `site_url` fail to connect.
    pub fn unreachable(self, site_url: &str) -> Self {
        self.failures
            .lock()
            .insert(site_url.trim_end_matches('/').to_string(), Failure::Unreachable);
        self
    }

    /// Requests to sites whose URL starts with `site_url` answer `status`.
    pub fn answering(self, site_url: &str, status: u16) -> Self {
        self.failures
            .lock()
            .insert(site_url.trim_end_matches('/').to_string(), Failure::Status(status));
        self
    }

    /// URLs posted to, in order.
    pub fn posted(&self) -> Vec<String> {
        self.posted.lock().clone()
    }

    fn failure_for(&self, url: &str) -> Option<Failure> {
        self.failures
            .lock()
            .iter()
            .find(|(prefix, _)| url.starts_with(prefix.as_str()))
            .map(|(_, failure)| *failure)
    }
}

impl SiteConnection for StubConnection {
    fn post<'a>(&'a self, url: &'a str, _site: &'a SiteRecord) -> BoxFuture<'a, Result<(), TransportError>> {
        Box::pin(async move {
            self.posted.lock().push(url.to_string());
            match self.failure_for(url) {
                None => Ok(()),
                Some(Failure::Unreachable) => Err(TransportError::Request {
                    url: url.to_string(),
                    reason: "connection refused".into(),
                }),
                Some(Failure::Status(status)) => Err(TransportError::Status {
                    url: url.to_string(),
                    status,
                }),
            }
        })
    }
}
