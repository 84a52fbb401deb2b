//! Site refresh requests
//!
//! A refresh asks each remote site to push a fresh snapshot by posting to its
//! report endpoint. Sites in a batch are independent: a transport failure is
//! recorded as a warning message for that site and the batch goes on.

use futures::future::BoxFuture;
use serde::Serialize;
use std::time::Duration;

use crate::errors::TransportError;
use crate::models::SiteRecord;

pub const DEFAULT_REPORT_PATH: &str = "/admin/reports/warden";

/// Outbound connection to monitored sites.
pub trait SiteConnection: Send + Sync {
    fn post<'a>(&'a self, url: &'a str, site: &'a SiteRecord) -> BoxFuture<'a, Result<(), TransportError>>;
}

/// URL a site listens on for refresh requests.
pub fn site_request_url(site: &SiteRecord, report_path: &str) -> String {
    format!(
        "{}/{}",
        site.url.trim_end_matches('/'),
        report_path.trim_start_matches('/')
    )
}

pub struct HttpSiteConnection {
    client: reqwest::Client,
}

impl HttpSiteConnection {
    pub fn new(timeout: Duration) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("warden-kernel/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| TransportError::Request {
                url: String::new(),
                reason: e.to_string(),
            })?;
        Ok(Self { client })
    }
}

impl SiteConnection for HttpSiteConnection {
    fn post<'a>(&'a self, url: &'a str, site: &'a SiteRecord) -> BoxFuture<'a, Result<(), TransportError>> {
        Box::pin(async move {
            let response = self
                .client
                .post(url)
                .json(&serde_json::json!({ "site_id": site.id }))
                .send()
                .await
                .map_err(|e| TransportError::Request {
                    url: url.to_string(),
                    reason: e.to_string(),
                })?;

            if !response.status().is_success() {
                return Err(TransportError::Status {
                    url: url.to_string(),
                    status: response.status().as_u16(),
                });
            }
            Ok(())
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageLevel {
    Info,
    Warning,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RefreshMessage {
    pub site_id: String,
    pub level: MessageLevel,
    pub text: String,
}

/// User-visible messages collected over a refresh batch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RefreshReport {
    pub messages: Vec<RefreshMessage>,
}

impl RefreshReport {
    pub fn add_message(&mut self, site_id: &str, level: MessageLevel, text: impl Into<String>) {
        self.messages.push(RefreshMessage {
            site_id: site_id.to_string(),
            level,
            text: text.into(),
        });
    }

    pub fn warnings(&self) -> impl Iterator<Item = &RefreshMessage> {
        self.messages.iter().filter(|m| m.level == MessageLevel::Warning)
    }

    pub fn has_warnings(&self) -> bool {
        self.warnings().next().is_some()
    }
}

/// Posts a refresh request to one site and records the result in `report`.
pub async fn refresh_site(
    connection: &dyn SiteConnection,
    site: &SiteRecord,
    report_path: &str,
    report: &mut RefreshReport,
) {
    let url = site_request_url(site, report_path);
    tracing::info!(site = %site.url, "site refresh started");

    match connection.post(&url, site).await {
        Ok(()) => {
            report.add_message(
                &site.id,
                MessageLevel::Info,
                format!("A Drupal site has been updated: {}", site.url),
            );
            tracing::info!(site = %site.url, "site refresh finished");
        }
        Err(e) => {
            tracing::warn!(site = %site.url, "site refresh failed: {e}");
            report.add_message(&site.id, MessageLevel::Warning, e.to_string());
        }
    }
}
