use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;

use crate::catalog::CatalogPolicy;
use crate::refresh::DEFAULT_REPORT_PATH;

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct KernelConfig {
    pub http: HttpConf,
    pub data_dir: PathBuf,
    pub mqtt: Option<MqttConf>,
    pub catalog: CatalogPolicy,
    pub refresh: RefreshConf,
    pub logging: LoggingConf,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct HttpConf {
    pub bind: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct MqttConf {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct RefreshConf {
    pub report_path: String,
    pub timeout_secs: u64,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct LoggingConf {
    /// Filter used when RUST_LOG is not set.
    pub filter: String,
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            http: HttpConf { bind: "0.0.0.0:8080".into() },
            data_dir: PathBuf::from("./data"),
            mqtt: None,
            catalog: CatalogPolicy::default(),
            refresh: RefreshConf::default(),
            logging: LoggingConf::default(),
        }
    }
}

impl Default for RefreshConf {
    fn default() -> Self {
        Self {
            report_path: DEFAULT_REPORT_PATH.into(),
            timeout_secs: 30,
        }
    }
}

impl Default for LoggingConf {
    fn default() -> Self {
        Self { filter: "info".into() }
    }
}

impl KernelConfig {
    pub fn sites_file(&self) -> PathBuf {
        self.data_dir.join("sites.json")
    }

    pub fn modules_file(&self) -> PathBuf {
        self.data_dir.join("modules.json")
    }
}

pub fn config_path() -> PathBuf {
    std::env::var("WARDEN_KERNEL_CONFIG")
        .unwrap_or_else(|_| "kernel.yaml".into())
        .into()
}

/// Loads the kernel configuration; a missing, empty or invalid file gives
/// the defaults.
pub async fn load_config(path: &Path) -> KernelConfig {
    if !path.exists() {
        tracing::warn!(path = %path.display(), "no kernel config, using defaults");
        return KernelConfig::default();
    }

    let txt = fs::read_to_string(path).await.unwrap_or_default();
    parse_config(&txt)
}

pub fn parse_config(txt: &str) -> KernelConfig {
    if txt.trim().is_empty() {
        return KernelConfig::default();
    }
    serde_yaml::from_str(txt).unwrap_or_else(|e| {
        tracing::warn!("invalid kernel config: {e}");
        KernelConfig::default()
    })
}
