//! Static configuration: defaults, then YAML, then environment, then CLI flags.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ArgoCdConfig {
    pub server: String,
    pub token: String,
    pub insecure_skip_verify: bool,
}

impl Default for ArgoCdConfig {
    fn default() -> Self {
        Self { server: "https://localhost:8080".into(), token: String::new(), insecure_skip_verify: false }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct UiConfig {
    pub sidebar_width: u16,
    /// Max buffered log lines per overlay.
    pub log_backlog: usize,
    pub log_channel_cap: usize,
}

impl Default for UiConfig {
    fn default() -> Self {
        Self {
            sidebar_width: 28,
            log_backlog: argonav_session::DEFAULT_LOG_BACKLOG,
            log_channel_cap: argonav_ops::DEFAULT_LOG_CHANNEL_CAP,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Config {
    pub argocd: ArgoCdConfig,
    pub ui: UiConfig,
    pub log_level: String,
    pub log_file: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self { argocd: ArgoCdConfig::default(), ui: UiConfig::default(), log_level: "info".into(), log_file: None }
    }
}

impl Config {
    pub fn log_file(&self) -> PathBuf {
        self.log_file.clone().unwrap_or_else(|| std::env::temp_dir().join("argonav.log"))
    }
}

/// `<user config dir>/argonav/config.yaml`.
pub fn default_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("argonav").join("config.yaml"))
}

fn boolish(v: &str) -> bool {
    matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "y" | "on")
}

/// Load from the process environment and the default location.
pub fn load(explicit: Option<&Path>) -> Result<Config> {
    load_with(explicit, default_path(), |k| std::env::var(k).ok())
}

/// An explicit path must exist; the fallback path is used only if present.
pub fn load_with<F>(explicit: Option<&Path>, fallback: Option<PathBuf>, env: F) -> Result<Config>
where
    F: Fn(&str) -> Option<String>,
{
    let path = match explicit {
        Some(p) => Some(p.to_path_buf()),
        None => fallback.filter(|p| p.exists()),
    };
    let mut cfg = match &path {
        Some(p) => {
            let raw = std::fs::read_to_string(p).with_context(|| format!("read config {}", p.display()))?;
            serde_yaml::from_str::<Config>(&raw).with_context(|| format!("parse config {}", p.display()))?
        }
        None => Config::default(),
    };

    let var = |k: &str| env(k).filter(|v| !v.is_empty());
    if let Some(v) = var("ARGOCD_SERVER") {
        cfg.argocd.server = v;
    }
    if let Some(v) = var("ARGOCD_AUTH_TOKEN") {
        cfg.argocd.token = v;
    }
    if let Some(v) = var("ARGOCD_INSECURE") {
        cfg.argocd.insecure_skip_verify = boolish(&v);
    }
    if let Some(v) = var("ARGONAV_LOG_LEVEL") {
        cfg.log_level = v;
    }
    Ok(cfg)
}
