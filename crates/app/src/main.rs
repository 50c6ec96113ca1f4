#![forbid(unsafe_code)]

use std::fs::OpenOptions;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use argonav_api::{ArgoApi, HttpApi, HttpConfig, MockApi};
use clap::Parser;
use tracing::info;

mod config;
mod render;
mod runtime;

use config::Config;

#[derive(Parser, Debug)]
#[command(name = "argonav", version, about = "Keyboard-driven terminal UI for Argo CD applications")]
struct Args {
    /// Path to config file (default: <config dir>/argonav/config.yaml if present)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Use the in-memory demo backend
    #[arg(long)]
    mock: bool,

    /// Argo CD server URL (overrides config and ARGOCD_SERVER)
    #[arg(long)]
    server: Option<String>,

    /// Auth token (overrides config and ARGOCD_AUTH_TOKEN)
    #[arg(long)]
    token: Option<String>,

    #[arg(long, env = "ARGOCD_USERNAME")]
    username: Option<String>,

    #[arg(long, env = "ARGOCD_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// Skip TLS verification (or ARGOCD_INSECURE=true)
    #[arg(long)]
    insecure: bool,

    /// debug, info, warn, error
    #[arg(long)]
    log_level: Option<String>,
}

impl Args {
    fn apply(&self, cfg: &mut Config) {
        if let Some(server) = self.server.clone() {
            cfg.argocd.server = server;
        }
        if let Some(token) = self.token.clone() {
            cfg.argocd.token = token;
        }
        if self.insecure {
            cfg.argocd.insecure_skip_verify = true;
        }
        if let Some(level) = self.log_level.clone() {
            cfg.log_level = level;
        }
    }
}

/// The terminal belongs to the UI, so logs go to a file.
fn init_tracing(cfg: &Config) -> Result<PathBuf> {
    let path = cfg.log_file();
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .with_context(|| format!("open log file {}", path.display()))?;
    let env = std::env::var("ARGONAV_LOG").unwrap_or_else(|_| cfg.log_level.clone());
    let filter = tracing_subscriber::EnvFilter::from_str(&env)
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_ansi(false)
        .with_writer(Mutex::new(file))
        .init();
    Ok(path)
}

fn init_metrics() {
    if let Ok(addr) = std::env::var("ARGONAV_METRICS_ADDR") {
        if let Ok(sock) = addr.parse::<std::net::SocketAddr>() {
            let builder = metrics_exporter_prometheus::PrometheusBuilder::new();
            match builder.with_http_listener(sock).install() {
                Ok(_) => tracing::info!(addr = %addr, "Prometheus metrics exporter listening"),
                Err(e) => tracing::warn!(error = %e, "failed to install metrics exporter"),
            }
        } else {
            tracing::warn!(addr = %addr, "invalid ARGONAV_METRICS_ADDR; expected host:port");
        }
    }
}

fn non_empty(v: &str) -> Option<String> {
    (!v.is_empty()).then(|| v.to_string())
}

fn build_api(args: &Args, cfg: &Config) -> Result<(Arc<dyn ArgoApi>, String)> {
    if args.mock || cfg.argocd.server.is_empty() {
        return Ok((Arc::new(MockApi::demo()), "mock".into()));
    }
    let http = HttpApi::new(HttpConfig {
        server: cfg.argocd.server.clone(),
        token: non_empty(&cfg.argocd.token),
        username: args.username.as_deref().and_then(non_empty),
        password: args.password.as_deref().and_then(non_empty),
        insecure: cfg.argocd.insecure_skip_verify,
        ..Default::default()
    })
    .context("configure Argo CD client")?;
    Ok((Arc::new(http), cfg.argocd.server.clone()))
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> Result<()> {
    let args = Args::parse();
    let mut cfg = config::load(args.config.as_deref()).context("load configuration")?;
    args.apply(&mut cfg);
    let log_path = init_tracing(&cfg)?;
    init_metrics();

    let (api, server) = build_api(&args, &cfg)?;
    info!(server = %server, log = %log_path.display(), "argonav starting");
    runtime::run(api, &cfg, server).await
}
