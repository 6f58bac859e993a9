//!
//! gatekeeper probe
//! ----------------
//! Resolves one protected-page entry against the configured verification endpoints and
//! prints the outcome as JSON. Configuration comes from `GATEKEEPER_*` variables.
//!
//! Usage: gatekeeper-probe [ROUTE] [--no-wait]

use anyhow::{Context, Result};
use std::env;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

use gatekeeper::identity::ReconcileOutcome;
use gatekeeper::{GateConfig, ResolutionEngine, ResolutionResult};

fn print_usage(program: &str) {
    eprintln!("Usage: {} [ROUTE] [--no-wait]", program);
    eprintln!("  ROUTE      page being entered (default: dashboard route)");
    eprintln!("  --no-wait  do not wait for background reconciliation after a cache hit");
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .context("invalid log filter")?;
    fmt().with_env_filter(filter).with_writer(std::io::stderr).init();

    let mut args: Vec<String> = env::args().collect();
    let program = args.remove(0);
    let mut route: Option<String> = None;
    let mut wait = true;
    for a in args {
        match a.as_str() {
            "--no-wait" => wait = false,
            "-h" | "--help" => { print_usage(&program); return Ok(()); }
            s if s.starts_with('-') => { eprintln!("unknown flag {}", s); print_usage(&program); std::process::exit(64); }
            _ => route = Some(a),
        }
    }

    let cfg = GateConfig::from_env().context("loading GATEKEEPER_* configuration")?;
    let route = route.unwrap_or_else(|| cfg.routes.dashboard.clone());
    info!(
        target: "gatekeeper",
        "probe starting: route='{}', super_admin_url='{}', admin_url='{}', timeout_ms={}, cache='{}'",
        route, cfg.super_admin_verify_url, cfg.admin_verify_url, cfg.verify_timeout_ms, cfg.cache_path.display()
    );

    let engine = ResolutionEngine::from_config(&cfg).context("building resolution engine")?;
    let mut entry = engine.enter(&route).await;
    let mut reconcile: Option<ReconcileOutcome> = None;
    if wait {
        reconcile = entry.reconciled().await;
    }
    let rendered = entry.view.borrow().clone();

    let out = serde_json::json!({
        "route": route,
        "result": entry.result,
        "rendered": rendered,
        "redirect_route": entry.result.redirect().and_then(|t| engine.routes().route_for(t)),
        "reconcile": reconcile.map(|r| format!("{:?}", r)),
    });
    println!("{}", serde_json::to_string_pretty(&out)?);

    match entry.result {
        ResolutionResult::Resolved(_) => Ok(()),
        ResolutionResult::Redirect(_) | ResolutionResult::Pending => std::process::exit(2),
    }
}
