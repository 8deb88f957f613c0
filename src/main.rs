// =============================================================================
// servicemap-risk-api — Main Entry Point
// =============================================================================
//
// Loads config, opens the SQLite store, then runs three things side by
// side: the HTTP API, an interlink reconciliation worker, and a risk
// cache sweep worker. Both background workers run under `supervisor::supervise`
// so a panic in one restarts it instead of taking the whole process down.
// =============================================================================

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use servicemap_risk_api::app_state::AppState;
use servicemap_risk_api::config::Config;
use servicemap_risk_api::pidfile::PidFile;
use servicemap_risk_api::{api, error, interlink, risk_cache, store, supervisor};

#[derive(Parser, Debug)]
#[command(name = "servicemap-risk-api")]
struct Cli {
    /// Path to the TOML config file.
    #[arg(short = 'f', long = "config", default_value = "/etc/servicemap-risk-api.conf")]
    config: PathBuf,

    /// Path to the PID file.
    #[arg(short = 'p', long = "pidfile", default_value = "/var/run/servicemap-risk-api.pid")]
    pidfile: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenv::dotenv();
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("servicemap-risk-api starting up");

    let cfg = match Config::load(&cli.config) {
        Ok(cfg) => cfg,
        Err(e) => {
            warn!(error = %e, path = %cli.config.display(), "failed to load config, using defaults");
            Config::default()
        }
    };
    cfg.validate()?;

    let pid_file = PidFile::create(&cli.pidfile)?;
    info!(path = %cli.pidfile.display(), "pid file created");

    let conn = store::connect(&cfg.database.path)?;
    store::init_schema(&conn)?;
    info!(path = %cfg.database.path, "database ready");

    let listen_addr = cfg.general.listen.clone();
    let state = Arc::new(AppState::new(cfg, conn));

    // ── HTTP server ──────────────────────────────────────────────────────
    let http_state = state.clone();
    let server = tokio::spawn(async move {
        let app = api::rest::router(http_state);
        let listener = tokio::net::TcpListener::bind(&listen_addr)
            .await
            .expect("failed to bind API listener");
        info!(addr = %listen_addr, "API server listening");
        axum::serve(listener, app).await.expect("API server failed");
    });

    // ── Interlink reconciliation worker ─────────────────────────────────
    let interlink_state = state.clone();
    tokio::spawn(supervisor::supervise("interlink", move || {
        let state = interlink_state.clone();
        async move { interlink_loop(state).await }
    }));

    // ── Risk cache sweep worker ─────────────────────────────────────────
    let risk_state = state.clone();
    tokio::spawn(supervisor::supervise("risk-cache", move || {
        let state = risk_state.clone();
        async move { risk_cache_loop(state).await }
    }));

    info!("all subsystems running, press Ctrl+C to stop");

    tokio::signal::ctrl_c().await?;
    warn!("shutdown signal received, stopping gracefully");

    server.abort();
    drop(pid_file);

    info!("servicemap-risk-api shut down complete");
    Ok(())
}

/// Reloads and applies the interlink rule file on the configured cadence.
/// Exits (returning control to the supervisor, which restarts it after a
/// backoff) only on panic; a missing rule file or a parse error is logged
/// and simply skipped until the next tick, matching the original
/// service's log-and-continue `interlinkManager` behavior.
async fn interlink_loop(state: Arc<AppState>) {
    loop {
        let cadence = state.config.interlink_run_every();

        match &state.config.interlink.rule_path {
            None => {}
            Some(path) => match std::fs::read_to_string(path) {
                Ok(text) => match interlink::parse_rules(&text) {
                    Ok(rules) => {
                        if let Err(e) = run_interlink(&state, &rules) {
                            error!(error = %e, "interlink run failed");
                        } else {
                            info!(rules = rules.len(), "interlink rules applied");
                        }
                    }
                    Err(e) => error!(error = %e, path, "failed to parse interlink rule file"),
                },
                Err(e) => error!(error = %e, path, "failed to read interlink rule file"),
            },
        }

        tokio::time::sleep(cadence).await;
    }
}

fn run_interlink(state: &AppState, rules: &[interlink::InterlinkRule]) -> Result<(), error::AppError> {
    let ctx = state.op_transaction("interlink")?;
    match interlink::run_rules(&ctx, rules) {
        Ok(()) => ctx.commit(),
        Err(e) => {
            ctx.rollback()?;
            Err(e)
        }
    }
}

/// Sweeps for stale or missing risk cache entries on the configured
/// cadence.
async fn risk_cache_loop(state: Arc<AppState>) {
    loop {
        match risk_cache::sweep_stale(&state) {
            Ok(n) => {
                let sweep_no = state.record_risk_cache_sweep();
                if n > 0 {
                    info!(refreshed = n, sweep = sweep_no, "risk cache sweep complete");
                }
            }
            Err(e) => error!(error = %e, "risk cache sweep failed"),
        }
        tokio::time::sleep(std::time::Duration::from_secs(5)).await;
    }
}
