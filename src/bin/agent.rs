//! helmsman-agent binary
//!
//! Wires the coordination core together: allocates the shared state store,
//! starts the arbiter, navigator, and targeting loops, and runs until
//! interrupted. Perception and pathfinding collaborators attach to the same
//! store out-of-process; with none attached every domain simply reads as
//! "no data yet" and the loops stay idle.
//!
//! ## Configuration (CLI / env / TOML via `config` crate)
//!
//! | Key                  | Default     | Description                        |
//! |----------------------|-------------|------------------------------------|
//! | `HELMSMAN_ROUTE`     | *(required)*| Waypoint route JSON file           |
//! | `HELMSMAN_SETTINGS`  | *(none)*    | TOML profile layered over defaults |
//! | `RUST_LOG`           | *(none)*    | Extra tracing directives           |

use anyhow::{Context, Result};
use clap::Parser;
use helmsman::actuation::NullActuator;
use helmsman::arbiter::Arbiter;
use helmsman::control::{CombatGate, VisitedLog};
use helmsman::navigator::Navigator;
use helmsman::route::Route;
use helmsman::store::StateStore;
use helmsman::targeting::TargetingEngine;
use helmsman::types::AgentSettings;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;

// ---------------------------------------------------------------------------
// CLI
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(name = "helmsman-agent", about = "Helmsman agent core", version)]
struct Args {
    /// Waypoint route file (JSON array of waypoints)
    #[arg(long, env = "HELMSMAN_ROUTE")]
    route: PathBuf,

    /// Optional TOML settings profile layered over the built-in defaults
    #[arg(long, env = "HELMSMAN_SETTINGS")]
    settings: Option<PathBuf>,
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("helmsman=debug".parse()?),
        )
        .init();

    let args = Args::parse();
    let settings = load_settings(args.settings.as_ref())?;

    let route_json = std::fs::read_to_string(&args.route)
        .with_context(|| format!("Failed to read route file {}", args.route.display()))?;
    let route = Route::from_json(&route_json).context("Invalid route file")?;
    log::info!(
        "Starting helmsman-agent (waypoints={}, throttle={}ms)",
        route.len(),
        settings.arbiter.throttle_ms,
    );

    // Shared state: the seqlock store plus the two tiny coordination values.
    let store = StateStore::with_all_domains();
    let gate = Arc::new(CombatGate::new());
    let visited = Arc::new(VisitedLog::new());

    // Arbiter owns the actuation boundary. The null actuator logs primitives
    // instead of injecting them; a real injector links in out-of-crate.
    let (arbiter, handle) = Arbiter::new(settings.arbiter.clone(), Box::new(NullActuator));
    let arbiter_task = tokio::spawn(arbiter.run());

    // Path probes go to the pathfinding collaborator; until one attaches we
    // just surface them in the log.
    let (probe_tx, mut probe_rx) = mpsc::unbounded_channel();
    tokio::spawn(async move {
        while let Some(probe) = probe_rx.recv().await {
            log::trace!("path probe requested: {:?}", probe);
        }
    });

    let navigator = Navigator::new(
        &settings,
        &store,
        handle.clone(),
        route,
        gate.clone(),
        visited.clone(),
        probe_tx,
        None,
    );
    let targeting = TargetingEngine::new(&settings, &store, handle, gate, visited);

    let nav_task = tokio::spawn(navigator.run());
    let targeting_task = tokio::spawn(targeting.run());

    tokio::select! {
        _ = arbiter_task => log::error!("arbiter exited unexpectedly"),
        _ = nav_task => log::error!("navigator exited unexpectedly"),
        _ = targeting_task => log::error!("targeting exited unexpectedly"),
        _ = tokio::signal::ctrl_c() => log::info!("helmsman-agent shutting down (SIGINT)"),
    }

    Ok(())
}

/// Defaults, optionally layered under a TOML profile.
fn load_settings(path: Option<&PathBuf>) -> Result<AgentSettings> {
    let mut builder = config::Config::builder()
        .add_source(config::Config::try_from(&AgentSettings::default())?);
    if let Some(path) = path {
        builder = builder.add_source(config::File::from(path.as_path()));
    }
    builder
        .build()
        .context("Failed to assemble settings")?
        .try_deserialize()
        .context("Invalid settings profile")
}
