//! Game server binary: wires the world, the database, the tick driver and
//! the HTTP API together.

mod api;
mod app;
mod config;
mod db;
mod ticker;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tracing::info;
use tracing_subscriber::EnvFilter;

use api::ApiState;
use app::Application;
use db::Db;

const LISTEN_ADDR: (&str, u16) = ("0.0.0.0", 8080);

#[derive(Debug, Parser)]
#[command(about = "Multiplayer loot-gathering game server")]
struct Args {
    /// Path to the world configuration file.
    #[arg(short = 'c', long = "config-file")]
    config_file: PathBuf,

    /// Static content root (kept for CLI compatibility; files are served by
    /// the frontend).
    #[arg(short = 'w', long = "www-root")]
    www_root: PathBuf,

    /// Tick period in milliseconds; enables the automatic tick driver.
    /// Without it the game is advanced through the tick API.
    #[arg(short = 't', long = "tick-period")]
    tick_period: Option<u64>,

    /// Minimum interval between periodic state saves, milliseconds.
    #[arg(long = "save-state-period")]
    save_state_period: Option<u64>,

    /// Where to persist and restore the game state.
    #[arg(long = "state-file")]
    state_file: Option<PathBuf>,

    /// Spawn joining players at random road points instead of the first
    /// road's start.
    #[arg(long = "randomize-spawn-points")]
    randomize_spawn_points: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .json()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let db = Db::connect_from_env().await?;
    db.init_schema().await.context("database schema init")?;

    let loaded = config::load_game(&args.config_file)
        .with_context(|| format!("loading config {}", args.config_file.display()))?;
    let mut world = loaded.world;
    world.set_randomize_spawn(args.randomize_spawn_points);

    if let Some(path) = &args.state_file {
        game::restore_from_file(&mut world, path)
            .with_context(|| format!("restoring state from {}", path.display()))?;
    }

    let (retired_tx, retired_rx) = mpsc::unbounded_channel();
    world.set_retirement_hook(move |record| {
        let _ = retired_tx.send(record);
    });
    let persistence = db::spawn_retirement_worker(db.clone(), retired_rx);

    let application = Arc::new(Application::new(
        world,
        loaded.loot_catalog,
        args.tick_period.is_none(),
        args.state_file.clone(),
        args.save_state_period.map(|ms| ms as f64),
    ));

    let ticker = args
        .tick_period
        .map(|ms| ticker::spawn(application.clone(), Duration::from_millis(ms)));

    let router = api::router(ApiState { app: application.clone(), db });
    let listener = TcpListener::bind(LISTEN_ADDR).await.context("binding listener")?;
    info!(
        address = LISTEN_ADDR.0,
        port = LISTEN_ADDR.1,
        www_root = %args.www_root.display(),
        "server started"
    );

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("http server")?;

    // Shutdown: the ticker stops first so no tick races the final save, then
    // the state goes to disk and the persistence worker drains.
    if let Some(ticker) = ticker {
        ticker.abort();
    }
    application.save_state();
    drop(application);
    let _ = tokio::time::timeout(Duration::from_secs(5), persistence).await;

    info!("server exited");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };
    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(_) => std::future::pending().await,
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
    info!("shutdown signal received");
}
