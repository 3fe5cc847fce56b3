//! scanmapd: the scanmap engine daemon.
//!
//! # Architecture
//!
//! ```text
//! main()
//!  └─ load config, install tracing
//!  └─ run()
//!       ├─ MessagePump          (thread; drains the notification channel)
//!       ├─ ThreadWatcher        (thread; reports exits of --watch threads)
//!       ├─ InjectionCoordinator (escape(true) at start, escape(false) on Ctrl-C)
//!       └─ reclaim ticker       (Tokio interval; polls timed-out injections)
//! ```

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use scanmap_engine::infrastructure::storage::config::{load_config, load_config_from, EngineConfig};

// ── CLI argument definitions ──────────────────────────────────────────────────

/// Applies the scancode map for the current session and restores it on exit.
#[derive(Debug, Parser)]
#[command(
    name = "scanmapd",
    about = "Scancode map coordination engine for scanmap",
    version
)]
struct Cli {
    /// Config file to load instead of the platform default.
    #[arg(long, env = "SCANMAP_CONFIG", value_name = "PATH")]
    config: Option<PathBuf>,

    /// Leave the scancode map alone; only watch threads and relay notifications.
    #[arg(long)]
    no_apply: bool,

    /// Thread id to watch for exit. May be repeated.
    #[arg(long = "watch", value_name = "TID")]
    watch: Vec<u32>,
}

impl Cli {
    fn load_config(&self) -> anyhow::Result<EngineConfig> {
        let config = match &self.config {
            Some(path) => load_config_from(path)
                .with_context(|| format!("failed to load config from {}", path.display()))?,
            None => load_config().context("failed to load config")?,
        };
        Ok(config)
    }
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = cli.load_config()?;

    // `RUST_LOG` wins over the configured level.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.engine.log_level)),
        )
        .init();

    info!("scanmap engine starting");
    run(cli, config).await?;
    info!("scanmap engine stopped");
    Ok(())
}

#[cfg(not(target_os = "windows"))]
async fn run(_cli: Cli, _config: EngineConfig) -> anyhow::Result<()> {
    anyhow::bail!("scanmapd drives the Windows keyboard layout and only runs on Windows")
}

#[cfg(target_os = "windows")]
async fn run(cli: Cli, config: EngineConfig) -> anyhow::Result<()> {
    use std::sync::{Arc, Mutex, PoisonError};

    use tracing::{debug, error};

    use scanmap_engine::application::injection_coordinator::{
        CoordinatorParts, InjectionCoordinator, PendingStatus,
    };
    use scanmap_engine::application::notification_channel::NotificationChannel;
    use scanmap_engine::application::thread_relay::ChannelThreadObserver;
    use scanmap_engine::application::thread_watcher::ThreadWatcher;
    use scanmap_engine::infrastructure::process::windows::WindowsProcessMemory;
    use scanmap_engine::infrastructure::registry::windows::WindowsRegistry;
    use scanmap_engine::infrastructure::session::windows::WindowsSession;
    use scanmap_engine::infrastructure::threads::windows::WindowsThreadPlatform;
    use scanmap_engine::infrastructure::window::windows::MessagePump;

    type Coordinator = InjectionCoordinator<WindowsSession, WindowsProcessMemory>;

    async fn escape(coordinator: &Arc<Mutex<Coordinator>>, apply: bool) {
        let coordinator = Arc::clone(coordinator);
        let result = tokio::task::spawn_blocking(move || {
            coordinator
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .escape(apply)
        })
        .await;
        match result {
            Ok(Ok(report)) => info!(
                status = ?report.status,
                recovered = report.recovered_after_timeout,
                apply,
                "escape finished"
            ),
            Ok(Err(e)) => error!(code = %e.status_code(), apply, "escape failed: {e}"),
            Err(e) => error!("escape task panicked: {e}"),
        }
    }

    // ── Notification relay ────────────────────────────────────────────────────
    let channel = NotificationChannel::new(config.engine.notify_message_id);
    channel.set_debug_level(config.engine.debug_level);
    let mut pump = MessagePump::spawn(Arc::clone(&channel), config.engine.failure_message_id)
        .context("failed to start the message pump")?;
    let owner = pump.target();
    channel.attach_window(Arc::clone(&owner));

    // ── Thread watcher ────────────────────────────────────────────────────────
    let observer = Arc::new(ChannelThreadObserver::new(Arc::clone(&channel), 0));
    let watcher = ThreadWatcher::new(
        WindowsThreadPlatform::new(),
        observer,
        Some(Arc::clone(&channel)),
    )
    .context("failed to create the thread watcher")?;
    for thread_id in &cli.watch {
        watcher.attach(*thread_id);
    }

    // ── Injection coordinator ─────────────────────────────────────────────────
    let parts = CoordinatorParts {
        session: WindowsSession::new(),
        memory: WindowsProcessMemory::new(),
        primary: Box::new(WindowsRegistry::per_user()),
        fallback: Box::new(WindowsRegistry::system()),
        fix_entries: config.injection.fix_entries.clone(),
        timeout: config.injection.timeout(),
    };
    let coordinator = InjectionCoordinator::init(parts, owner, config.engine.failure_message_id)
        .context("failed to initialise the injection coordinator")?;
    let coordinator = Arc::new(Mutex::new(coordinator));

    if !cli.no_apply {
        escape(&coordinator, true).await;
    }

    // ── Main loop ─────────────────────────────────────────────────────────────
    let mut reclaim = tokio::time::interval(config.injection.reclaim_interval());
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);
    info!("scanmap engine ready.  Press Ctrl-C to exit.");
    loop {
        tokio::select! {
            _ = reclaim.tick() => {
                let status = coordinator
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .poll_pending();
                if status != PendingStatus::Clear {
                    debug!(?status, "reclaim pass");
                }
            }
            signal = &mut shutdown => {
                signal.context("failed to listen for Ctrl-C")?;
                info!("shutdown signal received");
                break;
            }
        }
    }

    if !cli.no_apply {
        escape(&coordinator, false).await;
    }
    watcher.shutdown();
    drop(coordinator);
    channel.detach_window();
    pump.stop();
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
