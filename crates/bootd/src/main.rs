//! bootd — the Bootgrid daemon.
//!
//! Single binary that assembles the provisioning responder:
//! - Node registry and status log (redb)
//! - Image layout and overlay resolver over the provision tree
//! - Provisioning pipeline
//! - HTTP API
//!
//! # Usage
//!
//! ```text
//! bootd --config /etc/bootgrid/bootd.toml serve --port 9873
//! bootd import /etc/bootgrid/nodes.toml
//! ```

mod nodes;

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use boot_core::config::DEFAULT_CONFIG_PATH;
use boot_core::BootConfig;
use bootgrid_api::{ApiState, ProcNetArp};
use bootgrid_image::{CommandBuilder, FsImageLayout, FsOverlayResolver};
use bootgrid_provision::{Collaborators, Provisioner};
use bootgrid_state::StateStore;
use clap::{Parser, Subcommand};
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "bootd", about = "Bootgrid network-boot provisioning daemon")]
struct Cli {
    /// Daemon configuration file.
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Serve provisioning requests.
    Serve {
        /// Port to listen on, overriding the configuration.
        #[arg(long)]
        port: Option<u16>,
    },
    /// Import node definitions into the registry.
    Import {
        /// TOML file with `[nodes.<id>]` tables.
        file: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    let config = load_config(&cli.config)?;
    match cli.command {
        Command::Serve { port } => run_serve(config, port).await,
        Command::Import { file } => {
            let store = open_store(&config)?;
            let count = nodes::import(&store, &file)?;
            info!(count, file = ?file, "nodes imported");
            Ok(())
        }
    }
}

fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,bootd=debug,bootgrid=debug".parse().unwrap());
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// A missing file at the default location means "all defaults".
fn load_config(path: &Path) -> anyhow::Result<BootConfig> {
    if !path.exists() && path == Path::new(DEFAULT_CONFIG_PATH) {
        warn!(path = ?path, "no configuration file, using defaults");
        return Ok(BootConfig::default());
    }
    let config = BootConfig::from_file(path)?;
    info!(path = ?path, "configuration loaded");
    Ok(config)
}

fn open_store(config: &BootConfig) -> anyhow::Result<StateStore> {
    std::fs::create_dir_all(&config.paths.data_dir)?;
    let db_path = config.db_path();
    let store = StateStore::open(&db_path)?
        .with_max_unconfigured(config.discovery.max_unconfigured);
    info!(path = ?db_path, "state store opened");
    Ok(store)
}

async fn run_serve(mut config: BootConfig, port: Option<u16>) -> anyhow::Result<()> {
    info!("bootd starting");

    // Templates advertise the port we actually listen on.
    if let Some(port) = port {
        config.server.port = port;
    }

    // ── Initialize subsystems ──────────────────────────────────

    let store = open_store(&config)?;
    if let Some(nodes_file) = &config.nodes_file {
        let count = nodes::import(&store, nodes_file)?;
        info!(count, file = ?nodes_file, "nodes imported");
    }

    let images = FsImageLayout::new(&config.paths.provision_dir, &config.paths.chroot_dir);
    let mut overlays = FsOverlayResolver::new(&config.paths.provision_dir, &config.paths.overlay_dir);
    if let Some(builder) = CommandBuilder::from_argv(&config.overlays.build_command) {
        info!(command = ?config.overlays.build_command, "overlay autobuild hook configured");
        overlays = overlays.with_builder(Arc::new(builder));
    }

    let config = Arc::new(config);
    let provisioner = Provisioner::new(
        config.clone(),
        Collaborators {
            registry: Arc::new(store.clone()),
            images: Arc::new(images),
            overlays: Arc::new(overlays),
            status: Arc::new(store.clone()),
        },
    );
    info!(secure = config.server.secure, "provisioner initialized");

    // ── Start API server ───────────────────────────────────────

    let router = bootgrid_api::build_router(ApiState {
        provisioner: Arc::new(provisioner),
        store,
        neighbors: Arc::new(ProcNetArp::default()),
    });
    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));

    info!(%addr, "API server starting");

    let listener = tokio::net::TcpListener::bind(addr).await?;

    // Graceful shutdown on Ctrl-C.
    axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install CTRL+C handler");
        info!("shutdown signal received");
    })
    .await?;

    info!("bootd stopped");
    Ok(())
}
