//! Overlink echo bot -- headless echo peer for the overlay.
//!
//! Usage:
//!
//!   overlink-bot [OPTIONS]
//!
//! Options:
//!
//!   --data-dir <PATH>              Data directory (default: platform-specific)
//!   --nodes-file <PATH>            Bootstrap node list, one node per line
//!   --node <HOST PORT KEY>         Add a bootstrap node (repeatable)
//!   --name <NAME>                  Display name to publish
//!   --status <TEXT>                Status message to publish
//!   --call-reject-delay-ms <MS>    Ring time before calls are rejected
//!   --config <PATH>                Load settings from JSON config file
//!
//! Environment:
//!
//!   RUST_LOG    Log level filter (default: info)
//!
//! The bot runs until interrupted with Ctrl+C (SIGINT/SIGTERM).

use clap::Parser;

use overlink_bot::config::{BotConfig, Cli};
use overlink_bot::policy::EchoPolicy;
use overlink_engine::engine::SessionEngine;
use overlink_identity::store::IdentityStore;
use overlink_overlay::memory::OverlayHub;

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() {
    // Tracing / logging.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    print_banner();

    // Parse CLI arguments, then layer them over the config file if one
    // was given.
    let cli = Cli::parse();
    let bot_config = match &cli.config {
        Some(path) => match BotConfig::load(path) {
            Ok(cfg) => cfg.merge_cli(&cli),
            Err(e) => {
                tracing::error!("failed to load config file: {e}");
                std::process::exit(1);
            }
        },
        None => BotConfig::from_cli(&cli),
    };

    // Run the bot.
    if let Err(e) = run_bot(bot_config).await {
        tracing::error!("bot error: {e}");
        std::process::exit(1);
    }
}

// ---------------------------------------------------------------------------
// Bot main logic
// ---------------------------------------------------------------------------

async fn run_bot(cfg: BotConfig) -> Result<(), String> {
    // -----------------------------------------------------------------------
    // 1. Identity
    // -----------------------------------------------------------------------

    std::fs::create_dir_all(&cfg.data_dir)
        .map_err(|e| format!("failed to create data directory: {e}"))?;
    tracing::info!(data_dir = %cfg.data_dir.display(), "data directory ready");

    let store = IdentityStore::new(cfg.identity_path());
    // A corrupt state file stops the bot here: regenerating keys would
    // change the address every peer knows.
    let state = store
        .load_or_create()
        .map_err(|e| format!("identity unavailable: {e}"))?;

    // -----------------------------------------------------------------------
    // 2. Bootstrap nodes
    // -----------------------------------------------------------------------

    let list = cfg
        .bootstrap_list()
        .map_err(|e| format!("no usable bootstrap nodes: {e}"))?;
    tracing::info!(nodes = list.len(), "bootstrap list ready");

    // -----------------------------------------------------------------------
    // 3. Overlay
    // -----------------------------------------------------------------------

    // Reference deployment on the in-process overlay: the hub treats
    // the configured nodes as reachable, and other endpoints attach to
    // the same hub. A networked overlay plugs in behind the same
    // `Overlay` trait without touching the engine.
    let hub = OverlayHub::new();
    for node in list.nodes() {
        hub.add_bootstrap_key(node.public_key)
            .map_err(|e| format!("failed to register bootstrap node: {e}"))?;
    }

    // -----------------------------------------------------------------------
    // 4. Engine and policy
    // -----------------------------------------------------------------------

    let mut engine = SessionEngine::new(store, state, list, hub.endpoint());

    EchoPolicy::new(cfg.policy.clone())
        .map_err(|e| format!("bad policy configuration: {e}"))?
        .install(engine.dispatcher_mut());

    engine
        .start()
        .map_err(|e| format!("engine start failed: {e}"))?;

    if let Some(name) = &cfg.display_name {
        engine
            .set_display_name(name)
            .map_err(|e| format!("failed to set display name: {e}"))?;
    }
    if let Some(status) = &cfg.status_message {
        engine
            .set_status_message(status)
            .map_err(|e| format!("failed to set status message: {e}"))?;
    }

    // -----------------------------------------------------------------------
    // 5. Print status summary
    // -----------------------------------------------------------------------

    println!();
    println!("============================================================");
    println!("  Overlink echo bot running");
    println!("============================================================");
    println!("  Address:    {}", engine.address());
    println!("  Name:       {}", engine.display_name());
    println!("  Bootstrap:  {} node(s)", engine.bootstrap_nodes().len());
    println!("  Data dir:   {}", cfg.data_dir.display());
    println!("============================================================");
    println!("  Message this address and the bot will echo back.");
    println!("  Press Ctrl+C to stop");
    println!("============================================================");
    println!();

    // -----------------------------------------------------------------------
    // 6. Iteration loop until shutdown signal
    // -----------------------------------------------------------------------

    let mut delay = engine.run_iteration();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("received Ctrl+C, shutting down...");
                break;
            }
            _ = tokio::time::sleep(delay) => {
                delay = engine.run_iteration();
            }
        }
    }

    // -----------------------------------------------------------------------
    // 7. Shutdown
    // -----------------------------------------------------------------------

    engine
        .shutdown()
        .map_err(|e| format!("shutdown failed: {e}"))?;

    tracing::info!("bot stopped");
    Ok(())
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn print_banner() {
    println!(
        r#"
   ___                 _ _       _
  / _ \__   _____ _ __| (_)_ __ | | __
 | | | \ \ / / _ \ '__| | | '_ \| |/ /
 | |_| |\ V /  __/ |  | | | | | |   <
  \___/ \_/ \___|_|  |_|_|_| |_|_|\_\
                         echo bot v{}
"#,
        env!("CARGO_PKG_VERSION")
    );
}
