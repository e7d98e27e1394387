//! CLI flags, config file, and resolved bot settings.
//!
//! The bot can be configured through CLI flags, a JSON config file, or
//! both; flags override the file. Everything resolves into a
//! [`BotConfig`] before the engine is built.

use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::Parser;
use overlink_engine::bootstrap::BootstrapList;
use overlink_types::{BootstrapNode, OverlinkError, Result};
use serde::Deserialize;

use crate::policy::PolicyConfig;

/// File name of the identity state inside the data directory.
pub const IDENTITY_FILE: &str = "identity.dat";

// ---------------------------------------------------------------------------
// CLI flags
// ---------------------------------------------------------------------------

/// Command-line flags of the echo bot.
#[derive(Parser, Debug)]
#[command(name = "overlink-bot", version, about = "Headless Overlink echo bot")]
pub struct Cli {
    /// Data directory holding the identity state (default: platform-specific).
    #[arg(long)]
    pub data_dir: Option<PathBuf>,

    /// File of bootstrap nodes, one `<host> <port> <hex key>` per line.
    #[arg(long)]
    pub nodes_file: Option<PathBuf>,

    /// Extra bootstrap node as `<host> <port> <hex key>` (repeatable).
    #[arg(long = "node")]
    pub nodes: Vec<String>,

    /// Display name to publish (default: keep the persisted name).
    #[arg(long)]
    pub name: Option<String>,

    /// Status message to publish (default: keep the persisted message).
    #[arg(long)]
    pub status: Option<String>,

    /// Milliseconds an incoming call rings before it is rejected.
    #[arg(long)]
    pub call_reject_delay_ms: Option<u64>,

    /// Load settings from a JSON config file (flags override it).
    #[arg(long)]
    pub config: Option<PathBuf>,
}

// ---------------------------------------------------------------------------
// Config file (JSON)
// ---------------------------------------------------------------------------

/// JSON config file format. Every field is optional.
///
/// Example `bot.json`:
/// ```json
/// {
///   "data_dir": "/var/lib/overlink-bot",
///   "nodes_file": "/etc/overlink/nodes.txt",
///   "nodes": ["198.51.100.7 33445 a1b2..."],
///   "name": "echo",
///   "status": "I repeat what you say",
///   "call_reject_delay_ms": 3000,
///   "reject_audio_text": "No audio calls, sorry.",
///   "reject_video_text": "No video calls, sorry."
/// }
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BotConfigFile {
    pub data_dir: Option<String>,
    pub nodes_file: Option<String>,
    pub nodes: Option<Vec<String>>,
    pub name: Option<String>,
    pub status: Option<String>,
    pub call_reject_delay_ms: Option<u64>,
    pub reject_audio_text: Option<String>,
    pub reject_video_text: Option<String>,
}

// ---------------------------------------------------------------------------
// Resolved config
// ---------------------------------------------------------------------------

/// Fully resolved bot configuration with all defaults applied.
#[derive(Debug, Clone)]
pub struct BotConfig {
    /// Directory holding [`IDENTITY_FILE`].
    pub data_dir: PathBuf,
    /// Bootstrap list file, if any.
    pub nodes_file: Option<PathBuf>,
    /// Bootstrap nodes given directly, still unparsed.
    pub extra_nodes: Vec<String>,
    /// Display name override; `None` keeps the persisted name.
    pub display_name: Option<String>,
    /// Status message override; `None` keeps the persisted message.
    pub status_message: Option<String>,
    /// Echo behavior knobs.
    pub policy: PolicyConfig,
}

impl BotConfig {
    /// Builds a config purely from CLI flags with defaults.
    pub fn from_cli(cli: &Cli) -> Self {
        let mut policy = PolicyConfig::default();
        if let Some(ms) = cli.call_reject_delay_ms {
            policy.call_reject_delay = Duration::from_millis(ms);
        }
        Self {
            data_dir: cli.data_dir.clone().unwrap_or_else(default_data_dir),
            nodes_file: cli.nodes_file.clone(),
            extra_nodes: cli.nodes.clone(),
            display_name: cli.name.clone(),
            status_message: cli.status.clone(),
            policy,
        }
    }

    /// Loads a config from a JSON file.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| OverlinkError::ConfigError {
            reason: format!("failed to read config file {}: {e}", path.display()),
        })?;
        let file: BotConfigFile =
            serde_json::from_str(&text).map_err(|e| OverlinkError::ConfigError {
                reason: format!("invalid config JSON in {}: {e}", path.display()),
            })?;

        let mut policy = PolicyConfig::default();
        if let Some(ms) = file.call_reject_delay_ms {
            policy.call_reject_delay = Duration::from_millis(ms);
        }
        if let Some(text) = file.reject_audio_text {
            policy.reject_audio_text = text;
        }
        if let Some(text) = file.reject_video_text {
            policy.reject_video_text = text;
        }

        Ok(Self {
            data_dir: file
                .data_dir
                .map(PathBuf::from)
                .unwrap_or_else(default_data_dir),
            nodes_file: file.nodes_file.map(PathBuf::from),
            extra_nodes: file.nodes.unwrap_or_default(),
            display_name: file.name,
            status_message: file.status,
            policy,
        })
    }

    /// Merges CLI overrides onto a config-file base.
    pub fn merge_cli(mut self, cli: &Cli) -> Self {
        if let Some(ref dir) = cli.data_dir {
            self.data_dir = dir.clone();
        }
        if let Some(ref path) = cli.nodes_file {
            self.nodes_file = Some(path.clone());
        }
        if !cli.nodes.is_empty() {
            self.extra_nodes.extend(cli.nodes.iter().cloned());
        }
        if cli.name.is_some() {
            self.display_name = cli.name.clone();
        }
        if cli.status.is_some() {
            self.status_message = cli.status.clone();
        }
        if let Some(ms) = cli.call_reject_delay_ms {
            self.policy.call_reject_delay = Duration::from_millis(ms);
        }
        self
    }

    /// Resolves the bootstrap node list.
    ///
    /// Nodes given directly must parse — a typo on the command line or
    /// in the config file is a hard error, unlike a bad line inside the
    /// nodes file, which is skipped with a warning while parsing the
    /// file itself.
    ///
    /// # Errors
    ///
    /// Fails when a direct node is malformed, when the nodes file
    /// yields no valid entry, or when neither source yields any node.
    pub fn bootstrap_list(&self) -> Result<BootstrapList> {
        let extra = self
            .extra_nodes
            .iter()
            .map(|line| line.parse::<BootstrapNode>())
            .collect::<Result<Vec<_>>>()?;

        match &self.nodes_file {
            Some(path) => Ok(BootstrapList::load(path)?.merge(extra)),
            None => BootstrapList::from_nodes(extra),
        }
    }

    /// Path of the identity state file inside the data directory.
    pub fn identity_path(&self) -> PathBuf {
        self.data_dir.join(IDENTITY_FILE)
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Platform-specific default data directory.
fn default_data_dir() -> PathBuf {
    if cfg!(target_os = "linux") {
        if let Some(home) = dirs::home_dir() {
            return home.join(".overlink-bot");
        }
    }
    if let Some(data) = dirs::data_dir() {
        return data.join("OverlinkBot");
    }
    PathBuf::from("overlink-bot-data")
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
