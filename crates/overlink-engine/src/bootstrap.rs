//! Bootstrap node list: parsing and connection.
//!
//! The node list is plain text, one node per line:
//!
//! ```text
//! # host            port   public key (64 hex chars)
//! node1.example.net 33445  0461A1E9E702E2FAD11DC1C46F8519A4B74DBC3D1B0E22D77C79C788240AC43E
//! 198.51.100.17     443    8E7D0B859922EF569298B4D261A8CCB5FEA14FB91ED412A7603A585A25698832
//! ```
//!
//! Malformed lines are skipped with a warning so one stale entry cannot
//! take the whole list down. Zero usable entries is an error: a peer
//! with no bootstrap nodes can never reach the overlay.

use std::path::Path;

use overlink_overlay::link::Overlay;
use overlink_types::{BootstrapNode, OverlinkError, Result};
use tracing::{info, warn};

// ---------------------------------------------------------------------------
// BootstrapList
// ---------------------------------------------------------------------------

/// Validated list of bootstrap nodes.
///
/// Holds at least one node by construction. The number of lines skipped
/// during parsing is kept for diagnostics.
#[derive(Clone, Debug)]
pub struct BootstrapList {
    nodes: Vec<BootstrapNode>,
    skipped: usize,
}

impl BootstrapList {
    /// Parses a node list from text.
    ///
    /// Blank lines and `#` comments are ignored. Lines that fail to
    /// parse as `<host> <port> <public key>` are skipped with a warning
    /// and counted in [`skipped`](Self::skipped).
    ///
    /// # Errors
    ///
    /// Returns [`OverlinkError::BootstrapError`] if no line yields a
    /// usable node.
    pub fn parse(text: &str) -> Result<Self> {
        let mut nodes = Vec::new();
        let mut skipped = 0usize;

        for (idx, raw) in text.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            match line.parse::<BootstrapNode>() {
                Ok(node) => nodes.push(node),
                Err(e) => {
                    skipped += 1;
                    warn!(line = idx + 1, %e, "skipping malformed bootstrap entry");
                }
            }
        }

        if nodes.is_empty() {
            return Err(OverlinkError::BootstrapError {
                reason: format!("no usable bootstrap nodes ({skipped} malformed entries)"),
            });
        }
        Ok(Self { nodes, skipped })
    }

    /// Reads and parses a node list file.
    ///
    /// # Errors
    ///
    /// Returns [`OverlinkError::StorageError`] if the file cannot be
    /// read, or [`OverlinkError::BootstrapError`] if it yields no
    /// usable node.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| OverlinkError::StorageError {
            reason: format!("failed to read bootstrap node list: {e}"),
        })?;
        Self::parse(&text)
    }

    /// Builds a list from already-parsed nodes.
    ///
    /// # Errors
    ///
    /// Returns [`OverlinkError::BootstrapError`] if `nodes` is empty.
    pub fn from_nodes(nodes: Vec<BootstrapNode>) -> Result<Self> {
        if nodes.is_empty() {
            return Err(OverlinkError::BootstrapError {
                reason: "no bootstrap nodes configured".to_string(),
            });
        }
        Ok(Self { nodes, skipped: 0 })
    }

    /// Appends extra nodes, such as entries given on the command line.
    pub fn merge(mut self, extra: Vec<BootstrapNode>) -> Self {
        self.nodes.extend(extra);
        self
    }

    /// The usable nodes, in list order.
    pub fn nodes(&self) -> &[BootstrapNode] {
        &self.nodes
    }

    /// Number of usable nodes.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Always false: construction guarantees at least one node.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Number of malformed lines skipped while parsing.
    pub fn skipped(&self) -> usize {
        self.skipped
    }
}

// ---------------------------------------------------------------------------
// Connection
// ---------------------------------------------------------------------------

/// Tries to bootstrap through every node in the list.
///
/// Individual failures are tolerated and logged; the return value is
/// the number of nodes that accepted. Zero successes is not an error
/// here — the engine keeps retrying while it is offline.
pub fn connect_all<O: Overlay>(overlay: &mut O, list: &BootstrapList) -> usize {
    let mut connected = 0usize;
    for node in list.nodes() {
        match overlay.bootstrap(node) {
            Ok(()) => {
                connected += 1;
                info!(node = %node, "bootstrap succeeded");
            }
            Err(e) => warn!(node = %node, %e, "bootstrap failed"),
        }
    }
    if connected == 0 {
        warn!(total = list.len(), "all bootstrap attempts failed; will retry while offline");
    }
    connected
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
