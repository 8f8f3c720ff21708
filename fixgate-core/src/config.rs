//! TOML configuration loading for both engine and library processes.

use std::net::SocketAddr;

use serde::{Deserialize, Serialize};

use crate::error::{GatewayError, Result};

/// A cluster peer as it appears in configuration, before it is resolved
/// into a live transport handle.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct NodeConfig {
    pub id: u32,
    pub addr: SocketAddr,
}

/// Selects how a leader derives `commit_position` from `PeerAck`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum QuorumStrategyKind {
    /// The default: the k-th highest acked position, k = ceil(N/2).
    Majority,
}

impl Default for QuorumStrategyKind {
    fn default() -> Self {
        QuorumStrategyKind::Majority
    }
}

/// Configuration for an engine process (a cluster node).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    pub node_id: u32,
    pub nodes: Vec<NodeConfig>,
    #[serde(default = "default_timeout_interval_ms")]
    pub timeout_interval_ms: u64,
    #[serde(default = "default_fragment_limit")]
    pub fragment_limit: usize,
    #[serde(default)]
    pub quorum_strategy: QuorumStrategyKind,
}

/// Configuration for a library process (a FIX session host).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LibraryConfig {
    pub library_id: u32,
    pub engine_channels: Vec<SocketAddr>,
    #[serde(default = "default_reply_timeout_ms")]
    pub reply_timeout_ms: u64,
    #[serde(default = "default_reconnect_attempts")]
    pub reconnect_attempts: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    pub engine: Option<EngineConfig>,
    pub library: Option<LibraryConfig>,
}

fn default_timeout_interval_ms() -> u64 {
    150
}

fn default_fragment_limit() -> usize {
    16
}

fn default_reply_timeout_ms() -> u64 {
    1_000
}

fn default_reconnect_attempts() -> u32 {
    3
}

impl GatewayConfig {
    /// Loads configuration from `path` (TOML). Missing mandatory fields
    /// for the requested role surface as `GatewayError::ConfigInvalid`.
    pub fn from_file(path: &str) -> Result<GatewayConfig> {
        let mut settings = config::Config::default();
        settings
            .merge(config::File::with_name(path))
            .map_err(|e| GatewayError::ConfigInvalid(e.to_string()))?;
        settings
            .try_into()
            .map_err(|e| GatewayError::ConfigInvalid(e.to_string()))
    }

    pub fn engine(&self) -> Result<&EngineConfig> {
        self.engine
            .as_ref()
            .ok_or_else(|| GatewayError::ConfigInvalid("missing [engine] section".into()))
    }

    pub fn library(&self) -> Result<&LibraryConfig> {
        self.library
            .as_ref()
            .ok_or_else(|| GatewayError::ConfigInvalid("missing [library] section".into()))
    }
}
