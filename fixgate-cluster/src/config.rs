//! Runtime configuration for a single engine node, resolved from
//! [`fixgate_core::config::EngineConfig`] plus the node's own identity.

use std::time::Duration;

use crate::ack::{AcknowledgementStrategy, QuorumStrategy};
use crate::ids::{Node, NodeId, Position};

pub struct ClusterConfig {
    pub peers: Vec<Node>,
    pub cluster_size: usize,
    pub timeout_interval: Duration,
    pub fragment_limit: usize,
    pub quorum_strategy: Box<dyn AcknowledgementStrategy>,
    /// A heartbeat reporting a leader position more than this far ahead of
    /// what we have locally received triggers an (idempotent) `Resend`
    /// request (spec §4.4).
    pub resend_gap_threshold: Position,
}

impl ClusterConfig {
    pub fn new(self_id: NodeId, peers: Vec<Node>, timeout_interval: Duration, fragment_limit: usize) -> Self {
        let cluster_size = peers.len() + 1;
        let _ = self_id;
        ClusterConfig {
            peers,
            cluster_size,
            timeout_interval,
            fragment_limit,
            quorum_strategy: Box::new(QuorumStrategy { cluster_size }),
            resend_gap_threshold: 4096,
        }
    }

    /// Quorum required to win an election: the standard Raft majority,
    /// floor(N/2) + 1 of the cluster, counting self (see DESIGN.md's
    /// Open Questions: this is the literal majority needed for a
    /// surviving minority to still elect a leader, per spec §8 scenario 2,
    /// and is deliberately distinct from `QuorumStrategy`'s commit quorum).
    pub fn election_quorum(&self) -> usize {
        self.cluster_size / 2 + 1
    }

    /// Heartbeat cadence is timeout_interval / 5 (spec §4.6).
    pub fn heartbeat_interval(&self) -> Duration {
        self.timeout_interval / 5
    }
}
