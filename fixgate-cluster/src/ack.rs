//! Leader-only bookkeeping: how far each follower has acknowledged, and
//! how that maps to a committed position (spec §3, §4.6).

use std::collections::HashMap;

use crate::ids::{NodeId, Position};

/// `NodeId -> Position`, the highest position each follower has
/// acknowledged. Cleared whenever the Leader role becomes current.
#[derive(Debug, Default, Clone)]
pub struct PeerAck {
    acked: HashMap<NodeId, Position>,
}

impl PeerAck {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `pos` for `follower_id`, keeping the maximum ever observed
    /// (acks may arrive out of order; positions never regress).
    pub fn record(&mut self, follower_id: NodeId, pos: Position) {
        let entry = self.acked.entry(follower_id).or_insert(0);
        if pos > *entry {
            *entry = pos;
        }
    }

    pub fn get(&self, follower_id: NodeId) -> Position {
        self.acked.get(&follower_id).copied().unwrap_or(0)
    }

    pub fn clear(&mut self) {
        self.acked.clear();
    }

    pub fn values(&self) -> impl Iterator<Item = Position> + '_ {
        self.acked.values().copied()
    }
}

/// A pluggable function from the leader's view of follower progress to a
/// committed position. Must be monotone non-decreasing across calls for a
/// fixed (or growing) set of inputs -- callers rely on `commit_position`
/// never regressing.
pub trait AcknowledgementStrategy: Send {
    fn quorum(&self, self_position: Position, acks: &PeerAck) -> Position;
}

/// The default strategy: the k-th highest acknowledged position, where
/// k = ceil(cluster_size / 2), the leader's own position counted as one
/// of the inputs.
pub struct QuorumStrategy {
    pub cluster_size: usize,
}

impl AcknowledgementStrategy for QuorumStrategy {
    fn quorum(&self, self_position: Position, acks: &PeerAck) -> Position {
        // Pad to `cluster_size` entries so a follower that has not acked
        // at all counts as acknowledging position 0, rather than being
        // missing from the list entirely -- otherwise, with few enough
        // real acks, the index below could land on a known (nonzero)
        // position when it should land on an implicit zero.
        let mut positions: Vec<Position> = acks.values().collect();
        positions.push(self_position);
        positions.resize(self.cluster_size.max(positions.len()), 0);
        positions.sort_unstable_by(|a, b| b.cmp(a));

        let k = (self.cluster_size + 1) / 2;
        let idx = k.saturating_sub(1);
        positions.get(idx).copied().unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quorum_is_the_kth_highest() {
        // Three-node cluster: self + two followers. Leader publishes up to
        // 30, followers ack 10 and 20 -- spec §8 scenario 4: commit
        // advances to 20, the quorum of two, not 30.
        let mut acks = PeerAck::new();
        acks.record(2, 10);
        acks.record(3, 20);
        let strategy = QuorumStrategy { cluster_size: 3 };
        assert_eq!(strategy.quorum(30, &acks), 20);
    }

    #[test]
    fn ack_never_regresses() {
        let mut acks = PeerAck::new();
        acks.record(2, 20);
        acks.record(2, 10);
        assert_eq!(acks.get(2), 20);
    }

    #[test]
    fn clear_resets_on_new_leadership() {
        let mut acks = PeerAck::new();
        acks.record(2, 20);
        acks.clear();
        assert_eq!(acks.get(2), 0);
    }
}
