//! The cluster agent (spec §4.7, component C7): owns [`Shared`] state and
//! whichever [`Role`] is currently active, and drives the role transitions
//! each `poll` can produce.

use std::time::Instant;

use fixgate_core::error::{GatewayError, Result};

use crate::candidate::Candidate;
use crate::follower::Follower;
use crate::leader::Leader;
use crate::shared::Shared;

/// What a role's `poll` wants to happen next. `Stay` is by far the most
/// common outcome; the other three each correspond to an edge in spec
/// §4.7's state diagram.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Stay,
    ToFollower,
    ToCandidate,
    ToLeader,
}

/// The currently active role. Each variant owns only the state that does
/// not survive a transition; [`TermState`](crate::term::TermState), owned
/// by `Shared`, is what does.
pub enum Role {
    Follower(Follower),
    Candidate(Candidate),
    Leader(Leader),
}

impl Role {
    fn poll(&mut self, shared: &mut Shared, now: Instant) -> Transition {
        match self {
            Role::Follower(f) => f.poll(shared, now),
            Role::Candidate(c) => c.poll(shared, now),
            Role::Leader(l) => l.poll(shared, now),
        }
    }
}

/// A single cluster node: its shared state plus its current role. `poll`
/// is the entire public surface -- call it from a tight, non-blocking loop
/// (spec §5) paired with an [`IdleStrategy`](crate::idle::IdleStrategy).
pub struct ClusterAgent {
    pub shared: Shared,
    role: Role,
}

impl ClusterAgent {
    /// A freshly started node always begins as a Follower (spec §4.7).
    pub fn new(shared: Shared, now: Instant) -> ClusterAgent {
        let role = Role::Follower(Follower::enter(&shared, now));
        ClusterAgent { shared, role }
    }

    /// Advances the active role by one poll, applying a transition if one
    /// is produced. Returns whether any transition occurred, which callers
    /// can use as the `work_done` signal for their `IdleStrategy`.
    ///
    /// Per spec §7, only `TransportUnavailable` (and, at construction time,
    /// `ConfigInvalid`) ever propagates out of the polling loop; every
    /// other error kind is handled inside the role and never reaches here.
    /// A closed transport handle is checked before touching the role at
    /// all, since nothing the role itself does can recover from it.
    pub fn poll(&mut self, now: Instant) -> Result<bool> {
        if self.shared.transport_closed() {
            return Err(GatewayError::TransportUnavailable(format!(
                "node {} lost its control or data channel",
                self.shared.id
            )));
        }

        let transition = self.role.poll(&mut self.shared, now);
        let transitioned = match transition {
            Transition::Stay => false,
            Transition::ToFollower => {
                self.role = Role::Follower(Follower::enter(&self.shared, now));
                true
            }
            Transition::ToCandidate => {
                self.role = Role::Candidate(Candidate::enter(&mut self.shared, now));
                true
            }
            Transition::ToLeader => {
                self.role = Role::Leader(Leader::enter(&mut self.shared, now));
                true
            }
        };
        Ok(transitioned)
    }

    /// `true` iff this node currently believes it is the leader. Intended
    /// for the library↔engine redirect logic (spec §4.8): a library
    /// connected to a non-leader engine is told who to try instead.
    pub fn is_leader(&self) -> bool {
        matches!(self.role, Role::Leader(_))
    }

    /// Submits freshly produced outbound application bytes (from the
    /// out-of-scope FIX session layer, spec §1) for replication. Only
    /// meaningful while this node is leader -- `Leader::poll` (spec §4.6
    /// point 4) tails the durable log this appends to and offers new bytes
    /// to followers on its own cadence. Returns `None` on a non-leader
    /// node, since only the leader originates new log entries.
    pub fn submit(&mut self, bytes: &[u8]) -> Option<crate::ids::Position> {
        if !self.is_leader() {
            return None;
        }
        Some(self.shared.append_to_log(bytes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::test_shared;

    #[test]
    fn starts_as_follower() {
        let shared = test_shared(1);
        let agent = ClusterAgent::new(shared, Instant::now());
        assert!(!agent.is_leader());
    }

    #[test]
    fn timeout_promotes_to_candidate() {
        use std::time::Duration;
        let mut shared = test_shared(1);
        shared.config.timeout_interval = Duration::from_millis(1);
        let start = Instant::now() - Duration::from_millis(10);
        let mut agent = ClusterAgent::new(shared, start);

        let now = Instant::now();
        assert!(agent.poll(now).unwrap());
        assert!(matches!(agent.role, Role::Candidate(_)));
        assert!(!agent.is_leader());
    }

    #[test]
    fn closed_transport_surfaces_as_fatal_error() {
        use crate::transport::channel::channel_pair;
        let mut shared = test_shared(1);
        let (control_pub, control_sub) = channel_pair(1);
        drop(control_sub);
        shared.control_pub = Box::new(control_pub);
        let mut agent = ClusterAgent::new(shared, Instant::now());
        let err = agent.poll(Instant::now()).unwrap_err();
        assert!(matches!(err, fixgate_core::error::GatewayError::TransportUnavailable(_)));
    }
}
