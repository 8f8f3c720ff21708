//! Identifiers shared by every wire message and role (spec §3).

use std::net::SocketAddr;

/// Uniquely identifies a cluster member. Small and positive by convention.
pub type NodeId = i16;

/// Raft's logical clock of leadership attempts. Monotonically increasing.
pub type Term = i32;

/// A byte offset into the leader's logical log; the unit of
/// acknowledgement and commit.
pub type Position = i64;

/// Identifies a publication/subscription session on the transport.
pub type SessionId = i32;

/// A cluster member as known to every other member: its id and the
/// address its control/data publications are reachable on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Node {
    pub id: NodeId,
    pub addr: SocketAddr,
}
