//! The gateway's error taxonomy (spec §7).
//!
//! Recoverable kinds (`Malformed`, `Stale`, `BackPressured`, `Timeout`,
//! `QuorumLost`) never escape a role's `poll` -- they are folded back into
//! state. Only `ConfigInvalid` and `TransportUnavailable` are fatal and
//! propagate to the caller.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum GatewayError {
    /// Unknown control tag, bad digit in the ASCII codec, or any other
    /// frame that failed to parse. Recovery: drop the fragment, continue.
    #[error("malformed frame: {0}")]
    Malformed(String),

    /// A control message carried a term older than this node's current
    /// term. Recovery: drop silently.
    #[error("stale message for term {0}, current term is {1}")]
    Stale(u64, u64),

    /// A publication could not enqueue the outbound message. Recovery:
    /// mark the request for resend on the next poll.
    #[error("publication back-pressured")]
    BackPressured,

    /// A leader heartbeat gap or a library reply deadline elapsed.
    /// Recovery: transition role, or fail the pending reply.
    #[error("timeout waiting for {0}")]
    Timeout(String),

    /// The leader cannot reach a quorum of acknowledgements. The leader
    /// remains leader; `commit_position` simply stalls. No data is lost.
    #[error("quorum lost: only {acked} of {needed} peers acknowledging")]
    QuorumLost { acked: usize, needed: usize },

    /// Missing or invalid mandatory configuration. Fatal at startup.
    #[error("invalid configuration: {0}")]
    ConfigInvalid(String),

    /// The underlying media driver / transport is gone. Fatal; the node
    /// closes.
    #[error("transport unavailable: {0}")]
    TransportUnavailable(String),
}

pub type Result<T> = std::result::Result<T, GatewayError>;
