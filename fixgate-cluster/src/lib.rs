//! The replicated cluster agent (spec §2, components C2-C7): a single
//! Raft-style Follower/Candidate/Leader state machine, the control-message
//! wire protocol that drives its transitions, and the transport/session/
//! archive traits it is built against.

#[macro_use]
extern crate slog;

pub mod ack;
pub mod agent;
pub mod archive;
pub mod candidate;
pub mod config;
pub mod control;
pub mod follower;
pub mod ids;
pub mod idle;
pub mod leader;
pub mod session;
pub mod shared;
pub mod term;
pub mod transport;

#[cfg(test)]
mod test_support;

pub use agent::{ClusterAgent, Role, Transition};
