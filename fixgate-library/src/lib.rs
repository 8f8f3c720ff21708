//! The library side of the library ⇄ engine reconnection protocol
//! (spec §4.8, component C8).

#[macro_use]
extern crate slog;

pub mod poller;
pub mod rpc;

pub use poller::{LibraryPoller, PollOutcome};
