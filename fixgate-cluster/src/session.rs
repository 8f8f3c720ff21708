//! The FIX session state machine is out of scope (spec §1); the cluster
//! only needs the narrow interface it presents: a place to hand replicated
//! bytes to.

/// Fed raw byte slices as they are received from the leader's data
/// stream. The session layer (logon/logout/resend/heartbeat handling) is
/// an opaque collaborator from the cluster's point of view.
pub trait SessionHandler: Send {
    fn on_data(&mut self, bytes: &[u8]);
}

/// A [`SessionHandler`] that discards everything; useful for tests and for
/// a node that only participates in replication without hosting sessions.
pub struct NullSessionHandler;

impl SessionHandler for NullSessionHandler {
    fn on_data(&mut self, _bytes: &[u8]) {}
}
