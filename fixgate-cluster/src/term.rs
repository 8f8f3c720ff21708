//! Shared, mutable per-node bookkeeping for the current Raft term
//! (spec §3, component C2).

use crate::ids::{NodeId, Position, SessionId, Term};

/// The result of observing a term carried on an inbound message, per
/// [`TermState::observe_term`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TermObservation {
    /// `new_term` was strictly greater; this node's term advanced and its
    /// vote/leader bookkeeping was reset.
    TermAdvanced,
    /// `new_term` equalled the current term.
    Same,
    /// `new_term` was older than the current term; the message is stale.
    Stale,
}

/// Bookkeeping that is shared across all three roles and survives role
/// transitions. Owned exclusively by [`crate::agent::ClusterAgent`];
/// borrowed mutably only by whichever role is currently active.
///
/// Invariants (spec §3):
/// - I1: `commit_position <= position`.
/// - I2: at most one vote is granted per term (`voted_for` enforces this).
/// - I3: `term` never decreases across the node's lifetime.
#[derive(Debug, Clone, Copy)]
pub struct TermState {
    pub term: Term,
    pub leader_session_id: Option<SessionId>,
    pub position: Position,
    pub commit_position: Position,
    pub voted_for: Option<NodeId>,
}

impl Default for TermState {
    fn default() -> Self {
        TermState {
            term: 0,
            leader_session_id: None,
            position: 0,
            commit_position: 0,
            voted_for: None,
        }
    }
}

impl TermState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reconciles an observed term against the current one. A strictly
    /// greater term always wins: it advances `term` and clears
    /// `voted_for`/`leader_session_id`, since both are only meaningful
    /// within the term they were set in.
    pub fn observe_term(&mut self, new_term: Term) -> TermObservation {
        if new_term > self.term {
            self.term = new_term;
            self.voted_for = None;
            self.leader_session_id = None;
            TermObservation::TermAdvanced
        } else if new_term == self.term {
            TermObservation::Same
        } else {
            TermObservation::Stale
        }
    }

    /// Records a newly received data position, maintaining I1.
    pub fn receive(&mut self, position: Position) {
        debug_assert!(position >= self.position);
        self.position = position;
    }

    /// Advances the committed position, maintaining I1. No-op if `position`
    /// does not exceed the current commit position (commit is monotone).
    pub fn advance_commit(&mut self, position: Position) {
        if position > self.commit_position {
            debug_assert!(position <= self.position);
            self.commit_position = position;
        }
    }
}
