//! The Candidate role (spec §4.5, component C5): seeks election on entry
//! and on every subsequent election timeout, counting granted votes until
//! a quorum is reached or a legitimate leader reappears.

use std::collections::HashSet;
use std::time::Instant;

use crate::agent::Transition;
use crate::control::ControlMessage;
use crate::follower::random_timeout;
use crate::ids::{NodeId, SessionId, Term};
use crate::shared::Shared;
use crate::term::TermObservation;
use crate::transport::FragmentAction;

pub struct Candidate {
    votes: HashSet<NodeId>,
    election_deadline: Instant,
}

impl Candidate {
    /// Enters the candidate role and immediately starts an election
    /// (spec §4.5's entry action).
    pub fn enter(shared: &mut Shared, now: Instant) -> Candidate {
        let mut candidate = Candidate {
            votes: HashSet::new(),
            election_deadline: now,
        };
        candidate.start_election(shared, now);
        candidate
    }

    fn start_election(&mut self, shared: &mut Shared, now: Instant) {
        shared.term.term += 1;
        shared.term.voted_for = Some(shared.id);
        self.votes.clear();
        self.votes.insert(shared.id);
        self.election_deadline = now + random_timeout(shared.config.timeout_interval);

        info!(shared.log, "seeking election"; "term" => shared.term.term);
        let request = ControlMessage::RequestVote {
            term: shared.term.term,
            candidate_id: shared.id,
            last_position: shared.term.position,
        };
        shared.send_control(&request);
    }

    pub fn poll(&mut self, shared: &mut Shared, now: Instant) -> Transition {
        let fragment_limit = shared.config.fragment_limit;
        let mut transition = Transition::Stay;

        let mut pending: Vec<ControlMessage> = Vec::new();
        let mut decode_errors: Vec<fixgate_core::error::GatewayError> = Vec::new();
        shared.control_sub.poll(
            &mut |bytes| {
                match ControlMessage::decode(bytes) {
                    Ok(msg) => pending.push(msg),
                    Err(e) => decode_errors.push(e),
                }
                FragmentAction::Continue
            },
            fragment_limit,
        );
        for e in decode_errors {
            warn!(shared.log, "dropping malformed control frame"; "error" => %e);
        }
        for msg in pending {
            if transition != Transition::Stay {
                break;
            }
            transition = self.dispatch(shared, msg);
        }

        if transition == Transition::Stay && now > self.election_deadline {
            debug!(shared.log, "election timed out without quorum, retrying");
            self.start_election(shared, now);
        }

        transition
    }

    fn dispatch(&mut self, shared: &mut Shared, msg: ControlMessage) -> Transition {
        match msg {
            ControlMessage::ReplyVote {
                term,
                candidate_id,
                voter_id,
                granted,
            } => self.on_reply_vote(shared, term, candidate_id, voter_id, granted),
            ControlMessage::Heartbeat {
                term,
                leader_id: _,
                session_id,
                position: _,
            } => self.on_heartbeat(shared, term, session_id),
            ControlMessage::RequestVote {
                term,
                candidate_id,
                last_position,
            } => self.on_request_vote(shared, term, candidate_id, last_position),
            _ => Transition::Stay,
        }
    }

    /// spec §4.5: only count replies addressed to this candidacy's own
    /// term; a quorum of grants wins the election.
    fn on_reply_vote(
        &mut self,
        shared: &mut Shared,
        term: Term,
        candidate_id: NodeId,
        voter_id: NodeId,
        granted: bool,
    ) -> Transition {
        if term != shared.term.term || candidate_id != shared.id {
            return Transition::Stay;
        }
        if granted {
            self.votes.insert(voter_id);
        }
        if self.votes.len() >= shared.config.election_quorum() {
            Transition::ToLeader
        } else {
            Transition::Stay
        }
    }

    /// spec §4.5: a heartbeat at or above our term means a leader already
    /// exists; step down.
    fn on_heartbeat(&mut self, shared: &mut Shared, term: Term, session_id: SessionId) -> Transition {
        if term < shared.term.term {
            return Transition::Stay;
        }
        shared.term.observe_term(term);
        shared.term.leader_session_id = Some(session_id);
        Transition::ToFollower
    }

    /// spec §4.5: reject while our own term is current or newer; otherwise
    /// the requester's term is newer than ours, so step down to follower
    /// first and let the vote be decided there.
    fn on_request_vote(
        &mut self,
        shared: &mut Shared,
        term: Term,
        candidate_id: NodeId,
        last_position: i64,
    ) -> Transition {
        if term <= shared.term.term {
            let reply = ControlMessage::ReplyVote {
                term: shared.term.term,
                candidate_id,
                voter_id: shared.id,
                granted: false,
            };
            shared.send_control(&reply);
            return Transition::Stay;
        }

        let observation = shared.term.observe_term(term);
        debug_assert_eq!(observation, TermObservation::TermAdvanced);
        let grant = last_position >= shared.term.position;
        if grant {
            shared.term.voted_for = Some(candidate_id);
        }
        let reply = ControlMessage::ReplyVote {
            term: shared.term.term,
            candidate_id,
            voter_id: shared.id,
            granted: grant,
        };
        shared.send_control(&reply);
        Transition::ToFollower
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::test_shared;

    #[test]
    fn votes_for_self_on_entry() {
        let mut shared = test_shared(1);
        let candidate = Candidate::enter(&mut shared, Instant::now());
        assert!(candidate.votes.contains(&1));
        assert_eq!(shared.term.term, 1);
        assert_eq!(shared.term.voted_for, Some(1));
    }

    #[test]
    fn quorum_of_replies_elects_leader() {
        let mut shared = test_shared(1);
        shared.config.cluster_size = 3;
        let mut candidate = Candidate::enter(&mut shared, Instant::now());
        let term = shared.term.term;
        // Self-vote already counts toward the tally, so in a 3-node
        // cluster (election_quorum == floor(3/2)+1 == 2) the first
        // granted reply is itself enough to reach quorum.
        let t1 = candidate.on_reply_vote(&mut shared, term, 1, 2, true);
        assert_eq!(t1, Transition::ToLeader);
    }

    #[test]
    fn reply_from_wrong_term_is_ignored() {
        let mut shared = test_shared(1);
        let mut candidate = Candidate::enter(&mut shared, Instant::now());
        let stale_term = shared.term.term - 1;
        let t = candidate.on_reply_vote(&mut shared, stale_term, 1, 2, true);
        assert_eq!(t, Transition::Stay);
        assert!(!candidate.votes.contains(&2));
    }

    #[test]
    fn heartbeat_at_or_above_term_steps_down() {
        let mut shared = test_shared(1);
        let mut candidate = Candidate::enter(&mut shared, Instant::now());
        let term = shared.term.term;
        let t = candidate.on_heartbeat(&mut shared, term, 42);
        assert_eq!(t, Transition::ToFollower);
        assert_eq!(shared.term.leader_session_id, Some(42));
    }
}
