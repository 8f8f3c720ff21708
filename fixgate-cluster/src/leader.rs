//! The Leader role (spec §4.6, component C6): the only role that accepts
//! data from the session layer, replicates it to followers, and advances
//! the commit position once a quorum has acknowledged it.

use std::time::Instant;

use crate::ack::PeerAck;
use crate::agent::Transition;
use crate::control::ControlMessage;
use crate::ids::{NodeId, SessionId, Term};
use crate::shared::Shared;
use crate::transport::FragmentAction;

pub struct Leader {
    peer_ack: PeerAck,
    heartbeat_deadline: Instant,
    session_id: SessionId,
}

impl Leader {
    /// Enters the leader role: clears the previous incumbent's ack table
    /// and broadcasts an immediate heartbeat so followers don't time out
    /// waiting to learn who won the election (spec §4.6's entry action).
    pub fn enter(shared: &mut Shared, now: Instant) -> Leader {
        let session_id = shared.term.term as SessionId;
        shared.term.leader_session_id = Some(session_id);
        let mut leader = Leader {
            peer_ack: PeerAck::new(),
            heartbeat_deadline: now,
            session_id,
        };
        leader.send_heartbeat(shared, now);
        leader
    }

    fn send_heartbeat(&mut self, shared: &mut Shared, now: Instant) {
        let heartbeat = ControlMessage::Heartbeat {
            term: shared.term.term,
            leader_id: shared.id,
            session_id: self.session_id,
            position: shared.term.position,
        };
        shared.send_control(&heartbeat);
        self.heartbeat_deadline = now + shared.config.heartbeat_interval();
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

        if transition != Transition::Stay {
            return transition;
        }

        self.advance_commit(shared);
        self.replicate(shared);

        if now > self.heartbeat_deadline {
            self.send_heartbeat(shared, now);
        }

        Transition::Stay
    }

    fn dispatch(&mut self, shared: &mut Shared, msg: ControlMessage) -> Transition {
        match msg {
            ControlMessage::Ack {
                term,
                follower_id,
                position,
            } => {
                self.on_ack(shared, term, follower_id, position);
                Transition::Stay
            }
            ControlMessage::RequestVote {
                term,
                candidate_id,
                last_position,
            } => self.on_request_vote(shared, term, candidate_id, last_position),
            ControlMessage::Heartbeat {
                term,
                leader_id: _,
                session_id,
                position: _,
            } => self.on_heartbeat(shared, term, session_id),
            ControlMessage::Resend {
                term,
                leader_id: _,
                start_position,
                length,
            } => {
                self.on_resend(shared, term, start_position, length);
                Transition::Stay
            }
            _ => Transition::Stay,
        }
    }

    /// spec §4.6: stale acks (an earlier term) are dropped; otherwise the
    /// follower's position only ever moves forward in `PeerAck`.
    fn on_ack(&mut self, shared: &Shared, term: Term, follower_id: NodeId, position: i64) {
        if term < shared.term.term {
            return;
        }
        self.peer_ack.record(follower_id, position);
    }

    /// Re-publishes archived bytes the follower is missing, bounded to
    /// what it asked for.
    fn on_resend(&mut self, shared: &mut Shared, term: Term, start_position: i64, length: i32) {
        if term < shared.term.term {
            return;
        }
        let bytes = shared.archive_reader.read(start_position, length.max(0) as usize);
        if !bytes.is_empty() {
            shared.data_pub.offer(&bytes);
        }
    }

    /// spec §4.6: a higher term anywhere means a new leader may have
    /// already been elected; step down rather than contest it.
    fn on_heartbeat(&mut self, shared: &mut Shared, term: Term, session_id: SessionId) -> Transition {
        if term <= shared.term.term {
            return Transition::Stay;
        }
        shared.term.observe_term(term);
        shared.term.leader_session_id = Some(session_id);
        Transition::ToFollower
    }

    /// spec §4.6: a candidate with a newer term pre-empts us; grant or
    /// refuse per the usual rule and step down either way.
    fn on_request_vote(&mut self, shared: &mut Shared, term: Term, candidate_id: NodeId, last_position: i64) -> Transition {
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

        shared.term.observe_term(term);
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

    /// spec §4.6: the committed position is the quorum-strategy's view of
    /// self plus every follower's last ack.
    fn advance_commit(&mut self, shared: &mut Shared) {
        let quorum = shared.config.quorum_strategy.quorum(shared.term.position, &self.peer_ack);
        shared.term.advance_commit(quorum);
    }

    /// Reads new bytes from the archive up to `fragment_limit` worth of
    /// data and offers them on the data publication. The leader's own
    /// position is folded into quorum accounting by `QuorumStrategy::quorum`
    /// itself (it takes `self_position` as a dedicated argument), so it is
    /// not also recorded into `peer_ack` here -- `peer_ack` holds follower
    /// acks only, or the leader would count twice toward quorum.
    fn replicate(&mut self, shared: &mut Shared) {
        let chunk = shared
            .archive_reader
            .read(shared.term.position, shared.config.fragment_limit * 256);
        if chunk.is_empty() {
            return;
        }
        match shared.data_pub.offer(&chunk) {
            crate::transport::OfferResult::Position(pos) => {
                shared.term.receive(pos);
            }
            crate::transport::OfferResult::BackPressured => {}
            // A closed data publication is surfaced to the caller via
            // `Shared::transport_closed` at the top of the next poll, not
            // handled here -- replicate() has no way to make it fatal itself.
            crate::transport::OfferResult::Closed => {}
        }
    }
}
