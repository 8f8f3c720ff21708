//! The Follower role (spec §4.4, component C4): applies leader data to the
//! local archive, acknowledges positions, and detects leader timeout.

use std::time::Instant;

use rand::Rng;

use crate::agent::Transition;
use crate::control::ControlMessage;
use crate::ids::{NodeId, SessionId};
use crate::shared::Shared;
use crate::transport::FragmentAction;

/// Transient, per-incumbency state. Dropped on every role transition;
/// `TermState` (owned by [`Shared`]) is what survives.
pub struct Follower {
    latest_next_receive_time: Instant,
    received_heartbeat: bool,
}

impl Follower {
    /// Enters the follower role. The first timeout fires after a
    /// randomised `[timeout_interval, 2*timeout_interval)` delay to avoid
    /// synchronised elections across the cluster (spec §4.7).
    pub fn enter(shared: &Shared, now: Instant) -> Follower {
        let timeout = random_timeout(shared.config.timeout_interval);
        Follower {
            latest_next_receive_time: now + timeout,
            received_heartbeat: false,
        }
    }

    pub fn poll(&mut self, shared: &mut Shared, now: Instant) -> Transition {
        let fragment_limit = shared.config.fragment_limit;
        let mut transition = Transition::Stay;

        // Control frames are decoded into a buffer first: the
        // `Subscription::poll` callback only borrows `shared.control_sub`,
        // and handling a message needs the rest of `shared` plus `self`.
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
            transition = self.dispatch(shared, msg, now);
        }

        let mut data_fragments: Vec<Vec<u8>> = Vec::new();
        shared.data_sub.poll(
            &mut |bytes| {
                data_fragments.push(bytes.to_vec());
                FragmentAction::Continue
            },
            fragment_limit,
        );
        for bytes in data_fragments {
            shared.session.on_data(&bytes);
            let end_position = shared.term.position + bytes.len() as i64;
            shared.archiver.append(end_position, &bytes);
            shared.term.receive(end_position);
            let ack = ControlMessage::Ack {
                term: shared.term.term,
                follower_id: shared.id,
                position: end_position,
            };
            shared.send_control(&ack);
            self.extend_timeout(shared, now);
        }

        if self.received_heartbeat {
            self.extend_timeout(shared, now);
            self.received_heartbeat = false;
        }

        if transition == Transition::Stay && now > self.latest_next_receive_time {
            debug!(shared.log, "leader heartbeat timed out, seeking election");
            return Transition::ToCandidate;
        }

        transition
    }

    fn extend_timeout(&mut self, shared: &Shared, now: Instant) {
        self.latest_next_receive_time = now + random_timeout(shared.config.timeout_interval);
    }

    fn dispatch(&mut self, shared: &mut Shared, msg: ControlMessage, _now: Instant) -> Transition {
        match msg {
            ControlMessage::Heartbeat {
                term,
                leader_id: _,
                session_id,
                position,
            } => {
                self.on_heartbeat(shared, term, session_id, position);
                Transition::Stay
            }
            ControlMessage::RequestVote {
                term,
                candidate_id,
                last_position,
            } => {
                self.on_request_vote(shared, term, candidate_id, last_position);
                Transition::Stay
            }
            _ => Transition::Stay,
        }
    }

    /// spec §4.4: drop if stale; otherwise adopt the leader, mark
    /// liveness, and request a resend if we are missing data.
    fn on_heartbeat(&mut self, shared: &mut Shared, term: i32, session_id: SessionId, position: i64) {
        use crate::term::TermObservation;
        match shared.term.observe_term(term) {
            TermObservation::Stale => return,
            TermObservation::Same | TermObservation::TermAdvanced => {}
        }
        shared.term.leader_session_id = Some(session_id);
        self.received_heartbeat = true;

        if position > shared.term.position + shared.config.resend_gap_threshold {
            let resend = ControlMessage::Resend {
                term: shared.term.term,
                leader_id: shared.id,
                start_position: shared.term.position,
                length: (position - shared.term.position) as i32,
            };
            shared.send_control(&resend);
        }
    }

    /// spec §4.4: grant iff the candidate's term is at least as new, its
    /// log is at least as far along as ours, and we have not already
    /// voted for someone else this term.
    fn on_request_vote(&mut self, shared: &mut Shared, term: i32, candidate_id: NodeId, last_position: i64) {
        use crate::term::TermObservation;
        let observation = shared.term.observe_term(term);
        if observation == TermObservation::Stale {
            let reply = ControlMessage::ReplyVote {
                term: shared.term.term,
                candidate_id,
                voter_id: shared.id,
                granted: false,
            };
            shared.send_control(&reply);
            return;
        }

        let already_voted_other = match shared.term.voted_for {
            Some(v) => v != candidate_id,
            None => false,
        };
        let grant = last_position >= shared.term.position && !already_voted_other;

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
    }
}

/// Uniform jitter in `[base, 2*base)`, matching spec §4.7's
/// split-vote-avoidance requirement.
pub(crate) fn random_timeout(base: std::time::Duration) -> std::time::Duration {
    let mut rng = rand::thread_rng();
    let factor: f64 = rng.gen_range(1.0..2.0);
    base.mul_f64(factor)
}
