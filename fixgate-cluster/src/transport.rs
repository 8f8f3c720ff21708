//! The transport contract the core assumes is present (spec §6) plus a
//! channel-backed reference implementation used by tests and the
//! single-process demo harness.
//!
//! The real substrate -- reliable multicast publications/subscriptions
//! with loss recovery and flow control -- is an external collaborator; only
//! the interface it presents to the cluster agent is specified here.

use crate::ids::{Position, SessionId};

/// The result of a non-blocking `offer`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OfferResult {
    /// Enqueued successfully; the position the message now occupies.
    Position(Position),
    /// The publication could not enqueue the message right now.
    BackPressured,
    /// The underlying session has closed; this publication will never
    /// succeed again (spec §7's `TransportUnavailable`, fatal to the node).
    Closed,
}

/// A fragment handler's per-fragment acknowledgement, matching Aeron's
/// `ControlledFragmentHandler.Action`. Returning `Abort` guarantees the
/// fragment is re-delivered on the next `poll`, which is how back-pressure
/// from the session layer is implemented.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FragmentAction {
    Continue,
    Abort,
}

/// A non-blocking outbound channel to one or more peers.
pub trait Publication: Send {
    fn offer(&mut self, bytes: &[u8]) -> OfferResult;
    fn session_id(&self) -> SessionId;
    /// `true` once this publication's session has closed and every future
    /// `offer` will return [`OfferResult::Closed`]. Defaults to `false` for
    /// implementations that never close (spec §7's `TransportUnavailable`
    /// is otherwise unreachable).
    fn is_closed(&self) -> bool {
        false
    }
}

/// A non-blocking inbound channel. `poll` delivers at most `fragment_limit`
/// fragments to `handler` and returns how many were delivered.
pub trait Subscription: Send {
    fn poll(&mut self, handler: &mut dyn FnMut(&[u8]) -> FragmentAction, fragment_limit: usize) -> usize;
    /// `true` once this subscription's session has closed and no further
    /// fragments will ever be delivered.
    fn is_closed(&self) -> bool {
        false
    }
}

/// An in-process, unbounded channel [`Publication`]/[`Subscription`] pair.
/// Stands in for the shared-memory/UDP substrate in tests and the
/// single-process demo harness; every `offer` succeeds while the peer end
/// is alive (the channel is unbounded, so `BackPressured` is never observed
/// on this transport) but surfaces [`OfferResult::Closed`] once it is
/// dropped, so `GatewayError::TransportUnavailable` has a real path to the
/// agent instead of being unreachable on every transport.
pub mod channel {
    use super::*;
    use tokio::sync::mpsc::error::TryRecvError;
    use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};

    pub struct ChannelPublication {
        tx: UnboundedSender<Vec<u8>>,
        session_id: SessionId,
        next_position: Position,
    }

    impl Publication for ChannelPublication {
        fn offer(&mut self, bytes: &[u8]) -> OfferResult {
            self.next_position += bytes.len() as Position;
            match self.tx.send(bytes.to_vec()) {
                Ok(()) => OfferResult::Position(self.next_position),
                Err(_) => OfferResult::Closed,
            }
        }

        fn session_id(&self) -> SessionId {
            self.session_id
        }

        fn is_closed(&self) -> bool {
            self.tx.is_closed()
        }
    }

    pub struct ChannelSubscription {
        rx: UnboundedReceiver<Vec<u8>>,
        // Holds a fragment the handler returned `Abort` for, so the next
        // `poll` redelivers it rather than dropping it -- this is how
        // back-pressure from the session layer is honoured on this
        // transport (spec §6).
        pending: Option<Vec<u8>>,
        closed: bool,
    }

    impl Subscription for ChannelSubscription {
        fn poll(&mut self, handler: &mut dyn FnMut(&[u8]) -> FragmentAction, fragment_limit: usize) -> usize {
            let mut delivered = 0;
            while delivered < fragment_limit {
                let bytes = match self.pending.take() {
                    Some(bytes) => bytes,
                    None => match self.rx.try_recv() {
                        Ok(bytes) => bytes,
                        Err(TryRecvError::Disconnected) => {
                            self.closed = true;
                            break;
                        }
                        Err(TryRecvError::Empty) => break,
                    },
                };
                if handler(&bytes) == FragmentAction::Abort {
                    self.pending = Some(bytes);
                    break;
                }
                delivered += 1;
            }
            delivered
        }

        fn is_closed(&self) -> bool {
            self.closed
        }
    }

    /// Builds a connected publication/subscription pair identified by
    /// `session_id`.
    pub fn channel_pair(session_id: SessionId) -> (ChannelPublication, ChannelSubscription) {
        let (tx, rx) = unbounded_channel();
        (
            ChannelPublication {
                tx,
                session_id,
                next_position: 0,
            },
            ChannelSubscription {
                rx,
                pending: None,
                closed: false,
            },
        )
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn dropped_peer_surfaces_closed_on_both_ends() {
            let (mut publication, subscription) = channel_pair(1);
            drop(subscription);
            assert_eq!(publication.offer(b"data"), OfferResult::Closed);
            assert!(publication.is_closed());
        }

        #[test]
        fn dropped_publication_surfaces_closed_on_subscription() {
            let (publication, mut subscription) = channel_pair(1);
            drop(publication);
            let delivered = subscription.poll(&mut |_| FragmentAction::Continue, 4);
            assert_eq!(delivered, 0);
            assert!(subscription.is_closed());
        }
    }
}
