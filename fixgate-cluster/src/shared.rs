//! State common to whichever role is currently active: the node's own
//! identity, `TermState`, its runtime configuration, the transport handles,
//! and the external collaborators it feeds (spec §3's "Ownership").

use slog::Logger;

use crate::archive::{ArchiveReader, Archiver};
use crate::config::ClusterConfig;
use crate::ids::NodeId;
use crate::session::SessionHandler;
use crate::term::TermState;
use crate::transport::{Publication, Subscription};

pub struct Shared {
    pub id: NodeId,
    pub log: Logger,
    pub term: TermState,
    pub config: ClusterConfig,
    pub control_pub: Box<dyn Publication>,
    pub control_sub: Box<dyn Subscription>,
    pub data_pub: Box<dyn Publication>,
    pub data_sub: Box<dyn Subscription>,
    pub session: Box<dyn SessionHandler>,
    pub archiver: Box<dyn Archiver>,
    pub archive_reader: Box<dyn ArchiveReader>,
    /// How much of the durable log has been written locally so far. Grows
    /// as the leader ingests fresh outbound application bytes via
    /// [`Shared::append_to_log`]; distinct from `term.position`, which only
    /// tracks what has actually been offered to followers.
    write_position: crate::ids::Position,
}

impl Shared {
    /// Builds a node's shared state. `write_position` always starts at
    /// zero; restoring it from a prior run is out of scope (spec §1 names
    /// "persistent vote durability across process restart" a non-goal, and
    /// the log write cursor follows the same policy).
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: NodeId,
        log: Logger,
        term: TermState,
        config: ClusterConfig,
        control_pub: Box<dyn Publication>,
        control_sub: Box<dyn Subscription>,
        data_pub: Box<dyn Publication>,
        data_sub: Box<dyn Subscription>,
        session: Box<dyn SessionHandler>,
        archiver: Box<dyn Archiver>,
        archive_reader: Box<dyn ArchiveReader>,
    ) -> Shared {
        Shared {
            id,
            log,
            term,
            config,
            control_pub,
            control_sub,
            data_pub,
            data_sub,
            session,
            archiver,
            archive_reader,
            write_position: 0,
        }
    }

    /// Sends a control message, logging (but not failing the poll) if the
    /// publication is back-pressured -- the caller decides whether the
    /// message needs to be retried.
    pub fn send_control(&mut self, msg: &crate::control::ControlMessage) -> crate::transport::OfferResult {
        self.control_pub.offer(&msg.encode())
    }

    /// Appends freshly produced application bytes to the durable log and
    /// returns the new write cursor. Only meaningful while this node is
    /// leader: it is how the out-of-scope FIX session layer (spec §1)
    /// originates data for `Leader::replicate` (spec §4.6 point 4) to
    /// discover and offer to followers.
    pub fn append_to_log(&mut self, bytes: &[u8]) -> crate::ids::Position {
        self.write_position += bytes.len() as crate::ids::Position;
        self.archiver.append(self.write_position, bytes);
        self.write_position
    }

    /// `true` once any of the four transport handles has permanently
    /// closed (spec §7's `TransportUnavailable`: "the underlying media
    /// driver gone", fatal to the node).
    pub fn transport_closed(&self) -> bool {
        self.control_pub.is_closed() || self.control_sub.is_closed() || self.data_pub.is_closed() || self.data_sub.is_closed()
    }
}
