//! Shared test fixtures for the role unit tests. Not part of the public
//! API; only compiled under `#[cfg(test)]`.

use std::time::Duration;

use crate::ack::QuorumStrategy;
use crate::archive::SharedMemoryArchive;
use crate::config::ClusterConfig;
use crate::ids::NodeId;
use crate::session::NullSessionHandler;
use crate::shared::Shared;
use crate::transport::channel::channel_pair;

/// A three-node cluster's worth of `Shared` for `id`, wired to in-process
/// channel transports and an in-memory archive.
pub fn test_shared(id: NodeId) -> Shared {
    let (control_pub, control_sub) = channel_pair(1);
    let (data_pub, data_sub) = channel_pair(2);
    let (archiver, archive_reader) = SharedMemoryArchive::new().split();
    Shared::new(
        id,
        fixgate_core::logger::get_root_logger(),
        crate::term::TermState::new(),
        ClusterConfig {
            peers: vec![],
            cluster_size: 3,
            timeout_interval: Duration::from_millis(100),
            fragment_limit: 16,
            quorum_strategy: Box::new(QuorumStrategy { cluster_size: 3 }),
            resend_gap_threshold: 4096,
        },
        Box::new(control_pub),
        Box::new(control_sub),
        Box::new(data_pub),
        Box::new(data_sub),
        Box::new(NullSessionHandler),
        archiver,
        archive_reader,
    )
}
