//! Thin process wiring: reads the `GatewayConfig` and starts either an
//! engine (`ClusterAgent`) or a library (`LibraryPoller`) polling loop.
//!
//! The real transport (reliable multicast publications/subscriptions) is
//! an external collaborator (spec §6); this binary wires the channel-backed
//! reference transport from `fixgate_cluster::transport::channel`, which is
//! what the single-process demo harness and the test suite both use.

#[macro_use]
extern crate slog;

use std::time::{Duration, Instant};

use fixgate_cluster::agent::ClusterAgent;
use fixgate_cluster::archive::SharedMemoryArchive;
use fixgate_cluster::config::ClusterConfig;
use fixgate_cluster::idle::{IdleStrategy, SpinYieldBackoffIdleStrategy};
use fixgate_cluster::session::NullSessionHandler;
use fixgate_cluster::shared::Shared;
use fixgate_cluster::transport::channel::channel_pair;
use fixgate_core::config::GatewayConfig;
use fixgate_core::error::{GatewayError, Result};
use fixgate_library::LibraryPoller;

/// Which side of the gateway this process runs as (spec's CLI section).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Engine,
    Library,
}

impl std::str::FromStr for Role {
    type Err = GatewayError;

    fn from_str(s: &str) -> Result<Role> {
        match s {
            "engine" => Ok(Role::Engine),
            "library" => Ok(Role::Library),
            other => Err(GatewayError::ConfigInvalid(format!("unknown role '{other}', expected engine or library"))),
        }
    }
}

pub async fn fixgate(config_path: &str, role: Role) -> Result<()> {
    let config = GatewayConfig::from_file(config_path)?;
    let log = fixgate_core::logger::get_root_logger();

    match role {
        Role::Engine => run_engine(&config, log).await,
        Role::Library => run_library(&config, log).await,
    }
}

/// Runs the single-threaded cooperative polling loop for an engine node
/// (spec §5). Without a configured multicast media driver, peers are
/// wired to a self-loopback channel transport, matching the in-process
/// demo harness noted in the workspace shape.
async fn run_engine(config: &GatewayConfig, log: slog::Logger) -> Result<()> {
    let engine = config.engine()?;
    info!(log, "starting engine"; "node_id" => engine.node_id);

    let (control_pub, control_sub) = channel_pair(engine.node_id as i32);
    let (data_pub, data_sub) = channel_pair(engine.node_id as i32);

    let cluster_config = ClusterConfig::new(
        engine.node_id as i16,
        Vec::new(),
        Duration::from_millis(engine.timeout_interval_ms),
        engine.fragment_limit,
    );

    let (archiver, archive_reader) = SharedMemoryArchive::new().split();
    let shared = Shared::new(
        engine.node_id as i16,
        log.clone(),
        fixgate_cluster::term::TermState::new(),
        cluster_config,
        Box::new(control_pub),
        Box::new(control_sub),
        Box::new(data_pub),
        Box::new(data_sub),
        Box::new(NullSessionHandler),
        archiver,
        archive_reader,
    );

    let mut agent = ClusterAgent::new(shared, Instant::now());
    let mut idle = SpinYieldBackoffIdleStrategy::default();
    loop {
        // `TransportUnavailable` is the one recoverable-looking error that
        // is actually fatal (spec §7): the media driver is gone, so the
        // node closes rather than retrying.
        let work_done = agent.poll(Instant::now())?;
        idle.idle(work_done);
    }
}

/// Runs the library's connect loop against its configured engine channels
/// (spec §4.8). As with the engine side, the real multicast transport is
/// external; this wires the same channel-backed reference implementation.
async fn run_library(config: &GatewayConfig, log: slog::Logger) -> Result<()> {
    let library = config.library()?;
    info!(log, "starting library"; "library_id" => library.library_id);

    let mut publications: Vec<Box<dyn fixgate_cluster::transport::Publication>> = Vec::new();
    let mut subscriptions: Vec<Box<dyn fixgate_cluster::transport::Subscription>> = Vec::new();
    for (i, _addr) in library.engine_channels.iter().enumerate() {
        let (p, s) = channel_pair(i as i32);
        publications.push(Box::new(p));
        subscriptions.push(Box::new(s));
    }
    if publications.is_empty() {
        return Err(GatewayError::ConfigInvalid("library has no configured engine channels".into()));
    }

    let mut poller = LibraryPoller::new(
        library.library_id,
        publications,
        subscriptions,
        library.engine_channels.clone(),
        Duration::from_millis(library.reply_timeout_ms),
        library.reconnect_attempts,
        log,
    );
    let mut idle = SpinYieldBackoffIdleStrategy::default();
    loop {
        let now = Instant::now();
        let connected = poller.poll_connect(now);
        let outcomes = poller.poll(16, now);
        idle.idle(connected || !outcomes.is_empty());
    }
}
