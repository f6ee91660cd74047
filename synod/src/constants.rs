//! Fixed protocol parameters. Every peer in a game must agree on these,
//! so none of them are negotiated at runtime.

use std::time::Duration;

/// Number of peers in a game, including the coordinator.
pub const PEERS: usize = 4;

/// Smallest number of acceptors whose agreement decides an instance.
pub const QUORUM: usize = PEERS / 2 + 1;

/// Well-known rendezvous port of the coordinator. Peer `k` listens on `PORT + k`.
pub const PORT: u16 = 2620;

/// Rendezvous protocol version carried in the join roster.
pub const PROTO_VERSION: u32 = 1;

/// Default period between leader heartbeats.
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_millis(100);

/// Missed heartbeats after which a leader is presumed dead.
pub const LEADER_TIMEOUT_FACTOR: u32 = 3;

/// Heartbeat intervals after which an unanswered proposal is restarted.
pub const PROPOSAL_TIMEOUT_FACTOR: u32 = 5;

/// Wake-up period of the consensus loop when no message is ready.
pub const TICK: Duration = Duration::from_millis(10);

/// Default bound on the whole rendezvous.
pub const SETUP_TIMEOUT: Duration = Duration::from_secs(30);

/// Pause between attempts to reach a peer whose listener is not up yet.
pub const CONNECT_RETRY: Duration = Duration::from_millis(50);

/// Most entries carried by a single instance.
pub const MAX_BATCH: usize = 64;

/// Width of the big-endian frame length header, in bytes.
pub const LENGTH_FIELD: usize = 8;

/// Largest frame accepted from a peer.
pub const MAX_FRAME: usize = 16 * 1024 * 1024;

/// Capacity of the in-memory self-connection.
pub const LOOPBACK_BUFFER: usize = 64 * 1024;
