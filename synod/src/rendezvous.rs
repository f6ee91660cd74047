//! # Summary
//!
//! One-time bootstrap that turns four independent processes into a full mesh.
//!
//! The coordinator (peer 0) listens on the well-known port and hands each
//! joining peer, in connection order, its identity and the addresses of the
//! peers that joined before it. Peer `k` then listens on `port + k`, accepts
//! connections from every higher peer and connects to every lower one,
//! announcing itself. Each process ends up with exactly one link per peer,
//! its own slot being an in-memory loopback.

use std::net::{IpAddr, SocketAddr};

use serde_derive::{Deserialize, Serialize};
use tokio::net::{TcpListener, TcpStream};

use crate::config::Config;
use crate::constants::{CONNECT_RETRY, PEERS, PROTO_VERSION};
use crate::error::{Error, Result};
use crate::socket::{self, Link};
use crate::state::PeerId;

/// Announce sent by a joining peer to each lower peer it connects to.
/// Also used for the roster entries.
#[derive(Serialize, Deserialize)]
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PeerAddress {
    pub player_no: PeerId,
    pub ip: String,
}

/// Sent by the coordinator to each joining peer.
#[derive(Serialize, Deserialize)]
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Roster {
    pub proto_version: u32,
    pub assigned_player_no: PeerId,
    pub peers: Vec<PeerAddress>,
}

impl Roster {
    /// Checks the roster against what the coordinator must have sent us.
    pub fn validate(&self) -> Result<()> {
        if self.proto_version != PROTO_VERSION {
            return Err(Error::Version(self.proto_version))
        }
        let id = self.assigned_player_no;
        if id == 0 || id >= PEERS {
            return Err(Error::Roster(format!("identity {} out of range", id)))
        }
        let expected = (1..id).collect::<Vec<_>>();
        let actual = self.peers.iter().map(|peer| peer.player_no).collect::<Vec<_>>();
        if expected != actual {
            return Err(Error::Roster(format!("expected peers {:?}, got {:?}", expected, actual)))
        }
        Ok(())
    }
}

/// Result of a successful rendezvous. `links` and `addresses` are indexed by peer.
#[derive(Debug)]
pub struct Mesh {
    pub id: PeerId,
    pub links: Vec<Link>,
    pub addresses: Vec<IpAddr>,
}

pub async fn rendezvous(config: &Config) -> Result<Mesh> {
    let setup = async {
        match config.coordinator {
        | None => coordinate(config).await,
        | Some(coordinator) => join(config, coordinator).await,
        }
    };
    tokio::time::timeout(config.timeout, setup)
        .await
        .map_err(|_| Error::Timeout)?
}

async fn coordinate(config: &Config) -> Result<Mesh> {
    let listener = TcpListener::bind((config.bind, config.port)).await?;
    info!("coordinating on {}", listener.local_addr()?);

    let mut links = vec![Link::loopback()];
    let mut addresses = vec![config.bind];
    let mut peers = Vec::new();

    for player_no in 1..PEERS {
        let (mut stream, addr) = listener.accept().await?;
        stream.set_nodelay(true)?;
        if player_no == 1 {
            addresses[0] = stream.local_addr()?.ip();
        }
        let roster = Roster {
            proto_version: PROTO_VERSION,
            assigned_player_no: player_no,
            peers: peers.clone(),
        };
        socket::write_json(&mut stream, &roster).await?;
        info!("assigned {} to {}", player_no, addr);

        peers.push(PeerAddress { player_no, ip: addr.ip().to_string() });
        addresses.push(addr.ip());
        links.push(Link::tcp(stream));
    }

    Ok(Mesh { id: 0, links, addresses })
}

async fn join(config: &Config, coordinator: IpAddr) -> Result<Mesh> {
    let mut stream = connect(SocketAddr::new(coordinator, config.port)).await?;
    let roster: Roster = socket::read_json(&mut stream).await?;
    roster.validate()?;

    let id = roster.assigned_player_no;
    let local = stream.local_addr()?.ip();
    let listener = TcpListener::bind((config.bind, listening_port(config.port, id)?)).await?;
    info!("joined as {}, listening on {}", id, listener.local_addr()?);

    let (higher, lower) = tokio::try_join!(
        accept_higher(&listener, id),
        connect_lower(&roster.peers, id, local, config.port),
    )?;

    let mut links = (0..PEERS).map(|_| None).collect::<Vec<Option<Link>>>();
    let mut addresses = vec![None; PEERS];
    links[0] = Some(Link::tcp(stream));
    addresses[0] = Some(coordinator);
    links[id] = Some(Link::loopback());
    addresses[id] = Some(local);
    for (peer, ip, link) in higher.into_iter().chain(lower) {
        links[peer] = Some(link);
        addresses[peer] = Some(ip);
    }

    let links = links.into_iter()
        .collect::<Option<Vec<_>>>()
        .ok_or_else(|| Error::Roster("incomplete mesh".to_string()))?;
    let addresses = addresses.into_iter()
        .collect::<Option<Vec<_>>>()
        .ok_or_else(|| Error::Roster("incomplete mesh".to_string()))?;

    Ok(Mesh { id, links, addresses })
}

/// Waits for every higher peer to connect and announce itself.
async fn accept_higher(listener: &TcpListener, id: PeerId) -> Result<Vec<(PeerId, IpAddr, Link)>> {
    let mut joined = Vec::new();
    while joined.len() < PEERS - 1 - id {
        let (mut stream, addr) = listener.accept().await?;
        stream.set_nodelay(true)?;
        let announce: PeerAddress = socket::read_json(&mut stream).await?;
        let peer = announce.player_no;
        if peer <= id || peer >= PEERS {
            return Err(Error::Roster(format!("unexpected announce from {}", peer)))
        }
        if joined.iter().any(|(seen, _, _)| *seen == peer) {
            return Err(Error::Roster(format!("duplicate announce from {}", peer)))
        }
        let ip = parse_ip(&announce.ip)?;
        debug!("accepted {} from {}", peer, addr);
        joined.push((peer, ip, Link::tcp(stream)));
    }
    Ok(joined)
}

/// Connects to every peer that joined before us.
async fn connect_lower(
    peers: &[PeerAddress],
    id: PeerId,
    local: IpAddr,
    port: u16,
) -> Result<Vec<(PeerId, IpAddr, Link)>> {
    let announce = PeerAddress { player_no: id, ip: local.to_string() };
    let mut connected = Vec::with_capacity(peers.len());
    for peer in peers {
        let ip = parse_ip(&peer.ip)?;
        let mut stream = connect(SocketAddr::new(ip, listening_port(port, peer.player_no)?)).await?;
        socket::write_json(&mut stream, &announce).await?;
        debug!("connected to {} at {}", peer.player_no, ip);
        connected.push((peer.player_no, ip, Link::tcp(stream)));
    }
    Ok(connected)
}

/// Retries until the remote listener is up. Bounded by the setup timeout.
async fn connect(addr: SocketAddr) -> Result<TcpStream> {
    loop {
        match TcpStream::connect(addr).await {
        | Ok(stream) => {
            stream.set_nodelay(true)?;
            return Ok(stream)
        }
        | Err(error) => {
            trace!("connecting to {}: {}", addr, error);
            tokio::time::sleep(CONNECT_RETRY).await;
        }
        }
    }
}

fn listening_port(port: u16, id: PeerId) -> Result<u16> {
    u16::try_from(id)
        .ok()
        .and_then(|id| port.checked_add(id))
        .ok_or_else(|| Error::Roster(format!("no listening port for {} above {}", id, port)))
}

fn parse_ip(ip: &str) -> Result<IpAddr> {
    ip.parse().map_err(|_| Error::Malformed(format!("bad address {:?}", ip)))
}
