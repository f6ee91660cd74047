use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;

use crate::constants::{HEARTBEAT_INTERVAL, PORT, SETUP_TIMEOUT};
use crate::error::Result;
use crate::network::Network;
use crate::rendezvous::{self, Mesh};
use crate::state;

#[derive(Copy, Clone, Debug)]
pub struct Config {
    /// Coordinator to join, or `None` to coordinate
    pub(crate) coordinator: Option<IpAddr>,

    /// Rendezvous port; peer `k` listens on `port + k`
    pub(crate) port: u16,

    /// Local address for every listening socket
    pub(crate) bind: IpAddr,

    /// Period between leader heartbeats
    pub(crate) heartbeat: Duration,

    /// Bound on the whole rendezvous
    pub(crate) timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Config::new(PORT)
    }
}

impl Config {
    pub fn new(port: u16) -> Self {
        Config {
            coordinator: None,
            port,
            bind: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            heartbeat: HEARTBEAT_INTERVAL,
            timeout: SETUP_TIMEOUT,
        }
    }

    pub fn with_coordinator(mut self, coordinator: IpAddr) -> Self {
        self.coordinator = Some(coordinator);
        self
    }

    pub fn with_bind(mut self, bind: IpAddr) -> Self {
        self.bind = bind;
        self
    }

    pub fn with_heartbeat(mut self, heartbeat: Duration) -> Self {
        self.heartbeat = heartbeat;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Runs rendezvous only, leaving the links to the caller.
    pub async fn rendezvous(&self) -> Result<Mesh> {
        rendezvous::rendezvous(self).await
    }

    /// Runs rendezvous, then launches the consensus loop in the background.
    /// Returns once this process knows its identity.
    pub async fn start<C: state::Command>(self) -> Result<Network<C>> {
        let mesh = self.rendezvous().await?;
        Ok(Network::new(mesh, self.heartbeat))
    }
}
