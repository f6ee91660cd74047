//! # Summary
//!
//! The handle the application talks to. Submitting and draining commands
//! only touch the shared mailbox, so neither ever blocks on the network.

use std::net::IpAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use rand::rngs::StdRng;
use rand::SeedableRng;
use tokio::task::JoinHandle;

use crate::engine::Engine;
use crate::internal;
use crate::rendezvous::Mesh;
use crate::shared::Mailbox;
use crate::state::{Command, PeerId};
use crate::thread::consensus::Consensus;
use crate::thread::peer;

pub struct Network<C: Command> {
    id: PeerId,
    addresses: Vec<IpAddr>,
    mailbox: Arc<Mailbox<C>>,
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl<C: Command> Network<C> {
    /// Starts the consensus loop over an established mesh. Must be called
    /// from within a tokio runtime.
    pub fn new(mesh: Mesh, heartbeat: Duration) -> Self {
        let Mesh { id, links, addresses } = mesh;
        let mailbox = Arc::new(Mailbox::new(id));
        let stop = Arc::new(AtomicBool::new(false));
        let (events_rx, events_tx) = internal::new();

        let mut peers = Vec::with_capacity(links.len());
        let mut tasks = Vec::with_capacity(links.len() * 2);
        for (peer, link) in links.into_iter().enumerate() {
            let (tx, handles) = peer::spawn(peer, link, events_tx.clone());
            peers.push(tx);
            tasks.extend(handles);
        }

        let engine = Engine::new(mailbox.clone(), heartbeat, StdRng::from_entropy(), Instant::now());
        let consensus = Consensus::new(engine, events_rx, peers, tasks, stop.clone());
        let handle = tokio::spawn(consensus.run());
        info!("peer {} online", id);

        Network {
            id,
            addresses,
            mailbox,
            stop,
            handle: Some(handle),
        }
    }

    pub fn id(&self) -> PeerId {
        self.id
    }

    /// Address of every peer, indexed by identity.
    pub fn addresses(&self) -> &[IpAddr] {
        &self.addresses
    }

    /// Queues `command` for agreement. Returns immediately.
    pub fn broadcast(&self, command: C) {
        self.mailbox.push(command);
    }

    /// Every command agreed since the last call, in agreed order.
    pub fn poll_agreed(&self) -> Vec<C> {
        self.mailbox.drain()
    }

    /// Number of instances resolved locally.
    pub fn instance(&self) -> u64 {
        self.mailbox.resolved()
    }

    /// Asks the consensus loop to exit after its current iteration.
    pub fn stop(&self) {
        self.stop.store(true, Ordering::Release);
    }

    /// Stops the consensus loop and waits for it to exit.
    pub async fn join(mut self) {
        self.stop();
        if let Some(handle) = self.handle.take() {
            if let Err(error) = handle.await {
                error!("consensus loop failed: {}", error);
            }
        }
    }
}

impl<C: Command> Drop for Network<C> {
    fn drop(&mut self) {
        self.stop();
    }
}
