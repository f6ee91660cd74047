use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::constants::TICK;
use crate::engine::Engine;
use crate::internal;
use crate::message::Envelope;
use crate::state::Command;
use crate::thread::Event;

/// Sole owner of the engine. Feeds it events and ticks, and routes what it
/// produces to the per-peer writer queues.
pub struct Consensus<C: Command> {
    engine: Engine<C>,
    events: internal::Rx<Event<C>>,
    peers: Vec<internal::Tx<Envelope<C>>>,
    tasks: Vec<JoinHandle<()>>,
    stop: Arc<AtomicBool>,
}

impl<C: Command> Consensus<C> {
    pub fn new(
        engine: Engine<C>,
        events: internal::Rx<Event<C>>,
        peers: Vec<internal::Tx<Envelope<C>>>,
        tasks: Vec<JoinHandle<()>>,
        stop: Arc<AtomicBool>,
    ) -> Self {
        Consensus { engine, events, peers, tasks, stop }
    }

    pub async fn run(mut self) {
        let mut tick = tokio::time::interval(TICK);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        while !self.stop.load(Ordering::Acquire) {
            tokio::select! {
                event = self.events.recv() => match event {
                | Some(Event::Message(from, envelope)) => self.engine.handle(from, envelope, Instant::now()),
                | Some(Event::Disconnected(peer)) => self.engine.disconnect(peer),
                | None => break,
                },
                _ = tick.tick() => self.engine.tick(Instant::now()),
            }
            self.flush();
        }

        info!("stopped at instance {}", self.engine.instance());
        for task in &self.tasks {
            task.abort();
        }
    }

    fn flush(&mut self) {
        for (to, envelope) in self.engine.drain_outgoing() {
            if let Some(peer) = self.peers.get(to) {
                peer.try_send(envelope);
            }
        }
    }
}
