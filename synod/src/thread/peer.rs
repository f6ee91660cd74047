use tokio::task::JoinHandle;

use crate::error::Error;
use crate::internal;
use crate::message::Envelope;
use crate::socket::{self, Link};
use crate::state::{Command, PeerId};
use crate::thread::Event;

/// Starts the reader and writer tasks for the link to `peer`. Returns the
/// queue of envelopes to send to it.
pub fn spawn<C: Command>(
    peer: PeerId,
    link: Link,
    events: internal::Tx<Event<C>>,
) -> (internal::Tx<Envelope<C>>, [JoinHandle<()>; 2]) {
    let (peer_rx, peer_tx) = socket::split(link);
    let (rx, tx) = internal::new();
    let reader = Reader { peer, peer_rx, events: events.clone() };
    let writer = Writer { peer, rx, peer_tx, events };
    (tx, [tokio::spawn(reader.run()), tokio::spawn(writer.run())])
}

struct Reader<C: Command> {
    peer: PeerId,
    peer_rx: socket::Rx<Envelope<C>>,
    events: internal::Tx<Event<C>>,
}

impl<C: Command> Reader<C> {
    async fn run(mut self) {
        loop {
            match self.peer_rx.recv().await {
            | Some(Ok(envelope)) if envelope.from == self.peer => {
                self.events.try_send(Event::Message(self.peer, envelope));
            }
            | Some(Ok(envelope)) => {
                warn!("dropping envelope claiming {} on link to {}", envelope.from, self.peer);
            }
            | Some(Err(Error::Codec(error))) => {
                warn!("undecodable frame from {}: {}", self.peer, error);
            }
            | Some(Err(error)) => {
                warn!("receiving from {}: {}", self.peer, error);
                break
            }
            | None => {
                debug!("{} closed its link", self.peer);
                break
            }
            }
        }
        self.events.try_send(Event::Disconnected(self.peer));
    }
}

struct Writer<C: Command> {
    peer: PeerId,
    rx: internal::Rx<Envelope<C>>,
    peer_tx: socket::Tx<Envelope<C>>,
    events: internal::Tx<Event<C>>,
}

impl<C: Command> Writer<C> {
    async fn run(mut self) {
        while let Some(envelope) = self.rx.recv().await {
            trace!("sending {:?} to {}", envelope.message, self.peer);
            if let Err(error) = self.peer_tx.send(&envelope).await {
                warn!("sending to {}: {}", self.peer, error);
                self.events.try_send(Event::Disconnected(self.peer));
                return
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::message::{Message, ProposalId};

    fn heartbeat(from: PeerId) -> Envelope<String> {
        Envelope { from, instance: 0, message: Message::Heartbeat { proposal: ProposalId::new(1, from) } }
    }

    #[tokio::test]
    async fn test_loopback_round_trip() {
        let (mut events_rx, events_tx) = internal::new();
        let (tx, _) = spawn::<String>(2, Link::loopback(), events_tx);
        tx.try_send(heartbeat(2));
        match events_rx.recv().await {
        | Some(Event::Message(2, envelope)) => assert_eq!(envelope.instance, 0),
        | other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_spoofed_sender_is_dropped() {
        let (mut events_rx, events_tx) = internal::new();
        let (reader, writer) = tokio::io::duplex(4096);
        let (sink, _) = tokio::io::duplex(16);
        let _tasks = spawn::<String>(1, Link::new(reader, sink), events_tx);

        let (_, mut tx) = socket::split::<Envelope<String>, Envelope<String>>(
            Link::new(tokio::io::empty(), writer),
        );
        tx.send(&heartbeat(3)).await.unwrap();
        tx.send(&heartbeat(1)).await.unwrap();
        match events_rx.recv().await {
        | Some(Event::Message(1, envelope)) => assert_eq!(envelope.from, 1),
        | other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_closed_link_reports_disconnect() {
        let (mut events_rx, events_tx) = internal::new();
        let (reader, writer) = tokio::io::duplex(64);
        let (sink, _) = tokio::io::duplex(16);
        let _tasks = spawn::<String>(3, Link::new(reader, sink), events_tx);
        drop(writer);
        assert!(matches!(events_rx.recv().await, Some(Event::Disconnected(3))));
    }
}
