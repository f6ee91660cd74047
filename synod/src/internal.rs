//! # Summary
//!
//! This module abstracts over connections between tasks of the same process.
//!
//! Backed by unbounded `tokio::sync::mpsc` channels. A send only fails once
//! the receiving task has exited, which happens during shutdown or after a
//! peer link has died, so failed sends are dropped silently.

use tokio::sync::mpsc;

/// Intra-process receiving channel.
#[derive(Debug)]
pub struct Rx<T>(mpsc::UnboundedReceiver<T>);

/// Intra-process transmission channel. All clones send to the same receiving end.
#[derive(Derivative)]
#[derivative(Clone(bound = ""))]
#[derive(Debug)]
pub struct Tx<T>(mpsc::UnboundedSender<T>);

/// Create a new pair of linked receiving and transmitting channels.
pub fn new<T>() -> (Rx<T>, Tx<T>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (Rx(rx), Tx(tx))
}

impl<T> Tx<T> {
    /// Attempt to send a message through the channel.
    /// Does nothing if the receiving end has been dropped.
    pub fn try_send(&self, message: T) {
        self.0.send(message).ok();
    }
}

impl<T> Rx<T> {
    /// Waits for the next message. Returns `None` once every `Tx` is gone.
    pub async fn recv(&mut self) -> Option<T> {
        self.0.recv().await
    }
}
