//! # Summary
//!
//! This module contains the background tasks behind a running `Network`.
//!
//! Each peer link gets a reader task, which decodes envelopes into the shared
//! event queue, and a writer task, which drains a per-peer queue onto the
//! link. A single consensus task owns the engine and is the only consumer
//! of the event queue.

use crate::message::Envelope;
use crate::state::{Command, PeerId};

/// Engine driver.
pub(crate) mod consensus;

/// Peer link communication.
pub(crate) mod peer;

#[derive(Derivative)]
#[derivative(Debug(bound = ""))]
pub enum Event<C: Command> {
    Message(PeerId, Envelope<C>),
    Disconnected(PeerId),
}
