#[macro_use] extern crate derivative;
#[macro_use] extern crate log;

mod config;
mod error;
mod internal;
mod network;
mod rendezvous;
mod socket;
mod state;
mod thread;

pub mod constants;
pub mod engine;
pub mod message;
pub mod shared;

pub use crate::config::Config;
pub use crate::error::{Error, Result};
pub use crate::message::{Batch, Entry, Envelope, Message, ProposalId};
pub use crate::network::Network;
pub use crate::rendezvous::{Mesh, PeerAddress, Roster};
pub use crate::socket::Link;
pub use crate::state::{Command, PeerId};
