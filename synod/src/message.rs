//! # Summary
//!
//! Wire types exchanged between peers once the mesh is established.
//!
//! Every frame carries one `Envelope`: the sender, the instance the message
//! belongs to, and one of a closed set of protocol messages. Values are
//! batches of `Entry`, each of which wraps a command with the identity of
//! the peer that submitted it.

use serde_derive::{Deserialize, Serialize};

use crate::state::{self, PeerId};

/// Proposal number. Ordered by round first and proposer second, so two
/// peers can never produce equal ids.
#[derive(Serialize, Deserialize)]
#[derive(Copy, Clone, Default, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ProposalId {
    pub round: u64,
    pub uid: PeerId,
}

impl ProposalId {
    pub fn new(round: u64, uid: PeerId) -> Self {
        ProposalId { round, uid }
    }

    /// Smallest id owned by `uid` in a round strictly above `self`.
    pub fn succ(self, uid: PeerId) -> Self {
        ProposalId { round: self.round + 1, uid }
    }
}

/// A command together with its globally unique `(origin, seq)` identity.
#[derive(Serialize, Deserialize)]
#[serde(bound(serialize = "", deserialize = ""))]
#[derive(Derivative)]
#[derivative(Clone(bound = ""), Debug(bound = ""))]
pub struct Entry<C: state::Command> {
    pub origin: PeerId,
    pub seq: u64,
    pub command: C,
}

impl<C: state::Command> Entry<C> {
    pub fn id(&self) -> (PeerId, u64) {
        (self.origin, self.seq)
    }
}

impl<C: state::Command> PartialEq for Entry<C> {
    fn eq(&self, rhs: &Self) -> bool {
        self.id() == rhs.id()
    }
}

impl<C: state::Command> Eq for Entry<C> {}

/// The value of one instance.
pub type Batch<C> = Vec<Entry<C>>;

#[derive(Serialize, Deserialize)]
#[serde(bound(serialize = "", deserialize = ""))]
#[derive(Derivative)]
#[derivative(Clone(bound = ""), Debug(bound = ""))]
pub enum Message<C: state::Command> {
    Prepare {
        proposal: ProposalId,
    },
    Promise {
        proposal: ProposalId,
        previous: Option<(ProposalId, Batch<C>)>,
    },
    Accept {
        proposal: ProposalId,
        value: Batch<C>,
    },
    Accepted {
        proposal: ProposalId,
        value: Batch<C>,
    },
    /// `decided` is set when the instance is already over at the sender.
    NackPrepare {
        proposal: ProposalId,
        promised: ProposalId,
        decided: Option<Batch<C>>,
    },
    NackAccept {
        proposal: ProposalId,
        promised: ProposalId,
        decided: Option<Batch<C>>,
    },
    Heartbeat {
        proposal: ProposalId,
    },
    /// Entries forwarded by a follower to the peer it believes is leader.
    Request {
        entries: Batch<C>,
    },
    Refusal {
        leader: Option<PeerId>,
    },
}

#[derive(Serialize, Deserialize)]
#[serde(bound(serialize = "", deserialize = ""))]
#[derive(Derivative)]
#[derivative(Clone(bound = ""), Debug(bound = ""))]
pub struct Envelope<C: state::Command> {
    pub from: PeerId,
    pub instance: u64,
    pub message: Message<C>,
}
