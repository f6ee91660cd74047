//! # Summary
//!
//! This module defines the `Acceptor` role, which acts as Paxos's
//! distributed memory. Acceptors keep, per instance, the highest proposal
//! promised and the highest proposal accepted together with its value.

use std::collections::BTreeMap as Map;

use crate::message::{Batch, Message, ProposalId};
use crate::state;

/// Acceptor state for a single instance.
#[derive(Derivative)]
#[derivative(Default(bound = ""), Debug(bound = ""))]
pub struct Slot<C: state::Command> {
    /// Highest proposal promised
    pub promised: Option<ProposalId>,

    /// Highest proposal accepted, with its value
    pub accepted: Option<(ProposalId, Batch<C>)>,
}

/// Responds to any live instance. Slots below the local instance are
/// discarded as soon as the instance advances.
#[derive(Derivative)]
#[derivative(Default(bound = ""))]
pub struct Acceptor<C: state::Command> {
    slots: Map<u64, Slot<C>>,
}

impl<C: state::Command> Acceptor<C> {
    /// Promises `proposal` unless an equal or higher proposal was already promised.
    pub fn prepare(&mut self, instance: u64, proposal: ProposalId) -> Message<C> {
        let slot = self.slots.entry(instance).or_default();
        match slot.promised {
        | Some(promised) if proposal <= promised => {
            trace!("nacking prepare {:?} in {}: promised {:?}", proposal, instance, promised);
            Message::NackPrepare { proposal, promised, decided: None }
        }
        | _ => {
            slot.promised = Some(proposal);
            Message::Promise { proposal, previous: slot.accepted.clone() }
        }
        }
    }

    /// Accepts `proposal` unless a strictly higher proposal was promised.
    pub fn accept(&mut self, instance: u64, proposal: ProposalId, value: Batch<C>) -> Message<C> {
        let slot = self.slots.entry(instance).or_default();
        match slot.promised {
        | Some(promised) if proposal < promised => {
            trace!("nacking accept {:?} in {}: promised {:?}", proposal, instance, promised);
            Message::NackAccept { proposal, promised, decided: None }
        }
        | _ => {
            slot.promised = Some(proposal);
            slot.accepted = Some((proposal, value.clone()));
            Message::Accepted { proposal, value }
        }
        }
    }

    /// Forgets every slot below `instance`.
    pub fn advance(&mut self, instance: u64) {
        self.slots = self.slots.split_off(&instance);
    }

    #[cfg(test)]
    pub fn slot(&self, instance: u64) -> Option<&Slot<C>> {
        self.slots.get(&instance)
    }
}
