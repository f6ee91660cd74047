//! # Summary
//!
//! This module defines the `Learner` role. Learners count `Accepted`
//! messages per instance and proposal, decide an instance once a quorum of
//! acceptors agrees, and release decisions strictly in instance order.

use std::collections::BTreeMap as Map;

use hashbrown::HashMap;
use hashbrown::HashSet as Set;

use crate::constants::QUORUM;
use crate::message::{Batch, ProposalId};
use crate::state::{self, PeerId};

/// Value chosen for an instance and the proposal that carried it.
#[derive(Derivative)]
#[derivative(Clone(bound = ""), Debug(bound = ""))]
pub struct Decision<C: state::Command> {
    pub proposal: ProposalId,
    pub value: Batch<C>,
}

#[derive(Derivative)]
#[derivative(Debug(bound = ""))]
struct Tally<C: state::Command> {
    value: Batch<C>,
    voters: Set<PeerId>,
}

#[derive(Derivative)]
#[derivative(Default(bound = ""))]
pub struct Learner<C: state::Command> {
    /// Next instance to release
    instance: u64,

    /// Every released decision, indexed by instance
    log: Vec<Decision<C>>,

    /// Votes for instances not decided yet
    tallies: Map<u64, HashMap<ProposalId, Tally<C>>>,

    /// Decided but not yet released
    decided: Map<u64, Decision<C>>,
}

impl<C: state::Command> Learner<C> {
    pub fn instance(&self) -> u64 {
        self.instance
    }

    /// Decision of an instance that was already released.
    pub fn lookup(&self, instance: u64) -> Option<&Decision<C>> {
        self.log.get(instance as usize)
    }

    pub fn log(&self) -> &[Decision<C>] {
        &self.log
    }

    /// Counts one acceptor's vote. Returns true if this vote decided the instance.
    pub fn accepted(&mut self, instance: u64, from: PeerId, proposal: ProposalId, value: Batch<C>) -> bool {
        if instance < self.instance || self.decided.contains_key(&instance) {
            return false
        }
        let tally = self.tallies
            .entry(instance)
            .or_default()
            .entry(proposal)
            .or_insert_with(|| Tally { value, voters: Set::default() });
        tally.voters.insert(from);
        if tally.voters.len() < QUORUM {
            return false
        }
        let value = tally.value.clone();
        self.decide(instance, Decision { proposal, value });
        true
    }

    /// Records a decision learned by any means. The first decision for an
    /// instance wins; later ones are necessarily identical.
    pub fn decide(&mut self, instance: u64, decision: Decision<C>) {
        if instance < self.instance {
            return
        }
        self.tallies.remove(&instance);
        self.decided.entry(instance).or_insert(decision);
    }

    /// Releases every decision contiguous with the current instance.
    pub fn drain_ready(&mut self) -> Vec<(u64, Decision<C>)> {
        let mut ready = Vec::new();
        while let Some(decision) = self.decided.remove(&self.instance) {
            ready.push((self.instance, decision.clone()));
            self.log.push(decision);
            self.instance += 1;
        }
        ready
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Entry;

    fn batch(command: &str) -> Batch<String> {
        vec![Entry { origin: 1, seq: 0, command: command.to_string() }]
    }

    #[test]
    fn test_quorum_decides() {
        let mut learner = Learner::default();
        let id = ProposalId::new(1, 1);
        assert!(!learner.accepted(0, 0, id, batch("a")));
        assert!(!learner.accepted(0, 1, id, batch("a")));
        assert!(learner.accepted(0, 2, id, batch("a")));

        let ready = learner.drain_ready();
        assert_eq!(ready.len(), 1);
        assert_eq!(ready[0].1.value[0].command, "a");
        assert_eq!(learner.instance(), 1);
    }

    #[test]
    fn test_duplicate_votes_do_not_count() {
        let mut learner = Learner::default();
        let id = ProposalId::new(1, 1);
        for _ in 0..5 {
            assert!(!learner.accepted(0, 3, id, batch("a")));
        }
        assert!(!learner.accepted(0, 2, id, batch("a")));
        assert!(learner.drain_ready().is_empty());
    }

    #[test]
    fn test_votes_for_different_proposals_are_separate() {
        let mut learner = Learner::default();
        learner.accepted(0, 0, ProposalId::new(1, 0), batch("a"));
        learner.accepted(0, 1, ProposalId::new(1, 0), batch("a"));
        assert!(!learner.accepted(0, 2, ProposalId::new(2, 3), batch("b")));
        assert!(learner.accepted(0, 3, ProposalId::new(1, 0), batch("a")));
    }

    #[test]
    fn test_future_decisions_wait_for_gap() {
        let mut learner = Learner::default();
        let id = ProposalId::new(1, 0);
        learner.decide(1, Decision { proposal: id, value: batch("second") });
        assert!(learner.drain_ready().is_empty());

        learner.decide(0, Decision { proposal: id, value: batch("first") });
        let ready = learner.drain_ready();
        let order = ready.iter().map(|(i, d)| (*i, d.value[0].command.clone())).collect::<Vec<_>>();
        assert_eq!(order, vec![(0, "first".to_string()), (1, "second".to_string())]);
        assert_eq!(learner.lookup(1).unwrap().value[0].command, "second");
    }

    #[test]
    fn test_stale_votes_are_ignored() {
        let mut learner = Learner::default();
        let id = ProposalId::new(1, 0);
        learner.decide(0, Decision { proposal: id, value: batch("a") });
        learner.drain_ready();
        for peer in 0..4 {
            assert!(!learner.accepted(0, peer, ProposalId::new(2, 1), batch("b")));
        }
        assert_eq!(learner.lookup(0).unwrap().value[0].command, "a");
        assert_eq!(learner.instance(), 1);
    }
}
