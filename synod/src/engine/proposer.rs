//! # Summary
//!
//! This module defines the `Proposer` role for the current instance.
//!
//! Phase 1 collects promises for a fresh proposal id; once a quorum has
//! promised, the proposer either adopts the highest previously accepted
//! value or, when no acceptor reported one, its own batch. A quorum of
//! promises with nothing to send leaves the proposer `Prepared`, ready to
//! skip straight to phase 2 when commands arrive.

use std::time::{Duration, Instant};

use hashbrown::HashSet as Set;

use crate::constants::QUORUM;
use crate::message::{Batch, ProposalId};
use crate::state::{self, PeerId};

#[derive(Derivative)]
#[derivative(Debug(bound = ""))]
pub enum Phase<C: state::Command> {
    Idle,
    Preparing {
        promises: Set<PeerId>,
        highest: Option<(ProposalId, Batch<C>)>,
    },
    Prepared,
    Accepting {
        value: Batch<C>,
    },
}

/// Outcome of a promise.
#[derive(Derivative)]
#[derivative(Debug(bound = ""))]
pub enum Progress<C: state::Command> {
    Pending,
    /// Quorum promised with nothing to propose yet.
    Prepared,
    /// Quorum promised; broadcast `Accept` with this value.
    Accept(Batch<C>),
}

pub struct Proposer<C: state::Command> {
    uid: PeerId,
    instance: u64,

    /// Highest round seen in any proposal id, ours or not
    round: u64,

    proposal: ProposalId,
    own: Batch<C>,
    phase: Phase<C>,

    /// Whether winning phase 1 makes this peer leader
    campaign: bool,

    started: Instant,
}

impl<C: state::Command> Proposer<C> {
    pub fn new(uid: PeerId, now: Instant) -> Self {
        Proposer {
            uid,
            instance: 0,
            round: 0,
            proposal: ProposalId::new(0, uid),
            own: Vec::new(),
            phase: Phase::Idle,
            campaign: false,
            started: now,
        }
    }

    pub fn phase(&self) -> &Phase<C> {
        &self.phase
    }

    pub fn proposal(&self) -> ProposalId {
        self.proposal
    }

    pub fn is_campaign(&self) -> bool {
        self.campaign
    }

    pub fn is_idle(&self) -> bool {
        matches!(self.phase, Phase::Idle)
    }

    /// Waiting on acceptors.
    pub fn in_flight(&self) -> bool {
        matches!(self.phase, Phase::Preparing { .. } | Phase::Accepting { .. })
    }

    pub fn expired(&self, now: Instant, timeout: Duration) -> bool {
        self.in_flight() && now.duration_since(self.started) >= timeout
    }

    /// Raises the round floor so the next proposal exceeds `proposal`.
    pub fn witness(&mut self, proposal: ProposalId) {
        self.round = std::cmp::max(self.round, proposal.round);
    }

    /// Starts phase 1 for `instance` with a proposal id above every id seen.
    pub fn prepare(&mut self, instance: u64, own: Batch<C>, campaign: bool, now: Instant) -> ProposalId {
        self.round += 1;
        self.instance = instance;
        self.proposal = ProposalId::new(self.round, self.uid);
        self.own = own;
        self.campaign = campaign;
        self.started = now;
        self.phase = Phase::Preparing {
            promises: Set::default(),
            highest: None,
        };
        debug!("preparing {:?} for instance {}", self.proposal, instance);
        self.proposal
    }

    pub fn promise(
        &mut self,
        from: PeerId,
        instance: u64,
        proposal: ProposalId,
        previous: Option<(ProposalId, Batch<C>)>,
    ) -> Progress<C> {
        if instance != self.instance || proposal != self.proposal {
            return Progress::Pending
        }
        let (promises, highest) = match &mut self.phase {
        | Phase::Preparing { promises, highest } => (promises, highest),
        | _ => return Progress::Pending,
        };
        promises.insert(from);
        if let Some((id, value)) = previous {
            if highest.as_ref().map_or(true, |(best, _)| id > *best) {
                *highest = Some((id, value));
            }
        }
        if promises.len() < QUORUM {
            return Progress::Pending
        }
        let value = match highest.take() {
        | Some((_, value)) => value,
        | None if self.own.is_empty() => {
            debug!("{:?} prepared with nothing to propose", self.proposal);
            self.phase = Phase::Prepared;
            return Progress::Prepared
        }
        | None => std::mem::take(&mut self.own),
        };
        debug!("{:?} accepting {} entries", self.proposal, value.len());
        self.phase = Phase::Accepting { value: value.clone() };
        Progress::Accept(value)
    }

    /// Moves a prepared proposer into phase 2 with `value`.
    pub fn propose(&mut self, value: Batch<C>, now: Instant) -> Option<ProposalId> {
        if !matches!(self.phase, Phase::Prepared) || value.is_empty() {
            return None
        }
        self.started = now;
        self.phase = Phase::Accepting { value };
        Some(self.proposal)
    }

    /// Abandons the attempt if `proposal` is the one in flight.
    pub fn nack(&mut self, instance: u64, proposal: ProposalId, promised: ProposalId) -> bool {
        self.witness(promised);
        if instance != self.instance || proposal != self.proposal || self.is_idle() {
            return false
        }
        debug!("{:?} rejected in favor of {:?}", proposal, promised);
        self.phase = Phase::Idle;
        true
    }

    /// Gives up on the current attempt without a rejection.
    pub fn abandon(&mut self) {
        self.phase = Phase::Idle;
    }

    /// Fresh state for a newly reached instance.
    pub fn reset(&mut self, instance: u64) {
        self.instance = instance;
        self.own.clear();
        self.phase = Phase::Idle;
        self.campaign = false;
    }
}
