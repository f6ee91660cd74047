//! # Summary
//!
//! This module contains the consensus engine: one owner for every piece of
//! per-process consensus state, driven by incoming envelopes and a periodic
//! tick, emitting outgoing envelopes into a buffer drained by the caller.
//!
//! The engine performs no I/O, so the same code runs behind the socket mesh
//! and inside deterministic simulations. Each instance is an independent
//! run of the Synod protocol whose value is a batch of entries; decided
//! batches reach the shared mailbox strictly in instance order.

use std::sync::Arc;
use std::time::{Duration, Instant};

use hashbrown::HashSet as Set;
use rand::rngs::StdRng;

use crate::constants::{MAX_BATCH, PEERS, PROPOSAL_TIMEOUT_FACTOR};
use crate::message::{Batch, Entry, Envelope, Message, ProposalId};
use crate::shared::Mailbox;
use crate::state::{Command, PeerId};

/// Distributed memory.
pub mod acceptor;

/// Advisory leadership.
pub mod leader;

/// Decision tracking.
pub mod learner;

/// Value proposer.
pub mod proposer;

use self::acceptor::Acceptor;
use self::leader::{Change, Leader};
use self::learner::{Decision, Learner};
use self::proposer::{Phase, Progress, Proposer};

pub struct Engine<C: Command> {
    uid: PeerId,
    heartbeat: Duration,
    mailbox: Arc<Mailbox<C>>,

    acceptor: Acceptor<C>,
    proposer: Proposer<C>,
    learner: Learner<C>,
    leader: Leader,

    /// Peers whose link is still usable
    live: [bool; PEERS],

    /// Entries forwarded to us while leader
    forwarded: Vec<Entry<C>>,

    /// Identities of every entry handed to the mailbox
    delivered: Set<(PeerId, u64)>,

    last_request: Option<Instant>,
    outgoing: Vec<(PeerId, Envelope<C>)>,
}

impl<C: Command> Engine<C> {
    /// `rng` drives campaign backoff only.
    pub fn new(mailbox: Arc<Mailbox<C>>, heartbeat: Duration, rng: StdRng, now: Instant) -> Self {
        let uid = mailbox.uid();
        Engine {
            uid,
            heartbeat,
            mailbox,
            acceptor: Acceptor::default(),
            proposer: Proposer::new(uid, now),
            learner: Learner::default(),
            leader: Leader::new(uid, heartbeat, rng, now),
            live: [true; PEERS],
            forwarded: Vec::new(),
            delivered: Set::default(),
            last_request: None,
            outgoing: Vec::new(),
        }
    }

    pub fn uid(&self) -> PeerId {
        self.uid
    }

    /// Next instance to be decided locally. Never decreases.
    pub fn instance(&self) -> u64 {
        self.learner.instance()
    }

    pub fn leader(&self) -> Option<PeerId> {
        self.leader.leader()
    }

    pub fn is_leader(&self) -> bool {
        self.leader.is_leader()
    }

    /// Every decision released so far, indexed by instance.
    pub fn log(&self) -> &[Decision<C>] {
        self.learner.log()
    }

    /// Takes the envelopes produced since the last call, with their destinations.
    pub fn drain_outgoing(&mut self) -> Vec<(PeerId, Envelope<C>)> {
        std::mem::take(&mut self.outgoing)
    }

    pub fn handle(&mut self, from: PeerId, envelope: Envelope<C>, now: Instant) {
        let Envelope { instance, message, .. } = envelope;
        trace!("received {:?} for instance {} from {}", message, instance, from);
        match message {
        | Message::Prepare { proposal } => self.respond_prepare(from, instance, proposal),
        | Message::Promise { proposal, previous } => self.respond_promise(from, instance, proposal, previous, now),
        | Message::Accept { proposal, value } => self.respond_accept(from, instance, proposal, value),
        | Message::Accepted { proposal, value } => self.respond_accepted(from, instance, proposal, value, now),
        | Message::NackPrepare { proposal, promised, decided }
        | Message::NackAccept { proposal, promised, decided } => {
            self.respond_nack(instance, proposal, promised, decided, now)
        }
        | Message::Heartbeat { proposal } => self.respond_heartbeat(from, instance, proposal, now),
        | Message::Request { entries } => self.respond_request(from, entries, now),
        | Message::Refusal { .. } => self.respond_refusal(from, now),
        }
    }

    /// Marks the link to `peer` unusable for the rest of the run.
    pub fn disconnect(&mut self, peer: PeerId) {
        if peer >= PEERS || !self.live[peer] {
            return
        }
        warn!("link to {} is down", peer);
        self.live[peer] = false;
        if self.leader.forget(peer) {
            info!("leader {} disconnected", peer);
        }
    }

    pub fn tick(&mut self, now: Instant) {
        if let Some(leader) = self.leader.expire(now) {
            info!("leader {} presumed dead", leader);
        }

        self.send_heartbeat(now);

        if self.proposer.expired(now, self.heartbeat * PROPOSAL_TIMEOUT_FACTOR) {
            debug!("{:?} timed out", self.proposer.proposal());
            self.proposer.abandon();
            self.leader.defeated(now);
        }

        let instance = self.instance();
        let lagging = self.leader.lagging(instance, now);
        if lagging && self.proposer.is_idle() && !self.leader.is_leader() {
            debug!("instance {} trails the leader", instance);
            self.prepare(Vec::new(), false, now);
            return
        }

        match self.leader.leader() {
        | Some(leader) if leader == self.uid => self.try_propose(now),
        | Some(leader) => self.forward(leader, now),
        | None => self.campaign(now),
        }
    }

    fn respond_prepare(&mut self, from: PeerId, instance: u64, proposal: ProposalId) {
        self.proposer.witness(proposal);
        let reply = match self.learner.lookup(instance) {
        | Some(decision) => Message::NackPrepare {
            proposal,
            promised: decision.proposal,
            decided: Some(decision.value.clone()),
        },
        | None => self.acceptor.prepare(instance, proposal),
        };
        self.send(from, instance, reply);
    }

    fn respond_accept(&mut self, from: PeerId, instance: u64, proposal: ProposalId, value: Batch<C>) {
        self.proposer.witness(proposal);
        let reply = match self.learner.lookup(instance) {
        | Some(decision) => Message::NackAccept {
            proposal,
            promised: decision.proposal,
            decided: Some(decision.value.clone()),
        },
        | None => self.acceptor.accept(instance, proposal, value),
        };
        match reply {
        | Message::Accepted { .. } => self.broadcast(instance, reply),
        | _ => self.send(from, instance, reply),
        }
    }

    fn respond_promise(
        &mut self,
        from: PeerId,
        instance: u64,
        proposal: ProposalId,
        previous: Option<(ProposalId, Batch<C>)>,
        now: Instant,
    ) {
        match self.proposer.promise(from, instance, proposal, previous) {
        | Progress::Pending => (),
        | Progress::Prepared => {
            if self.proposer.is_campaign() {
                self.won(proposal, now);
            }
            if !self.leader.is_leader() {
                self.proposer.abandon();
            }
        }
        | Progress::Accept(value) => {
            if self.proposer.is_campaign() {
                self.won(proposal, now);
            }
            self.broadcast(instance, Message::Accept { proposal, value });
        }
        }
    }

    fn respond_accepted(&mut self, from: PeerId, instance: u64, proposal: ProposalId, value: Batch<C>, now: Instant) {
        if self.learner.accepted(instance, from, proposal, value) {
            debug!("instance {} chosen with {:?}", instance, proposal);
            self.deliver(now);
        }
    }

    fn respond_nack(
        &mut self,
        instance: u64,
        proposal: ProposalId,
        promised: ProposalId,
        decided: Option<Batch<C>>,
        now: Instant,
    ) {
        match decided {
        | Some(value) => {
            debug!("instance {} was already chosen with {:?}", instance, promised);
            self.proposer.witness(promised);
            self.learner.decide(instance, Decision { proposal: promised, value });
            self.deliver(now);
        }
        | None => {
            if self.proposer.nack(instance, proposal, promised) {
                self.leader.defeated(now);
            }
        }
        }
    }

    fn respond_heartbeat(&mut self, from: PeerId, instance: u64, proposal: ProposalId, now: Instant) {
        self.proposer.witness(proposal);
        let before = self.leader.leader();
        match self.leader.observe(from, proposal, instance, now) {
        | Change::Lost => {
            info!("lost leadership to {}", from);
            if let Phase::Prepared = self.proposer.phase() {
                self.proposer.abandon();
            }
        }
        | Change::Gained | Change::Unchanged => {
            if before != self.leader.leader() {
                info!("following {}", from);
            }
        }
        }
    }

    fn respond_request(&mut self, from: PeerId, entries: Batch<C>, now: Instant) {
        if !self.leader.is_leader() {
            let leader = self.leader.leader();
            self.send(from, self.instance(), Message::Refusal { leader });
            return
        }
        for entry in entries {
            if !self.delivered.contains(&entry.id()) && !self.forwarded.contains(&entry) {
                self.forwarded.push(entry);
            }
        }
        self.try_propose(now);
    }

    fn respond_refusal(&mut self, from: PeerId, now: Instant) {
        if self.leader.forget(from) {
            debug!("{} refused to lead", from);
            self.leader.defeated(now);
        }
        self.last_request = None;
    }

    /// Our campaign won phase 1.
    fn won(&mut self, proposal: ProposalId, now: Instant) {
        if let Change::Gained = self.leader.elected(proposal, now) {
            info!("gained leadership with {:?}", proposal);
        }
        self.send_heartbeat(now);
    }

    /// Hands every newly contiguous decision to the mailbox and moves every
    /// role to the next undecided instance.
    fn deliver(&mut self, now: Instant) {
        let ready = self.learner.drain_ready();
        if ready.is_empty() {
            return
        }
        for (instance, decision) in ready {
            let fresh = decision.value
                .iter()
                .filter(|entry| self.delivered.insert(entry.id()))
                .map(|entry| entry.command.clone())
                .collect::<Vec<_>>();
            info!("instance {} resolved by {:?}: {} commands", instance, decision.proposal, fresh.len());
            self.mailbox.resolve(&decision.value, fresh);
            self.forwarded.retain(|entry| !decision.value.contains(entry));
        }
        let instance = self.learner.instance();
        self.acceptor.advance(instance);
        self.proposer.reset(instance);
        self.try_propose(now);
    }

    /// Own outbox first, then forwarded entries, never beyond one batch.
    fn batch(&self) -> Batch<C> {
        let mut batch = self.mailbox.outbox();
        for entry in &self.forwarded {
            if batch.len() >= MAX_BATCH {
                break
            }
            if !batch.contains(entry) {
                batch.push(entry.clone());
            }
        }
        batch.retain(|entry| !self.delivered.contains(&entry.id()));
        batch
    }

    /// Leader only: starts or continues an attempt to get the pending batch agreed.
    fn try_propose(&mut self, now: Instant) {
        if !self.leader.is_leader() {
            return
        }
        let batch = self.batch();
        if batch.is_empty() {
            return
        }
        match self.proposer.phase() {
        | Phase::Idle if self.leader.may_campaign(now) => self.prepare(batch, true, now),
        | Phase::Prepared => {
            if let Some(proposal) = self.proposer.propose(batch.clone(), now) {
                let instance = self.instance();
                self.broadcast(instance, Message::Accept { proposal, value: batch });
            }
        }
        | _ => (),
        }
    }

    /// Stands for election when nobody leads and there is work to do.
    fn campaign(&mut self, now: Instant) {
        if !self.proposer.is_idle() || !self.leader.may_campaign(now) {
            return
        }
        let batch = self.batch();
        if batch.is_empty() {
            return
        }
        self.prepare(batch, true, now);
    }

    /// Follower only: hands our outbox to the leader, at most once per heartbeat.
    fn forward(&mut self, leader: PeerId, now: Instant) {
        if !self.mailbox.has_outgoing() {
            return
        }
        if self.last_request.map_or(false, |at| now.duration_since(at) < self.heartbeat) {
            return
        }
        self.last_request = Some(now);
        let entries = self.mailbox.outbox();
        trace!("forwarding {} entries to {}", entries.len(), leader);
        self.send(leader, self.instance(), Message::Request { entries });
    }

    fn prepare(&mut self, batch: Batch<C>, campaign: bool, now: Instant) {
        let instance = self.instance();
        let proposal = self.proposer.prepare(instance, batch, campaign, now);
        self.broadcast(instance, Message::Prepare { proposal });
    }

    fn send_heartbeat(&mut self, now: Instant) {
        if let Some(proposal) = self.leader.heartbeat_due(now) {
            let instance = self.instance();
            let uid = self.uid;
            for peer in (0..PEERS).filter(|peer| *peer != uid) {
                self.send(peer, instance, Message::Heartbeat { proposal });
            }
        }
    }

    fn send(&mut self, to: PeerId, instance: u64, message: Message<C>) {
        if !self.live[to] {
            return
        }
        self.outgoing.push((to, Envelope { from: self.uid, instance, message }));
    }

    /// Sends to every live peer, this one included.
    fn broadcast(&mut self, instance: u64, message: Message<C>) {
        for peer in 0..PEERS {
            self.send(peer, instance, message.clone());
        }
    }
}
