//! # Summary
//!
//! This module tracks the advisory leader. A peer becomes leader when one of
//! its campaigns wins phase 1 and keeps the role while no higher claim is
//! heard. Followers presume the leader dead after a few silent heartbeat
//! intervals. None of this affects safety; it only decides who proposes.

use std::time::{Duration, Instant};

use rand::rngs::StdRng;
use rand::Rng;

use crate::constants::LEADER_TIMEOUT_FACTOR;
use crate::message::ProposalId;
use crate::state::PeerId;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Change {
    Gained,
    Lost,
    Unchanged,
}

#[derive(Debug)]
pub struct Leader {
    uid: PeerId,
    interval: Duration,

    /// Peer currently trusted to propose
    current: Option<PeerId>,

    /// Highest leadership claim observed, ours included
    claim: Option<ProposalId>,

    /// Followers presume the leader dead past this point
    deadline: Instant,

    next_heartbeat: Instant,

    /// Campaign backoff in milliseconds
    backoff: f32,
    retry_at: Instant,

    /// Highest instance reported by a leader
    horizon: u64,

    /// Last time the local instance had caught up with `horizon`
    level_at: Instant,

    rng: StdRng,
}

impl Leader {
    pub fn new(uid: PeerId, interval: Duration, mut rng: StdRng, now: Instant) -> Self {
        let backoff = interval.as_millis() as f32 * rng.gen::<f32>();
        Leader {
            uid,
            interval,
            current: None,
            claim: None,
            deadline: now,
            next_heartbeat: now,
            backoff,
            retry_at: now + Duration::from_millis(backoff.round() as u64),
            horizon: 0,
            level_at: now,
            rng,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.interval * LEADER_TIMEOUT_FACTOR
    }

    pub fn leader(&self) -> Option<PeerId> {
        self.current
    }

    pub fn is_leader(&self) -> bool {
        self.current == Some(self.uid)
    }

    /// Our own campaign won phase 1 with `claim`.
    pub fn elected(&mut self, claim: ProposalId, now: Instant) -> Change {
        self.reset_backoff();
        if self.claim.map_or(false, |highest| claim < highest) {
            return Change::Unchanged
        }
        self.claim = Some(claim);
        self.next_heartbeat = now;
        if self.is_leader() {
            return Change::Unchanged
        }
        self.current = Some(self.uid);
        Change::Gained
    }

    /// Heartbeat from `from` claiming leadership with `claim` at `instance`.
    pub fn observe(&mut self, from: PeerId, claim: ProposalId, instance: u64, now: Instant) -> Change {
        if self.claim.map_or(false, |highest| claim < highest) {
            return Change::Unchanged
        }
        let was_leader = self.is_leader();
        self.claim = Some(claim);
        self.current = Some(from);
        self.deadline = now + self.timeout();
        self.horizon = std::cmp::max(self.horizon, instance);
        match was_leader && from != self.uid {
        | true => Change::Lost,
        | false => Change::Unchanged,
        }
    }

    /// Forgets a leader that has been silent for too long.
    pub fn expire(&mut self, now: Instant) -> Option<PeerId> {
        match self.current {
        | Some(leader) if leader != self.uid && now >= self.deadline => {
            self.current = None;
            Some(leader)
        }
        | _ => None,
        }
    }

    /// Forgets `peer` if it was leader.
    pub fn forget(&mut self, peer: PeerId) -> bool {
        if self.current == Some(peer) {
            self.current = None;
            return true
        }
        false
    }

    /// Returns the claim to broadcast if a heartbeat is due.
    pub fn heartbeat_due(&mut self, now: Instant) -> Option<ProposalId> {
        if !self.is_leader() || now < self.next_heartbeat {
            return None
        }
        self.next_heartbeat = now + self.interval;
        self.claim
    }

    pub fn may_campaign(&self, now: Instant) -> bool {
        now >= self.retry_at
    }

    /// Pushes the next campaign back after a rejection.
    pub fn defeated(&mut self, now: Instant) {
        let ceiling = self.timeout().as_millis() as f32;
        self.backoff = (self.backoff.max(1.0) * (1.0 + self.rng.gen::<f32>() / 2.0)).min(ceiling);
        let delay = self.backoff * (0.5 + self.rng.gen::<f32>());
        self.retry_at = now + Duration::from_millis(delay.round() as u64);
        trace!("next campaign in {:.0}ms", delay);
    }

    fn reset_backoff(&mut self) {
        self.backoff = self.interval.as_millis() as f32 * self.rng.gen::<f32>();
    }

    /// True once the local instance has trailed the leader's for a full
    /// leader timeout.
    pub fn lagging(&mut self, instance: u64, now: Instant) -> bool {
        if instance >= self.horizon {
            self.level_at = now;
            return false
        }
        now.duration_since(self.level_at) >= self.timeout()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use rand::SeedableRng;

    const INTERVAL: Duration = Duration::from_millis(100);

    fn start(uid: PeerId, now: Instant) -> Leader {
        Leader::new(uid, INTERVAL, StdRng::seed_from_u64(uid as u64), now)
    }

    #[test]
    fn test_election_gains_leadership() {
        let now = Instant::now();
        let mut leader = start(1, now);
        assert_eq!(leader.elected(ProposalId::new(3, 1), now), Change::Gained);
        assert!(leader.is_leader());
        assert_eq!(leader.heartbeat_due(now), Some(ProposalId::new(3, 1)));
        assert_eq!(leader.heartbeat_due(now), None);
        assert!(leader.heartbeat_due(now + INTERVAL).is_some());
    }

    #[test]
    fn test_higher_heartbeat_takes_over() {
        let now = Instant::now();
        let mut leader = start(1, now);
        leader.elected(ProposalId::new(3, 1), now);
        assert_eq!(leader.observe(2, ProposalId::new(4, 2), 0, now), Change::Lost);
        assert_eq!(leader.leader(), Some(2));
        assert!(leader.heartbeat_due(now).is_none());
    }

    #[test]
    fn test_lower_heartbeat_is_ignored() {
        let now = Instant::now();
        let mut leader = start(1, now);
        leader.observe(3, ProposalId::new(6, 3), 0, now);
        assert_eq!(leader.observe(2, ProposalId::new(5, 2), 0, now), Change::Unchanged);
        assert_eq!(leader.leader(), Some(3));
    }

    #[test]
    fn test_silent_leader_expires() {
        let now = Instant::now();
        let mut leader = start(0, now);
        leader.observe(2, ProposalId::new(1, 2), 0, now);
        assert_eq!(leader.expire(now + INTERVAL), None);
        assert_eq!(leader.expire(now + leader.timeout()), Some(2));
        assert_eq!(leader.leader(), None);

        // the old claim still bounds new heartbeats
        assert_eq!(leader.observe(1, ProposalId::new(1, 1), 0, now), Change::Unchanged);
        assert_eq!(leader.leader(), None);
    }

    #[test]
    fn test_own_leadership_never_expires() {
        let now = Instant::now();
        let mut leader = start(0, now);
        leader.elected(ProposalId::new(1, 0), now);
        assert_eq!(leader.expire(now + Duration::from_secs(60)), None);
        assert!(leader.is_leader());
    }

    #[test]
    fn test_defeat_pushes_campaign_back() {
        let now = Instant::now();
        let mut leader = start(0, now);
        leader.defeated(now);
        assert!(leader.may_campaign(now + leader.timeout() * 2));
    }

    #[test]
    fn test_lagging_requires_full_timeout() {
        let now = Instant::now();
        let mut leader = start(0, now);
        leader.observe(1, ProposalId::new(1, 1), 5, now);
        assert!(!leader.lagging(2, now));
        assert!(leader.lagging(2, now + leader.timeout()));
        assert!(!leader.lagging(5, now + leader.timeout()));
    }
}
