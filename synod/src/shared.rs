//! # Summary
//!
//! This module implements the only state shared between the caller's thread
//! and the consensus loop: the outbox of submitted commands that are not yet
//! agreed, and the inbox of agreed commands not yet handed to the caller.
//! Both queues sit behind a single lock that is never held across I/O.

use std::collections::VecDeque;

use hashbrown::HashSet as Set;
use parking_lot::Mutex;

use crate::constants::MAX_BATCH;
use crate::message::Entry;
use crate::state::{Command, PeerId};

pub struct Mailbox<C: Command> {
    uid: PeerId,
    queues: Mutex<Queues<C>>,
}

#[derive(Derivative)]
#[derivative(Default(bound = ""))]
struct Queues<C: Command> {
    next_seq: u64,
    outbox: Vec<Entry<C>>,
    inbox: VecDeque<C>,
    resolved: u64,
}

impl<C: Command> Mailbox<C> {
    pub fn new(uid: PeerId) -> Self {
        Mailbox {
            uid,
            queues: Mutex::new(Queues::default()),
        }
    }

    pub fn uid(&self) -> PeerId {
        self.uid
    }

    /// Appends a locally-originated command to the outbox.
    pub fn push(&self, command: C) {
        let mut queues = self.queues.lock();
        let seq = queues.next_seq;
        queues.next_seq += 1;
        queues.outbox.push(Entry { origin: self.uid, seq, command });
    }

    /// Removes and returns every agreed command, oldest first.
    pub fn drain(&self) -> Vec<C> {
        self.queues.lock().inbox.drain(..).collect()
    }

    /// Copies the oldest outbox entries, at most one batch worth.
    pub fn outbox(&self) -> Vec<Entry<C>> {
        let queues = self.queues.lock();
        queues.outbox.iter().take(MAX_BATCH).cloned().collect()
    }

    pub fn has_outgoing(&self) -> bool {
        !self.queues.lock().outbox.is_empty()
    }

    /// Number of instances resolved so far.
    pub fn resolved(&self) -> u64 {
        self.queues.lock().resolved
    }

    /// Records the outcome of one instance: drops our own entries carried by
    /// `batch` from the outbox and appends the `fresh` commands to the inbox.
    pub fn resolve(&self, batch: &[Entry<C>], fresh: Vec<C>) {
        let carried = batch.iter()
            .filter(|entry| entry.origin == self.uid)
            .map(|entry| entry.seq)
            .collect::<Set<_>>();
        let mut queues = self.queues.lock();
        if !carried.is_empty() {
            queues.outbox.retain(|entry| !carried.contains(&entry.seq));
        }
        queues.inbox.extend(fresh);
        queues.resolved += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_assigns_increasing_seq() {
        let mailbox = Mailbox::new(2);
        mailbox.push("a".to_string());
        mailbox.push("b".to_string());
        let outbox = mailbox.outbox();
        assert_eq!(outbox.iter().map(Entry::id).collect::<Vec<_>>(), vec![(2, 0), (2, 1)]);
    }

    #[test]
    fn test_drain_empties_inbox() {
        let mailbox = Mailbox::<String>::new(0);
        assert!(mailbox.drain().is_empty());
        mailbox.resolve(&[], vec!["x".to_string(), "y".to_string()]);
        assert_eq!(mailbox.drain(), vec!["x", "y"]);
        assert!(mailbox.drain().is_empty());
        assert_eq!(mailbox.resolved(), 1);
    }

    #[test]
    fn test_resolve_only_removes_own_carried_entries() {
        let mailbox = Mailbox::new(1);
        mailbox.push("a".to_string());
        mailbox.push("b".to_string());
        let mut batch = mailbox.outbox();
        batch.truncate(1);
        batch.push(Entry { origin: 3, seq: 1, command: "c".to_string() });
        mailbox.resolve(&batch, vec!["a".to_string(), "c".to_string()]);

        let left = mailbox.outbox();
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].command, "b");
        assert!(mailbox.has_outgoing());
    }

    #[test]
    fn test_outbox_snapshot_is_bounded() {
        let mailbox = Mailbox::new(0);
        for n in 0..(MAX_BATCH + 10) {
            mailbox.push(n as u32);
        }
        assert_eq!(mailbox.outbox().len(), MAX_BATCH);
    }
}
