//! The replica's message log (`in`, spec §3).
//!
//! Backed by one `HashSet` per message kind (spec §9, "Message log as
//! heterogeneous set"), mirroring the original source's `inset`
//! abstraction (`bftinset.py`), which partitions an untyped tuple set
//! by its first field so that a per-kind scan is `O(|kind|)` instead
//! of `O(|in|)`.

use std::collections::HashSet;

use crate::bft::communication::message::{
    CheckpointMessage, CommitMessage, Message, NewViewMessage, PrePrepareMessage, PrepareMessage,
    RequestMessage, ViewChangeMessage,
};
use crate::bft::crypto::hash::Digest;
use crate::bft::ordering::{Orderable, SeqNo};

/// The replica's append-only message log, partitioned by kind.
///
/// `REPLY` is never logged here: it is emitted straight to `out` from
/// `execute` and cached separately in the replica's `last_rep`/
/// `last_rep_t` maps (spec §3).
#[derive(Debug, Default, Clone)]
pub struct MessageLog {
    requests: HashSet<RequestMessage>,
    pre_prepares: HashSet<PrePrepareMessage>,
    prepares: HashSet<PrepareMessage>,
    commits: HashSet<CommitMessage>,
    checkpoints: HashSet<CheckpointMessage>,
    view_changes: HashSet<ViewChangeMessage>,
    new_views: HashSet<NewViewMessage>,
}

impl MessageLog {
    /// Returns a new, empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a message into its kind-partitioned set.
    ///
    /// Returns `true` if the message was not already present, mirroring
    /// `HashSet::insert`; a duplicate receipt is therefore a safe,
    /// observable no-op (spec §5, "idempotent in `in`").
    pub fn insert(&mut self, msg: Message) -> bool {
        match msg {
            Message::Request(m) => self.requests.insert(m),
            Message::PrePrepare(m) => self.pre_prepares.insert(m),
            Message::Prepare(m) => self.prepares.insert(m),
            Message::Commit(m) => self.commits.insert(m),
            Message::Checkpoint(m) => self.checkpoints.insert(m),
            Message::ViewChange(m) => self.view_changes.insert(m),
            Message::NewView(m) => self.new_views.insert(m),
            Message::Reply(_) => {
                // REPLY is never logged; see the type doc above.
                false
            }
        }
    }

    /// Appends every message in `msgs` to the log (spec §9, "Implicit
    /// in-place set union" becomes a clearly scoped batch append).
    pub fn insert_all(&mut self, msgs: impl IntoIterator<Item = Message>) {
        for msg in msgs {
            self.insert(msg);
        }
    }

    /// Returns whether `msg` is present in its kind-partitioned set.
    pub fn contains(&self, msg: &Message) -> bool {
        match msg {
            Message::Request(m) => self.requests.contains(m),
            Message::PrePrepare(m) => self.pre_prepares.contains(m),
            Message::Prepare(m) => self.prepares.contains(m),
            Message::Commit(m) => self.commits.contains(m),
            Message::Checkpoint(m) => self.checkpoints.contains(m),
            Message::ViewChange(m) => self.view_changes.contains(m),
            Message::NewView(m) => self.new_views.contains(m),
            Message::Reply(_) => false,
        }
    }

    /// Returns a reference to the logged REQUEST whose digest is
    /// `digest`, if any.
    pub fn request_by_digest(&self, digest: Digest) -> Option<&RequestMessage> {
        self.requests.iter().find(|r| r.digest() == digest)
    }

    /// Returns whether a REQUEST with the given digest is already
    /// logged.
    pub fn has_request(&self, digest: Digest) -> bool {
        self.request_by_digest(digest).is_some()
    }

    /// Removes a REQUEST from the log once it has executed or has
    /// been superseded by a stable checkpoint (spec invariant 6).
    pub fn remove_request(&mut self, req: &RequestMessage) {
        self.requests.remove(req);
    }

    pub fn requests(&self) -> impl Iterator<Item = &RequestMessage> {
        self.requests.iter()
    }

    pub fn pre_prepares(&self) -> impl Iterator<Item = &PrePrepareMessage> {
        self.pre_prepares.iter()
    }

    pub fn prepares(&self) -> impl Iterator<Item = &PrepareMessage> {
        self.prepares.iter()
    }

    pub fn commits(&self) -> impl Iterator<Item = &CommitMessage> {
        self.commits.iter()
    }

    pub fn checkpoints(&self) -> impl Iterator<Item = &CheckpointMessage> {
        self.checkpoints.iter()
    }

    pub fn view_changes(&self) -> impl Iterator<Item = &ViewChangeMessage> {
        self.view_changes.iter()
    }

    pub fn new_views(&self) -> impl Iterator<Item = &NewViewMessage> {
        self.new_views.iter()
    }

    /// Total number of messages across every kind.
    pub fn len(&self) -> usize {
        self.requests.len()
            + self.pre_prepares.len()
            + self.prepares.len()
            + self.commits.len()
            + self.checkpoints.len()
            + self.view_changes.len()
            + self.new_views.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Discards `PRE-PREPARE`/`PREPARE`/`COMMIT`/`CHECKPOINT` entries
    /// whose sequence number is at or below `floor`, once a stable
    /// checkpoint makes them irrelevant (spec invariant 6, Design Note
    /// on checkpoint garbage collection).
    pub fn garbage_collect_below(&mut self, floor: SeqNo) {
        self.pre_prepares.retain(|m| m.sequence_number() > floor);
        self.prepares.retain(|m| m.sequence_number() > floor);
        self.commits.retain(|m| m.sequence_number() > floor);
        self.checkpoints.retain(|m| m.sequence_number() > floor);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bft::communication::message::{ClientId, ReplicaId, Timestamp};
    use crate::bft::ordering::View;

    fn sample_request() -> RequestMessage {
        RequestMessage::new(b"op".to_vec(), Timestamp::ZERO, ClientId::new(b"c".to_vec()))
    }

    #[test]
    fn insert_is_idempotent() {
        let mut log = MessageLog::new();
        let req = sample_request();
        assert!(log.insert(Message::Request(req.clone())));
        assert!(!log.insert(Message::Request(req)));
        assert_eq!(log.len(), 1);
    }

    #[test]
    fn per_kind_partitioning() {
        let mut log = MessageLog::new();
        log.insert(Message::Request(sample_request()));
        log.insert(Message::Prepare(PrepareMessage::new(
            View::ZERO,
            SeqNo::new(1),
            Digest::from_canonical(b"x"),
            ReplicaId::new(1),
        )));
        assert_eq!(log.requests().count(), 1);
        assert_eq!(log.prepares().count(), 1);
        assert_eq!(log.commits().count(), 0);
    }

    #[test]
    fn garbage_collection_prunes_old_slots() {
        let mut log = MessageLog::new();
        for n in 1..=5u64 {
            log.insert(Message::Commit(CommitMessage::new(
                View::ZERO,
                SeqNo::new(n),
                Digest::from_canonical(b"x"),
                ReplicaId::new(0),
            )));
        }
        log.garbage_collect_below(SeqNo::new(3));
        assert_eq!(log.commits().count(), 2);
        assert!(log.commits().all(|m| m.sequence_number().into_inner() > 3));
    }
}
