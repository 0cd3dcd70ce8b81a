//! The replica state machine: the product of the slot, view, and
//! checkpoint machines described in spec §4.7.
//!
//! `Replica` owns every piece of mutable protocol state exclusively
//! (spec §5, "Shared resources"); nothing here is shared across
//! replicas in-process. [`Replica::route_receive`] is the sole entry
//! point.

mod egress;
mod ingress;
mod router;

use std::collections::BTreeMap;

use log::info;

use crate::bft::checkpoint::Snapshot;
use crate::bft::communication::message::{ClientId, Message, ReplicaId, Timestamp};
use crate::bft::config::ReplicaConfig;
use crate::bft::crypto::signature::SignatureVerifier;
use crate::bft::error::*;
use crate::bft::executable::Application;
use crate::bft::log::MessageLog;
use crate::bft::ordering::{Orderable, SeqNo, View};

/// Progress of a single `(v,n)` slot through the slot machine (spec
/// §4.7), exposed for introspection and tests. Mirrors the original
/// source's `_debug_status` (spec Appendix C, "Supplemented
/// features").
#[derive(Debug, Clone, Copy, Default, Eq, PartialEq)]
pub struct SlotStatus {
    pub pre_prepared: bool,
    pub prepared: bool,
    pub committed: bool,
    pub executed: bool,
    pub prepare_votes: usize,
    pub commit_votes: usize,
}

/// A single replica's local pBFT state machine.
pub struct Replica<A, V> {
    id: ReplicaId,
    n_replicas: usize,
    f: usize,
    max_out: u64,
    chkpt_int: u64,

    view: View,
    log: MessageLog,
    out: Vec<Message>,

    val: crate::bft::crypto::hash::Digest,
    last_rep: BTreeMap<ClientId, Vec<u8>>,
    last_rep_t: BTreeMap<ClientId, Timestamp>,

    seqno: SeqNo,
    last_exec: SeqNo,
    checkpoints: BTreeMap<SeqNo, Snapshot>,

    halted: bool,

    application: A,
    verifier: V,
}

impl<A, V> Replica<A, V>
where
    A: Application,
    V: SignatureVerifier,
{
    /// Constructs a new replica, seeding the genesis checkpoint.
    ///
    /// `R` synthetic `CHECKPOINT(0,0,snapshot₀,k)` messages are seeded
    /// (one per peer) so that the genesis checkpoint is quorum-stable
    /// from the start (spec §3 "Lifecycle", §9 Design Notes: "this is
    /// retained as the correct startup procedure").
    pub fn new(config: ReplicaConfig, mut application: A, verifier: V) -> Result<Self> {
        let val = application.initial_state();
        let genesis = Snapshot::new(val, BTreeMap::new(), BTreeMap::new());

        let mut checkpoints = BTreeMap::new();
        checkpoints.insert(SeqNo::ZERO, genesis.clone());

        let mut log = MessageLog::new();
        let genesis_digest = genesis.digest()?;
        for k in 0..config.n_replicas {
            log.insert(Message::Checkpoint(
                crate::bft::communication::message::CheckpointMessage::new(
                    View::ZERO,
                    SeqNo::ZERO,
                    genesis_digest,
                    ReplicaId::new(k as u32),
                ),
            ));
        }

        info!(
            "replica {:?} initialized, R={} f={}",
            config.id,
            config.n_replicas,
            config.f()
        );

        Ok(Self {
            id: config.id,
            n_replicas: config.n_replicas,
            f: config.f(),
            max_out: config.max_out,
            chkpt_int: config.chkpt_int,
            view: View::ZERO,
            log,
            out: Vec::new(),
            val,
            last_rep: BTreeMap::new(),
            last_rep_t: BTreeMap::new(),
            seqno: SeqNo::ZERO,
            last_exec: SeqNo::ZERO,
            checkpoints,
            halted: false,
            application,
            verifier,
        })
    }

    /// This replica's own id.
    pub fn id(&self) -> ReplicaId {
        self.id
    }

    /// Current view number.
    pub fn view(&self) -> View {
        self.view
    }

    /// Highest executed sequence number.
    pub fn last_exec(&self) -> SeqNo {
        self.last_exec
    }

    /// `primary(v) = v mod R`.
    pub fn primary(&self, view: View) -> ReplicaId {
        ReplicaId::new(view.primary(self.n_replicas) as u32)
    }

    /// Whether this replica is the primary of its current view.
    pub fn is_primary(&self) -> bool {
        self.primary(self.view) == self.id
    }

    /// `stable_n`: the minimum `n` across `checkpoints`.
    pub fn stable_n(&self) -> SeqNo {
        self.checkpoints.keys().next().copied().unwrap_or(SeqNo::ZERO)
    }

    /// The snapshot paired with `stable_n`.
    pub fn stable_chkpt(&self) -> &Snapshot {
        self.checkpoints
            .get(&self.stable_n())
            .expect("invariant 4: checkpoints always contains the stable pair")
    }

    /// Window predicate: `0 < n − stable_n < max_out`.
    pub fn in_w(&self, n: SeqNo) -> bool {
        let stable = self.stable_n();
        n > stable && n.into_inner() - stable.into_inner() < self.max_out
    }

    /// View-and-window predicate: `view == v ∧ in_w(n)`.
    pub fn in_wv(&self, v: View, n: SeqNo) -> bool {
        self.view == v && self.in_w(n)
    }

    /// Byzantine fault tolerance threshold for this cluster.
    pub fn f(&self) -> usize {
        self.f
    }

    /// Cluster size.
    pub fn n_replicas(&self) -> usize {
        self.n_replicas
    }

    /// Drains every message queued in `out` since the last drain
    /// (spec §6, "Outbound").
    pub fn drain_out(&mut self) -> Vec<Message> {
        std::mem::take(&mut self.out)
    }

    /// A read-only view of the message log, for introspection and
    /// tests.
    pub fn log(&self) -> &MessageLog {
        &self.log
    }

    /// Whether this replica has halted after an `InvariantViolation`
    /// (spec §7).
    pub fn is_halted(&self) -> bool {
        self.halted
    }

    /// Promotes the newest quorum-confirmed checkpoint candidate to
    /// stable, pruning every older entry from `checkpoints` and every
    /// log message at or below the new floor (spec §4.7 "Checkpoint
    /// machine", invariant 6).
    ///
    /// `execute` inserts every checkpoint it produces into
    /// `checkpoints` unconditionally (spec §4.4); this is what turns
    /// the oldest surviving entry into the true `stable_n` once `2f+1`
    /// matching `CHECKPOINT`s back it.
    pub(super) fn advance_stable_checkpoint(&mut self) {
        let quorum = 2 * self.f + 1;

        let confirmed = self
            .checkpoints
            .iter()
            .filter_map(|(seq, snapshot)| {
                let digest = snapshot.digest().ok()?;
                let senders: std::collections::HashSet<_> = self
                    .log
                    .checkpoints()
                    .filter(|c| c.sequence_number() == *seq && c.snapshot_digest() == digest)
                    .map(|c| c.sender())
                    .collect();
                if senders.len() >= quorum {
                    Some(*seq)
                } else {
                    None
                }
            })
            .max();

        if let Some(new_stable) = confirmed {
            if new_stable > self.stable_n() {
                self.checkpoints.retain(|seq, _| *seq >= new_stable);
                let floor = SeqNo::new(new_stable.into_inner().saturating_sub(self.chkpt_int));
                self.log.garbage_collect_below(floor);
            }
        }
    }

    /// Returns the progress of the `(view, n)` slot through the slot
    /// machine (spec §4.7), for introspection and tests.
    pub fn slot_status(&self, view: View, n: SeqNo) -> SlotStatus {
        let pre_prepared = self
            .log
            .pre_prepares()
            .any(|pp| pp.view() == view && pp.sequence_number() == n);

        let digest = self.log.pre_prepares().find_map(|pp| {
            if pp.view() == view && pp.sequence_number() == n {
                pp.request().map(|r| r.digest())
            } else {
                None
            }
        });

        let prepare_votes = digest
            .map(|d| {
                self.log
                    .prepares()
                    .filter(|p| p.view() == view && p.sequence_number() == n && p.digest() == d)
                    .count()
            })
            .unwrap_or(0);
        let commit_votes = digest
            .map(|d| {
                self.log
                    .commits()
                    .filter(|c| c.view() == view && c.sequence_number() == n && c.digest() == d)
                    .count()
            })
            .unwrap_or(0);

        let prepared = digest
            .map(|d| crate::bft::predicates::prepared(d, view, n, self.n_replicas, self.f, &self.log))
            .unwrap_or(false);
        let committed = digest
            .map(|d| crate::bft::predicates::committed(d, view, n, self.n_replicas, self.f, &self.log))
            .unwrap_or(false);
        let executed = n <= self.last_exec && committed;

        SlotStatus {
            pre_prepared,
            prepared,
            committed,
            executed,
            prepare_votes,
            commit_votes,
        }
    }
}
