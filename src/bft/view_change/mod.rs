//! View-change reconstruction (spec §4.6): `compute_P`, `compute_C`,
//! `correct_view_change`, and the `O`/`N` set construction a new
//! primary uses to build a `NEW-VIEW`.

use std::collections::{BTreeMap, BTreeSet};

use crate::bft::communication::message::{Message, PrePrepareMessage, ReplicaId, ViewChangeMessage};
use crate::bft::crypto::hash::Digest;
use crate::bft::log::MessageLog;
use crate::bft::ordering::{Orderable, SeqNo, View};
use crate::bft::predicates::prepared;

/// `compute_P(v, M)`.
///
/// The minimal proof of every slot prepared at this replica in a view
/// strictly before `before_view`: for each sequence with any prepared
/// PRE-PREPARE in `log`, pick the one with the highest view (a slot
/// has at most one PRE-PREPARE per view from its primary, so this
/// never needs a tie-break), and include it along with its
/// supporting `2f` non-primary PREPAREs.
pub fn compute_p(before_view: View, n_replicas: usize, f: usize, log: &MessageLog) -> BTreeSet<Message> {
    let mut best: BTreeMap<SeqNo, PrePrepareMessage> = BTreeMap::new();

    for pp in log.pre_prepares() {
        if pp.view() >= before_view {
            continue;
        }
        let digest = match pp.request() {
            Some(req) => req.digest(),
            None => continue,
        };
        if !prepared(digest, pp.view(), pp.sequence_number(), n_replicas, f, log) {
            continue;
        }
        best.entry(pp.sequence_number())
            .and_modify(|cur| {
                if pp.view() > cur.view() {
                    *cur = pp.clone();
                }
            })
            .or_insert_with(|| pp.clone());
    }

    let mut proof = BTreeSet::new();
    for pp in best.values() {
        let digest = pp.request().expect("filtered to Some above").digest();
        let primary = pp.view().primary(n_replicas);
        proof.insert(Message::PrePrepare(pp.clone()));
        for prepare in log.prepares().filter(|p| {
            p.view() == pp.view()
                && p.sequence_number() == pp.sequence_number()
                && p.digest() == digest
                && p.sender().into_inner() as usize != primary
        }) {
            proof.insert(Message::Prepare(*prepare));
        }
    }
    proof
}

/// `compute_C(n, s, M)`.
///
/// The set of `CHECKPOINT(·, n, s, ·)` messages in `log` matching the
/// stable `(n,s)`. Acceptance (`|C| > f`) is the caller's
/// responsibility, so this stays a pure projection.
pub fn compute_c(seq: SeqNo, snapshot_digest: Digest, log: &MessageLog) -> BTreeSet<Message> {
    log.checkpoints()
        .filter(|c| c.sequence_number() == seq && c.snapshot_digest() == snapshot_digest)
        .map(|c| Message::Checkpoint(*c))
        .collect()
}

fn log_from_messages(msgs: impl IntoIterator<Item = Message>) -> MessageLog {
    let mut log = MessageLog::new();
    log.insert_all(msgs);
    log
}

/// `correct_view_change(msg, v, j)`.
///
/// Validates: the claimed sender matches; `C` is exactly the computed
/// witness for the claimed `(n,s)` and `|C| > f`; `P` equals the
/// canonical `compute_P` of `P` itself (idempotent, since the
/// validator has no access to the sender's full log — only to what
/// the sender claims); every `n'` referenced in `P` satisfies
/// `n' − n ≤ max_out`.
pub fn correct_view_change(
    msg: &ViewChangeMessage,
    claimed_view: View,
    sender: ReplicaId,
    n_replicas: usize,
    f: usize,
    max_out: u64,
) -> bool {
    if msg.view() != claimed_view || msg.sender() != sender {
        return false;
    }

    let c_log = log_from_messages(msg.proof_c().iter().cloned());
    let recomputed_c = compute_c(msg.stable_seq(), msg.stable_checkpoint(), &c_log);
    if &recomputed_c != msg.proof_c() || msg.proof_c().len() <= f {
        return false;
    }

    let p_log = log_from_messages(msg.proof_p().iter().cloned());
    let recomputed_p = compute_p(claimed_view, n_replicas, f, &p_log);
    if &recomputed_p != msg.proof_p() {
        return false;
    }

    msg.proof_p().iter().all(|m| match m {
        Message::PrePrepare(pp) => pp.sequence_number().into_inner() <= msg.stable_seq().into_inner() + max_out,
        _ => true,
    })
}

/// `compute_new_view_sets(v, X)`.
///
/// Merges the `P` sets of every `VIEW-CHANGE` in `X`, re-proposes
/// anything sequenced past the highest stable checkpoint among `X` as
/// set `O`, and fills the remaining gap up to the highest re-proposed
/// sequence with null PRE-PREPAREs as set `N`.
pub fn compute_new_view_sets(
    view: View,
    x: &BTreeSet<ViewChangeMessage>,
    n_replicas: usize,
) -> (BTreeSet<Message>, BTreeSet<Message>, SeqNo, SeqNo, BTreeSet<SeqNo>) {
    let merge_p: BTreeSet<Message> = x.iter().flat_map(|vc| vc.proof_p().iter().cloned()).collect();
    let max_v = x.iter().map(|vc| vc.stable_seq()).max().unwrap_or(SeqNo::ZERO);
    let primary = ReplicaId::new(view.primary(n_replicas) as u32);

    let mut best: BTreeMap<SeqNo, PrePrepareMessage> = BTreeMap::new();
    for m in merge_p.iter() {
        if let Message::PrePrepare(pp) = m {
            best.entry(pp.sequence_number())
                .and_modify(|cur| {
                    if pp.view() > cur.view() {
                        *cur = pp.clone();
                    }
                })
                .or_insert_with(|| pp.clone());
        }
    }

    let mut o_set = BTreeSet::new();
    let mut used_ns = BTreeSet::new();
    for (seq, pp) in best.iter() {
        if *seq > max_v {
            let reissued = PrePrepareMessage::new(view, *seq, pp.request().cloned(), primary);
            o_set.insert(Message::PrePrepare(reissued));
            used_ns.insert(*seq);
        }
    }

    let max_o = used_ns.iter().max().copied().unwrap_or(max_v);

    let mut n_set = BTreeSet::new();
    let mut cursor = max_v.next();
    while cursor <= max_o {
        if !used_ns.contains(&cursor) {
            n_set.insert(Message::PrePrepare(PrePrepareMessage::new(view, cursor, None, primary)));
        }
        cursor = cursor.next();
    }

    (o_set, n_set, max_v, max_o, used_ns)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bft::communication::message::{CheckpointMessage, ClientId, PrepareMessage, RequestMessage, Timestamp};

    const N_REPLICAS: usize = 4;
    const F: usize = 1;

    fn prepared_log(view: View, seq: SeqNo) -> (MessageLog, Digest) {
        let mut log = MessageLog::new();
        let req = RequestMessage::new(b"op".to_vec(), Timestamp::ZERO, ClientId::new(b"c".to_vec()));
        let digest = req.digest();
        log.insert(Message::PrePrepare(PrePrepareMessage::new(view, seq, Some(req), ReplicaId::new(0))));
        log.insert(Message::Prepare(PrepareMessage::new(view, seq, digest, ReplicaId::new(1))));
        log.insert(Message::Prepare(PrepareMessage::new(view, seq, digest, ReplicaId::new(2))));
        (log, digest)
    }

    #[test]
    fn compute_p_picks_highest_view_per_slot() {
        let (mut log, _) = prepared_log(View::ZERO, SeqNo::new(1));
        let (log2, _) = prepared_log(View::new(1), SeqNo::new(1));
        for pp in log2.pre_prepares() {
            log.insert(Message::PrePrepare(pp.clone()));
        }
        for p in log2.prepares() {
            log.insert(Message::Prepare(*p));
        }

        let p = compute_p(View::new(2), N_REPLICAS, F, &log);
        let winning = p.iter().find_map(|m| match m {
            Message::PrePrepare(pp) if pp.sequence_number() == SeqNo::new(1) => Some(pp.view()),
            _ => None,
        });
        assert_eq!(winning, Some(View::new(1)));
    }

    #[test]
    fn compute_c_filters_by_seq_and_digest() {
        let mut log = MessageLog::new();
        let digest = Digest::from_canonical(b"snapshot");
        log.insert(Message::Checkpoint(CheckpointMessage::new(View::ZERO, SeqNo::new(50), digest, ReplicaId::new(0))));
        log.insert(Message::Checkpoint(CheckpointMessage::new(View::ZERO, SeqNo::new(50), digest, ReplicaId::new(1))));
        log.insert(Message::Checkpoint(CheckpointMessage::new(View::ZERO, SeqNo::new(100), digest, ReplicaId::new(2))));

        let c = compute_c(SeqNo::new(50), digest, &log);
        assert_eq!(c.len(), 2);
    }

    #[test]
    fn new_view_sets_reissue_past_max_v_and_fill_gaps() {
        let (log, _) = prepared_log(View::ZERO, SeqNo::new(5));
        let p = compute_p(View::new(1), N_REPLICAS, F, &log);

        let vc = ViewChangeMessage::new(
            View::new(1),
            SeqNo::new(2),
            Digest::from_canonical(b"chk"),
            BTreeSet::new(),
            p,
            ReplicaId::new(1),
        );
        let mut x = BTreeSet::new();
        x.insert(vc);

        let (o, n, max_v, max_o, used_ns) = compute_new_view_sets(View::new(1), &x, N_REPLICAS);
        assert_eq!(max_v, SeqNo::new(2));
        assert_eq!(max_o, SeqNo::new(5));
        assert_eq!(used_ns.len(), 1);
        assert_eq!(o.len(), 1);
        // gap (2,5] minus {5} used => {3,4} as null fillers
        assert_eq!(n.len(), 2);
    }
}
