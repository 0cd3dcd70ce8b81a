//! Pure predicates over a message log (spec §4.2).
//!
//! `prepared` and `committed` are the two safety predicates pBFT is
//! built on: every egress transition in `replica::egress` is gated by
//! one of them. Both take an explicit message set so that view-change
//! code can query them against a constructed subset instead of a
//! replica's live log (spec §4.2, "defaulting to `in` yields the
//! normal-path queries").

use std::collections::HashSet;

use crate::bft::crypto::hash::Digest;
use crate::bft::log::MessageLog;
use crate::bft::ordering::{Orderable, SeqNo, View};

/// `prepared(m, v, n, M)`.
///
/// True iff `M` contains `PRE-PREPARE(v,n,m,primary(v))` and at least
/// `2f` distinct senders other than `primary(v)` contributed
/// `PREPARE(v,n,hash(m),·)`.
pub fn prepared(digest: Digest, view: View, seq: SeqNo, n_replicas: usize, f: usize, log: &MessageLog) -> bool {
    let primary = view.primary(n_replicas);

    let has_pre_prepare = log.pre_prepares().any(|pp| {
        pp.view() == view
            && pp.sequence_number() == seq
            && pp.sender().into_inner() as usize == primary
            && pp.request().map(|r| r.digest()) == Some(digest)
    });
    if !has_pre_prepare {
        return false;
    }

    let preparers: HashSet<_> = log
        .prepares()
        .filter(|p| {
            p.view() == view
                && p.sequence_number() == seq
                && p.digest() == digest
                && p.sender().into_inner() as usize != primary
        })
        .map(|p| p.sender())
        .collect();

    preparers.len() >= 2 * f
}

/// `committed(m, v, n, M)`.
///
/// True iff some PRE-PREPARE in `M` pins `(n,m)` under `primary(its
/// view)` — or `m` itself is present in `M`, covering a request that
/// arrived without its PRE-PREPARE — AND at least `2f+1` distinct
/// senders contributed `COMMIT(v,n,hash(m),·)` in `M`.
///
/// Both the pinning scan and the commit-count scan run against the
/// same set `M`; this mirrors the original source's `commited`, which
/// (per spec §9 Design Notes) scans the replica's full log for the
/// pinning clause while accepting `M` for the quorum check. The two
/// scans are unified here against `log` for consistency, as the spec
/// directs.
pub fn committed(digest: Digest, view: View, seq: SeqNo, n_replicas: usize, f: usize, log: &MessageLog) -> bool {
    let pinned = log.pre_prepares().any(|pp| {
        pp.sequence_number() == seq
            && pp.sender().into_inner() as usize == pp.view().primary(n_replicas)
            && pp.request().map(|r| r.digest()) == Some(digest)
    }) || log.has_request(digest);

    if !pinned {
        return false;
    }

    let committers: HashSet<_> = log
        .commits()
        .filter(|c| c.view() == view && c.sequence_number() == seq && c.digest() == digest)
        .map(|c| c.sender())
        .collect();

    committers.len() >= 2 * f + 1
}

/// `has_new_view(v)`.
///
/// True when `v == 0` (the genesis view needs no NEW-VIEW certificate)
/// or `M` contains some `NEW-VIEW(v,…)`.
pub fn has_new_view(view: View, log: &MessageLog) -> bool {
    view == View::ZERO || log.new_views().any(|nv| nv.view() == view)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bft::communication::message::{
        ClientId, CommitMessage, Message, PrePrepareMessage, PrepareMessage, ReplicaId,
        RequestMessage, Timestamp,
    };

    const N_REPLICAS: usize = 4;
    const F: usize = 1;

    fn request() -> RequestMessage {
        RequestMessage::new(b"op".to_vec(), Timestamp::ZERO, ClientId::new(b"c".to_vec()))
    }

    #[test]
    fn not_prepared_without_pre_prepare() {
        let log = MessageLog::new();
        let req = request();
        assert!(!prepared(req.digest(), View::ZERO, SeqNo::new(1), N_REPLICAS, F, &log));
    }

    #[test]
    fn prepared_with_pre_prepare_and_2f_prepares() {
        let mut log = MessageLog::new();
        let req = request();
        let digest = req.digest();
        let view = View::ZERO;
        let seq = SeqNo::new(1);

        log.insert(Message::PrePrepare(PrePrepareMessage::new(
            view,
            seq,
            Some(req),
            ReplicaId::new(0),
        )));
        assert!(!prepared(digest, view, seq, N_REPLICAS, F, &log));

        log.insert(Message::Prepare(PrepareMessage::new(view, seq, digest, ReplicaId::new(1))));
        assert!(!prepared(digest, view, seq, N_REPLICAS, F, &log));

        log.insert(Message::Prepare(PrepareMessage::new(view, seq, digest, ReplicaId::new(2))));
        assert!(prepared(digest, view, seq, N_REPLICAS, F, &log));
    }

    #[test]
    fn committed_requires_2f_plus_1_commits() {
        let mut log = MessageLog::new();
        let req = request();
        let digest = req.digest();
        let view = View::ZERO;
        let seq = SeqNo::new(1);

        log.insert(Message::PrePrepare(PrePrepareMessage::new(
            view,
            seq,
            Some(req),
            ReplicaId::new(0),
        )));

        log.insert(Message::Commit(CommitMessage::new(view, seq, digest, ReplicaId::new(0))));
        assert!(!committed(digest, view, seq, N_REPLICAS, F, &log));

        log.insert(Message::Commit(CommitMessage::new(view, seq, digest, ReplicaId::new(1))));
        assert!(!committed(digest, view, seq, N_REPLICAS, F, &log));

        log.insert(Message::Commit(CommitMessage::new(view, seq, digest, ReplicaId::new(2))));
        assert!(committed(digest, view, seq, N_REPLICAS, F, &log));
    }

    #[test]
    fn has_new_view_true_at_genesis() {
        let log = MessageLog::new();
        assert!(has_new_view(View::ZERO, &log));
        assert!(!has_new_view(View::new(1), &log));
    }
}
