//! This module contains types associated with messages traded
//! between the replicas of a BFT cluster.
//!
//! All eight message kinds named by the protocol (spec §3) are
//! modeled here as a closed tagged variant; arity and field types are
//! enforced at construction, so a router's dispatch is exhaustive
//! variant matching rather than an untyped arity check.

use std::collections::BTreeSet;

use serde::{Serialize, Deserialize};

use crate::bft::crypto::hash::Digest;
use crate::bft::ordering::{Orderable, SeqNo, View};

/// Identifies one of the `R` replicas in the cluster, `i ∈ [0,R)`.
#[derive(Serialize, Deserialize, Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct ReplicaId(u32);

impl ReplicaId {
    /// Wraps a raw replica index.
    pub fn new(id: u32) -> Self {
        ReplicaId(id)
    }

    /// Returns the raw replica index.
    pub fn into_inner(self) -> u32 {
        self.0
    }
}

/// Opaque client identity. Clients are not addressed by replica index;
/// their identity is whatever bytes the transport collaborator uses to
/// route a `REPLY` back.
#[derive(Serialize, Deserialize, Debug, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct ClientId(Vec<u8>);

impl ClientId {
    /// Wraps raw client-identifying bytes.
    pub fn new(bytes: Vec<u8>) -> Self {
        ClientId(bytes)
    }

    /// Returns the underlying bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

/// A monotonic scalar attached to a client's requests.
///
/// Stored as hundredths, so that equality, ordering and hashing are
/// exact, unlike a bare `f64`. The canonical encoding used for request
/// digests (spec §4.1) renders this back out with two decimal places,
/// matching the source's `"%2.2f" % t`.
#[derive(Serialize, Deserialize, Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Default)]
pub struct Timestamp(i64);

impl Timestamp {
    /// The default timestamp for a client with no prior requests.
    pub const ZERO: Timestamp = Timestamp(0);

    /// Constructs a `Timestamp` from a value already scaled to
    /// hundredths (e.g. `50` means `0.50`).
    pub fn from_hundredths(raw: i64) -> Self {
        Timestamp(raw)
    }

    /// Constructs a `Timestamp` from a floating-point seconds value,
    /// rounding to two decimal places. Convenience for callers and
    /// tests mirroring the scenarios in spec §8 (e.g. `t = 0.5`).
    pub fn from_f64(t: f64) -> Self {
        Timestamp((t * 100.0).round() as i64)
    }

    fn canonical_bytes(self) -> Vec<u8> {
        let whole = self.0 / 100;
        let frac = (self.0 % 100).abs();
        format!("{}.{:02}", whole, frac).into_bytes()
    }
}

/// A request from a client to execute an opaque operation.
#[derive(Serialize, Deserialize, Debug, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct RequestMessage {
    operation: Vec<u8>,
    timestamp: Timestamp,
    client: ClientId,
}

impl RequestMessage {
    /// Creates a new `REQUEST(op, t, c)`.
    pub fn new(operation: Vec<u8>, timestamp: Timestamp, client: ClientId) -> Self {
        Self {
            operation,
            timestamp,
            client,
        }
    }

    /// Returns the opaque operation bytes.
    pub fn operation(&self) -> &[u8] {
        &self.operation
    }

    /// Returns the client's timestamp for this request.
    pub fn timestamp(&self) -> Timestamp {
        self.timestamp
    }

    /// Returns the requesting client's identity.
    pub fn client(&self) -> &ClientId {
        &self.client
    }

    /// Computes `hash(m)`: the digest of the canonical encoding
    /// `op ‖ "||" ‖ t ‖ "||" ‖ c` (spec §4.1).
    pub fn digest(&self) -> Digest {
        let mut canonical = Vec::with_capacity(self.operation.len() + self.client.0.len() + 16);
        canonical.extend_from_slice(&self.operation);
        canonical.extend_from_slice(b"||");
        canonical.extend_from_slice(&self.timestamp.canonical_bytes());
        canonical.extend_from_slice(b"||");
        canonical.extend_from_slice(&self.client.0);
        Digest::from_canonical(&canonical)
    }
}

impl From<i64> for Timestamp {
    fn from(raw: i64) -> Self {
        Timestamp(raw)
    }
}

/// `PRE-PREPARE(v, n, m, j)`. `request` is `None` for a NEW-VIEW
/// null-filler slot (spec §4.6, set `N`).
#[derive(Serialize, Deserialize, Debug, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct PrePrepareMessage {
    view: View,
    seq: SeqNo,
    request: Option<RequestMessage>,
    sender: ReplicaId,
}

impl PrePrepareMessage {
    pub fn new(view: View, seq: SeqNo, request: Option<RequestMessage>, sender: ReplicaId) -> Self {
        Self {
            view,
            seq,
            request,
            sender,
        }
    }

    pub fn view(&self) -> View {
        self.view
    }

    pub fn request(&self) -> Option<&RequestMessage> {
        self.request.as_ref()
    }

    pub fn sender(&self) -> ReplicaId {
        self.sender
    }
}

impl Orderable for PrePrepareMessage {
    fn sequence_number(&self) -> SeqNo {
        self.seq
    }
}

/// `PREPARE(v, n, d, j)`.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct PrepareMessage {
    view: View,
    seq: SeqNo,
    digest: Digest,
    sender: ReplicaId,
}

impl PrepareMessage {
    pub fn new(view: View, seq: SeqNo, digest: Digest, sender: ReplicaId) -> Self {
        Self {
            view,
            seq,
            digest,
            sender,
        }
    }

    pub fn view(&self) -> View {
        self.view
    }

    pub fn digest(&self) -> Digest {
        self.digest
    }

    pub fn sender(&self) -> ReplicaId {
        self.sender
    }
}

impl Orderable for PrepareMessage {
    fn sequence_number(&self) -> SeqNo {
        self.seq
    }
}

/// `COMMIT(v, n, d, j)`.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct CommitMessage {
    view: View,
    seq: SeqNo,
    digest: Digest,
    sender: ReplicaId,
}

impl CommitMessage {
    pub fn new(view: View, seq: SeqNo, digest: Digest, sender: ReplicaId) -> Self {
        Self {
            view,
            seq,
            digest,
            sender,
        }
    }

    pub fn view(&self) -> View {
        self.view
    }

    pub fn digest(&self) -> Digest {
        self.digest
    }

    pub fn sender(&self) -> ReplicaId {
        self.sender
    }
}

impl Orderable for CommitMessage {
    fn sequence_number(&self) -> SeqNo {
        self.seq
    }
}

/// `REPLY(v, t, c, j, r)`.
#[derive(Serialize, Deserialize, Debug, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct ReplyMessage {
    view: View,
    timestamp: Timestamp,
    client: ClientId,
    sender: ReplicaId,
    result: Vec<u8>,
}

impl ReplyMessage {
    pub fn new(
        view: View,
        timestamp: Timestamp,
        client: ClientId,
        sender: ReplicaId,
        result: Vec<u8>,
    ) -> Self {
        Self {
            view,
            timestamp,
            client,
            sender,
            result,
        }
    }

    pub fn view(&self) -> View {
        self.view
    }

    pub fn timestamp(&self) -> Timestamp {
        self.timestamp
    }

    pub fn client(&self) -> &ClientId {
        &self.client
    }

    pub fn sender(&self) -> ReplicaId {
        self.sender
    }

    pub fn result(&self) -> &[u8] {
        &self.result
    }
}

/// `CHECKPOINT(v, n, s, j)`.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct CheckpointMessage {
    view: View,
    seq: SeqNo,
    snapshot_digest: Digest,
    sender: ReplicaId,
}

impl CheckpointMessage {
    pub fn new(view: View, seq: SeqNo, snapshot_digest: Digest, sender: ReplicaId) -> Self {
        Self {
            view,
            seq,
            snapshot_digest,
            sender,
        }
    }

    pub fn view(&self) -> View {
        self.view
    }

    pub fn snapshot_digest(&self) -> Digest {
        self.snapshot_digest
    }

    pub fn sender(&self) -> ReplicaId {
        self.sender
    }
}

impl Orderable for CheckpointMessage {
    fn sequence_number(&self) -> SeqNo {
        self.seq
    }
}

/// `VIEW-CHANGE(v, n, s, C, P, j)`.
#[derive(Serialize, Deserialize, Debug, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct ViewChangeMessage {
    view: View,
    stable_seq: SeqNo,
    stable_checkpoint: Digest,
    proof_c: BTreeSet<Message>,
    proof_p: BTreeSet<Message>,
    sender: ReplicaId,
}

impl ViewChangeMessage {
    pub fn new(
        view: View,
        stable_seq: SeqNo,
        stable_checkpoint: Digest,
        proof_c: BTreeSet<Message>,
        proof_p: BTreeSet<Message>,
        sender: ReplicaId,
    ) -> Self {
        Self {
            view,
            stable_seq,
            stable_checkpoint,
            proof_c,
            proof_p,
            sender,
        }
    }

    pub fn view(&self) -> View {
        self.view
    }

    pub fn stable_seq(&self) -> SeqNo {
        self.stable_seq
    }

    pub fn stable_checkpoint(&self) -> Digest {
        self.stable_checkpoint
    }

    pub fn proof_c(&self) -> &BTreeSet<Message> {
        &self.proof_c
    }

    pub fn proof_p(&self) -> &BTreeSet<Message> {
        &self.proof_p
    }

    pub fn sender(&self) -> ReplicaId {
        self.sender
    }
}

/// `NEW-VIEW(v, X, O, N, j)`.
#[derive(Serialize, Deserialize, Debug, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct NewViewMessage {
    view: View,
    gathered: BTreeSet<Message>,
    o_set: BTreeSet<Message>,
    n_set: BTreeSet<Message>,
    sender: ReplicaId,
}

impl NewViewMessage {
    pub fn new(
        view: View,
        gathered: BTreeSet<Message>,
        o_set: BTreeSet<Message>,
        n_set: BTreeSet<Message>,
        sender: ReplicaId,
    ) -> Self {
        Self {
            view,
            gathered,
            o_set,
            n_set,
            sender,
        }
    }

    pub fn view(&self) -> View {
        self.view
    }

    pub fn gathered(&self) -> &BTreeSet<Message> {
        &self.gathered
    }

    pub fn o_set(&self) -> &BTreeSet<Message> {
        &self.o_set
    }

    pub fn n_set(&self) -> &BTreeSet<Message> {
        &self.n_set
    }

    pub fn sender(&self) -> ReplicaId {
        self.sender
    }
}

/// A protocol message exchanged between replicas.
///
/// Two messages are equal iff their kind and all fields, including
/// sender, are equal (spec §3); this is exactly structural equality on
/// this enum, which is why the message log can deduplicate with a
/// plain `HashSet`/`BTreeSet`.
#[derive(Serialize, Deserialize, Debug, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum Message {
    Request(RequestMessage),
    PrePrepare(PrePrepareMessage),
    Prepare(PrepareMessage),
    Commit(CommitMessage),
    Reply(ReplyMessage),
    Checkpoint(CheckpointMessage),
    ViewChange(ViewChangeMessage),
    NewView(NewViewMessage),
}

impl Message {
    /// Returns the claimed sender of this message.
    pub fn sender(&self) -> ReplicaId {
        match self {
            Message::Request(_) => unreachable!("REQUEST carries no sender field"),
            Message::PrePrepare(m) => m.sender(),
            Message::Prepare(m) => m.sender(),
            Message::Commit(m) => m.sender(),
            Message::Reply(m) => m.sender(),
            Message::Checkpoint(m) => m.sender(),
            Message::ViewChange(m) => m.sender(),
            Message::NewView(m) => m.sender(),
        }
    }

    /// A short, stable tag identifying the message kind, independent
    /// of any field value. Mirrors the original source's use of a
    /// string type tag as the first element of an untyped tuple
    /// (spec §9, "Tuple-as-discriminated-union").
    pub fn kind(&self) -> &'static str {
        match self {
            Message::Request(_) => "REQUEST",
            Message::PrePrepare(_) => "PRE-PREPARE",
            Message::Prepare(_) => "PREPARE",
            Message::Commit(_) => "COMMIT",
            Message::Reply(_) => "REPLY",
            Message::Checkpoint(_) => "CHECKPOINT",
            Message::ViewChange(_) => "VIEW-CHANGE",
            Message::NewView(_) => "NEW-VIEW",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timestamp_canonical_bytes() {
        assert_eq!(Timestamp::from_f64(0.5).canonical_bytes(), b"0.50");
        assert_eq!(Timestamp::ZERO.canonical_bytes(), b"0.00");
    }

    #[test]
    fn request_digest_is_order_and_sender_independent() {
        let a = RequestMessage::new(b"message".to_vec(), Timestamp::ZERO, ClientId::new(b"100".to_vec()));
        let b = RequestMessage::new(b"message".to_vec(), Timestamp::ZERO, ClientId::new(b"100".to_vec()));
        assert_eq!(a.digest(), b.digest());

        // wrapping the same request in PRE-PREPAREs from different
        // senders must not change the carried request's digest.
        let pp1 = PrePrepareMessage::new(View::ZERO, SeqNo::new(1), Some(a.clone()), ReplicaId::new(0));
        let pp2 = PrePrepareMessage::new(View::ZERO, SeqNo::new(1), Some(b), ReplicaId::new(3));
        assert_eq!(
            pp1.request().unwrap().digest(),
            pp2.request().unwrap().digest()
        );
    }

    #[test]
    fn message_equality_is_structural() {
        let r1 = PrepareMessage::new(
            View::ZERO,
            SeqNo::new(1),
            Digest::from_canonical(b"x"),
            ReplicaId::new(1),
        );
        let r2 = r1;
        assert_eq!(Message::Prepare(r1), Message::Prepare(r2));
    }

    #[test]
    fn null_preprepare_has_no_request() {
        let pp = PrePrepareMessage::new(View::ZERO, SeqNo::new(5), None, ReplicaId::new(0));
        assert!(pp.request().is_none());
    }
}
