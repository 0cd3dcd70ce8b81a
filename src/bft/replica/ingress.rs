//! Ingress transitions: one `receive_*` per inbound message kind
//! (spec §4.3).
//!
//! Every handler here drops the message immediately if its claimed
//! sender is this replica's own id — a replica's own messages are
//! already in the log via emit-and-log, so re-ingesting them would be
//! redundant at best and a forged-sender attack at worst. Every
//! handler carrying a `ReplicaId` sender (everything but `REQUEST`,
//! which is client-originated and has none) then asks the signature
//! collaborator whether that sender actually produced the message
//! (spec §6, "the core treats unsigned messages as an attack and may
//! drop them") before it is trusted for anything else — in
//! particular, before `receive_preprepare` trusts a claimed `j ==
//! primary(v)`, since an unauthenticated sender field is exactly what
//! would let a single Byzantine replica forge a second, conflicting
//! `PRE-PREPARE` and break prepared-uniqueness.

use crate::bft::communication::message::{
    CheckpointMessage, CommitMessage, Message, NewViewMessage, PrePrepareMessage, PrepareMessage,
    ReplyMessage, RequestMessage, ViewChangeMessage,
};
use crate::bft::crypto::signature::SignatureVerifier;
use crate::bft::executable::Application;
use crate::bft::ordering::Orderable;
use crate::bft::predicates::has_new_view;
use crate::bft::replica::Replica;
use crate::bft::view_change::correct_view_change;

impl<A, V> Replica<A, V>
where
    A: Application,
    V: SignatureVerifier,
{
    /// **receive_request((op,t,c))** (spec §4.3).
    ///
    /// A client is never this replica's own id, so there is no
    /// drop-from-self guard here (unlike every other `receive_*`).
    pub(super) fn receive_request(&mut self, req: RequestMessage) {
        let client = req.client().clone();
        let t = req.timestamp();

        // Only a client we have actually replied to before can be a
        // replay; the default timestamp (0) must never be mistaken
        // for a cached reply to a client we have never seen (spec
        // §9, "Default-valued mapping" — explicit get-with-default,
        // not an implicit default that a fresh client happens to
        // collide with).
        if self.last_rep.contains_key(&client) && Some(t) == self.last_rep_t.get(&client).copied() {
            let result = self.last_rep.get(&client).cloned().unwrap_or_default();
            let reply = ReplyMessage::new(self.view, t, client, self.id, result);
            self.out.push(Message::Reply(reply));
            return;
        }

        let digest = req.digest();
        self.log.insert(Message::Request(req.clone()));

        if !self.is_primary() {
            self.out.push(Message::Request(req));
            return;
        }

        // Liveness hack: if we are the primary and already emitted a
        // PRE-PREPARE for this exact request, re-emit it in case it
        // was dropped in transit.
        if let Some(pp) = self
            .log
            .pre_prepares()
            .find(|pp| pp.sender() == self.id && pp.request().map(|r| r.digest()) == Some(digest))
            .cloned()
        {
            self.out.push(Message::PrePrepare(pp));
        }
    }

    /// **receive_preprepare((v,n,m,j))** (spec §4.3).
    pub(super) fn receive_preprepare(&mut self, msg: PrePrepareMessage) {
        if msg.sender() == self.id {
            return;
        }
        if !self.verifier.valid_sig(msg.sender(), &Message::PrePrepare(msg.clone())) {
            return;
        }

        let view = msg.view();
        let seq = msg.sequence_number();
        let digest = msg.request().map(|r| r.digest());

        let conflicts = digest.map_or(false, |d| {
            self.log
                .prepares()
                .any(|p| p.view() == view && p.sequence_number() == seq && p.sender() == self.id && p.digest() != d)
        });

        let accept = msg.sender().into_inner() as usize == view.primary(self.n_replicas)
            && self.in_wv(view, seq)
            && has_new_view(view, &self.log)
            && !conflicts;

        if accept {
            if let Some(d) = digest {
                let prepare = PrepareMessage::new(view, seq, d, self.id);
                self.log.insert(Message::Prepare(prepare));
                self.out.push(Message::Prepare(prepare));
            }
            self.log.insert(Message::PrePrepare(msg));
        } else if let Some(req) = msg.request().cloned() {
            // We may still learn about the request via a different
            // path even though this particular PRE-PREPARE is
            // rejected.
            self.log.insert(Message::Request(req));
        }
    }

    /// **receive_prepare((v,n,d,j))** (spec §4.3).
    pub(super) fn receive_prepare(&mut self, msg: PrepareMessage) {
        if msg.sender() == self.id {
            return;
        }
        if !self.verifier.valid_sig(msg.sender(), &Message::Prepare(msg)) {
            return;
        }

        let accept =
            msg.sender().into_inner() as usize != msg.view().primary(self.n_replicas) && self.in_wv(msg.view(), msg.sequence_number());

        if accept {
            self.log.insert(Message::Prepare(msg));
        }
    }

    /// **receive_commit((v,n,d,j))** (spec §4.3).
    pub(super) fn receive_commit(&mut self, msg: CommitMessage) {
        if msg.sender() == self.id {
            return;
        }
        if !self.verifier.valid_sig(msg.sender(), &Message::Commit(msg)) {
            return;
        }

        let accept = self.view >= msg.view() && self.in_w(msg.sequence_number());
        if accept {
            self.log.insert(Message::Commit(msg));
        }
    }

    /// **receive_checkpoint((v,n,d,j))** (spec §4.3).
    pub(super) fn receive_checkpoint(&mut self, msg: CheckpointMessage) {
        if msg.sender() == self.id {
            return;
        }
        if !self.verifier.valid_sig(msg.sender(), &Message::Checkpoint(msg)) {
            return;
        }

        let accept = self.view >= msg.view() && self.in_w(msg.sequence_number());
        if accept {
            self.log.insert(Message::Checkpoint(msg));
            self.advance_stable_checkpoint();
        }
    }

    /// **receive_view_change(msg)** (spec §4.3).
    pub(super) fn receive_view_change(&mut self, msg: ViewChangeMessage) {
        if msg.sender() == self.id {
            return;
        }
        if !self.verifier.valid_sig(msg.sender(), &Message::ViewChange(msg.clone())) {
            return;
        }

        let claimed_view = msg.view();
        let sender = msg.sender();
        let accept = claimed_view >= self.view
            && correct_view_change(&msg, claimed_view, sender, self.n_replicas, self.f, self.max_out);

        if accept {
            self.log.insert(Message::ViewChange(msg));
        }
    }

    /// **receive_new_view(msg)** (spec §4.3, detailed in §4.6).
    ///
    /// The dispatch entry point; the acceptance algorithm itself
    /// lives in `egress`, alongside the primary-side `send_newview`
    /// it mirrors.
    pub(super) fn receive_new_view(&mut self, msg: NewViewMessage) -> bool {
        if msg.sender() == self.id {
            return false;
        }
        if !self.verifier.valid_sig(msg.sender(), &Message::NewView(msg.clone())) {
            return false;
        }
        self.accept_new_view(msg)
    }
}
