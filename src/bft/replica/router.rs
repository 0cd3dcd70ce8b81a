//! The router: the sole entry point into a replica (spec §4.5, §5).
//!
//! `route_receive` dispatches an inbound message to its ingress
//! handler, then opportunistically drives every slot it can push
//! forward: first any pending client request the primary hasn't yet
//! proposed, then every known `PRE-PREPARE` through `send_commit` and
//! `execute`, in sequence order. Nothing here suspends; one call runs
//! to completion.

use crate::bft::communication::message::Message;
use crate::bft::crypto::signature::SignatureVerifier;
use crate::bft::error::*;
use crate::bft::executable::Application;
use crate::bft::ordering::Orderable;
use crate::bft::replica::Replica;

impl<A, V> Replica<A, V>
where
    A: Application,
    V: SignatureVerifier,
{
    /// The sole entry point into a replica (spec §5). Dispatches `msg`
    /// by kind, then drives pipelined progress.
    ///
    /// `Malformed` is the only error this surfaces (spec §7); a halted
    /// replica refuses every further call with `InvariantViolation`.
    pub fn route_receive(&mut self, msg: Message) -> Result<()> {
        if self.halted {
            return Err(Error::simple(ErrorKind::InvariantViolation));
        }

        match msg {
            Message::Request(m) => self.receive_request(m),
            Message::PrePrepare(m) => self.receive_preprepare(m),
            Message::Prepare(m) => self.receive_prepare(m),
            Message::Commit(m) => self.receive_commit(m),
            Message::Checkpoint(m) => self.receive_checkpoint(m),
            Message::ViewChange(m) => self.receive_view_change(m),
            Message::NewView(m) => {
                self.receive_new_view(m);
            }
            Message::Reply(_) => {
                return Err(Error::simple(ErrorKind::Malformed));
            }
        }

        self.drive_pipeline();

        if self.halted {
            return Err(Error::simple(ErrorKind::InvariantViolation));
        }
        Ok(())
    }

    /// Proposes a `PRE-PREPARE` for every pending request this replica
    /// is primary for and hasn't proposed yet, then attempts
    /// `send_commit`/`execute` on every known `PRE-PREPARE` in
    /// sequence order.
    ///
    /// The second half is exactly spec §4.5's router sweep. The first
    /// half is necessary for the primary to ever originate consensus
    /// on a fresh request at all: `receive_request`'s primary branch
    /// only re-emits an *already-proposed* `PRE-PREPARE` (the dropped-
    /// message liveness hack), it never originates one.
    fn drive_pipeline(&mut self) {
        if self.is_primary() {
            let view = self.view;
            let mut pending: Vec<_> = self
                .log
                .requests()
                .filter(|r| {
                    let digest = r.digest();
                    !self.log.pre_prepares().any(|pp| pp.request().map(|rr| rr.digest()) == Some(digest))
                })
                .map(|r| r.digest())
                .collect();
            pending.sort();

            for digest in pending {
                if self.halted {
                    return;
                }
                let seq = self.seqno.next();
                self.send_preprepare(digest, view, seq);
            }
        }

        let mut candidates: Vec<_> = self
            .log
            .pre_prepares()
            .filter(|pp| pp.view() >= self.view && pp.sequence_number() >= self.last_exec.next())
            .filter_map(|pp| pp.request().map(|r| (pp.sequence_number(), pp.view(), r.digest())))
            .collect();
        candidates.sort_by_key(|(seq, _, _)| *seq);

        for (seq, view, digest) in candidates {
            if self.halted {
                return;
            }
            self.send_commit(digest, view, seq);
            self.execute(digest, view, seq);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bft::communication::message::{ClientId, ReplicaId, ReplyMessage, RequestMessage, Timestamp};
    use crate::bft::config::ReplicaConfig;
    use crate::bft::crypto::signature::TrustedVerifier;
    use crate::bft::executable::NullApplication;
    use crate::bft::ordering::{SeqNo, View};

    fn replica(id: u32) -> Replica<NullApplication, TrustedVerifier> {
        let config = ReplicaConfig {
            id: ReplicaId::new(id),
            n_replicas: 4,
            max_out: 100,
            chkpt_int: 50,
        };
        Replica::new(config, NullApplication, TrustedVerifier).unwrap()
    }

    #[test]
    fn route_receive_rejects_reply_as_malformed() {
        let mut r = replica(0);
        let reply = ReplyMessage::new(View::ZERO, Timestamp::ZERO, ClientId::new(b"c".to_vec()), ReplicaId::new(0), Vec::new());
        assert!(r.route_receive(Message::Reply(reply)).is_err());
    }

    #[test]
    fn route_receive_halts_after_invariant_violation() {
        let mut r = replica(0);
        r.halted = true;
        let req = RequestMessage::new(b"op".to_vec(), Timestamp::ZERO, ClientId::new(b"c".to_vec()));
        assert!(r.route_receive(Message::Request(req)).is_err());
    }

    #[test]
    fn primary_auto_proposes_pending_requests_on_receipt() {
        let mut r = replica(0);
        let req = RequestMessage::new(b"op".to_vec(), Timestamp::ZERO, ClientId::new(b"c".to_vec()));

        r.route_receive(Message::Request(req)).unwrap();

        assert!(r.log.pre_prepares().any(|pp| pp.sequence_number() == SeqNo::new(1)));
        let out = r.drain_out();
        assert!(out.iter().any(|m| matches!(m, Message::PrePrepare(_))));
    }

    #[test]
    fn non_primary_forwards_request_without_proposing() {
        let mut r = replica(1);
        let req = RequestMessage::new(b"op".to_vec(), Timestamp::ZERO, ClientId::new(b"c".to_vec()));

        r.route_receive(Message::Request(req)).unwrap();

        assert!(r.log.pre_prepares().next().is_none());
        let out = r.drain_out();
        assert!(out.iter().any(|m| matches!(m, Message::Request(_))));
    }
}
