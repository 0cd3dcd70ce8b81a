//! Checkpointing: periodic snapshots of application state and the
//! reply cache (spec §3 "Snapshot", §4.4 `execute`, §4.7 "Checkpoint
//! machine").
//!
//! A checkpoint becomes *stable* when `2f+1` matching `CHECKPOINT`
//! messages exist in the log; the stable pair then becomes the new
//! low watermark, and everything below it is garbage-collected from
//! `in` (spec §9, "Checkpoint as sorted-items serialization").

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::bft::communication::message::{ClientId, Timestamp};
use crate::bft::crypto::hash::Digest;
use crate::bft::error::*;

/// A deterministic, canonical encoding of `(val, last_rep, last_rep_t)`.
///
/// Two replicas in identical logical state produce byte-identical
/// snapshot digests: `last_rep`/`last_rep_t` are `BTreeMap`s, so their
/// serialized form is sorted by client id regardless of insertion
/// order, matching the spec's "canonicalize the snapshot by sorting
/// the reply map ... into a deterministic byte sequence before
/// hashing".
#[derive(Serialize, Deserialize, Debug, Clone, Eq, PartialEq)]
pub struct Snapshot {
    val: Digest,
    last_rep: BTreeMap<ClientId, Vec<u8>>,
    last_rep_t: BTreeMap<ClientId, Timestamp>,
}

impl Snapshot {
    /// Builds a new snapshot from application state digest `val` and
    /// the per-client reply caches.
    pub fn new(
        val: Digest,
        last_rep: BTreeMap<ClientId, Vec<u8>>,
        last_rep_t: BTreeMap<ClientId, Timestamp>,
    ) -> Self {
        Self {
            val,
            last_rep,
            last_rep_t,
        }
    }

    /// The abstract application state digest captured by this snapshot.
    pub fn val(&self) -> Digest {
        self.val
    }

    pub fn last_rep(&self) -> &BTreeMap<ClientId, Vec<u8>> {
        &self.last_rep
    }

    pub fn last_rep_t(&self) -> &BTreeMap<ClientId, Timestamp> {
        &self.last_rep_t
    }

    /// Computes the content digest of this snapshot's canonical
    /// encoding (spec §4.1 reused for non-REQUEST canonical content).
    pub fn digest(&self) -> Result<Digest> {
        let bytes = bincode::serialize(self).wrapped(ErrorKind::Checkpoint)?;
        Ok(Digest::from_canonical(&bytes))
    }
}
