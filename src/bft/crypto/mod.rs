//! Cryptographic collaborators used by the replica core.
//!
//! Hashing is used internally for request digests and snapshot
//! digests. Signature verification is an external collaborator
//! (spec §6): the core never generates signatures, it only asks a
//! [`signature::SignatureVerifier`] whether a sender's claim on a
//! message is authentic.

pub mod hash;
pub mod signature;
