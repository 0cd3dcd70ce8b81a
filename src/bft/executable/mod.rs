//! The application state machine collaborator (spec §6).
//!
//! `execute` calls into this trait synchronously; the core treats the
//! application's state and result encoding as opaque (spec §1, "the
//! application layer's state semantics are opaque to the core"). There
//! is no dedicated executor thread here, unlike the networked ancestor
//! of this crate: spec §5 requires the whole core, `execute` included,
//! to run to completion inside `route_receive` without suspending.

use crate::bft::crypto::hash::Digest;

/// A user-defined application state machine.
///
/// `apply(op, val) -> (val', result)` (spec §6). Implementors own
/// their concrete state representation; the core only ever sees its
/// digest.
pub trait Application {
    /// Applies `operation` to the current state digest `val`,
    /// returning the new state digest and an opaque result to be
    /// carried in the matching `REPLY`.
    fn apply(&mut self, operation: &[u8], val: Digest) -> (Digest, Vec<u8>);

    /// Returns the digest of the application's genesis state.
    fn initial_state(&mut self) -> Digest;
}

/// The default identity application (spec §6, "Default identity
/// application returns `null` as the result").
///
/// Ignores the operation entirely; state never advances past genesis.
/// Useful for test harnesses exercising only the consensus core.
#[derive(Debug, Default, Copy, Clone)]
pub struct NullApplication;

impl Application for NullApplication {
    fn apply(&mut self, _operation: &[u8], val: Digest) -> (Digest, Vec<u8>) {
        (val, Vec::new())
    }

    fn initial_state(&mut self) -> Digest {
        Digest::from_canonical(b"pbft-null-application-genesis")
    }
}
