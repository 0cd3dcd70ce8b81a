//! Core implementation of a Practical Byzantine Fault Tolerant replica
//! state machine, per Castro-Liskov TM-590.
//!
//! The core is strictly single-threaded and network-free: transport,
//! cryptographic signatures, the clock, and application execution are
//! all external collaborators, injected at construction. `Replica`'s
//! only entry point is [`replica::Replica::route_receive`].

pub mod checkpoint;
pub mod communication;
pub mod config;
pub mod crypto;
pub mod error;
pub mod executable;
pub mod log;
pub mod ordering;
pub mod predicates;
pub mod replica;
pub mod view_change;
