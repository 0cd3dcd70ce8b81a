//! A Practical Byzantine Fault Tolerant replica state machine.
//!
//! This crate implements the per-node core of the protocol formalized
//! in Castro-Liskov TM-590: message ingestion, the `prepared`/
//! `committed` safety predicates, the sliding execution window with
//! checkpoint-driven garbage collection, and the view-change protocol.
//! Transport, signatures, the clock, and application execution are
//! external collaborators, injected through the traits in
//! [`bft::executable`] and [`bft::crypto::signature`].
//!
//! ```no_run
//! use pbft::bft::config::ReplicaConfig;
//! use pbft::bft::communication::message::ReplicaId;
//! use pbft::bft::crypto::signature::TrustedVerifier;
//! use pbft::bft::executable::NullApplication;
//! use pbft::bft::replica::Replica;
//!
//! let config = ReplicaConfig {
//!     id: ReplicaId::new(0),
//!     n_replicas: 4,
//!     max_out: 100,
//!     chkpt_int: 50,
//! };
//! let replica = Replica::new(config, NullApplication, TrustedVerifier).unwrap();
//! ```

pub mod bft;
