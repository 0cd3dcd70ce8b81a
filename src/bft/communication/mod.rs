//! Message types traded between replicas.
//!
//! Everything transport-related — wire framing, sockets, TLS, node
//! addressing — belongs to the transport collaborator (spec §1, §6),
//! not to this core; only the message model itself lives here.

pub mod message;
