//! Replica construction-time configuration (spec §6).
//!
//! "CLI / environment / configuration" is explicitly out of scope for
//! the core; runtime configuration is just these four values, passed
//! at construction by whatever embeds the replica.

use crate::bft::communication::message::ReplicaId;

/// Construction-time parameters for a [`crate::bft::replica::Replica`].
#[derive(Debug, Clone, Copy)]
pub struct ReplicaConfig {
    /// This replica's own id, `i ∈ [0,R)`.
    pub id: ReplicaId,
    /// Cluster size `R`. Fault tolerance is `f = ⌊(R−1)/3⌋`.
    pub n_replicas: usize,
    /// Window width: the widest gap, in sequence numbers, between the
    /// stable checkpoint and an admissible in-flight request.
    pub max_out: u64,
    /// Checkpoint period. Must be smaller than `max_out`.
    pub chkpt_int: u64,
}

impl ReplicaConfig {
    /// Byzantine fault tolerance threshold, `f = ⌊(R−1)/3⌋`.
    pub fn f(&self) -> usize {
        (self.n_replicas - 1) / 3
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn f_matches_standard_formula() {
        let cfg = ReplicaConfig {
            id: ReplicaId::new(0),
            n_replicas: 4,
            max_out: 100,
            chkpt_int: 50,
        };
        assert_eq!(cfg.f(), 1);
    }
}
