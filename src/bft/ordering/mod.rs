//! Sequence and view numbers, and the small amount of checked
//! arithmetic the rest of the core needs on top of them.

use either::{Either, Left, Right};

use serde::{Serialize, Deserialize};

/// A reason why a [`SeqNo`] comparison could not be resolved to a
/// plain distance.
#[derive(Debug)]
pub(crate) enum InvalidSeqNo {
    /// `self` precedes `other`.
    Small,
}

/// A trait for values that carry a well-defined, totally ordered
/// position in the protocol.
pub trait Orderable {
    /// Returns the sequence number of this value.
    fn sequence_number(&self) -> SeqNo;
}

/// The total-order slot assigned to a request by the primary.
///
/// Sequence numbers are monotonically increasing and never recycled
/// within the lifetime of a replica; garbage collection only discards
/// old entries from the message log, it never reuses a `SeqNo`.
#[derive(Serialize, Deserialize, Debug, Copy, Clone, Ord, PartialOrd, Eq, PartialEq, Hash)]
pub struct SeqNo(u64);

impl SeqNo {
    /// The sequence number preceding any request, used as the
    /// genesis low watermark.
    pub const ZERO: SeqNo = SeqNo(0);

    /// Wraps a raw sequence number.
    #[inline]
    pub fn new(n: u64) -> Self {
        SeqNo(n)
    }

    /// Returns the following sequence number.
    #[inline]
    pub fn next(self) -> SeqNo {
        SeqNo(self.0 + 1)
    }

    /// Returns the raw integer value.
    #[inline]
    pub fn into_inner(self) -> u64 {
        self.0
    }

    /// Checked distance from `other` to `self`, i.e. `self - other`.
    ///
    /// Returns `Left` when `self` precedes `other`, in which case the
    /// distance is not meaningful for window arithmetic.
    #[inline]
    pub(crate) fn index(self, other: SeqNo) -> Either<InvalidSeqNo, u64> {
        if self.0 < other.0 {
            Left(InvalidSeqNo::Small)
        } else {
            Right(self.0 - other.0)
        }
    }
}

impl Orderable for SeqNo {
    fn sequence_number(&self) -> SeqNo {
        *self
    }
}

/// A primary epoch. `primary(v) = v mod R`.
#[derive(Serialize, Deserialize, Debug, Copy, Clone, Ord, PartialOrd, Eq, PartialEq, Hash)]
pub struct View(u64);

impl View {
    /// The initial view, `v == 0`.
    pub const ZERO: View = View(0);

    /// Wraps a raw view number.
    #[inline]
    pub fn new(v: u64) -> Self {
        View(v)
    }

    /// Returns the following view.
    #[inline]
    pub fn next(self) -> View {
        View(self.0 + 1)
    }

    /// Returns the raw integer value.
    #[inline]
    pub fn into_inner(self) -> u64 {
        self.0
    }

    /// Returns the id of the replica that is primary in this view,
    /// given a cluster of `n_replicas` replicas.
    #[inline]
    pub fn primary(self, n_replicas: usize) -> usize {
        (self.0 as usize) % n_replicas
    }
}
