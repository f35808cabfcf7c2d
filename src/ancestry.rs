//! Dense integer handles for haploid chromosomes of one generation.
use std::fmt;

/// Number of chromosome copies per individual.
pub const PLOIDY: usize = 2;

/// Handle for one haploid chromosome instance in the generation immediately
/// older than the one being processed.
///
/// Only meaningful together with the [`AncestorEncoder`] of the generation
/// that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AncestorId(pub u64);

impl fmt::Display for AncestorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An individual in a given deme.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct IndividualRef {
    pub deme: usize,
    pub individual: usize,
}

/// A decoded [`AncestorId`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Haplotype {
    pub deme: usize,
    pub individual: usize,
    pub strand: usize,
}

impl Haplotype {
    pub fn owner(&self) -> IndividualRef {
        IndividualRef {
            deme: self.deme,
            individual: self.individual,
        }
    }

    /// The other chromosome copy of the same individual.
    pub fn sibling(&self) -> Haplotype {
        Haplotype {
            strand: (self.strand + 1) % PLOIDY,
            ..*self
        }
    }
}

/// Fixed-radix bijection between `(deme, individual, strand)` and
/// [`AncestorId`].
///
/// The radix for individuals is the largest deme size of the generation, so
/// decoding is two divisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AncestorEncoder {
    stride: u64,
}

impl AncestorEncoder {
    /// An encoder for a generation whose largest deme holds `max_deme_size`
    /// individuals.
    pub fn new(max_deme_size: usize) -> Self {
        Self {
            stride: max_deme_size.max(1) as u64,
        }
    }

    pub fn encode(&self, haplotype: Haplotype) -> AncestorId {
        debug_assert!((haplotype.individual as u64) < self.stride);
        debug_assert!(haplotype.strand < PLOIDY);
        let slot = haplotype.deme as u64 * self.stride + haplotype.individual as u64;
        AncestorId(slot * PLOIDY as u64 + haplotype.strand as u64)
    }

    pub fn decode(&self, id: AncestorId) -> Haplotype {
        let slot = id.0 / PLOIDY as u64;
        Haplotype {
            deme: (slot / self.stride) as usize,
            individual: (slot % self.stride) as usize,
            strand: (id.0 % PLOIDY as u64) as usize,
        }
    }
}
