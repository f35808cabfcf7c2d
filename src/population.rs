//! Sampled chromosomes and the ancestry partition each one carries.
use indexmap::{IndexMap, IndexSet};

use crate::ancestry::{AncestorEncoder, AncestorId, Haplotype, PLOIDY};
use crate::error::{PedigreeError, Result};
use crate::genome::{GenomeMap, Position};

/// Ordered mapping from deme name to number of sampled diploid individuals.
pub type SampleSizes = IndexMap<String, usize>;

/// One haplotype of one sampled individual, as a step function over `[0, L)`.
///
/// The interval starting at `positions[k]` (and ending at `positions[k + 1]`,
/// or `L` for the last one) traces to `ancestors[k]`.
#[derive(Debug, Clone, PartialEq)]
pub struct ChromosomeCopy {
    positions: Vec<Position>,
    ancestors: Vec<AncestorId>,
}

impl ChromosomeCopy {
    /// A copy tracing entirely to `ancestor`.
    pub fn whole(ancestor: AncestorId) -> Self {
        Self {
            positions: vec![0.0],
            ancestors: vec![ancestor],
        }
    }

    /// Build a copy from its parallel arrays, checking the structural
    /// invariants against the genome length.
    pub fn from_parts(
        positions: Vec<Position>,
        ancestors: Vec<AncestorId>,
        total_length: Position,
    ) -> Result<Self> {
        let copy = Self {
            positions,
            ancestors,
        };
        copy.check(total_length)?;
        Ok(copy)
    }

    /// Verify the partition invariant: equal-length arrays, a first
    /// breakpoint at zero, and strictly increasing positions below `L`.
    pub fn check(&self, total_length: Position) -> Result<()> {
        if self.positions.len() != self.ancestors.len() {
            return Err(PedigreeError::MalformedChromosome(format!(
                "{} positions but {} ancestors",
                self.positions.len(),
                self.ancestors.len()
            )));
        }
        match self.positions.first() {
            None => {
                return Err(PedigreeError::MalformedChromosome(
                    "no segments".to_string(),
                ))
            }
            Some(&first) if first != 0.0 => {
                return Err(PedigreeError::MalformedChromosome(format!(
                    "first segment starts at {}",
                    first
                )))
            }
            _ => {}
        }
        if let Some(pair) = self.positions.windows(2).find(|w| !(w[0] < w[1])) {
            return Err(PedigreeError::MalformedChromosome(format!(
                "positions not increasing ({} then {})",
                pair[0], pair[1]
            )));
        }
        if let Some(&last) = self.positions.last() {
            if !(last < total_length) {
                return Err(PedigreeError::MalformedChromosome(format!(
                    "segment starts at {}, beyond genome length {}",
                    last, total_length
                )));
            }
        }
        Ok(())
    }

    pub fn positions(&self) -> &[Position] {
        &self.positions
    }

    pub fn ancestors(&self) -> &[AncestorId] {
        &self.ancestors
    }

    /// Number of segments.
    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    /// Iterate over `(start, end, ancestor)` segments.
    pub fn segments(
        &self,
        total_length: Position,
    ) -> impl Iterator<Item = (Position, Position, AncestorId)> + '_ {
        self.positions
            .iter()
            .zip(self.ancestors.iter())
            .enumerate()
            .map(move |(k, (&start, &ancestor))| {
                let end = self.positions.get(k + 1).copied().unwrap_or(total_length);
                (start, end, ancestor)
            })
    }

    /// The ancestor the copy traces to at `position`.
    pub fn ancestor_at(&self, position: Position) -> Option<AncestorId> {
        let index = self.positions.partition_point(|&p| p <= position);
        index.checked_sub(1).map(|k| self.ancestors[k])
    }

    pub(crate) fn replace(&mut self, positions: Vec<Position>, ancestors: Vec<AncestorId>) {
        debug_assert_eq!(positions.len(), ancestors.len());
        self.positions = positions;
        self.ancestors = ancestors;
    }
}

/// A sampled diploid individual.
#[derive(Debug, Clone, PartialEq)]
pub struct Individual {
    pub copies: [ChromosomeCopy; PLOIDY],
}

/// A named subpopulation of sampled individuals.
#[derive(Debug, Clone, PartialEq)]
pub struct Deme {
    pub name: String,
    pub individuals: Vec<Individual>,
}

/// Ancestry summary for one deme, counted by where ancestors live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DemeCensus {
    pub name: String,
    /// Distinct ancestral haplotypes in this deme carrying sampled material.
    pub ancestors: usize,
    /// Sampled segments tracing to ancestors in this deme.
    pub segments: usize,
}

/// All sampled individuals, grouped by deme, together with the encoder that
/// gives their current [`AncestorId`]s meaning.
#[derive(Debug, Clone)]
pub struct Population {
    demes: Vec<Deme>,
    encoder: AncestorEncoder,
    total_length: Position,
}

impl Population {
    /// The generation-0 population: each sampled haplotype traces to itself
    /// over the whole genome.
    pub fn new(sample_sizes: &SampleSizes, genome: &GenomeMap) -> Self {
        let max_size = sample_sizes.values().copied().max().unwrap_or(0);
        let encoder = AncestorEncoder::new(max_size);
        let demes = sample_sizes
            .iter()
            .enumerate()
            .map(|(deme, (name, &size))| {
                let individuals = (0..size)
                    .map(|individual| Individual {
                        copies: [0, 1].map(|strand| {
                            ChromosomeCopy::whole(encoder.encode(Haplotype {
                                deme,
                                individual,
                                strand,
                            }))
                        }),
                    })
                    .collect();
                Deme {
                    name: name.clone(),
                    individuals,
                }
            })
            .collect();
        Self {
            demes,
            encoder,
            total_length: genome.total_length(),
        }
    }

    pub fn demes(&self) -> &[Deme] {
        &self.demes
    }

    pub fn deme_names(&self) -> Vec<String> {
        self.demes.iter().map(|d| d.name.clone()).collect()
    }

    /// Encoder for the current ancestor ids.
    pub fn encoder(&self) -> AncestorEncoder {
        self.encoder
    }

    pub fn total_length(&self) -> Position {
        self.total_length
    }

    /// Number of sampled chromosome copies.
    pub fn num_samples(&self) -> usize {
        self.demes
            .iter()
            .map(|d| d.individuals.len() * PLOIDY)
            .sum()
    }

    /// Sampled copies in sample-id order: deme, then individual, then strand.
    pub fn copies(&self) -> impl Iterator<Item = &ChromosomeCopy> + '_ {
        self.demes
            .iter()
            .flat_map(|d| d.individuals.iter())
            .flat_map(|ind| ind.copies.iter())
    }

    /// Sample-id of the `strand` copy of `individual` in `deme`.
    pub fn sample_id(&self, deme: usize, individual: usize, strand: usize) -> usize {
        let before: usize = self.demes[..deme]
            .iter()
            .map(|d| d.individuals.len())
            .sum();
        (before + individual) * PLOIDY + strand
    }

    pub(crate) fn copies_mut(&mut self) -> impl Iterator<Item = &mut ChromosomeCopy> + '_ {
        self.demes
            .iter_mut()
            .flat_map(|d| d.individuals.iter_mut())
            .flat_map(|ind| ind.copies.iter_mut())
    }

    pub(crate) fn set_encoder(&mut self, encoder: AncestorEncoder) {
        self.encoder = encoder;
    }

    /// Check every copy's partition invariant.
    pub fn check(&self) -> Result<()> {
        self.copies().try_for_each(|copy| copy.check(self.total_length))
    }

    /// Total number of segments over all copies.
    pub fn num_segments(&self) -> usize {
        self.copies().map(|c| c.len()).sum()
    }

    /// Count ancestral haplotypes and segments per ancestral deme.
    pub fn census(&self) -> Vec<DemeCensus> {
        let mut ancestors: Vec<IndexSet<AncestorId>> = vec![IndexSet::new(); self.demes.len()];
        let mut segments = vec![0; self.demes.len()];
        for copy in self.copies() {
            for &id in copy.ancestors() {
                let deme = self.encoder.decode(id).deme;
                ancestors[deme].insert(id);
                segments[deme] += 1;
            }
        }
        self.demes
            .iter()
            .zip(ancestors.iter().zip(segments))
            .map(|(deme, (ids, segments))| DemeCensus {
                name: deme.name.clone(),
                ancestors: ids.len(),
                segments,
            })
            .collect()
    }
}
