//! The static chromosome table shared by every component of a run.
//!
//! Chromosomes are laid end-to-end on a single genome coordinate measured
//! in Morgans, so a position in `[0, L)` identifies both a chromosome and
//! an offset within it.
use indexmap::IndexMap;
use serde::Deserialize;

use crate::error::{PedigreeError, Result};
use crate::file::InputFile;
use crate::numeric::{bisect_right, cumulative_sum};

/// Genome coordinate, in Morgans.
pub type Position = f64;

/// Human autosome genetic map lengths, in Morgans.
pub const HUMAN_AUTOSOME_LENGTHS: [Position; 22] = [
    2.6200830, 2.4403647, 2.0997332, 1.9748005, 1.8958412, 1.7470526, 1.7235610, 1.5652810,
    1.4628861, 1.6040336, 1.4388007, 1.5640816, 1.1934065, 1.0483476, 1.1093523, 1.1868929,
    1.1961966, 1.0574726, 0.9257134, 0.8362057, 0.5479314, 0.5559191,
];

/// Immutable table of chromosome names, lengths and cumulative end positions.
#[derive(Debug, Clone, PartialEq)]
pub struct GenomeMap {
    names: Vec<String>,
    lengths: Vec<Position>,
    /// Cumulative end position of each chromosome; the last is the total length.
    ends: Vec<Position>,
}

impl GenomeMap {
    /// Create a genome map from an ordered table of chromosome names and
    /// lengths (in Morgans).
    pub fn new(chromosomes: IndexMap<String, Position>) -> Result<Self> {
        if chromosomes.is_empty() {
            return Err(PedigreeError::EmptyGenome);
        }
        for (name, &length) in chromosomes.iter() {
            if !(length > 0.0 && length.is_finite()) {
                return Err(PedigreeError::NonPositiveChromosomeLength(
                    name.clone(),
                    length,
                ));
            }
        }
        let (names, lengths): (Vec<_>, Vec<_>) = chromosomes.into_iter().unzip();
        let ends = cumulative_sum(&lengths);
        Ok(Self {
            names,
            lengths,
            ends,
        })
    }

    /// Create a genome map from unnamed lengths; chromosomes are named
    /// `chr1`, `chr2`, ...
    pub fn from_lengths(lengths: &[Position]) -> Result<Self> {
        let chromosomes = lengths
            .iter()
            .enumerate()
            .map(|(i, &length)| (format!("chr{}", i + 1), length))
            .collect();
        Self::new(chromosomes)
    }

    /// The 22 human autosomes.
    pub fn human_autosomes() -> Self {
        let names = (1..=HUMAN_AUTOSOME_LENGTHS.len())
            .map(|i| format!("chr{}", i))
            .collect();
        let lengths = HUMAN_AUTOSOME_LENGTHS.to_vec();
        let ends = cumulative_sum(&lengths);
        Self {
            names,
            lengths,
            ends,
        }
    }

    /// Read a tab-delimited file of chromosome names and lengths in Morgans.
    ///
    /// Lines starting with `#` are ignored; the file may be gzip-compressed.
    pub fn from_tsv(filepath: &str) -> Result<Self> {
        #[derive(Debug, Deserialize)]
        struct ChromosomeEntry {
            chrom: String,
            length: Position,
        }

        let reader = InputFile::new(filepath).reader()?;
        let mut rdr = csv::ReaderBuilder::new()
            .delimiter(b'\t')
            .has_headers(false)
            .comment(Some(b'#'))
            .from_reader(reader);

        let mut chromosomes = IndexMap::new();
        for result in rdr.deserialize() {
            let record: ChromosomeEntry = result?;
            chromosomes.insert(record.chrom, record.length);
        }
        Self::new(chromosomes)
    }

    /// Number of chromosomes.
    pub fn len(&self) -> usize {
        self.lengths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lengths.is_empty()
    }

    /// Total genome length `L`.
    pub fn total_length(&self) -> Position {
        self.ends.last().copied().unwrap_or(0.0)
    }

    pub fn lengths(&self) -> &[Position] {
        &self.lengths
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Cumulative chromosome end positions, ending with `L`.
    pub fn ends(&self) -> &[Position] {
        &self.ends
    }

    /// Interior chromosome boundaries: every end position except `L`.
    pub fn boundaries(&self) -> &[Position] {
        &self.ends[..self.ends.len().saturating_sub(1)]
    }

    /// Index of the chromosome containing `position`, or `None` outside `[0, L)`.
    pub fn chromosome_at(&self, position: Position) -> Option<usize> {
        if !(0.0..self.total_length()).contains(&position) {
            return None;
        }
        Some(bisect_right(&self.ends, &position))
    }

    /// Name of the chromosome containing `position` and the offset into it.
    pub fn locate(&self, position: Position) -> Option<(&str, Position)> {
        let index = self.chromosome_at(position)?;
        let start = if index == 0 { 0.0 } else { self.ends[index - 1] };
        Some((&self.names[index], position - start))
    }
}
