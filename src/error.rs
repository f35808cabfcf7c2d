use std::io;
use thiserror::Error;

use crate::file::FileError;

#[derive(Error, Debug)]
pub enum PedigreeError {
    #[error("IO error: {0}")]
    IOError(#[from] io::Error),
    #[error("TSV parsing error: {0}")]
    TsvParsingError(#[from] csv::Error),
    #[error("File reading error: {0}")]
    FileError(#[from] FileError),

    // Configuration errors: fatal, raised before (or between) generations.
    #[error("Inconsistent deme names: {0}")]
    InconsistentDemes(String),
    #[error("Deme '{0}' is not one of the simulated demes")]
    UnknownDeme(String),
    #[error("Backward migration probabilities out of deme '{deme}' sum to {total} (> 1)")]
    MigrationOverflow { deme: String, total: f64 },
    #[error("Migration probability {from}->{to} is negative or NaN ({probability})")]
    NegativeMigration {
        from: String,
        to: String,
        probability: f64,
    },
    #[error("Chromosome '{0}' has non-positive length ({1})")]
    NonPositiveChromosomeLength(String, f64),
    #[error("Genome map has no chromosomes")]
    EmptyGenome,
    #[error("Deme '{0}' has a non-positive ancestral size at generation {1}")]
    NonPositiveSize(String, usize),
    #[error("Improper IBD reporting thresholds: {0}")]
    InvalidPolicy(String),
    #[error("Failed to parse sample sizes from '{0}'")]
    SampleSizeParse(String),

    // Invariant violations: programming errors, never repaired.
    #[error("Malformed chromosome copy: {0}")]
    MalformedChromosome(String),
    #[error("No meiosis registered for ancestor {0}")]
    MissingMeiosis(u64),
}

impl PedigreeError {
    /// Whether this error belongs to the configuration class (bad input),
    /// as opposed to an I/O failure or an internal invariant violation.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            PedigreeError::InconsistentDemes(_)
                | PedigreeError::UnknownDeme(_)
                | PedigreeError::MigrationOverflow { .. }
                | PedigreeError::NegativeMigration { .. }
                | PedigreeError::NonPositiveChromosomeLength(..)
                | PedigreeError::EmptyGenome
                | PedigreeError::NonPositiveSize(..)
                | PedigreeError::InvalidPolicy(_)
                | PedigreeError::SampleSizeParse(_)
        )
    }

    pub fn is_invariant_violation(&self) -> bool {
        matches!(
            self,
            PedigreeError::MalformedChromosome(_) | PedigreeError::MissingMeiosis(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, PedigreeError>;
