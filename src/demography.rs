//! Demographic scenarios: per-generation ancestral deme sizes and backward
//! migration probabilities.
//!
//! A [`Demography`] is pure data indexed by generation `t` (counting
//! backwards from the sample at `t = 0`). Three implementations are
//! provided: constant sizes and rates ([`ConstantDemography`]), arbitrary
//! closures ([`FnDemography`]) and piecewise-constant epochs read from TSV
//! files ([`EpochDemography`]).
use indexmap::{IndexMap, IndexSet};
use serde::Deserialize;

use crate::error::{PedigreeError, Result};
use crate::file::InputFile;
use crate::migration::MigrationRates;
use crate::numeric::bisect_right;
use crate::population::SampleSizes;

/// Ordered mapping from deme name to ancestral (effective) size.
pub type AncestralSizes = IndexMap<String, usize>;

pub trait Demography {
    /// Ancestral deme sizes at generation `t`.
    fn ancestral_sizes(&self, generation: usize) -> AncestralSizes;
    /// Backward migration probabilities at generation `t`.
    fn migration_rates(&self, generation: usize) -> MigrationRates;
}

impl<D: Demography + ?Sized> Demography for Box<D> {
    fn ancestral_sizes(&self, generation: usize) -> AncestralSizes {
        (**self).ancestral_sizes(generation)
    }

    fn migration_rates(&self, generation: usize) -> MigrationRates {
        (**self).migration_rates(generation)
    }
}

/// The same sizes and migration rates in every generation.
#[derive(Debug, Clone)]
pub struct ConstantDemography {
    pub sizes: AncestralSizes,
    pub migration: MigrationRates,
}

impl ConstantDemography {
    pub fn new(sizes: AncestralSizes, migration: MigrationRates) -> Self {
        Self { sizes, migration }
    }

    /// Every deme has `size` ancestors and every ordered pair of distinct
    /// demes exchanges migrants with probability `migration`.
    pub fn uniform<S: AsRef<str>>(demes: &[S], size: usize, migration: f64) -> Self {
        let sizes = demes
            .iter()
            .map(|d| (d.as_ref().to_string(), size))
            .collect();
        let mut rates = MigrationRates::new();
        if migration > 0.0 {
            for x in demes {
                for y in demes {
                    if x.as_ref() != y.as_ref() {
                        rates.insert((x.as_ref().to_string(), y.as_ref().to_string()), migration);
                    }
                }
            }
        }
        Self::new(sizes, rates)
    }
}

impl Demography for ConstantDemography {
    fn ancestral_sizes(&self, _generation: usize) -> AncestralSizes {
        self.sizes.clone()
    }

    fn migration_rates(&self, _generation: usize) -> MigrationRates {
        self.migration.clone()
    }
}

/// A demography given by two functions of the generation.
pub struct FnDemography<S, M> {
    sizes: S,
    migration: M,
}

impl<S, M> FnDemography<S, M>
where
    S: Fn(usize) -> AncestralSizes,
    M: Fn(usize) -> MigrationRates,
{
    pub fn new(sizes: S, migration: M) -> Self {
        Self { sizes, migration }
    }
}

impl<S, M> Demography for FnDemography<S, M>
where
    S: Fn(usize) -> AncestralSizes,
    M: Fn(usize) -> MigrationRates,
{
    fn ancestral_sizes(&self, generation: usize) -> AncestralSizes {
        (self.sizes)(generation)
    }

    fn migration_rates(&self, generation: usize) -> MigrationRates {
        (self.migration)(generation)
    }
}

/// Piecewise-constant sizes and migration rates.
///
/// Each value holds from the generation it is listed at until the next
/// listed generation for the same deme (or deme pair). A deme with no
/// entry at or before `t` is absent at `t`; a pair with no entry is zero.
#[derive(Debug, Clone, Default)]
pub struct EpochDemography {
    sizes: IndexMap<String, Vec<(usize, usize)>>,
    migration: IndexMap<(String, String), Vec<(usize, f64)>>,
}

fn value_at<T: Copy>(epochs: &[(usize, T)], generation: usize) -> Option<T> {
    let starts: Vec<usize> = epochs.iter().map(|&(start, _)| start).collect();
    let index = bisect_right(&starts, &generation);
    index.checked_sub(1).map(|k| epochs[k].1)
}

impl EpochDemography {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the size of `deme` from generation `start` on.
    pub fn set_size(&mut self, start: usize, deme: &str, size: usize) -> &mut Self {
        let epochs = self.sizes.entry(deme.to_string()).or_default();
        insert_epoch(epochs, start, size);
        self
    }

    /// Set the backward migration probability `from -> to` from generation
    /// `start` on.
    pub fn set_migration(&mut self, start: usize, from: &str, to: &str, probability: f64) -> &mut Self {
        let epochs = self
            .migration
            .entry((from.to_string(), to.to_string()))
            .or_default();
        insert_epoch(epochs, start, probability);
        self
    }

    /// Read `generation<TAB>deme<TAB>size` rows.
    pub fn read_sizes(&mut self, filepath: &str) -> Result<&mut Self> {
        #[derive(Debug, Deserialize)]
        struct SizeEntry {
            generation: usize,
            deme: String,
            size: usize,
        }

        for record in read_tsv::<SizeEntry>(filepath)? {
            self.set_size(record.generation, &record.deme, record.size);
        }
        Ok(self)
    }

    /// Read `generation<TAB>from<TAB>to<TAB>probability` rows.
    pub fn read_migration(&mut self, filepath: &str) -> Result<&mut Self> {
        #[derive(Debug, Deserialize)]
        struct MigrationEntry {
            generation: usize,
            from: String,
            to: String,
            probability: f64,
        }

        for record in read_tsv::<MigrationEntry>(filepath)? {
            self.set_migration(record.generation, &record.from, &record.to, record.probability);
        }
        Ok(self)
    }
}

fn insert_epoch<T>(epochs: &mut Vec<(usize, T)>, start: usize, value: T) {
    match epochs.binary_search_by_key(&start, |&(s, _)| s) {
        Ok(k) => epochs[k].1 = value,
        Err(k) => epochs.insert(k, (start, value)),
    }
}

fn read_tsv<T: for<'de> Deserialize<'de>>(filepath: &str) -> Result<Vec<T>> {
    let reader = InputFile::new(filepath).reader()?;
    let mut rdr = csv::ReaderBuilder::new()
        .delimiter(b'\t')
        .has_headers(false)
        .comment(Some(b'#'))
        .from_reader(reader);
    let records = rdr.deserialize().collect::<std::result::Result<Vec<T>, _>>()?;
    Ok(records)
}

impl Demography for EpochDemography {
    fn ancestral_sizes(&self, generation: usize) -> AncestralSizes {
        self.sizes
            .iter()
            .filter_map(|(deme, epochs)| value_at(epochs, generation).map(|s| (deme.clone(), s)))
            .collect()
    }

    fn migration_rates(&self, generation: usize) -> MigrationRates {
        self.migration
            .iter()
            .filter_map(|(pair, epochs)| value_at(epochs, generation).map(|p| (pair.clone(), p)))
            .filter(|&(_, p)| p != 0.0)
            .collect()
    }
}

/// Check one generation's sizes and migration rates against the sampled
/// demes: the same deme names, positive sizes, and migration between known
/// demes only. Migration row sums are checked when the matrix is built.
pub fn validate_generation(
    deme_names: &[String],
    sizes: &AncestralSizes,
    migration: &MigrationRates,
    generation: usize,
) -> Result<()> {
    let expected: IndexSet<&String> = deme_names.iter().collect();
    let found: IndexSet<&String> = sizes.keys().collect();
    if expected != found {
        return Err(PedigreeError::InconsistentDemes(format!(
            "samples are from {:?} but generation {} has ancestral sizes for {:?}",
            deme_names,
            generation,
            sizes.keys().collect::<Vec<_>>()
        )));
    }
    if let Some((deme, _)) = sizes.iter().find(|(_, &size)| size == 0) {
        return Err(PedigreeError::NonPositiveSize(deme.clone(), generation));
    }
    for (from, to) in migration.keys() {
        for name in [from, to] {
            if !expected.contains(name) {
                return Err(PedigreeError::InconsistentDemes(format!(
                    "generation {} has migration involving unknown deme '{}'",
                    generation, name
                )));
            }
        }
    }
    Ok(())
}

/// Parse sample sizes written as `a=10,b=5` (named demes) or `10,5` (demes
/// named by their index).
pub fn parse_sample_sizes(text: &str) -> Result<SampleSizes> {
    let err = || PedigreeError::SampleSizeParse(text.to_string());
    let mut sizes = SampleSizes::new();
    for (k, field) in text
        .split(|c: char| c == ',' || c.is_whitespace())
        .filter(|f| !f.is_empty())
        .enumerate()
    {
        let (name, count) = match field.split_once('=') {
            Some((name, count)) => (name.trim().to_string(), count.trim()),
            None => (k.to_string(), field),
        };
        let count: usize = count.parse().map_err(|_| err())?;
        if sizes.insert(name, count).is_some() {
            return Err(err());
        }
    }
    Ok(sizes)
}
