//! Backward migration and migration-aware parent sampling.
use indexmap::IndexMap;
use ndarray::{Array2, ArrayView1};
use rand::Rng;

use crate::ancestry::IndividualRef;
use crate::error::{PedigreeError, Result};
use crate::numeric::{bisect_right, cumulative_sum};

/// Backward migration probabilities keyed by ordered `(from, to)` deme
/// names: the probability that an individual in `from` has its parent in
/// `to`. Missing pairs are zero.
pub type MigrationRates = IndexMap<(String, String), f64>;

/// Tolerance on a deme's explicit outgoing total before it counts as above 1.
const ROW_TOLERANCE: f64 = 1e-9;

/// Square matrix of backward migration probabilities whose rows sum to one.
///
/// The diagonal is implicit: each deme keeps whatever probability its
/// explicit off-diagonal entries leave over. Explicit `(x, x)` entries are
/// ignored.
#[derive(Debug, Clone, PartialEq)]
pub struct MigrationMatrix {
    probabilities: Array2<f64>,
}

impl MigrationMatrix {
    pub fn new(deme_names: &[String], rates: &MigrationRates) -> Result<Self> {
        let n = deme_names.len();
        let index_of = |name: &String| {
            deme_names
                .iter()
                .position(|d| d == name)
                .ok_or_else(|| PedigreeError::UnknownDeme(name.clone()))
        };

        let mut probabilities = Array2::<f64>::zeros((n, n));
        for ((from, to), &probability) in rates.iter() {
            let x = index_of(from)?;
            let y = index_of(to)?;
            if !(probability >= 0.0) {
                return Err(PedigreeError::NegativeMigration {
                    from: from.clone(),
                    to: to.clone(),
                    probability,
                });
            }
            if x != y {
                probabilities[[x, y]] = probability;
            }
        }

        for (x, name) in deme_names.iter().enumerate() {
            let total: f64 = probabilities.row(x).sum();
            if total > 1.0 + ROW_TOLERANCE {
                return Err(PedigreeError::MigrationOverflow {
                    deme: name.clone(),
                    total,
                });
            }
            probabilities[[x, x]] = (1.0 - total).max(0.0);
        }
        Ok(Self { probabilities })
    }

    pub fn num_demes(&self) -> usize {
        self.probabilities.nrows()
    }

    /// Probability that an individual in deme `from` has its parent in `to`.
    pub fn probability(&self, from: usize, to: usize) -> f64 {
        self.probabilities[[from, to]]
    }

    pub fn row(&self, from: usize) -> ArrayView1<'_, f64> {
        self.probabilities.row(from)
    }
}

/// Draws parents for one generation: a deme from the migration row of the
/// child's deme, then an individual uniformly within that deme's ancestral
/// size.
#[derive(Debug, Clone)]
pub struct ParentPicker {
    /// Cumulative migration row per deme, each ending at exactly 1.
    cumulative: Vec<Vec<f64>>,
    sizes: Vec<usize>,
}

impl ParentPicker {
    /// `sizes` are the ancestral deme sizes, in the matrix's deme order, and
    /// must all be positive.
    pub fn new(matrix: &MigrationMatrix, sizes: Vec<usize>) -> Self {
        debug_assert_eq!(matrix.num_demes(), sizes.len());
        let cumulative = (0..matrix.num_demes())
            .map(|x| {
                let row: Vec<f64> = matrix.row(x).to_vec();
                let mut cum = cumulative_sum(&row);
                if let Some(last) = cum.last_mut() {
                    *last = 1.0;
                }
                cum
            })
            .collect();
        Self { cumulative, sizes }
    }

    pub fn sizes(&self) -> &[usize] {
        &self.sizes
    }

    /// Draw a parent for a child living in `deme`.
    pub fn pick<R: Rng + ?Sized>(&self, deme: usize, rng: &mut R) -> IndividualRef {
        let parent_deme = if self.sizes.len() == 1 {
            0
        } else {
            let row = &self.cumulative[deme];
            let u: f64 = rng.random();
            bisect_right(row, &u).min(row.len() - 1)
        };
        IndividualRef {
            deme: parent_deme,
            individual: rng.random_range(0..self.sizes[parent_deme]),
        }
    }

    /// Draw a parent for a child in `deme` that differs from `other`, the
    /// child's other parent, whenever the child's migration row leaves any
    /// other candidate.
    pub fn pick_distinct<R: Rng + ?Sized>(
        &self,
        deme: usize,
        other: IndividualRef,
        rng: &mut R,
    ) -> IndividualRef {
        if !self.has_alternative(deme, other) {
            return self.pick(deme, rng);
        }
        loop {
            let parent = self.pick(deme, rng);
            if parent != other {
                return parent;
            }
        }
    }

    fn has_alternative(&self, deme: usize, other: IndividualRef) -> bool {
        if self.sizes[other.deme] > 1 {
            return true;
        }
        let row = &self.cumulative[deme];
        row.iter().enumerate().any(|(y, &c)| {
            let previous = if y == 0 { 0.0 } else { row[y - 1] };
            y != other.deme && c > previous
        })
    }
}
