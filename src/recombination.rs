//! Crossover realizations for single meioses.
//!
//! A realization is an increasing list of breakpoints together with the
//! parental strand the transmitted chromosome starts on. The strand used on
//! the `j`-th interval (the one following `j` breakpoints) alternates by the
//! parity of `j`, so physical strand identity never has to be tracked.
use rand::Rng;
use rand_distr::Exp1;

use crate::ancestry::PLOIDY;
use crate::genome::{GenomeMap, Position};
use crate::numeric::bisect_right;

/// One meiosis: where the transmitted chromosome switches parental strand.
#[derive(Debug, Clone, PartialEq)]
pub struct Crossovers {
    /// Strictly increasing positions in `(0, L)`.
    pub breakpoints: Vec<Position>,
    /// Parental strand copied on the first interval.
    pub first_strand: usize,
}

impl Crossovers {
    /// Strand copied on the interval that follows `index` breakpoints.
    pub fn strand(&self, index: usize) -> usize {
        (self.first_strand + index) % PLOIDY
    }

    /// Strand copied at `position`.
    pub fn strand_at(&self, position: Position) -> usize {
        self.strand(bisect_right(&self.breakpoints, &position))
    }
}

/// How chromosome boundaries enter a realization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BoundaryPolicy {
    /// Every boundary is a breakpoint.
    #[default]
    Forced,
    /// Each boundary is a breakpoint with probability 1/2, so the starting
    /// strand of every chromosome is an independent fair coin.
    Independent,
}

/// Generator of crossover realizations.
pub trait Recombinator {
    fn meiosis<R: Rng + ?Sized>(&self, genome: &GenomeMap, rng: &mut R) -> Crossovers;
}

/// Unit-rate Poisson crossovers along the concatenated genome (one expected
/// crossover per Morgan), merged with the chromosome boundaries.
#[derive(Debug, Clone, Copy, Default)]
pub struct PoissonCrossovers {
    pub boundaries: BoundaryPolicy,
}

impl PoissonCrossovers {
    pub fn new(boundaries: BoundaryPolicy) -> Self {
        Self { boundaries }
    }
}

impl Recombinator for PoissonCrossovers {
    fn meiosis<R: Rng + ?Sized>(&self, genome: &GenomeMap, rng: &mut R) -> Crossovers {
        let first_strand = rng.random_range(0..PLOIDY);
        let total_length = genome.total_length();

        let mut breakpoints: Vec<Position> = match self.boundaries {
            BoundaryPolicy::Forced => genome.boundaries().to_vec(),
            BoundaryPolicy::Independent => genome
                .boundaries()
                .iter()
                .copied()
                .filter(|_| rng.random::<bool>())
                .collect(),
        };

        let mut z: Position = rng.sample(Exp1);
        while z < total_length {
            breakpoints.push(z);
            let step: Position = rng.sample(Exp1);
            z += step;
        }

        breakpoints.sort_by(|a, b| a.total_cmp(b));
        breakpoints.dedup();
        // an exponential draw of exactly zero would otherwise duplicate the origin
        breakpoints.retain(|&b| b > 0.0);

        Crossovers {
            breakpoints,
            first_strand,
        }
    }
}

/// Degenerate generator: the whole genome is copied from one strand.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoRecombination;

impl Recombinator for NoRecombination {
    fn meiosis<R: Rng + ?Sized>(&self, _genome: &GenomeMap, rng: &mut R) -> Crossovers {
        Crossovers {
            breakpoints: Vec::new(),
            first_strand: rng.random_range(0..PLOIDY),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_xoshiro::Xoshiro256PlusPlus;

    fn genome() -> GenomeMap {
        GenomeMap::from_lengths(&[2.0, 1.0]).unwrap()
    }

    #[test]
    fn test_breakpoints_increasing_and_in_range() {
        let genome = genome();
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(42);
        let rec = PoissonCrossovers::default();
        for _ in 0..200 {
            let xo = rec.meiosis(&genome, &mut rng);
            assert!(xo.first_strand < PLOIDY);
            assert!(xo.breakpoints.windows(2).all(|w| w[0] < w[1]));
            assert!(xo
                .breakpoints
                .iter()
                .all(|&b| b > 0.0 && b < genome.total_length()));
        }
    }

    #[test]
    fn test_forced_boundaries_always_present() {
        let genome = genome();
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(1);
        let rec = PoissonCrossovers::new(BoundaryPolicy::Forced);
        for _ in 0..100 {
            let xo = rec.meiosis(&genome, &mut rng);
            assert!(xo.breakpoints.contains(&2.0));
        }
    }

    #[test]
    fn test_independent_boundaries_sometimes_absent() {
        let genome = genome();
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(1);
        let rec = PoissonCrossovers::new(BoundaryPolicy::Independent);
        let with_boundary = (0..400)
            .filter(|_| rec.meiosis(&genome, &mut rng).breakpoints.contains(&2.0))
            .count();
        assert!(with_boundary > 100 && with_boundary < 300);
    }

    #[test]
    fn test_mean_crossover_count() {
        // 3 Morgans: three crossovers expected, plus the forced boundary
        let genome = genome();
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(7);
        let rec = PoissonCrossovers::default();
        let n = 2000;
        let total: usize = (0..n)
            .map(|_| rec.meiosis(&genome, &mut rng).breakpoints.len() - 1)
            .sum();
        let mean = total as f64 / n as f64;
        assert!((mean - 3.0).abs() < 0.2, "mean crossovers {}", mean);
    }

    #[test]
    fn test_strand_alternates_by_parity() {
        let xo = Crossovers {
            breakpoints: vec![0.5, 1.2, 2.0],
            first_strand: 1,
        };
        assert_eq!(xo.strand(0), 1);
        assert_eq!(xo.strand(1), 0);
        assert_eq!(xo.strand(2), 1);
        assert_eq!(xo.strand_at(0.0), 1);
        assert_eq!(xo.strand_at(0.5), 0);
        assert_eq!(xo.strand_at(1.5), 1);
        assert_eq!(xo.strand_at(2.5), 0);
    }

    #[test]
    fn test_no_recombination() {
        let genome = genome();
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(3);
        let xo = NoRecombination.meiosis(&genome, &mut rng);
        assert!(xo.breakpoints.is_empty());
        assert!(xo.first_strand < PLOIDY);
    }

    #[test]
    fn test_seeded_realizations_reproducible() {
        let genome = genome();
        let rec = PoissonCrossovers::default();
        let mut a = Xoshiro256PlusPlus::seed_from_u64(11);
        let mut b = Xoshiro256PlusPlus::seed_from_u64(11);
        for _ in 0..20 {
            assert_eq!(rec.meiosis(&genome, &mut a), rec.meiosis(&genome, &mut b));
        }
    }
}
