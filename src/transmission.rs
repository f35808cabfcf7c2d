//! Moving every sampled chromosome one generation further into the past.
//!
//! Each segment of a [`ChromosomeCopy`] traces to an ancestral haplotype.
//! That haplotype was made by one meiosis in one parent: the parent is drawn
//! (migration-aware) and the crossovers realized the first time the
//! haplotype is met, and the pair is memoized so every other segment tracing
//! to the same haplotype goes through the identical meiosis. The segment is
//! then cut at the meiosis' breakpoints and each piece is relabelled with
//! the parental strand it was copied from.
use rand::Rng;
use std::collections::HashMap;

use crate::ancestry::{AncestorEncoder, AncestorId, Haplotype, IndividualRef};
use crate::demography::{validate_generation, AncestralSizes};
use crate::error::{PedigreeError, Result};
use crate::genome::{GenomeMap, Position};
use crate::migration::{MigrationMatrix, MigrationRates, ParentPicker};
use crate::numeric::bisect_right;
use crate::population::{ChromosomeCopy, Population};
use crate::recombination::{Crossovers, Recombinator};

/// The meiosis that produced one ancestral haplotype.
#[derive(Debug, Clone, PartialEq)]
pub struct Meiosis {
    pub parent: IndividualRef,
    pub crossovers: Crossovers,
}

/// Generation-scoped cache of meioses keyed by the haplotype they produced.
#[derive(Debug, Default)]
pub struct MeiosisMemo {
    meioses: HashMap<AncestorId, Meiosis>,
}

impl MeiosisMemo {
    pub fn get(&self, id: AncestorId) -> Option<&Meiosis> {
        self.meioses.get(&id)
    }

    pub fn len(&self) -> usize {
        self.meioses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.meioses.is_empty()
    }

    pub fn clear(&mut self) {
        self.meioses.clear();
    }
}

/// Counts for one committed generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GenerationSummary {
    /// Distinct meioses resolved, i.e. ancestral haplotypes that carried
    /// sampled material.
    pub meioses: usize,
    /// Segments over all sampled copies after the step.
    pub segments: usize,
}

/// Transmission through one generation.
pub struct Transmission<'a, C> {
    genome: &'a GenomeMap,
    recombinator: &'a C,
    picker: ParentPicker,
    /// Encoder of the ids being consumed.
    current: AncestorEncoder,
    /// Encoder of the ids being produced.
    parental: AncestorEncoder,
    memo: MeiosisMemo,
}

impl<'a, C: Recombinator> Transmission<'a, C> {
    /// Prepare the parent picker for a generation.
    ///
    /// `sizes` and `migration` are keyed by deme name and must cover exactly
    /// `deme_names`, the population's demes.
    pub fn new(
        deme_names: &[String],
        current: AncestorEncoder,
        sizes: &AncestralSizes,
        migration: &MigrationRates,
        genome: &'a GenomeMap,
        recombinator: &'a C,
    ) -> Result<Self> {
        let ordered_sizes = deme_names
            .iter()
            .map(|name| {
                sizes
                    .get(name)
                    .copied()
                    .ok_or_else(|| PedigreeError::UnknownDeme(name.clone()))
            })
            .collect::<Result<Vec<_>>>()?;
        let matrix = MigrationMatrix::new(deme_names, migration)?;
        let parental = AncestorEncoder::new(ordered_sizes.iter().copied().max().unwrap_or(0));
        Ok(Self {
            genome,
            recombinator,
            picker: ParentPicker::new(&matrix, ordered_sizes),
            current,
            parental,
            memo: MeiosisMemo::default(),
        })
    }

    pub fn memo(&self) -> &MeiosisMemo {
        &self.memo
    }

    /// Encoder for the ids produced by this generation.
    pub fn parental_encoder(&self) -> AncestorEncoder {
        self.parental
    }

    /// Look up, or draw and record, the meiosis that produced `id`.
    fn resolve<R: Rng + ?Sized>(&mut self, id: AncestorId, rng: &mut R) -> Result<&Meiosis> {
        if !self.memo.meioses.contains_key(&id) {
            let child = self.current.decode(id);
            // the two haplotypes of an individual come from two different parents
            let sibling = self.current.encode(child.sibling());
            let parent = match self.memo.meioses.get(&sibling) {
                Some(other) => self.picker.pick_distinct(child.deme, other.parent, rng),
                None => self.picker.pick(child.deme, rng),
            };
            let crossovers = self.recombinator.meiosis(self.genome, rng);
            self.memo
                .meioses
                .insert(id, Meiosis { parent, crossovers });
        }
        self.memo
            .meioses
            .get(&id)
            .ok_or(PedigreeError::MissingMeiosis(id.0))
    }

    /// The copy's ancestry one generation further back.
    pub fn transmit<R: Rng + ?Sized>(
        &mut self,
        copy: &ChromosomeCopy,
        rng: &mut R,
    ) -> Result<ChromosomeCopy> {
        let total_length = self.genome.total_length();
        let parental = self.parental;
        let mut positions: Vec<Position> = Vec::with_capacity(copy.len());
        let mut ancestors: Vec<AncestorId> = Vec::with_capacity(copy.len());

        let mut push = |position: Position, id: AncestorId| {
            // adjacent pieces tracing to the same ancestor are one segment
            if ancestors.last() != Some(&id) {
                positions.push(position);
                ancestors.push(id);
            }
        };

        for (start, end, id) in copy.segments(total_length) {
            let meiosis = self.resolve(id, rng)?;
            let breakpoints = &meiosis.crossovers.breakpoints;
            let strand_id = |index: usize| {
                parental.encode(Haplotype {
                    deme: meiosis.parent.deme,
                    individual: meiosis.parent.individual,
                    strand: meiosis.crossovers.strand(index),
                })
            };

            let mut j = bisect_right(breakpoints, &start);
            push(start, strand_id(j));
            while j < breakpoints.len() && breakpoints[j] < end {
                push(breakpoints[j], strand_id(j + 1));
                j += 1;
            }
        }

        ChromosomeCopy::from_parts(positions, ancestors, total_length)
    }
}

/// Advance the whole population one generation into the past.
///
/// Either every copy is rewritten and the population's encoder replaced, or
/// an error is returned and the population is untouched.
pub fn advance<C: Recombinator, R: Rng + ?Sized>(
    population: &mut Population,
    generation: usize,
    sizes: &AncestralSizes,
    migration: &MigrationRates,
    genome: &GenomeMap,
    recombinator: &C,
    rng: &mut R,
) -> Result<GenerationSummary> {
    let deme_names = population.deme_names();
    validate_generation(&deme_names, sizes, migration, generation)?;

    let mut transmission = Transmission::new(
        &deme_names,
        population.encoder(),
        sizes,
        migration,
        genome,
        recombinator,
    )?;

    let rewritten = population
        .copies()
        .map(|copy| transmission.transmit(copy, rng))
        .collect::<Result<Vec<_>>>()?;

    let summary = GenerationSummary {
        meioses: transmission.memo().len(),
        segments: rewritten.iter().map(|c| c.len()).sum(),
    };

    for (copy, new_copy) in population.copies_mut().zip(rewritten) {
        *copy = new_copy;
    }
    population.set_encoder(transmission.parental_encoder());
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::population::SampleSizes;
    use crate::recombination::{NoRecombination, PoissonCrossovers};
    use indexmap::indexmap;
    use rand::SeedableRng;
    use rand_xoshiro::Xoshiro256PlusPlus;

    fn one_deme(samples: usize) -> SampleSizes {
        indexmap! { "a".to_string() => samples }
    }

    fn sizes(n: usize) -> AncestralSizes {
        indexmap! { "a".to_string() => n }
    }

    #[test]
    fn test_partition_invariant_over_generations() {
        let genome = GenomeMap::from_lengths(&[2.0, 1.0]).unwrap();
        let mut pop = Population::new(&one_deme(5), &genome);
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(42);
        let rec = PoissonCrossovers::default();
        for t in 0..20 {
            advance(
                &mut pop,
                t,
                &sizes(10),
                &MigrationRates::new(),
                &genome,
                &rec,
                &mut rng,
            )
            .unwrap();
            pop.check().unwrap();
            for copy in pop.copies() {
                let segments: Vec<_> = copy.segments(genome.total_length()).collect();
                assert_eq!(segments[0].0, 0.0);
                assert_eq!(segments.last().unwrap().1, genome.total_length());
                assert!(segments.windows(2).all(|w| w[0].1 == w[1].0));
                // coalesced: no two adjacent segments share an ancestor
                assert!(copy.ancestors().windows(2).all(|w| w[0] != w[1]));
            }
        }
    }

    #[test]
    fn test_ancestors_decode_to_valid_parents() {
        let genome = GenomeMap::from_lengths(&[1.0]).unwrap();
        let samples = indexmap! { "a".to_string() => 3, "b".to_string() => 2 };
        let mut pop = Population::new(&samples, &genome);
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(8);
        let anc = indexmap! { "a".to_string() => 7, "b".to_string() => 2 };
        let mig = indexmap! { ("a".to_string(), "b".to_string()) => 0.5 };
        advance(&mut pop, 0, &anc, &mig, &genome, &PoissonCrossovers::default(), &mut rng)
            .unwrap();
        let encoder = pop.encoder();
        for copy in pop.copies() {
            for &id in copy.ancestors() {
                let hap = encoder.decode(id);
                let size = if hap.deme == 0 { 7 } else { 2 };
                assert!(hap.individual < size);
                assert!(hap.strand < 2);
            }
        }
    }

    #[test]
    fn test_meiosis_consistency() {
        let genome = GenomeMap::from_lengths(&[2.0, 1.0]).unwrap();
        let names = vec!["a".to_string()];
        let current = AncestorEncoder::new(4);
        let rec = PoissonCrossovers::default();
        let mut transmission =
            Transmission::new(&names, current, &sizes(50), &MigrationRates::new(), &genome, &rec)
                .unwrap();
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(99);

        let x = AncestorId(3);
        let y = AncestorId(4);
        let first = ChromosomeCopy::from_parts(vec![0.0, 1.0], vec![x, y], 3.0).unwrap();
        let second = ChromosomeCopy::from_parts(vec![0.0, 0.5, 2.5], vec![y, x, y], 3.0).unwrap();
        let whole = ChromosomeCopy::whole(x);

        let outputs: Vec<_> = [&first, &second, &whole]
            .iter()
            .map(|c| transmission.transmit(c, &mut rng).unwrap())
            .collect();
        assert_eq!(transmission.memo().len(), 2);

        let parental = transmission.parental_encoder();
        for (input, output) in [&first, &second, &whole].iter().zip(outputs.iter()) {
            for (start, end, old) in input.segments(3.0) {
                let meiosis = transmission.memo().get(old).unwrap();
                for (s, e, new) in output.segments(3.0) {
                    let lo = s.max(start);
                    let hi = e.min(end);
                    if lo < hi {
                        let expected = parental.encode(Haplotype {
                            deme: meiosis.parent.deme,
                            individual: meiosis.parent.individual,
                            strand: meiosis.crossovers.strand_at(lo),
                        });
                        assert_eq!(new, expected);
                    }
                }
            }
        }
    }

    #[test]
    fn test_identical_copies_transmit_identically() {
        let genome = GenomeMap::from_lengths(&[1.5, 1.0]).unwrap();
        let names = vec!["a".to_string()];
        let rec = PoissonCrossovers::default();
        let mut transmission = Transmission::new(
            &names,
            AncestorEncoder::new(1),
            &sizes(10),
            &MigrationRates::new(),
            &genome,
            &rec,
        )
        .unwrap();
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(5);
        let copy = ChromosomeCopy::whole(AncestorId(0));
        let a = transmission.transmit(&copy, &mut rng).unwrap();
        let b = transmission.transmit(&copy, &mut rng).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_individual_has_two_distinct_parents() {
        let genome = GenomeMap::from_lengths(&[1.0]).unwrap();
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(17);
        for _ in 0..50 {
            let mut pop = Population::new(&one_deme(1), &genome);
            advance(
                &mut pop,
                0,
                &sizes(2),
                &MigrationRates::new(),
                &genome,
                &NoRecombination,
                &mut rng,
            )
            .unwrap();
            let encoder = pop.encoder();
            let parents: Vec<_> = pop
                .copies()
                .map(|c| encoder.decode(c.ancestors()[0]).owner())
                .collect();
            assert_ne!(parents[0], parents[1]);
        }
    }

    #[test]
    fn test_no_recombination_keeps_single_segment() {
        let genome = GenomeMap::from_lengths(&[1.0, 1.0]).unwrap();
        let mut pop = Population::new(&one_deme(4), &genome);
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(1);
        for t in 0..10 {
            advance(
                &mut pop,
                t,
                &sizes(3),
                &MigrationRates::new(),
                &genome,
                &NoRecombination,
                &mut rng,
            )
            .unwrap();
        }
        assert!(pop.copies().all(|c| c.len() == 1));
    }

    #[test]
    fn test_configuration_error_leaves_population_untouched() {
        let genome = GenomeMap::from_lengths(&[1.0]).unwrap();
        let mut pop = Population::new(&one_deme(2), &genome);
        let before: Vec<_> = pop.copies().cloned().collect();
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(1);
        let wrong = indexmap! { "b".to_string() => 10 };
        let err = advance(
            &mut pop,
            0,
            &wrong,
            &MigrationRates::new(),
            &genome,
            &NoRecombination,
            &mut rng,
        )
        .unwrap_err();
        assert!(err.is_configuration());
        let after: Vec<_> = pop.copies().cloned().collect();
        assert_eq!(before, after);
    }

    #[test]
    fn test_disjoint_demes_never_share_ancestors() {
        let genome = GenomeMap::from_lengths(&[1.0]).unwrap();
        let samples = indexmap! { "a".to_string() => 3, "b".to_string() => 3 };
        let mut pop = Population::new(&samples, &genome);
        let anc = indexmap! { "a".to_string() => 2, "b".to_string() => 2 };
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(23);
        for t in 0..15 {
            advance(
                &mut pop,
                t,
                &anc,
                &MigrationRates::new(),
                &genome,
                &PoissonCrossovers::default(),
                &mut rng,
            )
            .unwrap();
        }
        let encoder = pop.encoder();
        for (d, deme) in pop.demes().iter().enumerate() {
            for ind in deme.individuals.iter() {
                for copy in ind.copies.iter() {
                    assert!(copy.ancestors().iter().all(|&id| encoder.decode(id).deme == d));
                }
            }
        }
    }
}
