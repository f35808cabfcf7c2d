//! Driving a population backwards through a demographic scenario and
//! reporting the IBD segments it ends up with.
use rand::Rng;
use std::io::Write;
use std::ops::ControlFlow;
use tracing::{debug, info};

use crate::demography::{validate_generation, Demography};
use crate::error::Result;
use crate::genome::GenomeMap;
use crate::ibd::{IbdExtractor, IbdPolicy, IbdSegment, IbdWriter};
use crate::migration::MigrationMatrix;
use crate::population::{ChromosomeCopy, Population, SampleSizes};
use crate::recombination::Recombinator;
use crate::transmission::{advance, GenerationSummary};

/// Generations between census log lines.
const CENSUS_INTERVAL: usize = 10;

/// State handed out after each committed generation.
#[derive(Debug)]
pub struct Checkpoint<'a> {
    /// Number of generations committed so far.
    pub generation: usize,
    pub population: &'a Population,
    pub summary: GenerationSummary,
}

pub struct Simulation<D, C, R> {
    genome: GenomeMap,
    demography: D,
    recombinator: C,
    rng: R,
    population: Population,
    generation: usize,
}

impl<D, C, R> Simulation<D, C, R>
where
    D: Demography,
    C: Recombinator,
    R: Rng,
{
    /// Set up the generation-0 population, checking that the demography
    /// agrees with the sampled demes before anything is simulated.
    pub fn new(
        genome: GenomeMap,
        samples: &SampleSizes,
        demography: D,
        recombinator: C,
        rng: R,
    ) -> Result<Self> {
        let deme_names: Vec<String> = samples.keys().cloned().collect();
        let sizes = demography.ancestral_sizes(0);
        let migration = demography.migration_rates(0);
        validate_generation(&deme_names, &sizes, &migration, 0)?;
        MigrationMatrix::new(&deme_names, &migration)?;

        info!(
            demes = ?deme_names,
            samples = ?samples.values().collect::<Vec<_>>(),
            "initializing sampled population"
        );
        info!(chromosome_ends = ?genome.ends(), "genome map");
        info!(sizes = ?sizes, migration = ?migration, "demography at generation 0");

        let population = Population::new(samples, &genome);
        Ok(Self {
            genome,
            demography,
            recombinator,
            rng,
            population,
            generation: 0,
        })
    }

    /// Number of generations committed so far.
    pub fn generation(&self) -> usize {
        self.generation
    }

    pub fn population(&self) -> &Population {
        &self.population
    }

    pub fn genome(&self) -> &GenomeMap {
        &self.genome
    }

    pub fn into_population(self) -> Population {
        self.population
    }

    /// Advance one generation.
    pub fn step(&mut self) -> Result<GenerationSummary> {
        let t = self.generation;
        let sizes = self.demography.ancestral_sizes(t);
        let migration = self.demography.migration_rates(t);
        let summary = advance(
            &mut self.population,
            t,
            &sizes,
            &migration,
            &self.genome,
            &self.recombinator,
            &mut self.rng,
        )?;
        if cfg!(debug_assertions) {
            self.population.check()?;
        }
        self.generation += 1;
        debug!(
            generation = t,
            meioses = summary.meioses,
            segments = summary.segments,
            "committed generation"
        );
        Ok(summary)
    }

    /// Advance `generations` generations.
    pub fn run(&mut self, generations: usize) -> Result<usize> {
        self.run_with(generations, |_| ControlFlow::Continue(()))
    }

    /// Advance up to `generations` generations, calling `on_commit` after
    /// each one. Returning `ControlFlow::Break` stops between generations,
    /// leaving a consistent population. Returns the generations committed.
    pub fn run_with<F>(&mut self, generations: usize, mut on_commit: F) -> Result<usize>
    where
        F: FnMut(&Checkpoint<'_>) -> ControlFlow<()>,
    {
        for _ in 0..generations {
            if self.generation % CENSUS_INTERVAL == 0 {
                self.log_census();
            }
            let summary = self.step()?;
            let checkpoint = Checkpoint {
                generation: self.generation,
                population: &self.population,
                summary,
            };
            if on_commit(&checkpoint).is_break() {
                info!(generation = self.generation, "stop requested");
                break;
            }
        }
        self.log_census();
        Ok(self.generation)
    }

    fn log_census(&self) {
        for census in self.population.census() {
            info!(
                generation = self.generation,
                deme = %census.name,
                ancestors = census.ancestors,
                segments = census.segments,
                "census"
            );
        }
    }

    /// Sweep the current population for IBD segments.
    pub fn extract<F>(&self, policy: IbdPolicy, emit: F) -> Result<()>
    where
        F: FnMut(IbdSegment) -> Result<()>,
    {
        let copies: Vec<&ChromosomeCopy> = self.population.copies().collect();
        IbdExtractor::new(&self.genome, policy).extract(&copies, emit)
    }

    /// Write the IBD table of the current population; returns the number of
    /// rows written.
    pub fn write_ibd<W: Write>(&self, policy: IbdPolicy, writer: W) -> Result<usize> {
        let mut ibd = IbdWriter::new(writer)?;
        self.extract(policy, |segment| ibd.write(&segment))?;
        let rows = ibd.finish()?;
        info!(rows, "IBD segments written");
        Ok(rows)
    }
}
