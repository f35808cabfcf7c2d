//! Ground-truth identity-by-descent from simulated diploid pedigrees.
//!
//! Sampled chromosomes are traced backwards in time through a Wright-Fisher
//! pedigree with demes and migration. Every sampled haplotype is a mosaic of
//! [`AncestorId`] labels; after a number of generations, two samples sharing
//! the same label over an interval are IBD there, and the [`ibd`] sweep
//! reports those intervals.
//!
//! Here is an example which simulates 20 generations in a single deme of 10
//! individuals and writes the IBD table to standard out.
//!
//! ```no_run
//! use pedibd::prelude::*;
//! use rand::SeedableRng;
//! use rand_xoshiro::Xoshiro256PlusPlus;
//!
//! let genome = GenomeMap::from_lengths(&[2.0, 1.0]).expect("invalid genome");
//! let samples = parse_sample_sizes("pop=2").expect("invalid samples");
//! let demography = ConstantDemography::uniform(&["pop"], 10, 0.0);
//! let rng = Xoshiro256PlusPlus::seed_from_u64(42);
//!
//! let mut sim = Simulation::new(genome, &samples, demography,
//!                               PoissonCrossovers::default(), rng)
//!                   .expect("inconsistent configuration");
//! sim.run(20).expect("simulation failed");
//! sim.write_ibd(IbdPolicy::default(), std::io::stdout())
//!    .expect("could not write IBD segments");
//! ```
//!
//! The same run from the command line:
//!
//! ```bash
//! pedibd simulate --samples pop=2 --nesize 10 --chromosomes chroms.tsv -t 20 --seed 42
//! ```

pub mod ancestry;
pub mod demography;
pub mod error;
pub mod file;
pub mod genome;
pub mod ibd;
pub mod migration;
mod numeric;
pub mod population;
pub mod recombination;
pub mod simulation;
pub mod transmission;

pub use error::{PedigreeError, Result};
pub use genome::GenomeMap;
pub use ibd::{IbdExtractor, IbdPolicy, IbdSegment, IbdWriter};
pub use population::Population;
pub use simulation::Simulation;

pub mod prelude {
    pub use crate::ancestry::{AncestorEncoder, AncestorId, Haplotype, PLOIDY};
    pub use crate::demography::{
        parse_sample_sizes, ConstantDemography, Demography, EpochDemography, FnDemography,
    };
    pub use crate::error::{PedigreeError, Result};
    pub use crate::genome::{GenomeMap, Position};
    pub use crate::ibd::{IbdExtractor, IbdPolicy, IbdSegment, IbdWriter, IBD_HEADER};
    pub use crate::migration::{MigrationMatrix, MigrationRates};
    pub use crate::population::{ChromosomeCopy, Population, SampleSizes};
    pub use crate::recombination::{
        BoundaryPolicy, NoRecombination, PoissonCrossovers, Recombinator,
    };
    pub use crate::simulation::{Checkpoint, Simulation};
}
