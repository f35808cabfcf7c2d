use clap::{Parser, Subcommand};
use rand::{Rng, SeedableRng};
use rand_xoshiro::Xoshiro256PlusPlus;
use tracing::info;
use tracing_subscriber::filter::LevelFilter;

use pedibd::demography::{parse_sample_sizes, ConstantDemography, Demography, EpochDemography};
use pedibd::file::OutputFile;
use pedibd::recombination::{BoundaryPolicy, NoRecombination, PoissonCrossovers, Recombinator};
use pedibd::{GenomeMap, IbdPolicy, PedigreeError, Simulation};

const INFO: &str = "\
pedibd: simulate ground-truth IBD segments through a diploid pedigree
usage: pedibd [--help] <subcommand>

Subcommands:

  simulate: trace sampled chromosomes back in time and write their IBD segments.

";

#[derive(Parser)]
#[clap(name = "pedibd")]
#[clap(about = INFO)]
struct Cli {
    #[arg(short, long, action = clap::ArgAction::Count)]
    debug: u8,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Simulate a pedigree backwards in time and write the IBD segments shared
    /// by the sampled haplotypes.
    ///
    /// This will output a whitespace-delimited table with the columns:
    ///
    ///  - id1    first sample haplotype
    ///  - id2    second sample haplotype (id1 < id2)
    ///  - start  segment start (in Morgans, on the concatenated genome)
    ///  - end    segment end (exclusive)
    ///
    /// Haplotypes are numbered by deme, then individual, then strand.
    ///
    /// Example:
    ///
    ///  $ pedibd simulate --samples east=10,west=10 --nesize 500 --migprob 0.01 \
    ///      -t 50 --seed 1 --output ibd.txt.gz
    Simulate {
        /// number of generations to trace back
        #[arg(short = 't', long, default_value_t = 10)]
        generations: usize,
        /// diploid sample sizes, as 'name=count,...' or 'count,...'
        #[arg(short, long, required = true)]
        samples: String,
        /// constant ancestral size of every deme
        #[arg(short, long, default_value_t = 1000)]
        nesize: usize,
        /// constant backward migration probability between every pair of demes
        #[arg(short, long, default_value_t = 0.0)]
        migprob: f64,
        /// a TSV of generation, deme, ancestral size epochs (overrides --nesize)
        #[arg(long)]
        sizes: Option<String>,
        /// a TSV of generation, from, to, probability epochs (overrides --migprob)
        #[arg(long)]
        migration: Option<String>,
        /// a TSV of chromosome names and lengths in Morgans (default: human autosomes)
        #[arg(long)]
        chromosomes: Option<String>,
        /// random seed (drawn from entropy if not set)
        #[arg(long)]
        seed: Option<u64>,
        /// only report IBD segments at least this long
        #[arg(long, default_value_t = 0.01)]
        minlen: f64,
        /// merge IBD segments separated by gaps no longer than this
        #[arg(long, default_value_t = 5.0)]
        gaplen: f64,
        /// copy whole genomes from one parental strand
        #[arg(long, default_value_t = false)]
        no_recombination: bool,
        /// place each chromosome boundary in a meiosis with probability 1/2
        #[arg(long, default_value_t = false)]
        independent_assortment: bool,
        /// the output file path ('-' for standard out, '.gz' to compress)
        #[arg(short, long, default_value = "-")]
        output: String,
    },
}

struct SimulateArgs {
    generations: usize,
    samples: String,
    nesize: usize,
    migprob: f64,
    sizes: Option<String>,
    migration: Option<String>,
    chromosomes: Option<String>,
    seed: Option<u64>,
    policy: IbdPolicy,
    no_recombination: bool,
    independent_assortment: bool,
    output: String,
}

fn init_logging(debug: u8) {
    let level = match debug {
        0 => LevelFilter::INFO,
        1 => LevelFilter::DEBUG,
        _ => LevelFilter::TRACE,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();
}

/// Constant sizes and rates from `--nesize`/`--migprob`, unless epoch files
/// replace either of them.
fn build_demography(
    args: &SimulateArgs,
    demes: &[String],
) -> Result<Box<dyn Demography>, PedigreeError> {
    let constant = ConstantDemography::uniform(demes, args.nesize, args.migprob);
    if args.sizes.is_none() && args.migration.is_none() {
        return Ok(Box::new(constant));
    }
    let mut epochs = EpochDemography::new();
    match &args.sizes {
        Some(path) => {
            epochs.read_sizes(path)?;
        }
        None => {
            for (deme, &size) in constant.sizes.iter() {
                epochs.set_size(0, deme, size);
            }
        }
    }
    match &args.migration {
        Some(path) => {
            epochs.read_migration(path)?;
        }
        None => {
            for ((from, to), &probability) in constant.migration.iter() {
                epochs.set_migration(0, from, to, probability);
            }
        }
    }
    Ok(Box::new(epochs))
}

fn simulate_with<C: Recombinator>(
    args: &SimulateArgs,
    recombinator: C,
) -> Result<(), PedigreeError> {
    let samples = parse_sample_sizes(&args.samples)?;
    let demes: Vec<String> = samples.keys().cloned().collect();
    let genome = match &args.chromosomes {
        Some(path) => GenomeMap::from_tsv(path)?,
        None => GenomeMap::human_autosomes(),
    };
    let demography = build_demography(args, &demes)?;

    let seed = args.seed.unwrap_or_else(|| rand::rng().random());
    info!(seed, generations = args.generations, "starting simulation");
    let rng = Xoshiro256PlusPlus::seed_from_u64(seed);

    let mut sim = Simulation::new(genome, &samples, demography, recombinator, rng)?;
    sim.run(args.generations)?;

    let writer = OutputFile::new(&args.output).writer()?;
    sim.write_ibd(args.policy, writer)?;
    Ok(())
}

fn simulate(args: SimulateArgs) -> Result<(), PedigreeError> {
    if args.no_recombination {
        simulate_with(&args, NoRecombination)
    } else {
        let boundaries = if args.independent_assortment {
            BoundaryPolicy::Independent
        } else {
            BoundaryPolicy::Forced
        };
        simulate_with(&args, PoissonCrossovers::new(boundaries))
    }
}

fn run() -> Result<(), PedigreeError> {
    let cli = Cli::parse();
    init_logging(cli.debug);
    match cli.command {
        Some(Commands::Simulate {
            generations,
            samples,
            nesize,
            migprob,
            sizes,
            migration,
            chromosomes,
            seed,
            minlen,
            gaplen,
            no_recombination,
            independent_assortment,
            output,
        }) => simulate(SimulateArgs {
            generations,
            samples,
            nesize,
            migprob,
            sizes,
            migration,
            chromosomes,
            seed,
            policy: IbdPolicy::new(minlen, gaplen)?,
            no_recombination,
            independent_assortment,
            output,
        }),
        None => {
            println!("{}\n", INFO);
            std::process::exit(1);
        }
    }
}

fn main() {
    match run() {
        Ok(_) => {}
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    }
}
