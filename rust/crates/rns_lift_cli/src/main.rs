//! RNS Lift CLI
//!
//! Exact rational solving of integer linear systems by multi-modulus p-adic
//! lifting.
//!
//! # Usage
//! ```bash
//! # Solve a random 64×64 system with 4 lifting primes
//! rns-lift solve --size 64 --primes 4
//!
//! # Solve an explicit system (augmented rows "a_i1 .. a_in b_i")
//! rns-lift solve --input system.txt
//!
//! # Sweep lifting-prime counts and export CSV
//! rns-lift sweep --sizes 32,64,128 --primes 1,2,4,8 --export sweep.csv
//! ```

mod scenarios;
mod sweep;

use clap::{Parser, Subcommand};
use env_logger::Env;
use log::error;
use rns_lift_core::{
    DescendingPrimeGenerator, LiftConfig, LiftError, MultiModSolver, RandomPrimeGenerator,
    SolverConfig,
};
use std::path::PathBuf;
use std::process;

use scenarios::Scenario;

#[derive(Parser)]
#[command(name = "rns-lift")]
#[command(about = "Exact rational linear solving by multi-modulus p-adic lifting")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Solve one system and print a summary
    Solve {
        /// Read the augmented system [A | b] from a file instead of generating one
        #[arg(long)]
        input: Option<PathBuf>,

        /// Shape of the generated system
        #[arg(long, value_enum, default_value = "dense")]
        scenario: Scenario,

        /// Dimension of the generated system
        #[arg(long, default_value = "32")]
        size: usize,

        /// Entry bound of the generated system
        #[arg(long, default_value = "1000")]
        bound: i64,

        /// Seed for the system and the prime generator
        #[arg(long, default_value = "42")]
        seed: u64,

        /// Number of lifting primes
        #[arg(long, default_value = "2")]
        primes: usize,

        /// Bit width of drawn primes (at most 26)
        #[arg(long, default_value = "23")]
        bits: u32,

        /// Scan primes downward from 2^bits instead of drawing them at random
        #[arg(long)]
        descending: bool,

        /// Bad primes tolerated before giving up
        #[arg(long, default_value = "8")]
        max_redraws: usize,

        /// Skip checking every digit against A modulo its prime
        #[arg(long)]
        no_check: bool,

        /// Skip the final integer verification
        #[arg(long)]
        no_verify: bool,

        /// Print every solution entry
        #[arg(long)]
        print: bool,
    },

    /// Sweep lifting-prime counts across matrix sizes
    Sweep {
        /// Shape of the generated systems
        #[arg(long, value_enum, default_value = "dense")]
        scenario: Scenario,

        /// Matrix sizes
        #[arg(long, value_delimiter = ',', default_value = "16,32,64")]
        sizes: Vec<usize>,

        /// Lifting-prime counts
        #[arg(long, value_delimiter = ',', default_value = "1,2,4,8")]
        primes: Vec<usize>,

        /// Entry bound
        #[arg(long, default_value = "1000")]
        bound: i64,

        /// Bit width of drawn primes (at most 26)
        #[arg(long, default_value = "23")]
        bits: u32,

        #[arg(long, default_value = "42")]
        seed: u64,

        /// Export results to CSV
        #[arg(long)]
        export: Option<PathBuf>,
    },
}

fn main() {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Solve {
            input,
            scenario,
            size,
            bound,
            seed,
            primes,
            bits,
            descending,
            max_redraws,
            no_check,
            no_verify,
            print,
        } => {
            let system = match input {
                Some(path) => match scenarios::load(&path) {
                    Ok(system) => system,
                    Err(e) => {
                        error!("{}", e);
                        process::exit(2);
                    }
                },
                None => scenarios::generate(scenario, size, bound, seed),
            };
            let config = SolverConfig {
                lift: LiftConfig {
                    primes_count: primes,
                    max_prime_redraws: max_redraws,
                    check_divisibility: !no_check,
                    ..LiftConfig::default()
                },
                verify: !no_verify,
            };
            if let Err(e) = run_solve(&system, config, bits, seed, descending, print) {
                error!("{}", e);
                process::exit(1);
            }
        }
        Commands::Sweep {
            scenario,
            sizes,
            primes,
            bound,
            bits,
            seed,
            export,
        } => {
            let params = sweep::SweepParams {
                scenario,
                sizes: &sizes,
                primes_counts: &primes,
                bound,
                bits,
                seed,
            };
            sweep::run_sweep(&params, export.as_deref());
        }
    }
}

fn run_solve(
    system: &scenarios::System,
    config: SolverConfig,
    bits: u32,
    seed: u64,
    descending: bool,
    print: bool,
) -> Result<(), LiftError> {
    let solver = MultiModSolver::new(config);
    let (solution, timings) = if descending {
        solver.solve(&system.a, &system.b, DescendingPrimeGenerator::new(bits))?
    } else {
        solver.solve(&system.a, &system.b, RandomPrimeGenerator::new(bits, seed))?
    };

    println!("Solved {}×{} system", system.a.rows(), system.a.cols());
    println!("  lifting primes:   {}", timings.lifting_primes);
    println!("  RNS primes:       {}", timings.rns_primes);
    println!("  iterations:       {}", timings.iterations);
    println!("  denominator bits: {}", solution.denominator.bits());
    println!("  verified:         {}", solution.verified);
    println!("  result hash:      {}", sweep::compute_result_hash(&solution));
    println!();
    println!("  setup:            {:.3} ms", timings.setup * 1000.0);
    println!("  lifting:          {:.3} ms", timings.lifting * 1000.0);
    println!("  reconstruction:   {:.3} ms", timings.reconstruction * 1000.0);
    println!("  verification:     {:.3} ms", timings.verification * 1000.0);
    println!("  total:            {:.3} ms", timings.total * 1000.0);

    if print {
        println!();
        for (i, x) in solution.x.iter().enumerate() {
            println!("  x[{}] = {}", i, x);
        }
    }
    Ok(())
}
