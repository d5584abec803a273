//! Demo archipelago runner binary.
//!
//! Run with: cargo run --bin atoll-islands -- run
//!
//! Evolves a toy bit-counting hill climber on each island. Fragments are
//! whole genomes: an island emigrates its current best and adopts an
//! immigrant whenever it scores higher than the local champion.

use atoll_migration::runner::{ArchipelagoRunner, Island, RunnerConfig};
use std::env;

/// One-max hill climber with a byte-per-bit genome.
struct HillClimber {
    genome: Vec<u8>,
    fitness: u64,
    rng: u64,
}

impl HillClimber {
    fn new(length: usize, seed: u64) -> Self {
        let mut climber = Self {
            genome: Vec::with_capacity(length),
            fitness: 0,
            rng: seed,
        };
        for _ in 0..length {
            let bit = (climber.next() & 1) as u8;
            climber.genome.push(bit);
        }
        climber.fitness = score(&climber.genome);
        climber
    }

    fn next(&mut self) -> u64 {
        self.rng = self
            .rng
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        self.rng >> 33
    }
}

fn score(genome: &[u8]) -> u64 {
    genome.iter().map(|&bit| bit as u64).sum()
}

impl Island for HillClimber {
    fn advance(&mut self) {
        let index = (self.next() as usize) % self.genome.len();
        self.genome[index] ^= 1;
        let fitness = score(&self.genome);
        if fitness >= self.fitness {
            self.fitness = fitness;
        } else {
            // Revert the flip; hill climbing never accepts regressions.
            self.genome[index] ^= 1;
        }
    }

    fn fill_fragment(&mut self, buf: &mut [u8]) {
        buf.copy_from_slice(&self.genome);
    }

    fn absorb_fragment(&mut self, buf: &[u8]) {
        let fitness = score(buf);
        if fitness > self.fitness {
            self.genome.copy_from_slice(buf);
            self.fitness = fitness;
        }
    }
}

struct DemoConfig {
    islands: u32,
    generations: u64,
    genome_length: usize,
    interval: u64,
    seed: u64,
}

impl Default for DemoConfig {
    fn default() -> Self {
        Self {
            islands: 4,
            generations: 500,
            genome_length: 64,
            interval: 5,
            seed: 0xA70,
        }
    }
}

fn print_usage() {
    println!("Atoll archipelago demo");
    println!();
    println!("Usage: atoll-islands run [options]");
    println!();
    println!("Options:");
    println!("  --islands N       Number of islands (default: 4)");
    println!("  --generations N   Generations per island (default: 500)");
    println!("  --length N        Genome length in bytes (default: 64)");
    println!("  --interval N      Generations between migrations (default: 5)");
    println!("  --seed N          Base seed for reproducible runs (default: 2672)");
    println!();
    println!("Examples:");
    println!("  atoll-islands run");
    println!("  atoll-islands run --islands 8 --generations 2000");
}

fn parse_args(args: &[String]) -> DemoConfig {
    let mut config = DemoConfig::default();

    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--islands" => {
                if i + 1 < args.len() {
                    config.islands = args[i + 1].parse().unwrap_or(config.islands);
                    i += 1;
                }
            }
            "--generations" => {
                if i + 1 < args.len() {
                    config.generations = args[i + 1].parse().unwrap_or(config.generations);
                    i += 1;
                }
            }
            "--length" => {
                if i + 1 < args.len() {
                    config.genome_length = args[i + 1].parse().unwrap_or(config.genome_length);
                    i += 1;
                }
            }
            "--interval" => {
                if i + 1 < args.len() {
                    config.interval = args[i + 1].parse().unwrap_or(config.interval);
                    i += 1;
                }
            }
            "--seed" => {
                if i + 1 < args.len() {
                    config.seed = args[i + 1].parse().unwrap_or(config.seed);
                    i += 1;
                }
            }
            _ => {}
        }
        i += 1;
    }

    config
}

async fn run_demo(demo: DemoConfig) {
    println!(
        "Running {} island(s), {} generations, genome {} bytes, migration every {} generation(s)\n",
        demo.islands, demo.generations, demo.genome_length, demo.interval
    );

    let islands: Vec<_> = (0..demo.islands)
        .map(|i| HillClimber::new(demo.genome_length, demo.seed.wrapping_add(i as u64)))
        .collect();
    let config = RunnerConfig {
        generations: demo.generations,
        migration_interval: demo.interval,
        fragment_size: demo.genome_length,
        migration_seed: Some(demo.seed),
    };

    let runner = match ArchipelagoRunner::new(islands, config) {
        Ok(runner) => runner,
        Err(e) => {
            eprintln!("setup failed: {}", e);
            return;
        }
    };

    match runner.run().await {
        Ok(outcomes) => {
            println!(
                "| {:>10} | {:>12} | {:>6} | {:>10} | {:>10} |",
                "Island", "Generations", "Best", "Sent", "Received"
            );
            println!("|------------|--------------|--------|------------|------------|");
            for (island, report) in &outcomes {
                println!(
                    "| {:>10} | {:>12} | {:>3}/{:>2} | {:>10} | {:>10} |",
                    report.island.to_string(),
                    report.generations,
                    island.fitness,
                    island.genome.len(),
                    report.fragments_sent,
                    report.fragments_received
                );
            }
        }
        Err(e) => eprintln!("run failed: {}", e),
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        print_usage();
        return;
    }

    match args[1].as_str() {
        "run" => run_demo(parse_args(&args[2..])).await,
        "--help" | "-h" | "help" => print_usage(),
        _ => {
            println!("Unknown command: {}", args[1]);
            println!();
            print_usage();
        }
    }
}
