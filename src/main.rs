use anyhow::Context;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use walker_evo::{Cohort, CreatureType, EvolutionEngine, WalkerConfig};

#[derive(Parser, Debug)]
#[command(name = "walker_evo")]
#[command(about = "Evolve walking gaits for 2D bipeds and quadrupeds")]
struct Args {
    /// Path to a TOML config file; defaults apply when absent.
    #[arg(short, long, default_value = "walker.toml")]
    config: String,

    /// Creature profile, "biped" or "quadruped" (overrides config).
    #[arg(long)]
    creature: Option<String>,

    /// Number of generations to run (overrides config).
    #[arg(short, long)]
    generations: Option<usize>,

    /// RNG seed for a reproducible run (overrides config).
    #[arg(long)]
    seed: Option<u64>,

    /// Per-trial debug output.
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let default_filter = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .init();

    let mut config = WalkerConfig::load(&args.config)?;
    if let Some(name) = &args.creature {
        config.creature = name.parse::<CreatureType>()?;
    }
    if let Some(generations) = args.generations {
        config.generations = generations;
    }
    if let Some(seed) = args.seed {
        config.evolution.seed = Some(seed);
    }

    info!(
        creature = %config.creature,
        generations = config.generations,
        population = config.evolution.population_size,
        "starting evolution"
    );

    let mut engine = EvolutionEngine::new(config.creature.motor_count(), config.evolution.clone());
    let mut population = engine.initial_population();
    let mut best_ever = 0.0f32;
    let mut best_genome = population[0].clone();

    for _ in 0..config.generations {
        let mut cohort =
            Cohort::new(&population, &config).context("failed to build generation cohort")?;
        cohort.run_to_completion();
        let scores = cohort.fitness_scores();

        if let Some(champion) = cohort
            .creatures()
            .iter()
            .max_by(|a, b| a.fitness().total_cmp(&b.fitness()))
        {
            if champion.fitness() > best_ever {
                best_ever = champion.fitness();
                best_genome = champion.genome().clone();
            }
        }

        population = engine.evolve(&population, &scores);
        let stats = engine.stats();
        info!(
            generation = stats.generation,
            best = %format_args!("{:.1}", stats.best_fitness),
            mean = %format_args!("{:.1}", stats.mean_fitness),
            diversity = %format_args!("{:.2}", stats.diversity),
            mutation_rate = %format_args!("{:.0}%", stats.mutation_rate * 100.0),
            "generation complete"
        );
    }

    info!(best_fitness = %format_args!("{:.1}", best_ever), "evolution finished");
    // Boundary encoding: the flat gene list, one triple per motor.
    println!(
        "best genome: [{}]",
        best_genome
            .as_slice()
            .iter()
            .map(|g| format!("{g:.4}"))
            .collect::<Vec<_>>()
            .join(", ")
    );

    Ok(())
}
