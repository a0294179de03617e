use rayon::prelude::*;
use tracing::debug;

use crate::config::WalkerConfig;
use crate::creature::Creature;
use crate::error::ConfigError;
use crate::genome::Genome;

/// One generation's worth of creatures, each embodied in its own independent
/// physics world. Worlds share no state, so evaluation is embarrassingly
/// parallel; the lockstep `step_frame` path exists for read-only consumers
/// that want to watch all trials advance together.
pub struct Cohort {
    creatures: Vec<Creature>,
    config: WalkerConfig,
    time: f32,
}

impl Cohort {
    /// Embody every genome at the spawn position. Fails fast on a genome that
    /// does not match the configured creature profile.
    pub fn new(genomes: &[Genome], config: &WalkerConfig) -> Result<Self, ConfigError> {
        let plan = config.creature.plan();
        let start_y = plan.leg_height() + config.simulation.spawn_margin;

        let creatures = genomes
            .iter()
            .enumerate()
            .map(|(id, genome)| {
                Creature::new(
                    config.creature,
                    config.simulation.start_x,
                    start_y,
                    genome.clone(),
                    id,
                    &config.simulation,
                )
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            creatures,
            config: config.clone(),
            time: 0.0,
        })
    }

    /// Advance every living creature by one frame, in lockstep.
    pub fn step_frame(&mut self) {
        for creature in &mut self.creatures {
            creature.step_frame(
                &self.config.simulation,
                &self.config.control,
                &self.config.fitness,
            );
        }
        self.time += self.config.simulation.dt;
    }

    /// Run every trial to the DEAD state, creatures in parallel. Each worker
    /// owns disjoint creatures and each world keeps its internal ordering
    /// (motor commands before the solver substeps), so results match the
    /// lockstep path. Bounded: the time-limit death is unconditional.
    pub fn run_to_completion(&mut self) {
        let simulation = self.config.simulation.clone();
        let control = self.config.control.clone();
        let fitness = self.config.fitness.clone();

        self.creatures.par_iter_mut().for_each(|creature| {
            while creature.is_alive() {
                creature.step_frame(&simulation, &control, &fitness);
            }
            debug!(
                id = creature.id(),
                fitness = creature.fitness(),
                fell = creature.has_fallen(),
                steps = creature.steps(),
                time = creature.time_alive(),
                "trial finished"
            );
        });
        self.time = self.config.simulation.trial_duration;
    }

    /// The "force next generation" operation: mark every living creature DEAD
    /// immediately. Safe at any frame boundary; counts as a natural end.
    pub fn force_finish(&mut self) {
        for creature in &mut self.creatures {
            creature.kill(&self.config.fitness);
        }
    }

    pub fn all_dead(&self) -> bool {
        self.creatures.iter().all(|c| !c.is_alive())
    }

    pub fn creatures(&self) -> &[Creature] {
        &self.creatures
    }

    /// Per-creature fitness, in genome order.
    pub fn fitness_scores(&self) -> Vec<f32> {
        self.creatures.iter().map(|c| c.fitness()).collect()
    }

    pub fn best_fitness(&self) -> f32 {
        self.creatures
            .iter()
            .map(|c| c.fitness())
            .fold(0.0, f32::max)
    }

    pub fn elapsed(&self) -> f32 {
        self.time
    }
}
