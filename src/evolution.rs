use rand::prelude::*;
use tracing::debug;

use crate::config::{EvolutionConfig, SelectionMethod};
use crate::genome::{self, Genome};

/// Snapshot of the engine's state after an `evolve` call.
#[derive(Debug, Clone, Default)]
pub struct GenerationStats {
    pub generation: usize,
    pub best_fitness: f32,
    pub mean_fitness: f32,
    pub diversity: f32,
    pub mutation_rate: f64,
    pub mutation_strength: f32,
}

/// Owns the genome population lifecycle across generations: ranking,
/// elitism, selection, crossover, mutation, and the adaptive mutation state
/// driven by measured population diversity. Constructed once; `evolve` is
/// called once per generation by a single writer.
pub struct EvolutionEngine {
    config: EvolutionConfig,
    motor_count: usize,
    rng: StdRng,
    generation: usize,
    best_history: Vec<f32>,
    mean_history: Vec<f32>,
    diversity: f32,
    mutation_rate: f64,
    mutation_strength: f32,
}

impl EvolutionEngine {
    pub fn new(motor_count: usize, config: EvolutionConfig) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let mutation_rate = config.mutation_rate;
        let mutation_strength = config.mutation_strength;
        Self {
            config,
            motor_count,
            rng,
            generation: 0,
            best_history: Vec::new(),
            mean_history: Vec::new(),
            diversity: 1.0,
            mutation_rate,
            mutation_strength,
        }
    }

    /// A fresh population of N genomes, genes drawn uniformly from each gene
    /// type's range.
    pub fn initial_population(&mut self) -> Vec<Genome> {
        (0..self.config.population_size)
            .map(|_| Genome::random(self.motor_count, &mut self.rng))
            .collect()
    }

    /// Produce the next generation from the just-evaluated one. `fitness`
    /// parallels `population`, one score per genome.
    pub fn evolve(&mut self, population: &[Genome], fitness: &[f32]) -> Vec<Genome> {
        assert_eq!(
            population.len(),
            fitness.len(),
            "fitness scores must parallel the population"
        );
        let n = population.len();
        self.generation += 1;

        let best = fitness.iter().cloned().fold(f32::NEG_INFINITY, f32::max);
        let mean = fitness.iter().sum::<f32>() / n as f32;
        self.best_history.push(best);
        self.mean_history.push(mean);

        // Diversity of the population being evolved, not of the offspring.
        self.diversity = genome::diversity(population);
        self.adapt_mutation();

        // Stable sort keeps ties in original order.
        let mut order: Vec<usize> = (0..n).collect();
        order.sort_by(|&a, &b| {
            fitness[b]
                .partial_cmp(&fitness[a])
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        let sorted_population: Vec<&Genome> = order.iter().map(|&i| &population[i]).collect();
        let sorted_fitness: Vec<f32> = order.iter().map(|&i| fitness[i]).collect();

        let mut next = Vec::with_capacity(n);

        // Elitism: the top genomes reappear unchanged, in rank order.
        let elite_count = ((n as f32 * self.config.elite_ratio) as usize).max(1);
        for genome in sorted_population.iter().take(elite_count) {
            next.push((*genome).clone());
        }

        while next.len() < n {
            let parent1 = self.select(&sorted_population, &sorted_fitness);
            let parent2 = self.select(&sorted_population, &sorted_fitness);

            let (mut child1, mut child2) = if self.rng.gen_bool(self.config.crossover_rate) {
                Genome::crossover(&parent1, &parent2, &mut self.rng)
            } else {
                (parent1, parent2)
            };

            child1.mutate(self.mutation_rate, self.mutation_strength, &mut self.rng);
            child2.mutate(self.mutation_rate, self.mutation_strength, &mut self.rng);

            next.push(child1);
            if next.len() < n {
                next.push(child2);
            }
        }

        debug!(
            generation = self.generation,
            best,
            mean,
            diversity = self.diversity,
            mutation_rate = self.mutation_rate,
            "evolved generation"
        );
        next
    }

    /// Low diversity pushes the mutation rate and strength linearly from
    /// their base values toward the configured maxima; healthy diversity
    /// resets both. This state persists across generations.
    fn adapt_mutation(&mut self) {
        let threshold = self.config.diversity_threshold;
        if threshold > 0.0 && self.diversity < threshold {
            let shortfall = f64::from((threshold - self.diversity) / threshold);
            self.mutation_rate = self.config.mutation_rate
                + (self.config.max_mutation_rate - self.config.mutation_rate) * shortfall;
            self.mutation_strength = self.config.mutation_strength
                + (self.config.max_mutation_strength - self.config.mutation_strength)
                    * shortfall as f32;
        } else {
            self.mutation_rate = self.config.mutation_rate;
            self.mutation_strength = self.config.mutation_strength;
        }
    }

    fn select(&mut self, sorted_population: &[&Genome], sorted_fitness: &[f32]) -> Genome {
        match self.config.selection {
            SelectionMethod::Tournament => self.tournament(sorted_population, sorted_fitness),
            SelectionMethod::Roulette => self.roulette(sorted_population, sorted_fitness),
        }
    }

    /// Draw k distinct contenders uniformly; the fittest wins.
    fn tournament(&mut self, population: &[&Genome], fitness: &[f32]) -> Genome {
        let k = self.config.tournament_size.clamp(1, population.len());
        let contenders = rand::seq::index::sample(&mut self.rng, population.len(), k);
        let winner = contenders
            .iter()
            .max_by(|&a, &b| {
                fitness[a]
                    .partial_cmp(&fitness[b])
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
            .expect("tournament has at least one contender");
        population[winner].clone()
    }

    /// Fitness-proportionate selection over fitnesses shifted so the minimum
    /// becomes 1; a zero total weight degenerates to a uniform pick.
    fn roulette(&mut self, population: &[&Genome], fitness: &[f32]) -> Genome {
        let min = fitness.iter().cloned().fold(f32::INFINITY, f32::min);
        let adjusted: Vec<f32> = fitness.iter().map(|f| f - min + 1.0).collect();
        let total: f32 = adjusted.iter().sum();
        if total <= 0.0 {
            let i = self.rng.gen_range(0..population.len());
            return population[i].clone();
        }

        let pick = self.rng.gen_range(0.0..total);
        let mut cumulative = 0.0;
        for (i, weight) in adjusted.iter().enumerate() {
            cumulative += weight;
            if cumulative >= pick {
                return population[i].clone();
            }
        }
        population[population.len() - 1].clone()
    }

    pub fn generation(&self) -> usize {
        self.generation
    }

    pub fn best_history(&self) -> &[f32] {
        &self.best_history
    }

    pub fn mean_history(&self) -> &[f32] {
        &self.mean_history
    }

    pub fn stats(&self) -> GenerationStats {
        GenerationStats {
            generation: self.generation,
            best_fitness: self.best_history.last().copied().unwrap_or(0.0),
            mean_fitness: self.mean_history.last().copied().unwrap_or(0.0),
            diversity: self.diversity,
            mutation_rate: self.mutation_rate,
            mutation_strength: self.mutation_strength,
        }
    }
}
