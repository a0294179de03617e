use std::f32::consts::TAU;

use rand::Rng;
use rand_distr::{Distribution, Normal};

use crate::error::ConfigError;

// --- Gene Range Constants ---

pub const GENES_PER_MOTOR: usize = 3;

pub const AMPLITUDE_MIN: f32 = 0.3;
pub const AMPLITUDE_MAX: f32 = 1.2;
pub const FREQUENCY_MIN: f32 = 1.0; // Hz
pub const FREQUENCY_MAX: f32 = 4.0; // Hz
pub const PHASE_MIN: f32 = 0.0;
pub const PHASE_MAX: f32 = TAU;

/// Position of a gene within its motor triple.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeneKind {
    Amplitude,
    Frequency,
    Phase,
}

impl GeneKind {
    pub fn of_index(i: usize) -> Self {
        match i % GENES_PER_MOTOR {
            0 => GeneKind::Amplitude,
            1 => GeneKind::Frequency,
            _ => GeneKind::Phase,
        }
    }

    pub fn min(self) -> f32 {
        match self {
            GeneKind::Amplitude => AMPLITUDE_MIN,
            GeneKind::Frequency => FREQUENCY_MIN,
            GeneKind::Phase => PHASE_MIN,
        }
    }

    pub fn max(self) -> f32 {
        match self {
            GeneKind::Amplitude => AMPLITUDE_MAX,
            GeneKind::Frequency => FREQUENCY_MAX,
            GeneKind::Phase => PHASE_MAX,
        }
    }

    pub fn range(self) -> f32 {
        self.max() - self.min()
    }
}

/// One creature's motor parameters: a flat list of `(amplitude, frequency,
/// phase)` triples, one per motor, in motor index order. This flat float list
/// is also the boundary encoding for persistence and the CLI.
#[derive(Debug, Clone, PartialEq)]
pub struct Genome {
    genes: Vec<f32>,
}

impl Genome {
    pub fn random<R: Rng + ?Sized>(motor_count: usize, rng: &mut R) -> Self {
        let genes = (0..motor_count * GENES_PER_MOTOR)
            .map(|i| {
                let kind = GeneKind::of_index(i);
                rng.gen_range(kind.min()..kind.max())
            })
            .collect();
        Self { genes }
    }

    /// Wrap an external flat list, validating its length against the expected
    /// motor count.
    pub fn from_genes(genes: Vec<f32>, motor_count: usize) -> Result<Self, ConfigError> {
        let expected = motor_count * GENES_PER_MOTOR;
        if genes.len() != expected {
            return Err(ConfigError::GenomeLength {
                actual: genes.len(),
                expected,
                motor_count,
            });
        }
        Ok(Self { genes })
    }

    pub fn motor_count(&self) -> usize {
        self.genes.len() / GENES_PER_MOTOR
    }

    pub fn len(&self) -> usize {
        self.genes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.genes.is_empty()
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.genes
    }

    /// The `(amplitude, frequency, phase)` triple for one motor.
    pub fn motor_triple(&self, motor: usize) -> (f32, f32, f32) {
        let base = motor * GENES_PER_MOTOR;
        (self.genes[base], self.genes[base + 1], self.genes[base + 2])
    }

    /// Gaussian per-gene mutation. Each gene is hit independently with
    /// probability `rate`; noise sigma is `strength` times the gene type's
    /// range. Amplitude and frequency clamp back into range; phase wraps
    /// modulo 2*pi so probability mass never piles up at a boundary.
    pub fn mutate<R: Rng + ?Sized>(&mut self, rate: f64, strength: f32, rng: &mut R) {
        for (i, gene) in self.genes.iter_mut().enumerate() {
            if !rng.gen_bool(rate) {
                continue;
            }
            let kind = GeneKind::of_index(i);
            let normal = Normal::new(0.0, strength * kind.range())
                .expect("mutation sigma must be finite and non-negative");
            let perturbed = *gene + normal.sample(rng);
            *gene = match kind {
                GeneKind::Phase => perturbed.rem_euclid(PHASE_MAX),
                _ => perturbed.clamp(kind.min(), kind.max()),
            };
        }
    }

    /// Single-point crossover. The cut always falls on a motor boundary
    /// (a multiple of 3 genes), chosen uniformly among interior boundaries,
    /// so triples are never split between parents.
    pub fn crossover<R: Rng + ?Sized>(a: &Genome, b: &Genome, rng: &mut R) -> (Genome, Genome) {
        debug_assert_eq!(a.len(), b.len());
        let cut = rng.gen_range(1..a.motor_count()) * GENES_PER_MOTOR;

        let mut child_a = a.genes.clone();
        let mut child_b = b.genes.clone();
        child_a[cut..].copy_from_slice(&b.genes[cut..]);
        child_b[cut..].copy_from_slice(&a.genes[cut..]);

        (Genome { genes: child_a }, Genome { genes: child_b })
    }
}

/// Normalized genetic spread of a population: the per-gene-position sample
/// standard deviation divided by that gene type's range, averaged over all
/// positions and capped at 1. Populations of size < 2 count as maximally
/// diverse so adaptive mutation never tightens on them.
pub fn diversity(population: &[Genome]) -> f32 {
    if population.len() < 2 {
        return 1.0;
    }
    let n = population.len() as f32;
    let gene_count = population[0].len();

    let mut total = 0.0;
    for i in 0..gene_count {
        let mean = population.iter().map(|g| g.genes[i]).sum::<f32>() / n;
        let var = population
            .iter()
            .map(|g| (g.genes[i] - mean).powi(2))
            .sum::<f32>()
            / (n - 1.0);
        total += var.sqrt() / GeneKind::of_index(i).range();
    }
    (total / gene_count as f32).min(1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn random_genome_within_ranges() {
        let mut rng = StdRng::seed_from_u64(7);
        let genome = Genome::random(4, &mut rng);
        assert_eq!(genome.len(), 12);
        assert_eq!(genome.motor_count(), 4);
        for (i, &g) in genome.as_slice().iter().enumerate() {
            let kind = GeneKind::of_index(i);
            assert!(g >= kind.min() && g < kind.max(), "gene {i} = {g}");
        }
    }

    #[test]
    fn from_genes_rejects_length_mismatch() {
        let err = Genome::from_genes(vec![0.5; 11], 4).unwrap_err();
        assert!(matches!(
            err,
            crate::error::ConfigError::GenomeLength {
                actual: 11,
                expected: 12,
                motor_count: 4,
            }
        ));
    }

    #[test]
    fn mutation_respects_bounds() {
        let mut rng = StdRng::seed_from_u64(11);
        let mut genome = Genome::random(8, &mut rng);
        for _ in 0..500 {
            genome.mutate(1.0, 0.5, &mut rng);
            for (i, &g) in genome.as_slice().iter().enumerate() {
                match GeneKind::of_index(i) {
                    GeneKind::Amplitude => {
                        assert!((AMPLITUDE_MIN..=AMPLITUDE_MAX).contains(&g), "amp {g}")
                    }
                    GeneKind::Frequency => {
                        assert!((FREQUENCY_MIN..=FREQUENCY_MAX).contains(&g), "freq {g}")
                    }
                    GeneKind::Phase => assert!((0.0..PHASE_MAX).contains(&g), "phase {g}"),
                }
            }
        }
    }

    #[test]
    fn phase_wraps_instead_of_clamping() {
        // A phase of 0 nudged negative must wrap near 2*pi, not stick at 0.
        let wrapped = (-0.5f32).rem_euclid(PHASE_MAX);
        assert!(wrapped > 5.0 && wrapped < PHASE_MAX);

        // Hammer the phase genes with large sigma; wrap must never clamp.
        let mut rng = StdRng::seed_from_u64(3);
        let mut genome = Genome::from_genes(vec![0.5, 2.0, 0.0, 0.5, 2.0, 6.2, 0.5, 2.0, 3.0, 0.5, 2.0, 1.0], 4)
            .unwrap();
        for _ in 0..1000 {
            genome.mutate(1.0, 1.0, &mut rng);
        }
        for motor in 0..4 {
            let (_, _, phase) = genome.motor_triple(motor);
            assert!((0.0..PHASE_MAX).contains(&phase), "phase {phase}");
        }
    }

    #[test]
    fn crossover_cuts_on_interior_motor_boundaries() {
        let mut rng = StdRng::seed_from_u64(5);
        let a = Genome::from_genes(vec![1.0; 12], 4).unwrap();
        let b = Genome::from_genes(vec![0.5; 12], 4).unwrap();
        for _ in 0..200 {
            let (c1, c2) = Genome::crossover(&a, &b, &mut rng);
            assert_eq!(c1.len(), 12);
            assert_eq!(c2.len(), 12);
            // Find the cut from the children and check it is a triple boundary
            // strictly inside the genome.
            let cut = c1
                .as_slice()
                .iter()
                .position(|&g| g == 0.5)
                .expect("child 1 must carry a tail from parent 2");
            assert_eq!(cut % GENES_PER_MOTOR, 0);
            assert!(cut > 0 && cut < 12);
            // Tails are swapped symmetrically.
            assert!(c1.as_slice()[cut..].iter().all(|&g| g == 0.5));
            assert!(c2.as_slice()[cut..].iter().all(|&g| g == 1.0));
            assert!(c2.as_slice()[..cut].iter().all(|&g| g == 0.5));
        }
    }

    #[test]
    fn diversity_extremes() {
        assert_eq!(diversity(&[]), 1.0);

        let mut rng = StdRng::seed_from_u64(9);
        let single = vec![Genome::random(4, &mut rng)];
        assert_eq!(diversity(&single), 1.0);

        let clone = Genome::random(4, &mut rng);
        let converged = vec![clone.clone(), clone.clone(), clone];
        assert_eq!(diversity(&converged), 0.0);

        let spread: Vec<Genome> = (0..10).map(|_| Genome::random(4, &mut rng)).collect();
        let d = diversity(&spread);
        assert!(d > 0.0 && d <= 1.0, "diversity {d}");
    }

    #[test]
    fn diversity_shrinks_as_population_converges() {
        let mut rng = StdRng::seed_from_u64(13);
        let base = Genome::random(4, &mut rng);
        let tight: Vec<Genome> = (0..10)
            .map(|_| {
                let mut g = base.clone();
                g.mutate(1.0, 0.01, &mut rng);
                g
            })
            .collect();
        let loose: Vec<Genome> = (0..10).map(|_| Genome::random(4, &mut rng)).collect();
        assert!(diversity(&tight) < diversity(&loose));
    }
}
