use std::fmt;
use std::str::FromStr;

use serde::Deserialize;

use crate::error::ConfigError;

// --- Structural Constants (shared across profiles) ---

pub const THIGH_LENGTH: f32 = 40.0;
pub const THIGH_WIDTH: f32 = 12.0;
pub const THIGH_MASS: f32 = 2.0;

pub const SHIN_LENGTH: f32 = 35.0;
pub const SHIN_WIDTH: f32 = 10.0;
pub const SHIN_MASS: f32 = 1.5;

pub const FOOT_WIDTH: f32 = 15.0;
pub const FOOT_HEIGHT: f32 = 5.0;
pub const FOOT_MASS: f32 = 0.5;
pub const FOOT_FRICTION: f32 = 1.5;

pub const BODY_FRICTION: f32 = 0.3;
pub const MOTOR_MAX_FORCE: f32 = 5_000_000.0;

/// Which articulated body to build. Selects torso shape, motor count and
/// joint angle ranges; everything else is shared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CreatureType {
    Biped,
    Quadruped,
}

impl CreatureType {
    pub fn leg_count(self) -> usize {
        match self {
            CreatureType::Biped => 2,
            CreatureType::Quadruped => 4,
        }
    }

    /// Two motors per leg: hip (even index) and knee (odd index).
    pub fn motor_count(self) -> usize {
        self.leg_count() * 2
    }

    /// Feet whose horizontal offset is watched for gait steps. Biped: the two
    /// feet. Quadruped: the back pair and the front pair.
    pub fn foot_pairs(self) -> &'static [[usize; 2]] {
        match self {
            CreatureType::Biped => &[[0, 1]],
            CreatureType::Quadruped => &[[0, 1], [2, 3]],
        }
    }

    pub fn plan(self) -> BodyPlan {
        match self {
            CreatureType::Biped => BodyPlan {
                torso_width: 60.0,
                torso_height: 30.0,
                torso_mass: 5.0,
                // Hips at +/- torso_width / 4, legs ordered left, right.
                hip_offsets: &[-15.0, 15.0],
                hip_limits: [-1.2, 0.8],
                knee_limits: [-0.1, 1.5],
            },
            CreatureType::Quadruped => BodyPlan {
                torso_width: 100.0,
                torso_height: 30.0,
                torso_mass: 8.0,
                // Back pair then front pair at +/- 0.35 * torso_width.
                hip_offsets: &[-35.0, -35.0, 35.0, 35.0],
                hip_limits: [-0.9, 0.9],
                knee_limits: [-1.4, 0.2],
            },
        }
    }
}

impl FromStr for CreatureType {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "biped" => Ok(CreatureType::Biped),
            "quadruped" => Ok(CreatureType::Quadruped),
            _ => Err(ConfigError::UnknownCreatureType(s.to_string())),
        }
    }
}

impl fmt::Display for CreatureType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CreatureType::Biped => write!(f, "biped"),
            CreatureType::Quadruped => write!(f, "quadruped"),
        }
    }
}

/// Fixed structural dimensions for one creature profile. Not evolved.
#[derive(Debug, Clone, Copy)]
pub struct BodyPlan {
    pub torso_width: f32,
    pub torso_height: f32,
    pub torso_mass: f32,
    /// Hip anchor x offsets from the torso center, one per leg.
    pub hip_offsets: &'static [f32],
    pub hip_limits: [f32; 2],
    pub knee_limits: [f32; 2],
}

impl BodyPlan {
    /// Height of a fully extended leg; the torso bottom sits here when the
    /// creature stands straight.
    pub fn leg_height(&self) -> f32 {
        THIGH_LENGTH + SHIN_LENGTH + FOOT_HEIGHT
    }
}

// --- Runtime Configuration ---

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Wall-clock-equivalent frame duration in seconds.
    pub dt: f32,
    /// Solver sub-steps per frame, each of size dt / substeps.
    pub physics_substeps: usize,
    pub trial_duration: f32,
    pub gravity_y: f32,
    pub ground_friction: f32,
    pub start_x: f32,
    /// Drop height above a straight standing pose at spawn.
    pub spawn_margin: f32,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            dt: 1.0 / 60.0,
            physics_substeps: 10,
            trial_duration: 10.0,
            gravity_y: -900.0,
            ground_friction: 1.0,
            start_x: 100.0,
            spawn_margin: 20.0,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ControlConfig {
    /// Scales the oscillator derivative into an angular-rate command.
    pub rate_gain: f32,
    /// When set, every motor borrows motor 0's frequency gene instead of its
    /// own. Forces coordinated timing across the gait; part of the evolved
    /// behavior's semantics, not a bug to fix.
    pub shared_frequency: bool,
    /// Tilt magnitude beyond which the hip correction kicks in.
    pub reflex_tilt_threshold: f32,
    pub reflex_tilt_gain: f32,
    /// Fraction of the hip tilt correction applied to biped knees.
    pub reflex_knee_fraction: f32,
    /// Always-on damping on hip motors, proportional to torso angular velocity.
    pub reflex_damping_gain: f32,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            rate_gain: 5.0,
            shared_frequency: false,
            reflex_tilt_threshold: 0.15,
            reflex_tilt_gain: 3.0,
            reflex_knee_fraction: 0.3,
            reflex_damping_gain: 0.5,
        }
    }
}

/// Fitness shaping weights and death thresholds. All external configuration:
/// these were iterated across many revisions and have no canonical values, so
/// the evolutionary objective stays tunable without touching the core.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FitnessConfig {
    pub distance_weight: f32,
    /// Applied as upright_weight * 0.1 per upright frame.
    pub upright_weight: f32,
    pub step_reward: f32,
    pub fall_penalty: f32,
    /// Applied to mean |motor rate| per frame.
    pub energy_penalty_weight: f32,
    /// Torso center height above which the creature counts as upright.
    pub upright_height: f32,
    /// Tilt magnitude below which the creature counts as upright.
    pub upright_angle: f32,
    /// Tilt magnitude beyond which the creature has fallen.
    pub tilt_death_angle: f32,
    /// Torso center height below which the creature has fallen.
    pub min_torso_height: f32,
    /// Torso-bottom-to-ground distance that counts as touching.
    pub ground_tolerance: f32,
    /// Minimum foot-pair offset before a step sign is recorded.
    pub step_min_offset: f32,
}

impl Default for FitnessConfig {
    fn default() -> Self {
        Self {
            distance_weight: 1.0,
            upright_weight: 1.0,
            step_reward: 10.0,
            fall_penalty: 100.0,
            energy_penalty_weight: 0.05,
            upright_height: 70.0,
            upright_angle: 0.5,
            tilt_death_angle: 1.2,
            min_torso_height: 45.0,
            ground_tolerance: 5.0,
            step_min_offset: 5.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SelectionMethod {
    Tournament,
    Roulette,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EvolutionConfig {
    pub population_size: usize,
    /// Fraction of the population carried over unchanged each generation.
    pub elite_ratio: f32,
    pub selection: SelectionMethod,
    pub tournament_size: usize,
    pub crossover_rate: f64,
    /// Base per-gene mutation probability; raised adaptively when diversity
    /// drops below `diversity_threshold`.
    pub mutation_rate: f64,
    pub max_mutation_rate: f64,
    /// Base Gaussian sigma as a fraction of each gene type's range.
    pub mutation_strength: f32,
    pub max_mutation_strength: f32,
    pub diversity_threshold: f32,
    /// Fixed seed for reproducible runs; entropy when absent.
    pub seed: Option<u64>,
}

impl Default for EvolutionConfig {
    fn default() -> Self {
        Self {
            population_size: 20,
            elite_ratio: 0.2,
            selection: SelectionMethod::Roulette,
            tournament_size: 3,
            crossover_rate: 0.8,
            mutation_rate: 0.1,
            max_mutation_rate: 0.4,
            mutation_strength: 0.2,
            max_mutation_strength: 0.5,
            diversity_threshold: 0.15,
            seed: None,
        }
    }
}

impl EvolutionConfig {
    /// Reject values that would panic deep in the engine: `gen_bool` demands
    /// probabilities in [0, 1] and the mutation Gaussian's sigma must be
    /// non-negative. NaN fails both checks.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let probabilities = [
            ("crossover_rate", self.crossover_rate),
            ("mutation_rate", self.mutation_rate),
            ("max_mutation_rate", self.max_mutation_rate),
        ];
        for (field, value) in probabilities {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::InvalidEvolutionParameter {
                    field,
                    value,
                    constraint: "must be a probability in [0, 1]",
                });
            }
        }
        let strengths = [
            ("mutation_strength", self.mutation_strength),
            ("max_mutation_strength", self.max_mutation_strength),
        ];
        for (field, value) in strengths {
            if !(0.0..).contains(&value) {
                return Err(ConfigError::InvalidEvolutionParameter {
                    field,
                    value: f64::from(value),
                    constraint: "must be non-negative",
                });
            }
        }
        Ok(())
    }
}

/// Top-level configuration, loadable from a TOML file.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WalkerConfig {
    pub creature: CreatureType,
    pub generations: usize,
    pub simulation: SimulationConfig,
    pub control: ControlConfig,
    pub fitness: FitnessConfig,
    pub evolution: EvolutionConfig,
}

impl Default for WalkerConfig {
    fn default() -> Self {
        Self {
            creature: CreatureType::Biped,
            generations: 100,
            simulation: SimulationConfig::default(),
            control: ControlConfig::default(),
            fitness: FitnessConfig::default(),
            evolution: EvolutionConfig::default(),
        }
    }
}

impl WalkerConfig {
    /// Load from `path`, falling back to defaults only when the file does not
    /// exist. Any other read error, and a file that fails to parse or
    /// validate, propagates instead of silently defaulting.
    pub fn load(path: &str) -> anyhow::Result<Self> {
        match std::fs::read_to_string(path) {
            Ok(contents) => {
                let config: WalkerConfig = toml::from_str(&contents)
                    .map_err(|e| anyhow::anyhow!("failed to parse {path}: {e}"))?;
                config.evolution.validate()?;
                Ok(config)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path, "no config file, using defaults");
                Ok(Self::default())
            }
            Err(e) => Err(anyhow::anyhow!("failed to read {path}: {e}")),
        }
    }
}
