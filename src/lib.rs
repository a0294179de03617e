//! Evolving locomotion controllers for articulated 2D creatures.
//!
//! A genetic algorithm searches over rhythmic motor parameters, one
//! `(amplitude, frequency, phase)` triple per joint motor, while each
//! candidate genome is embodied as a biped or quadruped in its own rapier2d
//! world and scored by a shaped walking-fitness function.

pub mod config;
pub mod creature;
pub mod error;
pub mod evolution;
pub mod genome;
pub mod physics;
pub mod simulation;

pub use config::{
    ControlConfig, CreatureType, EvolutionConfig, FitnessConfig, SelectionMethod,
    SimulationConfig, WalkerConfig,
};
pub use creature::Creature;
pub use error::ConfigError;
pub use evolution::{EvolutionEngine, GenerationStats};
pub use genome::Genome;
pub use simulation::Cohort;
