use thiserror::Error;

/// Fatal construction-time errors. None of these are recoverable: a bad
/// creature profile name or a genome that does not match its motor count is a
/// configuration bug, never something to silently default around.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unknown creature type: {0:?} (expected \"biped\" or \"quadruped\")")]
    UnknownCreatureType(String),

    #[error("genome has {actual} genes, expected {expected} ({motor_count} motors x 3 genes)")]
    GenomeLength {
        actual: usize,
        expected: usize,
        motor_count: usize,
    },

    #[error("evolution.{field} = {value} {constraint}")]
    InvalidEvolutionParameter {
        field: &'static str,
        value: f64,
        constraint: &'static str,
    },
}
