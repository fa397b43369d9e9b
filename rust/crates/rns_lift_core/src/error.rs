//! Error types for the lifting engine

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LiftError {
    #[error("prime {prime} divides det(A): A is singular modulo {prime}")]
    BadPrime { prime: u64 },

    #[error("prime generator could not supply enough distinct primes: needed {needed}, found {found}")]
    InsufficientPrimes { needed: usize, found: usize },

    #[error("prime {prime} does not fit the {max_bits}-bit field range")]
    PrimeTooLarge { prime: u64, max_bits: u32 },

    #[error("RNS overflow: value of {bits} bits exceeds the {limit_bits}-bit RNS capacity")]
    NumericOverflow { bits: u64, limit_bits: u64 },

    #[error("correction term is not divisible by prime {prime} (row {row})")]
    InexactDivision { prime: u64, row: usize },

    #[error("lifting container exhausted after {iterations} iterations")]
    Exhausted { iterations: usize },

    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("rational reconstruction failed for entry {index}")]
    ReconstructionFailed { index: usize },

    #[error("reconstructed solution does not satisfy A·x = b")]
    VerificationFailed,
}

pub type Result<T> = std::result::Result<T, LiftError>;
