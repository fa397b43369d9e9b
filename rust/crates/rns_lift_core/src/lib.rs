//! RNS Lift Core Library
//!
//! Exact rational solving of integer linear systems A x = b by multi-modulus
//! p-adic lifting, with the per-step correction products batched into a
//! residue number system.
//!
//! # Overview
//!
//! Classic Dixon lifting advances one residual vector per step with an
//! arbitrary-precision matrix-vector product. Lifting with l primes at once
//! advances l residuals per step; all l products are carried out as one
//! matrix-matrix product over several word-sized RNS primes, evaluated in
//! parallel in double-precision arithmetic.
//!
//! # Key Components
//!
//! - [`primes`] - Prime generators and CRT basis management
//! - [`field`] - Word-sized prime fields and modular matrix inversion
//! - [`rns`] - Residue number system matrices and batched products
//! - [`hadamard`] - Solution size bounds
//! - [`lifting`] - The multi-modulus lifting container
//! - [`solve`] - Digit combination, rational reconstruction and the solver
//! - [`crt`] - CRT reconstruction algorithms (Garner's algorithm)
//! - [`rational`] - Exact rational number type

pub mod error;
pub mod primes;
pub mod field;
pub mod crt;
pub mod matrix;
pub mod rational;
pub mod hadamard;
pub mod rns;
pub mod lifting;
pub mod solve;

pub use error::{LiftError, Result};
pub use primes::{CRTBasis, DescendingPrimeGenerator, PrimeGenerator, PrimeList, RandomPrimeGenerator};
pub use field::ModularField;
pub use crt::CRTReconstruction;
pub use matrix::Matrix;
pub use rational::Rational;
pub use hadamard::{rational_solve_bound, HadamardBound};
pub use rns::{RnsBasis, RnsMatrix, StridedView, StridedViewMut};
pub use lifting::{IterationTrace, LiftConfig, MultiModLiftingContainer, PrecomputedInverse, TraceHook};
pub use solve::{DigitCombiner, LiftTimings, MultiModSolver, RationalSolution, SolverConfig};
