//! Dense matrix operations
//!
//! Row-major dense matrix representation.

use num_bigint::BigInt;
use num_traits::{Signed, Zero};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::error::{LiftError, Result};
use crate::field::reduce_bigint;

/// Dense matrix in row-major order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Matrix<T> {
    data: Vec<T>,
    rows: usize,
    cols: usize,
}

impl<T: Clone> Matrix<T> {
    /// Create a matrix from a flat vector (row-major order)
    pub fn from_flat(data: Vec<T>, rows: usize, cols: usize) -> Result<Self> {
        if data.len() != rows * cols {
            return Err(LiftError::DimensionMismatch {
                expected: rows * cols,
                actual: data.len(),
            });
        }
        Ok(Self { data, rows, cols })
    }

    /// Get matrix dimensions
    pub fn dims(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    /// Get number of rows
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Get number of columns
    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn is_square(&self) -> bool {
        self.rows == self.cols
    }

    /// Access element at (i, j)
    pub fn get(&self, i: usize, j: usize) -> &T {
        &self.data[i * self.cols + j]
    }

    /// Get underlying data as slice
    pub fn as_slice(&self) -> &[T] {
        &self.data
    }

    /// Iterate over rows
    pub fn row_iter(&self) -> impl Iterator<Item = &[T]> {
        self.data.chunks(self.cols.max(1))
    }
}

impl Matrix<BigInt> {
    /// Build from rows of machine integers
    pub fn from_rows(rows: &[Vec<i64>]) -> Result<Self> {
        let cols = rows.first().map_or(0, Vec::len);
        let mut data = Vec::with_capacity(rows.len() * cols);
        for row in rows {
            if row.len() != cols {
                return Err(LiftError::DimensionMismatch {
                    expected: cols,
                    actual: row.len(),
                });
            }
            data.extend(row.iter().map(|&x| BigInt::from(x)));
        }
        Self::from_flat(data, rows.len(), cols)
    }

    /// Infinity norm: the largest absolute row sum
    pub fn infinity_norm(&self) -> BigInt {
        self.row_iter()
            .map(|row| row.iter().fold(BigInt::zero(), |acc, x| acc + x.abs()))
            .max()
            .unwrap_or_else(BigInt::zero)
    }

    /// Largest entry magnitude
    pub fn max_abs(&self) -> BigInt {
        self.data
            .iter()
            .map(|x| x.abs())
            .max()
            .unwrap_or_else(BigInt::zero)
    }

    /// Reduce all entries modulo p into `[0, p)`
    pub fn reduce_mod(&self, p: u64) -> Vec<u64> {
        self.data.iter().map(|x| reduce_bigint(x, p)).collect()
    }

    /// y = A x over the integers
    pub fn mul_vec(&self, x: &[BigInt]) -> Vec<BigInt> {
        self.row_iter()
            .map(|row| row.iter().zip(x).fold(BigInt::zero(), |acc, (a, b)| acc + a * b))
            .collect()
    }
}

/// Seeded random matrix with a dominant diagonal, nonsingular in practice
///
/// Off-diagonal entries are uniform in `[-bound, bound]`; diagonal entries are
/// pushed past the row's off-diagonal mass.
pub fn random_matrix(n: usize, bound: i64, seed: u64) -> Matrix<BigInt> {
    let mut rng = StdRng::seed_from_u64(seed);
    let bound = bound.max(1);
    let mut data = Vec::with_capacity(n * n);
    for i in 0..n {
        let row: Vec<BigInt> = (0..n)
            .map(|_| BigInt::from(rng.gen_range(-bound..=bound)))
            .collect();
        // Summed in BigInt: n entries near i64::MAX overflow a machine word
        let off_diagonal: BigInt = row
            .iter()
            .enumerate()
            .filter(|&(j, _)| j != i)
            .map(|(_, x)| x.abs())
            .sum();
        for (j, x) in row.into_iter().enumerate() {
            let value = if i == j { &off_diagonal + 1u32 + x.abs() } else { x };
            data.push(value);
        }
    }
    Matrix { data, rows: n, cols: n }
}

/// Seeded random vector with entries in `[-bound, bound]`
pub fn random_vector(n: usize, bound: i64, seed: u64) -> Vec<BigInt> {
    let mut rng = StdRng::seed_from_u64(seed.wrapping_add(12345));
    let bound = bound.max(1);
    (0..n)
        .map(|_| BigInt::from(rng.gen_range(-bound..=bound)))
        .collect()
}
