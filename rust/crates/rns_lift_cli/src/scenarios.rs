//! Test systems for the CLI
//!
//! Random systems come in three shapes; explicit systems are read from a text
//! file holding the augmented matrix [A | b], one row per line.

use clap::ValueEnum;
use num_bigint::BigInt;
use num_traits::{One, Signed, Zero};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rns_lift_core::matrix::{random_matrix, random_vector};
use rns_lift_core::Matrix;
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Scenario {
    /// Dense diagonally dominant matrix
    Dense,
    /// Sparse rows around a strong diagonal (constraint-system shape)
    Sparse,
    /// Dense unimodular matrix: entries grow with the bound, determinant stays 1
    Ill,
}

/// A linear system A x = b
pub struct System {
    pub a: Matrix<BigInt>,
    pub b: Vec<BigInt>,
}

/// Generate a seeded n×n system
pub fn generate(scenario: Scenario, n: usize, bound: i64, seed: u64) -> System {
    let a = match scenario {
        Scenario::Dense => random_matrix(n, bound, seed),
        Scenario::Sparse => sparse_matrix(n, bound, seed),
        Scenario::Ill => ill_conditioned_matrix(n, bound, seed),
    };
    let b = random_vector(n, bound, seed);
    System { a, b }
}

fn sparse_matrix(n: usize, bound: i64, seed: u64) -> Matrix<BigInt> {
    let mut rng = StdRng::seed_from_u64(seed);
    let bound = bound.max(2);
    let mut data = Vec::with_capacity(n * n);
    for i in 0..n {
        let mut row = vec![BigInt::zero(); n];
        let nonzeros = (n / 8).max(2);
        for _ in 0..nonzeros {
            let j = rng.gen_range(0..n);
            if j != i {
                row[j] = BigInt::from(rng.gen_range(-bound / 2..=bound / 2));
            }
        }
        let off: BigInt = row.iter().map(|x| x.abs()).sum();
        row[i] = off + BigInt::from(rng.gen_range(1..=bound));
        data.extend(row);
    }
    to_matrix(data, n)
}

/// L·U with unit triangular factors: large entries, determinant 1
fn ill_conditioned_matrix(n: usize, bound: i64, seed: u64) -> Matrix<BigInt> {
    let mut rng = StdRng::seed_from_u64(seed);
    let bound = bound.max(2);
    let mut lower = vec![BigInt::zero(); n * n];
    let mut upper = vec![BigInt::zero(); n * n];
    for i in 0..n {
        lower[i * n + i] = BigInt::one();
        upper[i * n + i] = BigInt::one();
        for j in 0..i {
            lower[i * n + j] = BigInt::from(rng.gen_range(-bound..=bound));
            upper[j * n + i] = BigInt::from(rng.gen_range(-bound..=bound));
        }
    }

    let mut data = Vec::with_capacity(n * n);
    for i in 0..n {
        for j in 0..n {
            let entry = (0..=i.min(j)).fold(BigInt::zero(), |acc, k| acc + &lower[i * n + k] * &upper[k * n + j]);
            data.push(entry);
        }
    }
    to_matrix(data, n)
}

fn to_matrix(data: Vec<BigInt>, n: usize) -> Matrix<BigInt> {
    Matrix::from_flat(data, n, n).expect("generated data is n×n")
}

/// Read an augmented system: n lines of n+1 integers (A row, then b_i)
///
/// Entries are separated by whitespace or commas; blank lines and lines
/// starting with `#` are skipped.
pub fn load(path: &Path) -> Result<System, String> {
    let text = fs::read_to_string(path).map_err(|e| format!("{}: {}", path.display(), e))?;
    parse(&text)
}

pub fn parse(text: &str) -> Result<System, String> {
    let mut rows: Vec<Vec<BigInt>> = Vec::new();
    for (line_no, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let row = line
            .split(|c: char| c.is_whitespace() || c == ',')
            .filter(|t| !t.is_empty())
            .map(|t| {
                t.parse::<BigInt>()
                    .map_err(|e| format!("line {}: {:?}: {}", line_no + 1, t, e))
            })
            .collect::<Result<Vec<_>, _>>()?;
        rows.push(row);
    }

    let n = rows.len();
    if n == 0 {
        return Err("empty system".into());
    }
    let mut data = Vec::with_capacity(n * n);
    let mut b = Vec::with_capacity(n);
    for (i, mut row) in rows.into_iter().enumerate() {
        if row.len() != n + 1 {
            return Err(format!("row {} has {} entries, expected {}", i + 1, row.len(), n + 1));
        }
        b.push(row.pop().unwrap_or_default());
        data.extend(row);
    }
    let a = Matrix::from_flat(data, n, n).map_err(|e| e.to_string())?;
    Ok(System { a, b })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rns_lift_core::{LiftConfig, MultiModSolver, RandomPrimeGenerator, SolverConfig};

    #[test]
    fn test_parse_augmented() {
        let system = parse("# 2x + y = 3\n2 1 3\n1, 1, 2\n\n").unwrap();
        assert_eq!(system.a.dims(), (2, 2));
        assert_eq!(system.a.get(0, 0), &BigInt::from(2));
        assert_eq!(system.b, vec![BigInt::from(3), BigInt::from(2)]);
    }

    #[test]
    fn test_parse_rejects_ragged() {
        assert!(parse("1 2 3\n4 5\n").is_err());
        assert!(parse("1 x\n").is_err());
        assert!(parse("# nothing\n").is_err());
    }

    #[test]
    fn test_generated_systems_are_square() {
        for scenario in [Scenario::Dense, Scenario::Sparse, Scenario::Ill] {
            let system = generate(scenario, 7, 50, 4);
            assert_eq!(system.a.dims(), (7, 7));
            assert_eq!(system.b.len(), 7);
        }
    }

    #[test]
    fn test_ill_conditioned_system_solves() {
        let system = generate(Scenario::Ill, 6, 50, 4);
        let solver = MultiModSolver::new(SolverConfig {
            lift: LiftConfig::with_primes(2),
            verify: true,
        });
        let (solution, _) = solver
            .solve(&system.a, &system.b, RandomPrimeGenerator::new(20, 4))
            .unwrap();
        assert!(solution.verified);
        // det(A) = 1, so the solution is integral
        assert_eq!(solution.denominator, BigInt::one());
    }

    #[test]
    fn test_sparse_diagonal_dominates_with_huge_bound() {
        let system = generate(Scenario::Sparse, 16, i64::MAX, 3);
        for i in 0..16 {
            let off: BigInt = (0..16)
                .filter(|&j| j != i)
                .map(|j| system.a.get(i, j).abs())
                .sum();
            assert!(system.a.get(i, i) > &off);
        }
    }
}
