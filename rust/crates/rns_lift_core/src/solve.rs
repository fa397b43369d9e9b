//! Exact rational solver built on multi-modulus lifting
//!
//! The lifting container emits, per step, one digit vector for each lifting
//! prime p_j. The digits of prime j form the p_j-adic expansion of A⁻¹b, so
//! after k steps they determine y_j = A⁻¹b mod p_j^k. Combining the y_j by CRT
//! gives A⁻¹b modulo P^k, from which each entry is recovered by rational
//! reconstruction against the Hadamard numerator and denominator bounds.

use log::info;
use num_bigint::BigInt;
use num_integer::Integer;
use num_traits::{One, Zero};
use std::time::Instant;

use crate::crt::CRTReconstruction;
use crate::error::{LiftError, Result};
use crate::lifting::{LiftConfig, MultiModLiftingContainer};
use crate::matrix::Matrix;
use crate::primes::PrimeGenerator;
use crate::rational::{rational_reconstruct, Rational};

/// Solver configuration
#[derive(Debug, Clone)]
pub struct SolverConfig {
    pub lift: LiftConfig,
    /// Check A·x = b over the integers before returning
    pub verify: bool,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            lift: LiftConfig::default(),
            verify: true,
        }
    }
}

/// Timing breakdown for a solve, in seconds
#[derive(Debug, Clone, Default)]
pub struct LiftTimings {
    pub setup: f64,
    pub lifting: f64,
    pub reconstruction: f64,
    pub verification: f64,
    pub total: f64,
    pub iterations: usize,
    pub lifting_primes: usize,
    pub rns_primes: usize,
}

/// Solution of A x = b
#[derive(Debug, Clone)]
pub struct RationalSolution {
    pub x: Vec<Rational>,
    /// Least common denominator of the entries
    pub denominator: BigInt,
    pub verified: bool,
}

impl RationalSolution {
    fn new(x: Vec<Rational>) -> Self {
        let denominator = x
            .iter()
            .fold(BigInt::one(), |acc, q| acc.lcm(&q.denominator));
        Self {
            x,
            denominator,
            verified: false,
        }
    }

    /// Entries scaled by the common denominator
    pub fn numerators(&self) -> Vec<BigInt> {
        self.x
            .iter()
            .map(|q| &q.numerator * (&self.denominator / &q.denominator))
            .collect()
    }
}

/// Accumulates per-prime p-adic digits into residues modulo p_j^k
#[derive(Debug, Clone)]
pub struct DigitCombiner {
    primes: Vec<BigInt>,
    /// p_j^t for the next digit
    powers: Vec<BigInt>,
    /// values[j][i] = Σ_t c_j,t,i p_j^t
    values: Vec<Vec<BigInt>>,
    steps: usize,
}

impl DigitCombiner {
    pub fn new(primes: &[u64], n: usize) -> Self {
        Self {
            primes: primes.iter().map(|&p| BigInt::from(p)).collect(),
            powers: vec![BigInt::one(); primes.len()],
            values: vec![vec![BigInt::zero(); n]; primes.len()],
            steps: 0,
        }
    }

    /// Fold in one step of digits, `digits[j]` belonging to prime j
    pub fn push(&mut self, digits: &[Vec<BigInt>]) {
        debug_assert_eq!(digits.len(), self.primes.len());
        for (j, digit) in digits.iter().enumerate() {
            for (acc, c) in self.values[j].iter_mut().zip(digit) {
                *acc += c * &self.powers[j];
            }
            self.powers[j] *= &self.primes[j];
        }
        self.steps += 1;
    }

    pub fn steps(&self) -> usize {
        self.steps
    }

    /// The solution modulo P^k, entrywise in [0, P^k), with P^k itself
    pub fn combine(&self) -> Option<(Vec<BigInt>, BigInt)> {
        let n = self.values.first().map_or(0, Vec::len);
        let mut modulus = BigInt::one();
        let mut combined = Vec::with_capacity(n);
        for i in 0..n {
            let residues: Vec<BigInt> = self.values.iter().map(|v| v[i].clone()).collect();
            let (x, m) = CRTReconstruction::combine(&residues, &self.powers)?;
            combined.push(x);
            modulus = m;
        }
        Some((combined, modulus))
    }
}

/// Recover each entry of the solution from its image modulo `modulus`
pub fn reconstruct_solution(
    images: &[BigInt],
    modulus: &BigInt,
    numbound: &BigInt,
    denbound: &BigInt,
) -> Result<Vec<Rational>> {
    images
        .iter()
        .enumerate()
        .map(|(index, u)| {
            rational_reconstruct(u, modulus, numbound, denbound)
                .ok_or(LiftError::ReconstructionFailed { index })
        })
        .collect()
}

/// Check A·x = b exactly, clearing denominators first
pub fn verify_solution(a: &Matrix<BigInt>, b: &[BigInt], solution: &RationalSolution) -> bool {
    if solution.x.len() != a.cols() || b.len() != a.rows() {
        return false;
    }
    let ax = a.mul_vec(&solution.numerators());
    ax.iter()
        .zip(b)
        .all(|(lhs, bi)| lhs == &(bi * &solution.denominator))
}

/// Solves integer systems A x = b over the rationals
pub struct MultiModSolver {
    config: SolverConfig,
}

impl MultiModSolver {
    pub fn new(config: SolverConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SolverConfig {
        &self.config
    }

    /// Solve A x = b with primes drawn from `generator`
    pub fn solve<G: PrimeGenerator>(
        &self,
        a: &Matrix<BigInt>,
        b: &[BigInt],
        generator: G,
    ) -> Result<(RationalSolution, LiftTimings)> {
        let mut timings = LiftTimings::default();
        let start = Instant::now();

        let setup_start = Instant::now();
        let mut container = MultiModLiftingContainer::new(a, b, generator, &self.config.lift)?;
        timings.setup = setup_start.elapsed().as_secs_f64();
        timings.lifting_primes = container.primes_count();
        timings.rns_primes = container.rns_primes().len();

        let lifting_start = Instant::now();
        let mut combiner = DigitCombiner::new(container.primes(), container.size());
        for digits in container.by_ref() {
            combiner.push(&digits?);
        }
        timings.lifting = lifting_start.elapsed().as_secs_f64();
        timings.iterations = combiner.steps();

        let reconstruction_start = Instant::now();
        let (images, modulus) = combiner.combine().ok_or(LiftError::ReconstructionFailed { index: 0 })?;
        let x = reconstruct_solution(&images, &modulus, container.numbound(), container.denbound())?;
        let mut solution = RationalSolution::new(x);
        timings.reconstruction = reconstruction_start.elapsed().as_secs_f64();

        if self.config.verify {
            let verify_start = Instant::now();
            if !verify_solution(container.matrix(), container.rhs(), &solution) {
                return Err(LiftError::VerificationFailed);
            }
            solution.verified = true;
            timings.verification = verify_start.elapsed().as_secs_f64();
        }

        timings.total = start.elapsed().as_secs_f64();
        info!(
            "solved {}x{} system: {} iterations over {} lifting primes, {} RNS primes, denominator {} bits, {:.3}s",
            a.rows(),
            a.cols(),
            timings.iterations,
            timings.lifting_primes,
            timings.rns_primes,
            solution.denominator.bits(),
            timings.total
        );

        Ok((solution, timings))
    }
}

impl Default for MultiModSolver {
    fn default() -> Self {
        Self::new(SolverConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matrix::{random_matrix, random_vector};
    use crate::primes::{DescendingPrimeGenerator, PrimeList, RandomPrimeGenerator};

    fn big(values: &[i64]) -> Vec<BigInt> {
        values.iter().map(|&x| BigInt::from(x)).collect()
    }

    fn rat(num: i64, den: i64) -> Rational {
        Rational::new(BigInt::from(num), BigInt::from(den))
    }

    fn solver(l: usize) -> MultiModSolver {
        MultiModSolver::new(SolverConfig {
            lift: LiftConfig {
                check_divisibility: true,
                ..LiftConfig::with_primes(l)
            },
            verify: true,
        })
    }

    #[test]
    fn test_solve_simple() {
        // A = [[2, 1], [1, 3]], b = [5, 10]: x = [1, 3]
        let a = Matrix::from_rows(&[vec![2, 1], vec![1, 3]]).unwrap();
        let b = big(&[5, 10]);
        let (solution, timings) = solver(2).solve(&a, &b, RandomPrimeGenerator::new(20, 1)).unwrap();

        assert!(solution.verified);
        assert_eq!(solution.x, vec![rat(1, 1), rat(3, 1)]);
        assert_eq!(solution.denominator, BigInt::one());
        assert_eq!(timings.lifting_primes, 2);
        assert!(timings.iterations >= 1);
    }

    #[test]
    fn test_integer_solution_with_single_prime() {
        let a = Matrix::from_rows(&[vec![2, 1], vec![1, 1]]).unwrap();
        let b = big(&[3, 2]);
        let gen = PrimeList::new(vec![101, 1048573]);
        let (solution, _) = solver(1).solve(&a, &b, gen).unwrap();
        assert_eq!(solution.x, vec![rat(1, 1), rat(1, 1)]);
    }

    #[test]
    fn test_half_from_five_adic_digits() {
        let a = Matrix::from_rows(&[vec![2]]).unwrap();
        let b = big(&[1]);
        let gen = PrimeList::new(vec![5, 1048573]);
        let (solution, timings) = solver(1).solve(&a, &b, gen).unwrap();
        assert_eq!(solution.x, vec![rat(1, 2)]);
        assert_eq!(solution.denominator, BigInt::from(2));
        assert_eq!(timings.iterations, 1);
    }

    #[test]
    fn test_scalar_negative_fraction() {
        let a = Matrix::from_rows(&[vec![-14]]).unwrap();
        let b = big(&[6]);
        let (solution, _) = solver(3).solve(&a, &b, DescendingPrimeGenerator::new(22)).unwrap();
        assert_eq!(solution.x, vec![rat(-3, 7)]);
    }

    #[test]
    fn test_rational_solution_common_denominator() {
        // x = [3/5, -1/5]
        let a = Matrix::from_rows(&[vec![2, 1], vec![1, 3]]).unwrap();
        let b = big(&[1, 0]);
        let (solution, _) = solver(2).solve(&a, &b, RandomPrimeGenerator::new(18, 5)).unwrap();
        assert_eq!(solution.x, vec![rat(3, 5), rat(-1, 5)]);
        assert_eq!(solution.denominator, BigInt::from(5));
        assert_eq!(solution.numerators(), big(&[3, -1]));
    }

    #[test]
    fn test_random_systems_end_to_end() {
        for (n, l, seed) in [(3, 1, 11u64), (5, 2, 12), (8, 3, 13), (12, 4, 14)] {
            let a = random_matrix(n, 100, seed);
            let b = random_vector(n, 1000, seed);
            let (solution, timings) = solver(l)
                .solve(&a, &b, RandomPrimeGenerator::new(20, seed))
                .unwrap();
            assert!(solution.verified, "n = {}", n);
            assert!(verify_solution(&a, &b, &solution));
            assert_eq!(timings.lifting_primes, l);
        }
    }

    #[test]
    fn test_more_primes_fewer_iterations() {
        let a = random_matrix(10, 1000, 21);
        let b = random_vector(10, 1000, 21);
        let (one, t1) = solver(1).solve(&a, &b, RandomPrimeGenerator::new(20, 3)).unwrap();
        let (four, t4) = solver(4).solve(&a, &b, RandomPrimeGenerator::new(20, 3)).unwrap();
        assert_eq!(one.x, four.x);
        assert!(t4.iterations < t1.iterations);
    }

    #[test]
    fn test_singular_prime_surfaces() {
        let a = Matrix::from_rows(&[vec![2, 0], vec![0, 2]]).unwrap();
        let b = big(&[1, 1]);
        let cfg = SolverConfig {
            lift: LiftConfig {
                max_prime_redraws: 0,
                ..LiftConfig::with_primes(1)
            },
            verify: true,
        };
        let err = MultiModSolver::new(cfg)
            .solve(&a, &b, PrimeList::new(vec![2, 1048573]))
            .err();
        assert_eq!(err, Some(LiftError::BadPrime { prime: 2 }));
    }

    #[test]
    fn test_digit_combiner() {
        // 1/2 modulo 5^2 and 7^2: 1/2 = 3 + 2·5 = 13 (mod 25), 4 + 3·7 = 25 (mod 49)
        let mut combiner = DigitCombiner::new(&[5, 7], 1);
        combiner.push(&[big(&[3]), big(&[4])]);
        combiner.push(&[big(&[2]), big(&[3])]);
        assert_eq!(combiner.steps(), 2);

        let (images, modulus) = combiner.combine().unwrap();
        assert_eq!(modulus, BigInt::from(1225));
        assert_eq!((&images[0] * 2i32).mod_floor(&modulus), BigInt::one());

        let x = reconstruct_solution(&images, &modulus, &BigInt::from(1), &BigInt::from(2)).unwrap();
        assert_eq!(x, vec![rat(1, 2)]);
    }

    #[test]
    fn test_verify_rejects_wrong_solution() {
        let a = Matrix::from_rows(&[vec![2, 1], vec![1, 3]]).unwrap();
        let b = big(&[5, 10]);
        let wrong = RationalSolution::new(vec![rat(1, 1), rat(2, 1)]);
        assert!(!verify_solution(&a, &b, &wrong));
        let right = RationalSolution::new(vec![rat(1, 1), rat(3, 1)]);
        assert!(verify_solution(&a, &b, &right));
    }
}
