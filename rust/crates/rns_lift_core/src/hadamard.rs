//! Hadamard bounds for rational linear solving
//!
//! By Cramer's rule every entry of A⁻¹b is det(Aᵢ)/det(A), where Aᵢ is A with
//! column i replaced by b. Hadamard's inequality bounds both determinants by
//! products of Euclidean norms, which fixes how many p-adic digits the
//! lifting loop must produce before rational reconstruction is guaranteed.

use num_bigint::BigInt;
use num_traits::{One, ToPrimitive, Zero};

use crate::matrix::Matrix;

/// Log2 bounds on the solution of A x = b
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HadamardBound {
    /// log2 of a bound on |det(A)|, i.e. on every denominator
    pub den_log_bound: f64,
    /// log2 of a bound on every numerator |det(Aᵢ)|
    pub num_log_bound: f64,
    /// Bits of modulus needed so that reconstruction of num/den is unique:
    /// ⌈num⌉ + ⌈den⌉ + 1
    pub solution_log_bound: f64,
}

/// log2 of a big integer, accurate to double precision
pub fn log2_bigint(x: &BigInt) -> f64 {
    if x.is_zero() {
        return f64::NEG_INFINITY;
    }
    let bits = x.bits();
    if bits <= 1000 {
        return x.to_f64().map_or(f64::INFINITY, |v| v.abs().log2());
    }
    let shift = bits - 64;
    let top: BigInt = x >> shift;
    top.to_f64().map_or(f64::INFINITY, |v| v.abs().log2()) + shift as f64
}

/// Half the log2 of a sum of squares, with zero treated as one
fn log2_norm(sum_of_squares: &BigInt) -> f64 {
    if sum_of_squares.is_zero() {
        0.0
    } else {
        log2_bigint(sum_of_squares) / 2.0
    }
}

/// Compute the rational-solve Hadamard bound of (A, b)
pub fn rational_solve_bound(a: &Matrix<BigInt>, b: &[BigInt]) -> HadamardBound {
    let n = a.cols();

    let row_logs: Vec<f64> = a
        .row_iter()
        .map(|row| log2_norm(&row.iter().map(|x| x * x).sum::<BigInt>()))
        .collect();

    let mut col_squares = vec![BigInt::zero(); n];
    for row in a.row_iter() {
        for (acc, x) in col_squares.iter_mut().zip(row) {
            *acc += x * x;
        }
    }
    let col_logs: Vec<f64> = col_squares.iter().map(log2_norm).collect();

    let row_bound: f64 = row_logs.iter().sum();
    let col_bound: f64 = col_logs.iter().sum();
    let den_log_bound = row_bound.min(col_bound).max(0.0);

    // Replacing the smallest column by b gives the largest det(Aᵢ) bound
    let b_log = log2_norm(&b.iter().map(|x| x * x).sum::<BigInt>());
    let min_col = col_logs.iter().copied().fold(f64::INFINITY, f64::min);
    let min_col = if min_col.is_finite() { min_col } else { 0.0 };
    let num_log_bound = (col_bound - min_col + b_log).max(0.0);

    let solution_log_bound = num_log_bound.ceil() + den_log_bound.ceil() + 1.0;

    HadamardBound {
        den_log_bound,
        num_log_bound,
        solution_log_bound,
    }
}

/// 2^⌈log_bound⌉ as a big integer
pub fn bound_from_log(log_bound: f64) -> BigInt {
    BigInt::one() << (log_bound.max(0.0).ceil() as usize)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log2_bigint() {
        assert_eq!(log2_bigint(&BigInt::from(8)), 3.0);
        assert_eq!(log2_bigint(&BigInt::from(-1024)), 10.0);
        let huge = BigInt::one() << 5000usize;
        assert!((log2_bigint(&huge) - 5000.0).abs() < 1e-9);
    }

    #[test]
    fn test_scalar_bound() {
        // 2 x = 1: numerator 1, denominator 2
        let a = Matrix::from_rows(&[vec![2]]).unwrap();
        let hb = rational_solve_bound(&a, &[BigInt::from(1)]);
        assert_eq!(hb.den_log_bound, 1.0);
        assert_eq!(hb.num_log_bound, 0.0);
        assert_eq!(hb.solution_log_bound, 2.0);
        assert_eq!(bound_from_log(hb.den_log_bound), BigInt::from(2));
        assert_eq!(bound_from_log(hb.num_log_bound), BigInt::from(1));
    }

    #[test]
    fn test_bound_covers_cramer() {
        // A = [[2,1],[1,1]], b = [3,2]: det 1, det(A1) = 1, det(A2) = 1
        let a = Matrix::from_rows(&[vec![2, 1], vec![1, 1]]).unwrap();
        let b = vec![BigInt::from(3), BigInt::from(2)];
        let hb = rational_solve_bound(&a, &b);
        assert!(hb.den_log_bound >= 0.0);
        // sqrt(2) * sqrt(13) on the replaced column
        assert!((hb.num_log_bound - (65f64).log2() / 2.0).abs() < 1e-12);
        assert!(hb.solution_log_bound >= hb.num_log_bound + hb.den_log_bound + 1.0);
    }
}
