//! Residue number system over double-precision planes
//!
//! An [`RnsBasis`] of m primes q_h < 2^26 represents an integer |x| < M/2
//! (M = Π q_h) by its m residues, each stored exactly in an `f64`. Matrices
//! live in [`RnsMatrix`] buffers laid out plane-major: plane h holds the
//! row-major matrix of residues modulo q_h, so one modular matrix product per
//! plane replaces one big-integer product.
//!
//! Plane products use delayed reduction: partial sums are only reduced once
//! they could exceed 2^53, the last integer range where doubles are exact.

use num_bigint::BigInt;
use num_traits::Signed;
use rayon::prelude::*;

use crate::crt::CRTReconstruction;
use crate::error::{LiftError, Result};
use crate::field::{mod_pow, reduce_bigint, MAX_FIELD_PRIME_BITS};
use crate::primes::CRTBasis;

/// 2^53: every integer below it is exact in an `f64`
const EXACT_F64: f64 = 9007199254740992.0;

/// Read-only strided 3-D view over residues: (plane, row, col)
#[derive(Debug, Clone, Copy)]
pub struct StridedView<'a> {
    data: &'a [f64],
    shape: [usize; 3],
    strides: [usize; 3],
}

impl<'a> StridedView<'a> {
    pub fn new(data: &'a [f64], shape: [usize; 3], strides: [usize; 3]) -> Self {
        Self {
            data,
            shape,
            strides,
        }
    }

    pub fn shape(&self) -> [usize; 3] {
        self.shape
    }

    pub fn strides(&self) -> [usize; 3] {
        self.strides
    }

    #[inline]
    fn offset(&self, h: usize, i: usize, j: usize) -> usize {
        debug_assert!(
            h < self.shape[0] && i < self.shape[1] && j < self.shape[2],
            "index ({}, {}, {}) out of shape {:?}",
            h,
            i,
            j,
            self.shape
        );
        h * self.strides[0] + i * self.strides[1] + j * self.strides[2]
    }

    #[inline]
    pub fn get(&self, h: usize, i: usize, j: usize) -> f64 {
        self.data[self.offset(h, i, j)]
    }
}

/// Mutable strided 3-D view over residues: (plane, row, col)
#[derive(Debug)]
pub struct StridedViewMut<'a> {
    data: &'a mut [f64],
    shape: [usize; 3],
    strides: [usize; 3],
}

impl<'a> StridedViewMut<'a> {
    pub fn new(data: &'a mut [f64], shape: [usize; 3], strides: [usize; 3]) -> Self {
        Self {
            data,
            shape,
            strides,
        }
    }

    #[inline]
    fn offset(&self, h: usize, i: usize, j: usize) -> usize {
        debug_assert!(
            h < self.shape[0] && i < self.shape[1] && j < self.shape[2],
            "index ({}, {}, {}) out of shape {:?}",
            h,
            i,
            j,
            self.shape
        );
        h * self.strides[0] + i * self.strides[1] + j * self.strides[2]
    }

    #[inline]
    pub fn get(&self, h: usize, i: usize, j: usize) -> f64 {
        self.data[self.offset(h, i, j)]
    }

    #[inline]
    pub fn set(&mut self, h: usize, i: usize, j: usize, value: f64) {
        let k = self.offset(h, i, j);
        self.data[k] = value;
    }

    /// Write the same value into every plane at (i, j)
    pub fn broadcast(&mut self, i: usize, j: usize, value: f64) {
        for h in 0..self.shape[0] {
            self.set(h, i, j, value);
        }
    }
}

/// Plane-major buffer of residues for a rows×cols integer matrix
#[derive(Debug, Clone)]
pub struct RnsMatrix {
    planes: usize,
    rows: usize,
    cols: usize,
    data: Vec<f64>,
}

impl RnsMatrix {
    /// Zero-filled buffer with one plane per prime of `basis`
    pub fn zeros(basis: &RnsBasis, rows: usize, cols: usize) -> Self {
        Self {
            planes: basis.len(),
            rows,
            cols,
            data: vec![0.0; basis.len() * rows * cols],
        }
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn planes(&self) -> usize {
        self.planes
    }

    fn plane_len(&self) -> usize {
        self.rows * self.cols
    }

    /// Row-major residues modulo the h-th prime
    pub fn plane(&self, h: usize) -> &[f64] {
        let len = self.plane_len();
        &self.data[h * len..(h + 1) * len]
    }

    pub fn view(&self) -> StridedView<'_> {
        StridedView::new(
            &self.data,
            [self.planes, self.rows, self.cols],
            [self.plane_len(), self.cols, 1],
        )
    }

    pub fn view_mut(&mut self) -> StridedViewMut<'_> {
        let shape = [self.planes, self.rows, self.cols];
        let strides = [self.plane_len(), self.cols, 1];
        StridedViewMut::new(&mut self.data, shape, strides)
    }
}

/// A basis of double-precision RNS primes
#[derive(Debug, Clone)]
pub struct RnsBasis {
    crt: CRTBasis,
    moduli: Vec<f64>,
    /// Products that may be accumulated before a reduction is due
    block_sizes: Vec<usize>,
}

impl RnsBasis {
    /// Build a basis from distinct primes below 2^26
    pub fn new(primes: Vec<u64>) -> Result<Self> {
        if primes.is_empty() {
            return Err(LiftError::InvalidConfig("empty RNS basis".into()));
        }
        if let Some(&p) = primes.iter().find(|&&p| p >> MAX_FIELD_PRIME_BITS != 0) {
            return Err(LiftError::PrimeTooLarge {
                prime: p,
                max_bits: MAX_FIELD_PRIME_BITS,
            });
        }

        let moduli: Vec<f64> = primes.iter().map(|&p| p as f64).collect();
        let block_sizes = moduli
            .iter()
            .map(|&q| {
                let max_product = (q - 1.0) * (q - 1.0);
                if max_product <= 0.0 {
                    usize::MAX
                } else {
                    (((EXACT_F64 - q) / max_product).floor() as usize).max(1)
                }
            })
            .collect();

        Ok(Self {
            crt: CRTBasis::new(primes),
            moduli,
            block_sizes,
        })
    }

    pub fn len(&self) -> usize {
        self.moduli.len()
    }

    pub fn is_empty(&self) -> bool {
        self.moduli.is_empty()
    }

    pub fn primes(&self) -> &[u64] {
        &self.crt.primes
    }

    /// M, the product of all RNS primes
    pub fn product(&self) -> &BigInt {
        &self.crt.product
    }

    pub fn log2_product(&self) -> f64 {
        self.crt.log2_product()
    }

    /// Residues of p⁻¹ modulo every RNS prime; p must not be in the basis
    pub fn inverses_of(&self, p: u64) -> Vec<f64> {
        self.crt
            .primes
            .iter()
            .map(|&q| mod_pow(p % q, q - 2, q) as f64)
            .collect()
    }

    /// Convert integers into residues, row-major into `dst`
    ///
    /// Every |value| is expected below `bound`; values at or beyond M/2 cannot
    /// be represented and are rejected with `NumericOverflow`.
    pub fn init(&self, dst: &mut RnsMatrix, src: &[BigInt], bound: &BigInt) -> Result<()> {
        if src.len() != dst.rows * dst.cols {
            return Err(LiftError::DimensionMismatch {
                expected: dst.rows * dst.cols,
                actual: src.len(),
            });
        }

        let cols = dst.cols;
        let mut view = dst.view_mut();
        for (k, value) in src.iter().enumerate() {
            debug_assert!(&value.abs() < bound, "RNS input exceeds its stated bound");
            if value.abs() >= self.crt.half_product {
                return Err(LiftError::NumericOverflow {
                    bits: value.bits(),
                    limit_bits: self.crt.half_product.bits(),
                });
            }
            let (i, j) = (k / cols, k % cols);
            for (h, &q) in self.crt.primes.iter().enumerate() {
                view.set(h, i, j, reduce_bigint(value, q) as f64);
            }
        }
        Ok(())
    }

    /// dst = β·dst + α·(A × C) in every plane
    ///
    /// A is n×k and C is k×l; dst must be n×l. Planes are independent and are
    /// processed in parallel.
    pub fn batched_multiply(
        &self,
        dst: &mut RnsMatrix,
        a: &RnsMatrix,
        c: &RnsMatrix,
        alpha: i64,
        beta: i64,
    ) -> Result<()> {
        if a.cols != c.rows {
            return Err(LiftError::DimensionMismatch {
                expected: a.cols,
                actual: c.rows,
            });
        }
        if dst.rows != a.rows || dst.cols != c.cols {
            return Err(LiftError::DimensionMismatch {
                expected: a.rows * c.cols,
                actual: dst.rows * dst.cols,
            });
        }

        let (n, k, l) = (a.rows, a.cols, c.cols);
        let plane_len = dst.plane_len();
        if plane_len == 0 {
            return Ok(());
        }

        dst.data
            .par_chunks_mut(plane_len)
            .enumerate()
            .for_each(|(h, d)| {
                let q = self.moduli[h];
                let block = self.block_sizes[h];
                let alpha = alpha.rem_euclid(q as i64) as f64;
                let beta = beta.rem_euclid(q as i64) as f64;
                let ap = a.plane(h);
                let cp = c.plane(h);

                let mut acc = vec![0.0f64; l];
                for i in 0..n {
                    acc.iter_mut().for_each(|x| *x = 0.0);
                    let mut pending = 0usize;
                    for t in 0..k {
                        let a_it = ap[i * k + t];
                        if a_it != 0.0 {
                            let c_row = &cp[t * l..(t + 1) * l];
                            for (x, &c_tj) in acc.iter_mut().zip(c_row) {
                                *x += a_it * c_tj;
                            }
                        }
                        pending += 1;
                        if pending == block {
                            acc.iter_mut().for_each(|x| *x %= q);
                            pending = 0;
                        }
                    }
                    let d_row = &mut d[i * l..(i + 1) * l];
                    for (y, &x) in d_row.iter_mut().zip(&acc) {
                        *y = (beta * *y + alpha * (x % q)) % q;
                    }
                }
            });
        Ok(())
    }

    /// Multiply column j of every plane h by `inverses[j][h]`
    pub fn scale_by_inverse(&self, buffer: &mut RnsMatrix, inverses: &[Vec<f64>]) {
        debug_assert_eq!(inverses.len(), buffer.cols);
        let (rows, cols) = (buffer.rows, buffer.cols);
        let plane_len = buffer.plane_len();
        if plane_len == 0 {
            return;
        }

        buffer
            .data
            .par_chunks_mut(plane_len)
            .enumerate()
            .for_each(|(h, d)| {
                let q = self.moduli[h];
                for i in 0..rows {
                    for (j, inv) in inverses.iter().enumerate() {
                        let x = &mut d[i * cols + j];
                        *x = (*x * inv[h]) % q;
                    }
                }
            });
    }

    /// Reconstruct column j as signed integers in (-M/2, M/2]
    ///
    /// Correct only for true values below M/2 in magnitude; anything larger
    /// comes back wrapped modulo M.
    pub fn convert_back_column(&self, src: &RnsMatrix, j: usize) -> Vec<BigInt> {
        let view = src.view();
        let mut scratch = vec![0u64; self.len()];
        (0..src.rows)
            .map(|i| {
                for (h, slot) in scratch.iter_mut().enumerate() {
                    *slot = view.get(h, i, j) as u64;
                }
                CRTReconstruction::reconstruct_signed(&scratch, &self.crt)
            })
            .collect()
    }

    /// Reconstruct the whole buffer, row-major
    pub fn convert_back(&self, src: &RnsMatrix) -> Vec<BigInt> {
        let columns: Vec<Vec<BigInt>> = (0..src.cols)
            .map(|j| self.convert_back_column(src, j))
            .collect();
        let mut out = Vec::with_capacity(src.rows * src.cols);
        for i in 0..src.rows {
            for column in &columns {
                out.push(column[i].clone());
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use num_traits::One;

    fn basis() -> RnsBasis {
        RnsBasis::new(vec![67108859, 67108837, 67108819]).unwrap()
    }

    fn big(values: &[i64]) -> Vec<BigInt> {
        values.iter().map(|&x| BigInt::from(x)).collect()
    }

    #[test]
    fn test_rejects_wide_primes() {
        let err = RnsBasis::new(vec![67108879]).unwrap_err();
        assert!(matches!(err, LiftError::PrimeTooLarge { prime: 67108879, .. }));
        assert!(matches!(RnsBasis::new(vec![]), Err(LiftError::InvalidConfig(_))));
    }

    #[test]
    fn test_round_trip_below_bound() {
        let basis = basis();
        let values = big(&[0, 1, -1, 123456789, -987654321012345, 42]);
        let mut m = RnsMatrix::zeros(&basis, 2, 3);
        let bound = BigInt::one() << 60usize;
        basis.init(&mut m, &values, &bound).unwrap();
        assert_eq!(basis.convert_back(&m), values);
    }

    #[test]
    fn test_init_guards_capacity() {
        let basis = RnsBasis::new(vec![101, 103]).unwrap();
        let mut m = RnsMatrix::zeros(&basis, 1, 1);
        // M = 10403, M/2 = 5201
        let err = basis
            .init(&mut m, &big(&[5201]), &BigInt::from(i64::MAX))
            .unwrap_err();
        assert!(matches!(err, LiftError::NumericOverflow { .. }));
        basis.init(&mut m, &big(&[-5200]), &BigInt::from(5201)).unwrap();
        assert_eq!(basis.convert_back(&m), big(&[-5200]));
    }

    #[test]
    fn test_convert_back_wraps_beyond_capacity() {
        let basis = RnsBasis::new(vec![101, 103]).unwrap();
        let mut m = RnsMatrix::zeros(&basis, 1, 1);
        // 10403 + 7 has the same residues as 7
        let mut view = m.view_mut();
        view.set(0, 0, 0, (10410 % 101) as f64);
        view.set(1, 0, 0, (10410 % 103) as f64);
        assert_eq!(basis.convert_back(&m), big(&[7]));
    }

    #[test]
    fn test_batched_multiply_matches_integers() {
        let basis = basis();
        let n = 3;
        let a_vals = big(&[3, -1, 4, 1, -5, 9, 2, 6, -5]);
        let c_vals = big(&[10, 0, -20, 7, 30, 1]);
        let r_vals = big(&[100, 200, 300, 400, 500, 600]);

        let bound = BigInt::from(1000);
        let mut a = RnsMatrix::zeros(&basis, n, n);
        let mut c = RnsMatrix::zeros(&basis, n, 2);
        let mut r = RnsMatrix::zeros(&basis, n, 2);
        basis.init(&mut a, &a_vals, &bound).unwrap();
        basis.init(&mut c, &c_vals, &bound).unwrap();
        basis.init(&mut r, &r_vals, &bound).unwrap();

        basis.batched_multiply(&mut r, &a, &c, -1, 1).unwrap();

        let mut expected = Vec::new();
        for i in 0..n {
            for j in 0..2 {
                let mut acc = r_vals[i * 2 + j].clone();
                for t in 0..n {
                    acc -= &a_vals[i * n + t] * &c_vals[t * 2 + j];
                }
                expected.push(acc);
            }
        }
        assert_eq!(basis.convert_back(&r), expected);
    }

    #[test]
    fn test_delayed_reduction_long_inner_dimension() {
        // Large residues over a long inner dimension force several reductions
        let basis = basis();
        let k = 300;
        let a_vals: Vec<BigInt> = (0..k).map(|t| BigInt::from(33554431 - t as i64)).collect();
        let c_vals: Vec<BigInt> = (0..k).map(|t| BigInt::from(-(33554000 + t as i64))).collect();
        let bound = BigInt::one() << 30usize;

        let mut a = RnsMatrix::zeros(&basis, 1, k);
        let mut c = RnsMatrix::zeros(&basis, k, 1);
        let mut d = RnsMatrix::zeros(&basis, 1, 1);
        basis.init(&mut a, &a_vals, &bound).unwrap();
        basis.init(&mut c, &c_vals, &bound).unwrap();
        basis.batched_multiply(&mut d, &a, &c, 1, 0).unwrap();

        let expected: BigInt = a_vals.iter().zip(&c_vals).map(|(x, y)| x * y).sum();
        assert_eq!(basis.convert_back(&d), vec![expected]);
    }

    #[test]
    fn test_scale_by_inverse_divides_exactly() {
        let basis = basis();
        let values = big(&[35, -14, 0, 70]);
        let mut m = RnsMatrix::zeros(&basis, 2, 2);
        basis.init(&mut m, &values, &BigInt::from(100)).unwrap();

        // column 0 divided by 7, column 1 divided by 2
        let inverses = vec![basis.inverses_of(7), basis.inverses_of(2)];
        basis.scale_by_inverse(&mut m, &inverses);
        assert_eq!(basis.convert_back(&m), big(&[5, -7, 0, 35]));
    }

    #[test]
    fn test_strided_view_layout() {
        let basis = RnsBasis::new(vec![101, 103]).unwrap();
        let mut m = RnsMatrix::zeros(&basis, 2, 3);
        m.view_mut().broadcast(1, 2, 9.0);
        let view = m.view();
        assert_eq!(view.shape(), [2, 2, 3]);
        assert_eq!(view.strides(), [6, 3, 1]);
        assert_eq!(view.get(0, 1, 2), 9.0);
        assert_eq!(view.get(1, 1, 2), 9.0);
        assert_eq!(m.plane(1)[5], 9.0);
    }
}
