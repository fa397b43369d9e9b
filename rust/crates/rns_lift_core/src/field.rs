//! Word-sized prime fields
//!
//! [`ModularField`] is the per-lifting-prime arithmetic domain. Elements are
//! `u64` values in `[0, p)`; products go through `u128` so any prime below
//! 2^63 is safe, although the lifting engine only admits primes below
//! [`MAX_FIELD_PRIME_BITS`] so that residues are exact in an `f64`.

use num_bigint::BigInt;
use num_integer::Integer;
use num_traits::ToPrimitive;

/// Largest admissible prime bit width for lifting and RNS primes
///
/// Residues below 2^26 multiply to less than 2^52, exact in double precision.
pub const MAX_FIELD_PRIME_BITS: u32 = 26;

/// Modular multiplication using 128-bit intermediate
#[inline]
pub fn mod_mul(a: u64, b: u64, modulus: u64) -> u64 {
    ((a as u128 * b as u128) % modulus as u128) as u64
}

/// Modular exponentiation
pub fn mod_pow(mut base: u64, mut exp: u64, modulus: u64) -> u64 {
    let mut result = 1u64 % modulus;
    base %= modulus;
    while exp > 0 {
        if exp & 1 == 1 {
            result = mod_mul(result, base, modulus);
        }
        exp >>= 1;
        base = mod_mul(base, base, modulus);
    }
    result
}

/// Reduce an arbitrary-precision integer into `[0, p)`
pub fn reduce_bigint(x: &BigInt, p: u64) -> u64 {
    x.mod_floor(&BigInt::from(p)).to_u64().unwrap_or(0)
}

/// Arithmetic modulo a word-sized prime
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModularField {
    p: u64,
}

impl ModularField {
    pub fn new(p: u64) -> Self {
        Self { p }
    }

    /// The characteristic
    pub fn modulus(&self) -> u64 {
        self.p
    }

    #[inline]
    pub fn add(&self, a: u64, b: u64) -> u64 {
        let s = a + b;
        if s >= self.p {
            s - self.p
        } else {
            s
        }
    }

    #[inline]
    pub fn sub(&self, a: u64, b: u64) -> u64 {
        if a >= b {
            a - b
        } else {
            self.p - b + a
        }
    }

    #[inline]
    pub fn mul(&self, a: u64, b: u64) -> u64 {
        mod_mul(a, b, self.p)
    }

    /// Multiplicative inverse (Fermat); `None` for zero
    pub fn inv(&self, a: u64) -> Option<u64> {
        let a = a % self.p;
        if a == 0 {
            None
        } else {
            Some(mod_pow(a, self.p - 2, self.p))
        }
    }

    /// Reduce a signed machine integer
    pub fn reduce_i64(&self, x: i64) -> u64 {
        x.rem_euclid(self.p as i64) as u64
    }

    /// Reduce a big integer
    pub fn reduce(&self, x: &BigInt) -> u64 {
        reduce_bigint(x, self.p)
    }

    /// Invert an n×n row-major matrix in place by Gauss-Jordan elimination
    ///
    /// Returns the nullity of the input. When it is nonzero the contents of
    /// `m` are unspecified.
    pub fn invert_in_place(&self, m: &mut [u64], n: usize) -> usize {
        debug_assert_eq!(m.len(), n * n);

        // Augmented matrix [A | I]
        let width = 2 * n;
        let mut aug = vec![0u64; n * width];
        for i in 0..n {
            aug[i * width..i * width + n].copy_from_slice(&m[i * n..(i + 1) * n]);
            aug[i * width + n + i] = 1;
        }

        let mut rank = 0;
        for col in 0..n {
            let pivot_row = match (rank..n).find(|&row| aug[row * width + col] != 0) {
                Some(row) => row,
                None => continue,
            };

            if pivot_row != rank {
                for j in 0..width {
                    aug.swap(rank * width + j, pivot_row * width + j);
                }
            }

            // Pivot is nonzero, so it is invertible in a field
            let pivot_inv = self.inv(aug[rank * width + col]).unwrap_or(0);
            for j in 0..width {
                aug[rank * width + j] = self.mul(aug[rank * width + j], pivot_inv);
            }

            for row in 0..n {
                if row == rank {
                    continue;
                }
                let factor = aug[row * width + col];
                if factor == 0 {
                    continue;
                }
                for j in 0..width {
                    let sub = self.mul(factor, aug[rank * width + j]);
                    aug[row * width + j] = self.sub(aug[row * width + j], sub);
                }
            }
            rank += 1;
        }

        let nullity = n - rank;
        if nullity == 0 {
            for i in 0..n {
                m[i * n..(i + 1) * n].copy_from_slice(&aug[i * width + n..(i + 1) * width]);
            }
        }
        nullity
    }

    /// y = M x for an n×n row-major matrix
    pub fn matvec(&self, m: &[u64], x: &[u64], y: &mut [u64]) {
        let n = x.len();
        debug_assert_eq!(m.len(), n * y.len());
        for (i, yi) in y.iter_mut().enumerate() {
            let row = &m[i * n..(i + 1) * n];
            let mut sum = 0u128;
            for (&a, &b) in row.iter().zip(x) {
                sum += a as u128 * b as u128;
            }
            *yi = (sum % self.p as u128) as u64;
        }
    }
}
