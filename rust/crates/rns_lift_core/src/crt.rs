//! Chinese Remainder Theorem reconstruction
//!
//! Two flavours are needed. The RNS layer reconstructs from many word-sized
//! primes, for which Garner's algorithm runs entirely in `u64` arithmetic
//! against a precomputed [`CRTBasis`]. The digit combiner merges a handful of
//! big moduli (one prime power per lifting prime), for which a pairwise
//! extended-gcd combination is simpler.

use num_bigint::BigInt;
use num_integer::Integer;
use num_traits::{One, Zero};

use crate::field::mod_mul;
use crate::primes::CRTBasis;

/// CRT reconstruction utilities
pub struct CRTReconstruction;

impl CRTReconstruction {
    /// Reconstruct the unique x in [0, M) from its residues (Garner)
    ///
    /// Residues are reduced modulo their prime first, so any `u64` is accepted.
    pub fn reconstruct(residues: &[u64], basis: &CRTBasis) -> BigInt {
        debug_assert_eq!(residues.len(), basis.len());

        // Mixed-radix digits: x = sum digits[i] * partial_products[i]
        let mut digits = Vec::with_capacity(residues.len());
        for (i, (&r, &p)) in residues.iter().zip(&basis.primes).enumerate() {
            let mut acc = 0u64;
            for (&d, &pp) in digits.iter().zip(&basis.partial_products_mod[i]) {
                acc = (acc + mod_mul(d, pp, p)) % p;
            }
            let r = r % p;
            let diff = if r >= acc { r - acc } else { p - acc + r };
            digits.push(mod_mul(diff, basis.garner_inverses[i], p));
        }

        let mut result = BigInt::zero();
        for (&d, pp) in digits.iter().zip(&basis.partial_products) {
            if d != 0 {
                result += pp * d;
            }
        }
        result
    }

    /// Reconstruct a signed value in the symmetric range (-M/2, M/2]
    pub fn reconstruct_signed(residues: &[u64], basis: &CRTBasis) -> BigInt {
        let unsigned = Self::reconstruct(residues, basis);

        if unsigned > basis.half_product {
            unsigned - &basis.product
        } else {
            unsigned
        }
    }

    /// Combine x ≡ residues[i] (mod moduli[i]) for pairwise coprime big moduli
    ///
    /// Returns `(x, M)` with x in [0, M), or `None` if two moduli share a factor.
    pub fn combine(residues: &[BigInt], moduli: &[BigInt]) -> Option<(BigInt, BigInt)> {
        debug_assert_eq!(residues.len(), moduli.len());

        let mut x = BigInt::zero();
        let mut m = BigInt::one();
        for (r, mi) in residues.iter().zip(moduli) {
            let ext = m.extended_gcd(mi);
            if !ext.gcd.is_one() {
                return None;
            }
            // x + m * t ≡ r (mod mi)  =>  t = (r - x) * m^(-1) mod mi
            let t = ((r - &x) * ext.x).mod_floor(mi);
            x += &m * t;
            m *= mi;
        }
        Some((x.mod_floor(&m), m))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_basis() -> CRTBasis {
        CRTBasis::new(vec![65521, 65519, 65497])
    }

    #[test]
    fn test_crt_reconstruction() {
        let basis = small_basis();

        let x = 12345i64;
        let residues: Vec<u64> = basis
            .primes
            .iter()
            .map(|&p| x.rem_euclid(p as i64) as u64)
            .collect();

        let reconstructed = CRTReconstruction::reconstruct(&residues, &basis);
        assert_eq!(reconstructed, BigInt::from(x));
    }

    #[test]
    fn test_signed_reconstruction() {
        let basis = small_basis();

        let x = -123456789012i64;
        let residues: Vec<u64> = basis
            .primes
            .iter()
            .map(|&p| x.rem_euclid(p as i64) as u64)
            .collect();

        let reconstructed = CRTReconstruction::reconstruct_signed(&residues, &basis);
        assert_eq!(reconstructed, BigInt::from(x));
    }

    #[test]
    fn test_combine_prime_powers() {
        // x = 1/2 modulo 5^3 and 7^2
        let moduli = vec![BigInt::from(125), BigInt::from(49)];
        let residues = vec![BigInt::from(63), BigInt::from(25)];
        let (x, m) = CRTReconstruction::combine(&residues, &moduli).unwrap();
        assert_eq!(m, BigInt::from(6125));
        assert_eq!((x * 2i32).mod_floor(&m), BigInt::one());

        let shared = vec![BigInt::from(6), BigInt::from(9)];
        assert!(CRTReconstruction::combine(&residues, &shared).is_none());
    }
}
