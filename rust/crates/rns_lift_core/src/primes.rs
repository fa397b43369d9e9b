//! Prime generation and CRT basis management
//!
//! The lifting container draws all of its moduli from a [`PrimeGenerator`].
//! Three generators are provided: a seeded random one (the default for
//! solving), a deterministic descending scan, and a fixed list for callers
//! that already know which primes they want.

use num_bigint::BigInt;
use num_traits::One;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::field::{mod_mul, mod_pow};

/// Source of primes for modulus selection
///
/// Generators need not guarantee distinctness; the lifting container
/// deduplicates whatever it receives.
pub trait PrimeGenerator {
    /// Nominal bit width of the generated primes
    fn bits(&self) -> u32;

    /// Next prime, or `None` once the generator is exhausted
    fn next_prime(&mut self) -> Option<u64>;
}

impl<G: PrimeGenerator + ?Sized> PrimeGenerator for &mut G {
    fn bits(&self) -> u32 {
        (**self).bits()
    }

    fn next_prime(&mut self) -> Option<u64> {
        (**self).next_prime()
    }
}

/// Random primes of a fixed bit width from a seeded RNG
///
/// Two generators built from the same seed and width produce the same
/// sequence, which makes whole solves reproducible.
pub struct RandomPrimeGenerator {
    bits: u32,
    rng: StdRng,
}

impl RandomPrimeGenerator {
    /// Create a generator for `bits`-bit primes (2..=62)
    pub fn new(bits: u32, seed: u64) -> Self {
        Self {
            bits: bits.clamp(2, 62),
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl PrimeGenerator for RandomPrimeGenerator {
    fn bits(&self) -> u32 {
        self.bits
    }

    fn next_prime(&mut self) -> Option<u64> {
        let low = 1u64 << (self.bits - 1);
        let high = 1u64 << self.bits;
        loop {
            let candidate = self.rng.gen_range(low..high) | 1;
            if is_prime_u64(candidate) {
                return Some(candidate);
            }
        }
    }
}

/// Primes scanned downward from 2^bits, stopping at 2^(bits-1)
pub struct DescendingPrimeGenerator {
    bits: u32,
    candidate: u64,
}

impl DescendingPrimeGenerator {
    pub fn new(bits: u32) -> Self {
        let bits = bits.clamp(2, 62);
        Self {
            bits,
            candidate: (1u64 << bits) - 1,
        }
    }
}

impl PrimeGenerator for DescendingPrimeGenerator {
    fn bits(&self) -> u32 {
        self.bits
    }

    fn next_prime(&mut self) -> Option<u64> {
        let floor = 1u64 << (self.bits - 1);
        while self.candidate >= floor {
            let candidate = self.candidate;
            self.candidate = self.candidate.saturating_sub(2);
            if is_prime_u64(candidate) {
                return Some(candidate);
            }
        }
        None
    }
}

/// A fixed, caller-supplied sequence of primes
#[derive(Debug, Clone)]
pub struct PrimeList {
    primes: Vec<u64>,
    position: usize,
}

impl PrimeList {
    pub fn new(primes: Vec<u64>) -> Self {
        Self { primes, position: 0 }
    }

    /// Primes not yet handed out
    pub fn remaining(&self) -> usize {
        self.primes.len() - self.position
    }
}

impl PrimeGenerator for PrimeList {
    fn bits(&self) -> u32 {
        self.primes
            .iter()
            .map(|&p| 64 - p.leading_zeros())
            .max()
            .unwrap_or(1)
    }

    fn next_prime(&mut self) -> Option<u64> {
        let p = self.primes.get(self.position).copied()?;
        self.position += 1;
        Some(p)
    }
}

/// Deterministic Miller-Rabin primality test for 64-bit integers
pub fn is_prime_u64(n: u64) -> bool {
    if n < 2 {
        return false;
    }
    for small in [2u64, 3, 5, 7, 11, 13, 17, 19, 23, 29, 31, 37] {
        if n == small {
            return true;
        }
        if n % small == 0 {
            return false;
        }
    }

    // Write n-1 as 2^r * d
    let mut d = n - 1;
    let mut r = 0u32;
    while d % 2 == 0 {
        d /= 2;
        r += 1;
    }

    // Deterministic witnesses for 64-bit numbers
    let witnesses: [u64; 7] = [2, 325, 9375, 28178, 450775, 9780504, 1795265022];

    'witness: for &a in &witnesses {
        let a = a % n;
        if a == 0 {
            continue;
        }
        let mut x = mod_pow(a, d, n);
        if x == 1 || x == n - 1 {
            continue;
        }
        for _ in 1..r {
            x = mod_mul(x, x, n);
            if x == n - 1 {
                continue 'witness;
            }
        }
        return false;
    }
    true
}

/// CRT basis: a set of distinct word-sized primes with Garner precomputation
#[derive(Debug, Clone)]
pub struct CRTBasis {
    /// The prime moduli
    pub primes: Vec<u64>,
    /// Product of all primes (M)
    pub product: BigInt,
    /// M/2 for signed reconstruction
    pub half_product: BigInt,
    /// partial_products[i] = prod(primes[0..i])
    pub partial_products: Vec<BigInt>,
    /// garner_inverses[i] = partial_products[i]^(-1) mod primes[i]
    pub garner_inverses: Vec<u64>,
    /// partial_products_mod[i][j] = partial_products[j] mod primes[i], for j < i
    pub partial_products_mod: Vec<Vec<u64>>,
}

impl CRTBasis {
    /// Create a new CRT basis; `primes` must be distinct primes
    pub fn new(primes: Vec<u64>) -> Self {
        let k = primes.len();

        let mut partial_products = Vec::with_capacity(k);
        let mut running = BigInt::one();
        for &p in &primes {
            partial_products.push(running.clone());
            running *= p;
        }
        let product = running;
        let half_product = &product / 2;

        let garner_inverses = primes
            .iter()
            .zip(&partial_products)
            .map(|(&p, pp)| {
                let pp_mod = crate::field::reduce_bigint(pp, p);
                mod_pow(pp_mod, p - 2, p)
            })
            .collect();

        let partial_products_mod = primes
            .iter()
            .enumerate()
            .map(|(i, &p)| {
                partial_products[..i]
                    .iter()
                    .map(|pp| crate::field::reduce_bigint(pp, p))
                    .collect()
            })
            .collect();

        Self {
            primes,
            product,
            half_product,
            partial_products,
            garner_inverses,
            partial_products_mod,
        }
    }

    /// Sum of log2 of the moduli
    pub fn log2_product(&self) -> f64 {
        self.primes.iter().map(|&p| (p as f64).log2()).sum()
    }

    /// Number of primes in this basis
    pub fn len(&self) -> usize {
        self.primes.len()
    }

    /// Check if the basis is empty
    pub fn is_empty(&self) -> bool {
        self.primes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_prime_u64() {
        let primes = [2u64, 3, 5, 101, 65537, 2147483629, (1u64 << 61) - 1];
        for p in primes {
            assert!(is_prime_u64(p), "{} should be prime", p);
        }
        let composites = [0u64, 1, 4, 561, 1105, 65535, 3215031751];
        for c in composites {
            assert!(!is_prime_u64(c), "{} should be composite", c);
        }
    }

    #[test]
    fn test_random_generator_is_seeded() {
        let mut a = RandomPrimeGenerator::new(23, 7);
        let mut b = RandomPrimeGenerator::new(23, 7);
        for _ in 0..16 {
            let p = a.next_prime().unwrap();
            assert_eq!(Some(p), b.next_prime());
            assert!(is_prime_u64(p));
            assert!(p >= 1 << 22 && p < 1 << 23);
        }
    }

    #[test]
    fn test_descending_generator() {
        let mut g = DescendingPrimeGenerator::new(5);
        let mut drawn = Vec::new();
        while let Some(p) = g.next_prime() {
            drawn.push(p);
        }
        assert_eq!(drawn, vec![31, 29, 23, 19, 17]);
    }

    #[test]
    fn test_prime_list() {
        let mut g = PrimeList::new(vec![5, 101]);
        assert_eq!(g.bits(), 7);
        assert_eq!(g.next_prime(), Some(5));
        assert_eq!(g.remaining(), 1);
        assert_eq!(g.next_prime(), Some(101));
        assert_eq!(g.next_prime(), None);
    }

    #[test]
    fn test_crt_basis_creation() {
        let basis = CRTBasis::new(vec![3, 5, 7]);
        assert_eq!(basis.len(), 3);
        assert_eq!(basis.product, BigInt::from(105));
        assert_eq!(basis.partial_products[2], BigInt::from(15));
        // 15 * 1 = 15 ≡ 1 (mod 7)
        assert_eq!(basis.garner_inverses[2], 1);
        assert_eq!(basis.partial_products_mod[2], vec![1, 3]);
    }
}
