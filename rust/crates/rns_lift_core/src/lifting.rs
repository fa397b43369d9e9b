//! Multi-modulus p-adic lifting accelerated by a residue number system
//!
//! This is Dixon lifting run simultaneously for l small primes p_1..p_l
//! (Chen/Storjohann, ISSAC 2009, reworked to batch all primes into one
//! matrix product):
//!
//! ```text
//! B_j = A⁻¹ mod p_j                                   (once)
//! r_j = b
//! repeat:
//!     r_j = p_j Q_j + R_j,  0 <= R_j < p_j
//!     c_j = B_j R_j mod p_j                           (emitted digit)
//!     [V_1|..|V_l] = [R_1|..|R_l] - A [c_1|..|c_l]    (one RNS product)
//!     r_j = Q_j + V_j / p_j
//! ```
//!
//! After k iterations Σ_t c_j,t p_j^t ≡ A⁻¹b (mod p_j^k) for every j. The
//! correction product is computed in an RNS basis of primes larger than every
//! p_j, so R and c enter the RNS for free (the same value in every plane) and
//! the division by p_j is a multiplication by its inverse.

use log::{debug, trace, warn};
use num_bigint::BigInt;
use num_integer::Integer;
use num_traits::{Signed, ToPrimitive};
use rayon::prelude::*;

use crate::error::{LiftError, Result};
use crate::field::{ModularField, MAX_FIELD_PRIME_BITS};
use crate::hadamard::{bound_from_log, log2_bigint, rational_solve_bound};
use crate::matrix::Matrix;
use crate::primes::PrimeGenerator;
use crate::rns::{RnsBasis, RnsMatrix};

/// Consecutive duplicate draws tolerated before the generator is declared dry
const MAX_DUPLICATE_DRAWS: usize = 1024;

/// Configuration for multi-modulus lifting
#[derive(Debug, Clone)]
pub struct LiftConfig {
    /// Number of lifting primes l
    pub primes_count: usize,
    /// How many singular primes may be replaced before giving up
    pub max_prime_redraws: usize,
    /// Extra bits added to the RNS basis size estimate, at least 1
    pub rns_margin_bits: f64,
    /// Verify A·c_j ≡ R_j (mod p_j) every iteration
    ///
    /// When off, a wrong digit is still reported as `InexactDivision` once
    /// its correction term leaves the representable range.
    pub check_divisibility: bool,
}

impl Default for LiftConfig {
    fn default() -> Self {
        Self {
            primes_count: 2,
            max_prime_redraws: 8,
            rns_margin_bits: 2.0,
            check_divisibility: true,
        }
    }
}

impl LiftConfig {
    /// Default config with `primes_count` lifting primes
    pub fn with_primes(primes_count: usize) -> Self {
        Self {
            primes_count,
            ..Self::default()
        }
    }
}

/// An inverse of A modulo `prime` computed by the caller
#[derive(Debug, Clone)]
pub struct PrecomputedInverse {
    pub prime: u64,
    /// Row-major n×n inverse, entries in [0, prime)
    pub inverse: Vec<u64>,
}

/// Per-iteration summary handed to the trace hook
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IterationTrace {
    /// Zero-based index of the digit just produced
    pub iteration: usize,
    /// Largest bit length among the converted correction terms
    pub max_correction_bits: u64,
}

pub type TraceHook = Box<dyn FnMut(&IterationTrace) + Send>;

/// Chosen moduli before inversion
#[derive(Debug, Clone)]
struct ModulusSelection {
    lifting: Vec<u64>,
    rns: Vec<u64>,
    /// Every prime ever drawn, including rejected ones
    seen: Vec<u64>,
}

/// State owned by one lifting prime
struct Lane {
    field: ModularField,
    /// B_j = A⁻¹ mod p_j
    inverse: Vec<u64>,
    /// A mod p_j
    a_mod: Vec<u64>,
    check: bool,
    residual: Vec<BigInt>,
    quotient: Vec<BigInt>,
    remainder: Vec<u64>,
    digit: Vec<u64>,
    scratch: Vec<u64>,
}

impl Lane {
    /// Steps 1-4: split r_j by p_j and compute the next digit
    fn produce_digit(&mut self) -> Result<Vec<BigInt>> {
        let p = self.field.modulus();
        let p_big = BigInt::from(p);
        for ((r, q), rem) in self
            .residual
            .iter()
            .zip(self.quotient.iter_mut())
            .zip(self.remainder.iter_mut())
        {
            let (quo, re) = r.div_mod_floor(&p_big);
            *q = quo;
            *rem = re.to_u64().unwrap_or(0);
        }

        self.field.matvec(&self.inverse, &self.remainder, &mut self.digit);

        if self.check {
            self.verify_digit()?;
        }

        Ok(self.digit.iter().map(|&d| BigInt::from(d)).collect())
    }

    /// A·c_j ≡ R_j (mod p_j)
    fn verify_digit(&mut self) -> Result<()> {
        self.field.matvec(&self.a_mod, &self.digit, &mut self.scratch);
        match (0..self.digit.len()).find(|&i| self.scratch[i] != self.remainder[i]) {
            Some(row) => Err(LiftError::InexactDivision {
                prime: self.field.modulus(),
                row,
            }),
            None => Ok(()),
        }
    }

    /// Step 8: r_j = Q_j + correction, with the correction magnitude checked
    ///
    /// A correction out of bounds means either the digit was wrong (the
    /// division by p_j was not exact) or the RNS basis aliased.
    fn absorb_correction(&mut self, correction: Vec<BigInt>, bound: &BigInt, limit_bits: u64) -> Result<u64> {
        if let Some(corr) = correction.iter().find(|corr| &corr.abs() > bound) {
            if !self.check {
                self.verify_digit()?;
            }
            return Err(LiftError::NumericOverflow {
                bits: corr.bits(),
                limit_bits,
            });
        }
        let mut max_bits = 0;
        for ((r, q), corr) in self.residual.iter_mut().zip(&self.quotient).zip(correction) {
            max_bits = max_bits.max(corr.bits());
            *r = q + corr;
        }
        Ok(max_bits)
    }
}

/// Lifting container producing one digit vector per lifting prime per step
pub struct MultiModLiftingContainer<'a> {
    a: &'a Matrix<BigInt>,
    b: &'a [BigInt],
    n: usize,

    primes: Vec<u64>,
    primes_product: BigInt,
    lanes: Vec<Lane>,

    rns: RnsBasis,
    rns_a: RnsMatrix,
    rns_c: RnsMatrix,
    rns_r: RnsMatrix,
    /// prime_inverses[j][h] = p_j⁻¹ mod q_h
    prime_inverses: Vec<Vec<f64>>,
    /// |(R_j - A c_j) / p_j| never exceeds ‖A‖∞ + 1
    correction_bound: BigInt,

    numbound: BigInt,
    denbound: BigInt,
    log2_bound: f64,
    iterations_count: usize,
    position: usize,
    failure: Option<LiftError>,
    trace_hook: Option<TraceHook>,
}

impl<'a> MultiModLiftingContainer<'a> {
    /// Select moduli, invert A modulo every lifting prime and set up the RNS
    pub fn new<G: PrimeGenerator>(
        a: &'a Matrix<BigInt>,
        b: &'a [BigInt],
        generator: G,
        config: &LiftConfig,
    ) -> Result<Self> {
        Self::with_precomputed(a, b, generator, config, Vec::new())
    }

    /// Like [`new`](Self::new), reusing inverses the caller already has
    ///
    /// Every precomputed prime becomes a lifting prime; the generator only
    /// supplies the remaining lifting primes and the RNS basis.
    pub fn with_precomputed<G: PrimeGenerator>(
        a: &'a Matrix<BigInt>,
        b: &'a [BigInt],
        mut generator: G,
        config: &LiftConfig,
        precomputed: Vec<PrecomputedInverse>,
    ) -> Result<Self> {
        let n = a.rows();
        if !a.is_square() {
            return Err(LiftError::DimensionMismatch {
                expected: a.rows(),
                actual: a.cols(),
            });
        }
        if b.len() != n {
            return Err(LiftError::DimensionMismatch {
                expected: n,
                actual: b.len(),
            });
        }
        if n == 0 {
            return Err(LiftError::InvalidConfig("empty system".into()));
        }
        if config.primes_count == 0 {
            return Err(LiftError::InvalidConfig("at least one lifting prime is required".into()));
        }
        if !config.rns_margin_bits.is_finite() || config.rns_margin_bits < 1.0 {
            return Err(LiftError::InvalidConfig(format!(
                "RNS margin must be at least one bit, got {}",
                config.rns_margin_bits
            )));
        }
        for pre in &precomputed {
            check_prime(pre.prime)?;
            if pre.inverse.len() != n * n {
                return Err(LiftError::DimensionMismatch {
                    expected: n * n,
                    actual: pre.inverse.len(),
                });
            }
        }

        let infinity_norm = a.infinity_norm();
        let log_norm = log2_bigint(&infinity_norm).max(0.0);
        // |A c_j| < ‖A‖∞ p_j, hence this many bits for the correction term
        let rns_bits = log_norm + (n as f64).log2() + config.rns_margin_bits;
        let correction_bound = infinity_norm + 1u32;
        // Corrections in [-bound, bound] must convert back without aliasing
        let min_product = &correction_bound * 2u32 + 1u32;

        let mut selection = select_moduli(
            &mut generator,
            config.primes_count,
            rns_bits,
            &min_product,
            &precomputed,
        )?;

        let lanes = invert_lanes(a, b, &mut generator, config, &precomputed, &mut selection)?;
        let primes = selection.lifting;

        let rns = RnsBasis::new(selection.rns)?;
        debug!(
            "modulus selection: lifting primes {:?}, {} RNS primes ({:.1} bits, {:.1} required)",
            primes,
            rns.len(),
            rns.log2_product(),
            rns_bits
        );
        let l = primes.len();
        let mut rns_a = RnsMatrix::zeros(&rns, n, n);
        rns.init(&mut rns_a, a.as_slice(), &(a.max_abs() + 1u32))?;
        let rns_c = RnsMatrix::zeros(&rns, n, l);
        let rns_r = RnsMatrix::zeros(&rns, n, l);
        let prime_inverses = primes.iter().map(|&p| rns.inverses_of(p)).collect();

        let primes_product = product(&primes);
        let hb = rational_solve_bound(a, b);
        let log2_p = log2_sum(&primes);
        let log2_bound = hb.solution_log_bound;
        let iterations_count = ((log2_bound / log2_p).ceil() as usize).max(1);
        debug!(
            "bounds: solution {:.1} bits, numerator {:.1}, denominator {:.1}; {} iterations over P = {}",
            log2_bound, hb.num_log_bound, hb.den_log_bound, iterations_count, primes_product
        );

        Ok(Self {
            a,
            b,
            n,
            primes,
            primes_product,
            lanes,
            rns,
            rns_a,
            rns_c,
            rns_r,
            prime_inverses,
            correction_bound,
            numbound: bound_from_log(hb.num_log_bound),
            denbound: bound_from_log(hb.den_log_bound),
            log2_bound,
            iterations_count,
            position: 0,
            failure: None,
            trace_hook: None,
        })
    }

    /// Install a callback invoked after every successful step
    pub fn set_trace_hook(&mut self, hook: TraceHook) {
        self.trace_hook = Some(hook);
    }

    /// Produce the next digit vector for every lifting prime
    ///
    /// `digits[j]` has entries in [0, p_j). Fails with `Exhausted` once
    /// [`length`](Self::length) digits have been produced; after any other
    /// failure the container stays failed.
    pub fn next_digits(&mut self) -> Result<Vec<Vec<BigInt>>> {
        if let Some(err) = &self.failure {
            return Err(err.clone());
        }
        if self.position >= self.iterations_count {
            return Err(LiftError::Exhausted {
                iterations: self.iterations_count,
            });
        }

        match self.step() {
            Ok((digits, max_correction_bits)) => {
                let trace = IterationTrace {
                    iteration: self.position,
                    max_correction_bits,
                };
                trace!("lifting step {}: max correction {} bits", trace.iteration, max_correction_bits);
                if let Some(hook) = self.trace_hook.as_mut() {
                    hook(&trace);
                }
                self.position += 1;
                Ok(digits)
            }
            Err(err) => {
                self.failure = Some(err.clone());
                Err(err)
            }
        }
    }

    fn step(&mut self) -> Result<(Vec<Vec<BigInt>>, u64)> {
        // Steps 1-4, independent per prime
        let digits = self
            .lanes
            .par_iter_mut()
            .map(Lane::produce_digit)
            .collect::<Result<Vec<_>>>()?;

        // Step 5: every RNS prime exceeds p_j, so residues are the values themselves
        {
            let mut r_view = self.rns_r.view_mut();
            let mut c_view = self.rns_c.view_mut();
            for (j, lane) in self.lanes.iter().enumerate() {
                for i in 0..self.n {
                    r_view.broadcast(i, j, lane.remainder[i] as f64);
                    c_view.broadcast(i, j, lane.digit[i] as f64);
                }
            }
        }

        // Steps 6-7: V = R - A c, then V / p_j, across all planes
        self.rns
            .batched_multiply(&mut self.rns_r, &self.rns_a, &self.rns_c, -1, 1)?;
        self.rns.scale_by_inverse(&mut self.rns_r, &self.prime_inverses);

        // Step 8: r_j = Q_j + V_j / p_j
        let rns = &self.rns;
        let rns_r = &self.rns_r;
        let bound = &self.correction_bound;
        let limit_bits = rns.product().bits().saturating_sub(1);
        let max_bits = self
            .lanes
            .par_iter_mut()
            .enumerate()
            .map(|(j, lane)| lane.absorb_correction(rns.convert_back_column(rns_r, j), bound, limit_bits))
            .collect::<Result<Vec<u64>>>()?
            .into_iter()
            .max()
            .unwrap_or(0);

        Ok((digits, max_bits))
    }

    /// Number of digits needed (fixed at construction)
    pub fn length(&self) -> usize {
        self.iterations_count
    }

    /// Dimension of the system
    pub fn size(&self) -> usize {
        self.n
    }

    /// Digits produced so far
    pub fn position(&self) -> usize {
        self.position
    }

    pub fn is_exhausted(&self) -> bool {
        self.position >= self.iterations_count
    }

    /// P, the product of the lifting primes
    pub fn primes_product(&self) -> &BigInt {
        &self.primes_product
    }

    /// Bound on the numerators of the solution
    pub fn numbound(&self) -> &BigInt {
        &self.numbound
    }

    /// Bound on the common denominator of the solution
    pub fn denbound(&self) -> &BigInt {
        &self.denbound
    }

    /// log2 of the modulus the digits must reach
    pub fn log2_bound(&self) -> f64 {
        self.log2_bound
    }

    pub fn primes_count(&self) -> usize {
        self.primes.len()
    }

    pub fn prime(&self, j: usize) -> u64 {
        self.primes[j]
    }

    pub fn primes(&self) -> &[u64] {
        &self.primes
    }

    pub fn rns_primes(&self) -> &[u64] {
        self.rns.primes()
    }

    pub fn matrix(&self) -> &'a Matrix<BigInt> {
        self.a
    }

    pub fn rhs(&self) -> &'a [BigInt] {
        self.b
    }
}

impl Iterator for MultiModLiftingContainer<'_> {
    type Item = Result<Vec<Vec<BigInt>>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failure.is_some() || self.is_exhausted() {
            None
        } else {
            Some(self.next_digits())
        }
    }
}

fn check_prime(p: u64) -> Result<()> {
    if p >> MAX_FIELD_PRIME_BITS != 0 {
        return Err(LiftError::PrimeTooLarge {
            prime: p,
            max_bits: MAX_FIELD_PRIME_BITS,
        });
    }
    if p < 2 {
        return Err(LiftError::InvalidConfig(format!("{} is not a prime", p)));
    }
    Ok(())
}

fn log2_sum(primes: &[u64]) -> f64 {
    primes.iter().map(|&p| (p as f64).log2()).sum()
}

/// Draw a prime not yet seen, keeping `seen` sorted
fn draw_distinct<G: PrimeGenerator>(generator: &mut G, seen: &mut Vec<u64>, needed: usize) -> Result<u64> {
    for _ in 0..MAX_DUPLICATE_DRAWS {
        let p = generator.next_prime().ok_or(LiftError::InsufficientPrimes {
            needed,
            found: seen.len(),
        })?;
        check_prime(p)?;
        if let Err(pos) = seen.binary_search(&p) {
            seen.insert(pos, p);
            return Ok(p);
        }
    }
    Err(LiftError::InsufficientPrimes {
        needed,
        found: seen.len(),
    })
}

fn product(primes: &[u64]) -> BigInt {
    primes.iter().map(|&p| BigInt::from(p)).product()
}

/// Pick l lifting primes and an RNS basis of at least `rns_bits` bits whose
/// product exceeds `min_product`
///
/// Precomputed primes are always lifting primes. The generator fills the
/// remaining lifting slots with its smallest draws; RNS primes must exceed
/// every lifting prime, so draws below the largest lifting prime are dropped.
fn select_moduli<G: PrimeGenerator>(
    generator: &mut G,
    l: usize,
    rns_bits: f64,
    min_product: &BigInt,
    precomputed: &[PrecomputedInverse],
) -> Result<ModulusSelection> {
    let mut reserved: Vec<u64> = precomputed.iter().map(|pre| pre.prime).collect();
    reserved.sort_unstable();
    reserved.dedup();
    if reserved.len() > l {
        return Err(LiftError::InvalidConfig(format!(
            "{} precomputed inverses for {} lifting primes",
            reserved.len(),
            l
        )));
    }
    let free = l - reserved.len();

    let mut seen = reserved.clone();
    let mut drawn: Vec<u64> = Vec::new();
    let per_prime_bits = (generator.bits().saturating_sub(1)).max(1) as f64;
    let mut target = free + (rns_bits / per_prime_bits).ceil().max(1.0) as usize;

    loop {
        while drawn.len() < target {
            let p = draw_distinct(generator, &mut seen, l + target)?;
            let pos = drawn.binary_search(&p).unwrap_or_else(|pos| pos);
            drawn.insert(pos, p);
        }

        let mut lifting = reserved.clone();
        lifting.extend_from_slice(&drawn[..free]);
        lifting.sort_unstable();
        let ceiling = lifting.last().copied().unwrap_or(0);
        let mut rns: Vec<u64> = drawn[free..].iter().copied().filter(|&q| q > ceiling).collect();

        if log2_sum(&rns) >= rns_bits && &product(&rns) > min_product {
            // Drop the largest RNS primes while the rest still suffice
            while rns.len() > 1 {
                let rest = &rns[..rns.len() - 1];
                if log2_sum(rest) <= rns_bits || &product(rest) <= min_product {
                    break;
                }
                rns.pop();
            }
            return Ok(ModulusSelection { lifting, rns, seen });
        }

        let dropped = drawn.len() - free - rns.len();
        if dropped > MAX_DUPLICATE_DRAWS {
            return Err(LiftError::InsufficientPrimes {
                needed: l + target,
                found: l + rns.len(),
            });
        }
        target += 1;
    }
}

/// Invert A modulo every lifting prime, replacing singular primes
fn invert_lanes<G: PrimeGenerator>(
    a: &Matrix<BigInt>,
    b: &[BigInt],
    generator: &mut G,
    config: &LiftConfig,
    precomputed: &[PrecomputedInverse],
    selection: &mut ModulusSelection,
) -> Result<Vec<Lane>> {
    let n = a.rows();
    let mut redraws = 0;
    let mut lanes = Vec::with_capacity(selection.lifting.len());

    for j in 0..selection.lifting.len() {
        loop {
            let p = selection.lifting[j];
            let field = ModularField::new(p);
            let a_mod = a.reduce_mod(p);

            let inverse = match precomputed.iter().find(|pre| pre.prime == p) {
                Some(pre) => Some(pre.inverse.clone()),
                None => {
                    let mut inv = a_mod.clone();
                    if field.invert_in_place(&mut inv, n) == 0 {
                        Some(inv)
                    } else {
                        None
                    }
                }
            };

            if let Some(inverse) = inverse {
                lanes.push(Lane {
                    field,
                    inverse,
                    a_mod,
                    check: config.check_divisibility,
                    residual: b.to_vec(),
                    quotient: vec![BigInt::from(0); n],
                    remainder: vec![0; n],
                    digit: vec![0; n],
                    scratch: vec![0; n],
                });
                break;
            }

            if redraws >= config.max_prime_redraws {
                return Err(LiftError::BadPrime { prime: p });
            }
            redraws += 1;
            let needed = selection.seen.len() + 1;
            let fresh = match draw_distinct(generator, &mut selection.seen, needed) {
                Ok(fresh) => fresh,
                Err(LiftError::InsufficientPrimes { .. }) => return Err(LiftError::BadPrime { prime: p }),
                Err(err) => return Err(err),
            };
            warn!("prime {} divides det(A); redrawing ({} of {})", p, redraws, config.max_prime_redraws);

            // Lifting primes must stay below every RNS prime
            if selection.rns.first().map_or(true, |&q| fresh < q) {
                selection.lifting[j] = fresh;
            } else {
                selection.lifting[j] = selection.rns.remove(0);
                let pos = selection.rns.binary_search(&fresh).unwrap_or_else(|pos| pos);
                selection.rns.insert(pos, fresh);
            }
        }
    }
    Ok(lanes)
}
