//! Rational solution entries and their recovery from modular images

use num_bigint::BigInt;
use num_integer::Integer;
use num_traits::{One, Signed, Zero};
use std::fmt;

/// A reduced fraction with positive denominator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rational {
    pub numerator: BigInt,
    pub denominator: BigInt,
}

impl Rational {
    /// Build num/den in lowest terms; `den` must be nonzero
    pub fn new(num: BigInt, den: BigInt) -> Self {
        let mut r = Self {
            numerator: num,
            denominator: den,
        };
        r.reduce();
        r
    }

    fn reduce(&mut self) {
        if self.numerator.is_zero() {
            self.denominator = BigInt::one();
            return;
        }
        let g = self.numerator.gcd(&self.denominator);
        self.numerator /= &g;
        self.denominator /= &g;
        if self.denominator.is_negative() {
            self.numerator = -&self.numerator;
            self.denominator = -&self.denominator;
        }
    }
}

impl fmt::Display for Rational {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.denominator.is_one() {
            write!(f, "{}", self.numerator)
        } else {
            write!(f, "{}/{}", self.numerator, self.denominator)
        }
    }
}

/// Rational reconstruction (Wang)
///
/// Finds n/d with |n| <= `num_bound`, 0 < d <= `den_bound` and
/// n ≡ d·u (mod m). The answer is unique whenever 2·num_bound·den_bound < m.
/// Returns `None` if no such fraction exists.
pub fn rational_reconstruct(
    u: &BigInt,
    m: &BigInt,
    num_bound: &BigInt,
    den_bound: &BigInt,
) -> Option<Rational> {
    let mut r0 = m.clone();
    let mut r1 = u.mod_floor(m);
    let mut t0 = BigInt::zero();
    let mut t1 = BigInt::one();

    while &r1 > num_bound {
        let q = &r0 / &r1;
        let r2 = &r0 - &q * &r1;
        r0 = std::mem::replace(&mut r1, r2);
        let t2 = &t0 - &q * &t1;
        t0 = std::mem::replace(&mut t1, t2);
    }

    if t1.is_zero() || &t1.abs() > den_bound || !r1.gcd(&t1).is_one() {
        return None;
    }
    Some(Rational::new(r1, t1))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rat(num: i64, den: i64) -> Rational {
        Rational::new(BigInt::from(num), BigInt::from(den))
    }

    #[test]
    fn test_lowest_terms_and_sign() {
        assert_eq!(rat(4, 8), rat(1, 2));
        let r = rat(6, -4);
        assert_eq!(r.numerator, BigInt::from(-3));
        assert_eq!(r.denominator, BigInt::from(2));
        assert_eq!(rat(0, -7).denominator, BigInt::one());
    }

    #[test]
    fn test_display() {
        assert_eq!(rat(-3, 7).to_string(), "-3/7");
        assert_eq!(rat(10, 5).to_string(), "2");
    }

    #[test]
    fn test_rational_reconstruct() {
        // 1/2 mod 5 = 3
        let r = rational_reconstruct(&BigInt::from(3), &BigInt::from(5), &BigInt::from(1), &BigInt::from(2));
        assert_eq!(r, Some(rat(1, 2)));

        // -3/7 modulo 10007
        let m = BigInt::from(10007);
        let inv7 = BigInt::from(7).modpow(&(&m - 2), &m);
        let u = (BigInt::from(-3) * inv7).mod_floor(&m);
        let r = rational_reconstruct(&u, &m, &BigInt::from(64), &BigInt::from(64));
        assert_eq!(r, Some(rat(-3, 7)));

        let r = rational_reconstruct(&BigInt::from(0), &m, &BigInt::from(64), &BigInt::from(64));
        assert_eq!(r, Some(rat(0, 1)));
    }

    #[test]
    fn test_rational_reconstruct_rejects_out_of_bounds() {
        // 1/2 mod 101 is 51; with denominators capped at 1 it is not recoverable
        let r = rational_reconstruct(&BigInt::from(51), &BigInt::from(101), &BigInt::from(5), &BigInt::from(1));
        assert_eq!(r, None);
    }
}
