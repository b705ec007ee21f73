//! p-adic numbers of fixed absolute precision.
//!
//! A value is `p^valuation * unit`, known modulo `p^precision`. The unit is
//! kept reduced into `[0, p^(precision - valuation))` and is not divisible by
//! `p`, so two equal values always compare equal field by field. Anything
//! with a valuation at or above the precision is zero.

use lazy_arith::{AssignRule, BinaryOp, Rule, RuleTableBuilder, Src, UnaryOp};
use num_bigint::BigInt;
use num_integer::Integer;
use num_traits::{One, Zero, pow};

use crate::{Num, error::NumError, number::Kind, number::Number};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Padic {
    prime: BigInt,
    precision: i64,
    valuation: i64,
    unit: BigInt,
}

fn power(prime: &BigInt, exponent: i64) -> Result<BigInt, NumError> {
    let exponent = usize::try_from(exponent).map_err(|_| NumError::Overflow(format!("{prime}^{exponent}")))?;
    Ok(pow(prime.clone(), exponent))
}

impl Padic {
    pub fn new(value: BigInt, prime: BigInt, precision: i64) -> Result<Self, NumError> {
        if prime <= BigInt::one() {
            return Err(NumError::domain("padic", format!("prime {prime}")));
        }
        if precision < 0 {
            return Err(NumError::domain("padic", format!("precision {precision}")));
        }
        Self::normalize(prime, precision, 0, value)
    }

    /// Zero in the 2-adics of precision 0, overwritten before it is read.
    pub fn placeholder() -> Self {
        Self::zero_of(BigInt::from(2), 0)
    }

    fn zero_of(prime: BigInt, precision: i64) -> Self {
        Self {
            prime,
            precision,
            valuation: 0,
            unit: BigInt::zero(),
        }
    }

    fn normalize(prime: BigInt, precision: i64, mut valuation: i64, mut unit: BigInt) -> Result<Self, NumError> {
        if unit.is_zero() {
            return Ok(Self::zero_of(prime, precision));
        }
        loop {
            let (q, r) = unit.div_rem(&prime);
            if !r.is_zero() {
                break;
            }
            unit = q;
            valuation += 1;
        }
        if valuation >= precision {
            return Ok(Self::zero_of(prime, precision));
        }
        let modulus = power(&prime, precision - valuation)?;
        Ok(Self {
            unit: unit.mod_floor(&modulus),
            prime,
            precision,
            valuation,
        })
    }

    pub fn prime(&self) -> &BigInt {
        &self.prime
    }

    pub fn precision(&self) -> i64 {
        self.precision
    }

    pub fn is_zero(&self) -> bool {
        self.unit.is_zero()
    }

    /// Valuation of the value, the precision for zero.
    pub fn valuation(&self) -> i64 {
        if self.is_zero() { self.precision } else { self.valuation }
    }

    fn same_prime(&self, other: &Self) -> Result<(), NumError> {
        if self.prime == other.prime {
            Ok(())
        } else {
            Err(NumError::PrimeMismatch {
                lhs: self.prime.to_string(),
                rhs: other.prime.to_string(),
            })
        }
    }

    fn shifted_unit(&self, valuation: i64) -> Result<BigInt, NumError> {
        Ok(&self.unit * power(&self.prime, self.valuation - valuation)?)
    }

    fn combine(&self, other: &Self, subtract: bool) -> Result<Self, NumError> {
        self.same_prime(other)?;
        let precision = self.precision.min(other.precision);
        let valuation = self.valuation.min(other.valuation);
        let (a, b) = (self.shifted_unit(valuation)?, other.shifted_unit(valuation)?);
        let unit = if subtract { a - b } else { a + b };
        Self::normalize(self.prime.clone(), precision, valuation, unit)
    }

    pub fn add(&self, other: &Self) -> Result<Self, NumError> {
        self.combine(other, false)
    }

    pub fn sub(&self, other: &Self) -> Result<Self, NumError> {
        self.combine(other, true)
    }

    pub fn mul(&self, other: &Self) -> Result<Self, NumError> {
        self.same_prime(other)?;
        let precision = self.precision.min(other.precision);
        if self.is_zero() || other.is_zero() {
            return Ok(Self::zero_of(self.prime.clone(), precision));
        }
        Self::normalize(
            self.prime.clone(),
            precision,
            self.valuation + other.valuation,
            &self.unit * &other.unit,
        )
    }

    pub fn div(&self, other: &Self) -> Result<Self, NumError> {
        self.same_prime(other)?;
        if other.is_zero() {
            return Err(NumError::DivisionByZero);
        }
        let precision = self.precision.min(other.precision);
        let valuation = self.valuation - other.valuation;
        if self.is_zero() || valuation >= precision {
            return Ok(Self::zero_of(self.prime.clone(), precision));
        }

        let modulus = power(&self.prime, precision - valuation)?;
        let gcd = other.unit.extended_gcd(&modulus);
        if !gcd.gcd.is_one() {
            return Err(NumError::NotInvertible(format!("{other} modulo {modulus}")));
        }
        Self::normalize(self.prime.clone(), precision, valuation, &self.unit * gcd.x)
    }

    pub fn neg(&self) -> Result<Self, NumError> {
        Self::normalize(self.prime.clone(), self.precision, self.valuation, -&self.unit)
    }

    /// Integers when the valuation is non-negative, `unit/p^k` otherwise.
    pub fn to_str_radix(&self, radix: u32) -> String {
        if self.is_zero() {
            return "0".to_string();
        }
        if self.valuation >= 0 {
            let scale = pow(self.prime.clone(), self.valuation as usize);
            return (&self.unit * scale).to_str_radix(radix);
        }
        format!(
            "{}/{}^{}",
            self.unit.to_str_radix(radix),
            self.prime.to_str_radix(radix),
            -self.valuation
        )
    }
}

impl std::fmt::Display for Padic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_str_radix(10))
    }
}

fn padic_binary(
    dest: &mut Number,
    args: &[Src<'_, Number>],
    f: fn(&Padic, &Padic) -> Result<Padic, NumError>,
) -> Result<(), NumError> {
    let value = f(args[0].get(dest).as_padic()?, args[1].get(dest).as_padic()?)?;
    *dest = Number::Padic(value);
    Ok(())
}

fn padic_plus(dest: &mut Number, args: &[Src<'_, Number>], _: &mut [Number]) -> Result<(), NumError> {
    padic_binary(dest, args, Padic::add)
}

fn padic_minus(dest: &mut Number, args: &[Src<'_, Number>], _: &mut [Number]) -> Result<(), NumError> {
    padic_binary(dest, args, Padic::sub)
}

fn padic_times(dest: &mut Number, args: &[Src<'_, Number>], _: &mut [Number]) -> Result<(), NumError> {
    padic_binary(dest, args, Padic::mul)
}

fn padic_divided_by(dest: &mut Number, args: &[Src<'_, Number>], _: &mut [Number]) -> Result<(), NumError> {
    padic_binary(dest, args, Padic::div)
}

fn padic_negate(dest: &mut Number, args: &[Src<'_, Number>], _: &mut [Number]) -> Result<(), NumError> {
    let value = args[0].get(dest).as_padic()?.neg()?;
    *dest = Number::Padic(value);
    Ok(())
}

fn padic_valuation(dest: &mut Number, args: &[Src<'_, Number>], _: &mut [Number]) -> Result<(), NumError> {
    let value = args[0].get(dest).as_padic()?.valuation();
    *dest = Number::Integer(BigInt::from(value));
    Ok(())
}

/// Takes the prime and precision of the destination it is stored into.
fn integer_to_padic(dest: &mut Number, src: &Number) -> Result<(), NumError> {
    let target = dest.as_padic()?;
    let value = Padic::new(src.as_integer()?.clone(), target.prime.clone(), target.precision)?;
    *dest = Number::Padic(value);
    Ok(())
}

pub(crate) fn register(rules: RuleTableBuilder<Num>) -> RuleTableBuilder<Num> {
    let (integer, padic) = (Kind::Integer, Kind::Padic);

    rules
        .rule(Rule::binary(BinaryOp::Plus, [padic, padic], padic, padic_plus))
        .rule(Rule::binary(BinaryOp::Minus, [padic, padic], padic, padic_minus))
        .rule(Rule::binary(BinaryOp::Times, [padic, padic], padic, padic_times))
        .rule(Rule::binary(BinaryOp::DividedBy, [padic, padic], padic, padic_divided_by))
        .rule(Rule::unary(UnaryOp::Negate, padic, padic, padic_negate))
        .rule(Rule::unary(UnaryOp::Named("valuation".into()), padic, integer, padic_valuation))
        .assignment(AssignRule::new(padic, integer, integer_to_padic))
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    fn padic(value: i64, prime: i64, precision: i64) -> Padic {
        Padic::new(BigInt::from(value), BigInt::from(prime), precision).unwrap()
    }

    #[rstest]
    #[case::unit(7, 5, 3, "7")]
    #[case::stripped(12, 2, 5, "12")]
    #[case::negative(-1, 5, 3, "124")]
    #[case::beyond_precision(125, 5, 3, "0")]
    fn test_new(#[case] value: i64, #[case] prime: i64, #[case] precision: i64, #[case] expected: &str) {
        assert_eq!(padic(value, prime, precision).to_string(), expected);
    }

    #[test]
    fn test_new_rejects_bad_context() {
        assert!(matches!(Padic::new(BigInt::one(), BigInt::one(), 3), Err(NumError::Domain { .. })));
        assert!(matches!(Padic::new(BigInt::one(), BigInt::from(5), -1), Err(NumError::Domain { .. })));
    }

    #[test]
    fn test_arithmetic() {
        assert!(padic(-1, 5, 3).add(&padic(1, 5, 3)).unwrap().is_zero());
        assert_eq!(padic(10, 5, 3).mul(&padic(5, 5, 3)).unwrap(), padic(50, 5, 3));
        assert_eq!(padic(3, 5, 3).sub(&padic(10, 5, 3)).unwrap(), padic(-7, 5, 3));
        assert_eq!(padic(12, 2, 5).valuation(), 2);
    }

    #[test]
    fn test_precision_is_the_smaller_one() {
        let sum = padic(1, 5, 2).add(&padic(1, 5, 4)).unwrap();
        assert_eq!(sum.precision(), 2);
    }

    #[test]
    fn test_div() {
        assert_eq!(padic(1, 5, 3).div(&padic(3, 5, 3)).unwrap().to_string(), "42");
        assert_eq!(padic(1, 5, 3).div(&padic(5, 5, 3)).unwrap().to_string(), "1/5^1");
        assert_eq!(padic(1, 5, 3).div(&padic(0, 5, 3)), Err(NumError::DivisionByZero));
    }

    #[test]
    fn test_prime_mismatch() {
        assert_eq!(
            padic(1, 5, 3).add(&padic(1, 7, 3)),
            Err(NumError::PrimeMismatch {
                lhs: "5".to_string(),
                rhs: "7".to_string(),
            })
        );
    }
}
