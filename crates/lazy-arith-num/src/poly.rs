//! Dense polynomials with integer coefficients.

use std::cmp::max;

use itertools::{EitherOrBoth, Itertools};
use lazy_arith::{AssignRule, BinaryOp, FusedRule, Rule, RuleTableBuilder, Src, TernaryOp, UnaryOp};
use num_bigint::BigInt;
use num_integer::Integer;
use num_traits::{One, Signed, Zero};

use crate::{Num, error::NumError, number::Kind, number::Number};

/// Coefficients are stored constant term first, without trailing zeros.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Poly {
    coeffs: Vec<BigInt>,
}

impl Poly {
    pub fn new(coeffs: Vec<BigInt>) -> Self {
        let mut poly = Self { coeffs };
        poly.trim();
        poly
    }

    pub fn zero() -> Self {
        Self::default()
    }

    pub fn constant(value: BigInt) -> Self {
        Self::new(vec![value])
    }

    fn trim(&mut self) {
        while self.coeffs.last().is_some_and(Zero::is_zero) {
            self.coeffs.pop();
        }
    }

    pub fn is_zero(&self) -> bool {
        self.coeffs.is_empty()
    }

    /// Degree, `None` for the zero polynomial.
    pub fn degree(&self) -> Option<usize> {
        self.coeffs.len().checked_sub(1)
    }

    pub fn coeffs(&self) -> &[BigInt] {
        &self.coeffs
    }

    pub fn add(&self, other: &Self) -> Self {
        Self::new(
            self.coeffs
                .iter()
                .zip_longest(&other.coeffs)
                .map(|pair| match pair {
                    EitherOrBoth::Both(a, b) => a + b,
                    EitherOrBoth::Left(a) | EitherOrBoth::Right(a) => a.clone(),
                })
                .collect(),
        )
    }

    pub fn sub(&self, other: &Self) -> Self {
        Self::new(
            self.coeffs
                .iter()
                .zip_longest(&other.coeffs)
                .map(|pair| match pair {
                    EitherOrBoth::Both(a, b) => a - b,
                    EitherOrBoth::Left(a) => a.clone(),
                    EitherOrBoth::Right(b) => -b,
                })
                .collect(),
        )
    }

    pub fn mul(&self, other: &Self) -> Self {
        if self.is_zero() || other.is_zero() {
            return Self::zero();
        }
        let mut coeffs = vec![BigInt::zero(); self.coeffs.len() + other.coeffs.len() - 1];
        for (i, a) in self.coeffs.iter().enumerate() {
            for (j, b) in other.coeffs.iter().enumerate() {
                coeffs[i + j] += a * b;
            }
        }
        Self::new(coeffs)
    }

    pub fn neg(&self) -> Self {
        Self {
            coeffs: self.coeffs.iter().map(|c| -c).collect(),
        }
    }

    pub fn scale(&self, factor: &BigInt) -> Self {
        Self::new(self.coeffs.iter().map(|c| c * factor).collect())
    }

    /// Exact division of every coefficient.
    pub fn div_exact(&self, divisor: &BigInt) -> Result<Self, NumError> {
        if divisor.is_zero() {
            return Err(NumError::DivisionByZero);
        }
        let coeffs = self
            .coeffs
            .iter()
            .map(|c| {
                let (q, r) = c.div_rem(divisor);
                if r.is_zero() {
                    Ok(q)
                } else {
                    Err(NumError::NotInvertible(format!("{divisor} in the division of {self}")))
                }
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::new(coeffs))
    }

    pub fn derivative(&self) -> Self {
        Self::new(
            self.coeffs
                .iter()
                .enumerate()
                .skip(1)
                .map(|(i, c)| c * BigInt::from(i))
                .collect(),
        )
    }

    /// Horner evaluation at `x`.
    pub fn eval(&self, x: &BigInt) -> BigInt {
        self.coeffs
            .iter()
            .rev()
            .fold(BigInt::zero(), |acc, c| acc * x + c)
    }

    /// `self += y * z` without building the product separately.
    pub fn add_mul(&mut self, y: &Self, z: &Self, sign: bool) {
        if y.is_zero() || z.is_zero() {
            return;
        }
        let len = max(self.coeffs.len(), y.coeffs.len() + z.coeffs.len() - 1);
        self.coeffs.resize(len, BigInt::zero());
        for (i, a) in y.coeffs.iter().enumerate() {
            for (j, b) in z.coeffs.iter().enumerate() {
                if sign {
                    self.coeffs[i + j] += a * b;
                } else {
                    self.coeffs[i + j] -= a * b;
                }
            }
        }
        self.trim();
    }

    pub fn to_str_radix(&self, radix: u32) -> String {
        if self.is_zero() {
            return "0".to_string();
        }

        let mut out = String::new();
        for (i, c) in self.coeffs.iter().enumerate().rev().filter(|(_, c)| !c.is_zero()) {
            let sign = if c.is_negative() { "-" } else { "+" };
            if !out.is_empty() || c.is_negative() {
                out.push_str(sign);
            }
            let magnitude = c.abs();
            let digits = magnitude.to_str_radix(radix);
            match (i, magnitude.is_one()) {
                (0, _) => out.push_str(&digits),
                (1, true) => out.push('x'),
                (1, false) => out.push_str(&format!("{digits}*x")),
                (_, true) => out.push_str(&format!("x^{i}")),
                (_, false) => out.push_str(&format!("{digits}*x^{i}")),
            }
        }
        out
    }
}

impl std::fmt::Display for Poly {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_str_radix(10))
    }
}

fn poly_binary(dest: &mut Number, args: &[Src<'_, Number>], f: fn(&Poly, &Poly) -> Poly) -> Result<(), NumError> {
    let value = f(args[0].get(dest).as_poly()?, args[1].get(dest).as_poly()?);
    *dest = Number::Poly(value);
    Ok(())
}

fn poly_plus(dest: &mut Number, args: &[Src<'_, Number>], _: &mut [Number]) -> Result<(), NumError> {
    poly_binary(dest, args, Poly::add)
}

fn poly_minus(dest: &mut Number, args: &[Src<'_, Number>], _: &mut [Number]) -> Result<(), NumError> {
    poly_binary(dest, args, Poly::sub)
}

fn poly_times(dest: &mut Number, args: &[Src<'_, Number>], _: &mut [Number]) -> Result<(), NumError> {
    poly_binary(dest, args, Poly::mul)
}

fn poly_negate(dest: &mut Number, args: &[Src<'_, Number>], _: &mut [Number]) -> Result<(), NumError> {
    let value = args[0].get(dest).as_poly()?.neg();
    *dest = Number::Poly(value);
    Ok(())
}

fn poly_scale(dest: &mut Number, args: &[Src<'_, Number>], _: &mut [Number]) -> Result<(), NumError> {
    let value = args[0].get(dest).as_poly()?.scale(args[1].get(dest).as_integer()?);
    *dest = Number::Poly(value);
    Ok(())
}

fn poly_divided_by(dest: &mut Number, args: &[Src<'_, Number>], _: &mut [Number]) -> Result<(), NumError> {
    let value = args[0].get(dest).as_poly()?.div_exact(args[1].get(dest).as_integer()?)?;
    *dest = Number::Poly(value);
    Ok(())
}

fn poly_derivative(dest: &mut Number, args: &[Src<'_, Number>], _: &mut [Number]) -> Result<(), NumError> {
    let value = args[0].get(dest).as_poly()?.derivative();
    *dest = Number::Poly(value);
    Ok(())
}

fn poly_eval(dest: &mut Number, args: &[Src<'_, Number>], _: &mut [Number]) -> Result<(), NumError> {
    let value = args[0].get(dest).as_poly()?.eval(args[1].get(dest).as_integer()?);
    *dest = Number::Integer(value);
    Ok(())
}

fn poly_accumulate(acc: &mut Number, y: Src<'_, Number>, z: Src<'_, Number>, sign: bool) -> Result<(), NumError> {
    if y.is_dest() || z.is_dest() {
        let (y, z) = (y.get(acc).as_poly()?.clone(), z.get(acc).as_poly()?.clone());
        return poly_accumulate(acc, Src::Val(&Number::Poly(y)), Src::Val(&Number::Poly(z)), sign);
    }
    let (Src::Val(y), Src::Val(z)) = (y, z) else {
        unreachable!("destination operands were copied above");
    };
    match acc {
        Number::Poly(acc) => {
            acc.add_mul(y.as_poly()?, z.as_poly()?, sign);
            Ok(())
        }
        other => Err(NumError::conversion(other.kind(), "poly")),
    }
}

fn poly_addmul(acc: &mut Number, y: Src<'_, Number>, z: Src<'_, Number>, _: &mut [Number]) -> Result<(), NumError> {
    poly_accumulate(acc, y, z, true)
}

fn poly_submul(acc: &mut Number, y: Src<'_, Number>, z: Src<'_, Number>, _: &mut [Number]) -> Result<(), NumError> {
    poly_accumulate(acc, y, z, false)
}

fn integer_to_poly(dest: &mut Number, src: &Number) -> Result<(), NumError> {
    *dest = Number::Poly(Poly::constant(src.as_integer()?.clone()));
    Ok(())
}

pub(crate) fn register(rules: RuleTableBuilder<Num>) -> RuleTableBuilder<Num> {
    let (integer, poly) = (Kind::Integer, Kind::Poly);

    rules
        .rule(Rule::binary(BinaryOp::Plus, [poly, poly], poly, poly_plus))
        .rule(Rule::binary(BinaryOp::Minus, [poly, poly], poly, poly_minus))
        .rule(Rule::binary(BinaryOp::Times, [poly, poly], poly, poly_times))
        .rule(Rule::unary(UnaryOp::Negate, poly, poly, poly_negate))
        .rule(Rule::binary(BinaryOp::Times, [poly, integer], poly, poly_scale).commutative())
        .rule(Rule::binary(BinaryOp::DividedBy, [poly, integer], poly, poly_divided_by))
        .rule(Rule::unary(UnaryOp::Named("derivative".into()), poly, poly, poly_derivative))
        .rule(Rule::binary(BinaryOp::Named("eval".into()), [poly, integer], integer, poly_eval))
        .fused(FusedRule::new(TernaryOp::FusedPlusTimes, [poly, poly, poly], poly_addmul))
        .fused(FusedRule::new(TernaryOp::FusedMinusTimes, [poly, poly, poly], poly_submul))
        .assignment(AssignRule::new(poly, integer, integer_to_poly))
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    fn poly(coeffs: &[i64]) -> Poly {
        Poly::new(coeffs.iter().copied().map(BigInt::from).collect())
    }

    #[rstest]
    #[case::zero(&[], "0")]
    #[case::constant(&[-3], "-3")]
    #[case::linear(&[1, 1], "x+1")]
    #[case::mixed(&[-1, 0, 2, -1], "-x^3+2*x^2-1")]
    fn test_display(#[case] coeffs: &[i64], #[case] expected: &str) {
        assert_eq!(poly(coeffs).to_string(), expected);
    }

    #[test]
    fn test_trailing_zeros_are_trimmed() {
        assert_eq!(poly(&[1, 2, 0, 0]).degree(), Some(1));
        assert_eq!(poly(&[0, 0]).degree(), None);
        assert!(poly(&[1, 1]).sub(&poly(&[1, 1])).is_zero());
    }

    #[test]
    fn test_arithmetic() {
        let (p, q) = (poly(&[1, 1]), poly(&[-1, 1]));
        assert_eq!(p.mul(&q), poly(&[-1, 0, 1]));
        assert_eq!(p.add(&q), poly(&[0, 2]));
        assert_eq!(poly(&[5, 3, 1]).derivative(), poly(&[3, 2]));
        assert_eq!(poly(&[1, 2, 3]).eval(&BigInt::from(2)), BigInt::from(17));
    }

    #[test]
    fn test_add_mul_matches_product() {
        let (x, y, z) = (poly(&[1]), poly(&[1, 1]), poly(&[2, 0, 1]));
        let mut acc = x.clone();
        acc.add_mul(&y, &z, true);
        assert_eq!(acc, x.add(&y.mul(&z)));

        let mut acc = x.clone();
        acc.add_mul(&y, &z, false);
        assert_eq!(acc, x.sub(&y.mul(&z)));
    }

    #[test]
    fn test_inexact_division() {
        assert_eq!(poly(&[2, 4]).div_exact(&BigInt::from(2)).unwrap(), poly(&[1, 2]));
        assert!(matches!(poly(&[2, 3]).div_exact(&BigInt::from(2)), Err(NumError::NotInvertible(_))));
        assert_eq!(poly(&[2]).div_exact(&BigInt::zero()), Err(NumError::DivisionByZero));
    }
}
