use std::fmt;

use num_bigint::BigInt;
use num_rational::BigRational;
use num_traits::{One, Zero};

use crate::{error::NumError, matrix::Matrix, padic::Padic, poly::Poly};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Kind {
    Integer,
    Rational,
    Poly,
    Matrix,
    Padic,
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Kind::Integer => write!(f, "integer"),
            Kind::Rational => write!(f, "rational"),
            Kind::Poly => write!(f, "poly"),
            Kind::Matrix => write!(f, "matrix"),
            Kind::Padic => write!(f, "padic"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Number {
    Integer(BigInt),
    Rational(BigRational),
    Poly(Poly),
    Matrix(Matrix),
    Padic(Padic),
}

impl Number {
    pub fn int(value: impl Into<BigInt>) -> Self {
        Number::Integer(value.into())
    }

    /// `numer / denom` in lowest terms.
    pub fn rat(numer: impl Into<BigInt>, denom: impl Into<BigInt>) -> Result<Self, NumError> {
        let denom = denom.into();
        if denom.is_zero() {
            return Err(NumError::DivisionByZero);
        }
        Ok(Number::Rational(BigRational::new(numer.into(), denom)))
    }

    /// Polynomial from its coefficients, constant term first.
    pub fn poly<I, T>(coeffs: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<BigInt>,
    {
        Number::Poly(Poly::new(coeffs.into_iter().map(Into::into).collect()))
    }

    /// Row-major matrix.
    pub fn matrix<I, T>(rows: usize, cols: usize, entries: I) -> Result<Self, NumError>
    where
        I: IntoIterator<Item = T>,
        T: Into<BigInt>,
    {
        Matrix::new(rows, cols, entries.into_iter().map(Into::into).collect()).map(Number::Matrix)
    }

    pub fn padic(value: impl Into<BigInt>, prime: impl Into<BigInt>, precision: i64) -> Result<Self, NumError> {
        Padic::new(value.into(), prime.into(), precision).map(Number::Padic)
    }

    pub fn kind(&self) -> Kind {
        match self {
            Number::Integer(_) => Kind::Integer,
            Number::Rational(_) => Kind::Rational,
            Number::Poly(_) => Kind::Poly,
            Number::Matrix(_) => Kind::Matrix,
            Number::Padic(_) => Kind::Padic,
        }
    }

    /// A placeholder of `kind`, overwritten by the first rule writing it.
    pub fn zero(kind: Kind) -> Self {
        match kind {
            Kind::Integer => Number::Integer(BigInt::zero()),
            Kind::Rational => Number::Rational(BigRational::zero()),
            Kind::Poly => Number::Poly(Poly::zero()),
            Kind::Matrix => Number::Matrix(Matrix::empty()),
            Kind::Padic => Number::Padic(Padic::placeholder()),
        }
    }

    pub fn as_integer(&self) -> Result<&BigInt, NumError> {
        match self {
            Number::Integer(n) => Ok(n),
            other => Err(NumError::conversion(other.kind(), "integer")),
        }
    }

    /// Integers are widened, other kinds are rejected.
    pub fn to_rational(&self) -> Result<BigRational, NumError> {
        match self {
            Number::Integer(n) => Ok(BigRational::from_integer(n.clone())),
            Number::Rational(q) => Ok(q.clone()),
            other => Err(NumError::conversion(other.kind(), "rational")),
        }
    }

    pub fn as_rational(&self) -> Result<&BigRational, NumError> {
        match self {
            Number::Rational(q) => Ok(q),
            other => Err(NumError::conversion(other.kind(), "rational")),
        }
    }

    pub fn as_poly(&self) -> Result<&Poly, NumError> {
        match self {
            Number::Poly(p) => Ok(p),
            other => Err(NumError::conversion(other.kind(), "poly")),
        }
    }

    pub fn as_matrix(&self) -> Result<&Matrix, NumError> {
        match self {
            Number::Matrix(m) => Ok(m),
            other => Err(NumError::conversion(other.kind(), "matrix")),
        }
    }

    pub fn as_padic(&self) -> Result<&Padic, NumError> {
        match self {
            Number::Padic(x) => Ok(x),
            other => Err(NumError::conversion(other.kind(), "padic")),
        }
    }

    pub fn to_str_radix(&self, radix: u32) -> Result<String, NumError> {
        if !(2..=36).contains(&radix) {
            return Err(NumError::InvalidRadix(radix));
        }
        Ok(match self {
            Number::Integer(n) => n.to_str_radix(radix),
            Number::Rational(q) => rational_str_radix(q, radix),
            Number::Poly(p) => p.to_str_radix(radix),
            Number::Matrix(m) => m.to_str_radix(radix),
            Number::Padic(x) => x.to_str_radix(radix),
        })
    }
}

fn rational_str_radix(q: &BigRational, radix: u32) -> String {
    if q.denom().is_one() {
        q.numer().to_str_radix(radix)
    } else {
        format!("{}/{}", q.numer().to_str_radix(radix), q.denom().to_str_radix(radix))
    }
}

impl fmt::Display for Number {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = self.to_str_radix(10).map_err(|_| fmt::Error)?;
        f.write_str(&text)
    }
}

impl From<i64> for Number {
    fn from(value: i64) -> Self {
        Number::Integer(BigInt::from(value))
    }
}

impl From<BigInt> for Number {
    fn from(value: BigInt) -> Self {
        Number::Integer(value)
    }
}

impl From<BigRational> for Number {
    fn from(value: BigRational) -> Self {
        Number::Rational(value)
    }
}

impl From<Poly> for Number {
    fn from(value: Poly) -> Self {
        Number::Poly(value)
    }
}

impl From<Matrix> for Number {
    fn from(value: Matrix) -> Self {
        Number::Matrix(value)
    }
}

impl From<Padic> for Number {
    fn from(value: Padic) -> Self {
        Number::Padic(value)
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case::integer(Number::from(-255), 16, "-ff")]
    #[case::rational(Number::rat(3, -6).unwrap(), 10, "-1/2")]
    #[case::whole_rational(Number::rat(8, 4).unwrap(), 10, "2")]
    #[case::binary(Number::rat(5, 3).unwrap(), 2, "101/11")]
    fn test_to_str_radix(#[case] number: Number, #[case] radix: u32, #[case] expected: &str) {
        assert_eq!(number.to_str_radix(radix).unwrap(), expected);
    }

    #[test]
    fn test_invalid_radix() {
        assert_eq!(Number::from(1).to_str_radix(37), Err(NumError::InvalidRadix(37)));
        assert_eq!(Number::from(1).to_str_radix(1), Err(NumError::InvalidRadix(1)));
    }

    #[test]
    fn test_zero_denominator() {
        assert_eq!(Number::rat(1, 0), Err(NumError::DivisionByZero));
    }

    #[rstest]
    #[case::integer(Kind::Integer)]
    #[case::rational(Kind::Rational)]
    #[case::poly(Kind::Poly)]
    #[case::matrix(Kind::Matrix)]
    #[case::padic(Kind::Padic)]
    fn test_zero_has_kind(#[case] kind: Kind) {
        assert_eq!(Number::zero(kind).kind(), kind);
    }

    #[test]
    fn test_accessors_reject_other_kinds() {
        let n = Number::from(3);
        assert_eq!(n.to_rational().unwrap(), BigRational::from_integer(3.into()));
        assert_eq!(
            n.as_poly(),
            Err(NumError::Conversion {
                from: Kind::Integer,
                to: "poly",
            })
        );
    }
}
