use std::{cmp::Ordering, sync::LazyLock};

use lazy_arith::{Backend, FromValue, RuleTable};
use num_bigint::BigInt;
use num_rational::BigRational;
use num_traits::ToPrimitive;
use tracing::debug;

use crate::{
    error::NumError,
    integer, matrix,
    number::{Kind, Number},
    padic, poly, rational,
};

/// The arbitrary-precision backend: integers, rationals, integer polynomials,
/// integer matrices and p-adic numbers.
#[derive(Debug, Clone, Copy, Default)]
pub struct Num;

static RULES: LazyLock<RuleTable<Num>> = LazyLock::new(|| {
    let builder = [integer::register, rational::register, poly::register, matrix::register, padic::register]
        .into_iter()
        .fold(RuleTable::builder(), |builder, register| register(builder));

    match builder.build() {
        Ok(rules) => {
            debug!(rules = rules.len(), "Built numeric rule table");
            rules
        }
        Err(err) => panic!("invalid numeric rule table: {err}"),
    }
});

fn is_numeric(kind: Kind) -> bool {
    matches!(kind, Kind::Integer | Kind::Rational)
}

impl Backend for Num {
    type Value = Number;
    type Kind = Kind;
    type Error = NumError;

    fn kind_of(value: &Number) -> Kind {
        value.kind()
    }

    fn scratch(kind: Kind) -> Number {
        Number::zero(kind)
    }

    fn rules() -> &'static RuleTable<Self> {
        &RULES
    }

    fn comparable(lhs: Kind, rhs: Kind) -> bool {
        is_numeric(lhs) && is_numeric(rhs)
    }

    fn compare(lhs: &Number, rhs: &Number) -> Result<Ordering, NumError> {
        match (lhs, rhs) {
            (Number::Integer(a), Number::Integer(b)) => Ok(a.cmp(b)),
            _ => Ok(lhs.to_rational()?.cmp(&rhs.to_rational()?)),
        }
    }

    /// Integers and rationals compare by value across kinds.
    fn equals(lhs: &Number, rhs: &Number) -> bool {
        match (lhs.to_rational(), rhs.to_rational()) {
            (Ok(a), Ok(b)) => a == b,
            _ => lhs == rhs,
        }
    }

    fn to_string_radix(value: &Number, base: u32) -> Result<String, NumError> {
        value.to_str_radix(base)
    }
}

impl FromValue<Num> for BigInt {
    fn from_value(value: &Number) -> Result<Self, NumError> {
        match value {
            Number::Rational(q) if q.is_integer() => Ok(q.to_integer()),
            _ => value.as_integer().cloned(),
        }
    }
}

impl FromValue<Num> for BigRational {
    fn from_value(value: &Number) -> Result<Self, NumError> {
        value.to_rational()
    }
}

impl FromValue<Num> for i64 {
    fn from_value(value: &Number) -> Result<Self, NumError> {
        let n = BigInt::from_value(value)?;
        n.to_i64().ok_or_else(|| NumError::Overflow(n.to_string()))
    }
}

impl FromValue<Num> for u64 {
    fn from_value(value: &Number) -> Result<Self, NumError> {
        let n = BigInt::from_value(value)?;
        n.to_u64().ok_or_else(|| NumError::Overflow(n.to_string()))
    }
}

impl FromValue<Num> for f64 {
    fn from_value(value: &Number) -> Result<Self, NumError> {
        let q = value.to_rational()?;
        q.to_f64().ok_or_else(|| NumError::conversion(value.kind(), "f64"))
    }
}

impl FromValue<Num> for String {
    fn from_value(value: &Number) -> Result<Self, NumError> {
        value.to_str_radix(10)
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[test]
    fn test_rule_table_builds() {
        assert!(!Num::rules().is_empty());
    }

    #[rstest]
    #[case::integers(Number::from(2), Number::from(3), Ordering::Less)]
    #[case::mixed(Number::rat(7, 2).unwrap(), Number::from(3), Ordering::Greater)]
    #[case::equal(Number::rat(6, 2).unwrap(), Number::from(3), Ordering::Equal)]
    fn test_compare(#[case] lhs: Number, #[case] rhs: Number, #[case] expected: Ordering) {
        assert_eq!(Num::compare(&lhs, &rhs).unwrap(), expected);
    }

    #[test]
    fn test_comparable() {
        assert!(Num::comparable(Kind::Integer, Kind::Rational));
        assert!(!Num::comparable(Kind::Poly, Kind::Integer));
    }

    #[test]
    fn test_equals_across_kinds() {
        assert!(Num::equals(&Number::rat(4, 2).unwrap(), &Number::from(2)));
        assert!(!Num::equals(&Number::poly([2]), &Number::from(2)));
    }

    #[rstest]
    #[case::integer(Number::from(-5), Ok(-5))]
    #[case::whole_rational(Number::rat(10, 5).unwrap(), Ok(2))]
    #[case::fraction(Number::rat(1, 2).unwrap(), Err(NumError::Conversion { from: Kind::Rational, to: "integer" }))]
    #[case::huge(Number::from(BigInt::from(u64::MAX)), Err(NumError::Overflow(u64::MAX.to_string())))]
    fn test_to_i64(#[case] value: Number, #[case] expected: Result<i64, NumError>) {
        assert_eq!(i64::from_value(&value), expected);
    }

    #[test]
    fn test_to_f64() {
        assert_eq!(f64::from_value(&Number::rat(3, 4).unwrap()), Ok(0.75));
    }
}
