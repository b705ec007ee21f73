use thiserror::Error;

use crate::number::Kind;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NumError {
    #[error("Divided by 0")]
    DivisionByZero,
    #[error("Dimension mismatch: {lhs} and {rhs}")]
    DimensionMismatch { lhs: String, rhs: String },
    #[error("{0} is not invertible")]
    NotInvertible(String),
    #[error("Negative shift amount {0}")]
    NegativeShift(String),
    #[error("{0} is too large")]
    Overflow(String),
    #[error("Prime mismatch: {lhs} and {rhs}")]
    PrimeMismatch { lhs: String, rhs: String },
    #[error("Invalid radix {0}, expected 2..=36")]
    InvalidRadix(u32),
    #[error("Cannot convert {from} to {to}")]
    Conversion { from: Kind, to: &'static str },
    #[error("{op} is undefined for {value}")]
    Domain { op: &'static str, value: String },
}

impl NumError {
    pub(crate) fn domain(op: &'static str, value: impl ToString) -> Self {
        NumError::Domain {
            op,
            value: value.to_string(),
        }
    }

    pub(crate) fn conversion(from: Kind, to: &'static str) -> Self {
        NumError::Conversion { from, to }
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case::division(NumError::DivisionByZero, "Divided by 0")]
    #[case::domain(NumError::domain("sqrt", -4), "sqrt is undefined for -4")]
    #[case::conversion(NumError::conversion(Kind::Matrix, "i64"), "Cannot convert matrix to i64")]
    #[case::radix(NumError::InvalidRadix(40), "Invalid radix 40, expected 2..=36")]
    fn test_display(#[case] err: NumError, #[case] expected: &str) {
        assert_eq!(err.to_string(), expected);
    }
}
