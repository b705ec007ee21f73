//! Operation tags carried by expression nodes and rule keys.
//!
//! Each arity has a closed set of built-in operations. Domain specific
//! operations (`fac`, `gcd`, `transpose`, ...) are added through the `Named`
//! variants and registered exactly like the built-in ones.

use std::fmt;

use smol_str::SmolStr;

pub type OpName = SmolStr;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum UnaryOp {
    Negate,
    Named(OpName),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    Plus,
    Minus,
    Times,
    DividedBy,
    Modulo,
    Shift,
    Named(OpName),
}

/// Fused accumulate operations, `x ± y*z` in a single backend call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TernaryOp {
    FusedPlusTimes,
    FusedMinusTimes,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Operation {
    Immediate,
    Unary(UnaryOp),
    Binary(BinaryOp),
    Ternary(TernaryOp),
    Tuple(OpName),
}

impl BinaryOp {
    /// The fused operation a `x op y*z` node can be rewritten to.
    pub fn fused(&self) -> Option<TernaryOp> {
        match self {
            BinaryOp::Plus => Some(TernaryOp::FusedPlusTimes),
            BinaryOp::Minus => Some(TernaryOp::FusedMinusTimes),
            _ => None,
        }
    }
}

impl Operation {
    pub fn named(name: &str, arity: usize) -> Self {
        match arity {
            1 => Operation::Unary(UnaryOp::Named(name.into())),
            _ => Operation::Binary(BinaryOp::Named(name.into())),
        }
    }

    /// Number of operands, `None` for tuple operations whose arity is set by their rule.
    pub fn arity(&self) -> Option<usize> {
        match self {
            Operation::Immediate => Some(0),
            Operation::Unary(_) => Some(1),
            Operation::Binary(_) => Some(2),
            Operation::Ternary(_) => Some(3),
            Operation::Tuple(_) => None,
        }
    }

    #[inline(always)]
    pub fn is_times(&self) -> bool {
        matches!(self, Operation::Binary(BinaryOp::Times))
    }
}

impl fmt::Display for UnaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnaryOp::Negate => write!(f, "neg"),
            UnaryOp::Named(name) => write!(f, "{}", name),
        }
    }
}

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BinaryOp::Plus => write!(f, "+"),
            BinaryOp::Minus => write!(f, "-"),
            BinaryOp::Times => write!(f, "*"),
            BinaryOp::DividedBy => write!(f, "/"),
            BinaryOp::Modulo => write!(f, "%"),
            BinaryOp::Shift => write!(f, "<<"),
            BinaryOp::Named(name) => write!(f, "{}", name),
        }
    }
}

impl fmt::Display for TernaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TernaryOp::FusedPlusTimes => write!(f, "addmul"),
            TernaryOp::FusedMinusTimes => write!(f, "submul"),
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::Immediate => write!(f, "immediate"),
            Operation::Unary(op) => write!(f, "{}", op),
            Operation::Binary(op) => write!(f, "{}", op),
            Operation::Ternary(op) => write!(f, "{}", op),
            Operation::Tuple(name) => write!(f, "{}", name),
        }
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case::plus(BinaryOp::Plus, Some(TernaryOp::FusedPlusTimes))]
    #[case::minus(BinaryOp::Minus, Some(TernaryOp::FusedMinusTimes))]
    #[case::times(BinaryOp::Times, None)]
    #[case::named(BinaryOp::Named("gcd".into()), None)]
    fn test_fused(#[case] op: BinaryOp, #[case] expected: Option<TernaryOp>) {
        assert_eq!(op.fused(), expected);
    }

    #[rstest]
    #[case::unary(Operation::named("fac", 1), "fac", Some(1))]
    #[case::binary(Operation::named("gcd", 2), "gcd", Some(2))]
    #[case::shift(Operation::Binary(BinaryOp::Shift), "<<", Some(2))]
    #[case::addmul(Operation::Ternary(TernaryOp::FusedPlusTimes), "addmul", Some(3))]
    #[case::tuple(Operation::Tuple("xgcd".into()), "xgcd", None)]
    fn test_display_and_arity(#[case] op: Operation, #[case] display: &str, #[case] arity: Option<usize>) {
        assert_eq!(op.to_string(), display);
        assert_eq!(op.arity(), arity);
    }
}
