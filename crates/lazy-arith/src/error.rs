use std::fmt;

use itertools::Itertools;
use smallvec::SmallVec;
use thiserror::Error;

use crate::operation::Operation;

/// Operand kinds of a rule lookup, inline for every arity the crate builds.
pub type Kinds<K> = SmallVec<[K; 3]>;

/// A tree shape that no registered rule can evaluate.
///
/// Shape errors are raised while an expression is built or planned, always
/// before the first backend call of an evaluation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ShapeError<K: Copy + fmt::Debug + fmt::Display> {
    #[error("No rule for \"{op}\" with operands ({})", .kinds.iter().join(", "))]
    NoRule { op: Operation, kinds: Kinds<K> },
    #[error("Cannot assign {from} to {to}")]
    NoAssignment { to: K, from: K },
    #[error("Cannot compare {lhs} with {rhs}")]
    NoComparison { lhs: K, rhs: K },
    #[error("Destination placeholder used without a destination")]
    UnboundTarget,
    #[error("Destination placeholder of kind {placeholder} used with a {dest} destination")]
    TargetMismatch { placeholder: K, dest: K },
    #[error("Invalid number of operands for \"{op}\", expected {expected}, got {got}")]
    ArityMismatch {
        op: Operation,
        expected: usize,
        got: usize,
    },
    #[error("Component {index} is out of range for \"{op}\"")]
    ComponentOutOfRange { op: Operation, index: usize },
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError<K: Copy + fmt::Debug + fmt::Display> {
    #[error("Ambiguous rules for \"{op}\" with operands ({})", .kinds.iter().join(", "))]
    Ambiguous { op: Operation, kinds: Kinds<K> },
}

/// Failure of an evaluation call.
///
/// Backend errors are passed through untouched, the engine adds no context.
#[derive(Error, Debug, PartialEq)]
pub enum Error<K, E>
where
    K: Copy + fmt::Debug + fmt::Display,
    E: std::error::Error + 'static,
{
    #[error(transparent)]
    Shape(#[from] ShapeError<K>),
    #[error(transparent)]
    Backend(E),
}

impl<K, E> Error<K, E>
where
    K: Copy + fmt::Debug + fmt::Display,
    E: std::error::Error + 'static,
{
    pub fn is_shape(&self) -> bool {
        matches!(self, Self::Shape(_))
    }

    #[cold]
    pub fn backend(&self) -> Option<&E> {
        match self {
            Self::Backend(err) => Some(err),
            Self::Shape(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;
    use smallvec::smallvec;

    use super::*;
    use crate::operation::BinaryOp;

    #[rstest]
    #[case::no_rule(
        ShapeError::NoRule { op: Operation::Binary(BinaryOp::Times), kinds: smallvec!["matrix", "poly"] },
        "No rule for \"*\" with operands (matrix, poly)"
    )]
    #[case::no_assignment(ShapeError::NoAssignment { to: "integer", from: "matrix" }, "Cannot assign matrix to integer")]
    #[case::unbound(ShapeError::UnboundTarget, "Destination placeholder used without a destination")]
    #[case::target_mismatch(
        ShapeError::TargetMismatch { placeholder: "integer", dest: "rational" },
        "Destination placeholder of kind integer used with a rational destination"
    )]
    fn test_shape_error_display(#[case] err: ShapeError<&'static str>, #[case] expected: &str) {
        assert_eq!(err.to_string(), expected);
    }

    #[test]
    fn test_backend_error_is_transparent() {
        let err: Error<&'static str, std::fmt::Error> = Error::Backend(std::fmt::Error);
        assert_eq!(err.to_string(), std::fmt::Error.to_string());
        assert!(!err.is_shape());
        assert!(err.backend().is_some());
    }
}
