//! The contract a numeric backend fulfils for the engine.
//!
//! A backend names its value type, the closed set of value kinds and its
//! error type, and hands out a process-wide [`RuleTable`] describing every
//! operation it implements. The engine never inspects values itself: all
//! arithmetic happens inside rule procedures.

use std::{cmp::Ordering, fmt, hash::Hash};

use crate::rules::RuleTable;

pub trait Backend: Sized + 'static {
    type Value: Clone + fmt::Debug + PartialEq;
    type Kind: Copy + Eq + Hash + fmt::Debug + fmt::Display + 'static;
    type Error: std::error::Error + 'static;

    fn kind_of(value: &Self::Value) -> Self::Kind;

    /// A blank value of `kind` used to pre-populate scratch slots.
    fn scratch(kind: Self::Kind) -> Self::Value;

    fn rules() -> &'static RuleTable<Self>;

    fn comparable(lhs: Self::Kind, rhs: Self::Kind) -> bool;

    /// Three-way comparison; only called for kinds accepted by [`Backend::comparable`].
    fn compare(lhs: &Self::Value, rhs: &Self::Value) -> Result<Ordering, Self::Error>;

    fn equals(lhs: &Self::Value, rhs: &Self::Value) -> bool {
        lhs == rhs
    }

    fn to_string_radix(value: &Self::Value, base: u32) -> Result<String, Self::Error>;
}

/// Where a rule reads one of its operands from.
///
/// `Dest` means the operand already sits in the rule's destination, either
/// because the first operand was evaluated straight into it or because the
/// tree reads the value it is being assigned to. Rules compute their result
/// from the operands before writing the destination, so both cases are safe.
pub enum Src<'v, V> {
    Dest,
    Val(&'v V),
}

impl<'v, V> Src<'v, V> {
    #[inline(always)]
    pub fn get<'s>(self, dest: &'s V) -> &'s V
    where
        'v: 's,
    {
        match self {
            Src::Dest => dest,
            Src::Val(value) => value,
        }
    }

    pub fn is_dest(&self) -> bool {
        matches!(self, Src::Dest)
    }
}

impl<V> Clone for Src<'_, V> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<V> Copy for Src<'_, V> {}

impl<V: fmt::Debug> fmt::Debug for Src<'_, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Src::Dest => write!(f, "Dest"),
            Src::Val(value) => f.debug_tuple("Val").field(value).finish(),
        }
    }
}

/// Conversion of an evaluated value into a plain Rust type.
pub trait FromValue<B: Backend>: Sized {
    fn from_value(value: &B::Value) -> Result<Self, B::Error>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_src_reads_destination() {
        let dest = 10;
        let other = 3;
        assert_eq!(*Src::Dest.get(&dest), 10);
        assert_eq!(*Src::Val(&other).get(&dest), 3);
        assert!(Src::<i64>::Dest.is_dest());
    }
}
