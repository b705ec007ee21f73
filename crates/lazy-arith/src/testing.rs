//! A small machine-integer backend for exercising the engine.
//!
//! `Int` values fuse and convert into `Wide`, `Wide` has no fused rules and
//! `Flag` has no arithmetic at all.

use std::{cmp::Ordering, fmt, sync::LazyLock};

use smallvec::{SmallVec, smallvec};
use thiserror::Error;

use crate::{
    backend::{Backend, FromValue, Src},
    operation::{BinaryOp, TernaryOp, UnaryOp},
    rules::{AssignRule, FusedRule, Rule, RuleTable, TupleRule},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum TestKind {
    Int,
    Wide,
    Flag,
}

impl fmt::Display for TestKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TestKind::Int => write!(f, "int"),
            TestKind::Wide => write!(f, "wide"),
            TestKind::Flag => write!(f, "flag"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum TestValue {
    Int(i64),
    Wide(i128),
    Flag(bool),
}

#[derive(Error, Debug, Clone, PartialEq)]
pub(crate) enum TestError {
    #[error("Divided by 0")]
    DivisionByZero,
    #[error("Expected {0}")]
    Kind(TestKind),
}

#[derive(Debug)]
pub(crate) struct Ints;

fn int(value: &TestValue) -> Result<i64, TestError> {
    match value {
        TestValue::Int(n) => Ok(*n),
        _ => Err(TestError::Kind(TestKind::Int)),
    }
}

fn wide(value: &TestValue) -> Result<i128, TestError> {
    match value {
        TestValue::Int(n) => Ok(i128::from(*n)),
        TestValue::Wide(n) => Ok(*n),
        TestValue::Flag(_) => Err(TestError::Kind(TestKind::Wide)),
    }
}

fn int_binary(dest: &mut TestValue, args: &[Src<'_, TestValue>], f: fn(i64, i64) -> Result<i64, TestError>) -> Result<(), TestError> {
    let value = f(int(args[0].get(dest))?, int(args[1].get(dest))?)?;
    *dest = TestValue::Int(value);
    Ok(())
}

fn wide_binary(dest: &mut TestValue, args: &[Src<'_, TestValue>], f: fn(i128, i128) -> i128) -> Result<(), TestError> {
    let value = f(wide(args[0].get(dest))?, wide(args[1].get(dest))?);
    *dest = TestValue::Wide(value);
    Ok(())
}

pub(crate) fn int_plus(dest: &mut TestValue, args: &[Src<'_, TestValue>], _: &mut [TestValue]) -> Result<(), TestError> {
    int_binary(dest, args, |a, b| Ok(a + b))
}

fn int_minus(dest: &mut TestValue, args: &[Src<'_, TestValue>], _: &mut [TestValue]) -> Result<(), TestError> {
    int_binary(dest, args, |a, b| Ok(a - b))
}

fn int_times(dest: &mut TestValue, args: &[Src<'_, TestValue>], _: &mut [TestValue]) -> Result<(), TestError> {
    int_binary(dest, args, |a, b| Ok(a * b))
}

fn int_divided_by(dest: &mut TestValue, args: &[Src<'_, TestValue>], _: &mut [TestValue]) -> Result<(), TestError> {
    int_binary(dest, args, |a, b| {
        if b == 0 {
            Err(TestError::DivisionByZero)
        } else {
            Ok(a.div_euclid(b))
        }
    })
}

fn int_modulo(dest: &mut TestValue, args: &[Src<'_, TestValue>], _: &mut [TestValue]) -> Result<(), TestError> {
    int_binary(dest, args, |a, b| {
        if b == 0 {
            Err(TestError::DivisionByZero)
        } else {
            Ok(a.rem_euclid(b))
        }
    })
}

fn int_negate(dest: &mut TestValue, args: &[Src<'_, TestValue>], _: &mut [TestValue]) -> Result<(), TestError> {
    let value = int(args[0].get(dest))?;
    *dest = TestValue::Int(-value);
    Ok(())
}

/// Builds the product in the declared scratch slot and swaps it out.
fn int_fac(dest: &mut TestValue, args: &[Src<'_, TestValue>], scratch: &mut [TestValue]) -> Result<(), TestError> {
    let n = int(args[0].get(dest))?;
    let acc = &mut scratch[0];
    *acc = TestValue::Int(1);
    for i in 2..=n {
        *acc = TestValue::Int(int(acc)? * i);
    }
    std::mem::swap(dest, acc);
    Ok(())
}

fn wide_plus(dest: &mut TestValue, args: &[Src<'_, TestValue>], _: &mut [TestValue]) -> Result<(), TestError> {
    wide_binary(dest, args, |a, b| a + b)
}

fn wide_minus(dest: &mut TestValue, args: &[Src<'_, TestValue>], _: &mut [TestValue]) -> Result<(), TestError> {
    wide_binary(dest, args, |a, b| a - b)
}

fn wide_times(dest: &mut TestValue, args: &[Src<'_, TestValue>], _: &mut [TestValue]) -> Result<(), TestError> {
    wide_binary(dest, args, |a, b| a * b)
}

fn int_addmul(acc: &mut TestValue, y: Src<'_, TestValue>, z: Src<'_, TestValue>, _: &mut [TestValue]) -> Result<(), TestError> {
    let product = int(y.get(acc))? * int(z.get(acc))?;
    *acc = TestValue::Int(int(acc)? + product);
    Ok(())
}

fn int_submul(acc: &mut TestValue, y: Src<'_, TestValue>, z: Src<'_, TestValue>, _: &mut [TestValue]) -> Result<(), TestError> {
    let product = int(y.get(acc))? * int(z.get(acc))?;
    *acc = TestValue::Int(int(acc)? - product);
    Ok(())
}

fn int_divrem(args: &[&TestValue]) -> Result<SmallVec<[TestValue; 3]>, TestError> {
    let (a, b) = (int(args[0])?, int(args[1])?);
    if b == 0 {
        return Err(TestError::DivisionByZero);
    }
    Ok(smallvec![TestValue::Int(a.div_euclid(b)), TestValue::Int(a.rem_euclid(b))])
}

fn int_to_wide(dest: &mut TestValue, src: &TestValue) -> Result<(), TestError> {
    *dest = TestValue::Wide(wide(src)?);
    Ok(())
}

static RULES: LazyLock<RuleTable<Ints>> = LazyLock::new(|| {
    use TestKind::{Int, Wide};

    RuleTable::builder()
        .rule(Rule::binary(BinaryOp::Plus, [Int, Int], Int, int_plus))
        .rule(Rule::binary(BinaryOp::Minus, [Int, Int], Int, int_minus))
        .rule(Rule::binary(BinaryOp::Times, [Int, Int], Int, int_times))
        .rule(Rule::binary(BinaryOp::DividedBy, [Int, Int], Int, int_divided_by))
        .rule(Rule::binary(BinaryOp::Modulo, [Int, Int], Int, int_modulo))
        .rule(Rule::unary(UnaryOp::Negate, Int, Int, int_negate))
        .rule(Rule::unary(UnaryOp::Named("fac".into()), Int, Int, int_fac).with_scratch([Int]))
        .rule(Rule::binary(BinaryOp::Plus, [Wide, Wide], Wide, wide_plus))
        .rule(Rule::binary(BinaryOp::Minus, [Wide, Wide], Wide, wide_minus))
        .rule(Rule::binary(BinaryOp::Times, [Wide, Wide], Wide, wide_times))
        .rule(Rule::binary(BinaryOp::Plus, [Int, Wide], Wide, wide_plus).commutative())
        .rule(Rule::binary(BinaryOp::Times, [Int, Wide], Wide, wide_times).commutative())
        .fused(FusedRule::new(TernaryOp::FusedPlusTimes, [Int, Int, Int], int_addmul))
        .fused(FusedRule::new(TernaryOp::FusedMinusTimes, [Int, Int, Int], int_submul))
        .tuple(TupleRule::new("divrem", &[Int, Int], &[Int, Int], int_divrem))
        .assignment(AssignRule::new(Wide, Int, int_to_wide))
        .build()
        .expect("test rule table")
});

impl Backend for Ints {
    type Value = TestValue;
    type Kind = TestKind;
    type Error = TestError;

    fn kind_of(value: &TestValue) -> TestKind {
        match value {
            TestValue::Int(_) => TestKind::Int,
            TestValue::Wide(_) => TestKind::Wide,
            TestValue::Flag(_) => TestKind::Flag,
        }
    }

    fn scratch(kind: TestKind) -> TestValue {
        match kind {
            TestKind::Int => TestValue::Int(0),
            TestKind::Wide => TestValue::Wide(0),
            TestKind::Flag => TestValue::Flag(false),
        }
    }

    fn rules() -> &'static RuleTable<Self> {
        &RULES
    }

    fn comparable(lhs: TestKind, rhs: TestKind) -> bool {
        lhs != TestKind::Flag && rhs != TestKind::Flag
    }

    fn compare(lhs: &TestValue, rhs: &TestValue) -> Result<Ordering, TestError> {
        Ok(wide(lhs)?.cmp(&wide(rhs)?))
    }

    fn equals(lhs: &TestValue, rhs: &TestValue) -> bool {
        match (wide(lhs), wide(rhs)) {
            (Ok(a), Ok(b)) => a == b,
            _ => lhs == rhs,
        }
    }

    fn to_string_radix(value: &TestValue, base: u32) -> Result<String, TestError> {
        match (value, base) {
            (TestValue::Flag(flag), _) => Ok(flag.to_string()),
            (_, 16) => Ok(format!("{:x}", wide(value)?)),
            _ => Ok(wide(value)?.to_string()),
        }
    }
}

impl FromValue<Ints> for i64 {
    fn from_value(value: &TestValue) -> Result<Self, TestError> {
        int(value)
    }
}

pub(crate) fn val(n: i64) -> TestValue {
    TestValue::Int(n)
}
