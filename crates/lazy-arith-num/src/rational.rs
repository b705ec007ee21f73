//! Rules over rationals, including mixed integer and rational operands.

use lazy_arith::{AssignRule, BinaryOp, FusedRule, Rule, RuleTableBuilder, Src, TernaryOp, UnaryOp};
use num_rational::BigRational;
use num_traits::{Signed, Zero};

use crate::{Num, error::NumError, number::Kind, number::Number};

/// Integers are widened, so one procedure serves pure and mixed operand kinds.
fn rational_binary(
    dest: &mut Number,
    args: &[Src<'_, Number>],
    f: fn(BigRational, BigRational) -> Result<BigRational, NumError>,
) -> Result<(), NumError> {
    let value = f(args[0].get(dest).to_rational()?, args[1].get(dest).to_rational()?)?;
    *dest = Number::Rational(value);
    Ok(())
}

fn rational_plus(dest: &mut Number, args: &[Src<'_, Number>], _: &mut [Number]) -> Result<(), NumError> {
    rational_binary(dest, args, |a, b| Ok(a + b))
}

fn rational_minus(dest: &mut Number, args: &[Src<'_, Number>], _: &mut [Number]) -> Result<(), NumError> {
    rational_binary(dest, args, |a, b| Ok(a - b))
}

fn rational_times(dest: &mut Number, args: &[Src<'_, Number>], _: &mut [Number]) -> Result<(), NumError> {
    rational_binary(dest, args, |a, b| Ok(a * b))
}

fn rational_divided_by(dest: &mut Number, args: &[Src<'_, Number>], _: &mut [Number]) -> Result<(), NumError> {
    rational_binary(dest, args, |a, b| {
        if b.is_zero() {
            Err(NumError::DivisionByZero)
        } else {
            Ok(a / b)
        }
    })
}

fn rational_negate(dest: &mut Number, args: &[Src<'_, Number>], _: &mut [Number]) -> Result<(), NumError> {
    let value = -args[0].get(dest).as_rational()?;
    *dest = Number::Rational(value);
    Ok(())
}

fn rational_abs(dest: &mut Number, args: &[Src<'_, Number>], _: &mut [Number]) -> Result<(), NumError> {
    let value = args[0].get(dest).as_rational()?.abs();
    *dest = Number::Rational(value);
    Ok(())
}

fn rational_accumulate(acc: &mut Number, y: Src<'_, Number>, z: Src<'_, Number>, sign: bool) -> Result<(), NumError> {
    let product = y.get(acc).as_rational()? * z.get(acc).as_rational()?;
    match acc {
        Number::Rational(q) if sign => *q += product,
        Number::Rational(q) => *q -= product,
        other => return Err(NumError::conversion(other.kind(), "rational")),
    }
    Ok(())
}

fn rational_addmul(acc: &mut Number, y: Src<'_, Number>, z: Src<'_, Number>, _: &mut [Number]) -> Result<(), NumError> {
    rational_accumulate(acc, y, z, true)
}

fn rational_submul(acc: &mut Number, y: Src<'_, Number>, z: Src<'_, Number>, _: &mut [Number]) -> Result<(), NumError> {
    rational_accumulate(acc, y, z, false)
}

fn integer_to_rational(dest: &mut Number, src: &Number) -> Result<(), NumError> {
    *dest = Number::Rational(src.to_rational()?);
    Ok(())
}

pub(crate) fn register(rules: RuleTableBuilder<Num>) -> RuleTableBuilder<Num> {
    let (int, rat) = (Kind::Integer, Kind::Rational);

    rules
        .rule(Rule::binary(BinaryOp::Plus, [rat, rat], rat, rational_plus))
        .rule(Rule::binary(BinaryOp::Minus, [rat, rat], rat, rational_minus))
        .rule(Rule::binary(BinaryOp::Times, [rat, rat], rat, rational_times))
        .rule(Rule::binary(BinaryOp::DividedBy, [rat, rat], rat, rational_divided_by))
        .rule(Rule::unary(UnaryOp::Negate, rat, rat, rational_negate))
        .rule(Rule::unary(UnaryOp::Named("abs".into()), rat, rat, rational_abs))
        .rule(Rule::binary(BinaryOp::Plus, [rat, int], rat, rational_plus).commutative())
        .rule(Rule::binary(BinaryOp::Times, [rat, int], rat, rational_times).commutative())
        .rule(Rule::binary(BinaryOp::Minus, [rat, int], rat, rational_minus))
        .rule(Rule::binary(BinaryOp::Minus, [int, rat], rat, rational_minus))
        .rule(Rule::binary(BinaryOp::DividedBy, [rat, int], rat, rational_divided_by))
        .rule(Rule::binary(BinaryOp::DividedBy, [int, rat], rat, rational_divided_by))
        .fused(FusedRule::new(TernaryOp::FusedPlusTimes, [rat, rat, rat], rational_addmul))
        .fused(FusedRule::new(TernaryOp::FusedMinusTimes, [rat, rat, rat], rational_submul))
        .assignment(AssignRule::new(rat, int, integer_to_rational))
}
