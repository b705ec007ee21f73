//! Rules over arbitrary-precision integers.
//!
//! Division and remainder round toward negative infinity, the remainder of
//! `a % m` always lies in `[0, |m|)`.

use lazy_arith::{BinaryOp, FusedRule, Rule, RuleTableBuilder, Src, TernaryOp, TupleRule, UnaryOp};
use num_bigint::BigInt;
use num_integer::Integer;
use num_traits::{One, Signed, ToPrimitive, Zero};
use smallvec::{SmallVec, smallvec};

use crate::{Num, error::NumError, number::Kind, number::Number};

/// Largest shift amount and factorial argument accepted.
const MAX_EXPONENT: u64 = 1 << 24;

fn small(n: &BigInt, op: &'static str) -> Result<u64, NumError> {
    if n.is_negative() {
        return Err(NumError::domain(op, n));
    }
    n.to_u64()
        .filter(|&n| n <= MAX_EXPONENT)
        .ok_or_else(|| NumError::Overflow(format!("{op}({n})")))
}

fn integer_unary(dest: &mut Number, args: &[Src<'_, Number>], f: impl FnOnce(&BigInt) -> Result<BigInt, NumError>) -> Result<(), NumError> {
    let value = f(args[0].get(dest).as_integer()?)?;
    *dest = Number::Integer(value);
    Ok(())
}

fn integer_binary(
    dest: &mut Number,
    args: &[Src<'_, Number>],
    f: impl FnOnce(&BigInt, &BigInt) -> Result<BigInt, NumError>,
) -> Result<(), NumError> {
    let value = f(args[0].get(dest).as_integer()?, args[1].get(dest).as_integer()?)?;
    *dest = Number::Integer(value);
    Ok(())
}

fn integer_plus(dest: &mut Number, args: &[Src<'_, Number>], _: &mut [Number]) -> Result<(), NumError> {
    integer_binary(dest, args, |a, b| Ok(a + b))
}

fn integer_minus(dest: &mut Number, args: &[Src<'_, Number>], _: &mut [Number]) -> Result<(), NumError> {
    integer_binary(dest, args, |a, b| Ok(a - b))
}

fn integer_times(dest: &mut Number, args: &[Src<'_, Number>], _: &mut [Number]) -> Result<(), NumError> {
    integer_binary(dest, args, |a, b| Ok(a * b))
}

fn integer_divided_by(dest: &mut Number, args: &[Src<'_, Number>], _: &mut [Number]) -> Result<(), NumError> {
    integer_binary(dest, args, |a, b| {
        if b.is_zero() {
            Err(NumError::DivisionByZero)
        } else {
            Ok(a.div_floor(b))
        }
    })
}

fn integer_modulo(dest: &mut Number, args: &[Src<'_, Number>], _: &mut [Number]) -> Result<(), NumError> {
    integer_binary(dest, args, |a, m| {
        if m.is_zero() {
            Err(NumError::DivisionByZero)
        } else {
            Ok(a.mod_floor(&m.abs()))
        }
    })
}

fn integer_shift(dest: &mut Number, args: &[Src<'_, Number>], _: &mut [Number]) -> Result<(), NumError> {
    integer_binary(dest, args, |a, n| {
        if n.is_negative() {
            return Err(NumError::NegativeShift(n.to_string()));
        }
        let n = small(n, "shift")?;
        Ok(a << n)
    })
}

fn integer_negate(dest: &mut Number, args: &[Src<'_, Number>], _: &mut [Number]) -> Result<(), NumError> {
    integer_unary(dest, args, |a| Ok(-a))
}

fn integer_abs(dest: &mut Number, args: &[Src<'_, Number>], _: &mut [Number]) -> Result<(), NumError> {
    integer_unary(dest, args, |a| Ok(a.abs()))
}

/// Accumulates in the scratch slot so the argument stays readable when it is
/// the destination itself.
fn integer_fac(dest: &mut Number, args: &[Src<'_, Number>], scratch: &mut [Number]) -> Result<(), NumError> {
    let n = small(args[0].get(dest).as_integer()?, "fac")?;
    let acc = (2..=n).fold(BigInt::one(), |acc, i| acc * i);
    scratch[0] = Number::Integer(acc);
    std::mem::swap(dest, &mut scratch[0]);
    Ok(())
}

fn integer_fib(dest: &mut Number, args: &[Src<'_, Number>], scratch: &mut [Number]) -> Result<(), NumError> {
    let n = small(args[0].get(dest).as_integer()?, "fib")?;
    let (mut a, mut b) = (BigInt::zero(), BigInt::one());
    for _ in 0..n {
        let next = &a + &b;
        a = std::mem::replace(&mut b, next);
    }
    scratch[0] = Number::Integer(a);
    std::mem::swap(dest, &mut scratch[0]);
    Ok(())
}

/// Rising factorial `x (x+1) ... (x+n-1)`.
fn integer_rfac(dest: &mut Number, args: &[Src<'_, Number>], _: &mut [Number]) -> Result<(), NumError> {
    integer_binary(dest, args, |x, n| {
        let n = small(n, "rfac")?;
        Ok((0..n).fold(BigInt::one(), |acc, i| acc * (x + i)))
    })
}

fn integer_pow(dest: &mut Number, args: &[Src<'_, Number>], _: &mut [Number]) -> Result<(), NumError> {
    integer_binary(dest, args, |a, n| {
        let n = small(n, "pow")?;
        Ok(a.pow(n as u32))
    })
}

fn integer_sqrt(dest: &mut Number, args: &[Src<'_, Number>], _: &mut [Number]) -> Result<(), NumError> {
    integer_unary(dest, args, |a| {
        if a.is_negative() {
            Err(NumError::domain("sqrt", a))
        } else {
            Ok(a.sqrt())
        }
    })
}

fn integer_gcd(dest: &mut Number, args: &[Src<'_, Number>], _: &mut [Number]) -> Result<(), NumError> {
    integer_binary(dest, args, |a, b| Ok(a.gcd(b)))
}

fn integer_lcm(dest: &mut Number, args: &[Src<'_, Number>], _: &mut [Number]) -> Result<(), NumError> {
    integer_binary(dest, args, |a, b| Ok(a.lcm(b)))
}

fn integer_bin(dest: &mut Number, args: &[Src<'_, Number>], _: &mut [Number]) -> Result<(), NumError> {
    integer_binary(dest, args, |n, k| {
        if n.is_negative() {
            return Err(NumError::domain("bin", n));
        }
        if k.is_negative() || k > n {
            return Ok(BigInt::zero());
        }
        let k = small(k, "bin")?;
        Ok((0..k).fold(BigInt::one(), |acc, i| acc * (n - i) / (i + 1)))
    })
}

fn integer_accumulate(acc: &mut Number, y: Src<'_, Number>, z: Src<'_, Number>, sign: bool) -> Result<(), NumError> {
    let product = y.get(acc).as_integer()? * z.get(acc).as_integer()?;
    match acc {
        Number::Integer(n) if sign => *n += product,
        Number::Integer(n) => *n -= product,
        other => return Err(NumError::conversion(other.kind(), "integer")),
    }
    Ok(())
}

fn integer_addmul(acc: &mut Number, y: Src<'_, Number>, z: Src<'_, Number>, _: &mut [Number]) -> Result<(), NumError> {
    integer_accumulate(acc, y, z, true)
}

fn integer_submul(acc: &mut Number, y: Src<'_, Number>, z: Src<'_, Number>, _: &mut [Number]) -> Result<(), NumError> {
    integer_accumulate(acc, y, z, false)
}

fn integer_fdiv_qr(args: &[&Number]) -> Result<SmallVec<[Number; 3]>, NumError> {
    let (a, b) = (args[0].as_integer()?, args[1].as_integer()?);
    if b.is_zero() {
        return Err(NumError::DivisionByZero);
    }
    let (q, r) = a.div_mod_floor(b);
    Ok(smallvec![Number::Integer(q), Number::Integer(r)])
}

/// `(g, s, t)` with `g = gcd(a, b) = s*a + t*b`.
fn integer_xgcd(args: &[&Number]) -> Result<SmallVec<[Number; 3]>, NumError> {
    let (a, b) = (args[0].as_integer()?, args[1].as_integer()?);
    let gcd = a.extended_gcd(b);
    Ok(smallvec![Number::Integer(gcd.gcd), Number::Integer(gcd.x), Number::Integer(gcd.y)])
}

fn integer_sqrtrem(args: &[&Number]) -> Result<SmallVec<[Number; 3]>, NumError> {
    let a = args[0].as_integer()?;
    if a.is_negative() {
        return Err(NumError::domain("sqrtrem", a));
    }
    let s = a.sqrt();
    let r = a - &s * &s;
    Ok(smallvec![Number::Integer(s), Number::Integer(r)])
}

pub(crate) fn register(rules: RuleTableBuilder<Num>) -> RuleTableBuilder<Num> {
    let int = Kind::Integer;
    let named = |name: &str| UnaryOp::Named(name.into());
    let named2 = |name: &str| BinaryOp::Named(name.into());

    rules
        .rule(Rule::binary(BinaryOp::Plus, [int, int], int, integer_plus))
        .rule(Rule::binary(BinaryOp::Minus, [int, int], int, integer_minus))
        .rule(Rule::binary(BinaryOp::Times, [int, int], int, integer_times))
        .rule(Rule::binary(BinaryOp::DividedBy, [int, int], int, integer_divided_by))
        .rule(Rule::binary(BinaryOp::Modulo, [int, int], int, integer_modulo))
        .rule(Rule::binary(BinaryOp::Shift, [int, int], int, integer_shift))
        .rule(Rule::unary(UnaryOp::Negate, int, int, integer_negate))
        .rule(Rule::unary(named("abs"), int, int, integer_abs))
        .rule(Rule::unary(named("fac"), int, int, integer_fac).with_scratch([int]))
        .rule(Rule::unary(named("fib"), int, int, integer_fib).with_scratch([int]))
        .rule(Rule::unary(named("sqrt"), int, int, integer_sqrt))
        .rule(Rule::binary(named2("rfac"), [int, int], int, integer_rfac))
        .rule(Rule::binary(named2("pow"), [int, int], int, integer_pow))
        .rule(Rule::binary(named2("gcd"), [int, int], int, integer_gcd))
        .rule(Rule::binary(named2("lcm"), [int, int], int, integer_lcm))
        .rule(Rule::binary(named2("bin"), [int, int], int, integer_bin))
        .fused(FusedRule::new(TernaryOp::FusedPlusTimes, [int, int, int], integer_addmul))
        .fused(FusedRule::new(TernaryOp::FusedMinusTimes, [int, int, int], integer_submul))
        .tuple(TupleRule::new("fdiv_qr", &[int, int], &[int, int], integer_fdiv_qr))
        .tuple(TupleRule::new("xgcd", &[int, int], &[int, int, int], integer_xgcd))
        .tuple(TupleRule::new("sqrtrem", &[int], &[int, int], integer_sqrtrem))
}
