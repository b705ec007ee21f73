//! Dense integer matrices stored row-major.

use itertools::Itertools;
use lazy_arith::{BinaryOp, Rule, RuleTableBuilder, Src, UnaryOp};
use num_bigint::BigInt;
use num_traits::{One, Zero};

use crate::{Num, error::NumError, number::Kind, number::Number};

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Matrix {
    rows: usize,
    cols: usize,
    data: Vec<BigInt>,
}

impl Matrix {
    pub fn new(rows: usize, cols: usize, data: Vec<BigInt>) -> Result<Self, NumError> {
        if data.len() != rows * cols {
            return Err(NumError::DimensionMismatch {
                lhs: format!("{rows}x{cols}"),
                rhs: format!("{} entries", data.len()),
            });
        }
        Ok(Self { rows, cols, data })
    }

    /// The 0x0 matrix.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn identity(n: usize) -> Self {
        let data = (0..n * n)
            .map(|i| if i / n == i % n { BigInt::one() } else { BigInt::zero() })
            .collect();
        Self { rows: n, cols: n, data }
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn get(&self, row: usize, col: usize) -> Option<&BigInt> {
        (row < self.rows && col < self.cols).then(|| &self.data[row * self.cols + col])
    }

    fn shape(&self) -> String {
        format!("{}x{}", self.rows, self.cols)
    }

    fn mismatch(&self, other: &Self) -> NumError {
        NumError::DimensionMismatch {
            lhs: self.shape(),
            rhs: other.shape(),
        }
    }

    fn zip_with(&self, other: &Self, f: impl Fn(&BigInt, &BigInt) -> BigInt) -> Result<Self, NumError> {
        if self.rows != other.rows || self.cols != other.cols {
            return Err(self.mismatch(other));
        }
        Ok(Self {
            rows: self.rows,
            cols: self.cols,
            data: self.data.iter().zip(&other.data).map(|(a, b)| f(a, b)).collect(),
        })
    }

    pub fn add(&self, other: &Self) -> Result<Self, NumError> {
        self.zip_with(other, |a, b| a + b)
    }

    pub fn sub(&self, other: &Self) -> Result<Self, NumError> {
        self.zip_with(other, |a, b| a - b)
    }

    /// `self (m×n) * other (n×p)`.
    pub fn mul(&self, other: &Self) -> Result<Self, NumError> {
        if self.cols != other.rows {
            return Err(self.mismatch(other));
        }
        let (m, n, p) = (self.rows, self.cols, other.cols);
        let data = (0..m)
            .cartesian_product(0..p)
            .map(|(i, j)| {
                (0..n).fold(BigInt::zero(), |sum, k| {
                    sum + &self.data[i * n + k] * &other.data[k * p + j]
                })
            })
            .collect();
        Ok(Self { rows: m, cols: p, data })
    }

    pub fn scale(&self, factor: &BigInt) -> Self {
        Self {
            rows: self.rows,
            cols: self.cols,
            data: self.data.iter().map(|a| a * factor).collect(),
        }
    }

    pub fn neg(&self) -> Self {
        Self {
            rows: self.rows,
            cols: self.cols,
            data: self.data.iter().map(|a| -a).collect(),
        }
    }

    pub fn transpose(&self) -> Self {
        let data = (0..self.cols)
            .cartesian_product(0..self.rows)
            .map(|(j, i)| self.data[i * self.cols + j].clone())
            .collect();
        Self {
            rows: self.cols,
            cols: self.rows,
            data,
        }
    }

    fn require_square(&self, op: &'static str) -> Result<usize, NumError> {
        if self.rows == self.cols {
            Ok(self.rows)
        } else {
            Err(NumError::domain(op, format!("a {} matrix", self.shape())))
        }
    }

    pub fn trace(&self) -> Result<BigInt, NumError> {
        let n = self.require_square("trace")?;
        Ok((0..n).map(|i| &self.data[i * n + i]).sum())
    }

    /// Determinant by fraction-free Gaussian elimination (Bareiss), every
    /// division is exact.
    pub fn det(&self) -> Result<BigInt, NumError> {
        let n = self.require_square("det")?;
        if n == 0 {
            return Ok(BigInt::one());
        }

        let mut a = self.data.clone();
        let mut negate = false;
        let mut previous = BigInt::one();

        for k in 0..n - 1 {
            if a[k * n + k].is_zero() {
                let Some(pivot) = (k + 1..n).find(|&i| !a[i * n + k].is_zero()) else {
                    return Ok(BigInt::zero());
                };
                for j in 0..n {
                    a.swap(k * n + j, pivot * n + j);
                }
                negate = !negate;
            }

            for i in k + 1..n {
                for j in k + 1..n {
                    let value = (&a[i * n + j] * &a[k * n + k] - &a[i * n + k] * &a[k * n + j]) / &previous;
                    a[i * n + j] = value;
                }
            }
            previous = a[k * n + k].clone();
        }

        let det = a[n * n - 1].clone();
        Ok(if negate { -det } else { det })
    }

    pub fn to_str_radix(&self, radix: u32) -> String {
        let rows = self
            .data
            .chunks(self.cols.max(1))
            .take(self.rows)
            .map(|row| format!("[{}]", row.iter().map(|a| a.to_str_radix(radix)).join(", ")))
            .join(", ");
        format!("[{rows}]")
    }
}

impl std::fmt::Display for Matrix {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_str_radix(10))
    }
}

fn matrix_binary(
    dest: &mut Number,
    args: &[Src<'_, Number>],
    f: fn(&Matrix, &Matrix) -> Result<Matrix, NumError>,
) -> Result<(), NumError> {
    let value = f(args[0].get(dest).as_matrix()?, args[1].get(dest).as_matrix()?)?;
    *dest = Number::Matrix(value);
    Ok(())
}

fn matrix_plus(dest: &mut Number, args: &[Src<'_, Number>], _: &mut [Number]) -> Result<(), NumError> {
    matrix_binary(dest, args, Matrix::add)
}

fn matrix_minus(dest: &mut Number, args: &[Src<'_, Number>], _: &mut [Number]) -> Result<(), NumError> {
    matrix_binary(dest, args, Matrix::sub)
}

fn matrix_times(dest: &mut Number, args: &[Src<'_, Number>], _: &mut [Number]) -> Result<(), NumError> {
    matrix_binary(dest, args, Matrix::mul)
}

fn matrix_negate(dest: &mut Number, args: &[Src<'_, Number>], _: &mut [Number]) -> Result<(), NumError> {
    let value = args[0].get(dest).as_matrix()?.neg();
    *dest = Number::Matrix(value);
    Ok(())
}

fn matrix_scale(dest: &mut Number, args: &[Src<'_, Number>], _: &mut [Number]) -> Result<(), NumError> {
    let value = args[0].get(dest).as_matrix()?.scale(args[1].get(dest).as_integer()?);
    *dest = Number::Matrix(value);
    Ok(())
}

fn matrix_transpose(dest: &mut Number, args: &[Src<'_, Number>], _: &mut [Number]) -> Result<(), NumError> {
    let value = args[0].get(dest).as_matrix()?.transpose();
    *dest = Number::Matrix(value);
    Ok(())
}

fn matrix_trace(dest: &mut Number, args: &[Src<'_, Number>], _: &mut [Number]) -> Result<(), NumError> {
    let value = args[0].get(dest).as_matrix()?.trace()?;
    *dest = Number::Integer(value);
    Ok(())
}

fn matrix_det(dest: &mut Number, args: &[Src<'_, Number>], _: &mut [Number]) -> Result<(), NumError> {
    let value = args[0].get(dest).as_matrix()?.det()?;
    *dest = Number::Integer(value);
    Ok(())
}

pub(crate) fn register(rules: RuleTableBuilder<Num>) -> RuleTableBuilder<Num> {
    let (integer, matrix) = (Kind::Integer, Kind::Matrix);

    rules
        .rule(Rule::binary(BinaryOp::Plus, [matrix, matrix], matrix, matrix_plus))
        .rule(Rule::binary(BinaryOp::Minus, [matrix, matrix], matrix, matrix_minus))
        .rule(Rule::binary(BinaryOp::Times, [matrix, matrix], matrix, matrix_times))
        .rule(Rule::unary(UnaryOp::Negate, matrix, matrix, matrix_negate))
        .rule(Rule::binary(BinaryOp::Times, [matrix, integer], matrix, matrix_scale).commutative())
        .rule(Rule::unary(UnaryOp::Named("transpose".into()), matrix, matrix, matrix_transpose))
        .rule(Rule::unary(UnaryOp::Named("trace".into()), matrix, integer, matrix_trace))
        .rule(Rule::unary(UnaryOp::Named("det".into()), matrix, integer, matrix_det))
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    fn matrix(rows: usize, cols: usize, entries: &[i64]) -> Matrix {
        Matrix::new(rows, cols, entries.iter().copied().map(BigInt::from).collect()).unwrap()
    }

    #[test]
    fn test_new_checks_entries() {
        assert!(matches!(
            Matrix::new(2, 2, vec![BigInt::one()]),
            Err(NumError::DimensionMismatch { .. })
        ));
    }

    #[test]
    fn test_mul() {
        let a = matrix(2, 3, &[1, 2, 3, 4, 5, 6]);
        let b = matrix(3, 2, &[7, 8, 9, 10, 11, 12]);
        assert_eq!(a.mul(&b).unwrap(), matrix(2, 2, &[58, 64, 139, 154]));
        assert_eq!(
            a.mul(&a),
            Err(NumError::DimensionMismatch {
                lhs: "2x3".to_string(),
                rhs: "2x3".to_string(),
            })
        );
    }

    #[test]
    fn test_transpose_and_trace() {
        let a = matrix(2, 3, &[1, 2, 3, 4, 5, 6]);
        assert_eq!(a.transpose(), matrix(3, 2, &[1, 4, 2, 5, 3, 6]));
        assert_eq!(matrix(2, 2, &[1, 2, 3, 4]).trace().unwrap(), BigInt::from(5));
        assert!(matches!(a.trace(), Err(NumError::Domain { op: "trace", .. })));
    }

    #[rstest]
    #[case::empty(0, &[], 1)]
    #[case::single(1, &[-7], -7)]
    #[case::two(2, &[1, 2, 3, 4], -2)]
    #[case::pivot(3, &[0, 1, 2, 1, 0, 3, 4, -3, 8], -2)]
    #[case::singular(3, &[1, 2, 3, 4, 5, 6, 7, 8, 9], 0)]
    #[case::identity(3, &[1, 0, 0, 0, 1, 0, 0, 0, 1], 1)]
    fn test_det(#[case] n: usize, #[case] entries: &[i64], #[case] expected: i64) {
        assert_eq!(matrix(n, n, entries).det().unwrap(), BigInt::from(expected));
    }

    #[test]
    fn test_identity() {
        assert_eq!(Matrix::identity(2), matrix(2, 2, &[1, 0, 0, 1]));
    }

    #[rstest]
    #[case::square(matrix(2, 2, &[1, -2, 3, 4]), 10, "[[1, -2], [3, 4]]")]
    #[case::hex(matrix(1, 2, &[255, 16]), 16, "[[ff, 10]]")]
    #[case::empty(Matrix::empty(), 10, "[]")]
    fn test_to_str_radix(#[case] m: Matrix, #[case] radix: u32, #[case] expected: &str) {
        assert_eq!(m.to_str_radix(radix), expected);
    }
}
