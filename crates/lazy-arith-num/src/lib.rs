//! Arbitrary-precision numbers for [`lazy_arith`].
//!
//! [`Num`] is a [`Backend`](lazy_arith::Backend) over [`Number`], a closed sum
//! of integers, rationals, integer polynomials, integer matrices and p-adic
//! numbers. Integers, rationals and polynomials accumulate `x ± y*z` in place,
//! matrices and p-adics always evaluate the product separately.
//!
//! ## Examples
//!
//! ```rust
//! use lazy_arith::{Engine, Expr};
//! use lazy_arith_num::{Num, Number};
//!
//! type E<'a> = Expr<'a, Num>;
//!
//! let (a, b, c) = (Number::from(7), Number::from(3), Number::from(4));
//! let tree = (E::value(&a) - (E::value(&b) * E::value(&c)).unwrap()).unwrap();
//!
//! let engine = Engine::<Num>::default();
//! assert_eq!(engine.evaluate(&tree).unwrap().into_owned(), Number::from(-5));
//!
//! let half = Number::rat(1, 2).unwrap();
//! let mixed = (E::value(&half) + E::value(&a)).unwrap();
//! assert_eq!(engine.to_string(&mixed, 10).unwrap(), "15/2");
//! ```
//!
//! Named operations are built with [`Expr::unary`](lazy_arith::Expr::unary) and
//! [`Expr::binary`](lazy_arith::Expr::binary):
//!
//! | Kind     | Unary                           | Binary                         | Tuple                     |
//! |----------|---------------------------------|--------------------------------|---------------------------|
//! | integer  | `abs` `fac` `fib` `sqrt`        | `pow` `gcd` `lcm` `bin` `rfac` | `fdiv_qr` `xgcd` `sqrtrem`|
//! | rational | `abs`                           |                                |                           |
//! | poly     | `derivative`                    | `eval`                         |                           |
//! | matrix   | `transpose` `trace` `det`       |                                |                           |
//! | padic    | `valuation`                     |                                |                           |
mod backend;
mod error;
mod integer;
mod matrix;
mod number;
mod padic;
mod poly;
mod rational;

pub use backend::Num;
pub use error::NumError;
pub use matrix::Matrix;
pub use number::{Kind, Number};
pub use padic::Padic;
pub use poly::Poly;
