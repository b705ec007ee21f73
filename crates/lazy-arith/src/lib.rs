//! `lazy-arith` builds arithmetic expressions as lazy trees and evaluates
//! them with as few temporary values as possible.
//!
//! Operators on [`Expr`] never compute anything. They resolve the backend
//! rule for the operand kinds, detect `x ± y*z` shapes that can run as one
//! fused multiply-add, and record the operands by reference or by value. The
//! [`Engine`] then plans how many scratch values the tree needs, allocates
//! them once, and evaluates either into a new value or straight into an
//! existing destination.
//!
//! Numeric types are supplied by a [`Backend`]: a value type, a closed set of
//! kinds and a [`RuleTable`] describing every operation.
//!
//! ## Examples
//!
//! ```rust,ignore
//! use lazy_arith::{Engine, Expr, Mode};
//! use lazy_arith_num::{Num, Number};
//!
//! let (a, b, c) = (Number::from(2), Number::from(3), Number::from(4));
//! let tree = (Expr::<Num>::value(&a) + (Expr::value(&b) * Expr::value(&c))?)?;
//!
//! let engine = Engine::default();
//! assert_eq!(engine.count_temporaries(&tree, Mode::Into(tree.kind()))?, 0);
//!
//! let mut dest = Number::from(0);
//! engine.evaluate_into(&mut dest, &tree)?;
//! assert_eq!(dest, Number::from(14));
//!
//! // dest += b * c, reading the destination in place
//! engine.add_assign(&mut dest, (Expr::value(&b) * Expr::value(&c))?)?;
//! assert_eq!(dest, Number::from(26));
//! ```
mod backend;
mod debug;
mod engine;
mod error;
mod expr;
mod fusion;
mod operation;
mod rules;
mod storage;
mod temporaries;

#[cfg(test)]
mod testing;

pub use backend::{Backend, FromValue, Src};
pub use debug::dump_plan;
pub use engine::{Engine, EvalError, EvalStats, Options};
pub use error::{Error, Kinds, RegistryError, ShapeError};
pub use expr::{Expr, ExprResult, Operand, Subtree, TupleExpr};
pub use operation::{BinaryOp, OpName, Operation, TernaryOp, UnaryOp};
pub use rules::{
    AssignFn, AssignRule, Delivery, FusedFn, FusedRule, Mode, Resolved, Rule, RuleFn, RuleKey, RuleTable, RuleTableBuilder, TupleFn, TupleRule,
};
pub use storage::{StorageClass, Stored};
pub use temporaries::{Item, NodePlan, Placement, Plan, Strategy, count as count_slots};
