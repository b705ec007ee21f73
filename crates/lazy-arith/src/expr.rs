//! Lazy expression trees.
//!
//! Building an expression never evaluates anything: operators resolve the
//! rule for the operand kinds and record it together with the operands.
//! Construction fails with a [`ShapeError`] when no rule exists, so every
//! `Expr` value can be evaluated without further shape checks.
//!
//! # Example
//!
//! ```rust,ignore
//! let (a, b, c) = (Number::from(2), Number::from(3), Number::from(4));
//! let product = (Expr::value(&b) * &Expr::value(&c))?;
//! let tree = (Expr::value(&a) + product)?;
//! assert!(tree.is_fused());
//! assert_eq!(Engine::default().evaluate(&tree)?.into_owned(), Number::from(14));
//! ```

use std::{fmt, ops};

use smallvec::{SmallVec, smallvec};

use crate::{
    backend::Backend,
    engine::Engine,
    error::{Kinds, ShapeError},
    fusion::{self, Detected, Fused},
    operation::{BinaryOp, Operation, UnaryOp},
    rules::{Resolved, TupleRule},
    storage::{StorageClass, Stored},
};

pub type ExprResult<'a, B> = Result<Expr<'a, B>, ShapeError<<B as Backend>::Kind>>;

#[derive(Debug)]
pub struct Expr<'a, B: Backend> {
    kind: B::Kind,
    reads_target: bool,
    pub(crate) node: Node<'a, B>,
}

#[derive(Debug)]
pub(crate) enum Node<'a, B: Backend> {
    Immediate(Stored<'a, B::Value>),
    /// The value of the destination the tree is evaluated into.
    Target,
    Apply {
        rule: Resolved<'static, B>,
        operands: Vec<Operand<'a, B>>,
    },
    Fused(Box<Fused<'a, B>>),
    /// One value of a tuple-returning operation, evaluated as a single unit.
    Component { tuple: TupleExpr<'a, B>, index: usize },
}

/// An operand as stored inside a node.
#[derive(Debug)]
pub enum Operand<'a, B: Backend> {
    Value(Stored<'a, B::Value>),
    Target(B::Kind),
    Lazy(Subtree<'a, B>),
}

/// A lazy operand, either moved into the node or borrowed from the caller.
#[derive(Debug)]
pub enum Subtree<'a, B: Backend> {
    Owned(Box<Expr<'a, B>>),
    Borrowed(&'a Expr<'a, B>),
}

impl<'a, B: Backend> Subtree<'a, B> {
    #[inline(always)]
    pub fn get(&self) -> &Expr<'a, B> {
        match self {
            Subtree::Owned(expr) => expr,
            Subtree::Borrowed(expr) => expr,
        }
    }
}

impl<'a, B: Backend> Operand<'a, B> {
    pub fn kind(&self) -> B::Kind {
        match self {
            Operand::Value(value) => B::kind_of(value.get()),
            Operand::Target(kind) => *kind,
            Operand::Lazy(subtree) => subtree.get().kind,
        }
    }

    pub fn reads_target(&self) -> bool {
        match self {
            Operand::Value(_) => false,
            Operand::Target(_) => true,
            Operand::Lazy(subtree) => subtree.get().reads_target,
        }
    }

    pub(crate) fn mismatched_target(&self, dest: B::Kind) -> Option<B::Kind> {
        match self {
            Operand::Value(_) => None,
            Operand::Target(kind) => (*kind != dest).then_some(*kind),
            Operand::Lazy(subtree) => subtree.get().mismatched_target(dest),
        }
    }

    pub fn storage(&self) -> Option<StorageClass> {
        match self {
            Operand::Value(value) => Some(value.class()),
            Operand::Target(_) => None,
            Operand::Lazy(Subtree::Owned(_)) => Some(StorageClass::Value),
            Operand::Lazy(Subtree::Borrowed(_)) => Some(StorageClass::ReadRef),
        }
    }

    /// The sub-expression that needs scratch slots of its own, if any.
    ///
    /// Immediate values, the destination placeholder and tuple components are
    /// read in place and never occupy a slot of the surrounding tree.
    pub(crate) fn held_expr(&self) -> Option<&Expr<'a, B>> {
        match self {
            Operand::Lazy(subtree) if subtree.get().is_held() => Some(subtree.get()),
            _ => None,
        }
    }

    pub(crate) fn reborrow(&self) -> Operand<'_, B> {
        match self {
            Operand::Value(value) => Operand::Value(Stored::ReadRef(value.get())),
            Operand::Target(kind) => Operand::Target(*kind),
            Operand::Lazy(subtree) => Operand::Lazy(Subtree::Borrowed(subtree.get())),
        }
    }
}

impl<'a, B: Backend> From<Expr<'a, B>> for Operand<'a, B> {
    fn from(expr: Expr<'a, B>) -> Self {
        let Expr { kind, reads_target, node } = expr;
        match node {
            Node::Immediate(value) => Operand::Value(value.into_read()),
            Node::Target => Operand::Target(kind),
            node => Operand::Lazy(Subtree::Owned(Box::new(Expr { kind, reads_target, node }))),
        }
    }
}

impl<'e, 'a: 'e, B: Backend> From<&'e Expr<'a, B>> for Operand<'e, B> {
    fn from(expr: &'e Expr<'a, B>) -> Self {
        match &expr.node {
            Node::Immediate(value) => Operand::Value(Stored::ReadRef(value.get())),
            Node::Target => Operand::Target(expr.kind),
            _ => Operand::Lazy(Subtree::Borrowed(expr)),
        }
    }
}

impl<'a, B: Backend> Node<'a, B> {
    fn reads_target(&self) -> bool {
        match self {
            Node::Immediate(_) => false,
            Node::Target => true,
            Node::Apply { operands, .. } => operands.iter().any(Operand::reads_target),
            Node::Fused(fused) => fused.addend.reads_target() || fused.factors_read_target(),
            Node::Component { tuple, .. } => tuple.reads_target(),
        }
    }

    fn mismatched_target(&self, kind: B::Kind, dest: B::Kind) -> Option<B::Kind> {
        match self {
            Node::Immediate(_) => None,
            Node::Target => (kind != dest).then_some(kind),
            Node::Apply { operands, .. } => operands.iter().find_map(|o| o.mismatched_target(dest)),
            Node::Fused(fused) => std::iter::once(&fused.addend)
                .chain(&fused.factors)
                .find_map(|o| o.mismatched_target(dest)),
            Node::Component { tuple, .. } => tuple.operands.iter().find_map(|o| o.mismatched_target(dest)),
        }
    }
}

impl<'a, B: Backend> Expr<'a, B> {
    /// A named value captured by reference.
    pub fn value(value: &'a B::Value) -> Self {
        Self::stored(Stored::ReadRef(value))
    }

    /// A transient value, moved into the expression once.
    pub fn owned(value: B::Value) -> Self {
        Self::stored(Stored::Owned(value))
    }

    pub fn stored(value: Stored<'a, B::Value>) -> Self {
        let value = value.into_read();
        Self {
            kind: B::kind_of(value.get()),
            reads_target: false,
            node: Node::Immediate(value),
        }
    }

    /// Placeholder for the destination the expression will be evaluated into.
    pub fn target(kind: B::Kind) -> Self {
        Self {
            kind,
            reads_target: true,
            node: Node::Target,
        }
    }

    pub fn target_of(dest: &B::Value) -> Self {
        Self::target(B::kind_of(dest))
    }

    pub fn unary(op: UnaryOp, operand: impl Into<Operand<'a, B>>) -> ExprResult<'a, B> {
        Self::apply(Operation::Unary(op), vec![operand.into()])
    }

    pub fn binary(op: BinaryOp, lhs: impl Into<Operand<'a, B>>, rhs: impl Into<Operand<'a, B>>) -> ExprResult<'a, B> {
        let (lhs, rhs) = (lhs.into(), rhs.into());
        let operation = Operation::Binary(op.clone());
        let outer = B::rules().require(&operation, &[lhs.kind(), rhs.kind()])?;

        let node = match fusion::detect(&op, outer, lhs, rhs) {
            Detected::Fused(fused) => Node::Fused(fused),
            Detected::Plain(lhs, rhs) => Node::Apply {
                rule: outer,
                operands: vec![lhs, rhs],
            },
        };
        Ok(Self::from_node(outer.result(), node))
    }

    /// A domain operation such as `fac`, `gcd` or `transpose`.
    pub fn named<I, T>(name: &str, operands: I) -> ExprResult<'a, B>
    where
        I: IntoIterator<Item = T>,
        T: Into<Operand<'a, B>>,
    {
        let operands: Vec<Operand<'a, B>> = operands.into_iter().map(Into::into).collect();
        match <[Operand<'a, B>; 2]>::try_from(operands) {
            Ok([lhs, rhs]) => Self::binary(BinaryOp::Named(name.into()), lhs, rhs),
            Err(operands) if operands.len() == 1 => Self::apply(Operation::Unary(UnaryOp::Named(name.into())), operands),
            Err(operands) => {
                let got = operands.len();
                let expected = if got == 0 { 1 } else { 2 };
                Err(ShapeError::ArityMismatch {
                    op: Operation::named(name, expected),
                    expected,
                    got,
                })
            }
        }
    }

    pub fn tuple<I, T>(name: &str, operands: I) -> Result<TupleExpr<'a, B>, ShapeError<B::Kind>>
    where
        I: IntoIterator<Item = T>,
        T: Into<Operand<'a, B>>,
    {
        TupleExpr::new(name, operands)
    }

    fn apply(op: Operation, operands: Vec<Operand<'a, B>>) -> ExprResult<'a, B> {
        let kinds: Kinds<B::Kind> = operands.iter().map(|operand| operand.kind()).collect();
        let rule = B::rules().require(&op, &kinds)?;
        Ok(Self::from_node(rule.result(), Node::Apply { rule, operands }))
    }

    pub(crate) fn from_node(kind: B::Kind, node: Node<'a, B>) -> Self {
        Self {
            kind,
            reads_target: node.reads_target(),
            node,
        }
    }

    /// The kind of the value this expression evaluates to.
    #[inline(always)]
    pub fn kind(&self) -> B::Kind {
        self.kind
    }

    pub fn is_immediate(&self) -> bool {
        matches!(self.node, Node::Immediate(_))
    }

    pub fn is_lazy(&self) -> bool {
        !matches!(self.node, Node::Immediate(_) | Node::Target)
    }

    pub fn is_fused(&self) -> bool {
        matches!(self.node, Node::Fused(_))
    }

    /// Whether evaluating the expression reads the destination placeholder.
    pub fn reads_target(&self) -> bool {
        self.reads_target
    }

    /// The kind of the first destination placeholder whose kind is not `dest`.
    pub(crate) fn mismatched_target(&self, dest: B::Kind) -> Option<B::Kind> {
        if !self.reads_target {
            return None;
        }
        self.node.mismatched_target(self.kind, dest)
    }

    /// Fails when a destination placeholder in the tree was declared with a
    /// kind other than `dest`.
    pub(crate) fn check_target(&self, dest: B::Kind) -> Result<(), ShapeError<B::Kind>> {
        match self.mismatched_target(dest) {
            Some(placeholder) => Err(ShapeError::TargetMismatch { placeholder, dest }),
            None => Ok(()),
        }
    }

    pub(crate) fn is_held(&self) -> bool {
        matches!(self.node, Node::Apply { .. } | Node::Fused(_))
    }

    pub fn operation(&self) -> Operation {
        match &self.node {
            Node::Immediate(_) | Node::Target => Operation::Immediate,
            Node::Apply { rule, .. } => rule.rule.op.clone(),
            Node::Fused(fused) => Operation::Ternary(fused.op),
            Node::Component { tuple, .. } => tuple.rule.op(),
        }
    }

    /// Storage views of the operands, in operand order.
    pub fn operand_storage(&self) -> SmallVec<[Option<StorageClass>; 3]> {
        match &self.node {
            Node::Immediate(value) => smallvec![Some(value.class())],
            Node::Target => smallvec![None],
            Node::Apply { operands, .. } => operands.iter().map(Operand::storage).collect(),
            Node::Fused(fused) => std::iter::once(&fused.addend)
                .chain(fused.factors.iter())
                .map(Operand::storage)
                .collect(),
            Node::Component { tuple, .. } => tuple.operands.iter().map(Operand::storage).collect(),
        }
    }
}

impl<B: Backend> fmt::Display for Expr<'_, B> {
    /// Printing evaluates the expression in decimal.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = Engine::<B>::default().to_string(self, 10).map_err(|_| fmt::Error)?;
        f.write_str(&text)
    }
}

/// A tuple-returning operation such as a combined quotient and remainder.
///
/// The whole operation runs as one backend call. [`TupleExpr::component`]
/// turns one of its results into an expression usable inside larger trees.
#[derive(Debug)]
pub struct TupleExpr<'a, B: Backend> {
    pub(crate) rule: &'static TupleRule<B>,
    pub(crate) operands: Vec<Operand<'a, B>>,
}

impl<'a, B: Backend> TupleExpr<'a, B> {
    pub fn new<I, T>(name: &str, operands: I) -> Result<Self, ShapeError<B::Kind>>
    where
        I: IntoIterator<Item = T>,
        T: Into<Operand<'a, B>>,
    {
        let operands: Vec<Operand<'a, B>> = operands.into_iter().map(Into::into).collect();
        let kinds: Kinds<B::Kind> = operands.iter().map(|operand| operand.kind()).collect();
        let rule = B::rules().tuple(name, &kinds).ok_or_else(|| ShapeError::NoRule {
            op: Operation::Tuple(name.into()),
            kinds,
        })?;
        Ok(Self { rule, operands })
    }

    pub fn kinds(&self) -> &[B::Kind] {
        &self.rule.results
    }

    pub fn arity(&self) -> usize {
        self.rule.results.len()
    }

    pub fn reads_target(&self) -> bool {
        self.operands.iter().any(Operand::reads_target)
    }

    pub fn component(self, index: usize) -> ExprResult<'a, B> {
        let Some(kind) = self.rule.results.get(index).copied() else {
            return Err(ShapeError::ComponentOutOfRange {
                op: self.rule.op(),
                index,
            });
        };
        Ok(Expr::from_node(kind, Node::Component { tuple: self, index }))
    }
}

macro_rules! impl_binary_op {
    ($trait:ident, $method:ident, $op:expr) => {
        impl<'a, B: Backend, R: Into<Operand<'a, B>>> ops::$trait<R> for Expr<'a, B> {
            type Output = ExprResult<'a, B>;

            fn $method(self, rhs: R) -> Self::Output {
                Expr::binary($op, self, rhs)
            }
        }

        impl<'e, 'a: 'e, B: Backend, R: Into<Operand<'e, B>>> ops::$trait<R> for &'e Expr<'a, B> {
            type Output = ExprResult<'e, B>;

            fn $method(self, rhs: R) -> Self::Output {
                Expr::binary($op, self, rhs)
            }
        }
    };
}

impl_binary_op!(Add, add, BinaryOp::Plus);
impl_binary_op!(Sub, sub, BinaryOp::Minus);
impl_binary_op!(Mul, mul, BinaryOp::Times);
impl_binary_op!(Div, div, BinaryOp::DividedBy);
impl_binary_op!(Rem, rem, BinaryOp::Modulo);
impl_binary_op!(Shl, shl, BinaryOp::Shift);

impl<'a, B: Backend> ops::Neg for Expr<'a, B> {
    type Output = ExprResult<'a, B>;

    fn neg(self) -> Self::Output {
        Expr::unary(UnaryOp::Negate, self)
    }
}

impl<'e, 'a: 'e, B: Backend> ops::Neg for &'e Expr<'a, B> {
    type Output = ExprResult<'e, B>;

    fn neg(self) -> Self::Output {
        Expr::unary(UnaryOp::Negate, self)
    }
}
