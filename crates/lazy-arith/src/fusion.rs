//! Fused multiply-add detection.
//!
//! When a `+` or `-` node is built with a multiplication as a direct child,
//! `x ± y*z` (addend left) or `y*z ± x` (product left), and the backend
//! registers a fused rule for the kinds involved, the node is built as a
//! [`Fused`] node. Its evaluation accumulates the product into the addend with
//! a single backend call instead of materialising `y*z` in a scratch slot.
//!
//! Only the immediate children of the node are inspected. A fused node is not
//! a multiplication itself, so fusion never recurses through it.
//!
//! `y*z - x` is fused as `(-x) + y*z`, which needs a negation rule for the
//! addend kind.

use crate::{
    backend::Backend,
    expr::{Expr, Node, Operand, Subtree},
    operation::{BinaryOp, Operation, TernaryOp, UnaryOp},
    rules::{FusedRule, Resolved},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Shape {
    /// `x ± y*z`
    AddendLeft,
    /// `y*z ± x`
    ProductLeft,
}

#[derive(Debug)]
pub(crate) struct Fused<'a, B: Backend> {
    /// The operation as written, `submul` for `y*z - x` as well.
    pub(crate) op: TernaryOp,
    pub(crate) shape: Shape,
    pub(crate) rule: &'static FusedRule<B>,
    /// Negates the addend before accumulating, for `y*z - x`.
    pub(crate) negate: Option<Resolved<'static, B>>,
    /// The `+`/`-` rule, for operands in written order.
    pub(crate) outer: Resolved<'static, B>,
    pub(crate) times: Resolved<'static, B>,
    pub(crate) product_kind: B::Kind,
    pub(crate) addend: Operand<'a, B>,
    pub(crate) factors: [Operand<'a, B>; 2],
}

impl<'a, B: Backend> Fused<'a, B> {
    pub(crate) fn factors_read_target(&self) -> bool {
        self.factors.iter().any(Operand::reads_target)
    }

    /// Whether the fused rule can run directly on the destination.
    ///
    /// The addend is written into the destination before the factors are
    /// read, so factors reading the destination are only safe when the addend
    /// is the destination itself and stays untouched until the fused call.
    pub(crate) fn accumulates_in_place(&self) -> bool {
        if !self.factors_read_target() {
            return true;
        }
        matches!(self.addend, Operand::Target(_)) && self.negate.is_none()
    }
}

pub(crate) enum Detected<'a, B: Backend> {
    Fused(Box<Fused<'a, B>>),
    Plain(Operand<'a, B>, Operand<'a, B>),
}

struct Candidate<B: Backend> {
    op: TernaryOp,
    shape: Shape,
    rule: &'static FusedRule<B>,
    negate: Option<Resolved<'static, B>>,
    times: Resolved<'static, B>,
    product_kind: B::Kind,
}

pub(crate) fn detect<'a, B: Backend>(
    op: &BinaryOp,
    outer: Resolved<'static, B>,
    lhs: Operand<'a, B>,
    rhs: Operand<'a, B>,
) -> Detected<'a, B> {
    let Some(ternary) = op.fused() else {
        return Detected::Plain(lhs, rhs);
    };

    if let Some(candidate) = candidate(ternary, outer, &lhs, &rhs, Shape::AddendLeft) {
        return match take_factors(rhs) {
            Ok(factors) => Detected::Fused(Box::new(candidate.build(outer, lhs, factors))),
            Err(rhs) => Detected::Plain(lhs, rhs),
        };
    }

    if let Some(candidate) = candidate(ternary, outer, &rhs, &lhs, Shape::ProductLeft) {
        return match take_factors(lhs) {
            Ok(factors) => Detected::Fused(Box::new(candidate.build(outer, rhs, factors))),
            Err(lhs) => Detected::Plain(lhs, rhs),
        };
    }

    Detected::Plain(lhs, rhs)
}

fn candidate<B: Backend>(
    op: TernaryOp,
    outer: Resolved<'static, B>,
    addend: &Operand<'_, B>,
    product: &Operand<'_, B>,
    shape: Shape,
) -> Option<Candidate<B>> {
    let Operand::Lazy(subtree) = product else {
        return None;
    };
    let product = subtree.get();
    let times = as_product(product)?;

    let addend_kind = addend.kind();
    if addend_kind != outer.result() {
        return None;
    }

    let (fused_op, negate) = match (shape, op) {
        (Shape::ProductLeft, TernaryOp::FusedMinusTimes) => {
            let negate = B::rules()
                .resolve(&Operation::Unary(UnaryOp::Negate), &[addend_kind])
                .filter(|negate| negate.result() == addend_kind)?;
            (TernaryOp::FusedPlusTimes, Some(negate))
        }
        _ => (op, None),
    };

    let Node::Apply { operands, .. } = &product.node else {
        return None;
    };
    let rule = B::rules().fused(fused_op, [addend_kind, operands[0].kind(), operands[1].kind()])?;

    Some(Candidate {
        op,
        shape,
        rule,
        negate,
        times,
        product_kind: product.kind(),
    })
}

fn as_product<B: Backend>(expr: &Expr<'_, B>) -> Option<Resolved<'static, B>> {
    match &expr.node {
        Node::Apply { rule, operands } if rule.rule.op.is_times() && operands.len() == 2 => Some(*rule),
        _ => None,
    }
}

/// Splits a product operand into its factors, handing it back unchanged otherwise.
fn take_factors<B: Backend>(product: Operand<'_, B>) -> Result<[Operand<'_, B>; 2], Operand<'_, B>> {
    match product {
        Operand::Lazy(Subtree::Owned(expr)) => {
            if as_product(&expr).is_none() {
                return Err(Operand::Lazy(Subtree::Owned(expr)));
            }
            let kind = expr.kind();
            let Expr { node, .. } = *expr;
            let node = match node {
                Node::Apply { rule, operands } => match <[Operand<'_, B>; 2]>::try_from(operands) {
                    Ok(factors) => return Ok(factors),
                    Err(operands) => Node::Apply { rule, operands },
                },
                node => node,
            };
            Err(Operand::Lazy(Subtree::Owned(Box::new(Expr::from_node(kind, node)))))
        }
        Operand::Lazy(Subtree::Borrowed(expr)) => match &expr.node {
            Node::Apply { operands, .. } if as_product(expr).is_some() => Ok([operands[0].reborrow(), operands[1].reborrow()]),
            _ => Err(Operand::Lazy(Subtree::Borrowed(expr))),
        },
        other => Err(other),
    }
}

impl<B: Backend> Candidate<B> {
    fn build<'a>(self, outer: Resolved<'static, B>, addend: Operand<'a, B>, factors: [Operand<'a, B>; 2]) -> Fused<'a, B> {
        Fused {
            op: self.op,
            shape: self.shape,
            rule: self.rule,
            negate: self.negate,
            outer,
            times: self.times,
            product_kind: self.product_kind,
            addend,
            factors,
        }
    }
}
