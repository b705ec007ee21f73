//! Evaluation of expression trees.
//!
//! An evaluation first plans the tree (see [`crate::temporaries`]), then
//! allocates the planned scratch values once and walks the tree, handing each
//! node a slice of slots starting at its own first slot. Every shape problem
//! (missing assignment, unbound destination placeholder) is reported before
//! the first backend call.

use std::{borrow::Cow, cmp::Ordering, env, fmt, marker::PhantomData};

use serde::Deserialize;
use smallvec::SmallVec;
use tracing::{debug, trace, warn};

use crate::{
    backend::{Backend, FromValue, Src},
    error::{Error, ShapeError},
    expr::{Expr, Node, Operand, TupleExpr},
    fusion::Fused,
    operation::BinaryOp,
    rules::{AssignRule, Delivery, Mode, Resolved},
    temporaries::{self, Arg, Item, Placement, Plan},
};

pub type EvalError<B> = Error<<B as Backend>::Kind, <B as Backend>::Error>;

type EvalResult<T, B> = Result<T, EvalError<B>>;

const FUSION_ENV: &str = "LAZY_ARITH_FUSION";
const TRACE_PLANS_ENV: &str = "LAZY_ARITH_TRACE_PLANS";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Options {
    /// Evaluate `x ± y*z` with fused rules where the backend provides them.
    pub fusion: bool,
    /// Log every evaluation plan at debug level.
    pub trace_plans: bool,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            fusion: true,
            trace_plans: false,
        }
    }
}

impl Options {
    /// Reads `LAZY_ARITH_FUSION` and `LAZY_ARITH_TRACE_PLANS`.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut options = Self::default();
        if let Some(fusion) = flag(&lookup, FUSION_ENV) {
            options.fusion = fusion;
        }
        if let Some(trace_plans) = flag(&lookup, TRACE_PLANS_ENV) {
            options.trace_plans = trace_plans;
        }
        options
    }

    pub fn from_toml(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    pub fn with_fusion(mut self, fusion: bool) -> Self {
        self.fusion = fusion;
        self
    }

    pub fn with_trace_plans(mut self, trace_plans: bool) -> Self {
        self.trace_plans = trace_plans;
        self
    }
}

fn flag(lookup: &impl Fn(&str) -> Option<String>, name: &str) -> Option<bool> {
    let value = lookup(name)?;
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "on" | "yes" => Some(true),
        "0" | "false" | "off" | "no" => Some(false),
        _ => {
            warn!(name, value = %value, "ignoring invalid flag value");
            None
        }
    }
}

/// Work done by one evaluation call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EvalStats {
    /// Scratch values allocated.
    pub slots: usize,
    pub rule_calls: usize,
    pub fused_calls: usize,
    pub tuple_calls: usize,
    pub assignments: usize,
}

impl EvalStats {
    pub fn merge(&mut self, other: &EvalStats) {
        self.slots += other.slots;
        self.rule_calls += other.rule_calls;
        self.fused_calls += other.fused_calls;
        self.tuple_calls += other.tuple_calls;
        self.assignments += other.assignments;
    }
}

pub struct Engine<B: Backend> {
    options: Options,
    _backend: PhantomData<fn() -> B>,
}

impl<B: Backend> Default for Engine<B> {
    fn default() -> Self {
        Self::new(Options::default())
    }
}

impl<B: Backend> Clone for Engine<B> {
    fn clone(&self) -> Self {
        Self::new(self.options)
    }
}

impl<B: Backend> fmt::Debug for Engine<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Engine").field("options", &self.options).finish()
    }
}

impl<B: Backend> Engine<B> {
    pub fn new(options: Options) -> Self {
        Self {
            options,
            _backend: PhantomData,
        }
    }

    pub fn from_env() -> Self {
        Self::new(Options::from_env())
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    pub fn set_fusion(&mut self, fusion: bool) {
        self.options.fusion = fusion;
    }

    pub fn set_trace_plans(&mut self, trace_plans: bool) {
        self.options.trace_plans = trace_plans;
    }

    /// Plans `expr` for `mode` without evaluating anything.
    pub fn plan(&self, expr: &Expr<'_, B>, mode: Mode<B::Kind>) -> Result<Plan<B::Kind>, ShapeError<B::Kind>> {
        let placement = match mode {
            Mode::Fresh if expr.reads_target() => return Err(ShapeError::UnboundTarget),
            Mode::Fresh => Placement::Fresh,
            Mode::Into(dest) => {
                expr.check_target(dest)?;
                match B::rules().delivery(expr.kind(), mode)? {
                    Delivery::Direct => Placement::Into,
                    Delivery::Convert(_) => Placement::Fresh,
                }
            }
        };
        Ok(self.plan_for(expr, placement))
    }

    fn plan_for(&self, expr: &Expr<'_, B>, placement: Placement) -> Plan<B::Kind> {
        let plan = temporaries::plan(expr, placement, self.options.fusion);
        debug!(placement = ?placement, slots = plan.slots(), nodes = plan.len(), "planned evaluation");
        if self.options.trace_plans {
            debug!("{plan}");
        }
        plan
    }

    /// Scratch values an evaluation of `expr` for `mode` allocates.
    pub fn count_temporaries(&self, expr: &Expr<'_, B>, mode: Mode<B::Kind>) -> Result<usize, ShapeError<B::Kind>> {
        self.plan(expr, mode).map(|plan| plan.slots())
    }

    /// Evaluates into a new value. An immediate is returned without copying.
    pub fn evaluate<'e>(&self, expr: &'e Expr<'_, B>) -> EvalResult<Cow<'e, B::Value>, B> {
        self.evaluate_with_stats(expr).map(|(value, _)| value)
    }

    pub fn evaluate_with_stats<'e>(&self, expr: &'e Expr<'_, B>) -> EvalResult<(Cow<'e, B::Value>, EvalStats), B> {
        let plan = self.plan(expr, Mode::Fresh)?;
        let mut run = Run::<B>::new(&plan, self.options.fusion);

        let value = match &expr.node {
            Node::Immediate(value) => Cow::Borrowed(value.get()),
            Node::Target => return Err(ShapeError::UnboundTarget.into()),
            Node::Component { tuple, index } => Cow::Owned(run.component(tuple, *index, None)?),
            Node::Apply { .. } | Node::Fused(_) => {
                let mut slots = plan.allocate::<B>();
                run.fresh(expr, 0, &mut slots, None)?;
                Cow::Owned(slots.swap_remove(0))
            }
        };
        Ok((value, run.stats))
    }

    /// Evaluates `expr` and stores the result into `dest`.
    ///
    /// When the kind of `expr` differs from the kind of `dest`, the value is
    /// produced in a scratch slot and stored with the backend's assignment
    /// rule. `expr` may read the previous value of `dest` through
    /// [`Expr::target`].
    pub fn evaluate_into(&self, dest: &mut B::Value, expr: &Expr<'_, B>) -> EvalResult<(), B> {
        self.evaluate_into_with_stats(dest, expr).map(|_| ())
    }

    pub fn evaluate_into_with_stats(&self, dest: &mut B::Value, expr: &Expr<'_, B>) -> EvalResult<EvalStats, B> {
        let kind = B::kind_of(dest);
        expr.check_target(kind)?;
        let delivery = B::rules().delivery(expr.kind(), Mode::Into(kind))?;
        let placement = match delivery {
            Delivery::Direct => Placement::Into,
            Delivery::Convert(_) => Placement::Fresh,
        };
        let plan = self.plan_for(expr, placement);
        let mut run = Run::<B>::new(&plan, self.options.fusion);
        let mut slots = plan.allocate::<B>();

        match delivery {
            Delivery::Direct => run.eval_into(expr, 0, dest, &mut slots)?,
            Delivery::Convert(rule) => {
                let value = match &expr.node {
                    Node::Immediate(value) => Cow::Borrowed(value.get()),
                    Node::Target => Cow::Owned(dest.clone()),
                    Node::Component { tuple, index } => Cow::Owned(run.component(tuple, *index, Some(&*dest))?),
                    Node::Apply { .. } | Node::Fused(_) => {
                        run.fresh(expr, 0, &mut slots, Some(&*dest))?;
                        Cow::Owned(slots.swap_remove(0))
                    }
                };
                run.assign(rule, dest, &value)?;
            }
        }
        Ok(run.stats)
    }

    /// Evaluates every result of a tuple operation with one backend call.
    pub fn evaluate_tuple(&self, tuple: &TupleExpr<'_, B>) -> EvalResult<SmallVec<[B::Value; 3]>, B> {
        let plan = Plan::default();
        Run::<B>::new(&plan, self.options.fusion).tuple(tuple, None)
    }

    /// `dest = dest <op> rhs`, evaluated in place.
    pub fn compound<'r>(&self, dest: &mut B::Value, op: BinaryOp, rhs: impl Into<Operand<'r, B>>) -> EvalResult<(), B> {
        let tree = Expr::binary(op, Expr::target_of(dest), rhs)?;
        self.evaluate_into(dest, &tree)
    }

    pub fn add_assign<'r>(&self, dest: &mut B::Value, rhs: impl Into<Operand<'r, B>>) -> EvalResult<(), B> {
        self.compound(dest, BinaryOp::Plus, rhs)
    }

    pub fn sub_assign<'r>(&self, dest: &mut B::Value, rhs: impl Into<Operand<'r, B>>) -> EvalResult<(), B> {
        self.compound(dest, BinaryOp::Minus, rhs)
    }

    pub fn mul_assign<'r>(&self, dest: &mut B::Value, rhs: impl Into<Operand<'r, B>>) -> EvalResult<(), B> {
        self.compound(dest, BinaryOp::Times, rhs)
    }

    pub fn div_assign<'r>(&self, dest: &mut B::Value, rhs: impl Into<Operand<'r, B>>) -> EvalResult<(), B> {
        self.compound(dest, BinaryOp::DividedBy, rhs)
    }

    pub fn rem_assign<'r>(&self, dest: &mut B::Value, rhs: impl Into<Operand<'r, B>>) -> EvalResult<(), B> {
        self.compound(dest, BinaryOp::Modulo, rhs)
    }

    pub fn equals(&self, lhs: &Expr<'_, B>, rhs: &Expr<'_, B>) -> EvalResult<bool, B> {
        let (lhs, rhs) = (self.evaluate(lhs)?, self.evaluate(rhs)?);
        Ok(B::equals(&lhs, &rhs))
    }

    pub fn compare(&self, lhs: &Expr<'_, B>, rhs: &Expr<'_, B>) -> EvalResult<Ordering, B> {
        if !B::comparable(lhs.kind(), rhs.kind()) {
            return Err(ShapeError::NoComparison {
                lhs: lhs.kind(),
                rhs: rhs.kind(),
            }
            .into());
        }
        let (lhs, rhs) = (self.evaluate(lhs)?, self.evaluate(rhs)?);
        B::compare(&lhs, &rhs).map_err(Error::Backend)
    }

    pub fn convert<T: FromValue<B>>(&self, expr: &Expr<'_, B>) -> EvalResult<T, B> {
        T::from_value(self.evaluate(expr)?.as_ref()).map_err(Error::Backend)
    }

    pub fn to_string(&self, expr: &Expr<'_, B>, base: u32) -> EvalResult<String, B> {
        B::to_string_radix(self.evaluate(expr)?.as_ref(), base).map_err(Error::Backend)
    }
}

/// A leaf read in place by its parent node.
enum Leaf<'o, 'a, B: Backend> {
    Value(&'o B::Value),
    Target,
    Component(&'o TupleExpr<'a, B>, usize),
}

fn leaf<'o, 'a, B: Backend>(operand: &'o Operand<'a, B>) -> Leaf<'o, 'a, B> {
    match operand {
        Operand::Value(value) => Leaf::Value(value.get()),
        Operand::Target(_) => Leaf::Target,
        Operand::Lazy(subtree) => match &subtree.get().node {
            Node::Immediate(value) => Leaf::Value(value.get()),
            Node::Target => Leaf::Target,
            Node::Component { tuple, index } => Leaf::Component(tuple, *index),
            Node::Apply { .. } | Node::Fused(_) => unreachable!("held operands are evaluated into slots"),
        },
    }
}

/// One evaluation walking a planned tree.
struct Run<'p, B: Backend> {
    plan: &'p Plan<B::Kind>,
    fusion: bool,
    stats: EvalStats,
}

impl<'p, B: Backend> Run<'p, B> {
    fn new(plan: &'p Plan<B::Kind>, fusion: bool) -> Self {
        Self {
            plan,
            fusion,
            stats: EvalStats {
                slots: plan.slots(),
                ..EvalStats::default()
            },
        }
    }

    /// Evaluates a held node into `slots[0]`.
    fn fresh(&mut self, expr: &Expr<'_, B>, id: u32, slots: &mut [B::Value], target: Option<&B::Value>) -> EvalResult<(), B> {
        match &expr.node {
            Node::Apply { rule, operands } => {
                let args: SmallVec<[Arg<'_, '_, B>; 3]> = operands.iter().map(Arg::Operand).collect();
                self.apply_fresh(id, *rule, &args, slots, target)
            }
            Node::Fused(fused) if self.plan.node(id).strategy == temporaries::Strategy::Fused => self.fused_fresh(id, fused, slots, target),
            Node::Fused(fused) => self.apply_fresh(id, fused.outer, &fused.outer_args(), slots, target),
            Node::Immediate(_) | Node::Target | Node::Component { .. } => unreachable!("leaves are read in place"),
        }
    }

    /// Evaluates a node straight into `dest`, which also serves as the
    /// destination placeholder.
    fn eval_into(&mut self, expr: &Expr<'_, B>, id: u32, dest: &mut B::Value, slots: &mut [B::Value]) -> EvalResult<(), B> {
        match &expr.node {
            Node::Apply { rule, operands } => {
                let args: SmallVec<[Arg<'_, '_, B>; 3]> = operands.iter().map(Arg::Operand).collect();
                self.apply_into(id, *rule, &args, dest, slots)
            }
            Node::Fused(fused) if self.plan.node(id).strategy == temporaries::Strategy::Fused => self.fused_into(id, fused, dest, slots),
            Node::Fused(fused) => self.apply_into(id, fused.outer, &fused.outer_args(), dest, slots),
            Node::Immediate(value) => {
                dest.clone_from(value.get());
                Ok(())
            }
            Node::Target => Ok(()),
            Node::Component { tuple, index } => {
                *dest = self.component(tuple, *index, Some(&*dest))?;
                Ok(())
            }
        }
    }

    fn held_fresh(&mut self, arg: Arg<'_, '_, B>, id: u32, slots: &mut [B::Value], target: Option<&B::Value>) -> EvalResult<(), B> {
        match arg {
            Arg::Operand(operand) => match operand.held_expr() {
                Some(expr) => self.fresh(expr, id, slots, target),
                None => unreachable!("loose operands are read in place"),
            },
            Arg::Product(fused) => self.apply_fresh(id, fused.times, &fused.factor_args(), slots, target),
        }
    }

    /// Evaluates the held items of a node in planned order.
    fn held_items(&mut self, args: &[Arg<'_, '_, B>], items: &[Item], order: &[u8], slots: &mut [B::Value], target: Option<&B::Value>) -> EvalResult<(), B> {
        for &i in order {
            let item = items[i as usize];
            let (Some(child), Some(position)) = (item.child, item.position) else {
                unreachable!("held operands have a plan and a slot");
            };
            self.held_fresh(args[i as usize], child, &mut slots[position as usize..], target)?;
        }
        Ok(())
    }

    /// Values of tuple components read by a node, computed before its rule runs.
    fn components(&mut self, args: &[Arg<'_, '_, B>], items: &[Item], target: Option<&B::Value>) -> EvalResult<SmallVec<[Option<B::Value>; 3]>, B> {
        args.iter()
            .zip(items)
            .map(|(arg, item)| match arg {
                Arg::Operand(operand) if !item.held => match leaf(*operand) {
                    Leaf::Component(tuple, index) => self.component(tuple, index, target).map(Some),
                    Leaf::Value(_) | Leaf::Target => Ok(None),
                },
                _ => Ok(None),
            })
            .collect()
    }

    fn apply_fresh(
        &mut self,
        id: u32,
        rule: Resolved<'static, B>,
        args: &[Arg<'_, '_, B>],
        slots: &mut [B::Value],
        target: Option<&B::Value>,
    ) -> EvalResult<(), B> {
        let plan = self.plan;
        let node = plan.node(id);
        self.held_items(args, &node.items, &node.order, slots, target)?;
        let components = self.components(args, &node.items, target)?;

        let (head, scratch) = slots.split_at_mut(node.held.max(1));
        let (dest, held) = head.split_at_mut(1);
        let held = &*held;

        let mut srcs: SmallVec<[Src<'_, B::Value>; 3]> = SmallVec::with_capacity(args.len());
        for ((arg, item), component) in args.iter().zip(&node.items).zip(&components) {
            srcs.push(match (item.position, component) {
                (Some(0), _) => Src::Dest,
                (Some(position), _) => Src::Val(&held[position as usize - 1]),
                (None, Some(value)) => Src::Val(value),
                (None, None) => match loose(*arg) {
                    Leaf::Value(value) => Src::Val(value),
                    Leaf::Target => Src::Val(target.ok_or(ShapeError::UnboundTarget)?),
                    Leaf::Component(..) => unreachable!("components are computed up front"),
                },
            });
        }

        self.call(rule, &mut dest[0], &mut srcs, &mut scratch[..node.scratch.len()])
    }

    fn apply_into(
        &mut self,
        id: u32,
        rule: Resolved<'static, B>,
        args: &[Arg<'_, '_, B>],
        dest: &mut B::Value,
        slots: &mut [B::Value],
    ) -> EvalResult<(), B> {
        let plan = self.plan;
        let node = plan.node(id);
        self.held_items(args, &node.items, &node.order, slots, Some(&*dest))?;
        let components = self.components(args, &node.items, Some(&*dest))?;

        let (held, scratch) = slots.split_at_mut(node.held);
        let held = &*held;

        let mut srcs: SmallVec<[Src<'_, B::Value>; 3]> = SmallVec::with_capacity(args.len());
        for ((arg, item), component) in args.iter().zip(&node.items).zip(&components) {
            srcs.push(match (item.position, component) {
                (Some(position), _) => Src::Val(&held[position as usize]),
                (None, Some(value)) => Src::Val(value),
                (None, None) => match loose(*arg) {
                    Leaf::Value(value) => Src::Val(value),
                    Leaf::Target => Src::Dest,
                    Leaf::Component(..) => unreachable!("components are computed up front"),
                },
            });
        }

        self.call(rule, dest, &mut srcs, &mut scratch[..node.scratch.len()])
    }

    /// Accumulates into the addend's slot, which is then moved to the front of
    /// the node's range.
    fn fused_fresh(&mut self, id: u32, fused: &Fused<'_, B>, slots: &mut [B::Value], target: Option<&B::Value>) -> EvalResult<(), B> {
        let plan = self.plan;
        let node = plan.node(id);
        let args = [
            Arg::Operand(&fused.addend),
            Arg::Operand(&fused.factors[0]),
            Arg::Operand(&fused.factors[1]),
        ];

        for &i in &node.order {
            let item = node.items[i as usize];
            let Some(position) = item.position else {
                unreachable!("held operands have a slot");
            };
            let slot = &mut slots[position as usize..];
            match item.child {
                Some(child) => self.held_fresh(args[i as usize], child, slot, target)?,
                None => match leaf(&fused.addend) {
                    Leaf::Value(value) => slot[0].clone_from(value),
                    Leaf::Target => slot[0].clone_from(target.ok_or(ShapeError::UnboundTarget)?),
                    Leaf::Component(tuple, index) => slot[0] = self.component(tuple, index, target)?,
                },
            }
        }
        let components = self.components(&args[1..], &node.items[1..], target)?;

        let Some(acc) = node.items[0].position else {
            unreachable!("the addend is held");
        };
        slots.swap(0, acc as usize);

        let (head, scratch) = slots.split_at_mut(node.held);
        let (dest, held) = head.split_at_mut(1);
        let held = &*held;
        let scratch = &mut scratch[..node.scratch.len()];

        let mut srcs: SmallVec<[Src<'_, B::Value>; 2]> = SmallVec::new();
        for ((arg, item), component) in args[1..].iter().zip(&node.items[1..]).zip(&components) {
            srcs.push(match (item.position, component) {
                (Some(position), _) => {
                    let position = if position == 0 { acc } else { position };
                    Src::Val(&held[position as usize - 1])
                }
                (None, Some(value)) => Src::Val(value),
                (None, None) => match loose(*arg) {
                    Leaf::Value(value) => Src::Val(value),
                    Leaf::Target => Src::Val(target.ok_or(ShapeError::UnboundTarget)?),
                    Leaf::Component(..) => unreachable!("components are computed up front"),
                },
            });
        }

        if let Some(negate) = fused.negate {
            self.call(negate, &mut dest[0], &mut [Src::Dest], scratch)?;
        }
        self.fused_call(fused, &mut dest[0], srcs[0], srcs[1], scratch)
    }

    /// Writes the addend into `dest`, then accumulates the product into it.
    fn fused_into(&mut self, id: u32, fused: &Fused<'_, B>, dest: &mut B::Value, slots: &mut [B::Value]) -> EvalResult<(), B> {
        let plan = self.plan;
        let node = plan.node(id);

        match (fused.addend.held_expr(), node.items[0].child) {
            (Some(addend), Some(child)) => self.eval_into(addend, child, dest, slots)?,
            _ => match leaf(&fused.addend) {
                Leaf::Value(value) => dest.clone_from(value),
                Leaf::Target => {}
                Leaf::Component(tuple, index) => *dest = self.component(tuple, index, Some(&*dest))?,
            },
        }

        let args = [Arg::Operand(&fused.addend), Arg::Operand(&fused.factors[0]), Arg::Operand(&fused.factors[1])];
        self.held_items(&args, &node.items, &node.order, slots, Some(&*dest))?;
        let components = self.components(&args[1..], &node.items[1..], Some(&*dest))?;

        let (held, scratch) = slots.split_at_mut(node.held);
        let held = &*held;
        let scratch = &mut scratch[..node.scratch.len()];

        let mut srcs: SmallVec<[Src<'_, B::Value>; 2]> = SmallVec::new();
        for ((arg, item), component) in args[1..].iter().zip(&node.items[1..]).zip(&components) {
            srcs.push(match (item.position, component) {
                (Some(position), _) => Src::Val(&held[position as usize]),
                (None, Some(value)) => Src::Val(value),
                (None, None) => match loose(*arg) {
                    Leaf::Value(value) => Src::Val(value),
                    Leaf::Target => Src::Dest,
                    Leaf::Component(..) => unreachable!("components are computed up front"),
                },
            });
        }

        if let Some(negate) = fused.negate {
            self.call(negate, dest, &mut [Src::Dest], scratch)?;
        }
        self.fused_call(fused, dest, srcs[0], srcs[1], scratch)
    }

    fn call(&mut self, rule: Resolved<'static, B>, dest: &mut B::Value, srcs: &mut [Src<'_, B::Value>], scratch: &mut [B::Value]) -> EvalResult<(), B> {
        trace!(op = %rule.rule.op, swapped = rule.swapped, "rule");
        self.stats.rule_calls += 1;
        rule.call(dest, srcs, scratch).map_err(Error::Backend)
    }

    fn fused_call(&mut self, fused: &Fused<'_, B>, acc: &mut B::Value, y: Src<'_, B::Value>, z: Src<'_, B::Value>, scratch: &mut [B::Value]) -> EvalResult<(), B> {
        trace!(op = %fused.op, negated = fused.negate.is_some(), "fused rule");
        self.stats.fused_calls += 1;
        (fused.rule.eval)(acc, y, z, scratch).map_err(Error::Backend)
    }

    fn assign(&mut self, rule: &AssignRule<B>, dest: &mut B::Value, value: &B::Value) -> EvalResult<(), B> {
        trace!(to = %rule.to, from = %rule.from, "assignment");
        self.stats.assignments += 1;
        (rule.eval)(dest, value).map_err(Error::Backend)
    }

    fn tuple(&mut self, tuple: &TupleExpr<'_, B>, target: Option<&B::Value>) -> EvalResult<SmallVec<[B::Value; 3]>, B> {
        let values = tuple
            .operands
            .iter()
            .map(|operand| self.operand_value(operand, target))
            .collect::<Result<SmallVec<[Cow<'_, B::Value>; 3]>, _>>()?;
        let refs: SmallVec<[&B::Value; 3]> = values.iter().map(|value| value.as_ref()).collect();

        trace!(op = %tuple.rule.name, "tuple rule");
        self.stats.tuple_calls += 1;
        (tuple.rule.eval)(&refs).map_err(Error::Backend)
    }

    fn component(&mut self, tuple: &TupleExpr<'_, B>, index: usize, target: Option<&B::Value>) -> EvalResult<B::Value, B> {
        let mut values = self.tuple(tuple, target)?;
        if index < values.len() {
            Ok(values.swap_remove(index))
        } else {
            Err(ShapeError::ComponentOutOfRange {
                op: tuple.rule.op(),
                index,
            }
            .into())
        }
    }

    /// An operand of a tuple operation, evaluated on its own when lazy.
    fn operand_value<'v>(&mut self, operand: &'v Operand<'_, B>, target: Option<&'v B::Value>) -> EvalResult<Cow<'v, B::Value>, B> {
        let Some(expr) = operand.held_expr() else {
            return match leaf(operand) {
                Leaf::Value(value) => Ok(Cow::Borrowed(value)),
                Leaf::Target => target.map(Cow::Borrowed).ok_or_else(|| ShapeError::UnboundTarget.into()),
                Leaf::Component(tuple, index) => self.component(tuple, index, target).map(Cow::Owned),
            };
        };

        let plan = temporaries::plan(expr, Placement::Fresh, self.fusion);
        let mut slots = plan.allocate::<B>();
        let mut run = Run::<B>::new(&plan, self.fusion);
        run.fresh(expr, 0, &mut slots, target)?;
        self.stats.merge(&run.stats);
        Ok(Cow::Owned(slots.swap_remove(0)))
    }
}

fn loose<'e, 'a, B: Backend>(arg: Arg<'e, 'a, B>) -> Leaf<'e, 'a, B> {
    match arg {
        Arg::Operand(operand) => leaf(operand),
        Arg::Product(_) => unreachable!("products are always held"),
    }
}
