//! Scratch slot planning.
//!
//! Before an evaluation runs, the tree is flattened into a [`Plan`]: one
//! [`NodePlan`] per lazy node, numbered in pre-order, recording how many
//! scratch slots the node needs, which slot each of its lazy operands is
//! evaluated into and in which order. The engine then allocates exactly
//! `plan.slots()` scratch values once and threads slot ranges down the tree.
//!
//! # Counting
//!
//! A node evaluated into a fresh slot needs `T` slots, counting the slot that
//! receives its own value. A node evaluated into a caller's destination needs
//! `I` slots, not counting the destination. Immediates, the destination
//! placeholder and tuple components are read in place and cost nothing.
//!
//! Lazy operands are evaluated most expensive first, ties left to right, the
//! `i`-th one (from 0) into the `i`-th slot of the node's range. While it runs
//! the `i` values evaluated before it stay live, so the operands need
//! `SU = max(cost_i + i)` slots. For two operands this is `max(L, R)` when
//! they differ and `L + 1` when they are equal.
//!
//! ```text
//! T = max(SU, max(H, 1) + r)     generic node, fresh
//! I = max(SU, H + r)             generic node, into a destination
//! ```
//!
//! `H` is the number of lazy operands and `r` the scratch the rule declares.
//! A fused node never materialises its product. Fresh, it keeps the addend
//! (an immediate addend is copied and costs 1) and both factors live and
//! needs `max(SU(addend, y, z), H + r)`. Into a destination the addend is
//! evaluated into the destination first, so only the factors are held:
//! `max(I(addend), SU(y, z), H + r)`.

use std::{cmp::Reverse, fmt};

use itertools::Itertools;
use smallvec::SmallVec;

use crate::{
    backend::Backend,
    expr::{Expr, Node, Operand},
    fusion::{Fused, Shape},
    operation::Operation,
    rules::Rule,
};

/// Where a node delivers its value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    /// Into the first slot of the node's range.
    Fresh,
    /// Into the destination of the evaluation.
    Into,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// Immediate, destination placeholder or tuple component.
    Leaf,
    Apply,
    /// A fused node evaluated with its fused rule.
    Fused,
    /// A fused node evaluated as the plain `+`/`-` over a materialised product.
    Unfused,
    /// The product of an unfused node.
    Product,
}

/// One operand position of a node.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Item {
    /// The operand occupies a slot of the node's range.
    pub held: bool,
    /// Plan of the operand's own node.
    pub child: Option<u32>,
    /// Slot offset inside the node's range.
    pub position: Option<u8>,
    pub cost: usize,
}

impl Item {
    fn held(child: u32, cost: usize) -> Self {
        Self {
            held: true,
            child: Some(child),
            position: None,
            cost,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodePlan<K> {
    pub op: Operation,
    pub kind: K,
    pub placement: Placement,
    pub strategy: Strategy,
    /// `T` for fresh nodes, `I` for nodes writing the destination.
    pub cost: usize,
    pub held: usize,
    pub items: SmallVec<[Item; 3]>,
    /// Held items, in evaluation order.
    pub order: SmallVec<[u8; 3]>,
    pub scratch: SmallVec<[K; 2]>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Plan<K> {
    nodes: Vec<NodePlan<K>>,
    slots: Vec<K>,
}

impl<K> Default for Plan<K> {
    fn default() -> Self {
        Self {
            nodes: Vec::new(),
            slots: Vec::new(),
        }
    }
}

impl<K: Copy> Plan<K> {
    /// Number of scratch values the evaluation allocates.
    pub fn slots(&self) -> usize {
        self.slots.len()
    }

    /// Kind of the first value each slot receives.
    pub fn slot_kinds(&self) -> &[K] {
        &self.slots
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    #[inline(always)]
    pub fn node(&self, id: u32) -> &NodePlan<K> {
        &self.nodes[id as usize]
    }

    pub fn root(&self) -> Option<&NodePlan<K>> {
        self.nodes.first()
    }

    pub fn iter(&self) -> impl Iterator<Item = (u32, &NodePlan<K>)> {
        self.nodes.iter().enumerate().map(|(id, node)| (id as u32, node))
    }

    pub(crate) fn allocate<B: Backend<Kind = K>>(&self) -> Vec<B::Value> {
        self.slots.iter().map(|&kind| B::scratch(kind)).collect()
    }
}

impl<K: fmt::Display + Copy> fmt::Display for Plan<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        crate::debug::write_plan(f, self)
    }
}

/// An operand position as seen by the planner and the engine.
///
/// `Product` stands for the `y*z` of a fused node evaluated without its
/// fused rule, which has no expression node of its own.
pub(crate) enum Arg<'e, 'a, B: Backend> {
    Operand(&'e Operand<'a, B>),
    Product(&'e Fused<'a, B>),
}

impl<B: Backend> Clone for Arg<'_, '_, B> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<B: Backend> Copy for Arg<'_, '_, B> {}

impl<'a, B: Backend> Fused<'a, B> {
    /// The operands of the plain `+`/`-` rule, in written order.
    pub(crate) fn outer_args(&self) -> [Arg<'_, 'a, B>; 2] {
        match self.shape {
            Shape::AddendLeft => [Arg::Operand(&self.addend), Arg::Product(self)],
            Shape::ProductLeft => [Arg::Product(self), Arg::Operand(&self.addend)],
        }
    }

    pub(crate) fn factor_args(&self) -> [Arg<'_, 'a, B>; 2] {
        [Arg::Operand(&self.factors[0]), Arg::Operand(&self.factors[1])]
    }

    /// Scratch kinds covering both the fused rule and the addend negation.
    pub(crate) fn scratch(&self) -> SmallVec<[B::Kind; 2]> {
        match self.negate {
            Some(negate) if negate.rule.scratch.len() > self.rule.scratch.len() => negate.rule.scratch.clone(),
            _ => self.rule.scratch.clone(),
        }
    }
}

/// Plans `expr` for the given placement of its outermost node.
///
/// With `fusion` disabled every fused node is planned as its plain two-step
/// evaluation.
pub fn plan<B: Backend>(expr: &Expr<'_, B>, placement: Placement, fusion: bool) -> Plan<B::Kind> {
    let mut planner = Planner {
        nodes: Vec::new(),
        fusion,
    };
    let root = planner.node(expr, placement);
    let mut slots = vec![None; planner.nodes[root as usize].cost];
    planner.place(root, 0, &mut slots);

    Plan {
        nodes: planner.nodes,
        slots: slots.into_iter().map(|kind| kind.unwrap_or(expr.kind())).collect(),
    }
}

/// Slots needed to evaluate `expr` for the given placement.
pub fn count<B: Backend>(expr: &Expr<'_, B>, placement: Placement, fusion: bool) -> usize {
    plan(expr, placement, fusion).slots()
}

struct Planner<K> {
    nodes: Vec<NodePlan<K>>,
    fusion: bool,
}

impl<K: Copy> Planner<K> {
    fn reserve(&mut self, op: Operation, kind: K, placement: Placement, strategy: Strategy) -> u32 {
        let id = self.nodes.len() as u32;
        self.nodes.push(NodePlan {
            op,
            kind,
            placement,
            strategy,
            cost: 0,
            held: 0,
            items: SmallVec::new(),
            order: SmallVec::new(),
            scratch: SmallVec::new(),
        });
        id
    }

    fn node<B: Backend<Kind = K>>(&mut self, expr: &Expr<'_, B>, placement: Placement) -> u32 {
        match &expr.node {
            Node::Immediate(_) | Node::Target => self.reserve(Operation::Immediate, expr.kind(), placement, Strategy::Leaf),
            Node::Component { tuple, .. } => self.reserve(tuple.rule.op(), expr.kind(), placement, Strategy::Leaf),
            Node::Apply { rule, operands } => {
                let args: SmallVec<[Arg<'_, '_, B>; 3]> = operands.iter().map(Arg::Operand).collect();
                self.apply(rule.rule, &args, expr.kind(), placement, Strategy::Apply)
            }
            Node::Fused(fused) => {
                let in_place = placement == Placement::Fresh || fused.accumulates_in_place();
                if self.fusion && in_place {
                    self.fused(fused, expr.kind(), placement)
                } else {
                    self.apply(fused.outer.rule, &fused.outer_args(), expr.kind(), placement, Strategy::Unfused)
                }
            }
        }
    }

    fn item<B: Backend<Kind = K>>(&mut self, arg: Arg<'_, '_, B>) -> Item {
        match arg {
            Arg::Operand(operand) => match operand.held_expr() {
                Some(expr) => {
                    let child = self.node(expr, Placement::Fresh);
                    Item::held(child, self.nodes[child as usize].cost)
                }
                None => Item::default(),
            },
            Arg::Product(fused) => {
                let args = fused.factor_args();
                let child = self.apply(fused.times.rule, &args, fused.product_kind, Placement::Fresh, Strategy::Product);
                Item::held(child, self.nodes[child as usize].cost)
            }
        }
    }

    fn apply<B: Backend<Kind = K>>(&mut self, rule: &Rule<B>, args: &[Arg<'_, '_, B>], kind: K, placement: Placement, strategy: Strategy) -> u32 {
        let id = self.reserve(rule.op.clone(), kind, placement, strategy);
        let mut items: SmallVec<[Item; 3]> = args.iter().map(|&arg| self.item(arg)).collect();
        let (order, su) = layout(&mut items);
        let held = order.len();
        let scratch = rule.scratch.len();

        let node = &mut self.nodes[id as usize];
        node.cost = match placement {
            Placement::Fresh => su.max(held.max(1) + scratch),
            Placement::Into => su.max(held + scratch),
        };
        node.held = held;
        node.items = items;
        node.order = order;
        node.scratch = rule.scratch.clone();
        id
    }

    fn fused<B: Backend<Kind = K>>(&mut self, fused: &Fused<'_, B>, kind: K, placement: Placement) -> u32 {
        let id = self.reserve(Operation::Ternary(fused.op), kind, placement, Strategy::Fused);
        let scratch = fused.scratch();

        let addend = match (placement, fused.addend.held_expr()) {
            (Placement::Fresh, Some(expr)) => {
                let child = self.node(expr, Placement::Fresh);
                Item::held(child, self.nodes[child as usize].cost)
            }
            // Copied into its slot.
            (Placement::Fresh, None) => Item {
                held: true,
                cost: 1,
                ..Item::default()
            },
            (Placement::Into, Some(expr)) => {
                let child = self.node(expr, Placement::Into);
                Item {
                    child: Some(child),
                    cost: self.nodes[child as usize].cost,
                    ..Item::default()
                }
            }
            (Placement::Into, None) => Item::default(),
        };

        let [y, z] = fused.factor_args();
        let mut items: SmallVec<[Item; 3]> = SmallVec::new();
        items.push(addend);
        items.push(self.item(y));
        items.push(self.item(z));

        let (order, su) = layout(&mut items);
        let held = order.len();

        let node = &mut self.nodes[id as usize];
        node.cost = match placement {
            Placement::Fresh => su.max(held + scratch.len()),
            Placement::Into => addend.cost.max(su).max(held + scratch.len()),
        };
        node.held = held;
        node.items = items;
        node.order = order;
        node.scratch = scratch;
        id
    }

    /// Records the kind of the first value every slot receives.
    fn place(&self, id: u32, base: usize, slots: &mut [Option<K>]) {
        let node = &self.nodes[id as usize];
        if node.placement == Placement::Fresh && node.strategy != Strategy::Leaf {
            claim(slots, base, node.kind);
        }

        for item in &node.items {
            match (item.child, item.position) {
                (Some(child), Some(position)) => self.place(child, base + position as usize, slots),
                // The addend of a fused node written into the destination.
                (Some(child), None) => self.place(child, base, slots),
                (None, Some(position)) => claim(slots, base + position as usize, node.kind),
                (None, None) => {}
            }
        }

        let offset = match node.placement {
            Placement::Fresh => base + node.held.max(1),
            Placement::Into => base + node.held,
        };
        for (i, &kind) in node.scratch.iter().enumerate() {
            claim(slots, offset + i, kind);
        }
    }
}

fn claim<K>(slots: &mut [Option<K>], index: usize, kind: K) {
    if let Some(slot @ None) = slots.get_mut(index) {
        *slot = Some(kind);
    }
}

/// Orders the held items and assigns their slot offsets, returning the order
/// and the slots needed to keep them live.
fn layout(items: &mut [Item]) -> (SmallVec<[u8; 3]>, usize) {
    let order: SmallVec<[u8; 3]> = items
        .iter()
        .enumerate()
        .filter(|(_, item)| item.held)
        .sorted_by_key(|(i, item)| (Reverse(item.cost), *i))
        .map(|(i, _)| i as u8)
        .collect();

    let mut needed = 0;
    for (rank, &i) in order.iter().enumerate() {
        let item = &mut items[i as usize];
        item.position = Some(rank as u8);
        needed = needed.max(item.cost + rank);
    }
    (order, needed)
}

#[cfg(test)]
mod tests {
    use rstest::{fixture, rstest};

    use super::*;
    use crate::testing::{Ints, TestValue, val};

    type E<'a> = Expr<'a, Ints>;

    #[fixture]
    fn values() -> [TestValue; 3] {
        [val(2), val(3), val(4)]
    }

    fn item(cost: usize) -> Item {
        Item {
            held: true,
            cost,
            ..Item::default()
        }
    }

    #[rstest]
    #[case::empty(vec![], vec![], 0)]
    #[case::single(vec![item(3)], vec![0], 3)]
    #[case::equal(vec![item(1), item(1)], vec![0, 1], 2)]
    #[case::right_heavier(vec![item(1), item(2)], vec![1, 0], 2)]
    #[case::three_equal(vec![item(1), item(1), item(1)], vec![0, 1, 2], 3)]
    #[case::mixed(vec![item(1), item(4), item(2)], vec![1, 2, 0], 4)]
    #[case::skips_loose(vec![Item::default(), item(2)], vec![1], 2)]
    fn test_layout(#[case] mut items: Vec<Item>, #[case] order: Vec<u8>, #[case] needed: usize) {
        let (got, su) = layout(&mut items);
        assert_eq!(got.as_slice(), order.as_slice());
        assert_eq!(su, needed);
        for (rank, &i) in got.iter().enumerate() {
            assert_eq!(items[i as usize].position, Some(rank as u8));
        }
    }

    #[rstest]
    fn test_sum_of_two_named_values(values: [TestValue; 3]) {
        let [a, b, _] = &values;
        let sum = (E::value(a) + E::value(b)).unwrap();
        assert_eq!(count(&sum, Placement::Into, true), 0);
        assert_eq!(count(&sum, Placement::Fresh, true), 1);
    }

    #[rstest]
    fn test_nested_quotients(values: [TestValue; 3]) {
        let [a, b, c] = &values;
        let (a, b, c) = (E::value(a), E::value(b), E::value(c));
        let left = ((&a / &c).unwrap() + (&b % &a).unwrap()).unwrap();
        let right = ((&b + &c).unwrap() + (&c / &a).unwrap()).unwrap();
        let tree = (left / right).unwrap();

        let plan = plan(&tree, Placement::Into, true);
        assert_eq!(plan.slots(), 3);
        assert_eq!(plan.len(), 7);

        let root = plan.root().unwrap();
        assert_eq!(root.held, 2);
        assert_eq!(root.order.as_slice(), &[0, 1]);
        assert_eq!(root.items[0].position, Some(0));
        assert_eq!(root.items[1].position, Some(1));
    }

    #[rstest]
    fn test_declared_scratch_is_counted(values: [TestValue; 3]) {
        let [a, _, _] = &values;
        let fac = E::named("fac", [E::value(a)]).unwrap();
        assert_eq!(count(&fac, Placement::Fresh, true), 2);
        assert_eq!(count(&fac, Placement::Into, true), 1);
    }

    #[rstest]
    fn test_fused_into_keeps_addend_in_destination(values: [TestValue; 3]) {
        let [a, b, c] = &values;
        let tree = (E::value(a) + (E::value(b) * E::value(c)).unwrap()).unwrap();

        let fused = plan(&tree, Placement::Into, true);
        assert_eq!(fused.slots(), 0);
        assert_eq!(fused.root().unwrap().strategy, Strategy::Fused);

        let unfused = plan(&tree, Placement::Into, false);
        assert_eq!(unfused.slots(), 1);
        assert_eq!(unfused.root().unwrap().strategy, Strategy::Unfused);
        assert_eq!(unfused.node(1).strategy, Strategy::Product);
    }

    #[rstest]
    fn test_aliasing_factors_fall_back_to_two_steps(values: [TestValue; 3]) {
        let [_, b, _] = &values;
        let tree = (E::value(b) + (E::target_of(b) * E::value(b)).unwrap()).unwrap();
        assert_eq!(plan(&tree, Placement::Into, true).root().unwrap().strategy, Strategy::Unfused);
        assert_eq!(plan(&tree, Placement::Fresh, true).root().unwrap().strategy, Strategy::Fused);
    }

    #[rstest]
    fn test_slot_kinds_follow_first_use(values: [TestValue; 3]) {
        let [a, _, _] = &values;
        let fac = E::named("fac", [E::value(a)]).unwrap();
        let plan = plan(&fac, Placement::Fresh, true);
        assert_eq!(plan.slot_kinds(), &[crate::testing::TestKind::Int, crate::testing::TestKind::Int]);
    }
}
