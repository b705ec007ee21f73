//! Rule registry and resolution.
//!
//! Every operation a backend supports is described by a rule keyed by
//! `(operation, operand kinds)`. The table is immutable once built and each
//! key resolves to at most one rule: registering the same key twice, including
//! through the mirrored key of a commutative rule, fails the build. A missing
//! key is how an operator is reported as unavailable for a kind combination.
//!
//! # Example
//!
//! ```rust,ignore
//! static RULES: LazyLock<RuleTable<Ints>> = LazyLock::new(|| {
//!     RuleTable::builder()
//!         .rule(Rule::binary(BinaryOp::Plus, [Int, Int], Int, int_plus))
//!         .rule(Rule::binary(BinaryOp::Plus, [Int, Wide], Wide, int_wide_plus).commutative())
//!         .fused(FusedRule::new(TernaryOp::FusedPlusTimes, [Int, Int, Int], int_addmul))
//!         .build()
//!         .unwrap_or_else(|err| panic!("{err}"))
//! });
//! ```

use std::{collections::hash_map::Entry, fmt};

use rustc_hash::FxHashMap;
use smallvec::SmallVec;
use tracing::debug;

use crate::{
    backend::{Backend, Src},
    error::{Kinds, RegistryError, ShapeError},
    operation::{BinaryOp, OpName, Operation, TernaryOp, UnaryOp},
};

type Value<B> = <B as Backend>::Value;
type Kind<B> = <B as Backend>::Kind;
type BackendError<B> = <B as Backend>::Error;

/// Writes the result of a unary or binary rule into its destination.
///
/// The last argument holds the scratch values declared by the rule.
pub type RuleFn<B> = fn(&mut Value<B>, &[Src<'_, Value<B>>], &mut [Value<B>]) -> Result<(), BackendError<B>>;

/// Accumulates `y*z` into the first argument, adding or subtracting it.
pub type FusedFn<B> = fn(&mut Value<B>, Src<'_, Value<B>>, Src<'_, Value<B>>, &mut [Value<B>]) -> Result<(), BackendError<B>>;

pub type TupleFn<B> = fn(&[&Value<B>]) -> Result<SmallVec<[Value<B>; 3]>, BackendError<B>>;

pub type AssignFn<B> = fn(&mut Value<B>, &Value<B>) -> Result<(), BackendError<B>>;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RuleKey<K> {
    pub op: Operation,
    pub kinds: Kinds<K>,
}

pub struct Rule<B: Backend> {
    pub op: Operation,
    pub operands: Kinds<Kind<B>>,
    pub result: Kind<B>,
    pub scratch: SmallVec<[Kind<B>; 2]>,
    pub commutative: bool,
    pub eval: RuleFn<B>,
}

impl<B: Backend> Rule<B> {
    pub fn unary(op: UnaryOp, operand: Kind<B>, result: Kind<B>, eval: RuleFn<B>) -> Self {
        Self::new(Operation::Unary(op), Kinds::from_slice(&[operand]), result, eval)
    }

    pub fn binary(op: BinaryOp, operands: [Kind<B>; 2], result: Kind<B>, eval: RuleFn<B>) -> Self {
        Self::new(Operation::Binary(op), Kinds::from_slice(&operands), result, eval)
    }

    pub fn new(op: Operation, operands: Kinds<Kind<B>>, result: Kind<B>, eval: RuleFn<B>) -> Self {
        Self {
            op,
            operands,
            result,
            scratch: SmallVec::new(),
            commutative: false,
            eval,
        }
    }

    /// Declares the scratch values the rule procedure receives.
    pub fn with_scratch(mut self, kinds: impl IntoIterator<Item = Kind<B>>) -> Self {
        self.scratch = kinds.into_iter().collect();
        self
    }

    /// Also registers the rule for the mirrored operand order.
    pub fn commutative(mut self) -> Self {
        self.commutative = true;
        self
    }

    pub fn key(&self) -> RuleKey<Kind<B>> {
        RuleKey {
            op: self.op.clone(),
            kinds: self.operands.clone(),
        }
    }
}

impl<B: Backend> fmt::Debug for Rule<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Rule")
            .field("op", &self.op)
            .field("operands", &self.operands)
            .field("result", &self.result)
            .field("scratch", &self.scratch)
            .field("commutative", &self.commutative)
            .finish()
    }
}

pub struct FusedRule<B: Backend> {
    pub op: TernaryOp,
    /// Kinds of the accumulator and the two factors.
    pub operands: [Kind<B>; 3],
    pub scratch: SmallVec<[Kind<B>; 2]>,
    pub eval: FusedFn<B>,
}

impl<B: Backend> FusedRule<B> {
    pub fn new(op: TernaryOp, operands: [Kind<B>; 3], eval: FusedFn<B>) -> Self {
        Self {
            op,
            operands,
            scratch: SmallVec::new(),
            eval,
        }
    }

    pub fn with_scratch(mut self, kinds: impl IntoIterator<Item = Kind<B>>) -> Self {
        self.scratch = kinds.into_iter().collect();
        self
    }

    /// The accumulator is the result, so its kind is the rule's result kind.
    #[inline(always)]
    pub fn result(&self) -> Kind<B> {
        self.operands[0]
    }
}

impl<B: Backend> fmt::Debug for FusedRule<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FusedRule")
            .field("op", &self.op)
            .field("operands", &self.operands)
            .field("scratch", &self.scratch)
            .finish()
    }
}

/// A rule producing several values at once, such as a quotient and remainder.
pub struct TupleRule<B: Backend> {
    pub name: OpName,
    pub operands: Kinds<Kind<B>>,
    pub results: Kinds<Kind<B>>,
    pub eval: TupleFn<B>,
}

impl<B: Backend> TupleRule<B> {
    pub fn new(name: &str, operands: &[Kind<B>], results: &[Kind<B>], eval: TupleFn<B>) -> Self {
        Self {
            name: name.into(),
            operands: Kinds::from_slice(operands),
            results: Kinds::from_slice(results),
            eval,
        }
    }

    pub fn op(&self) -> Operation {
        Operation::Tuple(self.name.clone())
    }
}

impl<B: Backend> fmt::Debug for TupleRule<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TupleRule")
            .field("name", &self.name)
            .field("operands", &self.operands)
            .field("results", &self.results)
            .finish()
    }
}

/// Conversion used when a value of kind `from` is stored into a `to` destination.
pub struct AssignRule<B: Backend> {
    pub to: Kind<B>,
    pub from: Kind<B>,
    pub eval: AssignFn<B>,
}

impl<B: Backend> AssignRule<B> {
    pub fn new(to: Kind<B>, from: Kind<B>, eval: AssignFn<B>) -> Self {
        Self { to, from, eval }
    }
}

impl<B: Backend> fmt::Debug for AssignRule<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AssignRule")
            .field("to", &self.to)
            .field("from", &self.from)
            .finish()
    }
}

/// A rule matched for a concrete operand order.
///
/// `swapped` is set when the match went through the mirrored key of a
/// commutative rule, the operands must then be handed over in reverse.
pub struct Resolved<'t, B: Backend> {
    pub rule: &'t Rule<B>,
    pub swapped: bool,
}

impl<B: Backend> Clone for Resolved<'_, B> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<B: Backend> Copy for Resolved<'_, B> {}

impl<B: Backend> fmt::Debug for Resolved<'_, B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resolved")
            .field("op", &self.rule.op)
            .field("swapped", &self.swapped)
            .finish()
    }
}

impl<B: Backend> Resolved<'_, B> {
    #[inline(always)]
    pub fn result(&self) -> Kind<B> {
        self.rule.result
    }

    pub fn call(&self, dest: &mut Value<B>, args: &mut [Src<'_, Value<B>>], scratch: &mut [Value<B>]) -> Result<(), BackendError<B>> {
        if self.swapped {
            args.reverse();
        }
        (self.rule.eval)(dest, args, scratch)
    }
}

/// Where the outermost node of an evaluation delivers its value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode<K> {
    /// A new value is produced, the outermost node writes the first scratch slot.
    Fresh,
    /// The value is stored into an existing destination of the given kind.
    Into(K),
}

pub enum Delivery<'t, B: Backend> {
    /// The outermost rule writes the destination itself.
    Direct,
    /// The node is evaluated into a slot and converted into the destination.
    Convert(&'t AssignRule<B>),
}

impl<B: Backend> fmt::Debug for Delivery<'_, B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Delivery::Direct => write!(f, "Direct"),
            Delivery::Convert(rule) => write!(f, "Convert({} <- {})", rule.to, rule.from),
        }
    }
}

pub struct RuleTable<B: Backend> {
    rules: Vec<Rule<B>>,
    index: FxHashMap<RuleKey<Kind<B>>, (usize, bool)>,
    fused: FxHashMap<(TernaryOp, [Kind<B>; 3]), FusedRule<B>>,
    tuples: FxHashMap<RuleKey<Kind<B>>, TupleRule<B>>,
    assignments: FxHashMap<(Kind<B>, Kind<B>), AssignRule<B>>,
}

impl<B: Backend> RuleTable<B> {
    pub fn builder() -> RuleTableBuilder<B> {
        RuleTableBuilder::default()
    }

    pub fn len(&self) -> usize {
        self.index.len() + self.fused.len() + self.tuples.len() + self.assignments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn resolve(&self, op: &Operation, kinds: &[Kind<B>]) -> Option<Resolved<'_, B>> {
        let key = RuleKey {
            op: op.clone(),
            kinds: Kinds::from_slice(kinds),
        };
        self.index.get(&key).map(|&(rule, swapped)| Resolved {
            rule: &self.rules[rule],
            swapped,
        })
    }

    pub fn require(&self, op: &Operation, kinds: &[Kind<B>]) -> Result<Resolved<'_, B>, ShapeError<Kind<B>>> {
        self.resolve(op, kinds).ok_or_else(|| ShapeError::NoRule {
            op: op.clone(),
            kinds: Kinds::from_slice(kinds),
        })
    }

    pub fn fused(&self, op: TernaryOp, kinds: [Kind<B>; 3]) -> Option<&FusedRule<B>> {
        self.fused.get(&(op, kinds))
    }

    pub fn tuple(&self, name: &str, kinds: &[Kind<B>]) -> Option<&TupleRule<B>> {
        let key = RuleKey {
            op: Operation::Tuple(name.into()),
            kinds: Kinds::from_slice(kinds),
        };
        self.tuples.get(&key)
    }

    pub fn assignment(&self, to: Kind<B>, from: Kind<B>) -> Option<&AssignRule<B>> {
        self.assignments.get(&(to, from))
    }

    /// Decides how a node of kind `natural` reaches the destination of `mode`.
    pub fn delivery(&self, natural: Kind<B>, mode: Mode<Kind<B>>) -> Result<Delivery<'_, B>, ShapeError<Kind<B>>> {
        match mode {
            Mode::Fresh => Ok(Delivery::Direct),
            Mode::Into(to) if to == natural => Ok(Delivery::Direct),
            Mode::Into(to) => self
                .assignment(to, natural)
                .map(Delivery::Convert)
                .ok_or(ShapeError::NoAssignment { to, from: natural }),
        }
    }

    /// All registered keys of plain rules, mirrored keys included.
    pub fn keys(&self) -> impl Iterator<Item = &RuleKey<Kind<B>>> {
        self.index.keys()
    }
}

impl<B: Backend> fmt::Debug for RuleTable<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuleTable")
            .field("rules", &self.index.len())
            .field("fused", &self.fused.len())
            .field("tuples", &self.tuples.len())
            .field("assignments", &self.assignments.len())
            .finish()
    }
}

pub struct RuleTableBuilder<B: Backend> {
    rules: Vec<Rule<B>>,
    fused: Vec<FusedRule<B>>,
    tuples: Vec<TupleRule<B>>,
    assignments: Vec<AssignRule<B>>,
}

impl<B: Backend> Default for RuleTableBuilder<B> {
    fn default() -> Self {
        Self {
            rules: Vec::new(),
            fused: Vec::new(),
            tuples: Vec::new(),
            assignments: Vec::new(),
        }
    }
}

impl<B: Backend> RuleTableBuilder<B> {
    pub fn rule(mut self, rule: Rule<B>) -> Self {
        self.rules.push(rule);
        self
    }

    pub fn fused(mut self, rule: FusedRule<B>) -> Self {
        self.fused.push(rule);
        self
    }

    pub fn tuple(mut self, rule: TupleRule<B>) -> Self {
        self.tuples.push(rule);
        self
    }

    pub fn assignment(mut self, rule: AssignRule<B>) -> Self {
        self.assignments.push(rule);
        self
    }

    pub fn build(self) -> Result<RuleTable<B>, RegistryError<Kind<B>>> {
        let mut index = FxHashMap::default();

        for (i, rule) in self.rules.iter().enumerate() {
            claim(&mut index, rule.key(), (i, false))?;

            if rule.commutative && rule.operands.len() == 2 && rule.operands[0] != rule.operands[1] {
                let mut mirrored = rule.key();
                mirrored.kinds.swap(0, 1);
                claim(&mut index, mirrored, (i, true))?;
            }
        }

        let mut fused = FxHashMap::default();
        for rule in self.fused {
            match fused.entry((rule.op, rule.operands)) {
                Entry::Occupied(_) => {
                    return Err(RegistryError::Ambiguous {
                        op: Operation::Ternary(rule.op),
                        kinds: Kinds::from_slice(&rule.operands),
                    });
                }
                Entry::Vacant(slot) => {
                    slot.insert(rule);
                }
            }
        }

        let mut tuples = FxHashMap::default();
        for rule in self.tuples {
            let key = RuleKey {
                op: rule.op(),
                kinds: rule.operands.clone(),
            };
            match tuples.entry(key) {
                Entry::Occupied(slot) => {
                    let RuleKey { op, kinds } = slot.key().clone();
                    return Err(RegistryError::Ambiguous { op, kinds });
                }
                Entry::Vacant(slot) => {
                    slot.insert(rule);
                }
            }
        }

        let mut assignments = FxHashMap::default();
        for rule in self.assignments {
            match assignments.entry((rule.to, rule.from)) {
                Entry::Occupied(_) => {
                    return Err(RegistryError::Ambiguous {
                        op: Operation::Immediate,
                        kinds: Kinds::from_slice(&[rule.to, rule.from]),
                    });
                }
                Entry::Vacant(slot) => {
                    slot.insert(rule);
                }
            }
        }

        debug!(
            rules = self.rules.len(),
            keys = index.len(),
            fused = fused.len(),
            tuples = tuples.len(),
            assignments = assignments.len(),
            "rule table built"
        );

        Ok(RuleTable {
            rules: self.rules,
            index,
            fused,
            tuples,
            assignments,
        })
    }
}

fn claim<K>(index: &mut FxHashMap<RuleKey<K>, (usize, bool)>, key: RuleKey<K>, entry: (usize, bool)) -> Result<(), RegistryError<K>>
where
    K: Copy + Eq + std::hash::Hash + fmt::Debug + fmt::Display,
{
    match index.entry(key) {
        Entry::Occupied(slot) => {
            let RuleKey { op, kinds } = slot.key().clone();
            Err(RegistryError::Ambiguous { op, kinds })
        }
        Entry::Vacant(slot) => {
            slot.insert(entry);
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;
    use smallvec::smallvec;

    use super::*;
    use crate::testing::{Ints, TestKind, TestValue, int_plus};

    #[rstest]
    #[case::exact(BinaryOp::Plus, [TestKind::Int, TestKind::Int], Some((TestKind::Int, false)))]
    #[case::declared_order(BinaryOp::Plus, [TestKind::Int, TestKind::Wide], Some((TestKind::Wide, false)))]
    #[case::mirrored(BinaryOp::Plus, [TestKind::Wide, TestKind::Int], Some((TestKind::Wide, true)))]
    #[case::not_registered(BinaryOp::Plus, [TestKind::Flag, TestKind::Int], None)]
    #[case::not_commutative(BinaryOp::Minus, [TestKind::Wide, TestKind::Int], None)]
    fn test_resolve(#[case] op: BinaryOp, #[case] kinds: [TestKind; 2], #[case] expected: Option<(TestKind, bool)>) {
        let resolved = Ints::rules()
            .resolve(&Operation::Binary(op), &kinds)
            .map(|r| (r.result(), r.swapped));
        assert_eq!(resolved, expected);
    }

    #[test]
    fn test_require_reports_missing_rule() {
        let err = Ints::rules()
            .require(&Operation::Binary(BinaryOp::Times), &[TestKind::Flag, TestKind::Flag])
            .unwrap_err();
        assert_eq!(
            err,
            ShapeError::NoRule {
                op: Operation::Binary(BinaryOp::Times),
                kinds: smallvec![TestKind::Flag, TestKind::Flag],
            }
        );
    }

    #[test]
    fn test_duplicate_registration_is_ambiguous() {
        let err = RuleTable::<Ints>::builder()
            .rule(Rule::binary(BinaryOp::Plus, [TestKind::Int, TestKind::Int], TestKind::Int, int_plus))
            .rule(Rule::binary(BinaryOp::Plus, [TestKind::Int, TestKind::Int], TestKind::Wide, int_plus))
            .build()
            .unwrap_err();
        assert_eq!(
            err,
            RegistryError::Ambiguous {
                op: Operation::Binary(BinaryOp::Plus),
                kinds: smallvec![TestKind::Int, TestKind::Int],
            }
        );
    }

    #[test]
    fn test_commutative_mirror_collides_with_explicit_rule() {
        let err = RuleTable::<Ints>::builder()
            .rule(Rule::binary(BinaryOp::Plus, [TestKind::Int, TestKind::Wide], TestKind::Wide, int_plus).commutative())
            .rule(Rule::binary(BinaryOp::Plus, [TestKind::Wide, TestKind::Int], TestKind::Wide, int_plus))
            .build()
            .unwrap_err();
        assert!(matches!(err, RegistryError::Ambiguous { .. }));
    }

    #[test]
    fn test_symmetric_commutative_rule_registers_once() {
        let table = RuleTable::<Ints>::builder()
            .rule(Rule::binary(BinaryOp::Plus, [TestKind::Int, TestKind::Int], TestKind::Int, int_plus).commutative())
            .build()
            .unwrap();
        assert_eq!(table.keys().count(), 1);
    }

    #[rstest]
    #[case::fresh(Mode::Fresh, "Direct")]
    #[case::same_kind(Mode::Into(TestKind::Int), "Direct")]
    #[case::widening(Mode::Into(TestKind::Wide), "Convert(wide <- int)")]
    fn test_delivery(#[case] mode: Mode<TestKind>, #[case] expected: &str) {
        let delivery = Ints::rules().delivery(TestKind::Int, mode).unwrap();
        assert_eq!(format!("{:?}", delivery), expected);
    }

    #[test]
    fn test_delivery_without_assignment() {
        let err = Ints::rules().delivery(TestKind::Wide, Mode::Into(TestKind::Int)).unwrap_err();
        assert_eq!(
            err,
            ShapeError::NoAssignment {
                to: TestKind::Int,
                from: TestKind::Wide,
            }
        );
    }

    #[test]
    fn test_call_reverses_mirrored_operands() {
        let resolved = Ints::rules()
            .resolve(&Operation::Binary(BinaryOp::Minus), &[TestKind::Int, TestKind::Int])
            .unwrap();
        let (five, two) = (TestValue::Int(5), TestValue::Int(2));
        let mut dest = TestValue::Int(0);
        resolved
            .call(&mut dest, &mut [Src::Val(&five), Src::Val(&two)], &mut [])
            .unwrap();
        assert_eq!(dest, TestValue::Int(3));

        let mirrored = Resolved { swapped: true, ..resolved };
        mirrored
            .call(&mut dest, &mut [Src::Val(&five), Src::Val(&two)], &mut [])
            .unwrap();
        assert_eq!(dest, TestValue::Int(-3));
    }
}
