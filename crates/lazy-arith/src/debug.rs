//! Human-readable dumps of evaluation plans.
//!
//! ```text
//! === Plan (slots: 3) ===
//! 0000 [into apply cost=3 held=2] / -> int items=[#1@0, #4@1]
//! 0001 [fresh apply cost=2 held=2] + -> int items=[#2@0, #3@1]
//! ```

use std::fmt::{self, Write as _};

use itertools::Itertools;

use crate::temporaries::{Item, Placement, Plan, Strategy};

impl fmt::Display for Placement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Placement::Fresh => write!(f, "fresh"),
            Placement::Into => write!(f, "into"),
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Strategy::Leaf => write!(f, "leaf"),
            Strategy::Apply => write!(f, "apply"),
            Strategy::Fused => write!(f, "fused"),
            Strategy::Unfused => write!(f, "unfused"),
            Strategy::Product => write!(f, "product"),
        }
    }
}

impl fmt::Display for Item {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.child, self.position) {
            (Some(child), Some(position)) => write!(f, "#{child}@{position}"),
            (Some(child), None) => write!(f, "#{child}"),
            (None, Some(position)) => write!(f, "copy@{position}"),
            (None, None) => write!(f, "-"),
        }
    }
}

pub(crate) fn write_plan<K: fmt::Display + Copy>(f: &mut fmt::Formatter<'_>, plan: &Plan<K>) -> fmt::Result {
    writeln!(f, "=== Plan (slots: {}) ===", plan.slots())?;
    for (id, node) in plan.iter() {
        writeln!(
            f,
            "{:04} [{} {} cost={} held={}] {} -> {} items=[{}]",
            id,
            node.placement,
            node.strategy,
            node.cost,
            node.held,
            node.op,
            node.kind,
            node.items.iter().join(", ")
        )?;
    }
    if !plan.slot_kinds().is_empty() {
        writeln!(f, "slots: {}", plan.slot_kinds().iter().join(", "))?;
    }
    Ok(())
}

pub fn dump_plan<K: fmt::Display + Copy>(plan: &Plan<K>) -> String {
    let mut out = String::new();
    let _ = write!(out, "{plan}");
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        expr::Expr,
        temporaries::{self, Placement},
        testing::{Ints, val},
    };

    #[test]
    fn test_dump_plan() {
        let (a, b, c) = (val(2), val(3), val(4));
        let tree = (Expr::<Ints>::value(&a) / (Expr::value(&b) + Expr::value(&c)).unwrap()).unwrap();
        let plan = temporaries::plan(&tree, Placement::Into, true);
        assert_eq!(
            dump_plan(&plan),
            "=== Plan (slots: 1) ===\n\
             0000 [into apply cost=1 held=1] / -> int items=[-, #1@0]\n\
             0001 [fresh apply cost=1 held=0] + -> int items=[-, -]\n\
             slots: int\n"
        );
    }

    #[test]
    fn test_empty_plan() {
        assert_eq!(dump_plan(&Plan::<&str>::default()), "=== Plan (slots: 0) ===\n");
    }
}
