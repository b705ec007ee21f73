//! Property-based tests for evaluation of integer expression trees.
use lazy_arith::{Engine, Expr, Mode, Options};
use lazy_arith_num::{Kind, Num, Number};
use num_bigint::BigInt;
use proptest::prelude::*;


use strategies::{arb_sum_tree, arb_tree};

fn fused() -> Engine<Num> {
    Engine::default()
}

fn unfused() -> Engine<Num> {
    Engine::new(Options::default().with_fusion(false))
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    #[test]
    fn test_fusion_preserves_values(tree in arb_tree()) {
        let expr = tree.expr();
        let expected = Number::from(tree.value());

        prop_assert_eq!(fused().evaluate(&expr).unwrap().into_owned(), expected.clone());
        prop_assert_eq!(unfused().evaluate(&expr).unwrap().into_owned(), expected);
    }

    #[test]
    fn test_evaluate_into_matches_evaluate(tree in arb_tree(), seed in -50i64..50) {
        let expr = tree.expr();
        let engine = fused();

        let mut dest = Number::from(seed);
        engine.evaluate_into(&mut dest, &expr).unwrap();
        let fresh = engine.evaluate(&expr).unwrap();
        prop_assert_eq!(&dest, fresh.as_ref());
    }

    #[test]
    fn test_evaluation_is_repeatable(tree in arb_tree()) {
        let expr = tree.expr();
        let engine = fused();

        let first = engine.evaluate(&expr).unwrap().into_owned();
        let second = engine.evaluate(&expr).unwrap().into_owned();
        prop_assert_eq!(first, second);
    }

    #[test]
    fn test_stats_report_planned_slots(tree in arb_tree()) {
        let expr = tree.expr();
        let engine = fused();

        let (_, stats) = engine.evaluate_with_stats(&expr).unwrap();
        prop_assert_eq!(stats.slots, engine.count_temporaries(&expr, Mode::Fresh).unwrap());

        let mut dest = Number::from(0);
        let stats = engine.evaluate_into_with_stats(&mut dest, &expr).unwrap();
        prop_assert_eq!(stats.slots, engine.count_temporaries(&expr, Mode::Into(Kind::Integer)).unwrap());
    }

    #[test]
    fn test_conversion_into_rational_destination(tree in arb_tree()) {
        let expr = tree.expr();
        let mut dest = Number::rat(1, 3).unwrap();

        fused().evaluate_into(&mut dest, &expr).unwrap();
        prop_assert_eq!(dest, Number::rat(tree.value(), 1).unwrap());
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    #[test]
    fn test_fusion_never_adds_slots_into_destination(
        x in arb_sum_tree(),
        y in arb_sum_tree(),
        z in arb_sum_tree(),
    ) {
        let expr = (x.expr() + (y.expr() * z.expr()).unwrap()).unwrap();
        prop_assert!(expr.is_fused());

        let mode = Mode::Into(Kind::Integer);
        let with_fusion = fused().count_temporaries(&expr, mode).unwrap();
        let without_fusion = unfused().count_temporaries(&expr, mode).unwrap();
        prop_assert!(with_fusion <= without_fusion, "{} > {}", with_fusion, without_fusion);

        let mut dest = Number::from(0);
        fused().evaluate_into(&mut dest, &expr).unwrap();
        prop_assert_eq!(dest, Number::from(x.value() + y.value() * z.value()));
    }

    #[test]
    fn test_compound_assignment(seed in -50i64..50, tree in arb_tree()) {
        let mut dest = Number::from(seed);
        fused().add_assign(&mut dest, tree.expr()).unwrap();
        prop_assert_eq!(dest, Number::from(BigInt::from(seed) + tree.value()));

        let mut dest = Number::from(seed);
        fused().mul_assign(&mut dest, tree.expr()).unwrap();
        prop_assert_eq!(dest, Number::from(BigInt::from(seed) * tree.value()));
    }

    #[test]
    fn test_destination_inside_product(seed in -50i64..50, tree in arb_tree()) {
        let expected = BigInt::from(seed) - BigInt::from(seed) * tree.value();

        for engine in [fused(), unfused()] {
            let mut dest = Number::from(seed);
            let rhs = (Expr::<Num>::target_of(&dest) * tree.expr()).unwrap();
            engine.sub_assign(&mut dest, rhs).unwrap();
            prop_assert_eq!(dest, Number::from(expected.clone()));
        }
    }
}
