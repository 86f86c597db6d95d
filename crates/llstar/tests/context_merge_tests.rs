//! Properties of the prediction-context merge algebra.

use llstar::atn::{EMPTY_RETURN_STATE, PredictionContext};
use proptest::prelude::*;

fn single(ret: u32) -> PredictionContext {
    PredictionContext::singleton(PredictionContext::empty(), ret)
}

#[test]
fn singleton_merge_without_wildcard_yields_sorted_array() {
    // SINGLETON(empty, 5) + SINGLETON(empty, 7) = ARRAY[(empty,5),(empty,7)]
    let merged = PredictionContext::merge(&single(5), &single(7), false);
    assert_eq!(merged.len(), 2);
    assert_eq!(merged.return_state(0), 5);
    assert_eq!(merged.return_state(1), 7);
    assert!(merged.parent(0).expect("parent").is_empty());
    assert!(merged.parent(1).expect("parent").is_empty());
}

#[test]
fn wildcard_merge_with_empty_absorbs() {
    let merged = PredictionContext::merge(&single(5), &PredictionContext::empty(), true);
    assert!(merged.is_empty());
}

#[test]
fn full_context_merge_with_empty_keeps_dollar_last() {
    let merged = PredictionContext::merge(&PredictionContext::empty(), &single(5), false);
    assert_eq!(merged.len(), 2);
    assert_eq!(merged.return_state(1), EMPTY_RETURN_STATE);
    assert!(merged.parent(1).is_none());
    assert!(merged.has_empty_path());
}

#[test]
fn deep_merge_shares_parents() {
    let left = PredictionContext::singleton(single(1), 10);
    let right = PredictionContext::singleton(single(2), 10);
    let merged = PredictionContext::merge(&left, &right, false);
    assert_eq!(merged.len(), 1);
    let parent = merged.parent(0).expect("merged parent");
    assert_eq!(parent.len(), 2);
    assert_eq!(parent.return_state(0), 1);
    assert_eq!(parent.return_state(1), 2);
}

#[test]
fn merging_subset_array_returns_superset_input() {
    let a = PredictionContext::merge(&single(3), &single(8), false);
    let merged = PredictionContext::merge(&a, &single(8), false);
    assert_eq!(merged, a);
}

/// A small pool of structurally diverse contexts built the way closure
/// builds them: singleton pushes over merges.
fn context_strategy() -> impl Strategy<Value = PredictionContext> {
    let leaf = prop_oneof![
        Just(PredictionContext::empty()),
        (0u32..40).prop_map(single),
    ];
    leaf.prop_recursive(3, 24, 3, |inner| {
        prop_oneof![
            (inner.clone(), 0u32..40)
                .prop_map(|(parent, ret)| PredictionContext::singleton(parent, ret)),
            (inner.clone(), inner.clone(), any::<bool>())
                .prop_map(|(a, b, wildcard)| PredictionContext::merge(&a, &b, wildcard)),
        ]
    })
}

proptest! {
    #[test]
    fn merge_is_idempotent(ctx in context_strategy(), wildcard in any::<bool>()) {
        let merged = PredictionContext::merge(&ctx, &ctx, wildcard);
        prop_assert_eq!(merged, ctx);
    }

    #[test]
    fn merge_is_commutative(
        a in context_strategy(),
        b in context_strategy(),
        wildcard in any::<bool>(),
    ) {
        let ab = PredictionContext::merge(&a, &b, wildcard);
        let ba = PredictionContext::merge(&b, &a, wildcard);
        prop_assert_eq!(ab, ba);
    }

    #[test]
    fn wildcard_empty_absorbs_everything(ctx in context_strategy()) {
        let merged = PredictionContext::merge(&ctx, &PredictionContext::empty(), true);
        prop_assert!(merged.is_empty());
    }

    #[test]
    fn array_invariants_hold_after_merge(
        a in context_strategy(),
        b in context_strategy(),
        wildcard in any::<bool>(),
    ) {
        let merged = PredictionContext::merge(&a, &b, wildcard);
        // Return states non-strictly increasing, $ only in the last slot.
        for i in 1..merged.len() {
            prop_assert!(merged.return_state(i - 1) <= merged.return_state(i));
        }
        for i in 0..merged.len().saturating_sub(1) {
            prop_assert_ne!(merged.return_state(i), EMPTY_RETURN_STATE);
        }
    }

    #[test]
    fn equal_contexts_have_equal_hashes(
        a in context_strategy(),
        b in context_strategy(),
    ) {
        if a == b {
            prop_assert_eq!(a.hash_value(), b.hash_value());
        }
    }
}
