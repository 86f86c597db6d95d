//! Prediction modes and the conflict analysis that decides when SLL
//! prediction must stop or fail over to full context.

use hashbrown::HashMap;

use crate::atn::{Atn, AtnConfigSet, PredictionContext, SemanticContext, StateId};
use crate::util::BitSet;

/// How much context the parser simulator uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PredictionMode {
    /// Strong-LL: wildcard stacks, fail over to LL on conflict. The default,
    /// and sufficient for almost every decision.
    #[default]
    Sll,
    /// Full-context prediction after an SLL conflict.
    Ll,
    /// Like `Ll`, but keeps consuming until the exact ambiguous alternative
    /// set is known. Diagnostic tool, not a production mode.
    LlExactAmbigDetection,
}

/// Key for conflict buckets: configurations conflict only when they share
/// both state and stack.
#[derive(PartialEq, Eq, Hash)]
struct StateAndStack(StateId, PredictionContext);

/// Partitions `configs` by `(state, context)` and reports the set of
/// alternatives in each bucket.
#[must_use]
pub fn conflicting_alt_subsets(configs: &AtnConfigSet) -> Vec<BitSet> {
    let mut buckets: HashMap<StateAndStack, BitSet, ahash::RandomState> = HashMap::default();
    for config in configs {
        buckets
            .entry(StateAndStack(config.state, config.context.clone()))
            .or_default()
            .set(config.alt);
    }
    buckets.into_values().collect()
}

/// Alternatives represented per ATN state, ignoring stacks.
#[must_use]
pub fn state_to_alt_map(configs: &AtnConfigSet) -> HashMap<StateId, BitSet, ahash::RandomState> {
    let mut map: HashMap<StateId, BitSet, ahash::RandomState> = HashMap::default();
    for config in configs {
        map.entry(config.state).or_default().set(config.alt);
    }
    map
}

fn has_state_associated_with_one_alt(configs: &AtnConfigSet) -> bool {
    state_to_alt_map(configs)
        .values()
        .any(|alts| alts.cardinality() == 1)
}

fn has_conflicting_alt_set(altsets: &[BitSet]) -> bool {
    altsets.iter().any(|alts| alts.cardinality() > 1)
}

fn has_non_conflicting_alt_set(altsets: &[BitSet]) -> bool {
    altsets.iter().any(|alts| alts.cardinality() == 1)
}

#[must_use]
pub fn all_subsets_conflict(altsets: &[BitSet]) -> bool {
    !has_non_conflicting_alt_set(altsets)
}

#[must_use]
pub fn all_subsets_equal(altsets: &[BitSet]) -> bool {
    altsets.windows(2).all(|w| w[0] == w[1])
}

/// Union of every subset.
#[must_use]
pub fn all_alts(altsets: &[BitSet]) -> BitSet {
    let mut union = BitSet::new();
    for alts in altsets {
        union.or_with(alts);
    }
    union
}

/// Full-LL termination: every bucket votes for its minimum alternative; if
/// exactly one alternative collects every vote, prediction can stop with it.
#[must_use]
pub fn resolves_to_just_one_viable_alt(altsets: &[BitSet]) -> Option<usize> {
    let mut viable = BitSet::new();
    for alts in altsets {
        viable.set(alts.min_set_bit().expect("non-empty subset"));
        if viable.cardinality() > 1 {
            return None;
        }
    }
    viable.min_set_bit()
}

#[must_use]
pub fn has_config_in_rule_stop_state(atn: &Atn, configs: &AtnConfigSet) -> bool {
    configs
        .iter()
        .any(|c| atn.state(c.state).is_rule_stop())
}

#[must_use]
pub fn all_configs_in_rule_stop_states(atn: &Atn, configs: &AtnConfigSet) -> bool {
    configs
        .iter()
        .all(|c| atn.state(c.state).is_rule_stop())
}

/// The SLL termination heuristic: stop (and mark the DFA state as requiring
/// full context) when some `(state, stack)` bucket holds more than one
/// alternative and no state is pinned to a single alternative.
///
/// Semantic contexts are stripped before the analysis when failing over to
/// full LL remains possible, so predicated configurations of one alternative
/// cannot mask a conflict.
#[must_use]
pub fn has_sll_conflict_terminating_prediction(
    atn: &Atn,
    mode: PredictionMode,
    configs: &AtnConfigSet,
) -> bool {
    // Configurations in rule stop states can match no further input, so
    // prediction must stop no matter what.
    if all_configs_in_rule_stop_states(atn, configs) {
        return true;
    }

    if mode == PredictionMode::Sll || !configs.has_semantic_context {
        let altsets = conflicting_alt_subsets(configs);
        return has_conflicting_alt_set(&altsets) && !has_state_associated_with_one_alt(configs);
    }

    let mut stripped = AtnConfigSet::new(true);
    for config in configs {
        let mut dup = config.clone();
        dup.semantic_context = SemanticContext::NONE;
        stripped.add(dup);
    }
    let altsets = conflicting_alt_subsets(&stripped);
    has_conflicting_alt_set(&altsets) && !has_state_associated_with_one_alt(&stripped)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bits(values: &[usize]) -> BitSet {
        values.iter().copied().collect()
    }

    #[test]
    fn subsets_conflict_detection() {
        assert!(all_subsets_conflict(&[bits(&[1, 2]), bits(&[1, 2])]));
        assert!(!all_subsets_conflict(&[bits(&[1, 2]), bits(&[1])]));
        assert!(has_conflicting_alt_set(&[bits(&[1]), bits(&[1, 2])]));
        assert!(!has_conflicting_alt_set(&[bits(&[1]), bits(&[2])]));
    }

    #[test]
    fn subsets_equality() {
        assert!(all_subsets_equal(&[bits(&[1, 2]), bits(&[1, 2])]));
        assert!(!all_subsets_equal(&[bits(&[1, 2]), bits(&[1])]));
        assert!(all_subsets_equal(&[]));
    }

    #[test]
    fn one_viable_alt_by_minimum_vote() {
        assert_eq!(
            resolves_to_just_one_viable_alt(&[bits(&[1, 2]), bits(&[1, 3])]),
            Some(1)
        );
        assert_eq!(
            resolves_to_just_one_viable_alt(&[bits(&[1, 2]), bits(&[2, 3])]),
            None
        );
    }

    #[test]
    fn union_of_subsets() {
        let union = all_alts(&[bits(&[1]), bits(&[3])]);
        assert_eq!(union.iter().collect::<Vec<_>>(), vec![1, 3]);
    }
}
