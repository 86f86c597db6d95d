//! Typed transitions between ATN states.

use crate::util::IntervalSet;

use super::state::StateId;

/// An edge of the ATN. Epsilon-class transitions (`Epsilon`, `Rule`,
/// `Predicate`, `Precedence`, `Action`) are traversed during closure;
/// the rest consume exactly one input symbol.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    Epsilon {
        target: StateId,
        /// Rule index when this edge returns from a precedence-zero
        /// invocation of a left-recursive rule; such configurations are
        /// exempt from the precedence filter.
        outermost_precedence_return: Option<usize>,
    },
    Range {
        target: StateId,
        lo: i32,
        hi: i32,
    },
    /// Rule invocation: `target` is the callee's start state, `follow_state`
    /// is where the caller resumes.
    Rule {
        target: StateId,
        rule_index: usize,
        precedence: i32,
        follow_state: StateId,
    },
    Predicate {
        target: StateId,
        rule_index: usize,
        pred_index: usize,
        ctx_dependent: bool,
    },
    Atom {
        target: StateId,
        symbol: i32,
    },
    Action {
        target: StateId,
        rule_index: usize,
        action_index: usize,
        ctx_dependent: bool,
    },
    Set {
        target: StateId,
        set: IntervalSet,
    },
    NotSet {
        target: StateId,
        set: IntervalSet,
    },
    Wildcard {
        target: StateId,
    },
    Precedence {
        target: StateId,
        precedence: i32,
    },
}

impl Transition {
    #[must_use]
    pub const fn target(&self) -> StateId {
        match self {
            Transition::Epsilon { target, .. }
            | Transition::Range { target, .. }
            | Transition::Rule { target, .. }
            | Transition::Predicate { target, .. }
            | Transition::Atom { target, .. }
            | Transition::Action { target, .. }
            | Transition::Set { target, .. }
            | Transition::NotSet { target, .. }
            | Transition::Wildcard { target }
            | Transition::Precedence { target, .. } => *target,
        }
    }

    #[must_use]
    pub const fn is_epsilon(&self) -> bool {
        matches!(
            self,
            Transition::Epsilon { .. }
                | Transition::Rule { .. }
                | Transition::Predicate { .. }
                | Transition::Action { .. }
                | Transition::Precedence { .. }
        )
    }

    /// Whether this transition consumes `symbol`, with wildcard and
    /// complement labels bounded by `min ..= max`.
    #[must_use]
    pub fn matches(&self, symbol: i32, min: i32, max: i32) -> bool {
        match self {
            Transition::Atom { symbol: label, .. } => *label == symbol,
            Transition::Range { lo, hi, .. } => *lo <= symbol && symbol <= *hi,
            Transition::Set { set, .. } => set.contains(symbol),
            Transition::NotSet { set, .. } => {
                min <= symbol && symbol <= max && !set.contains(symbol)
            }
            Transition::Wildcard { .. } => min <= symbol && symbol <= max,
            _ => false,
        }
    }

    /// The label of a consuming transition, as an interval set.
    /// `NotSet` reports its *underlying* set; callers complement it against
    /// the vocabulary themselves.
    #[must_use]
    pub fn label(&self) -> Option<IntervalSet> {
        match self {
            Transition::Atom { symbol, .. } => Some(IntervalSet::of(*symbol)),
            Transition::Range { lo, hi, .. } => Some(IntervalSet::of_range(*lo, *hi)),
            Transition::Set { set, .. } | Transition::NotSet { set, .. } => Some(set.clone()),
            _ => None,
        }
    }

    /// Wire-format code for this transition's kind.
    #[must_use]
    pub const fn kind_code(&self) -> u16 {
        match self {
            Transition::Epsilon { .. } => 1,
            Transition::Range { .. } => 2,
            Transition::Rule { .. } => 3,
            Transition::Predicate { .. } => 4,
            Transition::Atom { .. } => 5,
            Transition::Action { .. } => 6,
            Transition::Set { .. } => 7,
            Transition::NotSet { .. } => 8,
            Transition::Wildcard { .. } => 9,
            Transition::Precedence { .. } => 10,
        }
    }
}
