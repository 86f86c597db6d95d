//! ATN state nodes.
//!
//! States are stored in a dense table owned by the [`Atn`](super::Atn) and
//! referenced everywhere by [`StateId`]. Structural links between states
//! (block start/end, loop entry/back, rule start/stop) are part of the state
//! kind so the graph is immutable once built.

use std::sync::OnceLock;

use crate::util::IntervalSet;

use super::transition::Transition;

/// Index of a state in the ATN state table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct StateId(pub u32);

impl StateId {
    /// Placeholder for links that are patched after construction.
    pub const INVALID: StateId = StateId(u32::MAX);

    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

/// Shape of a block inside a rule body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockKind {
    Basic,
    /// `(...)+` sub-block; the loop-back state is patched in after edges load.
    Plus { loop_back: StateId },
    /// `(...)*` sub-block.
    Star,
}

/// The closed set of state kinds, with the structural links each kind carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateKind {
    /// Placeholder for a state removed by the grammar compiler; never
    /// reachable during simulation.
    Invalid,
    Basic,
    RuleStart {
        stop_state: StateId,
        /// Set for rules produced by left-recursion elimination.
        left_recursive: bool,
    },
    RuleStop,
    BlockStart {
        block: BlockKind,
        end_state: StateId,
    },
    BlockEnd {
        start_state: StateId,
    },
    PlusLoopBack,
    StarLoopBack,
    StarLoopEntry {
        loop_back: StateId,
        /// The entry/exit decision of a left-recursive rule loop.
        precedence_decision: bool,
    },
    LoopEnd {
        loop_back: StateId,
    },
    TokensStart,
}

/// One node of the ATN.
#[derive(Debug)]
pub struct AtnState {
    pub id: StateId,
    pub rule_index: usize,
    pub kind: StateKind,
    /// Decision index, assigned when the state is registered as a decision.
    pub decision: Option<usize>,
    pub non_greedy: bool,
    pub(crate) epsilon_only: bool,
    pub transitions: Vec<Transition>,
    /// Lazily computed follow set, shared across simulators.
    pub(crate) next_tokens_within_rule: OnceLock<IntervalSet>,
}

impl AtnState {
    #[must_use]
    pub fn new(id: StateId, rule_index: usize, kind: StateKind) -> Self {
        Self {
            id,
            rule_index,
            kind,
            decision: None,
            non_greedy: false,
            epsilon_only: false,
            transitions: Vec::new(),
            next_tokens_within_rule: OnceLock::new(),
        }
    }

    pub fn add_transition(&mut self, transition: Transition) {
        if self.transitions.is_empty() {
            self.epsilon_only = transition.is_epsilon();
        } else {
            self.epsilon_only &= transition.is_epsilon();
        }
        self.transitions.push(transition);
    }

    /// Whether every outgoing transition is an epsilon transition.
    #[must_use]
    pub const fn epsilon_only_transitions(&self) -> bool {
        self.epsilon_only
    }

    #[must_use]
    pub const fn is_rule_stop(&self) -> bool {
        matches!(self.kind, StateKind::RuleStop)
    }

    /// Decision states choose among >= 2 alternatives and own a DFA.
    #[must_use]
    pub const fn is_decision(&self) -> bool {
        matches!(
            self.kind,
            StateKind::BlockStart { .. }
                | StateKind::PlusLoopBack
                | StateKind::StarLoopEntry { .. }
                | StateKind::TokensStart
        )
    }

    /// Wire-format code for this state's kind.
    #[must_use]
    pub const fn kind_code(&self) -> u16 {
        match self.kind {
            StateKind::Invalid => 0,
            StateKind::Basic => 1,
            StateKind::RuleStart { .. } => 2,
            StateKind::BlockStart { block, .. } => match block {
                BlockKind::Basic => 3,
                BlockKind::Plus { .. } => 4,
                BlockKind::Star => 5,
            },
            StateKind::TokensStart => 6,
            StateKind::RuleStop => 7,
            StateKind::BlockEnd { .. } => 8,
            StateKind::StarLoopBack => 9,
            StateKind::StarLoopEntry { .. } => 10,
            StateKind::PlusLoopBack => 11,
            StateKind::LoopEnd { .. } => 12,
        }
    }
}
