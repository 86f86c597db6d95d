//! The augmented transition network: the precompiled, immutable automaton a
//! grammar compiles to, plus the analyses the simulators run over it.
//!
//! An [`Atn`] is built once — by the [`deserializer`](deserialize) from its
//! wire image or programmatically through
//! [`AtnBuilder`](crate::testing::AtnBuilder) — and then shared read-only
//! between any number of simulators. The only mutation after construction is
//! the per-state lazy follow-set cache, which hides behind a `OnceLock`.

pub mod config;
pub mod config_set;
pub mod context;
pub mod deserialize;
pub mod lexer_action;
pub mod semantic;
pub mod serialize;
pub mod state;
pub mod transition;

mod analysis;

pub use config::AtnConfig;
pub use config_set::AtnConfigSet;
pub use context::{EMPTY_RETURN_STATE, PredictionContext};
pub use deserialize::AtnDeserializer;
pub use lexer_action::{LexerAction, LexerActionExecutor, LexerHost};
pub use semantic::{Recognizer, SemanticContext};
pub use serialize::serialize;
pub use state::{AtnState, BlockKind, StateId, StateKind};
pub use transition::Transition;

use crate::parser::RuleContext;
use crate::util::IntervalSet;

/// Symbol value for end of input.
pub const TOKEN_EOF: i32 = -1;
/// Pseudo-symbol reported by follow analysis when a rule can be exited
/// without consuming input.
pub const TOKEN_EPSILON: i32 = -2;
/// The invalid token type.
pub const TOKEN_INVALID: i32 = 0;
/// Smallest token type a grammar can assign.
pub const TOKEN_MIN_USER: i32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GrammarType {
    Lexer,
    Parser,
}

/// The immutable ATN graph and its rule/mode/decision tables.
#[derive(Debug)]
pub struct Atn {
    pub grammar_type: GrammarType,
    pub max_token_type: i32,
    pub(crate) states: Vec<AtnState>,
    pub rule_to_start_state: Vec<StateId>,
    pub rule_to_stop_state: Vec<StateId>,
    /// Lexer only: the token type each rule produces.
    pub rule_to_token_type: Vec<i32>,
    /// Lexer only: start state per mode.
    pub mode_to_start_state: Vec<StateId>,
    /// Ordered decision states; the index is the decision number.
    pub decision_to_state: Vec<StateId>,
    /// Lexer only: the action table referenced by `Action` transitions.
    pub lexer_actions: Vec<LexerAction>,
}

impl Atn {
    #[must_use]
    pub fn new(grammar_type: GrammarType, max_token_type: i32) -> Self {
        Self {
            grammar_type,
            max_token_type,
            states: Vec::new(),
            rule_to_start_state: Vec::new(),
            rule_to_stop_state: Vec::new(),
            rule_to_token_type: Vec::new(),
            mode_to_start_state: Vec::new(),
            decision_to_state: Vec::new(),
            lexer_actions: Vec::new(),
        }
    }

    #[must_use]
    pub fn state(&self, id: StateId) -> &AtnState {
        &self.states[id.index()]
    }

    pub(crate) fn state_mut(&mut self, id: StateId) -> &mut AtnState {
        &mut self.states[id.index()]
    }

    #[must_use]
    pub fn num_states(&self) -> usize {
        self.states.len()
    }

    pub fn states(&self) -> impl Iterator<Item = &AtnState> {
        self.states.iter()
    }

    pub(crate) fn add_state(&mut self, kind: StateKind, rule_index: usize) -> StateId {
        let id = StateId(u32::try_from(self.states.len()).expect("state count fits in u32"));
        self.states.push(AtnState::new(id, rule_index, kind));
        id
    }

    /// Registers `state` as the next decision, returning its decision index.
    pub(crate) fn define_decision(&mut self, state: StateId) -> usize {
        let decision = self.decision_to_state.len();
        self.decision_to_state.push(state);
        self.states[state.index()].decision = Some(decision);
        decision
    }

    #[must_use]
    pub fn decision_state(&self, decision: usize) -> StateId {
        self.decision_to_state[decision]
    }

    /// The tokens that can follow `state` within its rule, treating the end
    /// of the rule as [`TOKEN_EPSILON`]. Computed on first use and cached on
    /// the state.
    pub fn next_tokens(&self, state: StateId) -> &IntervalSet {
        self.states[state.index()]
            .next_tokens_within_rule
            .get_or_init(|| analysis::look(self, state, None))
    }

    /// The tokens that can follow `state` given an actual parser call chain.
    #[must_use]
    pub fn next_tokens_in_context(&self, state: StateId, ctx: Option<&RuleContext>) -> IntervalSet {
        analysis::look(self, state, ctx)
    }

    /// The tokens a parser stopped at `state` with calling chain `ctx` could
    /// accept next, following the chain as far as it reaches.
    #[must_use]
    pub fn expected_tokens(&self, state: StateId, ctx: Option<&RuleContext>) -> IntervalSet {
        let mut following = self.next_tokens(state).clone();
        if !following.contains(TOKEN_EPSILON) {
            return following;
        }

        let mut expected = IntervalSet::new();
        expected.add_set(&following);
        expected.remove(TOKEN_EPSILON);

        let mut ctx = ctx;
        while let Some(current) = ctx {
            let Some(invoking) = current.invoking_state else {
                break;
            };
            if !following.contains(TOKEN_EPSILON) {
                break;
            }
            let Transition::Rule { follow_state, .. } = &self.state(invoking).transitions[0]
            else {
                panic!("invoking state {invoking:?} does not begin with a rule transition");
            };
            following = self.next_tokens(*follow_state).clone();
            expected.add_set(&following);
            expected.remove(TOKEN_EPSILON);
            ctx = current.parent.as_deref();
        }

        if following.contains(TOKEN_EPSILON) {
            expected.add(TOKEN_EOF);
        }
        expected
    }
}
