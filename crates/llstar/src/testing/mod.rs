//! Programmatic ATN construction for tests and tools.
//!
//! Grammars normally arrive as serialized images; the builder assembles the
//! same graphs directly, which keeps test fixtures readable and keeps the
//! construction invariants (rule linking, derived return edges, decision
//! registration) in one place.

use crate::atn::{
    Atn, BlockKind, GrammarType, LexerAction, StateId, StateKind, Transition,
};
use crate::util::IntervalSet;

/// Builds an [`Atn`] state by state.
///
/// The builder exposes one helper per transition kind plus
/// [`rule_call`](Self::rule_call), which installs both the call edge and the
/// derived return edge the deserializer would create.
#[derive(Debug)]
pub struct AtnBuilder {
    atn: Atn,
}

impl AtnBuilder {
    #[must_use]
    pub fn new(grammar_type: GrammarType, max_token_type: i32) -> Self {
        Self {
            atn: Atn::new(grammar_type, max_token_type),
        }
    }

    pub fn state(&mut self, rule_index: usize, kind: StateKind) -> StateId {
        self.atn.add_state(kind, rule_index)
    }

    pub fn basic(&mut self, rule_index: usize) -> StateId {
        self.state(rule_index, StateKind::Basic)
    }

    pub fn set_non_greedy(&mut self, state: StateId) {
        self.atn.state_mut(state).non_greedy = true;
    }

    pub fn transition(&mut self, from: StateId, transition: Transition) {
        self.atn.state_mut(from).add_transition(transition);
    }

    pub fn epsilon(&mut self, from: StateId, to: StateId) {
        self.transition(
            from,
            Transition::Epsilon {
                target: to,
                outermost_precedence_return: None,
            },
        );
    }

    pub fn atom(&mut self, from: StateId, to: StateId, symbol: i32) {
        self.transition(from, Transition::Atom { target: to, symbol });
    }

    pub fn range(&mut self, from: StateId, to: StateId, lo: i32, hi: i32) {
        self.transition(from, Transition::Range { target: to, lo, hi });
    }

    pub fn set(&mut self, from: StateId, to: StateId, set: IntervalSet) {
        self.transition(from, Transition::Set { target: to, set });
    }

    pub fn wildcard(&mut self, from: StateId, to: StateId) {
        self.transition(from, Transition::Wildcard { target: to });
    }

    pub fn predicate(
        &mut self,
        from: StateId,
        to: StateId,
        rule_index: usize,
        pred_index: usize,
        ctx_dependent: bool,
    ) {
        self.transition(
            from,
            Transition::Predicate {
                target: to,
                rule_index,
                pred_index,
                ctx_dependent,
            },
        );
    }

    pub fn precedence_predicate(&mut self, from: StateId, to: StateId, precedence: i32) {
        self.transition(from, Transition::Precedence { target: to, precedence });
    }

    pub fn action(
        &mut self,
        from: StateId,
        to: StateId,
        rule_index: usize,
        action_index: usize,
    ) {
        self.transition(
            from,
            Transition::Action {
                target: to,
                rule_index,
                action_index,
                ctx_dependent: false,
            },
        );
    }

    /// Registers `state` as the next decision and returns its index.
    pub fn decision(&mut self, state: StateId) -> usize {
        self.atn.define_decision(state)
    }

    /// Creates a cross-linked block start/end pair.
    pub fn block(&mut self, rule_index: usize, block: BlockKind) -> (StateId, StateId) {
        let start = self.state(
            rule_index,
            StateKind::BlockStart {
                block,
                end_state: StateId::INVALID,
            },
        );
        let end = self.state(rule_index, StateKind::BlockEnd { start_state: start });
        let StateKind::BlockStart { end_state, .. } = &mut self.atn.state_mut(start).kind else {
            unreachable!("just created as a block start");
        };
        *end_state = end;
        (start, end)
    }

    /// Registers the start/stop pair of `rule_index` and links the start to
    /// its stop.
    ///
    /// # Panics
    ///
    /// Panics when `start` is not a rule start state.
    pub fn link_rule(&mut self, rule_index: usize, start: StateId, stop: StateId) {
        if self.atn.rule_to_start_state.len() <= rule_index {
            self.atn
                .rule_to_start_state
                .resize(rule_index + 1, StateId::INVALID);
            self.atn
                .rule_to_stop_state
                .resize(rule_index + 1, StateId::INVALID);
        }
        self.atn.rule_to_start_state[rule_index] = start;
        self.atn.rule_to_stop_state[rule_index] = stop;
        let StateKind::RuleStart { stop_state, .. } = &mut self.atn.state_mut(start).kind else {
            panic!("link_rule requires a rule start state");
        };
        *stop_state = stop;
    }

    /// Lexer variant of [`link_rule`](Self::link_rule): also records the
    /// token type the rule produces.
    pub fn link_lexer_rule(
        &mut self,
        rule_index: usize,
        start: StateId,
        stop: StateId,
        token_type: i32,
    ) {
        self.link_rule(rule_index, start, stop);
        if self.atn.rule_to_token_type.len() <= rule_index {
            self.atn.rule_to_token_type.resize(rule_index + 1, 0);
        }
        self.atn.rule_to_token_type[rule_index] = token_type;
    }

    /// Registers a lexer mode start state.
    pub fn mode(&mut self, tokens_start: StateId) -> usize {
        self.atn.mode_to_start_state.push(tokens_start);
        self.atn.mode_to_start_state.len() - 1
    }

    /// Appends a lexer action to the action table, returning its index.
    pub fn lexer_action(&mut self, action: LexerAction) -> usize {
        self.atn.lexer_actions.push(action);
        self.atn.lexer_actions.len() - 1
    }

    /// Adds a rule invocation from `from` to `rule_index` returning at
    /// `follow`, plus the derived return edge from the callee's stop state.
    /// The return edge carries the outermost-precedence-return marker when
    /// the callee is left-recursive and invoked at precedence zero.
    ///
    /// # Panics
    ///
    /// Panics when the callee has not been registered with
    /// [`link_rule`](Self::link_rule) yet.
    pub fn rule_call(
        &mut self,
        from: StateId,
        rule_index: usize,
        precedence: i32,
        follow: StateId,
    ) {
        let start = self.atn.rule_to_start_state[rule_index];
        let stop = self.atn.rule_to_stop_state[rule_index];
        assert!(
            start != StateId::INVALID && stop != StateId::INVALID,
            "rule {rule_index} must be linked before it is called"
        );
        self.transition(
            from,
            Transition::Rule {
                target: start,
                rule_index,
                precedence,
                follow_state: follow,
            },
        );
        let left_recursive = matches!(
            self.atn.state(start).kind,
            StateKind::RuleStart {
                left_recursive: true,
                ..
            }
        );
        let outermost_precedence_return =
            (left_recursive && precedence == 0).then_some(rule_index);
        self.transition(
            stop,
            Transition::Epsilon {
                target: follow,
                outermost_precedence_return,
            },
        );
    }

    #[must_use]
    pub fn build(self) -> Atn {
        self.atn
    }
}
