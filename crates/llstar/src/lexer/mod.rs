//! The lexer ATN simulator: longest-match tokenization.
//!
//! [`LexerAtnSimulator::match_token`] runs the mode's DFA over characters,
//! snapshotting the most recent accept state, and on a dead end rewinds to
//! that snapshot. The same closure/reach machinery as the parser applies,
//! restricted to the lexer's needs: contexts always start empty, predicates
//! are evaluated on the fly, and action transitions accumulate a
//! [`LexerActionExecutor`] along the accepting path.

use std::sync::Arc;

use crate::atn::{
    Atn, AtnConfig, AtnConfigSet, EMPTY_RETURN_STATE, LexerActionExecutor, LexerHost,
    PredictionContext, StateId, TOKEN_EOF, Transition,
};
use crate::dfa::{Dfa, DfaCache, DfaState};
use crate::error::PredictionError;
use crate::stream::CharStream;

/// Smallest code point with a cached DFA edge.
pub const MIN_DFA_EDGE: i32 = 0;
/// Largest code point with a cached DFA edge; rarer characters always take
/// the ATN path.
pub const MAX_DFA_EDGE: i32 = 127;

/// Smallest matchable code point.
pub const MIN_CHAR: i32 = 0;
/// Largest matchable code point.
pub const MAX_CHAR: i32 = 0x0010_FFFF;

/// Snapshot of the last DFA accept state seen while scanning a token.
#[derive(Debug, Clone)]
struct SimState {
    index: usize,
    line: usize,
    char_pos: usize,
    state: Arc<DfaState>,
}

/// The tokenizing simulator for one lexer. Create one per input; share the
/// ATN and DFA cache between them.
pub struct LexerAtnSimulator {
    atn: Arc<Atn>,
    dfa_cache: Arc<DfaCache>,
    /// Current mode; [`match_token`](Self::match_token) switches it per call.
    pub mode: usize,
    line: usize,
    char_position_in_line: usize,
    start_index: usize,
    prev_accept: Option<SimState>,
}

impl LexerAtnSimulator {
    #[must_use]
    pub fn new(atn: Arc<Atn>, dfa_cache: Arc<DfaCache>) -> Self {
        Self {
            atn,
            dfa_cache,
            mode: 0,
            line: 1,
            char_position_in_line: 0,
            start_index: 0,
            prev_accept: None,
        }
    }

    #[must_use]
    pub fn atn(&self) -> &Arc<Atn> {
        &self.atn
    }

    #[must_use]
    pub fn dfa_cache(&self) -> &Arc<DfaCache> {
        &self.dfa_cache
    }

    #[must_use]
    pub const fn line(&self) -> usize {
        self.line
    }

    #[must_use]
    pub const fn char_position_in_line(&self) -> usize {
        self.char_position_in_line
    }

    pub fn set_position(&mut self, line: usize, char_position_in_line: usize) {
        self.line = line;
        self.char_position_in_line = char_position_in_line;
    }

    pub fn reset(&mut self) {
        self.prev_accept = None;
        self.start_index = 0;
        self.line = 1;
        self.char_position_in_line = 0;
        self.mode = 0;
    }

    /// Matches the longest token starting at the stream's current position
    /// and returns its type. On success the stream rests just past the
    /// token; line and column track consumed newlines.
    ///
    /// # Errors
    ///
    /// [`PredictionError::LexerNoViableAlt`] when no rule accepts any prefix
    /// and the first symbol is not EOF.
    pub fn match_token(
        &mut self,
        input: &mut dyn CharStream,
        mode: usize,
        host: &mut dyn LexerHost,
    ) -> Result<i32, PredictionError> {
        self.mode = mode;
        self.start_index = input.index();
        self.prev_accept = None;

        let marker = input.mark();
        let result = self.match_body(input, host);
        input.release(marker);
        result
    }

    fn match_body(
        &mut self,
        input: &mut dyn CharStream,
        host: &mut dyn LexerHost,
    ) -> Result<i32, PredictionError> {
        let cache = Arc::clone(&self.dfa_cache);
        let dfa = cache.dfa(self.mode);
        match dfa.start_state(0) {
            Some(s0) => self.exec_atn(dfa, s0, input, host),
            None => self.match_atn(dfa, input, host),
        }
    }

    /// First scan in this mode: compute and install the DFA start state,
    /// then run the DFA loop.
    fn match_atn(
        &mut self,
        dfa: &Dfa,
        input: &mut dyn CharStream,
        host: &mut dyn LexerHost,
    ) -> Result<i32, PredictionError> {
        let start_state = self.atn.mode_to_start_state[self.mode];
        let mut s0_closure = self.compute_start_state(input, host, start_state);

        // A predicate in the initial closure makes the start state
        // input-dependent; keep it out of s0 so it is recomputed per token.
        let suppress_edge = s0_closure.has_semantic_context;
        s0_closure.has_semantic_context = false;

        let next = self.add_dfa_state(dfa, s0_closure);
        if !suppress_edge {
            dfa.set_s0(Arc::clone(&next));
        }

        self.exec_atn(dfa, next, input, host)
    }

    fn exec_atn(
        &mut self,
        dfa: &Dfa,
        s0: Arc<DfaState>,
        input: &mut dyn CharStream,
        host: &mut dyn LexerHost,
    ) -> Result<i32, PredictionError> {
        if s0.is_accept {
            // Allow zero-length tokens.
            self.capture_sim_state(input, &s0);
        }

        let mut t = input.la(1);
        let mut s = s0;

        loop {
            let target = match self.existing_target(dfa, &s, t) {
                Some(target) => target,
                None => self.compute_target_state(dfa, &s, t, input, host),
            };

            if target.is_error() {
                break;
            }

            // Consume before capturing the accept state so index, line and
            // column reflect the end of the token.
            if t != TOKEN_EOF {
                self.consume(input);
            }

            if target.is_accept {
                self.capture_sim_state(input, &target);
                if t == TOKEN_EOF {
                    break;
                }
            }

            t = input.la(1);
            s = target;
        }

        self.fail_or_accept(input, host, &s.configs, t)
    }

    fn existing_target(&self, dfa: &Dfa, s: &Arc<DfaState>, t: i32) -> Option<Arc<DfaState>> {
        if !(MIN_DFA_EDGE..=MAX_DFA_EDGE).contains(&t) {
            return None;
        }
        dfa.existing_target(s.state_number, t - MIN_DFA_EDGE)
    }

    fn compute_target_state(
        &mut self,
        dfa: &Dfa,
        s: &Arc<DfaState>,
        t: i32,
        input: &mut dyn CharStream,
        host: &mut dyn LexerHost,
    ) -> Arc<DfaState> {
        let mut reach = AtnConfigSet::new_ordered();
        self.reachable_config_set(input, host, &s.configs, &mut reach, t);

        if reach.is_empty() {
            if !reach.has_semantic_context {
                // Cache the dead end; predicated paths must stay uncached.
                self.add_edge(dfa, s, t, Arc::clone(DfaState::error()));
            }
            return Arc::clone(DfaState::error());
        }

        let suppress_edge = reach.has_semantic_context;
        reach.has_semantic_context = false;
        let to = self.add_dfa_state(dfa, reach);
        if !suppress_edge {
            self.add_edge(dfa, s, t, Arc::clone(&to));
        }
        to
    }

    fn add_edge(&self, dfa: &Dfa, from: &Arc<DfaState>, t: i32, to: Arc<DfaState>) {
        if !(MIN_DFA_EDGE..=MAX_DFA_EDGE).contains(&t) {
            // Only track edges within the cacheable range.
            return;
        }
        dfa.add_edge(from.state_number, t - MIN_DFA_EDGE, to);
    }

    fn fail_or_accept(
        &mut self,
        input: &mut dyn CharStream,
        host: &mut dyn LexerHost,
        reach: &AtnConfigSet,
        t: i32,
    ) -> Result<i32, PredictionError> {
        if let Some(prev_accept) = self.prev_accept.take() {
            self.accept(input, host, &prev_accept);
            return Ok(prev_accept.state.prediction);
        }
        if t == TOKEN_EOF && input.index() == self.start_index {
            // EOF at the very start of a token is the EOF token.
            return Ok(TOKEN_EOF);
        }
        Err(PredictionError::LexerNoViableAlt {
            start_index: self.start_index,
            dead_end: reach.clone(),
        })
    }

    fn accept(&mut self, input: &mut dyn CharStream, host: &mut dyn LexerHost, snap: &SimState) {
        // Seek to just after the last character of the accepted token.
        input.seek(snap.index);
        self.line = snap.line;
        self.char_position_in_line = snap.char_pos;

        if let Some(executor) = &snap.state.lexer_executor {
            executor.execute(host, input, self.start_index);
        }
    }

    fn capture_sim_state(&mut self, input: &mut dyn CharStream, state: &Arc<DfaState>) {
        self.prev_accept = Some(SimState {
            index: input.index(),
            line: self.line,
            char_pos: self.char_position_in_line,
            state: Arc::clone(state),
        });
    }

    fn compute_start_state(
        &mut self,
        input: &mut dyn CharStream,
        host: &mut dyn LexerHost,
        start_state: StateId,
    ) -> AtnConfigSet {
        let atn = Arc::clone(&self.atn);
        let initial_context = PredictionContext::empty();
        let mut configs = AtnConfigSet::new_ordered();
        for (i, transition) in atn.state(start_state).transitions.iter().enumerate() {
            let target = atn.state(transition.target());
            let config = AtnConfig::new(target, i + 1, initial_context.clone());
            self.closure(input, host, config, &mut configs, false, false, false);
        }
        configs
    }

    fn reachable_config_set(
        &mut self,
        input: &mut dyn CharStream,
        host: &mut dyn LexerHost,
        closure_set: &AtnConfigSet,
        reach: &mut AtnConfigSet,
        t: i32,
    ) {
        let atn = Arc::clone(&self.atn);
        // Configurations of an alternative that already reached an accept
        // state take priority over later ones of the same alternative.
        let mut skip_alt = None;
        for config in closure_set {
            let current_alt_reached_accept = Some(config.alt) == skip_alt;
            if current_alt_reached_accept && config.has_passed_through_non_greedy_decision() {
                continue;
            }

            let state = atn.state(config.state);
            for transition in &state.transitions {
                if !transition.matches(t, MIN_CHAR, MAX_CHAR) {
                    continue;
                }
                let executor = config.lexer_executor.as_ref().and_then(|executor| {
                    executor.fix_offset_before_match(input.index() - self.start_index)
                });
                let executor = executor.or_else(|| config.lexer_executor.clone());
                let target = atn.state(transition.target());
                let next = config.transition_with_executor(target, executor);
                let treat_eof_as_epsilon = t == TOKEN_EOF;
                if self.closure(
                    input,
                    host,
                    next,
                    reach,
                    current_alt_reached_accept,
                    true,
                    treat_eof_as_epsilon,
                ) {
                    // This alternative accepted; skip its remaining configs.
                    skip_alt = Some(config.alt);
                    break;
                }
            }
        }
    }

    /// Expands epsilon-reachable configurations, returning whether the
    /// current alternative reached an accept state.
    #[allow(clippy::too_many_arguments)]
    fn closure(
        &mut self,
        input: &mut dyn CharStream,
        host: &mut dyn LexerHost,
        config: AtnConfig,
        configs: &mut AtnConfigSet,
        mut current_alt_reached_accept: bool,
        speculative: bool,
        treat_eof_as_epsilon: bool,
    ) -> bool {
        let atn = Arc::clone(&self.atn);
        let state = atn.state(config.state);

        if state.is_rule_stop() {
            if config.context.has_empty_path() {
                if config.context.is_empty() {
                    configs.add(config);
                    return true;
                }
                let mut c = config.clone();
                c.context = PredictionContext::empty();
                configs.add(c);
                current_alt_reached_accept = true;
            }

            if !config.context.is_empty() {
                for i in 0..config.context.len() {
                    if config.context.return_state(i) == EMPTY_RETURN_STATE {
                        continue;
                    }
                    let new_context = config
                        .context
                        .parent(i)
                        .expect("non-bottom slot has a parent")
                        .clone();
                    let return_state = atn.state(StateId(config.context.return_state(i)));
                    let c = config.transition_with_context(return_state, new_context);
                    current_alt_reached_accept = self.closure(
                        input,
                        host,
                        c,
                        configs,
                        current_alt_reached_accept,
                        speculative,
                        treat_eof_as_epsilon,
                    );
                }
            }
            return current_alt_reached_accept;
        }

        if !state.epsilon_only_transitions()
            && (!current_alt_reached_accept || !config.has_passed_through_non_greedy_decision())
        {
            configs.add(config.clone());
        }

        for transition in &state.transitions {
            let c = self.epsilon_target(
                input,
                host,
                &config,
                transition,
                configs,
                speculative,
                treat_eof_as_epsilon,
            );
            if let Some(c) = c {
                current_alt_reached_accept = self.closure(
                    input,
                    host,
                    c,
                    configs,
                    current_alt_reached_accept,
                    speculative,
                    treat_eof_as_epsilon,
                );
            }
        }
        current_alt_reached_accept
    }

    #[allow(clippy::too_many_arguments)]
    fn epsilon_target(
        &mut self,
        input: &mut dyn CharStream,
        host: &mut dyn LexerHost,
        config: &AtnConfig,
        transition: &Transition,
        configs: &mut AtnConfigSet,
        speculative: bool,
        treat_eof_as_epsilon: bool,
    ) -> Option<AtnConfig> {
        let atn = Arc::clone(&self.atn);
        match transition {
            Transition::Rule {
                target,
                follow_state,
                ..
            } => {
                let new_context =
                    PredictionContext::singleton(config.context.clone(), follow_state.0);
                Some(config.transition_with_context(atn.state(*target), new_context))
            }
            Transition::Precedence { .. } => {
                panic!("precedence predicates are not supported in lexers")
            }
            Transition::Predicate {
                target,
                rule_index,
                pred_index,
                ..
            } => {
                // A traversed predicate makes the reach input-dependent: the
                // DFA must not cache an edge to it, so the set is marked and
                // the predicate evaluated right now.
                configs.has_semantic_context = true;
                if self.evaluate_predicate(input, host, *rule_index, *pred_index, speculative) {
                    Some(config.transition(atn.state(*target)))
                } else {
                    None
                }
            }
            Transition::Action { target, action_index, .. } => {
                if config.context.has_empty_path() {
                    // Execute actions anywhere in the start rule for a token.
                    let executor = LexerActionExecutor::append(
                        config.lexer_executor.as_ref(),
                        atn.lexer_actions[*action_index].clone(),
                    );
                    Some(config.transition_with_executor(atn.state(*target), Some(executor)))
                } else {
                    // Ignore actions in referenced rules.
                    Some(config.transition(atn.state(*target)))
                }
            }
            Transition::Epsilon { target, .. } => Some(config.transition(atn.state(*target))),
            Transition::Atom { .. } | Transition::Range { .. } | Transition::Set { .. } => {
                if treat_eof_as_epsilon && transition.matches(TOKEN_EOF, MIN_CHAR, MAX_CHAR) {
                    return Some(config.transition(atn.state(transition.target())));
                }
                None
            }
            _ => None,
        }
    }

    /// Evaluates a lexer predicate. Off the start position the lexer state
    /// is saved, the pending character consumed so the predicate sees the
    /// world as if the token matched, and everything restored afterwards.
    fn evaluate_predicate(
        &mut self,
        input: &mut dyn CharStream,
        host: &mut dyn LexerHost,
        rule_index: usize,
        pred_index: usize,
        speculative: bool,
    ) -> bool {
        if !speculative {
            return host.sempred(rule_index, pred_index);
        }

        let saved_char_pos = self.char_position_in_line;
        let saved_line = self.line;
        let index = input.index();
        let marker = input.mark();

        self.consume(input);
        let result = host.sempred(rule_index, pred_index);

        self.char_position_in_line = saved_char_pos;
        self.line = saved_line;
        input.seek(index);
        input.release(marker);
        result
    }

    /// Builds the DFA state for `configs`: the first configuration in a rule
    /// stop state decides the predicted token type and the actions to run.
    fn add_dfa_state(&self, dfa: &Dfa, configs: AtnConfigSet) -> Arc<DfaState> {
        debug_assert!(!configs.has_semantic_context);

        let mut proposed = DfaState::new(configs);
        let first_stop = proposed
            .configs
            .iter()
            .find(|c| self.atn.state(c.state).is_rule_stop())
            .cloned();
        if let Some(config) = first_stop {
            let rule = self.atn.state(config.state).rule_index;
            proposed.is_accept = true;
            proposed.lexer_executor = config.lexer_executor.clone();
            proposed.prediction = self.atn.rule_to_token_type[rule];
        }
        dfa.add_state(proposed)
    }

    /// Advances one character, maintaining line/column.
    pub fn consume(&mut self, input: &mut dyn CharStream) {
        let current = input.la(1);
        if current == '\n' as i32 {
            self.line += 1;
            self.char_position_in_line = 0;
        } else {
            self.char_position_in_line += 1;
        }
        input.consume();
    }
}
