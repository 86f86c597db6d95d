//! The adaptive SLL/LL parser prediction engine.
//!
//! [`ParserAtnSimulator::adaptive_predict`] decides which alternative of a
//! decision matches the upcoming tokens. It walks the decision's DFA as far
//! as memoized answers reach, then extends the DFA by running subset
//! construction (closure/reach) over ATN configuration sets. SLL prediction
//! with wildcard stacks handles almost everything; on an SLL conflict the
//! simulator retries with the caller's full context before declaring
//! ambiguity.
//!
//! A simulator is single-threaded, but any number of simulators may share
//! one ATN and one [`DfaCache`] concurrently.

pub mod prediction_mode;
mod rule_context;

pub use prediction_mode::PredictionMode;
pub use rule_context::RuleContext;

use std::sync::{Arc, OnceLock};

use hashbrown::{HashMap, HashSet};

use crate::atn::{
    Atn, AtnConfig, AtnConfigSet, AtnState, EMPTY_RETURN_STATE, PredictionContext, Recognizer,
    SemanticContext, StateId, StateKind, TOKEN_EOF, TOKEN_EPSILON, Transition,
};
use crate::dfa::{Dfa, DfaCache, DfaState};
use crate::error::PredictionError;
use crate::stream::IntStream;
use crate::util::BitSet;

/// Environment toggle disabling the left-recursion loop-entry optimization,
/// for A/B correctness testing.
const LR_LOOP_OPT_ENV: &str = "LLSTAR_DISABLE_LR_LOOP_OPT";

fn lr_loop_opt_disabled() -> bool {
    static DISABLED: OnceLock<bool> = OnceLock::new();
    *DISABLED.get_or_init(|| {
        matches!(
            std::env::var(LR_LOOP_OPT_ENV).as_deref(),
            Ok("1") | Ok("true")
        )
    })
}

/// What a parser supplies to prediction beyond the token stream: predicate
/// hooks (via [`Recognizer`]) and the current precedence for left-recursive
/// decisions.
pub trait ParserHost: Recognizer {
    fn precedence(&self) -> i32;
}

/// Advisory reports about prediction quality. Implementations must not
/// panic; the engine invokes them with no internal lock held.
#[allow(unused_variables)]
pub trait PredictionListener {
    fn report_ambiguity(
        &mut self,
        decision: usize,
        start_index: usize,
        stop_index: usize,
        exact: bool,
        ambig_alts: &BitSet,
        configs: &AtnConfigSet,
    ) {
    }

    fn report_attempting_full_context(
        &mut self,
        decision: usize,
        conflicting_alts: &BitSet,
        start_index: usize,
        stop_index: usize,
        configs: &AtnConfigSet,
    ) {
    }

    fn report_context_sensitivity(
        &mut self,
        decision: usize,
        prediction: usize,
        start_index: usize,
        stop_index: usize,
        configs: &AtnConfigSet,
    ) {
    }
}

/// The default listener: ignores every report.
#[derive(Debug, Default)]
pub struct NoopListener;

impl PredictionListener for NoopListener {}

/// The adaptive prediction simulator for one parse. Create one per parse;
/// share the ATN and DFA cache between them.
pub struct ParserAtnSimulator {
    atn: Arc<Atn>,
    dfa_cache: Arc<DfaCache>,
    pub mode: PredictionMode,
    listener: Box<dyn PredictionListener>,
    // Per-prediction transients.
    start_index: usize,
    outer_context: Option<Arc<RuleContext>>,
    decision: usize,
    in_precedence_dfa: bool,
    dfa_start_rule: usize,
}

impl ParserAtnSimulator {
    #[must_use]
    pub fn new(atn: Arc<Atn>, dfa_cache: Arc<DfaCache>) -> Self {
        Self {
            atn,
            dfa_cache,
            mode: PredictionMode::default(),
            listener: Box::new(NoopListener),
            start_index: 0,
            outer_context: None,
            decision: 0,
            in_precedence_dfa: false,
            dfa_start_rule: 0,
        }
    }

    pub fn set_listener(&mut self, listener: Box<dyn PredictionListener>) {
        self.listener = listener;
    }

    #[must_use]
    pub fn atn(&self) -> &Arc<Atn> {
        &self.atn
    }

    #[must_use]
    pub fn dfa_cache(&self) -> &Arc<DfaCache> {
        &self.dfa_cache
    }

    /// Predicts the alternative (1-based) taken at `decision` for the tokens
    /// at the stream's current position. The stream position and mark are
    /// restored on every exit path.
    ///
    /// # Errors
    ///
    /// [`PredictionError::NoViableAlt`] when no alternative matches the
    /// input and no dead-end alternative finished the decision entry rule.
    pub fn adaptive_predict(
        &mut self,
        input: &mut dyn IntStream,
        decision: usize,
        outer_context: Option<&Arc<RuleContext>>,
        host: &mut dyn ParserHost,
    ) -> Result<usize, PredictionError> {
        self.start_index = input.index();
        self.outer_context = outer_context.cloned();
        self.decision = decision;

        let cache = Arc::clone(&self.dfa_cache);
        let dfa = cache.dfa(decision);
        self.in_precedence_dfa = dfa.is_precedence_dfa();
        self.dfa_start_rule = self.atn.state(dfa.atn_start_state).rule_index;

        let marker = input.mark();
        let index = self.start_index;
        let result = self.predict_body(dfa, input, host);
        input.seek(index);
        input.release(marker);
        result
    }

    fn predict_body(
        &mut self,
        dfa: &Dfa,
        input: &mut dyn IntStream,
        host: &mut dyn ParserHost,
    ) -> Result<usize, PredictionError> {
        let s0 = match dfa.start_state(host.precedence()) {
            Some(s0) => s0,
            None => {
                // The SLL start state is always computed with an empty stack;
                // the caller's chain only matters for full-context retries.
                let s0_closure =
                    self.compute_start_state(input, host, dfa.atn_start_state, None, false);
                if dfa.is_precedence_dfa() {
                    let filtered = self.apply_precedence_filter(host, &s0_closure);
                    let s0 = dfa.add_state(DfaState::new(filtered));
                    dfa.set_precedence_start_state(host.precedence(), Arc::clone(&s0));
                    s0
                } else {
                    let s0 = dfa.add_state(DfaState::new(s0_closure));
                    dfa.set_s0(Arc::clone(&s0));
                    s0
                }
            }
        };
        self.exec_atn(dfa, s0, input, host)
    }

    fn exec_atn(
        &mut self,
        dfa: &Dfa,
        s0: Arc<DfaState>,
        input: &mut dyn IntStream,
        host: &mut dyn ParserHost,
    ) -> Result<usize, PredictionError> {
        let mut previous = s0;
        let mut t = input.la(1);

        loop {
            let d = match dfa.existing_target(previous.state_number, t) {
                Some(d) => d,
                None => self.compute_target_state(dfa, &previous, t, input, host),
            };

            if d.is_error() {
                // No reachable target for t. The input up to here may still
                // have finished the decision entry rule; prefer reporting
                // that alternative over an outright failure.
                input.seek(self.start_index);
                if let Some(alt) = self.syn_valid_or_sem_invalid_alt(host, &previous.configs) {
                    return Ok(alt);
                }
                return Err(self.no_viable_alt(input, &previous.configs));
            }

            if d.requires_full_context && self.mode != PredictionMode::Sll {
                let mut conflicting_alts =
                    d.configs.conflicting_alts.clone().unwrap_or_default();
                if !d.predicates.is_empty() {
                    // Predicates may resolve the conflict without full
                    // context.
                    let conflict_index = input.index();
                    if conflict_index != self.start_index {
                        input.seek(self.start_index);
                    }
                    let alts = self.eval_predicates(host, &d.predicates, true);
                    if alts.cardinality() == 1 {
                        return Ok(alts.min_set_bit().expect("single alternative"));
                    }
                    if conflict_index != self.start_index {
                        // Restore so the full-context report sees the right
                        // stop index.
                        input.seek(conflict_index);
                    }
                    conflicting_alts = alts;
                }

                let outer = self.outer_context.clone();
                let s0_closure = self.compute_start_state(
                    input,
                    host,
                    dfa.atn_start_state,
                    outer.as_ref(),
                    true,
                );
                self.listener.report_attempting_full_context(
                    self.decision,
                    &conflicting_alts,
                    self.start_index,
                    input.index(),
                    &d.configs,
                );
                return self.exec_atn_with_full_context(input, host, s0_closure);
            }

            if d.is_accept {
                if d.predicates.is_empty() {
                    return Ok(d.prediction as usize);
                }
                let stop_index = input.index();
                input.seek(self.start_index);
                let alts = self.eval_predicates(host, &d.predicates, true);
                match alts.cardinality() {
                    0 => return Err(self.no_viable_alt(input, &d.configs)),
                    1 => return Ok(alts.min_set_bit().expect("single alternative")),
                    _ => {
                        // Report after evaluation so the reported set holds
                        // only alternatives that actually passed.
                        self.listener.report_ambiguity(
                            self.decision,
                            self.start_index,
                            stop_index,
                            false,
                            &alts,
                            &d.configs,
                        );
                        return Ok(alts.min_set_bit().expect("ambiguous alternative"));
                    }
                }
            }

            previous = d;
            if t != TOKEN_EOF {
                input.consume();
                t = input.la(1);
            }
        }
    }

    fn compute_target_state(
        &mut self,
        dfa: &Dfa,
        previous: &Arc<DfaState>,
        t: i32,
        input: &mut dyn IntStream,
        host: &mut dyn ParserHost,
    ) -> Arc<DfaState> {
        let reach = self.compute_reach_set(input, host, &previous.configs, t, false);
        if reach.is_empty() {
            dfa.add_edge(previous.state_number, t, Arc::clone(DfaState::error()));
            return Arc::clone(DfaState::error());
        }

        let mut d = DfaState::new(reach);
        if let Some(alt) = Self::unique_alt(&d.configs) {
            // No conflict: uniquely predicted alternative.
            d.is_accept = true;
            d.configs.unique_alt = Some(alt);
            d.prediction = alt as i32;
        } else if prediction_mode::has_sll_conflict_terminating_prediction(
            &self.atn,
            self.mode,
            &d.configs,
        ) {
            // More than one viable alternative: stop here, remember the
            // conflict, and predict the minimum in SLL-only mode.
            let conflicting = prediction_mode::all_alts(
                &prediction_mode::conflicting_alt_subsets(&d.configs),
            );
            d.requires_full_context = true;
            d.is_accept = true;
            d.prediction = conflicting.min_set_bit().expect("conflicting alternative") as i32;
            d.configs.conflicting_alts = Some(conflicting);
        }

        if d.is_accept && d.configs.has_semantic_context {
            self.predicate_dfa_state(&mut d, self.atn.decision_state(dfa.decision));
            if !d.predicates.is_empty() {
                d.prediction = 0;
            }
        }

        let added = dfa.add_state(d);
        if t >= TOKEN_EOF && t <= self.atn.max_token_type {
            dfa.add_edge(previous.state_number, t, Arc::clone(&added));
        }
        added
    }

    /// Attaches `(predicate, alt)` pairs to an accept state whose
    /// configurations carry semantic context.
    fn predicate_dfa_state(&self, d: &mut DfaState, decision_state: StateId) {
        // Test every predicate, even in states that uniquely predict an
        // alternative.
        let nalts = self.atn.state(decision_state).transitions.len();
        let alts_to_collect = Self::conflicting_alts_or_unique_alt(&d.configs);
        match self.preds_for_ambig_alts(&alts_to_collect, &d.configs, nalts) {
            Some(alt_to_pred) => {
                d.predicates = Self::predicate_predictions(&alts_to_collect, &alt_to_pred);
                d.prediction = 0;
            }
            None => {
                // Predicates existed but OR-ed away ({p}? || true == true);
                // resolve to the minimum alternative.
                d.prediction = alts_to_collect
                    .min_set_bit()
                    .expect("at least one alternative") as i32;
            }
        }
    }

    fn conflicting_alts_or_unique_alt(configs: &AtnConfigSet) -> BitSet {
        match configs.unique_alt {
            Some(alt) => BitSet::of(alt),
            None => configs.conflicting_alts.clone().unwrap_or_default(),
        }
    }

    /// Per-alternative predicate, OR-ed over that alternative's
    /// configurations. `None` when no alternative is actually predicated.
    fn preds_for_ambig_alts(
        &self,
        ambig_alts: &BitSet,
        configs: &AtnConfigSet,
        nalts: usize,
    ) -> Option<Vec<SemanticContext>> {
        let mut alt_to_pred: Vec<Option<SemanticContext>> = vec![None; nalts + 1];
        for config in configs {
            if ambig_alts.get(config.alt) {
                let combined = match alt_to_pred[config.alt].take() {
                    None => config.semantic_context.clone(),
                    Some(prev) => SemanticContext::or(prev, config.semantic_context.clone()),
                };
                alt_to_pred[config.alt] = Some(combined);
            }
        }

        let mut n_pred_alts = 0;
        let filled: Vec<SemanticContext> = alt_to_pred
            .into_iter()
            .map(|slot| match slot {
                None => SemanticContext::NONE,
                Some(pred) => {
                    if !pred.is_none() {
                        n_pred_alts += 1;
                    }
                    pred
                }
            })
            .collect();

        (n_pred_alts > 0).then_some(filled)
    }

    fn predicate_predictions(
        ambig_alts: &BitSet,
        alt_to_pred: &[SemanticContext],
    ) -> Vec<(SemanticContext, usize)> {
        let mut pairs = Vec::new();
        for (alt, pred) in alt_to_pred.iter().enumerate().skip(1) {
            if ambig_alts.get(alt) {
                pairs.push((pred.clone(), alt));
            }
        }
        pairs
    }

    fn exec_atn_with_full_context(
        &mut self,
        input: &mut dyn IntStream,
        host: &mut dyn ParserHost,
        s0: AtnConfigSet,
    ) -> Result<usize, PredictionError> {
        let mut found_exact_ambig = false;
        let mut previous = s0;
        input.seek(self.start_index);
        let mut t = input.la(1);

        let (reach, predicted_alt, unique) = loop {
            let mut reach = self.compute_reach_set(input, host, &previous, t, true);
            if reach.is_empty() {
                input.seek(self.start_index);
                if let Some(alt) = self.syn_valid_or_sem_invalid_alt(host, &previous) {
                    return Ok(alt);
                }
                return Err(self.no_viable_alt(input, &previous));
            }

            let alt_sub_sets = prediction_mode::conflicting_alt_subsets(&reach);
            reach.unique_alt = Self::unique_alt(&reach);
            if let Some(alt) = reach.unique_alt {
                break (reach, alt, true);
            }
            if self.mode != PredictionMode::LlExactAmbigDetection {
                if let Some(alt) = prediction_mode::resolves_to_just_one_viable_alt(&alt_sub_sets)
                {
                    break (reach, alt, false);
                }
            } else if prediction_mode::all_subsets_conflict(&alt_sub_sets)
                && prediction_mode::all_subsets_equal(&alt_sub_sets)
            {
                // Exact mode never terminates early: keep consuming until the
                // conflict is fully characterized.
                found_exact_ambig = true;
                let alt = prediction_mode::resolves_to_just_one_viable_alt(&alt_sub_sets)
                    .expect("equal conflicting subsets share a minimum");
                break (reach, alt, false);
            }

            previous = reach;
            if t != TOKEN_EOF {
                input.consume();
                t = input.la(1);
            }
        };

        if unique {
            // A unique full-context prediction after an SLL conflict is a
            // context sensitivity, not an ambiguity.
            self.listener.report_context_sensitivity(
                self.decision,
                predicted_alt,
                self.start_index,
                input.index(),
                &reach,
            );
            return Ok(predicted_alt);
        }

        // Predicates were evaluated on the fly during full-context closure;
        // nothing further gates the result.
        self.listener.report_ambiguity(
            self.decision,
            self.start_index,
            input.index(),
            found_exact_ambig,
            &reach.alts(),
            &reach,
        );
        Ok(predicted_alt)
    }

    fn compute_reach_set(
        &mut self,
        input: &mut dyn IntStream,
        host: &mut dyn ParserHost,
        closure_set: &AtnConfigSet,
        t: i32,
        full_ctx: bool,
    ) -> AtnConfigSet {
        let atn = Arc::clone(&self.atn);
        let mut intermediate = AtnConfigSet::new(full_ctx);

        // Configurations already in a rule stop state can only survive an
        // EOF step (or, in full context, the longest-match comparison), so
        // they are set aside rather than fed to closure.
        let mut skipped_stop_states: Vec<AtnConfig> = Vec::new();

        for config in closure_set {
            let state = atn.state(config.state);
            if state.is_rule_stop() {
                debug_assert!(config.context.is_empty());
                if full_ctx || t == TOKEN_EOF {
                    skipped_stop_states.push(config.clone());
                }
                continue;
            }
            for transition in &state.transitions {
                if let Some(target) = Self::reachable_target(&atn, transition, t) {
                    intermediate.add(config.transition(atn.state(target)));
                }
            }
        }

        let mut reach;
        let trivially_terminal = skipped_stop_states.is_empty()
            && t != TOKEN_EOF
            && (intermediate.len() == 1 || Self::unique_alt(&intermediate).is_some());
        if trivially_terminal {
            // A single config or a unique alternative already decides the
            // prediction; skip the closure.
            reach = intermediate;
        } else {
            reach = AtnConfigSet::new(full_ctx);
            let mut busy: HashSet<AtnConfig> = HashSet::new();
            let treat_eof_as_epsilon = t == TOKEN_EOF;
            for config in &intermediate {
                self.closure(
                    input,
                    host,
                    config.clone(),
                    &mut reach,
                    &mut busy,
                    false,
                    full_ctx,
                    treat_eof_as_epsilon,
                );
            }
            if t == TOKEN_EOF {
                // After EOF only configurations that reached the end of the
                // decision rule (or start rule, in full context) matter.
                let look_to_end = reach == intermediate;
                reach = self.remove_all_configs_not_in_rule_stop_state(&reach, look_to_end);
            }
        }

        if !skipped_stop_states.is_empty()
            && (!full_ctx || !prediction_mode::has_config_in_rule_stop_state(&atn, &reach))
        {
            // Re-add the deferred stop configurations unless a longer match
            // also reached a stop state.
            for config in skipped_stop_states {
                reach.add(config);
            }
        }
        reach
    }

    fn remove_all_configs_not_in_rule_stop_state(
        &self,
        configs: &AtnConfigSet,
        look_to_end_of_rule: bool,
    ) -> AtnConfigSet {
        let atn = &self.atn;
        if prediction_mode::all_configs_in_rule_stop_states(atn, configs) {
            return configs.clone();
        }
        let mut result = AtnConfigSet::new(configs.full_ctx);
        for config in configs {
            let state = atn.state(config.state);
            if state.is_rule_stop() {
                result.add(config.clone());
                continue;
            }
            if look_to_end_of_rule && state.epsilon_only_transitions() {
                // The rule end is epsilon-reachable, so the config matches
                // the implicit EOF transition through it.
                let next = atn.next_tokens(config.state);
                if next.contains(TOKEN_EPSILON) {
                    let end = atn.rule_to_stop_state[state.rule_index];
                    result.add(config.transition(atn.state(end)));
                }
            }
        }
        result
    }

    fn compute_start_state(
        &mut self,
        input: &mut dyn IntStream,
        host: &mut dyn ParserHost,
        p: StateId,
        ctx: Option<&Arc<RuleContext>>,
        full_ctx: bool,
    ) -> AtnConfigSet {
        let atn = Arc::clone(&self.atn);
        // Always at least the implicit call to the start rule.
        let initial_context = PredictionContext::from_rule_context(&atn, ctx.map(Arc::as_ref));
        let mut configs = AtnConfigSet::new(full_ctx);
        for (i, transition) in atn.state(p).transitions.iter().enumerate() {
            let target = atn.state(transition.target());
            let config = AtnConfig::new(target, i + 1, initial_context.clone());
            let mut busy: HashSet<AtnConfig> = HashSet::new();
            self.closure(
                input,
                host,
                config,
                &mut configs,
                &mut busy,
                true,
                full_ctx,
                false,
            );
        }
        configs
    }

    /// Transforms a precedence DFA's start set for the current precedence:
    /// evaluates precedence predicates on alt-1 configurations and drops
    /// alt>1 configurations shadowed by an alt-1 twin, unless they carry the
    /// suppression flag from a precedence-zero re-entry.
    fn apply_precedence_filter(
        &mut self,
        host: &mut dyn ParserHost,
        configs: &AtnConfigSet,
    ) -> AtnConfigSet {
        let mut states_from_alt1: HashMap<StateId, PredictionContext, ahash::RandomState> =
            HashMap::default();
        let mut result = AtnConfigSet::new(configs.full_ctx);
        let outer = self.outer_context.clone();

        for config in configs {
            if config.alt != 1 {
                continue;
            }
            let Some(updated) = config
                .semantic_context
                .eval_precedence(host, outer.as_ref())
            else {
                // The predicate failed at this precedence.
                continue;
            };
            states_from_alt1.insert(config.state, config.context.clone());
            if updated != config.semantic_context {
                let mut c = config.clone();
                c.semantic_context = updated;
                result.add(c);
            } else {
                result.add(config.clone());
            }
        }

        for config in configs {
            if config.alt == 1 {
                continue;
            }
            if !config.is_precedence_filter_suppressed()
                && let Some(context) = states_from_alt1.get(&config.state)
                && *context == config.context
            {
                // Shadowed by the enter-loop alternative.
                continue;
            }
            result.add(config.clone());
        }
        result
    }

    fn reachable_target(atn: &Atn, transition: &Transition, t: i32) -> Option<StateId> {
        transition
            .matches(t, 0, atn.max_token_type)
            .then(|| transition.target())
    }

    #[allow(clippy::too_many_arguments)]
    fn closure(
        &mut self,
        input: &mut dyn IntStream,
        host: &mut dyn ParserHost,
        config: AtnConfig,
        configs: &mut AtnConfigSet,
        busy: &mut HashSet<AtnConfig>,
        collect_predicates: bool,
        full_ctx: bool,
        treat_eof_as_epsilon: bool,
    ) {
        self.closure_checking_stop_state(
            input,
            host,
            config,
            configs,
            busy,
            collect_predicates,
            full_ctx,
            0,
            treat_eof_as_epsilon,
        );
        debug_assert!(!full_ctx || !configs.dips_into_outer_context);
    }

    #[allow(clippy::too_many_arguments)]
    fn closure_checking_stop_state(
        &mut self,
        input: &mut dyn IntStream,
        host: &mut dyn ParserHost,
        config: AtnConfig,
        configs: &mut AtnConfigSet,
        busy: &mut HashSet<AtnConfig>,
        collect_predicates: bool,
        full_ctx: bool,
        depth: i32,
        treat_eof_as_epsilon: bool,
    ) {
        let atn = Arc::clone(&self.atn);
        let state = atn.state(config.state);

        if state.is_rule_stop() {
            if !config.context.is_empty() {
                // Run through every possible stack top.
                for i in 0..config.context.len() {
                    if config.context.return_state(i) == EMPTY_RETURN_STATE {
                        if full_ctx {
                            let mut c = config.clone();
                            c.context = PredictionContext::empty();
                            configs.add(c);
                        } else {
                            // No stack left: chase the global follow links.
                            self.closure_work(
                                input,
                                host,
                                config.clone(),
                                configs,
                                busy,
                                collect_predicates,
                                full_ctx,
                                depth,
                                treat_eof_as_epsilon,
                            );
                        }
                        continue;
                    }
                    let return_state = StateId(config.context.return_state(i));
                    let new_context = config
                        .context
                        .parent(i)
                        .expect("non-bottom slot has a parent")
                        .clone();
                    let mut c = AtnConfig::with_semantic(
                        atn.state(return_state),
                        config.alt,
                        new_context,
                        config.semantic_context.clone(),
                    );
                    // The popped config keeps the outer-context depth and the
                    // precedence-filter suppression of its source.
                    c.set_outer_context_raw(config.outer_context_raw());
                    self.closure_checking_stop_state(
                        input,
                        host,
                        c,
                        configs,
                        busy,
                        collect_predicates,
                        full_ctx,
                        depth - 1,
                        treat_eof_as_epsilon,
                    );
                }
                return;
            } else if full_ctx {
                // Reached the end of the start rule.
                configs.add(config);
                return;
            }
            // SLL with an empty stack: fall through and chase follow links.
        }

        self.closure_work(
            input,
            host,
            config,
            configs,
            busy,
            collect_predicates,
            full_ctx,
            depth,
            treat_eof_as_epsilon,
        );
    }

    #[allow(clippy::too_many_arguments)]
    fn closure_work(
        &mut self,
        input: &mut dyn IntStream,
        host: &mut dyn ParserHost,
        config: AtnConfig,
        configs: &mut AtnConfigSet,
        busy: &mut HashSet<AtnConfig>,
        collect_predicates: bool,
        full_ctx: bool,
        depth: i32,
        treat_eof_as_epsilon: bool,
    ) {
        let atn = Arc::clone(&self.atn);
        let p = atn.state(config.state);

        if !p.epsilon_only_transitions() {
            // EOF transitions can act as both epsilon and consuming
            // transitions, so keep expanding below either way.
            configs.add(config.clone());
        }

        for (i, transition) in p.transitions.iter().enumerate() {
            if i == 0 && self.can_drop_loop_entry_edge(&config) {
                continue;
            }

            let continue_collecting =
                collect_predicates && !matches!(transition, Transition::Action { .. });
            let target = self.epsilon_target(
                input,
                host,
                &config,
                transition,
                continue_collecting,
                depth == 0,
                full_ctx,
                treat_eof_as_epsilon,
            );
            let Some(mut c) = target else {
                continue;
            };

            let mut new_depth = depth;
            if p.is_rule_stop() {
                // The target fell off the end of the decision rule; track how
                // far we walk into the outer context.
                debug_assert!(!full_ctx);

                if busy.contains(&c) {
                    // Right-recursive rules would recurse forever.
                    continue;
                }

                if self.in_precedence_dfa
                    && let Transition::Epsilon {
                        outermost_precedence_return: Some(rule),
                        ..
                    } = transition
                    && *rule == self.dfa_start_rule
                {
                    c.set_precedence_filter_suppressed(true);
                }

                c.increment_outer_context_depth();

                if !busy.insert(c.clone()) {
                    continue;
                }

                configs.dips_into_outer_context = true;
                new_depth -= 1;
            } else if !transition.is_epsilon() {
                // EOF-as-epsilon steps also need the recursion guard.
                if !busy.insert(c.clone()) {
                    continue;
                }
            }

            if matches!(transition, Transition::Rule { .. }) {
                // Latch at negative depth: once closure has left the entry
                // context it never counts back in.
                if new_depth >= 0 {
                    new_depth += 1;
                }
            }

            self.closure_checking_stop_state(
                input,
                host,
                c,
                configs,
                busy,
                continue_collecting,
                full_ctx,
                new_depth,
                treat_eof_as_epsilon,
            );
        }
    }

    /// Whether the loop-back edge of a left-recursive loop entry can be
    /// skipped during closure. Sound only when every stack in the
    /// configuration returns into this rule and funnels back to this loop
    /// entry (or the block end of its star block) through single epsilon
    /// edges.
    fn can_drop_loop_entry_edge(&self, config: &AtnConfig) -> bool {
        if lr_loop_opt_disabled() {
            return false;
        }
        let atn = &self.atn;
        let p = atn.state(config.state);
        let StateKind::StarLoopEntry {
            precedence_decision: true,
            ..
        } = p.kind
        else {
            return false;
        };
        // An empty-stack case means global follow; the edge must stay.
        if config.context.is_empty() || config.context.has_empty_path() {
            return false;
        }

        let num_ctxs = config.context.len();
        for i in 0..num_ctxs {
            let return_state = atn.state(StateId(config.context.return_state(i)));
            if return_state.rule_index != p.rule_index {
                return false;
            }
        }

        let decision_start = p.transitions[0].target();
        let StateKind::BlockStart {
            end_state: block_end,
            ..
        } = atn.state(decision_start).kind
        else {
            return false;
        };

        for i in 0..num_ctxs {
            let return_state_id = StateId(config.context.return_state(i));
            let return_state = atn.state(return_state_id);
            if return_state.transitions.len() != 1 || !return_state.transitions[0].is_epsilon() {
                return false;
            }
            let return_target = return_state.transitions[0].target();

            // Prefix op like 'not expr': block end returning to the entry.
            if matches!(return_state.kind, StateKind::BlockEnd { .. }) && return_target == p.id {
                continue;
            }
            // 'expr op expr': the return state is the star block's end.
            if return_state_id == block_end {
                continue;
            }
            // Ternary 'expr ? expr : expr': return target is the block end.
            if return_target == block_end {
                continue;
            }
            // 'between expr and expr': one more block-end hop to the entry.
            let target_state = atn.state(return_target);
            if matches!(target_state.kind, StateKind::BlockEnd { .. })
                && target_state.transitions.len() == 1
                && target_state.transitions[0].is_epsilon()
                && target_state.transitions[0].target() == p.id
            {
                continue;
            }

            return false;
        }
        true
    }

    #[allow(clippy::too_many_arguments)]
    fn epsilon_target(
        &mut self,
        input: &mut dyn IntStream,
        host: &mut dyn ParserHost,
        config: &AtnConfig,
        transition: &Transition,
        collect_predicates: bool,
        in_context: bool,
        full_ctx: bool,
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
            Transition::Precedence { target, precedence } => self.predicated_target(
                input,
                host,
                config,
                atn.state(*target),
                SemanticContext::PrecedencePredicate {
                    precedence: *precedence,
                },
                collect_predicates && in_context,
                full_ctx,
            ),
            Transition::Predicate {
                target,
                rule_index,
                pred_index,
                ctx_dependent,
            } => self.predicated_target(
                input,
                host,
                config,
                atn.state(*target),
                SemanticContext::Predicate {
                    rule_index: *rule_index,
                    pred_index: *pred_index,
                    ctx_dependent: *ctx_dependent,
                },
                collect_predicates && (!*ctx_dependent || in_context),
                full_ctx,
            ),
            Transition::Action { target, .. } | Transition::Epsilon { target, .. } => {
                Some(config.transition(atn.state(*target)))
            }
            Transition::Atom { .. } | Transition::Range { .. } | Transition::Set { .. } => {
                // EOF transitions act like epsilon once the first EOF has
                // been consumed.
                if treat_eof_as_epsilon && transition.matches(TOKEN_EOF, 0, 1) {
                    return Some(config.transition(atn.state(transition.target())));
                }
                None
            }
            _ => None,
        }
    }

    fn predicated_target(
        &mut self,
        input: &mut dyn IntStream,
        host: &mut dyn ParserHost,
        config: &AtnConfig,
        target: &AtnState,
        predicate: SemanticContext,
        gate: bool,
        full_ctx: bool,
    ) -> Option<AtnConfig> {
        if !gate {
            return Some(config.transition(target));
        }
        if full_ctx {
            // Full-context closure evaluates predicates on the fly, which
            // shrinks the config sets and spares conflict resolution. The
            // input must sit at the decision start for the call.
            let current_position = input.index();
            input.seek(self.start_index);
            let outer = self.outer_context.clone();
            let passes = predicate.eval(host, outer.as_ref());
            input.seek(current_position);
            return passes.then(|| config.transition(target));
        }
        let new_semantic =
            SemanticContext::and(config.semantic_context.clone(), predicate);
        Some(config.transition_with_semantic(target, new_semantic))
    }

    fn syn_valid_or_sem_invalid_alt(
        &mut self,
        host: &mut dyn ParserHost,
        configs: &AtnConfigSet,
    ) -> Option<usize> {
        let (succeeded, failed) = self.split_by_semantic_validity(host, configs);
        if let Some(alt) = self.alt_that_finished_decision_entry_rule(&succeeded) {
            // A semantically and syntactically viable path exists.
            return Some(alt);
        }
        if !failed.is_empty() {
            // A syntactically viable path with a failed predicate.
            if let Some(alt) = self.alt_that_finished_decision_entry_rule(&failed) {
                return Some(alt);
            }
        }
        None
    }

    fn alt_that_finished_decision_entry_rule(&self, configs: &AtnConfigSet) -> Option<usize> {
        let mut alts = BitSet::new();
        for config in configs {
            if config.outer_context_depth() > 0
                || (self.atn.state(config.state).is_rule_stop()
                    && config.context.has_empty_path())
            {
                alts.set(config.alt);
            }
        }
        alts.min_set_bit()
    }

    fn split_by_semantic_validity(
        &mut self,
        host: &mut dyn ParserHost,
        configs: &AtnConfigSet,
    ) -> (AtnConfigSet, AtnConfigSet) {
        let mut succeeded = AtnConfigSet::new(configs.full_ctx);
        let mut failed = AtnConfigSet::new(configs.full_ctx);
        let outer = self.outer_context.clone();
        for config in configs {
            if config.semantic_context.is_none() {
                succeeded.add(config.clone());
            } else if config.semantic_context.eval(host, outer.as_ref()) {
                succeeded.add(config.clone());
            } else {
                failed.add(config.clone());
            }
        }
        (succeeded, failed)
    }

    fn eval_predicates(
        &mut self,
        host: &mut dyn ParserHost,
        predicates: &[(SemanticContext, usize)],
        complete: bool,
    ) -> BitSet {
        let mut predictions = BitSet::new();
        let outer = self.outer_context.clone();
        for (predicate, alt) in predicates {
            if predicate.is_none() {
                predictions.set(*alt);
                if !complete {
                    break;
                }
                continue;
            }
            if predicate.eval(host, outer.as_ref()) {
                predictions.set(*alt);
                if !complete {
                    break;
                }
            }
        }
        predictions
    }

    fn unique_alt(configs: &AtnConfigSet) -> Option<usize> {
        let mut alt = None;
        for config in configs {
            match alt {
                None => alt = Some(config.alt),
                Some(a) if a != config.alt => return None,
                _ => {}
            }
        }
        alt
    }

    fn no_viable_alt(
        &self,
        input: &mut dyn IntStream,
        configs: &AtnConfigSet,
    ) -> PredictionError {
        PredictionError::NoViableAlt {
            decision: self.decision,
            start_index: self.start_index,
            offending_index: input.index(),
            dead_end: configs.clone(),
            context: self.outer_context.clone(),
        }
    }
}
