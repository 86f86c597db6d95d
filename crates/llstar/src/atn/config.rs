//! ATN configurations: `(state, alternative, context, semantic context)`.

use std::sync::Arc;

use super::context::PredictionContext;
use super::lexer_action::LexerActionExecutor;
use super::semantic::SemanticContext;
use super::state::{AtnState, StateId};
use crate::util::mix;

/// Bit of [`AtnConfig::reaches_into_outer_context`] that exempts a
/// configuration from the precedence filter: it returned from a
/// precedence-zero invocation of the left-recursive rule.
const SUPPRESS_PRECEDENCE_FILTER: u32 = 0x4000_0000;

/// One point in the subset construction: an ATN state reached while
/// predicting `alt`, with the call stack(s) that got us there and the
/// predicates collected along the way.
#[derive(Debug, Clone)]
pub struct AtnConfig {
    pub state: StateId,
    pub alt: usize,
    pub context: PredictionContext,
    pub semantic_context: SemanticContext,
    /// Counts how far closure has stepped out of the decision's entry rule;
    /// the top bit is the precedence-filter suppression flag.
    reaches_into_outer_context: u32,
    /// Actions collected along the path (lexer simulation only).
    pub lexer_executor: Option<Arc<LexerActionExecutor>>,
    /// Whether the configuration sits on a non-greedy decision state.
    passed_non_greedy: bool,
}

impl AtnConfig {
    #[must_use]
    pub fn new(state: &AtnState, alt: usize, context: PredictionContext) -> Self {
        Self::with_semantic(state, alt, context, SemanticContext::NONE)
    }

    #[must_use]
    pub fn with_semantic(
        state: &AtnState,
        alt: usize,
        context: PredictionContext,
        semantic_context: SemanticContext,
    ) -> Self {
        Self {
            state: state.id,
            alt,
            context,
            semantic_context,
            reaches_into_outer_context: 0,
            lexer_executor: None,
            passed_non_greedy: state.is_decision() && state.non_greedy,
        }
    }

    /// A copy of `self` moved to `target`, keeping everything else.
    #[must_use]
    pub fn transition(&self, target: &AtnState) -> Self {
        let mut config = self.clone();
        config.state = target.id;
        config.passed_non_greedy =
            self.passed_non_greedy || (target.is_decision() && target.non_greedy);
        config
    }

    /// A copy of `self` moved to `target` with a replacement context.
    #[must_use]
    pub fn transition_with_context(
        &self,
        target: &AtnState,
        context: PredictionContext,
    ) -> Self {
        let mut config = self.transition(target);
        config.context = context;
        config
    }

    /// A copy of `self` moved to `target` with a replacement predicate.
    #[must_use]
    pub fn transition_with_semantic(
        &self,
        target: &AtnState,
        semantic_context: SemanticContext,
    ) -> Self {
        let mut config = self.transition(target);
        config.semantic_context = semantic_context;
        config
    }

    /// A copy of `self` moved to `target` with a replacement executor.
    #[must_use]
    pub fn transition_with_executor(
        &self,
        target: &AtnState,
        lexer_executor: Option<Arc<LexerActionExecutor>>,
    ) -> Self {
        let mut config = self.transition(target);
        config.lexer_executor = lexer_executor;
        config
    }

    #[must_use]
    pub const fn outer_context_depth(&self) -> u32 {
        self.reaches_into_outer_context & !SUPPRESS_PRECEDENCE_FILTER
    }

    pub fn increment_outer_context_depth(&mut self) {
        self.reaches_into_outer_context += 1;
    }

    pub(crate) fn set_outer_context_raw(&mut self, raw: u32) {
        self.reaches_into_outer_context = raw;
    }

    pub(crate) const fn outer_context_raw(&self) -> u32 {
        self.reaches_into_outer_context
    }

    #[must_use]
    pub const fn is_precedence_filter_suppressed(&self) -> bool {
        self.reaches_into_outer_context & SUPPRESS_PRECEDENCE_FILTER != 0
    }

    pub fn set_precedence_filter_suppressed(&mut self, suppressed: bool) {
        if suppressed {
            self.reaches_into_outer_context |= SUPPRESS_PRECEDENCE_FILTER;
        } else {
            self.reaches_into_outer_context &= !SUPPRESS_PRECEDENCE_FILTER;
        }
    }

    #[must_use]
    pub const fn has_passed_through_non_greedy_decision(&self) -> bool {
        self.passed_non_greedy
    }

    pub(crate) fn mix_hash(&self) -> u64 {
        let mut h = mix(7, u64::from(self.state.0));
        h = mix(h, self.alt as u64);
        h = mix(h, self.context.hash_value());
        h = mix(h, self.semantic_context.mix_hash());
        h = mix(h, u64::from(self.is_precedence_filter_suppressed()));
        h = mix(
            h,
            self.lexer_executor
                .as_ref()
                .map_or(0, |e| e.hash_value()),
        );
        mix(h, u64::from(self.passed_non_greedy))
    }
}

impl PartialEq for AtnConfig {
    fn eq(&self, other: &Self) -> bool {
        self.state == other.state
            && self.alt == other.alt
            && self.context == other.context
            && self.semantic_context == other.semantic_context
            && self.is_precedence_filter_suppressed() == other.is_precedence_filter_suppressed()
            && self.lexer_executor == other.lexer_executor
            && self.passed_non_greedy == other.passed_non_greedy
    }
}

impl Eq for AtnConfig {}

impl std::hash::Hash for AtnConfig {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        state.write_u64(self.mix_hash());
    }
}
