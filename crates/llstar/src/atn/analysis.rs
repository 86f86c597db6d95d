//! Static follow-set computation over the ATN graph.
//!
//! `look` answers "which tokens can appear next from this state", expanding
//! epsilon and rule transitions the same way closure does but collecting
//! terminal labels instead of configurations. Rule invocations push a frame
//! onto a small linked stack; falling off a rule with no stack left reports
//! [`TOKEN_EPSILON`](super::TOKEN_EPSILON) so callers can keep walking their
//! own invocation chain, while an exhausted `$` stack reports EOF.

use std::sync::Arc;

use hashbrown::HashSet;

use crate::parser::RuleContext;
use crate::util::{BitSet, IntervalSet};

use super::context::{EMPTY_RETURN_STATE, PredictionContext};
use super::state::StateId;
use super::transition::Transition;
use super::{Atn, TOKEN_EOF, TOKEN_EPSILON, TOKEN_MIN_USER};

/// The analyzer's view of a call stack. `Unknown` means "no information" (a
/// bare `next_tokens` query), `Exhausted` is the `$` bottom reached by
/// popping every frame.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum LookContext {
    Unknown,
    Exhausted,
    Frame { return_state: u32, parent: Arc<LookContext> },
}

impl LookContext {
    fn from_prediction_context(ctx: &PredictionContext) -> LookContext {
        if ctx.is_empty() {
            return LookContext::Exhausted;
        }
        // Chains built from rule contexts are singleton towers.
        debug_assert_eq!(ctx.len(), 1);
        debug_assert_ne!(ctx.return_state(0), EMPTY_RETURN_STATE);
        let parent = ctx
            .parent(0)
            .map_or(LookContext::Exhausted, Self::from_prediction_context);
        LookContext::Frame {
            return_state: ctx.return_state(0),
            parent: Arc::new(parent),
        }
    }
}

pub(super) fn look(atn: &Atn, state: StateId, ctx: Option<&RuleContext>) -> IntervalSet {
    let mut result = IntervalSet::new();
    let look_ctx = match ctx {
        None => LookContext::Unknown,
        Some(c) => LookContext::from_prediction_context(&PredictionContext::from_rule_context(
            atn,
            Some(c),
        )),
    };
    let mut busy = HashSet::new();
    let mut called_rule_stack = BitSet::new();
    walk(
        atn,
        state,
        look_ctx,
        &mut result,
        &mut busy,
        &mut called_rule_stack,
    );
    result
}

fn walk(
    atn: &Atn,
    s: StateId,
    ctx: LookContext,
    look: &mut IntervalSet,
    busy: &mut HashSet<(StateId, LookContext)>,
    called_rule_stack: &mut BitSet,
) {
    if !busy.insert((s, ctx.clone())) {
        return;
    }

    let state = atn.state(s);

    if state.is_rule_stop() {
        match &ctx {
            LookContext::Unknown => {
                look.add(TOKEN_EPSILON);
                return;
            }
            LookContext::Exhausted => {
                look.add(TOKEN_EOF);
                return;
            }
            LookContext::Frame {
                return_state,
                parent,
            } => {
                let removed = called_rule_stack.get(state.rule_index);
                called_rule_stack.clear(state.rule_index);
                walk(
                    atn,
                    StateId(*return_state),
                    (**parent).clone(),
                    look,
                    busy,
                    called_rule_stack,
                );
                if removed {
                    called_rule_stack.set(state.rule_index);
                }
                return;
            }
        }
    }

    for transition in &state.transitions {
        match transition {
            Transition::Rule {
                target,
                follow_state,
                ..
            } => {
                let callee_rule = atn.state(*target).rule_index;
                if called_rule_stack.get(callee_rule) {
                    continue;
                }
                let pushed = LookContext::Frame {
                    return_state: follow_state.0,
                    parent: Arc::new(ctx.clone()),
                };
                called_rule_stack.set(callee_rule);
                walk(atn, *target, pushed, look, busy, called_rule_stack);
                called_rule_stack.clear(callee_rule);
            }
            Transition::Epsilon { target, .. }
            | Transition::Action { target, .. }
            | Transition::Predicate { target, .. }
            | Transition::Precedence { target, .. } => {
                walk(
                    atn,
                    *target,
                    ctx.clone(),
                    look,
                    busy,
                    called_rule_stack,
                );
            }
            Transition::Wildcard { .. } => {
                look.add_range(TOKEN_MIN_USER, atn.max_token_type);
            }
            Transition::NotSet { set, .. } => {
                look.add_set(&set.complement(TOKEN_MIN_USER, atn.max_token_type));
            }
            other => {
                if let Some(label) = other.label() {
                    look.add_set(&label);
                }
            }
        }
    }
}
