//! Minimal parser invocation chains.
//!
//! The engine only needs two things from a rule context: its parent and the
//! ATN state that invoked the current rule. Generated parsers wrap richer
//! context types around this shape.

use std::sync::Arc;

use crate::atn::StateId;

#[derive(Debug, Clone, Default)]
pub struct RuleContext {
    pub parent: Option<Arc<RuleContext>>,
    /// The state holding the rule transition that invoked this rule;
    /// `None` for the start rule.
    pub invoking_state: Option<StateId>,
}

impl RuleContext {
    /// The context of the start rule: nobody invoked it.
    #[must_use]
    pub fn root() -> Arc<RuleContext> {
        Arc::new(RuleContext::default())
    }

    /// A child context entered through the rule transition at
    /// `invoking_state`.
    #[must_use]
    pub fn child(parent: &Arc<RuleContext>, invoking_state: StateId) -> Arc<RuleContext> {
        Arc::new(RuleContext {
            parent: Some(Arc::clone(parent)),
            invoking_state: Some(invoking_state),
        })
    }
}
