//! Error taxonomy of the prediction engine.
//!
//! Prediction failures surface as [`PredictionError`] values carrying the
//! dead-end configuration set so callers can report and recover at the
//! grammar level. Corrupt wire images surface as [`DeserializeError`].
//! Invariant violations — mutating a frozen configuration set, inserting the
//! error sentinel into a DFA — are programming errors and panic instead.

use std::sync::Arc;

use thiserror::Error;

use crate::atn::AtnConfigSet;
use crate::parser::RuleContext;

#[cfg(feature = "diagnostics")]
use miette::Diagnostic;

/// A prediction dead end. No recovery happens inside the engine; the caller
/// owns error handling.
#[derive(Debug, Error)]
#[cfg_attr(feature = "diagnostics", derive(Diagnostic))]
pub enum PredictionError {
    #[error(
        "no viable alternative at decision {decision} (started at token index {start_index}, failed at {offending_index})"
    )]
    #[cfg_attr(feature = "diagnostics", diagnostic(code(llstar::no_viable_alt)))]
    NoViableAlt {
        decision: usize,
        /// Token index where prediction began.
        start_index: usize,
        /// Token index of the symbol with no outgoing transition.
        offending_index: usize,
        /// Configurations alive just before the failure.
        dead_end: AtnConfigSet,
        /// The caller's rule context, when one was supplied.
        context: Option<Arc<RuleContext>>,
    },

    #[error("no viable token alternative at input index {start_index}")]
    #[cfg_attr(feature = "diagnostics", diagnostic(code(llstar::lexer_no_viable_alt)))]
    LexerNoViableAlt {
        /// Character index where the token attempt began.
        start_index: usize,
        dead_end: AtnConfigSet,
    },
}

impl PredictionError {
    /// The configurations alive when prediction failed.
    #[must_use]
    pub fn dead_end_configs(&self) -> &AtnConfigSet {
        match self {
            PredictionError::NoViableAlt { dead_end, .. }
            | PredictionError::LexerNoViableAlt { dead_end, .. } => dead_end,
        }
    }
}

/// Failures while decoding a serialized ATN.
#[derive(Debug, Error)]
#[cfg_attr(feature = "diagnostics", derive(Diagnostic))]
pub enum DeserializeError {
    #[error("unsupported serialized ATN version {found} (expected {expected})")]
    #[cfg_attr(feature = "diagnostics", diagnostic(code(llstar::atn_version)))]
    UnsupportedVersion { found: u16, expected: u16 },

    #[error("serialized ATN data ends prematurely at code unit {offset}")]
    #[cfg_attr(feature = "diagnostics", diagnostic(code(llstar::atn_truncated)))]
    Truncated { offset: usize },

    #[error("invalid state kind {kind} at code unit {offset}")]
    #[cfg_attr(feature = "diagnostics", diagnostic(code(llstar::atn_state_kind)))]
    InvalidStateKind { kind: u16, offset: usize },

    #[error("invalid transition kind {kind} at code unit {offset}")]
    #[cfg_attr(feature = "diagnostics", diagnostic(code(llstar::atn_transition_kind)))]
    InvalidTransitionKind { kind: u16, offset: usize },

    #[error("invalid lexer action kind {kind} at code unit {offset}")]
    #[cfg_attr(feature = "diagnostics", diagnostic(code(llstar::atn_lexer_action)))]
    InvalidLexerAction { kind: u16, offset: usize },

    #[error("malformed ATN: {message}")]
    #[cfg_attr(feature = "diagnostics", diagnostic(code(llstar::atn_invariant)))]
    Invariant { message: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_name_the_failure() {
        let err = DeserializeError::UnsupportedVersion {
            found: 9,
            expected: 4,
        };
        let text = err.to_string();
        assert!(text.contains('9'));
        assert!(text.contains('4'));
    }

    #[test]
    fn dead_end_configs_accessor() {
        let err = PredictionError::LexerNoViableAlt {
            start_index: 0,
            dead_end: AtnConfigSet::new(false),
        };
        assert!(err.dead_end_configs().is_empty());
    }
}
