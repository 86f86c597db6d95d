//! Lexer actions and the executor that replays them on token acceptance.

use std::sync::Arc;

use crate::stream::CharStream;
use crate::util::{HASH_SEED, mix};

/// Host hooks invoked when a matched token's actions run, plus the lexer
/// predicate hook. Mirrors the primitives a generated lexer exposes.
pub trait LexerHost {
    fn sempred(&mut self, rule_index: usize, pred_index: usize) -> bool;

    fn more(&mut self);
    fn skip(&mut self);
    fn push_mode(&mut self, mode: i32);
    fn pop_mode(&mut self);
    fn set_mode(&mut self, mode: i32);
    fn set_type(&mut self, token_type: i32);
    fn set_channel(&mut self, channel: i32);
    fn custom_action(&mut self, rule_index: usize, action_index: usize);
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum LexerAction {
    Channel { channel: i32 },
    Custom { rule_index: usize, action_index: usize },
    Mode { mode: i32 },
    More,
    PopMode,
    PushMode { mode: i32 },
    Skip,
    Type { token_type: i32 },
    /// A position-dependent action wrapped with the input offset (relative to
    /// the token start) at which it was collected.
    Indexed { offset: usize, action: Arc<LexerAction> },
}

impl LexerAction {
    /// Position-dependent actions must see the input at the offset where they
    /// appeared, not at the token end.
    #[must_use]
    pub fn is_position_dependent(&self) -> bool {
        matches!(self, LexerAction::Custom { .. } | LexerAction::Indexed { .. })
    }

    pub fn execute(&self, host: &mut dyn LexerHost) {
        match self {
            LexerAction::Channel { channel } => host.set_channel(*channel),
            LexerAction::Custom {
                rule_index,
                action_index,
            } => host.custom_action(*rule_index, *action_index),
            LexerAction::Mode { mode } => host.set_mode(*mode),
            LexerAction::More => host.more(),
            LexerAction::PopMode => host.pop_mode(),
            LexerAction::PushMode { mode } => host.push_mode(*mode),
            LexerAction::Skip => host.skip(),
            LexerAction::Type { token_type } => host.set_type(*token_type),
            LexerAction::Indexed { action, .. } => action.execute(host),
        }
    }

    fn mix_hash(&self, hash: u64) -> u64 {
        match self {
            LexerAction::Channel { channel } => mix(mix(hash, 0), *channel as u64),
            LexerAction::Custom {
                rule_index,
                action_index,
            } => mix(mix(mix(hash, 1), *rule_index as u64), *action_index as u64),
            LexerAction::Mode { mode } => mix(mix(hash, 2), *mode as u64),
            LexerAction::More => mix(hash, 3),
            LexerAction::PopMode => mix(hash, 4),
            LexerAction::PushMode { mode } => mix(mix(hash, 5), *mode as u64),
            LexerAction::Skip => mix(hash, 6),
            LexerAction::Type { token_type } => mix(mix(hash, 7), *token_type as u64),
            LexerAction::Indexed { offset, action } => {
                action.mix_hash(mix(mix(hash, 8), *offset as u64))
            }
        }
    }
}

/// An immutable sequence of lexer actions collected along one accepting path
/// through the ATN. Configurations share executors through `Arc`; appending
/// produces a new executor.
#[derive(Debug)]
pub struct LexerActionExecutor {
    actions: Vec<LexerAction>,
    hash: u64,
}

impl LexerActionExecutor {
    #[must_use]
    pub fn new(actions: Vec<LexerAction>) -> Self {
        let hash = actions
            .iter()
            .fold(mix(HASH_SEED, actions.len() as u64), |h, a| a.mix_hash(h));
        Self { actions, hash }
    }

    /// Extends `prev` (or an empty sequence) with one more action.
    #[must_use]
    pub fn append(prev: Option<&Arc<LexerActionExecutor>>, action: LexerAction) -> Arc<Self> {
        let mut actions = prev.map_or_else(Vec::new, |p| p.actions.clone());
        actions.push(action);
        Arc::new(Self::new(actions))
    }

    #[must_use]
    pub fn actions(&self) -> &[LexerAction] {
        &self.actions
    }

    /// Wraps every bare position-dependent action in an `Indexed` action
    /// carrying `offset`. Returns `None` when nothing needed wrapping, so
    /// callers can keep sharing the original executor.
    #[must_use]
    pub fn fix_offset_before_match(&self, offset: usize) -> Option<Arc<Self>> {
        let mut updated: Option<Vec<LexerAction>> = None;
        for (i, action) in self.actions.iter().enumerate() {
            if action.is_position_dependent() && !matches!(action, LexerAction::Indexed { .. }) {
                let list = updated.get_or_insert_with(|| self.actions.clone());
                list[i] = LexerAction::Indexed {
                    offset,
                    action: Arc::new(action.clone()),
                };
            }
        }
        updated.map(|actions| Arc::new(Self::new(actions)))
    }

    /// Replays the actions. Position-dependent actions see the input seeked
    /// to their recorded offset; the stream is restored to the stop index
    /// afterwards.
    pub fn execute(
        &self,
        host: &mut dyn LexerHost,
        input: &mut dyn CharStream,
        start_index: usize,
    ) {
        let stop_index = input.index();
        let mut requires_seek = false;
        for action in &self.actions {
            if let LexerAction::Indexed { offset, .. } = action {
                input.seek(start_index + offset);
                requires_seek = start_index + offset != stop_index;
            } else if action.is_position_dependent() {
                input.seek(stop_index);
                requires_seek = false;
            }
            action.execute(host);
        }
        if requires_seek {
            input.seek(stop_index);
        }
    }

    #[must_use]
    pub fn hash_value(&self) -> u64 {
        self.hash
    }
}

impl PartialEq for LexerActionExecutor {
    fn eq(&self, other: &Self) -> bool {
        self.hash == other.hash && self.actions == other.actions
    }
}

impl Eq for LexerActionExecutor {}

impl std::hash::Hash for LexerActionExecutor {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        state.write_u64(self.hash);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_shares_nothing_mutates_nothing() {
        let a = LexerActionExecutor::append(None, LexerAction::Skip);
        let b = LexerActionExecutor::append(Some(&a), LexerAction::More);
        assert_eq!(a.actions().len(), 1);
        assert_eq!(b.actions().len(), 2);
        assert_ne!(a.hash_value(), b.hash_value());
    }

    #[test]
    fn fix_offset_wraps_only_position_dependent_actions() {
        let exec = LexerActionExecutor::new(vec![
            LexerAction::Skip,
            LexerAction::Custom {
                rule_index: 0,
                action_index: 1,
            },
        ]);
        let fixed = exec.fix_offset_before_match(2).expect("wrapped");
        assert_eq!(fixed.actions()[0], LexerAction::Skip);
        assert!(matches!(
            &fixed.actions()[1],
            LexerAction::Indexed { offset: 2, .. }
        ));
        // Already-indexed actions are left alone.
        assert!(fixed.fix_offset_before_match(5).is_none());
    }

    #[test]
    fn executors_with_equal_actions_are_equal() {
        let a = LexerActionExecutor::new(vec![LexerAction::More]);
        let b = LexerActionExecutor::new(vec![LexerAction::More]);
        assert_eq!(a, b);
    }

    #[test]
    fn no_position_dependent_actions_means_no_wrap() {
        let exec = LexerActionExecutor::new(vec![LexerAction::Skip, LexerAction::PopMode]);
        assert!(exec.fix_offset_before_match(3).is_none());
    }
}
