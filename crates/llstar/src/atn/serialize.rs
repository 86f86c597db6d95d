//! Encoding an ATN into its wire image — the inverse of
//! [`deserialize`](super::deserialize).
//!
//! Rule stop transitions are never written: the deserializer re-derives them
//! from the rule transitions. Sets referenced by `Set`/`NotSet` transitions
//! are interned into two tables, one with 16-bit interval elements and one
//! with 32-bit elements for labels beyond U+FFFF.

use hashbrown::HashMap;

use crate::util::IntervalSet;

use super::deserialize::SERIALIZED_VERSION;
use super::state::StateKind;
use super::transition::Transition;
use super::{Atn, GrammarType, LexerAction, TOKEN_EOF};

/// Serializes `atn` into 16-bit code units accepted by
/// [`AtnDeserializer`](super::AtnDeserializer).
#[must_use]
pub fn serialize(atn: &Atn) -> Vec<u16> {
    let mut data: Vec<u16> = Vec::new();
    data.push(SERIALIZED_VERSION);
    data.push(match atn.grammar_type {
        GrammarType::Lexer => 0,
        GrammarType::Parser => 1,
    });
    data.push(clamp_u16(atn.max_token_type));

    // States, collecting the set tables and flagged state lists on the way.
    let mut non_greedy_states: Vec<u16> = Vec::new();
    let mut precedence_states: Vec<u16> = Vec::new();
    let mut narrow_sets: Vec<IntervalSet> = Vec::new();
    let mut wide_sets: Vec<IntervalSet> = Vec::new();
    let mut set_indices: HashMap<IntervalSet, u16, ahash::RandomState> = HashMap::default();
    let mut nedges: usize = 0;

    data.push(count_u16(atn.num_states()));
    for state in atn.states() {
        if matches!(state.kind, StateKind::Invalid) {
            data.push(0);
            continue;
        }
        if state.is_decision() && state.non_greedy {
            non_greedy_states.push(state.id.0 as u16);
        }
        if matches!(
            state.kind,
            StateKind::RuleStart {
                left_recursive: true,
                ..
            }
        ) {
            precedence_states.push(state.id.0 as u16);
        }

        data.push(state.kind_code());
        data.push(if state.rule_index == usize::MAX {
            0xFFFF
        } else {
            count_u16(state.rule_index)
        });
        match state.kind {
            StateKind::LoopEnd { loop_back } => data.push(loop_back.0 as u16),
            StateKind::BlockStart { end_state, .. } => data.push(end_state.0 as u16),
            _ => {}
        }

        if !state.is_rule_stop() {
            // Stop-state edges are derived on load.
            nedges += state.transitions.len();
        }
        for transition in &state.transitions {
            if let Transition::Set { set, .. } | Transition::NotSet { set, .. } = transition
                && !set_indices.contains_key(set)
            {
                // Placeholder index; the real value is assigned below once
                // both tables are complete.
                set_indices.insert(set.clone(), 0);
                if set_is_narrow(set) {
                    narrow_sets.push(set.clone());
                } else {
                    wide_sets.push(set.clone());
                }
            }
        }
    }

    // The combined table is narrow sets first, then wide sets.
    for (index, set) in narrow_sets.iter().chain(wide_sets.iter()).enumerate() {
        set_indices.insert(set.clone(), count_u16(index));
    }

    data.push(count_u16(non_greedy_states.len()));
    data.extend_from_slice(&non_greedy_states);
    data.push(count_u16(precedence_states.len()));
    data.extend_from_slice(&precedence_states);

    data.push(count_u16(atn.rule_to_start_state.len()));
    for (rule, start) in atn.rule_to_start_state.iter().enumerate() {
        data.push(start.0 as u16);
        if atn.grammar_type == GrammarType::Lexer {
            let token_type = atn.rule_to_token_type[rule];
            data.push(if token_type == TOKEN_EOF {
                0xFFFF
            } else {
                clamp_u16(token_type)
            });
        }
    }

    data.push(count_u16(atn.mode_to_start_state.len()));
    for mode_start in &atn.mode_to_start_state {
        data.push(mode_start.0 as u16);
    }

    write_set_table(&mut data, &narrow_sets, false);
    write_set_table(&mut data, &wide_sets, true);

    data.push(count_u16(nedges));
    for state in atn.states() {
        if matches!(state.kind, StateKind::Invalid) || state.is_rule_stop() {
            continue;
        }
        for transition in &state.transitions {
            write_edge(&mut data, state.id.0 as u16, transition, &set_indices);
        }
    }

    data.push(count_u16(atn.decision_to_state.len()));
    for decision_state in &atn.decision_to_state {
        data.push(decision_state.0 as u16);
    }

    if atn.grammar_type == GrammarType::Lexer {
        data.push(count_u16(atn.lexer_actions.len()));
        for action in &atn.lexer_actions {
            write_lexer_action(&mut data, action);
        }
    }

    data
}

fn set_is_narrow(set: &IntervalSet) -> bool {
    set.max_element().is_none_or(|max| max <= i32::from(u16::MAX))
}

fn write_set_table(data: &mut Vec<u16>, sets: &[IntervalSet], wide: bool) {
    data.push(count_u16(sets.len()));
    for set in sets {
        let contains_eof = set.contains(TOKEN_EOF);
        let intervals: Vec<_> = set
            .intervals()
            .filter(|iv| !(iv.lo == TOKEN_EOF && iv.hi == TOKEN_EOF))
            .collect();
        data.push(count_u16(intervals.len()));
        data.push(u16::from(contains_eof));
        for iv in intervals {
            // EOF is carried by the flag; an interval starting there resumes
            // at zero.
            let lo = if iv.lo == TOKEN_EOF { 0 } else { iv.lo };
            if wide {
                push_u32(data, lo as u32);
                push_u32(data, iv.hi as u32);
            } else {
                data.push(clamp_u16(lo));
                data.push(clamp_u16(iv.hi));
            }
        }
    }
}

fn push_u32(data: &mut Vec<u16>, value: u32) {
    data.push((value & 0xFFFF) as u16);
    data.push((value >> 16) as u16);
}

fn write_edge(
    data: &mut Vec<u16>,
    src: u16,
    transition: &Transition,
    set_indices: &HashMap<IntervalSet, u16, ahash::RandomState>,
) {
    let (trg, kind, arg1, arg2, arg3): (u16, u16, u16, u16, u16) = match transition {
        Transition::Epsilon { target, .. } => (target.0 as u16, 1, 0, 0, 0),
        Transition::Range { target, lo, hi } => {
            if *lo == TOKEN_EOF {
                (target.0 as u16, 2, 0, clamp_u16(*hi), 1)
            } else {
                (target.0 as u16, 2, clamp_u16(*lo), clamp_u16(*hi), 0)
            }
        }
        Transition::Rule {
            target,
            rule_index,
            precedence,
            follow_state,
        } => (
            follow_state.0 as u16,
            3,
            target.0 as u16,
            count_u16(*rule_index),
            clamp_u16(*precedence),
        ),
        Transition::Predicate {
            target,
            rule_index,
            pred_index,
            ctx_dependent,
        } => (
            target.0 as u16,
            4,
            count_u16(*rule_index),
            count_u16(*pred_index),
            u16::from(*ctx_dependent),
        ),
        Transition::Atom { target, symbol } => {
            if *symbol == TOKEN_EOF {
                (target.0 as u16, 5, 0, 0, 1)
            } else {
                (target.0 as u16, 5, clamp_u16(*symbol), 0, 0)
            }
        }
        Transition::Action {
            target,
            rule_index,
            action_index,
            ctx_dependent,
        } => (
            target.0 as u16,
            6,
            count_u16(*rule_index),
            if *action_index == usize::MAX {
                0xFFFF
            } else {
                count_u16(*action_index)
            },
            u16::from(*ctx_dependent),
        ),
        Transition::Set { target, set } => {
            (target.0 as u16, 7, set_indices[set], 0, 0)
        }
        Transition::NotSet { target, set } => {
            (target.0 as u16, 8, set_indices[set], 0, 0)
        }
        Transition::Wildcard { target } => (target.0 as u16, 9, 0, 0, 0),
        Transition::Precedence { target, precedence } => {
            (target.0 as u16, 10, clamp_u16(*precedence), 0, 0)
        }
    };
    data.extend_from_slice(&[src, trg, kind, arg1, arg2, arg3]);
}

fn write_lexer_action(data: &mut Vec<u16>, action: &LexerAction) {
    let (kind, data1, data2): (u16, u16, u16) = match action {
        LexerAction::Channel { channel } => (0, clamp_u16(*channel), 0),
        LexerAction::Custom {
            rule_index,
            action_index,
        } => (1, count_u16(*rule_index), count_u16(*action_index)),
        LexerAction::Mode { mode } => (2, clamp_u16(*mode), 0),
        LexerAction::More => (3, 0, 0),
        LexerAction::PopMode => (4, 0, 0),
        LexerAction::PushMode { mode } => (5, clamp_u16(*mode), 0),
        LexerAction::Skip => (6, 0, 0),
        LexerAction::Type { token_type } => (7, clamp_u16(*token_type), 0),
        LexerAction::Indexed { .. } => {
            unreachable!("indexed actions exist only at runtime, never in the action table")
        }
    };
    data.extend_from_slice(&[kind, data1, data2]);
}

fn clamp_u16(value: i32) -> u16 {
    if value == -1 {
        0xFFFF
    } else {
        u16::try_from(value).expect("value fits in a 16-bit code unit")
    }
}

fn count_u16(value: usize) -> u16 {
    u16::try_from(value).expect("count fits in a 16-bit code unit")
}
