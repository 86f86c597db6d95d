//! Decoding the serialized ATN wire image.
//!
//! The image is a flat array of 16-bit code units: header, states (with the
//! extra word LOOP_END and BLOCK_START kinds carry), non-greedy and
//! left-recursive state lists, rules, modes, two set tables (16-bit then
//! 32-bit interval elements), edges, decisions, and lexer actions. Return
//! edges from rule stop states are not in the image; they are derived from
//! the rule transitions after the edge load.

use crate::error::DeserializeError;
use crate::util::IntervalSet;

use super::state::{BlockKind, StateId, StateKind};
use super::transition::Transition;
use super::{Atn, GrammarType, LexerAction};

/// Version the deserializer accepts.
pub const SERIALIZED_VERSION: u16 = 4;

/// Sentinel meaning "no index" in 16-bit fields.
const INVALID_0XFFFF: u16 = 0xFFFF;

struct Reader<'a> {
    data: &'a [u16],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn u16(&mut self) -> Result<u16, DeserializeError> {
        let value = self
            .data
            .get(self.pos)
            .copied()
            .ok_or(DeserializeError::Truncated { offset: self.pos })?;
        self.pos += 1;
        Ok(value)
    }

    fn usize(&mut self) -> Result<usize, DeserializeError> {
        Ok(self.u16()? as usize)
    }

    fn state_id(&mut self) -> Result<StateId, DeserializeError> {
        Ok(StateId(u32::from(self.u16()?)))
    }

    /// A 32-bit value stored as two 16-bit units, low word first.
    fn u32(&mut self) -> Result<u32, DeserializeError> {
        let lo = u32::from(self.u16()?);
        let hi = u32::from(self.u16()?);
        Ok(lo | (hi << 16))
    }
}

/// Decodes serialized ATNs, optionally verifying graph invariants.
#[derive(Debug, Clone)]
pub struct AtnDeserializer {
    verify: bool,
}

impl Default for AtnDeserializer {
    fn default() -> Self {
        Self { verify: true }
    }
}

impl AtnDeserializer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Skips the invariant verification pass after loading.
    #[must_use]
    pub fn without_verification() -> Self {
        Self { verify: false }
    }

    /// Builds an [`Atn`] from its wire image.
    ///
    /// # Errors
    ///
    /// [`DeserializeError`] on version mismatch, truncated data, unknown
    /// kind codes, or (when verification is enabled) violated graph
    /// invariants.
    pub fn deserialize(&self, data: &[u16]) -> Result<Atn, DeserializeError> {
        let mut r = Reader { data, pos: 0 };

        let version = r.u16()?;
        if version != SERIALIZED_VERSION {
            return Err(DeserializeError::UnsupportedVersion {
                found: version,
                expected: SERIALIZED_VERSION,
            });
        }

        let grammar_type = match r.u16()? {
            0 => GrammarType::Lexer,
            _ => GrammarType::Parser,
        };
        let max_token_type = i32::from(r.u16()?);
        let mut atn = Atn::new(grammar_type, max_token_type);

        self.read_states(&mut r, &mut atn)?;
        Self::read_non_greedy_states(&mut r, &mut atn)?;
        Self::read_precedence_states(&mut r, &mut atn)?;
        Self::read_rules(&mut r, &mut atn)?;
        Self::read_modes(&mut r, &mut atn)?;

        let mut sets = Vec::new();
        Self::read_sets(&mut r, &mut sets, false)?;
        Self::read_sets(&mut r, &mut sets, true)?;
        Self::read_edges(&mut r, &mut atn, &sets)?;

        Self::derive_rule_stop_edges(&mut atn);
        Self::link_block_and_loop_states(&mut atn)?;
        Self::read_decisions(&mut r, &mut atn)?;
        if atn.grammar_type == GrammarType::Lexer {
            Self::read_lexer_actions(&mut r, &mut atn)?;
        }

        Self::mark_precedence_decisions(&mut atn);
        if self.verify {
            Self::verify_atn(&atn)?;
        }
        Ok(atn)
    }

    fn read_states(&self, r: &mut Reader<'_>, atn: &mut Atn) -> Result<(), DeserializeError> {
        let nstates = r.usize()?;
        let mut loop_back_numbers: Vec<(StateId, StateId)> = Vec::new();
        let mut end_state_numbers: Vec<(StateId, StateId)> = Vec::new();

        for _ in 0..nstates {
            let offset = r.pos;
            let kind_code = r.u16()?;
            if kind_code == 0 {
                atn.add_state(StateKind::Invalid, usize::MAX);
                continue;
            }
            let rule_index = match r.u16()? {
                INVALID_0XFFFF => usize::MAX,
                index => index as usize,
            };
            let kind = match kind_code {
                1 => StateKind::Basic,
                2 => StateKind::RuleStart {
                    stop_state: StateId::INVALID,
                    left_recursive: false,
                },
                3 => StateKind::BlockStart {
                    block: BlockKind::Basic,
                    end_state: StateId::INVALID,
                },
                4 => StateKind::BlockStart {
                    block: BlockKind::Plus {
                        loop_back: StateId::INVALID,
                    },
                    end_state: StateId::INVALID,
                },
                5 => StateKind::BlockStart {
                    block: BlockKind::Star,
                    end_state: StateId::INVALID,
                },
                6 => StateKind::TokensStart,
                7 => StateKind::RuleStop,
                8 => StateKind::BlockEnd {
                    start_state: StateId::INVALID,
                },
                9 => StateKind::StarLoopBack,
                10 => StateKind::StarLoopEntry {
                    loop_back: StateId::INVALID,
                    precedence_decision: false,
                },
                11 => StateKind::PlusLoopBack,
                12 => StateKind::LoopEnd {
                    loop_back: StateId::INVALID,
                },
                kind => {
                    return Err(DeserializeError::InvalidStateKind { kind, offset });
                }
            };

            let id = atn.add_state(kind, rule_index);
            // Kind-specific extra words; targets may not exist yet, so the
            // links are patched after the loop.
            if kind_code == 12 {
                loop_back_numbers.push((id, r.state_id()?));
            } else if matches!(kind_code, 3 | 4 | 5) {
                end_state_numbers.push((id, r.state_id()?));
            }
        }

        for (id, loop_back) in loop_back_numbers {
            let StateKind::LoopEnd { loop_back: slot } = &mut atn.state_mut(id).kind else {
                unreachable!("recorded only for loop-end states");
            };
            *slot = loop_back;
        }
        for (id, end_state) in end_state_numbers {
            let StateKind::BlockStart {
                end_state: slot, ..
            } = &mut atn.state_mut(id).kind
            else {
                unreachable!("recorded only for block-start states");
            };
            *slot = end_state;
        }
        Ok(())
    }

    fn read_non_greedy_states(r: &mut Reader<'_>, atn: &mut Atn) -> Result<(), DeserializeError> {
        let count = r.usize()?;
        for _ in 0..count {
            let id = r.state_id()?;
            atn.state_mut(id).non_greedy = true;
        }
        Ok(())
    }

    fn read_precedence_states(r: &mut Reader<'_>, atn: &mut Atn) -> Result<(), DeserializeError> {
        let count = r.usize()?;
        for _ in 0..count {
            let id = r.state_id()?;
            let StateKind::RuleStart { left_recursive, .. } = &mut atn.state_mut(id).kind else {
                return Err(DeserializeError::Invariant {
                    message: format!("precedence state {} is not a rule start", id.0),
                });
            };
            *left_recursive = true;
        }
        Ok(())
    }

    fn read_rules(r: &mut Reader<'_>, atn: &mut Atn) -> Result<(), DeserializeError> {
        let nrules = r.usize()?;
        for _ in 0..nrules {
            let start = r.state_id()?;
            atn.rule_to_start_state.push(start);
            if atn.grammar_type == GrammarType::Lexer {
                let token_type = match r.u16()? {
                    INVALID_0XFFFF => super::TOKEN_EOF,
                    t => i32::from(t),
                };
                atn.rule_to_token_type.push(token_type);
            }
        }

        atn.rule_to_stop_state = vec![StateId::INVALID; nrules];
        let stops: Vec<(usize, StateId)> = atn
            .states()
            .filter(|s| s.is_rule_stop())
            .map(|s| (s.rule_index, s.id))
            .collect();
        for (rule, stop) in stops {
            atn.rule_to_stop_state[rule] = stop;
            let start = atn.rule_to_start_state[rule];
            let StateKind::RuleStart { stop_state, .. } = &mut atn.state_mut(start).kind else {
                return Err(DeserializeError::Invariant {
                    message: format!("rule {rule} start state has the wrong kind"),
                });
            };
            *stop_state = stop;
        }
        Ok(())
    }

    fn read_modes(r: &mut Reader<'_>, atn: &mut Atn) -> Result<(), DeserializeError> {
        let nmodes = r.usize()?;
        for _ in 0..nmodes {
            atn.mode_to_start_state.push(r.state_id()?);
        }
        Ok(())
    }

    fn read_sets(
        r: &mut Reader<'_>,
        sets: &mut Vec<IntervalSet>,
        wide: bool,
    ) -> Result<(), DeserializeError> {
        let nsets = r.usize()?;
        for _ in 0..nsets {
            let nintervals = r.usize()?;
            let mut set = IntervalSet::new();
            let contains_eof = r.u16()? != 0;
            if contains_eof {
                set.add(super::TOKEN_EOF);
            }
            for _ in 0..nintervals {
                let (lo, hi) = if wide {
                    (r.u32()? as i32, r.u32()? as i32)
                } else {
                    (i32::from(r.u16()?), i32::from(r.u16()?))
                };
                set.add_range(lo, hi);
            }
            sets.push(set);
        }
        Ok(())
    }

    fn read_edges(
        r: &mut Reader<'_>,
        atn: &mut Atn,
        sets: &[IntervalSet],
    ) -> Result<(), DeserializeError> {
        let nedges = r.usize()?;
        for _ in 0..nedges {
            let offset = r.pos;
            let src = r.state_id()?;
            let trg = r.state_id()?;
            let kind = r.u16()?;
            let arg1 = r.u16()?;
            let arg2 = r.u16()?;
            let arg3 = r.u16()?;
            let transition = Self::edge(trg, kind, arg1, arg2, arg3, sets, offset)?;
            atn.state_mut(src).add_transition(transition);
        }
        Ok(())
    }

    fn edge(
        target: StateId,
        kind: u16,
        arg1: u16,
        arg2: u16,
        arg3: u16,
        sets: &[IntervalSet],
        offset: usize,
    ) -> Result<Transition, DeserializeError> {
        let transition = match kind {
            1 => Transition::Epsilon {
                target,
                outermost_precedence_return: None,
            },
            2 => Transition::Range {
                target,
                lo: if arg3 != 0 {
                    super::TOKEN_EOF
                } else {
                    i32::from(arg1)
                },
                hi: i32::from(arg2),
            },
            3 => Transition::Rule {
                // arg1 is the callee start state; `target` in the image is
                // the follow state.
                target: StateId(u32::from(arg1)),
                rule_index: arg2 as usize,
                precedence: i32::from(arg3),
                follow_state: target,
            },
            4 => Transition::Predicate {
                target,
                rule_index: arg1 as usize,
                pred_index: arg2 as usize,
                ctx_dependent: arg3 != 0,
            },
            5 => Transition::Atom {
                target,
                symbol: if arg3 != 0 {
                    super::TOKEN_EOF
                } else {
                    i32::from(arg1)
                },
            },
            6 => Transition::Action {
                target,
                rule_index: arg1 as usize,
                action_index: if arg2 == INVALID_0XFFFF {
                    usize::MAX
                } else {
                    arg2 as usize
                },
                ctx_dependent: arg3 != 0,
            },
            7 => Transition::Set {
                target,
                set: sets
                    .get(arg1 as usize)
                    .cloned()
                    .ok_or(DeserializeError::InvalidTransitionKind { kind, offset })?,
            },
            8 => Transition::NotSet {
                target,
                set: sets
                    .get(arg1 as usize)
                    .cloned()
                    .ok_or(DeserializeError::InvalidTransitionKind { kind, offset })?,
            },
            9 => Transition::Wildcard { target },
            10 => Transition::Precedence {
                target,
                precedence: i32::from(arg1),
            },
            kind => return Err(DeserializeError::InvalidTransitionKind { kind, offset }),
        };
        Ok(transition)
    }

    /// Return edges from rule stop states are derivable: for every rule
    /// transition, add an epsilon from the callee's stop back to the follow
    /// state. The edge remembers the callee when it returns from a
    /// precedence-zero invocation of a left-recursive rule.
    fn derive_rule_stop_edges(atn: &mut Atn) {
        let mut derived: Vec<(StateId, Transition)> = Vec::new();
        for state in atn.states() {
            for transition in &state.transitions {
                let Transition::Rule {
                    target,
                    precedence,
                    follow_state,
                    ..
                } = transition
                else {
                    continue;
                };
                let callee_rule = atn.state(*target).rule_index;
                let left_recursive = matches!(
                    atn.state(atn.rule_to_start_state[callee_rule]).kind,
                    StateKind::RuleStart {
                        left_recursive: true,
                        ..
                    }
                );
                let outermost_precedence_return =
                    (left_recursive && *precedence == 0).then_some(callee_rule);
                derived.push((
                    atn.rule_to_stop_state[callee_rule],
                    Transition::Epsilon {
                        target: *follow_state,
                        outermost_precedence_return,
                    },
                ));
            }
        }
        for (stop, transition) in derived {
            atn.state_mut(stop).add_transition(transition);
        }
    }

    fn link_block_and_loop_states(atn: &mut Atn) -> Result<(), DeserializeError> {
        // Block ends point back at their starts.
        let mut end_links: Vec<(StateId, StateId)> = Vec::new();
        for state in atn.states() {
            if let StateKind::BlockStart { end_state, .. } = state.kind {
                if end_state == StateId::INVALID {
                    return Err(DeserializeError::Invariant {
                        message: format!("block start {} has no end state", state.id.0),
                    });
                }
                end_links.push((end_state, state.id));
            }
        }
        for (end, start) in end_links {
            let StateKind::BlockEnd { start_state } = &mut atn.state_mut(end).kind else {
                return Err(DeserializeError::Invariant {
                    message: format!("state {} is not a block end", end.0),
                });
            };
            if *start_state != StateId::INVALID {
                return Err(DeserializeError::Invariant {
                    message: format!("block end {} belongs to two block starts", end.0),
                });
            }
            *start_state = start;
        }

        // Loop-back states point forward to their entries; record the
        // reverse links.
        let mut plus_links: Vec<(StateId, StateId)> = Vec::new();
        let mut star_links: Vec<(StateId, StateId)> = Vec::new();
        for state in atn.states() {
            match state.kind {
                StateKind::PlusLoopBack => {
                    for transition in &state.transitions {
                        let target = transition.target();
                        if matches!(
                            atn.state(target).kind,
                            StateKind::BlockStart {
                                block: BlockKind::Plus { .. },
                                ..
                            }
                        ) {
                            plus_links.push((target, state.id));
                        }
                    }
                }
                StateKind::StarLoopBack => {
                    for transition in &state.transitions {
                        let target = transition.target();
                        if matches!(atn.state(target).kind, StateKind::StarLoopEntry { .. }) {
                            star_links.push((target, state.id));
                        }
                    }
                }
                _ => {}
            }
        }
        for (start, loop_back) in plus_links {
            let StateKind::BlockStart {
                block: BlockKind::Plus { loop_back: slot },
                ..
            } = &mut atn.state_mut(start).kind
            else {
                unreachable!("checked kind above");
            };
            *slot = loop_back;
        }
        for (entry, loop_back) in star_links {
            let StateKind::StarLoopEntry {
                loop_back: slot, ..
            } = &mut atn.state_mut(entry).kind
            else {
                unreachable!("checked kind above");
            };
            *slot = loop_back;
        }
        Ok(())
    }

    fn read_decisions(r: &mut Reader<'_>, atn: &mut Atn) -> Result<(), DeserializeError> {
        let ndecisions = r.usize()?;
        for _ in 0..ndecisions {
            let state = r.state_id()?;
            atn.define_decision(state);
        }
        Ok(())
    }

    fn read_lexer_actions(r: &mut Reader<'_>, atn: &mut Atn) -> Result<(), DeserializeError> {
        let nactions = r.usize()?;
        for _ in 0..nactions {
            let offset = r.pos;
            let kind = r.u16()?;
            let data1 = match r.u16()? {
                INVALID_0XFFFF => -1,
                value => i32::from(value),
            };
            let data2 = match r.u16()? {
                INVALID_0XFFFF => -1,
                value => i32::from(value),
            };
            let action = match kind {
                0 => LexerAction::Channel { channel: data1 },
                1 => LexerAction::Custom {
                    rule_index: data1 as usize,
                    action_index: data2 as usize,
                },
                2 => LexerAction::Mode { mode: data1 },
                3 => LexerAction::More,
                4 => LexerAction::PopMode,
                5 => LexerAction::PushMode { mode: data1 },
                6 => LexerAction::Skip,
                7 => LexerAction::Type { token_type: data1 },
                kind => return Err(DeserializeError::InvalidLexerAction { kind, offset }),
            };
            atn.lexer_actions.push(action);
        }
        Ok(())
    }

    /// A star loop entry is a precedence decision iff its rule is
    /// left-recursive and the entry's last transition exits through a loop
    /// end straight into the rule stop.
    fn mark_precedence_decisions(atn: &mut Atn) {
        let mut precedence_entries: Vec<StateId> = Vec::new();
        for state in atn.states() {
            if !matches!(state.kind, StateKind::StarLoopEntry { .. }) {
                continue;
            }
            let left_recursive = matches!(
                atn.state(atn.rule_to_start_state[state.rule_index]).kind,
                StateKind::RuleStart {
                    left_recursive: true,
                    ..
                }
            );
            if !left_recursive {
                continue;
            }
            let Some(last) = state.transitions.last() else {
                continue;
            };
            let maybe_loop_end = atn.state(last.target());
            if matches!(maybe_loop_end.kind, StateKind::LoopEnd { .. })
                && maybe_loop_end.epsilon_only_transitions()
                && atn
                    .state(maybe_loop_end.transitions[0].target())
                    .is_rule_stop()
            {
                precedence_entries.push(state.id);
            }
        }
        for id in precedence_entries {
            let StateKind::StarLoopEntry {
                precedence_decision,
                ..
            } = &mut atn.state_mut(id).kind
            else {
                unreachable!("checked kind above");
            };
            *precedence_decision = true;
        }
    }

    fn check(condition: bool, message: impl FnOnce() -> String) -> Result<(), DeserializeError> {
        if condition {
            Ok(())
        } else {
            Err(DeserializeError::Invariant { message: message() })
        }
    }

    /// Verifies the structural invariants of the loaded graph.
    fn verify_atn(atn: &Atn) -> Result<(), DeserializeError> {
        for state in atn.states() {
            if matches!(state.kind, StateKind::Invalid) {
                continue;
            }
            Self::check(
                state.epsilon_only_transitions() || state.transitions.len() <= 1,
                || format!("state {} mixes consuming transitions", state.id.0),
            )?;

            match state.kind {
                StateKind::BlockStart {
                    block: BlockKind::Plus { loop_back },
                    ..
                } => {
                    Self::check(loop_back != StateId::INVALID, || {
                        format!("plus block start {} has no loop back", state.id.0)
                    })?;
                }
                StateKind::StarLoopEntry { loop_back, .. } => {
                    Self::check(loop_back != StateId::INVALID, || {
                        format!("star loop entry {} has no loop back", state.id.0)
                    })?;
                    Self::check(state.transitions.len() == 2, || {
                        format!("star loop entry {} must have two transitions", state.id.0)
                    })?;
                    let first = atn.state(state.transitions[0].target());
                    let second = atn.state(state.transitions[1].target());
                    let first_is_block = matches!(
                        first.kind,
                        StateKind::BlockStart {
                            block: BlockKind::Star,
                            ..
                        }
                    );
                    if first_is_block {
                        Self::check(
                            matches!(second.kind, StateKind::LoopEnd { .. }) && !state.non_greedy,
                            || format!("greedy star loop entry {} malformed", state.id.0),
                        )?;
                    } else {
                        Self::check(
                            matches!(first.kind, StateKind::LoopEnd { .. })
                                && matches!(
                                    second.kind,
                                    StateKind::BlockStart {
                                        block: BlockKind::Star,
                                        ..
                                    }
                                )
                                && state.non_greedy,
                            || format!("non-greedy star loop entry {} malformed", state.id.0),
                        )?;
                    }
                }
                StateKind::StarLoopBack => {
                    Self::check(state.transitions.len() == 1, || {
                        format!("star loop back {} must have one transition", state.id.0)
                    })?;
                    Self::check(
                        matches!(
                            atn.state(state.transitions[0].target()).kind,
                            StateKind::StarLoopEntry { .. }
                        ),
                        || format!("star loop back {} must enter a loop entry", state.id.0),
                    )?;
                }
                StateKind::LoopEnd { loop_back } => {
                    Self::check(loop_back != StateId::INVALID, || {
                        format!("loop end {} has no loop back", state.id.0)
                    })?;
                }
                StateKind::RuleStart { stop_state, .. } => {
                    Self::check(stop_state != StateId::INVALID, || {
                        format!("rule start {} has no stop state", state.id.0)
                    })?;
                }
                StateKind::BlockStart { end_state, .. } => {
                    Self::check(end_state != StateId::INVALID, || {
                        format!("block start {} has no end state", state.id.0)
                    })?;
                }
                StateKind::BlockEnd { start_state } => {
                    Self::check(start_state != StateId::INVALID, || {
                        format!("block end {} has no start state", state.id.0)
                    })?;
                }
                _ => {}
            }

            if state.is_decision() {
                Self::check(
                    state.transitions.len() <= 1 || state.decision.is_some(),
                    || format!("decision state {} has no decision index", state.id.0),
                )?;
            } else {
                Self::check(
                    state.transitions.len() <= 1 || state.is_rule_stop(),
                    || format!("state {} branches without being a decision", state.id.0),
                )?;
            }
        }
        Ok(())
    }
}
