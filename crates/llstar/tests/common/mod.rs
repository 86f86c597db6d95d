//! Shared fixtures: hand-assembled ATNs mirroring what a grammar compiler
//! would emit, plus a tiny recursive-descent harness that drives prediction
//! the way generated parser code does.

#![allow(dead_code)]

use std::sync::Arc;

use llstar::atn::{Atn, BlockKind, GrammarType, Recognizer, StateId, StateKind};
use llstar::parser::{ParserAtnSimulator, ParserHost, RuleContext};
use llstar::stream::IntStream;
use llstar::testing::AtnBuilder;
use llstar::PredictionError;

pub const INT: i32 = 1;
pub const MUL: i32 = 2;
pub const PLUS: i32 = 3;

/// Decision indices and invocation sites of the expression grammar.
#[derive(Debug, Clone, Copy)]
pub struct ExprGrammar {
    pub block_decision: usize,
    pub loop_decision: usize,
    /// State whose rule transition performs the `'*'` recursive call.
    pub mul_call_state: StateId,
    /// State whose rule transition performs the `'+'` recursive call.
    pub plus_call_state: StateId,
    /// State in the start rule that invokes `e`.
    pub start_call_state: StateId,
}

/// The ATN of the left-recursion-eliminated grammar
///
/// ```text
/// s : e EOF ;
/// e : e '*' e | e '+' e | INT ;
/// ```
///
/// which the elimination rewrites to
///
/// ```text
/// e[p] : INT ( {2 >= p}? '*' e[3] | {1 >= p}? '+' e[2] )* ;
/// ```
pub fn expr_atn() -> (Atn, ExprGrammar) {
    let mut b = AtnBuilder::new(GrammarType::Parser, 3);

    // rule e = rule 0, left recursive
    let e_start = b.state(
        0,
        StateKind::RuleStart {
            stop_state: StateId::INVALID,
            left_recursive: true,
        },
    );
    let e_stop = b.state(0, StateKind::RuleStop);
    b.link_rule(0, e_start, e_stop);

    // primary: INT
    let primary = b.basic(0);
    let after_int = b.basic(0);
    b.epsilon(e_start, primary);
    b.atom(primary, after_int, INT);

    // ( ... )* machinery
    let loop_back = b.state(0, StateKind::StarLoopBack);
    let loop_end = b.state(0, StateKind::LoopEnd { loop_back });
    let loop_entry = b.state(
        0,
        StateKind::StarLoopEntry {
            loop_back,
            precedence_decision: true,
        },
    );
    let (block_start, block_end) = b.block(0, BlockKind::Star);

    b.epsilon(after_int, loop_entry);
    // Transition order matters: the enter edge must be first.
    b.epsilon(loop_entry, block_start);
    b.epsilon(loop_entry, loop_end);
    b.epsilon(loop_end, e_stop);
    b.epsilon(block_end, loop_back);
    b.epsilon(loop_back, loop_entry);

    // alt 1: {2 >= p}? '*' e[3]
    let mul_alt = b.basic(0);
    let mul_pred_ok = b.basic(0);
    let mul_call = b.basic(0);
    b.epsilon(block_start, mul_alt);
    b.precedence_predicate(mul_alt, mul_pred_ok, 2);
    b.atom(mul_pred_ok, mul_call, MUL);
    b.rule_call(mul_call, 0, 3, block_end);

    // alt 2: {1 >= p}? '+' e[2]
    let plus_alt = b.basic(0);
    let plus_pred_ok = b.basic(0);
    let plus_call = b.basic(0);
    b.epsilon(block_start, plus_alt);
    b.precedence_predicate(plus_alt, plus_pred_ok, 1);
    b.atom(plus_pred_ok, plus_call, PLUS);
    b.rule_call(plus_call, 0, 2, block_end);

    // rule s = rule 1: e EOF
    let s_start = b.state(
        1,
        StateKind::RuleStart {
            stop_state: StateId::INVALID,
            left_recursive: false,
        },
    );
    let s_stop = b.state(1, StateKind::RuleStop);
    b.link_rule(1, s_start, s_stop);
    let s_call = b.basic(1);
    let s_after_e = b.basic(1);
    let s_after_eof = b.basic(1);
    b.epsilon(s_start, s_call);
    b.rule_call(s_call, 0, 0, s_after_e);
    b.atom(s_after_e, s_after_eof, llstar::atn::TOKEN_EOF);
    b.epsilon(s_after_eof, s_stop);

    let block_decision = b.decision(block_start);
    let loop_decision = b.decision(loop_entry);

    let atn = b.build();
    let grammar = ExprGrammar {
        block_decision,
        loop_decision,
        mul_call_state: mul_call,
        plus_call_state: plus_call,
        start_call_state: s_call,
    };
    (atn, grammar)
}

/// Host mimicking the precedence stack of a generated parser.
pub struct ExprHost {
    precedence_stack: Vec<i32>,
}

impl ExprHost {
    pub fn new() -> Self {
        Self {
            precedence_stack: vec![0],
        }
    }

    fn current(&self) -> i32 {
        *self.precedence_stack.last().expect("non-empty stack")
    }
}

impl Recognizer for ExprHost {
    fn sempred(&mut self, _: Option<&Arc<RuleContext>>, _: usize, _: usize) -> bool {
        true
    }

    fn precpred(&mut self, _: Option<&Arc<RuleContext>>, precedence: i32) -> bool {
        precedence >= self.current()
    }
}

impl ParserHost for ExprHost {
    fn precedence(&self) -> i32 {
        self.current()
    }
}

/// One prediction the harness performed: `(decision, chosen alternative)`.
pub type DecisionLog = Vec<(usize, usize)>;

/// Parses `e` the way generated code would: match INT, then loop on the
/// entry decision, dispatching operators through the block decision.
pub fn parse_expr(
    sim: &mut ParserAtnSimulator,
    grammar: &ExprGrammar,
    input: &mut dyn IntStream,
    host: &mut ExprHost,
) -> Result<DecisionLog, PredictionError> {
    let mut log = DecisionLog::new();
    let root = RuleContext::root();
    let ctx = RuleContext::child(&root, grammar.start_call_state);
    parse_e(sim, grammar, input, host, &ctx, 0, &mut log)?;
    assert_eq!(input.la(1), llstar::atn::TOKEN_EOF, "input fully consumed");
    Ok(log)
}

fn parse_e(
    sim: &mut ParserAtnSimulator,
    grammar: &ExprGrammar,
    input: &mut dyn IntStream,
    host: &mut ExprHost,
    ctx: &Arc<RuleContext>,
    precedence: i32,
    log: &mut DecisionLog,
) -> Result<(), PredictionError> {
    host.precedence_stack.push(precedence);
    assert_eq!(input.la(1), INT, "primary must be INT");
    input.consume();

    loop {
        let alt = sim.adaptive_predict(input, grammar.loop_decision, Some(ctx), host)?;
        log.push((grammar.loop_decision, alt));
        if alt != 1 {
            break;
        }
        let op_alt = sim.adaptive_predict(input, grammar.block_decision, Some(ctx), host)?;
        log.push((grammar.block_decision, op_alt));
        match op_alt {
            1 => {
                assert_eq!(input.la(1), MUL);
                input.consume();
                let child = RuleContext::child(ctx, grammar.mul_call_state);
                parse_e(sim, grammar, input, host, &child, 3, log)?;
            }
            2 => {
                assert_eq!(input.la(1), PLUS);
                input.consume();
                let child = RuleContext::child(ctx, grammar.plus_call_state);
                parse_e(sim, grammar, input, host, &child, 2, log)?;
            }
            other => panic!("impossible operator alternative {other}"),
        }
    }

    host.precedence_stack.pop();
    Ok(())
}

pub const ID: i32 = 1;

/// Decision index of the predicated grammar `a : {p1}? ID | {p2}? ID ;`.
pub fn predicated_atn() -> (Atn, usize) {
    let mut b = AtnBuilder::new(GrammarType::Parser, 1);
    let start = b.state(
        0,
        StateKind::RuleStart {
            stop_state: StateId::INVALID,
            left_recursive: false,
        },
    );
    let stop = b.state(0, StateKind::RuleStop);
    b.link_rule(0, start, stop);

    let (block_start, block_end) = b.block(0, BlockKind::Basic);
    b.epsilon(start, block_start);
    b.epsilon(block_end, stop);

    for pred_index in 0..2 {
        let alt = b.basic(0);
        let gated = b.basic(0);
        let matched = b.basic(0);
        b.epsilon(block_start, alt);
        b.predicate(alt, gated, 0, pred_index, false);
        b.atom(gated, matched, ID);
        b.epsilon(matched, block_end);
    }

    let decision = b.decision(block_start);
    (b.build(), decision)
}

/// Host with fixed predicate outcomes.
pub struct PredicateHost {
    pub outcomes: Vec<bool>,
}

impl Recognizer for PredicateHost {
    fn sempred(&mut self, _: Option<&Arc<RuleContext>>, _: usize, pred_index: usize) -> bool {
        self.outcomes[pred_index]
    }

    fn precpred(&mut self, _: Option<&Arc<RuleContext>>, _: i32) -> bool {
        true
    }
}

impl ParserHost for PredicateHost {
    fn precedence(&self) -> i32 {
        0
    }
}
