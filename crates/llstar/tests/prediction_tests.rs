//! End-to-end parser prediction scenarios.

mod common;

use std::sync::Arc;

use common::{ExprHost, INT, MUL, PLUS, PredicateHost, expr_atn, parse_expr, predicated_atn};
use llstar::PredictionError;
use llstar::dfa::DfaCache;
use llstar::parser::{ParserAtnSimulator, PredictionMode, RuleContext};
use llstar::stream::{IntStream, TokenBuffer};

fn expr_setup() -> (ParserAtnSimulator, common::ExprGrammar) {
    let (atn, grammar) = expr_atn();
    let atn = Arc::new(atn);
    let cache = Arc::new(DfaCache::for_parser(&atn));
    (ParserAtnSimulator::new(atn, cache), grammar)
}

#[test]
fn left_recursive_plus_chain_associates_through_precedence() {
    let (mut sim, grammar) = expr_setup();
    let mut input = TokenBuffer::new(vec![INT, PLUS, INT, PLUS, INT]);
    let mut host = ExprHost::new();

    let log = parse_expr(&mut sim, &grammar, &mut input, &mut host).expect("parse succeeds");

    // The operator block picks the '+' alternative at both operators.
    let block: Vec<usize> = log
        .iter()
        .filter(|(d, _)| *d == grammar.block_decision)
        .map(|(_, alt)| *alt)
        .collect();
    assert_eq!(block, vec![2, 2]);

    // The loop entry enters twice (both '+' at the outermost precedence) and
    // exits three times: once in each nested e[2] invocation, where the
    // precedence predicate {1 >= 2} fails, and once at EOF.
    let loop_alts: Vec<usize> = log
        .iter()
        .filter(|(d, _)| *d == grammar.loop_decision)
        .map(|(_, alt)| *alt)
        .collect();
    assert_eq!(loop_alts, vec![1, 2, 1, 2, 2]);
}

#[test]
fn precedence_dfa_keys_start_states_by_precedence() {
    let (mut sim, grammar) = expr_setup();
    let mut input = TokenBuffer::new(vec![INT, PLUS, INT]);
    let mut host = ExprHost::new();
    parse_expr(&mut sim, &grammar, &mut input, &mut host).expect("parse succeeds");

    let dfa = Arc::clone(sim.dfa_cache());
    let loop_dfa = dfa.dfa(grammar.loop_decision);
    assert!(loop_dfa.is_precedence_dfa());
    // Separate start states were installed for precedence 0 (outer) and 2
    // (inside the '+' operand).
    assert!(loop_dfa.start_state(0).is_some());
    assert!(loop_dfa.start_state(2).is_some());
}

#[test]
fn rerunning_identical_input_leaves_the_dfa_unchanged() {
    let (mut sim, grammar) = expr_setup();

    let mut input = TokenBuffer::new(vec![INT, PLUS, INT, MUL, INT]);
    let mut host = ExprHost::new();
    let first = parse_expr(&mut sim, &grammar, &mut input, &mut host).expect("first parse");

    let cache = Arc::clone(sim.dfa_cache());
    let states_after_first: Vec<usize> = (0..cache.len())
        .map(|d| cache.dfa(d).state_count())
        .collect();
    let edges_after_first: Vec<usize> = (0..cache.len())
        .map(|d| cache.dfa(d).edge_count())
        .collect();

    let mut input = TokenBuffer::new(vec![INT, PLUS, INT, MUL, INT]);
    let mut host = ExprHost::new();
    let second = parse_expr(&mut sim, &grammar, &mut input, &mut host).expect("second parse");

    assert_eq!(first, second);
    let states_after_second: Vec<usize> = (0..cache.len())
        .map(|d| cache.dfa(d).state_count())
        .collect();
    let edges_after_second: Vec<usize> = (0..cache.len())
        .map(|d| cache.dfa(d).edge_count())
        .collect();
    assert_eq!(states_after_first, states_after_second);
    assert_eq!(edges_after_first, edges_after_second);
}

#[test]
fn failed_predicate_selects_the_other_alternative() {
    let (atn, decision) = predicated_atn();
    let atn = Arc::new(atn);
    let cache = Arc::new(DfaCache::for_parser(&atn));
    let mut sim = ParserAtnSimulator::new(atn, cache);

    let mut host = PredicateHost {
        outcomes: vec![false, true],
    };
    let mut input = TokenBuffer::new(vec![common::ID]);
    let root = RuleContext::root();
    let alt = sim
        .adaptive_predict(&mut input, decision, Some(&root), &mut host)
        .expect("prediction succeeds");
    assert_eq!(alt, 2);
}

#[test]
fn ambiguous_predicates_resolve_to_minimum_and_stay_on_the_dfa() {
    let (atn, decision) = predicated_atn();
    let atn = Arc::new(atn);
    let cache = Arc::new(DfaCache::for_parser(&atn));
    let mut sim = ParserAtnSimulator::new(Arc::clone(&atn), Arc::clone(&cache));

    let mut host = PredicateHost {
        outcomes: vec![true, true],
    };
    let mut input = TokenBuffer::new(vec![common::ID]);
    let root = RuleContext::root();
    let alt = sim
        .adaptive_predict(&mut input, decision, Some(&root), &mut host)
        .expect("prediction succeeds");
    assert_eq!(alt, 1);

    // The conflict state carries both predicate/alt pairs.
    let with_preds: Vec<_> = cache
        .dfa(decision)
        .states()
        .into_iter()
        .filter(|s| !s.predicates.is_empty())
        .collect();
    assert_eq!(with_preds.len(), 1);
    assert_eq!(with_preds[0].predicates.len(), 2);
}

#[test]
fn sll_mode_evaluates_predicates_at_the_accept_state() {
    let (atn, decision) = predicated_atn();
    let atn = Arc::new(atn);
    let cache = Arc::new(DfaCache::for_parser(&atn));
    let mut sim = ParserAtnSimulator::new(atn, cache);
    sim.mode = PredictionMode::Sll;

    let mut host = PredicateHost {
        outcomes: vec![false, true],
    };
    let mut input = TokenBuffer::new(vec![common::ID]);
    let root = RuleContext::root();
    let alt = sim
        .adaptive_predict(&mut input, decision, Some(&root), &mut host)
        .expect("prediction succeeds");
    assert_eq!(alt, 2);
}

#[test]
fn unmatchable_input_reports_no_viable_alternative() {
    let (atn, decision) = predicated_atn();
    let atn = Arc::new(atn);
    let cache = Arc::new(DfaCache::for_parser(&atn));
    let mut sim = ParserAtnSimulator::new(atn, cache);

    let mut host = PredicateHost {
        outcomes: vec![true, true],
    };
    // Token type 1 is ID; nothing matches EOF-only input.
    let mut input = TokenBuffer::new(vec![]);
    let root = RuleContext::root();
    let err = sim
        .adaptive_predict(&mut input, decision, Some(&root), &mut host)
        .expect_err("no viable alternative");
    match err {
        PredictionError::NoViableAlt {
            decision: failed_decision,
            start_index,
            ..
        } => {
            assert_eq!(failed_decision, decision);
            assert_eq!(start_index, 0);
        }
        other => panic!("unexpected error: {other}"),
    }
}

/// `a : X Y | X Y ;` — a genuinely ambiguous decision (X = 1, Y = 2).
fn ambiguous_atn() -> (llstar::Atn, usize) {
    use llstar::atn::{BlockKind, GrammarType, StateId, StateKind};
    use llstar::testing::AtnBuilder;

    let mut b = AtnBuilder::new(GrammarType::Parser, 2);
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
    for _ in 0..2 {
        let a0 = b.basic(0);
        let a1 = b.basic(0);
        let a2 = b.basic(0);
        b.epsilon(block_start, a0);
        b.atom(a0, a1, 1);
        b.atom(a1, a2, 2);
        b.epsilon(a2, block_end);
    }
    let decision = b.decision(block_start);
    (b.build(), decision)
}

#[derive(Default)]
struct RecordingListener {
    ambiguities: Arc<std::sync::Mutex<Vec<(bool, Vec<usize>)>>>,
}

impl llstar::parser::PredictionListener for RecordingListener {
    fn report_ambiguity(
        &mut self,
        _decision: usize,
        _start_index: usize,
        _stop_index: usize,
        exact: bool,
        ambig_alts: &llstar::BitSet,
        _configs: &llstar::AtnConfigSet,
    ) {
        self.ambiguities
            .lock()
            .expect("listener lock")
            .push((exact, ambig_alts.iter().collect()));
    }
}

#[test]
fn exact_ambiguity_mode_reports_the_full_conflicting_set() {
    let (atn, decision) = ambiguous_atn();
    let atn = Arc::new(atn);
    let cache = Arc::new(DfaCache::for_parser(&atn));
    let mut sim = ParserAtnSimulator::new(atn, cache);
    sim.mode = PredictionMode::LlExactAmbigDetection;

    let reports = Arc::new(std::sync::Mutex::new(Vec::new()));
    sim.set_listener(Box::new(RecordingListener {
        ambiguities: Arc::clone(&reports),
    }));

    let mut host = PredicateHost { outcomes: vec![] };
    let mut input = TokenBuffer::new(vec![1, 2]);
    let root = RuleContext::root();
    let alt = sim
        .adaptive_predict(&mut input, decision, Some(&root), &mut host)
        .expect("prediction succeeds");

    // Both alternatives match; the minimum wins and the ambiguity is exact.
    assert_eq!(alt, 1);
    let reports = reports.lock().expect("listener lock");
    assert_eq!(reports.as_slice(), &[(true, vec![1, 2])]);
}

#[test]
fn plain_ll_mode_reports_the_same_ambiguity_as_inexact() {
    let (atn, decision) = ambiguous_atn();
    let atn = Arc::new(atn);
    let cache = Arc::new(DfaCache::for_parser(&atn));
    let mut sim = ParserAtnSimulator::new(atn, cache);

    let reports = Arc::new(std::sync::Mutex::new(Vec::new()));
    sim.set_listener(Box::new(RecordingListener {
        ambiguities: Arc::clone(&reports),
    }));

    let mut host = PredicateHost { outcomes: vec![] };
    let mut input = TokenBuffer::new(vec![1, 2]);
    let root = RuleContext::root();
    let alt = sim
        .adaptive_predict(&mut input, decision, Some(&root), &mut host)
        .expect("prediction succeeds");

    assert_eq!(alt, 1);
    let reports = reports.lock().expect("listener lock");
    assert_eq!(reports.as_slice(), &[(false, vec![1, 2])]);
}

#[test]
fn prediction_restores_the_input_position() {
    let (mut sim, grammar) = expr_setup();
    let mut input = TokenBuffer::new(vec![INT, PLUS, INT]);
    let mut host = ExprHost::new();

    input.consume(); // past INT, at '+'
    let before = input.index();
    let root = RuleContext::root();
    let ctx = RuleContext::child(&root, grammar.start_call_state);
    let alt = sim
        .adaptive_predict(&mut input, grammar.loop_decision, Some(&ctx), &mut host)
        .expect("prediction succeeds");
    assert_eq!(alt, 1);
    assert_eq!(input.index(), before);
}
