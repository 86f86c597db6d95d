//! Concurrent prediction over a shared DFA cache.

mod common;

use std::sync::Arc;

use common::{ExprHost, INT, MUL, PLUS, expr_atn, parse_expr};
use llstar::dfa::DfaCache;
use llstar::parser::ParserAtnSimulator;
use llstar::stream::TokenBuffer;

const TOKENS: &[i32] = &[INT, PLUS, INT, MUL, INT, PLUS, INT];

#[test]
fn concurrent_predictions_agree_and_share_one_dfa() {
    let (atn, grammar) = expr_atn();
    let atn = Arc::new(atn);
    let shared_cache = Arc::new(DfaCache::for_parser(&atn));

    // Reference run with a private cache.
    let reference_cache = Arc::new(DfaCache::for_parser(&atn));
    let mut reference_sim =
        ParserAtnSimulator::new(Arc::clone(&atn), Arc::clone(&reference_cache));
    let mut input = TokenBuffer::new(TOKENS.to_vec());
    let mut host = ExprHost::new();
    let reference_log =
        parse_expr(&mut reference_sim, &grammar, &mut input, &mut host).expect("reference parse");

    let threads = 8;
    let logs: Vec<_> = std::thread::scope(|scope| {
        let handles: Vec<_> = (0..threads)
            .map(|_| {
                let atn = Arc::clone(&atn);
                let cache = Arc::clone(&shared_cache);
                scope.spawn(move || {
                    let mut sim = ParserAtnSimulator::new(atn, cache);
                    let mut input = TokenBuffer::new(TOKENS.to_vec());
                    let mut host = ExprHost::new();
                    parse_expr(&mut sim, &grammar, &mut input, &mut host)
                        .expect("concurrent parse")
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().expect("no panic")).collect()
    });

    // Every thread predicted the same alternatives.
    for log in &logs {
        assert_eq!(log, &reference_log);
    }

    // Racing simulators converged on one DFA state per unique config set:
    // the shared cache is no larger than the single-threaded one.
    for decision in 0..shared_cache.len() {
        assert_eq!(
            shared_cache.dfa(decision).state_count(),
            reference_cache.dfa(decision).state_count(),
            "decision {decision} diverged"
        );
    }

    // And a fresh run over the warm cache adds nothing.
    let before: Vec<usize> = (0..shared_cache.len())
        .map(|d| shared_cache.dfa(d).state_count())
        .collect();
    let mut sim = ParserAtnSimulator::new(Arc::clone(&atn), Arc::clone(&shared_cache));
    let mut input = TokenBuffer::new(TOKENS.to_vec());
    let mut host = ExprHost::new();
    parse_expr(&mut sim, &grammar, &mut input, &mut host).expect("warm parse");
    let after: Vec<usize> = (0..shared_cache.len())
        .map(|d| shared_cache.dfa(d).state_count())
        .collect();
    assert_eq!(before, after);
}
