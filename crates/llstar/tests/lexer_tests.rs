//! End-to-end lexer simulation scenarios.

use std::cell::Cell;
use std::sync::Arc;

use llstar::PredictionError;
use llstar::atn::{
    Atn, BlockKind, GrammarType, LexerAction, LexerHost, StateId, StateKind, TOKEN_EOF,
};
use llstar::dfa::DfaCache;
use llstar::lexer::LexerAtnSimulator;
use llstar::stream::{CharStream, CodePointStream, IntStream};
use llstar::testing::AtnBuilder;

const KEYWORD: i32 = 1;
const IDENT: i32 = 2;

/// Host that ignores every action.
#[derive(Debug, Default)]
struct PlainHost;

impl LexerHost for PlainHost {
    fn sempred(&mut self, _rule_index: usize, _pred_index: usize) -> bool {
        true
    }
    fn more(&mut self) {}
    fn skip(&mut self) {}
    fn push_mode(&mut self, _mode: i32) {}
    fn pop_mode(&mut self) {}
    fn set_mode(&mut self, _mode: i32) {}
    fn set_type(&mut self, _token_type: i32) {}
    fn set_channel(&mut self, _channel: i32) {}
    fn custom_action(&mut self, _rule_index: usize, _action_index: usize) {}
}

/// Lexer grammar:
///
/// ```text
/// KEYWORD : 'if' ;
/// ID      : [a-z]+ ;
/// ```
fn keyword_id_atn() -> Atn {
    let mut b = AtnBuilder::new(GrammarType::Lexer, 2);
    let tokens_start = b.state(usize::MAX, StateKind::TokensStart);
    b.mode(tokens_start);

    // KEYWORD : 'if' ;
    let kw_start = b.state(
        0,
        StateKind::RuleStart {
            stop_state: StateId::INVALID,
            left_recursive: false,
        },
    );
    let kw_stop = b.state(0, StateKind::RuleStop);
    b.link_lexer_rule(0, kw_start, kw_stop, KEYWORD);
    let kw_i = b.basic(0);
    let kw_f = b.basic(0);
    let kw_done = b.basic(0);
    b.epsilon(kw_start, kw_i);
    b.atom(kw_i, kw_f, 'i' as i32);
    b.atom(kw_f, kw_done, 'f' as i32);
    b.epsilon(kw_done, kw_stop);

    // ID : [a-z]+ ;
    let id_start = b.state(
        1,
        StateKind::RuleStart {
            stop_state: StateId::INVALID,
            left_recursive: false,
        },
    );
    let id_stop = b.state(1, StateKind::RuleStop);
    b.link_lexer_rule(1, id_start, id_stop, IDENT);

    let plus_loop_back = b.state(1, StateKind::PlusLoopBack);
    let (block_start, block_end) = b.block(
        1,
        BlockKind::Plus {
            loop_back: plus_loop_back,
        },
    );
    let letter_from = b.basic(1);
    let letter_to = b.basic(1);
    let loop_end = b.state(
        1,
        StateKind::LoopEnd {
            loop_back: plus_loop_back,
        },
    );

    b.epsilon(id_start, block_start);
    b.epsilon(block_start, letter_from);
    b.range(letter_from, letter_to, 'a' as i32, 'z' as i32);
    b.epsilon(letter_to, block_end);
    b.epsilon(block_end, plus_loop_back);
    b.epsilon(plus_loop_back, block_start);
    b.epsilon(plus_loop_back, loop_end);
    b.epsilon(loop_end, id_stop);

    b.epsilon(tokens_start, kw_start);
    b.epsilon(tokens_start, id_start);

    b.decision(tokens_start);
    b.decision(block_start);
    b.decision(plus_loop_back);

    b.build()
}

fn lexer_for(atn: Atn) -> (LexerAtnSimulator, Arc<DfaCache>) {
    let atn = Arc::new(atn);
    let cache = Arc::new(DfaCache::for_lexer(&atn));
    (LexerAtnSimulator::new(atn, Arc::clone(&cache)), cache)
}

#[test]
fn keyword_wins_over_ident_on_exact_match() {
    let (mut sim, _cache) = lexer_for(keyword_id_atn());
    let mut input = CodePointStream::new("if");
    let token = sim
        .match_token(&mut input, 0, &mut PlainHost)
        .expect("token matched");
    assert_eq!(token, KEYWORD);
    assert_eq!(input.index(), 2);
}

#[test]
fn longest_match_prefers_ident_over_keyword_prefix() {
    let (mut sim, _cache) = lexer_for(keyword_id_atn());
    let mut input = CodePointStream::new("iffy");
    let token = sim
        .match_token(&mut input, 0, &mut PlainHost)
        .expect("token matched");
    assert_eq!(token, IDENT);
    assert_eq!(input.index(), 4);
}

#[test]
fn tokenizes_a_sequence_reusing_the_dfa() {
    let (mut sim, cache) = lexer_for(keyword_id_atn());
    let mut input = CodePointStream::new("ifif");

    let first = sim
        .match_token(&mut input, 0, &mut PlainHost)
        .expect("token");
    let states_after_first = cache.dfa(0).state_count();
    let second = sim
        .match_token(&mut input, 0, &mut PlainHost)
        .expect("token");

    // "ifif" is one ID (longest match), so the second call sees EOF.
    assert_eq!(first, IDENT);
    assert_eq!(second, TOKEN_EOF);
    assert_eq!(cache.dfa(0).state_count(), states_after_first);
}

#[test]
fn eof_at_start_returns_eof() {
    let (mut sim, _cache) = lexer_for(keyword_id_atn());
    let mut input = CodePointStream::new("");
    let token = sim
        .match_token(&mut input, 0, &mut PlainHost)
        .expect("EOF token");
    assert_eq!(token, TOKEN_EOF);
}

#[test]
fn unmatchable_character_reports_lexer_no_viable_alt() {
    let (mut sim, _cache) = lexer_for(keyword_id_atn());
    let mut input = CodePointStream::new("9");
    let err = sim
        .match_token(&mut input, 0, &mut PlainHost)
        .expect_err("no viable alternative");
    match err {
        PredictionError::LexerNoViableAlt { start_index, .. } => assert_eq!(start_index, 0),
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn column_tracks_consumed_characters() {
    let (mut sim, _cache) = lexer_for(keyword_id_atn());
    let mut input = CodePointStream::new("iffy");
    sim.match_token(&mut input, 0, &mut PlainHost)
        .expect("token");
    assert_eq!(sim.line(), 1);
    assert_eq!(sim.char_position_in_line(), 4);
}

/// Lexer grammar with a position-dependent custom action in the middle of
/// the rule:
///
/// ```text
/// WORD : 'a' 'b' {custom} 'c' 'd' ;
/// ```
fn custom_action_atn() -> Atn {
    let mut b = AtnBuilder::new(GrammarType::Lexer, 1);
    let tokens_start = b.state(usize::MAX, StateKind::TokensStart);
    b.mode(tokens_start);

    let start = b.state(
        0,
        StateKind::RuleStart {
            stop_state: StateId::INVALID,
            left_recursive: false,
        },
    );
    let stop = b.state(0, StateKind::RuleStop);
    b.link_lexer_rule(0, start, stop, 1);

    let action_index = b.lexer_action(LexerAction::Custom {
        rule_index: 0,
        action_index: 0,
    });

    let s_a = b.basic(0);
    let s_b = b.basic(0);
    let s_act = b.basic(0);
    let s_c = b.basic(0);
    let s_d = b.basic(0);
    let s_done = b.basic(0);
    b.epsilon(start, s_a);
    b.atom(s_a, s_b, 'a' as i32);
    b.atom(s_b, s_act, 'b' as i32);
    b.action(s_act, s_c, 0, action_index);
    b.atom(s_c, s_d, 'c' as i32);
    b.atom(s_d, s_done, 'd' as i32);
    b.epsilon(s_done, stop);

    b.epsilon(tokens_start, start);
    b.decision(tokens_start);
    b.build()
}

/// A stream wrapper that mirrors its position into a probe cell so the host
/// can observe where the executor seeked before a custom action.
struct ProbeStream<'a> {
    inner: CodePointStream,
    probe: &'a Cell<usize>,
}

impl IntStream for ProbeStream<'_> {
    fn la(&mut self, offset: isize) -> i32 {
        self.inner.la(offset)
    }
    fn index(&self) -> usize {
        self.inner.index()
    }
    fn size(&self) -> usize {
        self.inner.size()
    }
    fn mark(&mut self) -> isize {
        self.inner.mark()
    }
    fn release(&mut self, marker: isize) {
        self.inner.release(marker);
    }
    fn seek(&mut self, index: usize) {
        self.probe.set(index);
        self.inner.seek(index);
    }
    fn consume(&mut self) {
        self.inner.consume();
        self.probe.set(self.inner.index());
    }
}

impl CharStream for ProbeStream<'_> {
    fn text(&self, start: usize, stop: usize) -> String {
        self.inner.text(start, stop)
    }
}

/// Host that records the probed input position when its custom action fires.
struct OffsetProbeHost<'a> {
    probe: &'a Cell<usize>,
    seen: Vec<usize>,
}

impl LexerHost for OffsetProbeHost<'_> {
    fn sempred(&mut self, _: usize, _: usize) -> bool {
        true
    }
    fn more(&mut self) {}
    fn skip(&mut self) {}
    fn push_mode(&mut self, _: i32) {}
    fn pop_mode(&mut self) {}
    fn set_mode(&mut self, _: i32) {}
    fn set_type(&mut self, _: i32) {}
    fn set_channel(&mut self, _: i32) {}
    fn custom_action(&mut self, _rule_index: usize, _action_index: usize) {
        self.seen.push(self.probe.get());
    }
}

#[test]
fn position_dependent_custom_action_runs_at_its_offset() {
    let atn = Arc::new(custom_action_atn());
    let cache = Arc::new(DfaCache::for_lexer(&atn));
    let mut sim = LexerAtnSimulator::new(Arc::clone(&atn), cache);

    let probe = Cell::new(usize::MAX);
    let mut input = ProbeStream {
        inner: CodePointStream::new("abcd"),
        probe: &probe,
    };
    let mut host = OffsetProbeHost {
        probe: &probe,
        seen: Vec::new(),
    };

    let token = sim
        .match_token(&mut input, 0, &mut host)
        .expect("token matched");
    assert_eq!(token, 1);
    // The custom action ran with the input seeked to startIndex + 2 ...
    assert_eq!(host.seen, vec![2]);
    // ... and the stream was restored to the token stop afterwards.
    assert_eq!(input.inner.index(), 4);
}
