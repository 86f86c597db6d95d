//! # llstar
//!
//! An adaptive LL(*) prediction engine: the runtime core of a
//! parser-generator. Given a precompiled grammar automaton (the ATN), a
//! token source and a decision point, it decides which alternative to take,
//! caching each answer in a lazily built DFA shared across parses and
//! threads.
//!
//! ## Overview
//!
//! - **ATN**: the immutable nondeterministic automaton a grammar compiles
//!   to, loaded from a 16-bit wire image or built programmatically.
//! - **Prediction contexts**: graph-structured stacks representing every
//!   possible call chain compactly, with a merge algebra that keeps them
//!   shared.
//! - **Parser simulation**: SLL prediction with wildcard stacks, failing
//!   over to full-context LL on conflict, with semantic predicates and
//!   precedence filtering for left-recursive rules.
//! - **Lexer simulation**: longest-match tokenization over the same
//!   machinery, tracking the last accept state and replaying lexer actions.
//! - **DFA cache**: per-decision automata guarded by reader-writer locks;
//!   concurrent simulators deduplicate states by configuration-set equality.
//!
//! ## Quick start
//!
//! Predicting `a : 'x' | 'y' ;` over the token types `x = 1`, `y = 2`:
//!
//! ```
//! use std::sync::Arc;
//!
//! use llstar::atn::{BlockKind, GrammarType, Recognizer, StateId, StateKind};
//! use llstar::dfa::DfaCache;
//! use llstar::parser::{ParserAtnSimulator, ParserHost, RuleContext};
//! use llstar::stream::TokenBuffer;
//! use llstar::testing::AtnBuilder;
//!
//! struct Host;
//!
//! impl Recognizer for Host {
//!     fn sempred(&mut self, _: Option<&Arc<RuleContext>>, _: usize, _: usize) -> bool {
//!         true
//!     }
//!     fn precpred(&mut self, _: Option<&Arc<RuleContext>>, _: i32) -> bool {
//!         true
//!     }
//! }
//!
//! impl ParserHost for Host {
//!     fn precedence(&self) -> i32 {
//!         0
//!     }
//! }
//!
//! let mut b = AtnBuilder::new(GrammarType::Parser, 2);
//! let start = b.state(0, StateKind::RuleStart {
//!     stop_state: StateId::INVALID,
//!     left_recursive: false,
//! });
//! let stop = b.state(0, StateKind::RuleStop);
//! b.link_rule(0, start, stop);
//!
//! let (block, end) = b.block(0, BlockKind::Basic);
//! let decision = b.decision(block);
//! let (x0, x1) = (b.basic(0), b.basic(0));
//! let (y0, y1) = (b.basic(0), b.basic(0));
//! b.epsilon(start, block);
//! b.epsilon(block, x0);
//! b.atom(x0, x1, 1);
//! b.epsilon(x1, end);
//! b.epsilon(block, y0);
//! b.atom(y0, y1, 2);
//! b.epsilon(y1, end);
//! b.epsilon(end, stop);
//!
//! let atn = Arc::new(b.build());
//! let cache = Arc::new(DfaCache::for_parser(&atn));
//! let mut sim = ParserAtnSimulator::new(Arc::clone(&atn), cache);
//!
//! let mut tokens = TokenBuffer::new(vec![2]);
//! let alt = sim
//!     .adaptive_predict(&mut tokens, decision, None, &mut Host)
//!     .expect("viable alternative");
//! assert_eq!(alt, 2);
//! ```
//!
//! ## Modules
//!
//! - [`atn`] - states, transitions, configurations, contexts, wire format
//! - [`dfa`] - the concurrent per-decision DFA cache
//! - [`parser`] - the adaptive SLL/LL prediction simulator
//! - [`lexer`] - the longest-match lexer simulator
//! - [`stream`] - input stream interfaces and in-memory implementations
//! - [`error`] - prediction and deserialization errors
//! - [`testing`] - programmatic ATN builders for fixtures

pub mod atn;
pub mod dfa;
pub mod error;
pub mod lexer;
pub mod parser;
pub mod stream;
pub mod testing;
pub mod util;

// Re-export commonly used types
pub use atn::{
    Atn, AtnConfig, AtnConfigSet, AtnDeserializer, GrammarType, LexerAction, LexerActionExecutor,
    LexerHost, PredictionContext, Recognizer, SemanticContext, StateId, StateKind, Transition,
    serialize,
};
pub use dfa::{Dfa, DfaCache, DfaState};
pub use error::{DeserializeError, PredictionError};
pub use lexer::LexerAtnSimulator;
pub use parser::{
    NoopListener, ParserAtnSimulator, ParserHost, PredictionListener, PredictionMode, RuleContext,
};
pub use stream::{CharStream, CodePointStream, IntStream, TokenBuffer};
pub use util::{BitSet, IntervalSet};
