//! Per-decision DFAs, built lazily by the simulators and shared between
//! threads.
//!
//! Every decision of the ATN owns one [`Dfa`]. Simulators memoize each
//! computed target as a [`DfaState`] keyed by its frozen configuration set;
//! two threads racing to compute the same state are reconciled by the dedup
//! insert — the loser drops its candidate and adopts the winner's.
//!
//! Two reader-writer locks guard a DFA: one for the state table, one for the
//! edge table. Both are held only for the duration of the map operation,
//! never across input access or user callbacks.

use std::sync::{Arc, OnceLock, RwLock};

use hashbrown::HashMap;
use smallvec::SmallVec;

use crate::atn::{
    Atn, AtnConfigSet, LexerActionExecutor, SemanticContext, StateId, StateKind,
};

/// Edge-table row reserved for the precedence-start map of a precedence DFA.
const PRECEDENCE_S0: usize = usize::MAX - 1;
/// State number of the shared error sentinel.
const ERROR_STATE_NUMBER: usize = usize::MAX;

/// A memoized prediction outcome: the configurations reached after some
/// input prefix, plus what to do if the DFA stops here.
///
/// States are immutable once inserted into a DFA; their edges live in the
/// owning DFA's edge table.
#[derive(Debug)]
pub struct DfaState {
    /// Assigned on insertion; the error sentinel uses `usize::MAX`.
    pub state_number: usize,
    pub configs: AtnConfigSet,
    pub is_accept: bool,
    /// Predicted alternative (parser) or token type (lexer) on accept; the
    /// invalid alternative `0` when prediction is gated by `predicates`.
    pub prediction: i32,
    /// `(predicate, alternative)` pairs to evaluate when several predicated
    /// alternatives survived.
    pub predicates: Vec<(SemanticContext, usize)>,
    /// SLL conflict marker: full-context prediction is required unless the
    /// simulator runs in pure SLL mode.
    pub requires_full_context: bool,
    /// Lexer only: actions to replay when this state accepts.
    pub lexer_executor: Option<Arc<LexerActionExecutor>>,
}

impl DfaState {
    #[must_use]
    pub fn new(configs: AtnConfigSet) -> Self {
        Self {
            state_number: 0,
            configs,
            is_accept: false,
            prediction: 0,
            predicates: Vec::new(),
            requires_full_context: false,
            lexer_executor: None,
        }
    }

    /// The process-wide error sentinel. It is cached in edge tables to
    /// remember dead ends but never inserted into a DFA's state table.
    pub fn error() -> &'static Arc<DfaState> {
        static ERROR: OnceLock<Arc<DfaState>> = OnceLock::new();
        ERROR.get_or_init(|| {
            let mut configs = AtnConfigSet::new(false);
            configs.freeze();
            Arc::new(DfaState {
                state_number: ERROR_STATE_NUMBER,
                configs,
                is_accept: false,
                prediction: 0,
                predicates: Vec::new(),
                requires_full_context: false,
                lexer_executor: None,
            })
        })
    }

    #[must_use]
    pub fn is_error(&self) -> bool {
        self.state_number == ERROR_STATE_NUMBER
    }
}

#[derive(Debug, Default)]
struct StateTable {
    /// Buckets keyed by configuration-set hash; equality resolves collisions.
    buckets: HashMap<u64, SmallVec<[Arc<DfaState>; 1]>, ahash::RandomState>,
    len: usize,
}

/// The DFA of one decision.
#[derive(Debug)]
pub struct Dfa {
    pub decision: usize,
    /// The decision state this DFA caches predictions for (the mode start
    /// state for lexer DFAs).
    pub atn_start_state: StateId,
    precedence_dfa: bool,
    states: RwLock<StateTable>,
    edges: RwLock<HashMap<(usize, i32), Arc<DfaState>, ahash::RandomState>>,
    s0: RwLock<Option<Arc<DfaState>>>,
}

impl Dfa {
    #[must_use]
    pub fn new(atn: &Atn, atn_start_state: StateId, decision: usize) -> Self {
        let precedence_dfa = matches!(
            atn.state(atn_start_state).kind,
            StateKind::StarLoopEntry {
                precedence_decision: true,
                ..
            }
        );
        Self {
            decision,
            atn_start_state,
            precedence_dfa,
            states: RwLock::new(StateTable::default()),
            edges: RwLock::new(HashMap::default()),
            s0: RwLock::new(None),
        }
    }

    /// Precedence DFAs do not use `s0` directly; their start states are
    /// indexed by the parser's current precedence.
    #[must_use]
    pub const fn is_precedence_dfa(&self) -> bool {
        self.precedence_dfa
    }

    /// The start state for the current prediction, or `None` if it has not
    /// been computed yet.
    #[must_use]
    pub fn start_state(&self, precedence: i32) -> Option<Arc<DfaState>> {
        if self.precedence_dfa {
            self.existing_target(PRECEDENCE_S0, precedence)
        } else {
            self.s0.read().expect("s0 lock").clone()
        }
    }

    pub fn set_s0(&self, state: Arc<DfaState>) {
        *self.s0.write().expect("s0 lock") = Some(state);
    }

    /// Installs the start state for `precedence`. Negative precedences are
    /// ignored, matching the contract of the precedence stack.
    ///
    /// # Panics
    ///
    /// Panics when called on a non-precedence DFA.
    pub fn set_precedence_start_state(&self, precedence: i32, state: Arc<DfaState>) {
        assert!(
            self.precedence_dfa,
            "only precedence DFAs have per-precedence start states"
        );
        if precedence < 0 {
            return;
        }
        self.add_edge(PRECEDENCE_S0, precedence, state);
    }

    /// Inserts `state`, deduplicating by configuration-set equality. The
    /// winner's pointer is returned either way; on insert the state receives
    /// its number and its configuration set is frozen.
    ///
    /// # Panics
    ///
    /// Panics if `state` is the error sentinel, which must stay out of every
    /// state table.
    pub fn add_state(&self, mut state: DfaState) -> Arc<DfaState> {
        assert!(
            !state.is_error(),
            "the error sentinel cannot be added to a DFA"
        );
        let hash = state.configs.mix_hash();
        let mut table = self.states.write().expect("state lock");
        let bucket = table.buckets.entry(hash).or_default();
        if let Some(existing) = bucket.iter().find(|s| s.configs == state.configs) {
            return Arc::clone(existing);
        }
        state.state_number = table.len;
        state.configs.freeze();
        let state = Arc::new(state);
        table
            .buckets
            .entry(hash)
            .or_default()
            .push(Arc::clone(&state));
        table.len += 1;
        state
    }

    /// Looks up the memoized target of `(from, symbol)`.
    #[must_use]
    pub fn existing_target(&self, from: usize, symbol: i32) -> Option<Arc<DfaState>> {
        self.edges
            .read()
            .expect("edge lock")
            .get(&(from, symbol))
            .cloned()
    }

    pub fn add_edge(&self, from: usize, symbol: i32, to: Arc<DfaState>) {
        self.edges
            .write()
            .expect("edge lock")
            .insert((from, symbol), to);
    }

    /// Number of states in the table (excludes the error sentinel).
    #[must_use]
    pub fn state_count(&self) -> usize {
        self.states.read().expect("state lock").len
    }

    /// Number of cached edges, including error edges and precedence starts.
    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.edges.read().expect("edge lock").len()
    }

    /// A snapshot of the states sorted by state number.
    #[must_use]
    pub fn states(&self) -> Vec<Arc<DfaState>> {
        let table = self.states.read().expect("state lock");
        let mut all: Vec<Arc<DfaState>> = table
            .buckets
            .values()
            .flat_map(|bucket| bucket.iter().cloned())
            .collect();
        all.sort_by_key(|s| s.state_number);
        all
    }
}

/// The DFAs of every decision of an ATN (per mode for lexers), shared across
/// simulators.
#[derive(Debug)]
pub struct DfaCache {
    dfas: Vec<Dfa>,
}

impl DfaCache {
    /// One DFA per parser decision.
    #[must_use]
    pub fn for_parser(atn: &Atn) -> Self {
        let dfas = atn
            .decision_to_state
            .iter()
            .enumerate()
            .map(|(decision, &state)| Dfa::new(atn, state, decision))
            .collect();
        Self { dfas }
    }

    /// One DFA per lexer mode, keyed by the mode's start state.
    #[must_use]
    pub fn for_lexer(atn: &Atn) -> Self {
        let dfas = atn
            .mode_to_start_state
            .iter()
            .enumerate()
            .map(|(mode, &state)| Dfa::new(atn, state, mode))
            .collect();
        Self { dfas }
    }

    #[must_use]
    pub fn dfa(&self, decision: usize) -> &Dfa {
        &self.dfas[decision]
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.dfas.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.dfas.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::atn::{AtnConfig, GrammarType, PredictionContext};
    use crate::testing::AtnBuilder;

    fn test_atn() -> Atn {
        let mut builder = AtnBuilder::new(GrammarType::Parser, 3);
        let start = builder.state(0, StateKind::RuleStart {
            stop_state: StateId::INVALID,
            left_recursive: false,
        });
        let stop = builder.state(0, StateKind::RuleStop);
        builder.link_rule(0, start, stop);
        builder.build()
    }

    fn configs_with(atn: &Atn, state: StateId, alt: usize) -> AtnConfigSet {
        let mut set = AtnConfigSet::new(false);
        set.add(AtnConfig::new(
            atn.state(state),
            alt,
            PredictionContext::empty(),
        ));
        set
    }

    #[test]
    fn add_state_is_idempotent_by_configs() {
        let atn = test_atn();
        let dfa = Dfa::new(&atn, StateId(0), 0);
        let a = dfa.add_state(DfaState::new(configs_with(&atn, StateId(0), 1)));
        let b = dfa.add_state(DfaState::new(configs_with(&atn, StateId(0), 1)));
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(dfa.state_count(), 1);
        assert!(a.configs.is_frozen());
    }

    #[test]
    fn state_numbers_are_dense() {
        let atn = test_atn();
        let dfa = Dfa::new(&atn, StateId(0), 0);
        let a = dfa.add_state(DfaState::new(configs_with(&atn, StateId(0), 1)));
        let b = dfa.add_state(DfaState::new(configs_with(&atn, StateId(0), 2)));
        assert_eq!(a.state_number, 0);
        assert_eq!(b.state_number, 1);
    }

    #[test]
    fn edges_round_trip() {
        let atn = test_atn();
        let dfa = Dfa::new(&atn, StateId(0), 0);
        let a = dfa.add_state(DfaState::new(configs_with(&atn, StateId(0), 1)));
        assert!(dfa.existing_target(a.state_number, 5).is_none());
        dfa.add_edge(a.state_number, 5, Arc::clone(DfaState::error()));
        let target = dfa.existing_target(a.state_number, 5).expect("edge");
        assert!(target.is_error());
    }

    #[test]
    #[should_panic(expected = "error sentinel")]
    fn error_state_cannot_be_added() {
        let atn = test_atn();
        let dfa = Dfa::new(&atn, StateId(0), 0);
        let mut bogus = DfaState::new(AtnConfigSet::new(false));
        bogus.state_number = usize::MAX;
        dfa.add_state(bogus);
    }
}
