//! Graph-structured prediction contexts.
//!
//! A [`PredictionContext`] is an immutable value describing a *set* of parser
//! call stacks: the empty stack, a single `(parent, return state)` frame, or
//! a sorted array of such pairs whose parents are themselves contexts. Nodes
//! are shared through `Arc` and form a DAG (a reversed call tree — never a
//! cycle). Equality and hashing are structural over the whole graph, with a
//! hash cached per node at construction.
//!
//! The merge algebra has two modes. With `root_is_wildcard` (SLL prediction)
//! the empty context absorbs everything, like a `*` stack. Without it (full
//! LL) the empty context denotes `$` and composes into arrays that keep the
//! `$` entry in the final slot.

use std::sync::{Arc, OnceLock};

use crate::atn::Atn;
use crate::atn::transition::Transition;
use crate::parser::RuleContext;
use crate::util::{HASH_SEED, mix};

/// Return-state payload marking the bottom of a stack.
///
/// `u32::MAX` sorts above every real state number, which keeps the `$` pair
/// in the last slot of an array context by construction.
pub const EMPTY_RETURN_STATE: u32 = u32::MAX;

#[derive(Debug)]
struct ContextNode {
    hash: u64,
    data: ContextData,
}

#[derive(Debug)]
enum ContextData {
    Empty,
    Singleton {
        parent: PredictionContext,
        return_state: u32,
    },
    /// Pairs sorted by return state; a `None` parent appears only with
    /// [`EMPTY_RETURN_STATE`], and only in the final slot.
    Array { pairs: Vec<ContextPair> },
}

#[derive(Debug, Clone)]
pub(crate) struct ContextPair {
    parent: Option<PredictionContext>,
    return_state: u32,
}

/// A shared handle to one node of the context DAG.
#[derive(Debug, Clone)]
pub struct PredictionContext(Arc<ContextNode>);

impl PredictionContext {
    /// The empty context: an exhausted stack.
    #[must_use]
    pub fn empty() -> PredictionContext {
        static EMPTY: OnceLock<PredictionContext> = OnceLock::new();
        EMPTY
            .get_or_init(|| {
                PredictionContext(Arc::new(ContextNode {
                    hash: mix(HASH_SEED, 0),
                    data: ContextData::Empty,
                }))
            })
            .clone()
    }

    /// A one-frame stack on top of `parent`.
    #[must_use]
    pub fn singleton(parent: PredictionContext, return_state: u32) -> PredictionContext {
        if return_state == EMPTY_RETURN_STATE && parent.is_empty() {
            return Self::empty();
        }
        let hash = mix(mix(parent.hash_value(), u64::from(return_state)), 1);
        PredictionContext(Arc::new(ContextNode {
            hash,
            data: ContextData::Singleton {
                parent,
                return_state,
            },
        }))
    }

    fn array(pairs: Vec<ContextPair>) -> PredictionContext {
        debug_assert!(pairs.len() > 1);
        debug_assert!(pairs.windows(2).all(|w| w[0].return_state <= w[1].return_state));
        debug_assert!(
            pairs
                .iter()
                .all(|p| p.parent.is_some() || p.return_state == EMPTY_RETURN_STATE)
        );
        let mut hash = mix(HASH_SEED, 2);
        for pair in &pairs {
            let parent_hash = pair.parent.as_ref().map_or(0, PredictionContext::hash_value);
            hash = mix(mix(hash, parent_hash), u64::from(pair.return_state));
        }
        PredictionContext(Arc::new(ContextNode {
            hash,
            data: ContextData::Array { pairs },
        }))
    }

    fn from_pair(pair: ContextPair) -> PredictionContext {
        match pair.parent {
            Some(parent) => Self::singleton(parent, pair.return_state),
            None => {
                debug_assert_eq!(pair.return_state, EMPTY_RETURN_STATE);
                Self::empty()
            }
        }
    }

    /// Converts a parser rule-context chain into a prediction context. The
    /// top of the chain (no parent: nobody called us) becomes the empty
    /// context.
    #[must_use]
    pub fn from_rule_context(atn: &Atn, ctx: Option<&RuleContext>) -> PredictionContext {
        let Some(ctx) = ctx else {
            return Self::empty();
        };
        let (Some(parent), Some(invoking)) = (&ctx.parent, ctx.invoking_state) else {
            return Self::empty();
        };
        let parent_ctx = Self::from_rule_context(atn, Some(parent));
        let Transition::Rule { follow_state, .. } = &atn.state(invoking).transitions[0] else {
            panic!("invoking state {invoking:?} does not begin with a rule transition");
        };
        Self::singleton(parent_ctx, follow_state.0)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        matches!(self.0.data, ContextData::Empty)
    }

    /// Number of `(parent, return state)` pairs; the empty context reports 1.
    #[must_use]
    pub fn len(&self) -> usize {
        match &self.0.data {
            ContextData::Empty | ContextData::Singleton { .. } => 1,
            ContextData::Array { pairs } => pairs.len(),
        }
    }

    #[must_use]
    pub fn return_state(&self, index: usize) -> u32 {
        match &self.0.data {
            ContextData::Empty => EMPTY_RETURN_STATE,
            ContextData::Singleton { return_state, .. } => {
                debug_assert_eq!(index, 0);
                *return_state
            }
            ContextData::Array { pairs } => pairs[index].return_state,
        }
    }

    /// The parent at `index`; `None` for the bottom-of-stack slot.
    #[must_use]
    pub fn parent(&self, index: usize) -> Option<&PredictionContext> {
        match &self.0.data {
            ContextData::Empty => None,
            ContextData::Singleton { parent, .. } => {
                debug_assert_eq!(index, 0);
                Some(parent)
            }
            ContextData::Array { pairs } => pairs[index].parent.as_ref(),
        }
    }

    /// Whether one of the represented stacks is exhausted. The `$` pair is
    /// always last, so only the final slot is checked.
    #[must_use]
    pub fn has_empty_path(&self) -> bool {
        self.return_state(self.len() - 1) == EMPTY_RETURN_STATE
    }

    #[must_use]
    pub fn hash_value(&self) -> u64 {
        self.0.hash
    }

    fn as_singleton(&self) -> Option<(Option<&PredictionContext>, u32)> {
        match &self.0.data {
            ContextData::Empty => Some((None, EMPTY_RETURN_STATE)),
            ContextData::Singleton {
                parent,
                return_state,
            } => Some((Some(parent), *return_state)),
            ContextData::Array { .. } => None,
        }
    }

    fn pairs(&self) -> Vec<ContextPair> {
        match &self.0.data {
            ContextData::Empty => vec![ContextPair {
                parent: None,
                return_state: EMPTY_RETURN_STATE,
            }],
            ContextData::Singleton {
                parent,
                return_state,
            } => vec![ContextPair {
                parent: Some(parent.clone()),
                return_state: *return_state,
            }],
            ContextData::Array { pairs } => pairs.clone(),
        }
    }

    /// Unifies two context graphs so that every concrete stack of `a` and of
    /// `b` is represented exactly once in the result. Returns one of the
    /// inputs whenever the merged graph is structurally equal to it, to
    /// maximize sharing.
    #[must_use]
    pub fn merge(
        a: &PredictionContext,
        b: &PredictionContext,
        root_is_wildcard: bool,
    ) -> PredictionContext {
        if a == b {
            return a.clone();
        }

        if a.as_singleton().is_some() && b.as_singleton().is_some() {
            return Self::merge_singletons(a, b, root_is_wildcard);
        }

        // At least one side is an array. A wildcard root still absorbs.
        if root_is_wildcard {
            if a.is_empty() {
                return a.clone();
            }
            if b.is_empty() {
                return b.clone();
            }
        }

        Self::merge_arrays(a, b, root_is_wildcard)
    }

    /// Both inputs are empty or one-frame contexts.
    fn merge_singletons(
        a: &PredictionContext,
        b: &PredictionContext,
        root_is_wildcard: bool,
    ) -> PredictionContext {
        if let Some(root) = Self::merge_root(a, b, root_is_wildcard) {
            return root;
        }

        // Neither side is empty past merge_root.
        let (Some(parent_a), ret_a) = a.as_singleton().expect("singleton") else {
            unreachable!("empty context survived merge_root");
        };
        let (Some(parent_b), ret_b) = b.as_singleton().expect("singleton") else {
            unreachable!("empty context survived merge_root");
        };

        if ret_a == ret_b {
            // a == b payloads: merge parents and keep the shared frame.
            let parent = Self::merge(parent_a, parent_b, root_is_wildcard);
            if &parent == parent_a {
                return a.clone();
            }
            if &parent == parent_b {
                return b.clone();
            }
            return Self::singleton(parent, ret_a);
        }

        // Distinct payloads pack into a two-pair array sorted by payload;
        // equal parents are shared rather than duplicated.
        let shared_parent = (parent_a == parent_b).then(|| parent_a.clone());
        let pair = |parent: &PredictionContext, ret: u32| ContextPair {
            parent: Some(shared_parent.clone().unwrap_or_else(|| parent.clone())),
            return_state: ret,
        };
        let pairs = if ret_a > ret_b {
            vec![pair(parent_b, ret_b), pair(parent_a, ret_a)]
        } else {
            vec![pair(parent_a, ret_a), pair(parent_b, ret_b)]
        };
        Self::array(pairs)
    }

    /// Handles the cases where one of two singleton-like inputs is the empty
    /// context. Returns `None` when neither is.
    fn merge_root(
        a: &PredictionContext,
        b: &PredictionContext,
        root_is_wildcard: bool,
    ) -> Option<PredictionContext> {
        if root_is_wildcard {
            // * + x = *
            if a.is_empty() || b.is_empty() {
                return Some(Self::empty());
            }
            return None;
        }
        match (a.is_empty(), b.is_empty()) {
            (true, true) => Some(Self::empty()), // $ + $ = $
            (true, false) => Some(Self::join_with_empty(b)), // $ + x = [x, $]
            (false, true) => Some(Self::join_with_empty(a)), // x + $ = [x, $]
            (false, false) => None,
        }
    }

    fn join_with_empty(x: &PredictionContext) -> PredictionContext {
        let (parent, ret) = x.as_singleton().expect("singleton");
        Self::array(vec![
            ContextPair {
                parent: parent.cloned(),
                return_state: ret,
            },
            ContextPair {
                parent: None,
                return_state: EMPTY_RETURN_STATE,
            },
        ])
    }

    /// Classic sorted merge over `(parent, return state)` pair lists;
    /// singletons are promoted to one-element lists first.
    fn merge_arrays(
        a: &PredictionContext,
        b: &PredictionContext,
        root_is_wildcard: bool,
    ) -> PredictionContext {
        let left = a.pairs();
        let right = b.pairs();
        let mut merged: Vec<ContextPair> = Vec::with_capacity(left.len() + right.len());

        let (mut i, mut j) = (0, 0);
        while i < left.len() && j < right.len() {
            let la = &left[i];
            let rb = &right[j];
            if la.return_state == rb.return_state {
                // Equal stack tops yield one merged pair.
                let parent = match (&la.parent, &rb.parent) {
                    (None, None) => None,
                    (Some(pa), Some(pb)) if pa == pb => Some(pa.clone()),
                    (Some(pa), Some(pb)) => Some(Self::merge(pa, pb, root_is_wildcard)),
                    _ => unreachable!("bottom-of-stack pair with a real parent"),
                };
                merged.push(ContextPair {
                    parent,
                    return_state: la.return_state,
                });
                i += 1;
                j += 1;
            } else if la.return_state < rb.return_state {
                merged.push(la.clone());
                i += 1;
            } else {
                merged.push(rb.clone());
                j += 1;
            }
        }
        merged.extend_from_slice(&left[i..]);
        merged.extend_from_slice(&right[j..]);

        let result = if merged.len() == 1 {
            Self::from_pair(merged.into_iter().next().expect("one pair"))
        } else {
            Self::array(merged)
        };
        // Prefer returning an existing graph over an equal fresh one.
        if &result == a {
            return a.clone();
        }
        if &result == b {
            return b.clone();
        }
        result
    }
}

impl PartialEq for PredictionContext {
    fn eq(&self, other: &Self) -> bool {
        if Arc::ptr_eq(&self.0, &other.0) {
            return true;
        }
        if self.0.hash != other.0.hash {
            return false;
        }
        match (&self.0.data, &other.0.data) {
            (ContextData::Empty, ContextData::Empty) => true,
            (
                ContextData::Singleton {
                    parent: pa,
                    return_state: ra,
                },
                ContextData::Singleton {
                    parent: pb,
                    return_state: rb,
                },
            ) => ra == rb && pa == pb,
            (ContextData::Array { pairs: a }, ContextData::Array { pairs: b }) => {
                a.len() == b.len()
                    && a.iter().zip(b.iter()).all(|(x, y)| {
                        x.return_state == y.return_state && x.parent == y.parent
                    })
            }
            _ => false,
        }
    }
}

impl Eq for PredictionContext {}

impl std::hash::Hash for PredictionContext {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        state.write_u64(self.0.hash);
    }
}
