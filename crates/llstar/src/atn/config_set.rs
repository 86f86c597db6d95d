//! Insertion-ordered configuration sets with context-merging insertion.

use hashbrown::HashMap;

use super::config::AtnConfig;
use super::context::PredictionContext;
use super::semantic::SemanticContext;
use super::state::StateId;
use crate::util::{BitSet, mix};

/// Dedup identity for an inserted configuration. Parser sets key on
/// `(state, alt, semantic context)` and merge stacks on collision; ordered
/// sets (lexer start-state computation) key on the full configuration so
/// alternative and action ordering stays deterministic.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum ConfigKey {
    Keyed {
        state: StateId,
        alt: usize,
        semantic_context: SemanticContext,
    },
    Full(AtnConfig),
}

/// A set of [`AtnConfig`]s preserving insertion order.
///
/// A mutable set is the working state of closure/reach; freezing it turns it
/// into an immutable DFA-state key. Inserting into a frozen set is a
/// programming error and panics.
#[derive(Debug, Clone)]
pub struct AtnConfigSet {
    configs: Vec<AtnConfig>,
    lookup: HashMap<ConfigKey, usize, ahash::RandomState>,
    /// Full-context sets merge stacks without the wildcard root.
    pub full_ctx: bool,
    ordered: bool,
    readonly: bool,
    frozen_hash: u64,
    pub has_semantic_context: bool,
    pub dips_into_outer_context: bool,
    pub unique_alt: Option<usize>,
    pub conflicting_alts: Option<BitSet>,
}

impl AtnConfigSet {
    #[must_use]
    pub fn new(full_ctx: bool) -> Self {
        Self {
            configs: Vec::new(),
            lookup: HashMap::default(),
            full_ctx,
            ordered: false,
            readonly: false,
            frozen_hash: 0,
            has_semantic_context: false,
            dips_into_outer_context: false,
            unique_alt: None,
            conflicting_alts: None,
        }
    }

    /// An ordered set: configurations dedup on full equality.
    #[must_use]
    pub fn new_ordered() -> Self {
        let mut set = Self::new(false);
        set.ordered = true;
        set
    }

    fn key_for(&self, config: &AtnConfig) -> ConfigKey {
        if self.ordered {
            ConfigKey::Full(config.clone())
        } else {
            ConfigKey::Keyed {
                state: config.state,
                alt: config.alt,
                semantic_context: config.semantic_context.clone(),
            }
        }
    }

    /// Inserts `config`, merging prediction contexts when the dedup key is
    /// already present. Returns whether the set changed.
    ///
    /// # Panics
    ///
    /// Panics if the set has been frozen.
    pub fn add(&mut self, config: AtnConfig) -> bool {
        assert!(!self.readonly, "cannot add to a frozen configuration set");
        if !config.semantic_context.is_none() {
            self.has_semantic_context = true;
        }
        if config.outer_context_depth() > 0 {
            self.dips_into_outer_context = true;
        }

        let key = self.key_for(&config);
        if let Some(&index) = self.lookup.get(&key) {
            let existing = &mut self.configs[index];
            let root_is_wildcard = !self.full_ctx;
            let merged =
                PredictionContext::merge(&existing.context, &config.context, root_is_wildcard);
            let mut changed = false;
            let depth = existing
                .outer_context_raw()
                .max(config.outer_context_raw());
            if depth != existing.outer_context_raw() {
                existing.set_outer_context_raw(depth);
                changed = true;
            }
            if config.is_precedence_filter_suppressed()
                && !existing.is_precedence_filter_suppressed()
            {
                existing.set_precedence_filter_suppressed(true);
                changed = true;
            }
            if merged != existing.context {
                existing.context = merged;
                changed = true;
            }
            changed
        } else {
            self.lookup.insert(key, self.configs.len());
            self.configs.push(config);
            true
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.configs.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.configs.is_empty()
    }

    #[must_use]
    pub fn get(&self, index: usize) -> &AtnConfig {
        &self.configs[index]
    }

    pub fn iter(&self) -> std::slice::Iter<'_, AtnConfig> {
        self.configs.iter()
    }

    /// The set of alternatives represented in this set.
    #[must_use]
    pub fn alts(&self) -> BitSet {
        self.configs.iter().map(|c| c.alt).collect()
    }

    #[must_use]
    pub const fn is_ordered(&self) -> bool {
        self.ordered
    }

    #[must_use]
    pub const fn is_frozen(&self) -> bool {
        self.readonly
    }

    /// Marks the set immutable and caches its structural hash. DFA states
    /// hold frozen sets as their identity.
    pub fn freeze(&mut self) {
        if self.readonly {
            return;
        }
        self.readonly = true;
        self.frozen_hash = self.compute_hash();
    }

    fn compute_hash(&self) -> u64 {
        self.configs
            .iter()
            .fold(mix(1, self.configs.len() as u64), |h, c| mix(h, c.mix_hash()))
    }

    #[must_use]
    pub fn mix_hash(&self) -> u64 {
        if self.readonly {
            self.frozen_hash
        } else {
            self.compute_hash()
        }
    }
}

impl PartialEq for AtnConfigSet {
    fn eq(&self, other: &Self) -> bool {
        self.full_ctx == other.full_ctx
            && self.unique_alt == other.unique_alt
            && self.conflicting_alts == other.conflicting_alts
            && self.has_semantic_context == other.has_semantic_context
            && self.dips_into_outer_context == other.dips_into_outer_context
            && self.configs == other.configs
    }
}

impl Eq for AtnConfigSet {}

impl std::hash::Hash for AtnConfigSet {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        state.write_u64(self.mix_hash());
    }
}

impl<'a> IntoIterator for &'a AtnConfigSet {
    type Item = &'a AtnConfig;
    type IntoIter = std::slice::Iter<'a, AtnConfig>;

    fn into_iter(self) -> Self::IntoIter {
        self.configs.iter()
    }
}
