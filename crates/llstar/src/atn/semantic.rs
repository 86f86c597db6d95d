//! Semantic predicate algebra.
//!
//! Predicates gate alternatives during prediction. They form a small tree:
//! leaf predicates (user `sempred` hooks), precedence predicates for
//! left-recursive rules, and `And`/`Or` combinations. The smart constructors
//! normalize on the way in: same-kind operands are flattened, duplicates are
//! dropped (first occurrence wins), and a chain of precedence predicates is
//! reduced to the single one that implies the rest.

use std::sync::Arc;

use crate::parser::RuleContext;
use crate::util::{HASH_SEED, mix};

/// Host hooks for evaluating predicates. The parser's generated code (or a
/// test harness) implements this.
pub trait Recognizer {
    fn sempred(
        &mut self,
        ctx: Option<&Arc<RuleContext>>,
        rule_index: usize,
        pred_index: usize,
    ) -> bool;

    fn precpred(&mut self, ctx: Option<&Arc<RuleContext>>, precedence: i32) -> bool;
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SemanticContext {
    Predicate {
        rule_index: usize,
        pred_index: usize,
        ctx_dependent: bool,
    },
    PrecedencePredicate {
        precedence: i32,
    },
    And {
        operands: Arc<[SemanticContext]>,
    },
    Or {
        operands: Arc<[SemanticContext]>,
    },
}

impl SemanticContext {
    /// The distinguished predicate meaning "always true".
    pub const NONE: SemanticContext = SemanticContext::Predicate {
        rule_index: usize::MAX,
        pred_index: usize::MAX,
        ctx_dependent: false,
    };

    #[must_use]
    pub fn is_none(&self) -> bool {
        *self == Self::NONE
    }

    /// `a && b`, flattened and reduced. `NONE` is the identity.
    #[must_use]
    pub fn and(a: SemanticContext, b: SemanticContext) -> SemanticContext {
        if a.is_none() {
            return b;
        }
        if b.is_none() {
            return a;
        }
        let operands = Self::combine(a, b, /* and: */ true);
        if operands.len() == 1 {
            return operands.into_iter().next().expect("one operand");
        }
        SemanticContext::And {
            operands: operands.into(),
        }
    }

    /// `a || b`, flattened and reduced. `NONE` absorbs (`p || true == true`).
    #[must_use]
    pub fn or(a: SemanticContext, b: SemanticContext) -> SemanticContext {
        if a.is_none() || b.is_none() {
            return Self::NONE;
        }
        let operands = Self::combine(a, b, /* and: */ false);
        if operands.len() == 1 {
            return operands.into_iter().next().expect("one operand");
        }
        SemanticContext::Or {
            operands: operands.into(),
        }
    }

    fn combine(a: SemanticContext, b: SemanticContext, and: bool) -> Vec<SemanticContext> {
        let mut out: Vec<SemanticContext> = Vec::new();
        let mut push_flat = |ctx: SemanticContext| {
            let nested = match (&ctx, and) {
                (SemanticContext::And { operands }, true)
                | (SemanticContext::Or { operands }, false) => Some(operands.clone()),
                _ => None,
            };
            match nested {
                Some(inner) => {
                    for op in inner.iter() {
                        if !out.contains(op) {
                            out.push(op.clone());
                        }
                    }
                }
                None => {
                    if !out.contains(&ctx) {
                        out.push(ctx);
                    }
                }
            }
        };
        push_flat(a);
        push_flat(b);

        // A conjunction of precedence predicates is implied by the smallest
        // one; a disjunction by the largest.
        let precedences: Vec<i32> = out
            .iter()
            .filter_map(|op| match op {
                SemanticContext::PrecedencePredicate { precedence } => Some(*precedence),
                _ => None,
            })
            .collect();
        if precedences.len() > 1 {
            let keep = if and {
                precedences.iter().copied().min()
            } else {
                precedences.iter().copied().max()
            }
            .expect("non-empty");
            out.retain(
                |op| !matches!(op, SemanticContext::PrecedencePredicate { precedence } if *precedence != keep),
            );
        }
        out
    }

    pub(crate) fn mix_hash(&self) -> u64 {
        match self {
            SemanticContext::Predicate {
                rule_index,
                pred_index,
                ctx_dependent,
            } => {
                let h = mix(HASH_SEED, 0);
                let h = mix(h, *rule_index as u64);
                let h = mix(h, *pred_index as u64);
                mix(h, u64::from(*ctx_dependent))
            }
            SemanticContext::PrecedencePredicate { precedence } => {
                mix(mix(HASH_SEED, 1), *precedence as u64)
            }
            SemanticContext::And { operands } => operands
                .iter()
                .fold(mix(HASH_SEED, 2), |h, op| mix(h, op.mix_hash())),
            SemanticContext::Or { operands } => operands
                .iter()
                .fold(mix(HASH_SEED, 3), |h, op| mix(h, op.mix_hash())),
        }
    }

    /// Evaluates this context against the host callbacks.
    pub fn eval<R: Recognizer + ?Sized>(
        &self,
        recog: &mut R,
        ctx: Option<&Arc<RuleContext>>,
    ) -> bool {
        match self {
            SemanticContext::Predicate {
                rule_index,
                pred_index,
                ctx_dependent,
            } => {
                if self.is_none() {
                    return true;
                }
                let local = if *ctx_dependent { ctx } else { None };
                recog.sempred(local, *rule_index, *pred_index)
            }
            SemanticContext::PrecedencePredicate { precedence } => {
                recog.precpred(ctx, *precedence)
            }
            SemanticContext::And { operands } => {
                operands.iter().all(|op| op.eval(recog, ctx))
            }
            SemanticContext::Or { operands } => operands.iter().any(|op| op.eval(recog, ctx)),
        }
    }

    /// Partially evaluates precedence predicates at the current precedence.
    /// Returns `None` when the context is statically false, the reduced
    /// context otherwise (`NONE` when statically true).
    pub fn eval_precedence<R: Recognizer + ?Sized>(
        &self,
        recog: &mut R,
        ctx: Option<&Arc<RuleContext>>,
    ) -> Option<SemanticContext> {
        match self {
            SemanticContext::Predicate { .. } => Some(self.clone()),
            SemanticContext::PrecedencePredicate { precedence } => {
                if recog.precpred(ctx, *precedence) {
                    Some(Self::NONE)
                } else {
                    None
                }
            }
            SemanticContext::And { operands } => {
                let mut differs = false;
                let mut reduced: Vec<SemanticContext> = Vec::new();
                for op in operands.iter() {
                    let evaluated = op.eval_precedence(recog, ctx)?;
                    differs |= evaluated != *op;
                    if !evaluated.is_none() {
                        reduced.push(evaluated);
                    }
                }
                if !differs {
                    return Some(self.clone());
                }
                // Every operand reduced to true.
                let mut result = SemanticContext::NONE;
                for op in reduced {
                    result = Self::and(result, op);
                }
                Some(result)
            }
            SemanticContext::Or { operands } => {
                let mut differs = false;
                let mut reduced: Vec<SemanticContext> = Vec::new();
                for op in operands.iter() {
                    match op.eval_precedence(recog, ctx) {
                        Some(evaluated) => {
                            differs |= evaluated != *op;
                            if evaluated.is_none() {
                                // One true operand makes the disjunction true.
                                return Some(Self::NONE);
                            }
                            reduced.push(evaluated);
                        }
                        None => differs = true,
                    }
                }
                if !differs {
                    return Some(self.clone());
                }
                if reduced.is_empty() {
                    return None;
                }
                let mut iter = reduced.into_iter();
                let mut result = iter.next().expect("non-empty");
                for op in iter {
                    result = Self::or(result, op);
                }
                Some(result)
            }
        }
    }
}
