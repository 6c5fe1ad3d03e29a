//! The composite-action state machine and the action space.
//!
//! A composite action is a 7-tuple of sub-actions selected one phase at a
//! time while descending from a tree node through its chain of mini nodes.
//! The [`ActionSpace`] is the only component aware of what the sub-actions
//! mean: it owns the edge catalog, enumerates the permissible sub-actions
//! for every phase (conditioned on the prefix already chosen), and applies
//! a completed composite to a state.

use std::collections::BTreeMap;

use itertools::Itertools;
use rayon::prelude::*;

use crate::node::{Node, NodeRef, Site};
use crate::vocab::{Abc, Vocab, ANY, FIRST_FREE, GAP, STOP};
use crate::{MctsError, Result};

/// Special type: plain substitution at every matching site.
pub const SPECIAL_BASIC: Abc = 0;
/// Special type: restrict the rewrite to word-initial sites.
pub const SPECIAL_WORD_INITIAL: Abc = 1;
/// Special type: restrict the rewrite to word-final sites.
pub const SPECIAL_WORD_FINAL: Abc = 2;

/// One position in the composite-action chain.
///
/// The tree node itself selects at [`Before`](ActionPhase::Before); the six
/// chain nodes select at the remaining phases in order, the last of them
/// being the transition node. The phase index doubles as the row index into
/// a tree node's meta priors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ActionPhase {
    Before = 0,
    After = 1,
    Pre = 2,
    DPre = 3,
    Post = 4,
    DPost = 5,
    SpecialType = 6,
}

impl ActionPhase {
    /// All phases in selection order.
    pub const ALL: [ActionPhase; 7] = [
        ActionPhase::Before,
        ActionPhase::After,
        ActionPhase::Pre,
        ActionPhase::DPre,
        ActionPhase::Post,
        ActionPhase::DPost,
        ActionPhase::SpecialType,
    ];

    /// Number of phases, which is also the length of a composite.
    pub const COUNT: usize = 7;

    /// The row of a tree node's meta priors that scores this phase.
    pub fn index(self) -> usize {
        self as usize
    }

    /// The phase selected at the next node of the chain, or `None` after
    /// the transition node.
    pub fn next(self) -> Option<ActionPhase> {
        match self {
            ActionPhase::Before => Some(ActionPhase::After),
            ActionPhase::After => Some(ActionPhase::Pre),
            ActionPhase::Pre => Some(ActionPhase::DPre),
            ActionPhase::DPre => Some(ActionPhase::Post),
            ActionPhase::Post => Some(ActionPhase::DPost),
            ActionPhase::DPost => Some(ActionPhase::SpecialType),
            ActionPhase::SpecialType => None,
        }
    }
}

/// A completed 7-tuple of sub-actions.
///
/// `before` is rewritten to `after` (or deleted when `after` is [`GAP`]) at
/// every site whose surrounding symbols match the four context slots
/// ([`ANY`] leaves a slot unconstrained) and which the special type admits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompositeAction {
    pub before: Abc,
    pub after: Abc,
    pub pre: Abc,
    pub d_pre: Abc,
    pub post: Abc,
    pub d_post: Abc,
    pub special: Abc,
}

impl CompositeAction {
    /// Builds a composite from the seven sub-actions in phase order.
    pub fn from_seq(seq: &[Abc]) -> CompositeAction {
        assert_eq!(seq.len(), ActionPhase::COUNT, "a composite has seven sub-actions");
        CompositeAction {
            before: seq[0],
            after: seq[1],
            pre: seq[2],
            d_pre: seq[3],
            post: seq[4],
            d_post: seq[5],
            special: seq[6],
        }
    }

    /// The seven sub-actions in phase order.
    pub fn to_seq(&self) -> [Abc; 7] {
        [
            self.before, self.after, self.pre, self.d_pre, self.post, self.d_post, self.special,
        ]
    }
}

/// A candidate composite together with the sites it would touch, produced
/// for evaluator batching.
#[derive(Debug, Clone)]
pub struct PotentialAction {
    pub action: CompositeAction,
    pub sites: Vec<Site>,
}

/// The catalog of registered rewrite edges and the per-phase permissible
/// computation.
pub struct ActionSpace {
    alphabet_size: usize,
    edges: Vec<(Abc, Abc)>,
    by_before: BTreeMap<Abc, Vec<Abc>>,
    specials: Vec<Abc>,
}

impl ActionSpace {
    /// Creates an empty action space over an alphabet of `alphabet_size`
    /// symbol ids. The basic special type is always available.
    pub fn new(alphabet_size: usize) -> Self {
        ActionSpace {
            alphabet_size,
            edges: Vec::new(),
            by_before: BTreeMap::new(),
            specials: vec![SPECIAL_BASIC],
        }
    }

    pub fn alphabet_size(&self) -> usize {
        self.alphabet_size
    }

    /// Records that `before` may be rewritten to `after`, returning the
    /// edge's action id. Registering the same edge twice returns the
    /// original id.
    pub fn register_action(&mut self, before: Abc, after: Abc) -> Result<usize> {
        if before < FIRST_FREE || before as usize >= self.alphabet_size {
            return Err(MctsError::ReservedSymbol(before));
        }
        let after_ok = after == GAP
            || (after >= FIRST_FREE && (after as usize) < self.alphabet_size);
        if !after_ok {
            return Err(MctsError::ReservedSymbol(after));
        }
        if let Some(id) = self.edges.iter().position(|&e| e == (before, after)) {
            return Ok(id);
        }
        self.edges.push((before, after));
        self.by_before.entry(before).or_default().push(after);
        Ok(self.edges.len() - 1)
    }

    /// Enables an additional special type.
    pub fn register_special(&mut self, special: Abc) -> Result<()> {
        match special {
            SPECIAL_BASIC | SPECIAL_WORD_INITIAL | SPECIAL_WORD_FINAL => {
                if !self.specials.contains(&special) {
                    self.specials.push(special);
                }
                Ok(())
            }
            other => Err(MctsError::UnknownSpecialType(other)),
        }
    }

    /// Number of registered edges.
    pub fn size(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    /// The `(before, after)` edge registered under `id`.
    pub fn get_action(&self, id: usize) -> Result<(Abc, Abc)> {
        self.edges
            .get(id)
            .copied()
            .ok_or(MctsError::OutOfBounds {
                id,
                size: self.edges.len(),
            })
    }

    /// Populates `node` with the permissible sub-actions and affected
    /// sites for its phase, conditioned on the sub-actions already chosen
    /// along the chain.
    pub fn set_action_allowed(&self, node: &NodeRef) {
        let base = Node::base(node);
        let state = base.state().expect("chain node without a base state");
        let (permissible, affected) = self.compute_permissible(node.phase(), state, node.prefix());
        node.expand(permissible, affected);
    }

    /// Computes the permissible sub-actions for `phase` in `state`, given
    /// the `prefix` of sub-actions already chosen, along with the sites
    /// each one touches.
    pub fn compute_permissible(
        &self,
        phase: ActionPhase,
        state: &Vocab,
        prefix: &[Abc],
    ) -> (Vec<Abc>, Vec<Vec<Site>>) {
        match phase {
            ActionPhase::Before => {
                let mut by_symbol: BTreeMap<Abc, Vec<Site>> = BTreeMap::new();
                for (wi, word) in state.words().iter().enumerate() {
                    for (pos, &c) in word.ids().iter().enumerate() {
                        if self.by_before.contains_key(&c) {
                            by_symbol.entry(c).or_default().push((wi, pos));
                        }
                    }
                }
                // The stop sub-action is always on offer and touches nothing.
                let mut permissible = vec![STOP];
                let mut affected = vec![Vec::new()];
                for (c, sites) in by_symbol {
                    permissible.push(c);
                    affected.push(sites);
                }
                (permissible, affected)
            }
            ActionPhase::After => {
                let sites = self.matching_sites(state, prefix);
                let afters: Vec<Abc> = self
                    .by_before
                    .get(&prefix[0])
                    .map(|a| a.iter().copied().sorted().dedup().collect())
                    .unwrap_or_default();
                let affected = afters.iter().map(|_| sites.clone()).collect();
                (afters, affected)
            }
            ActionPhase::Pre | ActionPhase::DPre | ActionPhase::Post | ActionPhase::DPost => {
                let offset = context_offset(phase);
                let sites = self.matching_sites(state, prefix);
                let mut by_ctx: BTreeMap<Abc, Vec<Site>> = BTreeMap::new();
                for &(wi, pos) in &sites {
                    let word = state.word(wi).ids();
                    let ctx = pos as i64 + offset;
                    if ctx >= 0 && (ctx as usize) < word.len() {
                        by_ctx.entry(word[ctx as usize]).or_default().push((wi, pos));
                    }
                }
                let mut permissible = vec![ANY];
                let mut affected = vec![sites];
                for (c, group) in by_ctx {
                    permissible.push(c);
                    affected.push(group);
                }
                (permissible, affected)
            }
            ActionPhase::SpecialType => {
                let sites = self.matching_sites(state, prefix);
                let mut permissible = Vec::new();
                let mut affected = Vec::new();
                for &special in &self.specials {
                    let filtered: Vec<Site> = sites
                        .iter()
                        .copied()
                        .filter(|&(wi, pos)| special_admits(special, state, wi, pos))
                        .collect();
                    if !filtered.is_empty() {
                        permissible.push(special);
                        affected.push(filtered);
                    }
                }
                (permissible, affected)
            }
        }
    }

    /// Exploratory enumeration of whole composites: every registered edge
    /// with at least one site, contexts unconstrained, sites ordered so
    /// that positions whose aligned target symbol already matches the
    /// replacement come first.
    pub fn find_potential_actions(&self, node: &NodeRef) -> Vec<PotentialAction> {
        let base = Node::base(node);
        let state = base.state().expect("chain node without a base state");
        self.edges
            .iter()
            .filter_map(|&(before, after)| {
                let sites = self.matching_sites(state, &[before]);
                if sites.is_empty() {
                    return None;
                }
                let (aligned, rest): (Vec<Site>, Vec<Site>) =
                    sites.into_iter().partition(|&(wi, pos)| {
                        state.word(wi).aligned_symbol(wi, pos) == Some(after)
                    });
                let mut sites = aligned;
                sites.extend(rest);
                Some(PotentialAction {
                    action: CompositeAction {
                        before,
                        after,
                        pre: ANY,
                        d_pre: ANY,
                        post: ANY,
                        d_post: ANY,
                        special: SPECIAL_BASIC,
                    },
                    sites,
                })
            })
            .collect()
    }

    /// Applies a completed composite to a state, returning the rewritten
    /// symbol sequences.
    pub fn apply(&self, state: &Vocab, action: &CompositeAction) -> Vec<Vec<Abc>> {
        let seq = action.to_seq();
        let sites: Vec<Site> = self
            .matching_sites(state, &seq[..6])
            .into_iter()
            .filter(|&(wi, pos)| special_admits(action.special, state, wi, pos))
            .collect();
        let mut out: Vec<Vec<Abc>> = state.words().iter().map(|w| w.ids().to_vec()).collect();
        for (wi, positions) in &sites.iter().group_by(|site| site.0) {
            let mut positions: Vec<usize> = positions.map(|&(_, pos)| pos).collect();
            if action.after == GAP {
                // Delete back to front so earlier positions stay valid.
                positions.sort_unstable_by(|a, b| b.cmp(a));
                for pos in positions {
                    out[wi].remove(pos);
                }
            } else {
                for pos in positions {
                    out[wi][pos] = action.after;
                }
            }
        }
        out
    }

    /// The sites of `state` compatible with the chosen sub-actions so far.
    /// `prefix[0]` is the symbol being rewritten; entries 2..6, when
    /// present, constrain the surrounding context.
    fn matching_sites(&self, state: &Vocab, prefix: &[Abc]) -> Vec<Site> {
        let before = prefix[0];
        let constraints: Vec<(i64, Abc)> = [
            (-1i64, prefix.get(2)),
            (-2, prefix.get(3)),
            (1, prefix.get(4)),
            (2, prefix.get(5)),
        ]
        .into_iter()
        .filter_map(|(offset, slot)| slot.map(|&c| (offset, c)))
        .filter(|&(_, c)| c != ANY)
        .collect();

        state
            .words()
            .par_iter()
            .enumerate()
            .flat_map_iter(|(wi, word)| {
                let ids = word.ids();
                let constraints = &constraints;
                ids.iter()
                    .enumerate()
                    .filter_map(move |(pos, &c)| {
                        if c != before {
                            return None;
                        }
                        let ok = constraints.iter().all(|&(offset, want)| {
                            let ctx = pos as i64 + offset;
                            ctx >= 0
                                && (ctx as usize) < ids.len()
                                && ids[ctx as usize] == want
                        });
                        ok.then_some((wi, pos))
                    })
                    .collect::<Vec<_>>()
            })
            .collect()
    }
}

fn context_offset(phase: ActionPhase) -> i64 {
    match phase {
        ActionPhase::Pre => -1,
        ActionPhase::DPre => -2,
        ActionPhase::Post => 1,
        ActionPhase::DPost => 2,
        _ => unreachable!("phase {phase:?} carries no context offset"),
    }
}

fn special_admits(special: Abc, state: &Vocab, wi: usize, pos: usize) -> bool {
    match special {
        SPECIAL_BASIC => true,
        SPECIAL_WORD_INITIAL => pos == 0,
        SPECIAL_WORD_FINAL => pos + 1 == state.word(wi).len(),
        _ => false,
    }
}
