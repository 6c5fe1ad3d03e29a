//! Search-graph nodes and their statistics.
//!
//! Three node kinds share one representation: full-state tree nodes, the
//! mini nodes that carry a partially chosen composite, and the transition
//! node that completes it and records per-edge rewards. The kinds differ
//! only in their [`NodeKind`] tag; every node owns the same per-child
//! statistics behind a single mutex, which is the only lock a thread holds
//! at a time during search.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use rand::Rng;

use crate::action::ActionPhase;
use crate::config::PlayCriteria;
use crate::vocab::{Abc, Vocab, WordId};
use crate::{MctsError, Result};

/// Shared handle to a node. The graph is shared: transposition gives tree
/// nodes multiple parents, so children are held by `Arc` and parents by
/// weak back-edges.
pub type NodeRef = Arc<Node>;

pub(crate) type WeakNode = Weak<Node>;

/// A `(word_index, position)` pair touched by a sub-action.
pub type Site = (usize, usize);

/// Score assigned to pruned children so they lose every comparison.
const PRUNED_SCORE: f32 = -9999.9;
/// Width of the uniform tie-break jitter.
const NOISE_SPAN: f32 = 1e-8;
/// Guard against division by zero in the exploitation term.
const COUNT_EPS: f32 = 1e-8;

/// The chain segment recorded by [`Node::play`]: the seven chosen
/// sub-actions and the six intermediate nodes between two tree nodes.
pub struct Subpath {
    pub chosen_seq: Vec<Abc>,
    pub mini_node_seq: Vec<NodeRef>,
}

/// What a node is, and the per-kind data that never changes after
/// construction.
pub enum NodeKind {
    /// A full search state.
    Tree { state: Vocab, depth: u32 },
    /// A partial composite: `prefix` sub-actions chosen, selecting at
    /// `phase` next. `base` is the tree node the chain hangs off.
    Mini {
        base: WeakNode,
        phase: ActionPhase,
        prefix: Vec<Abc>,
    },
    /// The last chain node; selects the special type and carries per-edge
    /// rewards. Its children are tree nodes.
    Transition { base: WeakNode, prefix: Vec<Abc> },
}

/// Priors and value cached on a tree node by the external evaluator.
pub(crate) struct EvalPriors {
    pub meta: [Vec<f32>; 7],
    pub special: Vec<f32>,
    pub value: f32,
}

/// Everything behind the per-node mutex.
pub(crate) struct NodeInner {
    permissible: Vec<Abc>,
    affected: Vec<Vec<Site>>,
    children: Vec<Option<NodeRef>>,
    parents: Vec<(WeakNode, usize)>,
    priors: Vec<f32>,
    pruned: Vec<bool>,
    action_counts: Vec<i32>,
    total_values: Vec<f32>,
    max_values: Vec<f32>,
    rewards: Vec<f32>,
    visit_count: i32,
    max_index: Option<usize>,
    max_value: f32,
    num_unpruned: usize,
    fully_pruned: bool,
    eval: Option<EvalPriors>,
}

impl NodeInner {
    fn new() -> Self {
        NodeInner {
            permissible: Vec::new(),
            affected: Vec::new(),
            children: Vec::new(),
            parents: Vec::new(),
            priors: Vec::new(),
            pruned: Vec::new(),
            action_counts: Vec::new(),
            total_values: Vec::new(),
            max_values: Vec::new(),
            rewards: Vec::new(),
            visit_count: 0,
            max_index: None,
            max_value: f32::NEG_INFINITY,
            num_unpruned: 0,
            fully_pruned: false,
            eval: None,
        }
    }
}

pub struct Node {
    kind: NodeKind,
    stopped: AtomicBool,
    persistent: AtomicBool,
    played: AtomicBool,
    inner: Mutex<NodeInner>,
}

impl Node {
    /// Creates a tree node for `state` at the given search depth.
    pub fn new_tree(state: Vocab, depth: u32, persistent: bool) -> NodeRef {
        Arc::new(Node {
            kind: NodeKind::Tree { state, depth },
            stopped: AtomicBool::new(false),
            persistent: AtomicBool::new(persistent),
            played: AtomicBool::new(false),
            inner: Mutex::new(NodeInner::new()),
        })
    }

    /// Creates the terminal tree node a stop sub-action short-circuits
    /// into. Stopped nodes never enter the transposition table and are
    /// never expanded.
    pub fn new_stopped(state: Vocab, depth: u32) -> NodeRef {
        Arc::new(Node {
            kind: NodeKind::Tree { state, depth },
            stopped: AtomicBool::new(true),
            persistent: AtomicBool::new(false),
            played: AtomicBool::new(false),
            inner: Mutex::new(NodeInner::new()),
        })
    }

    /// Creates a mini node selecting at `phase` with the given chosen
    /// prefix, hanging off `base`.
    pub fn new_mini(base: &NodeRef, phase: ActionPhase, prefix: Vec<Abc>) -> NodeRef {
        debug_assert!(base.is_tree_node());
        debug_assert_eq!(prefix.len(), phase.index());
        Arc::new(Node {
            kind: NodeKind::Mini {
                base: Arc::downgrade(base),
                phase,
                prefix,
            },
            stopped: AtomicBool::new(false),
            persistent: AtomicBool::new(false),
            played: AtomicBool::new(false),
            inner: Mutex::new(NodeInner::new()),
        })
    }

    /// Creates the transition node completing a chain off `base`.
    pub fn new_transition(base: &NodeRef, prefix: Vec<Abc>) -> NodeRef {
        debug_assert!(base.is_tree_node());
        debug_assert_eq!(prefix.len(), ActionPhase::SpecialType.index());
        Arc::new(Node {
            kind: NodeKind::Transition {
                base: Arc::downgrade(base),
                prefix,
            },
            stopped: AtomicBool::new(false),
            persistent: AtomicBool::new(false),
            played: AtomicBool::new(false),
            inner: Mutex::new(NodeInner::new()),
        })
    }

    pub fn kind(&self) -> &NodeKind {
        &self.kind
    }

    pub fn is_tree_node(&self) -> bool {
        matches!(self.kind, NodeKind::Tree { .. })
    }

    pub fn is_transitional(&self) -> bool {
        matches!(self.kind, NodeKind::Transition { .. })
    }

    /// The phase of this node's own sub-selection.
    pub fn phase(&self) -> ActionPhase {
        match &self.kind {
            NodeKind::Tree { .. } => ActionPhase::Before,
            NodeKind::Mini { phase, .. } => *phase,
            NodeKind::Transition { .. } => ActionPhase::SpecialType,
        }
    }

    /// The sub-actions chosen along the chain up to this node.
    pub fn prefix(&self) -> &[Abc] {
        match &self.kind {
            NodeKind::Tree { .. } => &[],
            NodeKind::Mini { prefix, .. } | NodeKind::Transition { prefix, .. } => prefix,
        }
    }

    /// The state of a tree node.
    pub fn state(&self) -> Option<&Vocab> {
        match &self.kind {
            NodeKind::Tree { state, .. } => Some(state),
            _ => None,
        }
    }

    /// The tree node a chain node hangs off; a tree node is its own base.
    pub fn base(node: &NodeRef) -> NodeRef {
        match &node.kind {
            NodeKind::Tree { .. } => Arc::clone(node),
            NodeKind::Mini { base, .. } | NodeKind::Transition { base, .. } => {
                base.upgrade().expect("chain node outlived its base tree node")
            }
        }
    }

    pub fn depth(&self) -> u32 {
        match &self.kind {
            NodeKind::Tree { depth, .. } => *depth,
            _ => 0,
        }
    }

    pub fn dist(&self) -> u32 {
        self.state().map(|s| s.dist()).unwrap_or(0)
    }

    pub fn is_done(&self) -> bool {
        self.state().map(|s| s.done()).unwrap_or(false)
    }

    /// The word-identity key of a tree node's state.
    pub fn key(&self) -> Vec<WordId> {
        self.state().map(|s| s.key()).unwrap_or_default()
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Relaxed)
    }

    pub fn is_persistent(&self) -> bool {
        self.persistent.load(Ordering::Relaxed)
    }

    pub fn set_persistent(&self) {
        self.persistent.store(true, Ordering::Relaxed);
    }

    pub fn is_played(&self) -> bool {
        self.played.load(Ordering::Relaxed)
    }

    /// One-shot latch set when the real line of play passes through this
    /// node; played nodes survive subtree clearing.
    pub fn mark_played(&self) {
        self.played.store(true, Ordering::Relaxed);
    }

    /// A node is expanded once its permissible sub-actions are known.
    pub fn is_expanded(&self) -> bool {
        !self.inner.lock().permissible.is_empty()
    }

    /// A node is evaluated once priors have been attached.
    pub fn is_evaluated(&self) -> bool {
        !self.inner.lock().priors.is_empty()
    }

    pub fn is_fully_pruned(&self) -> bool {
        self.inner.lock().fully_pruned
    }

    pub fn visit_count(&self) -> i32 {
        self.inner.lock().visit_count
    }

    pub fn permissible(&self) -> Vec<Abc> {
        self.inner.lock().permissible.clone()
    }

    pub fn priors(&self) -> Vec<f32> {
        self.inner.lock().priors.clone()
    }

    pub fn action_counts(&self) -> Vec<i32> {
        self.inner.lock().action_counts.clone()
    }

    pub fn total_values(&self) -> Vec<f32> {
        self.inner.lock().total_values.clone()
    }

    pub fn max_values(&self) -> Vec<f32> {
        self.inner.lock().max_values.clone()
    }

    pub fn pruned_flags(&self) -> Vec<bool> {
        self.inner.lock().pruned.clone()
    }

    pub fn num_unpruned(&self) -> usize {
        self.inner.lock().num_unpruned
    }

    pub fn max_index(&self) -> Option<usize> {
        self.inner.lock().max_index
    }

    pub fn max_value(&self) -> f32 {
        self.inner.lock().max_value
    }

    pub fn num_children(&self) -> usize {
        self.inner.lock().children.len()
    }

    pub fn child(&self, index: usize) -> Option<NodeRef> {
        self.inner.lock().children.get(index).cloned().flatten()
    }

    pub fn parents_count(&self) -> usize {
        self.inner.lock().parents.len()
    }

    /// The reward recorded on a transition node's edge.
    pub fn reward(&self, index: usize) -> f32 {
        self.inner.lock().rewards.get(index).copied().unwrap_or(0.0)
    }

    /// The evaluator's value for this tree node, if it has been evaluated.
    pub fn cached_value(&self) -> Option<f32> {
        self.inner.lock().eval.as_ref().map(|e| e.value)
    }

    /// Allocates the per-child arrays for the given permissible
    /// sub-actions. Idempotent; an empty permissible set marks the node
    /// fully pruned and propagates upward.
    pub fn expand(&self, permissible: Vec<Abc>, affected: Vec<Vec<Site>>) {
        assert_eq!(
            permissible.len(),
            affected.len(),
            "permissible and affected sites must agree in length"
        );
        let empty = {
            let mut inner = self.inner.lock();
            if !inner.permissible.is_empty() || inner.fully_pruned {
                return;
            }
            let n = permissible.len();
            if n > 0 {
                inner.children = vec![None; n];
                inner.pruned = vec![false; n];
                inner.action_counts = vec![0; n];
                inner.total_values = vec![0.0; n];
                inner.max_values = vec![f32::NEG_INFINITY; n];
                if self.is_transitional() {
                    inner.rewards = vec![0.0; n];
                }
                inner.num_unpruned = n;
                inner.permissible = permissible;
                inner.affected = affected;
            }
            n == 0
        };
        if empty {
            self.prune_fully();
        }
    }

    /// Attaches the evaluator output to a tree node: the seven meta prior
    /// rows, the special priors and the value. The node's own priors are
    /// gathered from the first row over its permissible sub-actions.
    pub fn evaluate(&self, meta: [Vec<f32>; 7], special: Vec<f32>, value: f32) {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;
        assert!(
            !inner.permissible.is_empty(),
            "priors attached before expansion"
        );
        inner.priors = gather_normalized(&meta[ActionPhase::Before.index()], &inner.permissible);
        inner.eval = Some(EvalPriors {
            meta,
            special,
            value,
        });
    }

    /// Gathers a chain node's priors from its base tree node's cached
    /// rows: the row matching the node's phase, or the special priors for
    /// the transition node.
    pub fn attach_chain_priors(node: &NodeRef) {
        let base = Node::base(node);
        let row: Vec<f32> = {
            let base_inner = base.inner.lock();
            let eval = base_inner
                .eval
                .as_ref()
                .expect("chain expansion before the base tree node was evaluated");
            match node.phase() {
                ActionPhase::SpecialType => eval.special.clone(),
                phase => eval.meta[phase.index()].clone(),
            }
        };
        let mut inner = node.inner.lock();
        let priors = gather_normalized(&row, &inner.permissible);
        inner.priors = priors;
    }

    /// Mixes externally supplied noise into a tree node's cached priors
    /// and re-gathers its own priors. Intended for the root only.
    pub fn add_noise(&self, meta_noise: &[Vec<f32>], special_noise: &[f32], ratio: f32) {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;
        let eval = inner
            .eval
            .as_mut()
            .expect("noise added before evaluation");
        for (row, noise) in eval.meta.iter_mut().zip(meta_noise) {
            mix_in(row, noise, ratio);
        }
        mix_in(&mut eval.special, special_noise, ratio);
        inner.priors =
            gather_normalized(&eval.meta[ActionPhase::Before.index()], &inner.permissible);
    }

    /// PUCT + heuristic + jitter score for every child, with pruned slots
    /// pinned far below any reachable score.
    pub fn get_scores(&self, puct_c: f32, heur_c: f32, add_noise: bool) -> Vec<f32> {
        let inner = self.inner.lock();
        self.assert_selectable(&inner);
        scores_locked(&inner, puct_c, heur_c, add_noise)
    }

    /// The best-scoring sub-action and its index.
    pub fn get_best_subaction(&self, puct_c: f32, heur_c: f32, add_noise: bool) -> (usize, Abc) {
        let inner = self.inner.lock();
        self.assert_selectable(&inner);
        let scores = scores_locked(&inner, puct_c, heur_c, add_noise);
        let index = argmax(&scores);
        (index, inner.permissible[index])
    }

    /// Selection step used by the driver: scores, picks, and applies
    /// virtual loss under a single lock, returning the connected child if
    /// one exists.
    pub(crate) fn select_and_inflate(
        &self,
        puct_c: f32,
        heur_c: f32,
        add_noise: bool,
        game_count: u32,
        virtual_loss: f32,
    ) -> (usize, Abc, Option<NodeRef>) {
        let mut inner = self.inner.lock();
        self.assert_selectable(&inner);
        let scores = scores_locked(&inner, puct_c, heur_c, add_noise);
        let index = argmax(&scores);
        apply_virtual(&mut inner, index, game_count, virtual_loss);
        (index, inner.permissible[index], inner.children[index].clone())
    }

    /// Inflates the statistics at `index` so concurrent selectors shy away
    /// from the in-flight path. Reversed by [`Node::backup`].
    pub fn virtual_backup(&self, index: usize, game_count: u32, virtual_loss: f32) {
        let mut inner = self.inner.lock();
        apply_virtual(&mut inner, index, game_count, virtual_loss);
    }

    /// Undoes a virtual selection without recording a visit. Used when a
    /// simulation dead-ends and has nothing to back up.
    pub fn revert_virtual(&self, index: usize, game_count: u32, virtual_loss: f32) {
        let mut inner = self.inner.lock();
        let gc = game_count as i32;
        inner.action_counts[index] -= gc;
        inner.total_values[index] += game_count as f32 * virtual_loss;
        inner.visit_count -= gc;
    }

    /// Reverses the matching virtual selection and records the outcome
    /// `value`, leaving a net single visit.
    pub fn backup(&self, index: usize, game_count: u32, virtual_loss: f32, value: f32) {
        let mut inner = self.inner.lock();
        let gc = game_count as i32;
        inner.action_counts[index] -= gc - 1;
        inner.total_values[index] += game_count as f32 * virtual_loss + value;
        inner.visit_count -= gc - 1;
        assert!(
            inner.action_counts[index] >= 1,
            "backup without a matching virtual selection"
        );
        if value > inner.max_value {
            inner.max_value = value;
            inner.max_index = Some(index);
        }
        if value > inner.max_values[index] {
            inner.max_values[index] = value;
        }
    }

    /// Marks one sub-action ineligible. Idempotent. If this empties the
    /// node it becomes fully pruned and the pruning propagates to every
    /// parent.
    pub fn prune(&self, index: usize) {
        let cascade = {
            let mut inner = self.inner.lock();
            if inner.pruned[index] {
                false
            } else {
                inner.pruned[index] = true;
                inner.num_unpruned -= 1;
                inner.num_unpruned == 0
            }
        };
        if cascade {
            self.prune_fully();
        }
    }

    /// Marks every sub-action pruned and recursively prunes this node's
    /// slot in each parent.
    pub fn prune_fully(&self) {
        let parents = {
            let mut inner = self.inner.lock();
            if inner.fully_pruned {
                return;
            }
            inner.fully_pruned = true;
            for flag in inner.pruned.iter_mut() {
                *flag = true;
            }
            inner.num_unpruned = 0;
            inner.parents.clone()
        };
        for (weak, index) in parents {
            if let Some(parent) = weak.upgrade() {
                parent.prune(index);
            }
        }
    }

    /// Wires `child` into `parent.children[index]`, recording the
    /// back-edge. If the slot was already connected by a racing thread the
    /// existing child wins and is returned.
    pub fn connect_child(parent: &NodeRef, index: usize, child: &NodeRef) -> NodeRef {
        {
            let mut inner = parent.inner.lock();
            if let Some(existing) = &inner.children[index] {
                return Arc::clone(existing);
            }
            inner.children[index] = Some(Arc::clone(child));
        }
        child
            .inner
            .lock()
            .parents
            .push((Arc::downgrade(parent), index));
        Arc::clone(child)
    }

    /// Connects a transition node's edge to the next tree node, recording
    /// the environment reward for that edge.
    pub fn connect_transition_child(
        parent: &NodeRef,
        index: usize,
        child: &NodeRef,
        reward: f32,
    ) -> NodeRef {
        debug_assert!(parent.is_transitional());
        {
            let mut inner = parent.inner.lock();
            if let Some(existing) = &inner.children[index] {
                return Arc::clone(existing);
            }
            inner.children[index] = Some(Arc::clone(child));
            inner.rewards[index] = reward;
        }
        child
            .inner
            .lock()
            .parents
            .push((Arc::downgrade(parent), index));
        Arc::clone(child)
    }

    /// The child reached by acting with `sub`, if this node has acted with
    /// it.
    pub fn get_edge(&self, sub: Abc) -> Result<NodeRef> {
        let inner = self.inner.lock();
        let index = inner
            .permissible
            .iter()
            .position(|&c| c == sub)
            .ok_or(MctsError::UnexploredEdge(sub))?;
        inner.children[index]
            .clone()
            .ok_or(MctsError::UnexploredEdge(sub))
    }

    /// Greedy descent from a tree node through one full composite,
    /// following the configured criteria at each of the seven
    /// sub-selections. Marks the path played and returns the next tree
    /// node together with the traversed subpath.
    pub fn play(node: &NodeRef, criteria: PlayCriteria) -> (NodeRef, Subpath) {
        assert!(node.is_tree_node(), "play starts at a tree node");
        let mut chosen_seq = Vec::with_capacity(ActionPhase::COUNT);
        let mut mini_node_seq = Vec::with_capacity(ActionPhase::COUNT - 1);
        let mut cur = Arc::clone(node);
        for step in 0..ActionPhase::COUNT {
            let (sub, child) = {
                let inner = cur.inner.lock();
                let index = match criteria {
                    PlayCriteria::BestReturn => inner
                        .max_index
                        .expect("play through a node with no observed return"),
                    PlayCriteria::MostVisits => {
                        assert!(
                            inner.visit_count > 0,
                            "play through a node with no visits"
                        );
                        argmax_counts(&inner.action_counts)
                    }
                };
                (
                    inner.permissible[index],
                    inner.children[index]
                        .clone()
                        .expect("play across an unexplored edge"),
                )
            };
            cur.mark_played();
            chosen_seq.push(sub);
            if step + 1 < ActionPhase::COUNT {
                mini_node_seq.push(Arc::clone(&child));
            }
            cur = child;
        }
        cur.mark_played();
        (
            cur,
            Subpath {
                chosen_seq,
                mini_node_seq,
            },
        )
    }

    /// Detaches and returns all connected children. Used by subtree
    /// clearing.
    pub(crate) fn take_children(&self) -> Vec<(usize, NodeRef)> {
        let mut inner = self.inner.lock();
        let mut out = Vec::new();
        for (index, slot) in inner.children.iter_mut().enumerate() {
            if let Some(child) = slot.take() {
                out.push((index, child));
            }
        }
        out
    }

    /// Removes the back-edge to `parent` at `index`.
    pub(crate) fn remove_parent(&self, parent: &NodeRef, index: usize) {
        let parent_ptr = Arc::as_ptr(parent);
        self.inner
            .lock()
            .parents
            .retain(|(weak, i)| !(*i == index && weak.as_ptr() == parent_ptr));
    }

    fn assert_selectable(&self, inner: &NodeInner) {
        assert!(!self.is_stopped(), "selection on a stopped node");
        assert!(
            !inner.permissible.is_empty(),
            "selection on an unexpanded node"
        );
        assert!(!inner.priors.is_empty(), "selection on an unevaluated node");
    }
}

impl std::fmt::Debug for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.lock();
        let kind = match &self.kind {
            NodeKind::Tree { .. } => "Tree",
            NodeKind::Mini { .. } => "Mini",
            NodeKind::Transition { .. } => "Transition",
        };
        f.debug_struct(kind)
            .field("phase", &self.phase())
            .field("visits", &inner.visit_count)
            .field("children", &inner.children.len())
            .field("stopped", &self.is_stopped())
            .finish()
    }
}

fn apply_virtual(inner: &mut NodeInner, index: usize, game_count: u32, virtual_loss: f32) {
    let gc = game_count as i32;
    inner.action_counts[index] += gc;
    inner.total_values[index] -= game_count as f32 * virtual_loss;
    inner.visit_count += gc;
}

fn scores_locked(inner: &NodeInner, puct_c: f32, heur_c: f32, add_noise: bool) -> Vec<f32> {
    let mut rng = rand::thread_rng();
    let sqrt_visits = (inner.visit_count.max(0) as f32).sqrt();
    (0..inner.permissible.len())
        .map(|i| {
            if inner.pruned[i] {
                return PRUNED_SCORE;
            }
            let n = inner.action_counts[i] as f32;
            let q = inner.total_values[i] / (n + COUNT_EPS);
            let u = puct_c * inner.priors[i] * sqrt_visits / (1.0 + n);
            let h = heur_c * (inner.affected[i].len() as f32).sqrt() / (1.0 + n);
            let eps = if add_noise {
                rng.gen_range(0.0..NOISE_SPAN)
            } else {
                0.0
            };
            q + u + h + eps
        })
        .collect()
}

/// Index of the strictly greatest score; ties keep the earliest index.
fn argmax(scores: &[f32]) -> usize {
    let mut best = 0;
    for (i, &score) in scores.iter().enumerate().skip(1) {
        if score > scores[best] {
            best = i;
        }
    }
    best
}

fn argmax_counts(counts: &[i32]) -> usize {
    let mut best = 0;
    for (i, &count) in counts.iter().enumerate().skip(1) {
        if count > counts[best] {
            best = i;
        }
    }
    best
}

/// Gathers `row` at the given sub-action ids and normalises to a
/// distribution; a degenerate gather falls back to uniform.
fn gather_normalized(row: &[f32], permissible: &[Abc]) -> Vec<f32> {
    let mut priors: Vec<f32> = permissible
        .iter()
        .map(|&c| row.get(c as usize).copied().unwrap_or(0.0).max(0.0))
        .collect();
    let sum: f32 = priors.iter().sum();
    if sum > 0.0 {
        for p in priors.iter_mut() {
            *p /= sum;
        }
    } else if !priors.is_empty() {
        let uniform = 1.0 / priors.len() as f32;
        for p in priors.iter_mut() {
            *p = uniform;
        }
    }
    priors
}

fn mix_in(row: &mut [f32], noise: &[f32], ratio: f32) {
    for (p, &n) in row.iter_mut().zip(noise) {
        *p = (1.0 - ratio) * *p + ratio * n;
    }
}
