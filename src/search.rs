//! The search session and the parallel selection driver.
//!
//! [`Mcts`] owns the process-wide collaborators (the transposition table
//! and the word store) and orchestrates rounds of parallel selection,
//! batched evaluation and backup. Simulations run on a caller-sized
//! thread pool; each thread holds at most one node mutex at a time, so
//! there is no lock nesting anywhere in the driver.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

use log::debug;
use rayon::prelude::*;

use crate::action::{ActionPhase, ActionSpace, CompositeAction};
use crate::config::MctsConfig;
use crate::env::Environment;
use crate::evaluator::Evaluator;
use crate::node::{Node, NodeRef, Subpath};
use crate::stats::SearchStatistics;
use crate::table::TranspositionTable;
use crate::vocab::{Abc, WordStore, PAD, STOP};
use crate::Result;

/// The record of one simulation: the leaf it ended on, the `(node, index)`
/// pairs it inflated on the way down, and whether the leaf is terminal
/// (done or stopped) rather than awaiting evaluation.
pub struct Playout {
    pub leaf: NodeRef,
    pub path: Vec<(NodeRef, usize)>,
    pub terminal: bool,
}

/// A padded id tensor of shape `[num_nodes, max_len, num_words]`, produced
/// for batched evaluator input. Cells beyond a word's length hold [`PAD`].
pub struct IdTensor {
    pub data: Vec<Abc>,
    pub num_nodes: usize,
    pub max_len: usize,
    pub num_words: usize,
}

impl IdTensor {
    pub fn get(&self, node: usize, pos: usize, word: usize) -> Abc {
        self.data[(node * self.max_len + pos) * self.num_words + word]
    }
}

/// A search session: configuration plus the shared transposition table and
/// word store.
pub struct Mcts {
    config: MctsConfig,
    table: Arc<TranspositionTable>,
    store: Arc<WordStore>,
    statistics: SearchStatistics,
}

impl Mcts {
    pub fn new(config: MctsConfig) -> Self {
        Mcts {
            config,
            table: Arc::new(TranspositionTable::new()),
            store: Arc::new(WordStore::new()),
            statistics: SearchStatistics::new(),
        }
    }

    pub fn config(&self) -> &MctsConfig {
        &self.config
    }

    pub fn table(&self) -> Arc<TranspositionTable> {
        Arc::clone(&self.table)
    }

    pub fn store(&self) -> Arc<WordStore> {
        Arc::clone(&self.store)
    }

    /// Returns the search statistics.
    pub fn statistics(&self) -> &SearchStatistics {
        &self.statistics
    }

    /// Installs the target vocabulary from a dense padded array and
    /// returns its persistent canonical node.
    pub fn end_node(&self, ids: &[Abc], lengths: &[usize]) -> Result<NodeRef> {
        let words = self.store.words_from_padded(ids, lengths)?;
        self.store.set_targets(words.clone());
        let vocab = self.store.vocab(words)?;
        let node = self.table.get_or_insert(Node::new_tree(vocab, 0, true));
        node.set_persistent();
        Ok(node)
    }

    /// Builds a persistent tree node from a dense padded array. The end
    /// node must exist first, since distances are measured against it.
    pub fn tree_node(&self, ids: &[Abc], lengths: &[usize]) -> Result<NodeRef> {
        let vocab = self.store.vocab_from_padded(ids, lengths)?;
        let node = self.table.get_or_insert(Node::new_tree(vocab, 0, true));
        node.set_persistent();
        Ok(node)
    }

    /// Runs `num_sims` simulations from `root` across `num_threads`
    /// worker threads and returns one playout per simulation, in order.
    ///
    /// Each simulation descends with virtual loss until it reaches a node
    /// awaiting evaluation, a done or stopped node, or the depth limit.
    /// The resulting leaves are meant to be evaluated in one batch and
    /// backed up per playout.
    pub fn parallel_select(
        &self,
        root: &NodeRef,
        env: &Environment,
        space: &ActionSpace,
        num_sims: usize,
        num_threads: usize,
    ) -> Vec<Playout> {
        assert!(root.is_tree_node(), "selection starts at a tree node");
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(num_threads.max(1))
            .build()
            .expect("worker thread pool");
        pool.install(|| {
            (0..num_sims)
                .into_par_iter()
                .map(|_| self.simulate(root, env, space))
                .collect()
        })
    }

    /// One simulation: composite-at-a-time descent with virtual loss.
    fn simulate(&self, root: &NodeRef, env: &Environment, space: &ActionSpace) -> Playout {
        let cfg = &self.config;
        let mut node = Arc::clone(root);
        let mut path: Vec<(NodeRef, usize)> = Vec::new();
        let mut steps_left = cfg.depth_limit;

        while steps_left > 0 {
            if node.is_done() || node.is_stopped() {
                return Playout {
                    leaf: node,
                    path,
                    terminal: true,
                };
            }
            if !node.is_expanded() || !node.is_evaluated() {
                return Playout {
                    leaf: node,
                    path,
                    terminal: false,
                };
            }
            if node.is_fully_pruned() {
                return self.abandon(node, path);
            }

            // Seven sub-selections walk one composite from this tree node
            // to the next.
            let mut cur = Arc::clone(&node);
            for _ in 0..ActionPhase::COUNT {
                let (index, sub, child) = cur.select_and_inflate(
                    cfg.puct_c,
                    cfg.heur_c,
                    cfg.add_noise,
                    cfg.game_count,
                    cfg.virtual_loss,
                );
                path.push((Arc::clone(&cur), index));
                let next = match child {
                    Some(next) => next,
                    None => match self.make_child(&cur, index, sub, env, space) {
                        Some(next) => next,
                        None => return self.abandon(node, path),
                    },
                };
                if next.is_stopped() {
                    return Playout {
                        leaf: next,
                        path,
                        terminal: true,
                    };
                }
                if !next.is_tree_node() && (!next.is_expanded() || next.is_fully_pruned()) {
                    // A raced dead end; nothing below it can be selected.
                    return self.abandon(node, path);
                }
                cur = next;
            }
            node = cur;
            steps_left -= 1;
        }

        let terminal = node.is_done() || node.is_stopped();
        Playout {
            leaf: node,
            path,
            terminal,
        }
    }

    /// Abandons a dead-ended simulation: the virtual loss along the path
    /// is reverted so statistics are left untouched, and the playout
    /// carries nothing to back up.
    fn abandon(&self, leaf: NodeRef, path: Vec<(NodeRef, usize)>) -> Playout {
        for (node, index) in &path {
            node.revert_virtual(*index, self.config.game_count, self.config.virtual_loss);
        }
        Playout {
            leaf,
            path: Vec::new(),
            terminal: true,
        }
    }

    /// Creates and connects the child behind `(cur, index)`. Chain nodes
    /// are expanded inline with priors gathered from their base tree
    /// node; the transition node's last edge goes through the environment.
    /// Returns `None` when the child is a dead end (empty permissible
    /// set), which prunes the edge.
    fn make_child(
        &self,
        cur: &NodeRef,
        index: usize,
        sub: Abc,
        env: &Environment,
        space: &ActionSpace,
    ) -> Option<NodeRef> {
        if cur.is_tree_node() && sub == STOP {
            let (stopchild, _) = env.stop(cur);
            return Some(Node::connect_child(cur, index, &stopchild));
        }
        match cur.phase() {
            ActionPhase::SpecialType => {
                let base = Node::base(cur);
                let mut seq = cur.prefix().to_vec();
                seq.push(sub);
                let action = CompositeAction::from_seq(&seq);
                let (next, reward) = env.step(&base, space, &action);
                Some(Node::connect_transition_child(cur, index, &next, reward))
            }
            phase => {
                let next_phase = phase.next().expect("tree and mini phases have successors");
                let base = Node::base(cur);
                let mut prefix = cur.prefix().to_vec();
                prefix.push(sub);
                let child = if next_phase == ActionPhase::SpecialType {
                    Node::new_transition(&base, prefix)
                } else {
                    Node::new_mini(&base, next_phase, prefix)
                };
                let state = base.state().expect("chain base is a tree node");
                let (permissible, affected) =
                    space.compute_permissible(next_phase, state, child.prefix());
                if permissible.is_empty() {
                    // Connect first so the dead end prunes its parent edge.
                    let connected = Node::connect_child(cur, index, &child);
                    if Arc::ptr_eq(&connected, &child) {
                        child.prune_fully();
                        return None;
                    }
                    return Some(connected);
                }
                child.expand(permissible, affected);
                Node::attach_chain_priors(&child);
                Some(Node::connect_child(cur, index, &child))
            }
        }
    }

    /// Expands and evaluates the given leaves in one evaluator batch,
    /// returning the backup value for each input leaf in order. Terminal
    /// leaves get zero; duplicates and already-evaluated leaves reuse the
    /// cached value.
    pub fn expand_and_evaluate(
        &self,
        leaves: &[NodeRef],
        space: &ActionSpace,
        evaluator: &dyn Evaluator,
    ) -> Vec<f32> {
        let mut batch: Vec<NodeRef> = Vec::new();
        let mut seen: HashSet<usize> = HashSet::new();
        for leaf in leaves {
            debug_assert!(leaf.is_tree_node());
            if leaf.is_done() || leaf.is_stopped() {
                continue;
            }
            if !seen.insert(Arc::as_ptr(leaf) as usize) {
                continue;
            }
            if !leaf.is_expanded() && !leaf.is_fully_pruned() {
                space.set_action_allowed(leaf);
            }
            if leaf.is_expanded() && !leaf.is_evaluated() {
                batch.push(Arc::clone(leaf));
            }
        }

        if !batch.is_empty() {
            debug!("evaluating batch of {} leaves", batch.len());
            let evaluation = evaluator.evaluate_batch(&batch);
            assert_eq!(
                evaluation.values.len(),
                batch.len(),
                "evaluator returned {} values for {} nodes",
                evaluation.values.len(),
                batch.len()
            );
            assert_eq!(evaluation.meta_priors.len(), batch.len());
            assert_eq!(evaluation.special_priors.len(), batch.len());
            for (((node, meta), special), value) in batch
                .iter()
                .zip(evaluation.meta_priors)
                .zip(evaluation.special_priors)
                .zip(evaluation.values)
            {
                node.evaluate(meta, special, value);
            }
        }

        leaves
            .iter()
            .map(|leaf| {
                if leaf.is_done() || leaf.is_stopped() {
                    0.0
                } else {
                    leaf.cached_value().unwrap_or(0.0)
                }
            })
            .collect()
    }

    /// Walks a playout's path in reverse, reversing the virtual loss and
    /// adding the outcome. Transition edges fold their recorded reward
    /// into the value as it travels upward.
    pub fn backup(&self, playout: &Playout, value: f32) {
        let cfg = &self.config;
        let mut v = value;
        for (node, index) in playout.path.iter().rev() {
            if node.is_transitional() {
                v += node.reward(*index);
            }
            node.backup(*index, cfg.game_count, cfg.virtual_loss, v);
        }
    }

    /// Runs `rounds` full select → evaluate → backup rounds from `root`
    /// using the configured simulation count and thread count.
    pub fn search(
        &mut self,
        root: &NodeRef,
        env: &Environment,
        space: &ActionSpace,
        evaluator: &dyn Evaluator,
        rounds: usize,
    ) {
        let start = Instant::now();
        for round in 0..rounds {
            let playouts = self.parallel_select(
                root,
                env,
                space,
                self.config.num_sims,
                self.config.num_threads,
            );
            let leaves: Vec<NodeRef> = playouts.iter().map(|p| Arc::clone(&p.leaf)).collect();
            let values = self.expand_and_evaluate(&leaves, space, evaluator);
            for (playout, value) in playouts.iter().zip(values) {
                self.backup(playout, value);
            }

            self.statistics.rounds += 1;
            self.statistics.simulations += playouts.len();
            self.statistics.terminal_leaves +=
                playouts.iter().filter(|p| p.terminal).count();
            for playout in &playouts {
                self.statistics.max_depth = self.statistics.max_depth.max(playout.leaf.depth());
            }
            debug!(
                "round {round}: {} simulations, {} canonical nodes",
                playouts.len(),
                self.table.len()
            );
        }
        self.statistics.tree_size = self.table.len();
        self.statistics.total_time += start.elapsed();
    }

    /// Acts on the real environment: greedy descent through one composite
    /// per the configured play criteria.
    pub fn play(&self, root: &NodeRef) -> (NodeRef, Subpath) {
        Node::play(root, self.config.play_criteria)
    }

    /// Permissible-sub-action masks over the alphabet for a batch of
    /// nodes, in input order.
    pub fn parallel_get_action_masks(
        &self,
        nodes: &[NodeRef],
        space: &ActionSpace,
    ) -> Vec<Vec<bool>> {
        nodes
            .par_iter()
            .map(|node| {
                let mut mask = vec![false; space.alphabet_size()];
                for sub in node.permissible() {
                    if (sub as usize) < mask.len() {
                        mask[sub as usize] = true;
                    }
                }
                mask
            })
            .collect()
    }

    /// Stacks the states behind a batch of nodes into one padded
    /// `[N, MaxLen, W]` id tensor, in input order. Chain nodes contribute
    /// their base tree node's state.
    pub fn parallel_stack_ids(&self, nodes: &[NodeRef]) -> IdTensor {
        let states: Vec<_> = nodes
            .iter()
            .map(|node| {
                let base = Node::base(node);
                base.state().expect("stacking a tree state").clone()
            })
            .collect();
        let max_len = states.iter().map(|s| s.max_word_len()).max().unwrap_or(0);
        let num_words = states.iter().map(|s| s.num_words()).max().unwrap_or(0);

        let blocks: Vec<Vec<Abc>> = states
            .par_iter()
            .map(|state| {
                let mut block = vec![PAD; max_len * num_words];
                for (wi, word) in state.words().iter().enumerate() {
                    for (pos, &c) in word.ids().iter().enumerate() {
                        block[pos * num_words + wi] = c;
                    }
                }
                block
            })
            .collect();

        IdTensor {
            data: blocks.concat(),
            num_nodes: nodes.len(),
            max_len,
            num_words,
        }
    }

    /// Frees every non-persistent, non-played node reachable only from
    /// `root`, unlinking freed tree nodes from the transposition table.
    /// `root` itself keeps its handle but loses its children.
    pub fn clear_subtree(&self, root: &NodeRef) {
        let mut stack = vec![Arc::clone(root)];
        while let Some(node) = stack.pop() {
            for (index, child) in node.take_children() {
                child.remove_parent(&node, index);
                if child.is_persistent() || child.is_played() {
                    continue;
                }
                if child.parents_count() > 0 {
                    continue;
                }
                if child.is_tree_node() && !child.is_stopped() {
                    self.table.remove(&child.key());
                }
                stack.push(child);
            }
        }
    }
}
