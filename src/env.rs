//! The environment transition contract.
//!
//! Applying a completed composite to a tree node's state yields the next
//! state and a scalar reward. States are canonicalised through the
//! transposition table on the way out, so transitions into an
//! already-known state reuse its node.

use std::sync::Arc;

use crate::action::{ActionSpace, CompositeAction};
use crate::node::{Node, NodeRef};
use crate::table::TranspositionTable;
use crate::vocab::WordStore;

/// Owns the reward shape of the search: a per-step penalty, a bonus for
/// reaching the end state, and the per-step reduction in edit distance.
pub struct Environment {
    table: Arc<TranspositionTable>,
    store: Arc<WordStore>,
    init: NodeRef,
    end: NodeRef,
    final_reward: f32,
    step_penalty: f32,
}

impl Environment {
    pub fn new(
        table: Arc<TranspositionTable>,
        store: Arc<WordStore>,
        init: NodeRef,
        end: NodeRef,
        final_reward: f32,
        step_penalty: f32,
    ) -> Self {
        debug_assert!(init.is_tree_node() && end.is_tree_node());
        Environment {
            table,
            store,
            init,
            end,
            final_reward,
            step_penalty,
        }
    }

    pub fn init_node(&self) -> &NodeRef {
        &self.init
    }

    pub fn end_node(&self) -> &NodeRef {
        &self.end
    }

    /// Applies `action` to the node's state and returns the canonical next
    /// node together with the edge reward:
    /// `step_penalty + final_reward·[next == end] + (dist − dist')`.
    pub fn step(
        &self,
        node: &NodeRef,
        space: &ActionSpace,
        action: &CompositeAction,
    ) -> (NodeRef, f32) {
        let state = node.state().expect("step from a tree node");
        let rewritten = space.apply(state, action);
        let words = rewritten.iter().map(|ids| self.store.intern(ids)).collect();
        let vocab = self
            .store
            .vocab(words)
            .expect("targets are set once the environment exists");
        let dist_gain = state.dist() as f32 - vocab.dist() as f32;
        let candidate = Node::new_tree(vocab, node.depth() + 1, false);
        let next = self.table.get_or_insert(candidate);
        let mut reward = self.step_penalty + dist_gain;
        if Arc::ptr_eq(&next, &self.end) {
            reward += self.final_reward;
        }
        (next, reward)
    }

    /// The terminal node a stop sub-action short-circuits into: the same
    /// state, flagged stopped, outside the transposition table. Stopping
    /// performs no edit and earns no reward.
    pub fn stop(&self, node: &NodeRef) -> (NodeRef, f32) {
        let state = node.state().expect("stop from a tree node").clone();
        (Node::new_stopped(state, node.depth()), 0.0)
    }
}
