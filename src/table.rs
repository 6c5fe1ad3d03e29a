//! The transposition table.
//!
//! A trie keyed on the word-identity tuple of a state. Every tree node
//! produced during search is canonicalised here, so identical states share
//! one node and the search tree becomes a DAG. A single table-wide lock
//! serialises writes; lookups take the read side.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::node::NodeRef;
use crate::vocab::WordId;

#[derive(Default)]
struct TrieNode {
    children: HashMap<WordId, TrieNode>,
    node: Option<NodeRef>,
}

struct Trie {
    root: TrieNode,
    len: usize,
}

pub struct TranspositionTable {
    trie: RwLock<Trie>,
}

impl TranspositionTable {
    pub fn new() -> Self {
        TranspositionTable {
            trie: RwLock::new(Trie {
                root: TrieNode::default(),
                len: 0,
            }),
        }
    }

    /// Returns the canonical node for the candidate's state. If an entry
    /// already exists it wins and the candidate is discarded; otherwise
    /// the candidate is inserted and returned.
    pub fn get_or_insert(&self, candidate: NodeRef) -> NodeRef {
        let key = candidate
            .state()
            .expect("only tree nodes are canonicalised")
            .key();
        let mut trie = self.trie.write();
        let mut inserted = false;
        let result = {
            let mut cur = &mut trie.root;
            for id in key {
                cur = cur.children.entry(id).or_default();
            }
            if cur.node.is_none() {
                cur.node = Some(Arc::clone(&candidate));
                inserted = true;
            }
            Arc::clone(cur.node.as_ref().unwrap())
        };
        if inserted {
            trie.len += 1;
        }
        result
    }

    /// The canonical node for `key`, if one exists.
    pub fn get(&self, key: &[WordId]) -> Option<NodeRef> {
        let trie = self.trie.read();
        let mut cur = &trie.root;
        for id in key {
            cur = cur.children.get(id)?;
        }
        cur.node.clone()
    }

    /// Unlinks the node for `key` during subtree clearing. Stopped and
    /// persistent nodes are refused. Returns whether an entry was removed.
    pub fn remove(&self, key: &[WordId]) -> bool {
        let mut trie = self.trie.write();
        let mut removed = false;
        {
            let mut cur = &mut trie.root;
            for id in key {
                match cur.children.get_mut(id) {
                    Some(next) => cur = next,
                    None => return false,
                }
            }
            let removable = cur
                .node
                .as_ref()
                .map_or(false, |node| !node.is_stopped() && !node.is_persistent());
            if removable {
                cur.node = None;
                removed = true;
            }
        }
        if removed {
            trie.len -= 1;
        }
        removed
    }

    /// Total number of canonical nodes.
    pub fn len(&self) -> usize {
        self.trie.read().len
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Every canonical node currently in the table.
    pub fn nodes(&self) -> Vec<NodeRef> {
        let trie = self.trie.read();
        let mut out = Vec::with_capacity(trie.len);
        let mut stack = vec![&trie.root];
        while let Some(cur) = stack.pop() {
            if let Some(node) = &cur.node {
                out.push(Arc::clone(node));
            }
            stack.extend(cur.children.values());
        }
        out
    }
}

impl Default for TranspositionTable {
    fn default() -> Self {
        Self::new()
    }
}
