use std::sync::Arc;

use rewrite_mcts::{Abc, Node, TranspositionTable, Vocab, WordStore, FIRST_FREE};

const A: Abc = FIRST_FREE;
const B: Abc = FIRST_FREE + 1;
const C: Abc = FIRST_FREE + 2;

fn store_with_targets() -> WordStore {
    let store = WordStore::new();
    store.set_targets(vec![store.intern(&[C]), store.intern(&[C])]);
    store
}

fn vocab(store: &WordStore, words: &[&[Abc]]) -> Vocab {
    let interned = words.iter().map(|w| store.intern(w)).collect();
    store.vocab(interned).unwrap()
}

#[test]
fn get_or_insert_is_idempotent() {
    let store = store_with_targets();
    let table = TranspositionTable::new();

    let state = vocab(&store, &[&[A, B], &[C]]);
    let first = table.get_or_insert(Node::new_tree(state.clone(), 0, false));
    let second = table.get_or_insert(Node::new_tree(state.clone(), 3, false));

    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(table.len(), 1);
    // The losing candidate was discarded, keeping the original depth.
    assert_eq!(second.depth(), 0);
}

#[test]
fn distinct_states_get_distinct_nodes() {
    let store = store_with_targets();
    let table = TranspositionTable::new();

    let n1 = table.get_or_insert(Node::new_tree(vocab(&store, &[&[A], &[B]]), 0, false));
    let n2 = table.get_or_insert(Node::new_tree(vocab(&store, &[&[B], &[A]]), 0, false));

    assert!(!Arc::ptr_eq(&n1, &n2));
    assert_eq!(table.len(), 2);

    // Prefix keys must not collide with longer keys.
    let n3 = table.get_or_insert(Node::new_tree(vocab(&store, &[&[A]]), 0, false));
    assert!(!Arc::ptr_eq(&n1, &n3));
    assert_eq!(table.len(), 3);
}

#[test]
fn two_parents_share_one_canonical_child() {
    let store = store_with_targets();
    let table = TranspositionTable::new();

    let parent_of = |state: Vocab| {
        let node = Node::new_tree(state, 0, false);
        node.expand(vec![A], vec![vec![(0, 0)]]);
        node
    };
    let p1 = parent_of(vocab(&store, &[&[A], &[A]]));
    let p2 = parent_of(vocab(&store, &[&[B], &[B]]));

    let before = table.len();
    let shared_state = vocab(&store, &[&[C], &[A]]);
    let c1 = table.get_or_insert(Node::new_tree(shared_state.clone(), 1, false));
    let c2 = table.get_or_insert(Node::new_tree(shared_state.clone(), 1, false));
    assert_eq!(table.len(), before + 1);

    Node::connect_child(&p1, 0, &c1);
    Node::connect_child(&p2, 0, &c2);

    assert!(Arc::ptr_eq(&c1, &c2));
    assert_eq!(c1.parents_count(), 2);
    assert!(Arc::ptr_eq(&p1.child(0).unwrap(), &p2.child(0).unwrap()));
}

#[test]
fn remove_unlinks_ordinary_nodes_only() {
    let store = store_with_targets();
    let table = TranspositionTable::new();

    let state = vocab(&store, &[&[A], &[B]]);
    let node = table.get_or_insert(Node::new_tree(state.clone(), 0, false));
    assert_eq!(table.len(), 1);

    assert!(table.remove(&node.key()));
    assert_eq!(table.len(), 0);
    assert!(table.get(&state.key()).is_none());

    // Removing again is a no-op.
    assert!(!table.remove(&state.key()));

    // Persistent nodes are refused.
    let persistent = table.get_or_insert(Node::new_tree(state.clone(), 0, true));
    assert!(!table.remove(&persistent.key()));
    assert_eq!(table.len(), 1);
}

#[test]
fn nodes_lists_every_canonical_entry() {
    let store = store_with_targets();
    let table = TranspositionTable::new();

    let n1 = table.get_or_insert(Node::new_tree(vocab(&store, &[&[A], &[A]]), 0, false));
    let n2 = table.get_or_insert(Node::new_tree(vocab(&store, &[&[B], &[B]]), 0, false));

    let all = table.nodes();
    assert_eq!(all.len(), 2);
    assert!(all.iter().any(|n| Arc::ptr_eq(n, &n1)));
    assert!(all.iter().any(|n| Arc::ptr_eq(n, &n2)));
}
