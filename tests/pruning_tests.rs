use rewrite_mcts::{Abc, Node, NodeRef, Vocab, WordStore, FIRST_FREE};

const A: Abc = FIRST_FREE;
const B: Abc = FIRST_FREE + 1;

fn test_vocab() -> Vocab {
    let store = WordStore::new();
    store.set_targets(vec![store.intern(&[B])]);
    store.vocab(vec![store.intern(&[A])]).unwrap()
}

fn node_with_actions(permissible: Vec<Abc>) -> NodeRef {
    let affected = permissible.iter().map(|_| vec![(0usize, 0usize)]).collect();
    let node = Node::new_tree(test_vocab(), 0, false);
    node.expand(permissible, affected);
    let row = vec![1.0 / 8.0; 8];
    node.evaluate(std::array::from_fn(|_| row.clone()), row, 0.0);
    node
}

#[test]
fn prune_is_idempotent() {
    let node = node_with_actions(vec![A, B]);

    node.prune(0);
    assert_eq!(node.pruned_flags(), vec![true, false]);
    assert_eq!(node.num_unpruned(), 1);

    node.prune(0);
    assert_eq!(node.pruned_flags(), vec![true, false]);
    assert_eq!(node.num_unpruned(), 1);
    assert!(!node.is_fully_pruned());
}

#[test]
fn pruned_children_lose_every_selection() {
    let node = node_with_actions(vec![A, B]);
    node.prune(0);

    let scores = node.get_scores(1.0, 0.0, false);
    assert_eq!(scores[0], -9999.9);
    let (index, sub) = node.get_best_subaction(1.0, 0.0, false);
    assert_eq!(index, 1);
    assert_eq!(sub, B);
}

#[test]
fn fully_pruned_node_cascades_through_all_parents() {
    // A -> B -> C, each with a single child slot.
    let a = node_with_actions(vec![A]);
    let b = node_with_actions(vec![A]);
    let c = node_with_actions(vec![A]);
    Node::connect_child(&a, 0, &b);
    Node::connect_child(&b, 0, &c);

    c.prune_fully();

    assert!(c.is_fully_pruned());
    assert!(b.is_fully_pruned());
    assert_eq!(b.pruned_flags(), vec![true]);
    assert!(a.is_fully_pruned());
    assert_eq!(a.pruned_flags(), vec![true]);
    assert_eq!(a.num_unpruned(), 0);
}

#[test]
fn cascade_reaches_every_parent_of_a_shared_child() {
    let p1 = node_with_actions(vec![A]);
    let p2 = node_with_actions(vec![A, B]);
    let shared = node_with_actions(vec![A]);
    Node::connect_child(&p1, 0, &shared);
    Node::connect_child(&p2, 1, &shared);

    shared.prune_fully();

    assert!(p1.is_fully_pruned());
    assert_eq!(p2.pruned_flags(), vec![false, true]);
    assert_eq!(p2.num_unpruned(), 1);
    assert!(!p2.is_fully_pruned());
}

#[test]
fn partial_prune_does_not_cascade() {
    let parent = node_with_actions(vec![A, B]);
    let child = node_with_actions(vec![A, B]);
    Node::connect_child(&parent, 0, &child);

    child.prune(0);

    assert_eq!(child.num_unpruned(), 1);
    assert_eq!(parent.pruned_flags(), vec![false, false]);
}

#[test]
fn expanding_with_no_permissible_sub_actions_prunes_upward() {
    let parent = node_with_actions(vec![A]);
    let child = Node::new_tree(test_vocab(), 1, false);
    Node::connect_child(&parent, 0, &child);

    child.expand(Vec::new(), Vec::new());

    assert!(child.is_fully_pruned());
    assert!(!child.is_expanded());
    assert!(parent.is_fully_pruned());
}
