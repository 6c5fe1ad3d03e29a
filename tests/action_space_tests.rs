use pretty_assertions::assert_eq;

use rewrite_mcts::{
    Abc, ActionPhase, ActionSpace, CompositeAction, MctsError, Node, Vocab, WordStore,
    ANY, FIRST_FREE, GAP, SPECIAL_BASIC, SPECIAL_WORD_FINAL, SPECIAL_WORD_INITIAL, STOP,
};

const P: Abc = FIRST_FREE;
const Q: Abc = FIRST_FREE + 1;
const R: Abc = FIRST_FREE + 2;

const ALPHABET: usize = 10;

fn store_with_target(target: &[Abc]) -> WordStore {
    let store = WordStore::new();
    let word = store.intern(target);
    store.set_targets(vec![word]);
    store
}

fn vocab(store: &WordStore, word: &[Abc]) -> Vocab {
    let interned = store.intern(word);
    store.vocab(vec![interned]).unwrap()
}

#[test]
fn registration_validates_and_deduplicates() {
    let mut space = ActionSpace::new(ALPHABET);

    let id = space.register_action(P, Q).unwrap();
    assert_eq!(id, 0);
    assert_eq!(space.register_action(P, Q).unwrap(), 0);
    assert_eq!(space.register_action(P, GAP).unwrap(), 1);
    assert_eq!(space.size(), 2);

    assert!(matches!(
        space.register_action(STOP, Q),
        Err(MctsError::ReservedSymbol(STOP))
    ));
    assert!(matches!(
        space.register_action(P, ANY),
        Err(MctsError::ReservedSymbol(ANY))
    ));

    assert_eq!(space.get_action(1).unwrap(), (P, GAP));
    assert!(matches!(
        space.get_action(7),
        Err(MctsError::OutOfBounds { id: 7, size: 2 })
    ));
}

#[test]
fn before_phase_offers_stop_and_rewritable_symbols() {
    let store = store_with_target(&[Q, Q, Q]);
    let state = vocab(&store, &[P, Q, P]);
    let mut space = ActionSpace::new(ALPHABET);
    space.register_action(P, Q).unwrap();

    let (permissible, affected) = space.compute_permissible(ActionPhase::Before, &state, &[]);
    assert_eq!(permissible, vec![STOP, P]);
    assert_eq!(affected[0], vec![]);
    assert_eq!(affected[1], vec![(0, 0), (0, 2)]);
}

#[test]
fn after_phase_lists_registered_replacements() {
    let store = store_with_target(&[Q, Q, Q]);
    let state = vocab(&store, &[P, Q, P]);
    let mut space = ActionSpace::new(ALPHABET);
    space.register_action(P, Q).unwrap();
    space.register_action(P, R).unwrap();

    let (permissible, affected) = space.compute_permissible(ActionPhase::After, &state, &[P]);
    assert_eq!(permissible, vec![Q, R]);
    assert_eq!(affected[0], vec![(0, 0), (0, 2)]);
    assert_eq!(affected[1], vec![(0, 0), (0, 2)]);
}

#[test]
fn context_phases_offer_any_plus_observed_symbols() {
    let store = store_with_target(&[Q, Q, Q]);
    let state = vocab(&store, &[P, Q, P]);
    let mut space = ActionSpace::new(ALPHABET);
    space.register_action(P, Q).unwrap();

    // Preceding symbol: only the site at position 2 has one.
    let (permissible, affected) =
        space.compute_permissible(ActionPhase::Pre, &state, &[P, Q]);
    assert_eq!(permissible, vec![ANY, Q]);
    assert_eq!(affected[0], vec![(0, 0), (0, 2)]);
    assert_eq!(affected[1], vec![(0, 2)]);

    // Constraining pre to Q narrows the following-symbol candidates.
    let (permissible, affected) =
        space.compute_permissible(ActionPhase::Post, &state, &[P, Q, Q, ANY]);
    assert_eq!(permissible, vec![ANY]);
    assert_eq!(affected[0], vec![(0, 2)]);
}

#[test]
fn special_phase_filters_sites_per_special_type() {
    let store = store_with_target(&[Q, Q, Q]);
    let state = vocab(&store, &[P, Q, P]);
    let mut space = ActionSpace::new(ALPHABET);
    space.register_action(P, Q).unwrap();
    space.register_special(SPECIAL_WORD_INITIAL).unwrap();
    space.register_special(SPECIAL_WORD_FINAL).unwrap();

    let prefix = [P, Q, ANY, ANY, ANY, ANY];
    let (permissible, affected) =
        space.compute_permissible(ActionPhase::SpecialType, &state, &prefix);
    assert_eq!(
        permissible,
        vec![SPECIAL_BASIC, SPECIAL_WORD_INITIAL, SPECIAL_WORD_FINAL]
    );
    assert_eq!(affected[0], vec![(0, 0), (0, 2)]);
    assert_eq!(affected[1], vec![(0, 0)]);
    assert_eq!(affected[2], vec![(0, 2)]);

    assert!(matches!(
        space.register_special(9),
        Err(MctsError::UnknownSpecialType(9))
    ));
}

#[test]
fn apply_rewrites_matching_sites() {
    let store = store_with_target(&[Q, Q, Q]);
    let state = vocab(&store, &[P, Q, P]);
    let space = ActionSpace::new(ALPHABET);

    let unconstrained = CompositeAction {
        before: P,
        after: Q,
        pre: ANY,
        d_pre: ANY,
        post: ANY,
        d_post: ANY,
        special: SPECIAL_BASIC,
    };
    assert_eq!(space.apply(&state, &unconstrained), vec![vec![Q, Q, Q]]);

    // A pre-context constraint leaves the word-initial site untouched.
    let contextual = CompositeAction {
        pre: Q,
        ..unconstrained
    };
    assert_eq!(space.apply(&state, &contextual), vec![vec![P, Q, Q]]);

    // A word-initial special touches only position 0.
    let initial = CompositeAction {
        special: SPECIAL_WORD_INITIAL,
        ..unconstrained
    };
    assert_eq!(space.apply(&state, &initial), vec![vec![Q, Q, P]]);
}

#[test]
fn apply_with_gap_deletes_symbols() {
    let store = store_with_target(&[Q]);
    let state = vocab(&store, &[P, Q, P]);
    let space = ActionSpace::new(ALPHABET);

    let deletion = CompositeAction {
        before: P,
        after: GAP,
        pre: ANY,
        d_pre: ANY,
        post: ANY,
        d_post: ANY,
        special: SPECIAL_BASIC,
    };
    assert_eq!(space.apply(&state, &deletion), vec![vec![Q]]);
}

#[test]
fn set_action_allowed_expands_the_node() {
    let store = store_with_target(&[Q, Q, Q]);
    let state = vocab(&store, &[P, Q, P]);
    let mut space = ActionSpace::new(ALPHABET);
    space.register_action(P, Q).unwrap();

    let node = Node::new_tree(state, 0, false);
    assert!(!node.is_expanded());
    space.set_action_allowed(&node);
    assert!(node.is_expanded());
    assert_eq!(node.permissible(), vec![STOP, P]);
}

#[test]
fn potential_actions_cover_every_edge_with_sites() {
    let store = store_with_target(&[Q, Q, Q]);
    let state = vocab(&store, &[P, Q, P]);
    let mut space = ActionSpace::new(ALPHABET);
    space.register_action(P, Q).unwrap();
    space.register_action(R, Q).unwrap(); // no R in the state

    let node = Node::new_tree(state, 0, false);
    let potentials = space.find_potential_actions(&node);
    assert_eq!(potentials.len(), 1);
    assert_eq!(potentials[0].action.before, P);
    assert_eq!(potentials[0].action.after, Q);
    assert_eq!(potentials[0].sites.len(), 2);
}
