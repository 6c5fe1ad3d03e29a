use pretty_assertions::assert_eq;

use rewrite_mcts::{Abc, MctsError, WordStore, FIRST_FREE, PAD};

const A: Abc = FIRST_FREE;
const B: Abc = FIRST_FREE + 1;
const C: Abc = FIRST_FREE + 2;

#[test]
fn interning_shares_equal_content() {
    let store = WordStore::new();
    let w1 = store.intern(&[A, B, C]);
    let w2 = store.intern(&[A, B, C]);
    let w3 = store.intern(&[A, B]);

    assert_eq!(w1.id(), w2.id());
    assert!(std::sync::Arc::ptr_eq(&w1, &w2));
    assert_ne!(w1.id(), w3.id());
    assert_eq!(store.len(), 2);
}

#[test]
fn state_equality_is_word_identity() {
    let store = WordStore::new();
    store.set_targets(vec![store.intern(&[A]), store.intern(&[B])]);

    let v1 = store
        .vocab(vec![store.intern(&[A, B]), store.intern(&[C])])
        .unwrap();
    let v2 = store
        .vocab(vec![store.intern(&[A, B]), store.intern(&[C])])
        .unwrap();
    let v3 = store
        .vocab(vec![store.intern(&[C]), store.intern(&[A, B])])
        .unwrap();

    assert_eq!(v1, v2);
    assert_ne!(v1, v3);
    assert_eq!(v1.key(), v2.key());
}

#[test]
fn dist_sums_per_order_and_done_requires_zero() {
    let store = WordStore::new();
    store.set_targets(vec![store.intern(&[A, B]), store.intern(&[C])]);

    // First word one substitution away, second word exact.
    let v = store
        .vocab(vec![store.intern(&[A, C]), store.intern(&[C])])
        .unwrap();
    assert_eq!(v.dist(), 1);
    assert!(!v.done());

    let exact = store
        .vocab(vec![store.intern(&[A, B]), store.intern(&[C])])
        .unwrap();
    assert_eq!(exact.dist(), 0);
    assert!(exact.done());
}

#[test]
fn missing_targets_is_an_error() {
    let store = WordStore::new();
    let result = store.vocab(vec![store.intern(&[A])]);
    assert!(matches!(result, Err(MctsError::MissingTargets)));
}

#[test]
fn padded_round_trip_preserves_ids() {
    let store = WordStore::new();
    store.set_targets(vec![store.intern(&[A]), store.intern(&[B])]);

    let ids = [A, B, C, B, PAD, PAD];
    let lengths = [3, 1];
    let v = store.vocab_from_padded(&ids, &lengths).unwrap();
    assert_eq!(v.word(0).ids(), &[A, B, C]);
    assert_eq!(v.word(1).ids(), &[B]);

    let (out, width) = store.to_padded(&v);
    assert!(width >= 3);
    for (row, &len) in lengths.iter().enumerate() {
        for col in 0..width {
            let expected = if col < len { ids[row * 3 + col] } else { PAD };
            assert_eq!(out[row * width + col], expected);
        }
    }
}

#[test]
fn padded_input_rejects_malformed_arrays() {
    let store = WordStore::new();
    store.set_targets(vec![store.intern(&[A])]);

    // Non-pad garbage after the declared length.
    assert!(matches!(
        store.vocab_from_padded(&[A, B, C], &[1]),
        Err(MctsError::PadMismatch { row: 0, col: 1 })
    ));

    // PAD inside the declared length.
    assert!(matches!(
        store.vocab_from_padded(&[A, PAD, B], &[3]),
        Err(MctsError::PadInsideWord { row: 0, col: 1 })
    ));

    // Length longer than the row width.
    assert!(matches!(
        store.vocab_from_padded(&[A, B], &[3]),
        Err(MctsError::LengthOverflow { row: 0, len: 3, width: 2 })
    ));

    // Id count that does not factor into the rows.
    assert!(matches!(
        store.vocab_from_padded(&[A, B, C], &[1, 1]),
        Err(MctsError::ShapeMismatch { len: 3, rows: 2 })
    ));
}

#[test]
fn alignment_tracks_target_symbols() {
    let store = WordStore::new();
    store.set_targets(vec![store.intern(&[A, C])]);

    let v = store.vocab(vec![store.intern(&[A, B])]).unwrap();
    let word = v.word(0);
    assert_eq!(word.dist(0), Some(1));
    assert_eq!(word.aligned_symbol(0, 0), Some(A));
    assert_eq!(word.aligned_symbol(0, 1), Some(C));
}
