//! # rewrite-mcts
//!
//! A parallel Monte Carlo Tree Search engine for planning symbol-sequence
//! rewrites.
//!
//! The engine searches a discrete action space for transforming one
//! vocabulary (an ordered collection of symbol sequences) into another.
//! Each move is a *composite action*: seven sub-actions (the symbol to
//! rewrite, its replacement, four context constraints, and a special
//! type) chosen one at a time, so a single edge of the search graph is
//! really a short chain of intermediate "mini" nodes. An external
//! evaluator supplies priors and values for newly reached states; the
//! engine handles PUCT selection with virtual loss, pruning, transposition
//! sharing and parallel simulation.
//!
//! ## Features
//!
//! - Composite actions selected through a fixed seven-phase chain
//! - PUCT scoring with an affected-site heuristic and tie-break jitter
//! - Virtual loss so concurrent simulations diverge, with matched backup
//! - A transposition trie canonicalising equal states into shared nodes
//! - Cascade pruning of dead branches across all parents
//! - Batched, synchronous evaluator callback surface
//!
//! ## Basic Usage
//!
//! ```
//! use rewrite_mcts::{
//!     ActionSpace, Environment, Mcts, MctsConfig, UniformEvaluator, FIRST_FREE,
//! };
//!
//! fn main() -> rewrite_mcts::Result<()> {
//!     let a = FIRST_FREE;
//!     let b = FIRST_FREE + 1;
//!     let alphabet = 8;
//!
//!     let config = MctsConfig::default()
//!         .with_num_sims(64)
//!         .with_num_threads(2)
//!         .with_depth_limit(4);
//!     let mut mcts = Mcts::new(config);
//!
//!     // The end node installs the target vocabulary; build it first.
//!     let end = mcts.end_node(&[b, b], &[2])?;
//!     let root = mcts.tree_node(&[a, a], &[2])?;
//!
//!     let mut space = ActionSpace::new(alphabet);
//!     space.register_action(a, b)?;
//!
//!     let env = Environment::new(
//!         mcts.table(),
//!         mcts.store(),
//!         root.clone(),
//!         end.clone(),
//!         10.0, // final reward
//!         -1.0, // step penalty
//!     );
//!     let evaluator = UniformEvaluator::new(alphabet);
//!
//!     mcts.search(&root, &env, &space, &evaluator, 4);
//!
//!     // Act greedily on the best line found.
//!     let (next, subpath) = mcts.play(&root);
//!     assert_eq!(subpath.chosen_seq.len(), 7);
//!     assert_eq!(subpath.mini_node_seq.len(), 6);
//!     println!("reached dist {}", next.dist());
//!
//!     Ok(())
//! }
//! ```
//!
//! ## How a Simulation Works
//!
//! 1. **Selection**: starting from the root tree node, descend one
//!    composite at a time. Each of the seven sub-selections scores its
//!    children with PUCT, applies virtual loss, and moves on, holding
//!    only that node's mutex.
//!
//! 2. **Expansion**: mini nodes are created and expanded inline, with
//!    priors gathered from their base tree node's cached rows. Completing
//!    the seventh sub-selection steps the environment and canonicalises
//!    the next state through the transposition table.
//!
//! 3. **Evaluation**: simulations stop on states that have never been
//!    evaluated; those leaves go to the external evaluator in one batch.
//!
//! 4. **Backup**: each playout walks its path in reverse, reversing the
//!    virtual loss, folding in transition-edge rewards, and propagating
//!    max values.

pub mod action;
pub mod config;
pub mod env;
pub mod evaluator;
pub mod node;
pub mod search;
pub mod stats;
pub mod table;
pub mod vocab;

pub use action::{
    ActionPhase, ActionSpace, CompositeAction, PotentialAction, SPECIAL_BASIC,
    SPECIAL_WORD_FINAL, SPECIAL_WORD_INITIAL,
};
pub use config::{MctsConfig, PlayCriteria};
pub use env::Environment;
pub use evaluator::{dirichlet_noise, Evaluation, Evaluator, UniformEvaluator};
pub use node::{Node, NodeKind, NodeRef, Site, Subpath};
pub use search::{IdTensor, Mcts, Playout};
pub use stats::SearchStatistics;
pub use table::TranspositionTable;
pub use vocab::{Abc, Vocab, Word, WordId, WordStore, ANY, FIRST_FREE, GAP, PAD, STOP};

/// Error types for the engine.
#[derive(thiserror::Error, Debug)]
pub enum MctsError {
    /// An action id outside the registered catalog.
    #[error("action id {id} out of bounds for action space of size {size}")]
    OutOfBounds { id: usize, size: usize },

    /// A sub-action this node has never acted with.
    #[error("sub-action {0} has no explored edge at this node")]
    UnexploredEdge(Abc),

    /// A reserved symbol id used where a caller-defined symbol is
    /// required.
    #[error("reserved symbol {0} cannot be used here")]
    ReservedSymbol(Abc),

    /// A special type outside the known catalog.
    #[error("unknown special type {0}")]
    UnknownSpecialType(Abc),

    /// A dense input whose id count does not factor into its rows.
    #[error("input of {len} ids does not factor into {rows} rows")]
    ShapeMismatch { len: usize, rows: usize },

    /// A declared word length exceeding the array width.
    #[error("row {row} declares length {len} but is only {width} wide")]
    LengthOverflow { row: usize, len: usize, width: usize },

    /// A cell beyond a word's declared length that is not padding.
    #[error("row {row}, column {col}: cells beyond the word length must be PAD")]
    PadMismatch { row: usize, col: usize },

    /// A padding id inside a word's declared length.
    #[error("row {row}, column {col}: PAD may only appear as padding")]
    PadInsideWord { row: usize, col: usize },

    /// A state was built before the target vocabulary was installed.
    #[error("target vocabulary not set; construct the end node first")]
    MissingTargets,
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, MctsError>;
