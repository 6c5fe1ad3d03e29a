//! End-to-end demo: search for a rewrite plan, then act greedily on it.
//!
//! Run with:
//!
//! ```bash
//! RUST_LOG=debug cargo run --example greedy_rewrite
//! ```

use rewrite_mcts::{
    ActionSpace, Environment, Mcts, MctsConfig, UniformEvaluator, FIRST_FREE,
};

const ALPHABET: usize = 12;

fn main() -> rewrite_mcts::Result<()> {
    env_logger::init();

    let p = FIRST_FREE;
    let t = FIRST_FREE + 1;
    let k = FIRST_FREE + 2;
    let f = FIRST_FREE + 3;
    let h = FIRST_FREE + 5;

    // Two words, three rewrite steps away from the target vocabulary.
    let start = [p, t, p, k, t, k];
    let end = [f, t, f, h, t, h];
    let lengths = [3, 3];

    let config = MctsConfig::default()
        .with_num_sims(256)
        .with_depth_limit(8)
        .with_puct_c(1.5);
    let mut mcts = Mcts::new(config);

    let end_node = mcts.end_node(&end, &lengths)?;
    let root = mcts.tree_node(&start, &lengths)?;

    let mut space = ActionSpace::new(ALPHABET);
    space.register_action(p, f)?;
    space.register_action(k, h)?;
    space.register_action(t, f)?;

    let env = Environment::new(
        mcts.table(),
        mcts.store(),
        root.clone(),
        end_node,
        10.0,
        -1.0,
    );
    let evaluator = UniformEvaluator::new(ALPHABET);

    // Search, then walk the best line one composite at a time.
    let mut node = root;
    for ply in 0..6 {
        if node.is_done() {
            println!("reached the target vocabulary after {ply} plies");
            break;
        }
        if node.is_stopped() {
            println!("search stopped after {ply} plies");
            break;
        }
        mcts.search(&node, &env, &space, &evaluator, 4);
        let (next, subpath) = mcts.play(&node);
        println!(
            "ply {ply}: chose {:?}, dist {} -> {}",
            subpath.chosen_seq,
            node.dist(),
            next.dist()
        );
        node = next;
    }

    println!("{}", mcts.statistics().summary());
    Ok(())
}
