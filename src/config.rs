//! Configuration options for the search.
//!
//! This module defines the parameters that control selection, virtual
//! loss, parallelism and play.

/// Criteria for descending the graph when acting on the real environment.
///
/// This determines which child `play` follows at each of the seven
/// sub-selections.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayCriteria {
    /// Follow the child with the best observed return.
    ///
    /// Greedy with respect to the highest value ever backed up through an
    /// edge. Favors the single best line found, even if it was only
    /// visited a handful of times.
    BestReturn,

    /// Follow the child with the most visits.
    ///
    /// The conventional robust choice: relies on statistical confidence
    /// rather than a possibly lucky high return.
    MostVisits,
}

/// Configuration for the search.
///
/// Use the builder methods to create a customized configuration.
///
/// # Example
///
/// ```
/// use rewrite_mcts::{MctsConfig, PlayCriteria};
///
/// let config = MctsConfig::default()
///     .with_puct_c(2.5)
///     .with_num_sims(512)
///     .with_num_threads(8)
///     .with_depth_limit(20)
///     .with_play_criteria(PlayCriteria::MostVisits);
/// ```
#[derive(Debug, Clone)]
pub struct MctsConfig {
    /// Weight of the prior-guided exploration term.
    ///
    /// Higher values trust the evaluator's priors longer before the
    /// observed returns take over.
    pub puct_c: f32,

    /// Weight of the affected-site heuristic term.
    ///
    /// Biases selection toward sub-actions that touch more sites. Zero
    /// disables the term.
    pub heur_c: f32,

    /// Whether to add a tiny uniform jitter to scores.
    ///
    /// Breaks exact ties randomly instead of always taking the earliest
    /// index.
    pub add_noise: bool,

    /// Number of simulations charged per virtual selection.
    pub game_count: u32,

    /// Pessimistic value inflation applied on selection and reversed on
    /// backup, so concurrent simulations diverge.
    pub virtual_loss: f32,

    /// Number of worker threads driving simulations.
    pub num_threads: usize,

    /// Simulations per search round.
    pub num_sims: usize,

    /// Maximum number of composite steps per simulation.
    pub depth_limit: usize,

    /// How `play` picks its child at each sub-selection.
    pub play_criteria: PlayCriteria,
}

impl Default for MctsConfig {
    fn default() -> Self {
        MctsConfig {
            puct_c: 1.0,
            heur_c: 0.0,
            add_noise: true,
            game_count: 1,
            virtual_loss: 1.0,
            num_threads: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
            num_sims: 256,
            depth_limit: 30,
            play_criteria: PlayCriteria::BestReturn,
        }
    }
}

impl MctsConfig {
    /// Sets the exploration constant.
    pub fn with_puct_c(mut self, puct_c: f32) -> Self {
        self.puct_c = puct_c;
        self
    }

    /// Sets the affected-site heuristic weight.
    pub fn with_heur_c(mut self, heur_c: f32) -> Self {
        self.heur_c = heur_c;
        self
    }

    /// Enables or disables tie-break jitter.
    pub fn with_add_noise(mut self, add_noise: bool) -> Self {
        self.add_noise = add_noise;
        self
    }

    /// Sets the per-selection game count.
    pub fn with_game_count(mut self, game_count: u32) -> Self {
        self.game_count = game_count;
        self
    }

    /// Sets the virtual loss.
    pub fn with_virtual_loss(mut self, virtual_loss: f32) -> Self {
        self.virtual_loss = virtual_loss;
        self
    }

    /// Sets the number of worker threads.
    pub fn with_num_threads(mut self, num_threads: usize) -> Self {
        self.num_threads = num_threads.max(1);
        self
    }

    /// Sets the number of simulations per round.
    pub fn with_num_sims(mut self, num_sims: usize) -> Self {
        self.num_sims = num_sims;
        self
    }

    /// Sets the per-simulation depth limit.
    pub fn with_depth_limit(mut self, depth_limit: usize) -> Self {
        self.depth_limit = depth_limit;
        self
    }

    /// Sets the criteria used by `play`.
    pub fn with_play_criteria(mut self, criteria: PlayCriteria) -> Self {
        self.play_criteria = criteria;
        self
    }
}
