//! Statistics collection for searches.

use std::time::Duration;

/// Statistics collected across search rounds.
#[derive(Debug, Clone)]
pub struct SearchStatistics {
    /// Number of select/evaluate/backup rounds performed.
    pub rounds: usize,

    /// Total simulations run.
    pub simulations: usize,

    /// Simulations that ended on a done or stopped node.
    pub terminal_leaves: usize,

    /// Deepest tree node reached by any simulation.
    pub max_depth: u32,

    /// Canonical nodes in the transposition table after the last round.
    pub tree_size: usize,

    /// Total time spent searching.
    pub total_time: Duration,
}

impl SearchStatistics {
    /// Creates a new, empty statistics object.
    pub fn new() -> Self {
        SearchStatistics {
            rounds: 0,
            simulations: 0,
            terminal_leaves: 0,
            max_depth: 0,
            tree_size: 0,
            total_time: Duration::from_secs(0),
        }
    }

    /// Returns the number of simulations per second.
    pub fn simulations_per_second(&self) -> f64 {
        if self.total_time.as_secs_f64() <= 0.0 {
            return 0.0;
        }
        self.simulations as f64 / self.total_time.as_secs_f64()
    }

    /// Returns a summary of the statistics as a string.
    pub fn summary(&self) -> String {
        format!(
            "Search Statistics:\n\
             - Rounds: {}\n\
             - Simulations: {}\n\
             - Terminal leaves: {}\n\
             - Max depth: {}\n\
             - Tree size: {} nodes\n\
             - Total time: {:.3} seconds\n\
             - Simulations per second: {:.1}",
            self.rounds,
            self.simulations,
            self.terminal_leaves,
            self.max_depth,
            self.tree_size,
            self.total_time.as_secs_f64(),
            self.simulations_per_second()
        )
    }
}

impl Default for SearchStatistics {
    fn default() -> Self {
        Self::new()
    }
}
