//! Search options.

use crate::mcts::SearchError;

/// Every tunable of the tree search, passed by reference to nodes.
#[derive(Debug, Clone)]
pub struct Parameters {
    /// Worker threads running playouts.
    pub threads: usize,
    /// Default playout budget per move.
    pub playouts: usize,
    /// Seconds per move, 0 for no time limit.
    pub const_time: u64,
    /// Seconds kept in reserve when thinking on a clock.
    pub lag_buffer: f32,

    /// Root win rate below which the search may stop early to resign.
    pub resign_threshold: f32,
    /// Playouts needed before the resign stop is considered, 0 disables it.
    pub resign_playouts: usize,
    /// Playout budget used when the start-of-search reduction triggers.
    pub reduce_playouts: usize,
    /// Probability of the start-of-search reduction and of stopping once
    /// the best move can no longer be overtaken.
    pub reduce_playouts_prob: f32,

    /// Maximum LCB shortfall of the most visited move against the best LCB.
    pub lcb_reduction: f32,
    /// Minimum share of the most visits a child needs to be ranked by LCB.
    pub lcb_min_visit_ratio: f32,
    pub fpu_reduction: f32,
    pub fpu_root_reduction: f32,
    pub cpuct_init: f32,
    pub cpuct_base_factor: f32,
    pub cpuct_base: f32,
    pub cpuct_dynamic: bool,
    /// Weight of the draw probability in child values.
    pub draw_factor: f32,
    pub score_utility_factor: f32,
    pub score_utility_div: f32,

    pub root_policy_temp: f32,
    pub policy_temp: f32,

    /// Moves played proportionally to visits while
    /// `move_number < random_moves_factor * num_intersections`.
    pub random_moves_factor: f32,
    pub random_min_visits: u32,

    pub gumbel: bool,
    pub gumbel_c_visit: f32,
    pub gumbel_c_scale: f32,
    pub gumbel_considered_moves: usize,
    /// Root playouts spent on sequential halving before plain PUCT.
    pub gumbel_playouts: usize,

    /// Reuse the subtree of the played move.
    pub reuse_tree: bool,
    /// Subtract forced playouts before reporting target probabilities.
    pub policy_target_pruning: bool,
    /// Entries kept by the evaluator cache.
    pub cache_size: usize,
}

impl Default for Parameters {
    fn default() -> Self {
        Self {
            threads: 1,
            playouts: 1600,
            const_time: 0,
            lag_buffer: 0.5,
            resign_threshold: 0.1,
            resign_playouts: 0,
            reduce_playouts: 100,
            reduce_playouts_prob: 0.0,
            lcb_reduction: 0.02,
            lcb_min_visit_ratio: 0.1,
            fpu_reduction: 0.25,
            fpu_root_reduction: 0.25,
            cpuct_init: 0.5,
            cpuct_base_factor: 1.0,
            cpuct_base: 19652.0,
            cpuct_dynamic: true,
            draw_factor: 0.0,
            score_utility_factor: 0.1,
            score_utility_div: 20.0,
            root_policy_temp: 1.0,
            policy_temp: 1.0,
            random_moves_factor: 0.0,
            random_min_visits: 1,
            gumbel: false,
            gumbel_c_visit: 50.0,
            gumbel_c_scale: 1.0,
            gumbel_considered_moves: 16,
            gumbel_playouts: 400,
            reuse_tree: true,
            policy_target_pruning: false,
            cache_size: 50_000,
        }
    }
}

fn finite_non_negative(v: f32) -> bool {
    v.is_finite() && v >= 0.0
}

fn probability(v: f32) -> bool {
    (0.0..=1.0).contains(&v)
}

impl Parameters {
    /// Reject option combinations the search cannot run with.
    pub fn validate(&self) -> Result<(), SearchError> {
        let checks: [(bool, &'static str); 12] = [
            (self.threads > 0, "threads must be > 0"),
            (self.playouts > 0, "playouts must be > 0"),
            (
                self.cpuct_init.is_finite() && self.cpuct_init > 0.0,
                "cpuct_init must be finite and > 0",
            ),
            (
                self.cpuct_base.is_finite() && self.cpuct_base > 0.0,
                "cpuct_base must be finite and > 0",
            ),
            (
                finite_non_negative(self.fpu_reduction) && finite_non_negative(self.fpu_root_reduction),
                "fpu reductions must be finite and >= 0",
            ),
            (
                self.score_utility_div.is_finite() && self.score_utility_div > 0.0,
                "score_utility_div must be finite and > 0",
            ),
            (
                self.policy_temp > 0.0 && self.root_policy_temp > 0.0,
                "policy temperatures must be > 0",
            ),
            (
                probability(self.reduce_playouts_prob),
                "reduce_playouts_prob must be within [0, 1]",
            ),
            (
                probability(self.resign_threshold),
                "resign_threshold must be within [0, 1]",
            ),
            (
                probability(self.lcb_min_visit_ratio) && finite_non_negative(self.lcb_reduction),
                "lcb options out of range",
            ),
            (
                self.gumbel_considered_moves > 0,
                "gumbel_considered_moves must be > 0",
            ),
            (self.cache_size > 0, "cache_size must be > 0"),
        ];
        for (ok, msg) in checks {
            if !ok {
                return Err(SearchError::InvalidConfig { msg });
            }
        }
        Ok(())
    }
}
