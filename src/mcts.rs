//! Parallel Monte Carlo tree search.
//!
//! All workers share one tree. A playout clones the root position, walks down
//! by PUCT (or Gumbel sequential halving at the root), evaluates the leaf
//! and backs the result up along the path it took. Virtual loss on every node
//! of an in-flight path spreads concurrent playouts over different lines.

use std::ptr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use log::{debug, info, warn};
use parking_lot::Mutex;
use rayon::{ThreadPool, ThreadPoolBuilder};
use thiserror::Error;

use crate::constants::{MAX_PLAYOUTS, PASS};
use crate::evaluator::{EvalError, Evaluator};
use crate::node::{Node, NodeEvals};
use crate::parameters::Parameters;
use crate::position::{MoveError, Position};
use crate::time_control::{ConstantTime, NoTimeLimit, TimeControl};
use crate::types::{Color, Vertex};

#[derive(Debug, Error)]
pub enum SearchError {
    #[error(transparent)]
    Evaluator(#[from] EvalError),
    #[error("invalid search config: {msg}")]
    InvalidConfig { msg: &'static str },
    #[error("failed to build search thread pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

/// Everything a finished search reports about the root.
///
/// Distributions have one entry per intersection, indexed by
/// `y * board_size + x`, followed by pass.
#[derive(Debug, Clone)]
pub struct ComputationResult {
    pub board_size: usize,
    pub best_move: Vertex,
    /// Move chosen proportionally to visits in the opening, else `best_move`.
    pub random_move: Vertex,
    pub to_move: Color,
    pub komi: f32,
    pub move_number: usize,

    /// Win rate of the side to move.
    pub root_eval: f32,
    /// Final score from the side to move's view.
    pub root_final_score: f32,
    /// Ownership from the side to move's view.
    pub root_ownership: Vec<f32>,

    pub root_probabilities: Vec<f32>,
    /// Visit distribution with pruned children left out.
    pub root_target_probabilities: Vec<f32>,
    pub root_policy: Vec<f32>,
    pub root_visits: Vec<u32>,

    /// Playouts completed by this call.
    pub playouts: usize,
    pub elapsed: Duration,
}

/// State shared by the workers of one `computation` call.
struct Playouts<'a, E: ?Sized> {
    params: &'a Parameters,
    evaluator: &'a E,
    root: &'a Node,
    root_position: &'a Position,
    time_control: &'a dyn TimeControl,
    running: &'a AtomicBool,

    start: Instant,
    playouts: AtomicUsize,
    max_playouts: AtomicUsize,
    stop: AtomicBool,
    dominance_stop: bool,
    error: Mutex<Option<SearchError>>,
}

impl<E: Evaluator + ?Sized> Playouts<'_, E> {
    fn worker(&self) {
        while self.keep_running() {
            // Claim a playout slot; give it back if the playout is abandoned.
            let claimed = self
                .playouts
                .fetch_update(Ordering::AcqRel, Ordering::Acquire, |p| {
                    (p < self.max_playouts.load(Ordering::Acquire)).then_some(p + 1)
                })
                .is_ok();
            if !claimed {
                break;
            }

            match self.play_simulation() {
                Ok(true) => {}
                Ok(false) => {
                    self.playouts.fetch_sub(1, Ordering::AcqRel);
                }
                Err(e) => {
                    self.playouts.fetch_sub(1, Ordering::AcqRel);
                    warn!("playout failed: {e}");
                    self.error.lock().get_or_insert(e);
                    self.stop.store(true, Ordering::Release);
                    break;
                }
            }
            self.check_early_stop();
        }
    }

    fn keep_running(&self) -> bool {
        if self.stop.load(Ordering::Acquire) || !self.running.load(Ordering::Acquire) {
            return false;
        }
        !self
            .time_control
            .should_stop(self.start.elapsed(), self.playouts.load(Ordering::Acquire))
    }

    fn check_early_stop(&self) {
        let playouts = self.playouts.load(Ordering::Acquire);
        let color = self.root_position.to_move();

        if self.params.resign_playouts > 0
            && playouts >= self.params.resign_playouts
            && self.root.get_eval(color, false) < self.params.resign_threshold
        {
            debug!("resign stop after {playouts} playouts");
            self.stop.store(true, Ordering::Release);
            return;
        }

        if self.dominance_stop {
            let mut best = 0;
            let mut second = 0;
            for edge in self.root.children() {
                let visits = edge.get().map_or(0, Node::visits);
                if visits > best {
                    second = best;
                    best = visits;
                } else if visits > second {
                    second = visits;
                }
            }
            let remaining = self
                .max_playouts
                .load(Ordering::Acquire)
                .saturating_sub(playouts);
            if (second as usize) + remaining < best as usize {
                debug!("best move can no longer be overtaken after {playouts} playouts");
                self.stop.store(true, Ordering::Release);
            }
        }
    }

    /// One playout. `Ok(false)` means it was abandoned without a backup.
    fn play_simulation(&self) -> Result<bool, SearchError> {
        let mut pos = self.root_position.clone();
        let mut path: Vec<&Node> = Vec::with_capacity(64);
        let mut node = self.root;
        node.increment_threads();
        path.push(node);

        let evals = loop {
            if pos.passes() >= 2 {
                break Some(NodeEvals::from_gameover(&pos));
            }

            if !node.is_expanded() {
                let is_root = ptr::eq(node, self.root);
                match node.expand_children(self.evaluator, &pos, self.params, is_root) {
                    Ok(Some(evals)) => break Some(evals),
                    Ok(None) => {
                        node.wait_expanded();
                        if !node.is_expanded() {
                            break None;
                        }
                    }
                    Err(e) => {
                        release(&path);
                        return Err(e.into());
                    }
                }
            }

            let color = pos.to_move();
            let next = if path.len() == 1 && self.params.gumbel {
                node.gumbel_select_child(color, self.params)
            } else {
                node.uct_select_child(color, path.len() == 1, self.params)
            };
            let Some(next) = next else {
                break None;
            };

            let vtx = next.vertex();
            if vtx != PASS && !pos.is_legal_move(vtx, color) {
                next.invalidate();
                break None;
            }
            pos.play_move_assume_legal(vtx, color);
            next.increment_threads();
            path.push(next);
            node = next;
        };

        match evals {
            Some(evals) => {
                for node in path.iter().rev() {
                    node.update(&evals);
                    node.decrement_threads();
                }
                Ok(true)
            }
            None => {
                release(&path);
                Ok(false)
            }
        }
    }
}

fn release(path: &[&Node]) {
    for node in path.iter().rev() {
        node.decrement_threads();
    }
}

/// A search session over one game.
pub struct Search<E: Evaluator> {
    params: Parameters,
    evaluator: E,
    root_position: Position,
    root: Box<Node>,
    pool: ThreadPool,
    time_control: Box<dyn TimeControl>,
    running: Arc<AtomicBool>,
}

impl<E: Evaluator> Search<E> {
    pub fn new(position: Position, evaluator: E, params: Parameters) -> Result<Self, SearchError> {
        params.validate()?;
        let pool = ThreadPoolBuilder::new()
            .num_threads(params.threads)
            .thread_name(|i| format!("search-{i}"))
            .build()?;
        let time_control: Box<dyn TimeControl> = if params.const_time > 0 {
            Box::new(ConstantTime::new(
                Duration::from_secs(params.const_time),
                Duration::from_secs_f32(params.lag_buffer.max(0.0)),
            ))
        } else {
            Box::new(NoTimeLimit)
        };
        Ok(Self {
            params,
            evaluator,
            root_position: position,
            root: Box::new(Node::root()),
            pool,
            time_control,
            running: Arc::new(AtomicBool::new(true)),
        })
    }

    pub fn params(&self) -> &Parameters {
        &self.params
    }

    pub fn evaluator(&self) -> &E {
        &self.evaluator
    }

    pub fn position(&self) -> &Position {
        &self.root_position
    }

    pub fn root(&self) -> &Node {
        &self.root
    }

    pub fn root_visits(&self) -> u32 {
        self.root.visits()
    }

    /// Flag that stops the current or next search when cleared from another
    /// thread. It is set again once that search returns.
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.running)
    }

    pub fn set_time_control(&mut self, time_control: Box<dyn TimeControl>) {
        self.time_control = time_control;
    }

    pub fn time_left(&mut self, color: Color, time: Duration, stones: usize) {
        self.time_control.time_left(color, time, stones);
    }

    /// Replace the game and drop the tree.
    pub fn set_position(&mut self, position: Position) {
        self.root_position = position;
        self.root = Box::new(Node::root());
    }

    /// Play `vtx` for the side to move, keeping its subtree when tree reuse
    /// is on.
    pub fn play_move(&mut self, vtx: Vertex) -> Result<(), MoveError> {
        self.root_position.play_move(vtx)?;
        let reused = if self.params.reuse_tree {
            self.root.take_child(vtx).filter(|n| n.is_valid())
        } else {
            None
        };
        self.root = match reused {
            Some(node) => {
                node.set_active(true);
                node
            }
            None => Box::new(Node::root()),
        };
        Ok(())
    }

    /// Expand and count the root if it has not been yet.
    fn prepare_root(&self) -> Result<(), SearchError> {
        if self.root.is_expanded() {
            return Ok(());
        }
        let expanded =
            self.root
                .expand_children(&self.evaluator, &self.root_position, &self.params, true)?;
        // A reused root keeps the visits it already has.
        if let Some(evals) = expanded.filter(|_| self.root.visits() == 0) {
            // A finished game is scored exactly.
            let evals = if self.root_position.passes() >= 2 {
                NodeEvals::from_gameover(&self.root_position)
            } else {
                evals
            };
            self.root.update(&evals);
        }
        Ok(())
    }

    /// Run up to `playouts` simulations and report the root.
    ///
    /// Statistics backed up before an evaluator failure stay in the tree.
    pub fn computation(&mut self, playouts: usize) -> Result<ComputationResult, SearchError> {
        let start = Instant::now();
        self.time_control.set_to_move(self.root_position.to_move());
        self.prepare_root()?;

        let mut max_playouts = playouts.min(MAX_PLAYOUTS);
        let reduce = self.params.reduce_playouts_prob > 0.0;
        if reduce && fastrand::f32() < self.params.reduce_playouts_prob {
            max_playouts = max_playouts.min(self.params.reduce_playouts);
        }
        let dominance_stop = reduce && fastrand::f32() < self.params.reduce_playouts_prob;

        let shared = Playouts {
            params: &self.params,
            evaluator: &self.evaluator,
            root: &self.root,
            root_position: &self.root_position,
            time_control: &*self.time_control,
            running: &self.running,
            start,
            playouts: AtomicUsize::new(0),
            max_playouts: AtomicUsize::new(max_playouts),
            stop: AtomicBool::new(false),
            dominance_stop,
            error: Mutex::new(None),
        };

        self.pool.scope(|s| {
            for _ in 0..self.params.threads {
                s.spawn(|_| shared.worker());
            }
        });

        // A stop request ends this search only; rearm for the next one.
        self.running.store(true, Ordering::Release);

        let done = shared.playouts.load(Ordering::Acquire);
        if let Some(e) = shared.error.into_inner() {
            return Err(e);
        }

        let result = self.gather_result(done, start.elapsed());
        info!(
            "{} playouts in {:.2}s ({:.0}/s), best {} winrate {:.1}% score {:.1}",
            done,
            result.elapsed.as_secs_f32(),
            done as f32 / result.elapsed.as_secs_f32().max(1e-3),
            self.root_position.vertex_to_text(result.best_move),
            100.0 * result.root_eval,
            result.root_final_score,
        );
        debug!(
            "\n{}",
            self.root.to_verbose_string(&self.root_position, &self.params)
        );
        Ok(result)
    }

    fn gather_result(&self, playouts: usize, elapsed: Duration) -> ComputationResult {
        let pos = &self.root_position;
        let root = &self.root;
        let params = &self.params;
        let color = pos.to_move();
        let n = pos.num_intersections();

        if params.policy_target_pruning {
            root.policy_target_pruning();
        }

        let slot = |vtx: Vertex| if vtx == PASS { n } else { pos.vertex_to_index(vtx) };
        let mut root_visits = vec![0u32; n + 1];
        let mut root_policy = vec![0.0f32; n + 1];
        let mut target_visits = vec![0u32; n + 1];
        for edge in root.children() {
            let i = slot(edge.vertex());
            root_policy[i] = edge.policy();
            if let Some(child) = edge.get() {
                root_visits[i] = child.visits();
                if child.is_active() {
                    target_visits[i] = child.visits();
                }
            }
        }
        let normalise = |visits: &[u32]| -> Vec<f32> {
            let total: u32 = visits.iter().sum();
            visits
                .iter()
                .map(|&v| if total > 0 { v as f32 / total as f32 } else { 0.0 })
                .collect()
        };
        let root_probabilities = normalise(&root_visits);
        let root_target_probabilities = normalise(&target_visits);

        let best_move = if params.gumbel {
            root.gumbel_best_move(color, params)
        } else {
            root.best_move(params)
        };
        let random_move = if (pos.move_number() as f32) < params.random_moves_factor * n as f32 {
            root.randomize_first_proportionally(1.0, params.random_min_visits)
                .unwrap_or(best_move)
        } else {
            best_move
        };

        // Pruning only shapes the reported target; later searches see every child.
        for edge in root.children() {
            if let Some(child) = edge.get() {
                child.set_active(true);
            }
        }

        ComputationResult {
            board_size: pos.board_size(),
            best_move,
            random_move,
            to_move: color,
            komi: pos.komi(),
            move_number: pos.move_number(),
            root_eval: root.get_eval(color, false),
            root_final_score: root.get_final_score(color),
            root_ownership: root.get_ownership(color),
            root_probabilities,
            root_target_probabilities,
            root_policy,
            root_visits,
            playouts,
            elapsed,
        }
    }
}
