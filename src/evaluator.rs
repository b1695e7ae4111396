//! Position evaluation for the tree search.
//!
//! The search only needs a policy over the intersections plus pass, a win
//! rate, a draw probability, a final score estimate and an ownership map.
//! Neural network backends live outside this crate and plug in through
//! [`Evaluator`]. [`UniformEvaluator`] is a cheap stand-in built on area
//! scoring, and [`CachedEvaluator`] memoises any evaluator under all eight
//! board symmetries.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::Mutex;
use thiserror::Error;

use crate::position::Position;
use crate::scoring::{compute_score_on_board, simple_ownership};
use crate::symmetry::{NUM_SYMMETRIES, transform_index};
use crate::types::VertexState;

#[derive(Debug, Error)]
pub enum EvalError {
    #[error("evaluator backend failed: {0}")]
    Backend(String),
    #[error("evaluator returned {got} policy entries, expected {expected}")]
    ShapeMismatch { expected: usize, got: usize },
}

/// Raw evaluator output, always from Black's point of view.
#[derive(Debug, Clone, PartialEq)]
pub struct NetEval {
    /// Prior per intersection, indexed by `y * board_size + x`.
    pub policy: Vec<f32>,
    pub pass_policy: f32,
    pub black_winrate: f32,
    pub draw: f32,
    pub black_final_score: f32,
    /// Per intersection, +1 for Black and -1 for White.
    pub black_ownership: Vec<f32>,
}

impl NetEval {
    /// Check the vector sizes against the board.
    pub fn check_shape(&self, num_intersections: usize) -> Result<(), EvalError> {
        for got in [self.policy.len(), self.black_ownership.len()] {
            if got != num_intersections {
                return Err(EvalError::ShapeMismatch {
                    expected: num_intersections,
                    got,
                });
            }
        }
        Ok(())
    }

    /// The same evaluation for the board seen through `symmetry`.
    fn untransform(&self, board_size: usize, symmetry: usize) -> NetEval {
        let n = self.policy.len();
        let mut policy = vec![0.0; n];
        let mut ownership = vec![0.0; n];
        for idx in 0..n {
            let sym_idx = transform_index(board_size, symmetry, idx);
            policy[idx] = self.policy[sym_idx];
            ownership[idx] = self.black_ownership[sym_idx];
        }
        NetEval {
            policy,
            black_ownership: ownership,
            ..self.clone()
        }
    }
}

/// Anything that can score a position for the search.
///
/// Implementations are shared by every worker thread.
pub trait Evaluator: Send + Sync {
    /// Evaluate `pos`, optionally under a fixed board symmetry.
    fn evaluate(&self, pos: &Position, symmetry: Option<usize>) -> Result<NetEval, EvalError>;
}

impl<T: Evaluator + ?Sized> Evaluator for Arc<T> {
    fn evaluate(&self, pos: &Position, symmetry: Option<usize>) -> Result<NetEval, EvalError> {
        (**self).evaluate(pos, symmetry)
    }
}

impl<T: Evaluator + ?Sized> Evaluator for &T {
    fn evaluate(&self, pos: &Position, symmetry: Option<usize>) -> Result<NetEval, EvalError> {
        (**self).evaluate(pos, symmetry)
    }
}

/// Uniform policy over the empty points and a value from the current area
/// score.
#[derive(Debug, Clone)]
pub struct UniformEvaluator {
    /// Score margin, in points, that moves the win rate to about 76%.
    pub score_scale: f32,
}

impl Default for UniformEvaluator {
    fn default() -> Self {
        Self { score_scale: 10.0 }
    }
}

impl Evaluator for UniformEvaluator {
    fn evaluate(&self, pos: &Position, _symmetry: Option<usize>) -> Result<NetEval, EvalError> {
        let n = pos.num_intersections();
        let prior = 1.0 / (pos.empty_count() + 1) as f32;
        let mut policy = vec![0.0; n];
        for vtx in pos.empty_vertices() {
            policy[pos.vertex_to_index(vtx)] = prior;
        }

        let black_ownership = simple_ownership(pos)
            .into_iter()
            .map(|owner| match owner {
                VertexState::Black => 1.0,
                VertexState::White => -1.0,
                _ => 0.0,
            })
            .collect();

        let score = compute_score_on_board(pos, 0) as f32 - pos.komi();
        Ok(NetEval {
            policy,
            pass_policy: prior,
            black_winrate: 0.5 + 0.5 * (score / self.score_scale).tanh(),
            draw: 0.0,
            black_final_score: score,
            black_ownership,
        })
    }
}

struct CacheInner {
    entries: HashMap<u64, Arc<NetEval>>,
    order: VecDeque<u64>,
}

/// Bounded FIFO cache in front of another evaluator.
///
/// A lookup probes the hash of the position under each of the eight
/// symmetries, so a mirrored or rotated position reuses the stored result
/// with its policy and ownership mapped back.
pub struct CachedEvaluator<E> {
    inner: E,
    capacity: usize,
    cache: Mutex<CacheInner>,
    hits: AtomicUsize,
    misses: AtomicUsize,
}

impl<E: Evaluator> CachedEvaluator<E> {
    pub fn new(inner: E, capacity: usize) -> Self {
        Self {
            inner,
            capacity: capacity.max(1),
            cache: Mutex::new(CacheInner {
                entries: HashMap::with_capacity(capacity.min(1 << 16)),
                order: VecDeque::new(),
            }),
            hits: AtomicUsize::new(0),
            misses: AtomicUsize::new(0),
        }
    }

    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn misses(&self) -> usize {
        self.misses.load(Ordering::Relaxed)
    }

    pub fn len(&self) -> usize {
        self.cache.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        let mut cache = self.cache.lock();
        cache.entries.clear();
        cache.order.clear();
    }

    fn lookup(&self, pos: &Position) -> Option<NetEval> {
        let hashes: Vec<u64> = (0..NUM_SYMMETRIES)
            .map(|sym| pos.compute_symmetry_hash(sym))
            .collect();
        let cache = self.cache.lock();
        for (sym, hash) in hashes.iter().enumerate() {
            if let Some(hit) = cache.entries.get(hash) {
                let hit = Arc::clone(hit);
                drop(cache);
                return Some(if sym == 0 {
                    (*hit).clone()
                } else {
                    hit.untransform(pos.board_size(), sym)
                });
            }
        }
        None
    }

    fn insert(&self, hash: u64, eval: NetEval) {
        let mut cache = self.cache.lock();
        if cache.entries.insert(hash, Arc::new(eval)).is_none() {
            cache.order.push_back(hash);
        }
        while cache.entries.len() > self.capacity {
            match cache.order.pop_front() {
                Some(old) => {
                    cache.entries.remove(&old);
                }
                None => break,
            }
        }
    }
}

impl<E: Evaluator> Evaluator for CachedEvaluator<E> {
    fn evaluate(&self, pos: &Position, symmetry: Option<usize>) -> Result<NetEval, EvalError> {
        if let Some(hit) = self.lookup(pos) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(hit);
        }
        self.misses.fetch_add(1, Ordering::Relaxed);
        let eval = self.inner.evaluate(pos, symmetry)?;
        eval.check_shape(pos.num_intersections())?;
        self.insert(pos.hash(), eval.clone());
        Ok(eval)
    }
}
