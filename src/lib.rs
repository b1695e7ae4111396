//! goban-mcts: a Go rules engine and a parallel Monte Carlo tree search.
//!
//! ## Modules
//!
//! - [`constants`] - Board geometry and engine limits
//! - [`types`] - Colours and vertex states
//! - [`zobrist`] - Hash keys for positions
//! - [`symmetry`] - The eight board symmetries
//! - [`strings`] - Union-find strings with cached liberties
//! - [`position`] - Board state, legality and move execution
//! - [`scoring`] - Area scoring and ownership
//! - [`pass_alive`] - Pass-alive areas, safe area and seki
//! - [`ladder`] - Ladder reading
//! - [`parameters`] - Search options
//! - [`evaluator`] - Position evaluation interface and cache
//! - [`time_control`] - Thinking-time budgets
//! - [`node`] - Concurrent search tree nodes
//! - [`mcts`] - The search driver
//!
//! ## Example
//!
//! ```
//! use std::sync::Arc;
//! use goban_mcts::evaluator::UniformEvaluator;
//! use goban_mcts::mcts::Search;
//! use goban_mcts::parameters::Parameters;
//! use goban_mcts::position::Position;
//! use goban_mcts::zobrist::ZobristTable;
//!
//! let mut pos = Position::new(9, Arc::new(ZobristTable::default()));
//! pos.play_move(pos.vertex(4, 4)).unwrap();
//!
//! let mut search = Search::new(pos, UniformEvaluator::default(), Parameters::default()).unwrap();
//! let result = search.computation(64).unwrap();
//! println!("Best move: {}", search.position().vertex_to_text(result.best_move));
//! ```

pub mod constants;
pub mod evaluator;
pub mod ladder;
pub mod mcts;
pub mod node;
pub mod parameters;
pub mod pass_alive;
pub mod position;
pub mod scoring;
pub mod strings;
pub mod symmetry;
pub mod time_control;
pub mod types;
pub mod zobrist;

pub use evaluator::{CachedEvaluator, EvalError, Evaluator, NetEval, UniformEvaluator};
pub use mcts::{ComputationResult, Search, SearchError};
pub use parameters::Parameters;
pub use position::{MoveError, Position};
pub use types::{Color, Vertex, VertexState};
