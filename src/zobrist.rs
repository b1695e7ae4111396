//! Zobrist keys for position hashing.
//!
//! The table is built once, explicitly, before any board exists and is then
//! shared read-only by every [`Position`](crate::position::Position) through
//! an `Arc`. Keys are derived from a seed so hashes are reproducible.

use crate::constants::{MAX_HASHED_PASSES, NUM_VERTICES};
use crate::types::{Vertex, VertexState};

/// Default seed used by [`ZobristTable::default`].
pub const DEFAULT_SEED: u64 = 0x5a0b_7215_9e37_79b9;

/// Pseudorandom keys indexed by (vertex content, vertex) plus game-state keys.
pub struct ZobristTable {
    /// Key per vertex content and vertex.
    state: [[u64; NUM_VERTICES]; 4],
    /// Key per ko vertex.
    ko: [u64; NUM_VERTICES],
    /// Key per clamped pass count.
    passes: [u64; MAX_HASHED_PASSES + 1],
    /// Initial value of every hash.
    empty: u64,
    /// XORed in when White is to move.
    white_to_move: u64,
}

impl ZobristTable {
    /// Build a table from the given seed.
    pub fn new(seed: u64) -> Self {
        let mut rng = fastrand::Rng::with_seed(seed);

        let mut state = [[0u64; NUM_VERTICES]; 4];
        for row in state.iter_mut() {
            for key in row.iter_mut() {
                *key = rng.u64(..);
            }
        }
        let mut ko = [0u64; NUM_VERTICES];
        for key in ko.iter_mut() {
            *key = rng.u64(..);
        }
        let mut passes = [0u64; MAX_HASHED_PASSES + 1];
        for key in passes.iter_mut() {
            *key = rng.u64(..);
        }

        Self {
            state,
            ko,
            passes,
            empty: rng.u64(..),
            white_to_move: rng.u64(..),
        }
    }

    #[inline]
    pub fn state(&self, content: VertexState, vtx: Vertex) -> u64 {
        self.state[content.index()][vtx]
    }

    #[inline]
    pub fn ko(&self, vtx: Vertex) -> u64 {
        self.ko[vtx]
    }

    #[inline]
    pub fn passes(&self, passes: usize) -> u64 {
        self.passes[passes.min(MAX_HASHED_PASSES)]
    }

    #[inline]
    pub fn empty(&self) -> u64 {
        self.empty
    }

    #[inline]
    pub fn white_to_move(&self) -> u64 {
        self.white_to_move
    }
}

impl Default for ZobristTable {
    fn default() -> Self {
        Self::new(DEFAULT_SEED)
    }
}
