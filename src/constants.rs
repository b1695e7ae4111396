//! Constants for board geometry, special vertices, and engine limits.
//!
//! The board uses a 1D array representation with a one-cell border of
//! invalid vertices around the playable area. Storage is always sized for
//! the largest supported board; the actual board size is chosen at runtime.

use crate::types::Vertex;

// =============================================================================
// Board Geometry
// =============================================================================

/// Largest supported board size (NxN).
pub const MAX_BOARD_SIZE: usize = 19;

/// Smallest supported board size.
pub const MIN_BOARD_SIZE: usize = 2;

/// Board width including the border on both sides.
pub const LETTER_BOX_SIZE: usize = MAX_BOARD_SIZE + 2;

/// Total board array size including the border.
pub const NUM_VERTICES: usize = LETTER_BOX_SIZE * LETTER_BOX_SIZE;

/// Default komi (compensation points for White).
pub const DEFAULT_KOMI: f32 = 7.5;

// =============================================================================
// Special Move Values
// =============================================================================

/// No move. Index 0 is always part of the border, so it is never playable.
pub const NULL_VERTEX: Vertex = 0;

/// Pass move marker.
pub const PASS: Vertex = NUM_VERTICES + 1;

/// Resign move marker.
pub const RESIGN: Vertex = NUM_VERTICES + 2;

// =============================================================================
// Rules Engine Limits
// =============================================================================

/// Node budget of a single ladder search.
pub const MAX_LADDER_NODES: usize = 2000;

/// Liberty count of the sentinel string that empty and border vertices
/// belong to. Large enough that no liberty test ever treats it as a string.
pub const LIBERTIES_RESET: u16 = 16384;

/// Pass counts above this value hash identically.
pub const MAX_HASHED_PASSES: usize = 4;

// =============================================================================
// Search Limits
// =============================================================================

/// Hard cap on playouts of a single computation.
pub const MAX_PLAYOUTS: usize = 15_000_000;

/// Visits added per in-flight thread when computing virtual loss.
pub const VIRTUAL_LOSS_COUNT: u32 = 3;

// =============================================================================
// Neighbor Counters
// =============================================================================

/// Bit width of each per-color neighbor counter.
pub const NBR_SHIFT: u32 = 4;

/// Mask of a single neighbor counter.
pub const NBR_MASK: u16 = 0xf;

/// Shift of the black-neighbor counter.
pub const BLACK_NBR_SHIFT: u32 = 0;

/// Shift of the white-neighbor counter.
pub const WHITE_NBR_SHIFT: u32 = NBR_SHIFT;

/// Shift of the empty-neighbor counter.
pub const EMPTY_NBR_SHIFT: u32 = 2 * NBR_SHIFT;
