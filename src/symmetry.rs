//! The eight dihedral symmetries of a square board.
//!
//! Symmetry 0 is the identity. Bit 2 transposes x and y, bit 1 mirrors x,
//! bit 0 mirrors y, applied in that order.

/// Number of board symmetries.
pub const NUM_SYMMETRIES: usize = 8;

/// Identity symmetry.
pub const IDENTITY_SYMMETRY: usize = 0;

/// Transform the coordinate `(x, y)` on a board of `board_size`.
#[inline]
pub fn transform_xy(board_size: usize, symmetry: usize, x: usize, y: usize) -> (usize, usize) {
    debug_assert!(symmetry < NUM_SYMMETRIES);
    let (mut x, mut y) = (x, y);
    if symmetry & 4 != 0 {
        std::mem::swap(&mut x, &mut y);
    }
    if symmetry & 2 != 0 {
        x = board_size - 1 - x;
    }
    if symmetry & 1 != 0 {
        y = board_size - 1 - y;
    }
    (x, y)
}

/// Transform an intersection index (`y * board_size + x`).
#[inline]
pub fn transform_index(board_size: usize, symmetry: usize, index: usize) -> usize {
    let (x, y) = transform_xy(board_size, symmetry, index % board_size, index / board_size);
    y * board_size + x
}
