//! Shared value types: vertices, stone colors and vertex contents.

use std::fmt;

/// A point on the board, represented as an index into the padded 1D array.
/// Also carries the synthetic values `PASS`, `RESIGN` and `NULL_VERTEX`.
pub type Vertex = usize;

/// A player color.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Color {
    Black = 0,
    White = 1,
}

impl Color {
    /// Both colors, Black first.
    pub const ALL: [Color; 2] = [Color::Black, Color::White];

    #[inline]
    pub fn opponent(self) -> Color {
        match self {
            Color::Black => Color::White,
            Color::White => Color::Black,
        }
    }

    /// Index usable for per-color arrays.
    #[inline]
    pub fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Color::Black => write!(f, "black"),
            Color::White => write!(f, "white"),
        }
    }
}

/// Content of a single vertex.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum VertexState {
    Black = 0,
    White = 1,
    Empty = 2,
    Invalid = 3,
}

impl VertexState {
    /// Index usable for per-content tables such as Zobrist keys.
    #[inline]
    pub fn index(self) -> usize {
        self as usize
    }

    /// The stone color on this vertex, if any.
    #[inline]
    pub fn color(self) -> Option<Color> {
        match self {
            VertexState::Black => Some(Color::Black),
            VertexState::White => Some(Color::White),
            _ => None,
        }
    }

    #[inline]
    pub fn is_stone(self) -> bool {
        matches!(self, VertexState::Black | VertexState::White)
    }
}

impl From<Color> for VertexState {
    #[inline]
    fn from(color: Color) -> Self {
        match color {
            Color::Black => VertexState::Black,
            Color::White => VertexState::White,
        }
    }
}
