//! Tromp-Taylor area scoring.
//!
//! A point counts for a color if it holds a stone of that color or if it is
//! an empty point from which only that color can be reached through empty
//! space.

use std::collections::VecDeque;

use crate::pass_alive::compute_pass_alive_area;
use crate::position::Position;
use crate::types::{Color, Vertex, VertexState};

/// Number of points reached by `color`: its stones plus every empty point
/// connected to them through empty points.
pub fn compute_reach_color(pos: &Position, color: Color) -> usize {
    let mut buf = Vec::new();
    compute_reach_color_with(pos, color, VertexState::Empty, &mut buf, |vtx| pos.state(vtx))
}

/// Multi-source flood fill from every vertex whose peeked content is `color`,
/// spreading through vertices whose peeked content is `spread`.
///
/// `buf` is resized to the vertex count and marks every reached vertex.
/// Returns the number of reached vertices.
pub fn compute_reach_color_with<F>(
    pos: &Position,
    color: Color,
    spread: VertexState,
    buf: &mut Vec<bool>,
    peek: F,
) -> usize
where
    F: Fn(Vertex) -> VertexState,
{
    let target: VertexState = color.into();
    buf.clear();
    buf.resize(pos.num_vertices(), false);

    let mut reachable = 0;
    let mut open = VecDeque::new();
    for y in 0..pos.board_size() {
        for x in 0..pos.board_size() {
            let vtx = pos.vertex(x, y);
            if peek(vtx) == target {
                reachable += 1;
                buf[vtx] = true;
                open.push_back(vtx);
            }
        }
    }
    while let Some(vtx) = open.pop_front() {
        for n in pos.neighbours4(vtx) {
            if !buf[n] && peek(n) == spread {
                reachable += 1;
                buf[n] = true;
                open.push_back(n);
            }
        }
    }
    reachable
}

/// Black area minus White area plus `black_bonus`.
pub fn compute_score_on_board(pos: &Position, black_bonus: i32) -> i32 {
    let black = compute_reach_color(pos, Color::Black) as i32;
    let white = compute_reach_color(pos, Color::White) as i32;
    black - white + black_bonus
}

/// Final score from Black's view.
pub fn compute_final_score(pos: &Position, komi: f32) -> f32 {
    compute_score_on_board(pos, 0) as f32 - komi
}

/// Owner of every intersection, indexed by `y * board_size + x`.
///
/// Points reached by both colors, or by neither, are `Empty`. A board without
/// stones is therefore all `Empty`.
pub fn simple_ownership(pos: &Position) -> Vec<VertexState> {
    let mut black = Vec::new();
    let mut white = Vec::new();
    let peek = |vtx| pos.state(vtx);
    compute_reach_color_with(pos, Color::Black, VertexState::Empty, &mut black, peek);
    compute_reach_color_with(pos, Color::White, VertexState::Empty, &mut white, peek);

    let mut result = vec![VertexState::Empty; pos.num_intersections()];
    for y in 0..pos.board_size() {
        for x in 0..pos.board_size() {
            let vtx = pos.vertex(x, y);
            result[pos.index(x, y)] = match (black[vtx], white[vtx]) {
                (true, false) => VertexState::Black,
                (false, true) => VertexState::White,
                _ => VertexState::Empty,
            };
        }
    }
    result
}

/// Owner of every intersection after settling pass-alive territory.
///
/// Points inside a color's pass-alive area (its unconditionally alive
/// strings, their vital regions and the pass-dead regions they enclose) are
/// given to that color even if they hold opponent stones. Every other point
/// is scored as in [`simple_ownership`].
pub fn compute_score_area(pos: &Position) -> Vec<VertexState> {
    let mut result = simple_ownership(pos);
    for color in Color::ALL {
        let area = compute_pass_alive_area(pos, color, true, true);
        for (owner, &alive) in result.iter_mut().zip(area.iter()) {
            if alive {
                *owner = color.into();
            }
        }
    }
    result
}

/// Count the `Black` and `White` entries of an ownership vector.
pub fn count_ownership(ownership: &[VertexState]) -> (usize, usize) {
    ownership.iter().fold((0, 0), |(b, w), s| match s {
        VertexState::Black => (b + 1, w),
        VertexState::White => (b, w + 1),
        _ => (b, w),
    })
}
