//! Ladder reading.
//!
//! A string with one or two liberties is read out as a ladder: the hunter
//! keeps it in atari while the prey extends or captures, until the prey is
//! captured or reaches three liberties. The search is a depth-first
//! alternation over cloned positions with a shared node budget. When the
//! budget runs out the prey is assumed to escape, so a proven ladder stays
//! proven under any larger budget.

use crate::constants::{MAX_LADDER_NODES, NULL_VERTEX};
use crate::position::Position;
use crate::types::{Color, Vertex, VertexState};

/// Per-intersection ladder feature.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LadderType {
    /// A string in atari that cannot escape.
    Death,
    /// A string with two liberties that can be laddered.
    Escapable,
    /// A liberty that captures a `Death` string.
    Take,
    /// A liberty that puts an `Escapable` string in atari.
    Atari,
    NotLadder,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Reading {
    GoodForHunter,
    GoodForPrey,
}

struct Reader {
    nodes: usize,
    budget: usize,
    think_ko: bool,
}

impl Reader {
    fn exhausted(&mut self) -> bool {
        if self.nodes >= self.budget {
            return true;
        }
        self.nodes += 1;
        false
    }

    /// Prey to move with its string at `ladder_vtx` in atari.
    fn prey_move(&mut self, pos: &Position, ladder_vtx: Vertex, prey: Color) -> Reading {
        if self.exhausted() {
            return Reading::GoodForPrey;
        }
        for mv in prey_selections(pos, ladder_vtx, prey, self.think_ko) {
            let mut next = pos.clone();
            next.play_move_assume_legal(mv, prey);
            match next.string_liberties(ladder_vtx) {
                0 | 1 => continue,
                2 => {
                    if self.hunter_move(&next, ladder_vtx, prey) == Reading::GoodForPrey {
                        return Reading::GoodForPrey;
                    }
                }
                _ => return Reading::GoodForPrey,
            }
        }
        Reading::GoodForHunter
    }

    /// Hunter to move with the prey string at `ladder_vtx` on two liberties.
    fn hunter_move(&mut self, pos: &Position, ladder_vtx: Vertex, prey: Color) -> Reading {
        if self.exhausted() {
            return Reading::GoodForPrey;
        }
        let hunter = prey.opponent();
        for mv in hunter_selections(pos, ladder_vtx, prey) {
            let mut next = pos.clone();
            next.play_move_assume_legal(mv, hunter);
            if next.string_liberties(ladder_vtx) != 1 {
                continue;
            }
            if self.prey_move(&next, ladder_vtx, prey) == Reading::GoodForHunter {
                return Reading::GoodForHunter;
            }
        }
        Reading::GoodForPrey
    }
}

/// Prey options: capture an adjacent hunter string in atari, or extend.
/// Ordered by the liberties they leave, most first.
fn prey_selections(pos: &Position, ladder_vtx: Vertex, prey: Color, think_ko: bool) -> Vec<Vertex> {
    let mut moves = Vec::new();
    pos.find_liberty_gaining_captures(ladder_vtx, &mut moves);
    pos.find_string_liberties(ladder_vtx, &mut moves);

    let mut scored: Vec<(Vertex, usize)> = moves
        .into_iter()
        .filter(|&mv| pos.is_legal_move(mv, prey))
        .filter_map(|mv| {
            let mut next = pos.clone();
            next.play_move_assume_legal(mv, prey);
            if !think_ko && next.ko_move() != NULL_VERTEX {
                return None;
            }
            Some((mv, next.string_liberties(ladder_vtx)))
        })
        .collect();
    scored.sort_by(|a, b| b.1.cmp(&a.1));
    scored.into_iter().map(|(mv, _)| mv).collect()
}

/// Hunter options: the prey's liberties, skipping an atari that lets the prey
/// run into open space. Moves that do not self-atari come first.
fn hunter_selections(pos: &Position, ladder_vtx: Vertex, prey: Color) -> Vec<Vertex> {
    let hunter = prey.opponent();
    let mut libs = Vec::with_capacity(2);
    pos.find_string_liberties(ladder_vtx, &mut libs);
    if libs.len() != 2 {
        return Vec::new();
    }

    let mut safe = Vec::with_capacity(2);
    let mut risky = Vec::new();
    for (i, &mv) in libs.iter().enumerate() {
        let other = libs[1 - i];
        if pos.count_empty_neighbours(other) >= 3 {
            continue;
        }
        if !pos.is_legal_move(mv, hunter) {
            continue;
        }
        if pos.is_self_atari(mv, hunter) {
            risky.push(mv);
        } else {
            safe.push(mv);
        }
    }
    safe.extend(risky);
    safe
}

/// True if the string at `vtx` can be captured in a ladder.
pub fn is_ladder(pos: &Position, vtx: Vertex) -> bool {
    is_ladder_with_budget(pos, vtx, MAX_LADDER_NODES)
}

/// [`is_ladder`] with an explicit node budget.
pub fn is_ladder_with_budget(pos: &Position, vtx: Vertex, budget: usize) -> bool {
    is_ladder_with(pos, vtx, budget, true)
}

/// Ladder reading with an explicit budget. Without `think_ko` the prey never
/// captures into a ko, so a ladder only broken by a ko reads as working.
pub fn is_ladder_with(pos: &Position, vtx: Vertex, budget: usize, think_ko: bool) -> bool {
    let Some(prey) = pos.state(vtx).color() else {
        return false;
    };
    let mut reader = Reader {
        nodes: 0,
        budget,
        think_ko,
    };
    let result = match pos.string_liberties(vtx) {
        1 => reader.prey_move(pos, vtx, prey),
        2 => reader.hunter_move(pos, vtx, prey),
        _ => return false,
    };
    result == Reading::GoodForHunter
}

/// Ladder features for every intersection, indexed by `y * board_size + x`.
pub fn ladder_map(pos: &Position) -> Vec<LadderType> {
    let mut result = vec![LadderType::NotLadder; pos.num_intersections()];
    let mut ladder = Vec::new();
    let mut not_ladder = Vec::new();

    for y in 0..pos.board_size() {
        for x in 0..pos.board_size() {
            let vtx = pos.vertex(x, y);
            if !matches!(pos.state(vtx), VertexState::Black | VertexState::White) {
                continue;
            }
            let root = pos.string_root(vtx);
            if not_ladder.contains(&root) {
                continue;
            }
            let first_found = if ladder.contains(&root) {
                false
            } else if is_ladder(pos, vtx) {
                ladder.push(root);
                true
            } else {
                not_ladder.push(root);
                continue;
            };

            let libs = pos.string_liberties(vtx);
            debug_assert!(libs == 1 || libs == 2);
            result[pos.index(x, y)] = if libs == 1 {
                LadderType::Death
            } else {
                LadderType::Escapable
            };

            if first_found {
                let mut buf = Vec::new();
                pos.find_string_liberties(vtx, &mut buf);
                for lib in buf {
                    result[pos.vertex_to_index(lib)] = if libs == 1 {
                        LadderType::Take
                    } else {
                        LadderType::Atari
                    };
                }
            }
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::zobrist::ZobristTable;
    use std::sync::Arc;

    fn new_position(size: usize) -> Position {
        Position::new(size, Arc::new(ZobristTable::default()))
    }

    fn place(pos: &mut Position, color: Color, points: &[(usize, usize)]) {
        for &(x, y) in points {
            let vtx = pos.vertex(x, y);
            pos.play_move_assume_legal(vtx, color);
        }
    }

    /// White stone at (2, 2) in atari, running up and to the right through
    /// an empty board.
    ///
    ///   y=3  . . X . .
    ///   y=2  . X O . .
    ///   y=1  . . X X .
    fn classic_ladder(pos: &mut Position) {
        place(pos, Color::Black, &[(1, 2), (2, 1), (2, 3), (3, 1)]);
        place(pos, Color::White, &[(2, 2)]);
    }

    #[test]
    fn test_ladder_works() {
        let mut pos = new_position(9);
        classic_ladder(&mut pos);
        let prey = pos.vertex(2, 2);
        assert_eq!(pos.string_liberties(prey), 1);
        assert!(is_ladder(&pos, prey));
    }

    #[test]
    fn test_ladder_breaker() {
        let mut pos = new_position(9);
        classic_ladder(&mut pos);
        // A White stone on the ladder's path lets the prey escape.
        place(&mut pos, Color::White, &[(6, 6)]);
        let prey = pos.vertex(2, 2);
        assert!(!is_ladder(&pos, prey));
    }

    #[test]
    fn test_open_string_is_not_ladder() {
        let mut pos = new_position(9);
        place(&mut pos, Color::White, &[(4, 4)]);
        assert!(!is_ladder(&pos, pos.vertex(4, 4)));
        assert!(!is_ladder(&pos, pos.vertex(0, 0)));
    }

    #[test]
    fn test_budget_monotone() {
        let mut pos = new_position(9);
        classic_ladder(&mut pos);
        let prey = pos.vertex(2, 2);
        assert!(!is_ladder_with_budget(&pos, prey, 0));
        let mut proven = false;
        for budget in [1, 4, 16, 64, 256, MAX_LADDER_NODES] {
            let result = is_ladder_with_budget(&pos, prey, budget);
            assert!(!proven || result, "proof lost at budget {budget}");
            proven |= result;
        }
        assert!(proven);
    }

    /// White (1, 0) in atari at the corner. Extending at (0, 0) leaves one
    /// liberty; capturing (2, 0) from (3, 0) is a ko that Black can neither
    /// retake nor answer at the suicide point (0, 0).
    ///
    ///   y=2  . X . . .
    ///   y=1  O X O X .
    ///   y=0  . O X . X
    fn ko_escape(pos: &mut Position) {
        place(pos, Color::Black, &[(2, 0), (4, 0), (1, 1), (1, 2), (3, 1)]);
        place(pos, Color::White, &[(1, 0), (0, 1), (2, 1)]);
    }

    #[test]
    fn test_ko_capture_selection() {
        let mut pos = new_position(5);
        ko_escape(&mut pos);
        let prey = pos.vertex(1, 0);
        let capture = pos.vertex(3, 0);
        let extend = pos.vertex(0, 0);

        let with_ko = prey_selections(&pos, prey, Color::White, true);
        assert_eq!(with_ko, vec![capture, extend]);
        let without_ko = prey_selections(&pos, prey, Color::White, false);
        assert_eq!(without_ko, vec![extend]);
    }

    #[test]
    fn test_ko_reading_changes_result() {
        let mut pos = new_position(5);
        ko_escape(&mut pos);
        let prey = pos.vertex(1, 0);
        assert_eq!(pos.string_liberties(prey), 1);
        assert!(!is_ladder_with(&pos, prey, MAX_LADDER_NODES, true));
        assert!(is_ladder_with(&pos, prey, MAX_LADDER_NODES, false));
        assert!(!is_ladder(&pos, prey));
    }

    #[test]
    fn test_ladder_map() {
        let mut pos = new_position(9);
        classic_ladder(&mut pos);
        let map = ladder_map(&pos);
        assert_eq!(map[pos.index(2, 2)], LadderType::Death);
        assert_eq!(map[pos.index(3, 2)], LadderType::Take);
        assert_eq!(map[pos.index(1, 2)], LadderType::NotLadder);
        assert_eq!(map[pos.index(7, 7)], LadderType::NotLadder);
    }
}
