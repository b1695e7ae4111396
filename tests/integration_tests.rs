//! Integration tests for the rules engine.
//!
//! Positions are set up from move lists in text coordinates, as a GTP
//! front end would send them.

use std::sync::Arc;

use goban_mcts::constants::PASS;
use goban_mcts::ladder::{LadderType, is_ladder, ladder_map};
use goban_mcts::pass_alive::{compute_pass_alive_area, compute_safe_area};
use goban_mcts::position::{MoveError, Position};
use goban_mcts::scoring::{
    compute_final_score, compute_score_area, compute_score_on_board, count_ownership,
    simple_ownership,
};
use goban_mcts::types::{Color, VertexState};
use goban_mcts::zobrist::ZobristTable;

// =============================================================================
// Helper functions for setting up test positions
// =============================================================================

fn new_position(size: usize) -> Position {
    Position::new(size, Arc::new(ZobristTable::default()))
}

/// Play a sequence of moves, alternating colours from Black.
/// "pass" can be used to pass.
fn setup_position(size: usize, moves: &[&str]) -> Position {
    let mut pos = new_position(size);
    for mv in moves {
        let vtx = pos.parse_vertex(mv).unwrap();
        pos.play_move(vtx).unwrap();
    }
    pos
}

/// Place stones directly, Black's first, then White's.
fn setpos(size: usize, black: &[&str], white: &[&str]) -> Position {
    let mut pos = new_position(size);
    for (color, stones) in [(Color::Black, black), (Color::White, white)] {
        for mv in stones {
            let vtx = pos.parse_vertex(mv).unwrap();
            pos.play_move_assume_legal(vtx, color);
        }
    }
    pos.set_to_move(Color::Black);
    pos
}

// =============================================================================
// Coordinates
// =============================================================================

#[test]
fn test_parse_corners() {
    let pos = new_position(9);
    assert_eq!(pos.parse_vertex("A1"), Some(pos.vertex(0, 0)));
    assert_eq!(pos.parse_vertex("J9"), Some(pos.vertex(8, 8)));
    assert_eq!(pos.parse_vertex("A9"), Some(pos.vertex(0, 8)));
    assert_eq!(pos.parse_vertex("K1"), None);
    assert_eq!(pos.parse_vertex("A10"), None);
    assert_eq!(pos.parse_vertex("I5"), None);

    let big = new_position(19);
    assert_eq!(big.parse_vertex("T19"), Some(big.vertex(18, 18)));
}

#[test]
fn test_text_roundtrip() {
    let pos = new_position(13);
    for text in ["A1", "D4", "G7", "H5", "J5", "N13", "pass"] {
        let vtx = pos.parse_vertex(text).unwrap();
        assert_eq!(pos.vertex_to_text(vtx), text);
    }
}

// =============================================================================
// Moves and captures
// =============================================================================

#[test]
fn test_first_move_in_center() {
    let mut pos = new_position(9);
    let vtx = pos.vertex(4, 4);
    assert!(pos.is_legal_move(vtx, Color::Black));
    pos.play_move(vtx).unwrap();
    assert_eq!(pos.state(vtx), VertexState::Black);
    assert_eq!(pos.string_stones(vtx), 1);
    assert_eq!(pos.string_liberties(vtx), 4);
    assert_eq!(pos.to_move(), Color::White);
    assert_eq!(pos.move_number(), 1);
    assert_eq!(pos.last_move(), vtx);
}

#[test]
fn test_surrounded_stone_is_captured() {
    let pos = setup_position(9, &["D5", "E5", "F5", "pass", "E4", "pass", "E6"]);
    assert_eq!(pos.state(pos.parse_vertex("E5").unwrap()), VertexState::Empty);
    assert_eq!(pos.prisoners(Color::Black), 1);
    assert_eq!(pos.prisoners(Color::White), 0);
    assert_eq!(pos.hash(), pos.compute_hash());
}

#[test]
fn test_ko_recapture_is_illegal() {
    let mut pos = setup_position(
        9,
        &["B3", "C3", "A2", "B2", "B1", "D2", "H8", "C1", "C2"],
    );
    let b2 = pos.parse_vertex("B2").unwrap();
    assert_eq!(pos.state(b2), VertexState::Empty);
    assert_eq!(pos.ko_move(), b2);
    assert!(matches!(pos.play_move(b2), Err(MoveError::Ko)));

    // After a move elsewhere on both sides, the ko can be taken back.
    for text in ["J9", "J1"] {
        let vtx = pos.parse_vertex(text).unwrap();
        pos.play_move(vtx).unwrap();
    }
    assert!(pos.play_move(b2).is_ok());
}

#[test]
fn test_illegal_moves() {
    let mut pos = setup_position(9, &["A2", "E5", "B1"]);
    // A1 is surrounded by Black: suicide for White.
    let a1 = pos.parse_vertex("A1").unwrap();
    assert!(matches!(pos.play_move(a1), Err(MoveError::Suicide)));
    let e5 = pos.parse_vertex("E5").unwrap();
    assert!(matches!(pos.play_move(e5), Err(MoveError::Occupied)));
    // Failed moves leave the position untouched.
    assert_eq!(pos.to_move(), Color::White);
    assert_eq!(pos.move_number(), 3);
}

#[test]
fn test_two_passes_end_the_game() {
    let pos = setup_position(9, &["E5", "pass", "pass"]);
    assert_eq!(pos.passes(), 2);
    assert_eq!(pos.last_move(), PASS);
}

// =============================================================================
// Scoring
// =============================================================================

#[test]
fn test_ownership_partitions_the_board() {
    let pos = setup_position(
        9,
        &["C3", "G7", "C4", "G6", "D3", "F6", "E5", "pass", "E6"],
    );
    let owner = simple_ownership(&pos);
    assert_eq!(owner.len(), 81);
    assert!(owner.iter().all(|o| *o != VertexState::Invalid));
    let (black, white) = count_ownership(&owner);
    assert_eq!(black as i32 - white as i32, compute_score_on_board(&pos, 0));
}

#[test]
fn test_final_score_with_komi() {
    let pos = setup_position(5, &["C3", "pass", "pass"]);
    assert_eq!(compute_score_on_board(&pos, 0), 25);
    assert_eq!(compute_final_score(&pos, 7.5), 17.5);
}

#[test]
fn test_area_score_counts_pass_alive_territory() {
    // Black wall across the board with four single-point eyes above it and
    // a lone White stone in the open area below.
    let pos = setpos(
        7,
        &["A6", "B6", "C6", "D6", "E6", "F6", "G6", "B7", "D7", "F7"],
        &["A3"],
    );
    let alive = compute_pass_alive_area(&pos, Color::Black, true, true);
    assert!(alive[pos.index(0, 6)]);
    assert!(alive[pos.index(0, 5)]);
    assert!(!alive[pos.index(0, 2)]);

    let area = compute_score_area(&pos);
    assert_eq!(area[pos.index(2, 6)], VertexState::Black);
    let safe = compute_safe_area(&pos, false);
    assert!(safe[pos.index(4, 6)]);
}

// =============================================================================
// Ladders
// =============================================================================

#[test]
fn test_ladder_from_text_position() {
    // White C3 in atari, chased towards the top right.
    let pos = setpos(9, &["B3", "C2", "C4", "D2"], &["C3"]);
    let c3 = pos.parse_vertex("C3").unwrap();
    assert!(is_ladder(&pos, c3));
    let map = ladder_map(&pos);
    assert_eq!(map[pos.index(2, 2)], LadderType::Death);
    assert_eq!(map[pos.index(3, 2)], LadderType::Take);
}

// =============================================================================
// Handicap
// =============================================================================

#[test]
fn test_handicap_four_on_19() {
    let mut pos = new_position(19);
    assert!(pos.set_fixed_handicap(4));
    for text in ["D4", "Q16", "D16", "Q4"] {
        let vtx = pos.parse_vertex(text).unwrap();
        assert_eq!(pos.state(vtx), VertexState::Black, "{text}");
    }
    assert_eq!(pos.to_move(), Color::White);
    assert_eq!(pos.move_number(), 0);
    assert_eq!(pos.hash(), pos.compute_hash());
}
