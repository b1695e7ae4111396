//! Go position representation and move execution.
//!
//! This module provides the core board state, including:
//! - A 1D padded board where a border of invalid vertices removes bounds checks
//! - Incremental stone strings with cached liberty counts
//! - Capture, prisoner and ko bookkeeping
//! - Incrementally maintained Zobrist hashes
//! - Coordinates, handicap placement and a text rendering
//!
//! Scoring, pass-alive analysis and ladder reading live in their own modules
//! as free functions over [`Position`].

use std::fmt;
use std::sync::Arc;

use thiserror::Error;

use crate::constants::*;
use crate::strings::{SENTINEL, Strings};
use crate::symmetry::transform_xy;
use crate::types::{Color, Vertex, VertexState};
use crate::zobrist::ZobristTable;

/// Result of attempting to play a checked move.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum MoveError {
    /// Point is not empty
    #[error("illegal move: point not empty")]
    Occupied,
    /// Move violates ko rule
    #[error("illegal move: retakes ko")]
    Ko,
    /// Move would be suicide (no liberties after capture resolution)
    #[error("illegal move: suicide")]
    Suicide,
    /// Vertex is not a point of this board
    #[error("illegal move: vertex is off the board")]
    OffBoard,
}

/// A Go position (board state).
///
/// Storage is sized for the largest board. Positions are cheap to clone and
/// are cloned once per simulated playout; they are only ever mutated forward.
#[derive(Clone)]
pub struct Position {
    zobrist: Arc<ZobristTable>,
    /// Content of every vertex, border included.
    state: [VertexState; NUM_VERTICES],
    /// Packed black/white/empty neighbor counters. Border neighbors count as
    /// both black and white.
    neighbours: [u16; NUM_VERTICES],
    /// Empty vertices, unordered.
    empty: [u16; NUM_VERTICES],
    /// Position of each empty vertex inside `empty`.
    empty_idx: [u16; NUM_VERTICES],
    empty_cnt: usize,
    strings: Strings,
    prisoners: [usize; 2],
    hash: u64,
    ko_hash: u64,
    board_size: usize,
    letter_box_size: usize,
    num_vertices: usize,
    num_intersections: usize,
    /// Offsets: N, E, S, W, then the four diagonals.
    directions: [isize; 8],
    to_move: Color,
    last_move: Vertex,
    ko_move: Vertex,
    passes: usize,
    move_number: usize,
    komi: f32,
}

impl Position {
    /// Create an empty board of `board_size` using the shared Zobrist table.
    ///
    /// # Panics
    /// If `board_size` is outside `MIN_BOARD_SIZE..=MAX_BOARD_SIZE`.
    pub fn new(board_size: usize, zobrist: Arc<ZobristTable>) -> Self {
        let mut pos = Position {
            zobrist,
            state: [VertexState::Invalid; NUM_VERTICES],
            neighbours: [0; NUM_VERTICES],
            empty: [0; NUM_VERTICES],
            empty_idx: [0; NUM_VERTICES],
            empty_cnt: 0,
            strings: Strings::new(),
            prisoners: [0; 2],
            hash: 0,
            ko_hash: 0,
            board_size: 0,
            letter_box_size: 0,
            num_vertices: 0,
            num_intersections: 0,
            directions: [0; 8],
            to_move: Color::Black,
            last_move: NULL_VERTEX,
            ko_move: NULL_VERTEX,
            passes: 0,
            move_number: 0,
            komi: DEFAULT_KOMI,
        };
        pos.reset(board_size);
        pos
    }

    /// Reset to an empty board of `board_size`. Komi is kept.
    pub fn reset(&mut self, board_size: usize) {
        assert!(
            (MIN_BOARD_SIZE..=MAX_BOARD_SIZE).contains(&board_size),
            "unsupported board size {board_size}"
        );
        self.board_size = board_size;
        self.letter_box_size = board_size + 2;
        self.num_vertices = self.letter_box_size * self.letter_box_size;
        self.num_intersections = board_size * board_size;

        let lb = self.letter_box_size as isize;
        self.directions = [-lb, 1, lb, -1, -lb + 1, lb + 1, lb - 1, -lb - 1];

        self.state = [VertexState::Invalid; NUM_VERTICES];
        self.neighbours = [0; NUM_VERTICES];
        self.empty_cnt = 0;
        for y in 0..board_size {
            for x in 0..board_size {
                let vtx = self.vertex(x, y);
                self.state[vtx] = VertexState::Empty;
                self.empty_idx[vtx] = self.empty_cnt as u16;
                self.empty[self.empty_cnt] = vtx as u16;
                self.empty_cnt += 1;
            }
        }
        for y in 0..board_size {
            for x in 0..board_size {
                let vtx = self.vertex(x, y);
                let mut counts = 0u16;
                for n in self.neighbours4(vtx) {
                    counts += match self.state[n] {
                        VertexState::Invalid => {
                            (1 << BLACK_NBR_SHIFT) + (1 << WHITE_NBR_SHIFT)
                        }
                        _ => 1 << EMPTY_NBR_SHIFT,
                    };
                }
                self.neighbours[vtx] = counts;
            }
        }

        self.strings.reset();
        self.prisoners = [0; 2];
        self.to_move = Color::Black;
        self.last_move = NULL_VERTEX;
        self.ko_move = NULL_VERTEX;
        self.passes = 0;
        self.move_number = 0;
        self.hash = self.compute_hash();
        self.ko_hash = self.compute_ko_hash();
    }

    /// Reset to an empty board of the current size.
    pub fn clear(&mut self) {
        self.reset(self.board_size);
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn zobrist(&self) -> &Arc<ZobristTable> {
        &self.zobrist
    }

    pub fn board_size(&self) -> usize {
        self.board_size
    }

    pub fn letter_box_size(&self) -> usize {
        self.letter_box_size
    }

    pub fn num_vertices(&self) -> usize {
        self.num_vertices
    }

    pub fn num_intersections(&self) -> usize {
        self.num_intersections
    }

    pub fn to_move(&self) -> Color {
        self.to_move
    }

    pub fn last_move(&self) -> Vertex {
        self.last_move
    }

    pub fn ko_move(&self) -> Vertex {
        self.ko_move
    }

    pub fn passes(&self) -> usize {
        self.passes
    }

    pub fn move_number(&self) -> usize {
        self.move_number
    }

    pub fn komi(&self) -> f32 {
        self.komi
    }

    pub fn set_komi(&mut self, komi: f32) {
        self.komi = komi;
    }

    /// Stones captured by `color`.
    pub fn prisoners(&self, color: Color) -> usize {
        self.prisoners[color.index()]
    }

    pub fn hash(&self) -> u64 {
        self.hash
    }

    pub fn ko_hash(&self) -> u64 {
        self.ko_hash
    }

    #[inline]
    pub fn state(&self, vtx: Vertex) -> VertexState {
        if vtx < NUM_VERTICES {
            self.state[vtx]
        } else {
            VertexState::Invalid
        }
    }

    #[inline]
    pub fn state_at(&self, x: usize, y: usize) -> VertexState {
        self.state[self.vertex(x, y)]
    }

    /// Number of empty intersections.
    pub fn empty_count(&self) -> usize {
        self.empty_cnt
    }

    /// Iterate the empty intersections in storage order.
    pub fn empty_vertices(&self) -> impl Iterator<Item = Vertex> + '_ {
        self.empty[..self.empty_cnt].iter().map(|&v| v as Vertex)
    }

    pub fn set_to_move(&mut self, color: Color) {
        if color != self.to_move {
            self.hash ^= self.zobrist.white_to_move();
            self.to_move = color;
        }
    }

    pub fn set_move_number(&mut self, number: usize) {
        self.move_number = number;
    }

    pub fn set_last_move(&mut self, vtx: Vertex) {
        self.last_move = vtx;
    }

    // =========================================================================
    // Coordinates
    // =========================================================================

    #[inline]
    pub fn vertex(&self, x: usize, y: usize) -> Vertex {
        debug_assert!(x < self.board_size && y < self.board_size);
        (y + 1) * self.letter_box_size + (x + 1)
    }

    #[inline]
    pub fn index(&self, x: usize, y: usize) -> usize {
        debug_assert!(x < self.board_size && y < self.board_size);
        y * self.board_size + x
    }

    #[inline]
    pub fn x_of(&self, vtx: Vertex) -> usize {
        vtx % self.letter_box_size - 1
    }

    #[inline]
    pub fn y_of(&self, vtx: Vertex) -> usize {
        vtx / self.letter_box_size - 1
    }

    #[inline]
    pub fn vertex_to_index(&self, vtx: Vertex) -> usize {
        self.index(self.x_of(vtx), self.y_of(vtx))
    }

    #[inline]
    pub fn index_to_vertex(&self, idx: usize) -> Vertex {
        self.vertex(idx % self.board_size, idx / self.board_size)
    }

    /// True if `vtx` is a playable point of this board.
    #[inline]
    pub fn is_on_board(&self, vtx: Vertex) -> bool {
        vtx < self.num_vertices && self.state[vtx] != VertexState::Invalid
    }

    /// Parse a coordinate string (e.g. "D4", "pass", "resign").
    ///
    /// Columns use letters A-T skipping I; row 1 is y = 0.
    pub fn parse_vertex(&self, text: &str) -> Option<Vertex> {
        let text = text.trim();
        if text.eq_ignore_ascii_case("pass") {
            return Some(PASS);
        }
        if text.eq_ignore_ascii_case("resign") {
            return Some(RESIGN);
        }

        let bytes = text.as_bytes();
        if bytes.len() < 2 {
            return None;
        }
        let col_char = bytes[0].to_ascii_uppercase();
        if !col_char.is_ascii_uppercase() || col_char == b'I' {
            return None;
        }
        let mut x = (col_char - b'A') as usize;
        if col_char > b'I' {
            x -= 1;
        }
        let row: usize = text[1..].parse().ok()?;
        if x >= self.board_size || row == 0 || row > self.board_size {
            return None;
        }
        Some(self.vertex(x, row - 1))
    }

    /// Convert a vertex to a coordinate string (e.g. "D4").
    pub fn vertex_to_text(&self, vtx: Vertex) -> String {
        match vtx {
            PASS => "pass".into(),
            RESIGN => "resign".into(),
            NULL_VERTEX => "null".into(),
            _ => {
                let x = self.x_of(vtx);
                let mut c = b'A' + x as u8;
                if c >= b'I' {
                    c += 1;
                }
                format!("{}{}", c as char, self.y_of(vtx) + 1)
            }
        }
    }

    // =========================================================================
    // Neighbors and strings
    // =========================================================================

    /// The 4 orthogonal neighbors (N, E, S, W) of a vertex.
    #[inline]
    pub fn neighbours4(&self, vtx: Vertex) -> [Vertex; 4] {
        std::array::from_fn(|k| (vtx as isize + self.directions[k]) as Vertex)
    }

    /// The 4 diagonal neighbors of a vertex.
    #[inline]
    pub fn diagonals(&self, vtx: Vertex) -> [Vertex; 4] {
        std::array::from_fn(|k| (vtx as isize + self.directions[k + 4]) as Vertex)
    }

    #[inline]
    pub fn is_neighbour(&self, vtx: Vertex, avtx: Vertex) -> bool {
        self.neighbours4(vtx).contains(&avtx)
    }

    /// Number of empty orthogonal neighbors.
    #[inline]
    pub fn count_empty_neighbours(&self, vtx: Vertex) -> usize {
        ((self.neighbours[vtx] >> EMPTY_NBR_SHIFT) & NBR_MASK) as usize
    }

    /// True if every orthogonal neighbor is a `color` stone or the border.
    #[inline]
    pub fn is_simple_eye(&self, vtx: Vertex, color: Color) -> bool {
        let shift = match color {
            Color::Black => BLACK_NBR_SHIFT,
            Color::White => WHITE_NBR_SHIFT,
        };
        self.neighbours[vtx] & (4 << shift) != 0
    }

    /// Root of the string containing `vtx`. Non-stones map to the sentinel.
    #[inline]
    pub fn string_root(&self, vtx: Vertex) -> Vertex {
        self.strings.parent(vtx)
    }

    /// Liberties of the string containing `vtx`.
    #[inline]
    pub fn string_liberties(&self, vtx: Vertex) -> usize {
        self.strings.liberties(self.strings.parent(vtx))
    }

    /// Stones in the string containing `vtx` (0 for a non-stone).
    #[inline]
    pub fn string_stones(&self, vtx: Vertex) -> usize {
        if self.state(vtx).is_stone() {
            self.strings.stones(self.strings.parent(vtx))
        } else {
            0
        }
    }

    /// Iterate the stones of the string containing `vtx`.
    pub fn string_members(&self, vtx: Vertex) -> impl Iterator<Item = Vertex> + '_ {
        self.strings.iter(vtx)
    }

    /// Append the liberties of the string at `vtx` to `buf` (skipping ones
    /// already present) and return how many were added.
    pub fn find_string_liberties(&self, vtx: Vertex, buf: &mut Vec<Vertex>) -> usize {
        let mut marked = [false; NUM_VERTICES];
        for &v in buf.iter() {
            if v < NUM_VERTICES {
                marked[v] = true;
            }
        }
        let mut found = 0;
        for stone in self.strings.iter(vtx) {
            for n in self.neighbours4(stone) {
                if self.state[n] == VertexState::Empty && !marked[n] {
                    marked[n] = true;
                    buf.push(n);
                    found += 1;
                }
            }
        }
        found
    }

    /// Append every move that captures an opponent string in atari adjacent
    /// to the string at `vtx`, and return how many were added.
    pub fn find_liberty_gaining_captures(&self, vtx: Vertex, buf: &mut Vec<Vertex>) -> usize {
        let Some(color) = self.state(vtx).color() else {
            return 0;
        };
        let opp: VertexState = color.opponent().into();
        let mut checked = Vec::with_capacity(8);
        let mut found = 0;
        for stone in self.strings.iter(vtx) {
            for n in self.neighbours4(stone) {
                if self.state[n] != opp {
                    continue;
                }
                let root = self.strings.parent(n);
                if checked.contains(&root) {
                    continue;
                }
                checked.push(root);
                if self.strings.liberties(root) == 1 {
                    found += self.find_string_liberties(root, buf);
                }
            }
        }
        found
    }

    // =========================================================================
    // Legality
    // =========================================================================

    /// True if `color` playing at the empty `vtx` would leave its own stone
    /// without liberties and capture nothing.
    pub fn is_suicide(&self, vtx: Vertex, color: Color) -> bool {
        if self.count_empty_neighbours(vtx) > 0 {
            return false;
        }
        let own: VertexState = color.into();
        let opp: VertexState = color.opponent().into();
        for n in self.neighbours4(vtx) {
            let libs = self.string_liberties(n);
            let s = self.state[n];
            if s == own && libs > 1 {
                return false;
            }
            if s == opp && libs == 1 {
                return false;
            }
        }
        true
    }

    /// Return true if the move is legal.
    pub fn is_legal_move(&self, vtx: Vertex, color: Color) -> bool {
        self.is_legal_move_with(vtx, color, |_, _| false)
    }

    /// Legality with an extra `avoid` predicate that can forbid a vertex.
    pub fn is_legal_move_with<F>(&self, vtx: Vertex, color: Color, avoid: F) -> bool
    where
        F: Fn(Vertex, Color) -> bool,
    {
        if vtx == PASS || vtx == RESIGN {
            return true;
        }
        if vtx >= self.num_vertices || self.state[vtx] != VertexState::Empty {
            return false;
        }
        if avoid(vtx, color) {
            return false;
        }
        if color == self.to_move && vtx == self.ko_move {
            return false;
        }
        !self.is_suicide(vtx, color)
    }

    /// Liberties of the string that `color` would form by playing the legal
    /// move `vtx`.
    pub fn liberties_after_move(&self, vtx: Vertex, color: Color) -> usize {
        let mut next = self.clone();
        next.play_move_assume_legal(vtx, color);
        next.string_liberties(vtx)
    }

    /// True if the legal move `vtx` leaves its own string in atari.
    pub fn is_self_atari(&self, vtx: Vertex, color: Color) -> bool {
        self.liberties_after_move(vtx, color) == 1
    }

    // =========================================================================
    // Playing moves
    // =========================================================================

    /// Play a move for the side to move, checking legality first.
    pub fn play_move(&mut self, vtx: Vertex) -> Result<(), MoveError> {
        let color = self.to_move;
        if vtx != PASS && vtx != RESIGN {
            if !self.is_on_board(vtx) {
                return Err(MoveError::OffBoard);
            }
            if self.state[vtx] != VertexState::Empty {
                return Err(MoveError::Occupied);
            }
            if vtx == self.ko_move {
                return Err(MoveError::Ko);
            }
            if self.is_suicide(vtx, color) {
                return Err(MoveError::Suicide);
            }
        }
        self.play_move_assume_legal(vtx, color);
        Ok(())
    }

    /// Play the move assuming it is legal.
    ///
    /// Playing an illegal move is a precondition violation; the resulting
    /// board is unspecified.
    pub fn play_move_assume_legal(&mut self, vtx: Vertex, color: Color) {
        debug_assert!(self.is_legal_move(vtx, color));
        self.set_to_move(color);

        if vtx == PASS || vtx == RESIGN {
            if vtx == PASS {
                self.set_passes(self.passes + 1);
            }
            self.set_ko_move(NULL_VERTEX);
        } else {
            self.set_ko_move(NULL_VERTEX);
            let ko = self.update_board(vtx, color);
            self.set_ko_move(ko);
            self.set_passes(0);
        }

        self.last_move = vtx;
        self.move_number += 1;
        self.set_to_move(color.opponent());
    }

    fn set_ko_move(&mut self, ko: Vertex) {
        if self.ko_move != NULL_VERTEX {
            self.hash ^= self.zobrist.ko(self.ko_move);
        }
        self.ko_move = ko;
        if ko != NULL_VERTEX {
            self.hash ^= self.zobrist.ko(ko);
        }
    }

    fn set_passes(&mut self, passes: usize) {
        self.hash ^= self.zobrist.passes(self.passes);
        self.passes = passes;
        self.hash ^= self.zobrist.passes(passes);
    }

    fn update_zobrist(&mut self, vtx: Vertex, new: VertexState, old: VertexState) {
        let delta = self.zobrist.state(old, vtx) ^ self.zobrist.state(new, vtx);
        self.hash ^= delta;
        self.ko_hash ^= delta;
    }

    fn add_stone(&mut self, vtx: Vertex, color: Color) {
        debug_assert_eq!(self.state[vtx], VertexState::Empty);
        let content: VertexState = color.into();
        self.update_zobrist(vtx, content, VertexState::Empty);
        self.state[vtx] = content;

        let idx = self.empty_idx[vtx] as usize;
        let last = self.empty[self.empty_cnt - 1];
        self.empty[idx] = last;
        self.empty_idx[last as usize] = idx as u16;
        self.empty_cnt -= 1;

        let shift = match color {
            Color::Black => BLACK_NBR_SHIFT,
            Color::White => WHITE_NBR_SHIFT,
        };
        for n in self.neighbours4(vtx) {
            if self.state[n] != VertexState::Invalid {
                self.neighbours[n] += 1 << shift;
                self.neighbours[n] -= 1 << EMPTY_NBR_SHIFT;
            }
        }
    }

    fn remove_stone(&mut self, vtx: Vertex, color: Color) {
        let content: VertexState = color.into();
        debug_assert_eq!(self.state[vtx], content);
        self.update_zobrist(vtx, VertexState::Empty, content);
        self.state[vtx] = VertexState::Empty;

        self.empty_idx[vtx] = self.empty_cnt as u16;
        self.empty[self.empty_cnt] = vtx as u16;
        self.empty_cnt += 1;

        let shift = match color {
            Color::Black => BLACK_NBR_SHIFT,
            Color::White => WHITE_NBR_SHIFT,
        };
        for n in self.neighbours4(vtx) {
            if self.state[n] != VertexState::Invalid {
                self.neighbours[n] += 1 << EMPTY_NBR_SHIFT;
                self.neighbours[n] -= 1 << shift;
            }
        }
    }

    /// Place a stone, update strings and captures. Returns the new ko vertex.
    fn update_board(&mut self, vtx: Vertex, color: Color) -> Vertex {
        self.add_stone(vtx, color);
        self.strings.create(vtx, self.count_empty_neighbours(vtx));

        // The new stone takes one liberty from every distinct adjacent string.
        let mut seen = [SENTINEL; 4];
        let mut n_seen = 0;
        for n in self.neighbours4(vtx) {
            if self.state[n].is_stone() {
                let root = self.strings.parent(n);
                if !seen[..n_seen].contains(&root) {
                    seen[n_seen] = root;
                    n_seen += 1;
                    self.strings.remove_liberty(root);
                }
            }
        }

        let opp = color.opponent();
        let opp_state: VertexState = opp.into();
        let mut captured = 0;
        let mut captured_vtx = NULL_VERTEX;
        for n in self.neighbours4(vtx) {
            if self.state[n] == opp_state && self.string_liberties(n) == 0 {
                captured += self.remove_string(n, opp);
                captured_vtx = n;
            }
        }

        let own_state: VertexState = color.into();
        for n in self.neighbours4(vtx) {
            if self.state[n] != own_state {
                continue;
            }
            let ip = self.strings.parent(vtx);
            let aip = self.strings.parent(n);
            if ip == aip {
                continue;
            }
            if self.strings.stones(ip) >= self.strings.stones(aip) {
                self.merge_strings(ip, aip);
            } else {
                self.merge_strings(aip, ip);
            }
        }

        self.prisoners[color.index()] += captured;

        let root = self.strings.parent(vtx);
        if captured == 1 && self.strings.stones(root) == 1 && self.strings.liberties(root) == 1 {
            captured_vtx
        } else {
            NULL_VERTEX
        }
    }

    /// Merge the string rooted at `small` into the one rooted at `big`.
    fn merge_strings(&mut self, big: Vertex, small: Vertex) {
        let mut marked = [false; NUM_VERTICES];
        let mut new_libs = 0;
        for stone in self.strings.iter(small) {
            for n in self.neighbours4(stone) {
                if self.state[n] != VertexState::Empty || marked[n] {
                    continue;
                }
                marked[n] = true;
                let shared = self
                    .neighbours4(n)
                    .iter()
                    .any(|&m| self.strings.parent(m) == big);
                if !shared {
                    new_libs += 1;
                }
            }
        }
        self.strings.absorb(big, small, new_libs);
    }

    /// Remove the string containing `vtx`. Returns the number of stones.
    fn remove_string(&mut self, vtx: Vertex, color: Color) -> usize {
        let root = self.strings.parent(vtx);
        let mut removed = 0;
        let mut pos = root;
        loop {
            let next = self.strings.next(pos);
            self.remove_stone(pos, color);
            self.strings.detach(pos);

            let mut seen = [SENTINEL; 4];
            let mut n_seen = 0;
            for n in self.neighbours4(pos) {
                if !self.state[n].is_stone() {
                    continue;
                }
                let p = self.strings.parent(n);
                if p != root && !seen[..n_seen].contains(&p) {
                    seen[n_seen] = p;
                    n_seen += 1;
                    self.strings.add_liberty(p);
                }
            }

            removed += 1;
            pos = next;
            if pos == root {
                break;
            }
        }
        removed
    }

    // =========================================================================
    // Hashing
    // =========================================================================

    /// Zobrist hash recomputed from scratch.
    pub fn compute_hash(&self) -> u64 {
        self.compute_hash_with(|vtx| vtx)
    }

    /// Positional (content only) Zobrist hash recomputed from scratch.
    pub fn compute_ko_hash(&self) -> u64 {
        self.compute_ko_hash_with(|vtx| vtx)
    }

    /// Hash of the board as seen through `symmetry`.
    pub fn compute_symmetry_hash(&self, symmetry: usize) -> u64 {
        self.compute_hash_with(|vtx| self.symmetry_vertex(vtx, symmetry))
    }

    /// Positional hash of the board as seen through `symmetry`.
    pub fn compute_symmetry_ko_hash(&self, symmetry: usize) -> u64 {
        self.compute_ko_hash_with(|vtx| self.symmetry_vertex(vtx, symmetry))
    }

    fn symmetry_vertex(&self, vtx: Vertex, symmetry: usize) -> Vertex {
        let (x, y) = transform_xy(self.board_size, symmetry, self.x_of(vtx), self.y_of(vtx));
        self.vertex(x, y)
    }

    fn compute_hash_with<F>(&self, transform: F) -> u64
    where
        F: Fn(Vertex) -> Vertex,
    {
        let mut hash = self.compute_ko_hash_with(&transform);
        if self.to_move == Color::White {
            hash ^= self.zobrist.white_to_move();
        }
        if self.ko_move != NULL_VERTEX {
            hash ^= self.zobrist.ko(transform(self.ko_move));
        }
        hash ^ self.zobrist.passes(self.passes)
    }

    fn compute_ko_hash_with<F>(&self, transform: F) -> u64
    where
        F: Fn(Vertex) -> Vertex,
    {
        let mut hash = self.zobrist.empty();
        for y in 0..self.board_size {
            for x in 0..self.board_size {
                let vtx = self.vertex(x, y);
                hash ^= self.zobrist.state(self.state[vtx], transform(vtx));
            }
        }
        hash
    }

    // =========================================================================
    // Handicap
    // =========================================================================

    /// True if `handicap` fixed stones can be placed on this board.
    pub fn valid_handicap(&self, handicap: usize) -> bool {
        if !(2..=9).contains(&handicap) {
            return false;
        }
        if self.board_size % 2 == 0 && handicap > 4 {
            return false;
        }
        if self.board_size == 7 && handicap > 4 {
            return false;
        }
        self.board_size >= 7
    }

    /// Place fixed handicap stones on the standard star points.
    pub fn set_fixed_handicap(&mut self, handicap: usize) -> bool {
        if !self.valid_handicap(handicap) {
            return false;
        }
        let size = self.board_size;
        let high = if size >= 13 { 3 } else { 2 };
        let mid = size / 2;
        let low = size - 1 - high;

        let mut stones = vec![(low, low), (high, high)];
        if handicap >= 3 {
            stones.push((high, low));
        }
        if handicap >= 4 {
            stones.push((low, high));
        }
        if handicap >= 5 && handicap % 2 == 1 {
            stones.push((mid, mid));
        }
        if handicap >= 6 {
            stones.push((low, mid));
            stones.push((high, mid));
        }
        if handicap >= 8 {
            stones.push((mid, low));
            stones.push((mid, high));
        }
        for (x, y) in stones {
            let vtx = self.vertex(x, y);
            self.play_move_assume_legal(vtx, Color::Black);
        }
        self.finish_handicap();
        true
    }

    /// Place handicap stones on the given vertices. Stops at the first
    /// illegal one and returns false.
    pub fn set_free_handicap(&mut self, vertices: &[Vertex]) -> bool {
        for &vtx in vertices {
            if vtx == PASS || vtx == RESIGN || !self.is_legal_move(vtx, Color::Black) {
                return false;
            }
            self.play_move_assume_legal(vtx, Color::Black);
        }
        self.finish_handicap();
        true
    }

    fn finish_handicap(&mut self) {
        self.set_to_move(Color::White);
        self.set_last_move(NULL_VERTEX);
        self.set_move_number(0);
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let columns: String = (0..self.board_size)
            .map(|x| {
                let mut c = b'A' + x as u8;
                if c >= b'I' {
                    c += 1;
                }
                format!("{} ", c as char)
            })
            .collect();

        writeln!(f, "   {columns}")?;
        for y in (0..self.board_size).rev() {
            write!(f, "{:2} ", y + 1)?;
            for x in 0..self.board_size {
                let vtx = self.vertex(x, y);
                let ch = match self.state[vtx] {
                    VertexState::Black => 'X',
                    VertexState::White => 'O',
                    _ => '.',
                };
                let sep = if vtx == self.last_move { ')' } else { ' ' };
                write!(f, "{ch}{sep}")?;
            }
            writeln!(f, "{:2}", y + 1)?;
        }
        writeln!(f, "   {columns}")?;
        writeln!(
            f,
            "Black prisoners: {}, White prisoners: {}",
            self.prisoners[0], self.prisoners[1]
        )?;
        write!(f, "Hash: {:016X}, Ko hash: {:016X}", self.hash, self.ko_hash)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_position(size: usize) -> Position {
        Position::new(size, Arc::new(ZobristTable::default()))
    }

    fn play(pos: &mut Position, x: usize, y: usize, color: Color) {
        let vtx = pos.vertex(x, y);
        assert!(pos.is_legal_move(vtx, color), "({x},{y}) should be legal");
        pos.play_move_assume_legal(vtx, color);
    }

    #[test]
    fn test_empty_position() {
        let pos = new_position(9);
        assert_eq!(pos.state_at(4, 4), VertexState::Empty);
        assert_eq!(pos.state(0), VertexState::Invalid);
        assert_eq!(pos.empty_count(), 81);
        assert_eq!(pos.move_number(), 0);
        assert_eq!(pos.ko_move(), NULL_VERTEX);
        assert_eq!(pos.to_move(), Color::Black);
    }

    #[test]
    fn test_border_is_invalid() {
        let pos = new_position(9);
        for i in 0..pos.letter_box_size() {
            assert_eq!(pos.state(i), VertexState::Invalid);
            assert_eq!(pos.state(i * pos.letter_box_size()), VertexState::Invalid);
        }
    }

    #[test]
    fn test_center_stone_has_four_liberties() {
        let mut pos = new_position(9);
        let center = pos.vertex(4, 4);
        assert!(pos.is_legal_move(center, Color::Black));
        pos.play_move_assume_legal(center, Color::Black);

        assert_eq!(pos.state(center), VertexState::Black);
        assert_eq!(pos.string_liberties(center), 4);
        assert_eq!(pos.string_stones(center), 1);
        assert_eq!(pos.empty_count(), 80);
        assert_eq!(pos.to_move(), Color::White);
        assert_eq!(pos.move_number(), 1);
    }

    #[test]
    fn test_corner_and_edge_liberties() {
        let mut pos = new_position(9);
        play(&mut pos, 0, 0, Color::Black);
        play(&mut pos, 4, 0, Color::White);
        assert_eq!(pos.string_liberties(pos.vertex(0, 0)), 2);
        assert_eq!(pos.string_liberties(pos.vertex(4, 0)), 3);
    }

    #[test]
    fn test_merge_strings() {
        let mut pos = new_position(9);
        play(&mut pos, 2, 2, Color::Black);
        play(&mut pos, 3, 2, Color::Black);
        assert_eq!(pos.string_liberties(pos.vertex(2, 2)), 6);
        play(&mut pos, 3, 3, Color::Black);
        let v = pos.vertex(3, 3);
        assert_eq!(pos.string_stones(v), 3);
        assert_eq!(pos.string_liberties(v), 7);
        assert_eq!(pos.string_root(v), pos.string_root(pos.vertex(2, 2)));

        // Joining two strings through a shared point.
        play(&mut pos, 5, 2, Color::Black);
        play(&mut pos, 4, 2, Color::Black);
        assert_eq!(pos.string_stones(v), 5);
        let mut libs = Vec::new();
        assert_eq!(pos.find_string_liberties(v, &mut libs), pos.string_liberties(v));
    }

    #[test]
    fn test_capture_single_stone() {
        let mut pos = new_position(9);
        play(&mut pos, 3, 4, Color::Black);
        play(&mut pos, 4, 4, Color::White);
        play(&mut pos, 5, 4, Color::Black);
        play(&mut pos, 0, 0, Color::White);
        play(&mut pos, 4, 3, Color::Black);
        play(&mut pos, 8, 8, Color::White);
        assert_eq!(pos.string_liberties(pos.vertex(4, 4)), 1);

        play(&mut pos, 4, 5, Color::Black);
        assert_eq!(pos.state_at(4, 4), VertexState::Empty);
        assert_eq!(pos.prisoners(Color::Black), 1);
        assert_eq!(pos.prisoners(Color::White), 0);
        assert_eq!(pos.string_liberties(pos.vertex(4, 5)), 4);
        assert_eq!(pos.string_liberties(pos.vertex(3, 4)), 4);
        assert_eq!(pos.ko_move(), NULL_VERTEX);
    }

    #[test]
    fn test_suicide() {
        let mut pos = new_position(9);
        play(&mut pos, 1, 0, Color::Black);
        play(&mut pos, 0, 1, Color::Black);
        pos.set_to_move(Color::White);
        let corner = pos.vertex(0, 0);
        assert!(pos.is_suicide(corner, Color::White));
        assert!(!pos.is_legal_move(corner, Color::White));
        assert_eq!(pos.play_move(corner), Err(MoveError::Suicide));
        // Black may fill its own eye.
        assert!(pos.is_legal_move(corner, Color::Black));
    }

    #[test]
    fn test_occupied() {
        let mut pos = new_position(9);
        let v = pos.vertex(2, 2);
        pos.play_move(v).unwrap();
        assert_eq!(pos.play_move(v), Err(MoveError::Occupied));
        assert_eq!(pos.play_move(0), Err(MoveError::OffBoard));
    }

    #[test]
    fn test_ko_rule() {
        let mut pos = new_position(9);
        play(&mut pos, 1, 2, Color::Black);
        play(&mut pos, 2, 2, Color::White);
        play(&mut pos, 0, 1, Color::Black);
        play(&mut pos, 1, 1, Color::White);
        play(&mut pos, 1, 0, Color::Black);
        play(&mut pos, 3, 1, Color::White);
        play(&mut pos, 7, 7, Color::Black);
        play(&mut pos, 2, 0, Color::White);

        let take = pos.vertex(2, 1);
        pos.play_move(take).unwrap();
        let ko = pos.vertex(1, 1);
        assert_eq!(pos.prisoners(Color::Black), 1);
        assert_eq!(pos.ko_move(), ko);
        assert!(!pos.is_legal_move(ko, Color::White));
        assert_eq!(pos.play_move(ko), Err(MoveError::Ko));

        // After exchanging elsewhere the ko can be retaken.
        pos.play_move(pos.vertex(8, 8)).unwrap();
        pos.play_move(pos.vertex(8, 7)).unwrap();
        assert!(pos.is_legal_move(ko, Color::White));
        pos.play_move(ko).unwrap();
        assert_eq!(pos.state(take), VertexState::Empty);
        assert_eq!(pos.prisoners(Color::White), 1);
        assert_eq!(pos.ko_move(), take);
    }

    #[test]
    fn test_pass_counter() {
        let mut pos = new_position(9);
        pos.play_move(PASS).unwrap();
        assert_eq!(pos.passes(), 1);
        pos.play_move(PASS).unwrap();
        assert_eq!(pos.passes(), 2);
        pos.play_move(pos.vertex(3, 3)).unwrap();
        assert_eq!(pos.passes(), 0);
        assert_eq!(pos.hash(), pos.compute_hash());
    }

    #[test]
    fn test_incremental_hash_matches_recomputed() {
        let mut pos = new_position(9);
        let mut rng = fastrand::Rng::with_seed(7);
        for _ in 0..300 {
            let color = pos.to_move();
            let legal: Vec<Vertex> = pos
                .empty_vertices()
                .filter(|&v| pos.is_legal_move(v, color) && !pos.is_simple_eye(v, color))
                .collect();
            let mv = if legal.is_empty() {
                PASS
            } else {
                legal[rng.usize(..legal.len())]
            };
            pos.play_move_assume_legal(mv, color);
            assert_eq!(pos.hash(), pos.compute_hash());
            assert_eq!(pos.ko_hash(), pos.compute_ko_hash());
            if pos.passes() >= 2 {
                break;
            }
        }
        assert!(pos.move_number() > 20);
    }

    #[test]
    fn test_cached_liberties_match_flood_fill() {
        let mut pos = new_position(7);
        let mut rng = fastrand::Rng::with_seed(11);
        for _ in 0..120 {
            let color = pos.to_move();
            let legal: Vec<Vertex> = pos
                .empty_vertices()
                .filter(|&v| pos.is_legal_move(v, color) && !pos.is_simple_eye(v, color))
                .collect();
            if legal.is_empty() {
                break;
            }
            pos.play_move_assume_legal(legal[rng.usize(..legal.len())], color);
            for y in 0..7 {
                for x in 0..7 {
                    let v = pos.vertex(x, y);
                    if pos.state(v).is_stone() {
                        let mut libs = Vec::new();
                        pos.find_string_liberties(v, &mut libs);
                        assert_eq!(libs.len(), pos.string_liberties(v));
                        assert!(!libs.is_empty());
                    }
                }
            }
        }
    }

    #[test]
    fn test_symmetry_hash_identity() {
        let mut pos = new_position(9);
        pos.play_move(pos.vertex(2, 3)).unwrap();
        assert_eq!(pos.compute_symmetry_hash(0), pos.hash());
        assert_ne!(pos.compute_symmetry_hash(1), pos.hash());
    }

    #[test]
    fn test_symmetry_hash_of_mirrored_board() {
        let table = Arc::new(ZobristTable::default());
        let mut a = Position::new(9, table.clone());
        let mut b = Position::new(9, table);
        a.play_move(a.vertex(2, 3)).unwrap();
        // Mirror of (2, 3) under symmetry 2 (x flipped).
        b.play_move(b.vertex(6, 3)).unwrap();
        assert_eq!(a.compute_symmetry_hash(2), b.hash());
        assert_eq!(a.compute_symmetry_ko_hash(2), b.ko_hash());
    }

    #[test]
    fn test_fixed_handicap_19() {
        let mut pos = new_position(19);
        assert!(pos.set_fixed_handicap(4));
        for (x, y) in [(3, 3), (15, 15), (3, 15), (15, 3)] {
            assert_eq!(pos.state_at(x, y), VertexState::Black);
        }
        assert_eq!(pos.empty_count(), 361 - 4);
        assert_eq!(pos.to_move(), Color::White);
        assert_eq!(pos.move_number(), 0);
        assert_eq!(pos.last_move(), NULL_VERTEX);
        assert_eq!(pos.hash(), pos.compute_hash());
    }

    #[test]
    fn test_invalid_handicap() {
        let mut pos = new_position(9);
        assert!(!pos.set_fixed_handicap(1));
        assert!(!pos.set_fixed_handicap(10));
        let mut even = new_position(8);
        assert!(!even.set_fixed_handicap(5));
        assert!(even.set_fixed_handicap(4));
        let mut tiny = new_position(5);
        assert!(!tiny.set_fixed_handicap(2));
    }

    #[test]
    fn test_free_handicap() {
        let mut pos = new_position(9);
        let stones = [pos.vertex(2, 2), pos.vertex(6, 6)];
        assert!(pos.set_free_handicap(&stones));
        assert_eq!(pos.to_move(), Color::White);
        assert_eq!(pos.move_number(), 0);
        let again = [pos.vertex(2, 2)];
        assert!(!pos.set_free_handicap(&again));
    }

    #[test]
    fn test_parse_vertex_roundtrip() {
        let pos = new_position(19);
        for y in 0..19 {
            for x in 0..19 {
                let vtx = pos.vertex(x, y);
                let text = pos.vertex_to_text(vtx);
                assert_eq!(pos.parse_vertex(&text), Some(vtx), "roundtrip failed for {text}");
            }
        }
        assert_eq!(pos.parse_vertex("pass"), Some(PASS));
        assert_eq!(pos.parse_vertex("Resign"), Some(RESIGN));
        assert_eq!(pos.parse_vertex("I5"), None);
        assert_eq!(pos.parse_vertex("A20"), None);
    }

    #[test]
    fn test_parse_vertex_skips_i() {
        let pos = new_position(9);
        let h5 = pos.parse_vertex("H5").unwrap();
        let j5 = pos.parse_vertex("J5").unwrap();
        assert_eq!(j5 - h5, 1);
        assert_eq!(pos.x_of(j5), 8);
    }

    #[test]
    fn test_display_marks_stones() {
        let mut pos = new_position(9);
        pos.play_move(pos.vertex(0, 8)).unwrap();
        let text = pos.to_string();
        assert!(text.contains("X)"));
        assert!(text.contains("Black prisoners: 0"));
    }
}
