//! Stone strings as a union-find with cached liberties.
//!
//! Every stone points at the root of its string, and the stones of one
//! string form a circular list through `next`. Vertices that hold no stone
//! point at a sentinel root (index `NUM_VERTICES`) whose liberty count is
//! [`LIBERTIES_RESET`], so neighbor scans never mistake them for a string in
//! atari.

use crate::constants::{LIBERTIES_RESET, NUM_VERTICES};
use crate::types::Vertex;

/// Root that every non-stone vertex points at.
pub const SENTINEL: Vertex = NUM_VERTICES;

const SIZE: usize = NUM_VERTICES + 1;

#[derive(Clone)]
pub struct Strings {
    next: [u16; SIZE],
    parent: [u16; SIZE],
    liberties: [u16; SIZE],
    stones: [u16; SIZE],
}

impl Default for Strings {
    fn default() -> Self {
        Self::new()
    }
}

impl Strings {
    pub fn new() -> Self {
        let mut strings = Self {
            next: [0; SIZE],
            parent: [0; SIZE],
            liberties: [0; SIZE],
            stones: [0; SIZE],
        };
        strings.reset();
        strings
    }

    /// Point every vertex at the sentinel.
    pub fn reset(&mut self) {
        for vtx in 0..SIZE {
            self.next[vtx] = vtx as u16;
            self.parent[vtx] = SENTINEL as u16;
            self.liberties[vtx] = 0;
            self.stones[vtx] = 0;
        }
        self.liberties[SENTINEL] = LIBERTIES_RESET;
    }

    #[inline]
    pub fn parent(&self, vtx: Vertex) -> Vertex {
        self.parent[vtx] as Vertex
    }

    #[inline]
    pub fn next(&self, vtx: Vertex) -> Vertex {
        self.next[vtx] as Vertex
    }

    /// Liberties of the string rooted at `root`.
    #[inline]
    pub fn liberties(&self, root: Vertex) -> usize {
        self.liberties[root] as usize
    }

    /// Number of stones in the string rooted at `root`.
    #[inline]
    pub fn stones(&self, root: Vertex) -> usize {
        self.stones[root] as usize
    }

    /// Start a one-stone string at `vtx` with `liberties`.
    pub(crate) fn create(&mut self, vtx: Vertex, liberties: usize) {
        self.parent[vtx] = vtx as u16;
        self.next[vtx] = vtx as u16;
        self.stones[vtx] = 1;
        self.liberties[vtx] = liberties as u16;
    }

    /// Detach `vtx` from any string.
    pub(crate) fn detach(&mut self, vtx: Vertex) {
        self.parent[vtx] = SENTINEL as u16;
        self.next[vtx] = vtx as u16;
    }

    pub(crate) fn add_liberty(&mut self, root: Vertex) {
        self.liberties[root] += 1;
    }

    pub(crate) fn remove_liberty(&mut self, root: Vertex) {
        debug_assert!(self.liberties[root] > 0);
        self.liberties[root] -= 1;
    }

    /// Reparent every stone of the string rooted at `small` onto `big`.
    ///
    /// `new_liberties` is the number of liberties of `small` that `big` did
    /// not already have; the caller computes it while the two strings are
    /// still distinct.
    pub(crate) fn absorb(&mut self, big: Vertex, small: Vertex, new_liberties: usize) {
        debug_assert_ne!(big, small);
        let mut pos = small;
        loop {
            self.parent[pos] = big as u16;
            pos = self.next(pos);
            if pos == small {
                break;
            }
        }
        self.next.swap(big, small);
        self.stones[big] += self.stones[small];
        self.liberties[big] += new_liberties as u16;
    }

    /// Iterate the stones of the string containing `vtx`.
    pub fn iter(&self, vtx: Vertex) -> StringIter<'_> {
        StringIter {
            strings: self,
            start: vtx,
            current: Some(vtx),
        }
    }
}

/// Iterator over the stones of one string.
pub struct StringIter<'a> {
    strings: &'a Strings,
    start: Vertex,
    current: Option<Vertex>,
}

impl Iterator for StringIter<'_> {
    type Item = Vertex;

    fn next(&mut self) -> Option<Vertex> {
        let vtx = self.current?;
        let next = self.strings.next(vtx);
        self.current = if next == self.start { None } else { Some(next) };
        Some(vtx)
    }
}
