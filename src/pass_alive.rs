//! Unconditional life (Benson's algorithm), pass-dead regions and seki.
//!
//! A region is a maximal connected set of points that do not hold a stone of
//! the color under test. A region is vital to an adjacent string when every
//! empty point in it is a liberty of that string. Strings with fewer than two
//! vital regions are discarded, regions touching a discarded string are
//! discarded, and the process repeats until nothing changes. The surviving
//! strings cannot be captured even if their owner always passes.
//!
//! All results are indexed by intersection (`y * board_size + x`).

use crate::position::Position;
use crate::types::{Color, Vertex, VertexState};

const NONE: usize = usize::MAX;

struct Analysis {
    /// Points of each region.
    regions: Vec<Vec<Vertex>>,
    /// Stones of each string of the tested color.
    strings: Vec<Vec<Vertex>>,
    /// Strings bordering each region.
    region_strings: Vec<Vec<usize>>,
    /// Strings for which each region is vital.
    vital_for: Vec<Vec<usize>>,
    region_alive: Vec<bool>,
    string_alive: Vec<bool>,
}

impl Analysis {
    fn new(pos: &Position, color: Color) -> Self {
        let own: VertexState = color.into();
        let nv = pos.num_vertices();

        let mut region_of = vec![NONE; nv];
        let mut regions: Vec<Vec<Vertex>> = Vec::new();
        let mut string_of_root = vec![NONE; nv + 1];
        let mut strings: Vec<Vec<Vertex>> = Vec::new();

        for y in 0..pos.board_size() {
            for x in 0..pos.board_size() {
                let vtx = pos.vertex(x, y);
                let state = pos.state(vtx);
                if state == own {
                    let root = pos.string_root(vtx);
                    if string_of_root[root] == NONE {
                        string_of_root[root] = strings.len();
                        strings.push(pos.string_members(vtx).collect());
                    }
                } else if region_of[vtx] == NONE {
                    let id = regions.len();
                    let mut points = vec![vtx];
                    region_of[vtx] = id;
                    let mut i = 0;
                    while i < points.len() {
                        let p = points[i];
                        for n in pos.neighbours4(p) {
                            let s = pos.state(n);
                            if s != own && s != VertexState::Invalid && region_of[n] == NONE {
                                region_of[n] = id;
                                points.push(n);
                            }
                        }
                        i += 1;
                    }
                    regions.push(points);
                }
            }
        }

        let string_at = |vtx: Vertex| -> usize {
            if pos.state(vtx) == own {
                string_of_root[pos.string_root(vtx)]
            } else {
                NONE
            }
        };

        let mut region_strings = Vec::with_capacity(regions.len());
        let mut vital_for = Vec::with_capacity(regions.len());
        for points in &regions {
            let mut bordering = Vec::new();
            for &p in points {
                for n in pos.neighbours4(p) {
                    let s = string_at(n);
                    if s != NONE && !bordering.contains(&s) {
                        bordering.push(s);
                    }
                }
            }

            let empties: Vec<Vertex> = points
                .iter()
                .copied()
                .filter(|&p| pos.state(p) == VertexState::Empty)
                .collect();
            let vital: Vec<usize> = if empties.is_empty() {
                Vec::new()
            } else {
                bordering
                    .iter()
                    .copied()
                    .filter(|&s| {
                        empties
                            .iter()
                            .all(|&p| pos.neighbours4(p).iter().any(|&n| string_at(n) == s))
                    })
                    .collect()
            };

            region_strings.push(bordering);
            vital_for.push(vital);
        }

        let region_alive = vec![true; regions.len()];
        let string_alive = vec![true; strings.len()];
        Self {
            regions,
            strings,
            region_strings,
            vital_for,
            region_alive,
            string_alive,
        }
    }

    /// Discard strings and regions until a fixed point is reached.
    fn solve(&mut self) {
        loop {
            let mut changed = false;

            let mut vital_count = vec![0usize; self.strings.len()];
            for (r, vital) in self.vital_for.iter().enumerate() {
                if self.region_alive[r] {
                    for &s in vital {
                        vital_count[s] += 1;
                    }
                }
            }
            for (s, alive) in self.string_alive.iter_mut().enumerate() {
                if *alive && vital_count[s] < 2 {
                    *alive = false;
                    changed = true;
                }
            }

            for (r, alive) in self.region_alive.iter_mut().enumerate() {
                if *alive && self.region_strings[r].iter().any(|&s| !self.string_alive[s]) {
                    *alive = false;
                    changed = true;
                }
            }

            if !changed {
                break;
            }
        }
    }

    fn is_vital_region(&self, r: usize) -> bool {
        self.region_alive[r] && self.vital_for[r].iter().any(|&s| self.string_alive[s])
    }
}

/// A region enclosed by pass-alive strings is pass-dead when the opponent
/// cannot build two eyes in it: at most one point, or two adjacent points,
/// are not adjacent to the enclosing color.
fn is_pass_dead_region(pos: &Position, points: &[Vertex], own: VertexState) -> bool {
    let interior: Vec<Vertex> = points
        .iter()
        .copied()
        .filter(|&p| !pos.neighbours4(p).iter().any(|&n| pos.state(n) == own))
        .collect();
    match interior.len() {
        0 | 1 => true,
        2 => pos.is_neighbour(interior[0], interior[1]),
        _ => false,
    }
}

/// Mark the pass-alive strings of `color`. Optionally also mark their vital
/// regions and the pass-dead regions they enclose.
pub fn compute_pass_alive_area(
    pos: &Position,
    color: Color,
    mark_vitals: bool,
    mark_pass_dead: bool,
) -> Vec<bool> {
    let mut result = vec![false; pos.num_intersections()];
    let mut analysis = Analysis::new(pos, color);
    analysis.solve();

    let mut mark = |vtx: Vertex| result[pos.vertex_to_index(vtx)] = true;

    for (s, stones) in analysis.strings.iter().enumerate() {
        if analysis.string_alive[s] {
            stones.iter().for_each(|&v| mark(v));
        }
    }

    let own: VertexState = color.into();
    for (r, points) in analysis.regions.iter().enumerate() {
        if !analysis.region_alive[r] || analysis.region_strings[r].is_empty() {
            continue;
        }
        let vital = analysis.is_vital_region(r);
        if (mark_vitals && vital) || (mark_pass_dead && is_pass_dead_region(pos, points, own)) {
            points.iter().for_each(|&v| mark(v));
        }
    }
    result
}

/// Points neither player needs to play: pass-alive areas of both colors with
/// their vital and pass-dead regions, plus seki points if `mark_seki`.
pub fn compute_safe_area(pos: &Position, mark_seki: bool) -> Vec<bool> {
    let mut result = vec![false; pos.num_intersections()];
    for color in Color::ALL {
        let area = compute_pass_alive_area(pos, color, true, true);
        for (r, a) in result.iter_mut().zip(area) {
            *r |= a;
        }
    }
    if mark_seki {
        let seki = seki_points_outside(pos, &result);
        for (r, s) in result.iter_mut().zip(seki) {
            *r |= s;
        }
    }
    result
}

/// Empty points shared by both colors, outside the safe area, where neither
/// color can play without self-atari.
pub fn compute_seki_points(pos: &Position) -> Vec<bool> {
    let safe = compute_safe_area(pos, false);
    seki_points_outside(pos, &safe)
}

fn seki_points_outside(pos: &Position, safe: &[bool]) -> Vec<bool> {
    let mut result = vec![false; pos.num_intersections()];
    for vtx in pos.empty_vertices() {
        let idx = pos.vertex_to_index(vtx);
        if safe[idx] {
            continue;
        }
        let nbrs = pos.neighbours4(vtx);
        let touches = |color: Color| {
            let s: VertexState = color.into();
            nbrs.iter().any(|&n| pos.state(n) == s)
        };
        if !touches(Color::Black) || !touches(Color::White) {
            continue;
        }
        let blocked = Color::ALL
            .iter()
            .all(|&c| !pos.is_legal_move(vtx, c) || pos.is_self_atari(vtx, c));
        if blocked {
            result[idx] = true;
        }
    }
    result
}
