//! Search tree nodes.
//!
//! A node owns its children through [`Edge`]s. An edge starts as a bare
//! (vertex, prior) pair and is inflated into a boxed node the first time the
//! selection picks it, so the tree has a single owner per node and no parent
//! pointers; a playout remembers its own descent path instead.
//!
//! Nodes are shared by all search threads. Counters are atomics, the
//! expansion and validity states are atomic enums moved only by the named
//! transitions below, and backed-up statistics change under a per-node
//! update lock.

use std::fmt::Write as _;
use std::sync::OnceLock;
use std::sync::atomic::{AtomicU8, AtomicU32, Ordering};

use parking_lot::Mutex;

use crate::constants::{NULL_VERTEX, PASS, VIRTUAL_LOSS_COUNT};
use crate::evaluator::{EvalError, Evaluator, NetEval};
use crate::parameters::Parameters;
use crate::pass_alive::compute_safe_area;
use crate::position::Position;
use crate::scoring::simple_ownership;
use crate::types::{Color, Vertex, VertexState};

/// Prior variance blended into the LCB of lightly visited children.
const DEFAULT_VARIANCE: f32 = 1.0;

/// z for a two-sided 95% interval.
const Z_95: f32 = 1.96;

// ============================================================================
// AtomicF32
// ============================================================================

/// f32 stored as bits in an `AtomicU32`.
#[derive(Debug)]
struct AtomicF32(AtomicU32);

impl AtomicF32 {
    fn new(value: f32) -> Self {
        Self(AtomicU32::new(value.to_bits()))
    }

    #[inline]
    fn load(&self) -> f32 {
        f32::from_bits(self.0.load(Ordering::Acquire))
    }

    fn fetch_add(&self, value: f32) -> f32 {
        let mut current = self.0.load(Ordering::Relaxed);
        loop {
            let new = (f32::from_bits(current) + value).to_bits();
            match self
                .0
                .compare_exchange_weak(current, new, Ordering::AcqRel, Ordering::Relaxed)
            {
                Ok(old) => return f32::from_bits(old),
                Err(actual) => current = actual,
            }
        }
    }
}

// ============================================================================
// Evaluations
// ============================================================================

/// One backed-up sample, from Black's point of view.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeEvals {
    pub black_final_score: f32,
    pub black_wl: f32,
    pub draw: f32,
    pub black_ownership: Vec<f32>,
}

impl NodeEvals {
    pub fn from_net(net: &NetEval) -> Self {
        Self {
            black_final_score: net.black_final_score,
            black_wl: net.black_winrate,
            draw: net.draw,
            black_ownership: net.black_ownership.clone(),
        }
    }

    /// Exact result of a finished game (two passes), scored by area.
    pub fn from_gameover(pos: &Position) -> Self {
        debug_assert!(pos.passes() >= 2);
        let mut black_score = 0i32;
        let black_ownership = simple_ownership(pos)
            .into_iter()
            .map(|owner| match owner {
                VertexState::Black => {
                    black_score += 1;
                    1.0
                }
                VertexState::White => {
                    black_score -= 1;
                    -1.0
                }
                _ => 0.0,
            })
            .collect();

        let black_final_score = black_score as f32 - pos.komi();
        let (black_wl, draw) = if black_final_score > 1e-4 {
            (1.0, 0.0)
        } else if black_final_score < -1e-4 {
            (0.0, 0.0)
        } else {
            (0.5, 1.0)
        };
        Self {
            black_final_score,
            black_wl,
            draw,
            black_ownership,
        }
    }
}

/// Raw evaluator numbers kept on an expanded node.
#[derive(Debug, Clone, Copy)]
struct NetSummary {
    to_move: Color,
    black_wl: f32,
    draw: f32,
    black_final_score: f32,
}

// ============================================================================
// States
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ExpandState {
    Initial = 0,
    Expanding = 1,
    Expanded = 2,
}

impl ExpandState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => ExpandState::Initial,
            1 => ExpandState::Expanding,
            _ => ExpandState::Expanded,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Status {
    Active = 0,
    /// Removed from selection by policy target pruning.
    Pruned = 1,
    /// The move turned out to be illegal on the board it was reached from.
    Invalid = 2,
}

impl Status {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => Status::Active,
            1 => Status::Pruned,
            _ => Status::Invalid,
        }
    }
}

// ============================================================================
// Edge
// ============================================================================

/// A move out of a node and the subtree behind it, inflated lazily.
pub struct Edge {
    vertex: Vertex,
    policy: f32,
    node: OnceLock<Box<Node>>,
}

impl Edge {
    fn new(vertex: Vertex, policy: f32) -> Self {
        Self {
            vertex,
            policy,
            node: OnceLock::new(),
        }
    }

    pub fn vertex(&self) -> Vertex {
        self.vertex
    }

    pub fn policy(&self) -> f32 {
        self.policy
    }

    /// The child node, if it has been inflated.
    pub fn get(&self) -> Option<&Node> {
        self.node.get().map(|n| &**n)
    }

    /// The child node, inflating it on first use.
    pub fn inflate(&self) -> &Node {
        self.node
            .get_or_init(|| Box::new(Node::new(self.vertex, self.policy)))
    }

    fn is_active(&self) -> bool {
        self.get().is_none_or(Node::is_active)
    }

    fn visits(&self) -> u32 {
        self.get().map_or(0, Node::visits)
    }

    fn visits_in_flight(&self) -> u32 {
        self.get()
            .map_or(0, |n| n.visits() + n.running_threads())
    }
}

// ============================================================================
// Node
// ============================================================================

pub struct Node {
    vertex: Vertex,
    policy: f32,
    net: OnceLock<NetSummary>,

    expand_state: AtomicU8,
    status: AtomicU8,

    visits: AtomicU32,
    running_threads: AtomicU32,

    squared_eval_diff: AtomicF32,
    accumulated_black_fs: AtomicF32,
    accumulated_black_wl: AtomicF32,
    accumulated_draw: AtomicF32,
    /// Summed ownership. The mutex doubles as the update lock.
    accumulated_ownership: Mutex<Vec<f32>>,

    children: OnceLock<Box<[Edge]>>,
    gumbel_noise: OnceLock<Box<[f32]>>,
    gumbel_sequence: OnceLock<Box<[usize]>>,
}

impl Node {
    pub fn new(vertex: Vertex, policy: f32) -> Self {
        Self {
            vertex,
            policy,
            net: OnceLock::new(),
            expand_state: AtomicU8::new(ExpandState::Initial as u8),
            status: AtomicU8::new(Status::Active as u8),
            visits: AtomicU32::new(0),
            running_threads: AtomicU32::new(0),
            squared_eval_diff: AtomicF32::new(1e-4),
            accumulated_black_fs: AtomicF32::new(0.0),
            accumulated_black_wl: AtomicF32::new(0.0),
            accumulated_draw: AtomicF32::new(0.0),
            accumulated_ownership: Mutex::new(Vec::new()),
            children: OnceLock::new(),
            gumbel_noise: OnceLock::new(),
            gumbel_sequence: OnceLock::new(),
        }
    }

    /// A fresh root node.
    pub fn root() -> Self {
        Self::new(NULL_VERTEX, 1.0)
    }

    pub fn vertex(&self) -> Vertex {
        self.vertex
    }

    pub fn policy(&self) -> f32 {
        self.policy
    }

    pub fn visits(&self) -> u32 {
        self.visits.load(Ordering::Acquire)
    }

    pub fn running_threads(&self) -> u32 {
        self.running_threads.load(Ordering::Acquire)
    }

    /// Side to move at this node, known once expanded.
    pub fn to_move(&self) -> Option<Color> {
        self.net.get().map(|n| n.to_move)
    }

    pub fn increment_threads(&self) {
        self.running_threads.fetch_add(1, Ordering::AcqRel);
    }

    pub fn decrement_threads(&self) {
        let prev = self.running_threads.fetch_sub(1, Ordering::AcqRel);
        debug_assert!(prev > 0);
    }

    // ------------------------------------------------------------------------
    // Expansion state
    // ------------------------------------------------------------------------

    pub fn expand_state(&self) -> ExpandState {
        ExpandState::from_u8(self.expand_state.load(Ordering::Acquire))
    }

    /// Initial -> Expanding. Exactly one caller wins.
    pub fn try_begin_expansion(&self) -> bool {
        self.expand_state
            .compare_exchange(
                ExpandState::Initial as u8,
                ExpandState::Expanding as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }

    /// Expanding -> Expanded.
    pub fn complete_expansion(&self) {
        let prev = self
            .expand_state
            .swap(ExpandState::Expanded as u8, Ordering::AcqRel);
        debug_assert_eq!(prev, ExpandState::Expanding as u8);
    }

    /// Expanding -> Initial.
    pub fn cancel_expansion(&self) {
        let prev = self
            .expand_state
            .swap(ExpandState::Initial as u8, Ordering::AcqRel);
        debug_assert_eq!(prev, ExpandState::Expanding as u8);
    }

    /// Block until no expansion is in progress.
    pub fn wait_expanded(&self) {
        while self.expand_state() == ExpandState::Expanding {
            std::hint::spin_loop();
            std::thread::yield_now();
        }
    }

    pub fn is_expanding(&self) -> bool {
        self.expand_state() == ExpandState::Expanding
    }

    pub fn is_expanded(&self) -> bool {
        self.expand_state() == ExpandState::Expanded
    }

    // ------------------------------------------------------------------------
    // Validity state
    // ------------------------------------------------------------------------

    pub fn status(&self) -> Status {
        Status::from_u8(self.status.load(Ordering::Acquire))
    }

    pub fn is_active(&self) -> bool {
        self.status() == Status::Active
    }

    pub fn is_valid(&self) -> bool {
        self.status() != Status::Invalid
    }

    /// Active <-> Pruned. Invalid nodes stay invalid.
    pub fn set_active(&self, active: bool) {
        let (from, to) = if active {
            (Status::Pruned, Status::Active)
        } else {
            (Status::Active, Status::Pruned)
        };
        let _ = self.status.compare_exchange(
            from as u8,
            to as u8,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
    }

    pub fn invalidate(&self) {
        self.status.store(Status::Invalid as u8, Ordering::Release);
    }

    // ------------------------------------------------------------------------
    // Children
    // ------------------------------------------------------------------------

    /// Child edges, sorted by prior. Empty until expanded.
    pub fn children(&self) -> &[Edge] {
        self.children.get().map(|c| &c[..]).unwrap_or(&[])
    }

    pub fn has_children(&self) -> bool {
        !self.children().is_empty()
    }

    /// The inflated child for `vertex`, if any.
    pub fn child(&self, vertex: Vertex) -> Option<&Node> {
        self.children()
            .iter()
            .find(|e| e.vertex == vertex)
            .and_then(Edge::get)
    }

    /// Detach the subtree behind `vertex`, for reuse as a new root.
    pub fn take_child(&mut self, vertex: Vertex) -> Option<Box<Node>> {
        self.children
            .get_mut()?
            .iter_mut()
            .find(|e| e.vertex == vertex)?
            .node
            .take()
    }

    /// Evaluate `pos` and create one edge per candidate move.
    ///
    /// Candidates are the legal moves outside the safe area plus pass, with
    /// priors renormalised over them. Returns `Ok(None)` when another thread
    /// already owns the expansion. An evaluator failure rolls the node back
    /// to `Initial`.
    pub fn expand_children<E: Evaluator + ?Sized>(
        &self,
        evaluator: &E,
        pos: &Position,
        params: &Parameters,
        is_root: bool,
    ) -> Result<Option<NodeEvals>, EvalError> {
        if !self.try_begin_expansion() {
            return Ok(None);
        }

        let net = match evaluator
            .evaluate(pos, None)
            .and_then(|net| net.check_shape(pos.num_intersections()).map(|_| net))
        {
            Ok(net) => net,
            Err(e) => {
                self.cancel_expansion();
                return Err(e);
            }
        };

        let color = pos.to_move();
        let temp = if is_root {
            params.root_policy_temp
        } else {
            params.policy_temp
        };
        let inv_temp = 1.0 / temp;
        let safe = compute_safe_area(pos, false);

        let mut nodelist: Vec<(f32, Vertex)> = Vec::with_capacity(pos.empty_count() + 1);
        for vtx in pos.empty_vertices() {
            let idx = pos.vertex_to_index(vtx);
            if safe[idx] || !pos.is_legal_move(vtx, color) {
                continue;
            }
            nodelist.push((net.policy[idx].max(0.0).powf(inv_temp), vtx));
        }
        // Empty vertices are stored unordered; fix a board order first.
        nodelist.sort_by_key(|&(_, vtx)| vtx);
        nodelist.push((net.pass_policy.max(0.0).powf(inv_temp), PASS));

        let legal_accum: f32 = nodelist.iter().map(|(p, _)| p).sum();
        if legal_accum > 0.0 {
            nodelist.iter_mut().for_each(|(p, _)| *p /= legal_accum);
        } else {
            let uniform = 1.0 / nodelist.len() as f32;
            nodelist.iter_mut().for_each(|(p, _)| *p = uniform);
        }
        nodelist.sort_by(|a, b| b.0.total_cmp(&a.0));

        let edges: Box<[Edge]> = nodelist
            .into_iter()
            .map(|(p, vtx)| Edge::new(vtx, p))
            .collect();

        let _ = self.net.set(NetSummary {
            to_move: color,
            black_wl: net.black_winrate,
            draw: net.draw,
            black_final_score: net.black_final_score,
        });
        let _ = self.children.set(edges);
        self.complete_expansion();

        Ok(Some(NodeEvals::from_net(&net)))
    }

    // ------------------------------------------------------------------------
    // Statistics
    // ------------------------------------------------------------------------

    /// Back up one sample. Visits are incremented last.
    pub fn update(&self, evals: &NodeEvals) {
        let mut ownership = self.accumulated_ownership.lock();

        let old_visits = self.visits.load(Ordering::Acquire);
        let eval = evals.black_wl;
        let old_acc = self.accumulated_black_wl.load();
        let old_delta = if old_visits > 0 {
            eval - old_acc / old_visits as f32
        } else {
            0.0
        };
        let new_delta = eval - (old_acc + eval) / (old_visits + 1) as f32;
        self.squared_eval_diff.fetch_add(old_delta * new_delta);

        self.accumulated_black_wl.fetch_add(eval);
        self.accumulated_draw.fetch_add(evals.draw);
        self.accumulated_black_fs.fetch_add(evals.black_final_score);

        if ownership.len() < evals.black_ownership.len() {
            ownership.resize(evals.black_ownership.len(), 0.0);
        }
        for (acc, o) in ownership.iter_mut().zip(&evals.black_ownership) {
            *acc += o;
        }

        self.visits.fetch_add(1, Ordering::Release);
    }

    fn virtual_loss(&self) -> u32 {
        self.running_threads() * VIRTUAL_LOSS_COUNT
    }

    /// Mean win rate for `color`, optionally pessimised by in-flight
    /// playouts.
    pub fn get_eval(&self, color: Color, use_virtual_loss: bool) -> f32 {
        let mut visits = self.visits() as f32;
        let mut accumulated = self.accumulated_black_wl.load();
        if use_virtual_loss {
            let vl = self.virtual_loss() as f32;
            visits += vl;
            if color == Color::White {
                accumulated += vl;
            }
        }
        if visits <= 0.0 {
            return self.get_net_eval(color);
        }
        let eval = accumulated / visits;
        match color {
            Color::Black => eval,
            Color::White => 1.0 - eval,
        }
    }

    pub fn get_draw(&self) -> f32 {
        let visits = self.visits();
        if visits == 0 {
            return self.get_net_draw();
        }
        self.accumulated_draw.load() / visits as f32
    }

    pub fn get_final_score(&self, color: Color) -> f32 {
        let visits = self.visits();
        if visits == 0 {
            return self.get_net_final_score(color);
        }
        let score = self.accumulated_black_fs.load() / visits as f32;
        match color {
            Color::Black => score,
            Color::White => -score,
        }
    }

    /// Mean ownership per intersection from `color`'s view.
    pub fn get_ownership(&self, color: Color) -> Vec<f32> {
        let ownership = self.accumulated_ownership.lock();
        let visits = self.visits().max(1) as f32;
        let sign = match color {
            Color::Black => 1.0,
            Color::White => -1.0,
        };
        ownership.iter().map(|o| sign * o / visits).collect()
    }

    pub fn get_net_eval(&self, color: Color) -> f32 {
        let wl = self.net.get().map_or(0.5, |n| n.black_wl);
        match color {
            Color::Black => wl,
            Color::White => 1.0 - wl,
        }
    }

    pub fn get_net_draw(&self) -> f32 {
        self.net.get().map_or(0.0, |n| n.draw)
    }

    pub fn get_net_final_score(&self, color: Color) -> f32 {
        let score = self.net.get().map_or(0.0, |n| n.black_final_score);
        match color {
            Color::Black => score,
            Color::White => -score,
        }
    }

    fn score_utility(&self, color: Color, factor: f32, div: f32, parent_score: f32) -> f32 {
        factor * ((self.get_final_score(color) - parent_score) / div).tanh()
    }

    // ------------------------------------------------------------------------
    // Selection
    // ------------------------------------------------------------------------

    /// Child with the highest PUCT value for `color`.
    ///
    /// Ties keep the prior order.
    pub fn uct_select_child(&self, color: Color, is_root: bool, params: &Parameters) -> Option<&Node> {
        let children = self.children();

        let mut parent_visits = 0u32;
        let mut total_visited_policy = 0.0f32;
        for edge in children {
            if let Some(node) = edge.get() {
                if node.is_valid() {
                    let visits = node.visits();
                    parent_visits += visits;
                    if visits > 0 {
                        total_visited_policy += edge.policy;
                    }
                }
            }
        }

        let cpuct = if params.cpuct_dynamic {
            params.cpuct_init
                + params.cpuct_base_factor
                    * ((parent_visits as f32 + params.cpuct_base + 1.0) / params.cpuct_base).ln()
        } else {
            params.cpuct_init
        };
        let numerator = (parent_visits as f32).sqrt();
        let reduction = if is_root {
            params.fpu_root_reduction
        } else {
            params.fpu_reduction
        };
        let fpu_reduction = reduction * total_visited_policy.sqrt();
        let fpu_value = self.get_net_eval(color) - fpu_reduction;
        let parent_score = self.get_final_score(color);

        let mut best: Option<&Edge> = None;
        let mut best_value = f32::MIN;
        for edge in children {
            let node = edge.get();
            if node.is_some_and(|n| !n.is_active()) {
                continue;
            }

            let mut q_value = fpu_value;
            let mut denom = 1.0;
            let mut utility = 0.0;
            if let Some(node) = node {
                if node.is_expanding() {
                    q_value = -1.0 - fpu_reduction;
                } else if node.visits() > 0 {
                    q_value = node.get_eval(color, true) + node.get_draw() * params.draw_factor;
                    utility = node.score_utility(
                        color,
                        params.score_utility_factor,
                        params.score_utility_div,
                        parent_score,
                    );
                }
                denom += (node.visits() + node.virtual_loss()) as f32;
            }

            let puct = cpuct * edge.policy * (numerator / denom);
            let value = q_value + puct + utility;
            if value > best_value {
                best_value = value;
                best = Some(edge);
            }
        }

        best.map(Edge::inflate)
    }

    /// Child with the highest prior.
    pub fn prob_select_child(&self) -> Option<&Node> {
        let mut best: Option<&Edge> = None;
        for edge in self.children() {
            if edge.is_active() && best.is_none_or(|b| edge.policy > b.policy) {
                best = Some(edge);
            }
        }
        best.map(Edge::inflate)
    }

    fn gumbel_noise(&self) -> &[f32] {
        self.gumbel_noise.get_or_init(|| {
            self.children()
                .iter()
                .map(|_| {
                    let u = fastrand::f64().clamp(1e-12, 1.0 - 1e-12);
                    -(-u.ln()).ln() as f32
                })
                .collect()
        })
    }

    /// Sequential-halving schedule, built on the first root selection.
    fn gumbel_sequence(&self, params: &Parameters) -> &[usize] {
        self.gumbel_sequence.get_or_init(|| {
            let considered = params.gumbel_considered_moves.min(self.children().len());
            considered_visit_sequence(considered, params.gumbel_playouts).into_boxed_slice()
        })
    }

    /// g + logit + sigma(completed Q) for every child.
    fn gumbel_scores(&self, color: Color, params: &Parameters) -> Vec<f32> {
        let children = self.children();
        let noise = self.gumbel_noise();
        let max_visits = children.iter().map(Edge::visits).max().unwrap_or(0) as f32;
        let sigma_scale = (params.gumbel_c_visit + max_visits) * params.gumbel_c_scale;
        let mixed_value = self.get_eval(color, false);

        children
            .iter()
            .zip(noise)
            .map(|(edge, g)| {
                let q = match edge.get() {
                    Some(node) if node.visits() > 0 => node.get_eval(color, false),
                    _ => mixed_value,
                };
                g + edge.policy.max(1e-8).ln() + sigma_scale * q
            })
            .collect()
    }

    /// Root selection by sequential halving over Gumbel-perturbed priors.
    ///
    /// Falls back to PUCT once `gumbel_playouts` have been spent.
    pub fn gumbel_select_child(&self, color: Color, params: &Parameters) -> Option<&Node> {
        let children = self.children();
        let total: usize = children.iter().map(|e| e.visits_in_flight() as usize).sum();
        if total >= params.gumbel_playouts {
            return self.uct_select_child(color, true, params);
        }

        let target = self.gumbel_sequence(params)[total] as u32;
        let scores = self.gumbel_scores(color, params);

        let mut best: Option<usize> = None;
        for (i, edge) in children.iter().enumerate() {
            if !edge.is_active() || edge.visits_in_flight() != target {
                continue;
            }
            if best.is_none_or(|b| scores[i] > scores[b]) {
                best = Some(i);
            }
        }
        match best {
            Some(i) => Some(children[i].inflate()),
            None => self.uct_select_child(color, true, params),
        }
    }

    /// Final Gumbel action: the best score among the most visited children.
    pub fn gumbel_best_move(&self, color: Color, params: &Parameters) -> Vertex {
        let children = self.children();
        let scores = self.gumbel_scores(color, params);
        let max_visits = children
            .iter()
            .filter(|e| e.is_active())
            .map(Edge::visits)
            .max()
            .unwrap_or(0);

        let mut best: Option<usize> = None;
        for (i, edge) in children.iter().enumerate() {
            if !edge.is_active() || edge.visits() != max_visits {
                continue;
            }
            if best.is_none_or(|b| scores[i] > scores[b]) {
                best = Some(i);
            }
        }
        best.map_or(PASS, |i| children[i].vertex)
    }

    /// Pick a child with probability proportional to `visits^(1/temp)`
    /// among those with at least `min_visits`.
    pub fn randomize_first_proportionally(&self, temp: f32, min_visits: u32) -> Option<Vertex> {
        let inv_temp = 1.0 / temp.max(1e-3) as f64;
        let mut accum = 0.0f64;
        let mut table = Vec::new();
        for edge in self.children() {
            let visits = edge.visits();
            if !edge.is_active() || visits == 0 || visits < min_visits {
                continue;
            }
            accum += (visits as f64).powf(inv_temp);
            table.push((accum, edge.vertex));
        }
        let &(_, last) = table.last()?;
        let pick = fastrand::f64() * accum;
        Some(
            table
                .iter()
                .find(|(bound, _)| pick < *bound)
                .map_or(last, |&(_, vtx)| vtx),
        )
    }

    /// Mark children whose visits are explained by forced exploration alone
    /// as pruned: `visits - sqrt(2 * prior * total) <= 1`.
    pub fn policy_target_pruning(&self) {
        let children = self.children();
        let total: u32 = children
            .iter()
            .filter(|e| e.is_active())
            .map(Edge::visits)
            .sum();
        let Some(best) = self.most_visited_edge() else {
            return;
        };

        for edge in children {
            let Some(node) = edge.get() else {
                continue;
            };
            if std::ptr::eq(edge, best) || !node.is_active() || node.visits() == 0 {
                continue;
            }
            let forced = (2.0 * edge.policy * total as f32).sqrt();
            if node.visits() as f32 - forced <= 1.0 {
                node.set_active(false);
            }
        }
    }

    fn most_visited_edge(&self) -> Option<&Edge> {
        let mut best: Option<&Edge> = None;
        for edge in self.children() {
            if !edge.is_active() || edge.visits() == 0 {
                continue;
            }
            if best.is_none_or(|b| edge.visits() > b.visits()) {
                best = Some(edge);
            }
        }
        best
    }

    // ------------------------------------------------------------------------
    // Move choice
    // ------------------------------------------------------------------------

    fn variance(&self, default_var: f32, visits: u32) -> f32 {
        let v = visits as f32;
        let blend = 1.0 / v.max(1.0);
        let sample = if visits > 1 {
            self.squared_eval_diff.load() / (v - 1.0)
        } else {
            default_var
        };
        (1.0 - blend) * sample + blend * default_var
    }

    /// Lower confidence bound of the win rate for `color`.
    pub fn lcb(&self, color: Color) -> f32 {
        let visits = self.visits();
        if visits < 2 {
            return -1.0e6 + visits as f32;
        }
        let mean = self.get_eval(color, false);
        let stddev = (self.variance(DEFAULT_VARIANCE, visits) / visits as f32).sqrt();
        mean - student_t_95(visits - 1) * stddev
    }

    /// `(lcb, vertex)` of children with enough visits, best first.
    pub fn lcb_list(&self, color: Color, params: &Parameters) -> Vec<(f32, Vertex)> {
        let children = self.children();
        let max_visits = children
            .iter()
            .filter(|e| e.is_active())
            .map(Edge::visits)
            .max()
            .unwrap_or(0);
        let threshold = ((params.lcb_min_visit_ratio * max_visits as f32) as u32).max(2);

        let mut list: Vec<(f32, Vertex)> = children
            .iter()
            .filter_map(|edge| {
                let node = edge.get()?;
                (node.is_active() && node.visits() >= threshold)
                    .then(|| (node.lcb(color), edge.vertex))
            })
            .collect();
        list.sort_by(|a, b| b.0.total_cmp(&a.0));
        list
    }

    /// The most visited child whose LCB is within `lcb_reduction` of the best
    /// LCB. Falls back to raw visits, then to the highest prior.
    pub fn best_move(&self, params: &Parameters) -> Vertex {
        let color = self.to_move().unwrap_or(Color::Black);
        let lcbs = self.lcb_list(color, params);
        if let Some(&(best_lcb, _)) = lcbs.first() {
            let mut best: Option<(u32, Vertex)> = None;
            for &(lcb, vtx) in &lcbs {
                if lcb < best_lcb - params.lcb_reduction {
                    continue;
                }
                let visits = self.child(vtx).map_or(0, Node::visits);
                if best.is_none_or(|(v, _)| visits > v) {
                    best = Some((visits, vtx));
                }
            }
            if let Some((_, vtx)) = best {
                return vtx;
            }
        }
        if let Some(edge) = self.most_visited_edge() {
            return edge.vertex;
        }
        self.children()
            .iter()
            .find(|e| e.is_active())
            .map_or(PASS, |e| e.vertex)
    }

    // ------------------------------------------------------------------------
    // Reporting
    // ------------------------------------------------------------------------

    /// Principal variation following the most visited children.
    pub fn pv_string(&self, pos: &Position) -> String {
        let mut pos = pos.clone();
        let mut node = self;
        let mut moves = Vec::new();
        while let Some(edge) = node.most_visited_edge() {
            let color = pos.to_move();
            if !pos.is_legal_move(edge.vertex, color) {
                break;
            }
            moves.push(pos.vertex_to_text(edge.vertex));
            pos.play_move_assume_legal(edge.vertex, color);
            match edge.get() {
                Some(next) => node = next,
                None => break,
            }
        }
        moves.join(" ")
    }

    /// One line per visited child.
    pub fn to_verbose_string(&self, pos: &Position, params: &Parameters) -> String {
        let color = pos.to_move();
        let mut out = String::new();
        let _ = writeln!(
            out,
            "Root -> {:7} (WL: {:5.2}%) (Score: {:.2})",
            self.visits(),
            100.0 * self.get_eval(color, false),
            self.get_final_score(color)
        );

        let mut edges: Vec<&Edge> = self
            .children()
            .iter()
            .filter(|e| e.visits() > 0)
            .collect();
        edges.sort_by_key(|e| std::cmp::Reverse(e.visits()));

        let lcbs = self.lcb_list(color, params);
        for edge in edges {
            let Some(node) = edge.get() else {
                continue;
            };
            let lcb = lcbs
                .iter()
                .find(|(_, v)| *v == edge.vertex)
                .map_or(0.0, |(l, _)| l.max(0.0));
            let mut next = pos.clone();
            next.play_move_assume_legal(edge.vertex, color);
            let _ = writeln!(
                out,
                "  {:>6} -> {:7} (WL: {:5.2}%) (LCB: {:5.2}%) (D: {:5.2}%) (P: {:5.2}%) (S: {:6.2}) {}| PV: {} {}",
                pos.vertex_to_text(edge.vertex),
                node.visits(),
                100.0 * node.get_eval(color, false),
                100.0 * lcb,
                100.0 * node.get_draw(),
                100.0 * edge.policy,
                node.get_final_score(color),
                if node.is_active() { "" } else { "(pruned) " },
                pos.vertex_to_text(edge.vertex),
                node.pv_string(&next),
            );
        }
        out
    }
}

/// Two-sided 95% Student-t quantile, Cornish-Fisher expansion around z.
fn student_t_95(dof: u32) -> f32 {
    let v = dof.max(1) as f32;
    let z = Z_95;
    let z3 = z * z * z;
    let z5 = z3 * z * z;
    let z7 = z5 * z * z;
    z + (z3 + z) / (4.0 * v)
        + (5.0 * z5 + 16.0 * z3 + 3.0 * z) / (96.0 * v * v)
        + (3.0 * z7 + 19.0 * z5 + 17.0 * z3 - 15.0 * z) / (384.0 * v * v * v)
}

/// Target visit count of the next root simulation under sequential halving.
fn considered_visit_sequence(max_considered: usize, num_simulations: usize) -> Vec<usize> {
    if max_considered <= 1 {
        return (0..num_simulations).collect();
    }
    let log2max = (usize::BITS - (max_considered - 1).leading_zeros()) as usize;
    let mut sequence = Vec::with_capacity(num_simulations);
    let mut visits = vec![0usize; max_considered];
    let mut num_considered = max_considered;
    while sequence.len() < num_simulations {
        let extra = (num_simulations / (log2max * num_considered)).max(1);
        for _ in 0..extra {
            sequence.extend_from_slice(&visits[..num_considered]);
            for v in &mut visits[..num_considered] {
                *v += 1;
            }
        }
        num_considered = (num_considered / 2).max(2);
    }
    sequence.truncate(num_simulations);
    sequence
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evaluator::UniformEvaluator;
    use crate::zobrist::ZobristTable;
    use std::sync::Arc;

    fn new_position(size: usize) -> Position {
        Position::new(size, Arc::new(ZobristTable::default()))
    }

    fn sample(black_wl: f32, n: usize) -> NodeEvals {
        NodeEvals {
            black_final_score: 0.0,
            black_wl,
            draw: 0.0,
            black_ownership: vec![0.0; n],
        }
    }

    struct FailingEvaluator;

    impl Evaluator for FailingEvaluator {
        fn evaluate(&self, _: &Position, _: Option<usize>) -> Result<NetEval, EvalError> {
            Err(EvalError::Backend("offline".into()))
        }
    }

    #[test]
    fn test_expansion_state_machine() {
        let node = Node::root();
        assert_eq!(node.expand_state(), ExpandState::Initial);
        assert!(node.try_begin_expansion());
        assert!(!node.try_begin_expansion());
        node.cancel_expansion();
        assert_eq!(node.expand_state(), ExpandState::Initial);
        assert!(node.try_begin_expansion());
        node.complete_expansion();
        node.wait_expanded();
        assert!(node.is_expanded());
        assert!(!node.try_begin_expansion());
    }

    #[test]
    fn test_expand_children() {
        let pos = new_position(5);
        let params = Parameters::default();
        let node = Node::root();
        let evals = node
            .expand_children(&UniformEvaluator::default(), &pos, &params, true)
            .unwrap()
            .unwrap();
        assert_eq!(evals.black_ownership.len(), 25);
        assert!(node.is_expanded());
        assert_eq!(node.children().len(), 26);
        assert_eq!(node.to_move(), Some(Color::Black));
        let total: f32 = node.children().iter().map(Edge::policy).sum();
        assert!((total - 1.0).abs() < 1e-4);
        assert!(node.children().iter().any(|e| e.vertex() == PASS));
        // A second expansion attempt is a no-op.
        assert!(node
            .expand_children(&UniformEvaluator::default(), &pos, &params, true)
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_failed_expansion_rolls_back() {
        let pos = new_position(5);
        let node = Node::root();
        let result = node.expand_children(&FailingEvaluator, &pos, &Parameters::default(), true);
        assert!(result.is_err());
        assert_eq!(node.expand_state(), ExpandState::Initial);
        assert!(!node.has_children());
    }

    #[test]
    fn test_update_accumulates() {
        let node = Node::root();
        node.update(&sample(1.0, 4));
        node.update(&sample(0.0, 4));
        assert_eq!(node.visits(), 2);
        assert!((node.get_eval(Color::Black, false) - 0.5).abs() < 1e-6);
        assert!((node.get_eval(Color::White, false) - 0.5).abs() < 1e-6);
        assert_eq!(node.get_ownership(Color::Black).len(), 4);
    }

    #[test]
    fn test_virtual_loss_pessimises_both_colors() {
        let node = Node::root();
        node.update(&sample(0.5, 1));
        node.increment_threads();
        assert!(node.get_eval(Color::Black, true) < 0.5);
        assert!(node.get_eval(Color::White, true) < 0.5);
        node.decrement_threads();
        assert!((node.get_eval(Color::Black, true) - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_first_selection_follows_prior() {
        let pos = new_position(5);
        let params = Parameters::default();
        let node = Node::root();
        let evals = node
            .expand_children(&UniformEvaluator::default(), &pos, &params, true)
            .unwrap()
            .unwrap();
        node.update(&evals);
        let first = node.children()[0].vertex();
        let child = node.uct_select_child(Color::Black, true, &params).unwrap();
        assert_eq!(child.vertex(), first);
    }

    #[test]
    fn test_selection_skips_pruned_and_invalid() {
        let pos = new_position(5);
        let params = Parameters::default();
        let node = Node::root();
        let evals = node
            .expand_children(&UniformEvaluator::default(), &pos, &params, true)
            .unwrap()
            .unwrap();
        node.update(&evals);
        let first = node.children()[0].inflate();
        first.invalidate();
        let second = node.children()[1].inflate();
        second.set_active(false);
        assert_eq!(second.status(), Status::Pruned);
        let chosen = node.uct_select_child(Color::Black, true, &params).unwrap();
        assert_ne!(chosen.vertex(), first.vertex());
        assert_ne!(chosen.vertex(), second.vertex());
        // Invalid nodes never come back.
        first.set_active(true);
        assert_eq!(first.status(), Status::Invalid);
    }

    #[test]
    fn test_best_move_prefers_visits() {
        let pos = new_position(5);
        let params = Parameters::default();
        let node = Node::root();
        node.expand_children(&UniformEvaluator::default(), &pos, &params, true)
            .unwrap();

        // No visits: highest prior.
        assert_eq!(node.best_move(&params), node.children()[0].vertex());

        let a = node.children()[3].inflate();
        let b = node.children()[4].inflate();
        for _ in 0..40 {
            a.update(&sample(0.6, 25));
        }
        for _ in 0..5 {
            b.update(&sample(0.6, 25));
        }
        assert_eq!(node.best_move(&params), a.vertex());
        assert_eq!(node.lcb_list(Color::Black, &params)[0].1, a.vertex());
    }

    #[test]
    fn test_take_child() {
        let pos = new_position(5);
        let params = Parameters::default();
        let mut node = Node::root();
        node.expand_children(&UniformEvaluator::default(), &pos, &params, true)
            .unwrap();
        let vtx = node.children()[2].vertex();
        node.children()[2].inflate().update(&sample(1.0, 25));
        let child = node.take_child(vtx).unwrap();
        assert_eq!(child.vertex(), vtx);
        assert_eq!(child.visits(), 1);
        assert!(node.child(vtx).is_none());
        assert!(node.take_child(PASS).is_none());
    }

    #[test]
    fn test_gameover_evals() {
        let mut pos = new_position(5);
        pos.play_move(pos.vertex(2, 2)).unwrap();
        pos.play_move(PASS).unwrap();
        pos.play_move(PASS).unwrap();
        let evals = NodeEvals::from_gameover(&pos);
        assert_eq!(evals.black_final_score, 25.0 - pos.komi());
        assert_eq!(evals.black_wl, 1.0);
        let sum: f32 = evals.black_ownership.iter().sum();
        assert_eq!(sum - pos.komi(), evals.black_final_score);
    }

    #[test]
    fn test_student_t_shrinks_with_dof() {
        assert!(student_t_95(1) > student_t_95(10));
        assert!(student_t_95(10) > student_t_95(1000));
        assert!((student_t_95(100_000) - Z_95).abs() < 1e-3);
    }

    #[test]
    fn test_considered_visit_sequence() {
        let seq = considered_visit_sequence(4, 16);
        assert_eq!(seq.len(), 16);
        assert_eq!(&seq[..4], &[0, 0, 0, 0]);
        assert!(seq.windows(2).all(|w| w[1] + 1 >= w[0]));
        assert_eq!(considered_visit_sequence(1, 3), vec![0, 1, 2]);
    }

    #[test]
    fn test_gumbel_visits_considered_moves_first() {
        let pos = new_position(5);
        let params = Parameters {
            gumbel: true,
            gumbel_considered_moves: 4,
            gumbel_playouts: 16,
            ..Parameters::default()
        };
        let node = Node::root();
        let evals = node
            .expand_children(&UniformEvaluator::default(), &pos, &params, true)
            .unwrap()
            .unwrap();
        node.update(&evals);

        let mut picked = Vec::new();
        for _ in 0..4 {
            let child = node.gumbel_select_child(Color::Black, &params).unwrap();
            child.update(&sample(0.5, 25));
            picked.push(child.vertex());
        }
        picked.sort();
        picked.dedup();
        assert_eq!(picked.len(), 4);
    }

    #[test]
    fn test_gumbel_sequence_built_once() {
        let pos = new_position(5);
        let params = Parameters {
            gumbel: true,
            gumbel_considered_moves: 4,
            gumbel_playouts: 16,
            ..Parameters::default()
        };
        let node = Node::root();
        let evals = node
            .expand_children(&UniformEvaluator::default(), &pos, &params, true)
            .unwrap()
            .unwrap();
        node.update(&evals);
        assert!(node.gumbel_sequence.get().is_none());

        let first = node.gumbel_sequence(&params);
        assert_eq!(first, &considered_visit_sequence(4, 16)[..]);
        node.gumbel_select_child(Color::Black, &params).unwrap();
        assert!(std::ptr::eq(first, node.gumbel_sequence(&params)));
    }
}
