//! Thinking-time budgets checked between playouts.

use std::time::Duration;

use crate::types::Color;

/// Decides when a running search has used its time.
pub trait TimeControl: Send + Sync {
    /// Checked by the workers between playouts.
    fn should_stop(&self, elapsed: Duration, playouts: usize) -> bool;

    /// Report the clock of `color`: `time` left for the next `stones` moves
    /// (0 stones means sudden death).
    fn time_left(&mut self, color: Color, time: Duration, stones: usize);

    /// Called by the search before it starts thinking for `color`.
    fn set_to_move(&mut self, _color: Color) {}
}

/// Never stops a search; the playout budget alone bounds it.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoTimeLimit;

impl TimeControl for NoTimeLimit {
    fn should_stop(&self, _elapsed: Duration, _playouts: usize) -> bool {
        false
    }

    fn time_left(&mut self, _color: Color, _time: Duration, _stones: usize) {}
}

/// A fixed time per move, shortened when a reported clock runs low.
#[derive(Debug, Clone)]
pub struct ConstantTime {
    per_move: Duration,
    lag_buffer: Duration,
    to_move: Color,
    clock: [Option<Duration>; 2],
}

impl ConstantTime {
    pub fn new(per_move: Duration, lag_buffer: Duration) -> Self {
        Self {
            per_move,
            lag_buffer,
            to_move: Color::Black,
            clock: [None; 2],
        }
    }

    /// Time the current move may use.
    pub fn budget(&self) -> Duration {
        let limit = match self.clock[self.to_move.index()] {
            Some(clock) => self.per_move.min(clock),
            None => self.per_move,
        };
        limit.saturating_sub(self.lag_buffer)
    }
}

impl TimeControl for ConstantTime {
    fn should_stop(&self, elapsed: Duration, _playouts: usize) -> bool {
        elapsed >= self.budget()
    }

    fn time_left(&mut self, color: Color, time: Duration, stones: usize) {
        // Sudden death: spread the rest over a nominal 30 moves.
        let moves = if stones == 0 { 30 } else { stones as u32 };
        self.clock[color.index()] = Some(time / moves);
    }

    fn set_to_move(&mut self, color: Color) {
        self.to_move = color;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_time_limit() {
        let tc = NoTimeLimit;
        assert!(!tc.should_stop(Duration::from_secs(3600), 1_000_000));
    }

    #[test]
    fn test_constant_time() {
        let tc = ConstantTime::new(Duration::from_secs(2), Duration::from_millis(500));
        assert!(!tc.should_stop(Duration::from_millis(1400), 10));
        assert!(tc.should_stop(Duration::from_millis(1500), 10));
    }

    #[test]
    fn test_clock_shortens_budget() {
        let mut tc = ConstantTime::new(Duration::from_secs(10), Duration::ZERO);
        tc.set_to_move(Color::White);
        tc.time_left(Color::White, Duration::from_secs(20), 5);
        assert_eq!(tc.budget(), Duration::from_secs(4));
        tc.time_left(Color::Black, Duration::from_secs(600), 0);
        assert_eq!(tc.budget(), Duration::from_secs(4));
        tc.set_to_move(Color::Black);
        assert_eq!(tc.budget(), Duration::from_secs(10));
    }

    #[test]
    fn test_clocks_are_kept_per_color() {
        let mut tc = ConstantTime::new(Duration::from_secs(10), Duration::ZERO);
        tc.time_left(Color::Black, Duration::from_secs(6), 3);
        tc.time_left(Color::White, Duration::from_secs(300), 0);
        tc.set_to_move(Color::Black);
        assert_eq!(tc.budget(), Duration::from_secs(2));
        assert!(tc.should_stop(Duration::from_secs(2), 0));
        tc.set_to_move(Color::White);
        assert!(!tc.should_stop(Duration::from_secs(2), 0));
    }
}
