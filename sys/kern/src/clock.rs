// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The pausable virtual clock (spec §4.1).
//!
//! Kept deliberately dumb: `Clock` tracks virtual time and a single pending
//! timeout, but does not itself spawn threads or invoke callbacks. The
//! thing that actually blocks (the runner's sleep primitive) asks `Clock`
//! how long is left and does its own waiting against the shared speed
//! cell, then calls `take_due` to collect the callback if virtual time has
//! in fact advanced past the deadline. This keeps the clock synchronous
//! and trivially testable, the same way the teacher's `kern::time` module
//! is a bare timestamp newtype with no scheduling logic of its own.

use std::time::Instant;

/// A source of wall-clock time, abstracted so tests can supply a fake one.
/// Production code uses [`SystemWallClock`]; this is the same swap-in
/// pattern the teacher uses for `kern::arch` (real hardware vs. the host
/// `simulator` arch).
pub trait WallClock {
    fn now_ms(&self) -> u64;
}

impl<T: WallClock + ?Sized> WallClock for &T {
    fn now_ms(&self) -> u64 {
        (**self).now_ms()
    }
}

pub struct SystemWallClock {
    origin: Instant,
}

impl SystemWallClock {
    pub fn new() -> Self {
        Self { origin: Instant::now() }
    }
}

impl Default for SystemWallClock {
    fn default() -> Self {
        Self::new()
    }
}

impl WallClock for SystemWallClock {
    fn now_ms(&self) -> u64 {
        self.origin.elapsed().as_millis() as u64
    }
}

/// Opaque handle for the one outstanding timeout `Clock` is willing to
/// track; used by callers to confirm the timeout they're polling for is
/// still the one they set (it could have fired and been replaced).
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct TimeoutId(u64);

pub struct Clock<W: WallClock = SystemWallClock> {
    wall: W,
    /// `wall_now - time_origin_ms` is virtual time while running.
    time_origin_ms: i64,
    /// Virtual time banked while paused.
    elapsed_ms: u64,
    running: bool,
    pending: Option<(TimeoutId, u64)>,
    next_id: u64,
}

impl<W: WallClock> Clock<W> {
    pub fn new(wall: W) -> Self {
        let wall_now = wall.now_ms() as i64;
        Self { wall, time_origin_ms: wall_now, elapsed_ms: 0, running: true, pending: None, next_id: 0 }
    }

    fn wall_now_ms(&self) -> i64 {
        self.wall.now_ms() as i64
    }

    /// Virtual milliseconds elapsed since the clock was created.
    pub fn now(&self) -> u64 {
        if self.running {
            (self.wall_now_ms() - self.time_origin_ms).max(0) as u64
        } else {
            self.elapsed_ms
        }
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Freezes virtual time. The pending timeout's remaining delay (in
    /// virtual ms) is preserved, not cancelled.
    pub fn pause(&mut self) {
        if self.running {
            self.elapsed_ms = self.now();
            self.running = false;
        }
    }

    /// Resumes virtual time from wherever it was frozen.
    pub fn start(&mut self) {
        if !self.running {
            self.time_origin_ms = self.wall_now_ms() - self.elapsed_ms as i64;
            self.running = true;
        }
    }

    /// Registers a timeout `delay_ms` of virtual time from now. Only one
    /// timeout may be pending; setting a second while one is unfired
    /// overwrites it and the caller should treat that as a diagnostic
    /// (`Diagnostic::DoubleTimeout`) rather than a panic, per spec §4.1.
    pub fn set_timeout(&mut self, delay_ms: u64) -> (TimeoutId, bool /* was already pending */) {
        let had_pending = self.pending.is_some();
        let id = TimeoutId(self.next_id);
        self.next_id += 1;
        self.pending = Some((id, self.now() + delay_ms));
        (id, had_pending)
    }

    /// How much virtual time remains before `id` fires, if it's still the
    /// pending timeout and hasn't fired yet. `Some(0)` means due now.
    pub fn remaining(&self, id: TimeoutId) -> Option<u64> {
        match self.pending {
            Some((pid, end)) if pid == id => Some(end.saturating_sub(self.now())),
            _ => None,
        }
    }

    /// If `id` is the pending timeout and virtual time has reached its
    /// deadline, clears it and returns `true`. Idempotent: calling this
    /// again for the same `id` after it fired returns `false`.
    pub fn take_due(&mut self, id: TimeoutId) -> bool {
        match self.pending {
            Some((pid, end)) if pid == id && self.now() >= end => {
                self.pending = None;
                true
            }
            _ => false,
        }
    }

    pub fn cancel(&mut self, id: TimeoutId) {
        if matches!(self.pending, Some((pid, _)) if pid == id) {
            self.pending = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    struct FakeWall(Cell<u64>);
    impl WallClock for FakeWall {
        fn now_ms(&self) -> u64 {
            self.0.get()
        }
    }
    impl FakeWall {
        fn advance(&self, ms: u64) {
            self.0.set(self.0.get() + ms);
        }
    }

    #[test]
    fn monotonic_under_pause_resume() {
        let wall = FakeWall(Cell::new(0));
        let mut clk = Clock::new(&wall);
        wall.advance(100);
        assert_eq!(clk.now(), 100);
        clk.pause();
        wall.advance(500);
        assert_eq!(clk.now(), 100, "paused clock must not advance");
        clk.start();
        wall.advance(50);
        assert_eq!(clk.now(), 150);
    }

    #[test]
    fn timeout_fires_only_after_virtual_delay() {
        let wall = FakeWall(Cell::new(0));
        let mut clk = Clock::new(&wall);
        let (id, had_pending) = clk.set_timeout(1000);
        assert!(!had_pending);
        wall.advance(400);
        clk.pause();
        wall.advance(10_000);
        clk.start();
        assert!(!clk.take_due(id), "paused time must not count toward the deadline");
        wall.advance(600);
        assert!(clk.take_due(id));
        assert!(!clk.take_due(id), "firing must be idempotent");
    }

    #[test]
    fn second_timeout_reports_double_set() {
        let wall = FakeWall(Cell::new(0));
        let mut clk = Clock::new(&wall);
        let (_first, had) = clk.set_timeout(10);
        assert!(!had);
        let (_second, had) = clk.set_timeout(20);
        assert!(had, "a second setTimeout while one is pending should be flagged");
    }
}
