// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Per-part power tracking, feeding the `power{powerTree}` UI message
//! (spec §4.5, §6). Each part that consumes current (`LED`, `RGBLED`,
//! `WS2812`, `Dummy`) reports an instantaneous draw; `PowerTracker` keeps
//! a short running average per part so `avgCurrent` isn't just a copy of
//! the instantaneous value on a noisy (PWM-dimmed) part.

use abi::PowerSnapshot;
use indexmap::IndexMap;

const AVG_WINDOW: usize = 16;

#[derive(Default)]
struct PartPower {
    max: f32,
    history: [f32; AVG_WINDOW],
    next: usize,
    filled: usize,
}

impl PartPower {
    fn record(&mut self, current: f32) -> PowerSnapshot {
        self.max = self.max.max(current);
        self.history[self.next] = current;
        self.next = (self.next + 1) % AVG_WINDOW;
        self.filled = (self.filled + 1).min(AVG_WINDOW);
        let avg = self.history[..self.filled].iter().sum::<f32>() / self.filled as f32;
        PowerSnapshot { current, max_current: self.max, avg_current: avg }
    }
}

#[derive(Default)]
pub struct PowerTracker {
    parts: IndexMap<String, PartPower>,
}

impl PowerTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records this tick's instantaneous draw for `part_id` and returns the
    /// snapshot to attach to its `PartSnapshot`.
    pub fn record(&mut self, part_id: &str, current: f32) -> PowerSnapshot {
        self.parts.entry(part_id.to_string()).or_default().record(current)
    }

    /// The whole tree, in part-insertion order, for the `power` message.
    pub fn tree(&self) -> Vec<PowerSnapshot> {
        self.parts
            .values()
            .map(|p| {
                let avg = p.history[..p.filled].iter().sum::<f32>() / p.filled.max(1) as f32;
                PowerSnapshot { current: p.history[(p.next + AVG_WINDOW - 1) % AVG_WINDOW], max_current: p.max, avg_current: avg }
            })
            .collect()
    }

    pub fn remove_part(&mut self, part_id: &str) {
        self.parts.shift_remove(part_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tracks_peak_and_average() {
        let mut tracker = PowerTracker::new();
        tracker.record("led1", 0.0);
        tracker.record("led1", 0.02);
        let snap = tracker.record("led1", 0.01);
        assert_eq!(snap.max_current, 0.02);
        assert!((snap.avg_current - 0.01).abs() < 1e-6);
    }
}
