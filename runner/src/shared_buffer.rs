// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The shared integer buffer the guest program reads pin state from
//! without round-tripping through a message (spec §4.4, §5).
//!
//! In the browser this is a `SharedArrayBuffer` of `Int32`s, synchronized
//! with `Atomics.wait`/`Atomics.notify`. The native analogue here is an
//! `Arc<[AtomicI32]>` paired with a `Mutex<()>`/`Condvar` used purely as a
//! wakeup signal: every write that should unblock a waiter stores first,
//! then notifies, and every waiter loops checking the atomic rather than
//! trusting the wakeup alone (the usual condvar spurious-wakeup pattern).
//!
//! Layout (spec §4.4, §6):
//! - index 0: task semaphore, incremented by the runner before a message,
//!   decremented by the schematic side once that message is applied.
//! - index 1: speed cell, 1 while running, 0 while paused.
//! - indices 2..256: current numeric pin state (`abi::PinCode`) for pin
//!   numbers 0..254.
//! - indices 256..: per-I2C-bus last transfer status.

use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

const SEMAPHORE: usize = 0;
const SPEED: usize = 1;
const PIN_BASE: usize = 2;
const PIN_COUNT: usize = 254;
const I2C_BASE: usize = PIN_BASE + PIN_COUNT;

pub struct SharedBuffer {
    cells: Vec<AtomicI32>,
    wake: Mutex<()>,
    condvar: Condvar,
}

impl SharedBuffer {
    pub fn new(num_i2c_buses: usize) -> Arc<Self> {
        let len = I2C_BASE + num_i2c_buses;
        let mut cells = Vec::with_capacity(len);
        cells.resize_with(len, || AtomicI32::new(0));
        cells[SPEED].store(1, Ordering::SeqCst);
        Arc::new(Self { cells, wake: Mutex::new(()), condvar: Condvar::new() })
    }

    fn notify_all(&self) {
        let _guard = self.wake.lock().unwrap();
        self.condvar.notify_all();
    }

    // -- task semaphore (spec §4.4, §5) ------------------------------------

    /// Called by the runner before sending a hardware-mutating message.
    pub fn begin_op(&self) {
        self.cells[SEMAPHORE].fetch_add(1, Ordering::SeqCst);
    }

    /// Called by the schematic side once that message has been fully
    /// applied (pin state, if any, already mirrored into the buffer).
    pub fn end_op(&self) {
        self.cells[SEMAPHORE].fetch_sub(1, Ordering::SeqCst);
        self.notify_all();
    }

    /// Blocks (with a safety timeout, since a stuck schematic thread should
    /// never hang the guest forever) until every posted op has been
    /// applied. Every pin read goes through here first, guaranteeing prior
    /// mutations are visible (spec §5 "semaphore quiescence").
    pub fn wait_quiescent(&self) {
        let deadline = Instant::now() + Duration::from_secs(5);
        let mut guard = self.wake.lock().unwrap();
        while self.cells[SEMAPHORE].load(Ordering::SeqCst) != 0 {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            let (next, timed_out) = self.condvar.wait_timeout(guard, deadline - now).unwrap();
            guard = next;
            if timed_out.timed_out() {
                break;
            }
        }
    }

    // -- speed cell (pause/resume, spec §4.1, §4.4, §5) --------------------

    pub fn set_speed(&self, running: bool) {
        self.cells[SPEED].store(running as i32, Ordering::SeqCst);
        self.notify_all();
    }

    pub fn is_running(&self) -> bool {
        self.cells[SPEED].load(Ordering::SeqCst) != 0
    }

    /// The runner's sleep primitive: wait until `deadline` or until the
    /// speed cell flips to paused, whichever comes first. Returns `true`
    /// if the sleep ran to completion (should resume guest execution),
    /// `false` if it was interrupted by a pause (caller should re-arm the
    /// remaining delay once running resumes).
    pub fn wait_running_until(&self, deadline: Instant) -> bool {
        let mut guard = self.wake.lock().unwrap();
        loop {
            if !self.is_running() {
                return false;
            }
            let now = Instant::now();
            if now >= deadline {
                return true;
            }
            let (next, timed_out) = self.condvar.wait_timeout(guard, deadline - now).unwrap();
            guard = next;
            if timed_out.timed_out() {
                return true;
            }
        }
    }

    // -- pin state (spec §4.4, §6) ------------------------------------------

    pub fn pin_state(&self, pin_number: u32) -> i32 {
        self.cells.get(PIN_BASE + pin_number as usize).map(|c| c.load(Ordering::SeqCst)).unwrap_or(0)
    }

    pub fn set_pin_state(&self, pin_number: u32, code: abi::PinCode) {
        if let Some(cell) = self.cells.get(PIN_BASE + pin_number as usize) {
            cell.store(code as i32, Ordering::SeqCst);
            self.notify_all();
        }
    }

    // -- per-I2C-bus last status (spec §4.4) -------------------------------

    pub fn i2c_status(&self, bus: u32) -> i32 {
        self.cells.get(I2C_BASE + bus as usize).map(|c| c.load(Ordering::SeqCst)).unwrap_or(0)
    }

    pub fn set_i2c_status(&self, bus: u32, code: i32) {
        if let Some(cell) = self.cells.get(I2C_BASE + bus as usize) {
            cell.store(code, Ordering::SeqCst);
            self.notify_all();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pin_state_round_trips() {
        let buf = SharedBuffer::new(1);
        buf.set_pin_state(17, abi::PinCode::High);
        assert_eq!(buf.pin_state(17), abi::PinCode::High as i32);
        assert_eq!(buf.pin_state(253), 0);
    }

    #[test]
    fn semaphore_begin_end_tracks_outstanding_ops() {
        let buf = SharedBuffer::new(0);
        buf.begin_op();
        buf.begin_op();
        buf.end_op();
        // One op still outstanding; wait_quiescent should return promptly
        // once the second completes rather than hang the test.
        let buf2 = Arc::clone(&buf);
        let handle = std::thread::spawn(move || buf2.end_op());
        handle.join().unwrap();
        buf.wait_quiescent();
    }
}
