// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The two [`runner::SchematicBridge`] implementations spec §5/§9 call for:
//! a threaded one (real cross-thread messaging plus the shared buffer) and
//! an inline one (direct calls on the same thread, used "when shared-memory
//! waits are unavailable"). Both present the exact same trait to `runner`,
//! which is the point.

use crate::{apply_host_call, apply_host_op, mirror_pin_changes, SchematicCmd};
use kern::Schematic;
use runner::{HostCall, HostOp, HostReply, SchematicBridge, SharedBuffer};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::Sender;
use std::sync::{Arc, Mutex};

/// Used by the schematic thread: cheap, lock-free virtual-time mirror so
/// `clock_time_get`/`runtime.ticks` don't need a channel round trip for
/// every call (spec §4.6 - both are hot in a guest's sleep loop).
#[derive(Default)]
pub struct NowCache(AtomicU64);

impl NowCache {
    pub fn store(&self, now_ms: u64) {
        self.0.store(now_ms, Ordering::Relaxed);
    }
    pub fn load(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

/// Runner <-> Schematic over a real `std::thread` plus an `mpsc` command
/// channel, with the [`SharedBuffer`] as the fast pin-read path (spec §5
/// "two cooperating single-threaded tasks").
pub struct ThreadedBridge {
    pub cmd_tx: Sender<SchematicCmd>,
    pub shared: Arc<SharedBuffer>,
    pub now: Arc<NowCache>,
}

impl SchematicBridge for ThreadedBridge {
    fn now_ms(&self) -> u64 {
        self.now.load()
    }

    fn post(&self, op: HostOp) {
        self.shared.begin_op();
        let _ = self.cmd_tx.send(SchematicCmd::Apply(op));
    }

    fn wait_quiescent(&self) {
        self.shared.wait_quiescent();
    }

    fn pin_state(&self, _mcu: &str, pin: u32) -> i32 {
        self.shared.pin_state(pin)
    }

    fn call(&self, call: HostCall) -> HostReply {
        self.shared.begin_op();
        let (tx, rx) = std::sync::mpsc::channel();
        if self.cmd_tx.send(SchematicCmd::Call(call, tx)).is_err() {
            return HostReply::Gpio(false);
        }
        rx.recv().unwrap_or(HostReply::Gpio(false))
    }
}

/// Runner and `Schematic` on the same thread, no channel, no blocking:
/// the fallback path for hosts without cross-thread shared-memory waits
/// (spec §5 last paragraph, §9). The `Mutex` here is never contended -
/// both sides run on one thread - it exists only so this type can satisfy
/// `SchematicBridge: Send + Sync` the same as the threaded one.
pub struct InlineBridge {
    pub schematic: Arc<Mutex<Schematic>>,
    pub shared: Arc<SharedBuffer>,
    pub mcu_id: String,
}

impl SchematicBridge for InlineBridge {
    fn now_ms(&self) -> u64 {
        self.schematic.lock().unwrap().now_ms()
    }

    fn post(&self, op: HostOp) {
        let mut s = self.schematic.lock().unwrap();
        apply_host_op(&mut s, op);
        mirror_pin_changes(&mut s, &self.shared, &self.mcu_id);
    }

    fn wait_quiescent(&self) {
        // Nothing is ever in flight: `post` already applied synchronously.
    }

    fn pin_state(&self, _mcu: &str, pin: u32) -> i32 {
        self.shared.pin_state(pin)
    }

    fn call(&self, call: HostCall) -> HostReply {
        let mut s = self.schematic.lock().unwrap();
        let reply = apply_host_call(&mut s, call);
        mirror_pin_changes(&mut s, &self.shared, &self.mcu_id);
        reply
    }
}
