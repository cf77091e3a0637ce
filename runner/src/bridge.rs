// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The seam between a running guest program and the schematic it's
//! attached to (spec §4.6, §5, §9 "explicit task + atomic shared buffer").
//!
//! `Runner` never touches `kern::Schematic` directly - that coupling lives
//! in `worker`, which implements this trait two ways: a threaded bridge
//! (real cross-thread messaging plus the shared buffer) and an inline one
//! (direct calls, used when cross-thread blocking isn't available). Either
//! way the host ABI dispatch in `host.rs` is identical, per the design
//! note that motivated this split.

use abi::{GpioConfigureCode, I2cError};

/// Every hardware-mutating operation a guest host call can cause (spec
/// §4.6). Mutating ops are fire-and-forget from the guest's point of view:
/// `SchematicBridge::post` only guarantees the op is *queued*, not applied;
/// a subsequent read waits on the shared buffer's semaphore to be sure it
/// already landed (spec §5).
#[derive(Clone, Debug)]
pub enum HostOp {
    GpioConfigure { mcu: String, pin: u32, mode: GpioConfigureCode },
    GpioSet { mcu: String, pin: u32, high: bool },
    PwmConfigure { mcu: String, pin: u32, period_ms: f64 },
    PwmSetDuty { mcu: String, pin: u32, duty_cycle: f64 },
    SpiConfigure { mcu: String, bus: u32, sck: u32, sdo: u32, sdi: u32, as_controller: bool },
    I2cConfigure { mcu: String, bus: u32, scl: u32, sda: u32 },
    Ws2812Write { mcu: String, pin: u32, bytes: Vec<u8> },
}

/// A blocking request-response operation (spec §4.3): the guest needs the
/// actual transfer result, not just pin state, so these cannot be
/// satisfied by reading the shared buffer alone.
#[derive(Clone, Debug)]
pub enum HostCall {
    SpiTransferByte { mcu: String, bus: u32, byte: u8 },
    I2cTransfer { mcu: String, bus: u32, address: u8, write: Vec<u8>, read_len: usize },
}

#[derive(Clone, Debug)]
pub enum HostReply {
    Gpio(bool),
    SpiByte(u8),
    I2c(I2cError, Vec<u8>),
}

/// The two blocking points a guest host call may hit (spec §5): posting a
/// mutation never blocks the caller past enqueueing it, but a read must
/// wait for every prior mutation to have taken effect first.
pub trait SchematicBridge: Send + Sync {
    /// Current virtual time in milliseconds (spec §4.1 `Clock::now`), used
    /// by `clock_time_get` and `runtime.ticks`.
    fn now_ms(&self) -> u64;

    /// Enqueues `op`. Returns once the op is queued - not necessarily
    /// applied - bumping the task semaphore so a subsequent read can wait
    /// on it to drain.
    fn post(&self, op: HostOp);

    /// Blocks until the task semaphore reaches zero, i.e. every op posted
    /// so far has been applied by the schematic side (spec §5 "semaphore
    /// quiescence").
    fn wait_quiescent(&self);

    /// Direct shared-buffer read of a pin's numeric state (spec §4.4); the
    /// caller is expected to have called `wait_quiescent` first if a
    /// just-posted mutation needs to be visible.
    fn pin_state(&self, mcu: &str, pin: u32) -> i32;

    /// A true round-trip call: waits for quiescence, performs `call`
    /// against the live schematic, and returns its result (spec §4.3 SPI
    /// byte transfer, I2C transfer).
    fn call(&self, call: HostCall) -> HostReply;
}
