// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Simulation kernel.
//!
//! This is the part of the board simulator that owns the electrical model:
//! pins, nets, wires and the fixed set of simulated parts, plus the
//! `Schematic` that ties them together and is the only thing callers touch.
//! Nothing in here talks to wasmtime, a thread, or the outside world; that's
//! the `runner`/`worker` crates' job, which depend on this one.
//!
//! # Design principles
//!
//! 1. `Schematic` is the sole owner of topology mutation. Parts describe
//!    their electrical behavior; only `Schematic` calls `Wiring::rebuild`/
//!    `update_net_of` and fans out `notify_pin_update`.
//! 2. Nothing in here is fatal. Malformed input becomes a `Diagnostic` in
//!    the ring buffer, never a panic.
//! 3. A preference for simple and clear algorithms over fast and clever
//!    ones - there's no hot loop here that needs either.

pub mod bus;
pub mod clock;
pub mod net;
pub mod parts;
pub mod pin;
pub mod power;
pub mod schematic;
pub mod wiring;

pub use clock::{Clock, SystemWallClock, WallClock};
pub use schematic::Schematic;
