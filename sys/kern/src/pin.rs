// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Pins: the electrical terminals owned by parts (spec §3, §4.2).

use abi::{Diagnostic, ElectricalState, PwmExtra};

pub type PinId = u32;
pub type NetId = u32;

/// How a pin is currently being used, orthogonal to its electrical state.
/// Determines whether it is a net *input* (receives `notify_pin_update`)
/// or an active participant in net resolution.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum PinMode {
    /// General-purpose; driven or read depending on `Pin::is_output`.
    Gpio,
    SpiSckOut,
    SpiSckIn,
    SpiSdoOut,
    SpiSdiIn,
    I2cScl,
    I2cSda,
    Ws2812Din,
    Ws2812Dout,
    /// Fixed rail (vcc/gnd on a `Board`); always an output, never configured.
    Power,
}

/// A single named terminal of a part. Created exactly once, alongside its
/// owning part, and lives as long as the part (spec §3 Lifecycle).
#[derive(Clone, Debug)]
pub struct Pin {
    pub part_id: String,
    pub name: String,
    pub mode: PinMode,
    pub is_output: bool,
    pub state: ElectricalState,
    pub extra: Option<PwmExtra>,
    pub net: Option<NetId>,
    /// The net state last delivered to this pin via `notify_pin_update`,
    /// used to detect whether a rebuild or incremental resolution actually
    /// changed anything worth notifying an input pin about.
    pub last_resolved: Option<ElectricalState>,
}

impl Pin {
    pub fn new(part_id: impl Into<String>, name: impl Into<String>, mode: PinMode) -> Self {
        let is_output = matches!(mode, PinMode::Power);
        let state = ElectricalState::Floating;
        Self {
            part_id: part_id.into(),
            name: name.into(),
            mode,
            is_output,
            state,
            extra: None,
            net: None,
            last_resolved: None,
        }
    }

    /// Sets this pin's drive state directly; does not itself touch the net
    /// (the arena owner calls `Wiring::pin_state_changed` after this, since
    /// a pin doesn't borrow its own net here). Valid even before the pin
    /// has been placed into a net (spec §4.2 "during construction").
    pub fn set_state(&mut self, state: ElectricalState, extra: Option<PwmExtra>) {
        self.state = state;
        self.extra = extra;
    }

    /// The convenience `set(high)` form, valid only for outputs (spec §3).
    /// Returns a diagnostic instead of mutating when called on an input.
    pub fn set_level(&mut self, high: bool) -> Result<(), Diagnostic> {
        if !self.is_output {
            return Err(Diagnostic::SetOnInput);
        }
        self.state = if high { ElectricalState::High } else { ElectricalState::Low };
        self.extra = None;
        Ok(())
    }

    pub fn configure(&mut self, is_output: bool, idle_pull: ElectricalState) {
        self.is_output = is_output;
        if !is_output {
            self.state = idle_pull;
            self.extra = None;
        }
    }
}
