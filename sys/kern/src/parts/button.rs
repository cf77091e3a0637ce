// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! `Button`: two terminals that become an ohmic link while pressed (spec
//! §4.5, scenario §8.3).

use super::{PartCommon, PartCtx};
use crate::pin::{PinId, PinMode};
use crate::wiring::Wiring;
use abi::{ElectricalState, InputEvent, PartSnapshot};

pub struct Button {
    pub common: PartCommon,
    pressed: bool,
    /// Virtual-clock ms of the last accepted event, for the duplicate-DOM-
    /// event debounce the original guards against (SPEC_FULL §4.5).
    last_event_ms: Option<(u64, bool)>,
}

impl Button {
    pub fn new(id: impl Into<String>, human_name: Option<String>, wiring: &mut Wiring) -> Self {
        let id = id.into();
        let mut common = PartCommon::new(id.clone(), human_name);
        let a = wiring.alloc_pin(id.clone(), "A", PinMode::Gpio);
        let b = wiring.alloc_pin(id.clone(), "B", PinMode::Gpio);
        common.pins.insert("A".into(), a);
        common.pins.insert("B".into(), b);
        Self { common, pressed: false, last_event_ms: None }
    }

    pub fn notify_pin_update(&mut self, _pin: PinId, _ctx: &mut PartCtx<'_>) {}

    pub fn handle_input(&mut self, event: InputEvent, wiring: &mut Wiring, now_ms: u64) -> Vec<PinId> {
        let pressed = matches!(event, InputEvent::Press);
        if self.last_event_ms == Some((now_ms, pressed)) {
            return Vec::new(); // duplicate event in the same virtual ms; idempotent.
        }
        self.last_event_ms = Some((now_ms, pressed));
        if self.pressed == pressed {
            return Vec::new();
        }
        self.pressed = pressed;
        let state = if pressed { ElectricalState::Connected } else { ElectricalState::Floating };
        let a = self.common.pin("A");
        let b = self.common.pin("B");
        wiring.pin_mut(a).set_state(state, None);
        wiring.pin_mut(b).set_state(state, None);
        self.common.mark_update();
        vec![a, b]
    }

    /// The extra union `Schematic` must feed into `Wiring::rebuild`'s
    /// `bridges` list while this button is held down (spec §4.2: a
    /// pressed button joins its two terminals into one net, which is a
    /// topology change `Net.updateState` alone can't express).
    pub fn bridge(&self) -> Option<(PinId, PinId)> {
        self.pressed.then(|| (self.common.pin("A"), self.common.pin("B")))
    }

    pub fn get_state(&self, _wiring: &Wiring) -> PartSnapshot {
        let mut snap = PartSnapshot::new(self.common.id.clone());
        snap.properties = Some(if self.pressed { "pressed".into() } else { "released".into() });
        snap
    }
}
