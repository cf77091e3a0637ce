// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! `Board`: a passive connector block (spec §4.5). Exposes whatever pins
//! its config lists, plus a fixed `vcc` (driven high) and `gnd` (driven
//! low). It never reacts to a pin update; it's a label on a set of nets.

use super::{PartCommon, PartCtx};
use crate::pin::{PinId, PinMode};
use crate::wiring::Wiring;
use abi::{ElectricalState, PartSnapshot};

pub struct Board {
    pub common: PartCommon,
}

impl Board {
    pub fn new(id: impl Into<String>, human_name: Option<String>, pin_names: &[String], wiring: &mut Wiring) -> Self {
        let id = id.into();
        let mut common = PartCommon::new(id.clone(), human_name);
        for name in pin_names {
            let pid = wiring.alloc_pin(id.clone(), name.clone(), PinMode::Gpio);
            common.pins.insert(name.clone(), pid);
        }
        let vcc = wiring.alloc_pin(id.clone(), "vcc", PinMode::Power);
        wiring.pin_mut(vcc).set_state(ElectricalState::High, None);
        common.pins.insert("vcc".into(), vcc);
        let gnd = wiring.alloc_pin(id.clone(), "gnd", PinMode::Power);
        wiring.pin_mut(gnd).set_state(ElectricalState::Low, None);
        common.pins.insert("gnd".into(), gnd);
        Self { common }
    }

    pub fn notify_pin_update(&mut self, _pin: PinId, _ctx: &mut PartCtx<'_>) {}

    pub fn get_state(&self, _wiring: &Wiring) -> PartSnapshot {
        PartSnapshot::new(self.common.id.clone())
    }
}

