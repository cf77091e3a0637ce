// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! `Dummy`: a constant-current load with no pins, used to model baseline
//! board consumption (spec §4.5) that isn't attributable to any visible
//! part (crystal oscillators, voltage regulators, etc).

use super::{PartCommon, PartCtx};
use crate::pin::PinId;
use crate::wiring::Wiring;
use abi::PartSnapshot;

pub struct Dummy {
    pub common: PartCommon,
    pub current: f32,
}

impl Dummy {
    pub fn new(id: impl Into<String>, human_name: Option<String>, current: f32) -> Self {
        Self { common: PartCommon::new(id, human_name), current }
    }

    pub fn notify_pin_update(&mut self, _pin: PinId, _ctx: &mut PartCtx<'_>) {}

    pub fn get_state(&self, _wiring: &Wiring) -> PartSnapshot {
        PartSnapshot::new(self.common.id.clone())
    }
}
