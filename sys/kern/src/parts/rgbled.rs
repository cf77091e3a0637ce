// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! `RGBLED`: common-anode RGB LED, each channel lit while its cathode is
//! pulled low (spec §4.5).

use super::{PartCommon, PartCtx};
use crate::pin::{PinId, PinMode};
use crate::wiring::Wiring;
use abi::{ElectricalState, PartSnapshot};
use std::collections::BTreeMap;

const CHANNELS: [&str; 3] = ["cathode_r", "cathode_g", "cathode_b"];

pub struct RgbLed {
    pub common: PartCommon,
    pub channel_current: [f32; 3],
}

impl RgbLed {
    pub fn new(id: impl Into<String>, human_name: Option<String>, channel_current: [f32; 3], wiring: &mut Wiring) -> Self {
        let id = id.into();
        let mut common = PartCommon::new(id.clone(), human_name);
        let anode = wiring.alloc_pin(id.clone(), "anode", PinMode::Gpio);
        common.pins.insert("anode".into(), anode);
        for name in CHANNELS {
            let pid = wiring.alloc_pin(id.clone(), name, PinMode::Gpio);
            common.pins.insert(name.into(), pid);
        }
        Self { common, channel_current }
    }

    pub fn notify_pin_update(&mut self, _pin: PinId, _ctx: &mut PartCtx<'_>) {
        self.common.mark_update();
    }

    fn channel_duty(&self, wiring: &Wiring, pin_name: &str) -> f64 {
        let pin = self.common.pin(pin_name);
        match wiring.net_state(pin) {
            ElectricalState::Low => 1.0,
            ElectricalState::Pwm => 1.0 - wiring.net_extra(pin).map(|e| e.duty_cycle).unwrap_or(0.0),
            _ => 0.0,
        }
    }

    pub fn current_draw(&self, wiring: &Wiring) -> f32 {
        CHANNELS
            .iter()
            .zip(self.channel_current)
            .map(|(name, nominal)| nominal * self.channel_duty(wiring, name) as f32)
            .sum()
    }

    pub fn get_state(&self, wiring: &Wiring) -> PartSnapshot {
        let mut snap = PartSnapshot::new(self.common.id.clone());
        let [r, g, b] = [
            (self.channel_duty(wiring, "cathode_r") * 255.0) as u8,
            (self.channel_duty(wiring, "cathode_g") * 255.0) as u8,
            (self.channel_duty(wiring, "cathode_b") * 255.0) as u8,
        ];
        let mut css = BTreeMap::new();
        css.insert("background-color".to_string(), format!("rgb({r},{g},{b})"));
        snap.css_properties = Some(css);
        snap
    }
}
