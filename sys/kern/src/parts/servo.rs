// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! `Servo`: maps a PWM control pulse to a target angle and animates
//! toward it at a fixed angular speed (spec §4.5).

use super::{PartCommon, PartCtx};
use crate::pin::{PinId, PinMode};
use crate::wiring::Wiring;
use abi::{ElectricalState, PartSnapshot};
use std::collections::BTreeMap;

const PERIOD_RANGE_MS: (f64, f64) = (3.0, 100.0);
const PULSE_RANGE_MS: (f64, f64) = (0.8, 2.2);
const FULL_ROTATION_DEG: f64 = 180.0;
const ANGULAR_SPEED_DEG_PER_S: f64 = 300.0;
const REST_EPSILON_DEG: f64 = 0.25;

pub struct Servo {
    pub common: PartCommon,
    current_deg: f64,
    target_deg: f64,
    has_signal: bool,
}

impl Servo {
    pub fn new(id: impl Into<String>, human_name: Option<String>, wiring: &mut Wiring) -> Self {
        let id = id.into();
        let mut common = PartCommon::new(id.clone(), human_name);
        let ctrl = wiring.alloc_pin(id.clone(), "ctrl", PinMode::Gpio);
        common.pins.insert("ctrl".into(), ctrl);
        Self { common, current_deg: 0.0, target_deg: 0.0, has_signal: false }
    }

    pub fn notify_pin_update(&mut self, _pin: PinId, ctx: &mut PartCtx<'_>) {
        let ctrl = self.common.pin("ctrl");
        match ctx.wiring.net_state(ctrl) {
            ElectricalState::Pwm => {
                let extra = ctx.wiring.net_extra(ctrl).unwrap_or(abi::PwmExtra { period_ms: 0.0, duty_cycle: 0.0 });
                if extra.period_ms < PERIOD_RANGE_MS.0 || extra.period_ms > PERIOD_RANGE_MS.1 {
                    self.has_signal = false;
                } else {
                    let pulse_ms = (extra.period_ms * extra.duty_cycle).clamp(PULSE_RANGE_MS.0, PULSE_RANGE_MS.1);
                    let frac = (pulse_ms - PULSE_RANGE_MS.0) / (PULSE_RANGE_MS.1 - PULSE_RANGE_MS.0);
                    self.target_deg = (frac - 0.5) * FULL_ROTATION_DEG;
                    self.has_signal = true;
                }
            }
            _ => self.has_signal = false,
        }
        self.common.mark_update();
    }

    pub fn tick(&mut self, _now_ms: u64, dt_ms: u64) {
        if !self.has_signal {
            return;
        }
        let max_step = ANGULAR_SPEED_DEG_PER_S * dt_ms as f64 / 1000.0;
        let diff = self.target_deg - self.current_deg;
        if diff.abs() <= max_step {
            if self.current_deg != self.target_deg {
                self.common.mark_update();
            }
            self.current_deg = self.target_deg;
        } else {
            self.current_deg += max_step.copysign(diff);
            self.common.mark_update();
        }
    }

    fn is_stalled(&self) -> bool {
        self.has_signal && (self.target_deg - self.current_deg).abs() > REST_EPSILON_DEG
    }

    pub fn get_state(&self, _wiring: &Wiring) -> PartSnapshot {
        let mut snap = PartSnapshot::new(self.common.id.clone());
        snap.properties = Some(if self.is_stalled() { "stall".into() } else { "idle".into() });
        let mut css = BTreeMap::new();
        css.insert("transform".to_string(), format!("rotate({:.1}deg)", self.current_deg));
        snap.css_properties = Some(css);
        snap
    }
}
