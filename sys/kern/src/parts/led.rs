// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! `LED`: two terminals, lit when current can flow anode -> cathode (spec
//! §4.5, scenario §8.1).

use super::{PartCommon, PartCtx};
use crate::pin::{PinId, PinMode};
use crate::wiring::Wiring;
use abi::{CssBlink, ElectricalState, PartSnapshot, PwmExtra};
use std::collections::BTreeMap;

/// A long PWM period reads as a blink the UI should animate rather than a
/// steady dim level (spec §4.5); ~30 Hz is the usual flicker-fusion
/// threshold, so anything slower than that is visibly blinking.
const BLINK_THRESHOLD_MS: f64 = 33.0;

pub struct Led {
    pub common: PartCommon,
    pub nominal_current: f32,
    pub color: [u8; 3],
}

/// One terminal's contribution toward lighting the LED. `active_high` is
/// `true` for the anode (needs to source, i.e. read `High`/`Pwm` high
/// phase) and `false` for the cathode (needs to sink, i.e. read
/// `Low`/`Pwm` low phase).
fn terminal_drive(state: ElectricalState, extra: Option<PwmExtra>, active_high: bool) -> (bool, f64, Option<f64>) {
    match state {
        ElectricalState::High if active_high => (true, 1.0, None),
        ElectricalState::Low if !active_high => (true, 1.0, None),
        ElectricalState::Pullup if active_high => (false, 1.0, None),
        ElectricalState::Pulldown if !active_high => (false, 1.0, None),
        ElectricalState::Pwm => {
            let extra = extra.unwrap_or(PwmExtra { period_ms: 0.0, duty_cycle: 0.0 });
            let duty = if active_high { extra.duty_cycle } else { 1.0 - extra.duty_cycle };
            (true, duty, Some(extra.period_ms))
        }
        _ => (false, 0.0, None),
    }
}

impl Led {
    pub fn new(id: impl Into<String>, human_name: Option<String>, color: [u8; 3], current: f32, wiring: &mut Wiring) -> Self {
        let id = id.into();
        let mut common = PartCommon::new(id.clone(), human_name);
        let anode = wiring.alloc_pin(id.clone(), "anode", PinMode::Gpio);
        let cathode = wiring.alloc_pin(id.clone(), "cathode", PinMode::Gpio);
        common.pins.insert("anode".into(), anode);
        common.pins.insert("cathode".into(), cathode);
        Self { common, nominal_current: current, color }
    }

    pub fn notify_pin_update(&mut self, _pin: PinId, _ctx: &mut PartCtx<'_>) {
        self.common.mark_update();
    }

    fn visual(&self, wiring: &Wiring) -> (bool, f64, Option<f64>) {
        let anode = self.common.pin("anode");
        let cathode = self.common.pin("cathode");
        let (a_on, a_duty, a_period) = terminal_drive(wiring.net_state(anode), wiring.net_extra(anode), true);
        let (c_on, c_duty, c_period) = terminal_drive(wiring.net_state(cathode), wiring.net_extra(cathode), false);
        let lit = a_on && c_on;
        let duty = (a_duty * c_duty).clamp(0.0, 1.0);
        let period = a_period.or(c_period);
        (lit, duty, period)
    }

    pub fn current_draw(&self, wiring: &Wiring) -> f32 {
        let (lit, duty, _) = self.visual(wiring);
        if lit {
            self.nominal_current * duty as f32
        } else {
            0.0
        }
    }

    pub fn get_state(&self, wiring: &Wiring) -> PartSnapshot {
        let mut snap = PartSnapshot::new(self.common.id.clone());
        let (lit, duty, period) = self.visual(wiring);
        let mut css = BTreeMap::new();
        match period {
            Some(period_ms) if period_ms > BLINK_THRESHOLD_MS && lit => {
                let mut off = BTreeMap::new();
                off.insert("opacity".to_string(), "0".to_string());
                snap.css_blink = Some(CssBlink { period_ms, duty_cycle: duty, css_properties_off: off });
                css.insert("opacity".to_string(), "1".to_string());
            }
            _ => {
                let opacity = if lit { duty.max(0.02) } else { 0.0 };
                css.insert("opacity".to_string(), format!("{opacity:.3}"));
            }
        }
        snap.css_properties = Some(css);
        snap
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn steady_drive_lights_fully() {
        let (on, duty, period) = terminal_drive(ElectricalState::High, None, true);
        assert!(on);
        assert_eq!(duty, 1.0);
        assert_eq!(period, None);
    }

    #[test]
    fn wrong_polarity_does_not_light() {
        let (on, _, _) = terminal_drive(ElectricalState::Low, None, true);
        assert!(!on);
    }

    #[test]
    fn pwm_on_cathode_inverts_duty() {
        let extra = PwmExtra { period_ms: 5.0, duty_cycle: 0.25 };
        let (on, duty, period) = terminal_drive(ElectricalState::Pwm, Some(extra), false);
        assert!(on);
        assert_eq!(duty, 0.75);
        assert_eq!(period, Some(5.0));
    }
}
