// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! `MCU`: exposes GPIO/SPI/I2C/PWM/WS2812 facilities to the guest program
//! (spec §4.4). This struct is pure bookkeeping — which pin number maps to
//! which `PinId`, which bus number is configured which way, and the
//! numeric pin states pending a shared-buffer sync; the protocol
//! dispatch itself (finding peers, calling their `transfer_spi`) is
//! `Schematic`'s job, the same split as the standalone `bus::spi`/`bus::i2c`
//! modules being pure functions Schematic calls into.

use super::{PartCommon, PartCtx};
use crate::bus::{i2c::I2cBus, spi::SpiBus};
use crate::pin::{PinId, PinMode};
use crate::wiring::Wiring;
use abi::{ElectricalState, GpioConfigureCode, I2cError, PartSnapshot, PinCode};
use std::collections::{BTreeMap, HashMap};

pub struct Mcu {
    pub common: PartCommon,
    pins_by_number: BTreeMap<u32, PinId>,
    pin_number_of: HashMap<PinId, u32>,
    pub spi_buses: HashMap<u32, SpiBus>,
    pub i2c_buses: HashMap<u32, I2cBus>,
    last_i2c_error: BTreeMap<u32, I2cError>,
    /// Numeric pin-state changes observed since the last drain, for the
    /// worker layer to mirror into the shared integer buffer (spec §4.4
    /// "MCU writes the pin's numeric state to index 2 + pinNumber").
    pending_gpio: Vec<(u32, PinCode)>,
    /// Each PWM-configured pin's period, so a later duty-only update (the
    /// original TinyGo `machine.PWM.Set` split between `Configure` and
    /// `Set`) doesn't need to re-specify it.
    pwm_periods: HashMap<PinId, f64>,
}

pub fn electrical_to_code(state: ElectricalState) -> PinCode {
    match state {
        ElectricalState::Floating | ElectricalState::Connected => PinCode::Floating,
        ElectricalState::Low => PinCode::Low,
        ElectricalState::High => PinCode::High,
        ElectricalState::Pulldown => PinCode::Pulldown,
        ElectricalState::Pullup => PinCode::Pullup,
        ElectricalState::Pwm => PinCode::Pwm,
    }
}

impl Mcu {
    pub fn new(id: impl Into<String>, human_name: Option<String>, pins: &BTreeMap<String, u32>, wiring: &mut Wiring) -> Self {
        let id = id.into();
        let mut common = PartCommon::new(id.clone(), human_name);
        let mut pins_by_number = BTreeMap::new();
        let mut pin_number_of = HashMap::new();
        for (name, &number) in pins {
            let pid = wiring.alloc_pin(id.clone(), name.clone(), PinMode::Gpio);
            common.pins.insert(name.clone(), pid);
            pins_by_number.insert(number, pid);
            pin_number_of.insert(pid, number);
        }
        Self {
            common,
            pins_by_number,
            pin_number_of,
            spi_buses: HashMap::new(),
            i2c_buses: HashMap::new(),
            last_i2c_error: BTreeMap::new(),
            pending_gpio: Vec::new(),
            pwm_periods: HashMap::new(),
        }
    }

    pub fn pin_for_number(&self, number: u32) -> Option<PinId> {
        self.pins_by_number.get(&number).copied()
    }

    pub fn number_for_pin(&self, pin: PinId) -> Option<u32> {
        self.pin_number_of.get(&pin).copied()
    }

    pub fn notify_pin_update(&mut self, pin: PinId, ctx: &mut PartCtx<'_>) {
        if let Some(&number) = self.pin_number_of.get(&pin) {
            self.pending_gpio.push((number, electrical_to_code(ctx.wiring.net_state(pin))));
        }
        self.common.mark_update();
    }

    pub fn drain_gpio_changes(&mut self) -> Vec<(u32, PinCode)> {
        std::mem::take(&mut self.pending_gpio)
    }

    pub fn set_i2c_last_error(&mut self, bus: u32, err: I2cError) {
        self.last_i2c_error.insert(bus, err);
    }

    pub fn i2c_last_errors(&self) -> impl Iterator<Item = (u32, I2cError)> + '_ {
        self.last_i2c_error.iter().map(|(&b, &e)| (b, e))
    }

    /// Configures `mode` onto `pin_number`'s pin, returning the `PinId` so
    /// `Schematic` can resolve the net it just changed (spec §4.6
    /// `__tinygo_gpio_configure`).
    pub fn configure_gpio(&self, pin_number: u32, mode: GpioConfigureCode, wiring: &mut Wiring) -> Option<PinId> {
        let pid = self.pin_for_number(pin_number)?;
        let pin = wiring.pin_mut(pid);
        pin.mode = PinMode::Gpio;
        match mode {
            GpioConfigureCode::Floating => pin.configure(false, ElectricalState::Floating),
            GpioConfigureCode::Pullup => pin.configure(false, ElectricalState::Pullup),
            GpioConfigureCode::Pulldown => pin.configure(false, ElectricalState::Pulldown),
            // Spec §4.6 has no "configure as driven-high"; `Low` configures
            // the pin as an output already driving low.
            GpioConfigureCode::Low => {
                pin.configure(true, ElectricalState::Floating);
                let _ = pin.set_level(false);
            }
        }
        Some(pid)
    }

    /// Marks `pin_number` as a PWM output with the given period (spec §4.5
    /// "Servo reads PWM on its control net"; the distilled host-ABI list
    /// omits the configure call the original `machine.PWM` type exposes,
    /// supplemented here since `Servo`/`LED` both depend on reading it).
    pub fn configure_pwm(&mut self, pin_number: u32, period_ms: f64, wiring: &mut Wiring) -> Option<PinId> {
        let pid = self.pin_for_number(pin_number)?;
        self.pwm_periods.insert(pid, period_ms);
        let pin = wiring.pin_mut(pid);
        pin.is_output = true;
        pin.set_state(ElectricalState::Pwm, Some(abi::PwmExtra { period_ms, duty_cycle: 0.0 }));
        Some(pid)
    }

    pub fn set_pwm_duty(&mut self, pin_number: u32, duty_cycle: f64, wiring: &mut Wiring) -> Option<PinId> {
        let pid = self.pin_for_number(pin_number)?;
        let period_ms = *self.pwm_periods.get(&pid)?;
        wiring.pin_mut(pid).set_state(ElectricalState::Pwm, Some(abi::PwmExtra { period_ms, duty_cycle }));
        Some(pid)
    }

    pub fn get_state(&self, _wiring: &Wiring) -> PartSnapshot {
        PartSnapshot::new(self.common.id.clone())
    }
}
