// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! `Schematic`: the one place that owns `Wiring` and the part map together
//! and is therefore the only thing allowed to resolve net topology or fan
//! out `notify_pin_update` (spec §4.2, §4.5). Everything else - the host
//! ABI, the UI message surface - goes through here rather than touching
//! `Wiring` or a `Part` directly.

use crate::bus::{self, i2c::I2cBus, spi::SpiBus};
use crate::clock::{Clock, SystemWallClock, WallClock};
use crate::parts::{
    board::Board, button::Button, dummy::Dummy, epd2in13::Epd2in13, epd2in13x::Epd2in13x, led::Led, mcu::Mcu, rgbled::RgbLed,
    servo::Servo, st7789::St7789, ws2812_strip::Ws2812Strip, Part, PartCtx,
};
use crate::pin::{PinId, PinMode};
use crate::power::PowerTracker;
use crate::wiring::Wiring;
use abi::{CoreEvent, Diagnostic, GpioConfigureCode, I2cError, InputEvent, Message, PartConfig, PartSnapshot, PinRef, PowerSnapshot, WireConfig};
use diag::{diag_entry, DiagLog};
use indexmap::IndexMap;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

pub struct Schematic<W: WallClock = SystemWallClock> {
    wiring: Wiring,
    parts: IndexMap<String, Part>,
    clock: Clock<W>,
    diag: DiagLog,
    power: PowerTracker,
    rng: ChaCha8Rng,
    last_tick_ms: u64,
}

impl Schematic<SystemWallClock> {
    pub fn new() -> Self {
        Self::with_wall_clock(SystemWallClock::new())
    }
}

impl Default for Schematic<SystemWallClock> {
    fn default() -> Self {
        Self::new()
    }
}

impl<W: WallClock> Schematic<W> {
    pub fn with_wall_clock(wall: W) -> Self {
        Self {
            wiring: Wiring::new(),
            parts: IndexMap::new(),
            clock: Clock::new(wall),
            diag: DiagLog::default(),
            power: PowerTracker::new(),
            rng: ChaCha8Rng::seed_from_u64(0),
            last_tick_ms: 0,
        }
    }

    pub fn now_ms(&self) -> u64 {
        self.clock.now()
    }

    pub fn diag(&self) -> &DiagLog {
        &self.diag
    }

    pub fn part(&self, id: &str) -> Option<&Part> {
        self.parts.get(id)
    }

    // -- structural messages (spec §6 `add`/`start`/`remove`) ------------

    pub fn add_parts(&mut self, configs: &[PartConfig]) {
        for cfg in configs.iter().cloned() {
            let part = match cfg {
                PartConfig::Board { id, pins, human_name } => Part::Board(Board::new(id, human_name, &pins, &mut self.wiring)),
                PartConfig::Mcu { id, pins, human_name } => Part::Mcu(Mcu::new(id, human_name, &pins, &mut self.wiring)),
                PartConfig::Led { id, color, current, human_name } => {
                    Part::Led(Led::new(id, human_name, color, current, &mut self.wiring))
                }
                PartConfig::RgbLed { id, channel_current, human_name } => {
                    Part::RgbLed(RgbLed::new(id, human_name, channel_current, &mut self.wiring))
                }
                PartConfig::Button { id, human_name } => Part::Button(Button::new(id, human_name, &mut self.wiring)),
                PartConfig::Ws2812 { id, length, channel_current, human_name } => {
                    Part::Ws2812(Ws2812Strip::new(id, human_name, length, channel_current, &mut self.wiring))
                }
                PartConfig::Epd2in13 { id, width, height, rotation, human_name, .. } => {
                    Part::Epd2in13(Epd2in13::new(id, human_name, width, height, rotation, &mut self.wiring))
                }
                PartConfig::Epd2in13x { id, width, height, rotation, human_name } => {
                    Part::Epd2in13x(Epd2in13x::new(id, human_name, width, height, rotation, &mut self.wiring))
                }
                PartConfig::St7789 { id, width, height, human_name } => {
                    Part::St7789(St7789::new(id, human_name, width, height, &mut self.wiring))
                }
                PartConfig::Servo { id, human_name } => Part::Servo(Servo::new(id, human_name, &mut self.wiring)),
                PartConfig::Dummy { id, current, human_name } => Part::Dummy(Dummy::new(id, human_name, current)),
                PartConfig::Unknown => {
                    diag_entry!(self.diag, self.clock.now(), Diagnostic::UnknownPartType);
                    continue;
                }
            };
            self.parts.insert(part.id().to_string(), part);
        }
    }

    fn resolve_pin(&self, r: &PinRef) -> Option<PinId> {
        self.parts.get(&r.part)?.common().try_pin(&r.pin)
    }

    pub fn add_wires(&mut self, wires: &[WireConfig]) {
        for w in wires {
            match (self.resolve_pin(&w.from), self.resolve_pin(&w.to)) {
                (Some(a), Some(b)) => self.wiring.add_wire(a, b),
                _ => diag_entry!(self.diag, self.clock.now(), Diagnostic::UnknownPin),
            }
        }
    }

    pub fn remove_wires(&mut self, wires: &[WireConfig]) {
        for w in wires {
            if let (Some(a), Some(b)) = (self.resolve_pin(&w.from), self.resolve_pin(&w.to)) {
                self.wiring.remove_wire(a, b);
            }
        }
    }

    pub fn remove_parts(&mut self, ids: &[String]) {
        for id in ids {
            self.wiring.remove_part_pins(id);
            self.parts.shift_remove(id);
            self.power.remove_part(id);
        }
    }

    // -- net topology ------------------------------------------------------

    /// Full rebuild plus dispatch, for every structural change (spec §4.2):
    /// a part/wire add or remove, or a button press/release (which changes
    /// the union-find groups, not just a net's resolved state).
    pub fn rebuild_and_notify(&mut self) {
        let bridges: Vec<(PinId, PinId)> = self.parts.values().filter_map(Part::bridge).collect();
        let now = self.clock.now();
        let notifications = self.wiring.rebuild(&bridges, &mut self.diag, now);
        self.dispatch(notifications.changed_input_pins);
    }

    /// Incremental resolution of whatever net `pin` sits on, for a state
    /// change that doesn't touch topology (an output level or pull change).
    fn resolve_and_notify(&mut self, pin: PinId) {
        let now = self.clock.now();
        let notify = self.wiring.update_net_of(pin, &mut self.diag, now);
        self.dispatch(notify);
    }

    fn dispatch(&mut self, pins: Vec<PinId>) {
        let now = self.clock.now();
        for pid in pins {
            let part_id = self.wiring.pin(pid).part_id.clone();
            if let Some(part) = self.parts.get_mut(&part_id) {
                let mut ctx = PartCtx { wiring: &self.wiring, diag: &mut self.diag, now_ms: now };
                part.notify_pin_update(pid, &mut ctx);
            }
        }
    }

    pub fn connections_snapshot(&self) -> Vec<Vec<String>> {
        self.wiring.connections_snapshot()
    }

    // -- virtual clock -------------------------------------------------

    pub fn is_running(&self) -> bool {
        self.clock.is_running()
    }

    pub fn play_pause(&mut self) -> bool {
        if self.clock.is_running() {
            self.clock.pause();
        } else {
            self.clock.start();
        }
        self.clock.is_running()
    }

    /// One frame of part animation (currently just `Servo`); called by the
    /// worker on whatever cadence it drives the simulation at.
    pub fn tick(&mut self) {
        let now = self.clock.now();
        let dt = now.saturating_sub(self.last_tick_ms);
        self.last_tick_ms = now;
        for part in self.parts.values_mut() {
            part.tick(now, dt);
        }
    }

    // -- UI update surface (spec §6) --------------------------------------

    /// Drains every dirty part's snapshot, attaching a power reading where
    /// the part reports one (spec §4.5, §6).
    pub fn get_update(&mut self) -> Vec<PartSnapshot> {
        let mut updates = Vec::new();
        for part in self.parts.values_mut() {
            if !part.common_mut().take_update() {
                continue;
            }
            let mut snap = part.get_state(&self.wiring);
            if let Some(current) = part.power_current(&self.wiring) {
                snap.power = Some(self.power.record(&snap.id, current));
            }
            updates.push(snap);
        }
        updates
    }

    /// Whether any part has accumulated an update since the last drain,
    /// for the worker layer's `notifyUpdate` push (spec §6): a hint the UI
    /// should pull on its next frame, not a snapshot itself.
    pub fn has_pending_updates(&self) -> bool {
        self.parts.values().any(|p| p.common().has_update())
    }

    pub fn power_tree(&self) -> Vec<PowerSnapshot> {
        self.power.tree()
    }

    /// Single dispatch entry point for every `Message` that doesn't require
    /// spinning up a guest runtime (`Start` is the worker's job, since this
    /// crate has no notion of wasm): `Add`/`Remove`/`PlayPause`/`Input`/
    /// `GetUpdate` all land here and come back as the batch of `CoreEvent`s
    /// the caller should forward to the UI channel (spec §4.7).
    pub fn apply(&mut self, msg: Message) -> Vec<CoreEvent> {
        match msg {
            Message::Start { .. } => Vec::new(),
            Message::Add { parts, wires } => {
                self.add_parts(&parts);
                self.add_wires(&wires);
                self.rebuild_and_notify();
                vec![CoreEvent::Connections { pin_lists: self.connections_snapshot() }]
            }
            Message::Remove { parts, wires } => {
                self.remove_wires(&wires);
                self.remove_parts(&parts);
                self.rebuild_and_notify();
                vec![CoreEvent::Connections { pin_lists: self.connections_snapshot() }]
            }
            Message::PlayPause => {
                let running = self.play_pause();
                vec![CoreEvent::Speed { speed: running as u8 }]
            }
            Message::Input { id, event } => {
                self.handle_input(&id, event);
                Vec::new()
            }
            Message::GetUpdate => {
                let updates = self.get_update();
                let mut events = Vec::new();
                if !updates.is_empty() {
                    events.push(CoreEvent::Update { updates });
                }
                events.push(CoreEvent::Power { power_tree: self.power_tree() });
                events
            }
        }
    }

    pub fn handle_input(&mut self, id: &str, event: InputEvent) {
        let now = self.clock.now();
        let touched = match self.parts.get_mut(id) {
            Some(part) => part.handle_input(event, &mut self.wiring, now),
            None => return,
        };
        if !touched.is_empty() {
            // A button press/release is a topology change (it bridges or
            // un-bridges its two terminals), so this always needs the full
            // rebuild rather than an incremental per-net resolution.
            self.rebuild_and_notify();
        }
    }

    // -- host ABI: GPIO (spec §4.4, §4.6) ----------------------------------

    pub fn gpio_configure(&mut self, mcu_id: &str, pin_number: u32, mode: GpioConfigureCode) {
        let pid = match self.parts.get(mcu_id).and_then(Part::as_mcu) {
            Some(mcu) => mcu.configure_gpio(pin_number, mode, &mut self.wiring),
            None => None,
        };
        if let Some(pid) = pid {
            self.resolve_and_notify(pid);
        } else {
            diag_entry!(self.diag, self.clock.now(), Diagnostic::UnknownPin);
        }
    }

    pub fn gpio_set(&mut self, mcu_id: &str, pin_number: u32, high: bool) {
        let pid = self.parts.get(mcu_id).and_then(Part::as_mcu).and_then(|m| m.pin_for_number(pin_number));
        let Some(pid) = pid else {
            diag_entry!(self.diag, self.clock.now(), Diagnostic::UnknownPin);
            return;
        };
        if let Err(d) = self.wiring.pin_mut(pid).set_level(high) {
            diag_entry!(self.diag, self.clock.now(), d);
            return;
        }
        self.resolve_and_notify(pid);
    }

    /// Drains the GPIO-state changes the MCU has observed since the last
    /// call, for the worker layer to mirror into the shared integer buffer
    /// (spec §4.4: "index 2 + pinNumber").
    pub fn drain_mcu_pin_changes(&mut self, mcu_id: &str) -> Vec<(u32, abi::PinCode)> {
        match self.parts.get_mut(mcu_id).and_then(Part::as_mcu_mut) {
            Some(mcu) => mcu.drain_gpio_changes(),
            None => Vec::new(),
        }
    }

    // -- host ABI: PWM (spec §4.5, SPEC_FULL addition) ---------------------

    pub fn pwm_configure(&mut self, mcu_id: &str, pin_number: u32, period_ms: f64) {
        let pid = match self.parts.get_mut(mcu_id).and_then(Part::as_mcu_mut) {
            Some(mcu) => mcu.configure_pwm(pin_number, period_ms, &mut self.wiring),
            None => None,
        };
        match pid {
            Some(pid) => self.resolve_and_notify(pid),
            None => diag_entry!(self.diag, self.clock.now(), Diagnostic::UnknownPin),
        }
    }

    pub fn pwm_set_duty(&mut self, mcu_id: &str, pin_number: u32, duty_cycle: f64) {
        let pid = match self.parts.get_mut(mcu_id).and_then(Part::as_mcu_mut) {
            Some(mcu) => mcu.set_pwm_duty(pin_number, duty_cycle, &mut self.wiring),
            None => None,
        };
        match pid {
            Some(pid) => self.resolve_and_notify(pid),
            None => diag_entry!(self.diag, self.clock.now(), Diagnostic::UnknownPin),
        }
    }

    // -- host ABI: SPI (spec §4.3, §4.6) -----------------------------------

    pub fn spi_configure(&mut self, mcu_id: &str, bus: u32, sck: u32, sdo: u32, sdi: u32, as_controller: bool) {
        let Some(mcu) = self.parts.get(mcu_id).and_then(Part::as_mcu) else { return };
        let (Some(sck), Some(sdo), Some(sdi)) = (mcu.pin_for_number(sck), mcu.pin_for_number(sdo), mcu.pin_for_number(sdi)) else {
            diag_entry!(self.diag, self.clock.now(), Diagnostic::UnknownPin);
            return;
        };
        let bus_state = if as_controller {
            self.wiring.pin_mut(sck).mode = PinMode::SpiSckOut;
            self.wiring.pin_mut(sck).configure(true, abi::ElectricalState::Floating);
            let _ = self.wiring.pin_mut(sck).set_level(false);
            self.wiring.pin_mut(sdo).mode = PinMode::SpiSdoOut;
            self.wiring.pin_mut(sdo).configure(true, abi::ElectricalState::Floating);
            self.wiring.pin_mut(sdi).mode = PinMode::SpiSdiIn;
            self.wiring.pin_mut(sdi).configure(false, abi::ElectricalState::Floating);
            SpiBus::configure_as_controller(sck, sdo, sdi)
        } else {
            self.wiring.pin_mut(sck).mode = PinMode::SpiSckIn;
            self.wiring.pin_mut(sck).configure(false, abi::ElectricalState::Floating);
            self.wiring.pin_mut(sdo).mode = PinMode::SpiSdoOut;
            self.wiring.pin_mut(sdo).configure(true, abi::ElectricalState::Floating);
            self.wiring.pin_mut(sdi).mode = PinMode::SpiSdiIn;
            self.wiring.pin_mut(sdi).configure(false, abi::ElectricalState::Floating);
            SpiBus::configure_as_peripheral(sck, sdo, sdi)
        };
        if let Some(mcu) = self.parts.get_mut(mcu_id).and_then(Part::as_mcu_mut) {
            mcu.spi_buses.insert(bus, bus_state);
        }
        self.rebuild_and_notify();
    }

    /// One controller-side `transfer(byte)` (spec §4.3): scans the `sck`
    /// net for peripherals and lets at most one answer, falling back to
    /// the `sdi` net's idle level if none do.
    pub fn spi_transfer(&mut self, mcu_id: &str, bus_num: u32, byte: u8) -> u8 {
        let Some(spi) = self.parts.get(mcu_id).and_then(Part::as_mcu).and_then(|m| m.spi_buses.get(&bus_num).copied()) else {
            return 0xff;
        };
        let peers = self.wiring.net_peers_with_mode(spi.sck, PinMode::SpiSckIn);
        let sdi_state = self.wiring.net_state(spi.sdi);
        let now = self.clock.now();
        let wiring = &self.wiring;
        let parts = &mut self.parts;
        let diag = &mut self.diag;
        bus::spi::controller_transfer(&peers, byte, sdi_state, &mut self.rng, |peer, b| {
            let part_id = wiring.pin(peer).part_id.clone();
            let part = parts.get_mut(&part_id)?;
            let mut ctx = PartCtx { wiring, diag, now_ms: now };
            part.transfer_spi(b, &mut ctx)
        })
    }

    // -- host ABI: I2C (spec §4.3, §4.6) -----------------------------------

    pub fn i2c_configure(&mut self, mcu_id: &str, bus: u32, scl: u32, sda: u32) {
        let Some(mcu) = self.parts.get(mcu_id).and_then(Part::as_mcu) else { return };
        let (Some(scl), Some(sda)) = (mcu.pin_for_number(scl), mcu.pin_for_number(sda)) else {
            diag_entry!(self.diag, self.clock.now(), Diagnostic::UnknownPin);
            return;
        };
        self.wiring.pin_mut(scl).mode = PinMode::I2cScl;
        self.wiring.pin_mut(sda).mode = PinMode::I2cSda;
        if let Some(mcu) = self.parts.get_mut(mcu_id).and_then(Part::as_mcu_mut) {
            mcu.i2c_buses.insert(bus, I2cBus::configure_as_controller(scl, sda));
        }
    }

    /// No part in the fixed variant set answers as an I2C peripheral (see
    /// `bus::i2c`'s doc comment), so this always resolves to `NoAck`; it's
    /// still routed through `bus::i2c::transfer` so a future responder only
    /// needs to extend `find`, not this call site.
    pub fn i2c_transfer(&mut self, mcu_id: &str, bus_num: u32, address: u8, write_bytes: &[u8], read_len: usize) -> (I2cError, Vec<u8>) {
        if self.parts.get(mcu_id).and_then(Part::as_mcu).and_then(|m| m.i2c_buses.get(&bus_num)).is_none() {
            return (I2cError::Other, Vec::new());
        }
        let (err, data) = bus::i2c::transfer(address, write_bytes, read_len, |_addr| None, |_, _, _| unreachable!());
        if let Some(mcu) = self.parts.get_mut(mcu_id).and_then(Part::as_mcu_mut) {
            mcu.set_i2c_last_error(bus_num, err);
        }
        (err, data)
    }

    // -- host ABI: WS2812 (spec §4.3, §4.6) ---------------------------------

    /// Cascades a byte stream from `pin_number`'s net through however many
    /// `WS2812` strips are chained `dout -> din` (spec §4.3, §8.4).
    pub fn ws2812_write(&mut self, mcu_id: &str, pin_number: u32, buf: &[u8]) {
        let Some(start) = self.parts.get(mcu_id).and_then(Part::as_mcu).and_then(|m| m.pin_for_number(pin_number)) else {
            diag_entry!(self.diag, self.clock.now(), Diagnostic::UnknownPin);
            return;
        };
        let mut din = self.wiring.net_peers_with_mode(start, PinMode::Ws2812Din).into_iter().next();
        let mut remaining = buf.to_vec();
        while let Some(pid) = din {
            if remaining.is_empty() {
                break;
            }
            let part_id = self.wiring.pin(pid).part_id.clone();
            let Some(strip) = self.parts.get_mut(&part_id).and_then(Part::as_ws2812_mut) else { break };
            let overflow = strip.write_ws2812(&remaining);
            remaining = overflow;
            let dout = self.parts[&part_id].common().try_pin("dout");
            din = dout.and_then(|d| self.wiring.net_peers_with_mode(d, PinMode::Ws2812Din).into_iter().next());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    struct FakeWall(Cell<u64>);
    impl WallClock for FakeWall {
        fn now_ms(&self) -> u64 {
            self.0.get()
        }
    }

    fn board_with_led() -> Schematic<FakeWall> {
        let mut s = Schematic::with_wall_clock(FakeWall(Cell::new(0)));
        s.add_parts(&[
            PartConfig::Board { id: "b".into(), pins: vec![], human_name: None },
            PartConfig::Mcu { id: "mcu".into(), pins: [("d0".to_string(), 0u32)].into_iter().collect(), human_name: None },
            PartConfig::Led { id: "led".into(), color: [255, 0, 0], current: 0.02, human_name: None },
        ]);
        s.add_wires(&[
            WireConfig { from: PinRef::new("mcu", "d0"), to: PinRef::new("led", "anode") },
            WireConfig { from: PinRef::new("led", "cathode"), to: PinRef::new("b", "gnd") },
        ]);
        s.rebuild_and_notify();
        s.get_update(); // drain initial dirty state
        s
    }

    #[test]
    fn driving_an_output_pin_lights_the_wired_led() {
        let mut s = board_with_led();
        s.gpio_configure("mcu", 0, GpioConfigureCode::Low);
        s.gpio_set("mcu", 0, true);
        let updates = s.get_update();
        let led = updates.iter().find(|u| u.id == "led").expect("led should have redrawn");
        assert_eq!(led.css_properties.as_ref().unwrap().get("opacity").map(String::as_str), Some("1.000"));
    }

    #[test]
    fn unknown_part_type_is_diagnosed_not_fatal() {
        let mut s = Schematic::with_wall_clock(FakeWall(Cell::new(0)));
        s.add_parts(&[PartConfig::Unknown]);
        assert_eq!(s.diag().total(), 1);
    }

    /// The UI sends `Message` over `postMessage` as camelCase JSON (spec
    /// §6), not constructed as a Rust value. Exercise that literal wire
    /// shape through `serde_json` rather than assuming `#[serde(tag, rename_all)]`
    /// did what the attribute says.
    #[test]
    fn add_message_parses_from_its_wire_json_shape() {
        let json = r#"{
            "type": "add",
            "parts": [
                {"type": "mcu", "id": "mcu", "pins": {"d0": 0}},
                {"type": "led", "id": "led", "color": [255, 0, 0], "current": 0.02}
            ],
            "wires": [
                {"from": {"part": "mcu", "pin": "d0"}, "to": {"part": "led", "pin": "anode"}}
            ]
        }"#;
        let msg: Message = serde_json::from_str(json).expect("wire JSON should deserialize");
        let mut s = Schematic::with_wall_clock(FakeWall(Cell::new(0)));
        let events = s.apply(msg);
        let pin_lists = events
            .iter()
            .find_map(|e| match e {
                CoreEvent::Connections { pin_lists } => Some(pin_lists),
                _ => None,
            })
            .expect("add should emit a connections snapshot");
        assert!(pin_lists.iter().any(|net| net.contains(&"mcu.d0".to_string())));
    }

    #[test]
    fn button_press_bridges_and_notifies_the_wired_led() {
        let mut s = Schematic::with_wall_clock(FakeWall(Cell::new(0)));
        s.add_parts(&[
            PartConfig::Board { id: "b".into(), pins: vec![], human_name: None },
            PartConfig::Button { id: "btn".into(), human_name: None },
            PartConfig::Led { id: "led".into(), color: [0, 255, 0], current: 0.02, human_name: None },
        ]);
        s.add_wires(&[
            WireConfig { from: PinRef::new("b", "vcc"), to: PinRef::new("btn", "A") },
            WireConfig { from: PinRef::new("btn", "B"), to: PinRef::new("led", "anode") },
        ]);
        s.rebuild_and_notify();
        s.get_update(); // drain initial dirty state
        s.handle_input("btn", InputEvent::Press);
        let updates = s.get_update();
        assert!(updates.iter().any(|u| u.id == "led"));
    }
}
