// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The pin/net arena and topology rebuild (spec §3, §4.2, design note in
//! spec §9: "arena plus indices" replacing the source's cyclic ownership).

use crate::net::{self, Contribution, Net, UnionFind};
use crate::pin::{Pin, PinId, PinMode};
use abi::ElectricalState;
use diag::DiagLog;

/// Owns every `Pin` and `Net` in the simulation. `PinId`/`NetId` are plain
/// arena indices; nothing here is reference-counted or linked, so a full
/// topology rebuild is a handful of `Vec` operations rather than a graph
/// walk with teardown.
#[derive(Default)]
pub struct Wiring {
    pins: Vec<Pin>,
    nets: Vec<Net>,
    wires: Vec<(PinId, PinId)>,
}

/// The set of pins whose net changed state during a rebuild or an
/// incremental update, for the caller to deliver `notify_pin_update` to.
pub struct Notifications {
    pub changed_input_pins: Vec<PinId>,
    pub shorts: Vec<NetShort>,
}

pub struct NetShort {
    pub net: Vec<PinId>,
}

impl Wiring {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn alloc_pin(&mut self, part_id: impl Into<String>, name: impl Into<String>, mode: PinMode) -> PinId {
        let id = self.pins.len() as PinId;
        self.pins.push(Pin::new(part_id, name, mode));
        id
    }

    pub fn pin(&self, id: PinId) -> &Pin {
        &self.pins[id as usize]
    }

    pub fn pin_mut(&mut self, id: PinId) -> &mut Pin {
        &mut self.pins[id as usize]
    }

    pub fn net(&self, id: u32) -> &Net {
        &self.nets[id as usize]
    }

    pub fn add_wire(&mut self, a: PinId, b: PinId) {
        self.wires.push((a, b));
    }

    pub fn remove_wire(&mut self, a: PinId, b: PinId) {
        self.wires.retain(|&(x, y)| !((x == a && y == b) || (x == b && y == a)));
    }

    /// Drops every pin belonging to `part_id` along with any wire touching
    /// one of them. Used by the `remove` structural message.
    pub fn remove_part_pins(&mut self, part_id: &str) {
        let dead: Vec<PinId> =
            self.pins.iter().enumerate().filter(|(_, p)| p.part_id == part_id).map(|(i, _)| i as PinId).collect();
        self.wires.retain(|&(a, b)| !dead.contains(&a) && !dead.contains(&b));
    }

    /// Full topology rebuild (spec §4.2): every pin starts in its own
    /// singleton net, wires and part-contributed `bridges` (e.g. a pressed
    /// button's internal link) merge them, then each resulting net is
    /// resolved once. Pins are grouped in ascending `PinId` order so
    /// iteration order - and therefore short-resolution tie-breaking - is
    /// deterministic and stable across rebuilds with the same topology.
    pub fn rebuild(&mut self, bridges: &[(PinId, PinId)], diag: &mut DiagLog, now_ms: u64) -> Notifications {
        let mut uf = UnionFind::new(self.pins.len());
        for &(a, b) in self.wires.iter().chain(bridges.iter()) {
            uf.union(a, b);
        }

        let mut groups: std::collections::BTreeMap<PinId, Vec<PinId>> = Default::default();
        for i in 0..self.pins.len() as PinId {
            let root = uf.find(i);
            groups.entry(root).or_default().push(i);
        }

        let mut new_nets = Vec::with_capacity(groups.len());
        let mut changed_input_pins = Vec::new();
        let mut shorts = Vec::new();

        for (_, members) in groups {
            let contributions: Vec<Contribution> = members
                .iter()
                .map(|&pid| Contribution { pin: pid, state: self.pins[pid as usize].state, extra: self.pins[pid as usize].extra })
                .collect();
            let resolution = net::resolve(&contributions);
            if resolution.short {
                diag::diag_entry!(diag, now_ms, abi::Diagnostic::Short);
                shorts.push(NetShort { net: members.clone() });
            }

            let net_id = new_nets.len() as u32;
            for &pid in &members {
                let pin = &mut self.pins[pid as usize];
                let prev = pin.last_resolved;
                pin.net = Some(net_id);
                pin.last_resolved = Some(resolution.state);
                if prev != Some(resolution.state) && !pin.is_output {
                    changed_input_pins.push(pid);
                }
            }
            new_nets.push(Net { pins: members, state: resolution.state, extra: resolution.extra });
        }

        self.nets = new_nets;
        Notifications { changed_input_pins, shorts }
    }

    /// Incremental resolution of the single net `net_id` belongs to, used
    /// when a pin's own output state changes without any topology change
    /// (spec §4.2 `Net.updateState`). Returns the input pins to notify.
    pub fn update_net_of(&mut self, pin_id: PinId, diag: &mut DiagLog, now_ms: u64) -> Vec<PinId> {
        let Some(net_id) = self.pins[pin_id as usize].net else { return Vec::new() };
        let members = self.nets[net_id as usize].pins.clone();
        let contributions: Vec<Contribution> = members
            .iter()
            .map(|&pid| Contribution { pin: pid, state: self.pins[pid as usize].state, extra: self.pins[pid as usize].extra })
            .collect();
        let resolution = net::resolve(&contributions);
        if resolution.short {
            diag::diag_entry!(diag, now_ms, abi::Diagnostic::Short);
        }

        let changed = self.nets[net_id as usize].state != resolution.state;
        self.nets[net_id as usize].state = resolution.state;
        self.nets[net_id as usize].extra = resolution.extra;

        let mut notify = Vec::new();
        for &pid in &members {
            let pin = &mut self.pins[pid as usize];
            pin.last_resolved = Some(resolution.state);
            if changed && !pin.is_output {
                notify.push(pid);
            }
        }
        notify
    }

    /// All pins on `from`'s net whose mode matches `mode`, excluding `from`
    /// itself. Backs both SPI peripheral lookup and WS2812 forwarding.
    pub fn net_peers_with_mode(&self, from: PinId, mode: PinMode) -> Vec<PinId> {
        let Some(net_id) = self.pins[from as usize].net else { return Vec::new() };
        self.nets[net_id as usize]
            .pins
            .iter()
            .copied()
            .filter(|&p| p != from && self.pins[p as usize].mode == mode)
            .collect()
    }

    pub fn net_state(&self, pin_id: PinId) -> ElectricalState {
        self.pins[pin_id as usize].net.map(|n| self.nets[n as usize].state).unwrap_or(self.pins[pin_id as usize].state)
    }

    /// The PWM `(period, duty)` carried by `pin_id`'s net, if its resolved
    /// state is `Pwm`; `None` otherwise (including for pins not yet in a
    /// net, which have no resolved extra of their own).
    pub fn net_extra(&self, pin_id: PinId) -> Option<abi::PwmExtra> {
        self.pins[pin_id as usize].net.and_then(|n| self.nets[n as usize].extra)
    }

    /// `connections{pinLists}` payload: one list of `"part.pin"` strings
    /// per net, emitted after every rebuild (spec §6).
    pub fn connections_snapshot(&self) -> Vec<Vec<String>> {
        self.nets
            .iter()
            .map(|n| n.pins.iter().map(|&p| format!("{}.{}", self.pins[p as usize].part_id, self.pins[p as usize].name)).collect())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use diag::DiagLog;

    #[test]
    fn two_strong_outputs_on_one_net_is_a_short() {
        let mut wiring = Wiring::new();
        let a = wiring.alloc_pin("x", "a", PinMode::Gpio);
        let b = wiring.alloc_pin("y", "b", PinMode::Gpio);
        wiring.pin_mut(a).configure(true, ElectricalState::Floating);
        wiring.pin_mut(b).configure(true, ElectricalState::Floating);
        wiring.pin_mut(a).set_level(true).unwrap();
        wiring.pin_mut(b).set_level(false).unwrap();
        wiring.add_wire(a, b);

        let mut diag = DiagLog::default();
        let notifications = wiring.rebuild(&[], &mut diag, 0);
        assert_eq!(notifications.shorts.len(), 1);
        assert_eq!(diag.total(), 1);
    }

    #[test]
    fn an_output_driving_high_notifies_the_wired_input() {
        let mut wiring = Wiring::new();
        let out = wiring.alloc_pin("x", "out", PinMode::Gpio);
        let inp = wiring.alloc_pin("y", "in", PinMode::Gpio);
        wiring.pin_mut(out).configure(true, ElectricalState::Floating);
        wiring.pin_mut(inp).configure(false, ElectricalState::Floating);
        wiring.add_wire(out, inp);

        let mut diag = DiagLog::default();
        let notifications = wiring.rebuild(&[], &mut diag, 0);
        assert!(notifications.shorts.is_empty());
        assert_eq!(notifications.changed_input_pins, vec![inp]);
        assert_eq!(wiring.net_state(inp), ElectricalState::Floating);

        wiring.pin_mut(out).set_level(true).unwrap();
        let notify = wiring.update_net_of(out, &mut diag, 1);
        assert_eq!(notify, vec![inp]);
        assert_eq!(wiring.net_state(inp), ElectricalState::High);
    }

    #[test]
    fn connections_snapshot_names_every_net() {
        let mut wiring = Wiring::new();
        let a = wiring.alloc_pin("mcu", "d0", PinMode::Gpio);
        let b = wiring.alloc_pin("led", "anode", PinMode::Gpio);
        wiring.add_wire(a, b);
        let mut diag = DiagLog::default();
        wiring.rebuild(&[], &mut diag, 0);
        let snapshot = wiring.connections_snapshot();
        assert_eq!(snapshot.len(), 1);
        assert!(snapshot[0].contains(&"mcu.d0".to_string()));
        assert!(snapshot[0].contains(&"led.anode".to_string()));
    }
}
