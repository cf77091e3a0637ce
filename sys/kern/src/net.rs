// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Nets: the equivalence classes pins are joined into by wires (spec §3,
//! §4.2).

use crate::pin::{NetId, PinId};
use abi::{ElectricalState, PwmExtra};

/// The equivalence class of pins joined by wires, plus its resolved state.
#[derive(Clone, Debug, Default)]
pub struct Net {
    pub pins: Vec<PinId>,
    pub state: ElectricalState,
    pub extra: Option<PwmExtra>,
}

impl Net {
    pub fn new() -> Self {
        Self { pins: Vec::new(), state: ElectricalState::Floating, extra: None }
    }
}

/// One member's contribution to net resolution: its id (so callers can
/// report which pin is the short's first driver) and drive.
pub struct Contribution {
    pub pin: PinId,
    pub state: ElectricalState,
    pub extra: Option<PwmExtra>,
}

/// Resolution outcome: the new state/extra, plus whether a short was
/// detected (two disagreeing strong/PWM drivers on the same net).
pub struct Resolution {
    pub state: ElectricalState,
    pub extra: Option<PwmExtra>,
    pub short: bool,
}

/// Net resolution precedence (spec §3, §4.2): an actively-driven `low` or
/// `high` (or `pwm`) wins over pull-ups/pull-downs, which win over
/// floating/connected. Two disagreeing active drivers on one net is a
/// short; resolution deterministically keeps whichever was encountered
/// first in `contributions`' iteration order (insertion order of the
/// net's member pins) and reports the conflict rather than crashing.
pub fn resolve(contributions: &[Contribution]) -> Resolution {
    let mut active: Option<(ElectricalState, Option<PwmExtra>)> = None;
    let mut pull: Option<ElectricalState> = None;
    let mut short = false;

    for c in contributions {
        match c.state {
            ElectricalState::Low | ElectricalState::High | ElectricalState::Pwm => {
                match &active {
                    None => active = Some((c.state, c.extra)),
                    Some((existing, _)) if *existing == c.state && c.state != ElectricalState::Pwm => {
                        // Same strong level from more than one driver agrees; not a short.
                    }
                    Some(_) => short = true,
                }
            }
            ElectricalState::Pullup | ElectricalState::Pulldown => {
                if pull.is_none() {
                    pull = Some(c.state);
                }
            }
            ElectricalState::Floating | ElectricalState::Connected => {}
        }
    }

    if let Some((state, extra)) = active {
        return Resolution { state, extra, short };
    }
    if let Some(state) = pull {
        return Resolution { state, extra: None, short };
    }
    Resolution { state: ElectricalState::Floating, extra: None, short: false }
}

/// `Schematic::rebuild_nets`'s working set: disjoint pin groups before
/// they're turned into `Net`s. A thin union-find over the pin arena's
/// indices, rebuilt from scratch on every structural change (spec §4.2).
pub struct UnionFind {
    parent: Vec<PinId>,
}

impl UnionFind {
    pub fn new(n_pins: usize) -> Self {
        Self { parent: (0..n_pins as PinId).collect() }
    }

    pub fn find(&mut self, x: PinId) -> PinId {
        if self.parent[x as usize] != x {
            let root = self.find(self.parent[x as usize]);
            self.parent[x as usize] = root;
        }
        self.parent[x as usize]
    }

    pub fn union(&mut self, a: PinId, b: PinId) {
        let ra = self.find(a);
        let rb = self.find(b);
        if ra != rb {
            self.parent[ra as usize] = rb;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn c(pin: PinId, state: ElectricalState) -> Contribution {
        Contribution { pin, state, extra: None }
    }

    #[test]
    fn strong_beats_pull_beats_floating() {
        let r = resolve(&[c(0, ElectricalState::Floating), c(1, ElectricalState::Pullup)]);
        assert_eq!(r.state, ElectricalState::Pullup);
        assert!(!r.short);

        let r = resolve(&[c(0, ElectricalState::Pulldown), c(1, ElectricalState::High)]);
        assert_eq!(r.state, ElectricalState::High);
        assert!(!r.short);
    }

    #[test]
    fn first_driver_wins_on_short() {
        let r = resolve(&[c(0, ElectricalState::Low), c(1, ElectricalState::High)]);
        assert_eq!(r.state, ElectricalState::Low, "first-scanned driver wins deterministically");
        assert!(r.short);
    }

    #[test]
    fn all_floating_resolves_floating() {
        let r = resolve(&[c(0, ElectricalState::Floating), c(1, ElectricalState::Connected)]);
        assert_eq!(r.state, ElectricalState::Floating);
        assert!(!r.short);
    }

    #[test]
    fn union_find_merges_transitively() {
        let mut uf = UnionFind::new(4);
        uf.union(0, 1);
        uf.union(2, 3);
        uf.union(1, 2);
        let root = uf.find(0);
        assert_eq!(uf.find(1), root);
        assert_eq!(uf.find(2), root);
        assert_eq!(uf.find(3), root);
    }
}
