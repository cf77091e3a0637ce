// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! `WS2812` LED strip: interprets an incoming byte stream as GRB triples,
//! one per LED, and cascades whatever doesn't fit onto `dout` (spec §4.3,
//! §4.5, scenario §8.4).

use super::{PartCommon, PartCtx};
use crate::bus::ws2812::gamma8;
use crate::pin::{PinId, PinMode};
use crate::wiring::Wiring;
use abi::{LedStripEntry, PartSnapshot};

pub struct Ws2812Strip {
    pub common: PartCommon,
    pub channel_current: [f32; 3],
    /// RGB, one entry per LED, in arrival order (`leds[0]` is the first
    /// triple written this stream).
    leds: Vec<[u8; 3]>,
}

impl Ws2812Strip {
    pub fn new(id: impl Into<String>, human_name: Option<String>, length: u32, channel_current: [f32; 3], wiring: &mut Wiring) -> Self {
        let id = id.into();
        let mut common = PartCommon::new(id.clone(), human_name);
        let din = wiring.alloc_pin(id.clone(), "din", PinMode::Ws2812Din);
        let dout = wiring.alloc_pin(id.clone(), "dout", PinMode::Ws2812Dout);
        common.pins.insert("din".into(), din);
        common.pins.insert("dout".into(), dout);
        Self { common, channel_current, leds: vec![[0, 0, 0]; length as usize] }
    }

    pub fn notify_pin_update(&mut self, _pin: PinId, _ctx: &mut PartCtx<'_>) {}

    /// Consumes as many GRB triples as this strip has LEDs for, in arrival
    /// order, and returns whatever bytes didn't fit, for the caller to
    /// cascade onto `dout` (spec §4.3: "overflow re-emitted on dout").
    pub fn write_ws2812(&mut self, buf: &[u8]) -> Vec<u8> {
        let capacity_bytes = self.leds.len() * 3;
        let split = capacity_bytes.min(buf.len());
        let (mine, overflow) = buf.split_at(split);
        for (i, triple) in mine.chunks_exact(3).enumerate() {
            // Wire order is GRB; stored as RGB for display/current math.
            self.leds[i] = [triple[1], triple[0], triple[2]];
        }
        self.common.mark_update();
        overflow.to_vec()
    }

    pub fn current_draw(&self) -> f32 {
        self.leds
            .iter()
            .map(|[r, g, b]| {
                (self.channel_current[0] * *r as f32 + self.channel_current[1] * *g as f32 + self.channel_current[2] * *b as f32) / 255.0
            })
            .sum()
    }

    pub fn get_state(&self, _wiring: &Wiring) -> PartSnapshot {
        let mut snap = PartSnapshot::new(self.common.id.clone());
        snap.ledstrip = Some(
            self.leds
                .iter()
                .map(|[r, g, b]| LedStripEntry { color: [gamma8(*r), gamma8(*g), gamma8(*b)], shadow: false })
                .collect(),
        );
        snap
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wiring::Wiring;

    #[test]
    fn cascades_overflow_to_next_strip() {
        let mut wiring = Wiring::new();
        let mut a = Ws2812Strip::new("a", None, 3, [0.0; 3], &mut wiring);
        let mut b = Ws2812Strip::new("b", None, 2, [0.0; 3], &mut wiring);

        let mut buf = Vec::new();
        for i in 1..=5u8 {
            buf.extend_from_slice(&[i, i + 10, i + 20]); // G,R,B per LED
        }
        let overflow = a.write_ws2812(&buf);
        assert_eq!(overflow.len(), 6, "2 leftover triples of 3 bytes each");
        let leftover_overflow = b.write_ws2812(&overflow);
        assert!(leftover_overflow.is_empty());

        assert_eq!(a.leds[0], [11, 1, 21]); // RGB from G=1,R=11,B=21
        assert_eq!(a.leds[2], [13, 3, 23]);
        assert_eq!(b.leds[0], [14, 4, 24]);
        assert_eq!(b.leds[1], [15, 5, 25]);
    }
}
