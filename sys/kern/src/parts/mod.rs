// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The fixed part variant set (spec §4.5, §9 "tagged variant set replacing
//! prototype-based part hierarchy"). `Part` is a plain enum rather than a
//! trait object: the set of kinds is closed and small, so a `match` in
//! each dispatch method reads better here than `Box<dyn Trait>` does, the
//! same tradeoff the teacher makes for `kern::task::Task` state.

pub mod board;
pub mod button;
pub mod dummy;
pub mod epd2in13;
pub mod epd2in13x;
pub mod led;
pub mod mcu;
pub mod rgbled;
pub mod servo;
pub mod st7789;
pub mod ws2812_strip;

use crate::pin::PinId;
use crate::wiring::Wiring;
use abi::{InputEvent, PartSnapshot};
use diag::DiagLog;
use indexmap::IndexMap;

/// State shared by every part kind: identity, its pins (by name), and the
/// dirty flag `getUpdates` drains (spec §3 "Part (variant)").
#[derive(Clone, Debug)]
pub struct PartCommon {
    pub id: String,
    pub human_name: Option<String>,
    pub pins: IndexMap<String, PinId>,
    has_update: bool,
}

impl PartCommon {
    pub fn new(id: impl Into<String>, human_name: Option<String>) -> Self {
        // Freshly-constructed parts start dirty so the first `getUpdate`
        // after `add`/`start` carries their initial snapshot.
        Self { id: id.into(), human_name, pins: IndexMap::new(), has_update: true }
    }

    pub fn pin(&self, name: &str) -> PinId {
        self.pins[name]
    }

    pub fn try_pin(&self, name: &str) -> Option<PinId> {
        self.pins.get(name).copied()
    }

    pub fn mark_update(&mut self) {
        self.has_update = true;
    }

    /// Non-mutating peek, used by the worker layer to decide whether a
    /// `notifyUpdate` push is worth sending without draining the flag
    /// `getUpdate` relies on.
    pub fn has_update(&self) -> bool {
        self.has_update
    }

    /// Drains the dirty flag; idempotent per the frame it's called in
    /// (spec §3 "`addUpdate` is idempotent per frame").
    pub fn take_update(&mut self) -> bool {
        std::mem::replace(&mut self.has_update, false)
    }
}

/// Read-only context handed to a part's `notify_pin_update`/`get_state`: it
/// may consult other pins' resolved net state but never mutate the wiring
/// graph directly (mutations go back through `Schematic`, which is the
/// sole owner of `Wiring`).
pub struct PartCtx<'a> {
    pub wiring: &'a Wiring,
    pub diag: &'a mut DiagLog,
    pub now_ms: u64,
}

pub enum Part {
    Mcu(mcu::Mcu),
    Board(board::Board),
    Button(button::Button),
    Led(led::Led),
    RgbLed(rgbled::RgbLed),
    Ws2812(ws2812_strip::Ws2812Strip),
    Epd2in13(epd2in13::Epd2in13),
    Epd2in13x(epd2in13x::Epd2in13x),
    St7789(st7789::St7789),
    Servo(servo::Servo),
    Dummy(dummy::Dummy),
}

macro_rules! dispatch {
    ($self:ident, $p:ident => $body:expr) => {
        match $self {
            Part::Mcu($p) => $body,
            Part::Board($p) => $body,
            Part::Button($p) => $body,
            Part::Led($p) => $body,
            Part::RgbLed($p) => $body,
            Part::Ws2812($p) => $body,
            Part::Epd2in13($p) => $body,
            Part::Epd2in13x($p) => $body,
            Part::St7789($p) => $body,
            Part::Servo($p) => $body,
            Part::Dummy($p) => $body,
        }
    };
}

impl Part {
    pub fn common(&self) -> &PartCommon {
        dispatch!(self, p => &p.common)
    }

    pub fn common_mut(&mut self) -> &mut PartCommon {
        dispatch!(self, p => &mut p.common)
    }

    pub fn id(&self) -> &str {
        &self.common().id
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Part::Mcu(_) => "mcu",
            Part::Board(_) => "board",
            Part::Button(_) => "button",
            Part::Led(_) => "led",
            Part::RgbLed(_) => "rgbled",
            Part::Ws2812(_) => "ws2812",
            Part::Epd2in13(_) => "epd2in13",
            Part::Epd2in13x(_) => "epd2in13x",
            Part::St7789(_) => "st7789",
            Part::Servo(_) => "servo",
            Part::Dummy(_) => "dummy",
        }
    }

    /// Delivered to every part that has an input pin on a net whose
    /// resolved state just changed (spec §3 "Updates flow only via
    /// `notifyPinUpdate`").
    pub fn notify_pin_update(&mut self, pin: PinId, ctx: &mut PartCtx<'_>) {
        dispatch!(self, p => p.notify_pin_update(pin, ctx))
    }

    /// One virtual-clock tick of animation/decay for parts that need it
    /// (currently only `Servo`); a no-op for everything else.
    pub fn tick(&mut self, now_ms: u64, dt_ms: u64) {
        if let Part::Servo(s) = self {
            s.tick(now_ms, dt_ms);
        }
    }

    /// SPI peripheral hook (spec §4.3): `None` means "didn't answer",
    /// which is the right default for every part except the display
    /// controllers, and for a display controller that isn't currently
    /// selected.
    pub fn transfer_spi(&mut self, byte: u8, ctx: &mut PartCtx<'_>) -> Option<u8> {
        match self {
            Part::Epd2in13(p) => p.transfer_spi(byte),
            Part::Epd2in13x(p) => p.transfer_spi(byte),
            Part::St7789(p) => p.transfer_spi(byte, ctx),
            _ => None,
        }
    }

    /// This part's contribution to `Wiring::rebuild`'s extra `bridges`
    /// list, if any (currently only a pressed `Button`).
    pub fn bridge(&self) -> Option<(PinId, PinId)> {
        match self {
            Part::Button(b) => b.bridge(),
            _ => None,
        }
    }

    /// Mutates this part's output pins in response to a UI input event and
    /// returns which ones changed, for `Schematic` to resolve through
    /// `Wiring::update_net_of` and dispatch notifications centrally (a
    /// part never resolves nets itself; only `Schematic` touches topology
    /// resolution, per spec §3/§4.2).
    pub fn handle_input(&mut self, event: InputEvent, wiring: &mut Wiring, now_ms: u64) -> Vec<PinId> {
        match self {
            Part::Button(b) => b.handle_input(event, wiring, now_ms),
            _ => Vec::new(),
        }
    }

    /// Instantaneous current draw, for `PowerTracker`; `None` for parts
    /// that don't consume power (spec §4.5: only LED/RGBLED/WS2812/Dummy
    /// report, everything else is free).
    pub fn power_current(&self, wiring: &Wiring) -> Option<f32> {
        match self {
            Part::Led(p) => Some(p.current_draw(wiring)),
            Part::RgbLed(p) => Some(p.current_draw(wiring)),
            Part::Ws2812(p) => Some(p.current_draw()),
            Part::Dummy(p) => Some(p.current),
            _ => None,
        }
    }

    pub fn get_state(&self, wiring: &Wiring) -> PartSnapshot {
        dispatch!(self, p => p.get_state(wiring))
    }

    pub fn as_mcu(&self) -> Option<&mcu::Mcu> {
        match self {
            Part::Mcu(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_mcu_mut(&mut self) -> Option<&mut mcu::Mcu> {
        match self {
            Part::Mcu(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_ws2812_mut(&mut self) -> Option<&mut ws2812_strip::Ws2812Strip> {
        match self {
            Part::Ws2812(p) => Some(p),
            _ => None,
        }
    }
}
