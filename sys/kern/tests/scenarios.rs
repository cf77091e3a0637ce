// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! End-to-end scenarios driven through `Schematic`'s public API, one per
//! remaining concrete walkthrough this workspace's wiring/bus/part code
//! doesn't already cover at the unit level: a real SPI command stream
//! reaching a display, a WS2812 write cascading across two strips wired
//! through a real MCU pin, virtual time surviving a pause/resume cycle,
//! and two MCU outputs disagreeing on one net.

use abi::{GpioConfigureCode, PartConfig, PinRef, WireConfig};
use kern::{Schematic, WallClock};
use std::cell::Cell;
use std::collections::BTreeMap;

struct FakeWall(Cell<u64>);

impl WallClock for FakeWall {
    fn now_ms(&self) -> u64 {
        self.0.get()
    }
}

impl FakeWall {
    fn advance(&self, ms: u64) {
        self.0.set(self.0.get() + ms);
    }
}

fn mcu_pins(pairs: &[(&str, u32)]) -> BTreeMap<String, u32> {
    pairs.iter().map(|&(name, number)| (name.to_string(), number)).collect()
}

/// Scenario §8.2: a CASET/RASET/RAMWR command stream over SPI paints a
/// rectangle on the attached display, driven entirely through an MCU part
/// and real wires rather than calling the display directly.
#[test]
fn spi_command_stream_paints_the_attached_display() {
    const CASET: u8 = 0x2a;
    const RASET: u8 = 0x2b;
    const RAMWR: u8 = 0x2c;
    const SLPOUT: u8 = 0x11;

    let mut s = Schematic::with_wall_clock(FakeWall(Cell::new(0)));
    s.add_parts(&[
        PartConfig::Mcu {
            id: "mcu".into(),
            pins: mcu_pins(&[("sck", 0), ("sdo", 1), ("sdi", 2), ("cs", 3), ("dc", 4)]),
            human_name: None,
        },
        PartConfig::St7789 { id: "lcd".into(), width: 240, height: 320, human_name: None },
    ]);
    s.add_wires(&[
        WireConfig { from: PinRef::new("mcu", "sck"), to: PinRef::new("lcd", "sck") },
        WireConfig { from: PinRef::new("mcu", "sdo"), to: PinRef::new("lcd", "sdo") },
        WireConfig { from: PinRef::new("mcu", "cs"), to: PinRef::new("lcd", "cs") },
        WireConfig { from: PinRef::new("mcu", "dc"), to: PinRef::new("lcd", "dc") },
    ]);
    s.rebuild_and_notify();
    s.get_update();

    s.spi_configure("mcu", 0, 0, 1, 2, true);
    s.gpio_configure("mcu", 3, GpioConfigureCode::Low); // cs selected (active low)
    s.gpio_configure("mcu", 4, GpioConfigureCode::Low); // dc starts in command mode

    let send_cmd = |s: &mut Schematic<FakeWall>, cmd: u8, data: &[u8]| {
        s.gpio_set("mcu", 4, false);
        s.spi_transfer("mcu", 0, cmd);
        if !data.is_empty() {
            s.gpio_set("mcu", 4, true);
            for &b in data {
                s.spi_transfer("mcu", 0, b);
            }
        }
    };

    send_cmd(&mut s, SLPOUT, &[]);
    send_cmd(&mut s, CASET, &[0x00, 0x00, 0x00, 0x13]); // x: 0..=19
    send_cmd(&mut s, RASET, &[0x00, 0x00, 0x00, 0x09]); // y: 0..=9
    let pixels: Vec<u8> = std::iter::repeat([0xff, 0xff]).take(200).flatten().collect();
    send_cmd(&mut s, RAMWR, &pixels);

    let updates = s.get_update();
    let lcd = updates.iter().find(|u| u.id == "lcd").expect("display should have redrawn");
    let canvas = lcd.canvas.as_ref().expect("display snapshot should carry a canvas");
    let pixel_at = |x: u32, y: u32| {
        let o = ((y * canvas.width + x) * 4) as usize;
        &canvas.rgba[o..o + 4]
    };
    assert_eq!(pixel_at(5, 5), &[0xff, 0xff, 0xff, 0xff]);
    assert_eq!(pixel_at(25, 5), &[0, 0, 0, 0], "outside the addressed window should stay untouched");
}

/// Scenario §8.4: a WS2812 write from a real MCU pin cascades across two
/// chained strips when the byte stream overflows the first one's length.
#[test]
fn ws2812_write_cascades_across_chained_strips() {
    let mut s = Schematic::with_wall_clock(FakeWall(Cell::new(0)));
    s.add_parts(&[
        PartConfig::Mcu { id: "mcu".into(), pins: mcu_pins(&[("d0", 0)]), human_name: None },
        PartConfig::Ws2812 { id: "strip1".into(), length: 1, channel_current: [0.0; 3], human_name: None },
        PartConfig::Ws2812 { id: "strip2".into(), length: 1, channel_current: [0.0; 3], human_name: None },
    ]);
    s.add_wires(&[
        WireConfig { from: PinRef::new("mcu", "d0"), to: PinRef::new("strip1", "din") },
        WireConfig { from: PinRef::new("strip1", "dout"), to: PinRef::new("strip2", "din") },
    ]);
    s.rebuild_and_notify();
    s.get_update();

    // Two GRB triples: strip1 (length 1) keeps the first, strip2 gets the
    // second via cascade.
    s.ws2812_write("mcu", 0, &[0x10, 0x20, 0x30, 0x40, 0x50, 0x60]);

    let updates = s.get_update();
    let strip1 = updates.iter().find(|u| u.id == "strip1").expect("strip1 should have redrawn");
    let strip2 = updates.iter().find(|u| u.id == "strip2").expect("strip2 should have redrawn via cascade");
    assert_eq!(strip1.ledstrip.as_ref().unwrap().len(), 1);
    assert_eq!(strip2.ledstrip.as_ref().unwrap().len(), 1);
}

/// Scenario §8.5: pausing the simulation freezes virtual time even while
/// the (fake) wall clock keeps advancing, and resuming picks back up from
/// where it was frozen.
#[test]
fn pause_freezes_virtual_time_and_resume_continues_it() {
    let wall = FakeWall(Cell::new(0));
    let mut s = Schematic::with_wall_clock(&wall);
    assert!(s.is_running());

    wall.advance(100);
    assert_eq!(s.now_ms(), 100);

    let running = s.play_pause();
    assert!(!running);
    wall.advance(5_000);
    assert_eq!(s.now_ms(), 100, "paused virtual time must not advance with the wall clock");

    let running = s.play_pause();
    assert!(running);
    wall.advance(50);
    assert_eq!(s.now_ms(), 150, "resuming should pick back up from where it was frozen");
}

/// Scenario §8.6: two MCU outputs wired to the same net, disagreeing on
/// level, is a short - recorded as a diagnostic, not a panic, and the
/// simulation keeps running.
#[test]
fn two_disagreeing_outputs_on_one_net_is_a_short() {
    let mut s = Schematic::with_wall_clock(FakeWall(Cell::new(0)));
    s.add_parts(&[PartConfig::Mcu {
        id: "mcu".into(),
        pins: mcu_pins(&[("a", 0), ("b", 1)]),
        human_name: None,
    }]);
    s.add_wires(&[WireConfig { from: PinRef::new("mcu", "a"), to: PinRef::new("mcu", "b") }]);
    s.rebuild_and_notify();

    s.gpio_configure("mcu", 0, GpioConfigureCode::Low);
    s.gpio_set("mcu", 0, true);
    s.gpio_configure("mcu", 1, GpioConfigureCode::Low);
    s.gpio_set("mcu", 1, false);
    // both `configure_gpio`/`set_level` already resolve their own net
    // incrementally; a short is only visible to `Wiring::rebuild`'s full
    // pass, which a structural event (here, re-running it directly)
    // triggers in the real message-driven flow via `Add`/`Remove`/input.
    s.rebuild_and_notify();

    assert!(s.diag().total() >= 1, "a disagreeing net should be diagnosed as a short");
}
