// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! `EPD2IN13`: monochrome e-paper SPI peripheral (spec §4.5, scenario
//! §8's "EPD2IN13 buffer" boundary behavior).
//!
//! `busy` is modeled idle-low, per the spec's resolution of the source's
//! ambiguous polarity comment (spec §9 Open Questions).

use super::{PartCommon, PartCtx};
use crate::pin::{PinId, PinMode};
use crate::wiring::Wiring;
use abi::{Canvas, ElectricalState, PartSnapshot};

const CMD_ACTIVATE: u8 = 0x20;
const CMD_WRITE_RAM: u8 = 0x24;
const CMD_SET_WINDOW_Y: u8 = 0x44;
const CMD_SET_X_COUNTER: u8 = 0x4e;
const CMD_SET_Y_COUNTER: u8 = 0x4f;

pub struct Epd2in13 {
    pub common: PartCommon,
    width: u32,
    height: u32,
    rotation: u8,
    bytes_per_row: u32,
    buffer: Vec<u8>,
    address_x: u32,
    address_y: u32,
    window_y_start: u32,
    window_y_end: u32,
    cs_low: bool,
    dc_data: bool,
    cur_cmd: Option<u8>,
    cmd_data: Vec<u8>,
}

impl Epd2in13 {
    pub fn new(id: impl Into<String>, human_name: Option<String>, width: u32, height: u32, rotation: u8, wiring: &mut Wiring) -> Self {
        let id = id.into();
        let mut common = PartCommon::new(id.clone(), human_name);
        for name in ["cs", "dc", "rst", "sck", "sdo"] {
            let mode = if name == "sck" { PinMode::SpiSckIn } else { PinMode::Gpio };
            let pid = wiring.alloc_pin(id.clone(), name, mode);
            common.pins.insert(name.into(), pid);
        }
        let busy = wiring.alloc_pin(id.clone(), "busy", PinMode::Gpio);
        wiring.pin_mut(busy).configure(true, ElectricalState::Low);
        wiring.pin_mut(busy).set_state(ElectricalState::Low, None); // idle = low (spec §9)
        common.pins.insert("busy".into(), busy);

        let bytes_per_row = (width + 7) / 8;
        let buffer = vec![0xff; (bytes_per_row * height) as usize]; // default = all white
        Self {
            common,
            width,
            height,
            rotation,
            bytes_per_row,
            buffer,
            address_x: 0,
            address_y: 0,
            window_y_start: 0,
            window_y_end: height.saturating_sub(1),
            cs_low: false,
            dc_data: false,
            cur_cmd: None,
            cmd_data: Vec::new(),
        }
    }

    pub fn notify_pin_update(&mut self, pin: PinId, ctx: &mut PartCtx<'_>) {
        if Some(pin) == self.common.try_pin("cs") {
            self.cs_low = ctx.wiring.net_state(pin) == ElectricalState::Low;
        } else if Some(pin) == self.common.try_pin("dc") {
            self.dc_data = ctx.wiring.net_state(pin) == ElectricalState::High;
        } else if Some(pin) == self.common.try_pin("rst") && ctx.wiring.net_state(pin) == ElectricalState::Low {
            self.soft_reset();
        }
    }

    fn soft_reset(&mut self) {
        self.address_x = 0;
        self.address_y = 0;
        self.window_y_start = 0;
        self.window_y_end = self.height.saturating_sub(1);
        self.cur_cmd = None;
        self.cmd_data.clear();
        self.common.mark_update();
    }

    fn fold_little_endian(bytes: &[u8]) -> u32 {
        bytes.iter().rev().fold(0u32, |acc, &b| (acc << 8) | b as u32)
    }

    pub fn transfer_spi(&mut self, byte: u8) -> Option<u8> {
        if !self.cs_low {
            return None;
        }
        if !self.dc_data {
            self.cur_cmd = Some(byte);
            self.cmd_data.clear();
            if byte == CMD_ACTIVATE {
                self.common.mark_update();
            }
            return None;
        }
        match self.cur_cmd {
            Some(CMD_WRITE_RAM) => {
                let row = self.address_y.min(self.height.saturating_sub(1));
                let idx = (row * self.bytes_per_row + self.address_x) as usize;
                if idx < self.buffer.len() {
                    self.buffer[idx] = byte;
                }
                self.address_x = (self.address_x + 1).min(self.bytes_per_row);
                self.common.mark_update();
            }
            Some(CMD_SET_WINDOW_Y) => {
                self.cmd_data.push(byte);
                match self.cmd_data.len() {
                    1 => self.window_y_start = byte as u32,
                    2 => self.window_y_end = byte as u32,
                    _ => {}
                }
            }
            Some(CMD_SET_X_COUNTER) => {
                self.cmd_data.push(byte);
                self.address_x = Self::fold_little_endian(&self.cmd_data);
            }
            Some(CMD_SET_Y_COUNTER) => {
                self.cmd_data.push(byte);
                self.address_y = Self::fold_little_endian(&self.cmd_data);
            }
            _ => {}
        }
        None
    }

    /// Renders the 1-bpp buffer to RGBA, honoring the configured rotation
    /// (spec §4.5: 0/90/180/270, clockwise). Pixels beyond `width` within a
    /// row's padding are not rendered (spec §8 boundary behavior).
    pub fn get_state(&self, _wiring: &Wiring) -> PartSnapshot {
        let (out_w, out_h) = if self.rotation % 2 == 1 { (self.height, self.width) } else { (self.width, self.height) };
        let mut rgba = vec![0u8; (out_w * out_h * 4) as usize];
        for y in 0..self.height {
            for x in 0..self.width {
                let byte = self.buffer[(y * self.bytes_per_row + x / 8) as usize];
                let white = (byte >> (7 - (x % 8))) & 1 != 0;
                let (ox, oy) = rotate(x, y, self.width, self.height, self.rotation);
                if ox < out_w && oy < out_h {
                    let o = ((oy * out_w + ox) * 4) as usize;
                    let v = if white { 0xff } else { 0x00 };
                    rgba[o] = v;
                    rgba[o + 1] = v;
                    rgba[o + 2] = v;
                    rgba[o + 3] = 0xff;
                }
            }
        }
        let mut snap = PartSnapshot::new(self.common.id.clone());
        snap.canvas = Some(Canvas { width: out_w, height: out_h, rgba });
        snap
    }
}

/// Rotates a source `(x, y)` within a `w x h` buffer clockwise by
/// `rotation * 90` degrees, landing in a buffer that is transposed for the
/// odd rotations.
pub(crate) fn rotate(x: u32, y: u32, w: u32, h: u32, rotation: u8) -> (u32, u32) {
    match rotation % 4 {
        0 => (x, y),
        1 => (h - 1 - y, x),
        2 => (w - 1 - x, h - 1 - y),
        3 => (y, w - 1 - x),
        _ => unreachable!(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buffer_row_width_rounds_up_to_byte() {
        let mut wiring = Wiring::new();
        let epd = Epd2in13::new("e", None, 122, 250, 0, &mut wiring);
        assert_eq!(epd.bytes_per_row, 16); // ceil(122/8) = 16
    }

    #[test]
    fn default_buffer_is_all_white() {
        let mut wiring = Wiring::new();
        let epd = Epd2in13::new("e", None, 8, 1, 0, &mut wiring);
        let snap = epd.get_state(&wiring);
        let canvas = snap.canvas.unwrap();
        assert!(canvas.rgba.chunks(4).all(|px| px == [0xff, 0xff, 0xff, 0xff]));
    }
}
