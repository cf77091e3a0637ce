// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! `EPD2IN13X`: tri-color e-paper SPI peripheral, two 1-bpp buffers (black,
//! color) committed together (spec §4.5).
//!
//! `busy` is modeled idle-high here, the opposite polarity from
//! `EPD2IN13`, per the spec's resolution of the source's ambiguous
//! comment (spec §9 Open Questions).

use super::{PartCommon, PartCtx};
use crate::pin::{PinId, PinMode};
use crate::wiring::Wiring;
use abi::{Canvas, ElectricalState, PartSnapshot};

const CMD_SELECT_BLACK: u8 = 0x10;
const CMD_COMMIT: u8 = 0x12;
const CMD_SELECT_COLOR: u8 = 0x13;
const CMD_SET_WINDOW_Y: u8 = 0x44;
const CMD_SET_X_COUNTER: u8 = 0x4e;
const CMD_SET_Y_COUNTER: u8 = 0x4f;

#[derive(Copy, Clone, Eq, PartialEq)]
enum SelectedBuffer {
    Black,
    Color,
}

pub struct Epd2in13x {
    pub common: PartCommon,
    width: u32,
    height: u32,
    rotation: u8,
    bytes_per_row: u32,
    pending_black: Vec<u8>,
    pending_color: Vec<u8>,
    committed_black: Vec<u8>,
    committed_color: Vec<u8>,
    selected: SelectedBuffer,
    address_x: u32,
    address_y: u32,
    cs_low: bool,
    dc_data: bool,
    cur_cmd: Option<u8>,
    cmd_data: Vec<u8>,
}

impl Epd2in13x {
    pub fn new(id: impl Into<String>, human_name: Option<String>, width: u32, height: u32, rotation: u8, wiring: &mut Wiring) -> Self {
        let id = id.into();
        let mut common = PartCommon::new(id.clone(), human_name);
        for name in ["cs", "dc", "rst", "sck", "sdo"] {
            let mode = if name == "sck" { PinMode::SpiSckIn } else { PinMode::Gpio };
            let pid = wiring.alloc_pin(id.clone(), name, mode);
            common.pins.insert(name.into(), pid);
        }
        let busy = wiring.alloc_pin(id.clone(), "busy", PinMode::Gpio);
        wiring.pin_mut(busy).configure(true, ElectricalState::High);
        wiring.pin_mut(busy).set_state(ElectricalState::High, None); // idle = high (spec §9)
        common.pins.insert("busy".into(), busy);

        let bytes_per_row = (width + 7) / 8;
        let size = (bytes_per_row * height) as usize;
        Self {
            common,
            width,
            height,
            rotation,
            bytes_per_row,
            pending_black: vec![0xff; size],
            pending_color: vec![0xff; size],
            committed_black: vec![0xff; size],
            committed_color: vec![0xff; size],
            selected: SelectedBuffer::Black,
            address_x: 0,
            address_y: 0,
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
            self.address_x = 0;
            self.address_y = 0;
            self.cur_cmd = None;
            self.cmd_data.clear();
            self.common.mark_update();
        }
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
            match byte {
                CMD_SELECT_BLACK => self.selected = SelectedBuffer::Black,
                CMD_SELECT_COLOR => self.selected = SelectedBuffer::Color,
                CMD_COMMIT => {
                    self.committed_black.copy_from_slice(&self.pending_black);
                    self.committed_color.copy_from_slice(&self.pending_color);
                    self.common.mark_update();
                }
                _ => {}
            }
            return None;
        }
        let buffer = match self.selected {
            SelectedBuffer::Black => &mut self.pending_black,
            SelectedBuffer::Color => &mut self.pending_color,
        };
        match self.cur_cmd {
            Some(CMD_SELECT_BLACK) | Some(CMD_SELECT_COLOR) => {
                let row = self.address_y.min(self.height.saturating_sub(1));
                let idx = (row * self.bytes_per_row + self.address_x) as usize;
                if idx < buffer.len() {
                    buffer[idx] = byte;
                }
                self.address_x = (self.address_x + 1).min(self.bytes_per_row);
            }
            Some(CMD_SET_WINDOW_Y) => {} // window tracking omitted: full-buffer writes only.
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

    /// Per-pixel compositing (spec §4.5): black bit clear + color bit set
    /// -> black; color bit clear -> the third color; else white.
    pub fn get_state(&self, _wiring: &Wiring) -> PartSnapshot {
        let (out_w, out_h) = if self.rotation % 2 == 1 { (self.height, self.width) } else { (self.width, self.height) };
        let mut rgba = vec![0u8; (out_w * out_h * 4) as usize];
        for y in 0..self.height {
            for x in 0..self.width {
                let bi = (y * self.bytes_per_row + x / 8) as usize;
                let bit = 7 - (x % 8);
                let black_set = (self.committed_black[bi] >> bit) & 1 != 0;
                let color_set = (self.committed_color[bi] >> bit) & 1 != 0;
                let rgb = if !black_set && color_set {
                    [0, 0, 0]
                } else if !color_set {
                    [0xff, 0x40, 0x40] // the "third color", stylized red/yellow accent
                } else {
                    [0xff, 0xff, 0xff]
                };
                let (ox, oy) = super::epd2in13::rotate(x, y, self.width, self.height, self.rotation);
                if ox < out_w && oy < out_h {
                    let o = ((oy * out_w + ox) * 4) as usize;
                    rgba[o..o + 3].copy_from_slice(&rgb);
                    rgba[o + 3] = 0xff;
                }
            }
        }
        let mut snap = PartSnapshot::new(self.common.id.clone());
        snap.canvas = Some(Canvas { width: out_w, height: out_h, rgba });
        snap
    }
}
