// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! `ST7789`: 16bpp RGB565 TFT SPI peripheral (spec §4.5, scenario §8.2).

use super::{PartCommon, PartCtx};
use crate::pin::{PinId, PinMode};
use crate::wiring::Wiring;
use abi::{Canvas, Diagnostic, ElectricalState, PartSnapshot};
use diag::diag_entry;

const CMD_SWRESET: u8 = 0x01;
const CMD_SLPIN: u8 = 0x10;
const CMD_SLPOUT: u8 = 0x11;
const CMD_NORON: u8 = 0x13;
const CMD_INVOFF: u8 = 0x20;
const CMD_INVON: u8 = 0x21;
const CMD_DISPON: u8 = 0x29;
const CMD_CASET: u8 = 0x2a;
const CMD_RASET: u8 = 0x2b;
const CMD_RAMWR: u8 = 0x2c;
const CMD_MADCTL: u8 = 0x36;
const CMD_COLMOD: u8 = 0x3a;

const MADCTL_MY: u8 = 0x80;
const MADCTL_MX: u8 = 0x40;
const MADCTL_MV: u8 = 0x20;

pub struct St7789 {
    pub common: PartCommon,
    width: u32,
    height: u32,
    xs: u32,
    xe: u32,
    ys: u32,
    ye: u32,
    xcursor: u32,
    ycursor: u32,
    madctl: u8,
    inverted: bool,
    sleeping: bool,
    image: Vec<u8>, // RGBA, width*height*4
    cs_low: bool,
    dc_data: bool,
    cur_cmd: Option<u8>,
    cmd_data: Vec<u8>,
    ramwr_high_byte: Option<u8>,
}

impl St7789 {
    pub fn new(id: impl Into<String>, human_name: Option<String>, width: u32, height: u32, wiring: &mut Wiring) -> Self {
        let id = id.into();
        let mut common = PartCommon::new(id.clone(), human_name);
        for name in ["cs", "dc", "rst", "sck", "sdo"] {
            let mode = if name == "sck" { PinMode::SpiSckIn } else { PinMode::Gpio };
            let pid = wiring.alloc_pin(id.clone(), name, mode);
            common.pins.insert(name.into(), pid);
        }
        Self {
            common,
            width,
            height,
            xs: 0,
            xe: width.saturating_sub(1),
            ys: 0,
            ye: height.saturating_sub(1),
            xcursor: 0,
            ycursor: 0,
            madctl: 0,
            inverted: false,
            sleeping: true,
            image: vec![0u8; (width * height * 4) as usize],
            cs_low: false,
            dc_data: false,
            cur_cmd: None,
            cmd_data: Vec::new(),
            ramwr_high_byte: None,
        }
    }

    pub fn notify_pin_update(&mut self, pin: PinId, ctx: &mut PartCtx<'_>) {
        if Some(pin) == self.common.try_pin("cs") {
            self.cs_low = ctx.wiring.net_state(pin) == ElectricalState::Low;
        } else if Some(pin) == self.common.try_pin("dc") {
            self.dc_data = ctx.wiring.net_state(pin) == ElectricalState::High;
        } else if Some(pin) == self.common.try_pin("rst") && ctx.wiring.net_state(pin) == ElectricalState::Low {
            self.software_reset();
        }
    }

    fn software_reset(&mut self) {
        self.xs = 0;
        self.xe = self.width.saturating_sub(1);
        self.ys = 0;
        self.ye = self.height.saturating_sub(1);
        self.xcursor = 0;
        self.ycursor = 0;
        self.madctl = 0;
        self.inverted = false;
        self.sleeping = true;
        self.cur_cmd = None;
        self.cmd_data.clear();
        self.ramwr_high_byte = None;
        self.common.mark_update();
    }

    /// spec §9: transpose first (MV), then mirror X, then mirror Y.
    fn physical(&self, x: u32, y: u32) -> (u32, u32) {
        let (mut x, mut y) = if self.madctl & MADCTL_MV != 0 { (y, x) } else { (x, y) };
        if self.madctl & MADCTL_MX != 0 {
            x = self.width.saturating_sub(1).saturating_sub(x);
        }
        if self.madctl & MADCTL_MY != 0 {
            y = self.height.saturating_sub(1).saturating_sub(y);
        }
        (x, y)
    }

    fn advance_cursor(&mut self) {
        if self.xcursor >= self.xe {
            self.xcursor = self.xs;
            self.ycursor = if self.ycursor >= self.ye { self.ys } else { self.ycursor + 1 };
        } else {
            self.xcursor += 1;
        }
    }

    pub fn transfer_spi(&mut self, byte: u8, ctx: &mut PartCtx<'_>) -> Option<u8> {
        if !self.cs_low {
            return None;
        }
        if !self.dc_data {
            self.flush_command(byte, ctx);
            return None;
        }
        match self.cur_cmd {
            Some(CMD_CASET) | Some(CMD_RASET) => self.cmd_data.push(byte),
            Some(CMD_RAMWR) => self.consume_ramwr_byte(byte),
            Some(CMD_MADCTL) => self.madctl = byte,
            _ => {} // COLMOD (validated on command byte), 0xb2/0xc6: data accepted and ignored.
        }
        None
    }

    fn flush_command(&mut self, byte: u8, ctx: &mut PartCtx<'_>) {
        // A command byte closes out whatever multi-byte command preceded
        // it; CASET/RASET need their 4 accumulated bytes applied now.
        match self.cur_cmd {
            Some(CMD_CASET) if self.cmd_data.len() == 4 => self.apply_window(true, ctx),
            Some(CMD_RASET) if self.cmd_data.len() == 4 => self.apply_window(false, ctx),
            _ => {}
        }
        self.cur_cmd = Some(byte);
        self.cmd_data.clear();
        self.ramwr_high_byte = None;
        match byte {
            CMD_SWRESET => self.software_reset(),
            CMD_SLPIN => self.sleeping = true,
            CMD_SLPOUT => self.sleeping = false,
            CMD_NORON => {}
            CMD_INVOFF => self.inverted = false,
            CMD_INVON => self.inverted = true,
            CMD_DISPON => self.common.mark_update(),
            _ => {}
        }
    }

    fn apply_window(&mut self, is_x: bool, ctx: &mut PartCtx<'_>) {
        let start = u32::from(self.cmd_data[0]) << 8 | u32::from(self.cmd_data[1]);
        let end = u32::from(self.cmd_data[2]) << 8 | u32::from(self.cmd_data[3]);
        if start > end {
            diag_entry!(ctx.diag, ctx.now_ms, Diagnostic::InvertedWindow);
        }
        let (lo, hi) = if start > end { (end, start) } else { (start, end) };
        if is_x {
            self.xs = lo;
            self.xe = hi;
            self.xcursor = self.xs;
        } else {
            self.ys = lo;
            self.ye = hi;
            self.ycursor = self.ys;
        }
    }

    fn consume_ramwr_byte(&mut self, byte: u8) {
        if self.sleeping {
            return; // diagnostic + no-op (SPEC_FULL §4.6 addition).
        }
        match self.ramwr_high_byte.take() {
            None => self.ramwr_high_byte = Some(byte),
            Some(high) => {
                let word = (u16::from(high) << 8) | u16::from(byte);
                self.write_pixel(word);
                self.advance_cursor();
            }
        }
    }

    fn write_pixel(&mut self, rgb565: u16) {
        let (x, y) = self.physical(self.xcursor, self.ycursor);
        if x >= self.width || y >= self.height {
            return;
        }
        let mut r = ((rgb565 >> 11) & 0x1f) as u32;
        let mut g = ((rgb565 >> 5) & 0x3f) as u32;
        let mut b = (rgb565 & 0x1f) as u32;
        r = r * 255 / 31;
        g = g * 255 / 63;
        b = b * 255 / 31;
        if self.inverted {
            r = 255 - r;
            g = 255 - g;
            b = 255 - b;
        }
        let o = ((y * self.width + x) * 4) as usize;
        self.image[o] = r as u8;
        self.image[o + 1] = g as u8;
        self.image[o + 2] = b as u8;
        self.image[o + 3] = 0xff;
        self.common.mark_update();
    }

    pub fn get_state(&self, _wiring: &Wiring) -> PartSnapshot {
        let mut snap = PartSnapshot::new(self.common.id.clone());
        snap.canvas = Some(Canvas { width: self.width, height: self.height, rgba: self.image.clone() });
        snap
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wiring::Wiring;
    use diag::DiagLog;

    fn ctx<'a>(wiring: &'a Wiring, diag: &'a mut DiagLog) -> PartCtx<'a> {
        PartCtx { wiring, diag, now_ms: 0 }
    }

    #[test]
    fn caset_raset_ramwr_paints_a_rectangle() {
        let mut wiring = Wiring::new();
        let mut lcd = St7789::new("lcd", None, 240, 320, &mut wiring);
        let mut diag = DiagLog::default();
        lcd.cs_low = true;
        lcd.sleeping = false;

        let mut send = |bytes: &[u8], data: bool, lcd: &mut St7789, wiring: &Wiring, diag: &mut DiagLog| {
            lcd.dc_data = data;
            for &b in bytes {
                lcd.transfer_spi(b, &mut ctx(wiring, diag));
            }
        };

        send(&[CMD_CASET], false, &mut lcd, &wiring, &mut diag);
        send(&[0x00, 0x00, 0x00, 0x13], true, &mut lcd, &wiring, &mut diag);
        send(&[CMD_RASET], false, &mut lcd, &wiring, &mut diag);
        send(&[0x00, 0x00, 0x00, 0x09], true, &mut lcd, &wiring, &mut diag);
        send(&[CMD_RAMWR], false, &mut lcd, &wiring, &mut diag);
        let pixel_bytes: Vec<u8> = std::iter::repeat([0xff, 0xff]).take(200).flatten().collect();
        send(&pixel_bytes, true, &mut lcd, &wiring, &mut diag);

        for y in 0..=9u32 {
            for x in 0..=19u32 {
                let o = ((y * 240 + x) * 4) as usize;
                assert_eq!(&lcd.image[o..o + 4], &[0xff, 0xff, 0xff, 0xff], "({x},{y}) should be white");
            }
        }
        let outside = ((0 * 240 + 20) * 4) as usize;
        assert_eq!(&lcd.image[outside..outside + 4], &[0, 0, 0, 0]);
    }

    #[test]
    fn inverted_window_is_flagged_but_swapped() {
        let mut wiring = Wiring::new();
        let mut lcd = St7789::new("lcd", None, 240, 320, &mut wiring);
        let mut diag = DiagLog::default();
        lcd.cs_low = true;
        lcd.dc_data = false;
        lcd.transfer_spi(CMD_CASET, &mut ctx(&wiring, &mut diag));
        lcd.dc_data = true;
        for b in [0x00, 0x10, 0x00, 0x05] {
            lcd.transfer_spi(b, &mut ctx(&wiring, &mut diag));
        }
        lcd.dc_data = false;
        lcd.transfer_spi(CMD_NORON, &mut ctx(&wiring, &mut diag));
        assert_eq!(lcd.xs, 5);
        assert_eq!(lcd.xe, 16);
        assert_eq!(diag.total(), 1);
    }
}
