// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Bus protocols layered on top of the pin/net model (spec §4.3): SPI,
//! I2C, and the WS2812 one-wire byte stream. Each submodule is a pure
//! dispatch function taking the net topology and a peer-delivery closure,
//! so the combination/fallback logic is unit-testable without a full
//! `Schematic` in the loop, the same way the teacher keeps protocol
//! framing (e.g. `drv/stm32h7-spi-server`) separate from its IPC plumbing.

pub mod i2c;
pub mod spi;
pub mod ws2812;
