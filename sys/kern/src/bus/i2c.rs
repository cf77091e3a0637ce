// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! I2C bus state machine (spec §4.3). No part in the fixed variant set
//! (spec §4.5/§9) answers as an I2C peripheral, so in practice every
//! transfer on this crate's boards resolves to `NoAck`; the dispatch is
//! still implemented generically, against a peer list supplied by the
//! caller, since the host ABI (`__tinygo_i2c_*`, added per the original
//! TinyGo runtime surface) needs somewhere to land and a future part could
//! register as a responder without touching this module.

use crate::pin::PinId;
use abi::I2cError;

#[derive(Copy, Clone, Debug)]
pub struct I2cBus {
    pub scl: PinId,
    pub sda: PinId,
}

impl I2cBus {
    pub fn configure_as_controller(scl: PinId, sda: PinId) -> Self {
        Self { scl, sda }
    }
}

/// One `transfer(address, writeBytes, readLen)` call (spec §4.3). `find`
/// maps a 7-bit address to a responder (if any is wired onto this bus);
/// `deliver` hands the write bytes to it and asks for up to `read_len`
/// bytes back.
pub fn transfer(
    address: u8,
    write_bytes: &[u8],
    read_len: usize,
    mut find: impl FnMut(u8) -> Option<PinId>,
    mut deliver: impl FnMut(PinId, &[u8], usize) -> Result<Vec<u8>, I2cError>,
) -> (I2cError, Vec<u8>) {
    match find(address) {
        None => (I2cError::NoAck, Vec::new()),
        Some(responder) => match deliver(responder, write_bytes, read_len) {
            Ok(bytes) => (I2cError::Success, bytes),
            Err(e) => (e, Vec::new()),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unaddressed_peripheral_is_nack() {
        let (err, data) = transfer(0x50, &[0x00], 1, |_| None, |_, _, _| unreachable!());
        assert_eq!(err, I2cError::NoAck);
        assert!(data.is_empty());
    }

    #[test]
    fn addressed_peripheral_answers() {
        let (err, data) = transfer(0x50, &[0x00], 2, |addr| (addr == 0x50).then_some(7), |_, w, n| {
            assert_eq!(w, &[0x00]);
            Ok(vec![0xaa; n])
        });
        assert_eq!(err, I2cError::Success);
        assert_eq!(data, vec![0xaa, 0xaa]);
    }
}
