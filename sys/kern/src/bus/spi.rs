// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! SPI bus state machine (spec §4.3).
//!
//! A controller's `SCK` pin drives the clock; peripherals are found by
//! scanning the `SCK` net for pins in `spi-sck-in` mode. At most one
//! peripheral is expected to answer a given byte; if none do, the byte is
//! synthesized from the `SDI` net's idle level (or randomly, if floating).

use crate::pin::PinId;
use abi::ElectricalState;
use rand::Rng;

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Role {
    Controller,
    Peripheral,
}

/// The three pins a bus is configured with, plus its current role. Owned
/// by whichever part configured the bus (almost always the `Mcu`).
#[derive(Copy, Clone, Debug)]
pub struct SpiBus {
    pub role: Role,
    pub sck: PinId,
    pub sdo: PinId,
    pub sdi: PinId,
}

impl SpiBus {
    pub fn configure_as_controller(sck: PinId, sdo: PinId, sdi: PinId) -> Self {
        Self { role: Role::Controller, sck, sdo, sdi }
    }

    pub fn configure_as_peripheral(sck: PinId, sdo: PinId, sdi: PinId) -> Self {
        Self { role: Role::Peripheral, sck, sdo, sdi }
    }
}

/// Resolves one controller-side `transfer(byte)` call (spec §4.3): `deliver`
/// is invoked once per peripheral pin found on the `sck` net in
/// `spi-sck-in` mode, and should return `Some(byte)` if that peripheral
/// drove a response. At most one peripheral is expected to answer; this
/// takes the first `Some` and keeps delivering to the rest (a peripheral
/// that wasn't selected still needs the byte, e.g. to track its own clock,
/// even though it won't respond).
pub fn controller_transfer(
    sck_peers: &[PinId],
    byte: u8,
    sdi_net_state: ElectricalState,
    rng: &mut impl Rng,
    mut deliver: impl FnMut(PinId, u8) -> Option<u8>,
) -> u8 {
    let mut response = None;
    for &peer in sck_peers {
        if let Some(v) = deliver(peer, byte) {
            if response.is_none() {
                response = Some(v);
            }
        }
    }
    response.unwrap_or_else(|| match sdi_net_state {
        ElectricalState::Low | ElectricalState::Pulldown => 0x00,
        ElectricalState::High | ElectricalState::Pullup => 0xff,
        _ => rng.gen(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    #[test]
    fn single_responder_wins() {
        let mut rng = rand_chacha::ChaCha8Rng::seed_from_u64(0);
        let got = controller_transfer(&[1, 2], 0x42, ElectricalState::Floating, &mut rng, |peer, byte| {
            assert_eq!(byte, 0x42);
            if peer == 2 {
                Some(0xaa)
            } else {
                None
            }
        });
        assert_eq!(got, 0xaa);
    }

    #[test]
    fn no_responder_falls_back_to_sdi_level() {
        let mut rng = rand_chacha::ChaCha8Rng::seed_from_u64(0);
        let got = controller_transfer(&[], 0x00, ElectricalState::Low, &mut rng, |_, _| None);
        assert_eq!(got, 0x00);
        let got = controller_transfer(&[], 0x00, ElectricalState::High, &mut rng, |_, _| None);
        assert_eq!(got, 0xff);
    }
}
