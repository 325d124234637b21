// SPDX-License-Identifier: MIT
// © 2025–2026 Christopher Liu

//! Unit identity.
//!
//! Every Droplet derives its 16-bit identity from the factory calibration row: the low byte of 16
//! calibration words is run through CRC-16/ARC (reflected polynomial 0xA001, init 0). The result is
//! stable across reboots and, in practice, unique per chip.
//!
//! | Parameter | Value |
//! |-----------|-------|
//! | Polynomial | 0x8005 (0xA001 reflected) |
//! | Init | 0x0000 |
//! | RefIn / RefOut | true |
//! | XorOut | 0x0000 |

/// Droplet identity.
pub type DropletId = u16;

/// Calibration-row word addresses that feed the identity checksum.
pub const CALIB_ADDRS: [u32; 16] = [
    0x00, 0x01, 0x02, 0x03, 0x04, 0x08, 0x09, 0x0A, 0x0B, 0x0C, 0x0D, 0x10, 0x12, 0x13, 0x14, 0x15,
];

/// Reflected CRC-16/ARC polynomial.
const POLY: u16 = 0xA001;

const CRC_TABLE: [u16; 256] = {
    let mut table = [0u16; 256];
    let mut i = 0;
    while i < 256 {
        let mut crc = i as u16;
        let mut j = 0;
        while j < 8 {
            if crc & 1 != 0 {
                crc = (crc >> 1) ^ POLY;
            } else {
                crc >>= 1;
            }
            j += 1;
        }
        table[i] = crc;
        i += 1;
    }
    table
};

/// Feed one byte into a running CRC-16/ARC.
#[inline]
#[must_use]
pub fn crc16_update(crc: u16, byte: u8) -> u16 {
    let index = ((crc ^ u16::from(byte)) & 0xFF) as usize;
    (crc >> 8) ^ CRC_TABLE[index]
}

/// CRC-16/ARC of a byte slice.
#[must_use]
pub fn crc16(data: &[u8]) -> u16 {
    data.iter().fold(0, |crc, &b| crc16_update(crc, b))
}

/// Derive the identity from the calibration words read at [`CALIB_ADDRS`].
#[must_use]
pub fn droplet_id(calib_words: &[u16; 16]) -> DropletId {
    calib_words
        .iter()
        .fold(0, |crc, &w| crc16_update(crc, (w & 0xFF) as u8))
}

/// Identities of the known units, indexed by ordinal.
pub const ORDERED_IDS: [DropletId; 121] = [
    0x0000, 0x0029, 0x0120, 0x01A9, 0x086B, 0x0B68, 0x1064, 0x11D3, 0x1266, 0x12AD, 0x1361,
    0x14AA, 0x1562, 0x1767, 0x18A2, 0x1927, 0x2668, 0x2826, 0x2C92, 0x3062, 0x32A7, 0x3493,
    0x382E, 0x392B, 0x392C, 0x3B61, 0x3D6C, 0x3F6D, 0x3F9D, 0x4327, 0x46A1, 0x4E2E, 0x4ED3,
    0x5161, 0x5264, 0x5A2F, 0x5B2F, 0x5C68, 0x5D61, 0x5E60, 0x5F2D, 0x5FEC, 0x6597, 0x6B6F,
    0x6C66, 0x6C6F, 0x6E67, 0x7022, 0x7066, 0x73AF, 0x75A1, 0x7D13, 0x7EDF, 0x8521, 0x8625,
    0x896F, 0x8F9C, 0x9029, 0x9261, 0x92DA, 0x9363, 0x9420, 0x9463, 0x9495, 0x9564, 0x9669,
    0x97A0, 0xA0D8, 0xA165, 0xA250, 0xA52F, 0xAF6A, 0xAFD8, 0xB122, 0xB36F, 0xB41B, 0xB561,
    0xBC63, 0xBC6E, 0xBCB5, 0xBD2D, 0xC051, 0xC32D, 0xCB64, 0xCBAB, 0xCCD1, 0xCD6B, 0xCFA1,
    0xD0AE, 0xD2D7, 0xD766, 0xD76C, 0xD86C, 0xD913, 0xDC62, 0xDC64, 0xDC9E, 0xDD21, 0xDF64,
    0xFA6F, 0xFCD0,
    // Audio Droplets
    0x2B4E, 0x7D78, 0x8B46, 0xC806, 0x4177, 0x0A0B, 0x3B49, 0x028C, 0x1F08, 0xEEB0, 0xA649,
    0xA5B5, 0xF60A, 0xB944, 0x3405, 0x43BA, 0x6648, 0x1B4B, 0xC24B, 0x4DB0,
];

/// Ordinal of a known unit.
pub fn ordinal(id: DropletId) -> Option<u8> {
    ORDERED_IDS.iter().position(|&k| k == id).map(|i| i as u8)
}

/// Identity of the unit with the given ordinal.
#[inline]
pub fn id_from_ordinal(ord: u8) -> Option<DropletId> {
    ORDERED_IDS.get(ord as usize).copied()
}
