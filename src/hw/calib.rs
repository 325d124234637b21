// SPDX-License-Identifier: MIT
// © 2025–2026 Christopher Liu

//! Factory calibration bytes.
//!
//! On the STM32F7 the identity source is the device electronic signature block, which starts with
//! the 96-bit unique ID. The [`CALIB_ADDRS`] offsets index into that block.

use crate::ident::{droplet_id, DropletId, CALIB_ADDRS};

/// Base of the electronic signature block (unique device ID).
const SIGNATURE_BASE: usize = 0x1FF0_F420;

/// Read the 16 calibration words feeding the identity checksum.
pub fn read_calibration_words() -> [u16; 16] {
    let mut words = [0u16; 16];
    for (w, &offset) in words.iter_mut().zip(CALIB_ADDRS.iter()) {
        let addr = SIGNATURE_BASE + offset as usize;
        // SAFETY: the signature block is always mapped and read-only.
        *w = u16::from(unsafe { core::ptr::read_volatile(addr as *const u8) });
    }
    words
}

/// Identity of this unit.
pub fn read_droplet_id() -> DropletId {
    droplet_id(&read_calibration_words())
}
