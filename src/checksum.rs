// Copyright (C) 2026 Brian Johnson
//
// This program is free software; you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation; either version 2 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along
// with this program; if not, write to the Free Software Foundation, Inc.,
// 51 Franklin Street, Fifth Floor, Boston, MA 02110-1301 USA.

//! 16-bit XOR-fold checksum carried in every check response word.
//!
//! The fold detects any single corrupted byte, but two corruptions that
//! flip the same bits in the same half-word position cancel out and pass.
//! That is accepted; the fold is a line check, not a hash.

use crate::protocol::CHECK_RESPONSE;

/// Initial fold value
pub const SEED: u16 = 0xFFFF;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Checksum(u16);

impl Default for Checksum {
    fn default() -> Self {
        Self::new()
    }
}

impl Checksum {
    pub const fn new() -> Self {
        Checksum(SEED)
    }

    pub fn fold(&mut self, half: u16) {
        self.0 ^= half;
    }

    /// Fold one wire word given as its four payload bytes, low byte of each half first.
    pub fn fold_bytes(&mut self, bytes: [u8; 4]) {
        self.fold(u16::from_le_bytes([bytes[0], bytes[1]]));
        self.fold(u16::from_le_bytes([bytes[2], bytes[3]]));
    }

    pub fn value(self) -> u16 {
        self.0
    }

    /// The check response word the peer must answer with.
    pub fn trailer(self) -> u32 {
        ((CHECK_RESPONSE as u32) << 16) | self.0 as u32
    }

    pub fn verify(self, trailer: u32) -> bool {
        trailer ^ self.trailer() == 0
    }
}

/// Split a payload into wire words, zero-padding the last one.
pub fn words(payload: &[u8]) -> impl Iterator<Item = [u8; 4]> + '_ {
    payload.chunks(4).map(|chunk| {
        let mut word = [0u8; 4];
        word[..chunk.len()].copy_from_slice(chunk);
        word
    })
}

/// Fold a whole payload from the seed.
pub fn checksum(payload: &[u8]) -> u16 {
    let mut sum = Checksum::new();
    for word in words(payload) {
        sum.fold_bytes(word);
    }
    sum.value()
}

pub fn verify(payload: &[u8], expected: u16) -> bool {
    checksum(payload) == expected
}

// ============================================================================
// Tests
// ============================================================================
