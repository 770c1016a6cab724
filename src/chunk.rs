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

//! Chunk planner: splits a logical payload into independently verified transactions.
//!
//! The chunk position travels in the command code, so no extra header
//! bytes are needed. Chunk `k` is sent as `base + k * chunk_size / MINIMUM_CHUNK_SIZE`.

use crate::protocol::MINIMUM_CHUNK_SIZE;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ChunkError {
    #[error("chunk size {chunk_size} is not a multiple of the {unit}-byte transfer unit")]
    Misaligned { chunk_size: u16, unit: u16 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunk {
    /// Added to the base command code
    pub command_offset: u16,
    /// Byte offset of this chunk in the payload
    pub offset: u16,
    pub len: u16,
    /// Whether the caller should advance to its next step after this chunk
    pub is_final: bool,
}

/// Reject chunk sizes the command-code arithmetic cannot address.
pub fn check_chunk_size(chunk_size: u16) -> Result<(), ChunkError> {
    if chunk_size % MINIMUM_CHUNK_SIZE != 0 {
        return Err(ChunkError::Misaligned {
            chunk_size,
            unit: MINIMUM_CHUNK_SIZE,
        });
    }
    Ok(())
}

/// Plan chunk number `repeat_count` of a `full_len`-byte payload.
///
/// A `chunk_size` of zero, or one covering the whole payload, yields a
/// single final chunk.
pub fn next_chunk(full_len: u16, chunk_size: u16, repeat_count: u16) -> Chunk {
    if full_len <= chunk_size || chunk_size == 0 {
        return Chunk {
            command_offset: 0,
            offset: 0,
            len: full_len,
            is_final: true,
        };
    }

    let full = full_len as u32;
    let size = chunk_size as u32;
    let start = size * repeat_count as u32;
    let command_offset = (start / MINIMUM_CHUNK_SIZE as u32) as u16;
    let end = start + size;

    let (len, is_final) = if end < full {
        (chunk_size, false)
    } else if end == full {
        (chunk_size, true)
    } else {
        ((full % size) as u16, true)
    };

    Chunk {
        command_offset,
        offset: start as u16,
        len,
        is_final,
    }
}

// ============================================================================
// Tests
// ============================================================================
