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

//! NETCONN protocol constants
//!
//! None of these are negotiated. Both ends of the link must be built with
//! the same values.

// ============================================================================
// Command Codes
// ============================================================================

/// Clear the controller's staging buffers, sent once per link (re)start
pub const CLEAR_REQ: u16 = 0x1000;

/// Stage the payload on the controller as outgoing request data
pub const SEND_REQ: u16 = 0x1100;

/// Write the payload into the controller's channel 2
pub const SET_CHANNEL2_REQ: u16 = 0x1200;

/// Ask the controller to forward channel 2 to the server
pub const TRANSMIT_CHANNEL2_REQ: u16 = 0x1300;

/// Use the staged data as player information
pub const PLAYER_INFO_REQ: u16 = 0x1400;

/// Use the staged data as the server address and start connecting
pub const CONNECT_INFO_REQ: u16 = 0x1500;

/// Read the controller's 4-byte network status
pub const LINK_INFO_REQ: u16 = 0x1600;

/// Read back server data. Chunk `k` uses `RECEIVE_CHANNEL_F0_REQ + k * chunk / MINIMUM_CHUNK_SIZE`
pub const RECEIVE_CHANNEL_F0_REQ: u16 = 0x1700;

/// High half of every check response word
pub const CHECK_RESPONSE: u16 = 0x4348;

// ============================================================================
// Transfer Limits
// ============================================================================

/// Smallest addressable transfer granularity in bytes; chunk sizes must be a multiple of it
pub const MINIMUM_CHUNK_SIZE: u16 = 16;

/// Iterations a word exchange may spin before it is a timeout
pub const MAX_WAIT_LOOPS: u32 = 3000;

/// Retry budget each use-case starts with
pub const MAX_CONNECTION_RETRIES: i8 = 3;

/// Value `retries_left` is driven to when the user cancels
pub const RETRIES_LEFT_CANCEL: i8 = -1;

/// Size of the scratch workspace shared by a program's transactions
pub const WORKSPACE_LEN: usize = 256;

// ============================================================================
// Pacing
// ============================================================================

/// Ticks the link-up sequence waits for the server connection
pub const LINK_UP_WAIT_TICKS: u16 = 60;

/// Ticks a download waits for the controller to pull server data
pub const DOWNLOAD_WAIT_TICKS: u16 = 40;

/// A progress marker is reported every this many wait ticks
pub const PROGRESS_MARKER_TICKS: u16 = 10;

// ============================================================================
// Network Status
// ============================================================================

/// Status byte 2: the controller is connected and waiting for us
pub const NETWORK_STATE_WAITING: u8 = 1;

/// Status byte 3: the controller reached the server
pub const CONNECTION_SUCCESS: u8 = 2;

/// Status byte 3: this value and above are connection failures
pub const NETWORK_MIN_ERROR: u8 = 3;
