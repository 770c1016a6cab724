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

//! NETCONN: the responder side of a half-duplex serial link to a network
//! adapter.
//!
//! The adapter (the controller) drives every exchange. This crate answers
//! with checksummed, optionally chunked transactions, retried from a
//! resume point on failure. A [`program::StepProgram`] decides which
//! transaction comes next; the [`engine::Engine`] carries it out one poll
//! at a time.

pub mod checksum;
pub mod chunk;
pub mod driver;
pub mod engine;
pub mod policy;
pub mod program;
pub mod protocol;
pub mod serial;
pub mod session;

pub use engine::{Engine, TransferError};
pub use policy::CancelSignal;
pub use program::{Download, DownloadKind, LinkUp, LinkUpConfig, NetworkStatus, PlayerInfo, Reporter, StepProgram};
pub use serial::{Link, SerialLink};
pub use session::{Outcome, Session, State};
