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

//! Step programs: the use-case sequences layered on the transfer engine.
//!
//! A program is a table of named steps (its `Step` enum) plus the three
//! continuations the engine dispatches to. `on_process` runs once per
//! completed transaction and either arms the next one, moves to another
//! step, or finishes the session. Exactly one of `on_cancel` and
//! `on_finish` runs per session.

pub mod download;
pub mod link_up;

use std::fmt::Debug;
use tracing::info;
use crate::chunk::ChunkError;
use crate::session::Session;

pub use download::{Download, DownloadKind, DownloadStep};
pub use link_up::{LinkUp, LinkUpConfig, LinkUpStep, NetworkStatus, PlayerInfo};

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("{field} is {len} bytes, at most {max} fit")]
    TooLong {
        field: &'static str,
        len: usize,
        max: usize,
    },
    #[error("slot must be an ASCII digit, got {0:?}")]
    InvalidSlot(char),
}

// ============================================================================
// Trait
// ============================================================================

pub trait StepProgram {
    type Step: Copy + PartialEq + Debug;

    fn name(&self) -> &'static str;

    /// A fresh session for one run of this program.
    fn begin(&self) -> Session<Self::Step>;

    /// Memory the session's payload regions point into.
    fn workspace(&mut self) -> &mut [u8];

    fn on_process(&mut self, session: &mut Session<Self::Step>) -> Result<(), ChunkError>;

    fn on_cancel(&mut self);

    fn on_finish(&mut self);
}

// ============================================================================
// Progress Reporting
// ============================================================================

/// Receives pacing feedback while a program waits on the server.
pub trait Reporter {
    fn waiting(&mut self, program: &'static str);

    fn marker(&mut self, program: &'static str, index: u16);
}

/// Reporter that only logs.
pub struct LogReporter;

impl Reporter for LogReporter {
    fn waiting(&mut self, program: &'static str) {
        info!("{}: waiting for server", program);
    }

    fn marker(&mut self, program: &'static str, index: u16) {
        info!("{}: still waiting ({})", program, index);
    }
}

// ============================================================================
// Wait Step
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitTick {
    Started,
    Marker(u16),
    Pending,
    Elapsed,
}

/// A busy-wait step counted in polls, using the session's repeat count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Wait {
    pub ticks: u16,
    pub marker_every: u16,
}

impl Wait {
    /// Count one poll; after `ticks` polls move the session on to `then`.
    pub fn tick<S: Copy + PartialEq + Debug>(&self, session: &mut Session<S>, then: S) -> WaitTick {
        let count = session.repeat_count();
        if count == 0 {
            session.tick();
            WaitTick::Started
        } else if count <= self.ticks {
            session.tick();
            if self.marker_every != 0 && count % self.marker_every == 0 {
                WaitTick::Marker(count / self.marker_every)
            } else {
                WaitTick::Pending
            }
        } else {
            session.jump(then);
            WaitTick::Elapsed
        }
    }

    /// Tick and forward progress to `reporter`.
    pub fn tick_reporting<S: Copy + PartialEq + Debug>(
        &self,
        session: &mut Session<S>,
        then: S,
        program: &'static str,
        reporter: &mut dyn Reporter,
    ) -> WaitTick {
        let tick = self.tick(session, then);
        match tick {
            WaitTick::Started => reporter.waiting(program),
            WaitTick::Marker(index) => reporter.marker(program, index),
            WaitTick::Pending | WaitTick::Elapsed => {}
        }
        tick
    }
}

// ============================================================================
// Tests
// ============================================================================
