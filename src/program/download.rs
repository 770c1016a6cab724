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


//! Download programs: ask the adapter for a record by tag, give the server
//! time to answer, then pull the record back in chunks.
//!
//! Battle, Mart and Gift-Egg downloads share one step table and differ in
//! their request tag and record size.

use std::fmt;
use crate::chunk::ChunkError;
use crate::program::{ConfigError, Reporter, StepProgram, Wait};
use crate::protocol::{
    DOWNLOAD_WAIT_TICKS, MAX_CONNECTION_RETRIES, MINIMUM_CHUNK_SIZE, PROGRESS_MARKER_TICKS,
    RECEIVE_CHANNEL_F0_REQ, SET_CHANNEL2_REQ, TRANSMIT_CHANNEL2_REQ, WORKSPACE_LEN,
};
use crate::session::{Outcome, Payload, Session, State};

pub const TRAINER_MON_LEN: u16 = 16;
pub const TRAINER_PARTY_SIZE: u16 = 3;
pub const MART_LEN: u16 = 16;
pub const GIFT_EGG_LEN: u16 = 4;

const WAIT: Wait = Wait {
    ticks: DOWNLOAD_WAIT_TICKS,
    marker_every: PROGRESS_MARKER_TICKS,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadKind {
    /// A trainer party for a link battle
    Battle,
    /// A list of mart items
    Mart,
    GiftEgg,
}

impl DownloadKind {
    pub fn name(self) -> &'static str {
        match self {
            DownloadKind::Battle => "battle-download",
            DownloadKind::Mart => "mart-download",
            DownloadKind::GiftEgg => "gift-egg-download",
        }
    }

    /// Two-letter prefix of the request tag.
    pub fn prefix(self) -> [u8; 2] {
        match self {
            DownloadKind::Battle => *b"BA",
            DownloadKind::Mart => *b"MA",
            DownloadKind::GiftEgg => *b"GE",
        }
    }

    /// Size of the record the server sends back.
    pub fn payload_len(self) -> u16 {
        match self {
            DownloadKind::Battle => TRAINER_MON_LEN * TRAINER_PARTY_SIZE,
            DownloadKind::Mart => MART_LEN,
            DownloadKind::GiftEgg => GIFT_EGG_LEN,
        }
    }
}

impl fmt::Display for DownloadKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadStep {
    SendRequest,
    TransmitRequest,
    WaitForServer,
    ReceiveData,
    Finish,
}

pub struct Download {
    kind: DownloadKind,
    slot: u8,
    retries: i8,
    reporter: Box<dyn Reporter>,
    workspace: [u8; WORKSPACE_LEN],
    outcome: Option<Outcome>,
}

impl Download {
    /// A download of `kind` from `slot`, an ASCII digit naming which record
    /// the server should hand back.
    pub fn new(kind: DownloadKind, slot: char, reporter: Box<dyn Reporter>) -> Result<Self, ConfigError> {
        if !slot.is_ascii_digit() {
            return Err(ConfigError::InvalidSlot(slot));
        }

        Ok(Download {
            kind,
            slot: slot as u8,
            retries: MAX_CONNECTION_RETRIES,
            reporter,
            workspace: [0; WORKSPACE_LEN],
            outcome: None,
        })
    }

    pub fn with_retries(mut self, retries: i8) -> Self {
        self.retries = retries;
        self
    }

    /// The four bytes sent to the adapter, e.g. `BA_1`.
    pub fn request_tag(&self) -> [u8; 4] {
        let [a, b] = self.kind.prefix();
        [a, b, b'_', self.slot]
    }

    pub fn outcome(&self) -> Option<Outcome> {
        self.outcome
    }

    /// The raw record, once the run has finished.
    pub fn payload(&self) -> Option<&[u8]> {
        match self.outcome {
            Some(Outcome::Finished) => Some(&self.workspace[..self.kind.payload_len() as usize]),
            _ => None,
        }
    }
}

impl StepProgram for Download {
    type Step = DownloadStep;

    fn name(&self) -> &'static str {
        self.kind.name()
    }

    fn begin(&self) -> Session<DownloadStep> {
        Session::new(DownloadStep::SendRequest, self.retries, true)
    }

    fn workspace(&mut self) -> &mut [u8] {
        &mut self.workspace
    }

    fn on_process(&mut self, session: &mut Session<DownloadStep>) -> Result<(), ChunkError> {
        match session.next_step() {
            DownloadStep::SendRequest => {
                let tag = self.request_tag();
                self.workspace[..tag.len()].copy_from_slice(&tag);
                session.configure(
                    SET_CHANNEL2_REQ,
                    Payload::Workspace { offset: 0, len: tag.len() as u16 },
                    State::Send,
                    DownloadStep::TransmitRequest,
                );
            }
            DownloadStep::TransmitRequest => {
                // the adapter does not answer transmit requests with a valid check
                session.set_disable_checks(true);
                session.set_retry_point(DownloadStep::TransmitRequest);
                self.workspace.fill(0);
                session.configure(
                    TRANSMIT_CHANNEL2_REQ,
                    Payload::Blank(4),
                    State::Send,
                    DownloadStep::WaitForServer,
                );
            }
            DownloadStep::WaitForServer => {
                let name = self.kind.name();
                WAIT.tick_reporting(session, DownloadStep::ReceiveData, name, self.reporter.as_mut());
            }
            DownloadStep::ReceiveData => {
                session.set_disable_checks(false);
                if session.repeat_count() == 0 {
                    session.set_retry_point(DownloadStep::ReceiveData);
                }
                session.configure_chunked(
                    RECEIVE_CHANNEL_F0_REQ,
                    0,
                    self.kind.payload_len(),
                    State::Receive,
                    DownloadStep::Finish,
                    MINIMUM_CHUNK_SIZE,
                )?;
            }
            DownloadStep::Finish => session.finish(),
        }
        Ok(())
    }

    fn on_cancel(&mut self) {
        self.outcome = Some(Outcome::Cancelled);
    }

    fn on_finish(&mut self) {
        self.outcome = Some(Outcome::Finished);
    }
}

// ============================================================================
// Tests
// ============================================================================
