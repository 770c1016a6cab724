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


//! Link-Up: register the player with the network adapter and fetch the
//! server's welcome message.

use tracing::debug;
use crate::chunk::ChunkError;
use crate::program::{ConfigError, Reporter, StepProgram, Wait};
use crate::protocol::{
    CONNECTION_SUCCESS, CONNECT_INFO_REQ, LINK_INFO_REQ, LINK_UP_WAIT_TICKS, MAX_CONNECTION_RETRIES,
    MINIMUM_CHUNK_SIZE, NETWORK_MIN_ERROR, NETWORK_STATE_WAITING, PLAYER_INFO_REQ,
    PROGRESS_MARKER_TICKS, RECEIVE_CHANNEL_F0_REQ, SEND_REQ, SET_CHANNEL2_REQ, WORKSPACE_LEN,
};
use crate::session::{Outcome, Payload, Session, State};

const NAME: &str = "link-up";

/// Longest player name; the ninth byte is always a terminator.
pub const PLAYER_NAME_LEN: usize = 7;
pub const PLAYER_INFO_LEN: usize = 14;
/// Longest game name or server address the workspace will stage.
pub const MAX_FIELD_LEN: usize = 64;

/// Prefix written ahead of the welcome message.
pub const WELCOME_PREFIX: &[u8] = b"INCOMMING...\n";
pub const WELCOME_LEN: u16 = 48;
/// Terminator forced after the welcome message.
pub const MESSAGE_END: u8 = 0xFF;

const WAIT: Wait = Wait {
    ticks: LINK_UP_WAIT_TICKS,
    marker_every: PROGRESS_MARKER_TICKS,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkUpStep {
    SendPlayerData,
    AppendGameName,
    UsePlayerInfo,
    SendNetworkInfo,
    UseNetworkInfo,
    WaitForServer,
    RequestNetworkStatus,
    HandleNetworkStatus,
    ReceiveWelcome,
    Finish,
}

/// What the adapter reported about its connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkStatus {
    /// No status received yet
    Unknown,
    /// The run was cancelled or gave up
    Offline,
    /// The adapter answered but could not reach the server
    AttachedNoInternet,
    Online,
}

// ============================================================================
// Configuration
// ============================================================================

/// Player record in its 14-byte wire layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlayerInfo {
    pub name: [u8; 8],
    pub gender: u8,
    pub warp_flags: u8,
    pub trainer_id: [u8; 4],
}

impl PlayerInfo {
    /// Player record with `name` padded out with terminators.
    pub fn new(name: &str, gender: u8, trainer_id: u32) -> Result<Self, ConfigError> {
        let bytes = name.as_bytes();
        if bytes.len() > PLAYER_NAME_LEN {
            return Err(ConfigError::TooLong {
                field: "player name",
                len: bytes.len(),
                max: PLAYER_NAME_LEN,
            });
        }

        let mut padded = [MESSAGE_END; 8];
        padded[..bytes.len()].copy_from_slice(bytes);
        Ok(PlayerInfo {
            name: padded,
            gender,
            warp_flags: 0,
            trainer_id: trainer_id.to_le_bytes(),
        })
    }

    pub fn to_bytes(&self) -> [u8; PLAYER_INFO_LEN] {
        let mut out = [0u8; PLAYER_INFO_LEN];
        out[..8].copy_from_slice(&self.name);
        out[8] = self.gender;
        out[9] = self.warp_flags;
        out[10..].copy_from_slice(&self.trainer_id);
        out
    }
}

impl Default for PlayerInfo {
    fn default() -> Self {
        PlayerInfo {
            name: [MESSAGE_END; 8],
            gender: 0,
            warp_flags: 0,
            trainer_id: [0; 4],
        }
    }
}

#[derive(Debug, Clone)]
pub struct LinkUpConfig {
    pub player: PlayerInfo,
    pub game_name: Vec<u8>,
    pub server_addr: Vec<u8>,
    pub retries: i8,
}

impl Default for LinkUpConfig {
    fn default() -> Self {
        LinkUpConfig {
            player: PlayerInfo::default(),
            game_name: b"Emerald Net Demo 1.0".to_vec(),
            server_addr: b"127.0.0.1:9000".to_vec(),
            retries: MAX_CONNECTION_RETRIES,
        }
    }
}

// ============================================================================
// Program
// ============================================================================

pub struct LinkUp {
    config: LinkUpConfig,
    reporter: Box<dyn Reporter>,
    workspace: [u8; WORKSPACE_LEN],
    status: NetworkStatus,
    outcome: Option<Outcome>,
}

impl LinkUp {
    pub fn new(config: LinkUpConfig, reporter: Box<dyn Reporter>) -> Result<Self, ConfigError> {
        for (field, value) in [("game name", &config.game_name), ("server address", &config.server_addr)] {
            if value.len() > MAX_FIELD_LEN {
                return Err(ConfigError::TooLong {
                    field,
                    len: value.len(),
                    max: MAX_FIELD_LEN,
                });
            }
        }

        Ok(LinkUp {
            config,
            reporter,
            workspace: [0; WORKSPACE_LEN],
            status: NetworkStatus::Unknown,
            outcome: None,
        })
    }

    pub fn status(&self) -> NetworkStatus {
        self.status
    }

    pub fn outcome(&self) -> Option<Outcome> {
        self.outcome
    }

    /// The prefixed welcome message, once a run has finished online.
    pub fn welcome_message(&self) -> Option<&[u8]> {
        if self.outcome != Some(Outcome::Finished) || self.status != NetworkStatus::Online {
            return None;
        }
        let end = WELCOME_PREFIX.len() + WELCOME_LEN as usize;
        let message = &self.workspace[..end];
        let len = message.iter().position(|&b| b == MESSAGE_END).unwrap_or(end);
        Some(&message[..len])
    }

    /// Copy `bytes` to the start of the workspace and describe them as a payload.
    fn stage(&mut self, bytes: &[u8]) -> Payload {
        self.workspace[..bytes.len()].copy_from_slice(bytes);
        Payload::Workspace {
            offset: 0,
            len: bytes.len() as u16,
        }
    }

    fn handle_status(&mut self, session: &mut Session<LinkUpStep>) {
        let [echo_hi, echo_lo, state, result, ..] = self.workspace;
        debug!("network status {:02X} {:02X} {:02X} {:02X}", echo_hi, echo_lo, state, result);

        if [echo_hi, echo_lo] != LINK_INFO_REQ.to_be_bytes() {
            debug!("unexpected status echo 0x{:02X}{:02X}", echo_hi, echo_lo);
            session.jump(LinkUpStep::RequestNetworkStatus);
        } else if result >= NETWORK_MIN_ERROR {
            self.status = NetworkStatus::AttachedNoInternet;
            session.jump(LinkUpStep::Finish);
        } else if result == CONNECTION_SUCCESS && state == NETWORK_STATE_WAITING {
            self.status = NetworkStatus::Online;
            session.jump(LinkUpStep::ReceiveWelcome);
        } else {
            session.jump(LinkUpStep::WaitForServer);
        }
    }
}

impl StepProgram for LinkUp {
    type Step = LinkUpStep;

    fn name(&self) -> &'static str {
        NAME
    }

    fn begin(&self) -> Session<LinkUpStep> {
        Session::new(LinkUpStep::SendPlayerData, self.config.retries, true)
    }

    fn workspace(&mut self) -> &mut [u8] {
        &mut self.workspace
    }

    fn on_process(&mut self, session: &mut Session<LinkUpStep>) -> Result<(), ChunkError> {
        match session.next_step() {
            LinkUpStep::SendPlayerData => {
                let payload = self.stage(&self.config.player.to_bytes());
                session.configure(SEND_REQ, payload, State::Send, LinkUpStep::AppendGameName);
            }
            LinkUpStep::AppendGameName => {
                let name = self.config.game_name.clone();
                let payload = self.stage(&name);
                session.configure(SET_CHANNEL2_REQ, payload, State::Send, LinkUpStep::UsePlayerInfo);
            }
            LinkUpStep::UsePlayerInfo => {
                session.configure(PLAYER_INFO_REQ, Payload::EMPTY, State::Send, LinkUpStep::SendNetworkInfo);
            }
            LinkUpStep::SendNetworkInfo => {
                session.set_retry_point(LinkUpStep::SendNetworkInfo);
                let addr = self.config.server_addr.clone();
                let payload = self.stage(&addr);
                session.configure(SEND_REQ, payload, State::Send, LinkUpStep::UseNetworkInfo);
            }
            LinkUpStep::UseNetworkInfo => {
                session.configure(CONNECT_INFO_REQ, Payload::EMPTY, State::Send, LinkUpStep::WaitForServer);
            }
            LinkUpStep::WaitForServer => {
                WAIT.tick_reporting(session, LinkUpStep::RequestNetworkStatus, NAME, self.reporter.as_mut());
            }
            LinkUpStep::RequestNetworkStatus => {
                session.set_disable_checks(true);
                session.set_retry_point(LinkUpStep::RequestNetworkStatus);
                session.configure(
                    LINK_INFO_REQ,
                    Payload::Workspace { offset: 0, len: 4 },
                    State::Receive,
                    LinkUpStep::HandleNetworkStatus,
                );
            }
            LinkUpStep::HandleNetworkStatus => self.handle_status(session),
            LinkUpStep::ReceiveWelcome => {
                session.set_disable_checks(false);
                if session.repeat_count() == 0 {
                    session.set_retry_point(LinkUpStep::ReceiveWelcome);
                    self.stage(WELCOME_PREFIX);
                }
                session.configure_chunked(
                    RECEIVE_CHANNEL_F0_REQ,
                    WELCOME_PREFIX.len(),
                    WELCOME_LEN,
                    State::Receive,
                    LinkUpStep::Finish,
                    MINIMUM_CHUNK_SIZE,
                )?;
            }
            LinkUpStep::Finish => {
                self.workspace[WELCOME_PREFIX.len() + WELCOME_LEN as usize] = MESSAGE_END;
                session.finish();
            }
        }
        Ok(())
    }

    fn on_cancel(&mut self) {
        self.status = NetworkStatus::Offline;
        self.outcome = Some(Outcome::Cancelled);
    }

    fn on_finish(&mut self) {
        self.outcome = Some(Outcome::Finished);
    }
}

// ============================================================================
// Tests
// ============================================================================
