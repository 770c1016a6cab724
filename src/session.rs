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

//! The live transfer session: one transaction armed at a time, plus the
//! bookkeeping a step program uses to sequence them.

use std::fmt::Debug;
use tracing::debug;
use crate::chunk::{self, ChunkError};
use crate::policy::{RetryPolicy, Verdict};

// ============================================================================
// States
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    /// Reset the link and send the clear word
    Init,
    /// Transmit the armed payload
    Send,
    /// Receive into the armed payload region
    Receive,
    /// Hand control to the step program
    Process,
    /// Consult the retry policy
    Error,
    /// Invoke the finish continuation
    Done,
}

/// Which terminal continuation ended the run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Finished,
    Cancelled,
}

/// Where a transaction's payload bytes live.
///
/// The session only describes the region; the bytes belong to the running
/// program's workspace and are borrowed for the duration of one poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Payload {
    /// `len` bytes of the workspace starting at `offset`
    Workspace { offset: usize, len: u16 },
    /// `len` zero bytes on send; discarded on receive
    Blank(u16),
}

impl Payload {
    pub const EMPTY: Payload = Payload::Blank(0);

    pub fn len(&self) -> u16 {
        match *self {
            Payload::Workspace { len, .. } => len,
            Payload::Blank(len) => len,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ============================================================================
// Session Structure
// ============================================================================

#[derive(Debug)]
pub struct Session<S> {
    state: State,
    command: u16,
    payload: Payload,
    allow_cancel: bool,
    disable_checks: bool,
    next_step: S,
    repeat_count: u16,
    // repeat_count as it was before the armed transaction was configured
    rollback_repeat: u16,
    policy: RetryPolicy<S>,
    outcome: Option<Outcome>,
}

impl<S: Copy + PartialEq + Debug> Session<S> {
    /// A fresh session that starts by resetting the link and then processes `first_step`.
    pub fn new(first_step: S, retries: i8, allow_cancel: bool) -> Self {
        Session {
            state: State::Init,
            command: 0,
            payload: Payload::EMPTY,
            allow_cancel,
            disable_checks: false,
            next_step: first_step,
            repeat_count: 0,
            rollback_repeat: 0,
            policy: RetryPolicy::new(retries, first_step),
            outcome: None,
        }
    }

    /// Arm the next transaction.
    ///
    /// `repeat_count` increments when `next_step` is the step already
    /// recorded and resets to zero otherwise.
    pub fn configure(&mut self, command: u16, payload: Payload, state: State, next_step: S) {
        self.command = command;
        self.payload = payload;
        self.state = state;
        self.rollback_repeat = self.repeat_count;

        if self.next_step == next_step {
            self.repeat_count = self.repeat_count.saturating_add(1);
        } else {
            self.repeat_count = 0;
        }
        self.next_step = next_step;

        debug!(
            "configured {:?} cmd=0x{:04X} payload={:?} next={:?} repeat={}",
            state, command, payload, next_step, self.repeat_count
        );
    }

    /// Arm the next chunk of a `full_len`-byte payload at workspace `offset`.
    ///
    /// Mid-stream chunks keep the current step so `repeat_count` walks the
    /// chunk index; the final chunk advances to `next_step`.
    pub fn configure_chunked(
        &mut self,
        command: u16,
        offset: usize,
        full_len: u16,
        state: State,
        next_step: S,
        chunk_size: u16,
    ) -> Result<(), ChunkError> {
        chunk::check_chunk_size(chunk_size)?;

        let chunk = chunk::next_chunk(full_len, chunk_size, self.repeat_count);
        let step = if chunk.is_final { next_step } else { self.next_step };
        debug!("chunk {} of {} bytes: {:?}", self.repeat_count, full_len, chunk);

        self.configure(
            command.wrapping_add(chunk.command_offset),
            Payload::Workspace {
                offset: offset + chunk.offset as usize,
                len: chunk.len,
            },
            state,
            step,
        );
        Ok(())
    }

    /// Move to `step` without a transaction; the session stays in Process.
    pub fn jump(&mut self, step: S) {
        if self.next_step != step {
            self.repeat_count = 0;
        }
        self.next_step = step;
    }

    /// Count one more poll on the current step, returning the new count.
    pub fn tick(&mut self) -> u16 {
        self.repeat_count = self.repeat_count.saturating_add(1);
        self.repeat_count
    }

    /// End the run successfully on the next poll.
    pub fn finish(&mut self) {
        self.state = State::Done;
    }

    pub fn set_retry_point(&mut self, step: S) {
        self.policy.set_retry_point(step);
    }

    pub fn set_disable_checks(&mut self, disable: bool) {
        self.disable_checks = disable;
    }

    pub fn set_allow_cancel(&mut self, allow: bool) {
        self.allow_cancel = allow;
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn command(&self) -> u16 {
        self.command
    }

    pub fn payload(&self) -> Payload {
        self.payload
    }

    pub fn allow_cancel(&self) -> bool {
        self.allow_cancel
    }

    pub fn disable_checks(&self) -> bool {
        self.disable_checks
    }

    pub fn next_step(&self) -> S {
        self.next_step
    }

    pub fn repeat_count(&self) -> u16 {
        self.repeat_count
    }

    pub fn retries_left(&self) -> i8 {
        self.policy.retries_left()
    }

    pub fn retry_point(&self) -> S {
        self.policy.retry_point()
    }

    pub fn outcome(&self) -> Option<Outcome> {
        self.outcome
    }

    pub fn is_terminated(&self) -> bool {
        self.outcome.is_some()
    }

    // ------------------------------------------------------------------------
    // Engine side
    // ------------------------------------------------------------------------

    pub(crate) fn set_state(&mut self, state: State) {
        self.state = state;
    }

    /// Force the armed transaction to fail fatally.
    pub(crate) fn force_cancel(&mut self) {
        self.policy.cancel();
        self.state = State::Error;
    }

    /// Spend a retry; on success rewind to the retry point with the failed
    /// transaction's chunk index restored.
    pub(crate) fn recover(&mut self) -> Verdict<S> {
        let verdict = self.policy.on_error();
        if let Verdict::Retry { resume_at } = verdict {
            self.state = State::Init;
            self.next_step = resume_at;
            self.repeat_count = self.rollback_repeat;
        }
        verdict
    }

    pub(crate) fn terminate(&mut self, outcome: Outcome) {
        self.outcome = Some(outcome);
    }
}

// ============================================================================
// Tests
// ============================================================================
