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

//! Transfer session engine.
//!
//! Each call to [`Engine::poll`] advances the session by one state
//! transition. Word exchanges spin on the link for a bounded number of
//! iterations, checking for a cancel request on every iteration. The bound
//! is an iteration count, not a duration: the timeout it gives depends on
//! how fast `Link::ready` answers.

use std::fmt::Debug;
use tracing::{debug, info, warn};
use crate::checksum::Checksum;
use crate::policy::{CancelSignal, Verdict};
use crate::program::StepProgram;
use crate::protocol::{CLEAR_REQ, MAX_WAIT_LOOPS};
use crate::serial::{Link, Ready};
use crate::session::{Outcome, Payload, Session, State};

// ============================================================================
// Error Types
// ============================================================================

/// Why a transaction failed. All of these put the session in the Error state.
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("link not ready after {loops} loops")]
    Timeout { loops: u32 },
    #[error("check mismatch: expected 0x{expected:08X}, peer sent 0x{actual:08X}")]
    ChecksumMismatch { expected: u32, actual: u32 },
    #[error("cancelled by user")]
    Cancelled,
    #[error("payload {offset}+{len} is outside the {available}-byte workspace")]
    OutOfBounds {
        offset: usize,
        len: u16,
        available: usize,
    },
    #[error("link I/O error: {0}")]
    Link(#[from] std::io::Error),
}

// ============================================================================
// Engine Structure
// ============================================================================

pub struct Engine<L> {
    link: L,
    wait_loops: u32,
}

impl<L: Link> Engine<L> {
    pub fn new(link: L) -> Self {
        Self::with_wait_loops(link, MAX_WAIT_LOOPS)
    }

    /// An engine whose word exchanges time out after `wait_loops` iterations.
    pub fn with_wait_loops(link: L, wait_loops: u32) -> Self {
        Engine { link, wait_loops }
    }

    pub fn link(&self) -> &L {
        &self.link
    }

    /// Advance `session` by one transition, dispatching to `program`'s
    /// continuations. Returns the state the session is left in.
    ///
    /// Once a terminal continuation has run, further polls do nothing.
    pub fn poll<P, C>(&mut self, session: &mut Session<P::Step>, program: &mut P, cancel: &C) -> State
    where
        P: StepProgram,
        C: CancelSignal + ?Sized,
    {
        if session.is_terminated() {
            return session.state();
        }

        if session.allow_cancel() && cancel.is_cancelled() {
            debug!("cancel requested in {:?}", session.state());
            session.force_cancel();
        }

        match session.state() {
            State::Init => {
                debug!("--- INIT");
                self.init(session, cancel);
            }
            state @ (State::Send | State::Receive) => {
                debug!("--- {:?} cmd=0x{:04X}", state, session.command());
                match self.transact(session, program.workspace(), cancel) {
                    Ok(()) => session.set_state(State::Process),
                    Err(TransferError::Cancelled) => session.force_cancel(),
                    Err(e) => {
                        warn!("{} failed in {:?}: {}", program.name(), state, e);
                        session.set_state(State::Error);
                    }
                }
            }
            State::Process => {
                debug!("--- PROCESS {:?}", session.next_step());
                if let Err(e) = program.on_process(session) {
                    warn!("{}: {}", program.name(), e);
                    session.force_cancel();
                }
            }
            State::Error => {
                debug!("--- ERROR");
                if let Err(e) = self.link.clear_transmit() {
                    debug!("clearing transmit failed: {}", e);
                }
                match session.recover() {
                    Verdict::Retry { resume_at } => {
                        warn!(
                            "{}: retrying at {:?}, {} retries left",
                            program.name(), resume_at, session.retries_left()
                        );
                        self.reset_link();
                    }
                    Verdict::Fatal => {
                        info!("{}: cancelled", program.name());
                        self.release();
                        session.terminate(Outcome::Cancelled);
                        program.on_cancel();
                    }
                }
            }
            State::Done => {
                debug!("--- DONE");
                info!("{}: finished", program.name());
                self.release();
                session.terminate(Outcome::Finished);
                program.on_finish();
            }
        }

        session.state()
    }

    fn init<S, C>(&mut self, session: &mut Session<S>, cancel: &C)
    where
        S: Copy + PartialEq + Debug,
        C: CancelSignal + ?Sized,
    {
        self.reset_link();
        self.link.suppress_error_display(true);

        let mut wire = self.wire(session.allow_cancel(), cancel);
        match wire.xfer16(CLEAR_REQ, 0) {
            Err(TransferError::Cancelled) => session.force_cancel(),
            Err(e) => {
                debug!("clear request not collected: {}", e);
                session.set_state(State::Process);
            }
            Ok(()) => session.set_state(State::Process),
        }
    }

    fn transact<S, C>(&mut self, session: &Session<S>, workspace: &mut [u8], cancel: &C) -> Result<(), TransferError>
    where
        S: Copy + PartialEq + Debug,
        C: CancelSignal + ?Sized,
    {
        let payload = session.payload();
        let mut data = region(workspace, payload)?;
        let disable_checks = session.disable_checks();

        let mut wire = self.wire(session.allow_cancel(), cancel);
        wire.wait_for(Ready::Idle)?;

        if session.state() == State::Send {
            let sum = wire.transmit(session.command(), payload.len(), data.as_deref())?;
            let trailer = wire.recv32()?;
            check(sum, trailer, disable_checks)?;
            self.link.clear_transmit()?;
        } else {
            let sum = wire.receive(session.command(), payload.len(), data.as_deref_mut())?;
            let trailer = wire.recv32()?;
            check(sum, trailer, disable_checks)?;
        }
        Ok(())
    }

    fn wire<'a, C: CancelSignal + ?Sized>(&'a mut self, allow_cancel: bool, cancel: &'a C) -> Wire<'a, L, C> {
        Wire {
            link: &mut self.link,
            wait_loops: self.wait_loops,
            allow_cancel,
            cancel,
        }
    }

    fn reset_link(&mut self) {
        if let Err(e) = self.link.reset() {
            warn!("link reset failed: {}", e);
        }
    }

    fn release(&mut self) {
        self.link.suppress_error_display(false);
    }
}

// ============================================================================
// Wire Exchange
// ============================================================================

/// One transaction's view of the link.
struct Wire<'a, L, C: ?Sized> {
    link: &'a mut L,
    wait_loops: u32,
    allow_cancel: bool,
    cancel: &'a C,
}

impl<L: Link, C: CancelSignal + ?Sized> Wire<'_, L, C> {
    fn wait_for(&mut self, condition: Ready) -> Result<(), TransferError> {
        for _ in 0..=self.wait_loops {
            if self.allow_cancel && self.cancel.is_cancelled() {
                return Err(TransferError::Cancelled);
            }
            if self.link.ready(condition)? {
                return Ok(());
            }
        }
        Err(TransferError::Timeout { loops: self.wait_loops })
    }

    fn xfer16(&mut self, low: u16, high: u16) -> Result<(), TransferError> {
        self.xfer32(((high as u32) << 16) | low as u32)
    }

    fn xfer32(&mut self, word: u32) -> Result<(), TransferError> {
        self.link.send_word(word)?;
        self.wait_for(Ready::Transmitted)
    }

    fn recv32(&mut self) -> Result<u32, TransferError> {
        self.wait_for(Ready::Received)?;
        Ok(self.link.recv_word()?)
    }

    /// Send the header and payload words, folding both into the checksum.
    fn transmit(&mut self, command: u16, len: u16, data: Option<&[u8]>) -> Result<Checksum, TransferError> {
        let mut sum = Checksum::new();
        self.xfer16(command, len)?;
        sum.fold(command);
        sum.fold(len);

        for start in (0..len as usize).step_by(4) {
            let mut word = [0u8; 4];
            if let Some(data) = data {
                let end = (start + 4).min(data.len());
                word[..end - start].copy_from_slice(&data[start..end]);
            }
            self.xfer32(u32::from_le_bytes(word))?;
            sum.fold_bytes(word);
        }
        Ok(sum)
    }

    /// Send the header, then read payload words into `data` as they arrive.
    fn receive(&mut self, command: u16, len: u16, mut data: Option<&mut [u8]>) -> Result<Checksum, TransferError> {
        let mut sum = Checksum::new();
        self.xfer16(command, len)?;

        for start in (0..len as usize).step_by(4) {
            let word = self.recv32()?.to_be_bytes();
            if let Some(data) = data.as_deref_mut() {
                let end = (start + 4).min(data.len());
                data[start..end].copy_from_slice(&word[..end - start]);
            }
            sum.fold_bytes(word);
        }
        Ok(sum)
    }
}

fn region(workspace: &mut [u8], payload: Payload) -> Result<Option<&mut [u8]>, TransferError> {
    match payload {
        Payload::Blank(_) => Ok(None),
        Payload::Workspace { offset, len } => {
            let available = workspace.len();
            offset.checked_add(len as usize)
                .and_then(|end| workspace.get_mut(offset..end))
                .map(Some)
                .ok_or(TransferError::OutOfBounds { offset, len, available })
        }
    }
}

fn check(sum: Checksum, trailer: u32, disable_checks: bool) -> Result<(), TransferError> {
    if disable_checks || sum.verify(trailer) {
        Ok(())
    } else {
        Err(TransferError::ChecksumMismatch {
            expected: sum.trailer(),
            actual: trailer,
        })
    }
}

// ============================================================================
// Test Scripts
// ============================================================================


// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use super::script::*;
    use crate::chunk::ChunkError;
    use crate::protocol::*;
    use crate::serial::MockLink;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum Step {
        Start,
        Finish,
    }

    /// One (possibly chunked) transaction, then finish.
    struct OneShot {
        direction: State,
        command: u16,
        len: u16,
        chunk: u16,
        offset: usize,
        retries: i8,
        allow_cancel: bool,
        disable_checks: bool,
        // run the transaction with cancel held off
        hold_cancel: bool,
        workspace: [u8; 64],
        processed: usize,
        cancels: usize,
        finishes: usize,
    }

    impl OneShot {
        fn new(direction: State, command: u16, len: u16) -> Self {
            OneShot {
                direction,
                command,
                len,
                chunk: 0,
                offset: 0,
                retries: MAX_CONNECTION_RETRIES,
                allow_cancel: true,
                disable_checks: false,
                hold_cancel: false,
                workspace: [0; 64],
                processed: 0,
                cancels: 0,
                finishes: 0,
            }
        }
    }

    impl StepProgram for OneShot {
        type Step = Step;

        fn name(&self) -> &'static str {
            "one-shot"
        }

        fn begin(&self) -> Session<Step> {
            Session::new(Step::Start, self.retries, self.allow_cancel)
        }

        fn workspace(&mut self) -> &mut [u8] {
            &mut self.workspace
        }

        fn on_process(&mut self, session: &mut Session<Step>) -> Result<(), ChunkError> {
            self.processed += 1;
            match session.next_step() {
                Step::Start => {
                    session.set_disable_checks(self.disable_checks);
                    if self.hold_cancel {
                        session.set_allow_cancel(false);
                    }
                    session.configure_chunked(
                        self.command, self.offset, self.len, self.direction, Step::Finish, self.chunk,
                    )?;
                }
                Step::Finish => session.finish(),
            }
            Ok(())
        }

        fn on_cancel(&mut self) {
            self.cancels += 1;
        }

        fn on_finish(&mut self) {
            self.finishes += 1;
        }
    }

    /// Reports a cancel from the `after + 1`th check onwards.
    struct CancelAfter {
        checks: Cell<u32>,
        after: u32,
    }

    impl CancelSignal for CancelAfter {
        fn is_cancelled(&self) -> bool {
            self.checks.set(self.checks.get() + 1);
            self.checks.get() > self.after
        }
    }

    fn run_to_end<C: CancelSignal>(
        engine: &mut Engine<MockLink>,
        session: &mut Session<Step>,
        program: &mut OneShot,
        cancel: &C,
    ) -> Vec<State> {
        let mut states = Vec::new();
        for _ in 0..100 {
            states.push(engine.poll(session, program, cancel));
            if session.is_terminated() {
                return states;
            }
        }
        panic!("session never terminated: {:?}", states);
    }

    #[test]
    fn test_send_transaction() {
        let payload = b"BA_1";
        let mut program = OneShot::new(State::Send, SET_CHANNEL2_REQ, 4);
        program.workspace[..4].copy_from_slice(payload);

        let mut expected_writes = vec![CLEAR, header(SET_CHANNEL2_REQ, 4)];
        expected_writes.extend(send_words(payload));
        let link = MockLink::new(vec![Some(send_trailer(SET_CHANNEL2_REQ, payload))], expected_writes);

        let mut engine = Engine::new(link);
        let mut session = program.begin();
        let states = run_to_end(&mut engine, &mut session, &mut program, &false);

        assert_eq!(states, vec![State::Process, State::Send, State::Process, State::Done, State::Done]);
        assert_eq!(session.outcome(), Some(Outcome::Finished));
        assert_eq!((program.processed, program.finishes, program.cancels), (2, 1, 0));
        assert_eq!(engine.link().resets, 1);
        assert!(!engine.link().suppressed);

        // Terminated sessions ignore further polls
        assert_eq!(engine.poll(&mut session, &mut program, &false), State::Done);
        assert_eq!(program.finishes, 1);
    }

    #[test]
    fn test_send_pads_partial_word() {
        let payload = b"127.0.0.1:9000";
        let mut program = OneShot::new(State::Send, SEND_REQ, payload.len() as u16);
        program.workspace[..payload.len()].copy_from_slice(payload);
        program.workspace[payload.len()..].fill(0xEE);

        let mut expected_writes = vec![CLEAR, header(SEND_REQ, 14)];
        expected_writes.extend(send_words(payload));
        assert_eq!(*expected_writes.last().unwrap(), 0x0000_3030);
        let link = MockLink::new(vec![Some(send_trailer(SEND_REQ, payload))], expected_writes);

        let mut engine = Engine::new(link);
        let mut session = program.begin();
        run_to_end(&mut engine, &mut session, &mut program, &false);
        assert_eq!(session.outcome(), Some(Outcome::Finished));
    }

    #[test]
    fn test_receive_writes_big_endian_and_drops_padding() {
        let payload = [1u8, 2, 3, 4, 5, 6];
        let mut program = OneShot::new(State::Receive, RECEIVE_CHANNEL_F0_REQ, 6);
        program.workspace.fill(0xEE);

        let link = MockLink::new(
            recv_script(&payload),
            vec![CLEAR, header(RECEIVE_CHANNEL_F0_REQ, 6)],
        );

        let mut engine = Engine::new(link);
        let mut session = program.begin();
        run_to_end(&mut engine, &mut session, &mut program, &false);

        assert_eq!(session.outcome(), Some(Outcome::Finished));
        assert_eq!(&program.workspace[..6], &payload);
        assert_eq!(&program.workspace[6..8], &[0xEE, 0xEE]);
    }

    #[test]
    fn test_bad_checksum_retries_then_cancels() {
        let payload = b"MA_1";
        let mut program = OneShot::new(State::Send, SET_CHANNEL2_REQ, 4);
        program.retries = 2;
        program.workspace[..4].copy_from_slice(payload);

        let bad = send_trailer(SET_CHANNEL2_REQ, payload) ^ 0x0001;
        let mut attempt = vec![CLEAR, header(SET_CHANNEL2_REQ, 4)];
        attempt.extend(send_words(payload));
        let expected_writes = attempt.repeat(3);
        let link = MockLink::new(vec![Some(bad); 3], expected_writes);

        let mut engine = Engine::new(link);
        let mut session = program.begin();
        let states = run_to_end(&mut engine, &mut session, &mut program, &false);

        // two retries back through Init, then the fatal third failure
        assert_eq!(states.iter().filter(|s| **s == State::Init).count(), 2);
        assert_eq!(session.outcome(), Some(Outcome::Cancelled));
        assert_eq!((program.processed, program.finishes, program.cancels), (3, 0, 1));
        assert_eq!(session.retries_left(), -1);
        // one reset per Init plus one per retry
        assert_eq!(engine.link().resets, 5);
    }

    #[test]
    fn test_disabled_checks_accept_any_trailer() {
        let payload = b"GE_1";
        let mut program = OneShot::new(State::Send, TRANSMIT_CHANNEL2_REQ, 4);
        program.disable_checks = true;
        program.workspace[..4].copy_from_slice(payload);

        let link = MockLink::lenient(vec![Some(0xDEAD_BEEF)]);
        let mut engine = Engine::new(link);
        let mut session = program.begin();
        run_to_end(&mut engine, &mut session, &mut program, &false);

        assert_eq!(session.outcome(), Some(Outcome::Finished));
        assert_eq!(program.cancels, 0);
    }

    #[test]
    fn test_timeout_is_an_error() {
        let mut program = OneShot::new(State::Receive, LINK_INFO_REQ, 4);
        program.retries = 0;

        let link = MockLink::new(vec![], vec![CLEAR, header(LINK_INFO_REQ, 4)]);
        let mut engine = Engine::with_wait_loops(link, 8);
        let mut session = program.begin();
        let states = run_to_end(&mut engine, &mut session, &mut program, &false);

        assert_eq!(states, vec![State::Process, State::Receive, State::Error, State::Error]);
        assert_eq!(session.outcome(), Some(Outcome::Cancelled));
        assert_eq!(program.cancels, 1);
    }

    #[test]
    fn test_cancel_inside_wait_loop() {
        let mut program = OneShot::new(State::Receive, RECEIVE_CHANNEL_F0_REQ, 8);
        program.retries = 5;

        // First word arrives, then the controller stalls and the user cancels
        let link = MockLink::new(
            vec![Some(0x0A0B_0C0D), None],
            vec![CLEAR, header(RECEIVE_CHANNEL_F0_REQ, 8)],
        );
        let cancel = CancelAfter { checks: Cell::new(0), after: 8 };

        let mut engine = Engine::new(link);
        let mut session = program.begin();

        assert_eq!(engine.poll(&mut session, &mut program, &cancel), State::Process);
        assert_eq!(engine.poll(&mut session, &mut program, &cancel), State::Receive);
        assert_eq!(engine.poll(&mut session, &mut program, &cancel), State::Error);
        assert!(session.retries_left() < 0);
        assert_eq!(program.cancels, 0);

        // Partial data stays where it landed
        assert_eq!(&program.workspace[..8], &[0x0A, 0x0B, 0x0C, 0x0D, 0, 0, 0, 0]);

        assert_eq!(engine.poll(&mut session, &mut program, &cancel), State::Error);
        assert_eq!(session.outcome(), Some(Outcome::Cancelled));
        assert_eq!((program.finishes, program.cancels), (0, 1));
    }

    #[test]
    fn test_cancel_at_poll_overrides_budget() {
        let mut program = OneShot::new(State::Send, SEND_REQ, 0);
        program.retries = i8::MAX;

        let link = MockLink::new(vec![], vec![CLEAR]);
        let cancel = Cell::new(false);
        let mut engine = Engine::new(link);
        let mut session = program.begin();

        assert_eq!(engine.poll(&mut session, &mut program, &cancel), State::Process);
        cancel.set(true);
        assert_eq!(engine.poll(&mut session, &mut program, &cancel), State::Error);
        assert_eq!(session.outcome(), Some(Outcome::Cancelled));
        assert_eq!((program.processed, program.cancels), (0, 1));
    }

    #[test]
    fn test_cancel_ignored_when_not_allowed() {
        let payload = b"BA_1";
        let mut program = OneShot::new(State::Send, SET_CHANNEL2_REQ, 4);
        program.allow_cancel = false;
        program.workspace[..4].copy_from_slice(payload);

        let link = MockLink::lenient(vec![Some(send_trailer(SET_CHANNEL2_REQ, payload))]);
        let mut engine = Engine::new(link);
        let mut session = program.begin();
        run_to_end(&mut engine, &mut session, &mut program, &true);

        assert_eq!(session.outcome(), Some(Outcome::Finished));
    }

    #[test]
    fn test_transaction_can_hold_off_cancel() {
        let payload = b"BA_1";
        let mut program = OneShot::new(State::Send, SET_CHANNEL2_REQ, 4);
        program.hold_cancel = true;
        program.workspace[..4].copy_from_slice(payload);

        let mut expected_writes = vec![CLEAR, header(SET_CHANNEL2_REQ, 4)];
        expected_writes.extend(send_words(payload));
        let link = MockLink::new(vec![Some(send_trailer(SET_CHANNEL2_REQ, payload))], expected_writes);
        let cancel = Cell::new(false);
        let mut engine = Engine::new(link);
        let mut session = program.begin();

        assert_eq!(engine.poll(&mut session, &mut program, &cancel), State::Process);
        assert_eq!(engine.poll(&mut session, &mut program, &cancel), State::Send);
        assert!(!session.allow_cancel());

        // The request arrives once the run has stopped honouring it
        cancel.set(true);
        assert_eq!(engine.poll(&mut session, &mut program, &cancel), State::Process);
        assert_eq!(engine.poll(&mut session, &mut program, &cancel), State::Done);
        assert_eq!(engine.poll(&mut session, &mut program, &cancel), State::Done);
        assert_eq!(session.outcome(), Some(Outcome::Finished));
        assert_eq!(session.retries_left(), MAX_CONNECTION_RETRIES);
    }

    #[test]
    fn test_clear_not_collected_still_processes() {
        let mut program = OneShot::new(State::Send, SEND_REQ, 0);

        // The controller never picks up the clear word
        let link = MockLink::new(vec![Some(send_trailer(SEND_REQ, &[]))], vec![CLEAR, header(SEND_REQ, 0)])
            .transmit_script(vec![false; 3]);
        let mut engine = Engine::with_wait_loops(link, 2);
        let mut session = program.begin();
        let states = run_to_end(&mut engine, &mut session, &mut program, &false);

        assert_eq!(states, vec![State::Process, State::Send, State::Process, State::Done, State::Done]);
        assert_eq!(session.outcome(), Some(Outcome::Finished));
        assert_eq!(session.retries_left(), MAX_CONNECTION_RETRIES);
    }

    #[test]
    fn test_send_timeout_retries() {
        let payload = b"MA_1";
        let mut program = OneShot::new(State::Send, SET_CHANNEL2_REQ, 4);
        program.retries = 1;
        program.workspace[..4].copy_from_slice(payload);

        // Clear and header are collected, the payload word never is
        let stalled = [true, true, false, false, false];
        let mut attempt = vec![CLEAR, header(SET_CHANNEL2_REQ, 4)];
        attempt.extend(send_words(payload));
        let link = MockLink::new(vec![], attempt.repeat(2))
            .transmit_script(stalled.repeat(2));

        let mut engine = Engine::with_wait_loops(link, 2);
        let mut session = program.begin();
        let states = run_to_end(&mut engine, &mut session, &mut program, &false);

        assert_eq!(
            states,
            vec![
                State::Process, State::Send, State::Error, State::Init,
                State::Process, State::Send, State::Error, State::Error,
            ]
        );
        assert_eq!(session.outcome(), Some(Outcome::Cancelled));
        assert_eq!((program.finishes, program.cancels), (0, 1));
    }

    #[test]
    fn test_cancel_inside_transmit_wait() {
        let mut program = OneShot::new(State::Send, SET_CHANNEL2_REQ, 4);
        program.retries = 5;

        // Poll checks: 1 init, 3 process, 4 send; wait checks: 2 clear,
        // 5 idle, 6 header (not collected), 7 header again (cancelled)
        let link = MockLink::new(vec![], vec![CLEAR, header(SET_CHANNEL2_REQ, 4)])
            .transmit_script(vec![true, false]);
        let cancel = CancelAfter { checks: Cell::new(0), after: 6 };

        let mut engine = Engine::new(link);
        let mut session = program.begin();

        assert_eq!(engine.poll(&mut session, &mut program, &cancel), State::Process);
        assert_eq!(engine.poll(&mut session, &mut program, &cancel), State::Send);
        assert_eq!(engine.poll(&mut session, &mut program, &cancel), State::Error);
        assert!(session.retries_left() < 0);
        assert_eq!(program.cancels, 0);

        assert_eq!(engine.poll(&mut session, &mut program, &cancel), State::Error);
        assert_eq!(session.outcome(), Some(Outcome::Cancelled));
        assert_eq!((program.finishes, program.cancels), (0, 1));
    }

    #[test]
    fn test_chunked_retry_resends_failed_chunk() {
        let payload: Vec<u8> = (0..48).collect();
        let mut program = OneShot::new(State::Receive, RECEIVE_CHANNEL_F0_REQ, 48);
        program.chunk = MINIMUM_CHUNK_SIZE;

        let mut script = recv_script(&payload[..16]);
        let mut corrupt = recv_script(&payload[16..32]);
        if let Some(Some(trailer)) = corrupt.last_mut() {
            *trailer ^= 0x8000;
        }
        script.extend(corrupt);
        script.extend(recv_script(&payload[16..32]));
        script.extend(recv_script(&payload[32..]));

        let cmd = RECEIVE_CHANNEL_F0_REQ;
        let link = MockLink::new(
            script,
            vec![
                CLEAR,
                header(cmd, 16),
                header(cmd + 1, 16),
                CLEAR,
                header(cmd + 1, 16),
                header(cmd + 2, 16),
            ],
        );

        let mut engine = Engine::new(link);
        let mut session = program.begin();
        run_to_end(&mut engine, &mut session, &mut program, &false);

        assert_eq!(session.outcome(), Some(Outcome::Finished));
        assert_eq!(&program.workspace[..48], payload.as_slice());
        assert_eq!(session.retries_left(), MAX_CONNECTION_RETRIES - 1);
    }

    #[test]
    fn test_chunked_retry_resends_final_chunk() {
        let payload: Vec<u8> = (100..148).collect();
        let mut program = OneShot::new(State::Receive, RECEIVE_CHANNEL_F0_REQ, 48);
        program.chunk = MINIMUM_CHUNK_SIZE;

        let mut script = recv_script(&payload[..16]);
        script.extend(recv_script(&payload[16..32]));
        script.extend(vec![None; 4]);
        script.extend(recv_script(&payload[32..]));

        let cmd = RECEIVE_CHANNEL_F0_REQ;
        let link = MockLink::new(
            script,
            vec![
                CLEAR,
                header(cmd, 16),
                header(cmd + 1, 16),
                header(cmd + 2, 16),
                CLEAR,
                header(cmd + 2, 16),
            ],
        );

        // The stall outlasts the wait bound on the final chunk's first word
        let mut engine = Engine::with_wait_loops(link, 3);
        let mut session = program.begin();
        run_to_end(&mut engine, &mut session, &mut program, &false);

        assert_eq!(session.outcome(), Some(Outcome::Finished));
        assert_eq!(&program.workspace[..48], payload.as_slice());
    }

    #[test]
    fn test_misaligned_chunk_size_is_fatal() {
        let mut program = OneShot::new(State::Receive, RECEIVE_CHANNEL_F0_REQ, 48);
        program.chunk = 12;

        let link = MockLink::new(vec![], vec![CLEAR]);
        let mut engine = Engine::new(link);
        let mut session = program.begin();
        let states = run_to_end(&mut engine, &mut session, &mut program, &false);

        assert_eq!(states, vec![State::Process, State::Error, State::Error]);
        assert_eq!(session.outcome(), Some(Outcome::Cancelled));
    }

    #[test]
    fn test_region_outside_workspace_fails() {
        let mut program = OneShot::new(State::Receive, RECEIVE_CHANNEL_F0_REQ, 8);
        program.offset = 60;
        program.retries = 0;

        let link = MockLink::new(vec![], vec![CLEAR]);
        let mut engine = Engine::new(link);
        let mut session = program.begin();
        run_to_end(&mut engine, &mut session, &mut program, &false);

        assert_eq!(session.outcome(), Some(Outcome::Cancelled));
    }
}
