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

use std::io::{Read, Write};
use std::time::Duration;
use serialport::{SerialPort as SerialPortTrait, ClearBuffer, DataBits, Parity, StopBits};

// ============================================================================
// Link Trait
// ============================================================================

/// Link conditions the engine waits on before exchanging a word
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ready {
    /// No exchange is in flight; a transaction may start
    Idle,
    /// The controller has clocked out the word we last wrote
    Transmitted,
    /// The controller has clocked in a word for us to read
    Received,
}

/// Word-level primitives of the responder side of the link.
///
/// The engine never initiates: it only writes a word for the controller to
/// collect, or reads one the controller delivered, after `ready` reports
/// the matching condition.
pub trait Link {
    fn reset(&mut self) -> std::io::Result<()>;

    fn send_word(&mut self, word: u32) -> std::io::Result<()>;

    fn recv_word(&mut self) -> std::io::Result<u32>;

    fn ready(&mut self, condition: Ready) -> std::io::Result<bool>;

    /// Suppress (or restore) link error reporting while a session owns the link.
    fn suppress_error_display(&mut self, suppress: bool);

    /// Drop a word still waiting in the transmit register.
    fn clear_transmit(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

// ============================================================================
// Real Serial Link Implementation
// ============================================================================

/// Serial link backed by the serialport crate. Words travel as four
/// little-endian bytes.
pub struct SerialLink {
    port: Box<dyn SerialPortTrait>,
    suppress_errors: bool,
}

impl SerialLink {
    pub fn open(
        port_name: &str,
        baud_rate: u32,
        data_bits: DataBits,
        parity: Parity,
        stop_bits: StopBits,
    ) -> Result<Self, serialport::Error> {
        let port = serialport::new(port_name, baud_rate)
            .data_bits(data_bits)
            .parity(parity)
            .stop_bits(stop_bits)
            .timeout(Duration::from_millis(100))
            .open()?;

        Ok(SerialLink { port, suppress_errors: false })
    }
}

/// Log a serial fault, quietly while a session has suppressed error display.
fn report<E>(suppressed: bool, e: E) -> std::io::Error
where
    E: Into<std::io::Error> + std::fmt::Display,
{
    if suppressed {
        tracing::debug!("serial error: {}", e);
    } else {
        tracing::warn!("serial error: {}", e);
    }
    e.into()
}

impl Link for SerialLink {
    fn reset(&mut self) -> std::io::Result<()> {
        self.port.clear(ClearBuffer::All).map_err(|e| report(self.suppress_errors, e))
    }

    fn send_word(&mut self, word: u32) -> std::io::Result<()> {
        let result = self.port.write_all(&word.to_le_bytes()).and_then(|()| self.port.flush());
        result.map_err(|e| report(self.suppress_errors, e))
    }

    fn recv_word(&mut self) -> std::io::Result<u32> {
        let mut buf = [0u8; 4];
        self.port.read_exact(&mut buf).map_err(|e| report(self.suppress_errors, e))?;
        Ok(u32::from_le_bytes(buf))
    }

    fn ready(&mut self, condition: Ready) -> std::io::Result<bool> {
        match condition {
            Ready::Idle => Ok(true),
            Ready::Transmitted => self.port.bytes_to_write()
                .map(|n| n == 0)
                .map_err(|e| report(self.suppress_errors, e)),
            Ready::Received => self.port.bytes_to_read()
                .map(|n| n >= 4)
                .map_err(|e| report(self.suppress_errors, e)),
        }
    }

    fn suppress_error_display(&mut self, suppress: bool) {
        self.suppress_errors = suppress;
    }

    fn clear_transmit(&mut self) -> std::io::Result<()> {
        self.port.clear(ClearBuffer::Output).map_err(|e| report(self.suppress_errors, e))
    }
}

// ============================================================================
// Mock Link for Testing
// ============================================================================

#[cfg(test)]
pub struct MockLink {
    // Words the controller delivers (None = not ready on this check)
    inbound: std::collections::VecDeque<Option<u32>>,
    // Answers to transmit checks, ready once exhausted
    transmit: std::collections::VecDeque<bool>,
    // Track what was written
    write_log: Vec<u32>,
    // Expected writes for verification, None = not checked
    expected_writes: Option<Vec<u32>>,
    pub resets: usize,
    pub suppressed: bool,
}

#[cfg(test)]
impl MockLink {
    pub fn new(responses: Vec<Option<u32>>, expected_writes: Vec<u32>) -> Self {
        MockLink {
            inbound: responses.into(),
            transmit: std::collections::VecDeque::new(),
            write_log: Vec::new(),
            expected_writes: Some(expected_writes),
            resets: 0,
            suppressed: false,
        }
    }

    /// A mock that only checks every scripted response was consumed.
    pub fn lenient(responses: Vec<Option<u32>>) -> Self {
        MockLink {
            inbound: responses.into(),
            transmit: std::collections::VecDeque::new(),
            write_log: Vec::new(),
            expected_writes: None,
            resets: 0,
            suppressed: false,
        }
    }

    /// Script whether the controller has collected our word, one entry per
    /// transmit check.
    pub fn transmit_script(mut self, ready: Vec<bool>) -> Self {
        self.transmit = ready.into();
        self
    }

    pub fn writes(&self) -> &[u32] {
        &self.write_log
    }
}

#[cfg(test)]
impl Link for MockLink {
    fn reset(&mut self) -> std::io::Result<()> {
        self.resets += 1;
        Ok(())
    }

    fn send_word(&mut self, word: u32) -> std::io::Result<()> {
        self.write_log.push(word);
        Ok(())
    }

    fn recv_word(&mut self) -> std::io::Result<u32> {
        match self.inbound.pop_front() {
            Some(Some(word)) => Ok(word),
            _ => Err(std::io::Error::new(
                std::io::ErrorKind::TimedOut,
                "Mock timeout"
            )),
        }
    }

    fn ready(&mut self, condition: Ready) -> std::io::Result<bool> {
        match condition {
            Ready::Idle => Ok(true),
            Ready::Transmitted => Ok(self.transmit.pop_front().unwrap_or(true)),
            Ready::Received => match self.inbound.front() {
                Some(Some(_)) => Ok(true),
                Some(None) => {
                    self.inbound.pop_front();
                    Ok(false)
                }
                None => Ok(false),
            },
        }
    }

    fn suppress_error_display(&mut self, suppress: bool) {
        self.suppressed = suppress;
    }
}

#[cfg(test)]
impl Drop for MockLink {
    fn drop(&mut self) {
        if std::thread::panicking() {
            return;
        }

        assert!(
            self.inbound.is_empty(),
            "MockLink dropped with {} unconsumed responses: {:08X?}",
            self.inbound.len(),
            self.inbound
        );

        assert!(
            self.transmit.is_empty(),
            "MockLink dropped with {} unconsumed transmit checks",
            self.transmit.len()
        );

        if let Some(expected) = &self.expected_writes {
            assert_eq!(
                &self.write_log,
                expected,
                "MockLink write log mismatch!\nExpected {} words:\n{:08X?}\nGot {} words:\n{:08X?}",
                expected.len(),
                expected,
                self.write_log.len(),
                self.write_log
            );
        }
    }
}
