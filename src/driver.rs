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


//! Fixed-cadence scheduler: poll the engine once per tick until the
//! program's terminal continuation has run.

use std::thread;
use std::time::Duration;
use tracing::debug;
use crate::engine::Engine;
use crate::policy::CancelSignal;
use crate::program::StepProgram;
use crate::serial::Link;
use crate::session::Outcome;

/// Run `program` to completion, sleeping `tick` between polls.
pub fn run<L, P, C>(engine: &mut Engine<L>, program: &mut P, cancel: &C, tick: Duration) -> Outcome
where
    L: Link,
    P: StepProgram,
    C: CancelSignal + ?Sized,
{
    let mut session = program.begin();
    let mut polls: u64 = 0;

    loop {
        engine.poll(&mut session, program, cancel);
        polls += 1;

        if let Some(outcome) = session.outcome() {
            debug!("{} ended {:?} after {} polls", program.name(), outcome, polls);
            return outcome;
        }
        if !tick.is_zero() {
            thread::sleep(tick);
        }
    }
}
