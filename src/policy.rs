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

//! Retry and cancellation policy.
//!
//! Every fault funnels into the session's Error state, where this policy
//! decides between resuming at the retry point and giving up. A user
//! cancel does not get its own path: it drives the budget negative so the
//! next decision is fatal no matter how many retries were left.

use std::cell::Cell;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::protocol::RETRIES_LEFT_CANCEL;

// ============================================================================
// Cancel Signal
// ============================================================================

/// Source of user cancel requests, sampled at the top of every poll and on
/// every iteration of a word-wait loop.
pub trait CancelSignal {
    fn is_cancelled(&self) -> bool;
}

impl CancelSignal for bool {
    fn is_cancelled(&self) -> bool {
        *self
    }
}

impl CancelSignal for AtomicBool {
    fn is_cancelled(&self) -> bool {
        self.load(Ordering::Relaxed)
    }
}

impl CancelSignal for Cell<bool> {
    fn is_cancelled(&self) -> bool {
        self.get()
    }
}

impl<T: CancelSignal + ?Sized> CancelSignal for &T {
    fn is_cancelled(&self) -> bool {
        (**self).is_cancelled()
    }
}

// ============================================================================
// Retry Policy
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict<S> {
    /// Reset the link and resume at this step
    Retry { resume_at: S },
    /// Budget exhausted or cancelled; route to the cancel continuation
    Fatal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy<S> {
    retries_left: i8,
    retry_point: S,
}

impl<S: Copy> RetryPolicy<S> {
    pub fn new(retries: i8, retry_point: S) -> Self {
        RetryPolicy {
            retries_left: retries,
            retry_point,
        }
    }

    pub fn retries_left(&self) -> i8 {
        self.retries_left
    }

    pub fn retry_point(&self) -> S {
        self.retry_point
    }

    /// Mark `step` as the checkpoint to resume into after a failure.
    pub fn set_retry_point(&mut self, step: S) {
        self.retry_point = step;
    }

    pub fn cancel(&mut self) {
        self.retries_left = RETRIES_LEFT_CANCEL;
    }

    pub fn is_cancelled(&self) -> bool {
        self.retries_left < 0
    }

    /// Spend one retry. Called exactly once per Error state entry.
    pub fn on_error(&mut self) -> Verdict<S> {
        self.retries_left = self.retries_left.saturating_sub(1);
        if self.retries_left < 0 {
            Verdict::Fatal
        } else {
            Verdict::Retry {
                resume_at: self.retry_point,
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
