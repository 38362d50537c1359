// Copyright 2022 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

use std::collections::VecDeque;

use crate::Error;
use crate::Result;

/// Presentation timestamps of the pictures submitted to an encoder, in submission order.
///
/// An encoder that reorders pictures emits packets whose decode timestamps must not exceed their
/// presentation timestamps. The first output fixes a delay that shifts every later popped
/// timestamp, so decode timestamps stay monotonic and start before the first presentation
/// timestamp.
#[derive(Debug, Default)]
pub struct TimestampQueue {
    pending: VecDeque<i64>,
    delay: Option<i64>,
    pushed: u64,
    popped: u64,
}

impl TimestampQueue {
    /// Creates an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the timestamp of a submitted picture.
    pub fn push(&mut self, pts: i64) {
        self.pending.push_back(pts);
        self.pushed += 1;
    }

    /// Pops the oldest timestamp and returns the decode timestamp of the packet being output.
    ///
    /// With `reorder` set, the first call that leaves a timestamp pending computes the delay as
    /// the newest still pending timestamp minus the popped one. The delay never changes
    /// afterwards. Until then, the decode timestamp is the popped timestamp.
    pub fn pop_dts(&mut self, reorder: bool) -> Result<i64> {
        let pts = self
            .pending
            .pop_front()
            .ok_or(Error::TimestampQueueEmpty)?;
        self.popped += 1;
        if reorder && self.delay.is_none() {
            if let Some(newest) = self.pending.back() {
                self.delay = Some(newest - pts);
            }
        }
        Ok(pts - self.delay.unwrap_or(0))
    }

    /// Delay fixed by the first output, if any.
    pub fn delay(&self) -> Option<i64> {
        self.delay
    }

    /// Number of timestamps waiting for an output.
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// Whether no timestamp is waiting for an output.
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Number of timestamps pushed since creation.
    pub fn pushed(&self) -> u64 {
        self.pushed
    }

    /// Number of timestamps popped since creation.
    pub fn popped(&self) -> u64 {
        self.popped
    }

    /// Forgets pending timestamps. The delay is kept, so timestamps stay monotonic across a seek.
    pub fn clear(&mut self) {
        self.pending.clear();
    }
}
