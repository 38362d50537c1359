// Copyright 2022 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

use enumn::N;
use log::debug;

/// Mirror of the runtime's `AMF_TRACE_*` levels.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, N)]
#[repr(i32)]
#[allow(missing_docs)]
pub enum TraceLevel {
    Trace = 0,
    Debug = 1,
    Info = 2,
    Warning = 3,
    Error = 4,
    Nolog = 100,
}

/// Destination of the runtime's trace messages.
pub trait LogSink {
    /// Receives one message. `scope` names the part of the runtime that emitted it.
    fn write(&self, scope: &str, message: &str);
    /// Flushes buffered messages.
    fn flush(&self) {}
}

/// Sink forwarding runtime messages to the `log` facade under the `amf` target.
#[derive(Default)]
pub struct LogForwarder;

impl LogSink for LogForwarder {
    fn write(&self, scope: &str, message: &str) {
        debug!(target: "amf", "{}: {}", scope, message.trim_end());
    }
}
