// Copyright 2022 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

use std::fmt;

use enumn::N;

use crate::bindings::AMF_RESULT;

/// Result type of every call into the runtime. The error side carries the non-successful
/// `AMF_RESULT`.
pub type StatusResult<T> = std::result::Result<T, Status>;

/// Mirror of the runtime's `AMF_RESULT` codes.
#[derive(Copy, Clone, Debug, PartialEq, Eq, N)]
#[repr(i32)]
#[allow(missing_docs)]
pub enum Status {
    Ok = 0,
    Fail = 1,
    Unexpected = 2,
    AccessDenied = 3,
    InvalidArg = 4,
    OutOfRange = 5,
    OutOfMemory = 6,
    InvalidPointer = 7,
    NoInterface = 8,
    NotImplemented = 9,
    NotSupported = 10,
    NotFound = 11,
    AlreadyInitialized = 12,
    NotInitialized = 13,
    InvalidFormat = 14,
    WrongState = 15,
    FileNotOpen = 16,
    NoDevice = 17,
    DirectxFailed = 18,
    OpenclFailed = 19,
    GlxFailed = 20,
    XvFailed = 21,
    AlsaFailed = 22,
    Eof = 23,
    Repeat = 24,
    InputFull = 25,
    ResolutionChanged = 26,
    ResolutionUpdated = 27,
    InvalidDataType = 28,
    InvalidResolution = 29,
    CodecNotSupported = 30,
    SurfaceFormatNotSupported = 31,
    SurfaceMustBeShared = 32,
    DecoderNotPresent = 33,
    DecoderSurfaceAllocationFailed = 34,
    DecoderNoFreeSurfaces = 35,
    EncoderNotPresent = 36,
    NeedMoreInput = 44,
}

impl Status {
    /// Converts a raw `AMF_RESULT`. Codes this crate does not know about are reported as `Fail`.
    pub fn from_raw(raw: AMF_RESULT) -> Self {
        Status::n(raw).unwrap_or(Status::Fail)
    }

    /// Returns `Ok(())` if this status is `Ok`, and the status as an error otherwise.
    #[must_use = "the status might not be Ok"]
    pub fn check(self) -> StatusResult<()> {
        if self == Status::Ok {
            Ok(())
        } else {
            Err(self)
        }
    }

    /// Whether the status is one of the "queue full" backpressure signals, which ask the caller
    /// to collect output before resubmitting.
    pub fn is_queue_full(self) -> bool {
        matches!(self, Status::InputFull | Status::DecoderNoFreeSurfaces)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:?} ({})", self, *self as i32)
    }
}

impl std::error::Error for Status {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_codes() {
        assert_eq!(Status::from_raw(0), Status::Ok);
        assert_eq!(Status::from_raw(25), Status::InputFull);
        assert_eq!(Status::from_raw(44), Status::NeedMoreInput);
        assert_eq!(Status::from_raw(9999), Status::Fail);
    }

    #[test]
    fn check() {
        assert!(Status::Ok.check().is_ok());
        assert_eq!(Status::Eof.check(), Err(Status::Eof));
        assert!(Status::DecoderNoFreeSurfaces.is_queue_full());
        assert!(!Status::NeedMoreInput.is_queue_full());
    }
}
