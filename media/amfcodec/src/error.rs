// Copyright 2022 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

use amf::LoadError;
use amf::Status;
use remain::sorted;
use thiserror::Error as ThisError;

use crate::Backend;
use crate::CodecId;
use crate::PixelFormat;

/// Errors of the hardware sessions.
#[sorted]
#[derive(Debug, ThisError)]
pub enum Error {
    /// The platform device given by the caller cannot be used with this backend.
    #[error("{0} backend is not supported on the given device")]
    BackendNotSupported(Backend),
    /// The runtime could not instantiate a component.
    #[error("failed to create component {component}: {status}")]
    ComponentCreateFailed {
        /// Runtime name of the component.
        component: &'static str,
        /// Status returned by the runtime.
        status: Status,
    },
    /// The component refused its configuration.
    #[error("failed to initialize component: {0}")]
    ComponentInitFailed(Status),
    /// The runtime could not create a device context.
    #[error("failed to create context: {0}")]
    ContextCreateFailed(Status),
    /// Binding the context to a device failed for a reason other than lack of support.
    #[error("failed to initialize {backend} backend: {status}")]
    DeviceError {
        /// Backend being initialized.
        backend: Backend,
        /// Status returned by the runtime.
        status: Status,
    },
    /// The runtime library lacks a required entry point.
    #[error("runtime library does not export {0}")]
    EntryPointMissing(&'static str),
    /// Neither the requested format nor its fallback is accepted.
    #[error("pixel format {0} is not supported by the hardware")]
    FormatRejected(PixelFormat),
    /// A runtime call failed.
    #[error("{call} failed: {status}")]
    Hardware {
        /// Name of the failing call.
        call: &'static str,
        /// Status returned by the runtime.
        status: Status,
    },
    /// The runtime refused to initialize.
    #[error("runtime initialization failed: {0}")]
    InitFailed(Status),
    /// The runtime factory could not provide one of its interfaces.
    #[error("failed to get the {interface} interface: {status}")]
    InterfaceQueryFailed {
        /// Name of the interface.
        interface: &'static str,
        /// Status returned by the runtime.
        status: Status,
    },
    /// An output size evaluated to an unusable value.
    #[error("invalid output dimensions {width}x{height}")]
    InvalidDimensions {
        /// Evaluated width.
        width: i64,
        /// Evaluated height.
        height: i64,
    },
    /// A size expression could not be evaluated.
    #[error("invalid expression '{expr}': {reason}")]
    InvalidExpression {
        /// The expression.
        expr: String,
        /// What is wrong with it.
        reason: String,
    },
    /// The operation is not allowed in the current state of the session.
    #[error("invalid state: {0}")]
    InvalidState(&'static str),
    /// The runtime library could not be opened.
    #[error("failed to open runtime library {name}: {reason}")]
    LibraryNotFound {
        /// Name or path of the library.
        name: String,
        /// Loader message.
        reason: String,
    },
    /// A frame submitted for encoding has no presentation timestamp.
    #[error("frame has no presentation timestamp")]
    MissingTimestamp,
    /// No backend could be initialized on this system.
    #[error("no usable device backend")]
    NoBackendAvailable,
    /// Host and hardware images have incompatible plane layouts.
    #[error("plane layout of {0} does not match the hardware surface")]
    PlaneLayoutMismatch(PixelFormat),
    /// The component kept refusing input without producing output.
    #[error("component queue stalled")]
    QueueStalled,
    /// An output was produced without a matching submitted timestamp.
    #[error("timestamp queue is empty")]
    TimestampQueueEmpty,
    /// The component produced an output of the wrong kind.
    #[error("unexpected output: {0}")]
    UnexpectedOutput(&'static str),
    /// The codec has no hardware component.
    #[error("codec {0} is not supported")]
    UnsupportedCodec(CodecId),
    /// The frame's storage cannot be used by this session.
    #[error("unsupported frame storage: {0}")]
    UnsupportedStorage(&'static str),
    /// The runtime version query failed.
    #[error("runtime version query failed: {0}")]
    VersionQueryFailed(Status),
}

/// Result of the hardware sessions.
pub type Result<T> = std::result::Result<T, Error>;

impl From<LoadError> for Error {
    fn from(e: LoadError) -> Self {
        match e {
            LoadError::EntryPointMissing(name) => Error::EntryPointMissing(name),
            LoadError::LibraryNotFound { name, reason } => Error::LibraryNotFound { name, reason },
        }
    }
}

/// Returns a closure turning the status of a failed runtime `call` into an [`Error`].
pub(crate) fn hardware(call: &'static str) -> impl Fn(Status) -> Error {
    move |status| Error::Hardware { call, status }
}
