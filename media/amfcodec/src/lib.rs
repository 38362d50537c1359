// Copyright 2022 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Hardware video sessions on top of the [`amf`] runtime.
//!
//! A [`DeviceSession`] loads the runtime and binds it to a GPU. Decoders, encoders and scalers
//! attach to it, exchange host [`Frame`]s and [`Packet`]s with their hardware component through
//! the [`SurfaceBridge`], and run the component's non-blocking submit/query protocol.

#![warn(missing_docs)]

mod bridge;
mod decoder;
mod device;
mod encoder;
mod error;
mod filter;
mod format;
mod frame;
mod frames;
mod hdr;
mod image;
mod options;
pub mod scale_eval;
mod timestamp;

pub use bridge::*;
pub use decoder::*;
pub use device::*;
pub use encoder::*;
pub use error::*;
pub use filter::*;
pub use format::*;
pub use frame::*;
pub use frames::*;
pub use hdr::*;
pub use image::*;
pub use options::*;
pub use timestamp::*;

/// Result of a non-blocking attempt to pull an output from a session.
#[derive(Debug)]
pub enum TryReceiveResult<T> {
    /// An output was produced.
    Received(T),
    /// No output is ready yet; submit more input or try again later.
    TryAgain,
    /// The session has been drained and will not produce any more output.
    EndOfStream,
}

/// Outcome of submitting one input to a session.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum SubmitStatus {
    /// The input was accepted.
    Accepted,
    /// The component's queue is full. Nothing was consumed; pull some output and submit the same
    /// input again.
    QueueFull,
}
