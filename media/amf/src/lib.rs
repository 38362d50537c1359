// Copyright 2022 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Bindings to AMD's Advanced Media Framework runtime.
//!
//! The runtime is loaded dynamically and exposed through the capability traits of [`runtime`],
//! so code driving it can be exercised against the in-process fake of the `fake` module.

#![warn(missing_docs)]

mod bindings;
mod data;
#[cfg(any(test, feature = "fake"))]
pub mod fake;
mod format;
mod native;
mod property;
pub mod runtime;
mod status;
mod trace;

pub use data::*;
pub use format::*;
pub use native::*;
pub use property::*;
pub use runtime::*;
pub use status::*;
pub use trace::*;
