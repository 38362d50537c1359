// Copyright 2022 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Capability interfaces of the runtime.
//!
//! The runtime hands out objects behind C vtables. This module describes them as traits so that
//! sessions can be driven either by the dynamically loaded library ([`crate::NativeLoader`]) or
//! by an in-process fake.

use std::any::Any;
use std::rc::Rc;

use libc::c_void;
use remain::sorted;
use thiserror::Error as ThisError;

use crate::Buffer;
use crate::ComponentId;
use crate::ComponentKey;
use crate::Data;
use crate::DataKey;
use crate::LogSink;
use crate::MemoryType;
use crate::NativeHandle;
use crate::Property;
use crate::StatusResult;
use crate::Surface;
use crate::SurfaceFormat;
use crate::TraceLevel;

/// Errors that can happen while opening the runtime library.
#[sorted]
#[derive(Debug, ThisError)]
pub enum LoadError {
    /// The library is loaded but does not export a required entry point.
    #[error("runtime library does not export {0}")]
    EntryPointMissing(&'static str),
    /// The library could not be found or opened.
    #[error("failed to open runtime library {name}: {reason}")]
    LibraryNotFound {
        /// Name or path of the library.
        name: String,
        /// Loader message.
        reason: String,
    },
}

/// Opens the runtime library.
pub trait Loader {
    /// Opens the library and resolves its entry points.
    fn open(&self) -> Result<Box<dyn Library>, LoadError>;
}

/// An opened runtime library. Dropping it unloads the library.
pub trait Library {
    /// Returns the version of the runtime.
    fn query_version(&self) -> StatusResult<u64>;
    /// Initializes the runtime for the requested interface `version` and returns its factory.
    fn init(&self, version: u64) -> StatusResult<Rc<dyn Factory>>;
}

/// Root object of the runtime.
pub trait Factory {
    /// Returns the trace (logging) interface.
    fn trace(&self) -> StatusResult<Rc<dyn Trace>>;
    /// Returns the debug interface.
    fn debug(&self) -> StatusResult<Rc<dyn RuntimeDebug>>;
    /// Creates a device context. The context is not bound to any device until one of its `init_*`
    /// methods succeeds.
    fn create_context(&self) -> StatusResult<Rc<dyn Context>>;
}

/// Name of the runtime's built-in console trace writer.
pub const TRACE_WRITER_CONSOLE: &str = "Console";
/// Name of the runtime's built-in debugger-output trace writer.
pub const TRACE_WRITER_DEBUG_OUTPUT: &str = "DebugOutput";

/// The runtime's logging interface.
pub trait Trace {
    /// Sets the level below which messages are dropped for every writer.
    fn set_global_level(&self, level: TraceLevel);
    /// Enables or disables the writer named `id`.
    fn enable_writer(&self, id: &str, enable: bool);
    /// Sets the level of the writer named `id`.
    fn set_writer_level(&self, id: &str, level: TraceLevel);
    /// Registers `sink` as the writer named `id` and enables it.
    fn register_writer(&self, id: &str, sink: Rc<dyn LogSink>) -> StatusResult<()>;
    /// Unregisters the writer named `id`. Unknown ids are ignored.
    fn unregister_writer(&self, id: &str);
}

/// The runtime's debugging interface.
pub trait RuntimeDebug {
    /// Enables the runtime's performance monitor.
    fn enable_performance_monitor(&self, enable: bool);
    /// Enables the runtime's internal assertions.
    fn enable_asserts(&self, enable: bool);
}

/// A device context, which owns the GPU device and allocates surfaces and components.
pub trait Context {
    /// Binds the context to a D3D11 device. A null handle lets the runtime create one.
    fn init_dx11(&self, device: NativeHandle) -> StatusResult<()>;
    /// Binds the context to a D3D9 device. A null handle lets the runtime create one.
    fn init_dx9(&self, device: NativeHandle) -> StatusResult<()>;
    /// Binds the context to a Vulkan device. A null handle lets the runtime create one.
    fn init_vulkan(&self, device: NativeHandle) -> StatusResult<()>;
    /// Releases the device. No component may be used afterwards.
    fn terminate(&self) -> StatusResult<()>;
    /// Allocates a buffer of `size` bytes.
    fn alloc_buffer(&self, memory: MemoryType, size: usize) -> StatusResult<Buffer>;
    /// Allocates a surface.
    fn alloc_surface(
        &self,
        memory: MemoryType,
        format: SurfaceFormat,
        width: u32,
        height: u32,
    ) -> StatusResult<Surface>;
    /// Wraps slice `array_index` of a D3D11 texture without copying it.
    fn create_surface_from_dx11(
        &self,
        texture: NativeHandle,
        array_index: u32,
    ) -> StatusResult<Surface>;
    /// Wraps a D3D9 surface without copying it.
    fn create_surface_from_dx9(&self, surface: NativeHandle) -> StatusResult<Surface>;
    /// Instantiates a component bound to this context.
    fn create_component(&self, id: ComponentId) -> StatusResult<Box<dyn Component>>;
}

/// A processing component (decoder, encoder, converter).
///
/// Input is pushed with `submit_input` and output pulled with `query_output`. `submit_input`
/// reports backpressure with [`crate::Status::InputFull`] or
/// [`crate::Status::DecoderNoFreeSurfaces`]; `query_output` returns `Ok(None)` when no output is
/// ready yet, [`crate::Status::Repeat`] when it should be called again immediately and
/// [`crate::Status::Eof`] once a drain has completed.
pub trait Component {
    /// Sets a static property. Must be called before `init`.
    fn set_property(&mut self, property: &Property) -> StatusResult<()>;
    /// Reads an integer property.
    fn int64_property(&self, key: ComponentKey) -> Option<i64>;
    /// Reads an interface property holding a buffer.
    fn buffer_property(&self, key: ComponentKey) -> Option<Buffer>;
    /// Initializes the component for inputs of the given format and size.
    fn init(&mut self, format: SurfaceFormat, width: u32, height: u32) -> StatusResult<()>;
    /// Submits one input.
    fn submit_input(&mut self, data: &Data) -> StatusResult<()>;
    /// Retrieves one output.
    fn query_output(&mut self) -> StatusResult<Option<Data>>;
    /// Signals the end of the input; remaining outputs are produced, then `Eof`.
    fn drain(&mut self) -> StatusResult<()>;
    /// Discards every input and output in flight.
    fn flush(&mut self) -> StatusResult<()>;
    /// Releases the component's resources. No other method may be called afterwards.
    fn terminate(&mut self) -> StatusResult<()>;
}

/// Behavior shared by surfaces and buffers.
///
/// Implementors are reference counted by the runtime: every `acquire` must be paired with exactly
/// one `release`. [`Surface`] and [`Buffer`] take care of this.
pub trait DataObject {
    /// Increments the reference count.
    fn acquire(&self);
    /// Decrements the reference count.
    fn release(&self);
    /// Pointer to the runtime object, for passing it back to the runtime.
    fn as_raw(&self) -> *mut c_void;
    /// Allows implementations to recover their concrete type.
    fn as_any(&self) -> &dyn Any;
    /// Memory the object currently lives in.
    fn memory_type(&self) -> MemoryType;
    /// Migrates the object to `memory`.
    fn convert(&self, memory: MemoryType) -> StatusResult<()>;
    /// Presentation timestamp in 100ns units.
    fn pts(&self) -> i64;
    /// Sets the presentation timestamp in 100ns units.
    fn set_pts(&self, pts: i64);
    /// Duration in 100ns units.
    fn duration(&self) -> i64;
    /// Sets the duration in 100ns units.
    fn set_duration(&self, duration: i64);
    /// Stores an integer property.
    fn set_int64(&self, key: DataKey, value: i64) -> StatusResult<()>;
    /// Reads an integer property.
    fn int64(&self, key: DataKey) -> Option<i64>;
    /// Stores an interface property holding a buffer.
    fn set_buffer(&self, key: DataKey, buffer: &Buffer) -> StatusResult<()>;
    /// Reads an interface property holding a buffer.
    fn buffer(&self, key: DataKey) -> Option<Buffer>;
}

/// Description of one plane of a host-accessible surface.
#[derive(Copy, Clone, Debug)]
pub struct PlaneInfo {
    /// Address of the first byte of the plane.
    pub native: *mut u8,
    /// Width of the plane in elements.
    pub width: u32,
    /// Height of the plane in rows.
    pub height: u32,
    /// Distance in bytes between the start of two rows.
    pub h_pitch: usize,
    /// Size of one element in bytes.
    pub pixel_size: u32,
}

impl PlaneInfo {
    /// Number of meaningful bytes in one row.
    pub fn row_bytes(&self) -> usize {
        self.width as usize * self.pixel_size as usize
    }
}

/// A picture, in host or GPU memory.
pub trait SurfaceObject: DataObject {
    /// Pixel format.
    fn format(&self) -> SurfaceFormat;
    /// Planes of the surface. Only meaningful for host memory surfaces.
    fn planes(&self) -> Vec<PlaneInfo>;
    /// Restricts the visible area of the surface.
    fn set_crop(&self, x: u32, y: u32, width: u32, height: u32) -> StatusResult<()>;
}

/// A linear block of memory, such as a compressed packet.
pub trait BufferObject: DataObject {
    /// Size of the meaningful part of the buffer.
    fn size(&self) -> usize;
    /// Shrinks the meaningful part of the buffer.
    fn set_size(&self, size: usize) -> StatusResult<()>;
    /// Address of the buffer's memory. Only meaningful for host memory buffers.
    fn native(&self) -> *mut u8;
}
