// Copyright 2022 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! In-process runtime for tests.
//!
//! [`FakeRuntime`] implements every capability trait without a GPU. It records the calls it
//! receives, counts references on the surfaces and buffers it hands out, and models the
//! behaviors sessions have to cope with: backpressure, drain and end of stream, encoder
//! look-ahead reordering and propagation of input properties to outputs.

use std::any::Any;
use std::cell::Cell;
use std::cell::RefCell;
use std::collections::HashMap;
use std::collections::VecDeque;
use std::rc::Rc;

use libc::c_void;
use zerocopy::IntoBytes;

use crate::Buffer;
use crate::BufferObject;
use crate::Component;
use crate::ComponentId;
use crate::ComponentKey;
use crate::Context;
use crate::Data;
use crate::DataKey;
use crate::DataObject;
use crate::Factory;
use crate::HdrMetadata;
use crate::Library;
use crate::LoadError;
use crate::Loader;
use crate::LogSink;
use crate::MemoryType;
use crate::NativeHandle;
use crate::PlaneInfo;
use crate::Property;
use crate::RuntimeDebug;
use crate::Status;
use crate::StatusResult;
use crate::Surface;
use crate::SurfaceFormat;
use crate::SurfaceObject;
use crate::Trace;
use crate::TraceLevel;
use crate::TransferCharacteristic;

/// Version reported by the fake library.
pub const FAKE_RUNTIME_VERSION: u64 = crate::bindings::AMF_FULL_VERSION;

/// Output data type the fake encoder gives to anchor pictures.
pub const FAKE_TYPE_P: i64 = 2;
/// Output data type the fake encoder gives to reordered pictures.
pub const FAKE_TYPE_B: i64 = 3;

/// Behavior of a [`FakeRuntime`].
#[derive(Clone, Debug)]
pub struct FakeConfig {
    /// Opening the library fails.
    pub library_missing: bool,
    /// The library lacks this entry point.
    pub missing_entry_point: Option<&'static str>,
    /// Result of the version query.
    pub version_status: Status,
    /// Result of the runtime initialization.
    pub init_status: Status,
    /// Result of context creation.
    pub context_status: Status,
    /// Result of binding a context to D3D11.
    pub dx11: Status,
    /// Result of binding a context to D3D9.
    pub dx9: Status,
    /// Result of binding a context to Vulkan.
    pub vulkan: Status,
    /// Result of component creation.
    pub component_status: Status,
    /// Surface formats component `init` rejects.
    pub rejected_formats: Vec<SurfaceFormat>,
    /// Outputs a decoder holds before refusing input.
    pub decoder_queue_depth: usize,
    /// Inputs and outputs an encoder holds before refusing input.
    pub encoder_queue_depth: usize,
    /// The first drain request of every component is refused with `InputFull`.
    pub drain_input_full_once: bool,
    /// Size of the textures behind native D3D surfaces.
    pub native_surface_size: (u32, u32),
    /// HDR properties reported by decoders.
    pub decoder_hdr: Option<(TransferCharacteristic, HdrMetadata)>,
}

impl Default for FakeConfig {
    fn default() -> Self {
        FakeConfig {
            library_missing: false,
            missing_entry_point: None,
            version_status: Status::Ok,
            init_status: Status::Ok,
            context_status: Status::Ok,
            dx11: Status::Ok,
            dx9: Status::Ok,
            vulkan: Status::Ok,
            component_status: Status::Ok,
            rejected_formats: Vec::new(),
            decoder_queue_depth: 4,
            encoder_queue_depth: 8,
            drain_input_full_once: false,
            native_surface_size: (1920, 1088),
            decoder_hdr: None,
        }
    }
}

/// A call received by the fake runtime.
#[derive(Clone, Debug, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum Call {
    OpenLibrary,
    QueryVersion,
    Init(u64),
    GetTrace,
    GetDebug,
    CreateContext,
    InitDx11,
    InitDx9,
    InitVulkan,
    SetGlobalLevel(TraceLevel),
    EnableWriter(String, bool),
    SetWriterLevel(String, TraceLevel),
    RegisterWriter(String),
    UnregisterWriter(String),
    EnablePerformanceMonitor(bool),
    EnableAsserts(bool),
    TerminateContext,
    ReleaseContext,
    CloseLibrary,
    CreateComponent(ComponentId),
    SetProperty(&'static str),
    InitComponent(SurfaceFormat, u32, u32),
    SubmitInput,
    Drain,
    Flush,
    TerminateComponent,
    ReleaseComponent,
}

struct State {
    config: FakeConfig,
    calls: RefCell<Vec<Call>>,
    writers: RefCell<Vec<(String, Rc<dyn LogSink>)>>,
    live_objects: Cell<i64>,
    refcount_errors: Cell<usize>,
    next_id: Cell<usize>,
}

impl State {
    fn record(&self, call: Call) {
        self.calls.borrow_mut().push(call);
    }

    fn next_id(&self) -> usize {
        let id = self.next_id.get() + 1;
        self.next_id.set(id);
        id
    }
}

/// A fake runtime. Clones share the same state, so a test can keep one to inspect what the code
/// under test did with another.
#[derive(Clone)]
pub struct FakeRuntime {
    state: Rc<State>,
}

impl FakeRuntime {
    /// Creates a runtime with the default behavior.
    pub fn new() -> Self {
        Self::with_config(FakeConfig::default())
    }

    /// Creates a runtime behaving as described by `config`.
    pub fn with_config(config: FakeConfig) -> Self {
        FakeRuntime {
            state: Rc::new(State {
                config,
                calls: RefCell::new(Vec::new()),
                writers: RefCell::new(Vec::new()),
                live_objects: Cell::new(0),
                refcount_errors: Cell::new(0),
                next_id: Cell::new(0),
            }),
        }
    }

    /// Every call received so far.
    pub fn calls(&self) -> Vec<Call> {
        self.state.calls.borrow().clone()
    }

    /// Index of the first occurrence of `call`.
    pub fn position(&self, call: &Call) -> Option<usize> {
        self.state.calls.borrow().iter().position(|c| c == call)
    }

    /// Number of occurrences of `call`.
    pub fn count(&self, call: &Call) -> usize {
        self.state.calls.borrow().iter().filter(|c| *c == call).count()
    }

    /// Number of surfaces and buffers whose reference count has not dropped to zero.
    pub fn live_objects(&self) -> i64 {
        self.state.live_objects.get()
    }

    /// Number of releases of objects whose reference count was already zero.
    pub fn refcount_errors(&self) -> usize {
        self.state.refcount_errors.get()
    }

    /// Ids of the trace writers currently registered.
    pub fn registered_writers(&self) -> Vec<String> {
        self.state
            .writers
            .borrow()
            .iter()
            .map(|(id, _)| id.clone())
            .collect()
    }

    /// Sends a trace message to every registered writer, as the runtime would.
    pub fn emit_trace(&self, scope: &str, message: &str) {
        let writers: Vec<Rc<dyn LogSink>> = self
            .state
            .writers
            .borrow()
            .iter()
            .map(|(_, sink)| Rc::clone(sink))
            .collect();
        for sink in writers {
            sink.write(scope, message);
        }
    }

    /// Visible contents of a surface allocated by this runtime, plane after plane.
    pub fn surface_contents(surface: &Surface) -> Option<Vec<u8>> {
        let fake = surface.object().as_any().downcast_ref::<FakeSurface>()?;
        Some(fake.visible_bytes())
    }

    /// Crop rectangle set on a surface allocated by this runtime.
    pub fn surface_crop(surface: &Surface) -> Option<(u32, u32, u32, u32)> {
        let fake = surface.object().as_any().downcast_ref::<FakeSurface>()?;
        fake.crop.get()
    }

    /// Current reference count of a surface allocated by this runtime.
    pub fn surface_refcount(surface: &Surface) -> Option<u32> {
        let fake = surface.object().as_any().downcast_ref::<FakeSurface>()?;
        Some(fake.data.refs.get())
    }
}

impl Default for FakeRuntime {
    fn default() -> Self {
        Self::new()
    }
}

impl Loader for FakeRuntime {
    fn open(&self) -> Result<Box<dyn Library>, LoadError> {
        let config = &self.state.config;
        if config.library_missing {
            return Err(LoadError::LibraryNotFound {
                name: "fake".to_owned(),
                reason: "library missing".to_owned(),
            });
        }
        if let Some(entry_point) = config.missing_entry_point {
            return Err(LoadError::EntryPointMissing(entry_point));
        }
        self.state.record(Call::OpenLibrary);
        Ok(Box::new(FakeLibrary {
            state: Rc::clone(&self.state),
        }))
    }
}

struct FakeLibrary {
    state: Rc<State>,
}

impl Library for FakeLibrary {
    fn query_version(&self) -> StatusResult<u64> {
        self.state.record(Call::QueryVersion);
        self.state.config.version_status.check()?;
        Ok(FAKE_RUNTIME_VERSION)
    }

    fn init(&self, version: u64) -> StatusResult<Rc<dyn Factory>> {
        self.state.record(Call::Init(version));
        self.state.config.init_status.check()?;
        Ok(Rc::new(FakeFactory {
            state: Rc::clone(&self.state),
        }))
    }
}

impl Drop for FakeLibrary {
    fn drop(&mut self) {
        self.state.record(Call::CloseLibrary);
    }
}

struct FakeFactory {
    state: Rc<State>,
}

impl Factory for FakeFactory {
    fn trace(&self) -> StatusResult<Rc<dyn Trace>> {
        self.state.record(Call::GetTrace);
        Ok(Rc::new(FakeTrace {
            state: Rc::clone(&self.state),
        }))
    }

    fn debug(&self) -> StatusResult<Rc<dyn RuntimeDebug>> {
        self.state.record(Call::GetDebug);
        Ok(Rc::new(FakeDebug {
            state: Rc::clone(&self.state),
        }))
    }

    fn create_context(&self) -> StatusResult<Rc<dyn Context>> {
        self.state.record(Call::CreateContext);
        self.state.config.context_status.check()?;
        Ok(Rc::new(FakeContext {
            state: Rc::clone(&self.state),
            memory: Cell::new(MemoryType::Unknown),
        }))
    }
}

struct FakeTrace {
    state: Rc<State>,
}

impl Trace for FakeTrace {
    fn set_global_level(&self, level: TraceLevel) {
        self.state.record(Call::SetGlobalLevel(level));
    }

    fn enable_writer(&self, id: &str, enable: bool) {
        self.state.record(Call::EnableWriter(id.to_owned(), enable));
    }

    fn set_writer_level(&self, id: &str, level: TraceLevel) {
        self.state.record(Call::SetWriterLevel(id.to_owned(), level));
    }

    fn register_writer(&self, id: &str, sink: Rc<dyn LogSink>) -> StatusResult<()> {
        self.state.record(Call::RegisterWriter(id.to_owned()));
        self.state.writers.borrow_mut().push((id.to_owned(), sink));
        Ok(())
    }

    fn unregister_writer(&self, id: &str) {
        self.state.record(Call::UnregisterWriter(id.to_owned()));
        self.state.writers.borrow_mut().retain(|(w, _)| w != id);
    }
}

struct FakeDebug {
    state: Rc<State>,
}

impl RuntimeDebug for FakeDebug {
    fn enable_performance_monitor(&self, enable: bool) {
        self.state.record(Call::EnablePerformanceMonitor(enable));
    }

    fn enable_asserts(&self, enable: bool) {
        self.state.record(Call::EnableAsserts(enable));
    }
}

struct FakeContext {
    state: Rc<State>,
    memory: Cell<MemoryType>,
}

impl FakeContext {
    fn bind(&self, call: Call, result: Status, memory: MemoryType) -> StatusResult<()> {
        self.state.record(call);
        result.check()?;
        self.memory.set(memory);
        Ok(())
    }
}

impl Context for FakeContext {
    fn init_dx11(&self, _device: NativeHandle) -> StatusResult<()> {
        self.bind(Call::InitDx11, self.state.config.dx11, MemoryType::Dx11)
    }

    fn init_dx9(&self, _device: NativeHandle) -> StatusResult<()> {
        self.bind(Call::InitDx9, self.state.config.dx9, MemoryType::Dx9)
    }

    fn init_vulkan(&self, _device: NativeHandle) -> StatusResult<()> {
        self.bind(Call::InitVulkan, self.state.config.vulkan, MemoryType::Vulkan)
    }

    fn terminate(&self) -> StatusResult<()> {
        self.state.record(Call::TerminateContext);
        Ok(())
    }

    fn alloc_buffer(&self, memory: MemoryType, size: usize) -> StatusResult<Buffer> {
        Ok(FakeBuffer::alloc(&self.state, memory, size))
    }

    fn alloc_surface(
        &self,
        memory: MemoryType,
        format: SurfaceFormat,
        width: u32,
        height: u32,
    ) -> StatusResult<Surface> {
        if format == SurfaceFormat::Unknown || width == 0 || height == 0 {
            return Err(Status::InvalidArg);
        }
        Ok(FakeSurface::alloc(&self.state, memory, format, width, height))
    }

    fn create_surface_from_dx11(
        &self,
        texture: NativeHandle,
        _array_index: u32,
    ) -> StatusResult<Surface> {
        if texture.is_null() {
            return Err(Status::InvalidPointer);
        }
        let (width, height) = self.state.config.native_surface_size;
        Ok(FakeSurface::alloc(
            &self.state,
            MemoryType::Dx11,
            SurfaceFormat::Nv12,
            width,
            height,
        ))
    }

    fn create_surface_from_dx9(&self, surface: NativeHandle) -> StatusResult<Surface> {
        if surface.is_null() {
            return Err(Status::InvalidPointer);
        }
        let (width, height) = self.state.config.native_surface_size;
        Ok(FakeSurface::alloc(
            &self.state,
            MemoryType::Dx9,
            SurfaceFormat::Nv12,
            width,
            height,
        ))
    }

    fn create_component(&self, id: ComponentId) -> StatusResult<Box<dyn Component>> {
        self.state.record(Call::CreateComponent(id));
        self.state.config.component_status.check()?;
        Ok(Box::new(FakeComponent {
            state: Rc::clone(&self.state),
            id,
            properties: Vec::new(),
            init: None,
            draining: false,
            drain_refused: false,
            first_output_done: false,
            pending: VecDeque::new(),
            outputs: VecDeque::new(),
        }))
    }
}

impl Drop for FakeContext {
    fn drop(&mut self) {
        self.state.record(Call::ReleaseContext);
    }
}

/// Reference counting and property bag shared by fake surfaces and buffers.
struct FakeData {
    state: Rc<State>,
    id: usize,
    refs: Cell<u32>,
    memory: Cell<MemoryType>,
    pts: Cell<i64>,
    duration: Cell<i64>,
    ints: RefCell<HashMap<DataKey, i64>>,
    buffers: RefCell<HashMap<DataKey, Buffer>>,
}

impl FakeData {
    fn new(state: &Rc<State>, memory: MemoryType) -> Self {
        state.live_objects.set(state.live_objects.get() + 1);
        FakeData {
            state: Rc::clone(state),
            id: state.next_id(),
            refs: Cell::new(1),
            memory: Cell::new(memory),
            pts: Cell::new(0),
            duration: Cell::new(0),
            ints: RefCell::new(HashMap::new()),
            buffers: RefCell::new(HashMap::new()),
        }
    }

    fn acquire(&self) {
        self.refs.set(self.refs.get() + 1);
    }

    fn release(&self) {
        match self.refs.get() {
            0 => self
                .state
                .refcount_errors
                .set(self.state.refcount_errors.get() + 1),
            1 => {
                self.refs.set(0);
                self.state
                    .live_objects
                    .set(self.state.live_objects.get() - 1);
                // Drop references held through interface properties.
                let buffers: Vec<Buffer> =
                    self.buffers.borrow_mut().drain().map(|(_, b)| b).collect();
                drop(buffers);
            }
            n => self.refs.set(n - 1),
        }
    }

    /// Copies the integer properties, timestamp and duration of `other`.
    fn copy_from(&self, other: &FakeData) {
        self.pts.set(other.pts.get());
        self.duration.set(other.duration.get());
        let ints = other.ints.borrow().clone();
        self.ints.borrow_mut().extend(ints);
    }
}

macro_rules! fake_data_object {
    ($name:ident) => {
        impl DataObject for $name {
            fn acquire(&self) {
                self.data.acquire()
            }

            fn release(&self) {
                self.data.release()
            }

            fn as_raw(&self) -> *mut c_void {
                self.data.id as *mut c_void
            }

            fn as_any(&self) -> &dyn Any {
                self
            }

            fn memory_type(&self) -> MemoryType {
                self.data.memory.get()
            }

            fn convert(&self, memory: MemoryType) -> StatusResult<()> {
                self.data.memory.set(memory);
                Ok(())
            }

            fn pts(&self) -> i64 {
                self.data.pts.get()
            }

            fn set_pts(&self, pts: i64) {
                self.data.pts.set(pts)
            }

            fn duration(&self) -> i64 {
                self.data.duration.get()
            }

            fn set_duration(&self, duration: i64) {
                self.data.duration.set(duration)
            }

            fn set_int64(&self, key: DataKey, value: i64) -> StatusResult<()> {
                key.name().ok_or(Status::InvalidArg)?;
                self.data.ints.borrow_mut().insert(key, value);
                Ok(())
            }

            fn int64(&self, key: DataKey) -> Option<i64> {
                self.data.ints.borrow().get(&key).copied()
            }

            fn set_buffer(&self, key: DataKey, buffer: &Buffer) -> StatusResult<()> {
                self.data.buffers.borrow_mut().insert(key, buffer.clone());
                Ok(())
            }

            fn buffer(&self, key: DataKey) -> Option<Buffer> {
                self.data.buffers.borrow().get(&key).cloned()
            }
        }
    };
}

struct FakePlane {
    memory: Box<[Cell<u8>]>,
    pitch: usize,
    width: u32,
    height: u32,
    pixel_size: u32,
}

impl FakePlane {
    fn row_bytes(&self) -> usize {
        self.width as usize * self.pixel_size as usize
    }

    fn row(&self, y: usize) -> &[Cell<u8>] {
        &self.memory[y * self.pitch..y * self.pitch + self.row_bytes()]
    }
}

struct FakeSurface {
    data: FakeData,
    format: SurfaceFormat,
    width: u32,
    height: u32,
    crop: Cell<Option<(u32, u32, u32, u32)>>,
    planes: Vec<FakePlane>,
}

impl FakeSurface {
    fn alloc(
        state: &Rc<State>,
        memory: MemoryType,
        format: SurfaceFormat,
        width: u32,
        height: u32,
    ) -> Surface {
        let planes = format
            .planes(width, height)
            .into_iter()
            .map(|geometry| {
                let pitch = (geometry.row_bytes() + 63) & !63;
                FakePlane {
                    memory: (0..pitch * geometry.height as usize)
                        .map(|_| Cell::new(0))
                        .collect(),
                    pitch,
                    width: geometry.width,
                    height: geometry.height,
                    pixel_size: geometry.pixel_size,
                }
            })
            .collect();
        Surface::from_object(Rc::new(FakeSurface {
            data: FakeData::new(state, memory),
            format,
            width,
            height,
            crop: Cell::new(None),
            planes,
        }))
    }

    fn visible_bytes(&self) -> Vec<u8> {
        let (width, height) = match self.crop.get() {
            Some((_, _, w, h)) => (w, h),
            None => (self.width, self.height),
        };
        let mut out = Vec::new();
        for (plane, geometry) in self.planes.iter().zip(self.format.planes(width, height)) {
            for y in 0..geometry.height.min(plane.height) as usize {
                let row = plane.row(y);
                out.extend(row[..geometry.row_bytes().min(row.len())].iter().map(Cell::get));
            }
        }
        out
    }

    /// Fills the planes, row after row, with `bytes`.
    fn fill(&self, bytes: &[u8]) {
        let mut bytes = bytes.iter();
        for plane in &self.planes {
            for y in 0..plane.height as usize {
                for cell in plane.row(y) {
                    match bytes.next() {
                        Some(b) => cell.set(*b),
                        None => return,
                    }
                }
            }
        }
    }

    /// Nearest-neighbor resampling of `src`, plane by plane.
    fn scale_from(&self, src: &FakeSurface) {
        for (dst_plane, src_plane) in self.planes.iter().zip(&src.planes) {
            if dst_plane.pixel_size != src_plane.pixel_size {
                continue;
            }
            let px = dst_plane.pixel_size as usize;
            for y in 0..dst_plane.height as usize {
                let sy = y * src_plane.height as usize / dst_plane.height.max(1) as usize;
                let src_row = src_plane.row(sy);
                let dst_row = dst_plane.row(y);
                for x in 0..dst_plane.width as usize {
                    let sx = x * src_plane.width as usize / dst_plane.width.max(1) as usize;
                    for b in 0..px {
                        dst_row[x * px + b].set(src_row[sx * px + b].get());
                    }
                }
            }
        }
    }
}

fake_data_object!(FakeSurface);

impl SurfaceObject for FakeSurface {
    fn format(&self) -> SurfaceFormat {
        self.format
    }

    fn planes(&self) -> Vec<PlaneInfo> {
        if self.data.memory.get() != MemoryType::Host {
            return Vec::new();
        }
        self.planes
            .iter()
            .map(|p| PlaneInfo {
                native: p.memory.as_ptr() as *mut u8,
                width: p.width,
                height: p.height,
                h_pitch: p.pitch,
                pixel_size: p.pixel_size,
            })
            .collect()
    }

    fn set_crop(&self, x: u32, y: u32, width: u32, height: u32) -> StatusResult<()> {
        if x + width > self.width || y + height > self.height {
            return Err(Status::InvalidArg);
        }
        self.crop.set(Some((x, y, width, height)));
        Ok(())
    }
}

struct FakeBuffer {
    data: FakeData,
    memory: Box<[Cell<u8>]>,
    size: Cell<usize>,
}

impl FakeBuffer {
    fn alloc(state: &Rc<State>, memory: MemoryType, size: usize) -> Buffer {
        Buffer::from_object(Rc::new(FakeBuffer {
            data: FakeData::new(state, memory),
            memory: (0..size).map(|_| Cell::new(0xa5)).collect(),
            size: Cell::new(size),
        }))
    }

    fn with_contents(state: &Rc<State>, bytes: &[u8]) -> Buffer {
        Buffer::from_object(Rc::new(FakeBuffer {
            data: FakeData::new(state, MemoryType::Host),
            memory: bytes.iter().map(|b| Cell::new(*b)).collect(),
            size: Cell::new(bytes.len()),
        }))
    }

    fn bytes(&self) -> Vec<u8> {
        self.memory[..self.size.get()].iter().map(Cell::get).collect()
    }
}

fake_data_object!(FakeBuffer);

impl BufferObject for FakeBuffer {
    fn size(&self) -> usize {
        self.size.get()
    }

    fn set_size(&self, size: usize) -> StatusResult<()> {
        if size > self.memory.len() {
            return Err(Status::InvalidArg);
        }
        self.size.set(size);
        Ok(())
    }

    fn native(&self) -> *mut u8 {
        self.memory.as_ptr() as *mut u8
    }
}

struct FakeComponent {
    state: Rc<State>,
    id: ComponentId,
    properties: Vec<Property>,
    init: Option<(SurfaceFormat, u32, u32)>,
    draining: bool,
    drain_refused: bool,
    first_output_done: bool,
    pending: VecDeque<Surface>,
    outputs: VecDeque<Data>,
}

impl FakeComponent {
    fn b_frames(&self) -> usize {
        self.properties
            .iter()
            .rev()
            .find_map(|p| match p {
                Property::BFrames(n) => Some(*n as usize),
                _ => None,
            })
            .unwrap_or(0)
    }

    fn output_format(&self, input: SurfaceFormat) -> SurfaceFormat {
        self.properties
            .iter()
            .rev()
            .find_map(|p| match p {
                Property::OutputFormat(f) => Some(*f),
                _ => None,
            })
            .unwrap_or(input)
    }

    fn output_size(&self, input: (u32, u32)) -> (u32, u32) {
        self.properties
            .iter()
            .rev()
            .find_map(|p| match p {
                Property::OutputSize { width, height } => Some((*width, *height)),
                _ => None,
            })
            .unwrap_or(input)
    }

    fn decode(&mut self, buffer: &Buffer) -> StatusResult<()> {
        if self.outputs.len() >= self.state.config.decoder_queue_depth {
            return Err(Status::InputFull);
        }
        let (format, width, height) = self.init.ok_or(Status::NotInitialized)?;
        let input = buffer
            .object()
            .as_any()
            .downcast_ref::<FakeBuffer>()
            .ok_or(Status::InvalidDataType)?;
        let surface = FakeSurface::alloc(&self.state, MemoryType::Host, format, width, height);
        let fake = surface
            .object()
            .as_any()
            .downcast_ref::<FakeSurface>()
            .ok_or(Status::Unexpected)?;
        fake.fill(&input.bytes());
        fake.data.copy_from(&input.data);
        self.outputs.push_back(Data::Surface(surface));
        Ok(())
    }

    fn encode_picture(&mut self, surface: Surface, data_type: i64) -> StatusResult<()> {
        let codec = self.id.codec().ok_or(Status::Unexpected)?;
        let input = surface
            .object()
            .as_any()
            .downcast_ref::<FakeSurface>()
            .ok_or(Status::InvalidDataType)?;
        let buffer = FakeBuffer::with_contents(&self.state, &input.visible_bytes());
        let fake = buffer
            .object()
            .as_any()
            .downcast_ref::<FakeBuffer>()
            .ok_or(Status::Unexpected)?;
        fake.data.copy_from(&input.data);
        buffer.set_int64(DataKey::OutputDataType(codec), data_type)?;
        self.outputs.push_back(Data::Buffer(buffer));
        Ok(())
    }

    /// Turns pending pictures into packets: the first picture alone, then mini-GOPs of
    /// `b_frames + 1` pictures with the last one coded first.
    fn schedule(&mut self, flush: bool) -> StatusResult<()> {
        let lookahead = self.b_frames();
        if !self.first_output_done && (self.pending.len() > lookahead || flush) {
            if let Some(first) = self.pending.pop_front() {
                self.encode_picture(first, crate::OUTPUT_DATA_TYPE_KEY)?;
                self.first_output_done = true;
            }
        }
        while self.first_output_done
            && (self.pending.len() > lookahead || (flush && !self.pending.is_empty()))
        {
            let n = self.pending.len().min(lookahead + 1);
            let mut group: Vec<Surface> = self.pending.drain(..n).collect();
            if let Some(anchor) = group.pop() {
                self.encode_picture(anchor, FAKE_TYPE_P)?;
            }
            for picture in group {
                self.encode_picture(picture, FAKE_TYPE_B)?;
            }
        }
        Ok(())
    }

    fn encode(&mut self, surface: &Surface) -> StatusResult<()> {
        if self.pending.len() + self.outputs.len() >= self.state.config.encoder_queue_depth {
            return Err(Status::InputFull);
        }
        self.pending.push_back(surface.clone());
        self.schedule(false)
    }

    fn convert(&mut self, surface: &Surface) -> StatusResult<()> {
        if !self.outputs.is_empty() {
            return Err(Status::InputFull);
        }
        let (_, in_width, in_height) = self.init.ok_or(Status::NotInitialized)?;
        let input = surface
            .object()
            .as_any()
            .downcast_ref::<FakeSurface>()
            .ok_or(Status::InvalidDataType)?;
        let format = self.output_format(input.format);
        let (width, height) = self.output_size((in_width, in_height));
        let output = FakeSurface::alloc(&self.state, MemoryType::Host, format, width, height);
        let fake = output
            .object()
            .as_any()
            .downcast_ref::<FakeSurface>()
            .ok_or(Status::Unexpected)?;
        if format == input.format {
            fake.scale_from(input);
        }
        fake.data.copy_from(&input.data);
        self.outputs.push_back(Data::Surface(output));
        Ok(())
    }
}

impl Component for FakeComponent {
    fn set_property(&mut self, property: &Property) -> StatusResult<()> {
        let name = property.name(self.id).ok_or(Status::InvalidArg)?;
        self.state.record(Call::SetProperty(name));
        self.properties.push(property.clone());
        Ok(())
    }

    fn int64_property(&self, key: ComponentKey) -> Option<i64> {
        match (key, &self.state.config.decoder_hdr) {
            (ComponentKey::OutputTransferCharacteristic, Some((trc, _))) => Some(trc.raw()),
            _ => None,
        }
    }

    fn buffer_property(&self, key: ComponentKey) -> Option<Buffer> {
        match (key, &self.state.config.decoder_hdr) {
            (ComponentKey::OutputHdrMetadata, Some((_, meta))) => {
                Some(FakeBuffer::with_contents(&self.state, meta.as_bytes()))
            }
            _ => None,
        }
    }

    fn init(&mut self, format: SurfaceFormat, width: u32, height: u32) -> StatusResult<()> {
        self.state.record(Call::InitComponent(format, width, height));
        let output = self.output_format(format);
        let rejected = &self.state.config.rejected_formats;
        if rejected.contains(&format) || rejected.contains(&output) {
            return Err(Status::InvalidFormat);
        }
        if width == 0 || height == 0 {
            return Err(Status::InvalidResolution);
        }
        self.init = Some((format, width, height));
        Ok(())
    }

    fn submit_input(&mut self, data: &Data) -> StatusResult<()> {
        self.state.record(Call::SubmitInput);
        if self.init.is_none() {
            return Err(Status::NotInitialized);
        }
        if self.draining {
            return Err(Status::Eof);
        }
        match (self.id, data) {
            (ComponentId::Decoder(_), Data::Buffer(buffer)) => self.decode(buffer),
            (ComponentId::Encoder(_), Data::Surface(surface)) => self.encode(surface),
            (ComponentId::Converter | ComponentId::HqScaler, Data::Surface(surface)) => {
                self.convert(surface)
            }
            _ => Err(Status::InvalidDataType),
        }
    }

    fn query_output(&mut self) -> StatusResult<Option<Data>> {
        match self.outputs.pop_front() {
            Some(output) => Ok(Some(output)),
            None if self.draining => Err(Status::Eof),
            None => Ok(None),
        }
    }

    fn drain(&mut self) -> StatusResult<()> {
        self.state.record(Call::Drain);
        if self.state.config.drain_input_full_once && !self.drain_refused {
            self.drain_refused = true;
            return Err(Status::InputFull);
        }
        if let ComponentId::Encoder(_) = self.id {
            self.schedule(true)?;
        }
        self.draining = true;
        Ok(())
    }

    fn flush(&mut self) -> StatusResult<()> {
        self.state.record(Call::Flush);
        self.pending.clear();
        self.outputs.clear();
        self.draining = false;
        Ok(())
    }

    fn terminate(&mut self) -> StatusResult<()> {
        self.state.record(Call::TerminateComponent);
        self.pending.clear();
        self.outputs.clear();
        self.init = None;
        Ok(())
    }
}

impl Drop for FakeComponent {
    fn drop(&mut self) {
        self.state.record(Call::ReleaseComponent);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context(runtime: &FakeRuntime) -> Rc<dyn Context> {
        let library = runtime.open().unwrap();
        let factory = library.init(FAKE_RUNTIME_VERSION).unwrap();
        factory.create_context().unwrap()
    }

    #[test]
    fn surface_references_are_balanced() {
        let runtime = FakeRuntime::new();
        let context = context(&runtime);
        let surface = context
            .alloc_surface(MemoryType::Host, SurfaceFormat::Nv12, 64, 32)
            .unwrap();
        let copy = surface.clone();
        assert_eq!(FakeRuntime::surface_refcount(&surface), Some(2));
        drop(surface);
        assert_eq!(runtime.live_objects(), 1);
        drop(copy);
        assert_eq!(runtime.live_objects(), 0);
        assert_eq!(runtime.refcount_errors(), 0);
    }

    #[test]
    fn interface_properties_are_released_with_their_owner() {
        let runtime = FakeRuntime::new();
        let context = context(&runtime);
        let surface = context
            .alloc_surface(MemoryType::Host, SurfaceFormat::Nv12, 16, 16)
            .unwrap();
        let buffer = context.alloc_buffer(MemoryType::Host, 28).unwrap();
        surface.set_buffer(DataKey::HdrMetadata, &buffer).unwrap();
        drop(buffer);
        assert_eq!(runtime.live_objects(), 2);
        drop(surface);
        assert_eq!(runtime.live_objects(), 0);
    }

    #[test]
    fn encoder_reorders_mini_gops() {
        let runtime = FakeRuntime::new();
        let context = context(&runtime);
        let mut encoder = context
            .create_component(ComponentId::Encoder(crate::VideoCodec::H264))
            .unwrap();
        encoder.set_property(&Property::BFrames(2)).unwrap();
        encoder.init(SurfaceFormat::Nv12, 16, 16).unwrap();
        for pts in [0, 1, 2, 3, 4] {
            let surface = context
                .alloc_surface(MemoryType::Host, SurfaceFormat::Nv12, 16, 16)
                .unwrap();
            surface.set_pts(pts);
            encoder.submit_input(&Data::Surface(surface)).unwrap();
        }
        encoder.drain().unwrap();
        let mut order = Vec::new();
        loop {
            match encoder.query_output() {
                Ok(Some(Data::Buffer(b))) => order.push(b.pts()),
                Ok(_) => panic!("unexpected output"),
                Err(Status::Eof) => break,
                Err(e) => panic!("unexpected error {}", e),
            }
        }
        assert_eq!(order, vec![0, 3, 1, 2, 4]);
    }
}
