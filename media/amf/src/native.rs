// Copyright 2022 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Runtime implementation backed by the vendor's dynamic library.

use std::any::Any;
use std::cell::RefCell;
use std::ffi::OsStr;
use std::ffi::OsString;
use std::rc::Rc;

use cfg_if::cfg_if;
use libc::c_void;
use libc::wchar_t;

use crate::bindings;
use crate::bindings::AMFVariantStruct;
use crate::bindings::AMFVariantValue;
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
use crate::Library;
use crate::LoadError;
use crate::Loader;
use crate::LogSink;
use crate::MemoryType;
use crate::NativeHandle;
use crate::PlaneInfo;
use crate::Property;
use crate::PropertyValue;
use crate::RuntimeDebug;
use crate::Status;
use crate::StatusResult;
use crate::Surface;
use crate::SurfaceFormat;
use crate::SurfaceObject;
use crate::Trace;
use crate::TraceLevel;

cfg_if! {
    if #[cfg(windows)] {
        /// File name of the runtime library.
        pub const RUNTIME_LIBRARY_NAME: &str = "amfrt64.dll";
    } else {
        /// File name of the runtime library.
        pub const RUNTIME_LIBRARY_NAME: &str = "libamfrt64.so.1";
    }
}

/// Interface version this crate is written against.
pub const RUNTIME_VERSION: u64 = bindings::AMF_FULL_VERSION;

/// Null-terminated wide string, as expected by the runtime.
fn to_wide(s: &str) -> Vec<wchar_t> {
    cfg_if! {
        if #[cfg(windows)] {
            s.encode_utf16().chain(std::iter::once(0)).collect()
        } else {
            s.chars().map(|c| c as wchar_t).chain(std::iter::once(0)).collect()
        }
    }
}

/// Reads a null-terminated wide string.
///
/// # Safety
///
/// `ptr` must be null or point to a null-terminated wide string.
unsafe fn from_wide(ptr: *const wchar_t) -> String {
    if ptr.is_null() {
        return String::new();
    }
    let mut len = 0;
    while *ptr.add(len) != 0 {
        len += 1;
    }
    let units = std::slice::from_raw_parts(ptr, len);
    cfg_if! {
        if #[cfg(windows)] {
            String::from_utf16_lossy(units)
        } else {
            units
                .iter()
                .map(|u| char::from_u32(*u as u32).unwrap_or(char::REPLACEMENT_CHARACTER))
                .collect()
        }
    }
}

/// The opened library and its entry points. Every runtime object keeps a reference to it so that
/// the library stays mapped while the object can still be called.
struct LoadedLibrary {
    init: bindings::AMFInit_Fn,
    query_version: bindings::AMFQueryVersion_Fn,
    _library: libloading::Library,
}

/// Loads the runtime from the system's library search path, or from an explicit path.
pub struct NativeLoader {
    path: OsString,
}

impl NativeLoader {
    /// Loader for the runtime library installed with the GPU driver.
    pub fn new() -> Self {
        Self::with_path(RUNTIME_LIBRARY_NAME)
    }

    /// Loader for the library at `path`.
    pub fn with_path<P: AsRef<OsStr>>(path: P) -> Self {
        NativeLoader {
            path: path.as_ref().to_owned(),
        }
    }
}

impl Default for NativeLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl Loader for NativeLoader {
    fn open(&self) -> Result<Box<dyn Library>, LoadError> {
        // Safe because loading the runtime only runs its initialization routines, which have no
        // preconditions.
        let library = unsafe { libloading::Library::new(&self.path) }.map_err(|e| {
            LoadError::LibraryNotFound {
                name: self.path.to_string_lossy().into_owned(),
                reason: e.to_string(),
            }
        })?;
        // Safe because the symbols are declared with the signature the runtime exports them with.
        // The function pointers are copied out of the symbols but only used through
        // `LoadedLibrary`, which keeps the library mapped.
        let init = unsafe {
            *library
                .get::<bindings::AMFInit_Fn>(bindings::AMF_INIT_FUNCTION_NAME)
                .map_err(|_| LoadError::EntryPointMissing("AMFInit"))?
        };
        // Safe for the same reason as above.
        let query_version = unsafe {
            *library
                .get::<bindings::AMFQueryVersion_Fn>(bindings::AMF_QUERY_VERSION_FUNCTION_NAME)
                .map_err(|_| LoadError::EntryPointMissing("AMFQueryVersion"))?
        };
        Ok(Box::new(NativeLibrary {
            lib: Rc::new(LoadedLibrary {
                init,
                query_version,
                _library: library,
            }),
        }))
    }
}

struct NativeLibrary {
    lib: Rc<LoadedLibrary>,
}

impl Library for NativeLibrary {
    fn query_version(&self) -> StatusResult<u64> {
        let mut version = 0u64;
        // Safe because `query_version` was resolved from the loaded library and `version` is a
        // valid output location.
        Status::from_raw(unsafe { (self.lib.query_version)(&mut version) }).check()?;
        Ok(version)
    }

    fn init(&self, version: u64) -> StatusResult<Rc<dyn Factory>> {
        let mut factory = std::ptr::null_mut();
        // Safe because `init` was resolved from the loaded library and `factory` is a valid
        // output location.
        Status::from_raw(unsafe { (self.lib.init)(version, &mut factory) }).check()?;
        if factory.is_null() {
            return Err(Status::InvalidPointer);
        }
        Ok(Rc::new(NativeFactory {
            ptr: factory,
            lib: Rc::clone(&self.lib),
        }))
    }
}

struct NativeFactory {
    ptr: *mut bindings::AMFFactory,
    lib: Rc<LoadedLibrary>,
}

impl NativeFactory {
    fn vtbl(&self) -> &bindings::AMFFactoryVtbl {
        // Safe because the factory is valid while the library is loaded, which `self.lib`
        // guarantees, and its vtable is immutable.
        unsafe { &*(*self.ptr).pVtbl }
    }
}

impl Factory for NativeFactory {
    fn trace(&self) -> StatusResult<Rc<dyn Trace>> {
        let mut trace = std::ptr::null_mut();
        // Safe because `self.ptr` is a valid factory and `trace` a valid output location.
        Status::from_raw(unsafe { (self.vtbl().GetTrace)(self.ptr as *mut c_void, &mut trace) })
            .check()?;
        if trace.is_null() {
            return Err(Status::InvalidPointer);
        }
        Ok(Rc::new(NativeTrace {
            ptr: trace,
            writers: RefCell::new(Vec::new()),
            _lib: Rc::clone(&self.lib),
        }))
    }

    fn debug(&self) -> StatusResult<Rc<dyn RuntimeDebug>> {
        let mut debug = std::ptr::null_mut();
        // Safe because `self.ptr` is a valid factory and `debug` a valid output location.
        Status::from_raw(unsafe { (self.vtbl().GetDebug)(self.ptr as *mut c_void, &mut debug) })
            .check()?;
        if debug.is_null() {
            return Err(Status::InvalidPointer);
        }
        Ok(Rc::new(NativeDebug {
            ptr: debug,
            _lib: Rc::clone(&self.lib),
        }))
    }

    fn create_context(&self) -> StatusResult<Rc<dyn Context>> {
        let mut context = std::ptr::null_mut();
        // Safe because `self.ptr` is a valid factory and `context` a valid output location.
        Status::from_raw(unsafe {
            (self.vtbl().CreateContext)(self.ptr as *mut c_void, &mut context)
        })
        .check()?;
        if context.is_null() {
            return Err(Status::InvalidPointer);
        }
        Ok(Rc::new(NativeContext {
            ptr: context,
            factory: self.ptr,
            lib: Rc::clone(&self.lib),
        }))
    }
}

/// Trace writer handed to the runtime. The runtime only sees the leading vtable pointer.
#[repr(C)]
struct WriterShim {
    vtbl: *const bindings::AMFTraceWriterVtbl,
    sink: Rc<dyn LogSink>,
}

static WRITER_VTBL: bindings::AMFTraceWriterVtbl = bindings::AMFTraceWriterVtbl {
    Write: writer_write,
    Flush: writer_flush,
};

unsafe extern "C" fn writer_write(
    this: *mut bindings::AMFTraceWriter,
    scope: *const wchar_t,
    message: *const wchar_t,
) {
    // Safe because the runtime only calls us back with the pointer we registered, which points
    // to a live `WriterShim` until it is unregistered.
    let shim = &*(this as *const WriterShim);
    shim.sink.write(&from_wide(scope), &from_wide(message));
}

unsafe extern "C" fn writer_flush(this: *mut bindings::AMFTraceWriter) {
    // Safe for the same reason as in `writer_write`.
    let shim = &*(this as *const WriterShim);
    shim.sink.flush();
}

struct NativeTrace {
    ptr: *mut bindings::AMFTrace,
    writers: RefCell<Vec<(String, Box<WriterShim>)>>,
    _lib: Rc<LoadedLibrary>,
}

impl NativeTrace {
    fn vtbl(&self) -> &bindings::AMFTraceVtbl {
        // Safe because the trace object lives as long as the library, which `self._lib` keeps
        // loaded.
        unsafe { &*(*self.ptr).pVtbl }
    }
}

impl Trace for NativeTrace {
    fn set_global_level(&self, level: TraceLevel) {
        // Safe because `self.ptr` is a valid trace object.
        unsafe { (self.vtbl().SetGlobalLevel)(self.ptr as *mut c_void, level as i32) };
    }

    fn enable_writer(&self, id: &str, enable: bool) {
        let id = to_wide(id);
        // Safe because `self.ptr` is a valid trace object and `id` is null-terminated.
        unsafe { (self.vtbl().EnableWriter)(self.ptr as *mut c_void, id.as_ptr(), enable) };
    }

    fn set_writer_level(&self, id: &str, level: TraceLevel) {
        let id = to_wide(id);
        // Safe because `self.ptr` is a valid trace object and `id` is null-terminated.
        unsafe { (self.vtbl().SetWriterLevel)(self.ptr as *mut c_void, id.as_ptr(), level as i32) };
    }

    fn register_writer(&self, id: &str, sink: Rc<dyn LogSink>) -> StatusResult<()> {
        let mut shim = Box::new(WriterShim {
            vtbl: &WRITER_VTBL,
            sink,
        });
        let wide_id = to_wide(id);
        // Safe because `self.ptr` is a valid trace object, `wide_id` is null-terminated and the
        // shim is kept alive in `self.writers` until it is unregistered.
        unsafe {
            (self.vtbl().RegisterWriter)(
                self.ptr as *mut c_void,
                wide_id.as_ptr(),
                shim.as_mut() as *mut WriterShim as *mut bindings::AMFTraceWriter,
                true,
            )
        };
        self.writers.borrow_mut().push((id.to_owned(), shim));
        Ok(())
    }

    fn unregister_writer(&self, id: &str) {
        let mut writers = self.writers.borrow_mut();
        let Some(pos) = writers.iter().position(|(name, _)| name == id) else {
            return;
        };
        let wide_id = to_wide(id);
        // Safe because `self.ptr` is a valid trace object and `wide_id` is null-terminated.
        unsafe { (self.vtbl().UnregisterWriter)(self.ptr as *mut c_void, wide_id.as_ptr()) };
        writers.remove(pos);
    }
}

impl Drop for NativeTrace {
    fn drop(&mut self) {
        let ids: Vec<String> = self
            .writers
            .borrow()
            .iter()
            .map(|(id, _)| id.clone())
            .collect();
        for id in ids {
            self.unregister_writer(&id);
        }
    }
}

struct NativeDebug {
    ptr: *mut bindings::AMFDebug,
    _lib: Rc<LoadedLibrary>,
}

impl RuntimeDebug for NativeDebug {
    fn enable_performance_monitor(&self, enable: bool) {
        // Safe because `self.ptr` is a valid debug object while the library is loaded.
        unsafe { ((*(*self.ptr).pVtbl).EnablePerformanceMonitor)(self.ptr as *mut c_void, enable) };
    }

    fn enable_asserts(&self, enable: bool) {
        // Safe because `self.ptr` is a valid debug object while the library is loaded.
        unsafe { ((*(*self.ptr).pVtbl).AssertsEnable)(self.ptr as *mut c_void, enable) };
    }
}

/// Returns the interface prefix of any runtime object.
///
/// # Safety
///
/// `ptr` must point to a live runtime interface.
unsafe fn interface_vtbl<'a>(ptr: *mut c_void) -> &'a bindings::AMFInterfaceVtbl {
    &*(*(ptr as *mut bindings::AMFInterface)).pVtbl
}

/// Queries `ptr` for `iid`. On success the returned pointer holds a new reference.
///
/// # Safety
///
/// `ptr` must point to a live runtime interface.
unsafe fn query_interface(ptr: *mut c_void, iid: &bindings::AMFGuid) -> Option<*mut c_void> {
    let mut out = std::ptr::null_mut();
    let status = Status::from_raw((interface_vtbl(ptr).QueryInterface)(ptr, iid, &mut out));
    if status == Status::Ok && !out.is_null() {
        Some(out)
    } else {
        None
    }
}

/// Releases one reference to `ptr`.
///
/// # Safety
///
/// `ptr` must point to a live runtime interface on which the caller owns a reference.
unsafe fn release_interface(ptr: *mut c_void) {
    (interface_vtbl(ptr).Release)(ptr);
}

fn to_variant(value: &PropertyValue) -> AMFVariantStruct {
    match value {
        PropertyValue::Bool(v) => AMFVariantStruct {
            type_: bindings::AMF_VARIANT_BOOL,
            value: AMFVariantValue { boolValue: *v },
        },
        PropertyValue::Int64(v) => AMFVariantStruct {
            type_: bindings::AMF_VARIANT_INT64,
            value: AMFVariantValue { int64Value: *v },
        },
        PropertyValue::Size { width, height } => AMFVariantStruct {
            type_: bindings::AMF_VARIANT_SIZE,
            value: AMFVariantValue {
                sizeValue: bindings::AMFSize {
                    width: *width as i32,
                    height: *height as i32,
                },
            },
        },
        PropertyValue::Rate { num, den } => AMFVariantStruct {
            type_: bindings::AMF_VARIANT_RATE,
            value: AMFVariantValue {
                rateValue: bindings::AMFRate {
                    num: *num,
                    den: *den,
                },
            },
        },
        PropertyValue::Buffer(b) => AMFVariantStruct {
            type_: bindings::AMF_VARIANT_INTERFACE,
            value: AMFVariantValue {
                pInterface: b.as_raw() as *mut bindings::AMFInterface,
            },
        },
    }
}

/// Property bag operations shared by every object exposing `AMFPropertyStorage`.
struct Storage {
    ptr: *mut c_void,
    vtbl: *const bindings::AMFPropertyStorageVtbl,
    lib: Rc<LoadedLibrary>,
}

impl Storage {
    fn set(&self, name: &str, value: &PropertyValue) -> StatusResult<()> {
        let name = to_wide(name);
        // Safe because `ptr` is a live object whose vtable contains `vtbl`, `name` is
        // null-terminated and any interface in the variant is kept alive by the caller during the
        // call; the runtime takes its own reference.
        let raw = unsafe { ((*self.vtbl).SetProperty)(self.ptr, name.as_ptr(), to_variant(value)) };
        Status::from_raw(raw).check()
    }

    fn get(&self, name: &str) -> Option<AMFVariantStruct> {
        let name = to_wide(name);
        let mut value = AMFVariantStruct::empty();
        // Safe because `ptr` is a live object whose vtable contains `vtbl`, `name` is
        // null-terminated and `value` a valid output location.
        let raw = unsafe { ((*self.vtbl).GetProperty)(self.ptr, name.as_ptr(), &mut value) };
        let status = Status::from_raw(raw);
        if status == Status::Ok {
            Some(value)
        } else {
            None
        }
    }

    fn int64(&self, name: &str) -> Option<i64> {
        let value = self.get(name)?;
        match value.type_ {
            // Safe because the variant's tag says which member is initialized.
            bindings::AMF_VARIANT_INT64 => Some(unsafe { value.value.int64Value }),
            bindings::AMF_VARIANT_BOOL => Some(unsafe { value.value.boolValue } as i64),
            _ => None,
        }
    }

    fn buffer(&self, name: &str) -> Option<Buffer> {
        let value = self.get(name)?;
        if value.type_ != bindings::AMF_VARIANT_INTERFACE {
            return None;
        }
        // Safe because the tag says the interface member is initialized.
        let interface = unsafe { value.value.pInterface } as *mut c_void;
        if interface.is_null() {
            return None;
        }
        // Safe because the variant returned by `GetProperty` holds a reference to `interface`,
        // which we give back after taking our own through `QueryInterface`.
        unsafe {
            let buffer = query_interface(interface, &bindings::IID_AMF_BUFFER);
            release_interface(interface);
            buffer.map(|ptr| NativeBuffer::wrap(&self.lib, ptr as *mut bindings::AMFBuffer))
        }
    }
}

struct NativeContext {
    ptr: *mut bindings::AMFContext,
    factory: *mut bindings::AMFFactory,
    lib: Rc<LoadedLibrary>,
}

impl NativeContext {
    fn vtbl(&self) -> &bindings::AMFContextVtbl {
        // Safe because we hold a reference on the context.
        unsafe { &*(*self.ptr).pVtbl }
    }

    fn raw(&self) -> *mut c_void {
        self.ptr as *mut c_void
    }

    fn wrap_surface(&self, ptr: *mut bindings::AMFSurface) -> StatusResult<Surface> {
        if ptr.is_null() {
            return Err(Status::InvalidPointer);
        }
        Ok(NativeSurface::wrap(&self.lib, ptr))
    }
}

impl Context for NativeContext {
    fn init_dx11(&self, device: NativeHandle) -> StatusResult<()> {
        // Safe because `self.ptr` is a valid context; a null device asks the runtime to create
        // its own.
        let raw = unsafe { (self.vtbl().InitDX11)(self.raw(), device.0, bindings::AMF_DX11_0) };
        Status::from_raw(raw).check()
    }

    fn init_dx9(&self, device: NativeHandle) -> StatusResult<()> {
        // Safe because `self.ptr` is a valid context; a null device asks the runtime to create
        // its own.
        Status::from_raw(unsafe { (self.vtbl().InitDX9)(self.raw(), device.0) }).check()
    }

    fn init_vulkan(&self, device: NativeHandle) -> StatusResult<()> {
        // Safe because `self.ptr` is a valid context.
        let context1 = unsafe { query_interface(self.raw(), &bindings::IID_AMF_CONTEXT1) }
            .ok_or(Status::NoInterface)? as *mut bindings::AMFContext1;
        // Safe because `context1` is a valid `AMFContext1` on which we own a reference, which is
        // released right after the call.
        unsafe {
            let status = ((*(*context1).pVtbl).InitVulkan)(context1 as *mut c_void, device.0);
            release_interface(context1 as *mut c_void);
            Status::from_raw(status).check()
        }
    }

    fn terminate(&self) -> StatusResult<()> {
        // Safe because `self.ptr` is a valid context.
        Status::from_raw(unsafe { (self.vtbl().Terminate)(self.raw()) }).check()
    }

    fn alloc_buffer(&self, memory: MemoryType, size: usize) -> StatusResult<Buffer> {
        let mut buffer = std::ptr::null_mut();
        // Safe because `self.ptr` is a valid context and `buffer` a valid output location.
        Status::from_raw(unsafe {
            (self.vtbl().AllocBuffer)(self.raw(), memory as i32, size, &mut buffer)
        })
        .check()?;
        if buffer.is_null() {
            return Err(Status::InvalidPointer);
        }
        Ok(NativeBuffer::wrap(&self.lib, buffer))
    }

    fn alloc_surface(
        &self,
        memory: MemoryType,
        format: SurfaceFormat,
        width: u32,
        height: u32,
    ) -> StatusResult<Surface> {
        let mut surface = std::ptr::null_mut();
        // Safe because `self.ptr` is a valid context and `surface` a valid output location.
        Status::from_raw(unsafe {
            (self.vtbl().AllocSurface)(
                self.raw(),
                memory as i32,
                format as i32,
                width as i32,
                height as i32,
                &mut surface,
            )
        })
        .check()?;
        self.wrap_surface(surface)
    }

    fn create_surface_from_dx11(
        &self,
        texture: NativeHandle,
        array_index: u32,
    ) -> StatusResult<Surface> {
        if texture.is_null() {
            return Err(Status::InvalidPointer);
        }
        let texture_ptr = texture.0 as *mut bindings::ID3D11DeviceChild;
        // Safe because the caller guarantees `texture` is a live `ID3D11Texture2D`, which starts
        // with the `ID3D11DeviceChild` vtable, and `array_index` outlives the call.
        let hr = unsafe {
            ((*(*texture_ptr).pVtbl).SetPrivateData)(
                texture.0,
                &bindings::AMF_TEXTURE_ARRAY_INDEX_GUID,
                std::mem::size_of::<u32>() as u32,
                &array_index as *const u32 as *const c_void,
            )
        };
        if hr < 0 {
            return Err(Status::DirectxFailed);
        }
        let mut surface = std::ptr::null_mut();
        // Safe because `self.ptr` is a valid context and `surface` a valid output location.
        Status::from_raw(unsafe {
            (self.vtbl().CreateSurfaceFromDX11Native)(
                self.raw(),
                texture.0,
                &mut surface,
                std::ptr::null_mut(),
            )
        })
        .check()?;
        self.wrap_surface(surface)
    }

    fn create_surface_from_dx9(&self, native: NativeHandle) -> StatusResult<Surface> {
        if native.is_null() {
            return Err(Status::InvalidPointer);
        }
        let mut surface = std::ptr::null_mut();
        // Safe because `self.ptr` is a valid context and `surface` a valid output location.
        Status::from_raw(unsafe {
            (self.vtbl().CreateSurfaceFromDX9Native)(
                self.raw(),
                native.0,
                &mut surface,
                std::ptr::null_mut(),
            )
        })
        .check()?;
        self.wrap_surface(surface)
    }

    fn create_component(&self, id: ComponentId) -> StatusResult<Box<dyn Component>> {
        let name = to_wide(id.name());
        let mut component = std::ptr::null_mut();
        // Safe because the factory and context are valid, `name` is null-terminated and
        // `component` a valid output location.
        Status::from_raw(unsafe {
            ((*(*self.factory).pVtbl).CreateComponent)(
                self.factory as *mut c_void,
                self.ptr,
                name.as_ptr(),
                &mut component,
            )
        })
        .check()?;
        if component.is_null() {
            return Err(Status::InvalidPointer);
        }
        Ok(Box::new(NativeComponent {
            ptr: component,
            id,
            lib: Rc::clone(&self.lib),
        }))
    }
}

impl Drop for NativeContext {
    fn drop(&mut self) {
        // Safe because we own one reference on the context.
        unsafe { release_interface(self.raw()) };
    }
}

struct NativeComponent {
    ptr: *mut bindings::AMFComponent,
    id: ComponentId,
    lib: Rc<LoadedLibrary>,
}

impl NativeComponent {
    fn vtbl(&self) -> &bindings::AMFComponentVtbl {
        // Safe because we hold a reference on the component.
        unsafe { &*(*self.ptr).pVtbl }
    }

    fn raw(&self) -> *mut c_void {
        self.ptr as *mut c_void
    }

    fn storage(&self) -> Storage {
        Storage {
            ptr: self.raw(),
            vtbl: &self.vtbl().storage,
            lib: Rc::clone(&self.lib),
        }
    }
}

impl Component for NativeComponent {
    fn set_property(&mut self, property: &Property) -> StatusResult<()> {
        let name = property.name(self.id).ok_or(Status::InvalidArg)?;
        self.storage().set(name, &property.value(self.id))
    }

    fn int64_property(&self, key: ComponentKey) -> Option<i64> {
        self.storage().int64(key.name())
    }

    fn buffer_property(&self, key: ComponentKey) -> Option<Buffer> {
        self.storage().buffer(key.name())
    }

    fn init(&mut self, format: SurfaceFormat, width: u32, height: u32) -> StatusResult<()> {
        // Safe because `self.ptr` is a valid component.
        Status::from_raw(unsafe {
            (self.vtbl().Init)(self.raw(), format as i32, width as i32, height as i32)
        })
        .check()
    }

    fn submit_input(&mut self, data: &Data) -> StatusResult<()> {
        // Safe because `self.ptr` is a valid component and `data` a live runtime object; the
        // runtime takes its own reference if it keeps it.
        Status::from_raw(unsafe { (self.vtbl().SubmitInput)(self.raw(), data.as_raw()) }).check()
    }

    fn query_output(&mut self) -> StatusResult<Option<Data>> {
        let mut data = std::ptr::null_mut();
        // Safe because `self.ptr` is a valid component and `data` a valid output location.
        let status = Status::from_raw(unsafe { (self.vtbl().QueryOutput)(self.raw(), &mut data) });
        if data.is_null() {
            return status.check().map(|()| None);
        }
        // Safe because `data` holds a reference handed to us by the runtime; we exchange it for a
        // reference on the concrete interface.
        let output = unsafe {
            let output = if let Some(surface) = query_interface(data, &bindings::IID_AMF_SURFACE) {
                let surface = surface as *mut bindings::AMFSurface;
                Some(Data::Surface(NativeSurface::wrap(&self.lib, surface)))
            } else {
                query_interface(data, &bindings::IID_AMF_BUFFER).map(|b| {
                    Data::Buffer(NativeBuffer::wrap(&self.lib, b as *mut bindings::AMFBuffer))
                })
            };
            release_interface(data);
            output
        };
        match (status, output) {
            (Status::Ok | Status::Eof | Status::Repeat, Some(output)) => Ok(Some(output)),
            (Status::Ok, None) => Err(Status::InvalidDataType),
            (status, _) => Err(status),
        }
    }

    fn drain(&mut self) -> StatusResult<()> {
        // Safe because `self.ptr` is a valid component.
        Status::from_raw(unsafe { (self.vtbl().Drain)(self.raw()) }).check()
    }

    fn flush(&mut self) -> StatusResult<()> {
        // Safe because `self.ptr` is a valid component.
        Status::from_raw(unsafe { (self.vtbl().Flush)(self.raw()) }).check()
    }

    fn terminate(&mut self) -> StatusResult<()> {
        // Safe because `self.ptr` is a valid component.
        Status::from_raw(unsafe { (self.vtbl().Terminate)(self.raw()) }).check()
    }
}

impl Drop for NativeComponent {
    fn drop(&mut self) {
        // Safe because we own one reference on the component.
        unsafe { release_interface(self.raw()) };
    }
}

/// Implements the `AMFData` part of `DataObject` for a native wrapper.
macro_rules! native_data_object {
    ($name:ident) => {
        impl DataObject for $name {
            fn acquire(&self) {
                // Safe because `ptr` is live while any handle holds a reference.
                unsafe { ((*self.vtbl()).interface.Acquire)(self.raw()) };
            }

            fn release(&self) {
                // Safe because the handle calling us owns the reference being given back.
                unsafe { ((*self.vtbl()).interface.Release)(self.raw()) };
            }

            fn as_raw(&self) -> *mut c_void {
                self.raw()
            }

            fn as_any(&self) -> &dyn Any {
                self
            }

            fn memory_type(&self) -> MemoryType {
                // Safe because `ptr` is live.
                MemoryType::from_raw(unsafe { ((*self.vtbl()).data.GetMemoryType)(self.raw()) })
            }

            fn convert(&self, memory: MemoryType) -> StatusResult<()> {
                // Safe because `ptr` is live.
                Status::from_raw(unsafe {
                    ((*self.vtbl()).data.Convert)(self.raw(), memory as i32)
                })
                .check()
            }

            fn pts(&self) -> i64 {
                // Safe because `ptr` is live.
                unsafe { ((*self.vtbl()).data.GetPts)(self.raw()) }
            }

            fn set_pts(&self, pts: i64) {
                // Safe because `ptr` is live.
                unsafe { ((*self.vtbl()).data.SetPts)(self.raw(), pts) }
            }

            fn duration(&self) -> i64 {
                // Safe because `ptr` is live.
                unsafe { ((*self.vtbl()).data.GetDuration)(self.raw()) }
            }

            fn set_duration(&self, duration: i64) {
                // Safe because `ptr` is live.
                unsafe { ((*self.vtbl()).data.SetDuration)(self.raw(), duration) }
            }

            fn set_int64(&self, key: DataKey, value: i64) -> StatusResult<()> {
                let name = key.name().ok_or(Status::InvalidArg)?;
                self.storage().set(name, &PropertyValue::Int64(value))
            }

            fn int64(&self, key: DataKey) -> Option<i64> {
                self.storage().int64(key.name()?)
            }

            fn set_buffer(&self, key: DataKey, buffer: &Buffer) -> StatusResult<()> {
                let name = key.name().ok_or(Status::InvalidArg)?;
                self.storage()
                    .set(name, &PropertyValue::Buffer(buffer.clone()))
            }

            fn buffer(&self, key: DataKey) -> Option<Buffer> {
                self.storage().buffer(key.name()?)
            }
        }
    };
}

struct NativeSurface {
    ptr: *mut bindings::AMFSurface,
    // The runtime code behind `ptr` stays mapped until the last handle is released.
    lib: Rc<LoadedLibrary>,
}

impl NativeSurface {
    /// Wraps a surface pointer on which the caller owns one reference.
    fn wrap(lib: &Rc<LoadedLibrary>, ptr: *mut bindings::AMFSurface) -> Surface {
        Surface::from_object(Rc::new(NativeSurface {
            ptr,
            lib: Rc::clone(lib),
        }))
    }

    fn vtbl(&self) -> *const bindings::AMFSurfaceVtbl {
        // Safe because the surface is live while a handle exists.
        unsafe { (*self.ptr).pVtbl }
    }

    fn raw(&self) -> *mut c_void {
        self.ptr as *mut c_void
    }

    fn storage(&self) -> Storage {
        Storage {
            ptr: self.raw(),
            // Safe because the vtable is immutable and outlives the surface.
            vtbl: unsafe { &(*self.vtbl()).storage },
            lib: Rc::clone(&self.lib),
        }
    }
}

native_data_object!(NativeSurface);

impl SurfaceObject for NativeSurface {
    fn format(&self) -> SurfaceFormat {
        // Safe because the surface is live.
        SurfaceFormat::from_raw(unsafe { ((*self.vtbl()).GetFormat)(self.raw()) })
    }

    fn planes(&self) -> Vec<PlaneInfo> {
        // Safe because the surface is live, and its planes live as long as the surface.
        unsafe {
            let count = ((*self.vtbl()).GetPlanesCount)(self.raw());
            (0..count)
                .filter_map(|i| {
                    let plane = ((*self.vtbl()).GetPlaneAt)(self.raw(), i);
                    if plane.is_null() {
                        return None;
                    }
                    let vtbl = &*(*plane).pVtbl;
                    let raw = plane as *mut c_void;
                    Some(PlaneInfo {
                        native: (vtbl.GetNative)(raw) as *mut u8,
                        width: (vtbl.GetWidth)(raw).max(0) as u32,
                        height: (vtbl.GetHeight)(raw).max(0) as u32,
                        h_pitch: (vtbl.GetHPitch)(raw).max(0) as usize,
                        pixel_size: (vtbl.GetPixelSizeInBytes)(raw).max(0) as u32,
                    })
                })
                .collect()
        }
    }

    fn set_crop(&self, x: u32, y: u32, width: u32, height: u32) -> StatusResult<()> {
        // Safe because the surface is live.
        Status::from_raw(unsafe {
            ((*self.vtbl()).SetCrop)(self.raw(), x as i32, y as i32, width as i32, height as i32)
        })
        .check()
    }
}

struct NativeBuffer {
    ptr: *mut bindings::AMFBuffer,
    lib: Rc<LoadedLibrary>,
}

impl NativeBuffer {
    /// Wraps a buffer pointer on which the caller owns one reference.
    fn wrap(lib: &Rc<LoadedLibrary>, ptr: *mut bindings::AMFBuffer) -> Buffer {
        Buffer::from_object(Rc::new(NativeBuffer {
            ptr,
            lib: Rc::clone(lib),
        }))
    }

    fn vtbl(&self) -> *const bindings::AMFBufferVtbl {
        // Safe because the buffer is live while a handle exists.
        unsafe { (*self.ptr).pVtbl }
    }

    fn raw(&self) -> *mut c_void {
        self.ptr as *mut c_void
    }

    fn storage(&self) -> Storage {
        Storage {
            ptr: self.raw(),
            // Safe because the vtable is immutable and outlives the buffer.
            vtbl: unsafe { &(*self.vtbl()).storage },
            lib: Rc::clone(&self.lib),
        }
    }
}

native_data_object!(NativeBuffer);

impl BufferObject for NativeBuffer {
    fn size(&self) -> usize {
        // Safe because the buffer is live.
        unsafe { ((*self.vtbl()).GetSize)(self.raw()) }
    }

    fn set_size(&self, size: usize) -> StatusResult<()> {
        // Safe because the buffer is live.
        Status::from_raw(unsafe { ((*self.vtbl()).SetSize)(self.raw(), size) }).check()
    }

    fn native(&self) -> *mut u8 {
        // Safe because the buffer is live.
        unsafe { ((*self.vtbl()).GetNative)(self.raw()) as *mut u8 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wide_strings_round_trip() {
        let wide = to_wide("AMFVideoConverter");
        assert_eq!(wide.last(), Some(&0));
        // Safe because `wide` is null-terminated.
        assert_eq!(unsafe { from_wide(wide.as_ptr()) }, "AMFVideoConverter");
        // Safe because null is accepted.
        assert_eq!(unsafe { from_wide(std::ptr::null()) }, "");
    }

    #[test]
    fn missing_library() {
        let dir = tempfile::tempdir().unwrap();
        let loader = NativeLoader::with_path(dir.path().join(RUNTIME_LIBRARY_NAME));
        match loader.open() {
            Err(LoadError::LibraryNotFound { name, .. }) => {
                assert!(name.ends_with(RUNTIME_LIBRARY_NAME))
            }
            Err(e) => panic!("unexpected error {}", e),
            Ok(_) => panic!("opened a library that does not exist"),
        }
    }

    #[test]
    fn invalid_library() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(RUNTIME_LIBRARY_NAME);
        std::fs::write(&path, b"not a shared object").unwrap();
        assert!(matches!(
            NativeLoader::with_path(&path).open(),
            Err(LoadError::LibraryNotFound { .. })
        ));
    }

    #[test]
    #[ignore] // Requires the vendor runtime and a supported GPU.
    fn query_installed_runtime() {
        let library = NativeLoader::new().open().unwrap();
        assert!(library.query_version().unwrap() > 0);
        let factory = library.init(RUNTIME_VERSION).unwrap();
        let context = factory.create_context().unwrap();
        let _ = context.terminate();
    }
}
