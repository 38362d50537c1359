// Copyright 2022 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Runtime loading and device context ownership.

use std::fmt;
use std::rc::Rc;
use std::str::FromStr;

use amf::Context;
use amf::Factory;
use amf::Library;
use amf::LogSink;
use amf::Loader;
use amf::MemoryType;
use amf::NativeHandle;
use amf::RuntimeDebug;
use amf::Status;
use amf::StatusResult;
use amf::Trace;
use amf::TraceLevel;
use amf::RUNTIME_VERSION;
use amf::TRACE_WRITER_CONSOLE;
use amf::TRACE_WRITER_DEBUG_OUTPUT;
use log::debug;
use log::error;
use log::info;
use serde::Deserialize;
use serde::Serialize;

use crate::error::hardware;
use crate::DeviceOptions;
use crate::Error;
use crate::Result;
use crate::UnknownName;

/// Name under which the host log sink is registered with the runtime's tracer.
pub const LOG_WRITER_ID: &str = "amfcodec";

/// GPU interop API a context is bound to.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// Direct3D 11.
    Dx11,
    /// Direct3D 9.
    Dx9,
    /// Vulkan.
    Vulkan,
}

impl Backend {
    /// Order in which backends are tried when the caller does not provide a device.
    pub const FALLBACK_ORDER: [Backend; 3] = [Backend::Dx11, Backend::Dx9, Backend::Vulkan];

    /// Memory type of the surfaces of a context bound to this backend.
    pub fn memory_type(self) -> MemoryType {
        match self {
            Backend::Dx11 => MemoryType::Dx11,
            Backend::Dx9 => MemoryType::Dx9,
            Backend::Vulkan => MemoryType::Vulkan,
        }
    }

    /// Short name of the backend.
    pub fn as_str(self) -> &'static str {
        match self {
            Backend::Dx11 => "dx11",
            Backend::Dx9 => "dx9",
            Backend::Vulkan => "vulkan",
        }
    }

    fn bind(self, context: &dyn Context, device: NativeHandle) -> StatusResult<()> {
        match self {
            Backend::Dx11 => context.init_dx11(device),
            Backend::Dx9 => context.init_dx9(device),
            Backend::Vulkan => context.init_vulkan(device),
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Backend {
    type Err = UnknownName;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Backend::FALLBACK_ORDER
            .iter()
            .copied()
            .find(|b| b.as_str() == s)
            .ok_or_else(|| UnknownName {
                kind: "backend",
                name: s.to_owned(),
            })
    }
}

/// A device created by the caller, to be shared with the runtime.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct PlatformDevice {
    /// API of the device.
    pub backend: Backend,
    /// `ID3D11Device`, `IDirect3DDevice9` or Vulkan device.
    pub handle: NativeHandle,
}

/// How to pick the device a context is bound to.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum BackendRequest {
    /// Let the runtime create a device, trying every backend in [`Backend::FALLBACK_ORDER`].
    Auto,
    /// Use the caller's device. Only its backend is tried.
    Derive(PlatformDevice),
}

/// Whether a backend failed because the system lacks it, as opposed to failing while using it.
fn is_unsupported(status: Status) -> bool {
    matches!(status, Status::NotSupported | Status::NotImplemented)
}

/// Formats a runtime version as `major.minor.release.build`.
pub fn version_string(version: u64) -> String {
    format!(
        "{}.{}.{}.{}",
        version >> 48,
        (version >> 32) & 0xffff,
        (version >> 16) & 0xffff,
        version & 0xffff
    )
}

/// Summary of a device, as reported by `amftool probe`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct DeviceInfo {
    /// Version of the loaded runtime.
    pub runtime_version: String,
    /// Backend the context is bound to.
    pub backend: Option<Backend>,
    /// Memory type of the surfaces the context produces.
    pub memory_type: String,
}

/// The loaded runtime and a context bound to one GPU device.
///
/// Sessions share a device through an `Rc`; the context is terminated and the runtime unloaded
/// when the last one drops it. Teardown runs in the reverse order of setup.
pub struct DeviceSession {
    // Fields are released in the reverse order they were acquired in, see `release`.
    library: Option<Box<dyn Library>>,
    factory: Option<Rc<dyn Factory>>,
    trace: Option<Rc<dyn Trace>>,
    debug: Option<Rc<dyn RuntimeDebug>>,
    context: Option<Rc<dyn Context>>,
    backend: Option<Backend>,
    version: u64,
    options: DeviceOptions,
    sink: Rc<dyn LogSink>,
    sink_registered: bool,
}

impl DeviceSession {
    /// Creates an empty session. Nothing is loaded until [`DeviceSession::load`].
    pub fn new(sink: Rc<dyn LogSink>, options: DeviceOptions) -> Self {
        DeviceSession {
            library: None,
            factory: None,
            trace: None,
            debug: None,
            context: None,
            backend: None,
            version: 0,
            options,
            sink,
            sink_registered: false,
        }
    }

    /// Loads the runtime, forwards its traces to `sink` and binds a context as `request` asks.
    ///
    /// On failure everything set up so far is torn down before the error is returned.
    pub fn create(
        loader: &dyn Loader,
        sink: Rc<dyn LogSink>,
        options: DeviceOptions,
        request: BackendRequest,
    ) -> Result<Rc<Self>> {
        let mut device = DeviceSession::new(sink, options);
        if let Err(e) = device.setup(loader, request) {
            device.release();
            return Err(e);
        }
        Ok(Rc::new(device))
    }

    fn setup(&mut self, loader: &dyn Loader, request: BackendRequest) -> Result<()> {
        self.load(loader)?;
        self.register_log_sink()?;
        self.create_context(request)
    }

    /// Opens the runtime library, checks its version, initializes it and fetches the tracer and
    /// debug interfaces.
    pub fn load(&mut self, loader: &dyn Loader) -> Result<()> {
        if self.library.is_some() {
            return Err(Error::InvalidState("runtime already loaded"));
        }
        let library = loader.open()?;
        let version = library
            .query_version()
            .map_err(Error::VersionQueryFailed)?;
        let factory = library.init(RUNTIME_VERSION).map_err(Error::InitFailed)?;
        let trace = factory
            .trace()
            .map_err(|status| Error::InterfaceQueryFailed {
                interface: "AMFTrace",
                status,
            })?;
        let debug = factory
            .debug()
            .map_err(|status| Error::InterfaceQueryFailed {
                interface: "AMFDebug",
                status,
            })?;
        debug.enable_performance_monitor(self.options.performance_monitor);
        debug.enable_asserts(self.options.asserts);
        info!("loaded AMF runtime {}", version_string(version));

        self.version = version;
        self.library = Some(library);
        self.factory = Some(factory);
        self.trace = Some(trace);
        self.debug = Some(debug);
        Ok(())
    }

    /// Routes the runtime's trace output to the sink. Does nothing if already registered.
    pub fn register_log_sink(&mut self) -> Result<()> {
        if self.sink_registered {
            return Ok(());
        }
        let trace = self
            .trace
            .as_ref()
            .ok_or(Error::InvalidState("runtime not loaded"))?;
        trace.enable_writer(TRACE_WRITER_CONSOLE, false);
        trace.enable_writer(TRACE_WRITER_DEBUG_OUTPUT, self.options.log_to_dbg);
        trace.set_global_level(TraceLevel::Trace);
        trace
            .register_writer(LOG_WRITER_ID, Rc::clone(&self.sink))
            .map_err(hardware("RegisterWriter"))?;
        trace.set_writer_level(LOG_WRITER_ID, TraceLevel::Trace);
        if self.options.log_to_dbg {
            trace.set_writer_level(TRACE_WRITER_DEBUG_OUTPUT, TraceLevel::Trace);
        }
        self.sink_registered = true;
        Ok(())
    }

    /// Stops routing the runtime's trace output to the sink. Safe to call when not registered.
    pub fn unregister_log_sink(&mut self) {
        if !self.sink_registered {
            return;
        }
        if let Some(trace) = &self.trace {
            trace.unregister_writer(LOG_WRITER_ID);
        }
        self.sink_registered = false;
    }

    /// Creates the context and binds it to a device.
    pub fn create_context(&mut self, request: BackendRequest) -> Result<()> {
        if self.context.is_some() {
            return Err(Error::InvalidState("context already created"));
        }
        let factory = self
            .factory
            .as_ref()
            .ok_or(Error::InvalidState("runtime not loaded"))?;
        let context = factory
            .create_context()
            .map_err(Error::ContextCreateFailed)?;
        let backend = match request {
            BackendRequest::Auto => Self::bind_any(context.as_ref())?,
            BackendRequest::Derive(device) => {
                device
                    .backend
                    .bind(context.as_ref(), device.handle)
                    .map_err(|status| {
                        if is_unsupported(status) {
                            Error::BackendNotSupported(device.backend)
                        } else {
                            Error::DeviceError {
                                backend: device.backend,
                                status,
                            }
                        }
                    })?;
                device.backend
            }
        };
        info!("AMF context bound to {}", backend);
        self.context = Some(context);
        self.backend = Some(backend);
        Ok(())
    }

    fn bind_any(context: &dyn Context) -> Result<Backend> {
        for backend in Backend::FALLBACK_ORDER {
            match backend.bind(context, NativeHandle::null()) {
                Ok(()) => return Ok(backend),
                Err(status) if is_unsupported(status) => {
                    debug!("{} backend unavailable: {}", backend, status);
                }
                Err(status) => return Err(Error::DeviceError { backend, status }),
            }
        }
        Err(Error::NoBackendAvailable)
    }

    /// Terminates the context, unregisters the log sink and unloads the runtime. Only what
    /// exists is torn down, so this can be called repeatedly and after a failed setup.
    pub fn release(&mut self) {
        if let Some(context) = self.context.take() {
            if self.backend.take().is_some() {
                if let Err(e) = context.terminate() {
                    error!("failed to terminate AMF context: {}", e);
                }
            }
        }
        self.unregister_log_sink();
        self.debug = None;
        self.trace = None;
        self.factory = None;
        if self.library.take().is_some() {
            debug!("AMF runtime unloaded");
        }
    }

    /// The context, once bound to a device.
    pub fn context(&self) -> Result<&dyn Context> {
        self.context
            .as_deref()
            .ok_or(Error::InvalidState("device context not created"))
    }

    /// Backend the context is bound to.
    pub fn backend(&self) -> Option<Backend> {
        self.backend
    }

    /// Memory type of the surfaces produced on this device.
    pub fn memory_type(&self) -> MemoryType {
        self.backend
            .map(Backend::memory_type)
            .unwrap_or(MemoryType::Host)
    }

    /// Version reported by the runtime.
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Whether the host sink receives the runtime's traces.
    pub fn log_sink_registered(&self) -> bool {
        self.sink_registered
    }

    /// Summary of the device.
    pub fn info(&self) -> DeviceInfo {
        DeviceInfo {
            runtime_version: version_string(self.version),
            backend: self.backend,
            memory_type: format!("{:?}", self.memory_type()),
        }
    }
}

impl Drop for DeviceSession {
    fn drop(&mut self) {
        self.release();
    }
}

impl fmt::Debug for DeviceSession {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("DeviceSession")
            .field("loaded", &self.library.is_some())
            .field("version", &version_string(self.version))
            .field("backend", &self.backend)
            .field("sink_registered", &self.sink_registered)
            .finish()
    }
}
