// Copyright 2022 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! C declarations of the runtime's interfaces.
//!
//! Every runtime object is a pointer to a struct whose first field points to its vtable. Only the
//! vtable slots this crate calls are typed; the others are kept as opaque pointers so that the
//! offsets of the typed slots match the C layout.

#![allow(non_camel_case_types)]
#![allow(non_snake_case)]
#![allow(dead_code)]

use libc::c_long;
use libc::c_void;
use libc::wchar_t;

pub type AMF_RESULT = i32;
pub type amf_long = c_long;
pub type amf_pts = i64;
pub type AMF_MEMORY_TYPE = i32;
pub type AMF_SURFACE_FORMAT = i32;
pub type AMF_TRACE_LEVEL = i32;

/// Slot of a vtable this crate never calls.
pub type Slot = *const c_void;

pub const AMF_VERSION_MAJOR: u64 = 1;
pub const AMF_VERSION_MINOR: u64 = 4;
pub const AMF_VERSION_RELEASE: u64 = 33;
pub const AMF_VERSION_BUILD_NUM: u64 = 0;

pub const fn amf_make_full_version(major: u64, minor: u64, release: u64, build: u64) -> u64 {
    (major << 48) | (minor << 32) | (release << 16) | build
}

pub const AMF_FULL_VERSION: u64 = amf_make_full_version(
    AMF_VERSION_MAJOR,
    AMF_VERSION_MINOR,
    AMF_VERSION_RELEASE,
    AMF_VERSION_BUILD_NUM,
);

pub const AMF_INIT_FUNCTION_NAME: &[u8] = b"AMFInit\0";
pub const AMF_QUERY_VERSION_FUNCTION_NAME: &[u8] = b"AMFQueryVersion\0";

pub const AMF_DX11_0: i32 = 110;

pub type AMFInit_Fn =
    unsafe extern "C" fn(version: u64, ppFactory: *mut *mut AMFFactory) -> AMF_RESULT;
pub type AMFQueryVersion_Fn = unsafe extern "C" fn(pVersion: *mut u64) -> AMF_RESULT;

#[repr(C)]
#[derive(Copy, Clone)]
pub struct AMFGuid {
    pub data1: u32,
    pub data2: u16,
    pub data3: u16,
    pub data4: [u8; 8],
}

pub const IID_AMF_CONTEXT1: AMFGuid = AMFGuid {
    data1: 0xd9e9f868,
    data2: 0x6220,
    data3: 0x44c6,
    data4: [0xa2, 0x2f, 0x7c, 0xd6, 0xda, 0xc6, 0x86, 0x46],
};

pub const IID_AMF_BUFFER: AMFGuid = AMFGuid {
    data1: 0xb04b7248,
    data2: 0xb6f0,
    data3: 0x4321,
    data4: [0xb6, 0x91, 0xba, 0xa4, 0x74, 0x0f, 0x9f, 0xcb],
};

pub const IID_AMF_SURFACE: AMFGuid = AMFGuid {
    data1: 0x3075dbe3,
    data2: 0x8718,
    data3: 0x4cfa,
    data4: [0x86, 0xfb, 0x21, 0x14, 0xc0, 0xa5, 0xa4, 0x51],
};

#[repr(C)]
#[derive(Copy, Clone)]
pub struct AMFSize {
    pub width: i32,
    pub height: i32,
}

#[repr(C)]
#[derive(Copy, Clone)]
pub struct AMFRate {
    pub num: u32,
    pub den: u32,
}

pub const AMF_VARIANT_EMPTY: i32 = 0;
pub const AMF_VARIANT_BOOL: i32 = 1;
pub const AMF_VARIANT_INT64: i32 = 2;
pub const AMF_VARIANT_SIZE: i32 = 5;
pub const AMF_VARIANT_RATE: i32 = 7;
pub const AMF_VARIANT_INTERFACE: i32 = 12;

#[repr(C)]
#[derive(Copy, Clone)]
pub union AMFVariantValue {
    pub boolValue: bool,
    pub int64Value: i64,
    pub doubleValue: f64,
    pub sizeValue: AMFSize,
    pub rateValue: AMFRate,
    pub pInterface: *mut AMFInterface,
    pub rectValue: [i32; 4],
}

#[repr(C)]
#[derive(Copy, Clone)]
pub struct AMFVariantStruct {
    pub type_: i32,
    pub value: AMFVariantValue,
}

impl AMFVariantStruct {
    pub fn empty() -> Self {
        AMFVariantStruct {
            type_: AMF_VARIANT_EMPTY,
            value: AMFVariantValue { rectValue: [0; 4] },
        }
    }
}

/// Common prefix of every reference counted interface.
#[repr(C)]
pub struct AMFInterfaceVtbl {
    pub Acquire: unsafe extern "system" fn(this: *mut c_void) -> amf_long,
    pub Release: unsafe extern "system" fn(this: *mut c_void) -> amf_long,
    pub QueryInterface: unsafe extern "system" fn(
        this: *mut c_void,
        interfaceID: *const AMFGuid,
        ppInterface: *mut *mut c_void,
    ) -> AMF_RESULT,
}

#[repr(C)]
pub struct AMFInterface {
    pub pVtbl: *const AMFInterfaceVtbl,
}

/// `AMFPropertyStorage` methods, following the interface prefix.
#[repr(C)]
pub struct AMFPropertyStorageVtbl {
    pub SetProperty: unsafe extern "system" fn(
        this: *mut c_void,
        name: *const wchar_t,
        value: AMFVariantStruct,
    ) -> AMF_RESULT,
    pub GetProperty: unsafe extern "system" fn(
        this: *mut c_void,
        name: *const wchar_t,
        pValue: *mut AMFVariantStruct,
    ) -> AMF_RESULT,
    pub HasProperty: unsafe extern "system" fn(this: *mut c_void, name: *const wchar_t) -> bool,
    pub GetPropertyCount: Slot,
    pub GetPropertyAt: Slot,
    pub Clear: Slot,
    pub AddTo: Slot,
    pub CopyTo: Slot,
    pub AddObserver: Slot,
    pub RemoveObserver: Slot,
}

/// `AMFData` methods, following the property storage.
#[repr(C)]
pub struct AMFDataVtbl {
    pub Duplicate: Slot,
    pub Convert: unsafe extern "system" fn(this: *mut c_void, type_: AMF_MEMORY_TYPE) -> AMF_RESULT,
    pub Interop: Slot,
    pub GetMemoryType: unsafe extern "system" fn(this: *mut c_void) -> AMF_MEMORY_TYPE,
    pub IsReusable: Slot,
    pub SetPts: unsafe extern "system" fn(this: *mut c_void, pts: amf_pts),
    pub GetPts: unsafe extern "system" fn(this: *mut c_void) -> amf_pts,
    pub SetDuration: unsafe extern "system" fn(this: *mut c_void, duration: amf_pts),
    pub GetDuration: unsafe extern "system" fn(this: *mut c_void) -> amf_pts,
}

#[repr(C)]
pub struct AMFBufferVtbl {
    pub interface: AMFInterfaceVtbl,
    pub storage: AMFPropertyStorageVtbl,
    pub data: AMFDataVtbl,
    pub SetSize: unsafe extern "system" fn(this: *mut c_void, newSize: usize) -> AMF_RESULT,
    pub GetSize: unsafe extern "system" fn(this: *mut c_void) -> usize,
    pub GetNative: unsafe extern "system" fn(this: *mut c_void) -> *mut c_void,
    pub AddObserver_AMFBuffer: Slot,
    pub RemoveObserver_AMFBuffer: Slot,
}

#[repr(C)]
pub struct AMFBuffer {
    pub pVtbl: *const AMFBufferVtbl,
}

#[repr(C)]
pub struct AMFPlaneVtbl {
    pub interface: AMFInterfaceVtbl,
    pub GetType: Slot,
    pub GetNative: unsafe extern "system" fn(this: *mut c_void) -> *mut c_void,
    pub GetPixelSizeInBytes: unsafe extern "system" fn(this: *mut c_void) -> i32,
    pub GetOffsetX: Slot,
    pub GetOffsetY: Slot,
    pub GetWidth: unsafe extern "system" fn(this: *mut c_void) -> i32,
    pub GetHeight: unsafe extern "system" fn(this: *mut c_void) -> i32,
    pub GetHPitch: unsafe extern "system" fn(this: *mut c_void) -> i32,
    pub GetVPitch: Slot,
    pub IsTiled: Slot,
}

#[repr(C)]
pub struct AMFPlane {
    pub pVtbl: *const AMFPlaneVtbl,
}

#[repr(C)]
pub struct AMFSurfaceVtbl {
    pub interface: AMFInterfaceVtbl,
    pub storage: AMFPropertyStorageVtbl,
    pub data: AMFDataVtbl,
    pub GetFormat: unsafe extern "system" fn(this: *mut c_void) -> AMF_SURFACE_FORMAT,
    pub GetPlanesCount: unsafe extern "system" fn(this: *mut c_void) -> usize,
    pub GetPlaneAt: unsafe extern "system" fn(this: *mut c_void, index: usize) -> *mut AMFPlane,
    pub GetPlane: Slot,
    pub GetFrameType: Slot,
    pub SetFrameType: Slot,
    pub SetCrop: unsafe extern "system" fn(
        this: *mut c_void,
        x: i32,
        y: i32,
        width: i32,
        height: i32,
    ) -> AMF_RESULT,
    pub CopySurfaceRegion: Slot,
    pub AddObserver_AMFSurface: Slot,
    pub RemoveObserver_AMFSurface: Slot,
}

#[repr(C)]
pub struct AMFSurface {
    pub pVtbl: *const AMFSurfaceVtbl,
}

#[repr(C)]
pub struct AMFContextVtbl {
    pub interface: AMFInterfaceVtbl,
    pub storage: AMFPropertyStorageVtbl,
    pub Terminate: unsafe extern "system" fn(this: *mut c_void) -> AMF_RESULT,
    pub InitDX9:
        unsafe extern "system" fn(this: *mut c_void, pDX9Device: *mut c_void) -> AMF_RESULT,
    pub GetDX9Device: Slot,
    pub LockDX9: Slot,
    pub UnlockDX9: Slot,
    pub InitDX11: unsafe extern "system" fn(
        this: *mut c_void,
        pDX11Device: *mut c_void,
        dxVersionRequired: i32,
    ) -> AMF_RESULT,
    pub GetDX11Device: Slot,
    pub LockDX11: Slot,
    pub UnlockDX11: Slot,
    pub InitOpenCL: Slot,
    pub GetOpenCLContext: Slot,
    pub GetOpenCLCommandQueue: Slot,
    pub GetOpenCLDeviceID: Slot,
    pub GetOpenCLComputeFactory: Slot,
    pub InitOpenCLEx: Slot,
    pub LockOpenCL: Slot,
    pub UnlockOpenCL: Slot,
    pub InitOpenGL: Slot,
    pub GetOpenGLContext: Slot,
    pub GetOpenGLDrawable: Slot,
    pub LockOpenGL: Slot,
    pub UnlockOpenGL: Slot,
    pub InitXV: Slot,
    pub GetXVDevice: Slot,
    pub LockXV: Slot,
    pub UnlockXV: Slot,
    pub InitGralloc: Slot,
    pub GetGrallocDevice: Slot,
    pub LockGralloc: Slot,
    pub UnlockGralloc: Slot,
    pub AllocBuffer: unsafe extern "system" fn(
        this: *mut c_void,
        type_: AMF_MEMORY_TYPE,
        size: usize,
        ppBuffer: *mut *mut AMFBuffer,
    ) -> AMF_RESULT,
    pub AllocSurface: unsafe extern "system" fn(
        this: *mut c_void,
        type_: AMF_MEMORY_TYPE,
        format: AMF_SURFACE_FORMAT,
        width: i32,
        height: i32,
        ppSurface: *mut *mut AMFSurface,
    ) -> AMF_RESULT,
    pub AllocAudioBuffer: Slot,
    pub CreateBufferFromHostNative: Slot,
    pub CreateSurfaceFromHostNative: Slot,
    pub CreateSurfaceFromDX9Native: unsafe extern "system" fn(
        this: *mut c_void,
        pDX9Surface: *mut c_void,
        ppSurface: *mut *mut AMFSurface,
        pObserver: *mut c_void,
    ) -> AMF_RESULT,
    pub CreateSurfaceFromDX11Native: unsafe extern "system" fn(
        this: *mut c_void,
        pDX11Surface: *mut c_void,
        ppSurface: *mut *mut AMFSurface,
        pObserver: *mut c_void,
    ) -> AMF_RESULT,
    pub CreateSurfaceFromOpenGLNative: Slot,
    pub CreateSurfaceFromGrallocNative: Slot,
    pub CreateSurfaceFromOpenCLNative: Slot,
    pub CreateBufferFromOpenCLNative: Slot,
    pub GetCompute: Slot,
}

#[repr(C)]
pub struct AMFContext {
    pub pVtbl: *const AMFContextVtbl,
}

/// `AMFContext1` extends the context vtable.
#[repr(C)]
pub struct AMFContext1Vtbl {
    pub base: AMFContextVtbl,
    pub CreateBufferFromDX11Native: Slot,
    pub AllocBufferEx: Slot,
    pub AllocSurfaceEx: Slot,
    pub InitVulkan:
        unsafe extern "system" fn(this: *mut c_void, pVulkanDevice: *mut c_void) -> AMF_RESULT,
    pub GetVulkanDevice: Slot,
    pub LockVulkan: Slot,
    pub UnlockVulkan: Slot,
    pub CreateSurfaceFromVulkanNative: Slot,
    pub CreateBufferFromVulkanNative: Slot,
    pub GetVulkanDeviceExtensions: Slot,
}

#[repr(C)]
pub struct AMFContext1 {
    pub pVtbl: *const AMFContext1Vtbl,
}

#[repr(C)]
pub struct AMFComponentVtbl {
    pub interface: AMFInterfaceVtbl,
    pub storage: AMFPropertyStorageVtbl,
    pub GetPropertiesInfoCount: Slot,
    pub GetPropertyInfoAt: Slot,
    pub GetPropertyInfo: Slot,
    pub ValidateProperty: Slot,
    pub Init: unsafe extern "system" fn(
        this: *mut c_void,
        format: AMF_SURFACE_FORMAT,
        width: i32,
        height: i32,
    ) -> AMF_RESULT,
    pub ReInit: Slot,
    pub Terminate: unsafe extern "system" fn(this: *mut c_void) -> AMF_RESULT,
    pub Drain: unsafe extern "system" fn(this: *mut c_void) -> AMF_RESULT,
    pub Flush: unsafe extern "system" fn(this: *mut c_void) -> AMF_RESULT,
    pub SubmitInput: unsafe extern "system" fn(this: *mut c_void, pData: *mut c_void) -> AMF_RESULT,
    pub QueryOutput:
        unsafe extern "system" fn(this: *mut c_void, ppData: *mut *mut c_void) -> AMF_RESULT,
    pub GetContext: Slot,
    pub SetOutputDataAllocatorCB: Slot,
    pub GetCaps: Slot,
    pub Optimize: Slot,
}

#[repr(C)]
pub struct AMFComponent {
    pub pVtbl: *const AMFComponentVtbl,
}

#[repr(C)]
pub struct AMFFactoryVtbl {
    pub CreateContext:
        unsafe extern "system" fn(this: *mut c_void, ppContext: *mut *mut AMFContext) -> AMF_RESULT,
    pub CreateComponent: unsafe extern "system" fn(
        this: *mut c_void,
        pContext: *mut AMFContext,
        id: *const wchar_t,
        ppComponent: *mut *mut AMFComponent,
    ) -> AMF_RESULT,
    pub SetCacheFolder: Slot,
    pub GetCacheFolder: Slot,
    pub GetDebug:
        unsafe extern "system" fn(this: *mut c_void, ppDebug: *mut *mut AMFDebug) -> AMF_RESULT,
    pub GetTrace:
        unsafe extern "system" fn(this: *mut c_void, ppTrace: *mut *mut AMFTrace) -> AMF_RESULT,
    pub GetPrograms: Slot,
}

#[repr(C)]
pub struct AMFFactory {
    pub pVtbl: *const AMFFactoryVtbl,
}

#[repr(C)]
pub struct AMFTraceVtbl {
    pub TraceW: Slot,
    pub Trace: Slot,
    pub SetGlobalLevel:
        unsafe extern "system" fn(this: *mut c_void, level: AMF_TRACE_LEVEL) -> AMF_TRACE_LEVEL,
    pub GetGlobalLevel: Slot,
    pub EnableWriter: unsafe extern "system" fn(
        this: *mut c_void,
        writerID: *const wchar_t,
        enable: bool,
    ) -> bool,
    pub WriterEnabled: Slot,
    pub TraceEnableAsync: Slot,
    pub TraceFlush: Slot,
    pub SetPath: Slot,
    pub GetPath: Slot,
    pub SetWriterLevel: unsafe extern "system" fn(
        this: *mut c_void,
        writerID: *const wchar_t,
        level: AMF_TRACE_LEVEL,
    ) -> AMF_TRACE_LEVEL,
    pub GetWriterLevel: Slot,
    pub SetWriterLevelForScope: Slot,
    pub GetWriterLevelForScope: Slot,
    pub GetIndentation: Slot,
    pub Indent: Slot,
    pub RegisterWriter: unsafe extern "system" fn(
        this: *mut c_void,
        writerID: *const wchar_t,
        pWriter: *mut AMFTraceWriter,
        enable: bool,
    ),
    pub UnregisterWriter: unsafe extern "system" fn(this: *mut c_void, writerID: *const wchar_t),
    pub GetResultText: Slot,
    pub SurfaceGetFormatName: Slot,
    pub GetMemoryTypeName: Slot,
}

#[repr(C)]
pub struct AMFTrace {
    pub pVtbl: *const AMFTraceVtbl,
}

#[repr(C)]
pub struct AMFDebugVtbl {
    pub EnablePerformanceMonitor: unsafe extern "system" fn(this: *mut c_void, enable: bool),
    pub PerformanceMonitorEnabled: Slot,
    pub AssertsEnable: unsafe extern "system" fn(this: *mut c_void, enable: bool),
    pub AssertsEnabled: Slot,
}

#[repr(C)]
pub struct AMFDebug {
    pub pVtbl: *const AMFDebugVtbl,
}

#[repr(C)]
pub struct AMFTraceWriterVtbl {
    pub Write: unsafe extern "C" fn(
        this: *mut AMFTraceWriter,
        scope: *const wchar_t,
        message: *const wchar_t,
    ),
    pub Flush: unsafe extern "C" fn(this: *mut AMFTraceWriter),
}

#[repr(C)]
pub struct AMFTraceWriter {
    pub pVtbl: *const AMFTraceWriterVtbl,
}

/// Prefix of `ID3D11DeviceChild`'s vtable, used to tag a texture with its array slice.
#[repr(C)]
pub struct ID3D11DeviceChildVtbl {
    pub QueryInterface: Slot,
    pub AddRef: Slot,
    pub Release: Slot,
    pub GetDevice: Slot,
    pub GetPrivateData: Slot,
    pub SetPrivateData: unsafe extern "system" fn(
        this: *mut c_void,
        guid: *const AMFGuid,
        dataSize: u32,
        pData: *const c_void,
    ) -> i32,
}

#[repr(C)]
pub struct ID3D11DeviceChild {
    pub pVtbl: *const ID3D11DeviceChildVtbl,
}

/// Private data GUID through which the runtime reads the array slice of a D3D11 texture.
pub const AMF_TEXTURE_ARRAY_INDEX_GUID: AMFGuid = AMFGuid {
    data1: 0x28115527,
    data2: 0xe7c3,
    data3: 0x4b66,
    data4: [0x99, 0xd3, 0x4f, 0x2a, 0xe6, 0xb4, 0x7f, 0xaf],
};
