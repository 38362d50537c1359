// Copyright 2022 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Surface formats, memory types and component identifiers understood by the runtime.

use enumn::N;

/// Mirror of `AMF_SURFACE_FORMAT`.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, N)]
#[repr(i32)]
#[allow(missing_docs)]
pub enum SurfaceFormat {
    Unknown = 0,
    Nv12 = 1,
    Yv12 = 2,
    Bgra = 3,
    Argb = 4,
    Rgba = 5,
    Gray8 = 6,
    Yuv420p = 7,
    U8v8 = 8,
    Yuy2 = 9,
    P010 = 10,
    RgbaF16 = 11,
    Uyvy = 12,
    R10g10b10a2 = 13,
    Y210 = 14,
    Ayuv = 15,
    Y410 = 16,
    Y416 = 17,
    Gray32 = 18,
    P012 = 19,
    P016 = 20,
}

/// Size of one plane of a surface, as laid out by the runtime.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct PlaneGeometry {
    /// Width of the plane in elements.
    pub width: u32,
    /// Height of the plane in rows.
    pub height: u32,
    /// Size of one element in bytes.
    pub pixel_size: u32,
}

impl PlaneGeometry {
    const fn new(width: u32, height: u32, pixel_size: u32) -> Self {
        Self {
            width,
            height,
            pixel_size,
        }
    }

    /// Number of meaningful bytes in one row of the plane.
    pub fn row_bytes(&self) -> usize {
        self.width as usize * self.pixel_size as usize
    }
}

impl SurfaceFormat {
    /// Converts a raw `AMF_SURFACE_FORMAT`, returning `Unknown` for values this crate does not
    /// know about.
    pub fn from_raw(raw: i32) -> Self {
        SurfaceFormat::n(raw).unwrap_or(SurfaceFormat::Unknown)
    }

    /// Returns the layout of the planes of a `width`x`height` surface of this format.
    pub fn planes(self, width: u32, height: u32) -> Vec<PlaneGeometry> {
        let half_w = (width + 1) / 2;
        let half_h = (height + 1) / 2;
        use SurfaceFormat::*;
        match self {
            Unknown => vec![],
            Nv12 => vec![
                PlaneGeometry::new(width, height, 1),
                PlaneGeometry::new(half_w, half_h, 2),
            ],
            Yv12 | Yuv420p => vec![
                PlaneGeometry::new(width, height, 1),
                PlaneGeometry::new(half_w, half_h, 1),
                PlaneGeometry::new(half_w, half_h, 1),
            ],
            P010 | P012 | P016 => vec![
                PlaneGeometry::new(width, height, 2),
                PlaneGeometry::new(half_w, half_h, 4),
            ],
            Bgra | Argb | Rgba | R10g10b10a2 | Ayuv | Y410 | Gray32 => {
                vec![PlaneGeometry::new(width, height, 4)]
            }
            RgbaF16 | Y416 => vec![PlaneGeometry::new(width, height, 8)],
            Gray8 => vec![PlaneGeometry::new(width, height, 1)],
            U8v8 => vec![PlaneGeometry::new(width, height, 2)],
            Yuy2 | Uyvy => vec![PlaneGeometry::new(half_w, height, 4)],
            Y210 => vec![PlaneGeometry::new(half_w, height, 8)],
        }
    }
}

/// Mirror of `AMF_MEMORY_TYPE`.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, N)]
#[repr(i32)]
#[allow(missing_docs)]
pub enum MemoryType {
    Unknown = 0,
    Host = 1,
    Dx9 = 2,
    Dx11 = 3,
    OpenCl = 4,
    OpenGl = 5,
    Xv = 6,
    Gralloc = 7,
    ComputeForDx9 = 8,
    ComputeForDx11 = 9,
    Vulkan = 10,
    Dx12 = 11,
}

impl MemoryType {
    /// Converts a raw `AMF_MEMORY_TYPE`, returning `Unknown` for unknown values.
    pub fn from_raw(raw: i32) -> Self {
        MemoryType::n(raw).unwrap_or(MemoryType::Unknown)
    }

    /// Whether surfaces of this memory type live in GPU memory that the host cannot address.
    pub fn is_gpu(self) -> bool {
        !matches!(self, MemoryType::Unknown | MemoryType::Host)
    }
}

/// Video codecs that the runtime has hardware components for.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[allow(missing_docs)]
pub enum VideoCodec {
    H264,
    Hevc,
    Av1,
}

/// Components this crate knows how to instantiate.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum ComponentId {
    /// Hardware decoder for `codec`.
    Decoder(VideoCodec),
    /// Hardware encoder for `codec`.
    Encoder(VideoCodec),
    /// Scaler and color converter.
    Converter,
    /// Scaler with edge-adaptive and super-resolution algorithms, keeping the pixel format.
    HqScaler,
}

impl ComponentId {
    /// Name the runtime's factory uses for this component.
    pub fn name(self) -> &'static str {
        match self {
            ComponentId::Decoder(VideoCodec::H264) => "AMFVideoDecoderUVD_H264_AVC",
            ComponentId::Decoder(VideoCodec::Hevc) => "AMFVideoDecoderHW_H265_HEVC",
            ComponentId::Decoder(VideoCodec::Av1) => "AMFVideoDecoderHW_AV1",
            ComponentId::Encoder(VideoCodec::H264) => "AMFVideoEncoderVCE_AVC",
            ComponentId::Encoder(VideoCodec::Hevc) => "AMFVideoEncoderHW_HEVC",
            ComponentId::Encoder(VideoCodec::Av1) => "AMFVideoEncoderHW_AV1",
            ComponentId::Converter => "AMFVideoConverter",
            ComponentId::HqScaler => "AMFHQScaler",
        }
    }

    /// Codec handled by this component, if it is a codec.
    pub fn codec(self) -> Option<VideoCodec> {
        match self {
            ComponentId::Decoder(codec) | ComponentId::Encoder(codec) => Some(codec),
            ComponentId::Converter | ComponentId::HqScaler => None,
        }
    }
}

/// Opaque reference to a platform object (device, texture) owned by someone else.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct NativeHandle(pub *mut libc::c_void);

impl NativeHandle {
    /// A null handle, for calls where the runtime picks the platform object itself.
    pub const fn null() -> Self {
        NativeHandle(std::ptr::null_mut())
    }

    /// Whether the handle is null.
    pub fn is_null(&self) -> bool {
        self.0.is_null()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nv12_planes() {
        let planes = SurfaceFormat::Nv12.planes(1921, 1081);
        assert_eq!(planes.len(), 2);
        assert_eq!(planes[0].row_bytes(), 1921);
        assert_eq!(planes[1].height, 541);
        assert_eq!(planes[1].row_bytes(), 1922);
    }

    #[test]
    fn raw_conversions() {
        assert_eq!(SurfaceFormat::from_raw(10), SurfaceFormat::P010);
        assert_eq!(SurfaceFormat::from_raw(-3), SurfaceFormat::Unknown);
        assert_eq!(MemoryType::from_raw(3), MemoryType::Dx11);
        assert!(MemoryType::Vulkan.is_gpu());
        assert!(!MemoryType::Host.is_gpu());
    }

    #[test]
    fn component_names() {
        assert_eq!(
            ComponentId::Decoder(VideoCodec::H264).name(),
            "AMFVideoDecoderUVD_H264_AVC"
        );
        assert_eq!(ComponentId::Converter.codec(), None);
        assert_eq!(ComponentId::HqScaler.name(), "AMFHQScaler");
    }
}
