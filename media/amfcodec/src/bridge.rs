// Copyright 2022 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Conversions between host frames and runtime surfaces.

use std::rc::Rc;

use amf::MemoryType;
use amf::SideData;
use amf::Surface;
use amf::SurfaceFormat;
use amf::NO_TIMESTAMP;

use crate::copy_to_surface;
use crate::error::hardware;
use crate::to_pixel_format;
use crate::to_surface_format;
use crate::DeviceSession;
use crate::Error;
use crate::Frame;
use crate::FrameStorage;
use crate::MappedSurface;
use crate::PixelFormat;
use crate::PlaneRef;
use crate::Result;

/// Where the pixels of the frames built from runtime surfaces live.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum FrameMemory {
    /// Host memory, readable through the frame's planes.
    Host,
    /// The runtime surface itself, for consumers on the same device.
    Hardware,
}

/// A surface built from a host frame.
#[derive(Debug)]
pub struct BridgedSurface {
    /// The surface.
    pub surface: Surface,
    /// Whether the surface shares the frame's pixels instead of holding a copy.
    pub zero_copy: bool,
}

/// Wraps host frames into runtime surfaces and back, on one device.
#[derive(Clone, Debug)]
pub struct SurfaceBridge {
    device: Rc<DeviceSession>,
}

impl SurfaceBridge {
    /// Creates a bridge allocating from `device`.
    pub fn new(device: Rc<DeviceSession>) -> Self {
        SurfaceBridge { device }
    }

    /// The device surfaces are allocated from.
    pub fn device(&self) -> &Rc<DeviceSession> {
        &self.device
    }

    /// Builds a surface holding the pixels of `frame`.
    ///
    /// Platform textures and runtime surfaces are wrapped without copying, cropped to the
    /// frame's visible size. Host pixels are copied into a new host-memory surface. The frame's
    /// timestamps and packet metadata are attached to the surface.
    pub fn frame_to_surface(&self, frame: &Frame) -> Result<BridgedSurface> {
        let context = self.device.context()?;
        let (surface, zero_copy) = match &frame.storage {
            FrameStorage::D3d11Texture {
                texture,
                array_index,
            } => (
                context
                    .create_surface_from_dx11(*texture, *array_index)
                    .map_err(hardware("CreateSurfaceFromDX11Native"))?,
                true,
            ),
            FrameStorage::Dxva2Surface(handle) => (
                context
                    .create_surface_from_dx9(*handle)
                    .map_err(hardware("CreateSurfaceFromDX9Native"))?,
                true,
            ),
            FrameStorage::Hardware(surface) => (surface.clone(), true),
            FrameStorage::Host(image) => (self.upload(frame, &image.plane_refs())?, false),
            FrameStorage::Mapped(mapped) => (self.upload(frame, &mapped.planes()?)?, false),
        };
        if zero_copy {
            surface
                .set_crop(0, 0, frame.width, frame.height)
                .map_err(hardware("SetCrop"))?;
        }
        surface.set_pts(frame.pts.unwrap_or(NO_TIMESTAMP));
        surface.set_duration(frame.duration);
        surface
            .set_side_data(&SideData {
                pts: frame.pts,
                dts: frame.pkt_dts,
                duration: frame.duration,
                packet_size: frame.pkt_size,
                packet_pos: frame.pkt_pos,
                stream_index: frame.stream_index,
            })
            .map_err(hardware("SetProperty"))?;
        Ok(BridgedSurface { surface, zero_copy })
    }

    fn upload(&self, frame: &Frame, planes: &[PlaneRef]) -> Result<Surface> {
        if frame.format.is_hardware() {
            return Err(Error::UnsupportedStorage("host pixels with a hardware format"));
        }
        let format = to_surface_format(frame.format);
        if format == SurfaceFormat::Unknown {
            return Err(Error::FormatRejected(frame.format));
        }
        let surface = self
            .device
            .context()?
            .alloc_surface(MemoryType::Host, format, frame.width, frame.height)
            .map_err(hardware("AllocSurface"))?;
        copy_to_surface(frame.format, frame.width, frame.height, planes, &surface)?;
        Ok(surface)
    }

    /// Builds a `width`x`height` frame from a surface produced by a component.
    ///
    /// The frame takes over the caller's reference to `surface` and releases it when its last
    /// clone is dropped. It also keeps the device, and with it the runtime, open until then.
    /// Timestamps and packet metadata are restored from the surface's properties.
    pub fn surface_to_frame(
        &self,
        surface: Surface,
        width: u32,
        height: u32,
        memory: FrameMemory,
    ) -> Result<Frame> {
        let side = surface.side_data();
        let surface_pts = Some(surface.pts()).filter(|pts| *pts != NO_TIMESTAMP);
        let surface_duration = surface.duration();
        let mut frame = match memory {
            FrameMemory::Hardware => Frame::new(
                width,
                height,
                PixelFormat::Amf,
                FrameStorage::Hardware(surface),
            ),
            FrameMemory::Host => {
                let format = to_pixel_format(surface.format());
                if format == PixelFormat::None {
                    return Err(Error::UnexpectedOutput("surface format has no host equivalent"));
                }
                Frame::new(
                    width,
                    height,
                    format,
                    FrameStorage::Mapped(MappedSurface::new(surface)?),
                )
            }
        };
        frame.device = Some(Rc::clone(&self.device));
        match side {
            Some(side) => {
                frame.pts = side.pts.or(surface_pts);
                frame.pkt_dts = side.dts;
                frame.duration = side.duration;
                frame.pkt_size = side.packet_size;
                frame.pkt_pos = side.packet_pos;
                frame.stream_index = side.stream_index;
            }
            None => {
                frame.pts = surface_pts;
                frame.duration = surface_duration;
            }
        }
        Ok(frame)
    }
}
