// Copyright 2022 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Pools of hardware frames.

use std::rc::Rc;

use amf::MemoryType;
use amf::Surface;

use crate::copy_from_surface;
use crate::copy_to_surface;
use crate::error::hardware;
use crate::to_surface_format;
use crate::DeviceSession;
use crate::Error;
use crate::Frame;
use crate::FrameStorage;
use crate::HostImage;
use crate::PixelFormat;
use crate::Result;

/// Software formats a frames context can hold.
pub const SUPPORTED_SW_FORMATS: [PixelFormat; 3] =
    [PixelFormat::Nv12, PixelFormat::Yuv420p, PixelFormat::P010];

/// What a frames context accepts.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FramesConstraints {
    /// Formats of the frames handed out by the pool.
    pub valid_hw_formats: Vec<PixelFormat>,
    /// Formats the pixels can have.
    pub valid_sw_formats: Vec<PixelFormat>,
}

/// A pool of hardware frames of one size and software format, on one device.
#[derive(Debug)]
pub struct FramesContext {
    device: Rc<DeviceSession>,
    sw_format: PixelFormat,
    width: u32,
    height: u32,
}

impl FramesContext {
    /// Creates a pool of `width`x`height` frames holding `sw_format` pixels.
    pub fn new(
        device: Rc<DeviceSession>,
        sw_format: PixelFormat,
        width: u32,
        height: u32,
    ) -> Result<Rc<Self>> {
        if !SUPPORTED_SW_FORMATS.contains(&sw_format) {
            return Err(Error::FormatRejected(sw_format));
        }
        if width == 0 || height == 0 {
            return Err(Error::InvalidDimensions {
                width: width as i64,
                height: height as i64,
            });
        }
        device.context()?;
        Ok(Rc::new(FramesContext {
            device,
            sw_format,
            width,
            height,
        }))
    }

    /// Formats any frames context accepts.
    pub fn constraints() -> FramesConstraints {
        FramesConstraints {
            valid_hw_formats: vec![PixelFormat::Amf],
            valid_sw_formats: SUPPORTED_SW_FORMATS.to_vec(),
        }
    }

    /// Device the frames are allocated on.
    pub fn device(&self) -> &Rc<DeviceSession> {
        &self.device
    }

    /// Format of the pixels.
    pub fn sw_format(&self) -> PixelFormat {
        self.sw_format
    }

    /// Width of the frames.
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Height of the frames.
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Host formats pixels can be transferred to and from.
    pub fn transfer_formats(&self) -> Vec<PixelFormat> {
        vec![self.sw_format]
    }

    /// Allocates a frame from the pool.
    pub fn get_buffer(self: &Rc<Self>) -> Result<Frame> {
        let surface = self
            .device
            .context()?
            .alloc_surface(
                self.device.memory_type(),
                to_surface_format(self.sw_format),
                self.width,
                self.height,
            )
            .map_err(hardware("AllocSurface"))?;
        let mut frame = Frame::new(
            self.width,
            self.height,
            PixelFormat::Amf,
            FrameStorage::Hardware(surface),
        );
        frame.frames_ctx = Some(Rc::clone(self));
        Ok(frame)
    }

    /// Copies the pixels of host frame `src` into hardware frame `dst`, limited to the smaller
    /// of the two sizes.
    pub fn transfer_to(&self, dst: &Frame, src: &Frame) -> Result<()> {
        let surface = host_mapped(dst)?;
        let image = src.to_image()?;
        if to_surface_format(image.format) != surface.format() {
            return Err(Error::PlaneLayoutMismatch(image.format));
        }
        copy_to_surface(
            image.format,
            dst.width.min(src.width),
            dst.height.min(src.height),
            &image.plane_refs(),
            surface,
        )
    }

    /// Copies the pixels of hardware frame `src` into `dst`, limited to the smaller of the two
    /// sizes.
    pub fn transfer_from(&self, dst: &mut HostImage, src: &Frame) -> Result<()> {
        let surface = host_mapped(src)?;
        if to_surface_format(dst.format) != surface.format() {
            return Err(Error::PlaneLayoutMismatch(dst.format));
        }
        copy_from_surface(surface, dst)
    }
}

/// Returns the surface of a hardware frame, migrated to host memory.
fn host_mapped(frame: &Frame) -> Result<&Surface> {
    let surface = match &frame.storage {
        FrameStorage::Hardware(surface) => surface,
        _ => return Err(Error::UnsupportedStorage("not a hardware frame")),
    };
    if surface.memory_type() != MemoryType::Host {
        surface
            .convert(MemoryType::Host)
            .map_err(hardware("Convert"))?;
    }
    Ok(surface)
}

#[cfg(test)]
mod tests {
    use amf::fake::FakeRuntime;
    use amf::LogForwarder;

    use super::*;
    use crate::BackendRequest;
    use crate::DeviceOptions;

    fn device(runtime: &FakeRuntime) -> Rc<DeviceSession> {
        DeviceSession::create(
            runtime,
            Rc::new(LogForwarder),
            DeviceOptions::default(),
            BackendRequest::Auto,
        )
        .unwrap()
    }

    #[test]
    fn pool_frames_live_on_the_device() {
        let runtime = FakeRuntime::new();
        let pool = FramesContext::new(device(&runtime), PixelFormat::Nv12, 64, 32).unwrap();
        let frame = pool.get_buffer().unwrap();
        assert_eq!(frame.format, PixelFormat::Amf);
        assert!(frame.frames_ctx.is_some());
        match &frame.storage {
            FrameStorage::Hardware(surface) => {
                assert_eq!(surface.memory_type(), MemoryType::Dx11)
            }
            s => panic!("unexpected storage {:?}", s),
        }
        assert_eq!(pool.transfer_formats(), vec![PixelFormat::Nv12]);
    }

    #[test]
    fn transfers_are_clipped_to_the_smaller_frame() {
        let runtime = FakeRuntime::new();
        let pool = FramesContext::new(device(&runtime), PixelFormat::Nv12, 4, 2).unwrap();
        let hw = pool.get_buffer().unwrap();
        let bytes: Vec<u8> = (1..=(8 * 4 + 8 * 2)).map(|i| i as u8).collect();
        let src = Frame::from_image(
            HostImage::from_packed(PixelFormat::Nv12, 8, 4, &bytes).unwrap(),
        );
        pool.transfer_to(&hw, &src).unwrap();

        let mut out = HostImage::new(PixelFormat::Nv12, 4, 2).unwrap();
        pool.transfer_from(&mut out, &hw).unwrap();
        assert_eq!(out.planes[0].data, vec![1, 2, 3, 4, 9, 10, 11, 12]);
        assert_eq!(out.planes[1].data, vec![33, 34, 35, 36]);
    }

    #[test]
    fn unsupported_pools_are_rejected() {
        let runtime = FakeRuntime::new();
        assert!(matches!(
            FramesContext::new(device(&runtime), PixelFormat::Rgba, 64, 64),
            Err(Error::FormatRejected(PixelFormat::Rgba))
        ));
        assert!(FramesContext::new(device(&runtime), PixelFormat::Nv12, 0, 64).is_err());
        assert_eq!(
            FramesContext::constraints().valid_sw_formats,
            SUPPORTED_SW_FORMATS.to_vec()
        );
    }

    #[test]
    fn host_frames_cannot_be_transfer_targets() {
        let runtime = FakeRuntime::new();
        let pool = FramesContext::new(device(&runtime), PixelFormat::Nv12, 4, 4).unwrap();
        let host = Frame::from_image(HostImage::new(PixelFormat::Nv12, 4, 4).unwrap());
        assert!(matches!(
            pool.transfer_to(&host, &host),
            Err(Error::UnsupportedStorage(_))
        ));
    }
}
