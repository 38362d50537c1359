// Copyright 2022 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Host images and copies between them and runtime surfaces.

use amf::MemoryType;
use amf::Surface;

use crate::error::hardware;
use crate::Error;
use crate::PixelFormat;
use crate::Result;

/// One plane of a host image.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HostPlane {
    /// Pixels, `stride` bytes per row.
    pub data: Vec<u8>,
    /// Distance in bytes between the start of two rows.
    pub stride: usize,
}

/// Borrowed view of one plane.
#[derive(Copy, Clone, Debug)]
pub struct PlaneRef<'a> {
    /// Pixels, `stride` bytes per row.
    pub data: &'a [u8],
    /// Distance in bytes between the start of two rows.
    pub stride: usize,
}

/// A picture in host memory.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HostImage {
    /// Pixel format.
    pub format: PixelFormat,
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
    /// Planes, as described by `PixelFormat::plane_layout`.
    pub planes: Vec<HostPlane>,
}

impl HostImage {
    /// Allocates a zeroed image with tightly packed rows.
    pub fn new(format: PixelFormat, width: u32, height: u32) -> Result<Self> {
        let layout = format.plane_layout(width, height);
        if layout.is_empty() {
            return Err(Error::UnsupportedStorage("format has no host layout"));
        }
        Ok(HostImage {
            format,
            width,
            height,
            planes: layout
                .iter()
                .map(|p| HostPlane {
                    data: vec![0; p.row_bytes * p.rows],
                    stride: p.row_bytes,
                })
                .collect(),
        })
    }

    /// Number of bytes of a tightly packed image.
    pub fn packed_size(format: PixelFormat, width: u32, height: u32) -> usize {
        format
            .plane_layout(width, height)
            .iter()
            .map(|p| p.row_bytes * p.rows)
            .sum()
    }

    /// Creates an image from tightly packed planes, one after the other.
    pub fn from_packed(
        format: PixelFormat,
        width: u32,
        height: u32,
        bytes: &[u8],
    ) -> Result<Self> {
        if bytes.len() < Self::packed_size(format, width, height) {
            return Err(Error::PlaneLayoutMismatch(format));
        }
        let mut image = Self::new(format, width, height)?;
        let mut offset = 0;
        for plane in image.planes.iter_mut() {
            let len = plane.data.len();
            plane.data.copy_from_slice(&bytes[offset..offset + len]);
            offset += len;
        }
        Ok(image)
    }

    /// Returns the visible rows of every plane, tightly packed.
    pub fn to_packed(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(Self::packed_size(self.format, self.width, self.height));
        for (plane, layout) in self
            .planes
            .iter()
            .zip(self.format.plane_layout(self.width, self.height))
        {
            for row in plane.data.chunks(plane.stride.max(1)).take(layout.rows) {
                out.extend_from_slice(&row[..layout.row_bytes.min(row.len())]);
            }
        }
        out
    }

    /// Borrowed views of the planes.
    pub fn plane_refs(&self) -> Vec<PlaneRef<'_>> {
        self.planes
            .iter()
            .map(|p| PlaneRef {
                data: &p.data,
                stride: p.stride,
            })
            .collect()
    }
}

/// Copies host planes of a `width`x`height` image of `format` into a host-memory `surface`.
///
/// Rows are clipped to the smaller of the two images.
pub fn copy_to_surface(
    format: PixelFormat,
    width: u32,
    height: u32,
    planes: &[PlaneRef],
    surface: &Surface,
) -> Result<()> {
    let layout = format.plane_layout(width, height);
    let dst = surface.planes();
    if layout.len() != dst.len() || planes.len() < layout.len() {
        return Err(Error::PlaneLayoutMismatch(format));
    }
    for (index, ((src, layout), dst)) in planes.iter().zip(&layout).zip(&dst).enumerate() {
        let row_bytes = layout.row_bytes.min(dst.row_bytes());
        let rows = layout.rows.min(dst.height as usize);
        surface
            .write_plane(index, src.data, src.stride, row_bytes, rows)
            .map_err(hardware("write plane"))?;
    }
    Ok(())
}

/// Copies the planes of a host-memory `surface` into `image`, clipped to the smaller of the two.
pub fn copy_from_surface(surface: &Surface, image: &mut HostImage) -> Result<()> {
    let src = surface.planes();
    let layout = image.format.plane_layout(image.width, image.height);
    if layout.len() != src.len() || image.planes.len() != layout.len() {
        return Err(Error::PlaneLayoutMismatch(image.format));
    }
    for (index, ((dst, layout), info)) in image
        .planes
        .iter_mut()
        .zip(&layout)
        .zip(&src)
        .enumerate()
    {
        let data = surface.plane_data(index).map_err(hardware("read plane"))?;
        let row_bytes = layout.row_bytes.min(info.row_bytes());
        let rows = layout.rows.min(info.height as usize);
        for row in 0..rows {
            let src_row = &data[row * info.h_pitch..row * info.h_pitch + row_bytes];
            dst.data[row * dst.stride..row * dst.stride + row_bytes].copy_from_slice(src_row);
        }
    }
    Ok(())
}

/// A runtime surface in host memory whose planes a frame reads in place.
///
/// Holding it keeps one reference on the surface, released when the last clone is dropped.
#[derive(Clone, Debug)]
pub struct MappedSurface {
    surface: Surface,
}

impl MappedSurface {
    /// Migrates `surface` to host memory if needed and maps it.
    pub fn new(surface: Surface) -> Result<Self> {
        if surface.memory_type() != MemoryType::Host {
            surface
                .convert(MemoryType::Host)
                .map_err(hardware("Convert"))?;
        }
        Ok(MappedSurface { surface })
    }

    /// The mapped surface.
    pub fn surface(&self) -> &Surface {
        &self.surface
    }

    /// Number of planes.
    pub fn plane_count(&self) -> usize {
        self.surface.planes().len()
    }

    /// Plane `index`, read in place.
    pub fn plane(&self, index: usize) -> Result<PlaneRef<'_>> {
        let info = *self
            .surface
            .planes()
            .get(index)
            .ok_or(Error::UnexpectedOutput("missing surface plane"))?;
        let data = self
            .surface
            .plane_data(index)
            .map_err(hardware("read plane"))?;
        Ok(PlaneRef {
            data,
            stride: info.h_pitch,
        })
    }

    /// Every plane, read in place.
    pub fn planes(&self) -> Result<Vec<PlaneRef<'_>>> {
        (0..self.plane_count()).map(|i| self.plane(i)).collect()
    }

    /// Copies the surface into a new host image.
    pub fn to_image(&self, format: PixelFormat, width: u32, height: u32) -> Result<HostImage> {
        let mut image = HostImage::new(format, width, height)?;
        copy_from_surface(&self.surface, &mut image)?;
        Ok(image)
    }
}
