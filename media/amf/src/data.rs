// Copyright 2022 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

use std::fmt;
use std::rc::Rc;

use libc::c_void;

use crate::BufferObject;
use crate::DataKey;
use crate::HdrMetadata;
use crate::MemoryType;
use crate::PlaneInfo;
use crate::SideData;
use crate::Status;
use crate::StatusResult;
use crate::SurfaceFormat;
use crate::SurfaceObject;

/// An owned reference to a runtime surface.
///
/// Each `Surface` holds exactly one runtime reference: cloning acquires a new one and dropping
/// releases it, so the runtime object lives exactly as long as its last handle.
pub struct Surface {
    object: Rc<dyn SurfaceObject>,
}

impl Surface {
    /// Takes ownership of one reference to `object`.
    pub fn from_object(object: Rc<dyn SurfaceObject>) -> Self {
        Surface { object }
    }

    /// Returns the object behind this handle.
    pub fn object(&self) -> &dyn SurfaceObject {
        self.object.as_ref()
    }

    /// Pointer to the runtime object.
    pub fn as_raw(&self) -> *mut c_void {
        self.object.as_raw()
    }

    /// Pixel format of the surface.
    pub fn format(&self) -> SurfaceFormat {
        self.object.format()
    }

    /// Memory the surface lives in.
    pub fn memory_type(&self) -> MemoryType {
        self.object.memory_type()
    }

    /// Migrates the surface to `memory`.
    pub fn convert(&self, memory: MemoryType) -> StatusResult<()> {
        self.object.convert(memory)
    }

    /// Planes of a host-memory surface.
    pub fn planes(&self) -> Vec<PlaneInfo> {
        self.object.planes()
    }

    /// Restricts the visible area of the surface.
    pub fn set_crop(&self, x: u32, y: u32, width: u32, height: u32) -> StatusResult<()> {
        self.object.set_crop(x, y, width, height)
    }

    /// Presentation timestamp in 100ns units.
    pub fn pts(&self) -> i64 {
        self.object.pts()
    }

    /// Sets the presentation timestamp in 100ns units.
    pub fn set_pts(&self, pts: i64) {
        self.object.set_pts(pts)
    }

    /// Duration in 100ns units.
    pub fn duration(&self) -> i64 {
        self.object.duration()
    }

    /// Sets the duration in 100ns units.
    pub fn set_duration(&self, duration: i64) {
        self.object.set_duration(duration)
    }

    /// Stores an integer property.
    pub fn set_int64(&self, key: DataKey, value: i64) -> StatusResult<()> {
        self.object.set_int64(key, value)
    }

    /// Reads an integer property.
    pub fn int64(&self, key: DataKey) -> Option<i64> {
        self.object.int64(key)
    }

    /// Stores an interface property holding a buffer.
    pub fn set_buffer(&self, key: DataKey, buffer: &Buffer) -> StatusResult<()> {
        self.object.set_buffer(key, buffer)
    }

    /// Reads an interface property holding a buffer.
    pub fn buffer(&self, key: DataKey) -> Option<Buffer> {
        self.object.buffer(key)
    }

    /// Attaches host packet metadata.
    pub fn set_side_data(&self, side: &SideData) -> StatusResult<()> {
        for (key, value) in SideData::KEYS.iter().zip(side.to_values()) {
            self.set_int64(*key, value)?;
        }
        Ok(())
    }

    /// Reads host packet metadata attached with `set_side_data`, possibly by the runtime from
    /// the input this surface was produced from.
    pub fn side_data(&self) -> Option<SideData> {
        SideData::from_lookup(|key| self.int64(key))
    }

    /// Copies `rows` rows of `row_bytes` bytes from `src`, whose rows are `src_stride` bytes
    /// apart, into plane `index` of this host-memory surface.
    pub fn write_plane(
        &self,
        index: usize,
        src: &[u8],
        src_stride: usize,
        row_bytes: usize,
        rows: usize,
    ) -> StatusResult<()> {
        let plane = *self.planes().get(index).ok_or(Status::OutOfRange)?;
        if plane.native.is_null() {
            return Err(Status::InvalidPointer);
        }
        if row_bytes > plane.h_pitch
            || rows > plane.height as usize
            || (rows > 0 && src.len() < src_stride * (rows - 1) + row_bytes)
        {
            return Err(Status::OutOfRange);
        }
        for row in 0..rows {
            let src_row = &src[row * src_stride..row * src_stride + row_bytes];
            // Safe because the plane holds `height` rows of `h_pitch` bytes, we checked that
            // `row < height` and `row_bytes <= h_pitch`, and the surface is kept alive by `self`.
            unsafe {
                std::ptr::copy_nonoverlapping(
                    src_row.as_ptr(),
                    plane.native.add(row * plane.h_pitch),
                    row_bytes,
                );
            }
        }
        Ok(())
    }

    /// Returns the contents of plane `index` of this host-memory surface, `h_pitch` bytes per
    /// row.
    pub fn plane_data(&self, index: usize) -> StatusResult<&[u8]> {
        let plane = *self.planes().get(index).ok_or(Status::OutOfRange)?;
        if plane.native.is_null() {
            return Err(Status::InvalidPointer);
        }
        // Safe because host-memory planes are `height` rows of `h_pitch` bytes which stay valid
        // while this reference to the surface is held, and the returned slice borrows `self`.
        Ok(unsafe {
            std::slice::from_raw_parts(plane.native, plane.h_pitch * plane.height as usize)
        })
    }
}

impl Clone for Surface {
    fn clone(&self) -> Self {
        self.object.acquire();
        Surface {
            object: Rc::clone(&self.object),
        }
    }
}

impl Drop for Surface {
    fn drop(&mut self) {
        self.object.release();
    }
}

impl fmt::Debug for Surface {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Surface")
            .field("raw", &self.as_raw())
            .field("format", &self.format())
            .field("memory", &self.memory_type())
            .finish()
    }
}

/// An owned reference to a runtime buffer. Same ownership rules as [`Surface`].
pub struct Buffer {
    object: Rc<dyn BufferObject>,
}

impl Buffer {
    /// Takes ownership of one reference to `object`.
    pub fn from_object(object: Rc<dyn BufferObject>) -> Self {
        Buffer { object }
    }

    /// Returns the object behind this handle.
    pub fn object(&self) -> &dyn BufferObject {
        self.object.as_ref()
    }

    /// Pointer to the runtime object.
    pub fn as_raw(&self) -> *mut c_void {
        self.object.as_raw()
    }

    /// Memory the buffer lives in.
    pub fn memory_type(&self) -> MemoryType {
        self.object.memory_type()
    }

    /// Size of the meaningful part of the buffer.
    pub fn size(&self) -> usize {
        self.object.size()
    }

    /// Shrinks the meaningful part of the buffer to `size`.
    pub fn set_size(&self, size: usize) -> StatusResult<()> {
        self.object.set_size(size)
    }

    /// Presentation timestamp in 100ns units.
    pub fn pts(&self) -> i64 {
        self.object.pts()
    }

    /// Sets the presentation timestamp in 100ns units.
    pub fn set_pts(&self, pts: i64) {
        self.object.set_pts(pts)
    }

    /// Duration in 100ns units.
    pub fn duration(&self) -> i64 {
        self.object.duration()
    }

    /// Sets the duration in 100ns units.
    pub fn set_duration(&self, duration: i64) {
        self.object.set_duration(duration)
    }

    /// Stores an integer property.
    pub fn set_int64(&self, key: DataKey, value: i64) -> StatusResult<()> {
        self.object.set_int64(key, value)
    }

    /// Reads an integer property.
    pub fn int64(&self, key: DataKey) -> Option<i64> {
        self.object.int64(key)
    }

    /// Attaches host packet metadata.
    pub fn set_side_data(&self, side: &SideData) -> StatusResult<()> {
        for (key, value) in SideData::KEYS.iter().zip(side.to_values()) {
            self.set_int64(*key, value)?;
        }
        Ok(())
    }

    /// Reads host packet metadata.
    pub fn side_data(&self) -> Option<SideData> {
        SideData::from_lookup(|key| self.int64(key))
    }

    /// Copies `data` at `offset` into this host-memory buffer. `capacity` is the size the buffer
    /// was allocated with, which may exceed its current size.
    pub fn write(&self, offset: usize, data: &[u8], capacity: usize) -> StatusResult<()> {
        let native = self.object.native();
        if native.is_null() {
            return Err(Status::InvalidPointer);
        }
        if offset + data.len() > capacity {
            return Err(Status::OutOfRange);
        }
        // Safe because the buffer was allocated with `capacity` bytes, the range was checked
        // above and the buffer is kept alive by `self`.
        unsafe {
            std::ptr::copy_nonoverlapping(data.as_ptr(), native.add(offset), data.len());
        }
        Ok(())
    }

    /// Returns the meaningful bytes of this host-memory buffer.
    pub fn data(&self) -> StatusResult<&[u8]> {
        let native = self.object.native();
        if native.is_null() {
            return Err(Status::InvalidPointer);
        }
        // Safe because a host-memory buffer holds at least `size()` bytes at `native()`, valid
        // for as long as this reference, which the returned slice borrows.
        Ok(unsafe { std::slice::from_raw_parts(native, self.size()) })
    }

    /// Interprets the buffer as HDR static metadata.
    pub fn hdr_metadata(&self) -> Option<HdrMetadata> {
        HdrMetadata::from_buffer_bytes(self.data().ok()?)
    }
}

impl Clone for Buffer {
    fn clone(&self) -> Self {
        self.object.acquire();
        Buffer {
            object: Rc::clone(&self.object),
        }
    }
}

impl Drop for Buffer {
    fn drop(&mut self) {
        self.object.release();
    }
}

impl fmt::Debug for Buffer {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Buffer")
            .field("raw", &self.as_raw())
            .field("size", &self.size())
            .finish()
    }
}

/// Input or output of a component.
#[derive(Clone, Debug)]
pub enum Data {
    /// A picture.
    Surface(Surface),
    /// A compressed bitstream chunk, or any other linear data.
    Buffer(Buffer),
}

impl Data {
    /// Pointer to the runtime object.
    pub fn as_raw(&self) -> *mut c_void {
        match self {
            Data::Surface(s) => s.as_raw(),
            Data::Buffer(b) => b.as_raw(),
        }
    }
}
