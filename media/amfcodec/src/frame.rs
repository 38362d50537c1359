// Copyright 2022 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Host side of the sessions: raw frames and compressed packets.

use std::ops::Mul;
use std::rc::Rc;

use amf::ColorPrimaries;
use amf::ColorProfile;
use amf::ColorRange;
use amf::NativeHandle;
use amf::Surface;
use amf::TransferCharacteristic;
use serde::Deserialize;
use serde::Serialize;

use crate::ContentLight;
use crate::DeviceSession;
use crate::FramesContext;
use crate::HostImage;
use crate::MappedSurface;
use crate::MasteringDisplay;
use crate::PixelFormat;

/// A rational number, used for time bases, frame rates and aspect ratios.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rational {
    /// Numerator.
    pub num: i32,
    /// Denominator.
    pub den: i32,
}

impl Rational {
    /// Creates `num/den`.
    pub const fn new(num: i32, den: i32) -> Self {
        Rational { num, den }
    }

    /// Value as a float. Zero when the denominator is zero.
    pub fn to_f64(self) -> f64 {
        if self.den == 0 {
            0.0
        } else {
            self.num as f64 / self.den as f64
        }
    }

    /// Reduces the fraction. `0/0` stays as is.
    pub fn reduce(self) -> Self {
        let g = gcd(self.num as i64, self.den as i64);
        if g == 0 {
            return self;
        }
        let sign = if self.den < 0 { -1 } else { 1 };
        Rational::new(
            (sign * self.num as i64 / g) as i32,
            (sign * self.den as i64 / g) as i32,
        )
    }

    /// Converts `value` from units of `from` to units of `to`, rounding to the nearest integer
    /// and halfway cases away from zero.
    pub fn rescale(value: i64, from: Rational, to: Rational) -> i64 {
        let b = from.num as i128 * to.den as i128;
        let c = from.den as i128 * to.num as i128;
        if c == 0 {
            return value;
        }
        let (b, c) = if c < 0 { (-b, -c) } else { (b, c) };
        let r = value as i128 * b;
        let q = if r >= 0 {
            (r + c / 2) / c
        } else {
            -((-r + c / 2) / c)
        };
        q.clamp(i64::MIN as i128 + 1, i64::MAX as i128) as i64
    }
}

pub(crate) fn gcd(a: i64, b: i64) -> i64 {
    if b == 0 {
        a.abs()
    } else {
        gcd(b, a % b)
    }
}

impl Mul for Rational {
    type Output = Rational;

    /// Reduced product. Terms that still do not fit in `i32` are approximated.
    fn mul(self, other: Rational) -> Rational {
        let mut num = self.num as i64 * other.num as i64;
        let mut den = self.den as i64 * other.den as i64;
        let g = gcd(num, den);
        if g > 1 {
            num /= g;
            den /= g;
        }
        if den < 0 {
            num = -num;
            den = -den;
        }
        let max = i32::MAX as i64;
        while num.abs() > max || den > max {
            if den == 1 {
                num = num.clamp(-max, max);
                break;
            }
            num /= 2;
            den /= 2;
        }
        Rational::new(num as i32, den as i32)
    }
}

/// Clock of the runtime: 100ns units.
pub const RUNTIME_TIME_BASE: Rational = Rational::new(1, 10_000_000);

/// Color description of a frame.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ColorInfo {
    /// Quantization range.
    pub range: ColorRange,
    /// Primaries.
    pub primaries: ColorPrimaries,
    /// Transfer characteristic.
    pub transfer: TransferCharacteristic,
    /// YUV/RGB conversion matrix.
    pub profile: ColorProfile,
}

impl Default for ColorInfo {
    fn default() -> Self {
        ColorInfo {
            range: ColorRange::Undefined,
            primaries: ColorPrimaries::Undefined,
            transfer: TransferCharacteristic::Undefined,
            profile: ColorProfile::Unknown,
        }
    }
}

/// Where the pixels of a frame live.
#[derive(Clone, Debug)]
pub enum FrameStorage {
    /// Pixels owned by the frame.
    Host(HostImage),
    /// Host-memory runtime surface, read in place. The surface is released when the last clone of
    /// the frame is dropped.
    Mapped(MappedSurface),
    /// Runtime surface in GPU memory.
    Hardware(Surface),
    /// Slice `array_index` of a D3D11 texture array.
    D3d11Texture {
        /// The `ID3D11Texture2D`.
        texture: NativeHandle,
        /// Slice of the texture array holding the picture.
        array_index: u32,
    },
    /// A D3D9 surface.
    Dxva2Surface(NativeHandle),
}

/// A raw video frame.
#[derive(Clone, Debug)]
pub struct Frame {
    /// Visible width.
    pub width: u32,
    /// Visible height.
    pub height: u32,
    /// Pixel format, consistent with `storage`.
    pub format: PixelFormat,
    /// Presentation timestamp, in the session's time base.
    pub pts: Option<i64>,
    /// Decode timestamp of the packet the frame was decoded from.
    pub pkt_dts: Option<i64>,
    /// Duration, in the session's time base.
    pub duration: i64,
    /// Size of the packet the frame was decoded from.
    pub pkt_size: i64,
    /// Byte offset in its container of the packet the frame was decoded from, or -1.
    pub pkt_pos: i64,
    /// Stream of the packet the frame was decoded from.
    pub stream_index: i64,
    /// Whether this is a key frame.
    pub key_frame: bool,
    /// Color description.
    pub color: ColorInfo,
    /// Sample aspect ratio; `0/1` when unknown.
    pub sample_aspect_ratio: Rational,
    /// Mastering display side data.
    pub mastering_display: Option<MasteringDisplay>,
    /// Content light level side data.
    pub content_light: Option<ContentLight>,
    /// Pixels.
    pub storage: FrameStorage,
    /// Pool the frame was allocated from.
    pub frames_ctx: Option<Rc<FramesContext>>,
    /// Device owning the runtime surface in `storage`, kept open while the frame lives.
    pub device: Option<Rc<DeviceSession>>,
}

impl Frame {
    /// Creates a frame with default metadata.
    pub fn new(width: u32, height: u32, format: PixelFormat, storage: FrameStorage) -> Self {
        Frame {
            width,
            height,
            format,
            pts: None,
            pkt_dts: None,
            duration: 0,
            pkt_size: -1,
            pkt_pos: -1,
            stream_index: 0,
            key_frame: false,
            color: ColorInfo::default(),
            sample_aspect_ratio: Rational::new(0, 1),
            mastering_display: None,
            content_light: None,
            storage,
            frames_ctx: None,
            device: None,
        }
    }

    /// Creates a frame owning `image`.
    pub fn from_image(image: HostImage) -> Self {
        Frame::new(
            image.width,
            image.height,
            image.format,
            FrameStorage::Host(image),
        )
    }

    /// Creates a frame referencing slice `array_index` of a D3D11 texture array.
    pub fn from_d3d11_texture(
        width: u32,
        height: u32,
        texture: NativeHandle,
        array_index: u32,
    ) -> Self {
        Frame::new(
            width,
            height,
            PixelFormat::D3d11,
            FrameStorage::D3d11Texture {
                texture,
                array_index,
            },
        )
    }

    /// Copies the pixels of the frame into a new host image, mapping runtime surfaces if needed.
    pub fn to_image(&self) -> crate::Result<HostImage> {
        match &self.storage {
            FrameStorage::Host(image) => Ok(image.clone()),
            FrameStorage::Mapped(mapped) => mapped.to_image(self.format, self.width, self.height),
            FrameStorage::Hardware(surface) => {
                let mapped = MappedSurface::new(surface.clone())?;
                let format = crate::to_pixel_format(surface.format());
                mapped.to_image(format, self.width, self.height)
            }
            FrameStorage::D3d11Texture { .. } | FrameStorage::Dxva2Surface(_) => Err(
                crate::Error::UnsupportedStorage("platform textures cannot be read back"),
            ),
        }
    }
}

/// A compressed packet. A packet without data marks the end of the stream.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Packet {
    /// Payload.
    pub data: Vec<u8>,
    /// Presentation timestamp, in the session's time base.
    pub pts: Option<i64>,
    /// Decode timestamp, in the session's time base.
    pub dts: Option<i64>,
    /// Duration, in the session's time base.
    pub duration: i64,
    /// Byte offset in its container, or -1.
    pub pos: i64,
    /// Stream the packet belongs to.
    pub stream_index: i64,
    /// Whether the packet starts with a key frame.
    pub key: bool,
}

impl Packet {
    /// Creates a packet holding `data`, with unknown timestamps.
    pub fn new(data: Vec<u8>) -> Self {
        Packet {
            data,
            pts: None,
            dts: None,
            duration: 0,
            pos: -1,
            stream_index: 0,
            key: false,
        }
    }

    /// The end-of-stream marker.
    pub fn eos() -> Self {
        Packet::new(Vec::new())
    }

    /// Whether this packet marks the end of the stream.
    pub fn is_eos(&self) -> bool {
        self.data.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rescale_to_runtime_clock() {
        let ms = Rational::new(1, 1000);
        assert_eq!(Rational::rescale(33, ms, RUNTIME_TIME_BASE), 330_000);
        assert_eq!(Rational::rescale(330_000, RUNTIME_TIME_BASE, ms), 33);
        let ntsc = Rational::new(1001, 30000);
        assert_eq!(Rational::rescale(1, ntsc, RUNTIME_TIME_BASE), 333_667);
        assert_eq!(Rational::rescale(-1, ntsc, RUNTIME_TIME_BASE), -333_667);
    }

    #[test]
    fn reduce() {
        assert_eq!(Rational::new(1920, 1080).reduce(), Rational::new(16, 9));
        assert_eq!(Rational::new(2, -4).reduce(), Rational::new(-1, 2));
        assert_eq!(Rational::new(0, 0).reduce(), Rational::new(0, 0));
    }

    #[test]
    fn product() {
        assert_eq!(
            Rational::new(1080 * 1920, 1440 * 1080) * Rational::new(1, 1),
            Rational::new(4, 3)
        );
        assert_eq!(
            Rational::new(-3, 4) * Rational::new(2, -3),
            Rational::new(1, 2)
        );
        assert_eq!(
            Rational::new(i32::MAX, 1) * Rational::new(4, 1),
            Rational::new(i32::MAX, 1)
        );
    }

    #[test]
    fn end_of_stream_packet() {
        assert!(Packet::eos().is_eos());
        assert!(!Packet::new(vec![0, 0, 1]).is_eos());
        assert_eq!(Packet::new(vec![1]).pos, -1);
    }
}
