// Copyright 2022 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Host pixel formats and codecs, and their mapping onto the runtime's enums.

use std::fmt;
use std::str::FromStr;

use amf::SurfaceFormat;
use amf::VideoCodec;
use serde::Deserialize;
use serde::Serialize;
use thiserror::Error as ThisError;

/// Pixel formats of host frames.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "&'static str")]
pub enum PixelFormat {
    /// No format.
    None,
    /// 8-bit 4:2:0, Y plane followed by interleaved UV plane.
    Nv12,
    /// Packed BGR with an unused fourth byte.
    Bgr0,
    /// Packed RGB with an unused fourth byte.
    Rgb0,
    /// Packed BGRA.
    Bgra,
    /// Packed ARGB.
    Argb,
    /// Packed RGBA.
    Rgba,
    /// 8-bit grayscale.
    Gray8,
    /// 8-bit 4:2:0 planar.
    Yuv420p,
    /// Packed 8-bit 4:2:2, YUYV order.
    Yuyv422,
    /// 10-bit 4:2:0 in 16-bit words, Y plane followed by interleaved UV plane.
    P010,
    /// 10-bit 4:2:0 planar in 16-bit words.
    Yuv420p10,
    /// 12-bit 4:2:0 planar in 16-bit words.
    Yuv420p12,
    /// 16-bit 4:2:0 planar.
    Yuv420p16,
    /// 10-bit 4:2:2 planar in 16-bit words.
    Yuv422p10,
    /// 10-bit 4:4:4 planar in 16-bit words.
    Yuv444p10,
    /// Slice of a D3D11 texture array.
    D3d11,
    /// D3D9 surface.
    Dxva2,
    /// Runtime surface.
    Amf,
}

const PIXEL_FORMAT_NAMES: &[(PixelFormat, &str)] = &[
    (PixelFormat::None, "none"),
    (PixelFormat::Nv12, "nv12"),
    (PixelFormat::Bgr0, "bgr0"),
    (PixelFormat::Rgb0, "rgb0"),
    (PixelFormat::Bgra, "bgra"),
    (PixelFormat::Argb, "argb"),
    (PixelFormat::Rgba, "rgba"),
    (PixelFormat::Gray8, "gray"),
    (PixelFormat::Yuv420p, "yuv420p"),
    (PixelFormat::Yuyv422, "yuyv422"),
    (PixelFormat::P010, "p010"),
    (PixelFormat::Yuv420p10, "yuv420p10"),
    (PixelFormat::Yuv420p12, "yuv420p12"),
    (PixelFormat::Yuv420p16, "yuv420p16"),
    (PixelFormat::Yuv422p10, "yuv422p10"),
    (PixelFormat::Yuv444p10, "yuv444p10"),
    (PixelFormat::D3d11, "d3d11"),
    (PixelFormat::Dxva2, "dxva2_vld"),
    (PixelFormat::Amf, "amf"),
];

/// Size of one plane of a host image.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct PlaneLayout {
    /// Number of meaningful bytes per row.
    pub row_bytes: usize,
    /// Number of rows.
    pub rows: usize,
}

impl PixelFormat {
    /// Every format, in table order.
    pub const ALL: [PixelFormat; 19] = [
        PixelFormat::None,
        PixelFormat::Nv12,
        PixelFormat::Bgr0,
        PixelFormat::Rgb0,
        PixelFormat::Bgra,
        PixelFormat::Argb,
        PixelFormat::Rgba,
        PixelFormat::Gray8,
        PixelFormat::Yuv420p,
        PixelFormat::Yuyv422,
        PixelFormat::P010,
        PixelFormat::Yuv420p10,
        PixelFormat::Yuv420p12,
        PixelFormat::Yuv420p16,
        PixelFormat::Yuv422p10,
        PixelFormat::Yuv444p10,
        PixelFormat::D3d11,
        PixelFormat::Dxva2,
        PixelFormat::Amf,
    ];

    /// Name of the format.
    pub fn as_str(self) -> &'static str {
        PIXEL_FORMAT_NAMES
            .iter()
            .find(|(f, _)| *f == self)
            .map(|(_, name)| *name)
            .unwrap_or("none")
    }

    /// Whether frames of this format reference GPU memory instead of holding pixels.
    pub fn is_hardware(self) -> bool {
        matches!(
            self,
            PixelFormat::D3d11 | PixelFormat::Dxva2 | PixelFormat::Amf
        )
    }

    /// Layout of the planes of a `width`x`height` host image of this format. Empty for
    /// hardware formats and `None`.
    pub fn plane_layout(self, width: u32, height: u32) -> Vec<PlaneLayout> {
        let w = width as usize;
        let h = height as usize;
        let cw = (w + 1) / 2;
        let ch = (h + 1) / 2;
        let plane = |row_bytes, rows| PlaneLayout { row_bytes, rows };
        use PixelFormat::*;
        match self {
            None | D3d11 | Dxva2 | Amf => vec![],
            Nv12 => vec![plane(w, h), plane(cw * 2, ch)],
            Bgr0 | Rgb0 | Bgra | Argb | Rgba => vec![plane(w * 4, h)],
            Gray8 => vec![plane(w, h)],
            Yuv420p => vec![plane(w, h), plane(cw, ch), plane(cw, ch)],
            Yuyv422 => vec![plane(cw * 4, h)],
            P010 => vec![plane(w * 2, h), plane(cw * 4, ch)],
            Yuv420p10 | Yuv420p12 | Yuv420p16 => {
                vec![plane(w * 2, h), plane(cw * 2, ch), plane(cw * 2, ch)]
            }
            Yuv422p10 => vec![plane(w * 2, h), plane(cw * 2, h), plane(cw * 2, h)],
            Yuv444p10 => vec![plane(w * 2, h), plane(w * 2, h), plane(w * 2, h)],
        }
    }
}

impl fmt::Display for PixelFormat {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A format or codec name that is not recognized.
#[derive(Debug, Clone, PartialEq, Eq, ThisError)]
#[error("unknown {kind} '{name}'")]
pub struct UnknownName {
    /// What was being parsed.
    pub kind: &'static str,
    /// The offending name.
    pub name: String,
}

impl FromStr for PixelFormat {
    type Err = UnknownName;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PIXEL_FORMAT_NAMES
            .iter()
            .find(|(_, name)| *name == s)
            .map(|(f, _)| *f)
            .ok_or_else(|| UnknownName {
                kind: "pixel format",
                name: s.to_owned(),
            })
    }
}

impl TryFrom<String> for PixelFormat {
    type Error = UnknownName;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<PixelFormat> for &'static str {
    fn from(f: PixelFormat) -> Self {
        f.as_str()
    }
}

// First match wins in both directions: several host formats share a surface format, and the
// inverse returns the first of them.
const FORMAT_TABLE: &[(PixelFormat, SurfaceFormat)] = &[
    (PixelFormat::None, SurfaceFormat::Unknown),
    (PixelFormat::Nv12, SurfaceFormat::Nv12),
    (PixelFormat::Bgr0, SurfaceFormat::Bgra),
    (PixelFormat::Rgb0, SurfaceFormat::Rgba),
    (PixelFormat::Bgra, SurfaceFormat::Bgra),
    (PixelFormat::Argb, SurfaceFormat::Argb),
    (PixelFormat::Rgba, SurfaceFormat::Rgba),
    (PixelFormat::Gray8, SurfaceFormat::Gray8),
    (PixelFormat::Yuv420p, SurfaceFormat::Yuv420p),
    (PixelFormat::Yuyv422, SurfaceFormat::Yuy2),
    (PixelFormat::P010, SurfaceFormat::P010),
    (PixelFormat::Yuv420p10, SurfaceFormat::P010),
    (PixelFormat::Yuv420p12, SurfaceFormat::P012),
    (PixelFormat::Yuv420p16, SurfaceFormat::P016),
    (PixelFormat::Yuv422p10, SurfaceFormat::Y210),
    (PixelFormat::Yuv444p10, SurfaceFormat::Y416),
];

/// Maps a host pixel format to the runtime's surface format, or `SurfaceFormat::Unknown`.
pub fn to_surface_format(format: PixelFormat) -> SurfaceFormat {
    FORMAT_TABLE
        .iter()
        .find(|(pixel, _)| *pixel == format)
        .map(|(_, surface)| *surface)
        .unwrap_or(SurfaceFormat::Unknown)
}

/// Maps a runtime surface format to a host pixel format, or `PixelFormat::None`.
pub fn to_pixel_format(format: SurfaceFormat) -> PixelFormat {
    FORMAT_TABLE
        .iter()
        .find(|(_, surface)| *surface == format)
        .map(|(pixel, _)| *pixel)
        .unwrap_or(PixelFormat::None)
}

/// Host codec identifiers.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[allow(missing_docs)]
pub enum CodecId {
    H264,
    Hevc,
    Av1,
    Vp9,
    Mpeg2,
}

impl CodecId {
    /// The hardware codec family, if there is one for this codec.
    pub fn to_video_codec(self) -> Option<VideoCodec> {
        match self {
            CodecId::H264 => Some(VideoCodec::H264),
            CodecId::Hevc => Some(VideoCodec::Hevc),
            CodecId::Av1 => Some(VideoCodec::Av1),
            CodecId::Vp9 | CodecId::Mpeg2 => None,
        }
    }
}

impl fmt::Display for CodecId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            CodecId::H264 => "h264",
            CodecId::Hevc => "hevc",
            CodecId::Av1 => "av1",
            CodecId::Vp9 => "vp9",
            CodecId::Mpeg2 => "mpeg2video",
        };
        f.write_str(name)
    }
}

impl FromStr for CodecId {
    type Err = UnknownName;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "h264" | "avc" => Ok(CodecId::H264),
            "hevc" | "h265" => Ok(CodecId::Hevc),
            "av1" => Ok(CodecId::Av1),
            "vp9" => Ok(CodecId::Vp9),
            "mpeg2video" | "mpeg2" => Ok(CodecId::Mpeg2),
            _ => Err(UnknownName {
                kind: "codec",
                name: s.to_owned(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_table_round_trip() {
        for (pixel, surface) in FORMAT_TABLE {
            assert_eq!(to_surface_format(*pixel), *surface);
            // The inverse may land on another preimage, which must map to the same surface.
            assert_eq!(to_surface_format(to_pixel_format(*surface)), *surface);
        }
        assert_eq!(to_pixel_format(SurfaceFormat::Nv12), PixelFormat::Nv12);
        assert_eq!(to_pixel_format(SurfaceFormat::Bgra), PixelFormat::Bgr0);
        assert_eq!(to_pixel_format(SurfaceFormat::P010), PixelFormat::P010);
    }

    #[test]
    fn unmapped_formats_use_sentinels() {
        assert_eq!(to_surface_format(PixelFormat::Amf), SurfaceFormat::Unknown);
        assert_eq!(to_surface_format(PixelFormat::D3d11), SurfaceFormat::Unknown);
        assert_eq!(to_pixel_format(SurfaceFormat::Uyvy), PixelFormat::None);
        assert_eq!(to_pixel_format(SurfaceFormat::Unknown), PixelFormat::None);
    }

    #[test]
    fn names() {
        for format in PixelFormat::ALL {
            assert_eq!(format.as_str().parse::<PixelFormat>(), Ok(format));
        }
        assert!("nv21".parse::<PixelFormat>().is_err());
        assert_eq!("h265".parse::<CodecId>(), Ok(CodecId::Hevc));
        assert_eq!(CodecId::Vp9.to_video_codec(), None);
    }

    #[test]
    fn nv12_layout() {
        let layout = PixelFormat::Nv12.plane_layout(1921, 1081);
        assert_eq!(
            layout,
            vec![
                PlaneLayout {
                    row_bytes: 1921,
                    rows: 1081
                },
                PlaneLayout {
                    row_bytes: 1922,
                    rows: 541
                },
            ]
        );
        assert!(PixelFormat::Amf.plane_layout(16, 16).is_empty());
    }
}
