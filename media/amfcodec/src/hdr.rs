// Copyright 2022 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Conversions between host HDR side data and the runtime's `AMFHDRMetadata`.

use amf::HdrMetadata;

use crate::Rational;

const LUMA_DEN: i32 = 10000;
const CHROMA_DEN: i32 = 50000;

/// Mastering display color volume of a frame.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct MasteringDisplay {
    /// CIE 1931 xy chromaticities of the red, green and blue primaries.
    pub display_primaries: [[Rational; 2]; 3],
    /// CIE 1931 xy chromaticity of the white point.
    pub white_point: [Rational; 2],
    /// Minimum luminance in cd/m².
    pub min_luminance: Rational,
    /// Maximum luminance in cd/m².
    pub max_luminance: Rational,
    /// Whether `display_primaries` and `white_point` are meaningful.
    pub has_primaries: bool,
    /// Whether `min_luminance` and `max_luminance` are meaningful.
    pub has_luminance: bool,
}

/// Content light levels of a stream, in cd/m².
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct ContentLight {
    /// Maximum content light level.
    pub max_cll: u32,
    /// Maximum frame-average light level.
    pub max_fall: u32,
}

fn scaled(value: Rational, den: i32) -> u32 {
    if value.den == 0 {
        return 0;
    }
    let v = value.num as i64 * den as i64 / value.den as i64;
    v.clamp(0, u32::MAX as i64) as u32
}

fn chroma(value: Rational) -> u16 {
    scaled(value, CHROMA_DEN).min(CHROMA_DEN as u32) as u16
}

fn light(value: u32) -> u16 {
    value.min(u16::MAX as u32) as u16
}

/// Builds the runtime's HDR metadata from a frame's side data. Returns `None` when the frame has
/// no mastering display information.
pub fn to_hdr_metadata(
    mastering: Option<&MasteringDisplay>,
    content_light: Option<&ContentLight>,
) -> Option<HdrMetadata> {
    let mastering = mastering?;
    let mut meta = HdrMetadata::default();
    if mastering.has_luminance {
        meta.max_mastering_luminance = scaled(mastering.max_luminance, LUMA_DEN);
        meta.min_mastering_luminance =
            scaled(mastering.min_luminance, LUMA_DEN).min(meta.max_mastering_luminance);
    }
    if mastering.has_primaries {
        let [r, g, b] = mastering.display_primaries;
        meta.red_primary = [chroma(r[0]), chroma(r[1])];
        meta.green_primary = [chroma(g[0]), chroma(g[1])];
        meta.blue_primary = [chroma(b[0]), chroma(b[1])];
        meta.white_point = [
            chroma(mastering.white_point[0]),
            chroma(mastering.white_point[1]),
        ];
    }
    if let Some(content_light) = content_light {
        meta.max_content_light_level = light(content_light.max_cll);
        meta.max_frame_average_light_level = light(content_light.max_fall);
    }
    Some(meta)
}

/// Splits the runtime's HDR metadata into frame side data.
pub fn from_hdr_metadata(meta: &HdrMetadata) -> (MasteringDisplay, Option<ContentLight>) {
    let c = |v: u16| Rational::new(v as i32, CHROMA_DEN);
    let mastering = MasteringDisplay {
        display_primaries: [
            [c(meta.red_primary[0]), c(meta.red_primary[1])],
            [c(meta.green_primary[0]), c(meta.green_primary[1])],
            [c(meta.blue_primary[0]), c(meta.blue_primary[1])],
        ],
        white_point: [c(meta.white_point[0]), c(meta.white_point[1])],
        min_luminance: Rational::new(
            meta.min_mastering_luminance.min(i32::MAX as u32) as i32,
            LUMA_DEN,
        ),
        max_luminance: Rational::new(
            meta.max_mastering_luminance.min(i32::MAX as u32) as i32,
            LUMA_DEN,
        ),
        has_primaries: true,
        has_luminance: true,
    };
    let content_light = if meta.max_content_light_level != 0
        || meta.max_frame_average_light_level != 0
    {
        Some(ContentLight {
            max_cll: meta.max_content_light_level as u32,
            max_fall: meta.max_frame_average_light_level as u32,
        })
    } else {
        None
    };
    (mastering, content_light)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bt2020_display() -> MasteringDisplay {
        MasteringDisplay {
            display_primaries: [
                [Rational::new(708, 1000), Rational::new(292, 1000)],
                [Rational::new(170, 1000), Rational::new(797, 1000)],
                [Rational::new(131, 1000), Rational::new(46, 1000)],
            ],
            white_point: [Rational::new(3127, 10000), Rational::new(3290, 10000)],
            min_luminance: Rational::new(1, 200),
            max_luminance: Rational::new(1000, 1),
            has_primaries: true,
            has_luminance: true,
        }
    }

    #[test]
    fn converts_units() {
        let light = ContentLight {
            max_cll: 1000,
            max_fall: 400,
        };
        let meta = to_hdr_metadata(Some(&bt2020_display()), Some(&light)).unwrap();
        assert_eq!(meta.red_primary, [35400, 14600]);
        assert_eq!(meta.white_point, [15635, 16450]);
        assert_eq!(meta.max_mastering_luminance, 10_000_000);
        assert_eq!(meta.min_mastering_luminance, 50);
        assert_eq!(meta.max_content_light_level, 1000);
        assert_eq!(meta.max_frame_average_light_level, 400);
    }

    #[test]
    fn clamps_out_of_range_values() {
        let mut display = bt2020_display();
        display.display_primaries[0][0] = Rational::new(3, 2);
        display.min_luminance = Rational::new(2000, 1);
        let meta = to_hdr_metadata(Some(&display), None).unwrap();
        assert_eq!(meta.red_primary[0], 50000);
        assert_eq!(meta.min_mastering_luminance, meta.max_mastering_luminance);
        assert_eq!(meta.max_content_light_level, 0);
    }

    #[test]
    fn needs_mastering_display() {
        let light = ContentLight {
            max_cll: 1,
            max_fall: 1,
        };
        assert!(to_hdr_metadata(None, Some(&light)).is_none());
    }

    #[test]
    fn reads_back_runtime_metadata() {
        let meta = to_hdr_metadata(Some(&bt2020_display()), None).unwrap();
        let (mastering, light) = from_hdr_metadata(&meta);
        assert_eq!(mastering.max_luminance.to_f64(), 1000.0);
        assert_eq!(mastering.white_point[0], Rational::new(15635, 50000));
        assert!(light.is_none());
    }
}
