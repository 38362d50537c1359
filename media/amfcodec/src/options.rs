// Copyright 2022 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Static configuration of the sessions.
//!
//! Every structure deserializes from JSON with missing fields taking their default value, and
//! every enum field parses from the same strings on the command line.

use std::fmt;
use std::str::FromStr;

use amf::ColorPrimaries;
use amf::ColorProfile;
use amf::ColorRange;
use amf::DecoderMode;
use amf::EncoderUsage;
use amf::HqScalerAlgorithm;
use amf::QualityPreset;
use amf::RateControl;
use amf::ScaleType;
use amf::TimestampMode;
use amf::TransferCharacteristic;
use serde::Deserialize;
use serde::Serialize;

use crate::PixelFormat;
use crate::UnknownName;

/// Decoder surface pool size used when neither the options nor the look-ahead ask for more.
pub const DEFAULT_SURFACE_POOL_SIZE: u32 = 30;

/// Number of zero-copy surfaces the encoder may hold before `submit` waits for output.
pub const DEFAULT_MAX_IN_FLIGHT: u32 = 16;

/// Options of a [`crate::DeviceSession`].
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DeviceOptions {
    /// Also send runtime trace output to the platform debugger.
    pub log_to_dbg: bool,
    /// Enable the runtime's performance monitor.
    pub performance_monitor: bool,
    /// Enable the runtime's internal assertions.
    pub asserts: bool,
}

/// Options of a [`crate::DecoderSession`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DecoderOptions {
    /// Output reordering.
    pub decoder_mode: DecoderMode,
    /// Timestamp assignment.
    pub timestamp_mode: TimestampMode,
    /// Number of output surfaces. Computed from `extra_frames` and `threads` when unset.
    pub surface_pool_size: Option<u32>,
    /// Minimum number of reference frames.
    pub dpb_size: Option<u32>,
    /// Output frames as soon as they are decoded.
    pub low_latency: bool,
    /// Enable smart access video.
    pub smart_access_video: bool,
    /// Skip the host transfer when smart access video is enabled.
    pub skip_transfer_sav: bool,
    /// Frames held by the consumer on top of the decoder's own needs.
    pub extra_frames: u32,
    /// Frames held by consumer threads.
    pub threads: u32,
    /// Return frames wrapping the runtime surface instead of host frames.
    pub hardware_output: bool,
    /// Number of query cycles `decode` waits for the queue to drain before giving up.
    pub max_retries: u32,
    /// Sleep between two query cycles, in microseconds.
    pub backoff_us: u64,
}

impl Default for DecoderOptions {
    fn default() -> Self {
        DecoderOptions {
            decoder_mode: DecoderMode::Regular,
            timestamp_mode: TimestampMode::Presentation,
            surface_pool_size: None,
            dpb_size: None,
            low_latency: false,
            smart_access_video: false,
            skip_transfer_sav: false,
            extra_frames: 0,
            threads: 0,
            hardware_output: false,
            max_retries: 1000,
            backoff_us: 1000,
        }
    }
}

impl DecoderOptions {
    /// Number of surfaces to request from the decoder.
    pub fn pool_size(&self) -> u32 {
        self.surface_pool_size.unwrap_or_else(|| {
            DEFAULT_SURFACE_POOL_SIZE.max(self.extra_frames.saturating_add(self.threads))
        })
    }
}

/// Options of a [`crate::EncoderSession`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EncoderOptions {
    /// Usage preset.
    pub usage: EncoderUsage,
    /// Speed/quality trade-off.
    pub quality: QualityPreset,
    /// Rate control method. Left to the runtime when unset.
    pub rate_control: Option<RateControl>,
    /// Target bitrate in bits per second.
    pub bitrate: Option<i64>,
    /// Peak bitrate in bits per second.
    pub max_bitrate: Option<i64>,
    /// Distance between two key frames.
    pub gop_size: Option<u32>,
    /// Number of B pictures between two references. Enables timestamp reordering when non zero.
    pub b_frames: u32,
    /// Let the encoder shorten mini-GOPs.
    pub adaptive_mini_gop: bool,
    /// Insert access unit delimiters (H.264 and HEVC).
    pub aud: bool,
    /// Zero-copy surfaces the encoder may hold.
    pub max_in_flight: u32,
    /// Number of 1ms polls a blocking `receive_packet` makes before giving up.
    pub poll_limit: u32,
}

impl Default for EncoderOptions {
    fn default() -> Self {
        EncoderOptions {
            usage: EncoderUsage::Transcoding,
            quality: QualityPreset::Balanced,
            rate_control: None,
            bitrate: None,
            max_bitrate: None,
            gop_size: None,
            b_frames: 0,
            adaptive_mini_gop: false,
            aud: false,
            max_in_flight: DEFAULT_MAX_IN_FLIGHT,
            poll_limit: 5000,
        }
    }
}

/// Output pixel format of the scaler.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum OutputFormat {
    /// Keep the software format of the input.
    Same,
    /// Convert to this format.
    Format(PixelFormat),
}

impl FromStr for OutputFormat {
    type Err = UnknownName;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "same" {
            return Ok(OutputFormat::Same);
        }
        s.parse().map(OutputFormat::Format)
    }
}

impl TryFrom<String> for OutputFormat {
    type Error = UnknownName;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<OutputFormat> for String {
    fn from(f: OutputFormat) -> Self {
        f.to_string()
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            OutputFormat::Same => f.write_str("same"),
            OutputFormat::Format(format) => write!(f, "{}", format),
        }
    }
}

/// Runtime component doing the scaling.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Scaler {
    /// Video converter: scaling, pixel format and color conversion.
    #[default]
    Converter,
    /// High-quality scaler. Keeps the pixel format of the input.
    Hq,
}

/// Options of a [`crate::FilterSession`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ScaleOptions {
    /// Output width expression.
    pub w: String,
    /// Output height expression.
    pub h: String,
    /// Output pixel format.
    pub format: OutputFormat,
    /// Component doing the scaling.
    pub scaler: Scaler,
    /// Scaling filter of the converter.
    pub scale_type: ScaleType,
    /// Algorithm of the high-quality scaler. The runtime picks one when unset.
    pub hq_algorithm: Option<HqScalerAlgorithm>,
    /// Conversion matrix, combined with `color_range`.
    pub color_profile: Option<ColorProfile>,
    /// Output range.
    pub color_range: Option<ColorRange>,
    /// Output primaries.
    pub primaries: Option<ColorPrimaries>,
    /// Output transfer characteristic.
    pub trc: Option<TransferCharacteristic>,
}

impl Default for ScaleOptions {
    fn default() -> Self {
        ScaleOptions {
            w: "iw".to_owned(),
            h: "ih".to_owned(),
            format: OutputFormat::Same,
            scaler: Scaler::Converter,
            scale_type: ScaleType::Bilinear,
            hq_algorithm: None,
            color_profile: None,
            color_range: None,
            primaries: None,
            trc: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pool_size_defaults() {
        let mut options = DecoderOptions::default();
        assert_eq!(options.pool_size(), 30);
        options.extra_frames = 24;
        options.threads = 8;
        assert_eq!(options.pool_size(), 32);
        options.surface_pool_size = Some(4);
        assert_eq!(options.pool_size(), 4);
    }

    #[test]
    fn decoder_options_from_json() {
        let options: DecoderOptions =
            serde_json::from_str(r#"{"decoder_mode": "low-latency", "dpb_size": 2}"#).unwrap();
        assert_eq!(options.decoder_mode, DecoderMode::LowLatency);
        assert_eq!(options.timestamp_mode, TimestampMode::Presentation);
        assert_eq!(options.dpb_size, Some(2));
        assert!(serde_json::from_str::<DecoderOptions>(r#"{"mode": "regular"}"#).is_err());
    }

    #[test]
    fn scale_options_from_json() {
        let options: ScaleOptions =
            serde_json::from_str(r#"{"w": "iw/2", "format": "p010", "trc": "smpte2084"}"#)
                .unwrap();
        assert_eq!(options.w, "iw/2");
        assert_eq!(options.h, "ih");
        assert_eq!(options.format, OutputFormat::Format(PixelFormat::P010));
        assert_eq!(options.trc, Some(TransferCharacteristic::Smpte2084));
        assert_eq!(ScaleOptions::default().format, OutputFormat::Same);
        assert!("bogus".parse::<OutputFormat>().is_err());

        let options: ScaleOptions =
            serde_json::from_str(r#"{"scaler": "hq", "hq_algorithm": "video-sr1.1"}"#).unwrap();
        assert_eq!(options.scaler, Scaler::Hq);
        assert_eq!(options.hq_algorithm, Some(HqScalerAlgorithm::VideoSr1_1));
        assert_eq!(ScaleOptions::default().scaler, Scaler::Converter);
        assert!(serde_json::from_str::<ScaleOptions>(r#"{"scaler": "lanczos"}"#).is_err());
    }
}
