// Copyright 2022 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Typed view of the runtime's string-keyed property bags.
//!
//! Components are configured through [`Property`], and queried through [`ComponentKey`]. Data
//! objects (surfaces and buffers) carry integer and interface properties addressed by
//! [`DataKey`]. Every key is part of a closed vocabulary, so a typo cannot silently create a new
//! property.

use std::fmt;
use std::str::FromStr;

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error as ThisError;
use zerocopy::FromBytes;
use zerocopy::Immutable;
use zerocopy::IntoBytes;
use zerocopy::KnownLayout;

use crate::Buffer;
use crate::ComponentId;
use crate::SurfaceFormat;
use crate::VideoCodec;

/// Sentinel used for absent timestamps inside property bags.
pub const NO_TIMESTAMP: i64 = i64::MIN;

/// Error returned when parsing an option value that is not part of its vocabulary.
#[derive(Debug, Clone, PartialEq, Eq, ThisError)]
#[error("invalid {kind} value \"{value}\"")]
pub struct UnknownOptionValue {
    /// Name of the option type.
    pub kind: &'static str,
    /// Rejected input.
    pub value: String,
}

/// Declares an enum mapped both to runtime property values and to option strings.
macro_rules! option_enum {
    (
        $(#[$meta:meta])*
        $name:ident {
            $($(#[$vmeta:meta])* $variant:ident = ($raw:expr, $text:literal),)*
        }
    ) => {
        $(#[$meta])*
        #[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "&'static str")]
        pub enum $name {
            $($(#[$vmeta])* $variant,)*
        }

        impl $name {
            /// Every value, in declaration order.
            pub const ALL: &'static [$name] = &[$($name::$variant,)*];

            /// Value of the runtime property.
            pub fn raw(self) -> i64 {
                match self {
                    $($name::$variant => $raw,)*
                }
            }

            /// Looks up a runtime property value.
            pub fn from_raw(raw: i64) -> Option<Self> {
                Self::ALL.iter().copied().find(|v| v.raw() == raw)
            }

            /// Option string for this value.
            pub fn as_str(self) -> &'static str {
                match self {
                    $($name::$variant => $text,)*
                }
            }
        }

        impl FromStr for $name {
            type Err = UnknownOptionValue;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::ALL
                    .iter()
                    .copied()
                    .find(|v| v.as_str() == s)
                    .ok_or_else(|| UnknownOptionValue {
                        kind: stringify!($name),
                        value: s.to_owned(),
                    })
            }
        }

        impl TryFrom<String> for $name {
            type Error = UnknownOptionValue;

            fn try_from(s: String) -> Result<Self, Self::Error> {
                s.parse()
            }
        }

        impl From<$name> for &'static str {
            fn from(v: $name) -> Self {
                v.as_str()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

option_enum! {
    /// Output reordering performed by the decoder.
    DecoderMode {
        /// Reorder frames with the DPB depth signalled in the stream.
        Regular = (0, "regular"),
        /// Reorder with the maximum DPB depth allowed by the profile.
        Compliant = (1, "compliant"),
        /// Output frames as soon as they are decoded.
        LowLatency = (2, "low-latency"),
    }
}

option_enum! {
    /// How the decoder assigns timestamps to output frames.
    TimestampMode {
        /// Output frames keep the timestamp of their input buffer.
        Presentation = (0, "presentation"),
        /// Input timestamps are sorted and assigned in output order.
        Sort = (1, "sort"),
        /// Output frames receive input timestamps in decode order.
        Decode = (2, "decode-order"),
    }
}

option_enum! {
    /// Encoder usage preset.
    EncoderUsage {
        #[allow(missing_docs)]
        Transcoding = (0, "transcoding"),
        #[allow(missing_docs)]
        UltraLowLatency = (1, "ultra-low-latency"),
        #[allow(missing_docs)]
        LowLatency = (2, "low-latency"),
        #[allow(missing_docs)]
        Webcam = (3, "webcam"),
    }
}

option_enum! {
    /// Encoder speed/quality trade-off.
    QualityPreset {
        #[allow(missing_docs)]
        Balanced = (0, "balanced"),
        #[allow(missing_docs)]
        Speed = (1, "speed"),
        #[allow(missing_docs)]
        Quality = (2, "quality"),
    }
}

impl QualityPreset {
    /// Property value for the encoder of `codec`. Each codec family numbers its presets
    /// differently.
    pub fn raw_for(self, codec: VideoCodec) -> i64 {
        match (codec, self) {
            (VideoCodec::H264, _) => self.raw(),
            (VideoCodec::Hevc, QualityPreset::Quality) => 0,
            (VideoCodec::Hevc, QualityPreset::Balanced) => 5,
            (VideoCodec::Hevc, QualityPreset::Speed) => 10,
            (VideoCodec::Av1, QualityPreset::Quality) => 30,
            (VideoCodec::Av1, QualityPreset::Balanced) => 70,
            (VideoCodec::Av1, QualityPreset::Speed) => 100,
        }
    }
}

option_enum! {
    /// Encoder rate control method.
    RateControl {
        #[allow(missing_docs)]
        ConstantQp = (0, "cqp"),
        #[allow(missing_docs)]
        Cbr = (1, "cbr"),
        #[allow(missing_docs)]
        PeakConstrainedVbr = (2, "vbr-peak"),
        #[allow(missing_docs)]
        LatencyConstrainedVbr = (3, "vbr-latency"),
    }
}

impl RateControl {
    /// Property value for the encoder of `codec`.
    pub fn raw_for(self, codec: VideoCodec) -> i64 {
        match (codec, self) {
            (VideoCodec::H264, _) => self.raw(),
            (_, RateControl::ConstantQp) => 0,
            (_, RateControl::LatencyConstrainedVbr) => 1,
            (_, RateControl::PeakConstrainedVbr) => 2,
            (_, RateControl::Cbr) => 3,
        }
    }
}

option_enum! {
    /// Scaling filter used by the converter.
    ScaleType {
        #[allow(missing_docs)]
        Bilinear = (0, "bilinear"),
        #[allow(missing_docs)]
        Bicubic = (1, "bicubic"),
    }
}

option_enum! {
    /// Scaling algorithm of the high-quality scaler.
    HqScalerAlgorithm {
        #[allow(missing_docs)]
        Bilinear = (0, "bilinear"),
        #[allow(missing_docs)]
        Bicubic = (1, "bicubic"),
        /// FidelityFX super resolution 1.0.
        VideoSr1_0 = (2, "video-sr1.0"),
        #[allow(missing_docs)]
        Point = (3, "point"),
        /// FidelityFX super resolution 1.1.
        VideoSr1_1 = (4, "video-sr1.1"),
    }
}

option_enum! {
    /// YUV<->RGB conversion matrix used by the converter.
    ColorProfile {
        /// Let the converter pick.
        Unknown = (-1, "unknown"),
        #[allow(missing_docs)]
        Bt601 = (0, "601"),
        #[allow(missing_docs)]
        Bt709 = (1, "709"),
        #[allow(missing_docs)]
        Bt2020 = (2, "2020"),
        #[allow(missing_docs)]
        Full601 = (3, "full-601"),
        #[allow(missing_docs)]
        Full709 = (4, "full-709"),
        #[allow(missing_docs)]
        Full2020 = (5, "full-2020"),
    }
}

impl ColorProfile {
    /// Returns the full-range variant of this profile when `range` is full.
    pub fn with_range(self, range: ColorRange) -> Self {
        match (self, range) {
            (ColorProfile::Bt601, ColorRange::Full) => ColorProfile::Full601,
            (ColorProfile::Bt709, ColorRange::Full) => ColorProfile::Full709,
            (ColorProfile::Bt2020, ColorRange::Full) => ColorProfile::Full2020,
            (profile, _) => profile,
        }
    }
}

option_enum! {
    /// Sample value range.
    ColorRange {
        #[allow(missing_docs)]
        Undefined = (0, "undefined"),
        /// Limited ("MPEG") range.
        Studio = (1, "studio"),
        /// Full ("JPEG") range.
        Full = (2, "full"),
    }
}

option_enum! {
    /// Chromaticity coordinates of the source primaries, numbered as in ISO/IEC 23091-4.
    ColorPrimaries {
        #[allow(missing_docs)]
        Undefined = (0, "undefined"),
        #[allow(missing_docs)]
        Bt709 = (1, "bt709"),
        #[allow(missing_docs)]
        Unspecified = (2, "unspecified"),
        #[allow(missing_docs)]
        Bt470m = (4, "bt470m"),
        #[allow(missing_docs)]
        Bt470bg = (5, "bt470bg"),
        #[allow(missing_docs)]
        Smpte170m = (6, "smpte170m"),
        #[allow(missing_docs)]
        Smpte240m = (7, "smpte240m"),
        #[allow(missing_docs)]
        Film = (8, "film"),
        #[allow(missing_docs)]
        Bt2020 = (9, "bt2020"),
        #[allow(missing_docs)]
        Smpte428 = (10, "smpte428"),
        #[allow(missing_docs)]
        Smpte431 = (11, "smpte431"),
        #[allow(missing_docs)]
        Smpte432 = (12, "smpte432"),
        #[allow(missing_docs)]
        JedecP22 = (22, "jedec-p22"),
    }
}

option_enum! {
    /// Opto-electronic transfer characteristic, numbered as in ISO/IEC 23091-4.
    TransferCharacteristic {
        #[allow(missing_docs)]
        Undefined = (0, "undefined"),
        #[allow(missing_docs)]
        Bt709 = (1, "bt709"),
        #[allow(missing_docs)]
        Unspecified = (2, "unspecified"),
        #[allow(missing_docs)]
        Gamma22 = (4, "gamma22"),
        #[allow(missing_docs)]
        Gamma28 = (5, "gamma28"),
        #[allow(missing_docs)]
        Smpte170m = (6, "smpte170m"),
        #[allow(missing_docs)]
        Smpte240m = (7, "smpte240m"),
        #[allow(missing_docs)]
        Linear = (8, "linear"),
        #[allow(missing_docs)]
        Log = (9, "log100"),
        #[allow(missing_docs)]
        LogSqrt = (10, "log316"),
        #[allow(missing_docs)]
        Iec61966_2_4 = (11, "iec61966-2-4"),
        #[allow(missing_docs)]
        Bt1361Ecg = (12, "bt1361e"),
        #[allow(missing_docs)]
        Iec61966_2_1 = (13, "iec61966-2-1"),
        #[allow(missing_docs)]
        Bt2020_10 = (14, "bt2020-10"),
        #[allow(missing_docs)]
        Bt2020_12 = (15, "bt2020-12"),
        /// Perceptual quantizer (HDR10).
        Smpte2084 = (16, "smpte2084"),
        #[allow(missing_docs)]
        Smpte428 = (17, "smpte428"),
        /// Hybrid log-gamma.
        AribStdB67 = (18, "arib-std-b67"),
    }
}

impl TransferCharacteristic {
    /// Whether frames with this transfer characteristic carry HDR static metadata.
    pub fn is_hdr(self) -> bool {
        matches!(
            self,
            TransferCharacteristic::Smpte2084 | TransferCharacteristic::AribStdB67
        )
    }
}

/// A value that can be stored in a property bag.
#[derive(Clone)]
pub enum PropertyValue {
    /// Boolean value.
    Bool(bool),
    /// Integer value.
    Int64(i64),
    /// Size value.
    Size {
        /// Width.
        width: u32,
        /// Height.
        height: u32,
    },
    /// Rational value.
    Rate {
        /// Numerator.
        num: u32,
        /// Denominator.
        den: u32,
    },
    /// Interface value holding a buffer.
    Buffer(Buffer),
}

/// Static component configuration, set before `Init`.
#[derive(Clone)]
#[allow(missing_docs)]
pub enum Property {
    DecoderMode(DecoderMode),
    TimestampMode(TimestampMode),
    SurfacePoolSize(u32),
    DpbSize(u32),
    LowLatency(bool),
    SmartAccessVideo(bool),
    SkipTransferSmartAccessVideo(bool),
    Extradata(Buffer),
    Usage(EncoderUsage),
    QualityPreset(QualityPreset),
    RateControl(RateControl),
    TargetBitrate(i64),
    PeakBitrate(i64),
    FrameRate { num: u32, den: u32 },
    GopSize(u32),
    BFrames(u32),
    AdaptiveMiniGop(bool),
    InputHdrMetadata(Buffer),
    OutputFormat(SurfaceFormat),
    OutputSize { width: u32, height: u32 },
    ScaleType(ScaleType),
    HqScalerAlgorithm(HqScalerAlgorithm),
    HqScalerKeepAspectRatio(bool),
    ColorProfile(ColorProfile),
    OutputColorRange(ColorRange),
    OutputColorPrimaries(ColorPrimaries),
    OutputTransferCharacteristic(TransferCharacteristic),
}

fn codec_name(
    codec: Option<VideoCodec>,
    avc: &'static str,
    hevc: &'static str,
    av1: &'static str,
) -> Option<&'static str> {
    match codec? {
        VideoCodec::H264 => Some(avc),
        VideoCodec::Hevc => Some(hevc),
        VideoCodec::Av1 => Some(av1),
    }
}

impl Property {
    /// Name of this property on `component`, or `None` if the component does not have it.
    pub fn name(&self, component: ComponentId) -> Option<&'static str> {
        use Property::*;
        let decoder = matches!(component, ComponentId::Decoder(_));
        let encoder = matches!(component, ComponentId::Encoder(_));
        let converter = component == ComponentId::Converter;
        let hq_scaler = component == ComponentId::HqScaler;
        let codec = if encoder { component.codec() } else { None };
        match self {
            DecoderMode(_) if decoder => Some("ReorderMode"),
            TimestampMode(_) if decoder => Some("TimestampMode"),
            SurfacePoolSize(_) if decoder => Some("SurfacePoolSize"),
            DpbSize(_) if decoder => Some("DPBSize"),
            LowLatency(_) if decoder => Some("LowLatencyDecode"),
            SmartAccessVideo(_) if decoder => Some("EnableSmartAccessVideo"),
            SkipTransferSmartAccessVideo(_) if decoder => Some("SkipTransferSmartAccessVideo"),
            Extradata(_) if decoder => Some("ExtraData"),
            Usage(_) => codec_name(codec, "Usage", "HevcUsage", "Av1Usage"),
            QualityPreset(_) => codec_name(
                codec,
                "QualityPreset",
                "HevcQualityPreset",
                "Av1QualityPreset",
            ),
            RateControl(_) => codec_name(
                codec,
                "RateControlMethod",
                "HevcRateControlMethod",
                "Av1RateControlMethod",
            ),
            TargetBitrate(_) => codec_name(
                codec,
                "TargetBitrate",
                "HevcTargetBitrate",
                "Av1TargetBitrate",
            ),
            PeakBitrate(_) => codec_name(codec, "PeakBitrate", "HevcPeakBitrate", "Av1PeakBitrate"),
            FrameRate { .. } => codec_name(codec, "FrameRate", "HevcFrameRate", "Av1FrameRate"),
            GopSize(_) => codec_name(codec, "IDRPeriod", "HevcGOPSize", "Av1GOPSize"),
            BFrames(_) => codec_name(
                codec,
                "BPicturesPattern",
                "HevcMaxNumOfBPictures",
                "Av1MaxConsecutiveBPictures",
            ),
            AdaptiveMiniGop(_) => codec_name(
                codec,
                "AdaptiveMiniGOP",
                "HevcAdaptiveMiniGOP",
                "Av1AdaptiveMiniGOP",
            ),
            InputHdrMetadata(_) => codec_name(
                codec,
                "InHDRMetadata",
                "HevcInHDRMetadata",
                "Av1InHDRMetadata",
            ),
            OutputFormat(_) if converter => Some("OutputFormat"),
            OutputSize { .. } if converter => Some("OutputSize"),
            OutputSize { .. } if hq_scaler => Some("HQScalerOutputSize"),
            ScaleType(_) if converter => Some("ScaleType"),
            HqScalerAlgorithm(_) if hq_scaler => Some("HQScalerAlgorithm"),
            HqScalerKeepAspectRatio(_) if hq_scaler => Some("HQScalerKeepAspectRatio"),
            ColorProfile(_) if converter => Some("ColorProfile"),
            OutputColorRange(_) if converter => Some("OutputColorRange"),
            OutputColorPrimaries(_) if converter => Some("OutputColorPrimaries"),
            OutputTransferCharacteristic(_) if converter => Some("OutputTransferCharacteristic"),
            _ => None,
        }
    }

    /// Value of this property on `component`.
    pub fn value(&self, component: ComponentId) -> PropertyValue {
        use Property::*;
        let codec = component.codec().unwrap_or(VideoCodec::H264);
        match self {
            DecoderMode(v) => PropertyValue::Int64(v.raw()),
            TimestampMode(v) => PropertyValue::Int64(v.raw()),
            SurfacePoolSize(v) | DpbSize(v) | GopSize(v) | BFrames(v) => {
                PropertyValue::Int64(*v as i64)
            }
            LowLatency(v)
            | SmartAccessVideo(v)
            | SkipTransferSmartAccessVideo(v)
            | AdaptiveMiniGop(v)
            | HqScalerKeepAspectRatio(v) => PropertyValue::Bool(*v),
            Extradata(b) | InputHdrMetadata(b) => PropertyValue::Buffer(b.clone()),
            Usage(v) => PropertyValue::Int64(v.raw()),
            QualityPreset(v) => PropertyValue::Int64(v.raw_for(codec)),
            RateControl(v) => PropertyValue::Int64(v.raw_for(codec)),
            TargetBitrate(v) | PeakBitrate(v) => PropertyValue::Int64(*v),
            FrameRate { num, den } => PropertyValue::Rate {
                num: *num,
                den: *den,
            },
            OutputFormat(f) => PropertyValue::Int64(*f as i64),
            OutputSize { width, height } => PropertyValue::Size {
                width: *width,
                height: *height,
            },
            ScaleType(v) => PropertyValue::Int64(v.raw()),
            HqScalerAlgorithm(v) => PropertyValue::Int64(v.raw()),
            ColorProfile(v) => PropertyValue::Int64(v.raw()),
            OutputColorRange(v) => PropertyValue::Int64(v.raw()),
            OutputColorPrimaries(v) => PropertyValue::Int64(v.raw()),
            OutputTransferCharacteristic(v) => PropertyValue::Int64(v.raw()),
        }
    }
}

/// Properties read back from a component.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ComponentKey {
    /// Transfer characteristic of the decoded stream.
    OutputTransferCharacteristic,
    /// Buffer holding an [`HdrMetadata`] for the decoded stream.
    OutputHdrMetadata,
}

impl ComponentKey {
    /// Name of the property.
    pub fn name(self) -> &'static str {
        match self {
            ComponentKey::OutputTransferCharacteristic => "OutColorTransferChar",
            ComponentKey::OutputHdrMetadata => "HdrMetadata",
        }
    }
}

/// Keys of the properties this crate attaches to surfaces and buffers.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum DataKey {
    /// Presentation timestamp of the host packet or frame.
    HostPts,
    /// Decode timestamp of the host packet.
    HostDts,
    /// Duration of the host packet, in host time base units.
    HostDuration,
    /// Size of the host packet in bytes.
    HostPacketSize,
    /// Byte offset of the host packet in its container.
    HostPacketPos,
    /// Index of the stream the host packet belongs to.
    HostStreamIndex,
    /// Presentation timestamp of an encoder input, read back on the output packet.
    SourcePts,
    /// Identifier of a host frame pinned while the runtime reads from it.
    FrameRef,
    /// Interface property holding HDR static metadata.
    HdrMetadata,
    /// Insert an access unit delimiter before this picture.
    InsertAud(VideoCodec),
    /// Picture type of an encoder output.
    OutputDataType(VideoCodec),
}

impl DataKey {
    /// Name of the property. `None` when the key does not exist for the codec.
    pub fn name(self) -> Option<&'static str> {
        let name = match self {
            DataKey::HostPts => "HostPts",
            DataKey::HostDts => "HostDts",
            DataKey::HostDuration => "HostDuration",
            DataKey::HostPacketSize => "HostPacketSize",
            DataKey::HostPacketPos => "HostPacketPos",
            DataKey::HostStreamIndex => "HostStreamIndex",
            DataKey::SourcePts => "PtsProp",
            DataKey::FrameRef => "HostFrameRef",
            DataKey::HdrMetadata => "HostHdrMetadata",
            DataKey::InsertAud(VideoCodec::H264) => "InsertAUD",
            DataKey::InsertAud(VideoCodec::Hevc) => "HevcInsertAUD",
            DataKey::InsertAud(VideoCodec::Av1) => return None,
            DataKey::OutputDataType(VideoCodec::H264) => "OutputDataType",
            DataKey::OutputDataType(VideoCodec::Hevc) => "HevcOutputDataType",
            DataKey::OutputDataType(VideoCodec::Av1) => "Av1OutputFrameType",
        };
        Some(name)
    }
}

/// Value of [`DataKey::OutputDataType`] for pictures that can start a stream. Both the
/// H.264/HEVC "IDR" data type and the AV1 "key" frame type use it.
pub const OUTPUT_DATA_TYPE_KEY: i64 = 0;

/// Metadata of a host packet carried through the runtime on the buffer and surface derived from
/// it.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct SideData {
    /// Presentation timestamp.
    pub pts: Option<i64>,
    /// Decode timestamp.
    pub dts: Option<i64>,
    /// Duration, in host time base units.
    pub duration: i64,
    /// Size of the packet in bytes.
    pub packet_size: i64,
    /// Byte offset of the packet in its container, or -1.
    pub packet_pos: i64,
    /// Stream index.
    pub stream_index: i64,
}

impl SideData {
    /// Properties this struct is stored in, in a fixed order.
    pub const KEYS: [DataKey; 6] = [
        DataKey::HostPts,
        DataKey::HostDts,
        DataKey::HostDuration,
        DataKey::HostPacketSize,
        DataKey::HostPacketPos,
        DataKey::HostStreamIndex,
    ];

    /// Returns the property values, in the order of [`SideData::KEYS`].
    pub fn to_values(&self) -> [i64; 6] {
        [
            self.pts.unwrap_or(NO_TIMESTAMP),
            self.dts.unwrap_or(NO_TIMESTAMP),
            self.duration,
            self.packet_size,
            self.packet_pos,
            self.stream_index,
        ]
    }

    /// Rebuilds the struct from property values read with `get`. Returns `None` if none of the
    /// properties are present.
    pub fn from_lookup<F: Fn(DataKey) -> Option<i64>>(get: F) -> Option<Self> {
        let values: Vec<Option<i64>> = Self::KEYS.iter().map(|k| get(*k)).collect();
        if values.iter().all(Option::is_none) {
            return None;
        }
        let ts = |v: Option<i64>| v.filter(|t| *t != NO_TIMESTAMP);
        Some(SideData {
            pts: ts(values[0]),
            dts: ts(values[1]),
            duration: values[2].unwrap_or(0),
            packet_size: values[3].unwrap_or(0),
            packet_pos: values[4].unwrap_or(-1),
            stream_index: values[5].unwrap_or(0),
        })
    }
}

/// HDR static metadata in the runtime's `AMFHDRMetadata` layout.
///
/// Chromaticities are in units of 1/50000, mastering luminances in units of 1/10000 cd/m² and
/// content light levels in cd/m².
#[derive(
    Copy, Clone, Debug, Default, PartialEq, Eq, FromBytes, IntoBytes, Immutable, KnownLayout,
)]
#[repr(C)]
#[allow(missing_docs)]
pub struct HdrMetadata {
    pub red_primary: [u16; 2],
    pub green_primary: [u16; 2],
    pub blue_primary: [u16; 2],
    pub white_point: [u16; 2],
    pub max_mastering_luminance: u32,
    pub min_mastering_luminance: u32,
    pub max_content_light_level: u16,
    pub max_frame_average_light_level: u16,
}

impl HdrMetadata {
    /// Size of the structure in a buffer.
    pub const SIZE: usize = std::mem::size_of::<HdrMetadata>();

    /// Parses the structure from the start of `bytes`.
    pub fn from_buffer_bytes(bytes: &[u8]) -> Option<Self> {
        let bytes = bytes.get(..Self::SIZE)?;
        HdrMetadata::read_from_bytes(bytes).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn option_strings() {
        assert_eq!(
            "low-latency".parse::<DecoderMode>(),
            Ok(DecoderMode::LowLatency)
        );
        assert_eq!(
            "decode-order".parse::<TimestampMode>(),
            Ok(TimestampMode::Decode)
        );
        assert!("fast".parse::<ScaleType>().is_err());
        assert_eq!(ColorProfile::from_raw(-1), Some(ColorProfile::Unknown));
        assert_eq!(TransferCharacteristic::Smpte2084.to_string(), "smpte2084");
    }

    #[test]
    fn serde_uses_option_strings() {
        #[derive(Deserialize, Serialize)]
        struct Opts {
            mode: DecoderMode,
        }
        let opts: Opts = serde_json::from_str(r#"{"mode":"compliant"}"#).unwrap();
        assert_eq!(opts.mode, DecoderMode::Compliant);
        assert_eq!(
            serde_json::to_string(&opts).unwrap(),
            r#"{"mode":"compliant"}"#
        );
        assert!(serde_json::from_str::<Opts>(r#"{"mode":"bogus"}"#).is_err());
    }

    #[test]
    fn full_range_profiles() {
        assert_eq!(
            ColorProfile::Bt709.with_range(ColorRange::Full),
            ColorProfile::Full709
        );
        assert_eq!(
            ColorProfile::Bt709.with_range(ColorRange::Studio),
            ColorProfile::Bt709
        );
    }

    #[test]
    fn property_names_depend_on_component() {
        let hevc = ComponentId::Encoder(VideoCodec::Hevc);
        assert_eq!(Property::GopSize(30).name(hevc), Some("HevcGOPSize"));
        assert_eq!(Property::GopSize(30).name(ComponentId::Converter), None);
        assert_eq!(
            Property::DecoderMode(DecoderMode::Regular).name(hevc),
            None
        );
        assert_eq!(DataKey::InsertAud(VideoCodec::Av1).name(), None);
        let size = Property::OutputSize {
            width: 3840,
            height: 2160,
        };
        assert_eq!(size.name(ComponentId::Converter), Some("OutputSize"));
        assert_eq!(size.name(ComponentId::HqScaler), Some("HQScalerOutputSize"));
        assert_eq!(
            Property::ScaleType(ScaleType::Bicubic).name(ComponentId::HqScaler),
            None
        );
        let algorithm = Property::HqScalerAlgorithm(HqScalerAlgorithm::VideoSr1_1);
        assert_eq!(algorithm.name(ComponentId::Converter), None);
        assert_eq!(HqScalerAlgorithm::VideoSr1_1.raw(), 4);
        assert_eq!("point".parse(), Ok(HqScalerAlgorithm::Point));
    }

    #[test]
    fn quality_preset_numbering() {
        assert_eq!(QualityPreset::Speed.raw_for(VideoCodec::H264), 1);
        assert_eq!(QualityPreset::Speed.raw_for(VideoCodec::Hevc), 10);
        assert_eq!(QualityPreset::Balanced.raw_for(VideoCodec::Av1), 70);
    }

    #[test]
    fn side_data_sentinels() {
        let side = SideData {
            pts: None,
            dts: Some(-3),
            duration: 40,
            packet_size: 1000,
            packet_pos: -1,
            stream_index: 1,
        };
        let values = side.to_values();
        let read = SideData::from_lookup(|k| {
            SideData::KEYS
                .iter()
                .position(|key| *key == k)
                .map(|i| values[i])
        });
        assert_eq!(read, Some(side));
        assert_eq!(SideData::from_lookup(|_| None), None);
    }

    #[test]
    fn hdr_metadata_layout() {
        assert_eq!(HdrMetadata::SIZE, 28);
        let meta = HdrMetadata {
            max_mastering_luminance: 10_000_000,
            max_content_light_level: 1000,
            ..Default::default()
        };
        assert_eq!(HdrMetadata::from_buffer_bytes(meta.as_bytes()), Some(meta));
        assert_eq!(HdrMetadata::from_buffer_bytes(&[0u8; 4]), None);
    }
}
