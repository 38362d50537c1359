// Copyright 2022 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

use std::path::PathBuf;
use std::str::FromStr;

use amfcodec::CodecId;
use amfcodec::PixelFormat;
use argh::FromArgs;

fn parse_codec(value: &str) -> Result<CodecId, String> {
    CodecId::from_str(value).map_err(|e| e.to_string())
}

fn parse_format(value: &str) -> Result<PixelFormat, String> {
    PixelFormat::from_str(value).map_err(|e| e.to_string())
}

fn default_format() -> PixelFormat {
    PixelFormat::Nv12
}

fn default_frame_rate() -> u32 {
    30
}

#[derive(FromArgs)]
/// Hardware video decoding and encoding through AMD's Advanced Media Framework.
pub struct Command {
    #[argh(option, arg_name = "PATH")]
    /// path of the runtime library to load instead of the system one
    pub library: Option<PathBuf>,
    #[argh(switch)]
    /// also send runtime traces to the platform debugger
    pub log_to_dbg: bool,
    #[argh(subcommand)]
    pub command: Subcommand,
}

#[derive(FromArgs)]
#[argh(subcommand)]
pub enum Subcommand {
    Probe(ProbeCommand),
    Decode(DecodeCommand),
    Encode(EncodeCommand),
}

#[derive(FromArgs)]
#[argh(subcommand, name = "probe")]
/// Load the runtime, open a device and print a summary as JSON
pub struct ProbeCommand {}

#[derive(FromArgs)]
#[argh(subcommand, name = "decode")]
/// Decode an Annex B elementary stream to raw frames
pub struct DecodeCommand {
    #[argh(option, from_str_fn(parse_codec))]
    /// codec of the stream: h264, hevc or av1
    pub codec: CodecId,
    #[argh(option)]
    /// coded width
    pub width: u32,
    #[argh(option)]
    /// coded height
    pub height: u32,
    #[argh(option, default = "default_format()", from_str_fn(parse_format))]
    /// pixel format of the output frames (default: nv12)
    pub format: PixelFormat,
    #[argh(option, default = "default_frame_rate()")]
    /// nominal frame rate of the stream (default: 30)
    pub frame_rate: u32,
    #[argh(option, arg_name = "PATH")]
    /// JSON file holding decoder options
    pub options: Option<PathBuf>,
    #[argh(positional)]
    /// elementary stream to decode
    pub input: PathBuf,
    #[argh(positional)]
    /// file receiving the packed frames
    pub output: PathBuf,
}

#[derive(FromArgs)]
#[argh(subcommand, name = "encode")]
/// Encode raw frames to an elementary stream
pub struct EncodeCommand {
    #[argh(option, from_str_fn(parse_codec))]
    /// codec of the stream: h264, hevc or av1
    pub codec: CodecId,
    #[argh(option)]
    /// frame width
    pub width: u32,
    #[argh(option)]
    /// frame height
    pub height: u32,
    #[argh(option, default = "default_format()", from_str_fn(parse_format))]
    /// pixel format of the input frames (default: nv12)
    pub format: PixelFormat,
    #[argh(option, default = "default_frame_rate()")]
    /// frame rate of the input (default: 30)
    pub frame_rate: u32,
    #[argh(option)]
    /// target bitrate in bits per second
    pub bitrate: Option<i64>,
    #[argh(option)]
    /// number of B pictures between references
    pub b_frames: Option<u32>,
    #[argh(option, arg_name = "PATH")]
    /// JSON file holding encoder options
    pub options: Option<PathBuf>,
    #[argh(positional)]
    /// file of packed frames to encode
    pub input: PathBuf,
    #[argh(positional)]
    /// file receiving the elementary stream
    pub output: PathBuf,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_decode() {
        let cmd = Command::from_args(
            &["amftool"],
            &[
                "decode",
                "--codec",
                "hevc",
                "--width",
                "1920",
                "--height",
                "1080",
                "in.hevc",
                "out.yuv",
            ],
        )
        .unwrap();
        match cmd.command {
            Subcommand::Decode(decode) => {
                assert_eq!(decode.codec, CodecId::Hevc);
                assert_eq!(decode.format, PixelFormat::Nv12);
                assert_eq!(decode.frame_rate, 30);
                assert_eq!(decode.input, PathBuf::from("in.hevc"));
                assert!(decode.options.is_none());
            }
            _ => panic!("not a decode command"),
        }
    }

    #[test]
    fn parse_encode() {
        let cmd = Command::from_args(
            &["amftool"],
            &[
                "--library",
                "amfrt64.dll",
                "encode",
                "--codec",
                "h264",
                "--width",
                "64",
                "--height",
                "64",
                "--format",
                "p010",
                "--b-frames",
                "2",
                "in.yuv",
                "out.h264",
            ],
        )
        .unwrap();
        assert_eq!(cmd.library, Some(PathBuf::from("amfrt64.dll")));
        match cmd.command {
            Subcommand::Encode(encode) => {
                assert_eq!(encode.format, PixelFormat::P010);
                assert_eq!(encode.b_frames, Some(2));
                assert_eq!(encode.bitrate, None);
            }
            _ => panic!("not an encode command"),
        }
    }

    #[test]
    fn unknown_codec() {
        assert!(Command::from_args(
            &["amftool"],
            &["decode", "--codec", "vc1", "--width", "1", "--height", "1", "a", "b"],
        )
        .is_err());
    }
}
