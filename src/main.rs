// Copyright 2022 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Decodes and encodes elementary streams on AMD GPUs.

mod annexb;
mod cmdline;

use std::fs;
use std::fs::File;
use std::io::BufWriter;
use std::io::Write;
use std::path::Path;
use std::rc::Rc;

use amf::LogForwarder;
use amf::NativeLoader;
use amfcodec::BackendRequest;
use amfcodec::DecoderConfig;
use amfcodec::DecoderSession;
use amfcodec::DeviceOptions;
use amfcodec::DeviceSession;
use amfcodec::EncoderConfig;
use amfcodec::EncoderSession;
use amfcodec::Frame;
use amfcodec::HostImage;
use amfcodec::Packet;
use amfcodec::Rational;
use anyhow::bail;
use anyhow::Context;
use anyhow::Result;
use log::error;
use log::info;
use serde::de::DeserializeOwned;

use crate::cmdline::Command;
use crate::cmdline::DecodeCommand;
use crate::cmdline::EncodeCommand;
use crate::cmdline::Subcommand;

fn open_device(cmd: &Command) -> Result<Rc<DeviceSession>> {
    let loader = match &cmd.library {
        Some(path) => NativeLoader::with_path(path),
        None => NativeLoader::new(),
    };
    let options = DeviceOptions {
        log_to_dbg: cmd.log_to_dbg,
        ..Default::default()
    };
    DeviceSession::create(
        &loader,
        Rc::new(LogForwarder),
        options,
        BackendRequest::Auto,
    )
    .context("failed to open the AMF device")
}

fn read_options<T: DeserializeOwned + Default>(path: Option<&Path>) -> Result<T> {
    match path {
        Some(path) => {
            let json = fs::read_to_string(path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            serde_json::from_str(&json)
                .with_context(|| format!("invalid options in {}", path.display()))
        }
        None => Ok(T::default()),
    }
}

fn frame_rate(fps: u32) -> Result<Rational> {
    match i32::try_from(fps) {
        Ok(fps) if fps > 0 => Ok(Rational::new(fps, 1)),
        _ => bail!("invalid frame rate {}", fps),
    }
}

fn decode(device: Rc<DeviceSession>, args: &DecodeCommand) -> Result<()> {
    let frame_rate = frame_rate(args.frame_rate)?;
    let mut config = DecoderConfig::new(args.codec, args.format, args.width, args.height);
    config.time_base = Rational::new(1, frame_rate.num);
    config.frame_rate = frame_rate;
    config.options = read_options(args.options.as_deref())?;

    let stream = fs::read(&args.input)
        .with_context(|| format!("failed to read {}", args.input.display()))?;
    let output = File::create(&args.output)
        .with_context(|| format!("failed to create {}", args.output.display()))?;
    let mut output = BufWriter::new(output);

    let mut decoder = DecoderSession::new(device);
    decoder.init(&config).context("while initializing the decoder")?;
    let mut write_frames = |frames: Vec<Frame>| -> Result<usize> {
        for frame in &frames {
            let image = frame.to_image()?;
            output.write_all(&image.to_packed())?;
        }
        Ok(frames.len())
    };

    let mut frames = 0;
    for (index, unit) in annexb::access_units(args.codec, &stream)
        .into_iter()
        .enumerate()
    {
        let mut packet = Packet::new(unit.to_vec());
        packet.pts = Some(index as i64);
        packet.dts = packet.pts;
        packet.duration = 1;
        frames += write_frames(decoder.decode(&packet)?)?;
    }
    frames += write_frames(decoder.decode(&Packet::eos())?)?;
    output.flush()?;
    info!(
        "decoded {} frames of {} to {}",
        frames,
        args.input.display(),
        args.output.display()
    );
    Ok(())
}

fn encode(device: Rc<DeviceSession>, args: &EncodeCommand) -> Result<()> {
    let frame_rate = frame_rate(args.frame_rate)?;
    let mut config = EncoderConfig::new(args.codec, args.format, args.width, args.height);
    config.time_base = Rational::new(1, frame_rate.num);
    config.frame_rate = frame_rate;
    config.options = read_options(args.options.as_deref())?;
    if let Some(bitrate) = args.bitrate {
        config.options.bitrate = Some(bitrate);
    }
    if let Some(b_frames) = args.b_frames {
        config.options.b_frames = b_frames;
    }

    let frame_size = HostImage::packed_size(args.format, args.width, args.height);
    if frame_size == 0 {
        bail!("{} frames cannot be read from a file", args.format);
    }
    let raw = fs::read(&args.input)
        .with_context(|| format!("failed to read {}", args.input.display()))?;
    if raw.len() % frame_size != 0 {
        bail!(
            "{} is not a whole number of {}x{} {} frames",
            args.input.display(),
            args.width,
            args.height,
            args.format
        );
    }
    let output = File::create(&args.output)
        .with_context(|| format!("failed to create {}", args.output.display()))?;
    let mut output = BufWriter::new(output);

    let mut encoder = EncoderSession::new(device);
    encoder.init(&config).context("while initializing the encoder")?;
    let mut write_packets = |packets: Vec<Packet>| -> Result<usize> {
        for packet in &packets {
            output.write_all(&packet.data)?;
        }
        Ok(packets.len())
    };

    let mut packets = 0;
    for (index, chunk) in raw.chunks(frame_size).enumerate() {
        let image = HostImage::from_packed(args.format, args.width, args.height, chunk)?;
        let mut frame = Frame::from_image(image);
        frame.pts = Some(index as i64);
        frame.duration = 1;
        packets += write_packets(encoder.encode(Some(&frame))?)?;
    }
    packets += write_packets(encoder.encode(None)?)?;
    output.flush()?;
    info!(
        "encoded {} frames into {} packets, dts delay {}",
        raw.len() / frame_size,
        packets,
        encoder.dts_delay().unwrap_or(0)
    );
    Ok(())
}

fn run(cmd: Command) -> Result<()> {
    let device = open_device(&cmd)?;
    match &cmd.command {
        Subcommand::Probe(_) => {
            println!("{}", serde_json::to_string_pretty(&device.info())?);
            Ok(())
        }
        Subcommand::Decode(args) => decode(device, args),
        Subcommand::Encode(args) => encode(device, args),
    }
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cmd: Command = argh::from_env();
    if let Err(e) = run(cmd) {
        error!("{:#}", e);
        std::process::exit(1);
    }
}
