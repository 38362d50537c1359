// Copyright 2022 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! End-to-end sessions against the fake runtime.

use std::rc::Rc;

use amf::fake::Call;
use amf::fake::FakeConfig;
use amf::fake::FakeRuntime;
use amf::LogForwarder;
use amfcodec::BackendRequest;
use amfcodec::CodecId;
use amfcodec::DecoderConfig;
use amfcodec::DecoderSession;
use amfcodec::DeviceOptions;
use amfcodec::DeviceSession;
use amfcodec::EncoderConfig;
use amfcodec::EncoderSession;
use amfcodec::Error;
use amfcodec::FilterSession;
use amfcodec::Frame;
use amfcodec::HostImage;
use amfcodec::InputLink;
use amfcodec::Packet;
use amfcodec::PixelFormat;
use amfcodec::Rational;
use amfcodec::ScaleOptions;
use amfcodec::TryReceiveResult;

fn device(runtime: &FakeRuntime) -> Rc<DeviceSession> {
    DeviceSession::create(
        runtime,
        Rc::new(LogForwarder),
        DeviceOptions::default(),
        BackendRequest::Auto,
    )
    .unwrap()
}

fn packet(index: u8, len: usize) -> Packet {
    let mut packet = Packet::new((0..len).map(|i| index.wrapping_add(i as u8)).collect());
    packet.pts = Some(index as i64 * 40);
    packet.dts = packet.pts;
    packet.duration = 40;
    packet
}

fn raw_frame(width: u32, height: u32, pts: i64) -> Frame {
    let bytes: Vec<u8> = (0..HostImage::packed_size(PixelFormat::Nv12, width, height))
        .map(|i| (i as i64 * 7 + pts) as u8)
        .collect();
    let image = HostImage::from_packed(PixelFormat::Nv12, width, height, &bytes).unwrap();
    let mut frame = Frame::from_image(image);
    frame.pts = Some(pts);
    frame
}

#[test]
fn decode_h264_1080p() {
    let runtime = FakeRuntime::new();
    let mut decoder = DecoderSession::new(device(&runtime));
    decoder
        .init(&DecoderConfig::new(
            CodecId::H264,
            PixelFormat::Nv12,
            1920,
            1080,
        ))
        .unwrap();
    let mut frames = decoder.decode(&packet(0, 4096)).unwrap();
    frames.extend(decoder.decode(&Packet::eos()).unwrap());
    assert_eq!(frames.len(), 1);
    let frame = &frames[0];
    assert_eq!((frame.width, frame.height), (1920, 1080));
    assert_eq!(frame.format, PixelFormat::Nv12);
    assert_eq!(frame.to_image().unwrap().format, PixelFormat::Nv12);
}

#[test]
fn every_packet_becomes_a_frame() {
    const COUNT: u8 = 10;
    let runtime = FakeRuntime::new();
    let mut decoder = DecoderSession::new(device(&runtime));
    decoder
        .init(&DecoderConfig::new(CodecId::Hevc, PixelFormat::Nv12, 64, 64))
        .unwrap();
    let mut frames = Vec::new();
    for i in 0..COUNT {
        frames.extend(decoder.decode(&packet(i, 100)).unwrap());
    }
    frames.extend(decoder.decode(&Packet::eos()).unwrap());
    assert_eq!(frames.len(), COUNT as usize);
    assert_eq!(decoder.submitted(), decoder.received());
    assert!(matches!(
        decoder.receive_frame().unwrap(),
        TryReceiveResult::EndOfStream
    ));
}

#[test]
fn draining_an_empty_decoder() {
    let runtime = FakeRuntime::new();
    let mut decoder = DecoderSession::new(device(&runtime));
    decoder
        .init(&DecoderConfig::new(CodecId::Av1, PixelFormat::Nv12, 64, 64))
        .unwrap();
    assert!(decoder.decode(&Packet::eos()).unwrap().is_empty());
    assert!(matches!(
        decoder.receive_frame().unwrap(),
        TryReceiveResult::EndOfStream
    ));
}

#[test]
fn queue_full_never_loses_data() {
    let runtime = FakeRuntime::with_config(FakeConfig {
        decoder_queue_depth: 1,
        ..Default::default()
    });
    let mut decoder = DecoderSession::new(device(&runtime));
    decoder
        .init(&DecoderConfig::new(CodecId::H264, PixelFormat::Nv12, 32, 8))
        .unwrap();
    let packets: Vec<Packet> = (0..6).map(|i| packet(i * 17, 200)).collect();
    let mut frames = Vec::new();
    for packet in &packets {
        frames.extend(decoder.decode(packet).unwrap());
    }
    frames.extend(decoder.decode(&Packet::eos()).unwrap());
    assert_eq!(frames.len(), packets.len());
    for (frame, packet) in frames.iter().zip(&packets) {
        assert_eq!(frame.pts, packet.pts);
        let bytes = frame.to_image().unwrap().to_packed();
        assert_eq!(&bytes[..packet.data.len()], &packet.data[..]);
    }
}

#[test]
fn surfaces_are_released_exactly_once() {
    let runtime = FakeRuntime::new();
    {
        let device = device(&runtime);
        let mut decoder = DecoderSession::new(Rc::clone(&device));
        decoder
            .init(&DecoderConfig::new(CodecId::H264, PixelFormat::Nv12, 16, 16))
            .unwrap();
        let mut encoder = EncoderSession::new(device);
        let mut config = EncoderConfig::new(CodecId::H264, PixelFormat::Nv12, 16, 16);
        config.options.b_frames = 1;
        encoder.init(&config).unwrap();

        let mut frames = Vec::new();
        for i in 0..4 {
            frames.extend(decoder.decode(&packet(i, 64)).unwrap());
        }
        frames.extend(decoder.decode(&Packet::eos()).unwrap());
        let mut packets = Vec::new();
        for frame in &frames {
            packets.extend(encoder.encode(Some(frame)).unwrap());
        }
        packets.extend(encoder.encode(None).unwrap());
        assert_eq!(packets.len(), frames.len());
    }
    assert_eq!(runtime.live_objects(), 0);
    assert_eq!(runtime.refcount_errors(), 0);
    assert_eq!(runtime.count(&Call::CloseLibrary), 1);
}

#[test]
fn encoder_lookahead_keeps_dts_monotonic() {
    let runtime = FakeRuntime::new();
    let mut encoder = EncoderSession::new(device(&runtime));
    let mut config = EncoderConfig::new(CodecId::Hevc, PixelFormat::Nv12, 32, 32);
    config.options.b_frames = 2;
    encoder.init(&config).unwrap();

    let input = [0, 33, 66, 100, 133];
    let mut packets = Vec::new();
    for pts in input {
        packets.extend(encoder.encode(Some(&raw_frame(32, 32, pts))).unwrap());
    }
    packets.extend(encoder.encode(None).unwrap());
    assert_eq!(packets.len(), input.len());

    let dts: Vec<i64> = packets.iter().map(|p| p.dts.unwrap()).collect();
    assert!(dts.windows(2).all(|w| w[0] <= w[1]));
    let mut pts: Vec<i64> = packets.iter().map(|p| p.pts.unwrap()).collect();
    pts.sort_unstable();
    assert_eq!(pts, input);
    for packet in &packets {
        assert!(packet.dts <= packet.pts);
    }
    assert_eq!(encoder.pending_timestamps(), 0);
}

#[test]
fn missing_library() {
    let runtime = FakeRuntime::with_config(FakeConfig {
        library_missing: true,
        ..Default::default()
    });
    let result = DeviceSession::create(
        &runtime,
        Rc::new(LogForwarder),
        DeviceOptions::default(),
        BackendRequest::Auto,
    );
    assert!(matches!(result, Err(Error::LibraryNotFound { .. })));
    assert_eq!(runtime.count(&Call::CreateContext), 0);
    assert!(runtime.registered_writers().is_empty());
}

#[test]
fn scale_to_half_size_in_the_same_format() {
    let runtime = FakeRuntime::new();
    let mut filter = FilterSession::new(
        device(&runtime),
        ScaleOptions {
            w: "iw/2".to_owned(),
            h: "ih/2".to_owned(),
            ..Default::default()
        },
    );
    let mut input = InputLink::new(1280, 720, PixelFormat::Nv12);
    input.sample_aspect_ratio = Rational::new(1, 1);
    let output = filter.configure_output(&input).unwrap();
    assert_eq!((output.width, output.height), (640, 360));
    assert_eq!(output.sw_format, PixelFormat::Nv12);

    let out = filter.filter_frame(&raw_frame(1280, 720, 5)).unwrap();
    assert_eq!((out.width, out.height), (640, 360));
    assert_eq!(out.pts, Some(5));
    assert_eq!(out.sample_aspect_ratio, Rational::new(1, 1));
    let pool = out.frames_ctx.clone().unwrap();
    assert_eq!(pool.sw_format(), PixelFormat::Nv12);
    let mut image = HostImage::new(PixelFormat::Nv12, 640, 360).unwrap();
    pool.transfer_from(&mut image, &out).unwrap();
}
