// Copyright 2022 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Hardware decoding of compressed packets into frames.

use std::rc::Rc;
use std::thread;
use std::time::Duration;

use amf::Buffer;
use amf::Component;
use amf::ComponentId;
use amf::ComponentKey;
use amf::Data;
use amf::MemoryType;
use amf::Property;
use amf::SideData;
use amf::Status;
use amf::SurfaceFormat;
use amf::TransferCharacteristic;
use log::debug;
use log::error;
use log::info;

use crate::error::hardware;
use crate::from_hdr_metadata;
use crate::to_pixel_format;
use crate::to_surface_format;
use crate::CodecId;
use crate::DecoderOptions;
use crate::DeviceSession;
use crate::Error;
use crate::Frame;
use crate::FrameMemory;
use crate::FramesContext;
use crate::Packet;
use crate::PixelFormat;
use crate::Rational;
use crate::Result;
use crate::SubmitStatus;
use crate::SurfaceBridge;
use crate::TryReceiveResult;
use crate::RUNTIME_TIME_BASE;
use crate::SUPPORTED_SW_FORMATS;

/// Zeroed bytes after the payload of every input buffer, for bitstream readers that overread.
pub const INPUT_PADDING_SIZE: usize = 64;

/// Lifecycle of a codec session.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum SessionState {
    /// Created, `init` not called yet.
    Uninitialized,
    /// Accepting input.
    Configured,
    /// End of stream signalled; remaining output is being collected.
    Draining,
    /// Closed, or `init` failed.
    Closed,
}

/// Stream parameters of a decoder.
#[derive(Clone, Debug)]
pub struct DecoderConfig {
    /// Codec of the packets.
    pub codec: CodecId,
    /// Requested pixel format of the frames. NV12 is used if the hardware refuses it.
    pub format: PixelFormat,
    /// Coded width.
    pub width: u32,
    /// Coded height.
    pub height: u32,
    /// Out-of-band parameter sets (avcC, hvcC or av1C payload).
    pub extradata: Vec<u8>,
    /// Unit of the packet timestamps and durations.
    pub time_base: Rational,
    /// Nominal frame rate, or `0/1` when unknown.
    pub frame_rate: Rational,
    /// Static decoder options.
    pub options: DecoderOptions,
}

impl DecoderConfig {
    /// A configuration with default options and a millisecond time base.
    pub fn new(codec: CodecId, format: PixelFormat, width: u32, height: u32) -> Self {
        DecoderConfig {
            codec,
            format,
            width,
            height,
            extradata: Vec::new(),
            time_base: Rational::new(1, 1000),
            frame_rate: Rational::new(0, 1),
            options: DecoderOptions::default(),
        }
    }
}

/// Converts a packet duration to the runtime clock.
///
/// When the frame rate is known and the two estimates differ by more than half of the smaller
/// one, the frame-rate derived duration wins.
pub fn runtime_duration(duration: i64, time_base: Rational, frame_rate: Rational) -> i64 {
    let by_packet = Rational::rescale(duration, time_base, RUNTIME_TIME_BASE);
    if frame_rate.num <= 0 || frame_rate.den <= 0 {
        return by_packet;
    }
    let frame_duration = Rational::new(frame_rate.den, frame_rate.num);
    let by_rate = Rational::rescale(1, frame_duration, RUNTIME_TIME_BASE);
    if (by_rate - by_packet).abs() > by_rate.min(by_packet) / 2 {
        by_rate
    } else {
        by_packet
    }
}

fn is_format_error(status: Status) -> bool {
    matches!(
        status,
        Status::InvalidFormat | Status::SurfaceFormatNotSupported | Status::NotSupported
    )
}

/// A hardware decoder bound to a device.
pub struct DecoderSession {
    bridge: Option<SurfaceBridge>,
    component: Option<Box<dyn Component>>,
    state: SessionState,
    codec: Option<CodecId>,
    format: PixelFormat,
    width: u32,
    height: u32,
    time_base: Rational,
    frame_rate: Rational,
    options: DecoderOptions,
    frames_ctx: Option<Rc<FramesContext>>,
    submitted: u64,
    received: u64,
}

impl DecoderSession {
    /// Creates a decoder on `device`. Call [`DecoderSession::init`] before submitting packets.
    pub fn new(device: Rc<DeviceSession>) -> Self {
        DecoderSession {
            bridge: Some(SurfaceBridge::new(device)),
            component: None,
            state: SessionState::Uninitialized,
            codec: None,
            format: PixelFormat::None,
            width: 0,
            height: 0,
            time_base: Rational::new(1, 1000),
            frame_rate: Rational::new(0, 1),
            options: DecoderOptions::default(),
            frames_ctx: None,
            submitted: 0,
            received: 0,
        }
    }

    /// Creates the hardware component, applies the static options and initializes it.
    ///
    /// A failed initialization closes the session.
    pub fn init(&mut self, config: &DecoderConfig) -> Result<()> {
        if self.state != SessionState::Uninitialized {
            return Err(Error::InvalidState("decoder already initialized"));
        }
        if let Err(e) = self.try_init(config) {
            error!("failed to initialize {} decoder: {}", config.codec, e);
            self.close();
            return Err(e);
        }
        self.state = SessionState::Configured;
        info!(
            "{} decoder initialized: {}x{} {}",
            config.codec, self.width, self.height, self.format
        );
        Ok(())
    }

    fn try_init(&mut self, config: &DecoderConfig) -> Result<()> {
        let codec = config
            .codec
            .to_video_codec()
            .ok_or(Error::UnsupportedCodec(config.codec))?;
        let id = ComponentId::Decoder(codec);
        let device = Rc::clone(self.bridge()?.device());
        let context = device.context()?;
        let component = context
            .create_component(id)
            .map_err(|status| Error::ComponentCreateFailed {
                component: id.name(),
                status,
            })?;
        // Stored right away so that `close` terminates it if a later step fails.
        let component = self.component.insert(component);

        let options = &config.options;
        let mut properties = vec![
            Property::DecoderMode(options.decoder_mode),
            Property::TimestampMode(options.timestamp_mode),
            Property::SurfacePoolSize(options.pool_size()),
            Property::LowLatency(options.low_latency),
            Property::SmartAccessVideo(options.smart_access_video),
            Property::SkipTransferSmartAccessVideo(options.skip_transfer_sav),
        ];
        if let Some(dpb_size) = options.dpb_size {
            properties.push(Property::DpbSize(dpb_size));
        }
        if !config.extradata.is_empty() {
            let buffer = context
                .alloc_buffer(MemoryType::Host, config.extradata.len())
                .map_err(hardware("AllocBuffer"))?;
            buffer
                .write(0, &config.extradata, config.extradata.len())
                .map_err(hardware("write extradata"))?;
            properties.push(Property::Extradata(buffer));
        }
        for property in &properties {
            component
                .set_property(property)
                .map_err(hardware("SetProperty"))?;
        }

        let requested = to_surface_format(config.format);
        let mut candidates = vec![requested, SurfaceFormat::Nv12];
        candidates.retain(|f| *f != SurfaceFormat::Unknown);
        candidates.dedup();
        let mut chosen = None;
        for format in candidates {
            match component.init(format, config.width, config.height) {
                Ok(()) => {
                    chosen = Some(format);
                    break;
                }
                Err(status) if is_format_error(status) => {
                    debug!("decoder refused {:?}: {}", format, status);
                }
                Err(status) => return Err(Error::ComponentInitFailed(status)),
            }
        }
        let format = to_pixel_format(chosen.ok_or(Error::FormatRejected(config.format))?);
        if format != config.format {
            info!("decoder output falls back from {} to {}", config.format, format);
        }

        if options.hardware_output && SUPPORTED_SW_FORMATS.contains(&format) {
            self.frames_ctx = Some(FramesContext::new(
                device,
                format,
                config.width,
                config.height,
            )?);
        }
        self.codec = Some(config.codec);
        self.format = format;
        self.width = config.width;
        self.height = config.height;
        self.time_base = config.time_base;
        self.frame_rate = config.frame_rate;
        self.options = config.options.clone();
        Ok(())
    }

    fn bridge(&self) -> Result<&SurfaceBridge> {
        self.bridge
            .as_ref()
            .ok_or(Error::InvalidState("decoder closed"))
    }

    fn component(&mut self) -> Result<&mut Box<dyn Component>> {
        self.component
            .as_mut()
            .ok_or(Error::InvalidState("decoder not initialized"))
    }

    /// Current state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Pixel format of the frames.
    pub fn format(&self) -> PixelFormat {
        self.format
    }

    /// Number of packets accepted, the end of stream excluded.
    pub fn submitted(&self) -> u64 {
        self.submitted
    }

    /// Number of frames returned.
    pub fn received(&self) -> u64 {
        self.received
    }

    fn input_buffer(&self, packet: &Packet) -> Result<Buffer> {
        let size = packet.data.len();
        let capacity = size + INPUT_PADDING_SIZE;
        let buffer = self
            .bridge()?
            .device()
            .context()?
            .alloc_buffer(MemoryType::Host, capacity)
            .map_err(hardware("AllocBuffer"))?;
        buffer
            .write(0, &packet.data, capacity)
            .map_err(hardware("write packet"))?;
        buffer
            .write(size, &[0; INPUT_PADDING_SIZE], capacity)
            .map_err(hardware("write padding"))?;
        buffer.set_size(size).map_err(hardware("SetSize"))?;

        if let Some(ts) = packet.dts.or(packet.pts) {
            buffer.set_pts(Rational::rescale(ts, self.time_base, RUNTIME_TIME_BASE));
        }
        if packet.duration != 0 {
            buffer.set_duration(runtime_duration(
                packet.duration,
                self.time_base,
                self.frame_rate,
            ));
        }
        buffer
            .set_side_data(&SideData {
                pts: packet.pts,
                dts: packet.dts,
                duration: packet.duration,
                packet_size: size as i64,
                packet_pos: packet.pos,
                stream_index: packet.stream_index,
            })
            .map_err(hardware("SetProperty"))?;
        Ok(buffer)
    }

    /// Submits one packet. An empty packet signals the end of the stream.
    ///
    /// `QueueFull` means nothing was consumed: collect frames and submit the same packet again.
    pub fn submit(&mut self, packet: &Packet) -> Result<SubmitStatus> {
        match self.state {
            SessionState::Uninitialized => {
                return Err(Error::InvalidState("decoder not initialized"))
            }
            SessionState::Closed => return Err(Error::InvalidState("decoder closed")),
            SessionState::Draining if packet.is_eos() => return Ok(SubmitStatus::Accepted),
            SessionState::Draining => return Err(Error::InvalidState("decoder is draining")),
            SessionState::Configured => (),
        }

        if packet.is_eos() {
            return match self.component()?.drain() {
                Ok(()) => {
                    debug!("decoder draining");
                    self.state = SessionState::Draining;
                    Ok(SubmitStatus::Accepted)
                }
                Err(status) if status.is_queue_full() => Ok(SubmitStatus::QueueFull),
                Err(status) => Err(Error::Hardware {
                    call: "Drain",
                    status,
                }),
            };
        }

        let buffer = self.input_buffer(packet)?;
        match self.component()?.submit_input(&Data::Buffer(buffer)) {
            Ok(()) => {
                self.submitted += 1;
                Ok(SubmitStatus::Accepted)
            }
            Err(status) if status.is_queue_full() => {
                debug!("decoder queue full: {}", status);
                Ok(SubmitStatus::QueueFull)
            }
            Err(status) => Err(Error::Hardware {
                call: "SubmitInput",
                status,
            }),
        }
    }

    /// Pulls one decoded frame, if any is ready.
    pub fn receive_frame(&mut self) -> Result<TryReceiveResult<Frame>> {
        if matches!(
            self.state,
            SessionState::Uninitialized | SessionState::Closed
        ) {
            return Err(Error::InvalidState("decoder not running"));
        }
        let component = self.component()?;
        let surface = loop {
            match component.query_output() {
                Ok(Some(Data::Surface(surface))) => break surface,
                Ok(Some(Data::Buffer(_))) => {
                    return Err(Error::UnexpectedOutput("decoder produced a buffer"))
                }
                Ok(None) => return Ok(TryReceiveResult::TryAgain),
                Err(Status::Repeat) => continue,
                Err(Status::Eof) => return Ok(TryReceiveResult::EndOfStream),
                Err(status) => {
                    return Err(Error::Hardware {
                        call: "QueryOutput",
                        status,
                    })
                }
            }
        };

        let transfer = component
            .int64_property(ComponentKey::OutputTransferCharacteristic)
            .and_then(TransferCharacteristic::from_raw);
        let hdr = match transfer {
            Some(trc) if trc.is_hdr() => component
                .buffer_property(ComponentKey::OutputHdrMetadata)
                .and_then(|buffer| buffer.hdr_metadata()),
            _ => None,
        };

        let memory = if self.options.hardware_output {
            FrameMemory::Hardware
        } else {
            FrameMemory::Host
        };
        let mut frame = self
            .bridge()?
            .surface_to_frame(surface, self.width, self.height, memory)?;
        if memory == FrameMemory::Hardware {
            frame.frames_ctx = self.frames_ctx.clone();
        }
        if let Some(trc) = transfer {
            frame.color.transfer = trc;
        }
        if let Some(meta) = hdr {
            let (mastering, light) = from_hdr_metadata(&meta);
            frame.mastering_display = Some(mastering);
            frame.content_light = light;
        }
        self.received += 1;
        Ok(TryReceiveResult::Received(frame))
    }

    fn collect(&mut self, frames: &mut Vec<Frame>) -> Result<bool> {
        loop {
            match self.receive_frame()? {
                TryReceiveResult::Received(frame) => frames.push(frame),
                TryReceiveResult::TryAgain => return Ok(false),
                TryReceiveResult::EndOfStream => return Ok(true),
            }
        }
    }

    fn backoff(&self, retries: &mut u32) -> Result<()> {
        *retries += 1;
        if *retries > self.options.max_retries {
            return Err(Error::QueueStalled);
        }
        thread::sleep(Duration::from_micros(self.options.backoff_us));
        Ok(())
    }

    /// Submits `packet`, waiting for the queue to make room if needed, and returns the frames
    /// that became available. For the end-of-stream packet, returns every remaining frame.
    pub fn decode(&mut self, packet: &Packet) -> Result<Vec<Frame>> {
        let mut frames = Vec::new();
        let mut retries = 0;
        while self.submit(packet)? == SubmitStatus::QueueFull {
            let before = frames.len();
            self.collect(&mut frames)?;
            if frames.len() == before {
                self.backoff(&mut retries)?;
            }
        }
        if !packet.is_eos() {
            self.collect(&mut frames)?;
            return Ok(frames);
        }
        retries = 0;
        loop {
            let before = frames.len();
            if self.collect(&mut frames)? {
                return Ok(frames);
            }
            if frames.len() == before {
                self.backoff(&mut retries)?;
            }
        }
    }

    /// Discards queued packets and frames, for a seek. A draining decoder accepts input again.
    pub fn flush(&mut self) -> Result<()> {
        if self.state == SessionState::Closed {
            return Err(Error::InvalidState("decoder closed"));
        }
        self.component()?.flush().map_err(hardware("Flush"))?;
        self.state = SessionState::Configured;
        Ok(())
    }

    /// Terminates the component and releases the device. Safe to call repeatedly.
    pub fn close(&mut self) {
        if let Some(mut component) = self.component.take() {
            if let Err(e) = component.terminate() {
                error!("failed to terminate decoder: {}", e);
            }
        }
        self.frames_ctx = None;
        self.bridge = None;
        self.state = SessionState::Closed;
    }
}

impl Drop for DecoderSession {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use amf::fake::Call;
    use amf::fake::FakeConfig;
    use amf::fake::FakeRuntime;
    use amf::HdrMetadata;
    use amf::LogForwarder;
    use amf::VideoCodec;

    use super::*;
    use crate::BackendRequest;
    use crate::DeviceOptions;
    use crate::FrameStorage;

    fn decoder(runtime: &FakeRuntime) -> DecoderSession {
        let device = DeviceSession::create(
            runtime,
            Rc::new(LogForwarder),
            DeviceOptions::default(),
            BackendRequest::Auto,
        )
        .unwrap();
        DecoderSession::new(device)
    }

    fn packet(data: &[u8], dts: i64) -> Packet {
        let mut packet = Packet::new(data.to_vec());
        packet.pts = Some(dts);
        packet.dts = Some(dts);
        packet
    }

    #[test]
    fn options_precede_init() {
        let runtime = FakeRuntime::new();
        let mut decoder = decoder(&runtime);
        let mut config = DecoderConfig::new(CodecId::Hevc, PixelFormat::Nv12, 1280, 720);
        config.extradata = vec![1, 2, 3];
        config.options.dpb_size = Some(4);
        decoder.init(&config).unwrap();
        let init = runtime
            .position(&Call::InitComponent(SurfaceFormat::Nv12, 1280, 720))
            .unwrap();
        for name in [
            "ReorderMode",
            "TimestampMode",
            "SurfacePoolSize",
            "DPBSize",
            "LowLatencyDecode",
            "ExtraData",
        ] {
            assert!(runtime.position(&Call::SetProperty(name)).unwrap() < init);
        }
        assert_eq!(
            runtime.count(&Call::CreateComponent(ComponentId::Decoder(VideoCodec::Hevc))),
            1
        );
        assert_eq!(decoder.state(), SessionState::Configured);
    }

    #[test]
    fn unsupported_codec() {
        let runtime = FakeRuntime::new();
        let mut decoder = decoder(&runtime);
        let config = DecoderConfig::new(CodecId::Vp9, PixelFormat::Nv12, 64, 64);
        assert!(matches!(
            decoder.init(&config),
            Err(Error::UnsupportedCodec(CodecId::Vp9))
        ));
        assert_eq!(decoder.state(), SessionState::Closed);
        assert!(decoder.submit(&Packet::new(vec![1])).is_err());
    }

    #[test]
    fn falls_back_to_nv12() {
        let runtime = FakeRuntime::with_config(FakeConfig {
            rejected_formats: vec![SurfaceFormat::P010],
            ..Default::default()
        });
        let mut decoder = decoder(&runtime);
        let config = DecoderConfig::new(CodecId::H264, PixelFormat::P010, 64, 64);
        decoder.init(&config).unwrap();
        assert_eq!(decoder.format(), PixelFormat::Nv12);
    }

    #[test]
    fn rejects_when_fallback_fails() {
        let runtime = FakeRuntime::with_config(FakeConfig {
            rejected_formats: vec![SurfaceFormat::P010, SurfaceFormat::Nv12],
            ..Default::default()
        });
        let mut decoder = decoder(&runtime);
        let config = DecoderConfig::new(CodecId::H264, PixelFormat::P010, 64, 64);
        assert!(matches!(
            decoder.init(&config),
            Err(Error::FormatRejected(PixelFormat::P010))
        ));
        assert_eq!(runtime.count(&Call::TerminateComponent), 1);
        assert_eq!(runtime.count(&Call::ReleaseComponent), 1);
    }

    #[test]
    fn component_creation_failure() {
        let runtime = FakeRuntime::with_config(FakeConfig {
            component_status: Status::CodecNotSupported,
            ..Default::default()
        });
        let mut decoder = decoder(&runtime);
        let config = DecoderConfig::new(CodecId::Av1, PixelFormat::Nv12, 64, 64);
        assert!(matches!(
            decoder.init(&config),
            Err(Error::ComponentCreateFailed {
                status: Status::CodecNotSupported,
                ..
            })
        ));
    }

    #[test]
    fn queue_full_keeps_the_packet() {
        let runtime = FakeRuntime::with_config(FakeConfig {
            decoder_queue_depth: 2,
            ..Default::default()
        });
        let mut decoder = decoder(&runtime);
        decoder
            .init(&DecoderConfig::new(CodecId::H264, PixelFormat::Nv12, 16, 16))
            .unwrap();
        assert_eq!(
            decoder.submit(&packet(&[1], 0)).unwrap(),
            SubmitStatus::Accepted
        );
        assert_eq!(
            decoder.submit(&packet(&[2], 1)).unwrap(),
            SubmitStatus::Accepted
        );
        let third = packet(&[3, 3, 3], 2);
        assert_eq!(decoder.submit(&third).unwrap(), SubmitStatus::QueueFull);
        assert!(matches!(
            decoder.receive_frame().unwrap(),
            TryReceiveResult::Received(_)
        ));
        assert_eq!(decoder.submit(&third).unwrap(), SubmitStatus::Accepted);
        assert_eq!(decoder.submitted(), 3);
    }

    #[test]
    fn decode_waits_for_room() {
        let runtime = FakeRuntime::with_config(FakeConfig {
            decoder_queue_depth: 1,
            ..Default::default()
        });
        let mut decoder = decoder(&runtime);
        decoder
            .init(&DecoderConfig::new(CodecId::H264, PixelFormat::Nv12, 8, 2))
            .unwrap();
        let mut frames = Vec::new();
        for i in 0..5u8 {
            frames.extend(decoder.decode(&packet(&[i; 3], i as i64)).unwrap());
        }
        frames.extend(decoder.decode(&Packet::eos()).unwrap());
        assert_eq!(frames.len(), 5);
        for (i, frame) in frames.iter().enumerate() {
            assert_eq!(frame.pts, Some(i as i64));
            assert_eq!(frame.pkt_size, 3);
            let bytes = frame.to_image().unwrap().to_packed();
            assert_eq!(&bytes[..3], &[i as u8; 3]);
        }
        assert_eq!(decoder.submitted(), decoder.received());
    }

    #[test]
    fn end_of_stream_drains_once() {
        let runtime = FakeRuntime::new();
        let mut decoder = decoder(&runtime);
        decoder
            .init(&DecoderConfig::new(CodecId::H264, PixelFormat::Nv12, 16, 16))
            .unwrap();
        assert_eq!(
            decoder.submit(&Packet::eos()).unwrap(),
            SubmitStatus::Accepted
        );
        assert_eq!(
            decoder.submit(&Packet::eos()).unwrap(),
            SubmitStatus::Accepted
        );
        assert_eq!(runtime.count(&Call::Drain), 1);
        assert_eq!(decoder.state(), SessionState::Draining);
        assert!(matches!(
            decoder.receive_frame().unwrap(),
            TryReceiveResult::EndOfStream
        ));
        assert!(decoder.submit(&Packet::new(vec![1])).is_err());
        decoder.flush().unwrap();
        assert_eq!(decoder.state(), SessionState::Configured);
    }

    #[test]
    fn flush_discards_packets_in_flight() {
        let runtime = FakeRuntime::new();
        let mut decoder = decoder(&runtime);
        decoder
            .init(&DecoderConfig::new(CodecId::H264, PixelFormat::Nv12, 16, 16))
            .unwrap();
        decoder.submit(&packet(&[1], 0)).unwrap();
        decoder.submit(&packet(&[2], 1)).unwrap();
        decoder.submit(&packet(&[3], 2)).unwrap();
        decoder.flush().unwrap();
        assert_eq!(runtime.count(&Call::Flush), 1);
        assert!(matches!(
            decoder.receive_frame().unwrap(),
            TryReceiveResult::TryAgain
        ));
        let frames = decoder.decode(&Packet::eos()).unwrap();
        assert!(frames.is_empty());
        assert_eq!(runtime.live_objects(), 0);
    }

    #[test]
    fn input_buffer_uses_the_runtime_clock() {
        let runtime = FakeRuntime::new();
        let mut decoder = decoder(&runtime);
        let mut config = DecoderConfig::new(CodecId::H264, PixelFormat::Nv12, 16, 16);
        config.frame_rate = Rational::new(25, 1);
        decoder.init(&config).unwrap();
        let mut input = packet(&[9], 80);
        input.pts = Some(120);
        input.duration = 40;
        decoder.submit(&input).unwrap();
        let frame = match decoder.receive_frame().unwrap() {
            TryReceiveResult::Received(frame) => frame,
            r => panic!("unexpected result {:?}", r),
        };
        assert_eq!(frame.pts, Some(120));
        assert_eq!(frame.pkt_dts, Some(80));
        assert_eq!(frame.duration, 40);
        match &frame.storage {
            FrameStorage::Mapped(mapped) => {
                assert_eq!(mapped.surface().pts(), 800_000);
                assert_eq!(mapped.surface().duration(), 400_000);
            }
            s => panic!("unexpected storage {:?}", s),
        }
    }

    #[test]
    fn duration_sanity() {
        let ms = Rational::new(1, 1000);
        let fps = Rational::new(25, 1);
        assert_eq!(runtime_duration(40, ms, fps), 400_000);
        assert_eq!(runtime_duration(41, ms, fps), 410_000);
        assert_eq!(runtime_duration(100, ms, fps), 400_000);
        assert_eq!(runtime_duration(100, ms, Rational::new(0, 1)), 1_000_000);
    }

    #[test]
    fn hdr_metadata_is_attached() {
        let meta = HdrMetadata {
            max_mastering_luminance: 10_000_000,
            min_mastering_luminance: 50,
            max_content_light_level: 1000,
            max_frame_average_light_level: 400,
            ..Default::default()
        };
        let runtime = FakeRuntime::with_config(FakeConfig {
            decoder_hdr: Some((TransferCharacteristic::Smpte2084, meta)),
            ..Default::default()
        });
        let mut decoder = decoder(&runtime);
        decoder
            .init(&DecoderConfig::new(CodecId::Hevc, PixelFormat::P010, 16, 16))
            .unwrap();
        decoder.submit(&packet(&[1], 0)).unwrap();
        let frame = match decoder.receive_frame().unwrap() {
            TryReceiveResult::Received(frame) => frame,
            r => panic!("unexpected result {:?}", r),
        };
        assert_eq!(frame.format, PixelFormat::P010);
        assert_eq!(frame.color.transfer, TransferCharacteristic::Smpte2084);
        let mastering = frame.mastering_display.unwrap();
        assert_eq!(mastering.max_luminance, Rational::new(10_000_000, 10000));
        assert_eq!(frame.content_light.unwrap().max_cll, 1000);
    }

    #[test]
    fn hardware_output_carries_the_pool() {
        let runtime = FakeRuntime::new();
        let mut decoder = decoder(&runtime);
        let mut config = DecoderConfig::new(CodecId::H264, PixelFormat::Nv12, 16, 16);
        config.options.hardware_output = true;
        decoder.init(&config).unwrap();
        decoder.submit(&packet(&[1], 0)).unwrap();
        let frame = match decoder.receive_frame().unwrap() {
            TryReceiveResult::Received(frame) => frame,
            r => panic!("unexpected result {:?}", r),
        };
        assert_eq!(frame.format, PixelFormat::Amf);
        assert_eq!(frame.frames_ctx.as_ref().unwrap().sw_format(), PixelFormat::Nv12);
    }

    #[test]
    fn close_releases_everything() {
        let runtime = FakeRuntime::new();
        let mut decoder = decoder(&runtime);
        decoder
            .init(&DecoderConfig::new(CodecId::H264, PixelFormat::Nv12, 16, 16))
            .unwrap();
        decoder.submit(&packet(&[1, 2], 0)).unwrap();
        decoder.submit(&packet(&[3, 4], 1)).unwrap();
        let frame = decoder.receive_frame().unwrap();
        decoder.close();
        decoder.close();
        assert_eq!(runtime.count(&Call::TerminateComponent), 1);
        assert_eq!(runtime.count(&Call::ReleaseComponent), 1);
        assert!(runtime.live_objects() > 0);
        drop(decoder);
        // The frame still owns a surface of the runtime.
        assert_eq!(runtime.count(&Call::CloseLibrary), 0);
        drop(frame);
        assert_eq!(runtime.count(&Call::CloseLibrary), 1);
        assert_eq!(runtime.live_objects(), 0);
        assert_eq!(runtime.refcount_errors(), 0);
    }

    #[test]
    fn frames_outlive_the_decoder() {
        for hardware_output in [false, true] {
            let runtime = FakeRuntime::new();
            let mut decoder = decoder(&runtime);
            let mut config = DecoderConfig::new(CodecId::H264, PixelFormat::Nv12, 8, 2);
            config.options.hardware_output = hardware_output;
            decoder.init(&config).unwrap();
            let mut frames = decoder.decode(&packet(&[7; 4], 0)).unwrap();
            assert_eq!(frames.len(), 1);
            drop(decoder);
            assert_eq!(runtime.count(&Call::ReleaseComponent), 1);
            assert_eq!(runtime.count(&Call::CloseLibrary), 0);
            let frame = frames.pop().unwrap();
            assert_eq!(&frame.to_image().unwrap().to_packed()[..4], &[7; 4]);
            drop(frame);
            assert_eq!(runtime.count(&Call::CloseLibrary), 1);
            assert_eq!(runtime.live_objects(), 0);
            assert_eq!(runtime.refcount_errors(), 0);
        }
    }
}
