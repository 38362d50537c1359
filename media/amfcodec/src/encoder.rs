// Copyright 2022 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Hardware encoding of frames into compressed packets.

use std::collections::BTreeMap;
use std::rc::Rc;
use std::thread;
use std::time::Duration;

use amf::Buffer;
use amf::Component;
use amf::ComponentId;
use amf::Data;
use amf::DataKey;
use amf::HdrMetadata;
use amf::MemoryType;
use amf::Property;
use amf::Status;
use amf::Surface;
use amf::SurfaceFormat;
use amf::TransferCharacteristic;
use amf::VideoCodec;
use amf::OUTPUT_DATA_TYPE_KEY;
use log::debug;
use log::error;
use log::info;
use log::warn;
use zerocopy::IntoBytes;

use crate::error::hardware;
use crate::to_hdr_metadata;
use crate::to_surface_format;
use crate::BridgedSurface;
use crate::CodecId;
use crate::DeviceSession;
use crate::EncoderOptions;
use crate::Error;
use crate::Frame;
use crate::FramesContext;
use crate::Packet;
use crate::PixelFormat;
use crate::Rational;
use crate::Result;
use crate::SessionState;
use crate::SubmitStatus;
use crate::SurfaceBridge;
use crate::TimestampQueue;
use crate::TryReceiveResult;

/// Sleep between two polls of a component that must produce output before the caller can go on.
const POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Stream parameters of an encoder.
#[derive(Clone, Debug)]
pub struct EncoderConfig {
    /// Codec of the packets.
    pub codec: CodecId,
    /// Pixel format of the input frames. Hardware formats take the software format of
    /// `frames_ctx`.
    pub format: PixelFormat,
    /// Pool the hardware input frames come from.
    pub frames_ctx: Option<Rc<FramesContext>>,
    /// Picture width.
    pub width: u32,
    /// Picture height.
    pub height: u32,
    /// Unit of the frame timestamps.
    pub time_base: Rational,
    /// Nominal frame rate, or `0/1` to derive it from the time base.
    pub frame_rate: Rational,
    /// Static encoder options.
    pub options: EncoderOptions,
}

impl EncoderConfig {
    /// A configuration with default options and a millisecond time base.
    pub fn new(codec: CodecId, format: PixelFormat, width: u32, height: u32) -> Self {
        EncoderConfig {
            codec,
            format,
            frames_ctx: None,
            width,
            height,
            time_base: Rational::new(1, 1000),
            frame_rate: Rational::new(0, 1),
            options: EncoderOptions::default(),
        }
    }

    fn surface_format(&self) -> Result<SurfaceFormat> {
        let format = match (&self.frames_ctx, self.format.is_hardware()) {
            (Some(frames_ctx), true) => frames_ctx.sw_format(),
            _ => self.format,
        };
        match to_surface_format(format) {
            SurfaceFormat::Unknown => Err(Error::FormatRejected(self.format)),
            f => Ok(f),
        }
    }

    fn rate_property(&self) -> Option<Property> {
        let rate = if self.frame_rate.num > 0 && self.frame_rate.den > 0 {
            self.frame_rate
        } else {
            Rational::new(self.time_base.den, self.time_base.num)
        };
        if rate.num <= 0 || rate.den <= 0 {
            return None;
        }
        Some(Property::FrameRate {
            num: rate.num as u32,
            den: rate.den as u32,
        })
    }
}

/// A hardware encoder bound to a device.
pub struct EncoderSession {
    bridge: Option<SurfaceBridge>,
    component: Option<Box<dyn Component>>,
    state: SessionState,
    codec: Option<VideoCodec>,
    options: EncoderOptions,
    timestamps: TimestampQueue,
    // Frames whose pixels the runtime reads in place, by the id set on their surface.
    pinned: BTreeMap<i64, Frame>,
    next_ref: i64,
    delayed_drain: bool,
    drain_started: bool,
}

impl EncoderSession {
    /// Creates an encoder on `device`. Call [`EncoderSession::init`] before submitting frames.
    pub fn new(device: Rc<DeviceSession>) -> Self {
        EncoderSession {
            bridge: Some(SurfaceBridge::new(device)),
            component: None,
            state: SessionState::Uninitialized,
            codec: None,
            options: EncoderOptions::default(),
            timestamps: TimestampQueue::new(),
            pinned: BTreeMap::new(),
            next_ref: 0,
            delayed_drain: false,
            drain_started: false,
        }
    }

    /// Creates the hardware component, applies the static options and initializes it.
    ///
    /// A failed initialization closes the session.
    pub fn init(&mut self, config: &EncoderConfig) -> Result<()> {
        if self.state != SessionState::Uninitialized {
            return Err(Error::InvalidState("encoder already initialized"));
        }
        if let Err(e) = self.try_init(config) {
            error!("failed to initialize {} encoder: {}", config.codec, e);
            self.close();
            return Err(e);
        }
        self.state = SessionState::Configured;
        info!(
            "{} encoder initialized: {}x{} {}, {} b-frames",
            config.codec, config.width, config.height, config.format, config.options.b_frames
        );
        Ok(())
    }

    fn try_init(&mut self, config: &EncoderConfig) -> Result<()> {
        let codec = config
            .codec
            .to_video_codec()
            .ok_or(Error::UnsupportedCodec(config.codec))?;
        let format = config.surface_format()?;
        let id = ComponentId::Encoder(codec);
        let device = Rc::clone(self.bridge()?.device());
        let component = device
            .context()?
            .create_component(id)
            .map_err(|status| Error::ComponentCreateFailed {
                component: id.name(),
                status,
            })?;
        let component = self.component.insert(component);

        let options = &config.options;
        let mut properties = vec![
            Property::Usage(options.usage),
            Property::QualityPreset(options.quality),
        ];
        if let Some(rate_control) = options.rate_control {
            properties.push(Property::RateControl(rate_control));
        }
        if let Some(bitrate) = options.bitrate {
            properties.push(Property::TargetBitrate(bitrate));
        }
        if let Some(max_bitrate) = options.max_bitrate {
            properties.push(Property::PeakBitrate(max_bitrate));
        }
        if let Some(rate) = config.rate_property() {
            properties.push(rate);
        }
        if let Some(gop_size) = options.gop_size {
            properties.push(Property::GopSize(gop_size));
        }
        properties.push(Property::BFrames(options.b_frames));
        properties.push(Property::AdaptiveMiniGop(options.adaptive_mini_gop));
        for property in &properties {
            component
                .set_property(property)
                .map_err(hardware("SetProperty"))?;
        }

        component
            .init(format, config.width, config.height)
            .map_err(|status| match status {
                Status::InvalidFormat | Status::SurfaceFormatNotSupported => {
                    Error::FormatRejected(config.format)
                }
                status => Error::ComponentInitFailed(status),
            })?;

        self.codec = Some(codec);
        self.options = config.options.clone();
        Ok(())
    }

    fn bridge(&self) -> Result<&SurfaceBridge> {
        self.bridge
            .as_ref()
            .ok_or(Error::InvalidState("encoder closed"))
    }

    fn component(&mut self) -> Result<&mut Box<dyn Component>> {
        self.component
            .as_mut()
            .ok_or(Error::InvalidState("encoder not initialized"))
    }

    fn video_codec(&self) -> Result<VideoCodec> {
        self.codec
            .ok_or(Error::InvalidState("encoder not initialized"))
    }

    fn reorders(&self) -> bool {
        self.options.b_frames > 0 || self.options.adaptive_mini_gop
    }

    /// Current state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Number of zero-copy frames the runtime still reads from.
    pub fn in_flight(&self) -> usize {
        self.pinned.len()
    }

    /// Decode timestamp shift fixed by the first packet of a reordering encoder.
    pub fn dts_delay(&self) -> Option<i64> {
        self.timestamps.delay()
    }

    /// Timestamps of the frames accepted and not yet returned as packets.
    pub fn pending_timestamps(&self) -> usize {
        self.timestamps.len()
    }

    fn hdr_buffer(&self, frame: &Frame) -> Result<Option<Buffer>> {
        if frame.color.transfer != TransferCharacteristic::Smpte2084 {
            return Ok(None);
        }
        let meta = match to_hdr_metadata(
            frame.mastering_display.as_ref(),
            frame.content_light.as_ref(),
        ) {
            Some(meta) => meta,
            None => return Ok(None),
        };
        let buffer = self
            .bridge()?
            .device()
            .context()?
            .alloc_buffer(MemoryType::Host, HdrMetadata::SIZE)
            .map_err(hardware("AllocBuffer"))?;
        buffer
            .write(0, meta.as_bytes(), HdrMetadata::SIZE)
            .map_err(hardware("write HDR metadata"))?;
        Ok(Some(buffer))
    }

    /// Builds the surface for `frame` with the properties the encoder reads back on its packets.
    fn input_surface(&mut self, frame: &Frame) -> Result<(BridgedSurface, Option<i64>)> {
        let pts = frame.pts.ok_or(Error::MissingTimestamp)?;
        let codec = self.video_codec()?;
        let bridged = self.bridge()?.frame_to_surface(frame)?;
        let surface = &bridged.surface;
        let frame_ref = if bridged.zero_copy {
            let id = self.next_ref;
            self.next_ref += 1;
            surface
                .set_int64(DataKey::FrameRef, id)
                .map_err(hardware("SetProperty"))?;
            Some(id)
        } else {
            None
        };
        if let Some(buffer) = self.hdr_buffer(frame)? {
            self.component()?
                .set_property(&Property::InputHdrMetadata(buffer.clone()))
                .map_err(hardware("SetProperty"))?;
            surface
                .set_buffer(DataKey::HdrMetadata, &buffer)
                .map_err(hardware("SetProperty"))?;
        }
        set_int64(surface, DataKey::SourcePts, pts)?;
        if matches!(codec, VideoCodec::H264 | VideoCodec::Hevc) {
            set_int64(surface, DataKey::InsertAud(codec), self.options.aud as i64)?;
        }
        Ok((bridged, frame_ref))
    }

    fn try_drain(&mut self) -> Result<()> {
        match self.component()?.drain() {
            Ok(()) => {
                debug!("encoder draining");
                self.delayed_drain = false;
                self.drain_started = true;
                Ok(())
            }
            Err(status) if status.is_queue_full() => {
                debug!("encoder drain delayed: {}", status);
                self.delayed_drain = true;
                Ok(())
            }
            Err(status) => Err(Error::Hardware {
                call: "Drain",
                status,
            }),
        }
    }

    /// Submits one frame, or signals the end of the stream with `None`.
    ///
    /// `QueueFull` means nothing was consumed: receive a packet and submit the same frame again.
    /// The end of the stream is always accepted; if the component refuses to drain yet, the drain
    /// is retried as packets are received.
    pub fn submit(&mut self, frame: Option<&Frame>) -> Result<SubmitStatus> {
        match self.state {
            SessionState::Uninitialized => {
                return Err(Error::InvalidState("encoder not initialized"))
            }
            SessionState::Closed => return Err(Error::InvalidState("encoder closed")),
            SessionState::Draining if frame.is_none() => return Ok(SubmitStatus::Accepted),
            SessionState::Draining => return Err(Error::InvalidState("encoder is draining")),
            SessionState::Configured => (),
        }

        let frame = match frame {
            Some(frame) => frame,
            None => {
                self.try_drain()?;
                self.state = SessionState::Draining;
                return Ok(SubmitStatus::Accepted);
            }
        };

        let (bridged, frame_ref) = self.input_surface(frame)?;
        match self
            .component()?
            .submit_input(&Data::Surface(bridged.surface))
        {
            Ok(()) => {}
            Err(status) if status.is_queue_full() => {
                debug!("encoder queue full: {}", status);
                return Ok(SubmitStatus::QueueFull);
            }
            Err(status) => {
                return Err(Error::Hardware {
                    call: "SubmitInput",
                    status,
                })
            }
        }
        if let Some(id) = frame_ref {
            self.pinned.insert(id, frame.clone());
        }
        // `frame_to_surface` fails without a timestamp, so `pts` is set here.
        self.timestamps.push(frame.pts.unwrap_or_default());
        Ok(SubmitStatus::Accepted)
    }

    fn must_wait(&self) -> bool {
        self.delayed_drain
            || self.drain_started
            || self.pinned.len() >= self.options.max_in_flight as usize
    }

    /// Pulls one packet, if any is ready.
    ///
    /// While the encoder drains, or while it holds the maximum number of zero-copy frames, waits
    /// for the component to produce a packet instead of returning `TryAgain`.
    pub fn receive_packet(&mut self) -> Result<TryReceiveResult<Packet>> {
        if matches!(
            self.state,
            SessionState::Uninitialized | SessionState::Closed
        ) {
            return Err(Error::InvalidState("encoder not running"));
        }
        let mut polls = 0;
        loop {
            match self.component()?.query_output() {
                Ok(Some(Data::Buffer(buffer))) => {
                    let packet = self.output_packet(&buffer)?;
                    if self.delayed_drain {
                        self.try_drain()?;
                        if self.delayed_drain {
                            warn!("encoder produced a packet but still refuses to drain");
                        }
                    }
                    return Ok(TryReceiveResult::Received(packet));
                }
                Ok(Some(Data::Surface(_))) => {
                    return Err(Error::UnexpectedOutput("encoder produced a surface"))
                }
                Ok(None) | Err(Status::Repeat) => {}
                Err(Status::Eof) => return Ok(TryReceiveResult::EndOfStream),
                Err(status) => {
                    return Err(Error::Hardware {
                        call: "QueryOutput",
                        status,
                    })
                }
            }
            if !self.must_wait() {
                return Ok(TryReceiveResult::TryAgain);
            }
            polls += 1;
            if polls > self.options.poll_limit {
                return Err(Error::QueueStalled);
            }
            thread::sleep(POLL_INTERVAL);
            if self.delayed_drain {
                self.try_drain()?;
            }
        }
    }

    fn output_packet(&mut self, buffer: &Buffer) -> Result<Packet> {
        let codec = self.video_codec()?;
        let data = buffer.data().map_err(hardware("GetNative"))?;
        let mut packet = Packet::new(data.to_vec());
        let side = buffer.side_data();
        packet.pts = buffer
            .int64(DataKey::SourcePts)
            .or_else(|| side.and_then(|s| s.pts));
        if let Some(side) = side {
            packet.duration = side.duration;
            packet.stream_index = side.stream_index;
        }
        packet.key = buffer.int64(DataKey::OutputDataType(codec)) == Some(OUTPUT_DATA_TYPE_KEY);
        let reorders = self.reorders();
        packet.dts = Some(self.timestamps.pop_dts(reorders)?);
        if let Some(id) = buffer.int64(DataKey::FrameRef) {
            if self.pinned.remove(&id).is_none() {
                warn!("encoder returned unknown frame reference {}", id);
            }
        }
        Ok(packet)
    }

    fn backoff(&self, retries: &mut u32) -> Result<()> {
        *retries += 1;
        if *retries > self.options.poll_limit {
            return Err(Error::QueueStalled);
        }
        thread::sleep(POLL_INTERVAL);
        Ok(())
    }

    /// Submits `frame`, receiving packets until the component accepts it, and returns the packets
    /// that became available. With `None`, drains the encoder and returns every remaining packet.
    pub fn encode(&mut self, frame: Option<&Frame>) -> Result<Vec<Packet>> {
        let mut packets = Vec::new();
        let mut retries = 0;
        while self.submit(frame)? == SubmitStatus::QueueFull {
            match self.receive_packet()? {
                TryReceiveResult::Received(packet) => packets.push(packet),
                TryReceiveResult::TryAgain => self.backoff(&mut retries)?,
                TryReceiveResult::EndOfStream => {
                    return Err(Error::InvalidState("encoder ended with input pending"))
                }
            }
        }
        loop {
            match self.receive_packet()? {
                TryReceiveResult::Received(packet) => packets.push(packet),
                TryReceiveResult::TryAgain | TryReceiveResult::EndOfStream => {
                    return Ok(packets)
                }
            }
        }
    }

    /// Discards queued frames and packets. A draining encoder accepts input again.
    pub fn flush(&mut self) -> Result<()> {
        if self.state == SessionState::Closed {
            return Err(Error::InvalidState("encoder closed"));
        }
        self.component()?.flush().map_err(hardware("Flush"))?;
        self.timestamps.clear();
        self.pinned.clear();
        self.delayed_drain = false;
        self.drain_started = false;
        self.state = SessionState::Configured;
        Ok(())
    }

    /// Terminates the component, releases pinned frames and the device. Safe to call repeatedly.
    pub fn close(&mut self) {
        if let Some(mut component) = self.component.take() {
            if let Err(e) = component.terminate() {
                error!("failed to terminate encoder: {}", e);
            }
        }
        self.pinned.clear();
        self.timestamps.clear();
        self.bridge = None;
        self.state = SessionState::Closed;
    }
}

impl Drop for EncoderSession {
    fn drop(&mut self) {
        self.close();
    }
}

fn set_int64(surface: &Surface, key: DataKey, value: i64) -> Result<()> {
    surface
        .set_int64(key, value)
        .map_err(hardware("SetProperty"))
}

#[cfg(test)]
mod tests {
    use amf::fake::Call;
    use amf::fake::FakeConfig;
    use amf::fake::FakeRuntime;
    use amf::LogForwarder;

    use super::*;
    use crate::BackendRequest;
    use crate::ContentLight;
    use crate::DeviceOptions;
    use crate::HostImage;
    use crate::MasteringDisplay;

    fn device(runtime: &FakeRuntime) -> Rc<DeviceSession> {
        DeviceSession::create(
            runtime,
            Rc::new(LogForwarder),
            DeviceOptions::default(),
            BackendRequest::Auto,
        )
        .unwrap()
    }

    fn encoder(runtime: &FakeRuntime, b_frames: u32) -> EncoderSession {
        let mut encoder = EncoderSession::new(device(runtime));
        let mut config = EncoderConfig::new(CodecId::H264, PixelFormat::Nv12, 16, 16);
        config.options.b_frames = b_frames;
        encoder.init(&config).unwrap();
        encoder
    }

    fn frame(pts: i64) -> Frame {
        let bytes: Vec<u8> = (0..HostImage::packed_size(PixelFormat::Nv12, 16, 16))
            .map(|i| (i as i64 + pts) as u8)
            .collect();
        let mut frame =
            Frame::from_image(HostImage::from_packed(PixelFormat::Nv12, 16, 16, &bytes).unwrap());
        frame.pts = Some(pts);
        frame
    }

    #[test]
    fn options_precede_init() {
        let runtime = FakeRuntime::new();
        let mut encoder = EncoderSession::new(device(&runtime));
        let mut config = EncoderConfig::new(CodecId::Hevc, PixelFormat::Nv12, 64, 32);
        config.options.bitrate = Some(2_000_000);
        config.options.gop_size = Some(30);
        config.frame_rate = Rational::new(30, 1);
        encoder.init(&config).unwrap();
        let init = runtime
            .position(&Call::InitComponent(SurfaceFormat::Nv12, 64, 32))
            .unwrap();
        for name in [
            "HevcUsage",
            "HevcQualityPreset",
            "HevcTargetBitrate",
            "HevcFrameRate",
            "HevcGOPSize",
            "HevcMaxNumOfBPictures",
        ] {
            assert!(runtime.position(&Call::SetProperty(name)).unwrap() < init);
        }
        assert_eq!(runtime.count(&Call::SetProperty("HevcPeakBitrate")), 0);
        assert_eq!(encoder.state(), SessionState::Configured);
    }

    #[test]
    fn unsupported_codec_closes_the_session() {
        let runtime = FakeRuntime::new();
        let mut encoder = EncoderSession::new(device(&runtime));
        let config = EncoderConfig::new(CodecId::Mpeg2, PixelFormat::Nv12, 16, 16);
        assert!(matches!(
            encoder.init(&config),
            Err(Error::UnsupportedCodec(CodecId::Mpeg2))
        ));
        assert_eq!(encoder.state(), SessionState::Closed);
        assert!(encoder.submit(None).is_err());
    }

    #[test]
    fn rejected_format() {
        let runtime = FakeRuntime::with_config(FakeConfig {
            rejected_formats: vec![SurfaceFormat::P010],
            ..Default::default()
        });
        let mut encoder = EncoderSession::new(device(&runtime));
        let config = EncoderConfig::new(CodecId::Av1, PixelFormat::P010, 16, 16);
        assert!(matches!(
            encoder.init(&config),
            Err(Error::FormatRejected(PixelFormat::P010))
        ));
        assert_eq!(runtime.count(&Call::TerminateComponent), 1);
    }

    #[test]
    fn reordered_packets_get_monotonic_dts() {
        let runtime = FakeRuntime::new();
        let mut encoder = encoder(&runtime, 2);
        let mut packets = Vec::new();
        for pts in [0, 33, 66, 100, 133] {
            packets.extend(encoder.encode(Some(&frame(pts))).unwrap());
        }
        packets.extend(encoder.encode(None).unwrap());
        assert_eq!(packets.len(), 5);
        assert_eq!(encoder.dts_delay(), Some(66));
        assert_eq!(encoder.pending_timestamps(), 0);

        let pts: Vec<i64> = packets.iter().map(|p| p.pts.unwrap()).collect();
        assert_eq!(pts, vec![0, 100, 33, 66, 133]);
        let dts: Vec<i64> = packets.iter().map(|p| p.dts.unwrap()).collect();
        assert_eq!(dts, vec![-66, -33, 0, 34, 67]);
        for packet in &packets {
            assert!(packet.dts <= packet.pts);
        }
        assert!(packets[0].key);
        assert!(packets[1..].iter().all(|p| !p.key));
        assert_eq!(packets[0].data, frame(0).to_image().unwrap().to_packed());
    }

    #[test]
    fn no_reordering_keeps_timestamps() {
        let runtime = FakeRuntime::new();
        let mut encoder = encoder(&runtime, 0);
        let mut packets = Vec::new();
        for pts in [5, 10, 15] {
            packets.extend(encoder.encode(Some(&frame(pts))).unwrap());
        }
        packets.extend(encoder.encode(None).unwrap());
        let dts: Vec<Option<i64>> = packets.iter().map(|p| p.dts).collect();
        assert_eq!(dts, vec![Some(5), Some(10), Some(15)]);
        assert_eq!(encoder.dts_delay(), None);
    }

    #[test]
    fn frames_need_a_timestamp() {
        let runtime = FakeRuntime::new();
        let mut encoder = encoder(&runtime, 0);
        let mut input = frame(0);
        input.pts = None;
        assert!(matches!(
            encoder.submit(Some(&input)),
            Err(Error::MissingTimestamp)
        ));
        assert_eq!(runtime.count(&Call::SubmitInput), 0);
    }

    #[test]
    fn queue_full_defers_the_timestamp() {
        let runtime = FakeRuntime::with_config(FakeConfig {
            encoder_queue_depth: 2,
            ..Default::default()
        });
        let mut encoder = encoder(&runtime, 0);
        assert_eq!(
            encoder.submit(Some(&frame(0))).unwrap(),
            SubmitStatus::Accepted
        );
        assert_eq!(
            encoder.submit(Some(&frame(1))).unwrap(),
            SubmitStatus::Accepted
        );
        assert_eq!(
            encoder.submit(Some(&frame(2))).unwrap(),
            SubmitStatus::QueueFull
        );
        assert_eq!(encoder.pending_timestamps(), 2);

        let packets = encoder.encode(Some(&frame(2))).unwrap();
        assert_eq!(packets.len(), 3);
        assert_eq!(packets[2].pts, Some(2));
        assert_eq!(packets[2].data, frame(2).to_image().unwrap().to_packed());
    }

    #[test]
    fn zero_copy_frames_are_pinned_until_their_packet() {
        let runtime = FakeRuntime::new();
        let device = device(&runtime);
        let pool = FramesContext::new(Rc::clone(&device), PixelFormat::Nv12, 16, 16).unwrap();
        let mut encoder = EncoderSession::new(device);
        let mut config = EncoderConfig::new(CodecId::H264, PixelFormat::Amf, 16, 16);
        config.frames_ctx = Some(Rc::clone(&pool));
        config.options.b_frames = 1;
        encoder.init(&config).unwrap();

        let mut input = pool.get_buffer().unwrap();
        input.pts = Some(0);
        encoder.submit(Some(&input)).unwrap();
        input.pts = Some(1);
        encoder.submit(Some(&input)).unwrap();
        assert_eq!(encoder.in_flight(), 2);
        assert!(matches!(
            encoder.receive_packet().unwrap(),
            TryReceiveResult::Received(_)
        ));
        assert_eq!(encoder.in_flight(), 1);
        drop(input);
        let rest = encoder.encode(None).unwrap();
        assert_eq!(rest.len(), 1);
        assert_eq!(encoder.in_flight(), 0);
        drop(encoder);
        drop(pool);
        assert_eq!(runtime.live_objects(), 0);
        assert_eq!(runtime.refcount_errors(), 0);
    }

    #[test]
    fn in_flight_cap_waits_for_a_bounded_time() {
        let runtime = FakeRuntime::new();
        let device = device(&runtime);
        let pool = FramesContext::new(Rc::clone(&device), PixelFormat::Nv12, 16, 16).unwrap();
        let mut encoder = EncoderSession::new(device);
        let mut config = EncoderConfig::new(CodecId::H264, PixelFormat::Amf, 16, 16);
        config.frames_ctx = Some(Rc::clone(&pool));
        config.options.b_frames = 3;
        config.options.max_in_flight = 2;
        config.options.poll_limit = 3;
        encoder.init(&config).unwrap();
        for pts in 0..2 {
            let mut input = pool.get_buffer().unwrap();
            input.pts = Some(pts);
            encoder.submit(Some(&input)).unwrap();
        }
        assert!(matches!(
            encoder.receive_packet(),
            Err(Error::QueueStalled)
        ));
    }

    #[test]
    fn refused_drain_is_retried_after_a_packet() {
        let runtime = FakeRuntime::with_config(FakeConfig {
            drain_input_full_once: true,
            ..Default::default()
        });
        let mut encoder = encoder(&runtime, 0);
        encoder.submit(Some(&frame(0))).unwrap();
        assert_eq!(encoder.submit(None).unwrap(), SubmitStatus::Accepted);
        assert_eq!(encoder.state(), SessionState::Draining);
        assert_eq!(runtime.count(&Call::Drain), 1);
        assert!(matches!(
            encoder.receive_packet().unwrap(),
            TryReceiveResult::Received(_)
        ));
        assert_eq!(runtime.count(&Call::Drain), 2);
        assert!(matches!(
            encoder.receive_packet().unwrap(),
            TryReceiveResult::EndOfStream
        ));
        assert_eq!(encoder.submit(None).unwrap(), SubmitStatus::Accepted);
        assert_eq!(runtime.count(&Call::Drain), 2);
    }

    #[test]
    fn draining_an_empty_encoder_ends_the_stream() {
        let runtime = FakeRuntime::new();
        let mut encoder = encoder(&runtime, 2);
        assert!(encoder.encode(None).unwrap().is_empty());
        assert!(matches!(
            encoder.receive_packet().unwrap(),
            TryReceiveResult::EndOfStream
        ));
        encoder.flush().unwrap();
        assert_eq!(encoder.state(), SessionState::Configured);
    }

    #[test]
    fn surfaces_carry_encoder_properties() {
        let runtime = FakeRuntime::new();
        let device = device(&runtime);
        let mut encoder = EncoderSession::new(device);
        let mut config = EncoderConfig::new(CodecId::H264, PixelFormat::Nv12, 16, 16);
        config.options.aud = true;
        encoder.init(&config).unwrap();

        let mut input = frame(7);
        input.color.transfer = TransferCharacteristic::Smpte2084;
        input.mastering_display = Some(MasteringDisplay {
            max_luminance: Rational::new(1000, 1),
            min_luminance: Rational::new(1, 100),
            has_luminance: true,
            ..Default::default()
        });
        input.content_light = Some(ContentLight {
            max_cll: 1000,
            max_fall: 400,
        });
        let (bridged, frame_ref) = encoder.input_surface(&input).unwrap();
        assert_eq!(frame_ref, None);
        let surface = &bridged.surface;
        assert_eq!(surface.int64(DataKey::SourcePts), Some(7));
        assert_eq!(surface.int64(DataKey::InsertAud(VideoCodec::H264)), Some(1));
        let meta = surface
            .buffer(DataKey::HdrMetadata)
            .and_then(|b| b.hdr_metadata())
            .unwrap();
        assert_eq!(meta.max_mastering_luminance, 10_000_000);
        assert_eq!(meta.max_content_light_level, 1000);
        assert_eq!(runtime.count(&Call::SetProperty("InHDRMetadata")), 1);

        input.mastering_display = None;
        encoder.input_surface(&input).unwrap();
        assert_eq!(runtime.count(&Call::SetProperty("InHDRMetadata")), 1);
    }

    #[test]
    fn b_pictures_are_not_key_frames() {
        let runtime = FakeRuntime::new();
        let mut encoder = encoder(&runtime, 1);
        let mut packets = Vec::new();
        for pts in 0..3 {
            packets.extend(encoder.encode(Some(&frame(pts))).unwrap());
        }
        assert_eq!(packets.len(), 3);
        assert_eq!(packets[2].pts, Some(1));
        assert!(!packets[2].key);
    }
}
