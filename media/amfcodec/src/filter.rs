// Copyright 2022 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Hardware scaling and pixel format conversion.

use std::rc::Rc;

use amf::ColorProfile;
use amf::ColorRange;
use amf::Component;
use amf::ComponentId;
use amf::Data;
use amf::Property;
use amf::Status;
use amf::SurfaceFormat;
use log::error;
use log::info;
use log::warn;

use crate::error::hardware;
use crate::frame::gcd;
use crate::scale_eval::eval_dimensions;
use crate::to_surface_format;
use crate::DeviceSession;
use crate::Error;
use crate::Frame;
use crate::FrameMemory;
use crate::FramesContext;
use crate::OutputFormat;
use crate::PixelFormat;
use crate::Rational;
use crate::Result;
use crate::ScaleOptions;
use crate::Scaler;
use crate::SurfaceBridge;

/// Frames entering a filter.
#[derive(Clone, Debug)]
pub struct InputLink {
    /// Width of the frames.
    pub width: u32,
    /// Height of the frames.
    pub height: u32,
    /// Pixel format of the frames. Hardware formats take the software format of `frames_ctx`.
    pub format: PixelFormat,
    /// Sample aspect ratio, or `0/1` when unknown.
    pub sample_aspect_ratio: Rational,
    /// Pool the hardware frames come from.
    pub frames_ctx: Option<Rc<FramesContext>>,
}

impl InputLink {
    /// A link carrying `width`x`height` host frames of `format` with unknown aspect ratio.
    pub fn new(width: u32, height: u32, format: PixelFormat) -> Self {
        InputLink {
            width,
            height,
            format,
            sample_aspect_ratio: Rational::new(0, 1),
            frames_ctx: None,
        }
    }

    fn sw_format(&self) -> PixelFormat {
        match &self.frames_ctx {
            Some(frames_ctx) if self.format.is_hardware() => frames_ctx.sw_format(),
            _ => self.format,
        }
    }
}

/// Frames leaving a filter.
#[derive(Clone, Debug)]
pub struct OutputLink {
    /// Width of the frames.
    pub width: u32,
    /// Height of the frames.
    pub height: u32,
    /// Format of the pixels held by the output frames.
    pub sw_format: PixelFormat,
    /// Sample aspect ratio.
    pub sample_aspect_ratio: Rational,
    /// Pool the output frames belong to.
    pub frames_ctx: Rc<FramesContext>,
}

/// Output sample aspect ratio of a `in_w`x`in_h` to `out_w`x`out_h` scale, so the display aspect
/// ratio is kept. An unknown ratio stays unknown.
pub fn scaled_sample_aspect_ratio(
    sar: Rational,
    in_w: u32,
    in_h: u32,
    out_w: u32,
    out_h: u32,
) -> Rational {
    if sar.num == 0 {
        return sar;
    }
    let num = out_h as i64 * in_w as i64;
    let den = out_w as i64 * in_h as i64;
    let g = gcd(num, den).max(1);
    let factor = Rational::new(
        (num / g).min(i32::MAX as i64) as i32,
        (den / g).min(i32::MAX as i64) as i32,
    );
    factor * sar
}

fn start_converter(
    component: &mut dyn Component,
    properties: &[Property],
    format: SurfaceFormat,
    input: &InputLink,
    sw_format: PixelFormat,
) -> Result<()> {
    for property in properties {
        component
            .set_property(property)
            .map_err(hardware("SetProperty"))?;
    }
    component
        .init(format, input.width, input.height)
        .map_err(|status| match status {
            Status::InvalidFormat | Status::SurfaceFormatNotSupported => {
                Error::FormatRejected(sw_format)
            }
            status => Error::ComponentInitFailed(status),
        })
}

/// A hardware scaler bound to a device.
pub struct FilterSession {
    bridge: Option<SurfaceBridge>,
    options: ScaleOptions,
    component: Option<Box<dyn Component>>,
    output: Option<OutputLink>,
}

impl FilterSession {
    /// Creates a scaler on `device`. Call [`FilterSession::configure_output`] before filtering.
    pub fn new(device: Rc<DeviceSession>, options: ScaleOptions) -> Self {
        FilterSession {
            bridge: Some(SurfaceBridge::new(device)),
            options,
            component: None,
            output: None,
        }
    }

    /// Options the scaler was created with.
    pub fn options(&self) -> &ScaleOptions {
        &self.options
    }

    /// The configured output, if any.
    pub fn output(&self) -> Option<&OutputLink> {
        self.output.as_ref()
    }

    fn bridge(&self) -> Result<&SurfaceBridge> {
        self.bridge
            .as_ref()
            .ok_or(Error::InvalidState("filter closed"))
    }

    fn has_color_options(&self) -> bool {
        let options = &self.options;
        options.color_profile.is_some()
            || options.color_range.is_some()
            || options.primaries.is_some()
            || options.trc.is_some()
    }

    fn color_properties(&self) -> Vec<Property> {
        let options = &self.options;
        let mut properties = Vec::new();
        if let Some(profile) = options.color_profile {
            let profile = profile.with_range(options.color_range.unwrap_or(ColorRange::Undefined));
            if profile != ColorProfile::Unknown {
                properties.push(Property::ColorProfile(profile));
            }
        }
        if let Some(range) = options.color_range {
            properties.push(Property::OutputColorRange(range));
        }
        if let Some(primaries) = options.primaries {
            properties.push(Property::OutputColorPrimaries(primaries));
        }
        if let Some(trc) = options.trc {
            properties.push(Property::OutputTransferCharacteristic(trc));
        }
        properties
    }

    /// Sizes the output for frames described by `input`, creates the output pool and initializes
    /// the scaling component. Configuring again replaces the previous component.
    ///
    /// The high-quality scaler cannot change the pixel format and ignores the color options.
    pub fn configure_output(&mut self, input: &InputLink) -> Result<OutputLink> {
        let (width, height) =
            eval_dimensions(&self.options.w, &self.options.h, input.width, input.height)?;
        let in_format = input.sw_format();
        let in_surface_format = to_surface_format(in_format);
        if in_surface_format == SurfaceFormat::Unknown {
            return Err(Error::FormatRejected(in_format));
        }
        let sw_format = match self.options.format {
            OutputFormat::Same => in_format,
            OutputFormat::Format(format) => format,
        };
        let out_surface_format = to_surface_format(sw_format);
        if out_surface_format == SurfaceFormat::Unknown {
            return Err(Error::FormatRejected(sw_format));
        }
        if self.options.scaler == Scaler::Hq {
            if sw_format != in_format {
                return Err(Error::FormatRejected(sw_format));
            }
            if self.has_color_options() {
                warn!("color options are ignored by the high-quality scaler");
            }
        }

        self.terminate();
        let device = Rc::clone(self.bridge()?.device());
        let frames_ctx = FramesContext::new(Rc::clone(&device), sw_format, width, height)?;
        let (id, properties) = match self.options.scaler {
            Scaler::Converter => {
                let mut properties = vec![
                    Property::OutputFormat(out_surface_format),
                    Property::OutputSize { width, height },
                    Property::ScaleType(self.options.scale_type),
                ];
                properties.extend(self.color_properties());
                (ComponentId::Converter, properties)
            }
            Scaler::Hq => {
                let mut properties = vec![
                    Property::OutputSize { width, height },
                    Property::HqScalerKeepAspectRatio(false),
                ];
                if let Some(algorithm) = self.options.hq_algorithm {
                    properties.push(Property::HqScalerAlgorithm(algorithm));
                }
                (ComponentId::HqScaler, properties)
            }
        };

        let component = device
            .context()?
            .create_component(id)
            .map_err(|status| Error::ComponentCreateFailed {
                component: id.name(),
                status,
            })?;
        let component = self.component.insert(component);
        let configured = start_converter(
            component.as_mut(),
            &properties,
            in_surface_format,
            input,
            sw_format,
        );
        if let Err(e) = configured {
            error!("failed to configure scaler: {}", e);
            self.terminate();
            return Err(e);
        }

        let output = OutputLink {
            width,
            height,
            sw_format,
            sample_aspect_ratio: scaled_sample_aspect_ratio(
                input.sample_aspect_ratio,
                input.width,
                input.height,
                width,
                height,
            ),
            frames_ctx,
        };
        info!(
            "{} configured: {}x{} {} -> {}x{} {}",
            id.name(),
            input.width,
            input.height,
            in_format,
            width,
            height,
            sw_format
        );
        self.output = Some(output.clone());
        Ok(output)
    }

    /// Scales one frame. The output is a hardware frame of the output pool, with the input's
    /// timestamps and, for the converter, the configured color description.
    pub fn filter_frame(&mut self, frame: &Frame) -> Result<Frame> {
        let output = self
            .output
            .clone()
            .ok_or(Error::InvalidState("filter output not configured"))?;
        let bridged = self.bridge()?.frame_to_surface(frame)?;
        let component = self
            .component
            .as_mut()
            .ok_or(Error::InvalidState("filter output not configured"))?;
        component
            .submit_input(&Data::Surface(bridged.surface))
            .map_err(hardware("SubmitInput"))?;
        let surface = loop {
            match component.query_output() {
                Ok(Some(Data::Surface(surface))) => break surface,
                Ok(Some(Data::Buffer(_))) => {
                    return Err(Error::UnexpectedOutput("scaler produced a buffer"))
                }
                Ok(None) => return Err(Error::UnexpectedOutput("scaler produced nothing")),
                Err(Status::Repeat) => continue,
                Err(status) => {
                    return Err(Error::Hardware {
                        call: "QueryOutput",
                        status,
                    })
                }
            }
        };

        let mut out = self.bridge()?.surface_to_frame(
            surface,
            output.width,
            output.height,
            FrameMemory::Hardware,
        )?;
        out.pts = frame.pts;
        out.pkt_dts = frame.pkt_dts;
        out.duration = frame.duration;
        out.pkt_size = frame.pkt_size;
        out.pkt_pos = frame.pkt_pos;
        out.stream_index = frame.stream_index;
        out.key_frame = frame.key_frame;
        out.color = frame.color;
        out.mastering_display = frame.mastering_display;
        out.content_light = frame.content_light;
        if self.options.scaler == Scaler::Converter {
            if let Some(profile) = self.options.color_profile {
                out.color.profile = profile;
            }
            if let Some(range) = self.options.color_range {
                out.color.range = range;
            }
            if let Some(primaries) = self.options.primaries {
                out.color.primaries = primaries;
            }
            if let Some(trc) = self.options.trc {
                out.color.transfer = trc;
            }
        }
        out.sample_aspect_ratio = output.sample_aspect_ratio;
        out.frames_ctx = Some(output.frames_ctx);
        Ok(out)
    }

    fn terminate(&mut self) {
        if let Some(mut component) = self.component.take() {
            if let Err(e) = component.terminate() {
                error!("failed to terminate scaler: {}", e);
            }
        }
        self.output = None;
    }

    /// Terminates the scaling component and releases the device. Safe to call repeatedly.
    pub fn close(&mut self) {
        self.terminate();
        self.bridge = None;
    }
}

impl Drop for FilterSession {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use amf::fake::Call;
    use amf::fake::FakeConfig;
    use amf::fake::FakeRuntime;
    use amf::ColorPrimaries;
    use amf::HqScalerAlgorithm;
    use amf::LogForwarder;
    use amf::TransferCharacteristic;

    use super::*;
    use crate::BackendRequest;
    use crate::DeviceOptions;
    use crate::HostImage;

    fn scaler(runtime: &FakeRuntime, options: ScaleOptions) -> FilterSession {
        let device = DeviceSession::create(
            runtime,
            Rc::new(LogForwarder),
            DeviceOptions::default(),
            BackendRequest::Auto,
        )
        .unwrap();
        FilterSession::new(device, options)
    }

    fn half() -> ScaleOptions {
        ScaleOptions {
            w: "iw/2".to_owned(),
            h: "ih/2".to_owned(),
            ..Default::default()
        }
    }

    fn gradient(width: u32, height: u32) -> Frame {
        let bytes: Vec<u8> = (0..HostImage::packed_size(PixelFormat::Nv12, width, height))
            .map(|i| (i % 256) as u8)
            .collect();
        Frame::from_image(HostImage::from_packed(PixelFormat::Nv12, width, height, &bytes).unwrap())
    }

    #[test]
    fn same_format_at_half_size() {
        let runtime = FakeRuntime::new();
        let mut filter = scaler(&runtime, half());
        let mut input = InputLink::new(64, 32, PixelFormat::Nv12);
        input.sample_aspect_ratio = Rational::new(1, 1);
        let output = filter.configure_output(&input).unwrap();
        assert_eq!((output.width, output.height), (32, 16));
        assert_eq!(output.sw_format, PixelFormat::Nv12);
        assert_eq!(output.sample_aspect_ratio, Rational::new(1, 1));

        let mut frame = gradient(64, 32);
        frame.pts = Some(1234);
        let out = filter.filter_frame(&frame).unwrap();
        assert_eq!((out.width, out.height), (32, 16));
        assert_eq!(out.format, PixelFormat::Amf);
        assert_eq!(out.pts, Some(1234));

        let pool = out.frames_ctx.clone().unwrap();
        assert_eq!(pool.sw_format(), PixelFormat::Nv12);
        let mut image = HostImage::new(PixelFormat::Nv12, 32, 16).unwrap();
        pool.transfer_from(&mut image, &out).unwrap();
        // Nearest sample of every other column and row.
        assert_eq!(image.planes[0].data[..4], [0, 2, 4, 6]);
        assert_eq!(image.planes[0].data[32], 128);
    }

    #[test]
    fn anamorphic_output_adjusts_the_aspect_ratio() {
        let runtime = FakeRuntime::new();
        let mut filter = scaler(
            &runtime,
            ScaleOptions {
                w: "1440".to_owned(),
                h: "ih".to_owned(),
                ..Default::default()
            },
        );
        let mut input = InputLink::new(1920, 1080, PixelFormat::Nv12);
        input.sample_aspect_ratio = Rational::new(1, 1);
        let output = filter.configure_output(&input).unwrap();
        assert_eq!(output.sample_aspect_ratio, Rational::new(4, 3));

        let unknown = InputLink::new(1920, 1080, PixelFormat::Nv12);
        let output = filter.configure_output(&unknown).unwrap();
        assert_eq!(output.sample_aspect_ratio, Rational::new(0, 1));
        assert_eq!(runtime.count(&Call::TerminateComponent), 1);
    }

    #[test]
    fn color_properties_only_when_set() {
        let runtime = FakeRuntime::new();
        let mut filter = scaler(&runtime, half());
        filter
            .configure_output(&InputLink::new(16, 16, PixelFormat::Nv12))
            .unwrap();
        for name in [
            "ColorProfile",
            "OutputColorRange",
            "OutputColorPrimaries",
            "OutputTransferCharacteristic",
        ] {
            assert_eq!(runtime.count(&Call::SetProperty(name)), 0);
        }
        assert_eq!(runtime.count(&Call::SetProperty("ScaleType")), 1);

        let runtime = FakeRuntime::new();
        let mut filter = scaler(
            &runtime,
            ScaleOptions {
                color_profile: Some(ColorProfile::Bt709),
                color_range: Some(ColorRange::Full),
                primaries: Some(ColorPrimaries::Bt709),
                trc: Some(TransferCharacteristic::Bt709),
                ..half()
            },
        );
        filter
            .configure_output(&InputLink::new(16, 16, PixelFormat::Nv12))
            .unwrap();
        let init = runtime
            .position(&Call::InitComponent(SurfaceFormat::Nv12, 16, 16))
            .unwrap();
        for name in [
            "ColorProfile",
            "OutputColorRange",
            "OutputColorPrimaries",
            "OutputTransferCharacteristic",
        ] {
            assert!(runtime.position(&Call::SetProperty(name)).unwrap() < init);
        }
        let mut frame = gradient(16, 16);
        frame.pts = Some(0);
        let out = filter.filter_frame(&frame).unwrap();
        assert_eq!(out.color.profile, ColorProfile::Bt709);
        assert_eq!(out.color.range, ColorRange::Full);
        assert_eq!(out.color.primaries, ColorPrimaries::Bt709);
        assert_eq!(out.color.transfer, TransferCharacteristic::Bt709);
    }

    #[test]
    fn full_range_profiles() {
        let runtime = FakeRuntime::new();
        let filter = scaler(
            &runtime,
            ScaleOptions {
                color_profile: Some(ColorProfile::Bt2020),
                color_range: Some(ColorRange::Full),
                ..Default::default()
            },
        );
        assert!(matches!(
            filter.color_properties()[0],
            Property::ColorProfile(ColorProfile::Full2020)
        ));
    }

    #[test]
    fn explicit_output_format() {
        let runtime = FakeRuntime::new();
        let mut filter = scaler(
            &runtime,
            ScaleOptions {
                format: OutputFormat::Format(PixelFormat::P010),
                ..Default::default()
            },
        );
        let output = filter
            .configure_output(&InputLink::new(32, 32, PixelFormat::Nv12))
            .unwrap();
        assert_eq!((output.width, output.height), (32, 32));
        assert_eq!(output.sw_format, PixelFormat::P010);
        assert_eq!(output.frames_ctx.sw_format(), PixelFormat::P010);
    }

    #[test]
    fn rejected_formats() {
        let runtime = FakeRuntime::with_config(FakeConfig {
            rejected_formats: vec![SurfaceFormat::P010],
            ..Default::default()
        });
        let mut filter = scaler(
            &runtime,
            ScaleOptions {
                format: OutputFormat::Format(PixelFormat::P010),
                ..Default::default()
            },
        );
        assert!(matches!(
            filter.configure_output(&InputLink::new(32, 32, PixelFormat::Nv12)),
            Err(Error::FormatRejected(PixelFormat::P010))
        ));
        assert!(filter.output().is_none());
        assert_eq!(runtime.count(&Call::TerminateComponent), 1);
        assert!(matches!(
            filter.configure_output(&InputLink::new(32, 32, PixelFormat::None)),
            Err(Error::FormatRejected(PixelFormat::None))
        ));
    }

    #[test]
    fn filtering_needs_an_output() {
        let runtime = FakeRuntime::new();
        let mut filter = scaler(&runtime, ScaleOptions::default());
        assert!(matches!(
            filter.filter_frame(&gradient(16, 16)),
            Err(Error::InvalidState(_))
        ));
        let mut bad = scaler(
            &runtime,
            ScaleOptions {
                w: "iw/".to_owned(),
                ..Default::default()
            },
        );
        assert!(matches!(
            bad.configure_output(&InputLink::new(16, 16, PixelFormat::Nv12)),
            Err(Error::InvalidExpression { .. })
        ));
    }

    #[test]
    fn close_releases_everything() {
        let runtime = FakeRuntime::new();
        let mut filter = scaler(&runtime, half());
        filter
            .configure_output(&InputLink::new(16, 16, PixelFormat::Nv12))
            .unwrap();
        let mut frame = gradient(16, 16);
        frame.pts = Some(0);
        let out = filter.filter_frame(&frame).unwrap();
        filter.close();
        filter.close();
        assert_eq!(runtime.count(&Call::ReleaseComponent), 1);
        drop(filter);
        assert_eq!(runtime.count(&Call::CloseLibrary), 0);
        drop(out);
        assert_eq!(runtime.count(&Call::CloseLibrary), 1);
        assert_eq!(runtime.live_objects(), 0);
        assert_eq!(runtime.refcount_errors(), 0);
    }

    #[test]
    fn hq_scaler_keeps_the_format() {
        let runtime = FakeRuntime::new();
        let mut filter = scaler(
            &runtime,
            ScaleOptions {
                w: "iw*2".to_owned(),
                h: "ih*2".to_owned(),
                scaler: Scaler::Hq,
                hq_algorithm: Some(HqScalerAlgorithm::VideoSr1_1),
                color_range: Some(ColorRange::Full),
                ..Default::default()
            },
        );
        let mut input = InputLink::new(8, 4, PixelFormat::Nv12);
        input.sample_aspect_ratio = Rational::new(1, 1);
        let output = filter.configure_output(&input).unwrap();
        assert_eq!((output.width, output.height), (16, 8));
        assert_eq!(output.sw_format, PixelFormat::Nv12);
        assert_eq!(output.sample_aspect_ratio, Rational::new(1, 1));
        assert_eq!(runtime.count(&Call::CreateComponent(ComponentId::HqScaler)), 1);
        assert_eq!(runtime.count(&Call::CreateComponent(ComponentId::Converter)), 0);
        let init = runtime
            .position(&Call::InitComponent(SurfaceFormat::Nv12, 8, 4))
            .unwrap();
        for name in [
            "HQScalerOutputSize",
            "HQScalerKeepAspectRatio",
            "HQScalerAlgorithm",
        ] {
            assert!(runtime.position(&Call::SetProperty(name)).unwrap() < init);
        }
        for name in ["OutputFormat", "ScaleType", "OutputColorRange"] {
            assert_eq!(runtime.count(&Call::SetProperty(name)), 0);
        }

        let mut frame = gradient(8, 4);
        frame.pts = Some(77);
        let out = filter.filter_frame(&frame).unwrap();
        assert_eq!((out.width, out.height), (16, 8));
        assert_eq!(out.format, PixelFormat::Amf);
        assert_eq!(out.pts, Some(77));
        assert_eq!(out.color.range, ColorRange::Undefined);
        let mut image = HostImage::new(PixelFormat::Nv12, 16, 8).unwrap();
        out.frames_ctx
            .clone()
            .unwrap()
            .transfer_from(&mut image, &out)
            .unwrap();
        // Every sample repeated twice.
        assert_eq!(image.planes[0].data[..4], [0, 0, 1, 1]);
    }

    #[test]
    fn hq_scaler_rejects_conversions() {
        let runtime = FakeRuntime::new();
        let mut filter = scaler(
            &runtime,
            ScaleOptions {
                scaler: Scaler::Hq,
                format: OutputFormat::Format(PixelFormat::P010),
                ..Default::default()
            },
        );
        assert!(matches!(
            filter.configure_output(&InputLink::new(32, 32, PixelFormat::Nv12)),
            Err(Error::FormatRejected(PixelFormat::P010))
        ));
        assert_eq!(runtime.count(&Call::CreateComponent(ComponentId::HqScaler)), 0);
        let output = filter
            .configure_output(&InputLink::new(32, 32, PixelFormat::P010))
            .unwrap();
        assert_eq!(output.sw_format, PixelFormat::P010);
    }
}
