//! Gaussian-family blurs.

use crate::buffer::ColorBuffer;
use crate::error::{RenderError, Result};
use crate::gpu::GpuContext;
use crate::shade::{ParamValue, UniformKind};

use super::filter::{FilterSource, ScreenFilter};
use super::{PostContext, ScreenEffect};

const DIRECTIONAL_BLUR: &str = r#"
fn screen(uv: vec2f) -> vec4f {
    let texel = 1.0 / vec2f(textureDimensions(tex0));
    var sum = vec4f(0.0);
    var weight = 0.0;
    for (var i = -params.window; i <= params.window; i += 1) {
        let w = exp(-f32(i * i) / (2.0 * params.sigma * params.sigma));
        let offset = params.direction * texel * f32(i) * params.spread;
        sum += textureSampleLevel(tex0, smp, uv + offset, 0.0) * w;
        weight += w;
    }
    return (sum / weight) * params.gain;
}
"#;

/// Separable approximate Gaussian blur.
///
/// Runs a horizontal pass into an internal buffer and a vertical pass into
/// the output; gain is applied once, on the second pass. The same instance
/// serves the shadow-moment blur and the bloom octaves.
pub struct ApproximateGaussianBlur {
    filter: ScreenFilter,
    gain: f32,
    temp: Option<ColorBuffer>,
}

impl ApproximateGaussianBlur {
    pub fn new(gpu: &GpuContext) -> Self {
        let mut filter = ScreenFilter::new(
            gpu,
            FilterSource::new("Approximate Gaussian Blur", DIRECTIONAL_BLUR)
                .param("direction", UniformKind::Vec2)
                .param("gain", UniformKind::F32)
                .param("sigma", UniformKind::F32)
                .param("spread", UniformKind::F32)
                .param("window", UniformKind::I32)
                .input(true),
        );
        filter.set("window", ParamValue::I32(9));
        filter.set("sigma", ParamValue::F32(3.0));
        filter.set("spread", ParamValue::F32(1.0));
        Self {
            filter,
            gain: 1.0,
            temp: None,
        }
    }
}

impl ScreenEffect for ApproximateGaussianBlur {
    fn apply(
        &mut self,
        gpu: &GpuContext,
        encoder: &mut wgpu::CommandEncoder,
        inputs: &[&ColorBuffer],
        output: &ColorBuffer,
    ) -> Result<()> {
        let source = *inputs
            .first()
            .ok_or(RenderError::MissingFilterInput("approximate gaussian blur"))?;
        let stale = match &self.temp {
            Some(t) => {
                t.width() != output.width()
                    || t.height() != output.height()
                    || t.format != output.format
            }
            None => true,
        };
        if stale {
            self.temp = None;
        }
        let temp = self.temp.get_or_insert_with(|| {
            ColorBuffer::new(
                gpu,
                output.width(),
                output.height(),
                output.format,
                1,
                "Blur Temp",
            )
        });
        // the horizontal pass is unweighted; gain rides on the second pass
        self.filter
            .set("direction", ParamValue::Vec2(glam::Vec2::new(1.0, 0.0)));
        self.filter.set("gain", ParamValue::F32(1.0));
        self.filter.apply(gpu, encoder, &[source], temp)?;

        self.filter
            .set("direction", ParamValue::Vec2(glam::Vec2::new(0.0, 1.0)));
        self.filter.set("gain", ParamValue::F32(self.gain));
        self.filter.apply(gpu, encoder, &[temp], output)
    }

    fn set_param(&mut self, name: &str, value: ParamValue) {
        if name == "gain" {
            if let ParamValue::F32(v) = value {
                self.gain = v;
            }
            return;
        }
        self.filter.set(name, value);
    }

    fn prepare(&mut self, _context: &PostContext) {}
}

const OCCLUSION_BLUR: &str = r#"
fn screen(uv: vec2f) -> vec4f {
    let texel = 1.0 / vec2f(textureDimensions(tex0));
    var sum = vec4f(0.0);
    for (var x = -1; x <= 2; x += 1) {
        for (var y = -1; y <= 2; y += 1) {
            let offset = vec2f(f32(x) - 0.5, f32(y) - 0.5) * texel;
            sum += textureSampleLevel(tex0, smp, uv + offset, 0.0);
        }
    }
    return sum / 16.0;
}
"#;

/// Box blur used when upscaling the half-resolution occlusion buffer, to
/// hide the sampling noise.
pub fn occlusion_blur(gpu: &GpuContext) -> ScreenFilter {
    ScreenFilter::new(
        gpu,
        FilterSource::new("Occlusion Blur", OCCLUSION_BLUR).input(true),
    )
}
