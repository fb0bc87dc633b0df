//! Animated film grain, strongest in the shadows.

use crate::buffer::ColorBuffer;
use crate::error::Result;
use crate::gpu::GpuContext;
use crate::shade::{ParamValue, UniformKind};

use super::filter::{FilterSource, ScreenFilter};
use super::{PostContext, ScreenEffect};

const GRAIN: &str = r#"
fn hash(p: vec3f) -> f32 {
    return fract(sin(dot(p, vec3f(12.9898, 78.233, 37.719))) * 43758.5453);
}

fn screen(uv: vec2f) -> vec4f {
    let color = textureSampleLevel(tex0, smp, uv, 0.0);
    let luma = dot(color.rgb, vec3f(0.299, 0.587, 0.114));
    let noise = hash(vec3f(uv, fract(params.time * 0.0173))) - 0.5;
    let weight = params.gain * (1.0 - clamp(luma, 0.0, 1.0));
    return vec4f(color.rgb + vec3f(noise * weight), color.a);
}
"#;

/// Per-frame noise weighted toward dark pixels; the frame counter drives
/// the animation.
pub struct FilmGrain {
    filter: ScreenFilter,
}

impl FilmGrain {
    pub fn new(gpu: &GpuContext) -> Self {
        let mut filter = ScreenFilter::new(
            gpu,
            FilterSource::new("Film Grain", GRAIN)
                .param("gain", UniformKind::F32)
                .param("time", UniformKind::F32)
                .input(true),
        );
        filter.set("gain", ParamValue::F32(0.05));
        filter.set("time", ParamValue::F32(0.0));
        Self { filter }
    }
}

impl ScreenEffect for FilmGrain {
    fn apply(
        &mut self,
        gpu: &GpuContext,
        encoder: &mut wgpu::CommandEncoder,
        inputs: &[&ColorBuffer],
        output: &ColorBuffer,
    ) -> Result<()> {
        self.filter.apply(gpu, encoder, inputs, output)
    }

    fn set_param(&mut self, name: &str, value: ParamValue) {
        self.filter.set(name, value);
    }

    fn prepare(&mut self, context: &PostContext) {
        self.filter
            .set("time", ParamValue::F32(context.frame as f32));
    }
}
