//! Bloom ladder: threshold-free downscale, per-octave blur, dithered
//! upscale.

use crate::gpu::GpuContext;
use crate::shade::{ParamValue, UniformKind};

use super::filter::{FilterSource, ScreenFilter};

const DOWNSCALE: &str = r#"
fn screen(uv: vec2f) -> vec4f {
    let texel = 1.0 / vec2f(textureDimensions(tex0));
    let a = textureSampleLevel(tex0, smp, uv + vec2f(-0.5, -0.5) * texel, 0.0);
    let b = textureSampleLevel(tex0, smp, uv + vec2f(0.5, -0.5) * texel, 0.0);
    let c = textureSampleLevel(tex0, smp, uv + vec2f(-0.5, 0.5) * texel, 0.0);
    let d = textureSampleLevel(tex0, smp, uv + vec2f(0.5, 0.5) * texel, 0.0);
    return (a + b + c + d) * 0.25;
}
"#;

/// Half-resolution 4-tap downsample feeding the first bloom octave.
pub fn bloom_downscale(gpu: &GpuContext) -> ScreenFilter {
    ScreenFilter::new(
        gpu,
        FilterSource::new("Bloom Downscale", DOWNSCALE).input(true),
    )
}

const COMBINE: &str = r#"
fn screen(uv: vec2f) -> vec4f {
    let base = textureSampleLevel(tex0, smp, uv, 0.0);
    let bloom = textureSampleLevel(tex1, smp, uv, 0.0);
    return vec4f(base.rgb + bloom.rgb * params.gain + params.bias.rgb, base.a);
}
"#;

/// Adds the assembled bloom back onto a source image. The preset chain
/// folds bloom in through the post combiner instead; this is for hand-built
/// chains without one.
pub fn bloom_combine(gpu: &GpuContext) -> ScreenFilter {
    let mut filter = ScreenFilter::new(
        gpu,
        FilterSource::new("Bloom Combine", COMBINE)
            .param("gain", UniformKind::F32)
            .param("bias", UniformKind::Vec4)
            .input(true)
            .input(true),
    );
    filter.set("gain", ParamValue::F32(1.0));
    filter.set("bias", ParamValue::Vec4(glam::Vec4::new(0.0, 0.0, 0.0, 0.0)));
    filter
}

const UPSCALE: &str = r#"
fn hash(p: vec2f) -> f32 {
    return fract(sin(dot(p, vec2f(12.9898, 78.233))) * 43758.5453);
}

fn screen(uv: vec2f) -> vec4f {
    var sum = vec3f(0.0);
    sum += textureSampleLevel(tex0, smp, uv, 0.0).rgb * pow(params.shape, 0.0);
    sum += textureSampleLevel(tex1, smp, uv, 0.0).rgb * pow(params.shape, 1.0);
    sum += textureSampleLevel(tex2, smp, uv, 0.0).rgb * pow(params.shape, 2.0);
    sum += textureSampleLevel(tex3, smp, uv, 0.0).rgb * pow(params.shape, 3.0);
    sum += textureSampleLevel(tex4, smp, uv, 0.0).rgb * pow(params.shape, 4.0);
    sum += textureSampleLevel(tex5, smp, uv, 0.0).rgb * pow(params.shape, 5.0);
    // cheap dither so the wide gradients do not band
    let noise = (hash(uv * (params.seed + 1.0)) - 0.5) * 0.02;
    return vec4f(sum * params.gain + vec3f(noise * params.gain), 1.0);
}
"#;

/// Sums the six blurred octaves back to full resolution with a per-octave
/// shape falloff and a little dither.
pub fn bloom_upscale(gpu: &GpuContext) -> ScreenFilter {
    let mut filter = ScreenFilter::new(
        gpu,
        FilterSource::new("Bloom Upscale", UPSCALE)
            .param("gain", UniformKind::F32)
            .param("seed", UniformKind::F32)
            .param("shape", UniformKind::F32)
            .input(true)
            .input(true)
            .input(true)
            .input(true)
            .input(true)
            .input(true),
    );
    filter.set("gain", ParamValue::F32(0.5));
    filter.set("shape", ParamValue::F32(1.0));
    filter.set("seed", ParamValue::F32(0.0));
    filter
}
