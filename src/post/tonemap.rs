//! HDR to LDR tone mapping operators.

use crate::gpu::GpuContext;
use crate::shade::{ParamValue, UniformKind};

use super::filter::{FilterSource, ScreenFilter};

const UNCHARTED2: &str = r#"
fn curve(x: vec3f) -> vec3f {
    let A = 0.15;
    let B = 0.50;
    let C = 0.10;
    let D = 0.20;
    let E = 0.02;
    let F = 0.30;
    return ((x * (A * x + C * B) + D * E) / (x * (A * x + B) + D * F)) - E / F;
}

fn screen(uv: vec2f) -> vec4f {
    let color = textureSampleLevel(tex0, smp, uv, 0.0);
    let exposed = curve(color.rgb * params.exposureBias);
    let whiteScale = 1.0 / curve(vec3f(11.2));
    let mapped = exposed * whiteScale;
    return vec4f(pow(mapped, vec3f(1.0 / 2.2)), color.a);
}
"#;

/// Filmic operator with a fixed white point of 11.2.
pub fn tonemap_uncharted2(gpu: &GpuContext) -> ScreenFilter {
    let mut filter = ScreenFilter::new(
        gpu,
        FilterSource::new("Tonemap Uncharted2", UNCHARTED2)
            .param("exposureBias", UniformKind::F32)
            .input(true),
    );
    filter.set("exposureBias", ParamValue::F32(16.0));
    filter
}

const ACES: &str = r#"
fn screen(uv: vec2f) -> vec4f {
    let color = textureSampleLevel(tex0, smp, uv, 0.0);
    let x = color.rgb * params.exposure;
    let mapped = clamp(
        (x * (2.51 * x + 0.03)) / (x * (2.43 * x + 0.59) + 0.14),
        vec3f(0.0), vec3f(1.0));
    return vec4f(pow(mapped, vec3f(1.0 / 2.2)), color.a);
}
"#;

/// Narkowicz's ACES fit.
pub fn tonemap_aces(gpu: &GpuContext) -> ScreenFilter {
    let mut filter = ScreenFilter::new(
        gpu,
        FilterSource::new("Tonemap ACES", ACES)
            .param("exposure", UniformKind::F32)
            .input(true),
    );
    filter.set("exposure", ParamValue::F32(1.0));
    filter
}
