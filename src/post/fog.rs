//! Distance fog applied from the view-space position buffer.

use crate::gpu::GpuContext;
use crate::shade::{ParamValue, UniformKind};

use super::filter::{FilterSource, ScreenFilter};

const EXPONENTIAL_FOG: &str = r#"
fn screen(uv: vec2f) -> vec4f {
    let color = textureSampleLevel(tex0, smp, uv, 0.0);
    let position = textureSampleLevel(tex1, smpn, uv, 0.0).xyz;
    let distance = length(position);
    let factor = 1.0 - exp(-pow(params.density * distance, params.power));
    return vec4f(mix(color.rgb, params.fogColor.rgb, factor * params.fogColor.a), color.a);
}
"#;

/// Exponential fog; density and power shape the falloff curve.
pub fn exponential_fog(gpu: &GpuContext) -> ScreenFilter {
    let mut filter = ScreenFilter::new(
        gpu,
        FilterSource::new("Exponential Fog", EXPONENTIAL_FOG)
            .param("density", UniformKind::F32)
            .param("fogColor", UniformKind::Vec4)
            .param("power", UniformKind::F32)
            .input(true)
            .input(false),
    );
    filter.set("density", ParamValue::F32(0.01));
    filter.set("power", ParamValue::F32(1.0));
    filter.set("fogColor", ParamValue::Vec4(glam::Vec4::new(1.0, 1.0, 1.0, 1.0)));
    filter
}

const LINEAR_FOG: &str = r#"
fn screen(uv: vec2f) -> vec4f {
    let color = textureSampleLevel(tex0, smp, uv, 0.0);
    let position = textureSampleLevel(tex1, smpn, uv, 0.0).xyz;
    let distance = length(position);
    let factor = clamp((distance - params.start) / (params.end - params.start), 0.0, 1.0);
    return vec4f(mix(color.rgb, params.fogColor.rgb, factor * params.fogColor.a), color.a);
}
"#;

/// Linear fog ramping between two distances.
pub fn linear_fog(gpu: &GpuContext) -> ScreenFilter {
    let mut filter = ScreenFilter::new(
        gpu,
        FilterSource::new("Linear Fog", LINEAR_FOG)
            .param("end", UniformKind::F32)
            .param("fogColor", UniformKind::Vec4)
            .param("start", UniformKind::F32)
            .input(true)
            .input(false),
    );
    filter.set("start", ParamValue::F32(50.0));
    filter.set("end", ParamValue::F32(150.0));
    filter.set("fogColor", ParamValue::Vec4(glam::Vec4::new(1.0, 1.0, 1.0, 1.0)));
    filter
}
