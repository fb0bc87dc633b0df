//! Fast approximate antialiasing over the tone-mapped image.

use crate::gpu::GpuContext;
use crate::shade::{ParamValue, UniformKind};

use super::filter::{FilterSource, ScreenFilter};

const FXAA: &str = r#"
fn luma(c: vec3f) -> f32 {
    return dot(c, vec3f(0.299, 0.587, 0.114));
}

fn screen(uv: vec2f) -> vec4f {
    let texel = 1.0 / vec2f(textureDimensions(tex0));

    let rgbNW = textureSampleLevel(tex0, smp, uv + vec2f(-1.0, -1.0) * texel, 0.0).rgb;
    let rgbNE = textureSampleLevel(tex0, smp, uv + vec2f(1.0, -1.0) * texel, 0.0).rgb;
    let rgbSW = textureSampleLevel(tex0, smp, uv + vec2f(-1.0, 1.0) * texel, 0.0).rgb;
    let rgbSE = textureSampleLevel(tex0, smp, uv + vec2f(1.0, 1.0) * texel, 0.0).rgb;
    let rgbM = textureSampleLevel(tex0, smp, uv, 0.0);

    let lumaNW = luma(rgbNW);
    let lumaNE = luma(rgbNE);
    let lumaSW = luma(rgbSW);
    let lumaSE = luma(rgbSE);
    let lumaM = luma(rgbM.rgb);
    let lumaMin = min(lumaM, min(min(lumaNW, lumaNE), min(lumaSW, lumaSE)));
    let lumaMax = max(lumaM, max(max(lumaNW, lumaNE), max(lumaSW, lumaSE)));

    if (lumaMax - lumaMin < lumaMax * params.lumaThreshold) {
        return rgbM;
    }

    var dir = vec2f(
        -((lumaNW + lumaNE) - (lumaSW + lumaSE)),
        ((lumaNW + lumaSW) - (lumaNE + lumaSE)));
    let dirReduce = max(
        (lumaNW + lumaNE + lumaSW + lumaSE) * 0.25 * 0.125, 1.0 / 128.0);
    let rcpDirMin = 1.0 / (min(abs(dir.x), abs(dir.y)) + dirReduce);
    dir = clamp(dir * rcpDirMin,
        vec2f(-params.maxSpan), vec2f(params.maxSpan)) * texel;

    let rgbA = 0.5 * (
        textureSampleLevel(tex0, smp, uv + dir * (1.0 / 3.0 - 0.5), 0.0).rgb +
        textureSampleLevel(tex0, smp, uv + dir * (2.0 / 3.0 - 0.5), 0.0).rgb);
    let rgbB = rgbA * 0.5 + 0.25 * (
        textureSampleLevel(tex0, smp, uv + dir * -0.5, 0.0).rgb +
        textureSampleLevel(tex0, smp, uv + dir * 0.5, 0.0).rgb);
    let lumaB = luma(rgbB);
    if (lumaB < lumaMin || lumaB > lumaMax) {
        return vec4f(rgbA, rgbM.a);
    }
    return vec4f(rgbB, rgbM.a);
}
"#;

pub fn fxaa(gpu: &GpuContext) -> ScreenFilter {
    let mut filter = ScreenFilter::new(
        gpu,
        FilterSource::new("FXAA", FXAA)
            .param("lumaThreshold", UniformKind::F32)
            .param("maxSpan", UniformKind::F32)
            .input(true),
    );
    filter.set("lumaThreshold", ParamValue::F32(0.5));
    filter.set("maxSpan", ParamValue::F32(8.0));
    filter
}
