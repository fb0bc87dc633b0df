//! Combiners that merge the lit buffers with occlusion, bloom and
//! reflections.

use crate::gpu::GpuContext;
use crate::shade::{ParamValue, UniformKind};

use super::filter::{FilterSource, ScreenFilter};

const POST_COMBINER: &str = r#"
fn screen(uv: vec2f) -> vec4f {
    let lit = textureSampleLevel(tex0, smp, uv, 0.0);
    let emissive = textureSampleLevel(tex1, smp, uv, 0.0);
    let occlusion = textureSampleLevel(tex2, smp, uv, 0.0).r;
    let baked = textureSampleLevel(tex3, smp, uv, 0.0).r;
    let bloom = textureSampleLevel(tex4, smp, uv, 0.0);
    let color = lit.rgb * occlusion * baked + emissive.rgb + bloom.rgb;
    return vec4f(color, 1.0);
}
"#;

/// Lit color times both occlusion terms, plus emission and bloom.
///
/// Inputs: lit diffuse+specular, emissive, screen-space occlusion, baked
/// occlusion, bloom.
pub fn post_combiner(gpu: &GpuContext) -> ScreenFilter {
    ScreenFilter::new(
        gpu,
        FilterSource::new("Post Combiner", POST_COMBINER)
            .input(true)
            .input(true)
            .input(true)
            .input(true)
            .input(true),
    )
}

const SSLR_COMBINER: &str = r#"
fn screen(uv: vec2f) -> vec4f {
    let combined = textureSampleLevel(tex0, smp, uv, 0.0);
    let reflection = textureSampleLevel(tex1, smp, uv, 0.0);
    let mtl = textureSampleLevel(tex2, smp, uv, 0.0);
    let position = textureSampleLevel(tex3, smpn, uv, 0.0).xyz;
    let normal = normalize(textureSampleLevel(tex4, smp, uv, 0.0).xyz);
    let occlusion = textureSampleLevel(tex5, smp, uv, 0.0).r;

    let view = normalize(-position);
    let cosTheta = max(dot(normal, view), 0.0);
    let fresnel = 0.04 + 0.96 * pow(1.0 - cosTheta, 5.0);
    let strength = mix(0.04, 1.0, mtl.b) * fresnel * params.gain;

    let color = combined.rgb
        + reflection.rgb * reflection.a * strength * occlusion;
    return vec4f(color, 1.0);
}
"#;

/// Adds the reflection buffer on top of the combined image, weighted by
/// fresnel and metalness.
pub fn sslr_combiner(gpu: &GpuContext) -> ScreenFilter {
    let mut filter = ScreenFilter::new(
        gpu,
        FilterSource::new("SSLR Combiner", SSLR_COMBINER)
            .param("gain", UniformKind::F32)
            .input(true)
            .input(true)
            .input(true)
            .input(false)
            .input(true)
            .input(true),
    );
    filter.set("gain", ParamValue::F32(1.0));
    filter
}
