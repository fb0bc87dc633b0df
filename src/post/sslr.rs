//! Screen-space local reflections marched against the view-space
//! position buffer, fetched from the blurred color pyramid.

use glam::Mat4;

use crate::buffer::ColorBuffer;
use crate::error::Result;
use crate::gpu::GpuContext;
use crate::shade::{ParamValue, UniformKind};

use super::filter::{FilterSource, ScreenFilter};
use super::{PostContext, ScreenEffect};

const SSLR: &str = r#"
fn screen(uv: vec2f) -> vec4f {
    let position = textureSampleLevel(tex1, smpn, uv, 0.0).xyz;
    let normal = normalize(textureSampleLevel(tex2, smp, uv, 0.0).xyz);
    let mtl = textureSampleLevel(tex3, smp, uv, 0.0);

    if (position.z >= 0.0) {
        return vec4f(0.0);
    }

    let view = normalize(position);
    let reflected = normalize(reflect(view, normal));
    let stride = params.distanceLimit / f32(params.iterationLimit);

    var hitUv = vec2f(-1.0);
    var marched = position;
    for (var i = 0; i < params.iterationLimit; i += 1) {
        marched += reflected * stride;
        var clip = params.projection * vec4f(marched, 1.0);
        if (clip.w <= 0.0) {
            break;
        }
        let ndc = clip.xy / clip.w;
        let sampleUv = vec2f(ndc.x * 0.5 + 0.5, 0.5 - ndc.y * 0.5);
        if (sampleUv.x < 0.0 || sampleUv.x > 1.0 ||
            sampleUv.y < 0.0 || sampleUv.y > 1.0) {
            break;
        }
        let sceneZ = textureSampleLevel(tex1, smpn, sampleUv, 0.0).z;
        if (sceneZ > marched.z && sceneZ - marched.z < stride * 2.0) {
            hitUv = sampleUv;
            break;
        }
    }
    if (hitUv.x < 0.0) {
        return vec4f(0.0);
    }

    // fade toward the screen border where the pyramid has no data
    let resolution = vec2f(textureDimensions(tex1));
    let border = min(
        min(hitUv.x, 1.0 - hitUv.x) * resolution.x,
        min(hitUv.y, 1.0 - hitUv.y) * resolution.y);
    let edge = clamp(border / params.borderWidth, 0.0, 1.0);

    let level = mtl.g * 5.0;
    let color = textureSampleLevel(tex0, smp, hitUv, level);
    return vec4f(color.rgb * params.gain * edge, edge);
}
"#;

/// Mirror-to-glossy reflections; roughness selects the pyramid level.
pub struct Sslr {
    filter: ScreenFilter,
}

impl Sslr {
    pub fn new(gpu: &GpuContext) -> Self {
        let mut filter = ScreenFilter::new(
            gpu,
            FilterSource::new("SSLR", SSLR)
                .param("borderWidth", UniformKind::F32)
                .param("distanceLimit", UniformKind::F32)
                .param("gain", UniformKind::F32)
                .param("iterationLimit", UniformKind::I32)
                .param("projection", UniformKind::Mat4)
                .input(true)
                .input(false)
                .input(true)
                .input(true),
        );
        filter.set("borderWidth", ParamValue::F32(130.0));
        filter.set("distanceLimit", ParamValue::F32(64.0));
        filter.set("gain", ParamValue::F32(1.0));
        filter.set("iterationLimit", ParamValue::I32(128));
        filter.set("projection", ParamValue::Mat4(Mat4::IDENTITY));
        Self { filter }
    }
}

impl ScreenEffect for Sslr {
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
            .set("projection", ParamValue::Mat4(context.projection));
    }
}
