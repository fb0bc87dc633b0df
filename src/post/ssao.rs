//! Screen-space ambient occlusion over the view-space position and
//! normal buffers.

use glam::{Mat4, Vec4};

use crate::buffer::ColorBuffer;
use crate::error::Result;
use crate::gpu::GpuContext;
use crate::shade::{ParamValue, UniformKind};

use super::filter::{FilterSource, ScreenFilter};
use super::{PostContext, ScreenEffect};

pub const SSAO_SAMPLE_COUNT: usize = 64;

const SSAO: &str = r#"
fn hash(p: vec2f) -> f32 {
    return fract(sin(dot(p, vec2f(12.9898, 78.233))) * 43758.5453);
}

fn screen(uv: vec2f) -> vec4f {
    let position = textureSampleLevel(tex0, smpn, uv, 0.0).xyz;
    let normal = normalize(textureSampleLevel(tex1, smp, uv, 0.0).xyz);

    // random rotation around the normal, per pixel
    let angle = hash(uv) * 6.2831853;
    let ca = cos(angle);
    let sa = sin(angle);

    var occlusion = 0.0;
    for (var i = 0; i < 64; i += 1) {
        var s = params.samples[i].xyz;
        s = vec3f(s.x * ca - s.y * sa, s.x * sa + s.y * ca, s.z);
        if (dot(s, normal) < 0.0) {
            s = -s;
        }
        let samplePosition = position + s * params.radius;

        var offset = params.projection * vec4f(samplePosition, 1.0);
        let ndc = offset.xy / offset.w;
        let sampleUv = vec2f(ndc.x * 0.5 + 0.5, 0.5 - ndc.y * 0.5);

        let sampleDepth = textureSampleLevel(tex0, smpn, sampleUv, 0.0).z;
        let rangeCheck = smoothstep(
            0.0, 1.0, params.radius / abs(position.z - sampleDepth));
        if (sampleDepth >= samplePosition.z + 0.025) {
            occlusion += rangeCheck;
        }
    }
    let ao = 1.0 - occlusion / 64.0;
    return vec4f(ao, ao, ao, 1.0);
}
"#;

/// Deterministic hemisphere sample kernel, denser near the origin.
pub fn ssao_sample_points() -> Vec<Vec4> {
    let mut state = 0x2545f491u32;
    let mut next = move || {
        // xorshift, plenty for a fixed kernel
        state ^= state << 13;
        state ^= state >> 17;
        state ^= state << 5;
        state as f32 / u32::MAX as f32
    };
    let mut points = Vec::with_capacity(SSAO_SAMPLE_COUNT);
    while points.len() < SSAO_SAMPLE_COUNT {
        let candidate = glam::Vec3::new(
            next() * 2.0 - 1.0,
            next() * 2.0 - 1.0,
            next() * 2.0 - 1.0,
        );
        if candidate.length_squared() > 1.0 || candidate.length_squared() < 1e-6 {
            continue;
        }
        let t = points.len() as f32 / SSAO_SAMPLE_COUNT as f32;
        let scale = 0.1 + 0.9 * t * t;
        points.push((candidate.normalize() * next().max(0.1) * scale).extend(0.0));
    }
    points
}

/// Half-resolution occlusion estimate, blurred back up by
/// [`super::blur::occlusion_blur`].
pub struct Ssao {
    filter: ScreenFilter,
}

impl Ssao {
    pub fn new(gpu: &GpuContext) -> Self {
        let mut filter = ScreenFilter::new(
            gpu,
            FilterSource::new("SSAO", SSAO)
                .param("projection", UniformKind::Mat4)
                .param("radius", UniformKind::F32)
                .param("samples", UniformKind::Vec4Array(SSAO_SAMPLE_COUNT))
                .input(false)
                .input(true),
        );
        filter.set("radius", ParamValue::F32(1.0));
        filter.set("samples", ParamValue::Vec4Array(ssao_sample_points()));
        filter.set("projection", ParamValue::Mat4(Mat4::IDENTITY));
        Self { filter }
    }
}

impl ScreenEffect for Ssao {
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kernel_is_deterministic() {
        assert_eq!(ssao_sample_points(), ssao_sample_points());
    }

    #[test]
    fn kernel_stays_inside_the_unit_sphere() {
        let points = ssao_sample_points();
        assert_eq!(points.len(), SSAO_SAMPLE_COUNT);
        for p in &points {
            assert!(p.truncate().length() <= 1.0 + 1e-6);
            assert_eq!(p.w, 0.0);
        }
    }

    #[test]
    fn kernel_grows_toward_the_tail() {
        let points = ssao_sample_points();
        let head: f32 = points[..8].iter().map(|p| p.truncate().length()).sum();
        let tail: f32 = points[56..].iter().map(|p| p.truncate().length()).sum();
        assert!(tail > head);
    }
}
