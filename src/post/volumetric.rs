//! Volumetric light shafts marched through a spot light's shadow map.

use glam::Mat4;

use crate::buffer::ColorBuffer;
use crate::entity::SpotLight;
use crate::error::Result;
use crate::gpu::GpuContext;
use crate::material::shadow_bias_matrix;
use crate::shade::{ParamValue, UniformKind};
use crate::shader_lib::SHADOW_WGSL;

use super::filter::{FilterSource, ScreenFilter};
use super::{PostContext, ScreenEffect};

const MARCH: &str = r#"
fn scatterHG(cosAngle: f32, g: f32) -> f32 {
    let g2 = g * g;
    return (1.0 - g2) / (4.0 * 3.14159265 * pow(1.0 + g2 - 2.0 * g * cosAngle, 1.5));
}

fn screen(uv: vec2f) -> vec4f {
    let color = textureSampleLevel(tex0, smp, uv, 0.0);
    let viewPosition = textureSampleLevel(tex1, smpn, uv, 0.0);

    // background pixels carry no position to march toward
    if (viewPosition.w == 0.0) {
        return color;
    }
    let camera = params.viewInverse[3].xyz;
    let surface = (params.viewInverse * vec4f(viewPosition.xyz, 1.0)).xyz;

    let span = surface - camera;
    let stride = span / 32.0;
    var scattered = 0.0;
    for (var i = 0; i < 32; i += 1) {
        let p = camera + stride * (f32(i) + 0.5);

        let toLight = params.lightPosition - p;
        let cone = dot(normalize(-toLight), params.lightDirection);
        if (cone < params.outerCos) {
            continue;
        }

        var shadowed = 1.0;
        let proj = params.shadowMatrix * vec4f(p, 1.0);
        if (proj.w > 0.0) {
            let coord = proj.xyz / proj.w;
            if (coord.x >= 0.0 && coord.x <= 1.0 &&
                coord.y >= 0.0 && coord.y <= 1.0) {
                let moments = textureSampleLevel(tex2, smp, coord.xy, 0.0).xy;
                shadowed = chebyshevUpperBound(moments, coord.z);
            }
        }

        let toCamera = normalize(camera - p);
        let phase = scatterHG(dot(-normalize(toLight), toCamera), params.g);
        let falloff = 1.0 / max(dot(toLight, toLight), 1.0);
        scattered += shadowed * phase * falloff;
    }
    let fog = scattered * params.density * length(span) / 32.0;
    return vec4f(color.rgb + params.lightColor.rgb * params.lightColor.a * fog, color.a);
}
"#;

/// Marches from the camera toward each visible surface, accumulating
/// in-scattering inside the spot cone where the moment map says the light
/// gets through.
pub struct VolumetricLights {
    filter: ScreenFilter,
}

impl VolumetricLights {
    pub fn new(gpu: &GpuContext) -> Self {
        let body = format!("{SHADOW_WGSL}\n{MARCH}");
        let mut filter = ScreenFilter::new(
            gpu,
            FilterSource::new("Volumetric Lights", body)
                .param("density", UniformKind::F32)
                .param("g", UniformKind::F32)
                .param("lightColor", UniformKind::Vec4)
                .param("lightDirection", UniformKind::Vec3)
                .param("lightPosition", UniformKind::Vec3)
                .param("outerCos", UniformKind::F32)
                .param("shadowMatrix", UniformKind::Mat4)
                .param("viewInverse", UniformKind::Mat4)
                .input(true)
                .input(false)
                .input(true),
        );
        filter.set("density", ParamValue::F32(0.05));
        filter.set("g", ParamValue::F32(0.9));
        filter.set("lightColor", ParamValue::Vec4(glam::Vec4::ONE));
        filter.set("lightDirection", ParamValue::Vec3(-glam::Vec3::Y));
        filter.set("lightPosition", ParamValue::Vec3(glam::Vec3::ZERO));
        filter.set("outerCos", ParamValue::F32(50f32.to_radians().cos()));
        filter.set("shadowMatrix", ParamValue::Mat4(Mat4::IDENTITY));
        filter.set("viewInverse", ParamValue::Mat4(Mat4::IDENTITY));
        Self { filter }
    }

    /// Point the march at a concrete spot light.
    pub fn configure(&mut self, light: &SpotLight, world: Mat4) {
        self.filter.set(
            "lightPosition",
            ParamValue::Vec3(world.w_axis.truncate()),
        );
        self.filter.set(
            "lightDirection",
            ParamValue::Vec3((-world.z_axis.truncate()).normalize()),
        );
        self.filter
            .set("lightColor", ParamValue::Vec4(light.color));
        self.filter.set(
            "outerCos",
            ParamValue::F32(light.outer_angle.to_radians().cos()),
        );
        let shadow = shadow_bias_matrix() * light.projection() * world.inverse();
        self.filter.set("shadowMatrix", ParamValue::Mat4(shadow));
    }
}

impl ScreenEffect for VolumetricLights {
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
            .set("viewInverse", ParamValue::Mat4(context.view.inverse()));
    }
}
