//! Depth of field: circle-of-confusion estimation and a hexagonal
//! bokeh blur.

use std::f32::consts::PI;

use glam::Vec2;

use crate::buffer::ColorBuffer;
use crate::error::{RenderError, Result};
use crate::gpu::GpuContext;
use crate::shade::{ParamValue, UniformKind};

use super::filter::{FilterSource, ScreenFilter};
use super::{PostContext, ScreenEffect};

const POSITION_TO_COC: &str = r#"
fn screen(uv: vec2f) -> vec4f {
    let color = textureSampleLevel(tex0, smp, uv, 0.0);
    let position = textureSampleLevel(tex1, smpn, uv, 0.0).xyz;

    // lateral chromatic aberration: red and blue sampled at radially
    // shifted positions, blended in toward the frame edge
    let centered = uv - vec2f(0.5);
    let radius = length(centered);
    var rgb = color.rgb * params.exposure;
    if (radius > 0.0001) {
        let texel = 1.0 / vec2f(textureDimensions(tex0));
        let shift = (centered / radius) * texel
            * (params.aberrationConstant + params.aberrationLinear * radius);
        let fringed = vec3f(
            textureSampleLevel(tex0, smp, uv - shift, 0.0).r,
            color.g,
            textureSampleLevel(tex0, smp, uv + shift, 0.0).b,
        ) * params.exposure;
        let blend = clamp(
            params.aberrationBlendConstant + params.aberrationBlendLinear * radius,
            0.0, 1.0);
        rgb = mix(rgb, fringed, blend);
    }

    let distance = -position.z;
    let coc = abs(distance - params.focalPlane) / max(distance, 0.001)
        * params.aperture * params.maxCoc;
    let clamped = clamp(coc, params.minCoc, params.maxCoc);
    return vec4f(rgb, clamped);
}
"#;

/// Writes the per-pixel blur radius, in pixels, into the alpha channel,
/// applying exposure and lateral chromatic aberration on the way.
pub fn position_to_coc(gpu: &GpuContext) -> ScreenFilter {
    let mut filter = ScreenFilter::new(
        gpu,
        FilterSource::new("Position To CoC", POSITION_TO_COC)
            .param("aberrationBlendConstant", UniformKind::F32)
            .param("aberrationBlendLinear", UniformKind::F32)
            .param("aberrationConstant", UniformKind::F32)
            .param("aberrationLinear", UniformKind::F32)
            .param("aperture", UniformKind::F32)
            .param("exposure", UniformKind::F32)
            .param("focalPlane", UniformKind::F32)
            .param("maxCoc", UniformKind::F32)
            .param("minCoc", UniformKind::F32)
            .input(true)
            .input(false),
    );
    filter.set("aberrationBlendConstant", ParamValue::F32(1.0));
    filter.set("aberrationBlendLinear", ParamValue::F32(1.0));
    filter.set("aberrationConstant", ParamValue::F32(1.0));
    filter.set("aberrationLinear", ParamValue::F32(8.0));
    filter.set("aperture", ParamValue::F32(1.0));
    filter.set("exposure", ParamValue::F32(1.0));
    filter.set("focalPlane", ParamValue::F32(4.0));
    filter.set("maxCoc", ParamValue::F32(20.0));
    filter.set("minCoc", ParamValue::F32(2.0));
    filter
}

const HEX_BLUR: &str = r#"
fn blurAlong(uv: vec2f, direction: vec2f, coc: f32) -> vec4f {
    let texel = 1.0 / vec2f(textureDimensions(tex0));
    var sum = vec4f(0.0);
    for (var i = 0; i < params.samples; i += 1) {
        let t = f32(i) / f32(params.samples - 1);
        let offset = direction * texel * coc * t;
        sum += textureSampleLevel(tex0, smp, uv + offset, 0.0);
    }
    return sum / f32(params.samples);
}

fn screen(uv: vec2f) -> vec4f {
    let center = textureSampleLevel(tex0, smp, uv, 0.0);
    let coc = center.a;
    let a = blurAlong(uv, params.direction0, coc);
    if (params.dual == 0) {
        return vec4f(a.rgb, coc);
    }
    let b = blurAlong(uv, params.direction1, coc);
    return vec4f(min(a.rgb, b.rgb), coc);
}
"#;

/// Two-pass hexagonal bokeh driven by the alpha-channel blur radius.
///
/// The first pass smears vertically into an internal buffer, the second
/// smears along the two remaining hexagon axes and keeps the per-channel
/// minimum, which carves the hexagonal highlight shape.
pub struct HexDof {
    filter: ScreenFilter,
    temp: Option<ColorBuffer>,
}

impl HexDof {
    pub fn new(gpu: &GpuContext) -> Self {
        let mut filter = ScreenFilter::new(
            gpu,
            FilterSource::new("Hex DoF", HEX_BLUR)
                .param("direction0", UniformKind::Vec2)
                .param("direction1", UniformKind::Vec2)
                .param("dual", UniformKind::I32)
                .param("samples", UniformKind::I32)
                .input(true),
        );
        filter.set("samples", ParamValue::I32(20));
        filter.set("direction0", ParamValue::Vec2(Vec2::Y));
        filter.set("direction1", ParamValue::Vec2(Vec2::Y));
        filter.set("dual", ParamValue::I32(0));
        Self { filter, temp: None }
    }

    fn direction(angle: f32) -> Vec2 {
        Vec2::new(angle.cos(), angle.sin())
    }
}

impl ScreenEffect for HexDof {
    fn apply(
        &mut self,
        gpu: &GpuContext,
        encoder: &mut wgpu::CommandEncoder,
        inputs: &[&ColorBuffer],
        output: &ColorBuffer,
    ) -> Result<()> {
        let source = *inputs
            .first()
            .ok_or(RenderError::MissingFilterInput("hex depth of field"))?;
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
                "Hex DoF Temp",
            )
        });

        self.filter.set(
            "direction0",
            ParamValue::Vec2(Self::direction(PI / 2.0)),
        );
        self.filter.set("dual", ParamValue::I32(0));
        self.filter.apply(gpu, encoder, &[source], temp)?;

        self.filter.set(
            "direction0",
            ParamValue::Vec2(Self::direction(-PI / 6.0)),
        );
        self.filter.set(
            "direction1",
            ParamValue::Vec2(Self::direction(-5.0 * PI / 6.0)),
        );
        self.filter.set("dual", ParamValue::I32(1));
        self.filter.apply(gpu, encoder, &[temp], output)
    }

    fn set_param(&mut self, name: &str, value: ParamValue) {
        self.filter.set(name, value);
    }

    fn prepare(&mut self, _context: &PostContext) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn coc_pass_shifts_red_and_blue_apart() {
        // red samples against the radial shift, blue along it
        assert!(POSITION_TO_COC.contains("uv - shift, 0.0).r"));
        assert!(POSITION_TO_COC.contains("uv + shift, 0.0).b"));
        assert!(POSITION_TO_COC.contains("params.aberrationConstant"));
        assert!(POSITION_TO_COC.contains("params.aberrationBlendLinear"));
    }

    #[test]
    fn coc_pass_applies_exposure_before_bokeh() {
        assert!(POSITION_TO_COC.contains("params.exposure"));
    }
}
