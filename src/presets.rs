//! Ready-made renderer configurations.
//!
//! [`photographic_renderer`] assembles the full deferred pipeline: G-buffer
//! pass, bloom ladder, ambient occlusion, screen-space reflections against
//! a pre-blurred pyramid, fog, depth of field, grain, tonemapping and
//! antialiasing. The returned renderer presents the `"aa"` buffer; every
//! intermediate buffer stays addressable by name for debugging.

use crate::buffer::ColorBuffer;
use crate::facet::RenderPass;
use crate::gpu::GpuContext;
use crate::post::bloom::{bloom_downscale, bloom_upscale};
use crate::post::blur::occlusion_blur;
use crate::post::combine::{post_combiner, sslr_combiner};
use crate::post::dof::{HexDof, position_to_coc};
use crate::post::fog::exponential_fog;
use crate::post::fxaa::fxaa;
use crate::post::grain::FilmGrain;
use crate::post::ssao::Ssao;
use crate::post::sslr::Sslr;
use crate::post::tonemap::tonemap_uncharted2;
use crate::post::volumetric::VolumetricLights;
use crate::post::{FilterStep, PostStep, ScreenEffect};
use crate::renderer::SceneRenderer;
use crate::shade::ParamValue;

/// Reflection pyramid depth; SSLR picks its blur octave from these mips.
const PYRAMID_LEVELS: u32 = 6;

/// Camera-style knobs for [`photographic_renderer`].
#[derive(Clone, Copy, Debug)]
pub struct PhotographicParameters {
    /// CoC scale for the depth-of-field pass.
    pub aperture: f32,
    /// Distance that stays in focus, in view units.
    pub focal_plane: f32,
    /// Pre-tonemap exposure multiplier.
    pub exposure_bias: f32,
    /// Exposure applied in the circle-of-confusion pass, before bokeh.
    pub exposure: f32,
    /// Chromatic aberration shift in pixels, at the frame center.
    pub aberration_constant: f32,
    /// Chromatic aberration shift gain over distance from the center.
    pub aberration_linear: f32,
    /// Base blend of the aberrated color into the image.
    pub aberration_blend_constant: f32,
    /// Blend gain over distance from the center.
    pub aberration_blend_linear: f32,
    /// Film grain strength.
    pub grain: f32,
    /// Exponential fog density.
    pub fog_density: f32,
    /// Ambient occlusion sampling radius.
    pub ssao_radius: f32,
    /// March light shafts through the first light's moment map. Requires
    /// a variance-shadowed spot light in slot 0.
    pub volumetric: bool,
}

impl Default for PhotographicParameters {
    fn default() -> Self {
        Self {
            aperture: 1.0,
            focal_plane: 4.0,
            exposure_bias: 16.0,
            exposure: 1.0,
            aberration_constant: 0.0,
            aberration_linear: 0.0,
            aberration_blend_constant: 0.0,
            aberration_blend_linear: 0.0,
            grain: 0.05,
            fog_density: 0.01,
            ssao_radius: 1.0,
            volumetric: false,
        }
    }
}

/// A deferred renderer with the full post chain wired up.
pub fn photographic_renderer(gpu: &GpuContext, params: PhotographicParameters) -> SceneRenderer {
    let mut renderer = SceneRenderer::with_pass(gpu, RenderPass::deferred_pass(), "aa");
    let steps = &mut renderer.post_steps;

    // bloom ladder from the emissive buffer
    steps.push(PostStep::Filter(
        FilterStep::new(bloom_downscale(gpu), &["emissive"], "bloom-1").scaled(0.5),
    ));
    for i in 2..=PYRAMID_LEVELS {
        let previous = format!("bloom-{}", i - 1);
        steps.push(PostStep::Filter(
            FilterStep::new(
                bloom_downscale(gpu),
                &[previous.as_str()],
                format!("bloom-{i}"),
            )
            .scaled(0.5f32.powi(i as i32)),
        ));
    }
    steps.push(PostStep::Filter(FilterStep::new(
        bloom_upscale(gpu),
        &["bloom-1", "bloom-2", "bloom-3", "bloom-4", "bloom-5", "bloom-6"],
        "bloom",
    )));

    let mut ssao = Ssao::new(gpu);
    ssao.set_param("radius", ParamValue::F32(params.ssao_radius));
    steps.push(PostStep::Filter(
        FilterStep::new(ssao, &["viewPosition", "viewNormal"], "ssao")
            .scaled(0.5)
            .format(wgpu::TextureFormat::R16Float),
    ));
    steps.push(PostStep::Filter(
        FilterStep::new(occlusion_blur(gpu), &["ssao"], "ssao-4x")
            .format(wgpu::TextureFormat::R16Float),
    ));

    steps.push(PostStep::Filter(FilterStep::new(
        post_combiner(gpu),
        &["diffuseSpecular", "emissive", "ssao-4x", "ambientOcclusion", "bloom"],
        "combined",
    )));

    // pre-blurred octaves packed into one texture for glossy reflections
    for i in 1..PYRAMID_LEVELS {
        let input = if i == 1 {
            "combined".to_string()
        } else {
            format!("combined-{}", i - 1)
        };
        steps.push(PostStep::Filter(
            FilterStep::new(bloom_downscale(gpu), &[input.as_str()], format!("combined-{i}"))
                .scaled(0.5f32.powi(i as i32)),
        ));
    }
    let mut pyramid_inputs = vec!["combined".to_string()];
    for level in 1..PYRAMID_LEVELS {
        pyramid_inputs.push(format!("combined-{level}"));
    }
    steps.push(PostStep::Function {
        inputs: pyramid_inputs,
        output: "pyramid".into(),
        scale: 1.0,
        run: Box::new(|env| {
            let width = env.context.width;
            let height = env.context.height;
            if let Ok(existing) = env.buffers.get("pyramid") {
                if existing.width() != width || existing.height() != height {
                    env.buffers.remove("pyramid");
                }
            }
            env.buffers.get_or_insert_with("pyramid", || {
                ColorBuffer::new(
                    env.gpu,
                    width,
                    height,
                    wgpu::TextureFormat::Rgba16Float,
                    PYRAMID_LEVELS,
                    "pyramid",
                )
            });
            let pyramid = env.buffers.get("pyramid")?;
            env.buffers.get("combined")?.copy_to(env.encoder, pyramid, 0, 0);
            for level in 1..PYRAMID_LEVELS {
                let octave = env.buffers.get(&format!("combined-{level}"))?;
                octave.copy_to(env.encoder, pyramid, 0, level);
            }
            Ok(())
        }),
    });

    steps.push(PostStep::Filter(FilterStep::new(
        Sslr::new(gpu),
        &["pyramid", "viewPosition", "viewNormal", "material"],
        "reflection",
    )));
    steps.push(PostStep::Filter(FilterStep::new(
        sslr_combiner(gpu),
        &[
            "combined",
            "reflection",
            "material",
            "viewPosition",
            "viewNormal",
            "ssao-4x",
        ],
        "reflection-combined",
    )));

    let mut fog = exponential_fog(gpu);
    fog.set("density", ParamValue::F32(params.fog_density));
    steps.push(PostStep::Filter(FilterStep::new(
        fog,
        &["reflection-combined", "viewPosition"],
        "fog",
    )));
    if params.volumetric {
        steps.push(PostStep::Filter(FilterStep::new(
            VolumetricLights::new(gpu),
            &["fog", "viewPosition", "moments0"],
            "fog",
        )));
    }

    let mut coc = position_to_coc(gpu);
    coc.set("aperture", ParamValue::F32(params.aperture));
    coc.set("focalPlane", ParamValue::F32(params.focal_plane));
    coc.set("exposure", ParamValue::F32(params.exposure));
    coc.set(
        "aberrationConstant",
        ParamValue::F32(params.aberration_constant),
    );
    coc.set(
        "aberrationLinear",
        ParamValue::F32(params.aberration_linear),
    );
    coc.set(
        "aberrationBlendConstant",
        ParamValue::F32(params.aberration_blend_constant),
    );
    coc.set(
        "aberrationBlendLinear",
        ParamValue::F32(params.aberration_blend_linear),
    );
    steps.push(PostStep::Filter(FilterStep::new(
        coc,
        &["fog", "viewPosition"],
        "cocImage",
    )));
    steps.push(PostStep::Filter(FilterStep::new(
        HexDof::new(gpu),
        &["cocImage"],
        "dof",
    )));

    let mut grain = FilmGrain::new(gpu);
    grain.set_param("gain", ParamValue::F32(params.grain));
    steps.push(PostStep::Filter(FilterStep::new(grain, &["dof"], "dof")));

    let mut tonemap = tonemap_uncharted2(gpu);
    tonemap.set("exposureBias", ParamValue::F32(params.exposure_bias));
    steps.push(PostStep::Filter(
        FilterStep::new(tonemap, &["dof"], "ldr").format(wgpu::TextureFormat::Rgba8Unorm),
    ));
    steps.push(PostStep::Filter(
        FilterStep::new(fxaa(gpu), &["ldr"], "aa").format(wgpu::TextureFormat::Rgba8Unorm),
    ));

    renderer
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_focus_a_few_units_out() {
        let params = PhotographicParameters::default();
        assert_eq!(params.focal_plane, 4.0);
        assert_eq!(params.aperture, 1.0);
        assert!(!params.volumetric);
    }

    #[test]
    fn aberration_is_off_by_default() {
        let params = PhotographicParameters::default();
        assert_eq!(params.aberration_constant, 0.0);
        assert_eq!(params.aberration_linear, 0.0);
        assert_eq!(params.aberration_blend_constant, 0.0);
        assert_eq!(params.aberration_blend_linear, 0.0);
        assert_eq!(params.exposure, 1.0);
    }

    // Every buffer a step reads must come from an earlier step, an
    // output-pass combiner or the shadow pass, or the frame fails with
    // MissingBuffer.
    #[test]
    fn chain_reads_only_buffers_produced_earlier() {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::PRIMARY,
            ..Default::default()
        });
        let adapter = pollster::block_on(
            instance.request_adapter(&wgpu::RequestAdapterOptions::default()),
        );
        if adapter.is_err() {
            // machines without a GPU adapter can't build the filters
            return;
        }

        let gpu = GpuContext::headless(64, 64);
        for volumetric in [false, true] {
            let renderer = photographic_renderer(
                &gpu,
                PhotographicParameters {
                    volumetric,
                    ..Default::default()
                },
            );

            let mut produced: Vec<String> = renderer
                .output_pass
                .combiners
                .iter()
                .map(|c| c.name().to_string())
                .collect();
            // the shadow pass publishes moment maps before the chain runs
            produced.push("moments0".into());

            for step in &renderer.post_steps {
                for input in step.input_names() {
                    assert!(
                        produced.contains(input),
                        "step '{}' reads '{}' before anything produces it",
                        step.output_name(),
                        input
                    );
                }
                produced.push(step.output_name().to_string());
            }
            assert!(produced.contains(&renderer.output_name));
        }
    }
}
