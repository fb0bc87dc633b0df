//! Facets, facet combiners and render passes.
//!
//! A *facet* is one intermediate value the generated fragment shader can
//! produce (world position, view normal, diffuse light, ...). A *facet
//! combiner* folds one or more facets into a named color output, and a
//! [`RenderPass`] is an ordered list of combiners that all render from the
//! same geometry into one multi-target pass. The combiner's name doubles
//! as the key under which its buffer is published to the post chain.

use crate::buffer::{ColorBuffer, DepthBuffer};
use crate::gpu::GpuContext;

/// Intermediate values a fragment shader can compute.
///
/// Each facet has the WGSL identifier the generated shader stores it in;
/// material facets (`m_*`) come straight from the material, `f_*` facets
/// are derived per fragment.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FacetType {
    WorldPosition,
    WorldNormal,
    ViewPosition,
    ViewNormal,
    ClipPosition,
    Specular,
    Diffuse,
    Emission,
    AmbientOcclusion,
    Color,
}

impl FacetType {
    /// The WGSL variable holding this facet's value.
    pub fn shader_name(&self) -> &'static str {
        match self {
            FacetType::WorldPosition => "f_worldPosition",
            FacetType::WorldNormal => "f_worldNormal",
            FacetType::ViewPosition => "f_viewPosition",
            FacetType::ViewNormal => "f_viewNormal",
            FacetType::ClipPosition => "f_clipPosition",
            FacetType::Specular => "f_specular",
            FacetType::Diffuse => "f_diffuse",
            FacetType::Emission => "f_emission",
            FacetType::AmbientOcclusion => "f_ambientOcclusion",
            FacetType::Color => "m_color",
        }
    }
}

/// A named shader output folding facets into one color attachment.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FacetCombiner {
    /// VSM depth moments, for variance shadow passes.
    Moments,
    /// Summed diffuse and specular light.
    DiffuseSpecular,
    /// Summed diffuse and specular light with material alpha.
    DiffuseSpecularAlpha,
    /// Material ambient occlusion factor.
    AmbientOcclusion,
    /// Packed material properties: metalness in red, roughness in green.
    Material,
    /// Unlit material base color.
    BaseColor,
    Diffuse,
    Specular,
    Emissive,
    /// Emission with alpha blending, for transparent passes.
    EmissiveAlpha,
    /// World-space position.
    Position,
    /// World-space normal.
    Normal,
    ViewPosition,
    ViewNormal,
    ClipPosition,
    /// Fully shaded, fogged and gamma-compressed color.
    LdrColor,
}

impl FacetCombiner {
    /// Buffer name this combiner's output is published under, also its
    /// output variable suffix in the generated shader.
    pub fn name(&self) -> &'static str {
        match self {
            FacetCombiner::Moments => "moments",
            FacetCombiner::DiffuseSpecular => "diffuseSpecular",
            FacetCombiner::DiffuseSpecularAlpha => "diffuseSpecular",
            FacetCombiner::AmbientOcclusion => "ambientOcclusion",
            FacetCombiner::Material => "material",
            FacetCombiner::BaseColor => "baseColor",
            FacetCombiner::Diffuse => "diffuse",
            FacetCombiner::Specular => "specular",
            FacetCombiner::Emissive => "emissive",
            FacetCombiner::EmissiveAlpha => "emissive",
            FacetCombiner::Position => "position",
            FacetCombiner::Normal => "normal",
            FacetCombiner::ViewPosition => "viewPosition",
            FacetCombiner::ViewNormal => "viewNormal",
            FacetCombiner::ClipPosition => "clipPosition",
            FacetCombiner::LdrColor => "color",
        }
    }

    /// Facets this combiner consumes.
    pub fn facets(&self) -> &'static [FacetType] {
        match self {
            FacetCombiner::Moments => &[FacetType::ClipPosition],
            FacetCombiner::DiffuseSpecular => &[FacetType::Diffuse, FacetType::Specular],
            FacetCombiner::DiffuseSpecularAlpha => {
                &[FacetType::Diffuse, FacetType::Specular, FacetType::Color]
            }
            FacetCombiner::AmbientOcclusion => &[FacetType::AmbientOcclusion],
            FacetCombiner::Material => &[],
            FacetCombiner::BaseColor => &[FacetType::Color],
            FacetCombiner::Diffuse => &[FacetType::Diffuse],
            FacetCombiner::Specular => &[FacetType::Specular],
            FacetCombiner::Emissive => &[FacetType::Emission],
            FacetCombiner::EmissiveAlpha => &[FacetType::Emission, FacetType::Color],
            FacetCombiner::Position => &[FacetType::WorldPosition],
            FacetCombiner::Normal => &[FacetType::WorldNormal],
            FacetCombiner::ViewPosition => &[FacetType::ViewPosition],
            FacetCombiner::ViewNormal => &[FacetType::ViewNormal],
            FacetCombiner::ClipPosition => &[FacetType::ClipPosition],
            FacetCombiner::LdrColor => &[
                FacetType::Diffuse,
                FacetType::Specular,
                FacetType::Emission,
                FacetType::ViewPosition,
                FacetType::Color,
            ],
        }
    }

    /// Texture format of the buffer backing this combiner.
    pub fn format(&self) -> wgpu::TextureFormat {
        match self {
            FacetCombiner::Moments => wgpu::TextureFormat::Rg16Float,
            FacetCombiner::DiffuseSpecular
            | FacetCombiner::DiffuseSpecularAlpha
            | FacetCombiner::AmbientOcclusion
            | FacetCombiner::Diffuse
            | FacetCombiner::Specular
            | FacetCombiner::Emissive
            | FacetCombiner::EmissiveAlpha
            | FacetCombiner::Normal
            | FacetCombiner::ViewNormal => wgpu::TextureFormat::Rgba16Float,
            FacetCombiner::Material | FacetCombiner::BaseColor | FacetCombiner::LdrColor => {
                wgpu::TextureFormat::Rgba8Unorm
            }
            FacetCombiner::Position
            | FacetCombiner::ViewPosition
            | FacetCombiner::ClipPosition => wgpu::TextureFormat::Rgba32Float,
        }
    }

    /// Blend state for this combiner's attachment.
    pub fn blend(&self) -> wgpu::BlendState {
        match self {
            FacetCombiner::DiffuseSpecularAlpha | FacetCombiner::EmissiveAlpha => {
                wgpu::BlendState::ALPHA_BLENDING
            }
            _ => wgpu::BlendState::REPLACE,
        }
    }

    /// WGSL statement assigning the combiner's output variable.
    ///
    /// The generated fragment shader declares `var o_<name> = vec4f(0.0)`
    /// for every combiner before the epilogues run.
    pub fn epilogue(&self) -> String {
        let name = self.name();
        match self {
            FacetCombiner::Moments => format!(
                "{{\n    let depth = f_clipPosition.z / f_clipPosition.w;\n    \
                 let dx = dpdx(depth);\n    let dy = dpdy(depth);\n    \
                 o_{name} = vec4f(depth, depth * depth + 0.25 * (dx * dx + dy * dy), 0.0, 1.0);\n}}"
            ),
            FacetCombiner::DiffuseSpecular => {
                format!("o_{name} = vec4f(f_diffuse + f_specular, 1.0);")
            }
            FacetCombiner::DiffuseSpecularAlpha => {
                format!("o_{name} = vec4f(f_diffuse + f_specular, m_color.a);")
            }
            FacetCombiner::AmbientOcclusion => {
                format!("o_{name} = vec4f(vec3f(f_ambientOcclusion), 1.0);")
            }
            FacetCombiner::Material => {
                format!("o_{name} = vec4f(m_metalness, m_roughness, 0.0, 1.0);")
            }
            FacetCombiner::BaseColor => format!("o_{name} = vec4f(m_color.rgb, 1.0);"),
            FacetCombiner::Diffuse => format!("o_{name} = vec4f(f_diffuse, 1.0);"),
            FacetCombiner::Specular => format!("o_{name} = vec4f(f_specular, 1.0);"),
            FacetCombiner::Emissive => format!("o_{name} = vec4f(f_emission, 1.0);"),
            FacetCombiner::EmissiveAlpha => format!("o_{name} = vec4f(f_emission, m_color.a);"),
            FacetCombiner::Position => format!("o_{name} = vec4f(f_worldPosition, 1.0);"),
            FacetCombiner::Normal => format!("o_{name} = vec4f(f_worldNormal, 1.0);"),
            FacetCombiner::ViewPosition => format!("o_{name} = vec4f(f_viewPosition, 1.0);"),
            FacetCombiner::ViewNormal => format!("o_{name} = vec4f(f_viewNormal, 1.0);"),
            FacetCombiner::ClipPosition => format!("o_{name} = f_clipPosition;"),
            FacetCombiner::LdrColor => format!(
                "{{\n    let shaded = f_diffuse + f_specular + f_emission;\n    \
                 let dz = min(1.0, -f_viewPosition.z / p_fogEnd);\n    \
                 let fogged = mix(shaded, p_fogColor.rgb, dz * p_fogColor.a);\n    \
                 o_{name} = vec4f(pow(fogged, vec3f(1.0 / 2.2)), m_color.a);\n}}"
            ),
        }
    }
}

/// An ordered set of combiners rendered together from the same geometry.
#[derive(Clone, Debug)]
pub struct RenderPass {
    pub combiners: Vec<FacetCombiner>,
    pub render_opaque: bool,
    pub render_transparent: bool,
}

impl RenderPass {
    pub fn new(combiners: Vec<FacetCombiner>) -> Self {
        Self {
            combiners,
            render_opaque: true,
            render_transparent: false,
        }
    }

    /// Forward pass producing a single fogged, gamma-compressed color.
    pub fn default_pass() -> Self {
        Self::new(vec![FacetCombiner::LdrColor])
    }

    /// Depth-only pass for simple and PCF shadow maps.
    pub fn light_pass() -> Self {
        Self::new(vec![])
    }

    /// Depth-moment pass for variance shadow maps.
    pub fn vsm_light_pass() -> Self {
        Self::new(vec![FacetCombiner::Moments])
    }

    /// G-buffer pass feeding the photographic post chain.
    pub fn deferred_pass() -> Self {
        Self::new(vec![
            FacetCombiner::DiffuseSpecular,
            FacetCombiner::Emissive,
            FacetCombiner::Material,
            FacetCombiner::AmbientOcclusion,
            FacetCombiner::ViewPosition,
            FacetCombiner::ViewNormal,
        ])
    }

    /// Transparent variant of the same pass: alpha-blending combiners,
    /// opaque geometry skipped.
    pub fn transparent(mut self) -> Self {
        self.render_opaque = false;
        self.render_transparent = true;
        for combiner in &mut self.combiners {
            *combiner = match *combiner {
                FacetCombiner::DiffuseSpecular => FacetCombiner::DiffuseSpecularAlpha,
                FacetCombiner::Emissive => FacetCombiner::EmissiveAlpha,
                other => other,
            };
        }
        self
    }

    /// Whether any combiner consumes lit facets; passes that do not can
    /// skip light uniforms and shadow sampling entirely.
    pub fn needs_light(&self) -> bool {
        self.combiners.iter().any(|c| {
            c.facets()
                .iter()
                .any(|f| matches!(f, FacetType::Diffuse | FacetType::Specular))
        })
    }

    /// Union of facets every combiner needs, deduplicated, in a stable
    /// order so generated shaders are deterministic.
    pub fn required_facets(&self) -> Vec<FacetType> {
        let mut facets: Vec<FacetType> = self
            .combiners
            .iter()
            .flat_map(|c| c.facets().iter().copied())
            .collect();
        facets.sort();
        facets.dedup();
        facets
    }
}

/// The attachments backing one render pass: a color buffer per combiner
/// plus a shared depth buffer.
pub struct PassTarget {
    /// `(buffer name, buffer)` in combiner order.
    pub color: Vec<(String, ColorBuffer)>,
    pub depth: DepthBuffer,
}

impl PassTarget {
    /// Allocate attachments for `pass` at the given resolution.
    pub fn new(
        gpu: &GpuContext,
        pass: &RenderPass,
        width: u32,
        height: u32,
        depth_format: wgpu::TextureFormat,
    ) -> Self {
        let color = pass
            .combiners
            .iter()
            .map(|combiner| {
                let buffer =
                    ColorBuffer::new(gpu, width, height, combiner.format(), 1, combiner.name());
                (combiner.name().to_string(), buffer)
            })
            .collect();
        let depth = DepthBuffer::new(gpu, width, height, depth_format, "Pass Depth");
        Self { color, depth }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_pass_needs_light_but_light_passes_do_not() {
        assert!(RenderPass::default_pass().needs_light());
        assert!(RenderPass::deferred_pass().needs_light());
        assert!(!RenderPass::light_pass().needs_light());
        assert!(!RenderPass::vsm_light_pass().needs_light());
    }

    #[test]
    fn deferred_pass_publishes_the_gbuffer_names() {
        let names: Vec<&str> = RenderPass::deferred_pass()
            .combiners
            .iter()
            .map(|c| c.name())
            .collect();
        assert_eq!(
            names,
            vec![
                "diffuseSpecular",
                "emissive",
                "material",
                "ambientOcclusion",
                "viewPosition",
                "viewNormal"
            ]
        );
    }

    #[test]
    fn transparent_pass_swaps_in_blending_combiners() {
        let pass = RenderPass::deferred_pass().transparent();
        assert!(!pass.render_opaque);
        assert!(pass.render_transparent);
        assert!(pass.combiners.contains(&FacetCombiner::DiffuseSpecularAlpha));
        assert!(pass.combiners.contains(&FacetCombiner::EmissiveAlpha));
        // alpha variants keep the same buffer names
        assert_eq!(FacetCombiner::DiffuseSpecularAlpha.name(), "diffuseSpecular");
        assert_eq!(FacetCombiner::EmissiveAlpha.name(), "emissive");
    }

    #[test]
    fn required_facets_are_deduplicated() {
        let pass = RenderPass::new(vec![
            FacetCombiner::DiffuseSpecular,
            FacetCombiner::Diffuse,
            FacetCombiner::LdrColor,
        ]);
        let facets = pass.required_facets();
        let diffuse = facets
            .iter()
            .filter(|f| **f == FacetType::Diffuse)
            .count();
        assert_eq!(diffuse, 1);
        assert!(facets.contains(&FacetType::Specular));
        assert!(facets.contains(&FacetType::Emission));
    }

    #[test]
    fn epilogues_write_their_own_output() {
        for combiner in [
            FacetCombiner::Moments,
            FacetCombiner::DiffuseSpecular,
            FacetCombiner::Material,
            FacetCombiner::LdrColor,
            FacetCombiner::ViewPosition,
        ] {
            let epilogue = combiner.epilogue();
            assert!(
                epilogue.contains(&format!("o_{}", combiner.name())),
                "epilogue for {combiner:?} must assign o_{}",
                combiner.name()
            );
        }
    }

    #[test]
    fn position_buffers_use_full_float_formats() {
        assert_eq!(
            FacetCombiner::ViewPosition.format(),
            wgpu::TextureFormat::Rgba32Float
        );
        assert_eq!(
            FacetCombiner::LdrColor.format(),
            wgpu::TextureFormat::Rgba8Unorm
        );
        assert_eq!(FacetCombiner::Moments.format(), wgpu::TextureFormat::Rg16Float);
    }
}
