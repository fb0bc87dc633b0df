//! Materials and shader generation.
//!
//! A [`Material`] turns a [`MaterialContext`] (which pass is being drawn,
//! which lights are in the scene, whether fog or an environment probe is
//! active) into a [`ShadeStyle`]. The context is also the cache key:
//! materials memoize generated styles so adding a light regenerates
//! shaders exactly once per distinct context shape.
//!
//! [`PbrMaterial`] is the standard implementation: metallic-roughness
//! shading with a canonical BRDF per light type, optional textures with
//! several mapping modes, shadow sampling and environment reflection.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use glam::{Mat4, Vec2, Vec3, Vec4};

use crate::entity::{AreaLight, Light, Shadows};
use crate::facet::FacetCombiner;
use crate::shade::{ParamValue, ShadeStyle, UniformKind};
use crate::shader_lib::{BRDF_WGSL, LTC_WGSL, SHADOW_WGSL};

/// Everything about the surrounding frame that influences shader
/// generation for one draw. Two draws with equal contexts share pipelines.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct MaterialContext {
    /// Output combiners of the pass, in attachment order.
    pub combiners: Vec<FacetCombiner>,
    /// Structural description of every light, in scene order.
    pub lights: Vec<LightSlot>,
    /// A fog volume is present in the scene.
    pub fog: bool,
    /// An environment cubemap is bound for reflections.
    pub environment: bool,
    /// Geometry carries per-instance transforms.
    pub instanced: bool,
    /// Ray-march source for screen-space entities, `None` for rasterized
    /// geometry.
    pub march_source: Option<String>,
}

impl MaterialContext {
    /// Whether any combiner consumes lit facets.
    pub fn needs_light(&self) -> bool {
        self.combiners.iter().any(|c| {
            c.facets().iter().any(|f| {
                matches!(
                    f,
                    crate::facet::FacetType::Diffuse | crate::facet::FacetType::Specular
                )
            })
        })
    }

    fn has_ldr(&self) -> bool {
        self.combiners.contains(&FacetCombiner::LdrColor)
    }
}

/// The shape of one light as seen by shader generation. Carries only what
/// changes the generated code; positions and colors are plain parameters.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LightSlot {
    Ambient,
    Point,
    Directional { shadows: ShadowSlot },
    Spot { shadows: ShadowSlot },
    Area { shadows: ShadowSlot },
    Hemisphere { irradiance: bool },
}

/// Shadow technique shape for a [`LightSlot`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ShadowSlot {
    None,
    Simple,
    Pcf { sample_count: u32 },
    Vsm,
}

impl ShadowSlot {
    pub fn of(shadows: Shadows) -> Self {
        match shadows {
            Shadows::None => ShadowSlot::None,
            Shadows::Simple { .. } => ShadowSlot::Simple,
            Shadows::Pcf { sample_count, .. } => ShadowSlot::Pcf {
                // the generated tap loop indexes the fixed Poisson disk
                sample_count: sample_count.min(12),
            },
            Shadows::Vsm { .. } => ShadowSlot::Vsm,
        }
    }
}

impl LightSlot {
    pub fn of(light: &Light) -> Self {
        match light {
            Light::Ambient(_) => LightSlot::Ambient,
            Light::Point(_) => LightSlot::Point,
            Light::Directional(l) => LightSlot::Directional {
                shadows: ShadowSlot::of(l.shadows),
            },
            Light::Spot(l) => LightSlot::Spot {
                shadows: ShadowSlot::of(l.shadows),
            },
            Light::Area(l) => LightSlot::Area {
                shadows: ShadowSlot::of(l.shadows),
            },
            Light::Hemisphere(l) => LightSlot::Hemisphere {
                irradiance: l.irradiance.is_some(),
            },
        }
    }

    pub fn shadows(&self) -> ShadowSlot {
        match self {
            LightSlot::Directional { shadows }
            | LightSlot::Spot { shadows }
            | LightSlot::Area { shadows } => *shadows,
            _ => ShadowSlot::None,
        }
    }
}

/// A surface description that can generate and parameterize shaders.
pub trait Material: Send + Sync {
    /// Generate (or fetch from cache) the shade style for a context.
    fn shade_style(&self, context: &MaterialContext) -> Arc<ShadeStyle>;

    /// Fill in the values for the parameters this material declares.
    fn apply_parameters(&self, values: &mut HashMap<String, ParamValue>);

    /// Texture views to bind, by parameter name.
    fn textures(&self) -> Vec<(String, Arc<wgpu::TextureView>)>;

    /// Transparent materials render in transparent passes only.
    fn transparent(&self) -> bool {
        false
    }

    /// Double-sided surfaces disable back-face culling.
    fn double_sided(&self) -> bool {
        false
    }
}

/// How a material texture is sampled.
#[derive(Clone, Debug)]
pub enum TextureSource {
    /// Sample with the mesh's uv coordinates.
    ModelCoordinates,
    /// Blend three world-axis projections weighted by the normal.
    Triplanar {
        scale: f32,
        offset: Vec2,
        sharpness: f32,
    },
    /// Inline WGSL expression evaluating to `vec4f`; binds no texture.
    FromCode { code: String },
    /// Constant white, a placeholder while authoring.
    Dummy,
}

/// Which material property a texture feeds.
#[derive(Clone, Copy, Debug)]
pub enum TextureTarget {
    /// Sampled but not applied; the value is still available to later
    /// `FromCode` sources.
    None,
    Color,
    Roughness,
    Metalness,
    Emission,
    Normal,
    AmbientOcclusion,
    /// Vertex displacement along the normal.
    Height { scale: f32 },
}

/// One texture slot of a [`PbrMaterial`].
#[derive(Clone)]
pub struct MaterialTexture {
    pub source: TextureSource,
    pub target: TextureTarget,
    /// The texture to bind; `None` for `FromCode` and `Dummy` sources.
    pub view: Option<Arc<wgpu::TextureView>>,
}

impl MaterialTexture {
    fn binds_texture(&self) -> bool {
        !matches!(
            self.source,
            TextureSource::FromCode { .. } | TextureSource::Dummy
        )
    }
}

/// Metallic-roughness material.
pub struct PbrMaterial {
    pub color: Vec4,
    pub metalness: f32,
    pub roughness: f32,
    /// Emission color; alpha scales intensity.
    pub emission: Vec4,
    pub textures: Vec<MaterialTexture>,
    pub transparent: bool,
    pub double_sided: bool,
    cache: Mutex<HashMap<MaterialContext, Arc<ShadeStyle>>>,
}

impl Default for PbrMaterial {
    fn default() -> Self {
        Self::new()
    }
}

impl PbrMaterial {
    pub fn new() -> Self {
        Self {
            color: Vec4::ONE,
            metalness: 0.5,
            roughness: 1.0,
            emission: Vec4::new(0.0, 0.0, 0.0, 1.0),
            textures: Vec::new(),
            transparent: false,
            double_sided: false,
            cache: Mutex::new(HashMap::new()),
        }
    }

    fn generate(&self, context: &MaterialContext) -> ShadeStyle {
        let mut style = ShadeStyle::default();
        style.instanced = context.instanced;
        style.screen_space = context.march_source.is_some();
        style.outputs = context.combiners.iter().map(|c| c.name().into()).collect();
        style.outputs.dedup();

        style.param("color", UniformKind::Vec4);
        style.param("metalness", UniformKind::F32);
        style.param("roughness", UniformKind::F32);
        style.param("emission", UniformKind::Vec4);

        let needs_light = context.needs_light();
        let mut preamble = String::new();
        if needs_light {
            preamble.push_str(BRDF_WGSL);
            if context
                .lights
                .iter()
                .any(|l| l.shadows() != ShadowSlot::None)
            {
                preamble.push_str(SHADOW_WGSL);
            }
            if context
                .lights
                .iter()
                .any(|l| matches!(l, LightSlot::Area { .. }))
            {
                preamble.push_str(LTC_WGSL);
            }
        }
        if let Some(march) = &context.march_source {
            preamble.push_str(march);
        }
        style.fragment_preamble = preamble;

        let mut body = String::new();
        body.push_str("    m_color = p_color;\n");
        body.push_str("    m_metalness = p_metalness;\n");
        body.push_str("    m_roughness = p_roughness;\n");
        body.push_str("    m_emission = p_emission.rgb * p_emission.a;\n");

        if let Some(march) = &context.march_source {
            body.push_str(&self.march_body(march));
        } else {
            self.texture_code(&mut style, &mut body);
        }
        body.push_str("    f_emission = m_emission;\n");

        if needs_light {
            body.push_str(
                "    let cameraPosition = globals.view_inverse[3].xyz;\n    let N = f_worldNormal;\n    let V = normalize(cameraPosition - f_worldPosition);\n    let f0 = mix(vec3f(0.04), m_color.rgb, m_metalness);\n",
            );
            for (i, slot) in context.lights.iter().enumerate() {
                body.push_str(&self.light_code(&mut style, i, *slot));
            }
            if context.environment {
                style.param("environment", UniformKind::TextureCube);
                body.push_str(
                    "    {\n        let NoV = max(dot(N, V), 1e-4);\n        let r = reflect(-V, N);\n        let dfg = PrefilteredDFG_Karis(m_roughness, NoV);\n        let env = textureSampleLevel(t_environment, smp, r, m_roughness * 5.0);\n        f_specular += env.rgb * (f0 * dfg.x + vec3f(dfg.y));\n    }\n",
                );
            }
            body.push_str("    f_diffuse = f_diffuse * (1.0 - m_metalness);\n");
        }

        if context.has_ldr() {
            style.param("fogColor", UniformKind::Vec4);
            style.param("fogEnd", UniformKind::F32);
        }

        let mut written = std::collections::HashSet::new();
        for combiner in &context.combiners {
            // alpha variants share a name with their opaque counterpart
            if written.insert(combiner.name()) {
                body.push_str("    ");
                body.push_str(&combiner.epilogue());
                body.push('\n');
            }
        }

        style.fragment_body = body;
        style
    }

    fn march_body(&self, march: &str) -> String {
        let mut s = String::new();
        s.push_str(
            r#"    let ndc = vec2f(va_texCoord0.x * 2.0 - 1.0, 1.0 - va_texCoord0.y * 2.0);
    let nearH = globals.projection_inverse * vec4f(ndc, 0.0, 1.0);
    let farH = globals.projection_inverse * vec4f(ndc, 1.0, 1.0);
    let nearP = nearH.xyz / nearH.w;
    let farP = farH.xyz / farH.w;
    let rayOrigin = (globals.view_inverse * vec4f(nearP, 1.0)).xyz;
    let rayDirection = normalize((globals.view_inverse * vec4f(farP - nearP, 0.0)).xyz);
    let marchResult = march(rayOrigin, rayDirection);
    if (!marchResult.hit) {
        discard;
    }
    f_worldPosition = marchResult.position;
"#,
        );
        if march.contains("fn scene_distance") {
            s.push_str(
                r#"    let eps = 0.001;
    f_worldNormal = normalize(vec3f(
        scene_distance(marchResult.position + vec3f(eps, 0.0, 0.0)) - scene_distance(marchResult.position - vec3f(eps, 0.0, 0.0)),
        scene_distance(marchResult.position + vec3f(0.0, eps, 0.0)) - scene_distance(marchResult.position - vec3f(0.0, eps, 0.0)),
        scene_distance(marchResult.position + vec3f(0.0, 0.0, eps)) - scene_distance(marchResult.position - vec3f(0.0, 0.0, eps)),
    ));
"#,
            );
        } else {
            // density fields have no gradient; face the camera
            s.push_str("    f_worldNormal = -rayDirection;\n");
        }
        s.push_str(
            r#"    let hitView = globals.view * vec4f(marchResult.position, 1.0);
    f_viewPosition = hitView.xyz;
    f_viewNormal = (globals.view_normal * vec4f(f_worldNormal, 0.0)).xyz;
    let hitClip = globals.projection * hitView;
    f_clipPosition = hitClip;
    o_depth = hitClip.z / hitClip.w;
"#,
        );
        s
    }

    fn texture_code(&self, style: &mut ShadeStyle, body: &mut String) {
        for (i, texture) in self.textures.iter().enumerate() {
            let name = format!("texture{i}");
            if texture.binds_texture() {
                style.param(&name, UniformKind::Texture2d);
            }
            // Height displaces in the vertex stage and skips the fragment
            if let TextureTarget::Height { scale } = texture.target {
                style.vertex_transform.push_str(&format!(
                    "        position += normal * textureSampleLevel(t_{name}, smp, va_texCoord0, 0.0).r * {scale:?};\n"
                ));
                continue;
            }
            let fetch = match &texture.source {
                TextureSource::ModelCoordinates => {
                    format!("textureSample(t_{name}, smp, va_texCoord0)")
                }
                TextureSource::Triplanar { .. } => String::new(),
                TextureSource::FromCode { code } => format!("({code})"),
                TextureSource::Dummy => "vec4f(1.0)".to_string(),
            };
            match &texture.source {
                TextureSource::Triplanar {
                    scale,
                    offset,
                    sharpness,
                } => {
                    let ox = offset.x;
                    let oy = offset.y;
                    body.push_str(&format!(
                        r#"    {{
        let w = pow(abs(f_worldNormal), vec3f({sharpness:?}));
        let wsum = w.x + w.y + w.z;
        let uvx = f_worldPosition.zy * {scale:?} + vec2f({ox:?}, {oy:?});
        let uvy = f_worldPosition.xz * {scale:?} + vec2f({ox:?}, {oy:?});
        let uvz = f_worldPosition.xy * {scale:?} + vec2f({ox:?}, {oy:?});
"#
                    ));
                    if matches!(texture.target, TextureTarget::Normal) {
                        // whiteout blend normal reconstruction
                        body.push_str(&format!(
                            r#"        var tnx = textureSample(t_{name}, smp, uvx).rgb * 2.0 - 1.0;
        var tny = textureSample(t_{name}, smp, uvy).rgb * 2.0 - 1.0;
        var tnz = textureSample(t_{name}, smp, uvz).rgb * 2.0 - 1.0;
        tnx = vec3f(tnx.xy + f_worldNormal.zy, abs(tnx.z) * f_worldNormal.x);
        tny = vec3f(tny.xy + f_worldNormal.xz, abs(tny.z) * f_worldNormal.y);
        tnz = vec3f(tnz.xy + f_worldNormal.xy, abs(tnz.z) * f_worldNormal.z);
        f_worldNormal = normalize(tnx.zyx * w.x + tny.xzy * w.y + tnz.xyz * w.z);
    }}
"#
                        ));
                        continue;
                    }
                    body.push_str(&format!(
                        "        let tex{i} = (textureSample(t_{name}, smp, uvx) * w.x + textureSample(t_{name}, smp, uvy) * w.y + textureSample(t_{name}, smp, uvz) * w.z) / wsum;\n"
                    ));
                    body.push_str(&Self::target_code(i, texture.target));
                    body.push_str("    }\n");
                    continue;
                }
                _ => {}
            }
            body.push_str(&format!("    let tex{i} = {fetch};\n"));
            if matches!(texture.target, TextureTarget::Normal) {
                body.push_str(&format!(
                    "    f_worldNormal = perturbNormal(f_worldNormal, f_worldPosition, va_texCoord0, tex{i}.rgb * 2.0 - 1.0);\n"
                ));
                continue;
            }
            body.push_str(&Self::target_code(i, texture.target));
        }

        if self
            .textures
            .iter()
            .any(|t| matches!(t.target, TextureTarget::Normal))
            && self
                .textures
                .iter()
                .any(|t| !matches!(t.source, TextureSource::Triplanar { .. }))
        {
            style.fragment_preamble.push_str(PERTURB_NORMAL_WGSL);
        }
    }

    fn target_code(i: usize, target: TextureTarget) -> String {
        match target {
            TextureTarget::None | TextureTarget::Normal | TextureTarget::Height { .. } => {
                String::new()
            }
            TextureTarget::Color => {
                format!("    m_color = vec4f(m_color.rgb * tex{i}.rgb, m_color.a * tex{i}.a);\n")
            }
            TextureTarget::Roughness => format!("    m_roughness = m_roughness * tex{i}.r;\n"),
            TextureTarget::Metalness => format!("    m_metalness = m_metalness * tex{i}.r;\n"),
            TextureTarget::Emission => format!("    m_emission += tex{i}.rgb;\n"),
            TextureTarget::AmbientOcclusion => {
                format!("    f_ambientOcclusion = f_ambientOcclusion * tex{i}.r;\n")
            }
        }
    }

    fn light_code(&self, style: &mut ShadeStyle, i: usize, slot: LightSlot) -> String {
        style.param(format!("lightColor{i}"), UniformKind::Vec4);
        match slot {
            LightSlot::Ambient => {
                format!("    f_diffuse += p_lightColor{i}.rgb * m_color.rgb;\n")
            }
            LightSlot::Point => {
                style.param(format!("lightPosition{i}"), UniformKind::Vec3);
                style.param(format!("lightAttenuation{i}"), UniformKind::Vec3);
                format!(
                    r#"    {{
        let Lr = p_lightPosition{i} - f_worldPosition;
        let distance = length(Lr);
        let L = Lr / distance;
        let a = p_lightAttenuation{i};
        let attenuation = 1.0 / (a.x + a.y * distance + a.z * distance * distance);
        let NoL = saturate(dot(N, L));
        f_diffuse += m_color.rgb * p_lightColor{i}.rgb * NoL * attenuation / PI;
        f_specular += p_lightColor{i}.rgb * ggx(N, V, L, m_roughness, f0.x) * attenuation;
    }}
"#
                )
            }
            LightSlot::Directional { shadows } => {
                style.param(format!("lightDirection{i}"), UniformKind::Vec3);
                let shadow = self.shadow_code(style, i, shadows);
                format!(
                    r#"    {{
        let L = normalize(-p_lightDirection{i});
        var attenuation = 1.0;
{shadow}        let H = normalize(V + L);
        let NoL = saturate(dot(N, L));
        let NoH = saturate(dot(N, H));
        let NoV = max(dot(N, V), 1e-4);
        let LoH = saturate(dot(L, H));
        let D = D_GGX(m_roughness, NoH);
        let Vis = V_SmithGGXCorrelated(m_roughness, NoV, NoL);
        let F = F_Schlick3(f0, 1.0, LoH);
        f_diffuse += m_color.rgb * p_lightColor{i}.rgb * NoL * Fd_Burley(m_roughness, NoV, NoL, LoH) * attenuation;
        f_specular += p_lightColor{i}.rgb * (D * Vis) * F * NoL * attenuation;
    }}
"#
                )
            }
            LightSlot::Spot { shadows } => {
                style.param(format!("lightPosition{i}"), UniformKind::Vec3);
                style.param(format!("lightDirection{i}"), UniformKind::Vec3);
                style.param(format!("lightAttenuation{i}"), UniformKind::Vec3);
                style.param(format!("lightInnerCos{i}"), UniformKind::F32);
                style.param(format!("lightOuterCos{i}"), UniformKind::F32);
                let shadow = self.shadow_code(style, i, shadows);
                format!(
                    r#"    {{
        let Lr = p_lightPosition{i} - f_worldPosition;
        let distance = length(Lr);
        let L = Lr / distance;
        let hit = dot(-L, normalize(p_lightDirection{i}));
        let falloff = clamp((hit - p_lightOuterCos{i}) / (p_lightInnerCos{i} - p_lightOuterCos{i}), 0.0, 1.0);
        let a = p_lightAttenuation{i};
        var attenuation = falloff / (a.x + a.y * distance + a.z * distance * distance);
{shadow}        let H = normalize(V + L);
        let NoL = saturate(dot(N, L));
        let NoH = saturate(dot(N, H));
        let NoV = max(dot(N, V), 1e-4);
        let LoH = saturate(dot(L, H));
        let D = D_GGX(m_roughness, NoH);
        let Vis = V_SmithGGXCorrelated(m_roughness, NoV, NoL);
        let F = F_Schlick3(f0, 1.0, LoH);
        f_diffuse += m_color.rgb * p_lightColor{i}.rgb * NoL * Fd_Burley(m_roughness, NoV, NoL, LoH) * attenuation;
        f_specular += p_lightColor{i}.rgb * (D * Vis) * F * NoL * attenuation;
    }}
"#
                )
            }
            LightSlot::Area { shadows } => {
                style.param(format!("lightTransform{i}"), UniformKind::Mat4);
                style.param(format!("lightSize{i}"), UniformKind::Vec2);
                style.param(format!("lightTwoSided{i}"), UniformKind::F32);
                style.param("ltcMat", UniformKind::TextureUnfiltered2d);
                style.param("ltcMag", UniformKind::TextureUnfiltered2d);
                let shadow = self.shadow_code(style, i, shadows);
                format!(
                    r#"    {{
        let hw = p_lightSize{i}.x * 0.5;
        let hh = p_lightSize{i}.y * 0.5;
        let q0 = (p_lightTransform{i} * vec4f(-hw, -hh, 0.0, 1.0)).xyz;
        let q1 = (p_lightTransform{i} * vec4f(hw, -hh, 0.0, 1.0)).xyz;
        let q2 = (p_lightTransform{i} * vec4f(hw, hh, 0.0, 1.0)).xyz;
        let q3 = (p_lightTransform{i} * vec4f(-hw, hh, 0.0, 1.0)).xyz;
        let NoV = saturate(dot(N, V));
        let coords = ltcCoords(NoV, m_roughness);
        let t = textureSampleLevel(t_ltcMat, smpn, coords, 0.0);
        let mag = textureSampleLevel(t_ltcMag, smpn, coords, 0.0).xy;
        let twoSided = p_lightTwoSided{i} > 0.5;
        var attenuation = 1.0;
{shadow}        let spec = ltcEvaluate(N, V, f_worldPosition, ltcMinv(t), q0, q1, q2, q3, twoSided);
        let identity = mat3x3f(vec3f(1.0, 0.0, 0.0), vec3f(0.0, 1.0, 0.0), vec3f(0.0, 0.0, 1.0));
        let diff = ltcEvaluate(N, V, f_worldPosition, identity, q0, q1, q2, q3, twoSided);
        f_specular += p_lightColor{i}.rgb * spec * (f0 * mag.x + (vec3f(1.0) - f0) * mag.y) * attenuation;
        f_diffuse += m_color.rgb * p_lightColor{i}.rgb * diff * attenuation / PI;
    }}
"#
                )
            }
            LightSlot::Hemisphere { irradiance } => {
                style.param(format!("lightDirection{i}"), UniformKind::Vec3);
                style.param(format!("lightColorDown{i}"), UniformKind::Vec4);
                let irradiance_code = if irradiance {
                    style.param(format!("lightIrradiance{i}"), UniformKind::TextureCube);
                    format!(
                        "        let irr = textureSampleLevel(t_lightIrradiance{i}, smp, f_worldNormal, 0.0).rgb;\n"
                    )
                } else {
                    "        let irr = vec3f(1.0);\n".to_string()
                };
                format!(
                    r#"    {{
        let f = dot(f_worldNormal, normalize(-p_lightDirection{i})) * 0.5 + 0.5;
{irradiance_code}        f_diffuse += mix(p_lightColorDown{i}.rgb, p_lightColor{i}.rgb, f) * irr * m_color.rgb;
    }}
"#
                )
            }
        }
    }

    /// Shadow factor code, folded into `attenuation`. Assumes the light
    /// block declared `var attenuation`.
    fn shadow_code(&self, style: &mut ShadeStyle, i: usize, shadows: ShadowSlot) -> String {
        if shadows == ShadowSlot::None {
            return String::new();
        }
        style.param(format!("lightShadowMatrix{i}"), UniformKind::Mat4);
        let map_kind = match shadows {
            ShadowSlot::Vsm => UniformKind::Texture2d,
            _ => UniformKind::TextureShadow,
        };
        style.param(format!("shadowMap{i}"), map_kind);
        let sample = match shadows {
            ShadowSlot::Simple => format!(
                "                shadow = textureSampleCompareLevel(t_shadowMap{i}, cmp, smProj.xy, smProj.z - 0.002);\n"
            ),
            ShadowSlot::Pcf { sample_count } => {
                let mut taps = String::new();
                // unrolled so the disk is indexed with constants
                for tap in 0..sample_count {
                    taps.push_str(&format!(
                        "                shadowSum += textureSampleCompareLevel(t_shadowMap{i}, cmp, smProj.xy + poissonTaps[{tap}] / 700.0, smProj.z - 0.002);\n"
                    ));
                }
                format!(
                    "                var shadowSum = 0.0;\n{taps}                shadow = shadowSum / {sample_count}.0;\n"
                )
            }
            ShadowSlot::Vsm => format!(
                "                let moments = textureSampleLevel(t_shadowMap{i}, smp, smProj.xy, 0.0).xy;\n                shadow = chebyshevUpperBound(moments, smProj.z);\n"
            ),
            ShadowSlot::None => unreachable!(),
        };
        format!(
            r#"        {{
            let smc = p_lightShadowMatrix{i} * vec4f(f_worldPosition, 1.0);
            let smProj = smc.xyz / smc.w;
            var shadow = 1.0;
            if (smProj.x >= 0.0 && smProj.x <= 1.0 && smProj.y >= 0.0 && smProj.y <= 1.0 && smProj.z >= 0.0 && smProj.z <= 1.0) {{
{sample}            }}
            attenuation = attenuation * shadow;
        }}
"#
        )
    }
}

impl Material for PbrMaterial {
    fn shade_style(&self, context: &MaterialContext) -> Arc<ShadeStyle> {
        let mut cache = self.cache.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(style) = cache.get(context) {
            return style.clone();
        }
        let style = Arc::new(self.generate(context));
        cache.insert(context.clone(), style.clone());
        style
    }

    fn apply_parameters(&self, values: &mut HashMap<String, ParamValue>) {
        values.insert("color".into(), ParamValue::Vec4(self.color));
        values.insert("metalness".into(), ParamValue::F32(self.metalness));
        values.insert("roughness".into(), ParamValue::F32(self.roughness));
        values.insert("emission".into(), ParamValue::Vec4(self.emission));
    }

    fn textures(&self) -> Vec<(String, Arc<wgpu::TextureView>)> {
        self.textures
            .iter()
            .enumerate()
            .filter_map(|(i, t)| t.view.clone().map(|view| (format!("texture{i}"), view)))
            .collect()
    }

    fn transparent(&self) -> bool {
        self.transparent
    }

    fn double_sided(&self) -> bool {
        self.double_sided
    }
}

/// Derivative-based normal perturbation for uv-mapped normal maps.
const PERTURB_NORMAL_WGSL: &str = r#"
fn perturbNormal(N: vec3f, P: vec3f, uv: vec2f, mapN: vec3f) -> vec3f {
    let dp1 = dpdx(P);
    let dp2 = dpdy(P);
    let duv1 = dpdx(uv);
    let duv2 = dpdy(uv);
    let dp2perp = cross(dp2, N);
    let dp1perp = cross(N, dp1);
    let T = dp2perp * duv1.x + dp1perp * duv2.x;
    let B = dp2perp * duv1.y + dp1perp * duv2.y;
    let invmax = inverseSqrt(max(dot(T, T), dot(B, B)));
    let TBN = mat3x3f(T * invmax, B * invmax, N);
    return normalize(TBN * mapN);
}
"#;

/// Clip space to texture space, with the y flip baked in.
pub fn shadow_bias_matrix() -> Mat4 {
    Mat4::from_translation(Vec3::new(0.5, 0.5, 0.0)) * Mat4::from_scale(Vec3::new(0.5, -0.5, 1.0))
}

/// Parameter values for one light at slot `index`, given the world
/// transform of its node. Lights shine down their node's -Z axis.
pub fn light_parameters(index: usize, light: &Light, world: Mat4) -> Vec<(String, ParamValue)> {
    let mut values = Vec::new();
    let position = world.w_axis.truncate();
    let direction = -Vec3::from(world.z_axis.truncate()).normalize_or_zero();
    values.push((
        format!("lightColor{index}"),
        ParamValue::Vec4(light.color()),
    ));
    match light {
        Light::Ambient(_) => {}
        Light::Point(l) => {
            values.push((format!("lightPosition{index}"), ParamValue::Vec3(position)));
            values.push((
                format!("lightAttenuation{index}"),
                ParamValue::Vec3(Vec3::new(
                    l.constant_attenuation,
                    l.linear_attenuation,
                    l.quadratic_attenuation,
                )),
            ));
        }
        Light::Directional(_) => {
            values.push((
                format!("lightDirection{index}"),
                ParamValue::Vec3(direction),
            ));
        }
        Light::Spot(l) => {
            values.push((format!("lightPosition{index}"), ParamValue::Vec3(position)));
            values.push((
                format!("lightDirection{index}"),
                ParamValue::Vec3(direction),
            ));
            values.push((
                format!("lightAttenuation{index}"),
                ParamValue::Vec3(Vec3::new(
                    l.constant_attenuation,
                    l.linear_attenuation,
                    l.quadratic_attenuation,
                )),
            ));
            values.push((
                format!("lightInnerCos{index}"),
                ParamValue::F32(l.inner_angle.to_radians().cos()),
            ));
            values.push((
                format!("lightOuterCos{index}"),
                ParamValue::F32(l.outer_angle.to_radians().cos()),
            ));
        }
        Light::Area(l) => {
            values.push((format!("lightTransform{index}"), ParamValue::Mat4(world)));
            values.push((
                format!("lightSize{index}"),
                ParamValue::Vec2(Vec2::new(l.width, l.height)),
            ));
            values.push((
                format!("lightTwoSided{index}"),
                ParamValue::F32(if l.two_sided { 1.0 } else { 0.0 }),
            ));
        }
        Light::Hemisphere(l) => {
            values.push((
                format!("lightDirection{index}"),
                ParamValue::Vec3(direction),
            ));
            values.push((
                format!("lightColorDown{index}"),
                ParamValue::Vec4(l.down_color),
            ));
        }
    }
    if let Some(projection) = light.shadow_projection() {
        if light.shadows() != Shadows::None {
            let matrix = shadow_bias_matrix() * projection * Light::shadow_view(world);
            values.push((
                format!("lightShadowMatrix{index}"),
                ParamValue::Mat4(matrix),
            ));
        }
    }
    values
}

/// Placeholder impl so tests can build area lights without GPU textures.
impl AreaLight {
    /// Corner positions of the emitting rectangle in world space.
    pub fn corners(&self, world: Mat4) -> [Vec3; 4] {
        let hw = self.width * 0.5;
        let hh = self.height * 0.5;
        [
            world.transform_point3(Vec3::new(-hw, -hh, 0.0)),
            world.transform_point3(Vec3::new(hw, -hh, 0.0)),
            world.transform_point3(Vec3::new(hw, hh, 0.0)),
            world.transform_point3(Vec3::new(-hw, hh, 0.0)),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::{DirectionalLight, PointLight, SpotLight};
    use crate::facet::RenderPass;

    fn context(lights: Vec<LightSlot>) -> MaterialContext {
        MaterialContext {
            combiners: RenderPass::default_pass().combiners,
            lights,
            fog: false,
            environment: false,
            instanced: false,
            march_source: None,
        }
    }

    #[test]
    fn unlit_context_generates_no_brdf() {
        let material = PbrMaterial::new();
        let ctx = MaterialContext {
            combiners: RenderPass::vsm_light_pass().combiners,
            lights: vec![LightSlot::Point],
            fog: false,
            environment: false,
            instanced: false,
            march_source: None,
        };
        let style = material.shade_style(&ctx);
        let wgsl = style.generate_wgsl();
        assert!(!wgsl.contains("Fd_Burley"));
        assert!(!wgsl.contains("p_lightColor0"));
        assert!(wgsl.contains("o_moments"));
    }

    #[test]
    fn point_light_uses_attenuated_lambert_and_ggx() {
        let material = PbrMaterial::new();
        let style = material.shade_style(&context(vec![LightSlot::Point]));
        let wgsl = style.generate_wgsl();
        assert!(wgsl.contains("p_lightPosition0"));
        assert!(wgsl.contains("a.x + a.y * distance + a.z * distance * distance"));
        assert!(wgsl.contains("ggx(N, V, L, m_roughness, f0.x)"));
        assert!(wgsl.contains("NoL * attenuation / PI"));
    }

    #[test]
    fn spot_falloff_matches_the_cpu_mirror() {
        let material = PbrMaterial::new();
        let style = material.shade_style(&context(vec![LightSlot::Spot {
            shadows: ShadowSlot::None,
        }]));
        let wgsl = style.generate_wgsl();
        assert!(wgsl.contains(
            "clamp((hit - p_lightOuterCos0) / (p_lightInnerCos0 - p_lightOuterCos0), 0.0, 1.0)"
        ));
        assert!(wgsl.contains("Fd_Burley"));
    }

    #[test]
    fn pcf_shadows_unroll_the_poisson_disk() {
        let material = PbrMaterial::new();
        let style = material.shade_style(&context(vec![LightSlot::Directional {
            shadows: ShadowSlot::Pcf { sample_count: 12 },
        }]));
        let wgsl = style.generate_wgsl();
        assert_eq!(wgsl.matches("poissonTaps[").count(), 12);
        assert!(wgsl.contains("var t_shadowMap0: texture_depth_2d;"));
        assert!(wgsl.contains("textureSampleCompareLevel"));
    }

    #[test]
    fn vsm_shadows_sample_moments_from_a_color_map() {
        let material = PbrMaterial::new();
        let style = material.shade_style(&context(vec![LightSlot::Directional {
            shadows: ShadowSlot::Vsm,
        }]));
        let wgsl = style.generate_wgsl();
        assert!(wgsl.contains("var t_shadowMap0: texture_2d<f32>;"));
        assert!(wgsl.contains("chebyshevUpperBound(moments, smProj.z)"));
        assert!(!wgsl.contains("textureSampleCompare"));
    }

    #[test]
    fn area_light_pulls_in_the_ltc_tables() {
        let material = PbrMaterial::new();
        let style = material.shade_style(&context(vec![LightSlot::Area {
            shadows: ShadowSlot::None,
        }]));
        let wgsl = style.generate_wgsl();
        assert!(wgsl.contains("t_ltcMat"));
        assert!(wgsl.contains("t_ltcMag"));
        assert!(wgsl.contains("ltcEvaluate"));
        assert!(wgsl.contains("p_lightTransform0"));
    }

    #[test]
    fn shade_styles_are_cached_per_context() {
        let material = PbrMaterial::new();
        let ctx = context(vec![LightSlot::Point]);
        let a = material.shade_style(&ctx);
        let b = material.shade_style(&ctx);
        assert!(Arc::ptr_eq(&a, &b));

        let other = material.shade_style(&context(vec![
            LightSlot::Point,
            LightSlot::Ambient,
        ]));
        assert!(!Arc::ptr_eq(&a, &other));
    }

    #[test]
    fn triplanar_textures_project_along_all_three_axes() {
        let mut material = PbrMaterial::new();
        material.textures.push(MaterialTexture {
            source: TextureSource::Triplanar {
                scale: 0.5,
                offset: Vec2::ZERO,
                sharpness: 4.0,
            },
            target: TextureTarget::Color,
            view: None,
        });
        let style = material.shade_style(&context(vec![]));
        let wgsl = style.generate_wgsl();
        assert!(wgsl.contains("f_worldPosition.zy"));
        assert!(wgsl.contains("f_worldPosition.xz"));
        assert!(wgsl.contains("f_worldPosition.xy"));
        assert!(wgsl.contains("pow(abs(f_worldNormal)"));
    }

    #[test]
    fn height_target_displaces_in_the_vertex_stage() {
        let mut material = PbrMaterial::new();
        material.textures.push(MaterialTexture {
            source: TextureSource::ModelCoordinates,
            target: TextureTarget::Height { scale: 0.2 },
            view: None,
        });
        let style = material.shade_style(&context(vec![]));
        assert!(style.vertex_transform.contains("textureSampleLevel"));
        assert!(style.vertex_transform.contains("position += normal"));
        let wgsl = style.generate_wgsl();
        // displacement must not also tint the fragment
        assert!(!wgsl.contains("let tex0"));
    }

    #[test]
    fn march_context_builds_a_screen_space_shader() {
        let material = PbrMaterial::new();
        let marcher = crate::entity::RayMarcher::new(
            crate::entity::MarchFunction::SignedDistance("return length(p) - 1.0;".into()),
            Arc::new(PbrMaterial::new()),
        );
        let ctx = MaterialContext {
            combiners: RenderPass::default_pass().combiners,
            lights: vec![LightSlot::Point],
            fog: false,
            environment: false,
            instanced: false,
            march_source: Some(marcher.march_source()),
        };
        let style = material.shade_style(&ctx);
        assert!(style.screen_space);
        let wgsl = style.generate_wgsl();
        assert!(wgsl.contains("discard"));
        assert!(wgsl.contains("o_depth = hitClip.z / hitClip.w;"));
        // lighting runs on the marched surface, not the triangle varyings
        assert!(wgsl.contains("f_worldPosition = marchResult.position;"));
    }

    #[test]
    fn light_parameters_follow_the_node_transform() {
        let world = Mat4::from_translation(Vec3::new(1.0, 2.0, 3.0));
        let values = light_parameters(0, &Light::Point(PointLight::default()), world);
        assert!(values.contains(&(
            "lightPosition0".to_string(),
            ParamValue::Vec3(Vec3::new(1.0, 2.0, 3.0))
        )));

        // a light rotated to face +X shines along +X
        let facing_x =
            Mat4::from_rotation_y(-std::f32::consts::FRAC_PI_2);
        let values = light_parameters(1, &Light::Directional(DirectionalLight::default()), facing_x);
        let dir = values
            .iter()
            .find(|(n, _)| n == "lightDirection1")
            .map(|(_, v)| v.clone())
            .unwrap();
        if let ParamValue::Vec3(d) = dir {
            assert!((d - Vec3::X).length() < 1e-5);
        } else {
            panic!("direction must be a vec3");
        }
    }

    #[test]
    fn shadow_matrix_is_only_bound_for_shadowed_lights() {
        let world = Mat4::IDENTITY;
        let plain = light_parameters(0, &Light::Spot(SpotLight::default()), world);
        assert!(!plain.iter().any(|(n, _)| n == "lightShadowMatrix0"));

        let shadowed = light_parameters(
            0,
            &Light::Spot(SpotLight {
                shadows: Shadows::pcf(),
                ..Default::default()
            }),
            world,
        );
        assert!(shadowed.iter().any(|(n, _)| n == "lightShadowMatrix0"));
    }

    #[test]
    fn ldr_pass_declares_fog_parameters() {
        let material = PbrMaterial::new();
        let style = material.shade_style(&context(vec![]));
        assert!(style.params.contains_key("fogColor"));
        assert!(style.params.contains_key("fogEnd"));
        let deferred = material.shade_style(&MaterialContext {
            combiners: RenderPass::deferred_pass().combiners,
            lights: vec![],
            fog: false,
            environment: false,
            instanced: false,
            march_source: None,
        });
        assert!(!deferred.params.contains_key("fogEnd"));
    }
}
