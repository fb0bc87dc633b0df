//! Shade styles: the intermediate representation behind shader generation.
//!
//! Materials do not write whole WGSL modules. They describe a [`ShadeStyle`]:
//! a set of named parameters, optional helper functions, a vertex transform
//! snippet and a fragment body that fills in material and light facets. The
//! shade style then assembles a complete WGSL module with a deterministic
//! binding layout, so equal styles always produce byte-identical shader
//! source and can be cached by string or by key.
//!
//! Binding model:
//!
//! * group 0, binding 0: per-draw [`Globals`] (transform matrices)
//! * group 1, binding 0: the generated `Params` uniform struct
//! * group 1, binding 1: `smp`, a filtering sampler
//! * group 1, binding 2: `cmp`, a comparison sampler for shadow maps
//! * group 1, binding 3: `smpn`, a nearest sampler for unfilterable formats
//! * group 1, bindings 4+: textures, ordered by parameter name
//!
//! Fragment code refers to parameter `x` as `p_x`; texture `x` is `t_x`.

use std::collections::{BTreeMap, HashMap};

use glam::{Mat4, Vec2, Vec3, Vec4};

use crate::error::{RenderError, Result};

/// First binding index used for textures in group 1.
pub const TEXTURE_BINDING_BASE: u32 = 4;

/// Per-draw transform uniforms, bound at group 0 binding 0.
#[repr(C)]
#[derive(Clone, Copy, Debug, bytemuck::Pod, bytemuck::Zeroable)]
pub struct Globals {
    pub model: [[f32; 4]; 4],
    pub view: [[f32; 4]; 4],
    pub projection: [[f32; 4]; 4],
    pub model_normal: [[f32; 4]; 4],
    pub view_normal: [[f32; 4]; 4],
    pub view_inverse: [[f32; 4]; 4],
    pub projection_inverse: [[f32; 4]; 4],
}

impl Globals {
    /// Build the full matrix set from model, view and projection.
    ///
    /// Normal matrices are inverse-transposes so non-uniform scale does not
    /// skew normals.
    pub fn new(model: Mat4, view: Mat4, projection: Mat4) -> Self {
        Self {
            model: model.to_cols_array_2d(),
            view: view.to_cols_array_2d(),
            projection: projection.to_cols_array_2d(),
            model_normal: model.inverse().transpose().to_cols_array_2d(),
            view_normal: view.inverse().transpose().to_cols_array_2d(),
            view_inverse: view.inverse().to_cols_array_2d(),
            projection_inverse: projection.inverse().to_cols_array_2d(),
        }
    }
}

/// The declared type of one shade-style parameter.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum UniformKind {
    F32,
    I32,
    Vec2,
    Vec3,
    Vec4,
    Mat4,
    /// `array<vec4f, N>`.
    Vec4Array(usize),
    /// Filterable 2D color texture.
    Texture2d,
    /// Non-filterable 2D texture (32-bit float formats), sampled with the
    /// nearest sampler.
    TextureUnfiltered2d,
    /// Cube texture.
    TextureCube,
    /// Depth texture sampled with the comparison sampler.
    TextureShadow,
}

impl UniformKind {
    /// Whether this parameter lives in the uniform struct rather than as a
    /// texture binding.
    pub fn is_uniform(&self) -> bool {
        !matches!(
            self,
            UniformKind::Texture2d
                | UniformKind::TextureUnfiltered2d
                | UniformKind::TextureCube
                | UniformKind::TextureShadow
        )
    }

    fn wgsl_type(&self) -> String {
        match self {
            UniformKind::F32 => "f32".into(),
            UniformKind::I32 => "i32".into(),
            UniformKind::Vec2 => "vec2f".into(),
            UniformKind::Vec3 => "vec3f".into(),
            UniformKind::Vec4 => "vec4f".into(),
            UniformKind::Mat4 => "mat4x4f".into(),
            UniformKind::Vec4Array(n) => format!("array<vec4f, {n}>"),
            _ => unreachable!("texture kinds have no uniform type"),
        }
    }

    fn align(&self) -> usize {
        match self {
            UniformKind::F32 | UniformKind::I32 => 4,
            UniformKind::Vec2 => 8,
            UniformKind::Vec3 | UniformKind::Vec4 | UniformKind::Mat4 => 16,
            UniformKind::Vec4Array(_) => 16,
            _ => unreachable!("texture kinds have no layout"),
        }
    }

    fn size(&self) -> usize {
        match self {
            UniformKind::F32 | UniformKind::I32 => 4,
            UniformKind::Vec2 => 8,
            UniformKind::Vec3 => 12,
            UniformKind::Vec4 => 16,
            UniformKind::Mat4 => 64,
            UniformKind::Vec4Array(n) => 16 * n,
            _ => unreachable!("texture kinds have no layout"),
        }
    }
}

/// A CPU-side value for one uniform parameter.
#[derive(Clone, Debug, PartialEq)]
pub enum ParamValue {
    F32(f32),
    I32(i32),
    Vec2(Vec2),
    Vec3(Vec3),
    Vec4(Vec4),
    Mat4(Mat4),
    Vec4Array(Vec<Vec4>),
}

impl ParamValue {
    fn kind_matches(&self, kind: UniformKind) -> bool {
        matches!(
            (self, kind),
            (ParamValue::F32(_), UniformKind::F32)
                | (ParamValue::I32(_), UniformKind::I32)
                | (ParamValue::Vec2(_), UniformKind::Vec2)
                | (ParamValue::Vec3(_), UniformKind::Vec3)
                | (ParamValue::Vec4(_), UniformKind::Vec4)
                | (ParamValue::Mat4(_), UniformKind::Mat4)
                | (ParamValue::Vec4Array(_), UniformKind::Vec4Array(_))
        )
    }

    fn write(&self, out: &mut Vec<u8>) {
        match self {
            ParamValue::F32(v) => out.extend_from_slice(&v.to_le_bytes()),
            ParamValue::I32(v) => out.extend_from_slice(&v.to_le_bytes()),
            ParamValue::Vec2(v) => out.extend_from_slice(bytemuck::bytes_of(&v.to_array())),
            ParamValue::Vec3(v) => out.extend_from_slice(bytemuck::bytes_of(&v.to_array())),
            ParamValue::Vec4(v) => out.extend_from_slice(bytemuck::bytes_of(&v.to_array())),
            ParamValue::Mat4(v) => out.extend_from_slice(bytemuck::bytes_of(&v.to_cols_array())),
            ParamValue::Vec4Array(vs) => {
                for v in vs {
                    out.extend_from_slice(bytemuck::bytes_of(&v.to_array()));
                }
            }
        }
    }
}

fn align_up(offset: usize, align: usize) -> usize {
    offset.div_ceil(align) * align
}

/// The byte layout of a generated `Params` uniform struct.
///
/// Mirrors WGSL's automatic struct layout rules so the CPU-side packing
/// and the shader agree without explicit offsets in the shader source.
#[derive(Clone, Debug, PartialEq)]
pub struct UniformLayout {
    /// `(name, kind, byte offset)` in declaration order.
    pub fields: Vec<(String, UniformKind, usize)>,
    /// Total struct size, rounded up to 16 bytes.
    pub size: usize,
}

impl UniformLayout {
    /// Lay out the uniform (non-texture) parameters in name order.
    pub fn of(params: &BTreeMap<String, UniformKind>) -> Self {
        let mut fields = Vec::new();
        let mut offset = 0usize;
        for (name, kind) in params {
            if !kind.is_uniform() {
                continue;
            }
            offset = align_up(offset, kind.align());
            fields.push((name.clone(), *kind, offset));
            offset += kind.size();
        }
        let size = align_up(offset.max(16), 16);
        Self { fields, size }
    }

    /// Pack the given values into the layout's byte representation.
    ///
    /// Every declared field must have a value of the declared kind.
    pub fn pack(&self, values: &HashMap<String, ParamValue>) -> Result<Vec<u8>> {
        let mut out = vec![0u8; self.size];
        for (name, kind, offset) in &self.fields {
            let value = values
                .get(name)
                .ok_or_else(|| RenderError::MissingParameter(name.clone()))?;
            if !value.kind_matches(*kind) {
                return Err(RenderError::MissingParameter(name.clone()));
            }
            let mut bytes = Vec::new();
            value.write(&mut bytes);
            out[*offset..*offset + bytes.len()].copy_from_slice(&bytes);
        }
        Ok(out)
    }
}

/// The shader IR a material produces for one pass.
///
/// Equality of the generated source is what the pipeline cache keys on;
/// everything that influences generation must live in this struct.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ShadeStyle {
    /// Declared parameters, uniforms and textures alike.
    pub params: BTreeMap<String, UniformKind>,
    /// WGSL statements run in the vertex stage; may rewrite the mutable
    /// `position` and `normal` before the transform chain.
    pub vertex_transform: String,
    /// Module-scope WGSL (helper functions) emitted before the entry points.
    pub fragment_preamble: String,
    /// WGSL statements computing material and light facets and assigning
    /// the `o_*` outputs.
    pub fragment_body: String,
    /// Output names, one per color attachment, in attachment order.
    pub outputs: Vec<String>,
    /// Full-screen entity: the vertex stage emits a screen triangle and the
    /// fragment stage writes its own depth through `o_depth`.
    pub screen_space: bool,
    /// Geometry is drawn with per-instance transforms at locations 3..=6.
    pub instanced: bool,
}

impl ShadeStyle {
    /// Declare a parameter.
    pub fn param(&mut self, name: impl Into<String>, kind: UniformKind) -> &mut Self {
        self.params.insert(name.into(), kind);
        self
    }

    /// Layout of this style's uniform struct.
    pub fn uniform_layout(&self) -> UniformLayout {
        UniformLayout::of(&self.params)
    }

    /// Texture parameters in name order, paired with their binding index.
    pub fn texture_bindings(&self) -> Vec<(String, UniformKind, u32)> {
        self.params
            .iter()
            .filter(|(_, kind)| !kind.is_uniform())
            .enumerate()
            .map(|(i, (name, kind))| (name.clone(), *kind, TEXTURE_BINDING_BASE + i as u32))
            .collect()
    }

    /// Assemble the complete WGSL module.
    pub fn generate_wgsl(&self) -> String {
        let mut s = String::new();

        s.push_str(
            "struct Globals {\n    model: mat4x4f,\n    view: mat4x4f,\n    projection: mat4x4f,\n    model_normal: mat4x4f,\n    view_normal: mat4x4f,\n    view_inverse: mat4x4f,\n    projection_inverse: mat4x4f,\n}\n@group(0) @binding(0) var<uniform> globals: Globals;\n\n",
        );

        // params struct; WGSL rejects empty structs so pad when needed
        let layout = self.uniform_layout();
        s.push_str("struct Params {\n");
        if layout.fields.is_empty() {
            s.push_str("    _unused: vec4f,\n");
        } else {
            for (name, kind, _) in &layout.fields {
                s.push_str(&format!("    {name}: {},\n", kind.wgsl_type()));
            }
        }
        s.push_str("}\n@group(1) @binding(0) var<uniform> params: Params;\n");
        s.push_str("@group(1) @binding(1) var smp: sampler;\n");
        s.push_str("@group(1) @binding(2) var cmp: sampler_comparison;\n");
        s.push_str("@group(1) @binding(3) var smpn: sampler;\n");
        for (name, kind, binding) in self.texture_bindings() {
            let ty = match kind {
                UniformKind::Texture2d | UniformKind::TextureUnfiltered2d => "texture_2d<f32>",
                UniformKind::TextureCube => "texture_cube<f32>",
                UniformKind::TextureShadow => "texture_depth_2d",
                _ => unreachable!(),
            };
            s.push_str(&format!("@group(1) @binding({binding}) var t_{name}: {ty};\n"));
        }
        s.push('\n');

        if !self.fragment_preamble.is_empty() {
            s.push_str(&self.fragment_preamble);
            s.push_str("\n\n");
        }

        s.push_str(
            "struct VsOut {\n    @builtin(position) clip_position: vec4f,\n    @location(0) world_position: vec3f,\n    @location(1) world_normal: vec3f,\n    @location(2) view_position: vec3f,\n    @location(3) uv: vec2f,\n    @location(4) clip: vec4f,\n}\n\n",
        );

        if self.screen_space {
            // full-screen triangle; world rays are reconstructed per fragment
            s.push_str(
                "@vertex\nfn vs(@builtin(vertex_index) index: u32) -> VsOut {\n    var out: VsOut;\n    let x = f32(i32(index) / 2) * 4.0 - 1.0;\n    let y = f32(i32(index) % 2) * 4.0 - 1.0;\n    out.clip_position = vec4f(x, y, 0.0, 1.0);\n    out.world_position = vec3f(0.0);\n    out.world_normal = vec3f(0.0, 0.0, 1.0);\n    out.view_position = vec3f(0.0);\n    out.uv = vec2f((x + 1.0) * 0.5, 1.0 - (y + 1.0) * 0.5);\n    out.clip = out.clip_position;\n    return out;\n}\n\n",
            );
        } else {
            s.push_str("struct VsIn {\n    @location(0) position: vec3f,\n    @location(1) normal: vec3f,\n    @location(2) uv: vec2f,\n");
            if self.instanced {
                s.push_str("    @location(3) i0: vec4f,\n    @location(4) i1: vec4f,\n    @location(5) i2: vec4f,\n    @location(6) i3: vec4f,\n");
            }
            s.push_str("}\n\n@vertex\nfn vs(in: VsIn) -> VsOut {\n    var out: VsOut;\n");
            if self.instanced {
                s.push_str("    let instance = mat4x4f(in.i0, in.i1, in.i2, in.i3);\n    let model = globals.model * instance;\n    let model_normal = globals.model_normal * instance;\n");
            } else {
                s.push_str("    let model = globals.model;\n    let model_normal = globals.model_normal;\n");
            }
            s.push_str("    var position = in.position;\n    var normal = in.normal;\n    let va_texCoord0 = in.uv;\n");
            if !self.vertex_transform.is_empty() {
                s.push_str("    {\n");
                s.push_str(&self.vertex_transform);
                s.push_str("\n    }\n");
            }
            s.push_str(
                "    let world = model * vec4f(position, 1.0);\n    out.world_position = world.xyz;\n    out.world_normal = (model_normal * vec4f(normal, 0.0)).xyz;\n    let view_position = globals.view * world;\n    out.view_position = view_position.xyz;\n    out.clip_position = globals.projection * view_position;\n    out.clip = out.clip_position;\n    out.uv = in.uv;\n    return out;\n}\n\n",
            );
        }

        // fragment outputs; depth-only passes have none and WGSL rejects
        // empty structs, so the fragment returns nothing
        let has_outputs = !self.outputs.is_empty() || self.screen_space;
        if has_outputs {
            s.push_str("struct FsOut {\n");
            for (i, name) in self.outputs.iter().enumerate() {
                s.push_str(&format!("    @location({i}) {name}: vec4f,\n"));
            }
            if self.screen_space {
                s.push_str("    @builtin(frag_depth) depth: f32,\n");
            }
            s.push_str("}\n\n@fragment\nfn fs(in: VsOut) -> FsOut {\n");
        } else {
            s.push_str("@fragment\nfn fs(in: VsOut) {\n");
        }

        // aliases for generated fragment code
        for (name, kind, _) in &layout.fields {
            let _ = kind;
            s.push_str(&format!("    let p_{name} = params.{name};\n"));
        }
        s.push_str(
            "    let v_worldPosition = in.world_position;\n    var v_worldNormal = normalize(in.world_normal);\n    let v_viewPosition = in.view_position;\n    let va_texCoord0 = in.uv;\n    let va_position = in.world_position;\n",
        );

        // facet variables, overwritten by the body as needed
        s.push_str(
            "    var f_worldPosition = v_worldPosition;\n    var f_worldNormal = v_worldNormal;\n    var f_viewPosition = v_viewPosition;\n    var f_viewNormal = (globals.view_normal * vec4f(v_worldNormal, 0.0)).xyz;\n    var f_clipPosition = in.clip;\n    var f_diffuse = vec3f(0.0);\n    var f_specular = vec3f(0.0);\n    var f_emission = vec3f(0.0);\n    var f_ambientOcclusion = 1.0;\n",
        );
        s.push_str(
            "    var m_color = vec4f(1.0);\n    var m_metalness = 0.5;\n    var m_roughness = 1.0;\n    var m_emission = vec3f(0.0);\n",
        );
        for name in &self.outputs {
            s.push_str(&format!("    var o_{name} = vec4f(0.0);\n"));
        }
        if self.screen_space {
            s.push_str("    var o_depth = 1.0;\n");
        }
        s.push('\n');
        s.push_str(&self.fragment_body);
        if has_outputs {
            s.push_str("\n\n    var out: FsOut;\n");
            for name in &self.outputs {
                s.push_str(&format!("    out.{name} = o_{name};\n"));
            }
            if self.screen_space {
                s.push_str("    out.depth = o_depth;\n");
            }
            s.push_str("    return out;\n}\n");
        } else {
            s.push_str("\n}\n");
        }
        s
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(entries: &[(&str, UniformKind)]) -> BTreeMap<String, UniformKind> {
        entries
            .iter()
            .map(|(n, k)| (n.to_string(), *k))
            .collect()
    }

    #[test]
    fn layout_follows_wgsl_alignment_rules() {
        let layout = UniformLayout::of(&params(&[
            ("a", UniformKind::F32),
            ("b", UniformKind::Vec3),
            ("c", UniformKind::Vec2),
            ("d", UniformKind::Mat4),
        ]));
        let offsets: Vec<(String, usize)> = layout
            .fields
            .iter()
            .map(|(n, _, o)| (n.clone(), *o))
            .collect();
        assert_eq!(
            offsets,
            vec![
                ("a".to_string(), 0),
                ("b".to_string(), 16),
                ("c".to_string(), 32),
                ("d".to_string(), 48),
            ]
        );
        assert_eq!(layout.size, 112);
    }

    #[test]
    fn empty_layout_still_occupies_a_vec4() {
        let layout = UniformLayout::of(&BTreeMap::new());
        assert_eq!(layout.size, 16);
        assert!(layout.fields.is_empty());
    }

    #[test]
    fn textures_are_excluded_from_the_uniform_struct() {
        let layout = UniformLayout::of(&params(&[
            ("color", UniformKind::Vec4),
            ("colorMap", UniformKind::Texture2d),
        ]));
        assert_eq!(layout.fields.len(), 1);
        assert_eq!(layout.size, 16);
    }

    #[test]
    fn pack_reports_the_missing_parameter_by_name() {
        let layout = UniformLayout::of(&params(&[("fogEnd", UniformKind::F32)]));
        let err = layout.pack(&HashMap::new()).unwrap_err();
        assert!(err.to_string().contains("fogEnd"));
    }

    #[test]
    fn pack_places_values_at_their_offsets() {
        let layout = UniformLayout::of(&params(&[
            ("a", UniformKind::F32),
            ("b", UniformKind::Vec4),
        ]));
        let mut values = HashMap::new();
        values.insert("a".to_string(), ParamValue::F32(2.0));
        values.insert(
            "b".to_string(),
            ParamValue::Vec4(Vec4::new(1.0, 2.0, 3.0, 4.0)),
        );
        let bytes = layout.pack(&values).unwrap();
        assert_eq!(bytes.len(), 32);
        assert_eq!(f32::from_le_bytes(bytes[0..4].try_into().unwrap()), 2.0);
        assert_eq!(f32::from_le_bytes(bytes[16..20].try_into().unwrap()), 1.0);
        assert_eq!(f32::from_le_bytes(bytes[28..32].try_into().unwrap()), 4.0);
    }

    #[test]
    fn generation_is_deterministic() {
        let mut style = ShadeStyle::default();
        style.param("zeta", UniformKind::F32);
        style.param("alpha", UniformKind::Vec4);
        style.param("normalMap", UniformKind::Texture2d);
        style.outputs = vec!["color".to_string()];
        style.fragment_body = "o_color = p_alpha;".to_string();
        assert_eq!(style.generate_wgsl(), style.clone().generate_wgsl());
    }

    #[test]
    fn parameters_are_declared_in_name_order() {
        let mut style = ShadeStyle::default();
        style.param("zeta", UniformKind::F32);
        style.param("alpha", UniformKind::F32);
        style.outputs = vec!["color".to_string()];
        let wgsl = style.generate_wgsl();
        let alpha = wgsl.find("alpha: f32").unwrap();
        let zeta = wgsl.find("zeta: f32").unwrap();
        assert!(alpha < zeta);
    }

    #[test]
    fn textures_bind_after_the_samplers_in_name_order() {
        let mut style = ShadeStyle::default();
        style.param("colorMap", UniformKind::Texture2d);
        style.param("shadowMap", UniformKind::TextureShadow);
        style.param("envMap", UniformKind::TextureCube);
        let bindings = style.texture_bindings();
        assert_eq!(
            bindings,
            vec![
                ("colorMap".to_string(), UniformKind::Texture2d, 4),
                ("envMap".to_string(), UniformKind::TextureCube, 5),
                ("shadowMap".to_string(), UniformKind::TextureShadow, 6),
            ]
        );
        let wgsl = style.generate_wgsl();
        assert!(wgsl.contains("@group(1) @binding(4) var t_colorMap: texture_2d<f32>;"));
        assert!(wgsl.contains("@group(1) @binding(5) var t_envMap: texture_cube<f32>;"));
        assert!(wgsl.contains("@group(1) @binding(6) var t_shadowMap: texture_depth_2d;"));
    }

    #[test]
    fn screen_space_styles_write_their_own_depth() {
        let mut style = ShadeStyle::default();
        style.screen_space = true;
        style.outputs = vec!["color".to_string()];
        let wgsl = style.generate_wgsl();
        assert!(wgsl.contains("@builtin(frag_depth) depth: f32"));
        assert!(wgsl.contains("@builtin(vertex_index)"));
        assert!(!wgsl.contains("struct VsIn"));

        let mut rasterized = ShadeStyle::default();
        rasterized.outputs = vec!["color".to_string()];
        assert!(!rasterized.generate_wgsl().contains("frag_depth"));
    }

    #[test]
    fn outputs_map_to_sequential_locations() {
        let mut style = ShadeStyle::default();
        style.outputs = vec!["diffuseSpecular".to_string(), "emissive".to_string()];
        let wgsl = style.generate_wgsl();
        assert!(wgsl.contains("@location(0) diffuseSpecular: vec4f"));
        assert!(wgsl.contains("@location(1) emissive: vec4f"));
        assert!(wgsl.contains("var o_diffuseSpecular = vec4f(0.0);"));
        assert!(wgsl.contains("out.emissive = o_emissive;"));
    }

    #[test]
    fn instanced_styles_consume_the_instance_matrix() {
        let mut style = ShadeStyle::default();
        style.instanced = true;
        style.outputs = vec!["color".to_string()];
        let wgsl = style.generate_wgsl();
        assert!(wgsl.contains("@location(6) i3: vec4f"));
        assert!(wgsl.contains("mat4x4f(in.i0, in.i1, in.i2, in.i3)"));
    }
}
