//! Renderable and light-emitting entities.
//!
//! Everything that can be attached to a scene node is a variant of
//! [`Entity`]: meshes in three flavors, lights, fog and ray-marched
//! volumes. The set is closed on purpose; the renderer matches on it
//! exhaustively and a new entity kind means touching every pass that has
//! to handle it.

use std::sync::Arc;

use glam::{Mat4, Vec3, Vec4};
use wgpu::util::DeviceExt;

use crate::error::{RenderError, Result};
use crate::gpu::GpuContext;
use crate::material::Material;

/// Anything attachable to a [`SceneNode`](crate::SceneNode).
pub enum Entity {
    Mesh(Mesh),
    InstancedMesh(InstancedMesh),
    LineMesh(LineMesh),
    RayMarcher(RayMarcher),
    Light(Light),
    Fog(Fog),
}

// --- geometry -------------------------------------------------------------

/// One vertex of a triangle mesh.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct Vertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
    pub uv: [f32; 2],
}

impl Vertex {
    const ATTRIBS: [wgpu::VertexAttribute; 3] =
        wgpu::vertex_attr_array![0 => Float32x3, 1 => Float32x3, 2 => Float32x2];

    pub fn layout() -> wgpu::VertexBufferLayout<'static> {
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<Vertex>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &Self::ATTRIBS,
        }
    }
}

/// A per-instance world transform, uploaded as four vec4 columns.
#[repr(C)]
#[derive(Clone, Copy, Debug, bytemuck::Pod, bytemuck::Zeroable)]
pub struct InstanceRaw {
    pub model: [[f32; 4]; 4],
}

impl InstanceRaw {
    const ATTRIBS: [wgpu::VertexAttribute; 4] = wgpu::vertex_attr_array![
        3 => Float32x4, 4 => Float32x4, 5 => Float32x4, 6 => Float32x4
    ];

    pub fn from_mat4(m: Mat4) -> Self {
        Self {
            model: m.to_cols_array_2d(),
        }
    }

    pub fn layout() -> wgpu::VertexBufferLayout<'static> {
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<InstanceRaw>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Instance,
            attributes: &Self::ATTRIBS,
        }
    }
}

/// Uploaded vertex (and optionally index) data shared between meshes.
pub struct Geometry {
    pub vertex_buffer: wgpu::Buffer,
    pub vertex_count: u32,
    pub index_buffer: Option<wgpu::Buffer>,
    pub index_count: u32,
}

impl Geometry {
    /// Upload vertices and optional indices.
    pub fn new(gpu: &GpuContext, vertices: &[Vertex], indices: Option<&[u32]>) -> Result<Self> {
        if vertices.is_empty() {
            return Err(RenderError::MissingGeometry);
        }
        let vertex_buffer = gpu
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("Geometry Vertex Buffer"),
                contents: bytemuck::cast_slice(vertices),
                usage: wgpu::BufferUsages::VERTEX,
            });
        let (index_buffer, index_count) = match indices {
            Some(indices) => {
                let buffer = gpu
                    .device
                    .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                        label: Some("Geometry Index Buffer"),
                        contents: bytemuck::cast_slice(indices),
                        usage: wgpu::BufferUsages::INDEX,
                    });
                (Some(buffer), indices.len() as u32)
            }
            None => (None, 0),
        };
        Ok(Self {
            vertex_buffer,
            vertex_count: vertices.len() as u32,
            index_buffer,
            index_count,
        })
    }
}

/// Vertex data for an axis-aligned box centered on the origin.
pub fn box_mesh(width: f32, height: f32, depth: f32) -> (Vec<Vertex>, Vec<u32>) {
    let (hw, hh, hd) = (width * 0.5, height * 0.5, depth * 0.5);
    // per face: normal, tangent, bitangent
    let faces: [(Vec3, Vec3, Vec3); 6] = [
        (Vec3::X, Vec3::Z, Vec3::Y),
        (Vec3::NEG_X, Vec3::NEG_Z, Vec3::Y),
        (Vec3::Y, Vec3::X, Vec3::NEG_Z),
        (Vec3::NEG_Y, Vec3::X, Vec3::Z),
        (Vec3::Z, Vec3::NEG_X, Vec3::Y),
        (Vec3::NEG_Z, Vec3::X, Vec3::Y),
    ];
    let half = Vec3::new(hw, hh, hd);
    let mut vertices = Vec::with_capacity(24);
    let mut indices = Vec::with_capacity(36);
    for (normal, tangent, bitangent) in faces {
        let base = vertices.len() as u32;
        for (u, v) in [(-1.0f32, -1.0f32), (1.0, -1.0), (1.0, 1.0), (-1.0, 1.0)] {
            let p = (normal + tangent * u + bitangent * v) * half;
            vertices.push(Vertex {
                position: p.to_array(),
                normal: normal.to_array(),
                uv: [u * 0.5 + 0.5, v * 0.5 + 0.5],
            });
        }
        indices.extend_from_slice(&[base, base + 1, base + 2, base, base + 2, base + 3]);
    }
    (vertices, indices)
}

/// Vertex data for a flat rectangle in the XZ plane, facing +Y.
pub fn plane_mesh(width: f32, depth: f32) -> (Vec<Vertex>, Vec<u32>) {
    let (hw, hd) = (width * 0.5, depth * 0.5);
    let vertices = vec![
        Vertex {
            position: [-hw, 0.0, -hd],
            normal: [0.0, 1.0, 0.0],
            uv: [0.0, 0.0],
        },
        Vertex {
            position: [hw, 0.0, -hd],
            normal: [0.0, 1.0, 0.0],
            uv: [1.0, 0.0],
        },
        Vertex {
            position: [hw, 0.0, hd],
            normal: [0.0, 1.0, 0.0],
            uv: [1.0, 1.0],
        },
        Vertex {
            position: [-hw, 0.0, hd],
            normal: [0.0, 1.0, 0.0],
            uv: [0.0, 1.0],
        },
    ];
    let indices = vec![0, 1, 2, 2, 3, 0];
    (vertices, indices)
}

/// UV sphere vertex data.
pub fn sphere_mesh(radius: f32, segments: u32, rings: u32) -> (Vec<Vertex>, Vec<u32>) {
    let mut vertices = Vec::new();
    let mut indices = Vec::new();
    for ring in 0..=rings {
        let phi = std::f32::consts::PI * ring as f32 / rings as f32;
        for segment in 0..=segments {
            let theta = std::f32::consts::TAU * segment as f32 / segments as f32;
            let normal = Vec3::new(phi.sin() * theta.cos(), phi.cos(), phi.sin() * theta.sin());
            vertices.push(Vertex {
                position: (normal * radius).to_array(),
                normal: normal.to_array(),
                uv: [
                    segment as f32 / segments as f32,
                    ring as f32 / rings as f32,
                ],
            });
        }
    }
    let stride = segments + 1;
    for ring in 0..rings {
        for segment in 0..segments {
            let a = ring * stride + segment;
            let b = a + stride;
            indices.extend_from_slice(&[a, b, a + 1, a + 1, b, b + 1]);
        }
    }
    (vertices, indices)
}

// --- drawable entities ----------------------------------------------------

/// A single mesh with a material.
pub struct Mesh {
    pub geometry: Arc<Geometry>,
    pub material: Arc<dyn Material>,
    /// Render a cubemap of the surrounding scene at this mesh every frame
    /// and bind it to the draw for reflections.
    pub environment: bool,
}

/// A mesh drawn many times with per-instance transforms.
pub struct InstancedMesh {
    pub geometry: Arc<Geometry>,
    pub material: Arc<dyn Material>,
    pub instance_buffer: wgpu::Buffer,
    pub instance_count: u32,
}

impl InstancedMesh {
    pub fn new(
        gpu: &GpuContext,
        geometry: Arc<Geometry>,
        material: Arc<dyn Material>,
        transforms: &[Mat4],
    ) -> Self {
        let raw: Vec<InstanceRaw> = transforms
            .iter()
            .map(|m| InstanceRaw::from_mat4(*m))
            .collect();
        let instance_buffer = gpu
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("Instance Buffer"),
                contents: bytemuck::cast_slice(&raw),
                usage: wgpu::BufferUsages::VERTEX,
            });
        Self {
            geometry,
            material,
            instance_buffer,
            instance_count: transforms.len() as u32,
        }
    }
}

/// One straight segment of a [`LineMesh`].
#[derive(Clone, Copy, Debug)]
pub struct LineSegment {
    pub start: Vec3,
    pub end: Vec3,
    pub color: Vec4,
}

/// A batch of line segments sharing one material.
///
/// Segments are drawn with line-list topology; each segment's color is
/// bound over the material's `color` parameter for its draw.
pub struct LineMesh {
    pub geometry: Arc<Geometry>,
    pub material: Arc<dyn Material>,
    pub segments: Vec<LineSegment>,
}

impl LineMesh {
    pub fn new(
        gpu: &GpuContext,
        material: Arc<dyn Material>,
        segments: Vec<LineSegment>,
    ) -> Result<Self> {
        let vertices: Vec<Vertex> = segments
            .iter()
            .flat_map(|s| {
                let dir = (s.end - s.start).normalize_or_zero();
                [s.start, s.end].map(|p| Vertex {
                    position: p.to_array(),
                    normal: dir.to_array(),
                    uv: [0.0, 0.0],
                })
            })
            .collect();
        let geometry = Arc::new(Geometry::new(gpu, &vertices, None)?);
        Ok(Self {
            geometry,
            material,
            segments,
        })
    }
}

// --- ray marching ---------------------------------------------------------

/// The scalar field a [`RayMarcher`] traces through.
pub enum MarchFunction {
    /// WGSL body of `fn scene_distance(p: vec3f) -> f32`, a signed
    /// distance to the surface.
    SignedDistance(String),
    /// WGSL body of `fn scene_density(p: vec3f) -> f32`, accumulated
    /// along the ray until it saturates.
    Density(String),
}

/// A screen-space entity that ray-marches a procedural field.
///
/// Drawn as a full-screen triangle after opaque geometry; fragments that
/// never hit the field are discarded and hits write their own fragment
/// depth so marched surfaces composite correctly with rasterized ones.
pub struct RayMarcher {
    pub function: MarchFunction,
    pub material: Arc<dyn Material>,
    /// World-space distance at which a ray gives up.
    pub max_distance: f32,
}

impl RayMarcher {
    pub fn new(function: MarchFunction, material: Arc<dyn Material>) -> Self {
        Self {
            function,
            material,
            max_distance: 100.0,
        }
    }

    /// WGSL for the user field function plus the march loop.
    ///
    /// The loop runs a fixed 100 iterations; the surrounding shader calls
    /// `march(origin, direction)` and reads back the hit position and a
    /// hit flag. Density fields accumulate instead of sphere-tracing and
    /// report a hit once the integral passes 1.
    pub fn march_source(&self) -> String {
        let mut source = String::new();
        match &self.function {
            MarchFunction::SignedDistance(body) => {
                source.push_str("fn scene_distance(p: vec3f) -> f32 {\n");
                source.push_str(body);
                source.push_str("\n}\n\n");
                source.push_str(&format!(
                    r#"struct MarchResult {{
    position: vec3f,
    hit: bool,
}}

fn march(origin: vec3f, direction: vec3f) -> MarchResult {{
    var result: MarchResult;
    result.position = origin;
    result.hit = false;
    var travelled = 0.0;
    for (var i = 0; i < 100; i += 1) {{
        let d = scene_distance(result.position);
        if (d < 0.001) {{
            result.hit = true;
            break;
        }}
        travelled += d;
        if (travelled > {max:?}) {{
            break;
        }}
        result.position += direction * d;
    }}
    return result;
}}
"#,
                    max = self.max_distance
                ));
            }
            MarchFunction::Density(body) => {
                source.push_str("fn scene_density(p: vec3f) -> f32 {\n");
                source.push_str(body);
                source.push_str("\n}\n\n");
                source.push_str(&format!(
                    r#"struct MarchResult {{
    position: vec3f,
    hit: bool,
}}

fn march(origin: vec3f, direction: vec3f) -> MarchResult {{
    var result: MarchResult;
    result.position = origin;
    result.hit = false;
    let step = {max:?} / 100.0;
    var accumulated = 0.0;
    for (var i = 0; i < 100; i += 1) {{
        accumulated += scene_density(result.position) * step;
        if (accumulated >= 1.0) {{
            result.hit = true;
            break;
        }}
        result.position += direction * step;
    }}
    return result;
}}
"#,
                    max = self.max_distance
                ));
            }
        }
        source
    }
}

// --- lights ---------------------------------------------------------------

/// Shadow technique for lights that can cast shadows.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Shadows {
    /// No shadow map is rendered for this light.
    None,
    /// Single-tap depth comparison.
    Simple { map_size: u32 },
    /// Percentage-closer filtering with a Poisson tap disk.
    Pcf { map_size: u32, sample_count: u32 },
    /// Variance shadow maps; the depth moments buffer is blurred after
    /// the shadow pass.
    Vsm { map_size: u32 },
}

impl Shadows {
    pub fn simple() -> Self {
        Shadows::Simple { map_size: 1024 }
    }

    pub fn pcf() -> Self {
        Shadows::Pcf {
            map_size: 1024,
            sample_count: 12,
        }
    }

    pub fn vsm() -> Self {
        Shadows::Vsm { map_size: 1024 }
    }

    pub fn map_size(&self) -> Option<u32> {
        match self {
            Shadows::None => None,
            Shadows::Simple { map_size }
            | Shadows::Pcf { map_size, .. }
            | Shadows::Vsm { map_size } => Some(*map_size),
        }
    }

    /// Whether a shadow map gets rendered for this technique at all.
    pub fn is_mapped(&self) -> bool {
        !matches!(self, Shadows::None)
    }

    /// Whether the technique samples a raw depth map.
    pub fn is_depth_mapped(&self) -> bool {
        matches!(self, Shadows::Simple { .. } | Shadows::Pcf { .. })
    }

    /// Whether the technique samples a color moments map.
    pub fn is_color_mapped(&self) -> bool {
        matches!(self, Shadows::Vsm { .. })
    }
}

/// A light attached to a scene node.
///
/// Direction and position come from the node's world transform: lights
/// shine down their node's -Z axis from the node's origin.
pub enum Light {
    Ambient(AmbientLight),
    Point(PointLight),
    Directional(DirectionalLight),
    Spot(SpotLight),
    Area(AreaLight),
    Hemisphere(HemisphereLight),
}

impl Light {
    pub fn color(&self) -> Vec4 {
        match self {
            Light::Ambient(l) => l.color,
            Light::Point(l) => l.color,
            Light::Directional(l) => l.color,
            Light::Spot(l) => l.color,
            Light::Area(l) => l.color,
            Light::Hemisphere(l) => l.up_color,
        }
    }

    /// The shadow technique, for lights that support shadows.
    pub fn shadows(&self) -> Shadows {
        match self {
            Light::Directional(l) => l.shadows,
            Light::Spot(l) => l.shadows,
            Light::Area(l) => l.shadows,
            _ => Shadows::None,
        }
    }

    /// Projection matrix for this light's shadow pass, `None` for lights
    /// that cannot cast shadows.
    pub fn shadow_projection(&self) -> Option<Mat4> {
        match self {
            Light::Directional(l) => Some(l.projection()),
            Light::Spot(l) => Some(l.projection()),
            Light::Area(l) => Some(l.projection()),
            _ => None,
        }
    }

    /// View matrix for this light's shadow pass given its node transform.
    pub fn shadow_view(world: Mat4) -> Mat4 {
        world.inverse()
    }
}

/// Uniform light added to every surface.
pub struct AmbientLight {
    pub color: Vec4,
}

impl Default for AmbientLight {
    fn default() -> Self {
        Self {
            color: Vec4::new(0.1, 0.1, 0.1, 1.0),
        }
    }
}

/// Omnidirectional light with distance attenuation.
pub struct PointLight {
    pub color: Vec4,
    pub constant_attenuation: f32,
    pub linear_attenuation: f32,
    pub quadratic_attenuation: f32,
}

impl Default for PointLight {
    fn default() -> Self {
        Self {
            color: Vec4::ONE,
            constant_attenuation: 1.0,
            linear_attenuation: 0.0,
            quadratic_attenuation: 0.0,
        }
    }
}

impl PointLight {
    /// Attenuation factor at `distance`, matching the shader term.
    pub fn attenuation(&self, distance: f32) -> f32 {
        1.0 / (self.constant_attenuation
            + self.linear_attenuation * distance
            + self.quadratic_attenuation * distance * distance)
    }
}

/// Parallel light, shining down the node's -Z axis.
pub struct DirectionalLight {
    pub color: Vec4,
    pub shadows: Shadows,
    /// Side length of the orthographic shadow frustum.
    pub projection_size: f32,
}

impl Default for DirectionalLight {
    fn default() -> Self {
        Self {
            color: Vec4::ONE,
            shadows: Shadows::None,
            projection_size: 10.0,
        }
    }
}

impl DirectionalLight {
    pub fn projection(&self) -> Mat4 {
        let half = self.projection_size / 2.0;
        Mat4::orthographic_rh(-half, half, -half, half, 1.0, 150.0)
    }
}

/// Cone light with an inner full-intensity angle and an outer cutoff.
pub struct SpotLight {
    pub color: Vec4,
    pub shadows: Shadows,
    /// Inner cone half-angle in degrees; inside it the light is full.
    pub inner_angle: f32,
    /// Outer cone half-angle in degrees; outside it the light is zero.
    pub outer_angle: f32,
    pub constant_attenuation: f32,
    pub linear_attenuation: f32,
    pub quadratic_attenuation: f32,
}

impl Default for SpotLight {
    fn default() -> Self {
        Self {
            color: Vec4::ONE,
            shadows: Shadows::None,
            inner_angle: 45.0,
            outer_angle: 50.0,
            constant_attenuation: 1.0,
            linear_attenuation: 0.0,
            quadratic_attenuation: 0.0,
        }
    }
}

impl SpotLight {
    /// Shadow projection covering the full outer cone.
    pub fn projection(&self) -> Mat4 {
        Mat4::perspective_rh((self.outer_angle * 2.0).to_radians(), 1.0, 1.0, 150.0)
    }

    /// Angular falloff for a given cosine between the light axis and the
    /// direction to the surface, matching the shader term.
    ///
    /// Full intensity inside the inner cone, zero outside the outer cone,
    /// linear in the cosine in between.
    pub fn falloff(&self, cos_hit: f32) -> f32 {
        let inner_cos = self.inner_angle.to_radians().cos();
        let outer_cos = self.outer_angle.to_radians().cos();
        ((cos_hit - outer_cos) / (inner_cos - outer_cos)).clamp(0.0, 1.0)
    }

    pub fn attenuation(&self, distance: f32) -> f32 {
        1.0 / (self.constant_attenuation
            + self.linear_attenuation * distance
            + self.quadratic_attenuation * distance * distance)
    }
}

/// Rectangular emitter shaded with linearly transformed cosines.
///
/// Requires the LTC lookup tables to be loaded into the renderer.
pub struct AreaLight {
    pub color: Vec4,
    pub shadows: Shadows,
    pub width: f32,
    pub height: f32,
    pub two_sided: bool,
}

impl Default for AreaLight {
    fn default() -> Self {
        Self {
            color: Vec4::ONE,
            shadows: Shadows::None,
            width: 1.0,
            height: 1.0,
            two_sided: false,
        }
    }
}

impl AreaLight {
    pub fn projection(&self) -> Mat4 {
        Mat4::perspective_rh(90.0f32.to_radians(), 1.0, 1.0, 150.0)
    }
}

/// Gradient light blending between a down color and an up color by the
/// surface normal's alignment with the node's -Z axis.
pub struct HemisphereLight {
    pub up_color: Vec4,
    pub down_color: Vec4,
    /// Optional prefiltered irradiance cubemap modulating the gradient.
    pub irradiance: Option<Arc<crate::buffer::Cubemap>>,
}

impl Default for HemisphereLight {
    fn default() -> Self {
        Self {
            up_color: Vec4::ONE,
            down_color: Vec4::new(0.0, 0.0, 0.0, 1.0),
            irradiance: None,
        }
    }
}

// --- fog ------------------------------------------------------------------

/// Linear view-distance fog blended into the final shaded color.
pub struct Fog {
    pub color: Vec4,
    /// View-space depth at which surfaces are fully fogged.
    pub end: f32,
}

impl Default for Fog {
    fn default() -> Self {
        Self {
            color: Vec4::ONE,
            end: 100.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn point_light_attenuation_is_inverse_polynomial() {
        let light = PointLight {
            constant_attenuation: 1.0,
            linear_attenuation: 0.5,
            quadratic_attenuation: 0.25,
            ..Default::default()
        };
        assert_eq!(light.attenuation(0.0), 1.0);
        let d = 2.0;
        let expected = 1.0 / (1.0 + 0.5 * d + 0.25 * d * d);
        assert!((light.attenuation(d) - expected).abs() < 1e-6);
        // default light never attenuates
        assert_eq!(PointLight::default().attenuation(100.0), 1.0);
    }

    #[test]
    fn spot_falloff_clamps_at_both_cones() {
        let light = SpotLight {
            inner_angle: 30.0,
            outer_angle: 60.0,
            ..Default::default()
        };
        // on axis: full intensity
        assert_eq!(light.falloff(1.0), 1.0);
        // outside the outer cone: zero
        assert_eq!(light.falloff(70.0f32.to_radians().cos()), 0.0);
        // between the cones: strictly between 0 and 1
        let mid = light.falloff(45.0f32.to_radians().cos());
        assert!(mid > 0.0 && mid < 1.0);
        // monotone toward the axis
        assert!(light.falloff(35.0f32.to_radians().cos()) > mid);
    }

    #[test]
    fn directional_projection_spans_the_configured_extent() {
        let light = DirectionalLight {
            projection_size: 20.0,
            ..Default::default()
        };
        let proj = light.projection();
        // corners of the near plane map to clip-space corners
        let corner = proj * Vec4::new(10.0, 10.0, -1.0, 1.0);
        assert!((corner.x - 1.0).abs() < 1e-5);
        assert!((corner.y - 1.0).abs() < 1e-5);
        // far plane maps to depth 1
        let far = proj * Vec4::new(0.0, 0.0, -150.0, 1.0);
        assert!((far.z / far.w - 1.0).abs() < 1e-5);
    }

    #[test]
    fn shadow_view_inverts_the_node_transform() {
        let world = Mat4::from_translation(Vec3::new(3.0, 4.0, 5.0));
        let view = Light::shadow_view(world);
        let origin = view * Vec4::new(3.0, 4.0, 5.0, 1.0);
        assert!(origin.truncate().length() < 1e-6);
    }

    #[test]
    fn sdf_march_source_embeds_the_field_and_loop() {
        let material = crate::material::PbrMaterial::new();
        let marcher = RayMarcher::new(
            MarchFunction::SignedDistance("return length(p) - 1.0;".into()),
            Arc::new(material),
        );
        let source = marcher.march_source();
        assert!(source.contains("fn scene_distance(p: vec3f) -> f32"));
        assert!(source.contains("return length(p) - 1.0;"));
        assert!(source.contains("for (var i = 0; i < 100; i += 1)"));
        assert!(source.contains("fn march(origin: vec3f, direction: vec3f) -> MarchResult"));
    }

    #[test]
    fn density_march_source_accumulates_instead_of_sphere_tracing() {
        let material = crate::material::PbrMaterial::new();
        let marcher = RayMarcher::new(
            MarchFunction::Density("return 0.1;".into()),
            Arc::new(material),
        );
        let source = marcher.march_source();
        assert!(source.contains("fn scene_density(p: vec3f) -> f32"));
        assert!(source.contains("accumulated >= 1.0"));
        assert!(!source.contains("scene_distance"));
    }

    #[test]
    fn box_mesh_has_one_quad_per_face() {
        let (vertices, indices) = box_mesh(2.0, 2.0, 2.0);
        assert_eq!(vertices.len(), 24);
        assert_eq!(indices.len(), 36);
        for v in &vertices {
            // corners of the unit cube
            for c in v.position {
                assert!((c.abs() - 1.0).abs() < 1e-6);
            }
            let n = Vec3::from_array(v.normal);
            assert!((n.length() - 1.0).abs() < 1e-6);
        }
    }

    #[test]
    fn sphere_mesh_vertices_sit_on_the_sphere() {
        let (vertices, indices) = sphere_mesh(2.0, 8, 4);
        assert_eq!(vertices.len(), (8 + 1) * (4 + 1));
        assert_eq!(indices.len(), (8 * 4 * 6) as usize);
        for v in &vertices {
            let p = Vec3::from_array(v.position);
            assert!((p.length() - 2.0).abs() < 1e-5);
            let n = Vec3::from_array(v.normal);
            assert!((p.normalize() - n).length() < 1e-5);
        }
    }
}
