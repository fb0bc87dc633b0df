//! # Dusk
//!
//! **A deferred 3D scene renderer and shader-composition toolkit for wgpu.**
//!
//! Describe a scene as a transform hierarchy with lights, meshes and fog
//! attached, pick or assemble a render pass, and let the renderer generate
//! the shaders: material code and light loops are composed per draw from
//! the structure of the scene, so adding a shadowed spot light or an
//! irradiance probe changes the generated WGSL rather than your code.
//!
//! ## Quick start
//!
//! ```no_run
//! use dusk::*;
//! use glam::{Mat4, Vec3};
//!
//! # fn demo(window: std::sync::Arc<winit::window::Window>) -> Result<()> {
//! let gpu = GpuContext::new(window);
//! let mut renderer = photographic_renderer(&gpu, PhotographicParameters::default());
//!
//! let mut scene = Scene::new();
//! let floor = scene.add_node(scene.root());
//! let (vertices, indices) = plane_mesh(20.0, 20.0);
//! let geometry = std::sync::Arc::new(Geometry::new(&gpu, &vertices, Some(&indices))?);
//! scene.attach(
//!     floor,
//!     Entity::Mesh(Mesh {
//!         geometry,
//!         material: std::sync::Arc::new(PbrMaterial::new()),
//!         environment: false,
//!     }),
//! );
//!
//! let sun = scene.add_node(scene.root());
//! scene.set_local(sun, Mat4::look_at_rh(Vec3::new(4.0, 8.0, 4.0), Vec3::ZERO, Vec3::Y).inverse());
//! scene.attach(
//!     sun,
//!     Entity::Light(Light::Directional(DirectionalLight {
//!         shadows: Shadows::vsm(),
//!         ..DirectionalLight::default()
//!     })),
//! );
//!
//! let camera = Camera::default();
//! # let (target, format) = todo!();
//! renderer.render(&gpu, &mut scene, &camera, &target, format)?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Layers
//!
//! - [`Scene`]: the transform hierarchy and its attached entities.
//! - [`Material`] / [`ShadeStyle`]: shader generation from scene structure.
//! - [`SceneRenderer`]: shadow maps, probes, the output pass and the
//!   post chain, orchestrated per frame.
//! - [`post`]: the screen-filter library the chain is built from.
//!
//! Every failure is fatal and carries the name of what was missing; see
//! [`RenderError`].

mod blit;
mod buffer;
mod camera;
mod entity;
mod error;
mod facet;
mod gpu;
mod ltc;
mod material;
mod pipeline;
pub mod post;
mod presets;
mod renderer;
mod scene;
mod shade;
mod shader_lib;

pub use blit::Blitter;
pub use buffer::{CUBEMAP_SIDES, ColorBuffer, Cubemap, CubemapSide, DepthBuffer, FrameBuffers};
pub use camera::Camera;
pub use entity::{
    AmbientLight, AreaLight, DirectionalLight, Entity, Fog, Geometry, HemisphereLight,
    InstanceRaw, InstancedMesh, Light, LineMesh, LineSegment, MarchFunction, Mesh, PointLight,
    RayMarcher, Shadows, SpotLight, Vertex, box_mesh, plane_mesh, sphere_mesh,
};
pub use error::{RenderError, Result};
pub use facet::{FacetCombiner, FacetType, PassTarget, RenderPass};
pub use gpu::GpuContext;
pub use ltc::{LTC_MAG_CHANNELS, LTC_MAT_CHANNELS, LTC_SIZE, LtcTables, LtcTextures};
pub use material::{
    LightSlot, Material, MaterialContext, MaterialTexture, PbrMaterial, ShadowSlot,
    TextureSource, TextureTarget, light_parameters, shadow_bias_matrix,
};
pub use pipeline::{CompiledStyle, PipelineCache};
pub use presets::{PhotographicParameters, photographic_renderer};
pub use renderer::SceneRenderer;
pub use scene::{NodeContent, NodeDrawFn, NodeId, Scene, SceneNode, SceneUpdateFn};
pub use shade::{Globals, ParamValue, ShadeStyle, UniformKind, UniformLayout};
pub use shader_lib::{BRDF_WGSL, LTC_WGSL, SHADOW_WGSL};

// Re-export glam math types for convenience
pub use glam::{Mat4, Quat, Vec2, Vec3, Vec4};
