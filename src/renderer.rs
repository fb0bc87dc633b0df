//! The frame orchestrator.
//!
//! [`SceneRenderer`] turns a [`Scene`] and a [`Camera`] into a presented
//! image. Each frame runs the scene's update callbacks, recomputes world
//! transforms, renders shadow maps for every shadow-casting light, renders
//! a cubemap probe per environment-mapped mesh, renders the output pass
//! into named buffers, runs the post chain and blits the configured output
//! buffer to the target view. Any missing buffer, parameter or lookup
//! table fails the frame with an error naming it.

use std::collections::HashMap;
use std::mem;
use std::ops::Range;
use std::sync::Arc;

use glam::{Mat4, Vec3, Vec4};

use crate::blit::Blitter;
use crate::buffer::{CUBEMAP_SIDES, ColorBuffer, Cubemap, DepthBuffer, FrameBuffers};
use crate::camera::Camera;
use crate::entity::Light;
use crate::error::{RenderError, Result};
use crate::facet::{FacetCombiner, RenderPass};
use crate::gpu::GpuContext;
use crate::ltc::{LtcTables, LtcTextures};
use crate::material::{LightSlot, Material, MaterialContext, light_parameters};
use crate::pipeline::{CompiledStyle, PipelineCache};
use crate::post::blur::ApproximateGaussianBlur;
use crate::post::{PostContext, PostStep, ScreenEffect, run_steps};
use crate::scene::{NodeId, Scene};
use crate::shade::{Globals, ParamValue};

const MAIN_DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth24Plus;
const SHADOW_DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth16Unorm;
const PROBE_SIZE: u32 = 256;

/// A reflection probe rendered at an environment-mapped mesh every frame.
struct EnvironmentProbe {
    cubemap: Cubemap,
    depth: DepthBuffer,
}

/// Per-frame light state, owned so it outlives the scene borrows that
/// produced it.
struct FrameLights {
    slots: Vec<LightSlot>,
    values: Vec<(String, ParamValue)>,
    /// `shadowMap<i>` views, depth maps and blurred moment maps alike.
    shadow_views: Vec<(String, wgpu::TextureView)>,
    irradiance: Vec<(String, Arc<Cubemap>)>,
    fog_color: Vec4,
    fog_end: f32,
    fog_present: bool,
}

impl FrameLights {
    fn none() -> Self {
        Self {
            slots: Vec::new(),
            values: Vec::new(),
            shadow_views: Vec::new(),
            irradiance: Vec::new(),
            fog_color: Vec4::new(1.0, 1.0, 1.0, 0.0),
            fog_end: 100.0,
            fog_present: false,
        }
    }
}

/// Non-geometry inputs a pass binds per draw.
struct BindSources<'a> {
    lights: &'a FrameLights,
    ltc: Option<&'a LtcTextures>,
    /// Probe cubemap view per environment-mapped mesh node.
    environments: &'a HashMap<NodeId, wgpu::TextureView>,
}

/// One recorded pass: where to render, from where, and what.
struct PassDesc<'a> {
    pass: &'a RenderPass,
    view: Mat4,
    projection: Mat4,
    /// One view per combiner, in combiner order.
    color_views: Vec<wgpu::TextureView>,
    depth_view: wgpu::TextureView,
    depth_format: wgpu::TextureFormat,
    clear: bool,
    depth_write: bool,
    /// Shadow passes cull front faces instead of back faces.
    front_cull: bool,
    /// Ray marchers and line meshes are camera passes only.
    camera_pass: bool,
    /// Node left out of the pass; a probe never renders its own mesh.
    exclude: Option<NodeId>,
}

/// Everything needed to issue one draw once the render pass is open.
struct PreparedDraw<'a> {
    compiled: Arc<CompiledStyle>,
    globals: wgpu::BindGroup,
    params: wgpu::BindGroup,
    vertex_buffer: Option<&'a wgpu::Buffer>,
    instance_buffer: Option<&'a wgpu::Buffer>,
    index: Option<(&'a wgpu::Buffer, Range<u32>)>,
    vertices: Range<u32>,
    instances: Range<u32>,
}

/// Renders scenes through a configurable output pass and post chain.
pub struct SceneRenderer {
    pipelines: PipelineCache,
    blitter: Blitter,
    /// The pass whose combiners publish the frame's named buffers.
    pub output_pass: RenderPass,
    /// Post steps run after the output pass, in order.
    pub post_steps: Vec<PostStep>,
    /// Name of the buffer blitted to the target at the end of the frame.
    pub output_name: String,
    /// Named buffers produced this frame; reused across frames.
    pub buffers: FrameBuffers,
    /// Blit the output buffer to the target at the end of the frame. Turn
    /// off to consume the named buffers from a node draw callback instead.
    pub draw_final_buffer: bool,
    depth: Option<DepthBuffer>,
    shadow_maps: HashMap<(NodeId, usize), DepthBuffer>,
    shadow_blur: ApproximateGaussianBlur,
    probes: HashMap<NodeId, EnvironmentProbe>,
    ltc: Option<LtcTextures>,
    frame: u64,
}

impl SceneRenderer {
    /// A forward renderer presenting the fogged LDR color buffer.
    pub fn new(gpu: &GpuContext) -> Self {
        Self::with_pass(gpu, RenderPass::default_pass(), "color")
    }

    /// A renderer with a custom output pass, presenting `output`.
    pub fn with_pass(gpu: &GpuContext, pass: RenderPass, output: impl Into<String>) -> Self {
        Self {
            pipelines: PipelineCache::new(gpu),
            blitter: Blitter::new(gpu),
            output_pass: pass,
            post_steps: Vec::new(),
            output_name: output.into(),
            buffers: FrameBuffers::new(),
            draw_final_buffer: true,
            depth: None,
            shadow_maps: HashMap::new(),
            shadow_blur: ApproximateGaussianBlur::new(gpu),
            probes: HashMap::new(),
            ltc: None,
            frame: 0,
        }
    }

    /// Upload the area-light lookup tables. Required before rendering any
    /// scene containing an area light.
    pub fn set_ltc_tables(&mut self, gpu: &GpuContext, tables: &LtcTables) {
        self.ltc = Some(tables.upload(gpu));
    }

    /// Set a parameter on the first post step publishing `output`.
    ///
    /// Unknown names are ignored by the filter, so this is safe to call
    /// every frame for animated parameters.
    pub fn set_post_param(&mut self, output: &str, name: &str, value: ParamValue) {
        for step in &mut self.post_steps {
            if step.output_name() == output {
                if let PostStep::Filter(filter_step) = step {
                    filter_step.filter.set_param(name, value);
                }
                return;
            }
        }
    }

    /// Render one frame into `target`.
    pub fn render(
        &mut self,
        gpu: &GpuContext,
        scene: &mut Scene,
        camera: &Camera,
        target: &wgpu::TextureView,
        target_format: wgpu::TextureFormat,
    ) -> Result<()> {
        self.frame += 1;
        tracing::trace!(frame = self.frame, "rendering frame");

        let mut updates = mem::take(&mut scene.update_functions);
        for update in updates.iter_mut() {
            update(scene);
        }
        let mut added = mem::replace(&mut scene.update_functions, updates);
        scene.update_functions.append(&mut added);

        scene.update_world_transforms();

        let width = gpu.width();
        let height = gpu.height();
        let mut encoder = gpu
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Frame Encoder"),
            });

        let draw_nodes: Vec<NodeId> = scene.find_nodes(|n| n.draw.is_some());

        let view = camera.view_matrix();
        let projection = camera.projection_matrix(gpu.aspect());

        self.render_shadow_maps(gpu, &mut encoder, scene)?;
        let lights = self.collect_lights(scene);
        self.render_probes(gpu, &mut encoder, scene, &lights)?;
        self.render_output_pass(gpu, &mut encoder, scene, &lights, view, projection, width, height)?;

        for id in draw_nodes {
            if let Some(draw) = scene.node_mut(id).draw.as_mut() {
                draw(&mut encoder);
            }
        }

        let context = PostContext {
            projection,
            view,
            width,
            height,
            frame: self.frame,
        };
        run_steps(
            &mut self.post_steps,
            gpu,
            &mut encoder,
            &mut self.buffers,
            &context,
        )?;

        if self.draw_final_buffer {
            let output = self.buffers.get(&self.output_name)?;
            let output_view = output.level_view(0);
            self.blitter
                .blit(gpu, &mut encoder, &output_view, target, target_format);
        }

        gpu.queue.submit(std::iter::once(encoder.finish()));
        Ok(())
    }

    /// Render a depth (or depth-moment) map for every shadow-casting
    /// light, blurring the moment maps for variance shadows.
    fn render_shadow_maps(
        &mut self,
        gpu: &GpuContext,
        encoder: &mut wgpu::CommandEncoder,
        scene: &Scene,
    ) -> Result<()> {
        let lights = scene.lights();
        for (i, light) in lights.iter().enumerate() {
            let shadows = light.content.shadows();
            let Some(map_size) = shadows.map_size() else {
                continue;
            };
            let Some(light_projection) = light.content.shadow_projection() else {
                continue;
            };

            let key = (light.node, light.entity_index);
            let stale = self
                .shadow_maps
                .get(&key)
                .map(|d| d.width() != map_size)
                .unwrap_or(true);
            if stale {
                tracing::debug!(map_size, "allocating shadow map");
                self.shadow_maps.insert(
                    key,
                    DepthBuffer::new(gpu, map_size, map_size, SHADOW_DEPTH_FORMAT, "Shadow Map"),
                );
            }
            let depth_view = self.shadow_maps[&key]
                .texture
                .create_view(&wgpu::TextureViewDescriptor::default());

            let vsm = shadows.is_color_mapped();
            let pass = if vsm {
                RenderPass::vsm_light_pass()
            } else {
                RenderPass::light_pass()
            };
            let mut color_views = Vec::new();
            if vsm {
                let name = format!("moments{i}");
                if let Ok(existing) = self.buffers.get(&name) {
                    if existing.width() != map_size {
                        self.buffers.remove(&name);
                    }
                }
                let buffer = self.buffers.get_or_insert_with(&name, || {
                    ColorBuffer::new(
                        gpu,
                        map_size,
                        map_size,
                        FacetCombiner::Moments.format(),
                        1,
                        &name,
                    )
                });
                color_views.push(buffer.level_view(0));
            }

            let desc = PassDesc {
                pass: &pass,
                view: Light::shadow_view(light.world),
                projection: light_projection,
                color_views,
                depth_view,
                depth_format: SHADOW_DEPTH_FORMAT,
                clear: true,
                depth_write: true,
                front_cull: true,
                camera_pass: false,
                exclude: None,
            };
            record_pass(
                &mut self.pipelines,
                gpu,
                encoder,
                scene,
                desc,
                &BindSources {
                    lights: &FrameLights::none(),
                    ltc: None,
                    environments: &HashMap::new(),
                },
            )?;

            if vsm {
                let buffer = self.buffers.get(&format!("moments{i}"))?;
                self.shadow_blur.apply(gpu, encoder, &[buffer], buffer)?;
            }
        }
        Ok(())
    }

    /// Snapshot light state into owned per-frame data: structural slots,
    /// parameter values and the texture views shadow sampling binds.
    fn collect_lights(&self, scene: &Scene) -> FrameLights {
        let lights = scene.lights();
        let mut frame = FrameLights::none();
        for (i, light) in lights.iter().enumerate() {
            frame.slots.push(LightSlot::of(light.content));
            frame
                .values
                .extend(light_parameters(i, light.content, light.world));
            if light.content.shadows().is_mapped() {
                let view = if light.content.shadows().is_color_mapped() {
                    self.buffers.get(&format!("moments{i}")).ok().map(|b| {
                        b.texture
                            .create_view(&wgpu::TextureViewDescriptor::default())
                    })
                } else {
                    self.shadow_maps.get(&(light.node, light.entity_index)).map(|d| {
                        d.texture
                            .create_view(&wgpu::TextureViewDescriptor::default())
                    })
                };
                if let Some(view) = view {
                    frame.shadow_views.push((format!("shadowMap{i}"), view));
                }
            }
            if let Light::Hemisphere(h) = light.content {
                if let Some(cube) = &h.irradiance {
                    frame
                        .irradiance
                        .push((format!("lightIrradiance{i}"), cube.clone()));
                }
            }
        }
        if let Some(fog) = scene.fogs().first() {
            frame.fog_color = fog.content.color;
            frame.fog_end = fog.content.end;
            frame.fog_present = true;
        }
        frame
    }

    /// Render a cubemap per environment-mapped mesh: six faces of the
    /// surrounding scene, the mesh itself left out, mip chain rebuilt
    /// after.
    fn render_probes(
        &mut self,
        gpu: &GpuContext,
        encoder: &mut wgpu::CommandEncoder,
        scene: &Scene,
        lights: &FrameLights,
    ) -> Result<()> {
        let flagged: Vec<(NodeId, Vec3)> = scene
            .meshes()
            .iter()
            .filter(|m| m.content.environment)
            .map(|m| (m.node, m.world.w_axis.truncate()))
            .collect();
        self.probes.retain(|node, _| flagged.iter().any(|(n, _)| n == node));

        let pass = RenderPass::default_pass();
        let projection = Mat4::perspective_rh(90.0f32.to_radians(), 1.0, 0.1, 500.0);
        for (node, position) in flagged {
            let probe = match self.probes.entry(node) {
                std::collections::hash_map::Entry::Occupied(entry) => entry.into_mut(),
                std::collections::hash_map::Entry::Vacant(entry) => {
                    tracing::debug!(?node, "allocating environment probe");
                    entry.insert(EnvironmentProbe {
                        cubemap: Cubemap::new(
                            gpu,
                            PROBE_SIZE,
                            wgpu::TextureFormat::Rgba8Unorm,
                            "Environment Probe",
                        ),
                        depth: DepthBuffer::new(
                            gpu,
                            PROBE_SIZE,
                            PROBE_SIZE,
                            MAIN_DEPTH_FORMAT,
                            "Probe Depth",
                        ),
                    })
                }
            };
            for side in CUBEMAP_SIDES {
                let view = Mat4::look_to_rh(position, side.forward(), side.up());
                let desc = PassDesc {
                    pass: &pass,
                    view,
                    projection,
                    color_views: vec![probe.cubemap.face_view(side, 0)],
                    depth_view: probe
                        .depth
                        .texture
                        .create_view(&wgpu::TextureViewDescriptor::default()),
                    depth_format: MAIN_DEPTH_FORMAT,
                    clear: true,
                    depth_write: true,
                    front_cull: false,
                    camera_pass: false,
                    exclude: Some(node),
                };
                record_pass(
                    &mut self.pipelines,
                    gpu,
                    encoder,
                    scene,
                    desc,
                    &BindSources {
                        lights,
                        ltc: self.ltc.as_ref(),
                        environments: &HashMap::new(),
                    },
                )?;
            }
            self.blitter.generate_cubemap_mipmaps(
                gpu,
                encoder,
                &probe.cubemap,
                wgpu::TextureFormat::Rgba8Unorm,
            );
        }
        Ok(())
    }

    /// Render the output pass (and a transparent sub-pass when the scene
    /// has transparent materials), publishing one buffer per combiner.
    #[allow(clippy::too_many_arguments)]
    fn render_output_pass(
        &mut self,
        gpu: &GpuContext,
        encoder: &mut wgpu::CommandEncoder,
        scene: &Scene,
        lights: &FrameLights,
        view: Mat4,
        projection: Mat4,
        width: u32,
        height: u32,
    ) -> Result<()> {
        let depth_stale = self
            .depth
            .as_ref()
            .map(|d| d.width() != width || d.height() != height)
            .unwrap_or(true);
        if depth_stale {
            self.depth = Some(DepthBuffer::new(
                gpu,
                width,
                height,
                MAIN_DEPTH_FORMAT,
                "Scene Depth",
            ));
        }

        let mut color_views = Vec::new();
        for combiner in &self.output_pass.combiners {
            let name = combiner.name();
            if let Ok(existing) = self.buffers.get(name) {
                if existing.width() != width || existing.height() != height {
                    self.buffers.remove(name);
                }
            }
            let buffer = self.buffers.get_or_insert_with(name, || {
                ColorBuffer::new(gpu, width, height, combiner.format(), 1, name)
            });
            color_views.push(buffer.level_view(0));
        }
        let depth_view = match &self.depth {
            Some(depth) => depth
                .texture
                .create_view(&wgpu::TextureViewDescriptor::default()),
            None => unreachable!("allocated above"),
        };

        let environments: HashMap<NodeId, wgpu::TextureView> = self
            .probes
            .iter()
            .map(|(node, probe)| {
                let view = probe.cubemap.texture.create_view(&wgpu::TextureViewDescriptor {
                    dimension: Some(wgpu::TextureViewDimension::Cube),
                    ..Default::default()
                });
                (*node, view)
            })
            .collect();
        let sources = BindSources {
            lights,
            ltc: self.ltc.as_ref(),
            environments: &environments,
        };

        let opaque = PassDesc {
            pass: &self.output_pass,
            view,
            projection,
            color_views,
            depth_view,
            depth_format: MAIN_DEPTH_FORMAT,
            clear: true,
            depth_write: true,
            front_cull: false,
            camera_pass: true,
            exclude: None,
        };
        record_pass(&mut self.pipelines, gpu, encoder, scene, opaque, &sources)?;

        let any_transparent = scene.meshes().iter().any(|m| m.content.material.transparent())
            || scene
                .instanced_meshes()
                .iter()
                .any(|m| m.content.material.transparent());
        if any_transparent {
            let transparent_pass = self.output_pass.clone().transparent();
            let mut color_views = Vec::new();
            for combiner in &transparent_pass.combiners {
                color_views.push(self.buffers.get(combiner.name())?.level_view(0));
            }
            let depth_view = match &self.depth {
                Some(depth) => depth
                    .texture
                    .create_view(&wgpu::TextureViewDescriptor::default()),
                None => unreachable!("allocated above"),
            };
            let desc = PassDesc {
                pass: &transparent_pass,
                view,
                projection,
                color_views,
                depth_view,
                depth_format: MAIN_DEPTH_FORMAT,
                clear: false,
                depth_write: false,
                front_cull: false,
                camera_pass: false,
                exclude: None,
            };
            record_pass(&mut self.pipelines, gpu, encoder, scene, desc, &sources)?;
        }
        Ok(())
    }
}

/// Record one geometry pass: prepare a draw per visible entity, open the
/// render pass and replay them.
fn record_pass(
    cache: &mut PipelineCache,
    gpu: &GpuContext,
    encoder: &mut wgpu::CommandEncoder,
    scene: &Scene,
    desc: PassDesc<'_>,
    sources: &BindSources<'_>,
) -> Result<()> {
    let needs_light = desc.pass.needs_light();
    let slots: Vec<LightSlot> = if needs_light {
        sources.lights.slots.clone()
    } else {
        Vec::new()
    };
    let has_area = slots.iter().any(|s| matches!(s, LightSlot::Area { .. }));
    if has_area && sources.ltc.is_none() {
        return Err(RenderError::MissingLtcTables);
    }

    let context_for = |instanced: bool, march_source: Option<String>, environment: bool| {
        MaterialContext {
            combiners: desc.pass.combiners.clone(),
            lights: slots.clone(),
            fog: sources.lights.fog_present,
            environment: needs_light && environment,
            instanced,
            march_source,
        }
    };

    let base_values = |material: &dyn Material| {
        let mut values: HashMap<String, ParamValue> = HashMap::new();
        material.apply_parameters(&mut values);
        if needs_light {
            for (name, value) in &sources.lights.values {
                values.insert(name.clone(), value.clone());
            }
        }
        values.insert(
            "fogColor".into(),
            ParamValue::Vec4(sources.lights.fog_color),
        );
        values.insert("fogEnd".into(), ParamValue::F32(sources.lights.fog_end));
        values
    };

    // texture views shared by every draw in this pass
    let mut shared_textures: HashMap<String, &wgpu::TextureView> = HashMap::new();
    if needs_light {
        for (name, view) in &sources.lights.shadow_views {
            shared_textures.insert(name.clone(), view);
        }
        for (name, cube) in &sources.lights.irradiance {
            shared_textures.insert(name.clone(), &cube.view);
        }
        if let Some(ltc) = sources.ltc {
            shared_textures.insert("ltcMat".into(), &ltc.mat.view);
            shared_textures.insert("ltcMag".into(), &ltc.mag.view);
        }
    }

    let mut prepared: Vec<PreparedDraw<'_>> = Vec::new();
    let prepare = |cache: &mut PipelineCache,
                       material: &Arc<dyn Material>,
                       context: &MaterialContext,
                       world: Mat4,
                       topology: wgpu::PrimitiveTopology,
                       values: HashMap<String, ParamValue>,
                       environment: Option<&wgpu::TextureView>|
     -> Result<(Arc<CompiledStyle>, wgpu::BindGroup, wgpu::BindGroup)> {
        let style = material.shade_style(context);
        let cull_mode = if context.march_source.is_some()
            || topology == wgpu::PrimitiveTopology::LineList
            || material.double_sided()
        {
            None
        } else if desc.front_cull {
            Some(wgpu::Face::Front)
        } else {
            Some(wgpu::Face::Back)
        };
        let compiled = cache.compile(
            gpu,
            &style,
            &context.combiners,
            desc.depth_format,
            desc.depth_write,
            topology,
            cull_mode,
        );

        let material_textures = material.textures();
        let mut textures = shared_textures.clone();
        for (name, view) in &material_textures {
            textures.insert(name.clone(), view);
        }
        if let Some(environment) = environment {
            textures.insert("environment".into(), environment);
        }
        let params = cache.params_bind_group(gpu, &compiled, &values, &textures)?;
        let globals = cache.globals_bind_group(
            gpu,
            &Globals::new(world, desc.view, desc.projection),
        );
        Ok((compiled, globals, params))
    };

    let draws_in_pass = |transparent: bool| {
        (transparent && desc.pass.render_transparent)
            || (!transparent && desc.pass.render_opaque)
    };

    for mesh in scene.meshes() {
        if !draws_in_pass(mesh.content.material.transparent()) {
            continue;
        }
        if desc.exclude == Some(mesh.node) {
            continue;
        }
        let environment = if needs_light {
            sources.environments.get(&mesh.node)
        } else {
            None
        };
        let context = context_for(false, None, environment.is_some());
        let (compiled, globals, params) = prepare(
            cache,
            &mesh.content.material,
            &context,
            mesh.world,
            wgpu::PrimitiveTopology::TriangleList,
            base_values(mesh.content.material.as_ref()),
            environment,
        )?;
        let geometry = &mesh.content.geometry;
        prepared.push(PreparedDraw {
            compiled,
            globals,
            params,
            vertex_buffer: Some(&geometry.vertex_buffer),
            instance_buffer: None,
            index: geometry
                .index_buffer
                .as_ref()
                .map(|b| (b, 0..geometry.index_count)),
            vertices: 0..geometry.vertex_count,
            instances: 0..1,
        });
    }

    for mesh in scene.instanced_meshes() {
        if !draws_in_pass(mesh.content.material.transparent()) {
            continue;
        }
        let context = context_for(true, None, false);
        let (compiled, globals, params) = prepare(
            cache,
            &mesh.content.material,
            &context,
            mesh.world,
            wgpu::PrimitiveTopology::TriangleList,
            base_values(mesh.content.material.as_ref()),
            None,
        )?;
        let geometry = &mesh.content.geometry;
        prepared.push(PreparedDraw {
            compiled,
            globals,
            params,
            vertex_buffer: Some(&geometry.vertex_buffer),
            instance_buffer: Some(&mesh.content.instance_buffer),
            index: geometry
                .index_buffer
                .as_ref()
                .map(|b| (b, 0..geometry.index_count)),
            vertices: 0..geometry.vertex_count,
            instances: 0..mesh.content.instance_count,
        });
    }

    if desc.camera_pass {
        for line in scene.line_meshes() {
            if !draws_in_pass(line.content.material.transparent()) {
                continue;
            }
            let context = context_for(false, None, false);
            for (i, segment) in line.content.segments.iter().enumerate() {
                let mut values = base_values(line.content.material.as_ref());
                values.insert("color".into(), ParamValue::Vec4(segment.color));
                let (compiled, globals, params) = prepare(
                    cache,
                    &line.content.material,
                    &context,
                    line.world,
                    wgpu::PrimitiveTopology::LineList,
                    values,
                    None,
                )?;
                let start = (i * 2) as u32;
                prepared.push(PreparedDraw {
                    compiled,
                    globals,
                    params,
                    vertex_buffer: Some(&line.content.geometry.vertex_buffer),
                    instance_buffer: None,
                    index: None,
                    vertices: start..start + 2,
                    instances: 0..1,
                });
            }
        }

        // marchers draw after rasterized geometry so their fragment depth
        // tests against the scene
        for marcher in scene.ray_marchers() {
            let context = context_for(false, Some(marcher.content.march_source()), false);
            let (compiled, globals, params) = prepare(
                cache,
                &marcher.content.material,
                &context,
                marcher.world,
                wgpu::PrimitiveTopology::TriangleList,
                base_values(marcher.content.material.as_ref()),
                None,
            )?;
            prepared.push(PreparedDraw {
                compiled,
                globals,
                params,
                vertex_buffer: None,
                instance_buffer: None,
                index: None,
                vertices: 0..3,
                instances: 0..1,
            });
        }
    }

    let color_attachments: Vec<Option<wgpu::RenderPassColorAttachment>> = desc
        .color_views
        .iter()
        .map(|view| {
            Some(wgpu::RenderPassColorAttachment {
                view,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: if desc.clear {
                        wgpu::LoadOp::Clear(wgpu::Color::BLACK)
                    } else {
                        wgpu::LoadOp::Load
                    },
                    store: wgpu::StoreOp::Store,
                },
                depth_slice: None,
            })
        })
        .collect();
    let mut rpass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
        label: Some("Geometry Pass"),
        color_attachments: &color_attachments,
        depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
            view: &desc.depth_view,
            depth_ops: Some(wgpu::Operations {
                load: if desc.clear {
                    wgpu::LoadOp::Clear(1.0)
                } else {
                    wgpu::LoadOp::Load
                },
                store: wgpu::StoreOp::Store,
            }),
            stencil_ops: None,
        }),
        timestamp_writes: None,
        occlusion_query_set: None,
    });
    for draw in &prepared {
        rpass.set_pipeline(&draw.compiled.pipeline);
        rpass.set_bind_group(0, &draw.globals, &[]);
        rpass.set_bind_group(1, &draw.params, &[]);
        if let Some(vb) = draw.vertex_buffer {
            rpass.set_vertex_buffer(0, vb.slice(..));
        }
        if let Some(ib) = draw.instance_buffer {
            rpass.set_vertex_buffer(1, ib.slice(..));
        }
        match &draw.index {
            Some((buffer, range)) => {
                rpass.set_index_buffer(buffer.slice(..), wgpu::IndexFormat::Uint32);
                rpass.draw_indexed(range.clone(), 0, draw.instances.clone());
            }
            None => rpass.draw(draw.vertices.clone(), draw.instances.clone()),
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    // Without a fog entity, fog parameters still get bound; zero alpha
    // makes the shader's mix a no-op.
    #[test]
    fn foggless_frames_bind_a_transparent_fog() {
        let lights = FrameLights::none();
        assert!(!lights.fog_present);
        assert_eq!(lights.fog_color.w, 0.0);
        assert_eq!(lights.fog_end, 100.0);
    }

    #[test]
    fn shadow_formats_match_their_sampling_mode() {
        // depth compare sampling needs a depth format, moments a float pair
        assert!(SHADOW_DEPTH_FORMAT.is_depth_stencil_format());
        assert_eq!(
            FacetCombiner::Moments.format(),
            wgpu::TextureFormat::Rg16Float
        );
    }
}
