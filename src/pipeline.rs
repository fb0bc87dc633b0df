//! Shade-style compilation and pipeline caching.
//!
//! Generated WGSL is compiled into render pipelines keyed by the full
//! source plus the attachment layout, so two draws whose materials
//! generate the same shader against the same targets share one pipeline.
//! Bind groups are rebuilt per draw from packed uniform bytes and the
//! frame's texture views; uniform data goes into a fresh per-draw buffer
//! so earlier draws in the same encoder keep their values.

use std::collections::HashMap;
use std::sync::Arc;

use wgpu::util::DeviceExt;

use crate::error::{RenderError, Result};
use crate::facet::FacetCombiner;
use crate::gpu::GpuContext;
use crate::shade::{Globals, ParamValue, ShadeStyle, UniformKind, UniformLayout};

/// What distinguishes one compiled pipeline from another.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct PipelineKey {
    pub source: String,
    pub targets: Vec<(wgpu::TextureFormat, bool)>,
    pub depth_format: wgpu::TextureFormat,
    pub depth_write: bool,
    pub topology: wgpu::PrimitiveTopology,
    pub cull_mode: Option<wgpu::Face>,
}

/// A compiled shade style: the pipeline plus the layout information needed
/// to bind parameters for it.
pub struct CompiledStyle {
    pub pipeline: wgpu::RenderPipeline,
    pub params_layout: wgpu::BindGroupLayout,
    pub uniform_layout: UniformLayout,
    pub texture_bindings: Vec<(String, UniformKind, u32)>,
}

/// Cache of compiled pipelines and the shared bind-group plumbing.
pub struct PipelineCache {
    pipelines: HashMap<PipelineKey, Arc<CompiledStyle>>,
    globals_layout: wgpu::BindGroupLayout,
    filtering_sampler: wgpu::Sampler,
    comparison_sampler: wgpu::Sampler,
    nearest_sampler: wgpu::Sampler,
}

impl PipelineCache {
    pub fn new(gpu: &GpuContext) -> Self {
        let globals_layout =
            gpu.device
                .create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                    label: Some("Globals Bind Group Layout"),
                    entries: &[wgpu::BindGroupLayoutEntry {
                        binding: 0,
                        visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
                        ty: wgpu::BindingType::Buffer {
                            ty: wgpu::BufferBindingType::Uniform,
                            has_dynamic_offset: false,
                            min_binding_size: None,
                        },
                        count: None,
                    }],
                });

        let filtering_sampler = gpu.device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("Material Sampler"),
            address_mode_u: wgpu::AddressMode::Repeat,
            address_mode_v: wgpu::AddressMode::Repeat,
            address_mode_w: wgpu::AddressMode::Repeat,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });
        let comparison_sampler = gpu.device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("Shadow Sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            compare: Some(wgpu::CompareFunction::LessEqual),
            ..Default::default()
        });
        let nearest_sampler = gpu.device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("Nearest Sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Nearest,
            min_filter: wgpu::FilterMode::Nearest,
            mipmap_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        });

        Self {
            pipelines: HashMap::new(),
            globals_layout,
            filtering_sampler,
            comparison_sampler,
            nearest_sampler,
        }
    }

    /// Compile `style` against the given attachment layout, or return the
    /// cached pipeline.
    pub fn compile(
        &mut self,
        gpu: &GpuContext,
        style: &ShadeStyle,
        combiners: &[FacetCombiner],
        depth_format: wgpu::TextureFormat,
        depth_write: bool,
        topology: wgpu::PrimitiveTopology,
        cull_mode: Option<wgpu::Face>,
    ) -> Arc<CompiledStyle> {
        let source = style.generate_wgsl();
        let key = PipelineKey {
            source: source.clone(),
            targets: combiners
                .iter()
                .map(|c| (c.format(), c.blend() != wgpu::BlendState::REPLACE))
                .collect(),
            depth_format,
            depth_write,
            topology,
            cull_mode,
        };
        if let Some(compiled) = self.pipelines.get(&key) {
            return compiled.clone();
        }

        let shader = gpu
            .device
            .create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some("Shade Style"),
                source: wgpu::ShaderSource::Wgsl(source.into()),
            });

        let texture_bindings = style.texture_bindings();
        let params_layout = self.params_layout(gpu, &texture_bindings);
        let pipeline_layout = gpu
            .device
            .create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some("Shade Style Pipeline Layout"),
                bind_group_layouts: &[&self.globals_layout, &params_layout],
                push_constant_ranges: &[],
            });

        let vertex_layout = crate::entity::Vertex::layout();
        let instance_layout = crate::entity::InstanceRaw::layout();
        let mut vertex_buffers = Vec::new();
        if !style.screen_space {
            vertex_buffers.push(vertex_layout);
            if style.instanced {
                vertex_buffers.push(instance_layout);
            }
        }

        let targets: Vec<Option<wgpu::ColorTargetState>> = combiners
            .iter()
            .map(|c| {
                Some(wgpu::ColorTargetState {
                    format: c.format(),
                    blend: Some(c.blend()),
                    write_mask: wgpu::ColorWrites::ALL,
                })
            })
            .collect();

        let pipeline = gpu
            .device
            .create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some("Shade Style Pipeline"),
                layout: Some(&pipeline_layout),
                vertex: wgpu::VertexState {
                    module: &shader,
                    entry_point: Some("vs"),
                    buffers: &vertex_buffers,
                    compilation_options: Default::default(),
                },
                fragment: Some(wgpu::FragmentState {
                    module: &shader,
                    entry_point: Some("fs"),
                    targets: &targets,
                    compilation_options: Default::default(),
                }),
                primitive: wgpu::PrimitiveState {
                    topology,
                    cull_mode,
                    ..Default::default()
                },
                depth_stencil: Some(wgpu::DepthStencilState {
                    format: depth_format,
                    depth_write_enabled: depth_write,
                    depth_compare: wgpu::CompareFunction::LessEqual,
                    stencil: wgpu::StencilState::default(),
                    bias: wgpu::DepthBiasState::default(),
                }),
                multisample: wgpu::MultisampleState::default(),
                multiview: None,
                cache: None,
            });

        let compiled = Arc::new(CompiledStyle {
            pipeline,
            params_layout,
            uniform_layout: style.uniform_layout(),
            texture_bindings,
        });
        self.pipelines.insert(key, compiled.clone());
        compiled
    }

    fn params_layout(
        &self,
        gpu: &GpuContext,
        texture_bindings: &[(String, UniformKind, u32)],
    ) -> wgpu::BindGroupLayout {
        let mut entries = vec![
            wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            },
            wgpu::BindGroupLayoutEntry {
                binding: 1,
                visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
                ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                count: None,
            },
            wgpu::BindGroupLayoutEntry {
                binding: 2,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Comparison),
                count: None,
            },
            wgpu::BindGroupLayoutEntry {
                binding: 3,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::NonFiltering),
                count: None,
            },
        ];
        for (_, kind, binding) in texture_bindings {
            let ty = match kind {
                UniformKind::Texture2d => wgpu::BindingType::Texture {
                    sample_type: wgpu::TextureSampleType::Float { filterable: true },
                    view_dimension: wgpu::TextureViewDimension::D2,
                    multisampled: false,
                },
                UniformKind::TextureUnfiltered2d => wgpu::BindingType::Texture {
                    sample_type: wgpu::TextureSampleType::Float { filterable: false },
                    view_dimension: wgpu::TextureViewDimension::D2,
                    multisampled: false,
                },
                UniformKind::TextureCube => wgpu::BindingType::Texture {
                    sample_type: wgpu::TextureSampleType::Float { filterable: true },
                    view_dimension: wgpu::TextureViewDimension::Cube,
                    multisampled: false,
                },
                UniformKind::TextureShadow => wgpu::BindingType::Texture {
                    sample_type: wgpu::TextureSampleType::Depth,
                    view_dimension: wgpu::TextureViewDimension::D2,
                    multisampled: false,
                },
                _ => unreachable!("uniform kinds never appear in texture bindings"),
            };
            entries.push(wgpu::BindGroupLayoutEntry {
                binding: *binding,
                visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
                ty,
                count: None,
            });
        }
        gpu.device
            .create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("Params Bind Group Layout"),
                entries: &entries,
            })
    }

    /// Upload per-draw globals into a fresh buffer and bind them.
    pub fn globals_bind_group(&self, gpu: &GpuContext, globals: &Globals) -> wgpu::BindGroup {
        let buffer = gpu
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("Globals Buffer"),
                contents: bytemuck::bytes_of(globals),
                usage: wgpu::BufferUsages::UNIFORM,
            });
        gpu.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Globals Bind Group"),
            layout: &self.globals_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: buffer.as_entire_binding(),
            }],
        })
    }

    /// Pack parameter values, resolve texture views by name and build the
    /// group-1 bind group for one draw.
    pub fn params_bind_group(
        &self,
        gpu: &GpuContext,
        compiled: &CompiledStyle,
        values: &HashMap<String, ParamValue>,
        textures: &HashMap<String, &wgpu::TextureView>,
    ) -> Result<wgpu::BindGroup> {
        let bytes = compiled.uniform_layout.pack(values)?;
        let buffer = gpu
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("Params Buffer"),
                contents: &bytes,
                usage: wgpu::BufferUsages::UNIFORM,
            });

        let mut entries = vec![
            wgpu::BindGroupEntry {
                binding: 0,
                resource: buffer.as_entire_binding(),
            },
            wgpu::BindGroupEntry {
                binding: 1,
                resource: wgpu::BindingResource::Sampler(&self.filtering_sampler),
            },
            wgpu::BindGroupEntry {
                binding: 2,
                resource: wgpu::BindingResource::Sampler(&self.comparison_sampler),
            },
            wgpu::BindGroupEntry {
                binding: 3,
                resource: wgpu::BindingResource::Sampler(&self.nearest_sampler),
            },
        ];
        for (name, _, binding) in &compiled.texture_bindings {
            let view = textures
                .get(name)
                .ok_or_else(|| RenderError::MissingParameter(name.clone()))?;
            entries.push(wgpu::BindGroupEntry {
                binding: *binding,
                resource: wgpu::BindingResource::TextureView(view),
            });
        }
        Ok(gpu.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Params Bind Group"),
            layout: &compiled.params_layout,
            entries: &entries,
        }))
    }
}
