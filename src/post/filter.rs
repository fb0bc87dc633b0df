//! The generic full-screen filter every post step builds on.
//!
//! A filter is described by a [`FilterSource`]: a WGSL body defining
//! `fn screen(uv: vec2f) -> vec4f`, a set of uniform parameters and the
//! list of input textures. [`ScreenFilter`] assembles the complete module
//! around it with a fixed binding convention:
//!
//! * group 0, binding 0: the generated `Params` uniform struct
//! * binding 1: `smp`, a linear clamping sampler
//! * binding 2: `smpn`, a nearest sampler for unfilterable inputs
//! * bindings 3+: `tex0`, `tex1`, ... in input order
//!
//! Applying a filter whose output buffer is also one of its inputs is
//! legal: the aliased input is snapshotted into a scratch copy first.

use std::collections::{BTreeMap, HashMap};

use crate::buffer::ColorBuffer;
use crate::error::Result;
use crate::gpu::GpuContext;
use crate::shade::{ParamValue, UniformKind, UniformLayout};

use wgpu::util::DeviceExt;

/// Description of one full-screen filter.
pub struct FilterSource {
    pub label: String,
    /// WGSL defining `fn screen(uv: vec2f) -> vec4f`. Parameters are
    /// reachable as `params.<name>`, inputs as `tex<i>`. `filter` would
    /// be the obvious name but it is reserved in WGSL.
    pub body: String,
    pub params: BTreeMap<String, UniformKind>,
    /// Per-input filterability; 32-bit float inputs must be `false` and
    /// sampled with `smpn`.
    pub inputs: Vec<bool>,
}

impl FilterSource {
    pub fn new(label: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            body: body.into(),
            params: BTreeMap::new(),
            inputs: Vec::new(),
        }
    }

    pub fn param(mut self, name: impl Into<String>, kind: UniformKind) -> Self {
        self.params.insert(name.into(), kind);
        self
    }

    pub fn input(mut self, filterable: bool) -> Self {
        self.inputs.push(filterable);
        self
    }

    fn assemble(&self) -> String {
        let mut s = String::new();
        let layout = UniformLayout::of(&self.params);
        s.push_str("struct Params {\n");
        if layout.fields.is_empty() {
            s.push_str("    _unused: vec4f,\n");
        } else {
            for (name, kind, _) in &layout.fields {
                let ty = match kind {
                    UniformKind::F32 => "f32".to_string(),
                    UniformKind::I32 => "i32".to_string(),
                    UniformKind::Vec2 => "vec2f".to_string(),
                    UniformKind::Vec3 => "vec3f".to_string(),
                    UniformKind::Vec4 => "vec4f".to_string(),
                    UniformKind::Mat4 => "mat4x4f".to_string(),
                    UniformKind::Vec4Array(n) => format!("array<vec4f, {n}>"),
                    _ => unreachable!("filters have no texture params"),
                };
                s.push_str(&format!("    {name}: {ty},\n"));
            }
        }
        s.push_str("}\n@group(0) @binding(0) var<uniform> params: Params;\n");
        s.push_str("@group(0) @binding(1) var smp: sampler;\n");
        s.push_str("@group(0) @binding(2) var smpn: sampler;\n");
        for i in 0..self.inputs.len() {
            s.push_str(&format!(
                "@group(0) @binding({}) var tex{i}: texture_2d<f32>;\n",
                3 + i
            ));
        }
        s.push_str(
            "\nstruct VsOut {\n    @builtin(position) clip_position: vec4f,\n    @location(0) uv: vec2f,\n}\n\n@vertex\nfn vs(@builtin(vertex_index) index: u32) -> VsOut {\n    var out: VsOut;\n    let x = f32(i32(index) / 2) * 4.0 - 1.0;\n    let y = f32(i32(index) % 2) * 4.0 - 1.0;\n    out.clip_position = vec4f(x, y, 0.0, 1.0);\n    out.uv = vec2f((x + 1.0) * 0.5, 1.0 - (y + 1.0) * 0.5);\n    return out;\n}\n\n",
        );
        s.push_str(&self.body);
        s.push_str(
            "\n\n@fragment\nfn fs(in: VsOut) -> @location(0) vec4f {\n    return screen(in.uv);\n}\n",
        );
        s
    }
}

/// A compiled full-screen filter with mutable parameter values.
pub struct ScreenFilter {
    label: String,
    module: wgpu::ShaderModule,
    bind_group_layout: wgpu::BindGroupLayout,
    pipeline_layout: wgpu::PipelineLayout,
    pipelines: HashMap<wgpu::TextureFormat, wgpu::RenderPipeline>,
    layout: UniformLayout,
    values: HashMap<String, ParamValue>,
    linear_sampler: wgpu::Sampler,
    nearest_sampler: wgpu::Sampler,
    scratch: Option<ColorBuffer>,
}

impl ScreenFilter {
    pub fn new(gpu: &GpuContext, source: FilterSource) -> Self {
        let wgsl = source.assemble();
        let module = gpu
            .device
            .create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some(&source.label),
                source: wgpu::ShaderSource::Wgsl(wgsl.into()),
            });

        let mut entries = vec![
            wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            },
            wgpu::BindGroupLayoutEntry {
                binding: 1,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                count: None,
            },
            wgpu::BindGroupLayoutEntry {
                binding: 2,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::NonFiltering),
                count: None,
            },
        ];
        for (i, filterable) in source.inputs.iter().enumerate() {
            entries.push(wgpu::BindGroupLayoutEntry {
                binding: 3 + i as u32,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Texture {
                    sample_type: wgpu::TextureSampleType::Float {
                        filterable: *filterable,
                    },
                    view_dimension: wgpu::TextureViewDimension::D2,
                    multisampled: false,
                },
                count: None,
            });
        }
        let bind_group_layout =
            gpu.device
                .create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                    label: Some(&source.label),
                    entries: &entries,
                });
        let pipeline_layout = gpu
            .device
            .create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some(&source.label),
                bind_group_layouts: &[&bind_group_layout],
                push_constant_ranges: &[],
            });

        let linear_sampler = gpu.device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("Filter Linear Sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });
        let nearest_sampler = gpu.device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("Filter Nearest Sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Nearest,
            min_filter: wgpu::FilterMode::Nearest,
            mipmap_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        });

        Self {
            label: source.label,
            module,
            bind_group_layout,
            pipeline_layout,
            pipelines: HashMap::new(),
            layout: UniformLayout::of(&source.params),
            values: HashMap::new(),
            linear_sampler,
            nearest_sampler,
            scratch: None,
        }
    }

    /// Set a parameter value for subsequent applications.
    pub fn set(&mut self, name: impl Into<String>, value: ParamValue) {
        self.values.insert(name.into(), value);
    }

    fn pipeline(&mut self, gpu: &GpuContext, format: wgpu::TextureFormat) -> &wgpu::RenderPipeline {
        let module = &self.module;
        let layout = &self.pipeline_layout;
        let label = &self.label;
        self.pipelines.entry(format).or_insert_with(|| {
            gpu.device
                .create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                    label: Some(label),
                    layout: Some(layout),
                    vertex: wgpu::VertexState {
                        module,
                        entry_point: Some("vs"),
                        buffers: &[],
                        compilation_options: Default::default(),
                    },
                    fragment: Some(wgpu::FragmentState {
                        module,
                        entry_point: Some("fs"),
                        targets: &[Some(wgpu::ColorTargetState {
                            format,
                            blend: Some(wgpu::BlendState::REPLACE),
                            write_mask: wgpu::ColorWrites::ALL,
                        })],
                        compilation_options: Default::default(),
                    }),
                    primitive: wgpu::PrimitiveState {
                        topology: wgpu::PrimitiveTopology::TriangleList,
                        ..Default::default()
                    },
                    depth_stencil: None,
                    multisample: wgpu::MultisampleState::default(),
                    multiview: None,
                    cache: None,
                })
        })
    }

    /// Run the filter over the whole of `output`.
    pub fn apply(
        &mut self,
        gpu: &GpuContext,
        encoder: &mut wgpu::CommandEncoder,
        inputs: &[&ColorBuffer],
        output: &ColorBuffer,
    ) -> Result<()> {
        // snapshot the output if it is also an input
        let aliased = inputs.iter().any(|i| i.id() == output.id());
        if aliased {
            let stale = match &self.scratch {
                Some(s) => {
                    s.width() != output.width()
                        || s.height() != output.height()
                        || s.format != output.format
                }
                None => true,
            };
            if stale {
                self.scratch = Some(ColorBuffer::new(
                    gpu,
                    output.width(),
                    output.height(),
                    output.format,
                    output.levels(),
                    "Filter Scratch",
                ));
            }
            if let Some(scratch) = &self.scratch {
                output.copy_to(encoder, scratch, 0, 0);
            }
        }
        let scratch = self.scratch.as_ref();
        let mut views: Vec<&wgpu::TextureView> = Vec::with_capacity(inputs.len());
        for input in inputs {
            match scratch {
                Some(s) if input.id() == output.id() => views.push(&s.view),
                _ => views.push(&input.view),
            }
        }

        let bytes = self.layout.pack(&self.values)?;
        let buffer = gpu
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("Filter Params"),
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
                resource: wgpu::BindingResource::Sampler(&self.linear_sampler),
            },
            wgpu::BindGroupEntry {
                binding: 2,
                resource: wgpu::BindingResource::Sampler(&self.nearest_sampler),
            },
        ];
        for (i, view) in views.iter().enumerate() {
            entries.push(wgpu::BindGroupEntry {
                binding: 3 + i as u32,
                resource: wgpu::BindingResource::TextureView(view),
            });
        }
        let bind_group = gpu.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(&self.label),
            layout: &self.bind_group_layout,
            entries: &entries,
        });

        let target = output.level_view(0);
        let format = output.format;
        let pipeline = self.pipeline(gpu, format);
        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("Filter Pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: &target,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                    store: wgpu::StoreOp::Store,
                },
                depth_slice: None,
            })],
            depth_stencil_attachment: None,
            timestamp_writes: None,
            occlusion_query_set: None,
        });
        pass.set_pipeline(pipeline);
        pass.set_bind_group(0, &bind_group, &[]);
        pass.draw(0..3, 0..1);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn assembled_module_declares_inputs_in_order() {
        let source = FilterSource::new("Test", "fn screen(uv: vec2f) -> vec4f { return vec4f(0.0); }")
            .param("gain", UniformKind::F32)
            .input(true)
            .input(false);
        let wgsl = source.assemble();
        assert!(wgsl.contains("@group(0) @binding(3) var tex0: texture_2d<f32>;"));
        assert!(wgsl.contains("@group(0) @binding(4) var tex1: texture_2d<f32>;"));
        assert!(wgsl.contains("gain: f32,"));
        assert!(wgsl.contains("@fragment"));
    }

    #[test]
    fn parameterless_filters_get_a_padded_struct() {
        let source = FilterSource::new("Test", "fn screen(uv: vec2f) -> vec4f { return vec4f(0.0); }");
        assert!(source.assemble().contains("_unused: vec4f"));
    }
}
