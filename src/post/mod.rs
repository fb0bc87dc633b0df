//! Post-processing steps and the chain that runs them.
//!
//! After the output passes publish their buffers, the renderer walks an
//! ordered list of [`PostStep`]s. Each filter step reads named buffers,
//! runs a full-screen filter and publishes its result under its own output
//! name; later steps (and the final blit) find it there. Referencing a
//! name nothing produced fails the frame with the missing name.

pub mod bloom;
pub mod blur;
pub mod combine;
pub mod dof;
pub mod filter;
pub mod fog;
pub mod fxaa;
pub mod grain;
pub mod ssao;
pub mod sslr;
pub mod tonemap;
pub mod volumetric;

use glam::Mat4;

use crate::buffer::{ColorBuffer, FrameBuffers};
use crate::error::Result;
use crate::gpu::GpuContext;
use crate::shade::ParamValue;

pub use filter::{FilterSource, ScreenFilter};

/// Per-frame values a post step may depend on.
pub struct PostContext {
    pub projection: Mat4,
    pub view: Mat4,
    pub width: u32,
    pub height: u32,
    pub frame: u64,
}

/// A full-screen effect that can run as a post step.
///
/// `prepare` runs every frame before application and is where effects pick
/// up frame state (projection matrices, frame counters). `set_param` is the
/// untyped escape hatch update callbacks use to animate parameters.
pub trait ScreenEffect {
    fn apply(
        &mut self,
        gpu: &GpuContext,
        encoder: &mut wgpu::CommandEncoder,
        inputs: &[&ColorBuffer],
        output: &ColorBuffer,
    ) -> Result<()>;

    fn set_param(&mut self, name: &str, value: ParamValue);

    fn prepare(&mut self, _context: &PostContext) {}
}

impl ScreenEffect for ScreenFilter {
    fn apply(
        &mut self,
        gpu: &GpuContext,
        encoder: &mut wgpu::CommandEncoder,
        inputs: &[&ColorBuffer],
        output: &ColorBuffer,
    ) -> Result<()> {
        ScreenFilter::apply(self, gpu, encoder, inputs, output)
    }

    fn set_param(&mut self, name: &str, value: ParamValue) {
        self.set(name, value);
    }
}

/// Callback for animating a step's parameters from application code.
pub type UpdateFn = Box<dyn FnMut(&mut dyn ScreenEffect, &PostContext)>;

/// One filter application in the chain.
pub struct FilterStep {
    pub filter: Box<dyn ScreenEffect>,
    /// Buffer names read, in `tex0..texN` order.
    pub inputs: Vec<String>,
    /// Buffer name written (may repeat an input for in-place application).
    pub output: String,
    /// Output size relative to the frame.
    pub scale: f32,
    pub format: wgpu::TextureFormat,
    /// Mip levels of the output buffer.
    pub levels: u32,
    pub update: Option<UpdateFn>,
}

impl FilterStep {
    pub fn new(
        filter: impl ScreenEffect + 'static,
        inputs: &[&str],
        output: impl Into<String>,
    ) -> Self {
        Self {
            filter: Box::new(filter),
            inputs: inputs.iter().map(|s| s.to_string()).collect(),
            output: output.into(),
            scale: 1.0,
            format: wgpu::TextureFormat::Rgba16Float,
            levels: 1,
            update: None,
        }
    }

    pub fn scaled(mut self, scale: f32) -> Self {
        self.scale = scale;
        self
    }

    pub fn format(mut self, format: wgpu::TextureFormat) -> Self {
        self.format = format;
        self
    }

    pub fn levels(mut self, levels: u32) -> Self {
        self.levels = levels;
        self
    }

    pub fn update(mut self, update: UpdateFn) -> Self {
        self.update = Some(update);
        self
    }
}

/// Environment handed to free-form function steps.
pub struct PostEnv<'a> {
    pub gpu: &'a GpuContext,
    pub encoder: &'a mut wgpu::CommandEncoder,
    pub buffers: &'a mut FrameBuffers,
    pub context: &'a PostContext,
}

/// One step of the post chain.
pub enum PostStep {
    Filter(FilterStep),
    /// Arbitrary work against the buffer map, for steps that are not a
    /// single filter application (the reflection pyramid packing).
    Function {
        /// Buffer names the function reads; declared up front so chain
        /// wiring stays inspectable.
        inputs: Vec<String>,
        output: String,
        scale: f32,
        run: Box<dyn FnMut(&mut PostEnv) -> Result<()>>,
    },
}

impl PostStep {
    /// Name of the buffer this step publishes.
    pub fn output_name(&self) -> &str {
        match self {
            PostStep::Filter(step) => &step.output,
            PostStep::Function { output, .. } => output,
        }
    }

    /// Names of the buffers this step reads.
    pub fn input_names(&self) -> &[String] {
        match self {
            PostStep::Filter(step) => &step.inputs,
            PostStep::Function { inputs, .. } => inputs,
        }
    }

    /// Pixel size of this step's output for a given frame size.
    ///
    /// Truncating keeps halving ladders consistent with mip-level sizes.
    pub fn output_size(&self, frame_width: u32, frame_height: u32) -> (u32, u32) {
        let scale = match self {
            PostStep::Filter(step) => step.scale,
            PostStep::Function { scale, .. } => *scale,
        };
        (
            ((frame_width as f32 * scale) as u32).max(1),
            ((frame_height as f32 * scale) as u32).max(1),
        )
    }
}

/// Run the chain in order against the frame's named buffers.
pub fn run_steps(
    steps: &mut [PostStep],
    gpu: &GpuContext,
    encoder: &mut wgpu::CommandEncoder,
    buffers: &mut FrameBuffers,
    context: &PostContext,
) -> Result<()> {
    for step in steps.iter_mut() {
        let (width, height) = step.output_size(context.width, context.height);
        match step {
            PostStep::Filter(filter_step) => {
                // drop a stale allocation if the frame was resized
                if let Ok(existing) = buffers.get(&filter_step.output) {
                    let aliases_input = filter_step.inputs.contains(&filter_step.output);
                    if !aliases_input
                        && (existing.width() != width || existing.height() != height)
                    {
                        buffers.remove(&filter_step.output);
                    }
                }
                let format = filter_step.format;
                let levels = filter_step.levels;
                let output_name = filter_step.output.clone();
                buffers.get_or_insert_with(&output_name, || {
                    ColorBuffer::new(gpu, width, height, format, levels, &output_name)
                });

                filter_step.filter.prepare(context);
                if let Some(update) = &mut filter_step.update {
                    update(filter_step.filter.as_mut(), context);
                }

                let inputs: Vec<&ColorBuffer> = filter_step
                    .inputs
                    .iter()
                    .map(|name| buffers.get(name))
                    .collect::<Result<_>>()?;
                let output = buffers.get(&filter_step.output)?;
                filter_step.filter.apply(gpu, encoder, &inputs, output)?;
            }
            PostStep::Function { run, .. } => {
                let mut env = PostEnv {
                    gpu,
                    encoder,
                    buffers,
                    context,
                };
                run(&mut env)?;
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NullEffect;

    impl ScreenEffect for NullEffect {
        fn apply(
            &mut self,
            _gpu: &GpuContext,
            _encoder: &mut wgpu::CommandEncoder,
            _inputs: &[&ColorBuffer],
            _output: &ColorBuffer,
        ) -> Result<()> {
            Ok(())
        }

        fn set_param(&mut self, _name: &str, _value: ParamValue) {}
    }

    #[test]
    fn output_size_scales_and_clamps() {
        let step = PostStep::Filter(FilterStep::new(NullEffect, &["a"], "b").scaled(0.5));
        assert_eq!(step.output_size(1280, 720), (640, 360));
        // truncation matches mip-chain halving for odd sizes
        assert_eq!(step.output_size(101, 31), (50, 15));
        let tiny = PostStep::Filter(FilterStep::new(NullEffect, &["a"], "b").scaled(0.001));
        assert_eq!(tiny.output_size(64, 64), (1, 1));
    }

    #[test]
    fn halving_ladder_matches_shift_sizes() {
        for frame in [1280u32, 1281, 719] {
            for octave in 1..=6u32 {
                let scale = 0.5f32.powi(octave as i32);
                let step =
                    PostStep::Filter(FilterStep::new(NullEffect, &["a"], "b").scaled(scale));
                let (w, _) = step.output_size(frame, frame);
                assert_eq!(w, (frame >> octave).max(1), "frame {frame} octave {octave}");
            }
        }
    }
}
