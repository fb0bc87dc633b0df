//! Color buffers, depth buffers, cubemaps and the per-frame named buffer map.
//!
//! These are thin wrappers over wgpu textures that carry the bookkeeping the
//! renderer needs: pixel format, dimensions, mip level count and a stable
//! identity used to detect in-place filter application.

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::{RenderError, Result};
use crate::gpu::GpuContext;

static NEXT_BUFFER_ID: AtomicU64 = AtomicU64::new(0);

/// An off-screen color buffer that can be rendered to and sampled from.
#[derive(Debug)]
pub struct ColorBuffer {
    /// The underlying GPU texture.
    pub texture: wgpu::Texture,
    /// A view covering every mip level, used for sampling.
    pub view: wgpu::TextureView,
    /// Pixel format the buffer was created with.
    pub format: wgpu::TextureFormat,
    width: u32,
    height: u32,
    levels: u32,
    id: u64,
}

impl ColorBuffer {
    /// Allocate a color buffer.
    ///
    /// The texture is usable as a render attachment, a sampled texture and
    /// a copy source/destination, which is what every pass and post step in
    /// the renderer needs.
    pub fn new(
        gpu: &GpuContext,
        width: u32,
        height: u32,
        format: wgpu::TextureFormat,
        levels: u32,
        label: &str,
    ) -> Self {
        let texture = gpu.device.create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: levels,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT
                | wgpu::TextureUsages::TEXTURE_BINDING
                | wgpu::TextureUsages::COPY_SRC
                | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        Self {
            texture,
            view,
            format,
            width,
            height,
            levels,
            id: NEXT_BUFFER_ID.fetch_add(1, Ordering::Relaxed),
        }
    }

    /// Decode an image file into an sRGB color buffer.
    pub fn from_file(gpu: &GpuContext, path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let decoded = image::open(path)?.to_rgba8();
        let (width, height) = decoded.dimensions();
        let label = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "Image".to_string());
        let buffer = Self::new(
            gpu,
            width,
            height,
            wgpu::TextureFormat::Rgba8UnormSrgb,
            1,
            &label,
        );
        buffer.upload(gpu, decoded.as_raw(), 4);
        Ok(buffer)
    }

    /// Width in pixels of mip level 0.
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Height in pixels of mip level 0.
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Number of mip levels.
    pub fn levels(&self) -> u32 {
        self.levels
    }

    /// Stable identity, unique per allocation.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// A view restricted to a single mip level, usable as a render
    /// attachment or blit source.
    pub fn level_view(&self, level: u32) -> wgpu::TextureView {
        self.texture.create_view(&wgpu::TextureViewDescriptor {
            base_mip_level: level,
            mip_level_count: Some(1),
            ..Default::default()
        })
    }

    /// Copy mip `src_level` of this buffer into mip `dst_level` of `dst`.
    ///
    /// Both levels must have identical pixel dimensions; this is how the
    /// reflection pyramid packs its pre-blurred octaves into one texture.
    pub fn copy_to(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        dst: &ColorBuffer,
        src_level: u32,
        dst_level: u32,
    ) {
        let extent = wgpu::Extent3d {
            width: (self.width >> src_level).max(1),
            height: (self.height >> src_level).max(1),
            depth_or_array_layers: 1,
        };
        encoder.copy_texture_to_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &self.texture,
                mip_level: src_level,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::TexelCopyTextureInfo {
                texture: &dst.texture,
                mip_level: dst_level,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            extent,
        );
    }

    /// Upload raw pixel data into mip level 0.
    ///
    /// `bytes_per_pixel` must match the buffer's format; callers such as the
    /// LTC table loader know their exact layout.
    pub fn upload(&self, gpu: &GpuContext, data: &[u8], bytes_per_pixel: u32) {
        gpu.queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &self.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            data,
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(self.width * bytes_per_pixel),
                rows_per_image: Some(self.height),
            },
            wgpu::Extent3d {
                width: self.width,
                height: self.height,
                depth_or_array_layers: 1,
            },
        );
    }
}

/// A depth buffer attachment.
pub struct DepthBuffer {
    /// The underlying GPU texture.
    pub texture: wgpu::Texture,
    /// Full view used as a depth attachment or for sampling.
    pub view: wgpu::TextureView,
    /// Depth format the buffer was created with.
    pub format: wgpu::TextureFormat,
    width: u32,
    height: u32,
}

impl DepthBuffer {
    /// Allocate a depth buffer usable as attachment, sampled texture and
    /// copy source/destination (the ray-march pass duplicates scene depth).
    pub fn new(
        gpu: &GpuContext,
        width: u32,
        height: u32,
        format: wgpu::TextureFormat,
        label: &str,
    ) -> Self {
        let texture = gpu.device.create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT
                | wgpu::TextureUsages::TEXTURE_BINDING
                | wgpu::TextureUsages::COPY_SRC
                | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        Self {
            texture,
            view,
            format,
            width,
            height,
        }
    }

    /// Width in pixels.
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Height in pixels.
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Copy the full depth contents into `dst` (same size and format).
    pub fn copy_to(&self, encoder: &mut wgpu::CommandEncoder, dst: &DepthBuffer) {
        encoder.copy_texture_to_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &self.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::TexelCopyTextureInfo {
                texture: &dst.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::Extent3d {
                width: self.width,
                height: self.height,
                depth_or_array_layers: 1,
            },
        );
    }
}

/// The six faces of a cubemap, in wgpu layer order.
pub const CUBEMAP_SIDES: [CubemapSide; 6] = [
    CubemapSide::PositiveX,
    CubemapSide::NegativeX,
    CubemapSide::PositiveY,
    CubemapSide::NegativeY,
    CubemapSide::PositiveZ,
    CubemapSide::NegativeZ,
];

/// One face of a cubemap with its view basis for face rendering.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CubemapSide {
    PositiveX,
    NegativeX,
    PositiveY,
    NegativeY,
    PositiveZ,
    NegativeZ,
}

impl CubemapSide {
    /// Array layer index of this face.
    pub fn layer(self) -> u32 {
        match self {
            CubemapSide::PositiveX => 0,
            CubemapSide::NegativeX => 1,
            CubemapSide::PositiveY => 2,
            CubemapSide::NegativeY => 3,
            CubemapSide::PositiveZ => 4,
            CubemapSide::NegativeZ => 5,
        }
    }

    /// Forward direction when rendering this face.
    pub fn forward(self) -> glam::Vec3 {
        match self {
            CubemapSide::PositiveX => glam::Vec3::X,
            CubemapSide::NegativeX => glam::Vec3::NEG_X,
            CubemapSide::PositiveY => glam::Vec3::Y,
            CubemapSide::NegativeY => glam::Vec3::NEG_Y,
            CubemapSide::PositiveZ => glam::Vec3::Z,
            CubemapSide::NegativeZ => glam::Vec3::NEG_Z,
        }
    }

    /// Up direction when rendering this face.
    pub fn up(self) -> glam::Vec3 {
        match self {
            CubemapSide::PositiveY => glam::Vec3::Z,
            CubemapSide::NegativeY => glam::Vec3::NEG_Z,
            _ => glam::Vec3::NEG_Y,
        }
    }
}

/// An environment cubemap rendered by the scene renderer.
pub struct Cubemap {
    /// The underlying 6-layer texture.
    pub texture: wgpu::Texture,
    /// Cube view used for sampling.
    pub view: wgpu::TextureView,
    size: u32,
    levels: u32,
}

impl Cubemap {
    /// Allocate a square cubemap with a full mip chain.
    pub fn new(gpu: &GpuContext, size: u32, format: wgpu::TextureFormat, label: &str) -> Self {
        let levels = 32 - size.leading_zeros();
        let texture = gpu.device.create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size: wgpu::Extent3d {
                width: size,
                height: size,
                depth_or_array_layers: 6,
            },
            mip_level_count: levels,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT
                | wgpu::TextureUsages::TEXTURE_BINDING
                | wgpu::TextureUsages::COPY_SRC
                | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor {
            dimension: Some(wgpu::TextureViewDimension::Cube),
            ..Default::default()
        });
        Self {
            texture,
            view,
            size,
            levels,
        }
    }

    /// Edge length in pixels.
    pub fn size(&self) -> u32 {
        self.size
    }

    /// Number of mip levels.
    pub fn levels(&self) -> u32 {
        self.levels
    }

    /// A 2D view of one face at one mip level, usable as a render
    /// attachment or blit source.
    pub fn face_view(&self, side: CubemapSide, level: u32) -> wgpu::TextureView {
        self.texture.create_view(&wgpu::TextureViewDescriptor {
            dimension: Some(wgpu::TextureViewDimension::D2),
            base_array_layer: side.layer(),
            array_layer_count: Some(1),
            base_mip_level: level,
            mip_level_count: Some(1),
            ..Default::default()
        })
    }
}

/// The per-frame map from stable buffer names to color buffers.
///
/// Output render passes publish one buffer per facet combiner here, and
/// every post step reads its inputs from and writes its output into this
/// map. A lookup miss is always a configuration error and is reported with
/// the missing name.
#[derive(Default)]
pub struct FrameBuffers {
    buffers: HashMap<String, ColorBuffer>,
}

impl FrameBuffers {
    /// Creates an empty buffer map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a buffer, failing with the missing name.
    pub fn get(&self, name: &str) -> Result<&ColorBuffer> {
        self.buffers
            .get(name)
            .ok_or_else(|| RenderError::MissingBuffer(name.to_string()))
    }

    /// Returns whether `name` has been produced this session.
    pub fn contains(&self, name: &str) -> bool {
        self.buffers.contains_key(name)
    }

    /// Insert or replace a named buffer.
    pub fn insert(&mut self, name: impl Into<String>, buffer: ColorBuffer) {
        self.buffers.insert(name.into(), buffer);
    }

    /// Fetch `name`, allocating it with `create` on first use.
    ///
    /// Buffers are reused across frames; a post step whose output name
    /// already exists keeps writing into the existing allocation.
    pub fn get_or_insert_with(
        &mut self,
        name: &str,
        create: impl FnOnce() -> ColorBuffer,
    ) -> &ColorBuffer {
        self.buffers
            .entry(name.to_string())
            .or_insert_with(create)
    }

    /// Remove a buffer (used when a pass target is resized).
    pub fn remove(&mut self, name: &str) -> Option<ColorBuffer> {
        self.buffers.remove(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_buffer_error_names_the_buffer() {
        let buffers = FrameBuffers::new();
        let err = buffers.get("ssao-4x").unwrap_err();
        assert_eq!(err.to_string(), "can't find 'ssao-4x' buffer");
    }

    #[test]
    fn cubemap_side_bases_are_orthonormal() {
        for side in CUBEMAP_SIDES {
            let f = side.forward();
            let u = side.up();
            assert!(f.dot(u).abs() < 1e-6);
            assert!((f.length() - 1.0).abs() < 1e-6);
            assert!((u.length() - 1.0).abs() < 1e-6);
        }
    }
}
