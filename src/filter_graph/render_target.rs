//! Render targets, texture handles and the full-screen draw primitive.

use std::sync::mpsc;

/// Type-safe handle to a texture owned by a rendering backend.
///
/// Both source textures (video frames, images) and render target outputs are
/// referred to through this handle. Nodes only ever borrow textures by id;
/// the backend keeps the actual pixel storage.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TextureId(u64);

impl TextureId {
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub const fn raw(self) -> u64 {
        self.0
    }
}

/// Pixel layout of a render target.
///
/// Only 4-channel, 8-bit unsigned normalized storage is used by the catalog.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum PixelFormat {
    #[default]
    Rgba8Unorm,
}

impl PixelFormat {
    pub fn bytes_per_pixel(self) -> u32 {
        match self {
            PixelFormat::Rgba8Unorm => 4,
        }
    }
}

/// Size and format requested when allocating a render target.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RenderTargetDesc {
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
}

impl RenderTargetDesc {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            format: PixelFormat::Rgba8Unorm,
        }
    }
}

/// Sending half of a backend's deferred release queue.
#[derive(Clone, Debug)]
pub struct ReleaseSender(mpsc::Sender<TextureId>);

/// Collects the textures of dropped render targets until the backend frees
/// them.
///
/// A [`RenderTarget`] cannot reach its backend from `Drop`, so it posts its
/// texture id here instead. Backends drain the queue before allocating and
/// whenever they are asked to collect garbage.
#[derive(Debug)]
pub struct ReleaseQueue {
    sender: mpsc::Sender<TextureId>,
    receiver: mpsc::Receiver<TextureId>,
}

impl ReleaseQueue {
    pub fn new() -> Self {
        let (sender, receiver) = mpsc::channel();
        Self { sender, receiver }
    }

    pub fn sender(&self) -> ReleaseSender {
        ReleaseSender(self.sender.clone())
    }

    /// Texture ids released since the last drain.
    pub fn drain(&self) -> Vec<TextureId> {
        self.receiver.try_iter().collect()
    }
}

impl Default for ReleaseQueue {
    fn default() -> Self {
        Self::new()
    }
}

/// An off-screen image buffer written by exactly one node.
///
/// Created by [`RenderBackend::allocate_render_target`](crate::RenderBackend::allocate_render_target)
/// when a node is constructed. Dropping the target (together with its node)
/// hands the texture back to the backend.
#[derive(Debug)]
pub struct RenderTarget {
    texture: TextureId,
    desc: RenderTargetDesc,
    release: Option<ReleaseSender>,
}

impl RenderTarget {
    pub fn new(texture: TextureId, desc: RenderTargetDesc, release: Option<ReleaseSender>) -> Self {
        Self {
            texture,
            desc,
            release,
        }
    }

    /// The texture this target renders into.
    pub fn texture(&self) -> TextureId {
        self.texture
    }

    pub fn width(&self) -> u32 {
        self.desc.width
    }

    pub fn height(&self) -> u32 {
        self.desc.height
    }

    pub fn format(&self) -> PixelFormat {
        self.desc.format
    }

    pub fn desc(&self) -> RenderTargetDesc {
        self.desc
    }
}

impl Drop for RenderTarget {
    fn drop(&mut self) {
        if let Some(ReleaseSender(sender)) = &self.release {
            // The backend may already be gone, in which case nothing is left to free.
            let _ = sender.send(self.texture);
        }
    }
}

/// Vertex layout of the full-screen quad.
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct QuadVertex {
    pub position: [f32; 3],
    pub uv: [f32; 2],
}

impl QuadVertex {
    pub const LAYOUT: wgpu::VertexBufferLayout<'static> = wgpu::VertexBufferLayout {
        array_stride: std::mem::size_of::<QuadVertex>() as u64,
        step_mode: wgpu::VertexStepMode::Vertex,
        attributes: &[
            // position
            wgpu::VertexAttribute {
                offset: 0,
                shader_location: 0,
                format: wgpu::VertexFormat::Float32x3,
            },
            // uv
            wgpu::VertexAttribute {
                offset: 12,
                shader_location: 1,
                format: wgpu::VertexFormat::Float32x2,
            },
        ],
    };
}

/// Two triangles covering clip space, with texture coordinates whose origin
/// is the top-left texel.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FullScreenQuad {
    vertices: [QuadVertex; 6],
}

impl FullScreenQuad {
    pub const VERTICES: [QuadVertex; 6] = [
        QuadVertex { position: [-1.0, -1.0, 0.0], uv: [0.0, 1.0] },
        QuadVertex { position: [1.0, -1.0, 0.0], uv: [1.0, 1.0] },
        QuadVertex { position: [1.0, 1.0, 0.0], uv: [1.0, 0.0] },
        QuadVertex { position: [-1.0, -1.0, 0.0], uv: [0.0, 1.0] },
        QuadVertex { position: [1.0, 1.0, 0.0], uv: [1.0, 0.0] },
        QuadVertex { position: [-1.0, 1.0, 0.0], uv: [0.0, 0.0] },
    ];

    pub fn new() -> Self {
        Self {
            vertices: Self::VERTICES,
        }
    }

    pub fn vertices(&self) -> &[QuadVertex] {
        &self.vertices
    }

    pub fn vertex_count(&self) -> u32 {
        self.vertices.len() as u32
    }
}

impl Default for FullScreenQuad {
    fn default() -> Self {
        Self::new()
    }
}
