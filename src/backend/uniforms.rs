//! Host-side packing of a program's scalar parameters.
//!
//! The WGSL kernels declare one `Params` uniform struct whose members follow
//! the schema's non-texture entries in declaration order. Members use WGSL
//! uniform layout: 4-byte scalars, 8-byte aligned `vec2<f32>`, and a total
//! size rounded up to 16 bytes. Booleans are not host-shareable and travel
//! as `u32`.

use crate::shader::{ParameterKind, ParameterSchema, ParameterSet, ParameterValue};

/// Where each member of a `Params` block lives.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UniformLayout {
    /// Parameter name and byte offset, in declaration order.
    pub offsets: Vec<(&'static str, usize)>,
    /// Buffer size in bytes, a multiple of 16.
    pub size: usize,
}

/// Bytes of a `Params` uniform buffer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UniformBlock {
    bytes: Vec<u8>,
}

impl UniformBlock {
    /// Packs `values` in the layout declared by `schema`.
    ///
    /// Names missing from `values` fall back to the schema default; textures
    /// are bound separately and take no space.
    pub fn pack(schema: &ParameterSchema, values: &ParameterSet) -> Self {
        let layout = Self::layout(schema);
        let mut bytes = vec![0; layout.size];
        for (decl, offset) in schema
            .iter()
            .filter(|d| d.kind != ParameterKind::Texture)
            .zip(layout.offsets.iter().map(|&(_, offset)| offset))
        {
            let value = values.get(decl.name).copied().or(decl.default);
            match (decl.kind, value) {
                (ParameterKind::Vec2, Some(ParameterValue::Vec2(v))) => {
                    bytes[offset..offset + 8].copy_from_slice(bytemuck::bytes_of(&v.to_array()));
                }
                (ParameterKind::Vec2, _) => {}
                (_, value) => {
                    bytes[offset..offset + 4].copy_from_slice(&scalar_bits(value).to_le_bytes());
                }
            }
        }
        Self { bytes }
    }

    /// Byte offset of every non-texture parameter of `schema`, and the
    /// buffer size.
    pub fn layout(schema: &ParameterSchema) -> UniformLayout {
        let mut offsets = Vec::new();
        let mut end: usize = 0;
        for decl in schema.iter() {
            let (align, size) = match decl.kind {
                ParameterKind::Texture => continue,
                ParameterKind::Vec2 => (8, 8),
                _ => (4, 4),
            };
            let offset = end.next_multiple_of(align);
            offsets.push((decl.name, offset));
            end = offset + size;
        }
        let size = end.next_multiple_of(16).max(16);
        UniformLayout { offsets, size }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

fn scalar_bits(value: Option<ParameterValue>) -> u32 {
    match value {
        Some(ParameterValue::Float(v)) => v.to_bits(),
        Some(ParameterValue::Int(v)) => v as u32,
        Some(ParameterValue::Bool(v)) => v as u32,
        _ => 0,
    }
}
