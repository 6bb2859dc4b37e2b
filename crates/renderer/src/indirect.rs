//! Wire formats shared between the CPU and the culling/draw pipeline.
//!
//! Layouts here are ABI: [`IndirectCommand`] must match the command
//! signature (four root constants followed by a draw), and [`CullRecord`]
//! must match the structured buffer the culling shader reads.

use bytemuck::{Pod, Zeroable};
use geometry::Aabb;

/// Upper bound on instances submitted in one frame; sizes the argument
/// buffers fed to the culling pass.
pub const MAX_INSTANCE_COUNT: usize = 8 * 1024;

/// Thread-group size of the culling compute shader.
pub const CULL_GROUP_SIZE: u32 = 256;

/// One record of the indirect argument buffer.
///
/// The first four values are written into root constants by the command
/// signature (destination offset 1, leaving the camera constant at offset
/// 0 intact); the last four are the draw arguments.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct IndirectCommand {
    pub vbuffer_srv: u32,
    pub ibuffer_srv: u32,
    pub transform_cbv: u32,
    pub texture_srv: u32,

    pub vertex_count: u32,
    pub instance_count: u32,
    pub start_vertex: u32,
    pub start_instance: u32,
}

/// Input element of the culling pass: a draw record plus the world-space
/// bound the compute shader tests against the frustum. Records that pass
/// have their `command` appended to the output argument buffer.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct CullRecord {
    pub command: IndirectCommand,
    pub aabb_min: [f32; 3],
    _pad0: u32,
    pub aabb_max: [f32; 3],
    _pad1: u32,
}

impl CullRecord {
    #[must_use]
    pub fn new(command: IndirectCommand, bounds: Aabb) -> Self {
        Self {
            command,
            aabb_min: bounds.min.to_array(),
            _pad0: 0,
            aabb_max: bounds.max.to_array(),
            _pad1: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;

    #[test]
    fn command_stride_matches_signature() {
        assert_eq!(std::mem::size_of::<IndirectCommand>(), 32);
        assert_eq!(std::mem::align_of::<IndirectCommand>(), 4);
    }

    #[test]
    fn command_field_order() {
        let command = IndirectCommand {
            vbuffer_srv: 1,
            ibuffer_srv: 2,
            transform_cbv: 3,
            texture_srv: 4,
            vertex_count: 5,
            instance_count: 6,
            start_vertex: 7,
            start_instance: 8,
        };

        let words: &[u32] = bytemuck::cast_slice(bytemuck::bytes_of(&command));
        assert_eq!(words, &[1, 2, 3, 4, 5, 6, 7, 8]);
    }

    #[test]
    fn cull_record_layout() {
        assert_eq!(std::mem::size_of::<CullRecord>(), 64);

        let record = CullRecord::new(
            IndirectCommand {
                vertex_count: 3,
                instance_count: 1,
                ..Default::default()
            },
            Aabb::new(Vec3::new(-1.0, -2.0, -3.0), Vec3::new(1.0, 2.0, 3.0)),
        );

        let words: &[u32] = bytemuck::cast_slice(bytemuck::bytes_of(&record));

        // The draw command occupies the first 8 words, the bounds the next
        // 8 with a pad word after each vector.
        assert_eq!(words[4], 3);
        assert_eq!(f32::from_bits(words[8]), -1.0);
        assert_eq!(words[11], 0);
        assert_eq!(f32::from_bits(words[14]), 3.0);
        assert_eq!(words[15], 0);
    }
}
