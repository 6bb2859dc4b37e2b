//! Bindless 3D renderer
//!
//! ## Goals
//!
//! - GPU-driven frustum culling feeding indirect draws
//! - One shader-visible descriptor heap, indexed by root constants
//! - Fixed memory usage: generational pools and recycled per-submission
//!   resources, no steady-state allocation inside the frame loop
//!
//! ## Non-goals
//!
//! - Scene management, asset parsing, camera control (callers feed a flat
//!   instance queue and raw vertex/index/texture bytes)
//! - Shader compilation (callers hand over compiled bytecode blobs)
//!
//! The public surface is portable; the Direct3D 12 backend only exists on
//! Windows.

use glam::{Mat4, Vec4};

use geometry::Aabb;

mod backend;
mod error;
mod indirect;

pub use error::{RendererError, Result};
pub use indirect::{CullRecord, IndirectCommand, CULL_GROUP_SIZE, MAX_INSTANCE_COUNT};

#[cfg(target_os = "windows")]
pub use backend::{Renderer, UploadContext};

#[derive(Clone, Copy, Debug)]
pub enum PowerPreference {
    LowPower,
    HighPerformance,
}

#[derive(Debug)]
pub struct Config {
    /// The power preference for the renderer.
    ///
    /// This influences the GPU selection criteria in multi-gpu systems.
    /// Setting `LowPower` mode prefers integrated GPUs over discrete GPUs,
    /// and setting `HighPerformance` does the reverse.
    pub power_preference: PowerPreference,

    /// Whether or not to enable the graphics debug layer.
    ///
    /// This may have an outsized impact on performance. Defaults to `None`,
    /// which enables the debug layer in debug builds only. Override with
    /// `Some(true)` or `Some(false)` to force it on or off.
    pub debug_mode: Option<bool>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            power_preference: PowerPreference::HighPerformance,
            debug_mode: None,
        }
    }
}

/// Compiled shader bytecode for every pipeline the renderer builds.
///
/// Shader authoring and compilation happen outside the renderer; by
/// convention the blobs come from entry points `lighting.vs_main` /
/// `lighting.ps_main`, `line.vs_main` / `line.ps_main`, and
/// `culling.cs_main`.
#[derive(Default)]
pub struct ShaderSet {
    pub lighting_vs: Vec<u8>,
    pub lighting_ps: Vec<u8>,
    pub line_vs: Vec<u8>,
    pub line_ps: Vec<u8>,
    pub culling_cs: Vec<u8>,
}

/// A mesh vertex as the lighting vertex shader pulls it from the bindless
/// vertex buffer.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct Vertex {
    pub pos: [f32; 3],
    pub norm: [f32; 3],
    pub uv: [f32; 2],
}

/// Everything needed to create a mesh: interleaved vertices, u32 indices,
/// and an object-space bound for the culling pass.
pub struct MeshCreateInfo<'a> {
    pub vertices: &'a [Vertex],
    pub indices: &'a [u32],
    pub aabb: Aabb,
}

/// Handle to a mesh owned by the renderer. Stale after
/// [`Renderer::free_mesh`]; validity is checked by generation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Mesh(pub(crate) u64);

/// Handle to a material owned by the renderer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Material(pub(crate) u64);

/// A copy-queue fence value identifying one submitted upload batch.
///
/// Resources referenced by the batch must not be used on the direct queue
/// until [`Renderer::upload_finished`] reports true (or the ticket is
/// flushed). This is a caller contract, not enforced.
#[derive(Clone, Copy, Debug)]
pub struct UploadTicket {
    pub(crate) fence_value: u64,
}

#[derive(Clone, Copy, Debug)]
pub struct Camera {
    /// The camera's world transform; the view matrix is its inverse.
    pub transform: Mat4,
    pub near_plane: f32,
    pub far_plane: f32,
    /// Horizontal field of view in radians.
    pub fov: f32,
}

impl Camera {
    /// The combined view-projection for a target with the given aspect
    /// ratio, using the reverse-Z projection (near plane at depth 1).
    #[must_use]
    pub fn view_projection(&self, aspect: f32) -> Mat4 {
        let view = self.transform.inverse();
        let projection = geometry::perspective_reverse_z(
            self.fov / aspect,
            aspect,
            self.near_plane,
            self.far_plane,
        );

        projection * view
    }
}

#[derive(Clone, Copy, Debug)]
pub struct MeshInstance {
    pub mesh: Mesh,
    /// `None` draws with the built-in default material.
    pub material: Option<Material>,
    pub transform: Mat4,
}

/// One frame's worth of work.
#[derive(Clone, Copy, Default)]
pub struct FrameData<'a> {
    pub camera: Camera,
    pub instances: &'a [MeshInstance],
    /// Endpoints for the debug line overlay, drawn as a line list indexed
    /// by `line_indices`. Both empty when there is no overlay.
    pub line_vertices: &'a [Vec4],
    pub line_indices: &'a [u32],
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            transform: Mat4::IDENTITY,
            near_plane: 0.1,
            far_plane: 1000.0,
            fov: std::f32::consts::FRAC_PI_2,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::{Vec3, Vec4Swizzles};

    #[test]
    fn camera_view_projection_depth_convention() {
        let camera = Camera {
            transform: Mat4::from_translation(Vec3::new(0.0, 0.0, 3.0)),
            near_plane: 0.1,
            far_plane: 10.0,
            fov: std::f32::consts::FRAC_PI_2,
        };

        let view_projection = camera.view_projection(800.0 / 600.0);

        // A point between the planes lands inside the clip volume with
        // reverse-Z depth: nearer points get larger z.
        let origin = view_projection * Vec4::new(0.0, 0.0, 0.0, 1.0);
        let near_point = view_projection * Vec4::new(0.0, 0.0, 2.0, 1.0);

        let origin_depth = origin.z / origin.w;
        let near_depth = near_point.z / near_point.w;

        assert!(origin_depth > 0.0 && origin_depth < 1.0);
        assert!(near_depth > origin_depth);

        let ndc = origin.xyz() / origin.w;
        assert!(ndc.x.abs() <= 1.0 && ndc.y.abs() <= 1.0);
    }
}
