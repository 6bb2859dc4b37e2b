//! 3D math used by the renderer.
//!
//! Just the pieces the frame pipeline needs: axis-aligned boxes for mesh
//! bounds, frustum planes for the culling pass, and the reverse-Z
//! projection. Everything is built on [`glam`] types; this crate adds no
//! vector algebra of its own.

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec3, Vec4};

/// An axis-aligned bounding box.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct Aabb {
    pub min: Vec3,
    pub max: Vec3,
}

impl Aabb {
    #[must_use]
    pub fn new(min: Vec3, max: Vec3) -> Self {
        Self { min, max }
    }

    #[must_use]
    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    #[must_use]
    pub fn half_extent(&self) -> Vec3 {
        (self.max - self.min) * 0.5
    }

    #[must_use]
    pub fn corners(&self) -> [Vec3; 8] {
        let (lo, hi) = (self.min, self.max);
        [
            Vec3::new(lo.x, lo.y, lo.z),
            Vec3::new(hi.x, lo.y, lo.z),
            Vec3::new(lo.x, hi.y, lo.z),
            Vec3::new(hi.x, hi.y, lo.z),
            Vec3::new(lo.x, lo.y, hi.z),
            Vec3::new(hi.x, lo.y, hi.z),
            Vec3::new(lo.x, hi.y, hi.z),
            Vec3::new(hi.x, hi.y, hi.z),
        ]
    }

    /// The smallest axis-aligned box containing this box transformed by
    /// `transform`. Exact for affine transforms.
    #[must_use]
    pub fn transformed(&self, transform: &Mat4) -> Self {
        let center = transform.transform_point3(self.center());
        let extent = self.half_extent();

        // Project the half-extent through the absolute value of the
        // rotation/scale part of the matrix.
        let world_extent = transform.x_axis.truncate().abs() * extent.x
            + transform.y_axis.truncate().abs() * extent.y
            + transform.z_axis.truncate().abs() * extent.z;

        Self {
            min: center - world_extent,
            max: center + world_extent,
        }
    }
}

/// Six view-frustum planes, stored as `(nx, ny, nz, d)` with the normal
/// pointing into the frustum: a point `p` is inside a plane when
/// `dot(n, p) + d >= 0`.
#[derive(Clone, Copy, Debug)]
pub struct Frustum {
    pub planes: [Vec4; 6],
}

impl Frustum {
    /// Extracts planes from a view-projection matrix by row combination.
    ///
    /// Assumes a [0, 1] clip depth range, which holds for the reverse-Z
    /// projection as well (the near/far rows swap roles but the clip
    /// volume is unchanged).
    #[must_use]
    pub fn from_view_projection(view_projection: &Mat4) -> Self {
        let r0 = view_projection.row(0);
        let r1 = view_projection.row(1);
        let r2 = view_projection.row(2);
        let r3 = view_projection.row(3);

        let planes = [
            r3 + r0, // left:   x >= -w
            r3 - r0, // right:  x <=  w
            r3 + r1, // bottom: y >= -w
            r3 - r1, // top:    y <=  w
            r2,      // z >= 0
            r3 - r2, // z <= w
        ]
        .map(|plane| plane / plane.truncate().length());

        Self { planes }
    }

    /// Conservative box-vs-frustum test: true if the box intersects or is
    /// contained in the frustum, false only when it is fully outside some
    /// plane.
    #[must_use]
    pub fn intersects_aabb(&self, aabb: &Aabb) -> bool {
        for plane in &self.planes {
            let normal = plane.truncate();

            // The box corner farthest along the plane normal. If even that
            // corner is behind the plane, the whole box is out.
            let farthest = Vec3::select(normal.cmpge(Vec3::ZERO), aabb.max, aabb.min);

            if normal.dot(farthest) + plane.w < 0.0 {
                return false;
            }
        }

        true
    }
}

/// A right-handed perspective projection with reversed depth: the near
/// plane maps to depth 1 and the far plane to depth 0.
///
/// Constructed explicitly rather than by swapping the near/far arguments
/// of an ordinary projection, so the depth convention is visible here
/// instead of hidden in a call site.
#[must_use]
pub fn perspective_reverse_z(fov_y: f32, aspect: f32, z_near: f32, z_far: f32) -> Mat4 {
    debug_assert!(z_near > 0.0 && z_far > z_near);

    let (sin_fov, cos_fov) = (0.5 * fov_y).sin_cos();
    let h = cos_fov / sin_fov;
    let w = h / aspect;
    let r = z_near / (z_far - z_near);

    Mat4::from_cols(
        Vec4::new(w, 0.0, 0.0, 0.0),
        Vec4::new(0.0, h, 0.0, 0.0),
        Vec4::new(0.0, 0.0, r, -1.0),
        Vec4::new(0.0, 0.0, r * z_far, 0.0),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ndc_depth(projection: &Mat4, view_z: f32) -> f32 {
        let clip = *projection * Vec4::new(0.0, 0.0, view_z, 1.0);
        clip.z / clip.w
    }

    #[test]
    fn reverse_z_depth_range() {
        let proj = perspective_reverse_z(std::f32::consts::FRAC_PI_2, 1.0, 0.1, 10.0);

        assert!((ndc_depth(&proj, -0.1) - 1.0).abs() < 1e-5);
        assert!(ndc_depth(&proj, -10.0).abs() < 1e-5);
    }

    #[test]
    fn reverse_z_closer_means_greater() {
        let proj = perspective_reverse_z(std::f32::consts::FRAC_PI_2, 16.0 / 9.0, 0.1, 100.0);

        // With a GREATER depth compare the nearer fragment must win, so
        // nearer points need larger depth values.
        let near = ndc_depth(&proj, -2.0);
        let far = ndc_depth(&proj, -5.0);
        assert!(near > far);
        assert!(far > 0.0 && near < 1.0);
    }

    fn test_frustum() -> Frustum {
        // Camera at (0, 0, 3) looking down -z, 90 degree horizontal fov.
        let aspect = 800.0 / 600.0;
        let fov_y = std::f32::consts::FRAC_PI_2 / aspect;
        let view = Mat4::from_translation(Vec3::new(0.0, 0.0, 3.0)).inverse();
        let proj = perspective_reverse_z(fov_y, aspect, 0.1, 10.0);
        Frustum::from_view_projection(&(proj * view))
    }

    #[test]
    fn frustum_accepts_box_in_view() {
        let frustum = test_frustum();
        let aabb = Aabb::new(Vec3::ZERO, Vec3::new(1.0, 1.0, 0.0));

        assert!(frustum.intersects_aabb(&aabb));
    }

    #[test]
    fn frustum_rejects_box_off_to_the_side() {
        let frustum = test_frustum();
        let aabb = Aabb::new(Vec3::new(100.0, 0.0, 0.0), Vec3::new(101.0, 1.0, 0.0));

        assert!(!frustum.intersects_aabb(&aabb));
    }

    #[test]
    fn frustum_rejects_boxes_behind_and_past_far() {
        let frustum = test_frustum();

        let behind = Aabb::new(Vec3::new(-0.5, -0.5, 4.0), Vec3::new(0.5, 0.5, 5.0));
        assert!(!frustum.intersects_aabb(&behind));

        let past_far = Aabb::new(Vec3::new(-0.5, -0.5, -20.0), Vec3::new(0.5, 0.5, -15.0));
        assert!(!frustum.intersects_aabb(&past_far));
    }

    #[test]
    fn frustum_accepts_enclosing_box() {
        let frustum = test_frustum();
        let huge = Aabb::new(Vec3::splat(-100.0), Vec3::splat(100.0));

        assert!(frustum.intersects_aabb(&huge));
    }

    #[test]
    fn aabb_transform_translates_and_rotates() {
        let aabb = Aabb::new(Vec3::ZERO, Vec3::new(2.0, 1.0, 1.0));

        let moved = aabb.transformed(&Mat4::from_translation(Vec3::new(5.0, 0.0, 0.0)));
        assert!((moved.min - Vec3::new(5.0, 0.0, 0.0)).length() < 1e-5);
        assert!((moved.max - Vec3::new(7.0, 1.0, 1.0)).length() < 1e-5);

        // Quarter turn about +y swaps the x and z extents.
        let rotated = aabb.transformed(&Mat4::from_rotation_y(std::f32::consts::FRAC_PI_2));
        let extent = rotated.half_extent();
        assert!((extent.x - 0.5).abs() < 1e-5);
        assert!((extent.z - 1.0).abs() < 1e-5);
    }
}
