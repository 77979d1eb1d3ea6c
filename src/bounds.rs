//! Bounding volumes used by the kernel to reject rays early.
//!
//! There is no hierarchy: each triangle gets a centroid and a radius, and the
//! scene as a whole is summarized by the largest radius. The kernel only uses
//! the scene-wide value, as a sphere centred on the world origin.

use glam::{Vec3, Vec4};

use crate::scene::Triangle;

/// Centroid (`xyz`) and enclosing radius (`w`) of a triangle.
pub fn triangle_bound(triangle: &Triangle) -> Vec4 {
    let vertices = triangle.vertices();
    let centroid = (vertices[0] + vertices[1] + vertices[2]) / 3.0;
    centroid.extend(origin_radius(&vertices))
}

/// Largest distance from the world origin to any of `points`.
///
/// The radius is measured from the origin rather than from the centroid, so
/// the resulting sphere is only tight for geometry centred near the origin.
/// Kept as is for compatibility with existing scenes.
pub fn origin_radius(points: &[Vec3]) -> f32 {
    points.iter().map(|point| point.length()).fold(0.0, f32::max)
}

/// Stores every triangle's bound and returns the largest radius (0 if empty).
pub fn scene_bound(triangles: &mut [Triangle]) -> f32 {
    let mut largest = 0.0_f32;
    for triangle in triangles.iter_mut() {
        let bound = triangle_bound(triangle);
        triangle.bounding_volume = bound.into();
        largest = largest.max(bound.w);
    }
    largest
}
