//! Mesh input validation and polygon triangulation.
//!
//! Meshes arrive as a strided float vertex array plus an index array grouped
//! by per-face vertex counts. Faces with more than three vertices are split
//! into a fan around their first vertex.

use isect_math::Point3;

use crate::error::{MeshError, Result};

/// Size in bytes of one vertex position (three `f32`).
pub const POSITION_SIZE: usize = 3 * std::mem::size_of::<f32>();

/// One triangle produced from a (possibly polygonal) face.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FanTriangle {
    /// Index of the source face.
    pub face: u32,
    /// Position of this triangle within the face's fan (0 for the first).
    pub fan: u32,
    /// Vertex indices `(v0, vk, vk+1)`.
    pub indices: [u32; 3],
}

/// Read `vertex_count` positions out of a strided float array.
///
/// `stride` is in bytes and must be a multiple of 4 no smaller than one
/// position.
pub fn gather_positions(vertices: &[f32], vertex_count: usize, stride: usize) -> Result<Vec<Point3>> {
    if vertex_count == 0 {
        return Err(MeshError::NoVertices);
    }
    if stride < POSITION_SIZE || stride % std::mem::size_of::<f32>() != 0 {
        return Err(MeshError::InvalidStride(stride));
    }

    let step = stride / std::mem::size_of::<f32>();
    // Saturates so absurd counts fail the length check instead of wrapping.
    let needed = (vertex_count - 1).saturating_mul(step).saturating_add(3);
    if vertices.len() < needed {
        return Err(MeshError::VertexDataTooShort {
            needed,
            got: vertices.len(),
        });
    }

    Ok(vertices
        .chunks(step)
        .take(vertex_count)
        .map(|c| Point3::new(c[0], c[1], c[2]))
        .collect())
}

/// Validate face groupings and fan-triangulate them.
///
/// `face_vertex_counts` of `None` means every face is a triangle.
/// `indices[index_offset..]` must hold exactly the sum of all face counts.
pub fn triangulate(
    indices: &[u32],
    index_offset: usize,
    face_vertex_counts: Option<&[u32]>,
    face_count: usize,
    vertex_count: usize,
) -> Result<Vec<FanTriangle>> {
    if face_count == 0 {
        return Err(MeshError::NoFaces);
    }
    if index_offset > indices.len() {
        return Err(MeshError::IndexOffsetOutOfRange {
            offset: index_offset,
            len: indices.len(),
        });
    }
    let indices = &indices[index_offset..];

    let triangle_counts;
    let counts = match face_vertex_counts {
        Some(counts) => {
            if counts.len() != face_count {
                return Err(MeshError::FaceCountMismatch {
                    expected: face_count,
                    got: counts.len(),
                });
            }
            counts
        }
        None => {
            triangle_counts = vec![3u32; face_count];
            &triangle_counts[..]
        }
    };

    let mut expected = 0usize;
    for (face, &count) in counts.iter().enumerate() {
        if count < 3 {
            return Err(MeshError::TooFewFaceVertices { face, count });
        }
        expected += count as usize;
    }
    if indices.len() != expected {
        return Err(MeshError::IndexCountMismatch {
            expected,
            got: indices.len(),
        });
    }
    if let Some(&index) = indices.iter().find(|&&i| i as usize >= vertex_count) {
        return Err(MeshError::IndexOutOfRange { index, vertex_count });
    }

    let mut triangles = Vec::with_capacity(expected.saturating_sub(2 * face_count));
    let mut cursor = 0usize;
    for (face, &count) in counts.iter().enumerate() {
        let face_indices = &indices[cursor..cursor + count as usize];
        for k in 1..face_indices.len() - 1 {
            triangles.push(FanTriangle {
                face: face as u32,
                fan: (k - 1) as u32,
                indices: [face_indices[0], face_indices[k], face_indices[k + 1]],
            });
        }
        cursor += count as usize;
    }

    Ok(triangles)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gather_tight() {
        let verts = [-1.0, -1.0, 0.0, 1.0, -1.0, 0.0, 0.0, 1.0, 0.0];
        let pts = gather_positions(&verts, 3, 12).unwrap();
        assert_eq!(pts.len(), 3);
        assert_eq!(pts[2], Point3::new(0.0, 1.0, 0.0));
    }

    #[test]
    fn test_gather_strided() {
        // position + normal interleaved, last vertex without trailing normal
        let verts = [0.0, 0.0, 0.0, 9.0, 9.0, 9.0, 1.0, 2.0, 3.0];
        let pts = gather_positions(&verts, 2, 24).unwrap();
        assert_eq!(pts[1], Point3::new(1.0, 2.0, 3.0));
    }

    #[test]
    fn test_gather_rejects_bad_input() {
        let verts = [0.0; 9];
        assert!(matches!(gather_positions(&verts, 0, 12), Err(MeshError::NoVertices)));
        assert!(matches!(gather_positions(&verts, 3, 8), Err(MeshError::InvalidStride(8))));
        assert!(matches!(gather_positions(&verts, 3, 14), Err(MeshError::InvalidStride(14))));
        assert!(matches!(
            gather_positions(&verts, 4, 12),
            Err(MeshError::VertexDataTooShort { needed: 12, got: 9 })
        ));
    }

    #[test]
    fn test_gather_rejects_overflowing_vertex_count() {
        let verts = [0.0; 9];
        let result = gather_positions(&verts, usize::MAX / 3 + 2, 12);
        assert!(matches!(
            result,
            Err(MeshError::VertexDataTooShort { needed: usize::MAX, got: 9 })
        ));
    }

    #[test]
    fn test_triangulate_triangles() {
        let tris = triangulate(&[0, 1, 2], 0, Some(&[3]), 1, 3).unwrap();
        assert_eq!(tris.len(), 1);
        assert_eq!(tris[0].indices, [0, 1, 2]);
    }

    #[test]
    fn test_triangulate_implicit_counts() {
        let tris = triangulate(&[0, 1, 2, 2, 1, 3], 0, None, 2, 4).unwrap();
        assert_eq!(tris.len(), 2);
        assert_eq!(tris[1].face, 1);
    }

    #[test]
    fn test_triangulate_quad_fan() {
        let tris = triangulate(&[0, 1, 2, 3], 0, Some(&[4]), 1, 4).unwrap();
        assert_eq!(tris.len(), 2);
        assert_eq!(tris[0].indices, [0, 1, 2]);
        assert_eq!(tris[1].indices, [0, 2, 3]);
        assert_eq!(tris[1].face, 0);
        assert_eq!(tris[1].fan, 1);
    }

    #[test]
    fn test_triangulate_offset() {
        let tris = triangulate(&[7, 7, 0, 1, 2], 2, Some(&[3]), 1, 3).unwrap();
        assert_eq!(tris[0].indices, [0, 1, 2]);
    }

    #[test]
    fn test_triangulate_errors() {
        assert!(matches!(
            triangulate(&[0, 1], 0, Some(&[2]), 1, 3),
            Err(MeshError::TooFewFaceVertices { face: 0, count: 2 })
        ));
        assert!(matches!(
            triangulate(&[0, 1, 2, 0], 0, Some(&[3]), 1, 3),
            Err(MeshError::IndexCountMismatch { expected: 3, got: 4 })
        ));
        assert!(matches!(
            triangulate(&[0, 1, 5], 0, Some(&[3]), 1, 3),
            Err(MeshError::IndexOutOfRange { index: 5, vertex_count: 3 })
        ));
        assert!(matches!(
            triangulate(&[0, 1, 2], 0, Some(&[3]), 2, 3),
            Err(MeshError::FaceCountMismatch { expected: 2, got: 1 })
        ));
        assert!(matches!(triangulate(&[], 0, None, 0, 3), Err(MeshError::NoFaces)));
        assert!(matches!(
            triangulate(&[0, 1, 2], 4, None, 1, 3),
            Err(MeshError::IndexOffsetOutOfRange { offset: 4, len: 3 })
        ));
    }
}
