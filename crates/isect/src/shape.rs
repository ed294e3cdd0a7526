//! Geometry store: mesh shapes and the attached set.

use isect_kernel::mesh::{self, FanTriangle};
use isect_kernel::Triangle;
use isect_math::Point3;
use slotmap::SlotMap;

use crate::error::{Error, Result};
use crate::handle::ShapeKey;
use crate::records::NULL_ID;
use crate::scene::{PrimTag, ScenePrimitive};

/// Borrowed description of an indexed polygon mesh.
///
/// Vertex `i` starts at byte `i * vertex_stride` of `vertices` and holds
/// three `f32` coordinates. Face `f` uses the next `face_vertex_counts[f]`
/// indices from `indices[index_offset..]`; `None` means all faces are
/// triangles.
#[derive(Debug, Clone, Copy)]
pub struct MeshDesc<'a> {
    /// Vertex data.
    pub vertices: &'a [f32],
    /// Number of vertices.
    pub vertex_count: usize,
    /// Distance between consecutive vertices in bytes.
    pub vertex_stride: usize,
    /// Index data.
    pub indices: &'a [u32],
    /// First index used, in elements.
    pub index_offset: usize,
    /// Vertices per face, or `None` for an all-triangle mesh.
    pub face_vertex_counts: Option<&'a [u32]>,
    /// Number of faces.
    pub face_count: usize,
}

impl<'a> MeshDesc<'a> {
    /// Tightly packed triangle list.
    pub fn triangles(vertices: &'a [f32], indices: &'a [u32]) -> Self {
        Self {
            vertices,
            vertex_count: vertices.len() / 3,
            vertex_stride: mesh::POSITION_SIZE,
            indices,
            index_offset: 0,
            face_vertex_counts: None,
            face_count: indices.len() / 3,
        }
    }
}

#[derive(Debug)]
pub(crate) struct Shape {
    id: i32,
    mask: u32,
    visible: bool,
    attached: bool,
    positions: Vec<Point3>,
    triangles: Vec<FanTriangle>,
}

impl Shape {
    pub(crate) fn id(&self) -> i32 {
        self.id
    }
}

/// Owns every shape of an instance and tracks which are attached.
///
/// `revision` increases on every change that affects query results, so a
/// committed scene is current exactly when it was built at this revision.
#[derive(Debug)]
pub(crate) struct GeometryStore {
    shapes: SlotMap<ShapeKey, Shape>,
    attached: Vec<ShapeKey>,
    next_id: i32,
    revision: u64,
}

impl Default for GeometryStore {
    fn default() -> Self {
        Self {
            shapes: SlotMap::with_key(),
            attached: Vec::new(),
            next_id: 1,
            revision: 0,
        }
    }
}

impl GeometryStore {
    /// Validate `desc` and copy its data into a new detached shape.
    pub(crate) fn create_mesh(&mut self, desc: &MeshDesc<'_>) -> Result<ShapeKey> {
        let positions = mesh::gather_positions(desc.vertices, desc.vertex_count, desc.vertex_stride)?;
        let triangles = mesh::triangulate(
            desc.indices,
            desc.index_offset,
            desc.face_vertex_counts,
            desc.face_count,
            desc.vertex_count,
        )?;

        let id = self.next_id;
        self.next_id = self.next_id.saturating_add(1);
        log::debug!(
            "created shape {id}: {} vertices, {} faces, {} triangles",
            positions.len(),
            desc.face_count,
            triangles.len()
        );

        Ok(self.shapes.insert(Shape {
            id,
            mask: u32::MAX,
            visible: true,
            attached: false,
            positions,
            triangles,
        }))
    }

    pub(crate) fn get(&self, key: ShapeKey) -> Result<&Shape> {
        self.shapes.get(key).ok_or(Error::InvalidHandle("shape"))
    }

    fn get_mut(&mut self, key: ShapeKey) -> Result<&mut Shape> {
        self.shapes.get_mut(key).ok_or(Error::InvalidHandle("shape"))
    }

    pub(crate) fn attach(&mut self, key: ShapeKey) -> Result<()> {
        let shape = self.get_mut(key)?;
        if shape.attached {
            log::warn!("shape {} is already attached", shape.id);
            return Ok(());
        }
        shape.attached = true;
        self.attached.push(key);
        self.revision += 1;
        Ok(())
    }

    pub(crate) fn detach(&mut self, key: ShapeKey) -> Result<()> {
        let shape = self.get_mut(key)?;
        if !shape.attached {
            log::warn!("shape {} is not attached", shape.id);
            return Ok(());
        }
        shape.attached = false;
        self.attached.retain(|&k| k != key);
        self.revision += 1;
        Ok(())
    }

    pub(crate) fn delete(&mut self, key: ShapeKey) -> Result<()> {
        if self.get(key)?.attached {
            return Err(Error::ShapeAttached);
        }
        self.shapes.remove(key);
        Ok(())
    }

    pub(crate) fn set_id(&mut self, key: ShapeKey, id: i32) -> Result<()> {
        if id == NULL_ID {
            return Err(Error::InvalidArgument(format!(
                "shape id {NULL_ID} is reserved for misses"
            )));
        }
        self.update(key, |shape| std::mem::replace(&mut shape.id, id) != id)
    }

    pub(crate) fn set_mask(&mut self, key: ShapeKey, mask: u32) -> Result<()> {
        self.update(key, |shape| std::mem::replace(&mut shape.mask, mask) != mask)
    }

    pub(crate) fn set_visible(&mut self, key: ShapeKey, visible: bool) -> Result<()> {
        self.update(key, |shape| {
            std::mem::replace(&mut shape.visible, visible) != visible
        })
    }

    /// Apply `change`; bump the revision if it reports a change on an
    /// attached shape.
    fn update(&mut self, key: ShapeKey, change: impl FnOnce(&mut Shape) -> bool) -> Result<()> {
        let shape = self.get_mut(key)?;
        if change(shape) && shape.attached {
            self.revision += 1;
        }
        Ok(())
    }

    pub(crate) fn revision(&self) -> u64 {
        self.revision
    }

    pub(crate) fn attached_count(&self) -> usize {
        self.attached.len()
    }

    pub(crate) fn len(&self) -> usize {
        self.shapes.len()
    }

    /// Triangles of every attached, visible shape in attach order.
    pub(crate) fn collect_primitives(&self) -> Vec<ScenePrimitive> {
        self.attached
            .iter()
            .filter_map(|&key| self.shapes.get(key))
            .filter(|shape| shape.visible)
            .flat_map(|shape| {
                shape.triangles.iter().map(move |tri| {
                    let [a, b, c] = tri.indices.map(|i| shape.positions[i as usize]);
                    ScenePrimitive {
                        triangle: Triangle::new(a, b, c),
                        tag: PrimTag {
                            shape_id: shape.id,
                            face: tri.face,
                            fan: tri.fan,
                            mask: shape.mask,
                        },
                    }
                })
            })
            .collect()
    }
}
