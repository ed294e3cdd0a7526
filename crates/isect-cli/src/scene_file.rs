//! JSON input and output formats of the `trace` command.

use isect::{HitRecord, RayRecord};
use serde::{Deserialize, Serialize};

/// Scene document: a list of meshes.
#[derive(Debug, Deserialize)]
pub struct SceneFile {
    pub meshes: Vec<MeshEntry>,
}

/// One mesh with tightly packed `[x, y, z]` vertices.
#[derive(Debug, Deserialize)]
pub struct MeshEntry {
    pub vertices: Vec<f32>,
    pub indices: Vec<u32>,
    /// Vertices per face; omitted for triangle lists.
    #[serde(default)]
    pub face_vertex_counts: Option<Vec<u32>>,
    /// Id reported in hits; auto-assigned when omitted.
    #[serde(default)]
    pub id: Option<i32>,
    #[serde(default)]
    pub mask: Option<u32>,
}

impl MeshEntry {
    pub fn face_count(&self) -> usize {
        match &self.face_vertex_counts {
            Some(counts) => counts.len(),
            None => self.indices.len() / 3,
        }
    }
}

fn default_max_t() -> f32 {
    f32::MAX
}

fn default_mask() -> u32 {
    u32::MAX
}

/// One input ray.
#[derive(Debug, Deserialize)]
pub struct RayEntry {
    pub origin: [f32; 3],
    pub direction: [f32; 3],
    #[serde(default = "default_max_t")]
    pub max_t: f32,
    #[serde(default = "default_mask")]
    pub mask: u32,
}

impl From<&RayEntry> for RayRecord {
    fn from(ray: &RayEntry) -> Self {
        RayRecord::new(ray.origin, ray.direction, ray.max_t).with_mask(ray.mask)
    }
}

/// One closest-hit result.
#[derive(Debug, Serialize)]
pub struct HitEntry {
    pub ray: usize,
    pub shape_id: i32,
    pub prim_id: i32,
    pub u: f32,
    pub v: f32,
    pub t: f32,
}

impl HitEntry {
    pub fn new(ray: usize, hit: &HitRecord) -> Self {
        Self {
            ray,
            shape_id: hit.shape_id,
            prim_id: hit.prim_id,
            u: hit.u(),
            v: hit.v(),
            t: hit.t(),
        }
    }
}

/// One occlusion result.
#[derive(Debug, Serialize)]
pub struct OcclusionEntry {
    pub ray: usize,
    pub occluded: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_scene() {
        let scene: SceneFile = serde_json::from_str(
            r#"{"meshes": [
                {"vertices": [0,0,0, 1,0,0, 1,1,0, 0,1,0], "indices": [0,1,2,3],
                 "face_vertex_counts": [4], "id": 7}
            ]}"#,
        )
        .unwrap();
        let mesh = &scene.meshes[0];
        assert_eq!(mesh.face_count(), 1);
        assert_eq!(mesh.id, Some(7));
        assert_eq!(mesh.mask, None);
    }

    #[test]
    fn test_ray_defaults() {
        let rays: Vec<RayEntry> =
            serde_json::from_str(r#"[{"origin": [0,0,-1], "direction": [0,0,10]}]"#).unwrap();
        let record = RayRecord::from(&rays[0]);
        assert_eq!(record.max_t(), f32::MAX);
        assert_eq!(record.mask(), u32::MAX);
        assert!(record.is_active());
    }
}
