//! Exposed-face mesh extraction. One unit quad per solid voxel face whose
//! neighbor is empty; no greedy merging, so output size is proportional to
//! exposed surface area.

use crate::world::voxel::VoxelVolume;
use bytemuck::{Pod, Zeroable};
use glam::IVec3;

/// GPU-ready vertex layout; uploaded verbatim into the vertex buffer.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
    pub uv: [f32; 2],
    pub color: [f32; 3],
}

/// CPU-side mesh arrays awaiting upload. Empty arrays are valid: a chunk
/// with no exposed faces produces no geometry.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MeshData {
    pub vertices: Vec<Vertex>,
    pub indices: Vec<u32>,
}

impl MeshData {
    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    pub fn quad_count(&self) -> usize {
        self.indices.len() / 6
    }

    fn add_face(&mut self, corners: [[f32; 3]; 4], normal: [f32; 3], color: [f32; 3]) {
        let base = self.vertices.len() as u32;
        for (corner, uv) in corners.iter().zip(FACE_UVS) {
            self.vertices.push(Vertex {
                position: *corner,
                normal,
                uv,
                color,
            });
        }
        // Two counter-clockwise triangles per quad.
        self.indices
            .extend_from_slice(&[base, base + 1, base + 2, base + 2, base + 3, base]);
    }
}

const FACE_UVS: [[f32; 2]; 4] = [[0.0, 0.0], [1.0, 0.0], [1.0, 1.0], [0.0, 1.0]];

struct Face {
    dir: IVec3,
    normal: [f32; 3],
    /// Unit-cube corner offsets, counter-clockwise seen from outside.
    corners: [[f32; 3]; 4],
}

const FACES: [Face; 6] = [
    // +Z
    Face {
        dir: IVec3::new(0, 0, 1),
        normal: [0.0, 0.0, 1.0],
        corners: [
            [0.0, 0.0, 1.0],
            [1.0, 0.0, 1.0],
            [1.0, 1.0, 1.0],
            [0.0, 1.0, 1.0],
        ],
    },
    // -Z
    Face {
        dir: IVec3::new(0, 0, -1),
        normal: [0.0, 0.0, -1.0],
        corners: [
            [1.0, 0.0, 0.0],
            [0.0, 0.0, 0.0],
            [0.0, 1.0, 0.0],
            [1.0, 1.0, 0.0],
        ],
    },
    // +Y
    Face {
        dir: IVec3::new(0, 1, 0),
        normal: [0.0, 1.0, 0.0],
        corners: [
            [0.0, 1.0, 1.0],
            [1.0, 1.0, 1.0],
            [1.0, 1.0, 0.0],
            [0.0, 1.0, 0.0],
        ],
    },
    // -Y
    Face {
        dir: IVec3::new(0, -1, 0),
        normal: [0.0, -1.0, 0.0],
        corners: [
            [0.0, 0.0, 0.0],
            [1.0, 0.0, 0.0],
            [1.0, 0.0, 1.0],
            [0.0, 0.0, 1.0],
        ],
    },
    // +X
    Face {
        dir: IVec3::new(1, 0, 0),
        normal: [1.0, 0.0, 0.0],
        corners: [
            [1.0, 0.0, 1.0],
            [1.0, 0.0, 0.0],
            [1.0, 1.0, 0.0],
            [1.0, 1.0, 1.0],
        ],
    },
    // -X
    Face {
        dir: IVec3::new(-1, 0, 0),
        normal: [-1.0, 0.0, 0.0],
        corners: [
            [0.0, 0.0, 0.0],
            [0.0, 0.0, 1.0],
            [0.0, 1.0, 1.0],
            [0.0, 1.0, 0.0],
        ],
    },
];

/// Converts a filled volume into chunk-local vertex/index arrays. For every
/// solid voxel, each of the 6 axis neighbors is probed; out-of-bounds reads
/// as empty, so chunk borders always mesh. Positions are scaled by
/// `voxel_scale`; the chunk's world placement is the caller's transform.
pub fn extract_chunk_mesh(volume: &VoxelVolume, voxel_scale: f32) -> MeshData {
    let mut mesh = MeshData::default();
    let extent = volume.extent();

    for z in 0..extent.z {
        for y in 0..extent.y {
            for x in 0..extent.x {
                let voxel = match volume.get(IVec3::new(x as i32, y as i32, z as i32)) {
                    Some(v) if v.solid => *v,
                    _ => continue,
                };
                let cell = IVec3::new(x as i32, y as i32, z as i32);
                for face in &FACES {
                    if volume.is_solid(cell + face.dir) {
                        continue;
                    }
                    let corners = face.corners.map(|c| {
                        [
                            (x as f32 + c[0]) * voxel_scale,
                            (y as f32 + c[1]) * voxel_scale,
                            (z as f32 + c[2]) * voxel_scale,
                        ]
                    });
                    mesh.add_face(corners, face.normal, voxel.color);
                }
            }
        }
    }

    mesh
}
