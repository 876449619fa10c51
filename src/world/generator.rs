use crate::config::TerrainConfig;
use crate::world::chunk_coord::ChunkCoord;
use crate::world::voxel::{Voxel, VoxelVolume};
use glam::{IVec3, UVec3};
use noise::{Fbm, MultiFractal, NoiseFn, Perlin};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha12Rng;

/// Deterministic world-coordinate -> voxel policy. Implementations must be
/// pure: sampling the same coordinate twice yields bit-identical voxels, so
/// regenerating a chunk reproduces it exactly.
pub trait TerrainSampler: Send + Sync {
    fn sample(&self, world: IVec3) -> Voxel;
}

const STONE: [f32; 3] = [0.50, 0.50, 0.52];
const DIRT: [f32; 3] = [0.45, 0.30, 0.18];
const GRASS: [f32; 3] = [0.22, 0.58, 0.20];
const ROCK: [f32; 3] = [0.44, 0.42, 0.46];

/// Built-in terrain policy: a smooth low-frequency height field picks a
/// ground height per (x, z) column; voxels at or below it are solid and
/// colored by depth band, with rock where a secondary mountain field
/// dominates the surface.
pub struct HeightfieldSampler {
    config: TerrainConfig,
    terrain: Fbm<Perlin>,
    detail: Fbm<Perlin>,
    mountain: Fbm<Perlin>,
}

impl HeightfieldSampler {
    pub fn new(config: TerrainConfig) -> Self {
        let terrain = Fbm::<Perlin>::new(config.seed)
            .set_octaves(4)
            .set_persistence(0.5)
            .set_lacunarity(2.0);
        let detail = Fbm::<Perlin>::new(config.seed.wrapping_add(1))
            .set_octaves(2)
            .set_persistence(0.8)
            .set_lacunarity(2.0);
        let mountain = Fbm::<Perlin>::new(config.seed.wrapping_add(2))
            .set_octaves(3)
            .set_persistence(0.5)
            .set_lacunarity(2.0);
        Self {
            config,
            terrain,
            detail,
            mountain,
        }
    }

    fn sample_layer(&self, layer: &Fbm<Perlin>, x: i32, z: i32, scale: f64) -> f64 {
        layer.get([x as f64 * scale, z as f64 * scale])
    }

    /// Ground height of the (x, z) column, in world voxel units.
    pub fn ground_height(&self, x: i32, z: i32) -> i32 {
        let base = self.sample_layer(&self.terrain, x, z, self.config.world_scale);
        let detail = self.sample_layer(&self.detail, x, z, self.config.world_scale * 8.0);
        (self.config.base_height + base * self.config.terrain_amplitude + detail * 3.0).floor()
            as i32
    }

    /// Secondary field: columns whose ground rises above it get rock
    /// coloring instead of grass.
    fn mountain_height(&self, x: i32, z: i32) -> f64 {
        let m = self.sample_layer(&self.mountain, x, z, self.config.world_scale * 0.5);
        self.config.mountain_height + m * 6.0
    }

    /// Per-voxel color jitter seeded from the world coordinate, never from a
    /// free-running stream, so regeneration is bit-identical.
    fn jitter(&self, world: IVec3, color: [f32; 3]) -> [f32; 3] {
        let hash = (self.config.seed as u64)
            .wrapping_add((world.x as i64 as u64).wrapping_mul(341_873_128_712))
            .wrapping_add((world.y as i64 as u64).wrapping_mul(132_897_987_541))
            .wrapping_add((world.z as i64 as u64).wrapping_mul(914_744_743_181));
        let mut rng = ChaCha12Rng::seed_from_u64(hash);
        let scale = 1.0 + rng.gen_range(-0.06f32..=0.06f32);
        [
            (color[0] * scale).clamp(0.0, 1.0),
            (color[1] * scale).clamp(0.0, 1.0),
            (color[2] * scale).clamp(0.0, 1.0),
        ]
    }
}

impl TerrainSampler for HeightfieldSampler {
    fn sample(&self, world: IVec3) -> Voxel {
        let height = self.ground_height(world.x, world.z);
        if world.y > height {
            return Voxel::EMPTY;
        }

        let base = if world.y == height {
            if (height as f64) >= self.mountain_height(world.x, world.z) {
                ROCK
            } else {
                GRASS
            }
        } else if world.y > height - self.config.soil_depth {
            DIRT
        } else {
            STONE
        };

        Voxel::solid(self.jitter(world, base))
    }
}

/// Synthesizes the dense volume for one chunk by running the sampler over
/// every cell. Purely local; safe to call from any worker thread.
pub fn fill_chunk_volume(
    sampler: &dyn TerrainSampler,
    coordinate: ChunkCoord,
    chunk_size: u32,
) -> VoxelVolume {
    let mut volume = VoxelVolume::new(UVec3::splat(chunk_size));
    let origin = coordinate.voxel_origin(chunk_size);
    for z in 0..chunk_size {
        for y in 0..chunk_size {
            for x in 0..chunk_size {
                let world = origin + IVec3::new(x as i32, y as i32, z as i32);
                let voxel = sampler.sample(world);
                if voxel.solid {
                    // In-bounds by construction of the loop ranges.
                    *volume.at_mut(x, y, z).expect("loop stays inside extent") = voxel;
                }
            }
        }
    }
    volume
}
