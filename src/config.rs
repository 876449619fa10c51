use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Streaming parameters: chunk geometry and the desired load window.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamConfig {
    /// Voxels per chunk edge.
    pub chunk_size: u32,
    /// World-space size of one voxel.
    pub voxel_scale: f32,
    /// Chebyshev radius of the load window, in chunks.
    pub load_distance: i32,
    /// Worker thread count; 0 means available hardware concurrency.
    pub worker_threads: usize,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            chunk_size: 32,
            voxel_scale: 1.0,
            load_distance: 4,
            worker_threads: 0,
        }
    }
}

impl StreamConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        toml::from_str(&text).with_context(|| format!("Failed to parse {}", path.display()))
    }

    /// World-space edge length of one chunk.
    pub fn chunk_world_size(&self) -> f32 {
        self.chunk_size as f32 * self.voxel_scale
    }

    /// Resolved worker count: configured value, or hardware concurrency,
    /// never less than one.
    pub fn worker_count(&self) -> usize {
        if self.worker_threads > 0 {
            return self.worker_threads;
        }
        std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1)
            .max(1)
    }
}

/// Terrain policy parameters for the built-in heightfield sampler.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TerrainConfig {
    pub seed: u32,
    /// Base ground level, in voxels.
    pub base_height: f64,
    /// Amplitude of the primary height field.
    pub terrain_amplitude: f64,
    /// Horizontal frequency scale applied to all noise layers.
    pub world_scale: f64,
    /// Ground height above which the mountain field recolors the surface.
    pub mountain_height: f64,
    /// Depth of the dirt band below the surface, in voxels.
    pub soil_depth: i32,
}

impl Default for TerrainConfig {
    fn default() -> Self {
        Self {
            seed: 0,
            base_height: 16.0,
            terrain_amplitude: 24.0,
            world_scale: 0.01,
            mountain_height: 28.0,
            soil_depth: 3,
        }
    }
}

impl TerrainConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        toml::from_str(&text).with_context(|| format!("Failed to parse {}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_resolve_at_least_one_worker() {
        let config = StreamConfig::default();
        assert!(config.worker_count() >= 1);

        let pinned = StreamConfig {
            worker_threads: 3,
            ..Default::default()
        };
        assert_eq!(pinned.worker_count(), 3);
    }

    #[test]
    fn stream_config_parses_toml() {
        let config: StreamConfig = toml::from_str(
            "chunk_size = 16\nvoxel_scale = 0.5\nload_distance = 2\nworker_threads = 2\n",
        )
        .unwrap();
        assert_eq!(config.chunk_size, 16);
        assert_eq!(config.chunk_world_size(), 8.0);
    }
}
