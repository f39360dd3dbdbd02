//! Engine tunables, loaded from a world-specific TOML file the same way the
//! old block registry loaded its texture manifest from JSON — except there's
//! no asset pipeline left to justify JSON, so this one is TOML.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::prelude::Result;

pub const CHUNK_SIZE: usize = 32;
pub const CHUNK_VOLUME: usize = CHUNK_SIZE * CHUNK_SIZE * CHUNK_SIZE;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Radius, in chunks, of the working set around the observer.
    pub view_distance: i32,
    /// How many chunk loads the worker performs per poll of `load_queue`.
    pub chunks_to_load_per_frame: usize,
    /// How many completed back buffers the foreground promotes per tick.
    pub mesh_swaps_per_frame: usize,
}

impl EngineConfig {
    /// The number of slots in the working set array for this config's view
    /// distance: `(2D+1)(D+1)(2D+1)`.
    pub fn pool_size(&self) -> usize {
        let d = self.view_distance as usize;
        (2 * d + 1) * (d + 1) * (2 * d + 1)
    }

    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(anyhow::Error::from)?;
        toml::from_str(&text).map_err(|e| anyhow::Error::from(e).into())
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            view_distance: 12,
            chunks_to_load_per_frame: 8,
            mesh_swaps_per_frame: 15,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_pool_size_matches_view_distance_twelve() {
        let cfg = EngineConfig::default();
        assert_eq!(cfg.pool_size(), (2 * 12 + 1) * (12 + 1) * (2 * 12 + 1));
    }

    #[test]
    fn parses_partial_toml_over_defaults() {
        let cfg: EngineConfig = toml::from_str("view_distance = 4\n").unwrap();
        assert_eq!(cfg.view_distance, 4);
        assert_eq!(cfg.chunks_to_load_per_frame, 8);
    }
}
