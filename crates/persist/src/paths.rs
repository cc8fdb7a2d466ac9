//! Cache directory layout.
//!
//! ```text
//! <cache root>/
//!   <stream name>/
//!     <x>_<y>.scattercache
//! ```
//! Paths are derived deterministically from the stream name and tile
//! coordinates so any process configured with the same root finds the same
//! files.

use scatterspace_common::TileCoords;
use std::path::{Path, PathBuf};

/// Extension reserved for tile cache files.
pub const TILE_CACHE_EXTENSION: &str = "scattercache";

/// Directory holding one stream's tile files.
pub fn stream_cache_dir(cache_root: &Path, stream_name: &str) -> PathBuf {
    cache_root.join(stream_name)
}

/// Full path of the cache file for one tile.
pub fn tile_file_path(cache_root: &Path, stream_name: &str, coords: TileCoords) -> PathBuf {
    stream_cache_dir(cache_root, stream_name).join(format!(
        "{}_{}.{}",
        coords.x, coords.y, TILE_CACHE_EXTENSION
    ))
}
