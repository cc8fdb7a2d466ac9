//! Persistence for scatter tiles.
//!
//! One cache file per tile, holding a flat run of fixed-size instance
//! records behind a version header. A tile with no instances never has a
//! file: saving an emptied tile deletes its cache file, so "file exists"
//! always means "tile has content".

pub mod codec;
pub mod paths;

pub use codec::{
    CodecError, SaveOutcome, TILE_FORMAT_VERSION, decode_tile, encode_tile, read_tile_file,
    save_tile,
};
pub use paths::{TILE_CACHE_EXTENSION, stream_cache_dir, tile_file_path};

pub fn crate_info() -> &'static str {
    "scatterspace-persist v0.1.0"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crate_loads() {
        assert!(crate_info().contains("persist"));
    }
}
