//! Binary (de)serialization of a tile's instance lists.
//!
//! Layout:
//! ```text
//! i32                 format version
//! repeat until EOF:
//!   f32 x, y, z       position
//!   f32 qx, qy, qz, qw rotation quaternion
//!   f32 sx, sy, sz    scale
//!   i32               preset index
//! ```
//! Records are written grouped by preset in ascending order, but decode makes
//! no grouping assumption: each record is handed to a callback with its
//! preset index and callers re-group however they need.

use bytemuck::{Pod, Zeroable};
use glam::{Quat, Vec3};
use scatterspace_common::Transform;
use std::io::{Read, Write};
use std::path::Path;

/// Bumped whenever the record layout changes; files carrying any other
/// version fail to decode rather than being guessed at.
pub const TILE_FORMAT_VERSION: i32 = 1;

/// On-disk shape of one placed instance.
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct InstanceRecord {
    position: [f32; 3],
    rotation: [f32; 4],
    scale: [f32; 3],
    preset_index: i32,
}

const RECORD_SIZE: usize = std::mem::size_of::<InstanceRecord>();

/// Errors from encoding or decoding a tile cache.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("unsupported tile format version {found} (supported: {TILE_FORMAT_VERSION})")]
    UnsupportedVersion { found: i32 },
    #[error("truncated record: expected {expected} bytes, got {got}")]
    Truncated { expected: usize, got: usize },
    #[error("record carries negative preset index {0}")]
    InvalidPresetIndex(i32),
}

impl CodecError {
    /// Whether a load hitting this error should be recorded as permanently
    /// unreadable for the session, as opposed to retried later.
    pub fn is_format_failure(&self) -> bool {
        !matches!(self, Self::Io(_))
    }
}

/// Write the version header and every instance, grouped by ascending preset
/// index.
pub fn encode_tile<W: Write>(
    writer: &mut W,
    per_preset: &[Vec<Transform>],
) -> Result<(), CodecError> {
    writer.write_all(&TILE_FORMAT_VERSION.to_le_bytes())?;

    for (preset_index, instances) in per_preset.iter().enumerate() {
        for transform in instances {
            let record = InstanceRecord {
                position: transform.position.to_array(),
                rotation: transform.rotation.to_array(),
                scale: transform.scale.to_array(),
                preset_index: preset_index as i32,
            };
            writer.write_all(bytemuck::bytes_of(&record))?;
        }
    }

    Ok(())
}

/// Read records until end-of-stream, invoking `on_record` with each decoded
/// `(preset_index, transform)`.
///
/// Fails cleanly on a version mismatch or a short read (including a file
/// being concurrently rewritten); the callback is never invoked after an
/// error surfaces, so callers building state incrementally should stage into
/// a scratch structure and commit only on `Ok`.
pub fn decode_tile<R: Read>(
    reader: &mut R,
    mut on_record: impl FnMut(usize, Transform),
) -> Result<(), CodecError> {
    let mut version_bytes = [0u8; 4];
    reader.read_exact(&mut version_bytes)?;
    let version = i32::from_le_bytes(version_bytes);
    if version != TILE_FORMAT_VERSION {
        return Err(CodecError::UnsupportedVersion { found: version });
    }

    while let Some(record) = read_record(reader)? {
        let preset_index = usize::try_from(record.preset_index)
            .map_err(|_| CodecError::InvalidPresetIndex(record.preset_index))?;
        on_record(
            preset_index,
            Transform {
                position: Vec3::from_array(record.position),
                rotation: Quat::from_array(record.rotation),
                scale: Vec3::from_array(record.scale),
            },
        );
    }

    Ok(())
}

/// One full record, `None` at a clean end-of-stream, `Truncated` on a
/// partial tail.
fn read_record<R: Read>(reader: &mut R) -> Result<Option<InstanceRecord>, CodecError> {
    let mut buf = [0u8; RECORD_SIZE];
    let mut filled = 0;
    while filled < RECORD_SIZE {
        let n = reader.read(&mut buf[filled..])?;
        if n == 0 {
            if filled == 0 {
                return Ok(None);
            }
            return Err(CodecError::Truncated {
                expected: RECORD_SIZE,
                got: filled,
            });
        }
        filled += n;
    }
    Ok(Some(*bytemuck::from_bytes(&buf)))
}

/// Read a tile cache file and regroup its records into per-preset lists.
///
/// The result has at least `preset_count` lists; records referencing a
/// preset beyond that grow the result rather than being dropped, leaving the
/// caller to reconcile against its current catalogue.
pub fn read_tile_file(path: &Path, preset_count: usize) -> Result<Vec<Vec<Transform>>, CodecError> {
    let file = std::fs::File::open(path)?;
    let mut reader = std::io::BufReader::new(file);

    let mut lists: Vec<Vec<Transform>> = Vec::with_capacity(preset_count);
    lists.resize_with(preset_count, Vec::new);

    decode_tile(&mut reader, |preset_index, transform| {
        if preset_index >= lists.len() {
            lists.resize_with(preset_index + 1, Vec::new);
        }
        lists[preset_index].push(transform);
    })?;

    Ok(lists)
}

/// What [`save_tile`] did with the file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveOutcome {
    /// Instances were written (count of records).
    Written(usize),
    /// The tile was empty and an existing file was deleted.
    Deleted,
    /// The tile was empty and no file existed.
    Nothing,
}

/// Persist a tile's instance lists to `path`, or delete the file when the
/// tile holds no instances at all.
pub fn save_tile(path: &Path, per_preset: &[Vec<Transform>]) -> Result<SaveOutcome, CodecError> {
    let total: usize = per_preset.iter().map(Vec::len).sum();

    if total == 0 {
        if path.exists() {
            std::fs::remove_file(path)?;
            tracing::debug!(path = %path.display(), "deleted cache file for emptied tile");
            return Ok(SaveOutcome::Deleted);
        }
        return Ok(SaveOutcome::Nothing);
    }

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    // Replace any previous contents wholesale.
    if path.exists() {
        std::fs::remove_file(path)?;
    }

    let file = std::fs::File::create(path)?;
    let mut writer = std::io::BufWriter::new(file);
    encode_tile(&mut writer, per_preset)?;
    writer.flush()?;

    Ok(SaveOutcome::Written(total))
}
