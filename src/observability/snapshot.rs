//! Crash-safe snapshot persistence.
//!
//! Each write goes to its own uniquely named temp file in the target's
//! directory, is flushed to disk and then renamed over the target. A kill
//! at any point leaves either the old file or the new one, and concurrent
//! writers never share a temp file.

use std::ffi::OsString;
use std::fs::File;
use std::io::{self, BufReader, BufWriter, Write};
use std::path::Path;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tempfile::NamedTempFile;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("snapshot I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("snapshot encoding error: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Hidden temp-file prefix used while writing `path`.
fn temp_prefix(path: &Path) -> OsString {
    let mut prefix = OsString::from(".");
    prefix.push(path.file_name().unwrap_or_else(|| "snapshot".as_ref()));
    prefix.push(".");
    prefix
}

/// Serialize `value` as pretty JSON and atomically replace `path`.
pub fn write_atomic<T: Serialize>(path: &Path, value: &T) -> Result<(), SnapshotError> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    // Removed on drop if anything below fails.
    let mut tmp = tempfile::Builder::new()
        .prefix(&temp_prefix(path))
        .suffix(".tmp")
        .tempfile_in(dir)?;

    write_json(&mut tmp, value)?;
    tmp.persist(path).map_err(io::Error::from)?;
    Ok(())
}

fn write_json<T: Serialize>(tmp: &mut NamedTempFile, value: &T) -> Result<(), SnapshotError> {
    let mut writer = BufWriter::new(tmp.as_file_mut());
    serde_json::to_writer_pretty(&mut writer, value)?;
    writer.write_all(b"\n")?;
    writer.flush()?;
    drop(writer);
    tmp.as_file().sync_all()?;
    Ok(())
}

/// Read a snapshot previously written with [`write_atomic`].
pub fn read_snapshot<T: DeserializeOwned>(path: &Path) -> Result<T, SnapshotError> {
    let file = File::open(path)?;
    Ok(serde_json::from_reader(BufReader::new(file))?)
}
