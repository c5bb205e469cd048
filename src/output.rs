use std::{
    ffi::OsString,
    io::{self, BufWriter, Write},
    path::{Path, PathBuf},
};

use fs_err as fs;
use serde::Serialize;
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum OutputError {
    #[error("failed to write output: {0}")]
    FileWrite(#[from] io::Error),
    #[error("failed to serialize JSON: {0}")]
    Serialize(#[from] serde_json::Error),
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(OsString::from).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

fn write_and_rename<F>(tmp: &Path, path: &Path, write: F) -> Result<(), OutputError>
where
    F: FnOnce(&mut dyn Write) -> Result<(), OutputError>,
{
    let mut writer = BufWriter::new(fs::File::create(tmp)?);
    write(&mut writer)?;
    writer
        .into_inner()
        .map_err(io::IntoInnerError::into_error)?
        .sync_all()?;
    fs::rename(tmp, path)?;
    Ok(())
}

/// Writes through a temporary sibling of `path` that is renamed into place
/// once complete. On failure the temporary file is removed and an existing
/// file at `path` stays untouched.
pub fn persist<F>(path: &Path, write: F) -> Result<(), OutputError>
where
    F: FnOnce(&mut dyn Write) -> Result<(), OutputError>,
{
    let tmp = tmp_path(path);
    let result = write_and_rename(&tmp, path, write);

    if result.is_err() {
        if let Err(e) = fs::remove_file(&tmp) {
            debug!("could not clean up: {e}");
        }
    }
    result
}

pub fn write_json<T: Serialize>(value: &T, path: &Path, pretty: bool) -> Result<(), OutputError> {
    persist(path, |writer| {
        if pretty {
            serde_json::to_writer_pretty(&mut *writer, value)?;
        } else {
            serde_json::to_writer(&mut *writer, value)?;
        }
        writer.write_all(b"\n")?;
        Ok(())
    })
}
