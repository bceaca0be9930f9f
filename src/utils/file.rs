use std::ffi::OsString;
use std::fs::File;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use log::{debug, warn};
use tokio::fs;
use tokio::io::AsyncWriteExt;

use crate::config::defs::PipelineError;


/// Whether a staging failure aborts the run or is only logged.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Staging {
    Strict,
    Lenient,
}


/// Checks the gzip magic bytes. Files shorter than the magic are plain.
pub fn is_gzipped(path: &Path) -> io::Result<bool> {
    let mut file = File::open(path)?;
    let mut buffer = [0u8; 2];
    let mut filled = 0;
    while filled < buffer.len() {
        let n = file.read(&mut buffer[filled..])?;
        if n == 0 {
            return Ok(false);
        }
        filled += n;
    }
    Ok(buffer == [0x1F, 0x8B]) // Gzip magic bytes
}


/// Appends `suffix` to the final component of `path`.
///
/// # Arguments
///
/// * `path` - Base path, e.g. `out/reads.adapter_trimmed`.
/// * `suffix` - Literal text to append, e.g. `_1P`.
///
/// # Returns
/// `out/reads.adapter_trimmed_1P`
pub fn append_to_path(path: &Path, suffix: &str) -> PathBuf {
    let mut name: OsString = path.as_os_str().to_owned();
    name.push(suffix);
    PathBuf::from(name)
}


/// Fails with `MissingFile` for the first path that does not exist.
pub fn check_files<P: AsRef<Path>>(paths: &[P]) -> Result<(), PipelineError> {
    for path in paths {
        let path = path.as_ref();
        if !path.exists() {
            return Err(PipelineError::MissingFile { path: path.to_path_buf() });
        }
    }
    Ok(())
}


fn settle(mode: Staging, result: Result<(), PipelineError>) -> Result<(), PipelineError> {
    match (mode, result) {
        (Staging::Lenient, Err(e)) => {
            warn!("Ignoring staging failure: {}", e);
            Ok(())
        }
        (_, result) => result,
    }
}

fn staging_error(op: &'static str, path: &Path, error: io::Error) -> PipelineError {
    PipelineError::Staging {
        op,
        path: path.to_path_buf(),
        error: error.to_string(),
    }
}


pub async fn move_file(from: &Path, to: &Path, mode: Staging) -> Result<(), PipelineError> {
    debug!("mv {} {}", from.display(), to.display());
    let result = fs::rename(from, to)
        .await
        .map_err(|e| staging_error("move", from, e));
    settle(mode, result)
}


/// Byte-level concatenation of `parts` into a new file at `out`, like `cat a b > out`.
pub async fn concatenate_files<P: AsRef<Path>>(
    out: &Path,
    parts: &[P],
    mode: Staging,
) -> Result<(), PipelineError> {
    let result = async {
        let mut writer = fs::File::create(out)
            .await
            .map_err(|e| staging_error("create", out, e))?;
        for part in parts {
            let part = part.as_ref();
            debug!("cat {} >> {}", part.display(), out.display());
            let mut reader = fs::File::open(part)
                .await
                .map_err(|e| staging_error("open", part, e))?;
            tokio::io::copy(&mut reader, &mut writer)
                .await
                .map_err(|e| staging_error("concatenate", part, e))?;
        }
        writer.flush().await.map_err(|e| staging_error("flush", out, e))?;
        Ok::<(), PipelineError>(())
    }
    .await;
    settle(mode, result)
}


/// Removes every path. Strict mode stops at the first failure; lenient mode
/// logs each failure and carries on.
pub async fn delete_files<P: AsRef<Path>>(paths: &[P], mode: Staging) -> Result<(), PipelineError> {
    for path in paths {
        let path = path.as_ref();
        debug!("rm {}", path.display());
        let result = fs::remove_file(path)
            .await
            .map_err(|e| staging_error("delete", path, e));
        settle(mode, result)?;
    }
    Ok(())
}


/// Creates an empty file, truncating anything already there.
pub async fn touch_file(path: &Path, mode: Staging) -> Result<(), PipelineError> {
    let result = fs::File::create(path)
        .await
        .map(|_| ())
        .map_err(|e| staging_error("create", path, e));
    settle(mode, result)
}
