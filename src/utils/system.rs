// src/utils/system.rs: System functions

use std::env;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};

use log::{debug, info, warn};
use sysinfo::System;

use crate::cli::Arguments;
use crate::config::defs::{
    Compressor, PipelineError, ToolPaths, BOWTIE2_TAG, FIX_PAIRS_TAG, FLASH_BIN, FQ2FA_TAG,
    GZIP_TAG, JAVA_TAG, PIGZ_TAG, TRIMMOMATIC_ADAPTERS, TRIMMOMATIC_JAR,
};


/// Looks up an executable on the search path, `which` style.
///
/// # Arguments
///
/// * `name` - Bare program name, e.g. `bowtie2`.
///
/// # Returns
/// Full path of the first match, if any.
pub fn find_on_path(name: &str) -> Option<PathBuf> {
    find_in(&env::var_os("PATH")?, name)
}

fn find_in(search: &OsStr, name: &str) -> Option<PathBuf> {
    env::split_paths(search)
        .map(|dir| dir.join(name))
        .find(|candidate| is_executable(candidate))
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    path.metadata()
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}


fn require_in(search: &OsStr, name: &str) -> Result<PathBuf, PipelineError> {
    find_in(search, name).ok_or_else(|| PipelineError::Config(format!("Missing {} on PATH", name)))
}

fn require_file(path: PathBuf, what: &str) -> Result<PathBuf, PipelineError> {
    if path.is_file() {
        Ok(path)
    } else {
        Err(PipelineError::Config(format!("Cannot find {}: {}", what, path.display())))
    }
}

fn require_executable(path: PathBuf, what: &str) -> Result<PathBuf, PipelineError> {
    let path = require_file(path, what)?;
    if is_executable(&path) {
        Ok(path)
    } else {
        Err(PipelineError::Config(format!("{} is not executable: {}", what, path.display())))
    }
}

/// Directory holding the running executable; bundled tools live under it.
fn exe_dir() -> Result<PathBuf, PipelineError> {
    let exe = env::current_exe().map_err(|e| PipelineError::Config(format!("Cannot locate executable: {}", e)))?;
    exe.parent()
        .map(Path::to_path_buf)
        .ok_or_else(|| PipelineError::Config("Executable has no parent directory".to_string()))
}

fn bundled(base: &Path, parts: &[&str]) -> PathBuf {
    parts.iter().fold(base.to_path_buf(), |path, part| path.join(part))
}


/// Picks pigz when available, gzip otherwise.
pub fn find_compressor() -> Option<(Compressor, PathBuf)> {
    compressor_in(&env::var_os("PATH")?)
}

fn compressor_in(search: &OsStr) -> Option<(Compressor, PathBuf)> {
    find_in(search, PIGZ_TAG)
        .map(|p| (Compressor::Pigz, p))
        .or_else(|| find_in(search, GZIP_TAG).map(|p| (Compressor::Gzip, p)))
}


/// Resolves every tool the run needs. Required tools that cannot be found are
/// a `Config` error; optional ones are left as `None`.
///
/// # Arguments
///
/// * `args` - Parsed command-line arguments.
///
/// # Returns
/// ToolPaths
pub fn resolve_tools(args: &Arguments) -> Result<ToolPaths, PipelineError> {
    let search = env::var_os("PATH").unwrap_or_default();
    resolve_tools_in(args, &search)
}

/// `resolve_tools` against an explicit search path instead of `$PATH`.
fn resolve_tools_in(args: &Arguments, search: &OsStr) -> Result<ToolPaths, PipelineError> {
    let screening = args.bowtie_idx.is_some();
    let base = exe_dir()?;

    let java = require_in(search, JAVA_TAG)?;
    let trimmomatic_jar = require_file(
        args.trimmomatic_jar.as_ref().map(PathBuf::from).unwrap_or_else(|| bundled(&base, TRIMMOMATIC_JAR)),
        "Trimmomatic jar",
    )?;
    let adapters = require_file(
        args.adapters.as_ref().map(PathBuf::from).unwrap_or_else(|| bundled(&base, TRIMMOMATIC_ADAPTERS)),
        "adapter FASTA",
    )?;
    let flash = require_executable(
        args.flash.as_ref().map(PathBuf::from).unwrap_or_else(|| bundled(&base, FLASH_BIN)),
        "FLASH",
    )?;

    let (bowtie2, fix_pairs) = if screening {
        (Some(require_in(search, BOWTIE2_TAG)?), Some(require_in(search, FIX_PAIRS_TAG)?))
    } else {
        (None, None)
    };

    let fq2fa = find_in(search, FQ2FA_TAG);
    let compressor = compressor_in(search);

    let tools = ToolPaths {
        java,
        trimmomatic_jar,
        adapters,
        flash,
        bowtie2,
        fix_pairs,
        fq2fa,
        compressor,
    };
    debug!("Resolved tools: {:?}", tools);
    Ok(tools)
}


/// Compares the requested thread count against the machine. The request is
/// passed through to the tools unchanged; oversubscription is only reported.
///
/// # Arguments
///
/// * `threads` - Thread count from the command line.
///
/// # Returns
/// Number of physical cores detected (1 if unknown).
pub fn check_thread_request(threads: usize) -> usize {
    let physical_cores = System::physical_core_count().unwrap_or(1);
    if threads > physical_cores {
        warn!("Requested {} threads but only {} physical cores detected", threads, physical_cores);
    } else {
        info!("Using {} of {} physical cores", threads, physical_cores);
    }
    physical_cores
}


#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::OsString;
    use std::os::unix::fs::PermissionsExt;

    #[test]
    fn test_find_on_path() {
        let sh = find_on_path("sh").expect("sh should be on PATH");
        assert!(sh.is_absolute() || sh.exists());
        assert!(find_on_path("definitely-not-a-real-tool-1d9f").is_none());
    }

    #[test]
    fn test_bundled_path() {
        let path = bundled(Path::new("/opt/qc"), TRIMMOMATIC_JAR);
        assert_eq!(path, PathBuf::from("/opt/qc/bin/trimmomatic-0.35/trimmomatic-0.35.jar"));
    }

    #[test]
    fn test_require_file_missing() {
        let err = require_file(PathBuf::from("/no/such/flash"), "FLASH").unwrap_err();
        assert!(matches!(err, PipelineError::Config(_)));
    }

    struct ToolDirs {
        _root: tempfile::TempDir,
        bin: PathBuf,
        args: Arguments,
    }

    /// Bundled-style jar, adapters and FLASH in one directory and an empty
    /// `bin` search path.
    fn tool_dirs(flash_mode: u32) -> anyhow::Result<ToolDirs> {
        let root = tempfile::tempdir()?;
        let bin = root.path().join("bin");
        std::fs::create_dir(&bin)?;
        let jar = root.path().join("trimmomatic.jar");
        let adapters = root.path().join("adapters.fa");
        let flash = root.path().join("flash");
        std::fs::write(&jar, "")?;
        std::fs::write(&adapters, "")?;
        std::fs::write(&flash, "#!/bin/sh\n")?;
        std::fs::set_permissions(&flash, std::fs::Permissions::from_mode(flash_mode))?;

        let args = Arguments {
            forward: Some("R1.fq".to_string()),
            reverse: Some("R2.fq".to_string()),
            trimmomatic_jar: Some(jar.to_string_lossy().to_string()),
            adapters: Some(adapters.to_string_lossy().to_string()),
            flash: Some(flash.to_string_lossy().to_string()),
            ..Default::default()
        };
        Ok(ToolDirs { _root: root, bin, args })
    }

    fn add_executable(dir: &Path, name: &str) -> anyhow::Result<()> {
        let path = dir.join(name);
        std::fs::write(&path, "#!/bin/sh\n")?;
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755))?;
        Ok(())
    }

    fn search(dir: &Path) -> OsString {
        dir.as_os_str().to_owned()
    }

    #[test]
    fn test_missing_java_is_config_error() -> anyhow::Result<()> {
        let tools = tool_dirs(0o755)?;
        match resolve_tools_in(&tools.args, &search(&tools.bin)) {
            Err(PipelineError::Config(msg)) => assert!(msg.contains(JAVA_TAG)),
            other => panic!("expected Config error, got {:?}", other),
        }
        Ok(())
    }

    #[test]
    fn test_screen_layout_requires_bowtie2() -> anyhow::Result<()> {
        let mut tools = tool_dirs(0o755)?;
        add_executable(&tools.bin, JAVA_TAG)?;

        let resolved = resolve_tools_in(&tools.args, &search(&tools.bin))?;
        assert!(resolved.bowtie2.is_none());
        assert!(resolved.fq2fa.is_none());
        assert!(resolved.compressor.is_none());

        tools.args.bowtie_idx = Some("genome/idx".to_string());
        match resolve_tools_in(&tools.args, &search(&tools.bin)) {
            Err(PipelineError::Config(msg)) => assert!(msg.contains(BOWTIE2_TAG)),
            other => panic!("expected Config error, got {:?}", other),
        }

        add_executable(&tools.bin, BOWTIE2_TAG)?;
        add_executable(&tools.bin, FIX_PAIRS_TAG)?;
        add_executable(&tools.bin, GZIP_TAG)?;
        let resolved = resolve_tools_in(&tools.args, &search(&tools.bin))?;
        assert_eq!(resolved.bowtie2, Some(tools.bin.join(BOWTIE2_TAG)));
        assert_eq!(resolved.fix_pairs, Some(tools.bin.join(FIX_PAIRS_TAG)));
        assert_eq!(resolved.compressor, Some((Compressor::Gzip, tools.bin.join(GZIP_TAG))));
        Ok(())
    }

    #[test]
    fn test_non_executable_flash_is_config_error() -> anyhow::Result<()> {
        let tools = tool_dirs(0o644)?;
        add_executable(&tools.bin, JAVA_TAG)?;
        match resolve_tools_in(&tools.args, &search(&tools.bin)) {
            Err(PipelineError::Config(msg)) => assert!(msg.contains("not executable")),
            other => panic!("expected Config error, got {:?}", other),
        }
        Ok(())
    }

    #[test]
    fn test_check_thread_request() {
        assert!(check_thread_request(1) >= 1);
    }
}
