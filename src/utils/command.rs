/// Functions and structs for working with creating command-line arguments
/// and running external tools.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};

use log::{debug, info};
use tokio::fs::OpenOptions;
use tokio::process::Command;

use crate::config::defs::{
    Compressor, PipelineError, RunConfig, BOWTIE2_TAG, FIX_PAIRS_TAG, FLASH_TAG, FQ2FA_TAG, GZIP_TAG, PIGZ_TAG,
    TRIMMOMATIC_TAG,
};


fn path_arg(path: &Path) -> String {
    path.to_string_lossy().to_string()
}


pub mod trimmomatic {
    use std::path::PathBuf;
    use crate::config::defs::{
        RunConfig, MIN_LEN, PALINDROME_CLIP_THRESHOLD, QUAL, SEED_MISMATCHES,
        SIMPLE_CLIP_THRESHOLD, WINDOW_SIZE,
    };
    use super::path_arg;

    /// Paired-end ILLUMINACLIP run producing `<baseout>_{1,2}{P,U}`.
    #[derive(Debug, Clone)]
    pub struct AdapterClipConfig {
        pub in1: PathBuf,
        pub in2: PathBuf,
        pub baseout: PathBuf,
    }

    /// Single-end sliding-window quality trim.
    #[derive(Debug, Clone)]
    pub struct SingleEndConfig {
        pub input: PathBuf,
        pub output: PathBuf,
    }

    /// Paired-end sliding-window quality trim producing `<baseout>_{1,2}{P,U}`.
    #[derive(Debug, Clone)]
    pub struct PairedEndConfig {
        pub in1: PathBuf,
        pub in2: PathBuf,
        pub baseout: PathBuf,
    }

    fn jar_args(config: &RunConfig, mode: &str) -> Vec<String> {
        vec![
            "-jar".to_string(),
            path_arg(&config.tools.trimmomatic_jar),
            mode.to_string(),
            "-threads".to_string(),
            config.threads.to_string(),
        ]
    }

    fn sliding_window_args() -> Vec<String> {
        vec![
            format!("SLIDINGWINDOW:{}:{}", WINDOW_SIZE, QUAL),
            format!("MINLEN:{}", MIN_LEN),
        ]
    }

    pub fn adapter_clip_args(config: &RunConfig, clip: &AdapterClipConfig) -> Vec<String> {
        let mut args_vec = jar_args(config, "PE");
        args_vec.push("-baseout".to_string());
        args_vec.push(path_arg(&clip.baseout));
        args_vec.push(path_arg(&clip.in1));
        args_vec.push(path_arg(&clip.in2));
        args_vec.push(format!(
            "ILLUMINACLIP:{}:{}:{}:{}",
            path_arg(&config.tools.adapters),
            SEED_MISMATCHES,
            PALINDROME_CLIP_THRESHOLD,
            SIMPLE_CLIP_THRESHOLD
        ));
        args_vec
    }

    pub fn single_end_args(config: &RunConfig, se: &SingleEndConfig) -> Vec<String> {
        let mut args_vec = jar_args(config, "SE");
        args_vec.push(path_arg(&se.input));
        args_vec.push(path_arg(&se.output));
        args_vec.extend(sliding_window_args());
        args_vec
    }

    pub fn paired_end_args(config: &RunConfig, pe: &PairedEndConfig) -> Vec<String> {
        let mut args_vec = jar_args(config, "PE");
        args_vec.push(path_arg(&pe.in1));
        args_vec.push(path_arg(&pe.in2));
        args_vec.push("-baseout".to_string());
        args_vec.push(path_arg(&pe.baseout));
        args_vec.extend(sliding_window_args());
        args_vec
    }
}


pub mod flash {
    use std::path::PathBuf;
    use crate::config::defs::{RunConfig, FLASH_PREFIX, MAX_OVERLAP};
    use super::path_arg;

    #[derive(Debug, Clone)]
    pub struct FlashConfig {
        pub in1: PathBuf,
        pub in2: PathBuf,
        pub out_dir: PathBuf,
    }

    pub fn arg_generator(config: &RunConfig, flash: &FlashConfig) -> Vec<String> {
        let mut args_vec: Vec<String> = Vec::new();
        args_vec.push("--threads".to_string());
        args_vec.push(config.threads.to_string());
        args_vec.push("--output-prefix".to_string());
        args_vec.push(FLASH_PREFIX.to_string());
        args_vec.push("--max-overlap".to_string());
        args_vec.push(MAX_OVERLAP.to_string());
        args_vec.push(path_arg(&flash.in1));
        args_vec.push(path_arg(&flash.in2));
        args_vec.push("--output-directory".to_string());
        args_vec.push(path_arg(&flash.out_dir));
        args_vec
    }
}


pub mod bowtie2 {
    use std::path::PathBuf;
    use crate::config::defs::RunConfig;
    use super::path_arg;

    #[derive(Debug, Clone)]
    pub struct Bowtie2Config {
        pub index: PathBuf,
        pub reads: PathBuf,
        pub unaligned: PathBuf,
        pub aligned: PathBuf,
    }

    pub fn arg_generator(config: &RunConfig, bt2: &Bowtie2Config) -> Vec<String> {
        let mut args_vec: Vec<String> = Vec::new();
        args_vec.push("-x".to_string());
        args_vec.push(path_arg(&bt2.index));
        args_vec.push("-U".to_string());
        args_vec.push(path_arg(&bt2.reads));
        args_vec.push("--sensitive".to_string());
        args_vec.push("--end-to-end".to_string());
        args_vec.push("--threads".to_string());
        args_vec.push(config.threads.to_string());
        args_vec.push("--un".to_string());
        args_vec.push(path_arg(&bt2.unaligned));
        args_vec.push("--al".to_string());
        args_vec.push(path_arg(&bt2.aligned));
        args_vec.push("-S".to_string());
        args_vec.push("/dev/null".to_string());
        args_vec
    }
}


pub mod fix_pairs {
    use std::path::PathBuf;
    use super::path_arg;

    /// Writes `<basename>.1.fq`, `<basename>.2.fq` and `<basename>.U.fq`.
    #[derive(Debug, Clone)]
    pub struct FixPairsConfig {
        pub in1: PathBuf,
        pub in2: PathBuf,
        pub basename: PathBuf,
    }

    pub fn arg_generator(fix: &FixPairsConfig) -> Vec<String> {
        vec![path_arg(&fix.in1), path_arg(&fix.in2), path_arg(&fix.basename)]
    }
}


pub mod fq2fa {
    use std::path::PathBuf;
    use super::path_arg;

    #[derive(Debug, Clone)]
    pub enum Fq2FaConfig {
        /// Interleaves mates into one FASTA.
        Merge { in1: PathBuf, in2: PathBuf, out: PathBuf },
        Single { input: PathBuf, out: PathBuf },
    }

    pub fn arg_generator(fq2fa: &Fq2FaConfig) -> Vec<String> {
        let mut args_vec = vec!["--filter".to_string()];
        match fq2fa {
            Fq2FaConfig::Merge { in1, in2, out } => {
                args_vec.push("--merge".to_string());
                args_vec.push(path_arg(in1));
                args_vec.push(path_arg(in2));
                args_vec.push(path_arg(out));
            }
            Fq2FaConfig::Single { input, out } => {
                args_vec.push(path_arg(input));
                args_vec.push(path_arg(out));
            }
        }
        args_vec
    }
}


pub mod compress {
    use std::path::PathBuf;
    use crate::config::defs::{Compressor, RunConfig};
    use super::path_arg;

    #[derive(Debug, Clone)]
    pub struct CompressConfig {
        pub files: Vec<PathBuf>,
    }

    pub fn arg_generator(config: &RunConfig, compressor: Compressor, compress: &CompressConfig) -> Vec<String> {
        let mut args_vec = vec!["--best".to_string()];
        if compressor == Compressor::Pigz {
            args_vec.push("--processes".to_string());
            args_vec.push(config.threads.to_string());
        }
        args_vec.extend(compress.files.iter().map(|f| path_arg(f)));
        args_vec
    }
}


/// One variant per external tool invocation mode.
#[derive(Debug, Clone)]
pub enum ToolCommand {
    TrimAdapters(trimmomatic::AdapterClipConfig),
    QualityTrimSingle(trimmomatic::SingleEndConfig),
    QualityTrimPaired(trimmomatic::PairedEndConfig),
    MergePairs(flash::FlashConfig),
    ScreenGenome(bowtie2::Bowtie2Config),
    FixPairs(fix_pairs::FixPairsConfig),
    FastqToFasta(fq2fa::Fq2FaConfig),
    Compress(compress::CompressConfig),
}


/// A fully resolved process invocation: program plus argument list.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolInvocation {
    pub tool: &'static str,
    pub program: PathBuf,
    pub args: Vec<String>,
}


fn optional_tool(path: &Option<PathBuf>, tag: &str) -> Result<PathBuf, PipelineError> {
    path.clone()
        .ok_or_else(|| PipelineError::Config(format!("{} is not configured", tag)))
}


/// Builds the program and argument list for a tool command.
///
/// # Arguments
///
/// * `command` - Typed tool command.
/// * `config` - RunConfig holding tool paths and thread count.
///
/// # Returns
/// ToolInvocation, or `Config` error if the command's tool is not configured.
pub fn generate_cli(command: &ToolCommand, config: &RunConfig) -> Result<ToolInvocation, PipelineError> {
    let tools = &config.tools;
    let invocation = match command {
        ToolCommand::TrimAdapters(clip) => ToolInvocation {
            tool: TRIMMOMATIC_TAG,
            program: tools.java.clone(),
            args: trimmomatic::adapter_clip_args(config, clip),
        },
        ToolCommand::QualityTrimSingle(se) => ToolInvocation {
            tool: TRIMMOMATIC_TAG,
            program: tools.java.clone(),
            args: trimmomatic::single_end_args(config, se),
        },
        ToolCommand::QualityTrimPaired(pe) => ToolInvocation {
            tool: TRIMMOMATIC_TAG,
            program: tools.java.clone(),
            args: trimmomatic::paired_end_args(config, pe),
        },
        ToolCommand::MergePairs(fl) => ToolInvocation {
            tool: FLASH_TAG,
            program: tools.flash.clone(),
            args: flash::arg_generator(config, fl),
        },
        ToolCommand::ScreenGenome(bt2) => ToolInvocation {
            tool: BOWTIE2_TAG,
            program: optional_tool(&tools.bowtie2, BOWTIE2_TAG)?,
            args: bowtie2::arg_generator(config, bt2),
        },
        ToolCommand::FixPairs(fix) => ToolInvocation {
            tool: FIX_PAIRS_TAG,
            program: optional_tool(&tools.fix_pairs, FIX_PAIRS_TAG)?,
            args: fix_pairs::arg_generator(fix),
        },
        ToolCommand::FastqToFasta(fa) => ToolInvocation {
            tool: FQ2FA_TAG,
            program: optional_tool(&tools.fq2fa, FQ2FA_TAG)?,
            args: fq2fa::arg_generator(fa),
        },
        ToolCommand::Compress(cmp) => {
            let (compressor, program) = tools
                .compressor
                .clone()
                .ok_or_else(|| PipelineError::Config("No compressor configured".to_string()))?;
            let tool = match compressor {
                Compressor::Pigz => PIGZ_TAG,
                Compressor::Gzip => GZIP_TAG,
            };
            ToolInvocation {
                tool,
                program,
                args: compress::arg_generator(config, compressor, cmp),
            }
        }
    };
    Ok(invocation)
}


/// Runs a tool to completion with stdout and stderr appended to `log_path`.
/// Only the exit status is returned; output is never inspected.
///
/// # Arguments
///
/// * `invocation` - Program and arguments.
/// * `log_path` - Run log, created if absent.
///
/// # Returns
/// ExitStatus of the child. Failing to open the log or spawn the program is an error.
pub async fn run_tool(invocation: &ToolInvocation, log_path: &Path) -> Result<ExitStatus, PipelineError> {
    let mut log = OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_path)
        .await
        .map_err(|e| PipelineError::Io(format!("Cannot open log {}: {}", log_path.display(), e)))?
        .into_std()
        .await;
    let log_err = log
        .try_clone()
        .map_err(|e| PipelineError::Io(format!("Cannot duplicate log handle: {}", e)))?;

    debug!("{} {}", invocation.program.display(), invocation.args.join(" "));

    let status = Command::new(&invocation.program)
        .args(&invocation.args)
        .stdin(Stdio::null())
        .stdout(Stdio::from(log_err.try_clone().map_err(|e| PipelineError::Io(e.to_string()))?))
        .stderr(Stdio::from(log_err))
        .status()
        .await;

    match status {
        Ok(status) => Ok(status),
        Err(e) => {
            let _ = writeln!(log, "Failed to spawn {}: {}", invocation.program.display(), e);
            Err(PipelineError::ToolFailure {
                tool: invocation.tool.to_string(),
                args: invocation.args.clone(),
                exit_code: None,
                log_path: log_path.to_path_buf(),
            })
        }
    }
}


/// `run_tool`, failing with `ToolFailure` on a non-zero exit.
pub async fn run_tool_strict(invocation: &ToolInvocation, log_path: &Path) -> Result<(), PipelineError> {
    info!("Running {}", invocation.tool);
    let status = run_tool(invocation, log_path).await?;
    if status.success() {
        Ok(())
    } else {
        Err(PipelineError::ToolFailure {
            tool: invocation.tool.to_string(),
            args: invocation.args.clone(),
            exit_code: status.code(),
            log_path: log_path.to_path_buf(),
        })
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::defs::{Layout, ToolPaths};
    use tempfile::tempdir;

    fn test_config(compressor: Option<(Compressor, PathBuf)>) -> RunConfig {
        RunConfig {
            forward: PathBuf::from("in/R1.fq"),
            reverse: PathBuf::from("in/R2.fq"),
            out_dir: PathBuf::from("out"),
            log_path: PathBuf::from("out/qc_log.txt"),
            threads: 8,
            tools: ToolPaths {
                java: PathBuf::from("/usr/bin/java"),
                trimmomatic_jar: PathBuf::from("/opt/trimmomatic.jar"),
                adapters: PathBuf::from("/opt/TruSeq3-PE-both.fa"),
                flash: PathBuf::from("/opt/flash"),
                bowtie2: Some(PathBuf::from("/usr/bin/bowtie2")),
                fix_pairs: None,
                fq2fa: None,
                compressor,
            },
            layout: Layout::Plain,
        }
    }

    fn to_vec(args: &[&str]) -> Vec<String> {
        args.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_trim_adapters_args() -> anyhow::Result<()> {
        let config = test_config(None);
        let cmd = ToolCommand::TrimAdapters(trimmomatic::AdapterClipConfig {
            in1: PathBuf::from("in/R1.fq"),
            in2: PathBuf::from("in/R2.fq"),
            baseout: PathBuf::from("out/reads.adapter_trimmed"),
        });
        let inv = generate_cli(&cmd, &config)?;
        assert_eq!(inv.program, PathBuf::from("/usr/bin/java"));
        assert_eq!(inv.tool, TRIMMOMATIC_TAG);
        assert_eq!(inv.args, to_vec(&[
            "-jar", "/opt/trimmomatic.jar", "PE", "-threads", "8",
            "-baseout", "out/reads.adapter_trimmed", "in/R1.fq", "in/R2.fq",
            "ILLUMINACLIP:/opt/TruSeq3-PE-both.fa:2:30:10",
        ]));
        Ok(())
    }

    #[test]
    fn test_quality_trim_args() -> anyhow::Result<()> {
        let config = test_config(None);
        let se = generate_cli(&ToolCommand::QualityTrimSingle(trimmomatic::SingleEndConfig {
            input: PathBuf::from("a"),
            output: PathBuf::from("b"),
        }), &config)?;
        assert_eq!(se.args, to_vec(&[
            "-jar", "/opt/trimmomatic.jar", "SE", "-threads", "8", "a", "b",
            "SLIDINGWINDOW:4:15", "MINLEN:50",
        ]));

        let pe = generate_cli(&ToolCommand::QualityTrimPaired(trimmomatic::PairedEndConfig {
            in1: PathBuf::from("x_1P"),
            in2: PathBuf::from("x_2P"),
            baseout: PathBuf::from("x.qual_trimmed"),
        }), &config)?;
        assert_eq!(pe.args, to_vec(&[
            "-jar", "/opt/trimmomatic.jar", "PE", "-threads", "8", "x_1P", "x_2P",
            "-baseout", "x.qual_trimmed", "SLIDINGWINDOW:4:15", "MINLEN:50",
        ]));
        Ok(())
    }

    #[test]
    fn test_flash_and_bowtie2_args() -> anyhow::Result<()> {
        let config = test_config(None);
        let fl = generate_cli(&ToolCommand::MergePairs(flash::FlashConfig {
            in1: PathBuf::from("p1"),
            in2: PathBuf::from("p2"),
            out_dir: PathBuf::from("out/flash"),
        }), &config)?;
        assert_eq!(fl.program, PathBuf::from("/opt/flash"));
        assert_eq!(fl.args, to_vec(&[
            "--threads", "8", "--output-prefix", "flashed", "--max-overlap", "250",
            "p1", "p2", "--output-directory", "out/flash",
        ]));

        let bt2 = generate_cli(&ToolCommand::ScreenGenome(bowtie2::Bowtie2Config {
            index: PathBuf::from("idx/genome"),
            reads: PathBuf::from("reads.1.fq"),
            unaligned: PathBuf::from("reads.1.fq.did_not_align.fq"),
            aligned: PathBuf::from("reads.1.fq.did_align.fq"),
        }), &config)?;
        assert_eq!(bt2.args, to_vec(&[
            "-x", "idx/genome", "-U", "reads.1.fq", "--sensitive", "--end-to-end",
            "--threads", "8", "--un", "reads.1.fq.did_not_align.fq",
            "--al", "reads.1.fq.did_align.fq", "-S", "/dev/null",
        ]));
        Ok(())
    }

    #[test]
    fn test_unconfigured_tool_is_config_error() {
        let config = test_config(None);
        let fix = ToolCommand::FixPairs(fix_pairs::FixPairsConfig {
            in1: PathBuf::from("a"),
            in2: PathBuf::from("b"),
            basename: PathBuf::from("c"),
        });
        assert!(matches!(generate_cli(&fix, &config), Err(PipelineError::Config(_))));

        let compress = ToolCommand::Compress(compress::CompressConfig { files: vec![] });
        assert!(matches!(generate_cli(&compress, &config), Err(PipelineError::Config(_))));
    }

    #[test]
    fn test_compress_args() -> anyhow::Result<()> {
        let files = vec![PathBuf::from("reads.1.fq"), PathBuf::from("reads.2.fq")];

        let config = test_config(Some((Compressor::Pigz, PathBuf::from("/usr/bin/pigz"))));
        let inv = generate_cli(&ToolCommand::Compress(compress::CompressConfig { files: files.clone() }), &config)?;
        assert_eq!(inv.tool, PIGZ_TAG);
        assert_eq!(inv.args, to_vec(&["--best", "--processes", "8", "reads.1.fq", "reads.2.fq"]));

        let config = test_config(Some((Compressor::Gzip, PathBuf::from("/bin/gzip"))));
        let inv = generate_cli(&ToolCommand::Compress(compress::CompressConfig { files }), &config)?;
        assert_eq!(inv.tool, GZIP_TAG);
        assert_eq!(inv.args, to_vec(&["--best", "reads.1.fq", "reads.2.fq"]));
        Ok(())
    }

    #[test]
    fn test_fq2fa_args() {
        let merged = fq2fa::arg_generator(&fq2fa::Fq2FaConfig::Merge {
            in1: PathBuf::from("r1"),
            in2: PathBuf::from("r2"),
            out: PathBuf::from("il.fa"),
        });
        assert_eq!(merged, to_vec(&["--filter", "--merge", "r1", "r2", "il.fa"]));
        let single = fq2fa::arg_generator(&fq2fa::Fq2FaConfig::Single {
            input: PathBuf::from("u"),
            out: PathBuf::from("u.fa"),
        });
        assert_eq!(single, to_vec(&["--filter", "u", "u.fa"]));
    }

    #[tokio::test]
    async fn test_run_tool_appends_output_to_log() -> anyhow::Result<()> {
        let dir = tempdir()?;
        let log_path = dir.path().join("log.txt");
        std::fs::write(&log_path, "existing\n")?;

        let inv = ToolInvocation {
            tool: "sh",
            program: PathBuf::from("sh"),
            args: to_vec(&["-c", "echo to-stdout; echo to-stderr >&2"]),
        };
        let status = run_tool(&inv, &log_path).await?;
        assert!(status.success());

        let log = std::fs::read_to_string(&log_path)?;
        assert!(log.starts_with("existing\n"));
        assert!(log.contains("to-stdout"));
        assert!(log.contains("to-stderr"));
        Ok(())
    }

    #[tokio::test]
    async fn test_run_tool_creates_and_appends_log() -> anyhow::Result<()> {
        let dir = tempdir()?;
        let log_path = dir.path().join("qc_log.txt");
        assert!(!log_path.exists());

        for word in ["first", "second"] {
            let script = format!("echo {}", word);
            let inv = ToolInvocation {
                tool: "sh",
                program: PathBuf::from("sh"),
                args: to_vec(&["-c", script.as_str()]),
            };
            run_tool_strict(&inv, &log_path).await?;
        }
        assert_eq!(std::fs::read_to_string(&log_path)?, "first\nsecond\n");
        Ok(())
    }

    #[tokio::test]
    async fn test_run_tool_strict_maps_exit_code() -> anyhow::Result<()> {
        let dir = tempdir()?;
        let log_path = dir.path().join("log.txt");
        let inv = ToolInvocation {
            tool: "sh",
            program: PathBuf::from("sh"),
            args: to_vec(&["-c", "exit 3"]),
        };

        let status = run_tool(&inv, &log_path).await?;
        assert_eq!(status.code(), Some(3));

        match run_tool_strict(&inv, &log_path).await {
            Err(PipelineError::ToolFailure { tool, exit_code, log_path: logged, .. }) => {
                assert_eq!(tool, "sh");
                assert_eq!(exit_code, Some(3));
                assert_eq!(logged, log_path);
            }
            other => panic!("expected ToolFailure, got {:?}", other),
        }
        Ok(())
    }

    #[tokio::test]
    async fn test_run_tool_spawn_failure() -> anyhow::Result<()> {
        let dir = tempdir()?;
        let log_path = dir.path().join("log.txt");
        let inv = ToolInvocation {
            tool: "missing",
            program: dir.path().join("no-such-program"),
            args: vec![],
        };
        let err = run_tool(&inv, &log_path).await.unwrap_err();
        assert!(matches!(err, PipelineError::ToolFailure { exit_code: None, .. }));
        assert!(std::fs::read_to_string(&log_path)?.contains("Failed to spawn"));
        Ok(())
    }
}
