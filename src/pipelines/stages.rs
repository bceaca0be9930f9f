use std::path::{Path, PathBuf};

use log::{info, warn};

use crate::config::defs::{
    PipelineError, RunConfig, FIX_PAIRS_BASE, FLASH_COMBINED, FLASH_NOT_COMBINED_1P,
    FLASH_NOT_COMBINED_2P, FLASH_PREFIX, INTERLEAVED_FASTA, SCREEN_HIT_SUFFIX, SCREEN_KEEP_SUFFIX,
    UNPAIRED_FASTA,
};
use crate::utils::command::{
    bowtie2::Bowtie2Config, compress::CompressConfig, fix_pairs::FixPairsConfig, flash::FlashConfig,
    fq2fa::Fq2FaConfig, generate_cli, run_tool, run_tool_strict,
    trimmomatic::{AdapterClipConfig, PairedEndConfig, SingleEndConfig}, ToolCommand,
};
use crate::utils::fastx::read_count;
use crate::utils::file::{
    append_to_path, check_files, concatenate_files, delete_files, move_file, touch_file, Staging,
};


#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadRole {
    PairedForward,
    PairedReverse,
    Unpaired,
    ScreenedKeep,
    ScreenedHit,
}


/// A read file owned by exactly one stage at a time. Not `Clone`:
/// stages consume their inputs by value and hand back new sets.
#[derive(Debug, PartialEq)]
pub struct ReadSet {
    path: PathBuf,
    role: ReadRole,
}

impl ReadSet {
    pub fn new(path: PathBuf, role: ReadRole) -> Self {
        ReadSet { path, role }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn role(&self) -> ReadRole {
        self.role
    }

    pub fn into_path(self) -> PathBuf {
        self.path
    }
}


/// Trimmomatic paired-end outputs: `<base>_1P`, `<base>_2P`, `<base>_1U`, `<base>_2U`.
#[derive(Debug)]
pub struct TrimmedPairs {
    pub forward: ReadSet,
    pub reverse: ReadSet,
    pub unpaired_forward: ReadSet,
    pub unpaired_reverse: ReadSet,
}

impl TrimmedPairs {
    fn from_baseout(baseout: &Path) -> Self {
        TrimmedPairs {
            forward: ReadSet::new(append_to_path(baseout, "_1P"), ReadRole::PairedForward),
            reverse: ReadSet::new(append_to_path(baseout, "_2P"), ReadRole::PairedReverse),
            unpaired_forward: ReadSet::new(append_to_path(baseout, "_1U"), ReadRole::Unpaired),
            unpaired_reverse: ReadSet::new(append_to_path(baseout, "_2U"), ReadRole::Unpaired),
        }
    }

    fn paths(&self) -> [&Path; 4] {
        [
            self.forward.path(),
            self.reverse.path(),
            self.unpaired_forward.path(),
            self.unpaired_reverse.path(),
        ]
    }
}

#[derive(Debug)]
pub struct MergedReads {
    pub combined: ReadSet,
    pub not_combined_1: ReadSet,
    pub not_combined_2: ReadSet,
}

#[derive(Debug)]
pub struct ScreenedReads {
    pub keep: ReadSet,
    pub hit: ReadSet,
}

#[derive(Debug)]
pub struct RepairedPairs {
    pub forward: ReadSet,
    pub reverse: ReadSet,
    pub unpaired: ReadSet,
}


async fn run_strict(command: ToolCommand, config: &RunConfig) -> Result<(), PipelineError> {
    let invocation = generate_cli(&command, config)?;
    run_tool_strict(&invocation, &config.log_path).await
}


/// Clips adapters from the raw read pair. The raw inputs belong to the user
/// and are left in place.
///
/// # Arguments
///
/// * `config` - RunConfig struct from main.
/// * `forward`, `reverse` - Raw R1/R2 FASTQ.
/// * `baseout` - Trimmomatic `-baseout` prefix.
///
/// # Returns
/// TrimmedPairs
pub async fn adapter_trim(
    config: &RunConfig,
    forward: &Path,
    reverse: &Path,
    baseout: &Path,
) -> Result<TrimmedPairs, PipelineError> {
    info!("Trimming adapters");
    run_strict(
        ToolCommand::TrimAdapters(AdapterClipConfig {
            in1: forward.to_path_buf(),
            in2: reverse.to_path_buf(),
            baseout: baseout.to_path_buf(),
        }),
        config,
    )
    .await?;

    let trimmed = TrimmedPairs::from_baseout(baseout);
    check_files(&trimmed.paths())?;
    Ok(trimmed)
}


/// Single-end quality trim. An input with no reads is not sent to the trimmer;
/// an empty placeholder takes the place of its output so a library with no
/// surviving singletons does not stop the run. The input is removed either way.
///
/// # Arguments
///
/// * `config` - RunConfig struct from main.
/// * `input` - Reads to trim; consumed.
/// * `output` - Path of the trimmed reads.
///
/// # Returns
/// ReadSet at `output`, same role as `input`.
pub async fn quality_trim_single(
    config: &RunConfig,
    input: ReadSet,
    output: PathBuf,
) -> Result<ReadSet, PipelineError> {
    check_files(&[input.path()])?;
    let count = read_count(input.path())
        .map_err(|e| PipelineError::Io(format!("Cannot count reads in {}: {}", input.path().display(), e)))?;

    if count >= 1 {
        info!("Quality trimming {} reads in {}", count, input.path().display());
        run_strict(
            ToolCommand::QualityTrimSingle(SingleEndConfig {
                input: input.path().to_path_buf(),
                output: output.clone(),
            }),
            config,
        )
        .await?;
    } else {
        warn!("No reads in {}. Not running single-end quality trim", input.path().display());
        touch_file(&output, Staging::Strict).await?;
        info!("Made placeholder file {}", output.display());
    }

    delete_files(&[input.path()], Staging::Lenient).await?;
    check_files(&[&output])?;
    Ok(ReadSet::new(output, input.role()))
}


/// Paired-end quality trim. Always invokes the trimmer; both inputs are
/// removed afterwards.
pub async fn quality_trim_paired(
    config: &RunConfig,
    in1: ReadSet,
    in2: ReadSet,
    baseout: &Path,
) -> Result<TrimmedPairs, PipelineError> {
    info!("Quality trimming read pairs");
    run_strict(
        ToolCommand::QualityTrimPaired(PairedEndConfig {
            in1: in1.path().to_path_buf(),
            in2: in2.path().to_path_buf(),
            baseout: baseout.to_path_buf(),
        }),
        config,
    )
    .await?;
    delete_files(&[in1.path(), in2.path()], Staging::Lenient).await?;

    let trimmed = TrimmedPairs::from_baseout(baseout);
    check_files(&trimmed.paths())?;
    Ok(trimmed)
}


/// Merges overlapping pairs with FLASH in `flash_dir`, then moves its fixed
/// output names to the canonical names in the parent of `flash_dir`.
///
/// # Arguments
///
/// * `config` - RunConfig struct from main.
/// * `in1`, `in2` - Paired reads; consumed.
/// * `flash_dir` - FLASH working directory, removed once emptied.
///
/// # Returns
/// MergedReads
pub async fn merge_overlap(
    config: &RunConfig,
    in1: ReadSet,
    in2: ReadSet,
    flash_dir: &Path,
) -> Result<MergedReads, PipelineError> {
    info!("Merging overlapping pairs");
    tokio::fs::create_dir_all(flash_dir)
        .await
        .map_err(|e| PipelineError::Staging {
            op: "create directory",
            path: flash_dir.to_path_buf(),
            error: e.to_string(),
        })?;

    run_strict(
        ToolCommand::MergePairs(FlashConfig {
            in1: in1.path().to_path_buf(),
            in2: in2.path().to_path_buf(),
            out_dir: flash_dir.to_path_buf(),
        }),
        config,
    )
    .await?;
    delete_files(&[in1.path(), in2.path()], Staging::Lenient).await?;

    let parent = flash_dir.parent().unwrap_or_else(|| Path::new("."));
    let renames = [
        ("extendedFrags.fastq", FLASH_COMBINED),
        ("notCombined_1.fastq", FLASH_NOT_COMBINED_1P),
        ("notCombined_2.fastq", FLASH_NOT_COMBINED_2P),
    ];
    for (flash_name, canonical) in renames {
        let from = flash_dir.join(format!("{}.{}", FLASH_PREFIX, flash_name));
        move_file(&from, &parent.join(canonical), Staging::Strict).await?;
    }

    // histogram files are of no further use
    if let Err(e) = tokio::fs::remove_dir_all(flash_dir).await {
        warn!("Could not remove {}: {}", flash_dir.display(), e);
    }

    let merged = MergedReads {
        combined: ReadSet::new(parent.join(FLASH_COMBINED), ReadRole::Unpaired),
        not_combined_1: ReadSet::new(parent.join(FLASH_NOT_COMBINED_1P), ReadRole::PairedForward),
        not_combined_2: ReadSet::new(parent.join(FLASH_NOT_COMBINED_2P), ReadRole::PairedReverse),
    };
    check_files(&[
        merged.combined.path(),
        merged.not_combined_1.path(),
        merged.not_combined_2.path(),
    ])?;
    Ok(merged)
}


/// Aligns reads against the screening index. Reads that do not align are
/// kept; reads that do are contaminant hits. The screened input is removed
/// once both outputs exist.
pub async fn genome_screen(
    config: &RunConfig,
    index: &Path,
    reads: ReadSet,
) -> Result<ScreenedReads, PipelineError> {
    info!("Screening {} against {}", reads.path().display(), index.display());
    let keep = append_to_path(reads.path(), SCREEN_KEEP_SUFFIX);
    let hit = append_to_path(reads.path(), SCREEN_HIT_SUFFIX);

    run_strict(
        ToolCommand::ScreenGenome(Bowtie2Config {
            index: index.to_path_buf(),
            reads: reads.path().to_path_buf(),
            unaligned: keep.clone(),
            aligned: hit.clone(),
        }),
        config,
    )
    .await?;
    check_files(&[&keep, &hit])?;
    delete_files(&[reads.path()], Staging::Strict).await?;

    Ok(ScreenedReads {
        keep: ReadSet::new(keep, ReadRole::ScreenedKeep),
        hit: ReadSet::new(hit, ReadRole::ScreenedHit),
    })
}


/// Restores mate pairing after per-mate filtering. Mates that lost their
/// partner land in the unpaired output.
pub async fn fix_pairs(
    config: &RunConfig,
    in1: ReadSet,
    in2: ReadSet,
    out_dir: &Path,
) -> Result<RepairedPairs, PipelineError> {
    info!("Fixing pairs");
    let basename = out_dir.join(FIX_PAIRS_BASE);
    run_strict(
        ToolCommand::FixPairs(FixPairsConfig {
            in1: in1.path().to_path_buf(),
            in2: in2.path().to_path_buf(),
            basename: basename.clone(),
        }),
        config,
    )
    .await?;

    let repaired = RepairedPairs {
        forward: ReadSet::new(append_to_path(&basename, ".1.fq"), ReadRole::PairedForward),
        reverse: ReadSet::new(append_to_path(&basename, ".2.fq"), ReadRole::PairedReverse),
        unpaired: ReadSet::new(append_to_path(&basename, ".U.fq"), ReadRole::Unpaired),
    };
    check_files(&[repaired.forward.path(), repaired.reverse.path(), repaired.unpaired.path()])?;
    delete_files(&[in1.path(), in2.path()], Staging::Strict).await?;
    Ok(repaired)
}


/// Concatenates `parts` into `out` and removes the parts.
pub async fn consolidate(parts: Vec<ReadSet>, out: PathBuf, role: ReadRole) -> Result<ReadSet, PipelineError> {
    let paths: Vec<PathBuf> = parts.into_iter().map(ReadSet::into_path).collect();
    check_files(&paths)?;
    concatenate_files(&out, &paths, Staging::Strict).await?;
    delete_files(&paths, Staging::Strict).await?;
    Ok(ReadSet::new(out, role))
}


/// Moves a read set to its final name.
pub async fn promote(set: ReadSet, dest: PathBuf) -> Result<ReadSet, PipelineError> {
    let role = set.role();
    move_file(set.path(), &dest, Staging::Strict).await?;
    Ok(ReadSet::new(dest, role))
}


/// Writes FASTA copies of the final reads for assemblers: mates interleaved
/// into one file, unpaired reads into another. Skipped with a warning when
/// fq2fa is not available.
///
/// # Returns
/// Paths of the FASTA files written.
pub async fn fasta_conversion(
    config: &RunConfig,
    forward: &ReadSet,
    reverse: &ReadSet,
    unpaired: &ReadSet,
    fasta_dir: &Path,
) -> Result<Vec<PathBuf>, PipelineError> {
    if config.tools.fq2fa.is_none() {
        warn!("Cannot locate fq2fa program. No FASTA files will be made");
        return Ok(Vec::new());
    }

    info!("Converting reads to FASTA");
    tokio::fs::create_dir_all(fasta_dir)
        .await
        .map_err(|e| PipelineError::Staging {
            op: "create directory",
            path: fasta_dir.to_path_buf(),
            error: e.to_string(),
        })?;

    let interleaved = fasta_dir.join(INTERLEAVED_FASTA);
    let unpaired_fa = fasta_dir.join(UNPAIRED_FASTA);
    run_strict(
        ToolCommand::FastqToFasta(Fq2FaConfig::Merge {
            in1: forward.path().to_path_buf(),
            in2: reverse.path().to_path_buf(),
            out: interleaved.clone(),
        }),
        config,
    )
    .await?;
    run_strict(
        ToolCommand::FastqToFasta(Fq2FaConfig::Single {
            input: unpaired.path().to_path_buf(),
            out: unpaired_fa.clone(),
        }),
        config,
    )
    .await?;

    let outputs = vec![interleaved, unpaired_fa];
    check_files(&outputs)?;
    Ok(outputs)
}


/// Compresses the final artifacts in place. A missing compressor or a
/// non-zero exit is logged and the run still succeeds.
///
/// # Returns
/// true when the files were compressed.
pub async fn compress_outputs(config: &RunConfig, files: Vec<PathBuf>) -> Result<bool, PipelineError> {
    if config.tools.compressor.is_none() {
        warn!("Cannot locate pigz or gzip. Output files will not be zipped");
        return Ok(false);
    }

    let invocation = generate_cli(&ToolCommand::Compress(CompressConfig { files }), config)?;
    info!("Compressing outputs with {}", invocation.tool);
    let status = run_tool(&invocation, &config.log_path).await?;
    if !status.success() {
        warn!(
            "{} exited with {:?}; outputs may be left uncompressed (see {})",
            invocation.tool,
            status.code(),
            config.log_path.display()
        );
        return Ok(false);
    }
    Ok(true)
}
