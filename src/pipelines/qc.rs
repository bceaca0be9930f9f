use std::fmt;
use std::io;
use std::path::{Path, PathBuf};

use log::{debug, error, info};

use crate::config::defs::{
    Layout, PipelineError, RunConfig, ADAPTER_TRIMMED_BASE, FASTA_DIR, FLASH_DIR,
    FLASH_NOT_COMBINED_1P, GENOME_HIT_DIR, GENOME_HIT_READS, GZIP_EXT, PAIRED_1, PAIRED_2,
    QUAL_TRIMMED_SUFFIX, UNPAIRED_TMP,
};
use crate::pipelines::stages::{
    adapter_trim, compress_outputs, consolidate, fasta_conversion, fix_pairs, genome_screen,
    merge_overlap, promote, quality_trim_paired, quality_trim_single, ReadRole, ReadSet,
};
use crate::utils::file::{append_to_path, check_files};


#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Init,
    AdapterTrimmed,
    QualityTrimmed,
    Merged,
    Consolidated,
    Screened,
    Repaired,
    Finalized,
    Failed,
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}


/// Final artifacts of a successful run.
#[derive(Debug)]
pub struct FinalOutputs {
    pub paired_1: PathBuf,
    pub paired_2: PathBuf,
    pub unpaired: PathBuf,
    pub genome_hits: Option<PathBuf>,
    pub fasta: Vec<PathBuf>,
    pub compressed: bool,
}

impl FinalOutputs {
    /// Paths of every artifact as it exists on disk, `.gz` included when compressed.
    pub fn artifacts(&self) -> Vec<PathBuf> {
        let mut paths = vec![self.paired_1.clone(), self.paired_2.clone(), self.unpaired.clone()];
        paths.extend(self.genome_hits.iter().cloned());
        paths.extend(self.fasta.iter().cloned());
        if self.compressed {
            paths
                .iter()
                .map(|p| append_to_path(p, &format!(".{}", GZIP_EXT)))
                .collect()
        } else {
            paths
        }
    }
}


/// Checks the raw inputs exist and creates the output directory, refusing to
/// reuse one that already exists. The leaf directory is created with a single
/// non-recursive `create_dir`, so of two runs racing for the same directory
/// only one gets it.
pub fn prepare_output_dir(config: &RunConfig) -> Result<(), PipelineError> {
    for (flag, path) in [("forward", &config.forward), ("reverse", &config.reverse)] {
        if !path.is_file() {
            return Err(PipelineError::Config(format!("Cannot find --{} file {}", flag, path.display())));
        }
    }

    let out_dir = &config.out_dir;
    if out_dir.exists() {
        return Err(PipelineError::Config(format!("Outdir {} already exists!", out_dir.display())));
    }
    if let Some(parent) = out_dir.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .map_err(|e| PipelineError::Config(format!("Cannot create {}: {}", parent.display(), e)))?;
    }
    std::fs::create_dir(out_dir).map_err(|e| match e.kind() {
        io::ErrorKind::AlreadyExists => {
            PipelineError::Config(format!("Outdir {} already exists!", out_dir.display()))
        }
        _ => PipelineError::Config(format!("Cannot create {}: {}", out_dir.display(), e)),
    })?;

    if let Layout::GenomeScreen { .. } = config.layout {
        let hits = out_dir.join(GENOME_HIT_DIR);
        std::fs::create_dir(&hits)
            .map_err(|e| PipelineError::Config(format!("Cannot create {}: {}", hits.display(), e)))?;
    }
    Ok(())
}


/// One run of the QC pipeline over a single library.
pub struct PipelineRun<'a> {
    config: &'a RunConfig,
    state: PipelineState,
}

impl<'a> PipelineRun<'a> {
    /// Validates the run and creates its output directory. The run starts in `Init`.
    pub fn init(config: &'a RunConfig) -> Result<Self, PipelineError> {
        prepare_output_dir(config)?;
        info!("Output directory: {}", config.out_dir.display());
        info!("Tool output is logged to {}", config.log_path.display());
        Ok(PipelineRun { config, state: PipelineState::Init })
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    fn advance(&mut self, next: PipelineState, frontier: &[&ReadSet]) {
        info!("{} -> {}", self.state, next);
        for set in frontier {
            debug!("  {:?}: {}", set.role(), set.path().display());
        }
        self.state = next;
    }

    /// Runs every stage in order. The first failure moves the run to `Failed`
    /// and is returned; nothing is retried or rolled back.
    pub async fn execute(&mut self) -> Result<FinalOutputs, PipelineError> {
        match self.run_stages().await {
            Ok(outputs) => {
                self.advance(PipelineState::Finalized, &[]);
                Ok(outputs)
            }
            Err(e) => {
                error!("Stage after {} failed: {}", self.state, e);
                self.state = PipelineState::Failed;
                Err(e)
            }
        }
    }

    async fn run_stages(&mut self) -> Result<FinalOutputs, PipelineError> {
        let config = self.config;
        let out_dir = config.out_dir.as_path();

        let baseout = out_dir.join(ADAPTER_TRIMMED_BASE);
        let trimmed = adapter_trim(config, &config.forward, &config.reverse, &baseout).await?;
        self.advance(PipelineState::AdapterTrimmed, &[&trimmed.forward, &trimmed.reverse]);

        let unpaired_1 = qual_trim_in_place(config, trimmed.unpaired_forward).await?;
        let unpaired_2 = qual_trim_in_place(config, trimmed.unpaired_reverse).await?;
        self.advance(PipelineState::QualityTrimmed, &[&unpaired_1, &unpaired_2]);

        let merged = merge_overlap(config, trimmed.forward, trimmed.reverse, &out_dir.join(FLASH_DIR)).await?;
        let combined = qual_trim_in_place(config, merged.combined).await?;
        let not_combined_base = out_dir.join(
            FLASH_NOT_COMBINED_1P.strip_suffix("_1P").unwrap_or(FLASH_NOT_COMBINED_1P),
        );
        let pairs = quality_trim_paired(
            config,
            merged.not_combined_1,
            merged.not_combined_2,
            &append_to_path(&not_combined_base, QUAL_TRIMMED_SUFFIX),
        )
        .await?;
        self.advance(PipelineState::Merged, &[&pairs.forward, &pairs.reverse, &combined]);

        let paired_1 = promote(pairs.forward, out_dir.join(PAIRED_1)).await?;
        let paired_2 = promote(pairs.reverse, out_dir.join(PAIRED_2)).await?;
        let unpaired = consolidate(
            vec![combined, pairs.unpaired_forward, pairs.unpaired_reverse, unpaired_1, unpaired_2],
            out_dir.join(config.layout.unpaired_name()),
            ReadRole::Unpaired,
        )
        .await?;
        self.advance(PipelineState::Consolidated, &[&paired_1, &paired_2, &unpaired]);

        let (paired_1, paired_2, unpaired, genome_hits, fasta) = match &config.layout {
            Layout::Plain => (paired_1, paired_2, unpaired, None, Vec::new()),
            Layout::GenomeScreen { index } => {
                let final_unpaired = unpaired.path().to_path_buf();
                let screened_1 = genome_screen(config, index, paired_1).await?;
                let screened_2 = genome_screen(config, index, paired_2).await?;
                let screened_u = genome_screen(config, index, unpaired).await?;

                let hits = consolidate(
                    vec![screened_1.hit, screened_2.hit, screened_u.hit],
                    out_dir.join(GENOME_HIT_DIR).join(GENOME_HIT_READS),
                    ReadRole::ScreenedHit,
                )
                .await?;
                self.advance(
                    PipelineState::Screened,
                    &[&screened_1.keep, &screened_2.keep, &screened_u.keep, &hits],
                );

                let repaired = fix_pairs(config, screened_1.keep, screened_2.keep, out_dir).await?;
                let unpaired = consolidate(
                    vec![screened_u.keep, repaired.unpaired],
                    out_dir.join(UNPAIRED_TMP),
                    ReadRole::Unpaired,
                )
                .await?;
                let unpaired = promote(unpaired, final_unpaired).await?;
                let paired_1 = promote(repaired.forward, out_dir.join(PAIRED_1)).await?;
                let paired_2 = promote(repaired.reverse, out_dir.join(PAIRED_2)).await?;
                self.advance(PipelineState::Repaired, &[&paired_1, &paired_2, &unpaired]);

                let fasta = fasta_conversion(config, &paired_1, &paired_2, &unpaired, &out_dir.join(FASTA_DIR)).await?;
                (paired_1, paired_2, unpaired, Some(hits.into_path()), fasta)
            }
        };

        let mut outputs = FinalOutputs {
            paired_1: paired_1.into_path(),
            paired_2: paired_2.into_path(),
            unpaired: unpaired.into_path(),
            genome_hits,
            fasta,
            compressed: false,
        };
        check_files(&outputs.artifacts())?;

        outputs.compressed = compress_outputs(config, outputs.artifacts()).await?;
        Ok(outputs)
    }
}


/// Quality trims a single-end read set into `<path>.qual_trimmed`.
async fn qual_trim_in_place(config: &RunConfig, reads: ReadSet) -> Result<ReadSet, PipelineError> {
    let output = append_to_path(reads.path(), QUAL_TRIMMED_SUFFIX);
    quality_trim_single(config, reads, output).await
}


/// Validates, creates the output directory and runs every stage.
///
/// # Arguments
///
/// * `config` - RunConfig struct from main.
///
/// # Returns
/// FinalOutputs of the run.
pub async fn run(config: &RunConfig) -> Result<FinalOutputs, PipelineError> {
    let mut pipeline = PipelineRun::init(config)?;
    let outputs = pipeline.execute().await?;
    info!("QC finished");
    info!("Output directory: {}", out_dir_display(&config.out_dir));
    Ok(outputs)
}

fn out_dir_display(path: &Path) -> String {
    path.canonicalize()
        .unwrap_or_else(|_| path.to_path_buf())
        .display()
        .to_string()
}
