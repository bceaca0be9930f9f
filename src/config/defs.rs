use std::path::PathBuf;
use thiserror::Error;

// External software
pub const GZIP_EXT: &str = "gz";
pub const JAVA_TAG: &str = "java";
pub const TRIMMOMATIC_TAG: &str = "trimmomatic";
pub const FLASH_TAG: &str = "flash";
pub const BOWTIE2_TAG: &str = "bowtie2";
pub const FIX_PAIRS_TAG: &str = "FixPairs";
pub const FQ2FA_TAG: &str = "fq2fa";
pub const PIGZ_TAG: &str = "pigz";
pub const GZIP_TAG: &str = "gzip";

// Bundled tool locations, relative to the executable
pub const TRIMMOMATIC_JAR: &[&str] = &["bin", "trimmomatic-0.35", "trimmomatic-0.35.jar"];
pub const TRIMMOMATIC_ADAPTERS: &[&str] = &["bin", "trimmomatic-0.35", "adapters", "TruSeq3-PE-both.fa"];
pub const FLASH_BIN: &[&str] = &["bin", "flash"];

// Static Parameters
pub const DEFAULT_THREADS: usize = 10;

pub const SEED_MISMATCHES: u32 = 2;
pub const PALINDROME_CLIP_THRESHOLD: u32 = 30;
pub const SIMPLE_CLIP_THRESHOLD: u32 = 10;

pub const WINDOW_SIZE: u32 = 4;
pub const QUAL: u32 = 15;
pub const MIN_LEN: u32 = 50;

pub const MAX_OVERLAP: u32 = 250;

pub const FASTQ_LINES_PER_RECORD: u64 = 4;

// Static Filenames
pub const LOG_PREFIX: &str = "qc_log";
pub const LOG_TIMESTAMP_FORMAT: &str = "%Y%m%d%H%M%S%3f";
pub const ADAPTER_TRIMMED_BASE: &str = "reads.adapter_trimmed";
pub const QUAL_TRIMMED_SUFFIX: &str = ".qual_trimmed";

pub const FLASH_DIR: &str = "flash";
pub const FLASH_PREFIX: &str = "flashed";
pub const FLASH_COMBINED: &str = "reads.adapter_trimmed.flash_combined";
pub const FLASH_NOT_COMBINED_1P: &str = "reads.adapter_trimmed.flash_notcombined_1P";
pub const FLASH_NOT_COMBINED_2P: &str = "reads.adapter_trimmed.flash_notcombined_2P";

pub const SCREEN_KEEP_SUFFIX: &str = ".did_not_align.fq";
pub const SCREEN_HIT_SUFFIX: &str = ".did_align.fq";
pub const GENOME_HIT_DIR: &str = "those_that_hit_the_genome";
pub const GENOME_HIT_READS: &str = "reads_that_hit_genome.U.fq";
pub const FIX_PAIRS_BASE: &str = "reads.fixed_pairs";
pub const UNPAIRED_TMP: &str = "reads.U.fq.tmp";

pub const FASTA_DIR: &str = "for_idba";
pub const INTERLEAVED_FASTA: &str = "reads.1_and_2_interleaved.fa";
pub const UNPAIRED_FASTA: &str = "reads.U.fa";

pub const PAIRED_1: &str = "reads.1.fq";
pub const PAIRED_2: &str = "reads.2.fq";
pub const PLAIN_UNPAIRED: &str = "reads.unpaired.fq";
pub const SCREEN_UNPAIRED: &str = "reads.U.fq";

pub const PLAIN_OUT_DIR: &str = "one_lib_with_flash";
pub const SCREEN_OUT_DIR: &str = "qc_with_genome_screen";


#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("{tool} failed with exit code {}: {} (see {})", .exit_code.map_or("none".to_string(), |c| c.to_string()), .args.join(" "), .log_path.display())]
    ToolFailure {
        tool: String,
        args: Vec<String>,
        exit_code: Option<i32>,
        log_path: PathBuf,
    },

    #[error("Expected file is missing: {}", .path.display())]
    MissingFile { path: PathBuf },

    #[error("Failed to {op} {}: {error}", .path.display())]
    Staging {
        op: &'static str,
        path: PathBuf,
        error: String,
    },

    #[error("IO error: {0}")]
    Io(String),
}


/// Output layout of a run. The genome screen layout adds contaminant
/// screening, pair repair and FASTA conversion.
#[derive(Debug, Clone, PartialEq)]
pub enum Layout {
    Plain,
    GenomeScreen { index: PathBuf },
}

impl Layout {
    pub fn unpaired_name(&self) -> &'static str {
        match self {
            Layout::Plain => PLAIN_UNPAIRED,
            Layout::GenomeScreen { .. } => SCREEN_UNPAIRED,
        }
    }
}


#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Compressor {
    Pigz,
    Gzip,
}


/// Locations of every external program the pipeline may call.
/// Optional entries are skipped with a warning when absent.
#[derive(Debug, Clone)]
pub struct ToolPaths {
    pub java: PathBuf,
    pub trimmomatic_jar: PathBuf,
    pub adapters: PathBuf,
    pub flash: PathBuf,
    pub bowtie2: Option<PathBuf>,
    pub fix_pairs: Option<PathBuf>,
    pub fq2fa: Option<PathBuf>,
    pub compressor: Option<(Compressor, PathBuf)>,
}


pub struct RunConfig {
    pub forward: PathBuf,
    pub reverse: PathBuf,
    pub out_dir: PathBuf,
    pub log_path: PathBuf,
    pub threads: usize,
    pub tools: ToolPaths,
    pub layout: Layout,
}
