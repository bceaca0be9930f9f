use clap::Parser;
use crate::config::defs::DEFAULT_THREADS;

#[derive(Parser, Debug, Clone, Default)]
#[command(
    name = "illumina-qc",
    version,
    about = "Run QC pipeline on Illumina reads: adapter and quality trimming, overlap merging, optional genome screening."
)]
pub struct Arguments {

    #[arg(short = '1', long = "forward", required = true)]
    pub forward: Option<String>,

    #[arg(short = '2', long = "reverse", required = true)]
    pub reverse: Option<String>,

    #[arg(short = 't', long, default_value_t = DEFAULT_THREADS)]
    pub threads: usize,

    #[arg(short = 'o', long = "outdir", help = "Output directory; must not already exist. Defaults to 'one_lib_with_flash', or 'qc_with_genome_screen' when --bowtie-idx is given.")]
    pub out_dir: Option<String>,

    #[arg(long = "bowtie-idx", help = "bowtie2 index to screen reads against. Enables the genome screen layout.")]
    pub bowtie_idx: Option<String>,

    #[arg(long, help = "Path to the Trimmomatic jar (default: bin/trimmomatic-0.35/trimmomatic-0.35.jar next to the executable)")]
    pub trimmomatic_jar: Option<String>,

    #[arg(long, help = "Adapter FASTA for ILLUMINACLIP (default: bin/trimmomatic-0.35/adapters/TruSeq3-PE-both.fa next to the executable)")]
    pub adapters: Option<String>,

    #[arg(long, help = "Path to the FLASH binary (default: bin/flash next to the executable)")]
    pub flash: Option<String>,

    #[arg(short = 'v', long = "verbose", action)]
    pub verbose: bool,
}
