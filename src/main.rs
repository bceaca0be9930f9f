use std::env;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::Result;
use env_logger::Builder;
use log::{debug, error, info, LevelFilter};

use illumina_qc::cli::{parse, Arguments};
use illumina_qc::config::defs::{
    Layout, PipelineError, RunConfig, LOG_PREFIX, LOG_TIMESTAMP_FORMAT, PLAIN_OUT_DIR, SCREEN_OUT_DIR,
};
use illumina_qc::pipelines::qc;
use illumina_qc::utils::system::{check_thread_request, resolve_tools};


#[tokio::main]
async fn main() -> Result<()> {
    let run_start = Instant::now();

    let args = parse();

    let log_level = if args.verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };

    Builder::new()
        .filter_level(log_level)
        .format(|buf, record| {
            writeln!(
                buf,
                "[{}] {}: {}",
                chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
                record.level(),
                record.args()
            )
        })
        .init();

    let dir = env::current_dir()?;
    debug!("The current directory is {:?}", dir);

    let run_config = match build_run_config(args, &dir) {
        Ok(config) => config,
        Err(e) => {
            error!("{}", e);
            std::process::exit(1);
        }
    };

    check_thread_request(run_config.threads);

    if let Err(e) = qc::run(&run_config).await {
        error!("Pipeline failed: {} at {} milliseconds.", e, run_start.elapsed().as_millis());
        std::process::exit(1);
    }

    info!("Run complete: {} milliseconds.", run_start.elapsed().as_millis());
    Ok(())
}


/// Resolves arguments and tools into the RunConfig handed to every stage.
///
/// # Arguments
/// * `args` - The parsed command-line arguments.
/// * `cwd` - The current working directory.
/// # Returns
/// RunConfig, or a `Config` error for missing inputs or tools.
fn build_run_config(args: Arguments, cwd: &Path) -> Result<RunConfig, PipelineError> {
    let forward = args
        .forward
        .as_ref()
        .map(|f| absolute(cwd, f))
        .ok_or_else(|| PipelineError::Config("--forward is required".to_string()))?;
    let reverse = args
        .reverse
        .as_ref()
        .map(|f| absolute(cwd, f))
        .ok_or_else(|| PipelineError::Config("--reverse is required".to_string()))?;

    let layout = match &args.bowtie_idx {
        Some(index) => Layout::GenomeScreen { index: absolute(cwd, index) },
        None => Layout::Plain,
    };

    let default_out = match layout {
        Layout::Plain => PLAIN_OUT_DIR,
        Layout::GenomeScreen { .. } => SCREEN_OUT_DIR,
    };
    let out_dir = absolute(cwd, args.out_dir.as_deref().unwrap_or(default_out));

    let now = chrono::Local::now().format(LOG_TIMESTAMP_FORMAT);
    let log_path = out_dir.join(format!("{}.{}.txt", LOG_PREFIX, now));

    let tools = resolve_tools(&args)?;

    Ok(RunConfig {
        forward,
        reverse,
        out_dir,
        log_path,
        threads: args.threads,
        tools,
        layout,
    })
}

fn absolute(cwd: &Path, path: &str) -> PathBuf {
    let path = PathBuf::from(path);
    if path.is_absolute() {
        path
    } else {
        cwd.join(path)
    }
}
