use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use strider::graph::paths;
use strider::{
    output, partition, Engine, EngineConfig, GraphStore, PartitionParams, StriderError,
};

/// Streaming out-of-core random walks over a block-partitioned graph.
///
/// If `file` has not been partitioned yet, partitioning runs first and
/// its output is reused by later invocations.
#[derive(Parser, Debug)]
#[command(name = "strider", version)]
struct Cli {
    /// Path to the edge list, or to an existing block directory.
    file: PathBuf,

    /// Number of vertices V.
    #[arg(long)]
    nvertices: u32,

    /// Initial walk count.
    #[arg(long)]
    nwalks: u64,

    /// Maximum hop count per walk (at most 511).
    #[arg(long)]
    nsteps: u32,

    /// Global stop fraction of the initial walk count.
    #[arg(long, default_value_t = 0.0)]
    rbound: f64,

    /// Per-block stop fraction of the initial walk count.
    #[arg(long, default_value_t = 0.0)]
    rboundin: f64,

    /// Streaming chunk size in bytes.
    #[arg(long = "chunk_sz", default_value_t = 2 * 1024 * 1024)]
    chunk_sz: usize,

    /// Chunk ring capacity.
    #[arg(long = "num_chunks", default_value_t = 8)]
    num_chunks: usize,

    /// Maximum outstanding asynchronous reads.
    #[arg(long = "io_depth", default_value_t = 4)]
    io_depth: usize,

    /// Compute threads per block activation.
    #[arg(long, default_value_t = default_threads())]
    execthreads: usize,

    /// Restart probability.
    #[arg(long, default_value_t = 0.15)]
    alpha: f32,

    /// Partitioner: block size bound in bytes.
    #[arg(long = "block_sz", default_value_t = 40 * 1024 * 1024)]
    block_sz: u64,

    /// Partitioner: interval size bound in bytes.
    #[arg(long = "invl_sz", default_value_t = 40 * 1024 * 1024)]
    invl_sz: u64,

    /// RNG seed; defaults to entropy.
    #[arg(long)]
    seed: Option<u64>,

    /// Comma-separated source vertex ids; default is uniform random.
    #[arg(long)]
    sources: Option<String>,

    /// Also write the top-N vertices to top.tsv.
    #[arg(long)]
    top: Option<usize>,

    /// Output path for the per-vertex visit counts.
    #[arg(long, default_value = "visits.u32")]
    out: PathBuf,
}

fn default_threads() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

fn parse_sources(raw: &str) -> Result<Vec<u32>, StriderError> {
    raw.split(',')
        .map(|tok| {
            tok.trim()
                .parse::<u32>()
                .map_err(|_| StriderError::BadInput(format!("bad source vertex {tok:?}")))
        })
        .collect()
}

fn run(cli: Cli) -> Result<(), StriderError> {
    let cfg = EngineConfig {
        nvertices: cli.nvertices,
        nwalks: cli.nwalks,
        nsteps: cli.nsteps,
        rbound: cli.rbound,
        rboundin: cli.rboundin,
        alpha: cli.alpha,
        chunk_bytes: cli.chunk_sz,
        num_chunks: cli.num_chunks,
        io_depth: cli.io_depth,
        exec_threads: cli.execthreads,
        block_bytes: cli.block_sz,
        interval_bytes: cli.invl_sz,
        seed: cli.seed.unwrap_or_else(rand::random),
        ..EngineConfig::default()
    };

    let needs_partition =
        !cli.file.is_dir() && !paths::manifest_path(&paths::block_dir(&cli.file)).is_file();
    if needs_partition {
        partition(
            &cli.file,
            &PartitionParams {
                nvertices: cfg.nvertices,
                block_bytes: cfg.block_bytes,
                interval_bytes: cfg.interval_bytes,
                chunk_bytes: cfg.chunk_bytes as u64,
            },
        )?;
    }

    let store = GraphStore::open(&cli.file)?;
    let mut engine = Engine::new(cfg, store)?;

    let sources = cli.sources.as_deref().map(parse_sources).transpose()?;
    engine.seed_walks(sources.as_deref())?;

    let stats = engine.run()?;
    info!(
        activations = stats.activations,
        completed = stats.walks_completed,
        live = stats.walks_live,
        "walks finished"
    );

    let counts = engine.visits().in_original_order(engine.store().order());
    output::write_visits(&cli.out, &counts)?;
    if let Some(n) = cli.top {
        let top_path = cli.out.with_file_name("top.tsv");
        output::write_top_tsv(&top_path, &counts, n)?;
    }
    Ok(())
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!(%err, "run failed");
            ExitCode::from(err.exit_code() as u8)
        }
    }
}
