//! Worker process: connects to the coordinator's channel, runs its share of
//! jobs and streams the results back. Started by `gradepool`, not by users.

use std::path::PathBuf;

use clap::Parser;
use eyre::{Context, Result};
use log::info;

use gradepool::exec::{BatchExecutor, DEFAULT_TIMEOUT_MS, ExecutorConfig, Transport};
use gradepool::ipc::SocketEndpoint;
use gradepool::worker::{DEFAULT_WORKER_BATCH, Worker};

#[derive(Parser, Debug)]
#[command(name = "gradepool-worker")]
#[command(version, about = "Gradepool worker process", long_about = None)]
struct Args {
    /// Coordinator channel socket
    #[arg(long)]
    socket: PathBuf,

    /// Worker id, 1-based
    #[arg(long)]
    id: u32,

    #[arg(long, default_value_t = DEFAULT_TIMEOUT_MS)]
    timeout_ms: u64,

    /// Jobs run concurrently per sub-batch
    #[arg(long, default_value_t = DEFAULT_WORKER_BATCH)]
    batch_size: usize,

    #[arg(long, default_value = "output")]
    output_dir: PathBuf,

    #[arg(long, default_value = "input")]
    input_dir: PathBuf,

    #[arg(long, value_enum, default_value_t = Transport::Argument)]
    transport: Transport,

    /// Log filter when RUST_LOG is unset
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn setup_logging(level: &str) {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .target(env_logger::Target::Stderr)
        .init();
}

async fn run(args: Args) -> Result<()> {
    let executor = BatchExecutor::new(
        ExecutorConfig::default()
            .timeout_ms(args.timeout_ms)
            .output_dir(args.output_dir)
            .input_dir(args.input_dir)
            .transport(args.transport),
    );

    let endpoint = SocketEndpoint::connect(&args.socket, args.id)
        .await
        .context(format!("Worker {} failed to connect", args.id))?;
    let worker = Worker::new(args.id, endpoint, executor, args.batch_size)?;

    let endpoint = worker.run().await.context(format!("Worker {} failed", args.id))?;
    endpoint.close().await?;
    Ok(())
}

fn main() -> Result<()> {
    let args = Args::parse();
    setup_logging(&args.log_level);
    info!("Worker {} starting", args.id);

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to build runtime")?;
    runtime.block_on(run(args))
}
