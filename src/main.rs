use clap::Parser;
use colored::*;
use eyre::{Context, Result};
use log::{debug, info, warn};

mod cli;
mod config;

use cli::Cli;
use config::Config;
use gradepool::coordinator::{CoordinatorConfig, default_worker_program, run_distributed, run_local};
use gradepool::domain::ResultTable;
use gradepool::exec::{BatchExecutor, ExecutorConfig};
use gradepool::report::{list_candidates, write_results, write_scores};

fn setup_logging(cli: &Cli, config: &Config) {
    // --verbose beats RUST_LOG, which beats the configured level.
    // Logs go to stderr; stdout carries the summary.
    let mut builder = if cli.is_verbose() {
        let mut builder = env_logger::Builder::new();
        builder.parse_filters("debug");
        builder
    } else {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level(cli, config)))
    };
    builder.target(env_logger::Target::Stderr).init();
}

/// Filter handed to worker processes
fn log_level(cli: &Cli, config: &Config) -> String {
    if cli.is_verbose() {
        return "debug".to_string();
    }
    std::env::var("RUST_LOG")
        .ok()
        .or_else(|| config.log_level.clone())
        .unwrap_or_else(|| "info".to_string())
}

fn executor_config(cli: &Cli, config: &Config) -> ExecutorConfig {
    ExecutorConfig::default()
        .timeout_ms(cli.timeout_ms.unwrap_or(config.engine.timeout_ms))
        .output_dir(&config.paths.output_dir)
        .input_dir(&config.paths.input_dir)
        .transport(cli.transport.unwrap_or(config.engine.transport))
}

async fn grade(cli: &Cli, config: &Config) -> Result<ResultTable> {
    let candidates =
        list_candidates(&cli.dir).context(format!("Failed to list candidates in {}", cli.dir.display()))?;
    if candidates.is_empty() {
        warn!("No candidates found in {}", cli.dir.display());
    }
    info!("Found {} candidate(s) in {}", candidates.len(), cli.dir.display());

    let executor = executor_config(cli, config);

    if cli.single {
        let batch_size = cli.batch_size.unwrap_or_else(|| config.batch_size());
        debug!("Single-process run, batch size {}", batch_size);
        return run_local(&BatchExecutor::new(executor), batch_size, &candidates, &cli.params)
            .await
            .context("Single-process run failed");
    }

    let workers = cli.workers.unwrap_or_else(|| config.workers());
    let coordinator = CoordinatorConfig::new(workers, default_worker_program()?, executor)
        .worker_batch_size(cli.worker_batch_size.unwrap_or(config.engine.worker_batch_size))
        .socket_dir(&config.paths.socket_dir)
        .log_level(log_level(cli, config));
    debug!("Distributed run: {:?}", coordinator);

    run_distributed(&coordinator, &candidates, &cli.params)
        .await
        .context("Distributed run failed")
}

fn print_summary(table: &ResultTable, config: &Config) {
    println!(
        "{} {} candidate(s) x {} parameter(s)",
        "Graded".green().bold(),
        table.rows().len(),
        table.params().len()
    );
    for row in table.rows() {
        let score = row.score();
        let text = format!("{:.3}", score);
        let text = if score >= 1.0 {
            text.green()
        } else if score > 0.0 {
            text.yellow()
        } else {
            text.red()
        };
        println!("  {}: {}", row.name(), text);
    }
    println!("{} {}", "Results:".cyan(), config.paths.results_file.display());
    println!("{} {}", "Scores:".cyan(), config.paths.scores_file.display());
}

fn run_application(cli: &Cli, config: &Config) -> Result<()> {
    info!("Starting application");

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to build runtime")?;
    let table = runtime.block_on(grade(cli, config))?;

    write_results(&table, &config.paths.results_file).context("Failed to write results")?;
    write_scores(&table, &config.paths.scores_file).context("Failed to write scores")?;
    print_summary(&table, config);
    Ok(())
}

fn main() -> Result<()> {
    // Parse CLI arguments
    let cli = Cli::parse();

    // Load configuration
    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;

    setup_logging(&cli, &config);
    info!("Starting with config from: {:?}", cli.config);

    run_application(&cli, &config).context("Application failed")?;

    Ok(())
}
