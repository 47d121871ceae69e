use eyre::{Context, Result};
use gradepool::exec::{DEFAULT_TIMEOUT_MS, Transport};
use gradepool::worker::DEFAULT_WORKER_BATCH;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub log_level: Option<String>,
    pub engine: EngineConfig,
    pub paths: PathsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Watchdog budget for every batch
    pub timeout_ms: u64,
    /// Global bound on concurrent candidates; host CPU count when unset
    pub batch_size: Option<usize>,
    /// Sub-batch size inside each worker
    pub worker_batch_size: usize,
    /// Worker processes; host CPU count when unset
    pub workers: Option<usize>,
    pub transport: Transport,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            timeout_ms: DEFAULT_TIMEOUT_MS,
            batch_size: None,
            worker_batch_size: DEFAULT_WORKER_BATCH,
            workers: None,
            transport: Transport::Argument,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    pub output_dir: PathBuf,
    pub input_dir: PathBuf,
    pub results_file: PathBuf,
    pub scores_file: PathBuf,
    pub socket_dir: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("output"),
            input_dir: PathBuf::from("input"),
            results_file: PathBuf::from("results.txt"),
            scores_file: PathBuf::from("scores.txt"),
            socket_dir: std::env::temp_dir(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: Some("info".to_string()),
            engine: EngineConfig::default(),
            paths: PathsConfig::default(),
        }
    }
}

/// Number of CPUs available to this process, at least 1
pub fn host_cpus() -> usize {
    std::thread::available_parallelism().map_or(1, |n| n.get())
}

impl Config {
    /// Load configuration with fallback chain
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        // If explicit config path provided, try to load it
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        // Try primary location: ~/.config/<project>/<project>.yml
        if let Some(config_dir) = dirs::config_dir() {
            let project_name = env!("CARGO_PKG_NAME");
            let primary_config = config_dir.join(project_name).join(format!("{}.yml", project_name));
            if primary_config.exists() {
                match Self::load_from_file(&primary_config) {
                    Ok(config) => return Ok(config),
                    Err(e) => {
                        log::warn!("Failed to load config from {}: {}", primary_config.display(), e);
                    }
                }
            }
        }

        // Try fallback location: ./<project>.yml
        let project_name = env!("CARGO_PKG_NAME");
        let fallback_config = PathBuf::from(format!("{}.yml", project_name));
        if fallback_config.exists() {
            match Self::load_from_file(&fallback_config) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    log::warn!("Failed to load config from {}: {}", fallback_config.display(), e);
                }
            }
        }

        log::debug!("No config file found, using defaults");
        Ok(Self::default())
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;

        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;

        log::debug!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }

    pub fn batch_size(&self) -> usize {
        self.engine.batch_size.unwrap_or_else(host_cpus)
    }

    pub fn workers(&self) -> usize {
        self.engine.workers.unwrap_or_else(host_cpus)
    }
}
