//! CLI arguments and the process-wide configuration they load
//! (spec.md §6's sandbox init config, plus server bind settings).

use clap::Parser;
use serde::Deserialize;

#[derive(Parser, Debug)]
#[command(name = "judge-engine", version, about, long_about = None)]
pub struct CliArgs {
    /// Path to the sandbox/server configuration file.
    #[arg(long = "config", short = 'c')]
    pub config_path: String,

    /// Maximum number of submissions judged concurrently
    /// (`JUDGE_TASK_MAXCONCURRENT`, spec.md §4.7).
    #[arg(long = "max-concurrent", default_value_t = 4)]
    pub max_concurrent: usize,

    /// Verbose logging.
    #[arg(short, long)]
    pub verbose: bool,
}

impl CliArgs {
    /// Load the configuration from the specified file.
    pub fn read_config(&self) -> std::io::Result<Config> {
        let file = std::fs::File::open(&self.config_path)?;
        let reader = std::io::BufReader::new(file);
        serde_json::from_reader(reader).map_err(std::io::Error::from)
    }
}

#[derive(Deserialize, Debug)]
pub struct Config {
    pub server: ServerConfig,
    pub sandbox: SandboxConfig,
}

#[derive(Deserialize, Debug)]
pub struct ServerConfig {
    pub bind_address: Option<String>,
    pub bind_port: Option<u16>,
}

impl ServerConfig {
    /// spec.md §6: the listen port is TCP 2502 at path `/judge`.
    pub const DEFAULT_PORT: u16 = 2502;
}

/// The sandbox library and init parameters (spec.md §6's init config,
/// plus the path to the shared library the FFI client loads).
#[derive(Deserialize, Debug)]
pub struct SandboxConfig {
    /// Path to the sandbox's compiled FFI library.
    pub library_path: String,
    #[serde(rename = "cinitPath")]
    pub cinit_path: String,
    pub parallelism: u32,
}
