use clap::Parser;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_LOG_DIR: &str = "./logs";
pub const DEFAULT_LOG_LEVEL: &str = "info";
pub const DEFAULT_SCENARIO: &str = "normal";
pub const DEFAULT_TICK_INTERVAL_MS: u64 = 1000;
pub const DEFAULT_WARMUP_TICKS: u64 = 10;
pub const DEFAULT_STRESS_TICKS: u64 = 20;

const CONFIG_FILE: &str = "server_fleet.conf";

#[derive(Parser, Deserialize, Serialize, Debug, Clone, Default)]
#[clap(about = "Fleet telemetry simulator and WebSocket broadcast server", version)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    #[clap(long, env = "FLEET_PORT", help = "Port to listen on for subscriber connections.")]
    pub port: Option<u16>,

    #[clap(long, env = "FLEET_CONFIG_PATH", help = "Path to the JSON configuration file.")]
    pub config_path: Option<PathBuf>,

    #[clap(long, env = "FLEET_LOG_DIR", help = "Directory for log files.")]
    pub log_dir: Option<PathBuf>,

    #[clap(long, env = "FLEET_LOG_LEVEL", help = "Logging level (trace, debug, info, warn, error).")]
    pub log_level: Option<String>,

    #[clap(long, env = "FLEET_SCENARIO", help = "Load scenario to run: normal or high.")]
    pub scenario: Option<String>,

    #[clap(long, env = "FLEET_DEVICE_COUNT", help = "Simulated device count at startup.")]
    pub device_count: Option<usize>,

    #[clap(long, env = "FLEET_TICK_INTERVAL_MS", help = "Milliseconds between generate-and-broadcast ticks.")]
    pub tick_interval_ms: Option<u64>,

    #[clap(long, env = "FLEET_WARMUP_TICKS", help = "Ticks of normal load before the stress window opens (high scenario).")]
    pub warmup_ticks: Option<u64>,

    #[clap(long, env = "FLEET_STRESS_TICKS", help = "Ticks the stress window stays open (high scenario).")]
    pub stress_ticks: Option<u64>,

    #[clap(long, env = "TLS_CERT_PATH", help = "Path to the TLS certificate file.")]
    pub tls_cert_path: Option<PathBuf>,

    #[clap(long, env = "TLS_KEY_PATH", help = "Path to the TLS private key file.")]
    pub tls_key_path: Option<PathBuf>,
}

impl Config {
    // Merge two Config structs, where 'other' overrides 'self' for Some values
    fn merge(self, other: Config) -> Config {
        Config {
            port: other.port.or(self.port),
            config_path: other.config_path.or(self.config_path),
            log_dir: other.log_dir.or(self.log_dir),
            log_level: other.log_level.or(self.log_level),
            scenario: other.scenario.or(self.scenario),
            device_count: other.device_count.or(self.device_count),
            tick_interval_ms: other.tick_interval_ms.or(self.tick_interval_ms),
            warmup_ticks: other.warmup_ticks.or(self.warmup_ticks),
            stress_ticks: other.stress_ticks.or(self.stress_ticks),
            tls_cert_path: other.tls_cert_path.or(self.tls_cert_path),
            tls_key_path: other.tls_key_path.or(self.tls_key_path),
        }
    }
}

pub fn load_config() -> Config {
    // 1. Built-in defaults
    let default_config = Config {
        port: Some(DEFAULT_PORT),
        log_dir: Some(PathBuf::from(DEFAULT_LOG_DIR)),
        log_level: Some(DEFAULT_LOG_LEVEL.to_string()),
        scenario: Some(DEFAULT_SCENARIO.to_string()),
        device_count: Some(crate::fleet_logic::simulator::DEFAULT_DEVICE_COUNT),
        tick_interval_ms: Some(DEFAULT_TICK_INTERVAL_MS),
        warmup_ticks: Some(DEFAULT_WARMUP_TICKS),
        stress_ticks: Some(DEFAULT_STRESS_TICKS),
        ..Default::default()
    };

    // 2. Config file (server_fleet.conf) if present, path overridable from
    //    the command line.
    let cli_args = Config::parse();

    let config_file_path = cli_args
        .config_path
        .clone()
        .unwrap_or_else(|| PathBuf::from(CONFIG_FILE));

    let mut current_config = default_config;

    if config_file_path.exists() {
        if let Ok(config_str) = fs::read_to_string(&config_file_path) {
            if let Ok(file_config) = serde_json::from_str::<Config>(&config_str) {
                current_config = current_config.merge(file_config);
            } else {
                log::warn!(
                    "Failed to parse config file: {}. Falling back to other sources.",
                    config_file_path.display()
                );
            }
        } else {
            log::warn!(
                "Failed to read config file: {}. Falling back to other sources.",
                config_file_path.display()
            );
        }
    }

    // 3. Environment variables and CLI arguments win over everything.
    current_config.merge(cli_args)
}
