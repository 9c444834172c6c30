//! CLI argument definitions for the SuperAgent server.
//!
//! Priority resolution: CLI args > env vars > config file > defaults.

use clap::Parser;
use std::path::PathBuf;

use superagent_core::config::SuperagentConfig;

/// SuperAgent: multi-tenant conversational assistant backend.
#[derive(Parser, Debug)]
#[command(name = "superagent", version, about)]
pub struct CliArgs {
    /// Path to the configuration file.
    #[arg(short = 'c', long = "config")]
    pub config: Option<PathBuf>,

    /// Listen address.
    #[arg(long = "host")]
    pub host: Option<String>,

    /// API server port.
    #[arg(short = 'p', long = "port")]
    pub port: Option<u16>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short = 'l', long = "log-level")]
    pub log_level: Option<String>,

    /// Enable document retrieval regardless of the config file.
    #[arg(long = "rag")]
    pub rag: bool,
}

impl CliArgs {
    /// Resolve the configuration file path.
    ///
    /// Priority: --config flag > SUPERAGENT_CONFIG env var > ./superagent.toml.
    pub fn resolve_config_path(&self) -> PathBuf {
        if let Some(ref p) = self.config {
            return p.clone();
        }
        if let Ok(p) = std::env::var("SUPERAGENT_CONFIG") {
            if !p.trim().is_empty() {
                return PathBuf::from(p);
            }
        }
        PathBuf::from("superagent.toml")
    }

    /// Filter directive for the tracing subscriber.
    ///
    /// Priority: --log-level flag > RUST_LOG > config file value.
    pub fn resolve_log_filter(&self, config_level: &str) -> String {
        if let Some(ref level) = self.log_level {
            return level.clone();
        }
        if let Ok(filter) = std::env::var("RUST_LOG") {
            if !filter.trim().is_empty() {
                return filter;
            }
        }
        config_level.to_string()
    }

    /// Apply flag overrides on top of file and environment values.
    pub fn apply(&self, config: &mut SuperagentConfig) {
        if let Some(ref host) = self.host {
            config.server.host = host.clone();
        }
        if let Some(port) = self.port {
            config.server.port = port;
        }
        if let Some(ref level) = self.log_level {
            config.server.log_level = level.clone();
        }
        if self.rag {
            config.rag.enabled = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_override_config() {
        let args = CliArgs::parse_from(["superagent", "--port", "8080", "--host", "127.0.0.1", "--rag"]);
        let mut config = SuperagentConfig::default();
        args.apply(&mut config);
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.host, "127.0.0.1");
        assert!(config.rag.enabled);
    }

    #[test]
    fn test_no_flags_keep_config() {
        let args = CliArgs::parse_from(["superagent"]);
        let mut config = SuperagentConfig::default();
        config.server.port = 4000;
        args.apply(&mut config);
        assert_eq!(config.server.port, 4000);
        assert!(!config.rag.enabled);
    }

    #[test]
    fn test_explicit_config_path() {
        let args = CliArgs::parse_from(["superagent", "-c", "/etc/superagent.toml"]);
        assert_eq!(args.resolve_config_path(), PathBuf::from("/etc/superagent.toml"));
    }

    #[test]
    fn test_log_level_flag_wins() {
        let args = CliArgs::parse_from(["superagent", "-l", "debug"]);
        assert_eq!(args.resolve_log_filter("info"), "debug");
    }
}
