//! CLI argument parsing for bridges.

use std::path::{Path, PathBuf};

use clap::Parser;

/// Common CLI arguments for all bridges.
#[derive(Parser, Debug, Clone, Default)]
#[command(about = "homesense MQTT bridge", version)]
pub struct BridgeArgs {
    /// Path to configuration file (JSON5). Environment variables are applied on top.
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Override log level (trace, debug, info, warn, error).
    #[arg(long)]
    pub log_level: Option<String>,
}

impl BridgeArgs {
    /// Parse CLI arguments.
    pub fn parse() -> Self {
        <Self as Parser>::parse()
    }

    /// Configuration file to load.
    ///
    /// An explicit `--config` always wins. Otherwise `default_config` is used
    /// if it exists, and `None` means "defaults plus environment only".
    pub fn config_path(&self, default_config: impl AsRef<Path>) -> Option<PathBuf> {
        if let Some(path) = &self.config {
            return Some(path.clone());
        }

        let default_config = default_config.as_ref();
        default_config
            .exists()
            .then(|| default_config.to_path_buf())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_explicit_config_wins() {
        let args = BridgeArgs {
            config: Some(PathBuf::from("custom.json5")),
            log_level: Some("debug".to_string()),
        };
        assert_eq!(
            args.config_path("/nonexistent/default.json5"),
            Some(PathBuf::from("custom.json5"))
        );
    }

    #[test]
    fn test_missing_default_config() {
        let args = BridgeArgs::default();
        assert_eq!(args.config_path("/nonexistent/default.json5"), None);
    }

    #[test]
    fn test_existing_default_config() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let args = BridgeArgs::default();
        assert_eq!(args.config_path(file.path()), Some(file.path().to_path_buf()));
    }

    #[test]
    fn test_parse_from_cli() {
        let args =
            BridgeArgs::try_parse_from(["bridge", "--config", "a.json5", "--log-level", "trace"])
                .unwrap();
        assert_eq!(args.config, Some(PathBuf::from("a.json5")));
        assert_eq!(args.log_level.as_deref(), Some("trace"));
    }
}
