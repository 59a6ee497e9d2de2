//! Command line surface and configuration resolution.

use std::path::PathBuf;

use anyhow::{Context, Result};
use cean_util::{FormConfig, load_config, load_config_from_path};
use clap::{Args, Parser, Subcommand};

/// Fill in dataset metadata against a backend process.
#[derive(Parser, Debug)]
#[command(name = "cean", version, about)]
pub struct Cli {
    /// Configuration file (defaults to $CEAN_CONFIG_PATH or the user config dir)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(flatten)]
    pub overrides: Overrides,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run a form session bridged to a backend process
    Session(SessionArgs),
    /// Print the resolved configuration
    Config,
}

#[derive(Args, Debug)]
pub struct SessionArgs {
    /// Backend executable; it reads requests on stdin and answers on stdout
    #[arg(long)]
    pub backend: String,

    /// Arguments passed to the backend
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    pub backend_args: Vec<String>,

    /// UI events, one JSON object per line (defaults to stdin)
    #[arg(long)]
    pub events: Option<PathBuf>,

    /// Catalogues and initial values for the form, as JSON
    #[arg(long)]
    pub setup: Option<PathBuf>,
}

/// Flags that take precedence over the configuration file.
#[derive(Args, Debug, Default)]
pub struct Overrides {
    /// Quiet period before a typed file path is inspected
    #[arg(long, global = true)]
    pub debounce_ms: Option<u64>,

    /// Upload without asking when the form is valid
    #[arg(long, global = true)]
    pub skip_confirmation: bool,
}

impl Overrides {
    pub fn apply(&self, config: &mut FormConfig) {
        if let Some(debounce_ms) = self.debounce_ms {
            config.debounce_ms = debounce_ms;
        }
        if self.skip_confirmation {
            config.skip_confirmation = true;
        }
    }
}

impl Cli {
    /// Loads the configuration file and applies the command line overrides.
    pub fn resolve_config(&self) -> Result<FormConfig> {
        let mut config = match &self.config {
            Some(path) => load_config_from_path(path).with_context(|| format!("loading {}", path.display()))?,
            None => load_config().context("loading configuration")?,
        };
        self.overrides.apply(&mut config);
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn session_collects_trailing_backend_arguments() {
        let cli = Cli::try_parse_from([
            "cean",
            "session",
            "--backend",
            "python3",
            "--events",
            "events.jsonl",
            "--",
            "-m",
            "backend",
        ])
        .unwrap();
        let Command::Session(args) = cli.command else {
            panic!("expected the session command");
        };
        assert_eq!(args.backend, "python3");
        assert_eq!(args.backend_args, ["-m", "backend"]);
        assert_eq!(args.events, Some(PathBuf::from("events.jsonl")));
        assert!(args.setup.is_none());
    }

    #[test]
    fn flags_override_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{"debounceMs": 250, "scicatUrl": "https://scicat.example/"}"#).unwrap();

        let cli = Cli::try_parse_from([
            "cean",
            "config",
            "--config",
            path.to_str().unwrap(),
            "--debounce-ms",
            "50",
            "--skip-confirmation",
        ])
        .unwrap();
        let config = cli.resolve_config().unwrap();
        assert_eq!(config.debounce_ms, 50);
        assert!(config.skip_confirmation);
        assert_eq!(config.scicat_url, "https://scicat.example/");
    }

    #[test]
    fn malformed_config_is_reported_with_its_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, "{ not json").unwrap();

        let cli = Cli::try_parse_from(["cean", "config", "--config", path.to_str().unwrap()]).unwrap();
        let error = cli.resolve_config().unwrap_err();
        assert!(format!("{error:#}").contains("config.json"), "{error:#}");
    }
}
