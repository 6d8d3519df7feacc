//! Command-Line Interface (CLI) argument parsing.
//!
//! This module defines the command-line arguments using the `clap` crate.
//! They are parsed at startup and merged over the configuration file and
//! environment variables as the highest-precedence figment provider.

use clap::Parser;
use figment::{
    value::{Dict, Map, Value},
    Error, Metadata, Profile, Provider,
};
use std::path::PathBuf;

/// An HTTP relay that routes messages to notification channels by target name.
#[derive(Parser, Debug, Clone, Default)]
#[command(name = "notifr", author, version, about, long_about = None)]
pub struct Cli {
    /// Path to the TOML configuration file.
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Host and port to listen on (<host>:<port>).
    #[arg(long, value_name = "ADDR")]
    pub listen: Option<String>,

    /// Routing of messages by target name (<target>:<channel>:<recipient>,...).
    #[arg(long, value_name = "SPEC")]
    pub targets: Option<String>,

    /// Enable development mode.
    #[arg(long)]
    pub dev_mode: bool,

    /// Log metric counters periodically.
    #[arg(long)]
    pub log_metrics: bool,

    /// Logging level used when RUST_LOG is not set.
    #[arg(long, value_name = "LEVEL")]
    pub log_level: Option<String>,
}

impl Provider for Cli {
    fn metadata(&self) -> Metadata {
        Metadata::named("Command-Line Arguments")
    }

    fn data(&self) -> Result<Map<Profile, Dict>, Error> {
        let mut dict = Dict::new();

        if let Some(listen) = &self.listen {
            dict.insert("listen".into(), Value::from(listen.clone()));
        }
        if let Some(targets) = &self.targets {
            dict.insert("targets".into(), Value::from(targets.clone()));
        }
        // Absent means "not given", so an explicit file or env setting survives.
        if self.dev_mode {
            dict.insert("dev_mode".into(), Value::from(true));
        }
        if self.log_metrics {
            dict.insert("log_metrics".into(), Value::from(true));
        }
        if let Some(level) = &self.log_level {
            dict.insert("log_level".into(), Value::from(level.clone()));
        }

        let mut map = Map::new();
        map.insert(Profile::Default, dict);
        Ok(map)
    }
}
