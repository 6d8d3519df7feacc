//! Configuration management for notifr
//!
//! This module defines the main `Config` struct and its sub-structs. It uses
//! the `figment` crate to layer, from lowest to highest precedence: built-in
//! defaults, an optional `notifr.toml` file, `NOTIFR_*` environment variables
//! and command-line arguments.

use crate::cli::Cli;
use crate::targets::TargetsConfig;
use anyhow::{bail, Result};
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// The file read when `--config` is not given. It may be absent.
pub const DEFAULT_CONFIG_FILE: &str = "notifr.toml";

/// The main configuration struct for the application.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct Config {
    /// Development mode: debug logging with a human-readable layout.
    pub dev_mode: bool,
    /// The logging level, used when `RUST_LOG` is not set.
    pub log_level: String,
    /// Log metric counters periodically.
    pub log_metrics: bool,
    /// Seconds between two metrics snapshots when `log_metrics` is on.
    pub log_metrics_seconds: u64,
    /// The address the HTTP server listens on (`<host>:<port>`).
    pub listen: String,
    /// Routing of messages by target name (`<target>:<channel>:<recipient>,...`).
    pub targets: TargetsConfig,
    /// Settings for the SMTP relay.
    pub smtp: SmtpConfig,
}

/// Configuration for the SMTP relay connection.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct SmtpConfig {
    /// Host of the SMTP relay. Required.
    pub host: String,
    /// Port of the SMTP relay.
    pub port: u16,
    /// Sender address.
    pub from: Option<String>,
    /// Waits between send attempts; one attempt per entry.
    pub retries: RetrySchedule,
}

impl Default for SmtpConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: 587,
            from: None,
            retries: RetrySchedule::default(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            dev_mode: false,
            log_level: "info".to_string(),
            log_metrics: false,
            log_metrics_seconds: 60,
            listen: "0.0.0.0:8080".to_string(),
            targets: TargetsConfig::default(),
            smtp: SmtpConfig::default(),
        }
    }
}

impl Config {
    /// Loads the configuration by layering defaults, file, environment and CLI.
    pub fn load(cli: &Cli) -> Result<Self> {
        let path = match &cli.config {
            Some(path) if !path.exists() => bail!("config file {} not found", path.display()),
            Some(path) => path.clone(),
            None => PathBuf::from(DEFAULT_CONFIG_FILE),
        };
        let config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(path))
            // NOTIFR_SMTP_HOST and friends land in the [smtp] table.
            .merge(Env::prefixed("NOTIFR_").map(|key| {
                key.as_str()
                    .to_ascii_lowercase()
                    .replacen("smtp_", "smtp.", 1)
                    .into()
            }))
            .merge(cli.clone())
            .extract()?;
        Ok(config)
    }
}

/// An ordered list of retry waits, written as `"10s,1m,10m"` or a TOML array.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetrySchedule(Vec<Duration>);

impl RetrySchedule {
    pub fn new(waits: Vec<Duration>) -> Self {
        Self(waits)
    }

    pub fn durations(&self) -> &[Duration] {
        &self.0
    }

    fn parse_list<'a>(parts: impl Iterator<Item = &'a str>) -> Result<Self, String> {
        parts.map(parse_duration).collect::<Result<_, _>>().map(Self)
    }
}

impl Default for RetrySchedule {
    fn default() -> Self {
        Self(vec![
            Duration::from_secs(10),
            Duration::from_secs(60),
            Duration::from_secs(600),
        ])
    }
}

impl std::str::FromStr for RetrySchedule {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.trim().is_empty() {
            return Ok(Self(Vec::new()));
        }
        Self::parse_list(s.split(','))
    }
}

impl fmt::Display for RetrySchedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.0.iter().map(|d| format_duration(*d)).collect();
        f.write_str(&parts.join(","))
    }
}

impl Serialize for RetrySchedule {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for RetrySchedule {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Joined(String),
            // Env values such as `0` arrive as integers.
            Number(u64),
            List(Vec<String>),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Joined(s) => s.parse().map_err(de::Error::custom),
            Raw::Number(n) => n.to_string().parse().map_err(de::Error::custom),
            Raw::List(items) => {
                Self::parse_list(items.iter().map(String::as_str)).map_err(de::Error::custom)
            }
        }
    }
}

/// Parses durations like `10s`, `1m30s`, `250ms` or `0`.
pub fn parse_duration(input: &str) -> Result<Duration, String> {
    let s = input.trim();
    if s.is_empty() {
        return Err("empty duration".to_string());
    }
    if s == "0" {
        return Ok(Duration::ZERO);
    }

    let invalid = || format!("invalid duration {input:?}");
    let mut total = Duration::ZERO;
    let mut rest = s;
    while !rest.is_empty() {
        let digits = rest
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(rest.len());
        if digits == 0 {
            return Err(invalid());
        }
        let value: u64 = rest[..digits].parse().map_err(|_| invalid())?;
        rest = &rest[digits..];

        let unit_len = rest.find(|c: char| c.is_ascii_digit()).unwrap_or(rest.len());
        let part = match &rest[..unit_len] {
            "ms" => Some(Duration::from_millis(value)),
            "s" => Some(Duration::from_secs(value)),
            "m" => value.checked_mul(60).map(Duration::from_secs),
            "h" => value.checked_mul(3600).map(Duration::from_secs),
            _ => None,
        };
        total = part
            .and_then(|part| total.checked_add(part))
            .ok_or_else(invalid)?;
        rest = &rest[unit_len..];
    }
    Ok(total)
}

fn format_duration(d: Duration) -> String {
    let secs = d.as_secs();
    if d.subsec_nanos() != 0 {
        format!("{}ms", d.as_millis())
    } else if secs != 0 && secs % 3600 == 0 {
        format!("{}h", secs / 3600)
    } else if secs != 0 && secs % 60 == 0 {
        format!("{}m", secs / 60)
    } else {
        format!("{secs}s")
    }
}
