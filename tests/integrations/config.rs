//! Configuration loading across file, environment and CLI layers.

use clap::Parser;
use figment::Jail;
use notifr::cli::Cli;
use notifr::config::{Config, RetrySchedule};
use std::time::Duration;

fn load(cli: &Cli) -> Result<Config, figment::Error> {
    Config::load(cli).map_err(|e| figment::Error::from(format!("{e:#}")))
}

#[test]
fn test_defaults_without_any_source() {
    Jail::expect_with(|_jail| {
        let config = load(&Cli::default())?;
        assert_eq!(config, Config::default());
        assert_eq!(config.smtp.port, 587);
        assert_eq!(config.smtp.retries.to_string(), "10s,1m,10m");
        assert!(config.targets.is_empty());
        Ok(())
    });
}

#[test]
fn test_load_full_toml_file() {
    Jail::expect_with(|jail| {
        jail.create_file(
            "relay.toml",
            r#"
                dev_mode = true
                log_level = "warn"
                listen = "127.0.0.1:9090"
                targets = "ops:smtp:oncall@example.com,ops:smtp:lead@example.com"
                [smtp]
                host = "mail.example.com"
                port = 25
                from = "relay@example.com"
                retries = ["1s", "5s"]
            "#,
        )?;
        let cli = Cli::try_parse_from(["notifr", "--config", "relay.toml"])
            .map_err(|e| e.to_string())?;

        let config = load(&cli)?;

        assert!(config.dev_mode);
        assert_eq!(config.log_level, "warn");
        assert_eq!(config.listen, "127.0.0.1:9090");
        assert_eq!(
            config.targets.to_string(),
            "ops:smtp:oncall@example.com,ops:smtp:lead@example.com"
        );
        assert_eq!(config.smtp.host, "mail.example.com");
        assert_eq!(config.smtp.port, 25);
        assert_eq!(config.smtp.from.as_deref(), Some("relay@example.com"));
        assert_eq!(
            config.smtp.retries,
            RetrySchedule::new(vec![Duration::from_secs(1), Duration::from_secs(5)])
        );
        Ok(())
    });
}

#[test]
fn test_environment_overrides_default_file() {
    Jail::expect_with(|jail| {
        jail.create_file(
            "notifr.toml",
            r#"
                targets = "file:smtp:file@example.com"
                [smtp]
                host = "file-host"
            "#,
        )?;
        jail.set_env("NOTIFR_TARGETS", "env:smtp:env@example.com");
        jail.set_env("NOTIFR_SMTP_HOST", "env-host");
        jail.set_env("NOTIFR_SMTP_PORT", "2525");
        jail.set_env("NOTIFR_SMTP_RETRIES", "30s,2m");

        let config = load(&Cli::default())?;

        assert_eq!(config.targets.to_string(), "env:smtp:env@example.com");
        assert_eq!(config.smtp.host, "env-host");
        assert_eq!(config.smtp.port, 2525);
        assert_eq!(config.smtp.retries.to_string(), "30s,2m");
        Ok(())
    });
}

#[test]
fn test_cli_overrides_environment() {
    Jail::expect_with(|jail| {
        jail.set_env("NOTIFR_LISTEN", "0.0.0.0:1111");
        jail.set_env("NOTIFR_TARGETS", "env:smtp:env@example.com");
        let cli = Cli::try_parse_from([
            "notifr",
            "--listen",
            "127.0.0.1:2222",
            "--targets",
            "cli:smtp:cli@example.com",
        ])
        .map_err(|e| e.to_string())?;

        let config = load(&cli)?;

        assert_eq!(config.listen, "127.0.0.1:2222");
        assert!(config.targets.get("cli").is_some());
        assert!(config.targets.get("env").is_none());
        Ok(())
    });
}

#[test]
fn test_invalid_targets_syntax_fails_loading() {
    Jail::expect_with(|jail| {
        jail.set_env("NOTIFR_TARGETS", "ops:smtp");
        let err = load(&Cli::default()).unwrap_err();
        assert!(err.to_string().contains("invalid target's syntax"));
        Ok(())
    });
}

#[test]
fn test_invalid_retry_duration_fails_loading() {
    Jail::expect_with(|jail| {
        jail.set_env("NOTIFR_SMTP_RETRIES", "10s,soon");
        assert!(load(&Cli::default()).is_err());
        Ok(())
    });
}

#[test]
fn test_missing_explicit_config_file_fails() {
    Jail::expect_with(|_jail| {
        let cli = Cli::try_parse_from(["notifr", "--config", "absent.toml"])
            .map_err(|e| e.to_string())?;
        assert!(load(&cli).is_err());
        Ok(())
    });
}

#[test]
fn test_zero_retry_schedule_from_environment() {
    Jail::expect_with(|jail| {
        jail.set_env("NOTIFR_SMTP_RETRIES", "0");
        let config = load(&Cli::default())?;
        assert_eq!(config.smtp.retries, RetrySchedule::new(vec![Duration::ZERO]));
        Ok(())
    });
}

#[test]
fn test_metrics_logging_switch() {
    Jail::expect_with(|jail| {
        jail.set_env("NOTIFR_LOG_METRICS_SECONDS", "5");
        let cli = Cli::try_parse_from(["notifr", "--log-metrics"]).map_err(|e| e.to_string())?;

        let config = load(&cli)?;

        assert!(config.log_metrics);
        assert_eq!(config.log_metrics_seconds, 5);
        assert!(!load(&Cli::default())?.log_metrics);
        Ok(())
    });
}
