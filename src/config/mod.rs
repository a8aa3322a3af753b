//! Configuration layer: typed settings with layered precedence (file → env → CLI).

use std::{path::PathBuf, str::FromStr};

use clap::{Args, Parser, builder::BoolishValueParser};
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "brusio";

/// Command-line arguments for an embedding binary.
#[derive(Debug, Parser)]
#[command(name = "brusio", version, about = "Brusio statistics engine")]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(long = "config-file", env = "BRUSIO_CONFIG_FILE", value_name = "PATH")]
    pub config_file: Option<PathBuf>,

    #[command(flatten)]
    pub overrides: CliOverrides,
}

#[derive(Debug, Args, Default, Clone)]
pub struct CliOverrides {
    /// Override the base log level (trace|debug|info|warn|error).
    #[arg(long = "log-level", value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Toggle JSON logging.
    #[arg(
        long = "log-json",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub log_json: Option<bool>,

    /// Toggle the posting-activity cache.
    #[arg(
        long = "stats-activity",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub stats_activity: Option<bool>,

    /// Toggle the post-count cache.
    #[arg(
        long = "stats-post-counts",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub stats_post_counts: Option<bool>,

    /// Toggle the file-statistics cache.
    #[arg(
        long = "stats-file-stats",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub stats_file_stats: Option<bool>,
}

/// Fully-resolved settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub logging: LoggingSettings,
    pub stats: StatsSettings,
}

#[derive(Debug, Clone)]
pub struct LoggingSettings {
    pub level: LevelFilter,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy)]
pub enum LogFormat {
    Json,
    Compact,
}

/// Which statistics caches the engine maintains.
#[derive(Debug, Clone)]
pub struct StatsSettings {
    pub enable_activity: bool,
    pub enable_post_counts: bool,
    pub enable_file_stats: bool,
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to build configuration: {0}")]
    Build(#[from] config::ConfigError),
    #[error("invalid configuration for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl LoadError {
    fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

/// Load settings using the configured precedence (file → environment → CLI).
pub fn load(cli: &CliArgs) -> Result<Settings, LoadError> {
    let mut builder = Config::builder()
        .add_source(File::with_name(DEFAULT_CONFIG_BASENAME).required(false))
        .add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false));

    if let Some(path) = cli.config_file.as_ref() {
        builder = builder.add_source(File::from(path.as_path()).required(true));
    }

    builder = builder.add_source(Environment::with_prefix("BRUSIO").separator("__"));

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;
    raw.apply_overrides(&cli.overrides);

    Settings::from_raw(raw)
}

/// Resolve configuration using the process CLI arguments, returning both.
pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    let args = CliArgs::parse();
    let settings = load(&args)?;
    Ok((args, settings))
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    logging: RawLoggingSettings,
    stats: RawStatsSettings,
}

impl RawSettings {
    fn apply_overrides(&mut self, overrides: &CliOverrides) {
        if let Some(level) = overrides.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(json) = overrides.log_json {
            self.logging.json = Some(json);
        }
        if let Some(enabled) = overrides.stats_activity {
            self.stats.enable_activity = Some(enabled);
        }
        if let Some(enabled) = overrides.stats_post_counts {
            self.stats.enable_post_counts = Some(enabled);
        }
        if let Some(enabled) = overrides.stats_file_stats {
            self.stats.enable_file_stats = Some(enabled);
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings { logging, stats } = raw;

        Ok(Self {
            logging: build_logging_settings(logging)?,
            stats: build_stats_settings(stats),
        })
    }
}

fn build_logging_settings(logging: RawLoggingSettings) -> Result<LoggingSettings, LoadError> {
    let level = match logging.level {
        Some(level) => LevelFilter::from_str(level.as_str()).map_err(|err| {
            LoadError::invalid("logging.level", format!("failed to parse: {err}"))
        })?,
        None => LevelFilter::INFO,
    };

    let format = if logging.json.unwrap_or(false) {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };

    Ok(LoggingSettings { level, format })
}

fn build_stats_settings(stats: RawStatsSettings) -> StatsSettings {
    StatsSettings {
        enable_activity: stats.enable_activity.unwrap_or(true),
        enable_post_counts: stats.enable_post_counts.unwrap_or(true),
        enable_file_stats: stats.enable_file_stats.unwrap_or(true),
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawStatsSettings {
    enable_activity: Option<bool>,
    enable_post_counts: Option<bool>,
    enable_file_stats: Option<bool>,
}

#[cfg(test)]
mod tests {
    use std::io::Write as _;

    use serial_test::serial;

    use super::*;

    #[test]
    fn defaults_enable_every_cache() {
        let settings = Settings::from_raw(RawSettings::default()).expect("valid settings");
        assert!(settings.stats.enable_activity);
        assert!(settings.stats.enable_post_counts);
        assert!(settings.stats.enable_file_stats);
        assert_eq!(settings.logging.level, LevelFilter::INFO);
        assert!(matches!(settings.logging.format, LogFormat::Compact));
    }

    #[test]
    fn cli_overrides_take_highest_precedence() {
        let mut raw = RawSettings::default();
        raw.logging.level = Some("info".to_string());
        raw.stats.enable_file_stats = Some(true);

        let overrides = CliOverrides {
            log_level: Some("debug".to_string()),
            stats_file_stats: Some(false),
            ..Default::default()
        };

        raw.apply_overrides(&overrides);
        let settings = Settings::from_raw(raw).expect("valid settings");

        assert_eq!(settings.logging.level, LevelFilter::DEBUG);
        assert!(!settings.stats.enable_file_stats);
    }

    #[test]
    fn cli_json_logging_enforces_format() {
        let mut raw = RawSettings::default();
        let overrides = CliOverrides {
            log_json: Some(true),
            ..Default::default()
        };

        raw.apply_overrides(&overrides);
        let settings = Settings::from_raw(raw).expect("valid settings");
        assert!(matches!(settings.logging.format, LogFormat::Json));
    }

    #[test]
    fn rejects_unknown_log_level() {
        let mut raw = RawSettings::default();
        raw.logging.level = Some("loudest".to_string());

        assert!(matches!(
            Settings::from_raw(raw),
            Err(LoadError::Invalid {
                key: "logging.level",
                ..
            })
        ));
    }

    #[test]
    fn parse_cli_flags() {
        let args = CliArgs::parse_from([
            "brusio",
            "--log-level",
            "trace",
            "--stats-activity",
            "false",
        ]);

        assert_eq!(args.overrides.log_level.as_deref(), Some("trace"));
        assert_eq!(args.overrides.stats_activity, Some(false));
        assert_eq!(args.overrides.stats_post_counts, None);
    }

    #[test]
    #[serial]
    fn explicit_config_file_is_honored() {
        let mut file = tempfile::Builder::new()
            .suffix(".toml")
            .tempfile()
            .expect("temp config");
        writeln!(
            file,
            "[logging]\nlevel = \"warn\"\n\n[stats]\nenable_post_counts = false\n"
        )
        .expect("write config");

        let args = CliArgs::parse_from([
            "brusio",
            "--config-file",
            file.path().to_str().expect("utf-8 temp path"),
        ]);
        let settings = load(&args).expect("load settings");

        assert_eq!(settings.logging.level, LevelFilter::WARN);
        assert!(!settings.stats.enable_post_counts);
        assert!(settings.stats.enable_activity);
    }

    #[test]
    #[serial]
    fn environment_layers_over_files() {
        // SAFETY: guarded by #[serial]; no other thread touches the
        // environment while this test runs.
        unsafe { std::env::set_var("BRUSIO_LOGGING__LEVEL", "error") };

        let args = CliArgs::parse_from(["brusio"]);
        let settings = load(&args).expect("load settings");

        unsafe { std::env::remove_var("BRUSIO_LOGGING__LEVEL") };

        assert_eq!(settings.logging.level, LevelFilter::ERROR);
    }
}
