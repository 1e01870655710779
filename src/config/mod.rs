//! Configuration layer: typed settings with layered precedence (file → env → CLI).

mod cli;

pub use cli::*;

use std::{
    num::{NonZeroU32, NonZeroUsize},
    str::FromStr,
    time::Duration,
};

use clap::Parser;
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use time::{
    Date, OffsetDateTime, format_description::well_known::Rfc3339, macros::format_description,
};
use tracing::level_filters::LevelFilter;

use crate::cache::CacheConfig;
use crate::ranking::RankingConfig;

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "plaza";
const DEFAULT_DB_MAX_CONNECTIONS: u32 = 8;
const DEFAULT_RECONCILE_INTERVAL_SECS: u64 = 300;
const DEFAULT_ID_EPOCH: &str = "2024-01-01";
const DEFAULT_MACHINE_ID: u16 = 1;
const MAX_MACHINE_ID: u16 = 1023;

/// Fully-resolved deployment settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub logging: LoggingSettings,
    pub database: DatabaseSettings,
    pub cache: CacheSettings,
    pub ranking: RankingSettings,
    pub reconcile: ReconcileSettings,
    pub ids: IdSettings,
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

#[derive(Debug, Clone)]
pub struct DatabaseSettings {
    pub url: Option<String>,
    pub max_connections: NonZeroU32,
}

#[derive(Debug, Clone)]
pub struct CacheSettings {
    pub key_prefix: String,
    pub post_ttl: Duration,
    pub post_jitter_percent: u32,
    pub not_found_ttl: Duration,
    pub not_found_jitter_percent: u32,
    pub double_delete_delay: Duration,
    pub consistency_delay: Duration,
    pub max_volatile_keys: NonZeroUsize,
}

#[derive(Debug, Clone)]
pub struct RankingSettings {
    pub vote_window: Duration,
    pub score_per_vote: f64,
    pub community_index_ttl: Duration,
    pub community_index_jitter_percent: u32,
    pub view_counter_ttl: Duration,
    pub view_counter_jitter_percent: u32,
    pub viewer_marker_ttl: Duration,
    pub viewer_marker_jitter_percent: u32,
    pub serialize_votes: bool,
}

#[derive(Debug, Clone)]
pub struct ReconcileSettings {
    pub interval: Duration,
    pub enabled: bool,
}

#[derive(Debug, Clone)]
pub struct IdSettings {
    pub epoch: OffsetDateTime,
    pub machine_id: u16,
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

    builder = builder.add_source(Environment::with_prefix("PLAZA").separator("__"));

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;

    match cli.command.as_ref() {
        Some(Command::Serve(args)) => raw.apply_serve_overrides(&args.overrides),
        Some(Command::Reconcile(args)) | Some(Command::Migrate(args)) => {
            raw.apply_database_override(&args.database)
        }
        Some(Command::Jitter(_)) => {}
        None => raw.apply_serve_overrides(&ServeOverrides::default()),
    }

    Settings::from_raw(raw)
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    logging: RawLoggingSettings,
    database: RawDatabaseSettings,
    cache: RawCacheSettings,
    ranking: RawRankingSettings,
    reconcile: RawReconcileSettings,
    ids: RawIdSettings,
}

impl RawSettings {
    fn apply_serve_overrides(&mut self, overrides: &ServeOverrides) {
        if let Some(level) = overrides.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(json) = overrides.log_json {
            self.logging.json = Some(json);
        }
        if let Some(url) = overrides.database_url.as_ref() {
            self.database.url = Some(url.clone());
        }
        if let Some(max) = overrides.database_max_connections {
            self.database.max_connections = Some(max);
        }
        if let Some(keys) = overrides.cache_max_volatile_keys {
            self.cache.max_volatile_keys = Some(keys);
        }
        if let Some(seconds) = overrides.reconcile_interval_seconds {
            self.reconcile.interval_seconds = Some(seconds);
        }
        if let Some(enabled) = overrides.reconcile_enabled {
            self.reconcile.enabled = Some(enabled);
        }
        if let Some(machine_id) = overrides.ids_machine_id {
            self.ids.machine_id = Some(machine_id);
        }
    }

    fn apply_database_override(&mut self, overrides: &DatabaseOverride) {
        if let Some(url) = overrides.database_url.as_ref() {
            self.database.url = Some(url.clone());
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            logging,
            database,
            cache,
            ranking,
            reconcile,
            ids,
        } = raw;

        let logging = build_logging_settings(logging)?;
        let database = build_database_settings(database)?;
        let cache = build_cache_settings(cache)?;
        let ranking = build_ranking_settings(ranking)?;
        let reconcile = build_reconcile_settings(reconcile)?;
        let ids = build_id_settings(ids)?;

        Ok(Self {
            logging,
            database,
            cache,
            ranking,
            reconcile,
            ids,
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

fn build_database_settings(database: RawDatabaseSettings) -> Result<DatabaseSettings, LoadError> {
    let url = database.url.and_then(|value| {
        let trimmed = value.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    });

    let max_value = database
        .max_connections
        .unwrap_or(DEFAULT_DB_MAX_CONNECTIONS);
    let max_connections = non_zero_u32(max_value.into(), "database.max_connections")?;

    Ok(DatabaseSettings {
        url,
        max_connections,
    })
}

fn build_cache_settings(cache: RawCacheSettings) -> Result<CacheSettings, LoadError> {
    let defaults = CacheConfig::default();

    let key_prefix = cache.key_prefix.unwrap_or(defaults.key_prefix);
    if key_prefix.trim().is_empty() {
        return Err(LoadError::invalid("cache.key_prefix", "must not be empty"));
    }

    let post_ttl = non_zero_secs(
        cache.post_ttl_seconds.unwrap_or(defaults.post_ttl_seconds),
        "cache.post_ttl_seconds",
    )?;
    let not_found_ttl = non_zero_secs(
        cache
            .not_found_ttl_seconds
            .unwrap_or(defaults.not_found_ttl_seconds),
        "cache.not_found_ttl_seconds",
    )?;
    let post_jitter_percent = percent(
        cache
            .post_jitter_percent
            .unwrap_or(defaults.post_jitter_percent),
        "cache.post_jitter_percent",
    )?;
    let not_found_jitter_percent = percent(
        cache
            .not_found_jitter_percent
            .unwrap_or(defaults.not_found_jitter_percent),
        "cache.not_found_jitter_percent",
    )?;

    let double_delete_delay = Duration::from_millis(
        cache
            .double_delete_delay_ms
            .unwrap_or(defaults.double_delete_delay_ms),
    );
    let consistency_delay = Duration::from_millis(
        cache
            .consistency_delay_ms
            .unwrap_or(defaults.consistency_delay_ms),
    );

    let max_volatile_keys = NonZeroUsize::new(
        cache
            .max_volatile_keys
            .unwrap_or(defaults.max_volatile_keys),
    )
    .ok_or_else(|| LoadError::invalid("cache.max_volatile_keys", "must be greater than zero"))?;

    Ok(CacheSettings {
        key_prefix,
        post_ttl,
        post_jitter_percent,
        not_found_ttl,
        not_found_jitter_percent,
        double_delete_delay,
        consistency_delay,
        max_volatile_keys,
    })
}

fn build_ranking_settings(ranking: RawRankingSettings) -> Result<RankingSettings, LoadError> {
    let defaults = RankingConfig::default();

    let score_per_vote = ranking.score_per_vote.unwrap_or(defaults.score_per_vote);
    if !score_per_vote.is_finite() || score_per_vote <= 0.0 {
        return Err(LoadError::invalid(
            "ranking.score_per_vote",
            "must be a positive number",
        ));
    }

    Ok(RankingSettings {
        vote_window: non_zero_secs(
            ranking
                .vote_window_seconds
                .unwrap_or(defaults.vote_window_seconds),
            "ranking.vote_window_seconds",
        )?,
        score_per_vote,
        community_index_ttl: non_zero_secs(
            ranking
                .community_index_ttl_seconds
                .unwrap_or(defaults.community_index_ttl_seconds),
            "ranking.community_index_ttl_seconds",
        )?,
        community_index_jitter_percent: percent(
            ranking
                .community_index_jitter_percent
                .unwrap_or(defaults.community_index_jitter_percent),
            "ranking.community_index_jitter_percent",
        )?,
        view_counter_ttl: non_zero_secs(
            ranking
                .view_counter_ttl_seconds
                .unwrap_or(defaults.view_counter_ttl_seconds),
            "ranking.view_counter_ttl_seconds",
        )?,
        view_counter_jitter_percent: percent(
            ranking
                .view_counter_jitter_percent
                .unwrap_or(defaults.view_counter_jitter_percent),
            "ranking.view_counter_jitter_percent",
        )?,
        viewer_marker_ttl: non_zero_secs(
            ranking
                .viewer_marker_ttl_seconds
                .unwrap_or(defaults.viewer_marker_ttl_seconds),
            "ranking.viewer_marker_ttl_seconds",
        )?,
        viewer_marker_jitter_percent: percent(
            ranking
                .viewer_marker_jitter_percent
                .unwrap_or(defaults.viewer_marker_jitter_percent),
            "ranking.viewer_marker_jitter_percent",
        )?,
        serialize_votes: ranking.serialize_votes.unwrap_or(defaults.serialize_votes),
    })
}

fn build_reconcile_settings(
    reconcile: RawReconcileSettings,
) -> Result<ReconcileSettings, LoadError> {
    let interval = non_zero_secs(
        reconcile
            .interval_seconds
            .unwrap_or(DEFAULT_RECONCILE_INTERVAL_SECS),
        "reconcile.interval_seconds",
    )?;

    Ok(ReconcileSettings {
        interval,
        enabled: reconcile.enabled.unwrap_or(true),
    })
}

fn build_id_settings(ids: RawIdSettings) -> Result<IdSettings, LoadError> {
    let raw_epoch = ids.epoch.unwrap_or_else(|| DEFAULT_ID_EPOCH.to_string());
    let epoch = parse_epoch(raw_epoch.trim())
        .map_err(|reason| LoadError::invalid("ids.epoch", reason))?;

    let machine_id = ids.machine_id.unwrap_or(DEFAULT_MACHINE_ID);
    if machine_id > MAX_MACHINE_ID {
        return Err(LoadError::invalid(
            "ids.machine_id",
            format!("must be at most {MAX_MACHINE_ID}"),
        ));
    }

    Ok(IdSettings { epoch, machine_id })
}

/// Accepts a calendar date (midnight UTC) or a full RFC 3339 timestamp.
fn parse_epoch(value: &str) -> Result<OffsetDateTime, String> {
    if let Ok(date) = Date::parse(value, format_description!("[year]-[month]-[day]")) {
        return Ok(date.midnight().assume_utc());
    }
    OffsetDateTime::parse(value, &Rfc3339)
        .map_err(|err| format!("expected YYYY-MM-DD or RFC 3339 timestamp: {err}"))
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawDatabaseSettings {
    url: Option<String>,
    max_connections: Option<u32>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawCacheSettings {
    key_prefix: Option<String>,
    post_ttl_seconds: Option<u64>,
    post_jitter_percent: Option<u32>,
    not_found_ttl_seconds: Option<u64>,
    not_found_jitter_percent: Option<u32>,
    double_delete_delay_ms: Option<u64>,
    consistency_delay_ms: Option<u64>,
    max_volatile_keys: Option<usize>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawRankingSettings {
    vote_window_seconds: Option<u64>,
    score_per_vote: Option<f64>,
    community_index_ttl_seconds: Option<u64>,
    community_index_jitter_percent: Option<u32>,
    view_counter_ttl_seconds: Option<u64>,
    view_counter_jitter_percent: Option<u32>,
    viewer_marker_ttl_seconds: Option<u64>,
    viewer_marker_jitter_percent: Option<u32>,
    serialize_votes: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawReconcileSettings {
    interval_seconds: Option<u64>,
    enabled: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawIdSettings {
    epoch: Option<String>,
    machine_id: Option<u16>,
}

fn non_zero_u32(value: u64, key: &'static str) -> Result<NonZeroU32, LoadError> {
    if value == 0 {
        return Err(LoadError::invalid(key, "must be greater than zero"));
    }
    let value_u32: u32 = value
        .try_into()
        .map_err(|_| LoadError::invalid(key, "value exceeds supported range for u32"))?;
    NonZeroU32::new(value_u32).ok_or_else(|| LoadError::invalid(key, "must be greater than zero"))
}

fn non_zero_secs(value: u64, key: &'static str) -> Result<Duration, LoadError> {
    if value == 0 {
        return Err(LoadError::invalid(key, "must be greater than zero"));
    }
    Ok(Duration::from_secs(value))
}

fn percent(value: u32, key: &'static str) -> Result<u32, LoadError> {
    if value > 100 {
        return Err(LoadError::invalid(key, "must be between 0 and 100"));
    }
    Ok(value)
}

/// Resolve configuration using the supplied CLI arguments, returning both for downstream use.
pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    let args = CliArgs::parse();
    let settings = load(&args)?;
    Ok((args, settings))
}

#[cfg(test)]
mod tests;
