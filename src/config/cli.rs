use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, builder::BoolishValueParser};

/// Command-line arguments for the Plaza binary.
#[derive(Debug, Parser)]
#[command(name = "plaza", version, about = "Plaza forum ranking and cache service")]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(long = "config-file", env = "PLAZA_CONFIG_FILE", value_name = "PATH")]
    pub config_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Warm the fast store and keep view counters reconciled until interrupted.
    Serve(Box<ServeArgs>),
    /// Warm the fast store and run a single reconciliation pass.
    Reconcile(DatabaseArgs),
    /// Apply pending database migrations.
    Migrate(DatabaseArgs),
    /// Sample jittered TTLs and report their spread.
    Jitter(JitterArgs),
}

#[derive(Debug, Args, Default, Clone)]
pub struct DatabaseOverride {
    /// Override the database connection URL.
    #[arg(long = "database-url", value_name = "URL")]
    pub database_url: Option<String>,
}

#[derive(Debug, Args, Default, Clone)]
pub struct DatabaseArgs {
    #[command(flatten)]
    pub database: DatabaseOverride,
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeArgs {
    #[command(flatten)]
    pub overrides: ServeOverrides,
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeOverrides {
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

    /// Override the database connection URL.
    #[arg(long = "database-url", value_name = "URL")]
    pub database_url: Option<String>,

    /// Override the database pool size.
    #[arg(long = "database-max-connections", value_name = "COUNT")]
    pub database_max_connections: Option<u32>,

    /// Override the capacity of TTL-bearing fast store keys.
    #[arg(long = "cache-max-volatile-keys", value_name = "COUNT")]
    pub cache_max_volatile_keys: Option<usize>,

    /// Override the reconciliation interval.
    #[arg(long = "reconcile-interval-seconds", value_name = "SECONDS")]
    pub reconcile_interval_seconds: Option<u64>,

    /// Toggle periodic reconciliation.
    #[arg(
        long = "reconcile-enabled",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub reconcile_enabled: Option<bool>,

    /// Override the machine id embedded in generated post ids.
    #[arg(long = "ids-machine-id", value_name = "ID")]
    pub ids_machine_id: Option<u16>,
}

#[derive(Debug, Args, Clone)]
pub struct JitterArgs {
    /// Base TTL to jitter.
    #[arg(long = "base-seconds", default_value_t = 1800)]
    pub base_seconds: u64,

    /// Jitter spread in percent of the base TTL.
    #[arg(long, default_value_t = 20)]
    pub percent: u32,

    /// Number of samples to draw.
    #[arg(long, default_value_t = 10_000)]
    pub iterations: u32,

    /// Print the report as JSON.
    #[arg(long, action = clap::ArgAction::SetTrue)]
    pub json: bool,
}
