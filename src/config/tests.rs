use time::macros::datetime;

use super::*;

#[test]
fn cli_overrides_take_highest_precedence() {
    let mut raw = RawSettings::default();
    raw.reconcile.interval_seconds = Some(60);
    raw.logging.level = Some("info".to_string());

    let overrides = ServeOverrides {
        reconcile_interval_seconds: Some(15),
        log_level: Some("debug".to_string()),
        ..Default::default()
    };

    raw.apply_serve_overrides(&overrides);
    let settings = Settings::from_raw(raw).expect("valid settings");

    assert_eq!(settings.reconcile.interval, Duration::from_secs(15));
    assert_eq!(settings.logging.level, LevelFilter::DEBUG);
}

#[test]
fn defaults_match_reference_values() {
    let settings = Settings::from_raw(RawSettings::default()).expect("valid settings");

    assert_eq!(settings.cache.post_ttl, Duration::from_secs(1800));
    assert_eq!(settings.cache.post_jitter_percent, 20);
    assert_eq!(settings.cache.not_found_ttl, Duration::from_secs(30));
    assert_eq!(settings.cache.double_delete_delay, Duration::from_millis(500));
    assert_eq!(settings.cache.consistency_delay, Duration::from_millis(1000));
    assert_eq!(settings.cache.key_prefix, "plaza:");
    assert_eq!(settings.ranking.vote_window, Duration::from_secs(7 * 24 * 3600));
    assert_eq!(settings.ranking.score_per_vote, 432.0);
    assert!(settings.ranking.serialize_votes);
    assert_eq!(settings.reconcile.interval, Duration::from_secs(300));
    assert!(settings.reconcile.enabled);
    assert_eq!(settings.ids.epoch, datetime!(2024-01-01 00:00 UTC));
    assert_eq!(settings.ids.machine_id, 1);
    assert_eq!(settings.database.max_connections.get(), 8);
    assert!(settings.database.url.is_none());
}

#[test]
fn settings_convert_into_component_configs() {
    let mut raw = RawSettings::default();
    raw.cache.post_ttl_seconds = Some(600);
    raw.ranking.score_per_vote = Some(100.0);
    let settings = Settings::from_raw(raw).expect("valid settings");

    let cache = CacheConfig::from(&settings.cache);
    assert_eq!(cache.post_ttl(), Duration::from_secs(600));
    assert_eq!(cache, CacheConfig {
        post_ttl_seconds: 600,
        ..CacheConfig::default()
    });

    let ranking = RankingConfig::from(&settings.ranking);
    assert_eq!(ranking.score_per_vote, 100.0);
    assert_eq!(ranking.vote_window(), Duration::from_secs(7 * 24 * 3600));
}

#[test]
fn cli_json_logging_enforces_format() {
    let mut raw = RawSettings::default();
    let overrides = ServeOverrides {
        log_json: Some(true),
        ..Default::default()
    };

    raw.apply_serve_overrides(&overrides);
    let settings = Settings::from_raw(raw).expect("valid settings");
    assert!(matches!(settings.logging.format, LogFormat::Json));
}

#[test]
fn jitter_percent_above_hundred_is_rejected() {
    let mut raw = RawSettings::default();
    raw.cache.post_jitter_percent = Some(150);

    let err = Settings::from_raw(raw).expect_err("invalid percent");
    assert!(matches!(
        err,
        LoadError::Invalid {
            key: "cache.post_jitter_percent",
            ..
        }
    ));
}

#[test]
fn zero_durations_are_rejected() {
    let mut raw = RawSettings::default();
    raw.ranking.vote_window_seconds = Some(0);
    assert!(matches!(
        Settings::from_raw(raw),
        Err(LoadError::Invalid {
            key: "ranking.vote_window_seconds",
            ..
        })
    ));

    let mut raw = RawSettings::default();
    raw.cache.max_volatile_keys = Some(0);
    assert!(matches!(
        Settings::from_raw(raw),
        Err(LoadError::Invalid {
            key: "cache.max_volatile_keys",
            ..
        })
    ));
}

#[test]
fn machine_id_must_fit_ten_bits() {
    let mut raw = RawSettings::default();
    raw.ids.machine_id = Some(1024);
    assert!(matches!(
        Settings::from_raw(raw),
        Err(LoadError::Invalid {
            key: "ids.machine_id",
            ..
        })
    ));
}

#[test]
fn epoch_accepts_dates_and_timestamps() {
    let mut raw = RawSettings::default();
    raw.ids.epoch = Some("2023-06-15T12:00:00Z".to_string());
    let settings = Settings::from_raw(raw).expect("valid settings");
    assert_eq!(settings.ids.epoch, datetime!(2023-06-15 12:00 UTC));

    let mut raw = RawSettings::default();
    raw.ids.epoch = Some("last tuesday".to_string());
    assert!(matches!(
        Settings::from_raw(raw),
        Err(LoadError::Invalid {
            key: "ids.epoch",
            ..
        })
    ));
}

#[test]
fn default_to_serve_command() {
    let args = CliArgs::parse_from(["plaza"]);
    assert!(args.command.is_none());
    assert!(args.config_file.is_none());
}

#[test]
fn parse_serve_overrides() {
    let args = CliArgs::parse_from([
        "plaza",
        "serve",
        "--database-url",
        "postgres://localhost/plaza",
        "--reconcile-enabled",
        "false",
        "--cache-max-volatile-keys",
        "5000",
        "--ids-machine-id",
        "7",
    ]);

    match args.command {
        Some(Command::Serve(serve)) => {
            let overrides = serve.overrides;
            assert_eq!(
                overrides.database_url.as_deref(),
                Some("postgres://localhost/plaza")
            );
            assert_eq!(overrides.reconcile_enabled, Some(false));
            assert_eq!(overrides.cache_max_volatile_keys, Some(5000));
            assert_eq!(overrides.ids_machine_id, Some(7));
        }
        other => panic!("unexpected command: {other:?}"),
    }
}

#[test]
fn parse_reconcile_and_migrate_arguments() {
    let args = CliArgs::parse_from(["plaza", "reconcile", "--database-url", "postgres://db"]);
    match args.command {
        Some(Command::Reconcile(args)) => {
            assert_eq!(args.database.database_url.as_deref(), Some("postgres://db"));
        }
        other => panic!("unexpected command: {other:?}"),
    }

    let args = CliArgs::parse_from(["plaza", "migrate"]);
    assert!(matches!(args.command, Some(Command::Migrate(_))));
}

#[test]
fn parse_jitter_arguments() {
    let args = CliArgs::parse_from([
        "plaza",
        "jitter",
        "--base-seconds",
        "60",
        "--percent",
        "25",
        "--iterations",
        "500",
    ]);
    match args.command {
        Some(Command::Jitter(jitter)) => {
            assert_eq!(jitter.base_seconds, 60);
            assert_eq!(jitter.percent, 25);
            assert_eq!(jitter.iterations, 500);
            assert!(!jitter.json);
        }
        other => panic!("unexpected command: {other:?}"),
    }
}

#[test]
fn database_override_applies_to_one_shot_commands() {
    let mut raw = RawSettings::default();
    raw.database.url = Some("postgres://from-file".to_string());
    raw.apply_database_override(&DatabaseOverride {
        database_url: Some("  postgres://from-cli  ".to_string()),
    });
    let settings = Settings::from_raw(raw).expect("valid settings");
    assert_eq!(settings.database.url.as_deref(), Some("postgres://from-cli"));
}
