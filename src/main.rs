use std::{process, sync::Arc, time::Duration};

use plaza::{
    application::{
        engine::Engine,
        error::AppError,
        jobs::{ReconciliationService, warm_up},
        repos::PostsWriteRepo,
    },
    cache::{CacheConfig, MemoryStore, sample_jitter},
    config,
    infra::{db::PostgresRepositories, error::InfraError, telemetry},
    ranking::RankingConfig,
    util::clock::{Clock, SystemClock},
};
use tracing::{Dispatch, Level, dispatcher, error, info, warn};
use tracing_subscriber::fmt as tracing_fmt;

const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(1);
    }
}

fn report_application_error(error: &AppError) {
    if dispatcher::has_been_set() {
        error!(error = %error, kind = error.kind(), "application error");
        return;
    }

    let subscriber = tracing_fmt().with_max_level(Level::ERROR).finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, kind = error.kind(), "application error");
    });
}

async fn run() -> Result<(), AppError> {
    let (cli_args, settings) = config::load_with_cli()
        .map_err(|err| AppError::unexpected(format!("failed to load configuration: {err}")))?;

    let command = cli_args
        .command
        .unwrap_or(config::Command::Serve(Box::<config::ServeArgs>::default()));

    telemetry::init(&settings.logging).map_err(AppError::from)?;

    match command {
        config::Command::Serve(_) => run_serve(settings).await,
        config::Command::Reconcile(_) => run_reconcile(settings).await,
        config::Command::Migrate(_) => run_migrate(settings).await,
        config::Command::Jitter(args) => run_jitter(args),
    }
}

async fn run_serve(settings: config::Settings) -> Result<(), AppError> {
    let repositories = init_repositories(&settings).await?;
    let (store, engine) = build_engine(&settings);

    warm_up(&*repositories, &engine).await?;

    let writer: Arc<dyn PostsWriteRepo> = repositories.clone();
    let reconciler = ReconciliationService::new(&engine, writer);
    let reconcile_handle = settings
        .reconcile
        .enabled
        .then(|| reconciler.spawn_periodic(settings.reconcile.interval));

    let sweep_handle = tokio::spawn(async move {
        let mut interval = tokio::time::interval(SWEEP_INTERVAL);
        interval.tick().await; // Skip the first immediate tick
        loop {
            interval.tick().await;
            store.sweep_expired();
        }
    });

    info!(
        target = "plaza::serve",
        reconcile_enabled = settings.reconcile.enabled,
        reconcile_interval_secs = settings.reconcile.interval.as_secs(),
        "plaza ready"
    );

    tokio::signal::ctrl_c()
        .await
        .map_err(InfraError::from)?;
    info!(target = "plaza::serve", "shutdown requested");

    if let Some(handle) = reconcile_handle {
        handle.abort();
        let _ = handle.await;
    }
    sweep_handle.abort();
    let _ = sweep_handle.await;

    engine.deferred.drain().await;
    match reconciler.run_once().await {
        Ok(summary) => info!(
            target = "plaza::serve",
            counters = summary.counters,
            "final reconciliation complete"
        ),
        Err(err) => warn!(target = "plaza::serve", error = %err, "final reconciliation failed"),
    }

    Ok(())
}

async fn run_reconcile(settings: config::Settings) -> Result<(), AppError> {
    let repositories = init_repositories(&settings).await?;
    let (_store, engine) = build_engine(&settings);

    let warmed = warm_up(&*repositories, &engine).await?;
    let writer: Arc<dyn PostsWriteRepo> = repositories;
    let summary = ReconciliationService::new(&engine, writer)
        .trigger_manual()
        .await?;

    info!(
        target = "plaza::reconcile",
        posts = warmed.posts,
        counters = summary.counters,
        persisted = summary.persisted,
        index_rebuilt = summary.index_rebuilt,
        "reconciliation finished"
    );
    Ok(())
}

async fn run_migrate(settings: config::Settings) -> Result<(), AppError> {
    let repositories = init_repositories(&settings).await?;
    repositories.health_check().await?;
    info!(target = "plaza::migrate", "migrations applied");
    Ok(())
}

fn run_jitter(args: config::JitterArgs) -> Result<(), AppError> {
    if args.iterations == 0 {
        return Err(AppError::validation("--iterations must be greater than zero"));
    }
    if args.percent > 100 {
        return Err(AppError::validation("--percent must be between 0 and 100"));
    }

    let report = sample_jitter(
        Duration::from_secs(args.base_seconds),
        args.percent,
        args.iterations,
    );
    if args.json {
        let rendered = serde_json::to_string_pretty(&report)
            .map_err(|err| AppError::unexpected(err.to_string()))?;
        println!("{rendered}");
    } else {
        println!(
            "base={}ms percent={} samples={} min={}ms max={}ms mean={:.1}ms expected=[{}ms, {}ms] within_expected={}",
            report.base_ms,
            report.percent,
            report.samples,
            report.min_ms,
            report.max_ms,
            report.mean_ms,
            report.expected_min_ms,
            report.expected_max_ms,
            report.within_expected()
        );
    }
    Ok(())
}

fn build_engine(settings: &config::Settings) -> (Arc<MemoryStore>, Engine) {
    let cache_config = CacheConfig::from(&settings.cache);
    let ranking_config = RankingConfig::from(&settings.ranking);
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let store = Arc::new(MemoryStore::new(cache_config.max_volatile_keys_non_zero()));
    let engine = Engine::new(store.clone(), cache_config, ranking_config, clock);
    (store, engine)
}

async fn init_repositories(
    settings: &config::Settings,
) -> Result<Arc<PostgresRepositories>, AppError> {
    let repositories = PostgresRepositories::open(&settings.database).await?;
    Ok(Arc::new(repositories))
}
