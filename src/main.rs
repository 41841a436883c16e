//! VIGIL — Candidate Lifecycle Engine for Newly Listed Tokens
//!
//! Entry point. Loads configuration, initialises structured logging,
//! restores the lifecycle cache from disk (or starts fresh), and runs
//! the ingest→evaluate→purge loop with graceful shutdown.

use anyhow::Result;
use secrecy::SecretString;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use vigil::cache::{self, LifecycleCache};
use vigil::config::AppConfig;
use vigil::engine::{RecheckScheduler, SchedulerConfig};
use vigil::filters::{FilterConfig, FilterPipeline};
use vigil::ingest::{IngestionAdapter, ListingFeed};
use vigil::notify::{LogSink, QualificationSink, TelegramSink};
use vigil::oracle::holders::RpcSupplyClient;
use vigil::oracle::retry::RetryPolicy;
use vigil::oracle::rugcheck::RugcheckClient;

const BANNER: &str = r#"
__     _____ ____ ___ _
\ \   / /_ _/ ___|_ _| |
 \ \ / / | | |  _ | || |
  \ V /  | | |_| || || |___
   \_/  |___\____|___|_____|

  Verified Ingestion & Graduated Inspection of Listings
  v0.1.0 — Lifecycle Engine
"#;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (non-fatal if missing)
    let _ = dotenv::dotenv();

    // Load configuration from TOML
    let cfg = AppConfig::load("config.toml")?;

    // Initialise structured logging
    init_logging();

    // Print startup banner
    println!("{BANNER}");
    info!(
        agent_name = %cfg.agent.name,
        recheck_interval_secs = cfg.agent.recheck_interval_secs,
        candidate_ttl_secs = cfg.agent.candidate_ttl_secs,
        "VIGIL starting up"
    );

    // -- Restore or create the lifecycle cache ----------------------------

    let snapshot_path = cfg.agent.snapshot_path.clone();
    let ttl = chrono::Duration::seconds(cfg.agent.candidate_ttl_secs as i64);
    let cache = match cache::load_snapshot(snapshot_path.as_deref())? {
        Some(snapshot) => {
            let cache = LifecycleCache::restore(snapshot, ttl);
            let stats = cache.stats();
            info!(
                candidates = stats.total,
                qualified = stats.qualified,
                "Resumed from saved snapshot"
            );
            cache
        }
        None => {
            info!("Fresh start");
            LifecycleCache::new(ttl)
        }
    };
    let cache = Arc::new(cache);

    // -- Initialise components --------------------------------------------

    let request_timeout = Duration::from_secs(cfg.oracles.request_timeout_secs);

    // Oracle clients
    let rugcheck_key = cfg
        .oracles
        .rugcheck_api_key_env
        .as_deref()
        .and_then(|env| std::env::var(env).ok())
        .map(SecretString::new);
    if rugcheck_key.is_none() {
        warn!("No safety oracle API key configured — using unauthenticated requests");
    }
    let reputation = RugcheckClient::new(
        &cfg.oracles.rugcheck_base_url,
        rugcheck_key,
        request_timeout,
    )?;
    let supply = RpcSupplyClient::new(&cfg.oracles.rpc_url, request_timeout)?;

    // Filter pipeline (shared retry policy across all oracle calls)
    let retry = RetryPolicy::new(
        cfg.oracles.max_attempts,
        Duration::from_millis(cfg.oracles.base_delay_ms),
        request_timeout,
    );
    let pipeline = Arc::new(FilterPipeline::new(
        Arc::new(reputation),
        Arc::new(supply),
        FilterConfig::from(&cfg.filters),
        retry,
    ));

    // Qualification sink: Telegram when configured, structured log otherwise
    let sink: Arc<dyn QualificationSink> = match telegram_sink(&cfg)? {
        Some(telegram) => {
            info!("Telegram alerts enabled");
            Arc::new(telegram)
        }
        None => {
            info!("No alert channel configured — qualifications go to the log");
            Arc::new(LogSink)
        }
    };

    // Scheduler
    let scheduler = RecheckScheduler::new(
        cache.clone(),
        pipeline.clone(),
        sink,
        SchedulerConfig {
            recheck_interval: chrono::Duration::seconds(cfg.agent.recheck_interval_secs as i64),
            extend_on_signal: chrono::Duration::seconds(cfg.agent.extend_on_signal_secs as i64),
            max_concurrent: cfg.agent.max_concurrent_checks,
        },
    );

    // Listing feed (background task)
    let feed_task = if cfg.ingestion.enabled {
        let feed = ListingFeed::new(
            &cfg.ingestion.feed_url,
            Duration::from_secs(cfg.ingestion.poll_interval_secs),
            IngestionAdapter::new(cache.clone()),
        )?;
        Some(tokio::spawn(feed.run()))
    } else {
        warn!("Ingestion disabled — only restored candidates will be evaluated");
        None
    };

    // -- Main loop ---------------------------------------------------------

    let mut interval =
        tokio::time::interval(Duration::from_secs(cfg.agent.recheck_interval_secs));
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    info!(
        interval_secs = cfg.agent.recheck_interval_secs,
        "Entering main loop. Press Ctrl+C to stop."
    );

    loop {
        tokio::select! {
            _ = interval.tick() => {
                scheduler.run_cycle().await;

                // Persist after each cycle; a failed write must not stop
                // the engine.
                if let Err(e) = cache::save_snapshot(&cache, snapshot_path.as_deref()) {
                    error!(error = %e, "Failed to save snapshot");
                }
            }
            _ = &mut shutdown => {
                info!("Shutdown signal received.");
                break;
            }
        }
    }

    if let Some(task) = feed_task {
        task.abort();
    }

    // Save final snapshot
    cache::save_snapshot(&cache, snapshot_path.as_deref())?;
    let stats = cache.stats();
    let filter_stats = pipeline.stats();
    info!(
        tracking = stats.total,
        qualified = stats.qualified,
        passed = filter_stats.passed,
        rejected_liquidity = filter_stats.liquidity,
        rejected_valuation = filter_stats.valuation,
        rejected_safety = filter_stats.safety,
        rejected_distribution = filter_stats.distribution,
        "VIGIL shut down cleanly."
    );

    Ok(())
}

/// Build the Telegram sink when both env vars are configured and set.
fn telegram_sink(cfg: &AppConfig) -> Result<Option<TelegramSink>> {
    let token_env = match cfg.alerts.telegram_bot_token_env.as_deref() {
        Some(env) => env,
        None => return Ok(None),
    };
    let chat_env = match cfg.alerts.telegram_chat_id_env.as_deref() {
        Some(env) => env,
        None => return Ok(None),
    };

    let token = match std::env::var(token_env) {
        Ok(t) if !t.is_empty() => t,
        _ => {
            warn!(env = token_env, "Telegram bot token not set — alerts disabled");
            return Ok(None);
        }
    };
    let chat_id = match std::env::var(chat_env) {
        Ok(c) if !c.is_empty() => c,
        _ => {
            warn!(env = chat_env, "Telegram chat id not set — alerts disabled");
            return Ok(None);
        }
    };

    Ok(Some(TelegramSink::new(SecretString::new(token), chat_id)?))
}

/// Initialise the `tracing` subscriber.
fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("vigil=info"));

    let json_logging = std::env::var("VIGIL_LOG_JSON").is_ok();

    if json_logging {
        fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_thread_ids(true)
            .init();
    } else {
        fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .init();
    }
}
