//! Recheck scheduler: drives one evaluation cycle end to end.
//!
//! A cycle takes a point-in-time snapshot of due candidates, evaluates
//! them through the filter pipeline with bounded concurrency, then applies
//! every outcome back to the cache sequentially. Verdicts from a stale
//! snapshot are reconciled by the cache itself, which rejects outcomes for
//! records that left a trackable state in the meantime. Purging runs last,
//! so an extension granted earlier in the same cycle always protects its
//! candidate.

use futures::stream::{self, StreamExt};
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::cache::LifecycleCache;
use crate::filters::FilterPipeline;
use crate::notify::QualificationSink;
use crate::types::FilterVerdict;

#[derive(Debug, Clone, Copy)]
pub struct SchedulerConfig {
    /// Minimum age of the previous check before a candidate is due again.
    pub recheck_interval: chrono::Duration,
    /// Lifetime extension granted on a passing evaluation.
    pub extend_on_signal: chrono::Duration,
    /// Concurrent pipeline evaluations per cycle.
    pub max_concurrent: usize,
}

/// Accounting for one cycle, logged at cycle end.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub due: usize,
    pub passed: usize,
    pub failed: usize,
    pub errored: usize,
    pub qualified: usize,
    pub purged: usize,
}

pub struct RecheckScheduler {
    cache: Arc<LifecycleCache>,
    pipeline: Arc<FilterPipeline>,
    sink: Arc<dyn QualificationSink>,
    cfg: SchedulerConfig,
}

impl RecheckScheduler {
    pub fn new(
        cache: Arc<LifecycleCache>,
        pipeline: Arc<FilterPipeline>,
        sink: Arc<dyn QualificationSink>,
        cfg: SchedulerConfig,
    ) -> Self {
        Self {
            cache,
            pipeline,
            sink,
            cfg,
        }
    }

    /// Run one full cycle: evaluate due candidates, apply outcomes, purge.
    pub async fn run_cycle(&self) -> CycleReport {
        let due = self.cache.due_for_recheck(self.cfg.recheck_interval);
        let mut report = CycleReport {
            due: due.len(),
            ..Default::default()
        };

        // Fan out the evaluations; oracle backoff sleeps overlap instead
        // of serialising the whole cycle.
        let verdicts: Vec<(String, FilterVerdict)> = stream::iter(due)
            .map(|candidate| {
                let pipeline = self.pipeline.clone();
                async move {
                    let verdict = pipeline.evaluate(&candidate).await;
                    (candidate.address, verdict)
                }
            })
            .buffer_unordered(self.cfg.max_concurrent)
            .collect()
            .await;

        for (address, verdict) in verdicts {
            if let Err(e) =
                self.cache
                    .record_outcome(&address, &verdict, self.cfg.extend_on_signal)
            {
                // The record changed state or vanished since the snapshot.
                warn!(%address, error = %e, "Dropping stale evaluation outcome");
                report.errored += 1;
                continue;
            }

            if verdict.passed {
                report.passed += 1;
                self.qualify(&address, &mut report).await;
            } else {
                report.failed += 1;
            }
        }

        let purged = self.cache.purge_expired();
        report.purged = purged.len();

        let stats = self.cache.stats();
        info!(
            due = report.due,
            passed = report.passed,
            failed = report.failed,
            errored = report.errored,
            qualified = report.qualified,
            purged = report.purged,
            tracking = stats.total,
            total_qualified = stats.qualified,
            "Cycle complete"
        );
        report
    }

    /// Promote a passing candidate and notify the sink on the first
    /// promotion only. Sink failures are logged, never retried: the
    /// promotion stands and a retry on a later cycle would re-alert.
    async fn qualify(&self, address: &str, report: &mut CycleReport) {
        match self.cache.promote_to_qualified(address) {
            Ok(true) => {
                report.qualified += 1;
                if let Some(candidate) = self.cache.get(address) {
                    if let Err(e) = self.sink.notify_qualified(&candidate).await {
                        error!(
                            address,
                            sink = self.sink.name(),
                            error = %e,
                            "Qualification alert delivery failed"
                        );
                    }
                }
            }
            Ok(false) => {}
            Err(e) => {
                warn!(address, error = %e, "Promotion failed");
                report.errored += 1;
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filters::FilterConfig;
    use crate::oracle::retry::RetryPolicy;
    use crate::oracle::{HolderBalance, MockReputationOracle, MockSupplyOracle, SafetyReport};
    use crate::types::{CandidateState, TokenMetadata};
    use anyhow::Result;
    use async_trait::async_trait;
    use chrono::Duration as ChronoDuration;
    use rust_decimal_macros::dec;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct CountingSink {
        notified: AtomicUsize,
    }

    #[async_trait]
    impl QualificationSink for CountingSink {
        async fn notify_qualified(&self, _candidate: &crate::types::CandidateToken) -> Result<()> {
            self.notified.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn name(&self) -> &str {
            "counting"
        }
    }

    fn test_filter_config() -> FilterConfig {
        FilterConfig {
            min_liquidity_usd: dec!(20_000),
            min_fdv_usd: dec!(10_000),
            max_fdv_usd: dec!(500_000),
            top_holder_ceiling_bps: 500,
            top_holder_ceiling_bps_new: 8000,
            young_candidate_age: ChronoDuration::seconds(300),
        }
    }

    fn scheduler_with(
        reputation: MockReputationOracle,
        supply: MockSupplyOracle,
        ttl: ChronoDuration,
    ) -> (Arc<LifecycleCache>, Arc<CountingSink>, RecheckScheduler) {
        let cache = Arc::new(LifecycleCache::new(ttl));
        let sink = Arc::new(CountingSink {
            notified: AtomicUsize::new(0),
        });
        let pipeline = Arc::new(FilterPipeline::new(
            Arc::new(reputation),
            Arc::new(supply),
            test_filter_config(),
            RetryPolicy::new(1, Duration::from_millis(1), Duration::from_millis(200)),
        ));
        let scheduler = RecheckScheduler::new(
            cache.clone(),
            pipeline,
            sink.clone(),
            SchedulerConfig {
                recheck_interval: ChronoDuration::zero(),
                extend_on_signal: ChronoDuration::hours(1),
                max_concurrent: 4,
            },
        );
        (cache, sink, scheduler)
    }

    fn passing_oracles() -> (MockReputationOracle, MockSupplyOracle) {
        let mut reputation = MockReputationOracle::new();
        reputation.expect_safety_report().returning(|_| {
            Ok(SafetyReport {
                result: "safe".to_string(),
                ..SafetyReport::default()
            })
        });
        let mut supply = MockSupplyOracle::new();
        supply.expect_total_supply().returning(|_| Ok(1_000_000));
        supply
            .expect_largest_holders()
            .returning(|_| Ok(vec![HolderBalance { amount: 3_000 }; 10]));
        (reputation, supply)
    }

    #[tokio::test]
    async fn test_passing_candidate_qualifies_and_notifies_once() {
        let (reputation, supply) = passing_oracles();
        let (cache, sink, scheduler) = scheduler_with(reputation, supply, ChronoDuration::hours(3));
        cache.insert_if_new("addr1", TokenMetadata::sample());

        let report = scheduler.run_cycle().await;
        assert_eq!(report.due, 1);
        assert_eq!(report.passed, 1);
        assert_eq!(report.qualified, 1);
        assert_eq!(sink.notified.load(Ordering::SeqCst), 1);
        assert_eq!(
            cache.get("addr1").unwrap().state,
            CandidateState::Qualified
        );

        // A second cycle must not re-evaluate or re-notify.
        let report = scheduler.run_cycle().await;
        assert_eq!(report.due, 0);
        assert_eq!(sink.notified.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failing_candidate_retried_next_cycle() {
        let (cache, sink, scheduler) = scheduler_with(
            MockReputationOracle::new(),
            MockSupplyOracle::new(),
            ChronoDuration::hours(3),
        );
        let mut meta = TokenMetadata::sample();
        meta.liquidity_usd = dec!(100);
        cache.insert_if_new("addr1", meta);

        let report = scheduler.run_cycle().await;
        assert_eq!(report.failed, 1);
        assert_eq!(report.qualified, 0);
        assert_eq!(sink.notified.load(Ordering::SeqCst), 0);

        let c = cache.get("addr1").unwrap();
        assert_eq!(c.state, CandidateState::Filtered);

        // Zero recheck interval: still due, still failing, still tracked.
        let report = scheduler.run_cycle().await;
        assert_eq!(report.due, 1);
        assert_eq!(report.failed, 1);
        assert_eq!(cache.get("addr1").unwrap().retry_count, 2);
    }

    #[tokio::test]
    async fn test_expired_candidate_purged_at_cycle_end() {
        let (cache, _sink, scheduler) = scheduler_with(
            MockReputationOracle::new(),
            MockSupplyOracle::new(),
            ChronoDuration::zero(),
        );
        let mut meta = TokenMetadata::sample();
        meta.liquidity_usd = dec!(100);
        cache.insert_if_new("addr1", meta);

        let report = scheduler.run_cycle().await;
        assert_eq!(report.failed, 1);
        assert_eq!(report.purged, 1);
        assert!(cache.get("addr1").is_none());
    }

    #[tokio::test]
    async fn test_passing_candidate_survives_expiry() {
        // TTL already elapsed, but the pass inside the cycle extends the
        // window before purging runs.
        let (reputation, supply) = passing_oracles();
        let (cache, _sink, scheduler) = scheduler_with(reputation, supply, ChronoDuration::zero());
        cache.insert_if_new("addr1", TokenMetadata::sample());

        let report = scheduler.run_cycle().await;
        assert_eq!(report.passed, 1);
        assert_eq!(report.purged, 0);
        assert!(cache.get("addr1").is_some());
    }

    #[tokio::test]
    async fn test_mixed_batch_accounting() {
        let (reputation, supply) = passing_oracles();
        let (cache, sink, scheduler) = scheduler_with(reputation, supply, ChronoDuration::hours(3));

        cache.insert_if_new("good", TokenMetadata::sample());
        let mut thin = TokenMetadata::sample();
        thin.liquidity_usd = dec!(100);
        cache.insert_if_new("thin", thin);
        let mut bloated = TokenMetadata::sample();
        bloated.fdv_usd = dec!(9_000_000);
        cache.insert_if_new("bloated", bloated);

        let report = scheduler.run_cycle().await;
        assert_eq!(report.due, 3);
        assert_eq!(report.passed, 1);
        assert_eq!(report.failed, 2);
        assert_eq!(report.qualified, 1);
        assert_eq!(sink.notified.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_sink_failure_does_not_undo_promotion() {
        struct FailingSink;

        #[async_trait]
        impl QualificationSink for FailingSink {
            async fn notify_qualified(
                &self,
                _candidate: &crate::types::CandidateToken,
            ) -> Result<()> {
                anyhow::bail!("delivery refused")
            }

            fn name(&self) -> &str {
                "failing"
            }
        }

        let (reputation, supply) = passing_oracles();
        let cache = Arc::new(LifecycleCache::new(ChronoDuration::hours(3)));
        let pipeline = Arc::new(FilterPipeline::new(
            Arc::new(reputation),
            Arc::new(supply),
            test_filter_config(),
            RetryPolicy::new(1, Duration::from_millis(1), Duration::from_millis(200)),
        ));
        let scheduler = RecheckScheduler::new(
            cache.clone(),
            pipeline,
            Arc::new(FailingSink),
            SchedulerConfig {
                recheck_interval: ChronoDuration::zero(),
                extend_on_signal: ChronoDuration::hours(1),
                max_concurrent: 4,
            },
        );
        cache.insert_if_new("addr1", TokenMetadata::sample());

        let report = scheduler.run_cycle().await;
        assert_eq!(report.qualified, 1);
        assert_eq!(
            cache.get("addr1").unwrap().state,
            CandidateState::Qualified
        );

        // Never re-notified, even though delivery failed.
        let report = scheduler.run_cycle().await;
        assert_eq!(report.due, 0);
        assert_eq!(report.qualified, 0);
    }
}
