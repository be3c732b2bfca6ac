//! Monthly trigger loop.
//!
//! Each fire time spawns one job execution. A process-local guard refuses a trigger while the
//! previous run is still going; the `batch_run` table refuses it across processes.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tierbatch_core::batch::{BatchError, RunReport, TierRecalculationJob};
use tierbatch_core::domain::run::RunKey;
use tierbatch_core::schedule::MonthlySchedule;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

#[derive(Debug)]
pub enum TriggerOutcome {
    Completed(RunReport),
    Skipped { run_key: RunKey, reason: String },
    Failed(BatchError),
}

#[derive(Clone)]
pub struct Scheduler {
    job: TierRecalculationJob,
    schedule: MonthlySchedule,
    active: Arc<Mutex<()>>,
}

impl Scheduler {
    pub fn new(job: TierRecalculationJob, schedule: MonthlySchedule) -> Self {
        Self { job, schedule, active: Arc::new(Mutex::new(())) }
    }

    /// Resolves when no run is in progress.
    pub async fn wait_idle(&self) {
        let _idle = self.active.lock().await;
    }

    pub async fn trigger(&self, fire_at: DateTime<Utc>) -> TriggerOutcome {
        let run_key = RunKey::for_date(self.schedule.local_date(fire_at));

        let Ok(_running) = self.active.try_lock() else {
            let reason = "previous run is still in progress".to_string();
            warn!(
                event_name = "scheduler.trigger.skipped",
                run_key = %run_key,
                reason = %reason,
                "scheduled trigger skipped"
            );
            return TriggerOutcome::Skipped { run_key, reason };
        };

        info!(
            event_name = "scheduler.trigger.fired",
            run_key = %run_key,
            fire_at = %fire_at.to_rfc3339(),
            "scheduled trigger fired"
        );

        match self.job.execute(run_key.clone()).await {
            Ok(report) => TriggerOutcome::Completed(report),
            Err(
                error @ (BatchError::AlreadyCompleted { .. } | BatchError::RunInProgress { .. }),
            ) => {
                warn!(
                    event_name = "scheduler.trigger.skipped",
                    run_key = %run_key,
                    reason = %error,
                    "scheduled trigger skipped"
                );
                TriggerOutcome::Skipped { run_key, reason: error.to_string() }
            }
            Err(error) => TriggerOutcome::Failed(error),
        }
    }

    /// Sleeps until each fire time and spawns the run, until `shutdown` flips to true.
    pub fn spawn(self, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!(
                event_name = "scheduler.started",
                schedule = %self.schedule,
                "monthly scheduler started"
            );

            loop {
                let now = Utc::now();
                let Some(fire_at) = self.schedule.next_after(now) else {
                    error!(
                        event_name = "scheduler.no_fire_time",
                        schedule = %self.schedule,
                        "schedule produced no future fire time; scheduler stopping"
                    );
                    return;
                };
                info!(
                    event_name = "scheduler.next_fire",
                    fire_at = %fire_at.to_rfc3339(),
                    "next scheduled trigger computed"
                );

                let wait = (fire_at - now).to_std().unwrap_or(Duration::ZERO);
                tokio::select! {
                    _ = tokio::time::sleep(wait) => {
                        let scheduler = self.clone();
                        tokio::spawn(async move {
                            match scheduler.trigger(fire_at).await {
                                TriggerOutcome::Completed(report) => info!(
                                    event_name = "scheduler.trigger.completed",
                                    run_id = ?report.run_id,
                                    customers_processed = report.customers_processed,
                                    "scheduled run completed"
                                ),
                                TriggerOutcome::Skipped { .. } => {}
                                TriggerOutcome::Failed(error) => error!(
                                    event_name = "scheduler.trigger.failed",
                                    error_class = error.class(),
                                    error = %error,
                                    "scheduled run failed"
                                ),
                            }
                        });
                    }
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            info!(event_name = "scheduler.stopped", "monthly scheduler stopped");
                            return;
                        }
                    }
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::{DateTime, Utc};
    use rust_decimal::Decimal;
    use tierbatch_core::batch::{JobOptions, TierRecalculationJob};
    use tierbatch_core::domain::customer::{Customer, CustomerId};
    use tierbatch_core::domain::tier::{MembershipTier, TierId};
    use tierbatch_core::schedule::MonthlySchedule;
    use tierbatch_db::InMemoryMembershipStore;

    use super::{Scheduler, TriggerOutcome};

    fn ts(value: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(value).expect("valid rfc3339").with_timezone(&Utc)
    }

    async fn scheduler() -> (Scheduler, Arc<InMemoryMembershipStore>) {
        let store = Arc::new(InMemoryMembershipStore::default());
        store
            .insert_tier(MembershipTier {
                id: TierId(1),
                name: "BRONZE".to_string(),
                baseline: Decimal::ZERO,
                discount_rate: Decimal::new(1, 2),
            })
            .await;
        store
            .insert_customer(Customer {
                id: CustomerId(1),
                name: "kim".to_string(),
                monthly_purchase_amount: Decimal::from(40),
                tier_id: TierId(1),
            })
            .await;

        let job = TierRecalculationJob::new(
            store.clone(),
            store.clone(),
            store.clone(),
            JobOptions::default(),
        );
        let schedule = MonthlySchedule::parse("0 0 1 * *", "+09:00").expect("valid schedule");
        (Scheduler::new(job, schedule), store)
    }

    #[tokio::test]
    async fn trigger_runs_the_job_with_the_local_fire_date() {
        let (scheduler, _store) = scheduler().await;

        let outcome = scheduler.trigger(ts("2026-10-31T15:00:00Z")).await;

        match outcome {
            TriggerOutcome::Completed(report) => {
                assert_eq!(report.run_key.as_str(), "2026-11-01");
                assert_eq!(report.customers_processed, 1);
            }
            other => panic!("unexpected outcome {other:?}"),
        }
    }

    #[tokio::test]
    async fn overlapping_trigger_is_skipped() {
        let (scheduler, store) = scheduler().await;
        let held = scheduler.active.clone();
        let _running = held.lock().await;

        let outcome = scheduler.trigger(ts("2026-10-31T15:00:00Z")).await;

        assert!(matches!(outcome, TriggerOutcome::Skipped { .. }));
        assert!(store.runs().await.is_empty());
    }

    #[tokio::test]
    async fn repeated_trigger_for_the_same_cycle_is_skipped() {
        let (scheduler, store) = scheduler().await;

        scheduler.trigger(ts("2026-10-31T15:00:00Z")).await;
        let outcome = scheduler.trigger(ts("2026-10-31T15:00:00Z")).await;

        assert!(
            matches!(outcome, TriggerOutcome::Skipped { ref run_key, .. } if run_key.as_str() == "2026-11-01")
        );
        assert_eq!(store.runs().await.len(), 1);
    }

    #[tokio::test]
    async fn spawned_loop_stops_on_shutdown_signal() {
        let (scheduler, _store) = scheduler().await;
        let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);

        let handle = scheduler.spawn(shutdown_rx);
        shutdown_tx.send(true).expect("scheduler is listening");

        tokio::time::timeout(std::time::Duration::from_secs(5), handle)
            .await
            .expect("scheduler should stop promptly")
            .expect("scheduler task should not panic");
    }
}
