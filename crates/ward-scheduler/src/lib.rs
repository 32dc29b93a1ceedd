//! A single background loop per process, coordinating job execution
//! across all processes through the object store's advisory locks. Many
//! instances can register the same job id; at most one instance runs it
//! at a time, gated by a single advisory-lock row per job, since jobs are
//! registered in-process rather than enqueued as rows a worker pulls
//! from a shared queue.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::FutureExt;
use tokio::sync::Mutex;
use ward_types::Key;

#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    #[error(transparent)]
    Store(#[from] ward_store::StoreError),
}

/// The persisted half of a job: everything needed to recreate its
/// schedule after a process restart. The executable closure never
/// round-trips through storage: records discovered only in the store
/// (via `sync_from_store`) are tracked with `func = None`.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct JobRecord {
    pub id: String,
    pub tenant: String,
    pub next_run_at: DateTime<Utc>,
    /// Seconds. `<= 0` is invalid; such a job runs once and is then
    /// parked far in the future rather than looping on zero advancement.
    pub repeat_every_seconds: i64,
    pub description: String,
}

impl JobRecord {
    fn repeat_every(&self) -> Option<chrono::Duration> {
        if self.repeat_every_seconds <= 0 {
            None
        } else {
            Some(chrono::Duration::seconds(self.repeat_every_seconds))
        }
    }
}

pub type JobFn<Ctx> = Arc<dyn Fn(Ctx) -> futures::future::BoxFuture<'static, Result<(), anyhow::Error>> + Send + Sync>;

struct Job<Ctx> {
    record: JobRecord,
    func: Option<JobFn<Ctx>>,
}

/// Coordinates job execution across instances through `store`'s advisory
/// locks. `Ctx` is the request-scoped carrier passed to job closures; a
/// fresh `Ctx::default()` is built for each execution and for each store
/// call the scheduler itself makes.
pub struct Scheduler<Ctx> {
    jobs: Mutex<HashMap<String, HashMap<String, Job<Ctx>>>>,
    store: ward_store::ObjectStore<JobRecord, Ctx>,
    wake: Arc<tokio::sync::Notify>,
    cancelled: Arc<AtomicBool>,
}

impl<Ctx> Scheduler<Ctx>
where
    Ctx: Default + Clone + Send + Sync + 'static,
{
    pub fn new(store: ward_store::ObjectStore<JobRecord, Ctx>) -> Self {
        Self {
            jobs: Mutex::new(HashMap::new()),
            store,
            wake: Arc::new(tokio::sync::Notify::new()),
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Registers a job locally and persists its initial schedule.
    /// Nudges the background loop via the capacity-1 wake channel.
    #[tracing::instrument(skip(self, func))]
    pub async fn register(
        &self,
        tenant: &str,
        id: &str,
        next_run_at: DateTime<Utc>,
        repeat_every_seconds: i64,
        description: &str,
        func: JobFn<Ctx>,
    ) -> Result<(), SchedulerError> {
        let record = JobRecord {
            id: id.to_string(),
            tenant: tenant.to_string(),
            next_run_at,
            repeat_every_seconds,
            description: description.to_string(),
        };

        self.store
            .upsert(&Ctx::default(), "scheduler", &Key::new(id, tenant), &record)
            .await?;

        {
            let mut jobs = self.jobs.lock().await;
            jobs.entry(tenant.to_string()).or_default().insert(
                id.to_string(),
                Job {
                    record,
                    func: Some(func),
                },
            );
        }

        self.wake.notify_one();
        Ok(())
    }

    /// Removes a job's in-memory entry and its persisted row. A job
    /// already running under its advisory lock finishes that run; it is
    /// simply not found in `jobs` when it would next be scheduled.
    #[tracing::instrument(skip(self))]
    pub async fn unregister(&self, tenant: &str, id: &str) -> Result<(), SchedulerError> {
        self.store
            .delete(&Ctx::default(), "scheduler", &Key::new(id, tenant))
            .await?;

        let mut jobs = self.jobs.lock().await;
        if let Some(tenant_jobs) = jobs.get_mut(tenant) {
            tenant_jobs.remove(id);
        }

        Ok(())
    }

    /// Merges persisted rows for every locally known tenant into memory,
    /// preserving each job's `fn`. Tenants unknown locally are not
    /// discovered.
    #[tracing::instrument(skip(self))]
    pub async fn sync_from_store(&self) {
        let tenants: Vec<String> = {
            let jobs = self.jobs.lock().await;
            jobs.keys().cloned().collect()
        };

        for tenant in tenants {
            let predicate = ward_query::Where::new().key("tenant").equals().value(tenant.clone());
            let rows = match self.store.select(&Ctx::default(), &predicate).await {
                Ok(rows) => rows,
                Err(err) => {
                    tracing::warn!(?tenant, ?err, "failed to sync jobs for tenant (will retry next cycle)");
                    continue;
                }
            };

            let mut jobs = self.jobs.lock().await;
            let tenant_jobs = jobs.entry(tenant).or_default();
            for (_id, record, _metadata) in rows {
                match tenant_jobs.get_mut(&record.id) {
                    Some(existing) => existing.record = record,
                    None => {
                        let id = record.id.clone();
                        tenant_jobs.insert(id, Job { record, func: None });
                    }
                }
            }
        }
    }

    /// Phase 1: snapshot due, executable jobs and run each under the
    /// store's advisory lock, recovering from panics. Phase 2: report
    /// the earliest still-future `next_run_at` to sleep until.
    #[tracing::instrument(skip(self))]
    pub async fn execute_due_and_schedule_next(&self) -> Option<DateTime<Utc>> {
        let now = Utc::now();

        let due: Vec<(String, JobRecord, JobFn<Ctx>)> = {
            let jobs = self.jobs.lock().await;
            jobs.values()
                .flat_map(|tenant_jobs| tenant_jobs.values())
                .filter(|job| job.record.next_run_at <= now && job.func.is_some())
                .map(|job| (job.record.tenant.clone(), job.record.clone(), job.func.clone().unwrap()))
                .collect()
        };

        for (tenant, record, func) in due {
            let key = Key::new(record.id.as_str(), tenant.as_str());
            let handle = match self.store.lock(&Ctx::default(), &key, "scheduler: executing").await {
                Ok(Some(handle)) => handle,
                Ok(None) => continue, // contention: another instance is running this job
                Err(err) => {
                    tracing::warn!(job = %record.id, ?err, "failed to acquire scheduler lock");
                    continue;
                }
            };

            let outcome = std::panic::AssertUnwindSafe(func(Ctx::default())).catch_unwind().await;
            match outcome {
                Ok(Ok(())) => {}
                Ok(Err(err)) => tracing::error!(job = %record.id, ?err, "job function returned an error"),
                Err(_panic) => tracing::error!(job = %record.id, "job function panicked"),
            }

            let advanced = self.advance(&tenant, &record, now).await;
            if let Err(err) = advanced {
                tracing::warn!(job = %record.id, ?err, "failed to persist advanced schedule");
            }

            if let Err(err) = self.store.unlock(&Ctx::default(), handle).await {
                tracing::warn!(job = %record.id, ?err, "failed to release scheduler lock");
            }
        }

        let jobs = self.jobs.lock().await;
        jobs.values()
            .flat_map(|tenant_jobs| tenant_jobs.values())
            .map(|job| job.record.next_run_at)
            .filter(|at| *at > now)
            .min()
    }

    async fn advance(&self, tenant: &str, record: &JobRecord, now: DateTime<Utc>) -> Result<(), SchedulerError> {
        let next_run_at = match record.repeat_every() {
            Some(repeat_every) => {
                let mut next = record.next_run_at;
                loop {
                    next += repeat_every;
                    if next > now {
                        break next;
                    }
                }
            }
            None => {
                tracing::error!(job = %record.id, "repeat_every_seconds <= 0; job will not run again");
                DateTime::<Utc>::MAX_UTC
            }
        };

        let mut updated = record.clone();
        updated.next_run_at = next_run_at;

        {
            let mut jobs = self.jobs.lock().await;
            if let Some(job) = jobs.get_mut(tenant).and_then(|t| t.get_mut(&record.id)) {
                job.record.next_run_at = next_run_at;
            }
        }

        self.store
            .update(&Ctx::default(), "scheduler", &Key::new(record.id.as_str(), tenant), &updated)
            .await?;
        Ok(())
    }

    /// Runs until [`Scheduler::cancel`] is called: a `tokio::select!`
    /// between the scheduling timer and the wake/cancel signal.
    pub async fn run(&self, sync_interval: Duration) {
        let mut last_sync: Option<tokio::time::Instant> = None;

        loop {
            if self.cancelled.load(Ordering::SeqCst) {
                tracing::info!("scheduler loop cancelled");
                return;
            }

            let now = tokio::time::Instant::now();
            if last_sync.map_or(true, |t| now.duration_since(t) >= sync_interval) {
                self.sync_from_store().await;
                last_sync = Some(now);
            }

            let next_wake = self.execute_due_and_schedule_next().await;
            let sleep_for = self.sleep_duration(next_wake, sync_interval, last_sync, now);

            tokio::select! {
                _ = tokio::time::sleep(sleep_for) => {}
                _ = self.wake.notified() => {}
            }
        }
    }

    fn sleep_duration(
        &self,
        next_wake: Option<DateTime<Utc>>,
        sync_interval: Duration,
        last_sync: Option<tokio::time::Instant>,
        now: tokio::time::Instant,
    ) -> Duration {
        let time_to_sync = last_sync
            .map(|t| sync_interval.saturating_sub(now.duration_since(t)))
            .unwrap_or(Duration::ZERO);

        let time_to_wake = next_wake
            .map(|at| (at - Utc::now()).to_std().unwrap_or(Duration::ZERO))
            .unwrap_or(sync_interval);

        time_to_sync.min(time_to_wake).max(Duration::from_secs(1))
    }

    /// Signals the background loop; it exits at its next wait point.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        self.wake.notify_waiters();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repeat_every_rejects_non_positive_seconds() {
        let record = JobRecord {
            id: "j".into(),
            tenant: "t".into(),
            next_run_at: Utc::now(),
            repeat_every_seconds: 0,
            description: String::new(),
        };
        assert!(record.repeat_every().is_none());

        let record = JobRecord { repeat_every_seconds: -5, ..record };
        assert!(record.repeat_every().is_none());
    }

    #[test]
    fn repeat_every_converts_positive_seconds() {
        let record = JobRecord {
            id: "j".into(),
            tenant: "t".into(),
            next_run_at: Utc::now(),
            repeat_every_seconds: 60,
            description: String::new(),
        };
        assert_eq!(record.repeat_every(), Some(chrono::Duration::seconds(60)));
    }

    #[tokio::test]
    async fn sleep_duration_never_drops_below_one_second() {
        let sync_interval = Duration::from_secs(60);
        // Construct the scheduler only to call the pure `sleep_duration` helper;
        // no store calls happen in this test.
        let pool = sqlx::postgres::PgPoolOptions::new()
            .connect_lazy("postgres://localhost/ward_test")
            .unwrap();
        let router = ward_shard::Router::new(vec![pool]).unwrap();
        let store = ward_store::ObjectStore::new("job", router);
        let scheduler: Scheduler<()> = Scheduler::new(store);

        let now = tokio::time::Instant::now();
        let sleep = scheduler.sleep_duration(Some(Utc::now()), sync_interval, None, now);
        assert!(sleep >= Duration::from_secs(1));
    }
}
