//! Periodic refresh of every city's reading.
//!
//! [`RefreshScheduler::run_refresh_pass`] is the single entry point for both
//! the timer loop and manual admin triggers. At most one pass runs at a time;
//! a trigger that arrives while a pass is in flight is dropped and reported as
//! [`PassOutcome::Skipped`].

use chrono::Utc;
use common::errors::{AppError, FetchError};
use common::models::{Coordinates, Entity, PassOutcome, RefreshStatus, RefreshSummary};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::{RwLock, Semaphore};
use tokio::time::{MissedTickBehavior, timeout};
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, Span, debug, error, info, instrument, warn};

use crate::api_client::WeatherSource;
use crate::directory::EntityDirectory;
use crate::store::ReadingStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EntityOutcome {
    Stored,
    Failed,
    Cancelled,
}

/// Returns the scheduler to Idle when the pass task finishes. Owned by that
/// task, never by the caller, so Running lasts as long as any fetch of the pass.
struct PassGuard(Arc<SchedulerInner>);

impl Drop for PassGuard {
    fn drop(&mut self) {
        self.0.running.store(false, Ordering::Release);
    }
}

struct SchedulerInner {
    directory: Arc<dyn EntityDirectory>,
    source: Arc<dyn WeatherSource>,
    store: Arc<dyn ReadingStore>,
    semaphore: Arc<Semaphore>,
    fetch_timeout: Duration,
    cancellation_token: CancellationToken,
    running: AtomicBool,
    pass_counter: AtomicU64,
    last_summary: RwLock<Option<RefreshSummary>>,
}

pub struct RefreshScheduler {
    inner: Arc<SchedulerInner>,
}

impl RefreshScheduler {
    pub fn new(
        directory: Arc<dyn EntityDirectory>,
        source: Arc<dyn WeatherSource>,
        store: Arc<dyn ReadingStore>,
        concurrency: usize,
        fetch_timeout: Duration,
        cancellation_token: CancellationToken,
    ) -> Self {
        Self {
            inner: Arc::new(SchedulerInner {
                directory,
                source,
                store,
                semaphore: Arc::new(Semaphore::new(concurrency.max(1))),
                fetch_timeout,
                cancellation_token,
                running: AtomicBool::new(false),
                pass_counter: AtomicU64::new(0),
                last_summary: RwLock::new(None),
            }),
        }
    }

    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::Acquire)
    }

    pub async fn status(&self) -> RefreshStatus {
        RefreshStatus {
            running: self.is_running(),
            last_pass: self.inner.last_summary.read().await.clone(),
        }
    }

    fn try_begin(&self) -> Option<PassGuard> {
        self.inner
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| PassGuard(self.inner.clone()))
    }

    /// Refresh every city with complete coordinates.
    ///
    /// The pass runs on its own task: a caller that stops waiting (a dropped
    /// admin request, say) leaves it running to completion, and triggers
    /// keep being skipped until it is done.
    ///
    /// Returns `Err` only when the directory cannot be listed; individual
    /// fetch or store failures are logged and counted in the summary.
    #[instrument(skip(self), fields(pass_id = tracing::field::Empty))]
    pub async fn run_refresh_pass(&self) -> Result<PassOutcome, AppError> {
        let Some(guard) = self.try_begin() else {
            info!("Refresh pass already running, trigger dropped");
            return Ok(PassOutcome::Skipped);
        };

        let pass_id = self.inner.pass_counter.fetch_add(1, Ordering::Relaxed) + 1;
        Span::current().record("pass_id", pass_id);

        let pass = tokio::spawn(
            async move {
                let result = guard.0.execute_pass(pass_id).await;
                drop(guard);
                result
            }
            .in_current_span(),
        );

        match pass.await {
            Ok(result) => result,
            Err(e) => {
                error!(error = %e, "Refresh pass task failed");
                Err(AppError::internal(format!("refresh pass task failed: {}", e)))
            }
        }
    }

    /// Run a pass every `interval` until the cancellation token fires.
    pub async fn run(&self, interval: Duration, run_immediately: bool) {
        info!(
            interval_secs = interval.as_secs(),
            run_immediately, "Refresh scheduler started"
        );

        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        if !run_immediately {
            // The first tick completes immediately
            ticker.tick().await;
        }

        loop {
            tokio::select! {
                _ = self.inner.cancellation_token.cancelled() => {
                    info!("Refresh scheduler stopping");
                    break;
                }
                _ = ticker.tick() => {
                    if let Err(e) = self.run_refresh_pass().await {
                        error!(error = %e, "Refresh pass failed");
                    }
                }
            }
        }
    }
}

impl SchedulerInner {
    async fn execute_pass(&self, pass_id: u64) -> Result<PassOutcome, AppError> {
        let started_at = Utc::now();

        let entities = self.directory.list_entities().await?;
        let total_entities = entities.len();

        let mut eligible = Vec::with_capacity(total_entities);
        let mut skipped_missing_coordinates = 0;
        for entity in entities {
            match entity.coordinates() {
                Some(coordinates) => eligible.push((entity, coordinates)),
                None => {
                    debug!(city_id = %entity.id, city = %entity.name, "Skipping city without coordinates");
                    skipped_missing_coordinates += 1;
                }
            }
        }

        info!(
            total = total_entities,
            eligible = eligible.len(),
            skipped = skipped_missing_coordinates,
            "Starting refresh pass"
        );

        let mut handles = Vec::with_capacity(eligible.len());

        for (entity, coordinates) in eligible {
            let semaphore = self.semaphore.clone();
            let source = self.source.clone();
            let store = self.store.clone();
            let cancel = self.cancellation_token.clone();
            let fetch_timeout = self.fetch_timeout;

            let handle = tokio::spawn(
                async move {
                    if cancel.is_cancelled() {
                        return EntityOutcome::Cancelled;
                    }

                    // Queues here once `concurrency` fetches are in flight
                    let _permit = match semaphore.acquire().await {
                        Ok(p) => p,
                        Err(_) => return EntityOutcome::Cancelled,
                    };

                    tokio::select! {
                        outcome = refresh_entity(&entity, coordinates, source.as_ref(), store.as_ref(), fetch_timeout) => outcome,
                        _ = cancel.cancelled() => EntityOutcome::Cancelled,
                    }
                }
                .in_current_span(),
            );

            handles.push(handle);
        }

        let mut succeeded = 0;
        let mut failed = 0;
        let mut cancelled = 0;

        for handle in handles {
            match handle.await {
                Ok(EntityOutcome::Stored) => succeeded += 1,
                Ok(EntityOutcome::Failed) => failed += 1,
                Ok(EntityOutcome::Cancelled) => cancelled += 1,
                Err(e) => {
                    error!(error = %e, "Refresh task join error");
                    failed += 1;
                }
            }
        }

        let summary = RefreshSummary {
            pass_id,
            started_at,
            finished_at: Utc::now(),
            total_entities,
            skipped_missing_coordinates,
            succeeded,
            failed,
            cancelled,
        };

        info!(succeeded, failed, cancelled, "Refresh pass completed");

        *self.last_summary.write().await = Some(summary.clone());
        Ok(PassOutcome::Completed(summary))
    }
}

#[instrument(skip_all, fields(city_id = %entity.id, city = %entity.name))]
async fn refresh_entity(
    entity: &Entity,
    coordinates: Coordinates,
    source: &dyn WeatherSource,
    store: &dyn ReadingStore,
    fetch_timeout: Duration,
) -> EntityOutcome {
    let observation = match timeout(fetch_timeout, source.fetch(coordinates)).await {
        Ok(Ok(observation)) => observation,
        Ok(Err(FetchError::RateLimited { retry_after_secs })) => {
            warn!(?retry_after_secs, "Weather source rate limited this fetch");
            return EntityOutcome::Failed;
        }
        Ok(Err(e)) => {
            warn!(error = %e, "Weather fetch failed");
            return EntityOutcome::Failed;
        }
        Err(_) => {
            warn!(
                timeout_ms = fetch_timeout.as_millis() as u64,
                "Weather fetch timed out"
            );
            return EntityOutcome::Failed;
        }
    };

    match store.upsert(entity.id, observation).await {
        Ok(reading) => {
            debug!(
                temperature_c = reading.temperature_c,
                humidity = reading.humidity,
                "Reading stored"
            );
            EntityOutcome::Stored
        }
        Err(e) => {
            error!(error = %e, "Failed to store reading");
            EntityOutcome::Failed
        }
    }
}
