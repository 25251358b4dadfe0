//! Refresh cycles: fetch a market snapshot, score every asset for every
//! period, commit the result as one generation.
//!
//! At most one cycle is in flight per orchestrator (single-slot mutex), and per
//! store (writer lease). A trigger that finds the slot taken is coalesced.

pub mod error;
pub mod scheduler;
pub mod state;

use crate::domain::period::Period;
use crate::domain::ranking::{Generation, GenerationMeta};
use crate::ingest::provider::MarketSnapshotProvider;
use crate::refresh::error::RefreshError;
use crate::refresh::state::{LastFailure, LastSuccess, RefreshPhase, RefreshStatus};
use crate::scoring::ranking::build_generation;
use crate::storage::RankingStore;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tokio::sync::OwnedMutexGuard;
use uuid::Uuid;

const DEFAULT_UNIVERSE_SIZE: usize = 100;
const DEFAULT_REFRESH_INTERVAL_SECS: u64 = 300;

#[derive(Debug, Clone)]
pub struct RefreshOptions {
    /// Top-N assets by market cap to fetch each cycle.
    pub universe_size: usize,

    /// Scheduled refresh period; `None` disables the schedule.
    pub interval: Option<Duration>,
}

impl Default for RefreshOptions {
    fn default() -> Self {
        Self {
            universe_size: DEFAULT_UNIVERSE_SIZE,
            interval: Some(Duration::from_secs(DEFAULT_REFRESH_INTERVAL_SECS)),
        }
    }
}

impl RefreshOptions {
    pub fn from_env() -> Self {
        let mut out = Self::default();

        if let Ok(s) = std::env::var("UNIVERSE_SIZE") {
            if let Ok(n) = s.parse::<usize>() {
                out.universe_size = n;
            }
        }

        if let Ok(s) = std::env::var("REFRESH_INTERVAL_SECS") {
            if let Ok(n) = s.parse::<u64>() {
                out.interval = (n > 0).then_some(Duration::from_secs(n));
            }
        }

        out
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerOutcome {
    Started,
    AlreadyRunning,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleReport {
    pub generation: GenerationMeta,
    pub elapsed: Duration,
}

#[derive(Clone)]
pub struct RefreshOrchestrator {
    inner: Arc<Inner>,
}

struct Inner {
    provider: Arc<dyn MarketSnapshotProvider>,
    store: Arc<dyn RankingStore>,
    options: RefreshOptions,
    slot: Arc<tokio::sync::Mutex<()>>,
    status: Mutex<RefreshStatus>,
}

impl RefreshOrchestrator {
    pub fn new(
        provider: Arc<dyn MarketSnapshotProvider>,
        store: Arc<dyn RankingStore>,
        options: RefreshOptions,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                provider,
                store,
                options,
                slot: Arc::new(tokio::sync::Mutex::new(())),
                status: Mutex::new(RefreshStatus::default()),
            }),
        }
    }

    pub fn store(&self) -> &Arc<dyn RankingStore> {
        &self.inner.store
    }

    pub fn options(&self) -> &RefreshOptions {
        &self.inner.options
    }

    pub fn status(&self) -> RefreshStatus {
        self.lock_status().clone()
    }

    /// Launches a cycle in the background unless one is already in flight.
    pub fn trigger(&self) -> TriggerOutcome {
        let Ok(slot) = self.inner.slot.clone().try_lock_owned() else {
            tracing::debug!("refresh trigger coalesced into running cycle");
            return TriggerOutcome::AlreadyRunning;
        };

        let this = self.clone();
        tokio::spawn(async move {
            // Outcome is logged and recorded in the status by the cycle itself.
            let _ = this.run_with_slot(slot).await;
        });
        TriggerOutcome::Started
    }

    /// Runs one cycle to completion on the caller's task.
    pub async fn run_cycle(&self) -> Result<CycleReport, RefreshError> {
        let slot = self
            .inner
            .slot
            .clone()
            .try_lock_owned()
            .map_err(|_| RefreshError::Busy)?;
        self.run_with_slot(slot).await
    }

    /// Fetches and scores without committing anything.
    pub async fn preview(&self) -> Result<Generation, RefreshError> {
        let assets = self
            .inner
            .provider
            .fetch_snapshot(self.inner.options.universe_size, &Period::ALL)
            .await
            .map_err(RefreshError::Acquisition)?;
        Ok(build_generation(Uuid::new_v4(), Utc::now(), &assets))
    }

    async fn run_with_slot(&self, _slot: OwnedMutexGuard<()>) -> Result<CycleReport, RefreshError> {
        let lease = match self.inner.store.try_acquire_writer().await {
            Ok(Some(lease)) => lease,
            Ok(None) => {
                tracing::warn!(
                    store = self.inner.store.backend_name(),
                    "refresh writer lease held elsewhere; skipping cycle"
                );
                return Err(RefreshError::Busy);
            }
            Err(e) => {
                let err = RefreshError::Persistence(e);
                self.record_failed_cycle(Utc::now(), &err);
                tracing::error!(error = %err, "refresh writer lease unavailable");
                return Err(err);
            }
        };

        let res = self.run_locked().await;
        lease.release().await;
        res
    }

    async fn run_locked(&self) -> Result<CycleReport, RefreshError> {
        let t0 = Instant::now();
        let started_at = Utc::now();
        {
            let mut status = self.lock_status();
            transition(&mut status, RefreshPhase::Fetching);
            status.cycle_started_at = Some(started_at);
        }
        tracing::info!(
            provider = self.inner.provider.provider_name(),
            universe_size = self.inner.options.universe_size,
            "refresh cycle started"
        );

        let assets = match self
            .inner
            .provider
            .fetch_snapshot(self.inner.options.universe_size, &Period::ALL)
            .await
        {
            Ok(assets) => assets,
            Err(e) => return Err(self.fail(started_at, RefreshError::Acquisition(e)).await),
        };
        let generated_at = Utc::now();

        let uncovered: Vec<&str> = Period::ALL
            .into_iter()
            .filter(|p| assets.iter().all(|a| a.change(*p).is_none()))
            .map(Period::id)
            .collect();
        if !uncovered.is_empty() {
            tracing::warn!(periods = ?uncovered, "no asset reported these periods; their rankings carry missing-data scores");
        }

        transition(&mut self.lock_status(), RefreshPhase::Scoring);
        let generation = build_generation(Uuid::new_v4(), generated_at, &assets);

        transition(&mut self.lock_status(), RefreshPhase::Persisting);
        if let Err(e) = self.inner.store.commit_generation(&generation).await {
            return Err(self.fail(started_at, RefreshError::Persistence(e)).await);
        }

        {
            let mut status = self.lock_status();
            transition(&mut status, RefreshPhase::Idle);
            status.cycle_started_at = None;
            status.completed_cycles += 1;
            status.last_success = Some(LastSuccess {
                generation_id: generation.meta.id,
                generated_at: generation.meta.generated_at,
                asset_count: generation.meta.asset_count,
            });
        }

        let elapsed = t0.elapsed();
        tracing::info!(
            generation_id = %generation.meta.id,
            assets = generation.meta.asset_count,
            periods = generation.rankings.len(),
            store = self.inner.store.backend_name(),
            elapsed_ms = elapsed.as_millis(),
            "refresh cycle committed generation"
        );

        Ok(CycleReport {
            generation: generation.meta,
            elapsed,
        })
    }

    async fn fail(&self, started_at: DateTime<Utc>, err: RefreshError) -> RefreshError {
        transition(&mut self.lock_status(), RefreshPhase::Failed);
        tracing::error!(kind = err.kind(), error = %err, "refresh cycle failed; keeping previous generation");

        if let Err(e) = self.inner.store.record_failure(started_at, &err.to_string()).await {
            tracing::warn!(error = %e, "failed to record refresh failure");
        }

        self.record_failed_cycle(Utc::now(), &err);
        err
    }

    fn record_failed_cycle(&self, failed_at: DateTime<Utc>, err: &RefreshError) {
        let mut status = self.lock_status();
        if status.phase == RefreshPhase::Failed {
            transition(&mut status, RefreshPhase::Idle);
        }
        status.cycle_started_at = None;
        status.failed_cycles += 1;
        status.last_failure = Some(LastFailure {
            kind: err.kind(),
            error: err.to_string(),
            failed_at,
        });
    }

    fn lock_status(&self) -> MutexGuard<'_, RefreshStatus> {
        self.inner
            .status
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn transition(status: &mut RefreshStatus, next: RefreshPhase) {
    debug_assert!(
        status.phase.can_transition_to(next),
        "illegal refresh transition {:?} -> {:?}",
        status.phase,
        next
    );
    tracing::debug!(from = ?status.phase, to = ?next, "refresh phase");
    status.phase = next;
}
