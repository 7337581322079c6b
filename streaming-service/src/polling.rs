//! The polling task and the stats reporter task.
//!
//! A tick fetches, filters and saves sequentially and always runs to the end
//! once started; cancellation is only observed between ticks, so a stop
//! request never leaves a fetched item uncounted.

use crate::filter::FilterEvaluator;
use crate::shutdown::CancellationToken;
use crate::sink::{DeduplicatingSink, SaveResult};
use crate::stats::{StatsRegister, TickTally};
use chrono::{DateTime, Utc};
use feed_client::FeedClient;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Store metadata key holding the newest saved item's creation time.
pub const LAST_STREAM_TIME_KEY: &str = "last_stream_time";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceState {
    Idle,
    Running,
    StopRequested,
    Stopped,
}

impl fmt::Display for ServiceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ServiceState::Idle => "idle",
            ServiceState::Running => "running",
            ServiceState::StopRequested => "stopping",
            ServiceState::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone)]
pub struct PollState {
    pub state: ServiceState,
    pub poll_interval: Duration,
    pub stats_interval: Duration,
    pub started_at: Option<DateTime<Utc>>,
    pub stopped_at: Option<DateTime<Utc>>,
    pub last_poll_at: Option<DateTime<Utc>>,
    pub consecutive_fetch_errors: u32,
    pub last_stream_time: Option<DateTime<Utc>>,
}

impl PollState {
    pub fn new(poll_interval: Duration, stats_interval: Duration) -> Self {
        Self {
            state: ServiceState::Idle,
            poll_interval,
            stats_interval,
            started_at: None,
            stopped_at: None,
            last_poll_at: None,
            consecutive_fetch_errors: 0,
            last_stream_time: None,
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(
            self.state,
            ServiceState::Running | ServiceState::StopRequested
        )
    }

    pub fn begin_run(&mut self, last_stream_time: Option<DateTime<Utc>>) {
        self.state = ServiceState::Running;
        self.started_at = Some(Utc::now());
        self.stopped_at = None;
        self.last_poll_at = None;
        self.consecutive_fetch_errors = 0;
        self.last_stream_time = last_stream_time;
    }

    pub fn request_stop(&mut self) {
        if self.state == ServiceState::Running {
            self.state = ServiceState::StopRequested;
        }
    }

    pub fn mark_stopped(&mut self) {
        if self.is_active() {
            self.state = ServiceState::Stopped;
            self.stopped_at = Some(Utc::now());
        }
    }

    pub fn uptime(&self) -> Option<Duration> {
        let started = self.started_at?;
        let until = self.stopped_at.unwrap_or_else(Utc::now);
        Some((until - started).to_std().unwrap_or_default())
    }
}

pub struct PollingLoop {
    feed: Arc<dyn FeedClient>,
    sink: Arc<DeduplicatingSink>,
    stats: Arc<StatsRegister>,
    evaluator: FilterEvaluator,
    state: Arc<RwLock<PollState>>,
    max_items_per_fetch: usize,
    cancel: CancellationToken,
}

impl PollingLoop {
    pub fn new(
        feed: Arc<dyn FeedClient>,
        sink: Arc<DeduplicatingSink>,
        stats: Arc<StatsRegister>,
        evaluator: FilterEvaluator,
        state: Arc<RwLock<PollState>>,
        max_items_per_fetch: usize,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            feed,
            sink,
            stats,
            evaluator,
            state,
            max_items_per_fetch,
            cancel,
        }
    }

    pub async fn run(self) {
        let poll_interval = self.state.read().await.poll_interval;
        info!("Starting polling loop, interval {:?}", poll_interval);

        // First tick completes immediately; slow ticks push later ones back
        let mut timer = interval(poll_interval);
        timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                _ = timer.tick() => {}
            }
            self.tick().await;
        }

        self.state.write().await.request_stop();
        let snapshot = self.stats.snapshot().await;
        self.state.write().await.mark_stopped();
        info!("Polling loop stopped: {}", snapshot.report());
    }

    /// One fetch plus processing of everything it returned.
    pub async fn tick(&self) -> Option<TickTally> {
        self.state.write().await.last_poll_at = Some(Utc::now());

        let items = match self.feed.fetch_recent(self.max_items_per_fetch).await {
            Ok(items) => items,
            Err(e) => {
                let streak = {
                    let mut state = self.state.write().await;
                    state.consecutive_fetch_errors += 1;
                    state.consecutive_fetch_errors
                };
                warn!("Fetch failed (error streak {}): {}", streak, e);
                self.stats.record_fetch_error().await;
                return None;
            }
        };
        self.state.write().await.consecutive_fetch_errors = 0;

        let mut tally = TickTally::new(items.len());
        let mut newest_saved: Option<DateTime<Utc>> = None;

        for item in items {
            if !self.evaluator.matches(&item) {
                tally.record_filtered();
                continue;
            }

            let created_at = item.created_at;
            let result = self.sink.save(item).await;
            if result == SaveResult::Saved {
                newest_saved = newest_saved.max(Some(created_at));
            }
            tally.record_save(&result);
        }
        debug_assert_eq!(tally.processed(), tally.fetched);

        self.stats.record_tick(&tally).await;

        if tally.saved > 0 {
            info!("Saved {} new posts", tally.saved);
        }
        debug!(
            "Tick done: fetched {} matched {} saved {} duplicate {} filtered {} errors {}",
            tally.fetched,
            tally.matched,
            tally.saved,
            tally.duplicate,
            tally.filtered_out,
            tally.store_errors
        );

        if let Some(newest) = newest_saved {
            self.checkpoint(newest).await;
        }

        Some(tally)
    }

    async fn checkpoint(&self, newest: DateTime<Utc>) {
        {
            let mut state = self.state.write().await;
            if state.last_stream_time.map_or(false, |seen| seen >= newest) {
                return;
            }
            state.last_stream_time = Some(newest);
        }

        if let Err(e) = self
            .sink
            .store()
            .set_metadata(LAST_STREAM_TIME_KEY, &newest.to_rfc3339())
            .await
        {
            debug!("Could not persist stream metadata: {}", e);
        }
    }
}

/// Logs a stats report every `every` until cancelled. Shares nothing with
/// the polling task except the register and the token.
pub async fn run_reporter(stats: Arc<StatsRegister>, every: Duration, cancel: CancellationToken) {
    let mut timer = interval(every);
    timer.set_missed_tick_behavior(MissedTickBehavior::Skip);

    // Skip first tick (immediate)
    timer.tick().await;

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = timer.tick() => {
                let snapshot = stats.snapshot_for_report().await;
                info!("Streaming stats: {}", snapshot.report());
            }
        }
    }
    debug!("Stats reporter stopped");
}
