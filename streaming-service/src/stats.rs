use crate::sink::SaveResult;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::Duration;
use tokio::sync::RwLock;

/// Counts for one tick, built locally by the polling task and applied to the
/// register in one step so readers never see half a tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickTally {
    pub fetched: u64,
    pub matched: u64,
    pub saved: u64,
    pub duplicate: u64,
    pub filtered_out: u64,
    pub store_errors: u64,
}

impl TickTally {
    pub fn new(fetched: usize) -> Self {
        Self {
            fetched: fetched as u64,
            ..Default::default()
        }
    }

    pub fn record_filtered(&mut self) {
        self.filtered_out += 1;
    }

    pub fn record_save(&mut self, result: &SaveResult) {
        self.matched += 1;
        match result {
            SaveResult::Saved => self.saved += 1,
            SaveResult::Duplicate => self.duplicate += 1,
            SaveResult::Error(_) => self.store_errors += 1,
        }
    }

    pub fn processed(&self) -> u64 {
        self.saved + self.duplicate + self.filtered_out + self.store_errors
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct StatsSnapshot {
    pub fetched: u64,
    pub matched: u64,
    pub saved: u64,
    pub duplicate: u64,
    pub filtered_out: u64,
    /// Per-item write failures
    pub store_errors: u64,
    /// Ticks whose fetch failed
    pub fetch_errors: u64,
    pub ticks: u64,
    /// Periodic reports logged so far
    pub reports: u64,
    pub started_at: DateTime<Utc>,
    pub taken_at: DateTime<Utc>,
}

impl StatsSnapshot {
    /// All transient failures, item-level and fetch-level.
    pub fn errors(&self) -> u64 {
        self.store_errors + self.fetch_errors
    }

    /// Every fetched item ended up in exactly one bucket.
    pub fn is_balanced(&self) -> bool {
        self.fetched == self.saved + self.duplicate + self.filtered_out + self.store_errors
    }

    pub fn elapsed(&self) -> Duration {
        (self.taken_at - self.started_at).to_std().unwrap_or_default()
    }

    pub fn items_per_minute(&self) -> f64 {
        let secs = self.elapsed().as_secs_f64();
        if secs <= 0.0 {
            0.0
        } else {
            self.fetched as f64 / secs * 60.0
        }
    }

    pub fn report(&self) -> String {
        format!(
            "runtime {:.1}s | ticks {} | fetched {} | matched {} | saved {} | duplicate {} | filtered {} | errors {} ({} fetch) | {:.1} items/min",
            self.elapsed().as_secs_f64(),
            self.ticks,
            self.fetched,
            self.matched,
            self.saved,
            self.duplicate,
            self.filtered_out,
            self.errors(),
            self.fetch_errors,
            self.items_per_minute(),
        )
    }
}

#[derive(Debug, Clone)]
struct Counters {
    fetched: u64,
    matched: u64,
    saved: u64,
    duplicate: u64,
    filtered_out: u64,
    store_errors: u64,
    fetch_errors: u64,
    ticks: u64,
    reports: u64,
    started_at: DateTime<Utc>,
}

impl Counters {
    fn new() -> Self {
        Self {
            fetched: 0,
            matched: 0,
            saved: 0,
            duplicate: 0,
            filtered_out: 0,
            store_errors: 0,
            fetch_errors: 0,
            ticks: 0,
            reports: 0,
            started_at: Utc::now(),
        }
    }
}

/// Shared counters for one service run. All fields sit behind one lock.
#[derive(Debug)]
pub struct StatsRegister {
    counters: RwLock<Counters>,
}

impl StatsRegister {
    pub fn new() -> Self {
        Self {
            counters: RwLock::new(Counters::new()),
        }
    }

    pub async fn record_tick(&self, tally: &TickTally) {
        let mut counters = self.counters.write().await;
        counters.fetched += tally.fetched;
        counters.matched += tally.matched;
        counters.saved += tally.saved;
        counters.duplicate += tally.duplicate;
        counters.filtered_out += tally.filtered_out;
        counters.store_errors += tally.store_errors;
        counters.ticks += 1;
    }

    pub async fn record_fetch_error(&self) {
        let mut counters = self.counters.write().await;
        counters.fetch_errors += 1;
        counters.ticks += 1;
    }

    pub async fn snapshot(&self) -> StatsSnapshot {
        snapshot_of(&*self.counters.read().await)
    }

    /// Snapshot for the periodic report, counted as one more report.
    pub async fn snapshot_for_report(&self) -> StatsSnapshot {
        let mut counters = self.counters.write().await;
        counters.reports += 1;
        snapshot_of(&counters)
    }

    /// Zeroes every counter and restarts the clock. The service only calls
    /// this while no polling task is alive.
    pub async fn reset(&self) {
        *self.counters.write().await = Counters::new();
    }
}

fn snapshot_of(counters: &Counters) -> StatsSnapshot {
    StatsSnapshot {
        fetched: counters.fetched,
        matched: counters.matched,
        saved: counters.saved,
        duplicate: counters.duplicate,
        filtered_out: counters.filtered_out,
        store_errors: counters.store_errors,
        fetch_errors: counters.fetch_errors,
        ticks: counters.ticks,
        reports: counters.reports,
        started_at: counters.started_at,
        taken_at: Utc::now(),
    }
}

impl Default for StatsRegister {
    fn default() -> Self {
        Self::new()
    }
}
