//! Public control surface over one polling loop and its stats reporter.

use crate::filter::FilterEvaluator;
use crate::polling::{run_reporter, PollState, PollingLoop, ServiceState, LAST_STREAM_TIME_KEY};
use crate::shutdown::CancellationToken;
use crate::sink::DeduplicatingSink;
use crate::stats::{StatsRegister, StatsSnapshot};
use chrono::{DateTime, Utc};
use database::ItemStore;
use feed_client::FeedClient;
use serde::Serialize;
use skyfeed_core::{
    retry_with_backoff, ConfigError, CoreError, ErrorExt, FilterConfig, RetryPolicy,
    StreamingConfig, MAX_FETCH_LIMIT,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, PartialEq)]
pub struct StreamSettings {
    pub poll_interval: Duration,
    pub stats_interval: Duration,
    pub max_items_per_fetch: usize,
    pub filters: FilterConfig,
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self::from(&StreamingConfig::default())
    }
}

impl From<&StreamingConfig> for StreamSettings {
    fn from(config: &StreamingConfig) -> Self {
        Self {
            poll_interval: config.poll_interval(),
            stats_interval: config.stats_interval(),
            max_items_per_fetch: config.max_items_per_fetch,
            filters: config.filters.clone(),
        }
    }
}

impl StreamSettings {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.poll_interval.is_zero() {
            return Err(ConfigError::InvalidValue {
                field: "poll_interval".to_string(),
                value: format!("{:?}", self.poll_interval),
            });
        }
        if self.stats_interval.is_zero() {
            return Err(ConfigError::InvalidValue {
                field: "stats_interval".to_string(),
                value: format!("{:?}", self.stats_interval),
            });
        }
        if !(1..=MAX_FETCH_LIMIT).contains(&self.max_items_per_fetch) {
            return Err(ConfigError::ValidationFailed {
                reason: format!(
                    "max_items_per_fetch must be between 1 and {}, got {}",
                    MAX_FETCH_LIMIT, self.max_items_per_fetch
                ),
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ServiceStatus {
    pub state: ServiceState,
    pub stats: StatsSnapshot,
    pub uptime: Option<Duration>,
    pub filters: FilterConfig,
    pub poll_interval: Duration,
    pub stats_interval: Duration,
    pub max_items_per_fetch: usize,
    pub last_poll_at: Option<DateTime<Utc>>,
    pub consecutive_fetch_errors: u32,
    pub last_stream_time: Option<DateTime<Utc>>,
}

struct RunHandles {
    cancel: CancellationToken,
    poller: JoinHandle<()>,
    reporter: JoinHandle<()>,
}

pub struct StreamingService {
    feed: Arc<dyn FeedClient>,
    sink: Arc<DeduplicatingSink>,
    stats: Arc<StatsRegister>,
    settings: RwLock<StreamSettings>,
    state: Arc<RwLock<PollState>>,
    // Also serializes start and stop against each other
    run: Mutex<Option<RunHandles>>,
    auth_policy: RetryPolicy,
}

impl StreamingService {
    pub fn new(
        feed: Arc<dyn FeedClient>,
        store: Arc<dyn ItemStore>,
        settings: StreamSettings,
    ) -> Self {
        let state = PollState::new(settings.poll_interval, settings.stats_interval);
        Self {
            feed,
            sink: Arc::new(DeduplicatingSink::new(store)),
            stats: Arc::new(StatsRegister::new()),
            settings: RwLock::new(settings),
            state: Arc::new(RwLock::new(state)),
            run: Mutex::new(None),
            auth_policy: RetryPolicy::authentication(),
        }
    }

    pub fn with_auth_policy(mut self, policy: RetryPolicy) -> Self {
        self.auth_policy = policy;
        self
    }

    pub async fn state(&self) -> ServiceState {
        self.state.read().await.state
    }

    pub async fn configure(&self, settings: StreamSettings) -> Result<(), CoreError> {
        settings.validate()?;

        // Waits out a start in progress, which is still Idle while it logs in
        let _run = self.run.lock().await;
        let mut state = self.state.write().await;
        if state.is_active() {
            return Err(invalid_transition(state.state, "reconfigure"));
        }
        state.poll_interval = settings.poll_interval;
        state.stats_interval = settings.stats_interval;
        drop(state);

        info!(
            "Streaming reconfigured: poll every {:?}, stats every {:?}",
            settings.poll_interval, settings.stats_interval
        );
        *self.settings.write().await = settings;
        Ok(())
    }

    pub async fn start(&self) -> Result<(), CoreError> {
        let mut run = self.run.lock().await;

        match self.state().await {
            ServiceState::Running => return Err(CoreError::AlreadyRunning),
            ServiceState::StopRequested => {
                return Err(invalid_transition(ServiceState::StopRequested, "start"))
            }
            ServiceState::Idle | ServiceState::Stopped => {}
        }

        // A run cancelled through its token finishes on its own; reap it
        if let Some(previous) = run.take() {
            join_run(previous).await;
        }

        let settings = self.settings.read().await.clone();
        settings.validate()?;
        log_filters(&settings.filters);

        info!("Authenticating with feed");
        let feed = Arc::clone(&self.feed);
        retry_with_backoff(&self.auth_policy, || feed.authenticate())
            .await
            .map_err(|e| {
                if e.is_auth_failure() {
                    error!("Feed rejected the credentials, not starting: {}", e);
                } else {
                    e.log_error();
                }
                CoreError::from(e)
            })?;

        self.stats.reset().await;
        let last_stream_time = self.load_last_stream_time().await;
        {
            let mut state = self.state.write().await;
            state.poll_interval = settings.poll_interval;
            state.stats_interval = settings.stats_interval;
            state.begin_run(last_stream_time);
        }

        let cancel = CancellationToken::new();
        let polling = PollingLoop::new(
            Arc::clone(&self.feed),
            Arc::clone(&self.sink),
            Arc::clone(&self.stats),
            FilterEvaluator::new(&settings.filters),
            Arc::clone(&self.state),
            settings.max_items_per_fetch,
            cancel.clone(),
        );
        let poller = tokio::spawn(polling.run());
        let reporter = tokio::spawn(run_reporter(
            Arc::clone(&self.stats),
            settings.stats_interval,
            cancel.clone(),
        ));

        *run = Some(RunHandles {
            cancel,
            poller,
            reporter,
        });
        info!("Streaming service started");
        Ok(())
    }

    /// Requests cancellation and waits for the in-flight tick to finish.
    /// Does nothing when no run is active.
    pub async fn stop(&self) {
        let mut run = self.run.lock().await;
        let Some(handles) = run.take() else {
            debug!("Stop requested but service is not running");
            return;
        };

        info!("Stopping streaming service");
        self.state.write().await.request_stop();
        handles.cancel.cancel();
        join_run(handles).await;
        self.state.write().await.mark_stopped();

        let snapshot = self.stats.snapshot().await;
        info!("Streaming service stopped. Final stats: {}", snapshot.report());
    }

    pub async fn status(&self) -> ServiceStatus {
        let stats = self.stats.snapshot().await;
        let settings = self.settings.read().await.clone();
        let state = self.state.read().await.clone();

        ServiceStatus {
            state: state.state,
            stats,
            uptime: state.uptime(),
            filters: settings.filters,
            poll_interval: state.poll_interval,
            stats_interval: state.stats_interval,
            max_items_per_fetch: settings.max_items_per_fetch,
            last_poll_at: state.last_poll_at,
            consecutive_fetch_errors: state.consecutive_fetch_errors,
            last_stream_time: state.last_stream_time,
        }
    }

    pub async fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot().await
    }

    pub async fn reset_stats(&self) -> Result<(), CoreError> {
        let state = self.state.read().await;
        if state.is_active() {
            return Err(invalid_transition(state.state, "reset stats"));
        }
        self.stats.reset().await;
        Ok(())
    }

    /// Token of the current run, so signal handlers or callers can cancel it
    /// without going through `stop`.
    pub async fn cancellation_token(&self) -> Option<CancellationToken> {
        self.run.lock().await.as_ref().map(|run| run.cancel.clone())
    }

    async fn load_last_stream_time(&self) -> Option<DateTime<Utc>> {
        match self.sink.store().get_metadata(LAST_STREAM_TIME_KEY).await {
            Ok(Some(value)) => match DateTime::parse_from_rfc3339(&value) {
                Ok(time) => {
                    let time = time.with_timezone(&Utc);
                    info!("Resuming after last streamed post at {}", time);
                    Some(time)
                }
                Err(e) => {
                    warn!("Ignoring unparseable {}: {} ({})", LAST_STREAM_TIME_KEY, value, e);
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                debug!("Could not read stream metadata: {}", e);
                None
            }
        }
    }
}

async fn join_run(handles: RunHandles) {
    if let Err(e) = handles.poller.await {
        error!("Polling task ended abnormally: {}", e);
    }
    if let Err(e) = handles.reporter.await {
        error!("Stats reporter ended abnormally: {}", e);
    }
}

fn invalid_transition(state: ServiceState, operation: &str) -> CoreError {
    CoreError::InvalidStateTransition {
        state: state.to_string(),
        operation: operation.to_string(),
    }
}

fn log_filters(filters: &FilterConfig) {
    if filters.is_pass_through() {
        info!("No filters configured, keeping every post");
        return;
    }
    if !filters.authors.is_empty() {
        info!("Author filter: {:?}", filters.authors);
    }
    if !filters.keywords.is_empty() {
        info!("Keyword filter: {:?}", filters.keywords);
    }
}
