use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use dashmap::DashMap;
use tokio::sync::broadcast;

use crate::config::Config;
use crate::geocode::Geocoder;
use crate::pipeline::driver::{self, lock_session, DriverContext, SharedSession, TrackingHandle};
use crate::pipeline::intake;
use crate::pipeline::milestones::{CompletionHandler, LogCompletion};
use crate::pipeline::session::TrackingSession;
use crate::types::order::OrderRecord;
use crate::types::tracking::{SessionStatus, TrackingEvent, TrackingSnapshot};

const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Scalar progress per order, so a re-opened tracking view resumes where it
/// left off instead of starting from zero.
#[derive(Clone, Default)]
pub struct ProgressStore {
    values: Arc<DashMap<String, f64>>,
}

impl ProgressStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn key(order_id: &str) -> String {
        format!("drone-progress:{}", order_id)
    }

    pub fn load(&self, order_id: &str) -> Option<f64> {
        self.values
            .get(&Self::key(order_id))
            .map(|entry| *entry.value())
            .filter(|value| value.is_finite())
    }

    pub fn save(&self, order_id: &str, progress: f64) {
        if progress.is_finite() {
            self.values.insert(Self::key(order_id), progress.clamp(0.0, 1.0));
        }
    }

    pub fn remove(&self, order_id: &str) {
        self.values.remove(&Self::key(order_id));
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

struct SessionEntry {
    handle: TrackingHandle,
    touched_at: Instant,
}

#[derive(Clone)]
pub struct AppState {
    config: Arc<Config>,
    geocoder: Geocoder,
    sessions: Arc<DashMap<String, SessionEntry>>,
    store: ProgressStore,
    events: broadcast::Sender<TrackingEvent>,
    completion: Arc<dyn CompletionHandler>,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        let geocoder = Geocoder::from_config(&config);
        Self::with_geocoder(config, geocoder)
    }

    pub fn with_geocoder(config: Config, geocoder: Geocoder) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            config: Arc::new(config),
            geocoder,
            sessions: Arc::new(DashMap::new()),
            store: ProgressStore::new(),
            events,
            completion: Arc::new(LogCompletion),
        }
    }

    pub fn with_completion(mut self, completion: Arc<dyn CompletionHandler>) -> Self {
        self.completion = completion;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn geocoder(&self) -> &Geocoder {
        &self.geocoder
    }

    pub fn store(&self) -> &ProgressStore {
        &self.store
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<TrackingEvent> {
        self.events.subscribe()
    }

    fn driver_context(&self) -> DriverContext {
        DriverContext {
            tick: self.config.tick_interval,
            events: self.events.clone(),
            completion: self.completion.clone(),
            store: self.store.clone(),
        }
    }

    /// Starts tracking `order`, or returns the live session when the same
    /// order id is already being tracked.
    pub async fn start_tracking(&self, order: OrderRecord) -> TrackingSnapshot {
        if let Some(existing) = order.order_id().and_then(|id| self.snapshot(&id)) {
            if existing.status == SessionStatus::EnRoute {
                return existing;
            }
        }

        let session = intake::build_session(
            order,
            &self.geocoder,
            &self.store,
            self.config.tick_interval,
            Utc::now(),
        )
        .await;

        let order_id = session.order_id.clone();
        let snapshot = session.snapshot();
        let handle = driver::start(session, self.driver_context());
        tracing::info!(
            "Tracking order {} ({:.2} km, {})",
            order_id,
            snapshot.route_km,
            snapshot.eta_label
        );
        // Replacing an entry drops the old handle, which stops its ticker.
        self.sessions.insert(
            order_id,
            SessionEntry {
                handle,
                touched_at: Instant::now(),
            },
        );
        snapshot
    }

    pub fn session(&self, order_id: &str) -> Option<SharedSession> {
        self.sessions.get(order_id).map(|entry| entry.handle.session())
    }

    pub fn snapshot(&self, order_id: &str) -> Option<TrackingSnapshot> {
        let mut entry = self.sessions.get_mut(order_id)?;
        entry.touched_at = Instant::now();
        Some(entry.handle.snapshot())
    }

    /// Runs `f` against the live session state, with the driver context for
    /// publishing whatever it changes.
    pub fn with_session<T>(
        &self,
        order_id: &str,
        f: impl FnOnce(&mut TrackingSession, &DriverContext) -> T,
    ) -> Option<T> {
        let session = {
            let mut entry = self.sessions.get_mut(order_id)?;
            entry.touched_at = Instant::now();
            entry.handle.session()
        };
        let ctx = self.driver_context();
        let mut guard = lock_session(&session);
        Some(f(&mut guard, &ctx))
    }

    pub fn is_running(&self, order_id: &str) -> bool {
        self.sessions
            .get(order_id)
            .map(|entry| entry.handle.is_running())
            .unwrap_or(false)
    }

    /// Cancels the session's ticker and forgets it, persisted progress
    /// included. Returns its final state.
    pub fn stop_tracking(&self, order_id: &str) -> Option<TrackingSnapshot> {
        let (_, entry) = self.sessions.remove(order_id)?;
        // Cancelling first guarantees no later tick writes the entry back.
        entry.handle.cancel();
        self.store.remove(order_id);
        Some(entry.handle.snapshot())
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Drops sessions nobody looked at within `ttl`, stopping their tickers
    /// and forgetting their persisted progress.
    pub fn evict_idle(&self, ttl: Duration) {
        let now = Instant::now();
        let is_idle = |entry: &SessionEntry| now.duration_since(entry.touched_at) >= ttl;

        let expired: Vec<String> = self
            .sessions
            .iter()
            .filter(|entry| is_idle(entry.value()))
            .map(|entry| entry.key().clone())
            .collect();

        for order_id in expired {
            if let Some((_, entry)) = self.sessions.remove_if(&order_id, |_, entry| is_idle(entry)) {
                entry.handle.cancel();
                self.store.remove(&order_id);
            }
        }
        tracing::info!(
            "Session eviction complete. Active sessions: {}, stored progress entries: {}",
            self.sessions.len(),
            self.store.len()
        );
    }
}
