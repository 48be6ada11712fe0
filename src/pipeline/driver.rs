use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::Utc;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use crate::pipeline::milestones::{invoke_completion, CompletionHandler};
use crate::pipeline::progress::{self, ProgressSignal};
use crate::pipeline::session::TrackingSession;
use crate::state::ProgressStore;
use crate::types::tracking::{MilestoneKind, TrackingEvent, TrackingSnapshot};

/// The clock stops here and leaves the last step to the terminal tick.
pub const DRIVER_CEILING: f64 = 0.995;
pub const MIN_SIMULATED_MINUTES: f64 = 8.0;
/// Wall-clock milliseconds of simulation per estimated minute.
pub const MS_PER_SIMULATED_MINUTE: f64 = 4000.0;
/// Shortest tick the driver runs at, whatever it is configured with.
pub const MIN_TICK: Duration = Duration::from_millis(50);

pub fn effective_tick(tick: Duration) -> Duration {
    tick.max(MIN_TICK)
}

pub fn simulated_duration_ms(estimated_minutes: f64) -> f64 {
    let minutes = if estimated_minutes.is_finite() {
        estimated_minutes.max(MIN_SIMULATED_MINUTES)
    } else {
        MIN_SIMULATED_MINUTES
    };
    minutes * MS_PER_SIMULATED_MINUTE
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ClockTick {
    Advanced(f64),
    Terminal,
    Finished,
}

/// Time-based progress accumulator, advanced once per tick.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressClock {
    value: f64,
    step: f64,
    finished: bool,
}

impl ProgressClock {
    pub fn new(estimated_minutes: f64, tick: Duration) -> Self {
        let step = effective_tick(tick).as_millis() as f64 / simulated_duration_ms(estimated_minutes);
        Self {
            value: 0.0,
            step: if step.is_finite() && step > 0.0 { step } else { 0.0 },
            finished: false,
        }
    }

    /// Raises the clock to `value` (capped at the ceiling); never lowers it.
    pub fn seed(&mut self, value: f64) {
        if self.finished || value.is_nan() {
            return;
        }
        self.value = self.value.max(value.clamp(0.0, DRIVER_CEILING));
    }

    pub fn tick(&mut self) -> ClockTick {
        if self.finished {
            return ClockTick::Finished;
        }
        if self.value >= DRIVER_CEILING {
            self.finish();
            return ClockTick::Terminal;
        }
        self.value = (self.value + self.step).min(DRIVER_CEILING);
        ClockTick::Advanced(self.value)
    }

    pub fn finish(&mut self) {
        self.value = 1.0;
        self.finished = true;
    }

    pub fn value(&self) -> f64 {
        self.value
    }

    pub fn step(&self) -> f64 {
        self.step
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }
}

pub type SharedSession = Arc<Mutex<TrackingSession>>;

/// Everything a running session talks to besides its own state.
#[derive(Clone)]
pub struct DriverContext {
    pub tick: Duration,
    pub events: broadcast::Sender<TrackingEvent>,
    pub completion: Arc<dyn CompletionHandler>,
    pub store: ProgressStore,
}

pub fn lock_session(session: &SharedSession) -> MutexGuard<'_, TrackingSession> {
    session.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Feeds one signal through the reducer, then publishes crossed milestones,
/// runs the completion handler on arrival and persists progress. Returns
/// whether the session has reached its destination.
pub fn apply_signal(session: &mut TrackingSession, signal: ProgressSignal, ctx: &DriverContext) -> bool {
    let crossed = progress::reduce(session, signal);

    for kind in crossed {
        let event = TrackingEvent {
            order_id: session.order_id.clone(),
            kind,
            progress: session.progress,
            message: kind.message().to_string(),
            at: Utc::now(),
        };
        tracing::info!(
            "Order {} milestone {:?} at {:.1}%",
            session.order_id,
            kind,
            session.progress * 100.0
        );
        session.push_event(event.clone());
        // Nobody listening is fine.
        let _ = ctx.events.send(event);

        if kind == MilestoneKind::Arrival && session.milestones.claim_completion() {
            if let Err(failure) = invoke_completion(ctx.completion.as_ref(), &session.order) {
                tracing::error!("Order {}: {}", session.order_id, failure);
                session.warnings.push(failure.to_string());
            }
        }
    }

    if !session.cancelled {
        ctx.store.save(&session.order_id, session.progress);
    }
    session.clock.is_finished()
}

/// Owns the ticker task of one session. Dropping the handle stops the task.
pub struct TrackingHandle {
    order_id: String,
    session: SharedSession,
    task: JoinHandle<()>,
}

impl TrackingHandle {
    pub fn order_id(&self) -> &str {
        &self.order_id
    }

    pub fn session(&self) -> SharedSession {
        self.session.clone()
    }

    pub fn snapshot(&self) -> TrackingSnapshot {
        lock_session(&self.session).snapshot()
    }

    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }

    pub fn cancel(&self) {
        lock_session(&self.session).cancelled = true;
        self.task.abort();
        tracing::debug!("Tracking for order {} cancelled", self.order_id);
    }
}

impl Drop for TrackingHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Spawns the ticker for `session` on the current tokio runtime.
pub fn start(session: TrackingSession, ctx: DriverContext) -> TrackingHandle {
    let order_id = session.order_id.clone();
    let shared = Arc::new(Mutex::new(session));
    let task = tokio::spawn(run(shared.clone(), ctx));

    TrackingHandle {
        order_id,
        session: shared,
        task,
    }
}

async fn run(session: SharedSession, ctx: DriverContext) {
    let tick = effective_tick(ctx.tick);
    let mut ticker = tokio::time::interval_at(Instant::now() + tick, tick);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        let (finished, order_id) = {
            let mut guard = lock_session(&session);
            if guard.cancelled {
                (true, guard.order_id.clone())
            } else {
                (apply_signal(&mut guard, ProgressSignal::Tick, &ctx), guard.order_id.clone())
            }
        };
        if finished {
            tracing::debug!("Tracking loop for order {} finished", order_id);
            break;
        }
    }
}
