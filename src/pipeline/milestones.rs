use std::any::Any;
use std::collections::HashSet;
use std::panic::{catch_unwind, AssertUnwindSafe};

use crate::error::CallbackFailure;
use crate::types::order::OrderRecord;
use crate::types::tracking::MilestoneKind;

pub type CompletionResult = Result<(), Box<dyn std::error::Error + Send + Sync>>;

/// Called once per session when the arrival milestone fires.
pub trait CompletionHandler: Send + Sync {
    fn on_complete(&self, order: &OrderRecord) -> CompletionResult;
}

impl<F> CompletionHandler for F
where
    F: Fn(&OrderRecord) -> CompletionResult + Send + Sync,
{
    fn on_complete(&self, order: &OrderRecord) -> CompletionResult {
        self(order)
    }
}

/// Default handler for the service: the storefront polls for the delivered
/// status, so arrival only needs to be logged.
pub struct LogCompletion;

impl CompletionHandler for LogCompletion {
    fn on_complete(&self, order: &OrderRecord) -> CompletionResult {
        tracing::info!(
            "Order {:?} delivered ({})",
            order.id,
            order.restaurant_name.as_deref().unwrap_or("unknown restaurant")
        );
        Ok(())
    }
}

/// One-shot bookkeeping for a session's milestones.
#[derive(Debug, Default, Clone)]
pub struct MilestoneTracker {
    fired: HashSet<MilestoneKind>,
    completion_invoked: bool,
}

impl MilestoneTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks every threshold `progress` has reached and returns the ones that
    /// had not fired before, lowest first.
    pub fn observe(&mut self, progress: f64) -> Vec<MilestoneKind> {
        if progress.is_nan() {
            return Vec::new();
        }
        MilestoneKind::ALL
            .into_iter()
            .filter(|kind| progress >= kind.threshold() && self.fired.insert(*kind))
            .collect()
    }

    pub fn fired(&self) -> Vec<MilestoneKind> {
        let mut fired: Vec<MilestoneKind> = self.fired.iter().copied().collect();
        fired.sort();
        fired
    }

    /// Returns true exactly once: the first caller gets to run the
    /// completion handler.
    pub fn claim_completion(&mut self) -> bool {
        if self.completion_invoked {
            return false;
        }
        self.completion_invoked = true;
        true
    }

    pub fn completion_invoked(&self) -> bool {
        self.completion_invoked
    }
}

/// Runs the handler, turning both returned errors and panics into a
/// [`CallbackFailure`].
pub fn invoke_completion(
    handler: &dyn CompletionHandler,
    order: &OrderRecord,
) -> Result<(), CallbackFailure> {
    match catch_unwind(AssertUnwindSafe(|| handler.on_complete(order))) {
        Ok(Ok(())) => Ok(()),
        Ok(Err(err)) => Err(CallbackFailure::Returned(err.to_string())),
        Err(payload) => Err(CallbackFailure::Panicked(panic_message(payload.as_ref()))),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
