use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::geocode::{GeocodeResult, Geocoder};
use crate::types::geo::Coordinate;

/// Debounced geocoding for a single input that keeps changing. Each
/// `submit` supersedes and aborts the previous one; stale results are never
/// published.
pub struct GeocodeSubscription {
    geocoder: Geocoder,
    generation: Arc<AtomicU64>,
    sender: Arc<watch::Sender<GeocodeResult>>,
    pending: Option<JoinHandle<()>>,
}

impl GeocodeSubscription {
    pub fn new(geocoder: Geocoder) -> Self {
        let (sender, _) = watch::channel(GeocodeResult::idle());
        Self {
            geocoder,
            generation: Arc::new(AtomicU64::new(0)),
            sender: Arc::new(sender),
            pending: None,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<GeocodeResult> {
        self.sender.subscribe()
    }

    pub fn current(&self) -> GeocodeResult {
        self.sender.borrow().clone()
    }

    pub fn submit(&mut self, query: &str, fallback: Option<Coordinate>) {
        self.abort_pending();
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;

        if query.trim().is_empty() {
            self.sender.send_replace(GeocodeResult::idle());
            return;
        }

        // Cached answers need no debounce or network round trip.
        if let Some(result) = self.geocoder.resolve_cached(query, fallback) {
            self.sender.send_replace(result);
            return;
        }

        self.sender.send_replace(GeocodeResult::loading());

        let geocoder = self.geocoder.clone();
        let latest = self.generation.clone();
        let sender = self.sender.clone();
        let query = query.to_string();

        self.pending = Some(tokio::spawn(async move {
            tokio::time::sleep(geocoder.options().debounce).await;
            if latest.load(Ordering::SeqCst) != generation {
                return;
            }

            let result = geocoder.resolve(&query, fallback).await;
            if latest.load(Ordering::SeqCst) != generation {
                tracing::debug!("Discarding superseded geocode result for \"{}\"", query);
                return;
            }
            sender.send_replace(result);
        }));
    }

    /// Drops any in-flight lookup and pending debounce.
    pub fn cancel(&mut self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.abort_pending();
    }

    fn abort_pending(&mut self) {
        if let Some(task) = self.pending.take() {
            task.abort();
        }
    }
}

impl Drop for GeocodeSubscription {
    fn drop(&mut self) {
        self.cancel();
    }
}
