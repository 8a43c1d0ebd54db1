//! Shared state of the HTTP endpoints.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::watch;

use crate::obs::MetricStore;

#[derive(Clone)]
pub struct AppState {
    store: Arc<MetricStore>,
    polls: watch::Receiver<u64>,
    draining: Arc<AtomicBool>,
}

impl AppState {
    /// `polls` is the collector's completed-poll counter.
    pub fn new(store: Arc<MetricStore>, polls: watch::Receiver<u64>) -> Self {
        Self {
            store,
            polls,
            draining: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn store(&self) -> &MetricStore {
        &self.store
    }

    /// Ready once the first poll has completed.
    pub fn is_ready(&self) -> bool {
        *self.polls.borrow() > 0
    }

    /// Mark draining state.
    pub fn set_draining(&self) {
        self.draining.store(true, Ordering::Relaxed);
    }

    pub fn is_draining(&self) -> bool {
        self.draining.load(Ordering::Relaxed)
    }
}
