//! Shared handler state.

use std::sync::Arc;
use std::time::Instant;

use vitrum_core::Engine;

/// State cloned into every handler.
#[derive(Clone)]
pub struct AppState {
    /// The running engine.
    pub engine: Arc<Engine>,
    /// Server start time, for the status endpoint.
    pub started: Instant,
}

impl AppState {
    /// Wrap a bootstrapped engine.
    pub fn new(engine: Arc<Engine>) -> AppState {
        AppState {
            engine,
            started: Instant::now(),
        }
    }
}
