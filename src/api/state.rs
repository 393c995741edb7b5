//! Application state for the API server

use crate::{Config, TaskRegistry};
use std::sync::Arc;
use std::time::Instant;

/// Shared application state accessible to all route handlers
///
/// Cloned for each request; every field is a cheap handle.
#[derive(Clone)]
pub struct AppState {
    /// The task registry behind every route
    pub registry: TaskRegistry,

    /// Configuration the registry was built with
    pub config: Arc<Config>,

    /// When the router was created, for uptime reporting
    pub started_at: Instant,
}

impl AppState {
    /// Create a new AppState
    pub fn new(registry: TaskRegistry) -> Self {
        let config = registry.config().clone();
        Self {
            registry,
            config,
            started_at: Instant::now(),
        }
    }
}
