use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::controller::Controller;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub controller: Arc<Controller>,
    /// Cancelled on shutdown; every request works on a child token
    pub shutdown: CancellationToken,
}

impl AppState {
    pub fn new(controller: Arc<Controller>, shutdown: CancellationToken) -> Self {
        Self {
            controller,
            shutdown,
        }
    }
}
