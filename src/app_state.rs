use sqlx::PgPool;
use std::sync::Arc;

use crate::services::{coordinator::AnalysisLifecycleCoordinator, queue::RedisQueue};

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    pub queue: Arc<RedisQueue>,
    pub coordinator: Arc<AnalysisLifecycleCoordinator>,
}

impl AppState {
    pub fn new(
        db: PgPool,
        queue: Arc<RedisQueue>,
        coordinator: AnalysisLifecycleCoordinator,
    ) -> Self {
        Self {
            db,
            queue,
            coordinator: Arc::new(coordinator),
        }
    }
}
