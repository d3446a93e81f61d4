pub mod market;
pub mod user;

use axum::{middleware::from_fn, Router};
use sea_orm::DatabaseConnection;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::middleware::logging::logging_middleware;
use market::market_api_router;
use user::user_api_router;

pub fn create_api_router(shared_db: Arc<DatabaseConnection>) -> Router {
    Router::new()
        .nest("/user", user_api_router(shared_db.clone()))
        .nest("/market", market_api_router(shared_db.clone()))
        .layer(from_fn(logging_middleware))
        .layer(TraceLayer::new_for_http())
}
