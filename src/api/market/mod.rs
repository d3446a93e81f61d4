pub mod buyer;
pub mod image;
pub mod public;
pub mod seller;

use axum::{middleware::from_fn_with_state, Router};
use sea_orm::DatabaseConnection;
use std::sync::Arc;

use crate::entities::user::Role;
use crate::middleware::auth::{auth_middleware, AuthState};
use buyer::{buyer_router, profile_router};
use image::{public_image_router, upload_router};
use public::public_market_router;
use seller::seller_router;

pub fn market_api_router(db: Arc<DatabaseConnection>) -> Router {
    let public = Router::new()
        .nest("/", public_market_router(db.clone()))
        .nest("/", public_image_router(db.clone()));

    //Profile is open to both roles: sellers keep business details there.
    let any_role = Router::new()
        .nest("/", profile_router(db.clone()))
        .layer(from_fn_with_state(
            AuthState {
                db: db.clone(),
                role: None,
            },
            auth_middleware,
        ));

    let buyer = Router::new()
        .nest("/", buyer_router(db.clone()))
        .layer(from_fn_with_state(
            AuthState {
                db: db.clone(),
                role: Some(Role::Buyer),
            },
            auth_middleware,
        ));

    let seller = Router::new()
        .nest("/", seller_router(db.clone()))
        .nest("/", upload_router(db.clone()))
        .layer(from_fn_with_state(
            AuthState {
                db: db.clone(),
                role: Some(Role::Seller),
            },
            auth_middleware,
        ));

    Router::new()
        .merge(public)
        .merge(any_role)
        .merge(buyer)
        .merge(seller)
}
