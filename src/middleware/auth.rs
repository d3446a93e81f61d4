use crate::entities::session::{self, Entity as SessionEntity};
use crate::entities::user::{self, Entity as UserEntity, Role};
use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::Response,
};
use chrono::{Duration, Utc};
use dotenvy::dotenv;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter};
use serde::{Deserialize, Serialize};
use std::{str::FromStr, sync::Arc};
use thiserror::Error;
use tracing::debug;

pub async fn auth_middleware(
    State(state): State<AuthState>,
    mut req: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let db = state.db;
    let role = state.role;

    let auth_header = req
        .headers()
        .get("Authorization")
        .and_then(|h| h.to_str().ok());

    let token = match auth_header {
        Some(header) if header.starts_with("Bearer ") => match header.strip_prefix("Bearer ") {
            Some(token) => token,
            _ => return Err(StatusCode::UNAUTHORIZED),
        },
        _ => return Err(StatusCode::UNAUTHORIZED),
    };

    let claims: Claims = match validate_token(db.clone(), token, role).await {
        Ok(claims) => claims,
        Err(err) => {
            debug!(error = %err, "Rejected bearer token");
            return Err(StatusCode::UNAUTHORIZED);
        }
    };
    req.extensions_mut().insert(claims);
    Ok(next.run(req).await)
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Claims {
    pub user_id: i32,
    pub role: String,
    pub exp: usize,
}

#[derive(Clone, Debug)]
pub struct AuthState {
    pub db: Arc<DatabaseConnection>,
    //None accepts any authenticated user, Some(role) pins the route to it.
    pub role: Option<Role>,
}

pub fn generate_token(
    user_id: i32,
    role: String,
    lifetime: Duration,
) -> Result<String, AuthMiddlewareError> {
    let exp = Utc::now()
        .checked_add_signed(lifetime)
        .ok_or(AuthMiddlewareError::GenerationFail)?
        .timestamp() as usize;

    let claims = Claims { user_id, role, exp };

    match encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(get_secret_key().as_bytes()),
    ) {
        Ok(token) => Ok(token),
        Err(_) => Err(AuthMiddlewareError::GenerationFail),
    }
}

//Decodes and checks expiry only. Used by the verify endpoint, which runs
//before a session exists.
pub fn decode_claims(token: &str) -> Result<Claims, AuthMiddlewareError> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.validate_exp = true;

    match decode::<Claims>(
        token,
        &DecodingKey::from_secret(get_secret_key().as_bytes()),
        &validation,
    ) {
        Ok(data) => Ok(data.claims),
        Err(_) => Err(AuthMiddlewareError::TokenExpired),
    }
}

//A token is only accepted while the user still has a session row, so
//logout actually kills outstanding tokens.
pub async fn validate_token(
    db: Arc<DatabaseConnection>,
    token: &str,
    req_role: Option<Role>,
) -> Result<Claims, AuthMiddlewareError> {
    let claims = decode_claims(token)?;

    let role = match Role::from_str(&claims.role) {
        Ok(role) => role,
        Err(_) => return Err(AuthMiddlewareError::ValidationFail),
    };

    match UserEntity::find_by_id(claims.user_id)
        .filter(user::Column::Role.eq(role))
        .one(&*db)
        .await
    {
        Ok(Some(_)) => {}
        Ok(None) => return Err(AuthMiddlewareError::InvalidUserOrRole),
        Err(_) => return Err(AuthMiddlewareError::InternalServerError),
    }

    match SessionEntity::find()
        .filter(session::Column::UserId.eq(claims.user_id))
        .one(&*db)
        .await
    {
        Ok(Some(_)) => {}
        Ok(None) => return Err(AuthMiddlewareError::NoSession),
        Err(_) => return Err(AuthMiddlewareError::InternalServerError),
    }

    match req_role {
        None => Ok(claims),
        Some(required) if required == role => Ok(claims),
        Some(_) => Err(AuthMiddlewareError::InvalidUserOrRole),
    }
}

#[derive(Error, Debug)]
pub enum AuthMiddlewareError {
    #[error("Invalid user id or role")]
    InvalidUserOrRole,
    #[error("Token expired")]
    TokenExpired,
    #[error("No live session for this user")]
    NoSession,
    #[error("Failed to validate token")]
    ValidationFail,
    #[error("Failed to generate token")]
    GenerationFail,
    #[error("Internal server error")]
    InternalServerError,
}

fn get_secret_key() -> String {
    dotenv().ok();
    std::env::var("SECRET").expect("SECRET not found in .env file")
}
