use argon2::{
    password_hash::{rand_core::OsRng, PasswordHasher, SaltString},
    Argon2,
};
use axum::{
    extract::Extension,
    http::{HeaderMap, StatusCode},
    middleware::from_fn_with_state,
    response::Response,
    routing::{get, post},
    Json, Router,
};
use chrono::{Duration, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set,
    TransactionTrait,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::str::FromStr;
use std::sync::Arc;
use tracing::debug;
use validator::Validate;

use crate::entities::profile;
use crate::entities::session::{self, Entity as SessionEntity};
use crate::entities::user::{self, Entity as UserEntity, Role};
use crate::middleware::auth::{
    auth_middleware, decode_claims, generate_token, AuthState, Claims,
};
use crate::middleware::logging::{to_response, ApiError};

//ROUTERS
pub fn user_api_router(db: Arc<DatabaseConnection>) -> Router {
    let open = Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
        .route("/verify", get(verify));

    let protected = Router::new()
        .route("/logout", post(logout))
        .route("/profile", get(get_account))
        .layer(from_fn_with_state(
            AuthState {
                db: db.clone(),
                role: None,
            },
            auth_middleware,
        ));

    Router::new()
        .merge(open)
        .merge(protected)
        .layer(Extension(db))
}

//ROUTES
async fn register(
    Extension(db): Extension<Arc<DatabaseConnection>>,
    Json(payload): Json<RegisterPayload>,
) -> Response {
    debug!(email = %payload.email, "Called `register()`");

    if let Err(err) = payload.validate() {
        return to_response(
            (
                StatusCode::BAD_REQUEST,
                Json(json!({
                    "error": err.to_string()
                })),
            ),
            Err(ApiError::ValidationFail(err.to_string())),
        );
    }

    let role = match payload.role.as_deref() {
        None => Role::Buyer,
        Some(value) => match Role::from_str(value) {
            Ok(role) => role,
            Err(_) => {
                let tmp = "Invalid role selected";
                return to_response(
                    (StatusCode::BAD_REQUEST, Json(json!({ "error": tmp }))),
                    Err(ApiError::General(tmp.to_string())),
                );
            }
        },
    };

    let txn = match db.begin().await {
        Ok(txn) => txn,
        Err(_) => {
            return to_response(
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({
                        "error": "Internal server error"
                    })),
                ),
                Err(ApiError::TransactionCreationFailed),
            );
        }
    };

    //A verified duplicate blocks registration; an unverified one is a stale
    //record from an abandoned signup and gets replaced.
    match UserEntity::find()
        .filter(user::Column::Email.eq(&*payload.email))
        .one(&txn)
        .await
    {
        Ok(Some(existing)) if existing.is_verified => {
            let tmp = "User already exists and is verified. Please login.";
            return to_response(
                (StatusCode::BAD_REQUEST, Json(json!({ "error": tmp }))),
                Err(ApiError::General(tmp.to_string())),
            );
        }
        Ok(Some(existing)) => {
            let existing: user::ActiveModel = existing.into();
            if let Err(err) = existing.delete(&txn).await {
                let _ = txn.rollback().await;
                return to_response(
                    (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        Json(json!({
                            "error": "Internal server error"
                        })),
                    ),
                    Err(ApiError::DbError(err.to_string())),
                );
            }
        }
        Ok(None) => {}
        Err(err) => {
            return to_response(
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({
                        "error": "Internal server error"
                    })),
                ),
                Err(ApiError::DbError(err.to_string())),
            );
        }
    }

    let password = match hash_password(&payload.password) {
        Ok(password) => password,
        Err(err) => {
            return to_response(
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({
                        "error": "An internal server error occured"
                    })),
                ),
                Err(ApiError::PasswordHashFailed(err.to_string())),
            );
        }
    };

    let new_user = user::ActiveModel {
        username: Set(payload.username),
        email: Set(payload.email),
        password: Set(password),
        role: Set(role),
        is_verified: Set(false),
        ..Default::default()
    };

    let user_id = match user::Entity::insert(new_user).exec(&txn).await {
        Ok(result) => result.last_insert_id,
        Err(err) => {
            debug!(error = ?err, "Insert failed on register");
            let _ = txn.rollback().await;
            return to_response(
                (
                    StatusCode::CONFLICT,
                    Json(json!({
                        "error": "Email already exists"
                    })),
                ),
                Err(ApiError::DbError(err.to_string())),
            );
        }
    };

    if let Err(err) = txn.commit().await {
        return to_response(
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({
                    "error": "Internal server error"
                })),
            ),
            Err(ApiError::DbError(err.to_string())),
        );
    }

    //The original system mailed this token; mail delivery is out of scope,
    //so the client gets it directly and calls /user/verify with it.
    match generate_token(user_id, role.to_string(), Duration::minutes(30)) {
        Ok(token) => to_response(
            (
                StatusCode::CREATED,
                Json(json!({
                    "message": "User registered successfully",
                    "verification_token": token
                })),
            ),
            Ok(()),
        ),
        Err(err) => to_response(
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({
                    "error": "Internal server error"
                })),
            ),
            Err(ApiError::TokenGenerationFailed(err.to_string())),
        ),
    }
}

async fn verify(
    Extension(db): Extension<Arc<DatabaseConnection>>,
    headers: HeaderMap,
) -> Response {
    let token = match bearer_token(&headers) {
        Some(token) => token,
        None => {
            let tmp = "Token is missing";
            return to_response(
                (StatusCode::UNAUTHORIZED, Json(json!({ "error": tmp }))),
                Err(ApiError::General(tmp.to_string())),
            );
        }
    };

    let claims = match decode_claims(token) {
        Ok(claims) => claims,
        Err(err) => {
            return to_response(
                (
                    StatusCode::BAD_REQUEST,
                    Json(json!({
                        "error": err.to_string()
                    })),
                ),
                Err(ApiError::General(err.to_string())),
            );
        }
    };

    let txn = match db.begin().await {
        Ok(txn) => txn,
        Err(_) => {
            return to_response(
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({
                        "error": "Internal server error"
                    })),
                ),
                Err(ApiError::TransactionCreationFailed),
            );
        }
    };

    let user = match UserEntity::find_by_id(claims.user_id).one(&txn).await {
        Ok(Some(user)) => user,
        Ok(None) => {
            let tmp = "User not found";
            return to_response(
                (StatusCode::BAD_REQUEST, Json(json!({ "error": tmp }))),
                Err(ApiError::General(tmp.to_string())),
            );
        }
        Err(err) => {
            return to_response(
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({
                        "error": "Internal server error"
                    })),
                ),
                Err(ApiError::DbError(err.to_string())),
            );
        }
    };

    if !user.is_verified {
        let user_id = user.id;
        let mut user: user::ActiveModel = user.into();
        user.is_verified = Set(true);
        if let Err(err) = user.update(&txn).await {
            let _ = txn.rollback().await;
            return to_response(
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({
                        "error": "Internal server error"
                    })),
                ),
                Err(ApiError::DbError(err.to_string())),
            );
        }

        //Every account gets a blank market profile at verification time.
        //Orders exist only once a checkout actually happens.
        let has_profile = profile::Entity::find()
            .filter(profile::Column::UserId.eq(user_id))
            .one(&txn)
            .await;
        match has_profile {
            Ok(None) => {
                let blank = profile::ActiveModel {
                    user_id: Set(user_id),
                    ..Default::default()
                };
                if let Err(err) = profile::Entity::insert(blank).exec(&txn).await {
                    let _ = txn.rollback().await;
                    return to_response(
                        (
                            StatusCode::INTERNAL_SERVER_ERROR,
                            Json(json!({
                                "error": "Internal server error"
                            })),
                        ),
                        Err(ApiError::DbError(err.to_string())),
                    );
                }
            }
            Ok(Some(_)) => {}
            Err(err) => {
                let _ = txn.rollback().await;
                return to_response(
                    (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        Json(json!({
                            "error": "Internal server error"
                        })),
                    ),
                    Err(ApiError::DbError(err.to_string())),
                );
            }
        }
    }

    match txn.commit().await {
        Ok(_) => to_response(
            (
                StatusCode::OK,
                Json(json!({
                    "message": "User verified successfully"
                })),
            ),
            Ok(()),
        ),
        Err(err) => to_response(
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({
                    "error": "Internal server error"
                })),
            ),
            Err(ApiError::DbError(err.to_string())),
        ),
    }
}

async fn login(
    Extension(db): Extension<Arc<DatabaseConnection>>,
    Json(payload): Json<LoginPayload>,
) -> Response {
    debug!(email = %payload.email, "Called `login()`");

    let txn = match db.begin().await {
        Ok(txn) => txn,
        Err(_) => {
            return to_response(
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({
                        "error": "Internal server error"
                    })),
                ),
                Err(ApiError::TransactionCreationFailed),
            );
        }
    };

    let user = match UserEntity::find()
        .filter(user::Column::Email.eq(&*payload.email))
        .one(&txn)
        .await
    {
        Ok(Some(user)) => user,
        Ok(None) => {
            let tmp = "Invalid email or password";
            return to_response(
                (StatusCode::UNAUTHORIZED, Json(json!({ "error": tmp }))),
                Err(ApiError::General(tmp.to_string())),
            );
        }
        Err(err) => {
            return to_response(
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({
                        "error": "An internal server error occured"
                    })),
                ),
                Err(ApiError::DbError(err.to_string())),
            );
        }
    };

    if user.check_hash(&payload.password).is_err() {
        let tmp = "Invalid email or password";
        return to_response(
            (StatusCode::UNAUTHORIZED, Json(json!({ "error": tmp }))),
            Err(ApiError::General(tmp.to_string())),
        );
    }

    if !user.is_verified {
        let tmp = "Verify your account before logging in";
        return to_response(
            (StatusCode::UNAUTHORIZED, Json(json!({ "error": tmp }))),
            Err(ApiError::General(tmp.to_string())),
        );
    }

    //One live session per user: login replaces whatever was there.
    if let Err(err) = SessionEntity::delete_many()
        .filter(session::Column::UserId.eq(user.id))
        .exec(&txn)
        .await
    {
        let _ = txn.rollback().await;
        return to_response(
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({
                    "error": "Internal server error"
                })),
            ),
            Err(ApiError::DbError(err.to_string())),
        );
    }

    let new_session = session::ActiveModel {
        user_id: Set(user.id),
        created_at: Set(Utc::now()),
        ..Default::default()
    };
    if let Err(err) = SessionEntity::insert(new_session).exec(&txn).await {
        let _ = txn.rollback().await;
        return to_response(
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({
                    "error": "Internal server error"
                })),
            ),
            Err(ApiError::DbError(err.to_string())),
        );
    }

    if let Err(err) = txn.commit().await {
        return to_response(
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({
                    "error": "Internal server error"
                })),
            ),
            Err(ApiError::DbError(err.to_string())),
        );
    }

    match generate_token(user.id, user.role.to_string(), Duration::hours(24)) {
        Ok(token) => to_response(
            (
                StatusCode::OK,
                Json(json!({
                    "message": "User logged in successfully",
                    "token": token,
                    "user": AccountResponse::new(user)
                })),
            ),
            Ok(()),
        ),
        Err(err) => to_response(
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({
                    "error": "Internal server error"
                })),
            ),
            Err(ApiError::TokenGenerationFailed(err.to_string())),
        ),
    }
}

async fn logout(
    Extension(db): Extension<Arc<DatabaseConnection>>,
    Extension(claims): Extension<Claims>,
) -> Response {
    let result = SessionEntity::delete_many()
        .filter(session::Column::UserId.eq(claims.user_id))
        .exec(&*db)
        .await;

    match result {
        Ok(deleted) if deleted.rows_affected > 0 => to_response(
            (
                StatusCode::OK,
                Json(json!({
                    "message": "User logged out successfully"
                })),
            ),
            Ok(()),
        ),
        Ok(_) => {
            let tmp = "User already logged out";
            to_response(
                (StatusCode::BAD_REQUEST, Json(json!({ "error": tmp }))),
                Err(ApiError::General(tmp.to_string())),
            )
        }
        Err(err) => to_response(
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({
                    "error": "Internal server error"
                })),
            ),
            Err(ApiError::DbError(err.to_string())),
        ),
    }
}

async fn get_account(
    Extension(db): Extension<Arc<DatabaseConnection>>,
    Extension(claims): Extension<Claims>,
) -> Response {
    match UserEntity::find_by_id(claims.user_id).one(&*db).await {
        Ok(Some(user)) => to_response(
            (StatusCode::OK, Json(json!(AccountResponse::new(user)))),
            Ok(()),
        ),
        Ok(None) => {
            let tmp = "User not found";
            to_response(
                (StatusCode::NOT_FOUND, Json(json!({ "error": tmp }))),
                Err(ApiError::General(tmp.to_string())),
            )
        }
        Err(err) => to_response(
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({
                    "error": "Internal server error"
                })),
            ),
            Err(ApiError::DbError(err.to_string())),
        ),
    }
}

//utilities
fn hash_password(password: &str) -> Result<String, argon2::password_hash::Error> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();

    let password_hash = argon2
        .hash_password(password.as_bytes(), &salt)?
        .to_string();

    Ok(password_hash)
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
}

//structs
#[derive(Deserialize, Clone, Debug, Validate)]
struct RegisterPayload {
    #[validate(length(min = 3, max = 32))]
    username: String,
    #[validate(email)]
    email: String,
    #[validate(length(min = 8))]
    password: String,
    role: Option<String>,
}

#[derive(Deserialize, Clone, Debug)]
struct LoginPayload {
    email: String,
    password: String,
}

#[derive(Serialize)]
struct AccountResponse {
    id: i32,
    username: String,
    email: String,
    role: String,
    is_verified: bool,
}

impl AccountResponse {
    fn new(value: user::Model) -> AccountResponse {
        AccountResponse {
            id: value.id,
            username: value.username,
            email: value.email,
            role: value.role.to_string(),
            is_verified: value.is_verified,
        }
    }
}
