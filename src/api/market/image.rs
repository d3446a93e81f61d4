use axum::routing::{get, post};
use axum::{
    extract::{Extension, Multipart, Path},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::Response,
    Json, Router,
};
use dotenvy::dotenv;
use lazy_static::lazy_static;
use once_cell::sync::Lazy;
use regex::Regex;
use sea_orm::{DatabaseConnection, EntityTrait, Set, TransactionTrait};
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use tokio_util::io::ReaderStream;
use uuid::Uuid;

use crate::entities::image::{self, Entity as ImageEntity, FileExtension};
use crate::middleware::logging::{to_response, ApiError};

lazy_static! {
    static ref FILE_NAME_REGEX: Regex = Regex::new(r"^[a-zA-Z0-9_-]{3,25}$").unwrap();
}

static ALLOWED_CONTENT_TYPES: Lazy<HashMap<&'static str, FileExtension>> = Lazy::new(|| {
    HashMap::from([
        ("image/jpeg", FileExtension::Jpg),
        ("image/png", FileExtension::Png),
    ])
});

//ROUTERS
pub fn public_image_router(db: Arc<DatabaseConnection>) -> Router {
    Router::new()
        .route("/image/:id", get(print_image))
        .layer(Extension(db))
}

pub fn upload_router(db: Arc<DatabaseConnection>) -> Router {
    Router::new()
        .route("/seller/upload", post(upload))
        .layer(Extension(db))
}

//ROUTES
pub async fn print_image(
    Path(id): Path<i32>,
    Extension(db): Extension<Arc<DatabaseConnection>>,
) -> Response {
    let path = match ImageEntity::find_by_id(id).one(&*db).await {
        Ok(Some(model)) => format!(
            "{}/{}.{}",
            upload_dir(),
            model.path_name,
            model.extension
        ),
        Ok(None) => {
            let tmp = format!("Image not found with {id} id");
            return to_response(
                (
                    StatusCode::NOT_FOUND,
                    Json(json!({
                        "error": tmp
                    })),
                ),
                Err(ApiError::General(tmp)),
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

    let file = match tokio::fs::File::open(&path).await {
        Ok(file) => file,
        Err(err) => {
            return to_response(
                (
                    StatusCode::NOT_FOUND,
                    Json(json!({
                        "error": "Not found"
                    })),
                ),
                Err(ApiError::General(err.to_string())),
            );
        }
    };

    let content_type = mime_guess::from_path(&path)
        .first_raw()
        .unwrap_or("application/octet-stream");

    let stream = ReaderStream::new(file);
    let body = axum::body::Body::from_stream(stream);

    let mut headers = HeaderMap::new();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_str(content_type)
            .unwrap_or(HeaderValue::from_static("application/octet-stream")),
    );
    headers.insert(
        header::CONTENT_DISPOSITION,
        HeaderValue::from_static("inline"),
    );

    to_response((headers, body), Ok(()))
}

async fn upload(
    Extension(db): Extension<Arc<DatabaseConnection>>,
    mut multipart: Multipart,
) -> Response {
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

    let field = match multipart.next_field().await.unwrap_or(None) {
        Some(field) => field,
        None => {
            let tmp = "Multipart body contains no file field";
            return to_response(
                (StatusCode::BAD_REQUEST, Json(json!({ "error": tmp }))),
                Err(ApiError::General(tmp.to_string())),
            );
        }
    };

    let content_type = match field.content_type() {
        Some(content_type) => content_type.to_owned(),
        None => {
            let tmp = "Content type is not set.";
            return to_response(
                (StatusCode::BAD_REQUEST, Json(json!({ "error": tmp }))),
                Err(ApiError::General(tmp.to_string())),
            );
        }
    };

    let file_extension = match ALLOWED_CONTENT_TYPES.get(content_type.as_str()) {
        Some(&ext) => ext,
        None => {
            let tmp = "Unsupported content type.";
            return to_response(
                (StatusCode::BAD_REQUEST, Json(json!({ "error": tmp }))),
                Err(ApiError::General(tmp.to_string())),
            );
        }
    };

    let file_name = match field.name() {
        Some(name) => name.to_owned(),
        None => {
            let tmp = "File name is not set.";
            return to_response(
                (StatusCode::BAD_REQUEST, Json(json!({ "error": tmp }))),
                Err(ApiError::General(tmp.to_string())),
            );
        }
    };

    if !FILE_NAME_REGEX.is_match(&file_name) {
        return to_response(
            (
                StatusCode::BAD_REQUEST,
                Json(json!({
                    "error": "Invalid file name. It should contain only Latin letters, numbers, '-', or '_'."
                })),
            ),
            Err(ApiError::General("Regex match failed".to_string())),
        );
    }

    let data = match field.bytes().await {
        Ok(data) => data,
        Err(err) => {
            return to_response(
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({
                        "error": "Failed to read file bytes."
                    })),
                ),
                Err(ApiError::General(format!("Multipart error: {err}"))),
            );
        }
    };

    if data.len() > get_file_size_limit() {
        let tmp = "Payload too large";
        return to_response(
            (
                StatusCode::PAYLOAD_TOO_LARGE,
                Json(json!({ "error": tmp })),
            ),
            Err(ApiError::General(tmp.to_string())),
        );
    }

    let path_name = Uuid::new_v4().to_string();
    let new_image = image::ActiveModel {
        file_name: Set(file_name.clone()),
        path_name: Set(path_name.clone()),
        extension: Set(file_extension),
        ..Default::default()
    };

    let image_id = match ImageEntity::insert(new_image).exec(&txn).await {
        Ok(result) => result.last_insert_id,
        Err(err) => {
            let _ = txn.rollback().await;
            return to_response(
                (
                    StatusCode::CONFLICT,
                    Json(json!({
                        "error": "Image already exists"
                    })),
                ),
                Err(ApiError::DbError(err.to_string())),
            );
        }
    };

    let dir = upload_dir();
    if tokio::fs::create_dir_all(&dir).await.is_err() {
        let _ = txn.rollback().await;
        return to_response(
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({
                    "error": "Failed to upload file to the server"
                })),
            ),
            Err(ApiError::General("Upload dir is not writable".to_string())),
        );
    }

    match tokio::fs::write(format!("{}/{}.{}", dir, path_name, file_extension), data).await {
        Ok(_) => match txn.commit().await {
            Ok(_) => to_response(
                (
                    StatusCode::CREATED,
                    Json(json!({
                        "message": "File uploaded successfully.",
                        "image_id": image_id
                    })),
                ),
                Ok(()),
            ),
            Err(err) => to_response(
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({
                        "error": "Internal server error."
                    })),
                ),
                Err(ApiError::DbError(err.to_string())),
            ),
        },
        Err(err) => {
            let _ = txn.rollback().await;
            to_response(
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({
                        "error": "Failed to upload file to the server"
                    })),
                ),
                Err(ApiError::General(err.to_string())),
            )
        }
    }
}

//utils
fn upload_dir() -> String {
    dotenv().ok();
    std::env::var("UPLOAD_DIR").unwrap_or_else(|_| "./uploads".to_string())
}

fn get_file_size_limit() -> usize {
    dotenv().ok();
    std::env::var("UPLOAD_SIZE_LIMIT")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(5 * 1024 * 1024)
}
