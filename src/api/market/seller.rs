use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    response::Response,
    routing::{get, post, put},
    Json, Router,
};
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set,
    TransactionTrait,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

use crate::entities::image::Entity as ImageEntity;
use crate::entities::order::{self, Entity as OrderEntity};
use crate::entities::order_item::{self, Entity as OrderItemEntity};
use crate::entities::product::{self, Entity as ProductEntity};
use crate::entities::user::{self, Entity as UserEntity};
use crate::middleware::auth::Claims;
use crate::middleware::logging::{to_response, ApiError};

//ROUTERS
pub fn seller_router(db: Arc<DatabaseConnection>) -> Router {
    Router::new()
        .route("/seller/products", post(create_product).get(get_my_products))
        .route(
            "/seller/products/:id",
            put(edit_product).delete(delete_product),
        )
        .route("/seller/history", get(get_sales_history))
        .layer(Extension(db))
}

//ROUTES
async fn create_product(
    Extension(db): Extension<Arc<DatabaseConnection>>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<CreateProduct>,
) -> Response {
    debug!(payload = ?payload, "Called `create_product()`");
    let seller_id = claims.user_id;

    if payload.price < 0.0 || payload.stock < 0 {
        let tmp = "Price and stock cannot be negative";
        return to_response(
            (StatusCode::BAD_REQUEST, Json(json!({ "error": tmp }))),
            Err(ApiError::General(tmp.to_string())),
        );
    }

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

    //One name per seller.
    match ProductEntity::find()
        .filter(product::Column::SellerId.eq(seller_id))
        .filter(product::Column::Name.eq(&*payload.name))
        .one(&txn)
        .await
    {
        Ok(Some(_)) => {
            let tmp = "Product with this name already exists";
            return to_response(
                (StatusCode::BAD_REQUEST, Json(json!({ "error": tmp }))),
                Err(ApiError::General(tmp.to_string())),
            );
        }
        Ok(None) => {}
        Err(err) => {
            return to_response(
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({
                        "error": "Internal server error."
                    })),
                ),
                Err(ApiError::DbError(err.to_string())),
            );
        }
    }

    if let Some(image_id) = payload.image_id {
        match ImageEntity::find_by_id(image_id).one(&txn).await {
            Ok(Some(_)) => {}
            Ok(None) => {
                let tmp = format!("Image with id {} not found", image_id);
                return to_response(
                    (StatusCode::NOT_FOUND, Json(json!({ "error": tmp }))),
                    Err(ApiError::General(tmp)),
                );
            }
            Err(err) => {
                return to_response(
                    (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        Json(json!({
                            "error": "Internal server error."
                        })),
                    ),
                    Err(ApiError::DbError(err.to_string())),
                );
            }
        }
    }

    let new_product = product::ActiveModel {
        seller_id: Set(seller_id),
        name: Set(payload.name),
        description: Set(payload.description),
        price: Set(payload.price),
        category: Set(payload.category),
        stock: Set(payload.stock),
        image_id: Set(payload.image_id),
        is_active: Set(payload.is_active.unwrap_or(true)),
        created_at: Set(Utc::now()),
        ..Default::default()
    };

    match ProductEntity::insert(new_product).exec(&txn).await {
        Ok(result) => match txn.commit().await {
            Ok(_) => to_response(
                (
                    StatusCode::CREATED,
                    Json(json!({
                        "message": "Product created successfully",
                        "product_id": result.last_insert_id
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
        },
        Err(err) => {
            debug!(error = ?err, "Insert failed on create_product");
            let _ = txn.rollback().await;
            to_response(
                (
                    StatusCode::CONFLICT,
                    Json(json!({
                        "error": "Product already exists"
                    })),
                ),
                Err(ApiError::DbError(err.to_string())),
            )
        }
    }
}

async fn get_my_products(
    Extension(db): Extension<Arc<DatabaseConnection>>,
    Extension(claims): Extension<Claims>,
) -> Response {
    let result = ProductEntity::find()
        .filter(product::Column::SellerId.eq(claims.user_id))
        .order_by_desc(product::Column::CreatedAt)
        .all(&*db)
        .await;

    match result {
        Ok(products) => to_response((StatusCode::OK, Json(products)), Ok(())),
        Err(err) => to_response(
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({
                    "error": "Internal server error."
                })),
            ),
            Err(ApiError::DbError(err.to_string())),
        ),
    }
}

async fn edit_product(
    Path(id): Path<i32>,
    Extension(db): Extension<Arc<DatabaseConnection>>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<PatchProduct>,
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

    //Scoped to the caller: someone else's product is indistinguishable
    //from a missing one.
    let model = match ProductEntity::find_by_id(id)
        .filter(product::Column::SellerId.eq(claims.user_id))
        .one(&txn)
        .await
    {
        Ok(Some(model)) => model,
        Ok(None) => {
            let tmp = format!("No product with {} id was found.", id);
            return to_response(
                (StatusCode::NOT_FOUND, Json(json!({ "error": tmp }))),
                Err(ApiError::General(tmp)),
            );
        }
        Err(err) => {
            return to_response(
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({
                        "error": "Internal server error."
                    })),
                ),
                Err(ApiError::DbError(err.to_string())),
            );
        }
    };

    let mut model: product::ActiveModel = model.into();

    if let Some(name) = payload.name {
        if !name.is_empty() {
            model.name = Set(name);
        }
    }
    if let Some(description) = payload.description {
        model.description = Set(description);
    }
    if let Some(price) = payload.price {
        if price < 0.0 {
            let tmp = "Price cannot be negative";
            return to_response(
                (StatusCode::BAD_REQUEST, Json(json!({ "error": tmp }))),
                Err(ApiError::General(tmp.to_string())),
            );
        }
        model.price = Set(price);
    }
    if let Some(category) = payload.category {
        model.category = Set(category);
    }
    if let Some(stock) = payload.stock {
        if stock < 0 {
            let tmp = "Stock cannot be negative";
            return to_response(
                (StatusCode::BAD_REQUEST, Json(json!({ "error": tmp }))),
                Err(ApiError::General(tmp.to_string())),
            );
        }
        model.stock = Set(stock);
    }
    if let Some(image_id) = payload.image_id {
        match ImageEntity::find_by_id(image_id).one(&txn).await {
            Ok(Some(_)) => model.image_id = Set(Some(image_id)),
            Ok(None) => {
                let tmp = format!("Image with id {} not found", image_id);
                return to_response(
                    (StatusCode::NOT_FOUND, Json(json!({ "error": tmp }))),
                    Err(ApiError::General(tmp)),
                );
            }
            Err(err) => {
                return to_response(
                    (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        Json(json!({
                            "error": "Internal server error."
                        })),
                    ),
                    Err(ApiError::DbError(err.to_string())),
                );
            }
        }
    }
    if let Some(is_active) = payload.is_active {
        model.is_active = Set(is_active);
    }

    match model.update(&txn).await {
        Ok(_) => match txn.commit().await {
            Ok(_) => to_response(
                (
                    StatusCode::OK,
                    Json(json!({
                        "message": "Product updated successfully"
                    })),
                ),
                Ok(()),
            ),
            Err(err) => to_response(
                (
                    StatusCode::CONFLICT,
                    Json(json!({
                        "error": "Failed to commit product update"
                    })),
                ),
                Err(ApiError::DbError(err.to_string())),
            ),
        },
        Err(err) => {
            let _ = txn.rollback().await;
            to_response(
                (
                    StatusCode::BAD_REQUEST,
                    Json(json!({
                        "error": "Failed to update this product"
                    })),
                ),
                Err(ApiError::DbError(err.to_string())),
            )
        }
    }
}

async fn delete_product(
    Path(id): Path<i32>,
    Extension(db): Extension<Arc<DatabaseConnection>>,
    Extension(claims): Extension<Claims>,
) -> Response {
    let result = ProductEntity::delete_many()
        .filter(product::Column::Id.eq(id))
        .filter(product::Column::SellerId.eq(claims.user_id))
        .exec(&*db)
        .await;

    match result {
        Ok(deleted) if deleted.rows_affected > 0 => to_response(
            (
                StatusCode::OK,
                Json(json!({
                    "message": "Product deleted successfully"
                })),
            ),
            Ok(()),
        ),
        Ok(_) => {
            let tmp = format!("No product with {} id was found.", id);
            to_response(
                (StatusCode::NOT_FOUND, Json(json!({ "error": tmp }))),
                Err(ApiError::General(tmp)),
            )
        }
        Err(err) => to_response(
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({
                    "error": "Internal server error."
                })),
            ),
            Err(ApiError::DbError(err.to_string())),
        ),
    }
}

//Orders that contain this seller's items, newest first, trimmed down to
//those items. Earnings are summed over the snapshotted prices, so later
//product edits never change history.
async fn get_sales_history(
    Extension(db): Extension<Arc<DatabaseConnection>>,
    Extension(claims): Extension<Claims>,
) -> Response {
    let items = match OrderItemEntity::find()
        .filter(order_item::Column::SellerId.eq(claims.user_id))
        .all(&*db)
        .await
    {
        Ok(items) => items,
        Err(err) => {
            return to_response(
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({
                        "error": "Internal server error."
                    })),
                ),
                Err(ApiError::DbError(err.to_string())),
            );
        }
    };

    let mut by_order: HashMap<i32, Vec<order_item::Model>> = HashMap::new();
    for item in items {
        by_order.entry(item.order_id).or_default().push(item);
    }

    let order_ids: Vec<i32> = by_order.keys().copied().collect();
    let orders = match OrderEntity::find()
        .filter(order::Column::Id.is_in(order_ids))
        .order_by_desc(order::Column::CreatedAt)
        .all(&*db)
        .await
    {
        Ok(orders) => orders,
        Err(err) => {
            return to_response(
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({
                        "error": "Internal server error."
                    })),
                ),
                Err(ApiError::DbError(err.to_string())),
            );
        }
    };

    let buyer_ids: Vec<i32> = orders.iter().map(|o| o.buyer_id).collect();
    let buyers: HashMap<i32, user::Model> = match UserEntity::find()
        .filter(user::Column::Id.is_in(buyer_ids))
        .all(&*db)
        .await
    {
        Ok(users) => users.into_iter().map(|u| (u.id, u)).collect(),
        Err(err) => {
            return to_response(
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({
                        "error": "Internal server error."
                    })),
                ),
                Err(ApiError::DbError(err.to_string())),
            );
        }
    };

    let history: Vec<SaleRecord> = orders
        .into_iter()
        .map(|order| {
            let items_sold = by_order.remove(&order.id).unwrap_or_default();
            let total_earnings = items_sold
                .iter()
                .map(|i| i.price * i.quantity as f32)
                .sum();
            let buyer = buyers.get(&order.buyer_id).map(|b| {
                json!({
                    "id": b.id,
                    "username": b.username,
                    "email": b.email
                })
            });
            SaleRecord {
                order_id: order.id,
                buyer,
                date: order.created_at.to_rfc3339(),
                status: order.status.to_string(),
                items_sold,
                total_earnings,
            }
        })
        .collect();

    to_response((StatusCode::OK, Json(history)), Ok(()))
}

//structs
#[derive(Deserialize, Clone, Debug)]
struct CreateProduct {
    name: String,
    description: String,
    price: f32,
    category: String,
    stock: i32,
    image_id: Option<i32>,
    is_active: Option<bool>,
}

#[derive(Deserialize, Debug)]
struct PatchProduct {
    name: Option<String>,
    description: Option<String>,
    price: Option<f32>,
    category: Option<String>,
    stock: Option<i32>,
    image_id: Option<i32>,
    is_active: Option<bool>,
}

#[derive(Serialize)]
struct SaleRecord {
    order_id: i32,
    buyer: Option<serde_json::Value>,
    date: String,
    status: String,
    items_sold: Vec<order_item::Model>,
    total_earnings: f32,
}
