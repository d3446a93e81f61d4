use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    response::Response,
    routing::{get, patch, post},
    Json, Router,
};
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set,
    TransactionTrait,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;
use validator::Validate;

use crate::entities::cart::{self, Entity as CartEntity};
use crate::entities::order::{self, Entity as OrderEntity};
use crate::entities::order_item::{self, Entity as OrderItemEntity};
use crate::entities::product::{self, Entity as ProductEntity};
use crate::entities::profile::{self, Entity as ProfileEntity};
use crate::middleware::auth::Claims;
use crate::middleware::logging::{to_response, ApiError};

//ROUTERS
pub fn buyer_router(db: Arc<DatabaseConnection>) -> Router {
    Router::new()
        .route("/cart", get(get_cart).post(add_to_cart))
        .route("/cart/:id", patch(patch_cart_line).delete(remove_cart_line))
        .route("/buy", post(buy))
        .route("/orders", get(get_my_orders))
        .layer(Extension(db))
}

pub fn profile_router(db: Arc<DatabaseConnection>) -> Router {
    Router::new()
        .route("/profile", get(get_market_profile).put(update_market_profile))
        .layer(Extension(db))
}

//ROUTES
async fn get_market_profile(
    Extension(db): Extension<Arc<DatabaseConnection>>,
    Extension(claims): Extension<Claims>,
) -> Response {
    let profile = match ProfileEntity::find()
        .filter(profile::Column::UserId.eq(claims.user_id))
        .one(&*db)
        .await
    {
        Ok(Some(profile)) => profile,
        Ok(None) => {
            let tmp = "Market profile not found. Please update profile.";
            return to_response(
                (StatusCode::NOT_FOUND, Json(json!({ "error": tmp }))),
                Err(ApiError::General(tmp.to_string())),
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

    let orders = match OrderEntity::find()
        .filter(order::Column::BuyerId.eq(claims.user_id))
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

    to_response(
        (
            StatusCode::OK,
            Json(json!({
                "profile": profile,
                "my_orders": orders
            })),
        ),
        Ok(()),
    )
}

async fn update_market_profile(
    Extension(db): Extension<Arc<DatabaseConnection>>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<UpdateProfilePayload>,
) -> Response {
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

    //Upsert: verification normally creates the row, but an account verified
    //before profiles existed still gets one here.
    let existing = match ProfileEntity::find()
        .filter(profile::Column::UserId.eq(claims.user_id))
        .one(&txn)
        .await
    {
        Ok(existing) => existing,
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

    let mut model: profile::ActiveModel = match existing {
        Some(model) => model.into(),
        None => profile::ActiveModel {
            user_id: Set(claims.user_id),
            ..Default::default()
        },
    };

    if let Some(street) = payload.street {
        model.street = Set(Some(street));
    }
    if let Some(city) = payload.city {
        model.city = Set(Some(city));
    }
    if let Some(zip) = payload.zip {
        model.zip = Set(Some(zip));
    }
    if let Some(country) = payload.country {
        model.country = Set(Some(country));
    }
    if let Some(phone) = payload.phone {
        model.phone = Set(Some(phone));
    }
    if let Some(business_name) = payload.business_name {
        model.business_name = Set(Some(business_name));
    }
    if let Some(gst_number) = payload.gst_number {
        model.gst_number = Set(Some(gst_number));
    }

    let result = match model.save(&txn).await {
        Ok(_) => txn.commit().await,
        Err(err) => {
            let _ = txn.rollback().await;
            return to_response(
                (
                    StatusCode::BAD_REQUEST,
                    Json(json!({
                        "error": "Failed to update profile"
                    })),
                ),
                Err(ApiError::DbError(err.to_string())),
            );
        }
    };

    match result {
        Ok(_) => to_response(
            (
                StatusCode::OK,
                Json(json!({
                    "message": "Profile updated successfully"
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

async fn get_cart(
    Extension(db): Extension<Arc<DatabaseConnection>>,
    Extension(claims): Extension<Claims>,
) -> Response {
    let result = CartEntity::find()
        .filter(cart::Column::UserId.eq(claims.user_id))
        .find_also_related(ProductEntity)
        .all(&*db)
        .await;

    match result {
        Ok(entries) => {
            let response: Vec<CartLineResponse> = entries
                .into_iter()
                .map(|(line, prod)| CartLineResponse::new(line, prod))
                .collect();
            to_response((StatusCode::OK, Json(response)), Ok(()))
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

async fn add_to_cart(
    Extension(db): Extension<Arc<DatabaseConnection>>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<AddToCart>,
) -> Response {
    debug!(payload = ?payload, "Called `add_to_cart()`");
    let user_id = claims.user_id;

    if payload.quantity <= 0 {
        let tmp = "Quantity should be greater than 0";
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

    let product = match ProductEntity::find_by_id(payload.product_id)
        .filter(product::Column::IsActive.eq(true))
        .one(&txn)
        .await
    {
        Ok(Some(product)) => product,
        Ok(None) => {
            let tmp = format!("No product with {} id was found", payload.product_id);
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

    let existing = match CartEntity::find()
        .filter(cart::Column::UserId.eq(user_id))
        .filter(cart::Column::ProductId.eq(payload.product_id))
        .one(&txn)
        .await
    {
        Ok(existing) => existing,
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

    //The line quantity after this mutation may not exceed current stock.
    //checked_add: a line already at i32::MAX must land in the over-stock
    //branch, not wrap around it.
    let current = existing.as_ref().map(|e| e.quantity).unwrap_or(0);
    let new_quantity = match current.checked_add(payload.quantity) {
        Some(quantity) if quantity <= product.stock => quantity,
        _ => {
            let tmp = format!("Only {} of '{}' in stock", product.stock, product.name);
            return to_response(
                (StatusCode::BAD_REQUEST, Json(json!({ "error": tmp }))),
                Err(ApiError::General(tmp)),
            );
        }
    };

    let result = match existing {
        Some(entry) => {
            let mut entry: cart::ActiveModel = entry.into();
            entry.quantity = Set(new_quantity);
            entry.update(&txn).await.map(|_| ())
        }
        None => {
            let new_entry = cart::ActiveModel {
                user_id: Set(user_id),
                product_id: Set(payload.product_id),
                quantity: Set(payload.quantity),
                added_at: Set(Utc::now()),
                ..Default::default()
            };
            CartEntity::insert(new_entry).exec(&txn).await.map(|_| ())
        }
    };

    match result {
        Ok(_) => match txn.commit().await {
            Ok(_) => to_response(
                (
                    StatusCode::CREATED,
                    Json(json!({
                        "message": "Added to cart successfully"
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
            let _ = txn.rollback().await;
            to_response(
                (
                    StatusCode::BAD_REQUEST,
                    Json(json!({
                        "error": "Failed to update the cart"
                    })),
                ),
                Err(ApiError::DbError(err.to_string())),
            )
        }
    }
}

async fn patch_cart_line(
    Path(id): Path<i32>,
    Extension(claims): Extension<Claims>,
    Extension(db): Extension<Arc<DatabaseConnection>>,
    Json(payload): Json<PatchCartLine>,
) -> Response {
    let user_id = claims.user_id;

    if payload.quantity < 0 {
        let tmp = "Quantity cannot be negative";
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

    let entry = match CartEntity::find_by_id(id)
        .filter(cart::Column::UserId.eq(user_id))
        .one(&txn)
        .await
    {
        Ok(Some(entry)) => entry,
        Ok(None) => {
            let tmp = format!("No cart line with {} id was found.", id);
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

    //Zero removes the line; a positive value overwrites it, bounded by stock.
    let result = if payload.quantity == 0 {
        let entry: cart::ActiveModel = entry.into();
        entry.delete(&txn).await.map(|_| ())
    } else {
        let stock = match ProductEntity::find_by_id(entry.product_id).one(&txn).await {
            Ok(Some(product)) => product.stock,
            Ok(None) => 0,
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
        if payload.quantity > stock {
            let tmp = format!("Only {} in stock", stock);
            return to_response(
                (StatusCode::BAD_REQUEST, Json(json!({ "error": tmp }))),
                Err(ApiError::General(tmp)),
            );
        }
        let mut entry: cart::ActiveModel = entry.into();
        entry.quantity = Set(payload.quantity);
        entry.update(&txn).await.map(|_| ())
    };

    match result {
        Ok(_) => {
            let _ = txn.commit().await;
            to_response(
                (
                    StatusCode::OK,
                    Json(json!({
                        "message": "Cart updated successfully"
                    })),
                ),
                Ok(()),
            )
        }
        Err(err) => {
            let _ = txn.rollback().await;
            to_response(
                (
                    StatusCode::BAD_REQUEST,
                    Json(json!({
                        "error": "Failed to update the cart"
                    })),
                ),
                Err(ApiError::DbError(err.to_string())),
            )
        }
    }
}

async fn remove_cart_line(
    Path(id): Path<i32>,
    Extension(claims): Extension<Claims>,
    Extension(db): Extension<Arc<DatabaseConnection>>,
) -> Response {
    let result = CartEntity::delete_many()
        .filter(cart::Column::Id.eq(id))
        .filter(cart::Column::UserId.eq(claims.user_id))
        .exec(&*db)
        .await;

    match result {
        Ok(deleted) if deleted.rows_affected > 0 => to_response(
            (
                StatusCode::OK,
                Json(json!({
                    "message": "Cart line removed successfully"
                })),
            ),
            Ok(()),
        ),
        Ok(_) => {
            let tmp = format!("No cart line with {} id was found.", id);
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

//Checkout. Everything happens inside one transaction: validate every line
//first, then decrement stock, write the order with its snapshots, clear the
//cart and commit. A failure on any line rolls the whole thing back, so no
//partial stock decrement can survive.
async fn buy(
    Extension(db): Extension<Arc<DatabaseConnection>>,
    Extension(claims): Extension<Claims>,
) -> Response {
    let user_id = claims.user_id;

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

    let lines = match CartEntity::find()
        .filter(cart::Column::UserId.eq(user_id))
        .all(&txn)
        .await
    {
        Ok(lines) => lines,
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

    if lines.is_empty() {
        let tmp = "Cart is empty";
        return to_response(
            (StatusCode::BAD_REQUEST, Json(json!({ "error": tmp }))),
            Err(ApiError::General(tmp.to_string())),
        );
    }

    let shipping = match ProfileEntity::find()
        .filter(profile::Column::UserId.eq(user_id))
        .one(&txn)
        .await
    {
        Ok(Some(profile)) if profile.street.as_deref().is_some_and(|s| !s.is_empty()) => profile,
        Ok(_) => {
            let tmp = "Complete your market profile (address) before buying";
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
                        "error": "Internal server error."
                    })),
                ),
                Err(ApiError::DbError(err.to_string())),
            );
        }
    };

    //Pass 1: validate every line before touching any stock.
    let mut total_amount = 0f32;
    let mut checked: Vec<(product::Model, i32)> = Vec::with_capacity(lines.len());
    for line in &lines {
        let product = match ProductEntity::find_by_id(line.product_id).one(&txn).await {
            Ok(Some(product)) if product.is_active => product,
            Ok(_) => {
                let _ = txn.rollback().await;
                let tmp = "One or more items in your cart no longer exist";
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
                            "error": "Internal server error."
                        })),
                    ),
                    Err(ApiError::DbError(err.to_string())),
                );
            }
        };

        if product.stock < line.quantity {
            let _ = txn.rollback().await;
            let tmp = format!(
                "Item '{}' is out of stock: {} left",
                product.name, product.stock
            );
            return to_response(
                (StatusCode::BAD_REQUEST, Json(json!({ "error": tmp }))),
                Err(ApiError::General(tmp)),
            );
        }

        total_amount += product.price * line.quantity as f32;
        checked.push((product, line.quantity));
    }

    //Pass 2: decrement stock and snapshot each line.
    let mut snapshots: Vec<order_item::ActiveModel> = Vec::with_capacity(checked.len());
    for (product, quantity) in checked {
        let snapshot = order_item::ActiveModel {
            product_id: Set(product.id),
            seller_id: Set(product.seller_id),
            name: Set(product.name.clone()),
            price: Set(product.price),
            quantity: Set(quantity),
            image_id: Set(product.image_id),
            ..Default::default()
        };

        let stock = product.stock;
        let mut product: product::ActiveModel = product.into();
        product.stock = Set(stock - quantity);
        if let Err(err) = product.update(&txn).await {
            let _ = txn.rollback().await;
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

        snapshots.push(snapshot);
    }

    let new_order = order::ActiveModel {
        buyer_id: Set(user_id),
        total_amount: Set(total_amount),
        status: Set(order::Status::Placed),
        payment_id: Set(format!("DEMO-{}", Uuid::new_v4())),
        ship_street: Set(shipping.street.unwrap_or_default()),
        ship_city: Set(shipping.city),
        ship_zip: Set(shipping.zip),
        ship_country: Set(shipping.country),
        created_at: Set(Utc::now()),
        ..Default::default()
    };

    let order_id = match OrderEntity::insert(new_order).exec(&txn).await {
        Ok(result) => result.last_insert_id,
        Err(err) => {
            let _ = txn.rollback().await;
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

    for snapshot in &mut snapshots {
        snapshot.order_id = Set(order_id);
    }
    if let Err(err) = OrderItemEntity::insert_many(snapshots).exec(&txn).await {
        let _ = txn.rollback().await;
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

    if let Err(err) = CartEntity::delete_many()
        .filter(cart::Column::UserId.eq(user_id))
        .exec(&txn)
        .await
    {
        let _ = txn.rollback().await;
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

    match txn.commit().await {
        Ok(_) => {
            info!(order_id, buyer_id = user_id, total_amount, "Order placed");
            to_response(
                (
                    StatusCode::OK,
                    Json(json!({
                        "message": "Order placed",
                        "order_id": order_id
                    })),
                ),
                Ok(()),
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

async fn get_my_orders(
    Extension(db): Extension<Arc<DatabaseConnection>>,
    Extension(claims): Extension<Claims>,
) -> Response {
    let orders = match OrderEntity::find()
        .filter(order::Column::BuyerId.eq(claims.user_id))
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

    let mut response = Vec::with_capacity(orders.len());
    for order in orders {
        let items = match OrderItemEntity::find()
            .filter(order_item::Column::OrderId.eq(order.id))
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
        response.push(json!({
            "order": order,
            "items": items
        }));
    }

    to_response(
        (
            StatusCode::OK,
            Json(json!({
                "orders": response
            })),
        ),
        Ok(()),
    )
}

//structs
#[derive(Deserialize, Debug)]
struct AddToCart {
    product_id: i32,
    quantity: i32,
}

#[derive(Deserialize)]
struct PatchCartLine {
    quantity: i32,
}

#[derive(Deserialize, Validate)]
struct UpdateProfilePayload {
    #[validate(length(min = 1, max = 128))]
    street: Option<String>,
    #[validate(length(min = 1, max = 64))]
    city: Option<String>,
    #[validate(length(min = 3, max = 16))]
    zip: Option<String>,
    #[validate(length(min = 2, max = 64))]
    country: Option<String>,
    #[validate(length(min = 7, max = 20))]
    phone: Option<String>,
    #[validate(length(min = 1, max = 128))]
    business_name: Option<String>,
    #[validate(length(min = 15, max = 15))]
    gst_number: Option<String>,
}

#[derive(Serialize)]
struct CartLineResponse {
    id: i32,
    product_id: i32,
    quantity: i32,
    name: Option<String>,
    price: Option<f32>,
    stock: Option<i32>,
    image_id: Option<i32>,
}

impl CartLineResponse {
    fn new(line: cart::Model, product: Option<product::Model>) -> CartLineResponse {
        match product {
            Some(product) => CartLineResponse {
                id: line.id,
                product_id: line.product_id,
                quantity: line.quantity,
                name: Some(product.name),
                price: Some(product.price),
                stock: Some(product.stock),
                image_id: product.image_id,
            },
            None => CartLineResponse {
                id: line.id,
                product_id: line.product_id,
                quantity: line.quantity,
                name: None,
                price: None,
                stock: None,
                image_id: None,
            },
        }
    }
}
