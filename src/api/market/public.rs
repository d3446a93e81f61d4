use axum::{
    extract::{Extension, Path, Query},
    http::StatusCode,
    response::Response,
    routing::get,
    Json, Router,
};
use sea_orm::{
    ColumnTrait, Condition, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, QuerySelect,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;

use crate::entities::product::{self, Entity as ProductEntity};
use crate::middleware::logging::{to_response, ApiError};

const DEFAULT_PAGE_SIZE: u64 = 20;
const MAX_PAGE_SIZE: u64 = 100;

//ROUTERS
pub fn public_market_router(db: Arc<DatabaseConnection>) -> Router {
    Router::new()
        .route("/products", get(get_products))
        .route("/products/:id", get(get_product))
        .route("/categories", get(get_categories))
        .layer(Extension(db))
}

//ROUTES
async fn get_products(
    Query(params): Query<GetProductsQuery>,
    Extension(db): Extension<Arc<DatabaseConnection>>,
) -> Response {
    let mut finder = ProductEntity::find()
        .filter(product::Column::IsActive.eq(true))
        .filter(product::Column::Stock.gt(0));

    if let Some(category) = params.category {
        finder = finder.filter(product::Column::Category.eq(category));
    }

    if let Some(min) = params.min {
        finder = finder.filter(product::Column::Price.gte(min));
    }

    if let Some(max) = params.max {
        finder = finder.filter(product::Column::Price.lte(max));
    }

    if let Some(query) = params.query {
        finder = finder.filter(Condition::any().add(product::Column::Name.contains(query)));
    }

    let order = match params.order.as_deref() {
        Some("desc") => sea_orm::Order::Desc,
        _ => sea_orm::Order::Asc,
    };

    let sort_column = match params.sort_by.as_deref() {
        Some("price") => product::Column::Price,
        Some("name") => product::Column::Name,
        Some("created") => product::Column::CreatedAt,
        _ => product::Column::Id,
    };

    let page = params.page.unwrap_or(1).max(1);
    let per_page = params
        .per_page
        .unwrap_or(DEFAULT_PAGE_SIZE)
        .clamp(1, MAX_PAGE_SIZE);

    let result = finder
        .order_by(sort_column, order)
        .offset((page - 1) * per_page)
        .limit(per_page)
        .all(&*db)
        .await;

    match result {
        Ok(products) => {
            let response: Vec<PublicProductResponse> = products
                .into_iter()
                .map(PublicProductResponse::new)
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

async fn get_product(
    Path(id): Path<i32>,
    Extension(db): Extension<Arc<DatabaseConnection>>,
) -> Response {
    let result = ProductEntity::find_by_id(id)
        .filter(product::Column::IsActive.eq(true))
        .one(&*db)
        .await;

    match result {
        Ok(Some(prod)) => to_response(
            (StatusCode::OK, Json(PublicProductResponse::new(prod))),
            Ok(()),
        ),
        Ok(None) => {
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

async fn get_categories(Extension(db): Extension<Arc<DatabaseConnection>>) -> Response {
    let result = ProductEntity::find()
        .filter(product::Column::IsActive.eq(true))
        .select_only()
        .column(product::Column::Category)
        .distinct()
        .order_by_asc(product::Column::Category)
        .into_tuple::<String>()
        .all(&*db)
        .await;

    match result {
        Ok(categories) => to_response((StatusCode::OK, Json(categories)), Ok(())),
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

//structs
#[derive(Deserialize)]
struct GetProductsQuery {
    query: Option<String>,
    category: Option<String>,
    min: Option<f32>,
    max: Option<f32>,
    sort_by: Option<String>, //"price", "name" or "created"
    order: Option<String>,   //"asc" or "desc"
    page: Option<u64>,
    per_page: Option<u64>,
}

#[derive(Serialize)]
pub struct PublicProductResponse {
    pub id: i32,
    pub seller_id: i32,
    pub name: String,
    pub description: String,
    pub price: f32,
    pub category: String,
    pub stock: i32,
    pub image_id: Option<i32>,
}

impl PublicProductResponse {
    pub fn new(value: product::Model) -> PublicProductResponse {
        PublicProductResponse {
            id: value.id,
            seller_id: value.seller_id,
            name: value.name,
            description: value.description,
            price: value.price,
            category: value.category,
            stock: value.stock,
            image_id: value.image_id,
        }
    }
}
