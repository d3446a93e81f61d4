use sea_orm::{ConnectOptions, Database};
use serde_json::{json, Value};
use std::sync::Arc;

use ekart::api::create_api_router;
use ekart::entities::setup_schema;

//Boots the full router against a fresh in-memory database and returns the
//base url. Every test gets its own server and its own database.
pub async fn spawn_app() -> String {
    std::env::set_var("SECRET", "test-secret");
    std::env::set_var(
        "UPLOAD_DIR",
        std::env::temp_dir().join("ekart-test-uploads").display().to_string(),
    );

    //A pool of one keeps the whole app on the single in-memory database.
    let mut opts = ConnectOptions::new("sqlite::memory:");
    opts.max_connections(1);
    let db = Database::connect(opts)
        .await
        .expect("Failed to open in-memory database");
    setup_schema(&db).await;

    let app = create_api_router(Arc::new(db));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind test listener");
    let addr = listener.local_addr().expect("No local addr");
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("Test server died");
    });

    format!("http://{}", addr)
}

//Full signup path: register, redeem the verification token, login.
//Returns a bearer token for the new account.
pub async fn register_and_login(
    client: &reqwest::Client,
    base: &str,
    username: &str,
    email: &str,
    role: &str,
) -> String {
    let register_response = client
        .post(format!("{base}/user/register"))
        .json(&json!({
            "username": username,
            "email": email,
            "password": "Secret15pass",
            "role": role
        }))
        .send()
        .await
        .expect("Failed to send register request");
    assert_eq!(register_response.status(), reqwest::StatusCode::CREATED);

    let body = register_response
        .json::<Value>()
        .await
        .expect("Failed to parse register response");
    let verification_token = body["verification_token"]
        .as_str()
        .expect("No verification token in register response");

    let verify_response = client
        .get(format!("{base}/user/verify"))
        .bearer_auth(verification_token)
        .send()
        .await
        .expect("Failed to send verify request");
    assert_eq!(verify_response.status(), reqwest::StatusCode::OK);

    let login_response = client
        .post(format!("{base}/user/login"))
        .json(&json!({
            "email": email,
            "password": "Secret15pass"
        }))
        .send()
        .await
        .expect("Failed to send login request");
    assert_eq!(login_response.status(), reqwest::StatusCode::OK);

    let body = login_response
        .json::<Value>()
        .await
        .expect("Failed to parse login response");
    body["token"]
        .as_str()
        .expect("Token not found in login response")
        .to_string()
}

pub async fn create_product(
    client: &reqwest::Client,
    base: &str,
    seller_token: &str,
    name: &str,
    price: f32,
    stock: i32,
    category: &str,
) -> i64 {
    let response = client
        .post(format!("{base}/market/seller/products"))
        .bearer_auth(seller_token)
        .json(&json!({
            "name": name,
            "description": "test product",
            "price": price,
            "category": category,
            "stock": stock
        }))
        .send()
        .await
        .expect("Failed to send create product request");
    assert_eq!(response.status(), reqwest::StatusCode::CREATED);

    let body = response
        .json::<Value>()
        .await
        .expect("Failed to parse create product response");
    body["product_id"]
        .as_i64()
        .expect("No product id in response")
}
