mod common;

use common::{create_product, register_and_login, spawn_app};
use reqwest::StatusCode;
use serde_json::{json, Value};

async fn set_street(client: &reqwest::Client, base: &str, token: &str) {
    let response = client
        .put(format!("{base}/market/profile"))
        .bearer_auth(token)
        .json(&json!({
            "street": "1 Main St",
            "city": "Springfield",
            "zip": "12345",
            "country": "US"
        }))
        .send()
        .await
        .expect("Failed to send profile update");
    assert_eq!(response.status(), StatusCode::OK);
}

async fn add_line(client: &reqwest::Client, base: &str, token: &str, product: i64, qty: i32) {
    let response = client
        .post(format!("{base}/market/cart"))
        .bearer_auth(token)
        .json(&json!({ "product_id": product, "quantity": qty }))
        .send()
        .await
        .expect("Failed to send add request");
    assert_eq!(response.status(), StatusCode::CREATED);
}

async fn product_stock(client: &reqwest::Client, base: &str, product: i64) -> i64 {
    client
        .get(format!("{base}/market/products/{product}"))
        .send()
        .await
        .unwrap()
        .json::<Value>()
        .await
        .unwrap()["stock"]
        .as_i64()
        .unwrap()
}

#[tokio::test]
async fn test_checkout_totals_and_decrements_stock() {
    let base = spawn_app().await;
    let client = reqwest::Client::new();

    let seller = register_and_login(&client, &base, "seller1", "s1@example.com", "seller").await;
    let buyer = register_and_login(&client, &base, "buyer1", "b1@example.com", "buyer").await;
    let product = create_product(&client, &base, &seller, "lamp", 100.0, 5, "home").await;

    set_street(&client, &base, &buyer).await;
    add_line(&client, &base, &buyer, product, 2).await;

    let buy = client
        .post(format!("{base}/market/buy"))
        .bearer_auth(&buyer)
        .send()
        .await
        .expect("Failed to send buy request");
    assert_eq!(buy.status(), StatusCode::OK);
    let body = buy.json::<Value>().await.unwrap();
    let order_id = body["order_id"].as_i64().expect("No order id");

    //price 100 * qty 2
    let orders = client
        .get(format!("{base}/market/orders"))
        .bearer_auth(&buyer)
        .send()
        .await
        .unwrap()
        .json::<Value>()
        .await
        .unwrap();
    let orders = orders["orders"].as_array().unwrap();
    assert_eq!(orders.len(), 1);
    assert_eq!(orders[0]["order"]["id"], order_id);
    assert_eq!(orders[0]["order"]["total_amount"], 200.0);
    assert_eq!(orders[0]["order"]["status"], "placed");
    assert_eq!(orders[0]["items"].as_array().unwrap().len(), 1);
    assert_eq!(orders[0]["items"][0]["price"], 100.0);
    assert_eq!(orders[0]["items"][0]["quantity"], 2);

    assert_eq!(product_stock(&client, &base, product).await, 3);

    //Cart is cleared by a successful checkout.
    let cart = client
        .get(format!("{base}/market/cart"))
        .bearer_auth(&buyer)
        .send()
        .await
        .unwrap()
        .json::<Value>()
        .await
        .unwrap();
    assert!(cart.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_checkout_total_spans_multiple_lines() {
    let base = spawn_app().await;
    let client = reqwest::Client::new();

    let seller = register_and_login(&client, &base, "seller2", "s2@example.com", "seller").await;
    let buyer = register_and_login(&client, &base, "buyer2", "b2@example.com", "buyer").await;
    let mug = create_product(&client, &base, &seller, "mug", 8.0, 10, "home").await;
    let pot = create_product(&client, &base, &seller, "pot", 25.0, 10, "home").await;

    set_street(&client, &base, &buyer).await;
    add_line(&client, &base, &buyer, mug, 3).await;
    add_line(&client, &base, &buyer, pot, 1).await;

    let buy = client
        .post(format!("{base}/market/buy"))
        .bearer_auth(&buyer)
        .send()
        .await
        .unwrap();
    assert_eq!(buy.status(), StatusCode::OK);

    let orders = client
        .get(format!("{base}/market/orders"))
        .bearer_auth(&buyer)
        .send()
        .await
        .unwrap()
        .json::<Value>()
        .await
        .unwrap();
    //8*3 + 25*1
    assert_eq!(orders["orders"][0]["order"]["total_amount"], 49.0);
}

#[tokio::test]
async fn test_checkout_requires_street_address() {
    let base = spawn_app().await;
    let client = reqwest::Client::new();

    let seller = register_and_login(&client, &base, "seller3", "s3@example.com", "seller").await;
    let buyer = register_and_login(&client, &base, "buyer3", "b3@example.com", "buyer").await;
    let product = create_product(&client, &base, &seller, "rug", 30.0, 5, "home").await;

    add_line(&client, &base, &buyer, product, 1).await;

    let buy = client
        .post(format!("{base}/market/buy"))
        .bearer_auth(&buyer)
        .send()
        .await
        .unwrap();
    assert_eq!(buy.status(), StatusCode::BAD_REQUEST);

    //Nothing changed.
    assert_eq!(product_stock(&client, &base, product).await, 5);
}

#[tokio::test]
async fn test_checkout_rejects_empty_cart() {
    let base = spawn_app().await;
    let client = reqwest::Client::new();

    let buyer = register_and_login(&client, &base, "buyer4", "b4@example.com", "buyer").await;
    set_street(&client, &base, &buyer).await;

    let buy = client
        .post(format!("{base}/market/buy"))
        .bearer_auth(&buyer)
        .send()
        .await
        .unwrap();
    assert_eq!(buy.status(), StatusCode::BAD_REQUEST);
    let body = buy.json::<Value>().await.unwrap();
    assert_eq!(body["error"], "Cart is empty");
}

#[tokio::test]
async fn test_failed_checkout_leaves_no_partial_decrement() {
    let base = spawn_app().await;
    let client = reqwest::Client::new();

    let seller = register_and_login(&client, &base, "seller5", "s5@example.com", "seller").await;
    let buyer = register_and_login(&client, &base, "buyer5", "b5@example.com", "buyer").await;
    let plenty = create_product(&client, &base, &seller, "plenty", 10.0, 5, "misc").await;
    let scarce = create_product(&client, &base, &seller, "scarce", 10.0, 2, "misc").await;

    set_street(&client, &base, &buyer).await;
    add_line(&client, &base, &buyer, plenty, 2).await;
    add_line(&client, &base, &buyer, scarce, 2).await;

    //The seller sells out `scarce` between carting and checkout.
    let patch = client
        .put(format!("{base}/market/seller/products/{scarce}"))
        .bearer_auth(&seller)
        .json(&json!({ "stock": 0 }))
        .send()
        .await
        .unwrap();
    assert_eq!(patch.status(), StatusCode::OK);

    let buy = client
        .post(format!("{base}/market/buy"))
        .bearer_auth(&buyer)
        .send()
        .await
        .unwrap();
    assert_eq!(buy.status(), StatusCode::BAD_REQUEST);
    let body = buy.json::<Value>().await.unwrap();
    assert!(body["error"].as_str().unwrap().contains("scarce"));

    //The earlier line's stock must be untouched: the whole checkout is
    //one transaction.
    assert_eq!(product_stock(&client, &base, plenty).await, 5);

    //The cart survives a failed checkout.
    let cart = client
        .get(format!("{base}/market/cart"))
        .bearer_auth(&buyer)
        .send()
        .await
        .unwrap()
        .json::<Value>()
        .await
        .unwrap();
    assert_eq!(cart.as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_order_snapshot_survives_product_edit() {
    let base = spawn_app().await;
    let client = reqwest::Client::new();

    let seller = register_and_login(&client, &base, "seller6", "s6@example.com", "seller").await;
    let buyer = register_and_login(&client, &base, "buyer6", "b6@example.com", "buyer").await;
    let product = create_product(&client, &base, &seller, "old name", 10.0, 5, "misc").await;

    set_street(&client, &base, &buyer).await;
    add_line(&client, &base, &buyer, product, 1).await;

    let buy = client
        .post(format!("{base}/market/buy"))
        .bearer_auth(&buyer)
        .send()
        .await
        .unwrap();
    assert_eq!(buy.status(), StatusCode::OK);

    //Rename and reprice after the purchase.
    let patch = client
        .put(format!("{base}/market/seller/products/{product}"))
        .bearer_auth(&seller)
        .json(&json!({ "name": "new name", "price": 999.0 }))
        .send()
        .await
        .unwrap();
    assert_eq!(patch.status(), StatusCode::OK);

    let orders = client
        .get(format!("{base}/market/orders"))
        .bearer_auth(&buyer)
        .send()
        .await
        .unwrap()
        .json::<Value>()
        .await
        .unwrap();
    assert_eq!(orders["orders"][0]["items"][0]["name"], "old name");
    assert_eq!(orders["orders"][0]["items"][0]["price"], 10.0);
    assert_eq!(orders["orders"][0]["order"]["total_amount"], 10.0);
}

#[tokio::test]
async fn test_profile_update_rejects_malformed_fields() {
    let base = spawn_app().await;
    let client = reqwest::Client::new();

    let buyer = register_and_login(&client, &base, "buyer7", "b7@example.com", "buyer").await;

    //Phone too short, GST not the fixed 15 characters.
    for payload in [
        json!({ "phone": "123" }),
        json!({ "gst_number": "SHORT" }),
    ] {
        let response = client
            .put(format!("{base}/market/profile"))
            .bearer_auth(&buyer)
            .json(&payload)
            .send()
            .await
            .expect("Failed to send profile update");
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    //Nothing was persisted, so checkout still demands an address.
    let buy = client
        .post(format!("{base}/market/buy"))
        .bearer_auth(&buyer)
        .send()
        .await
        .unwrap();
    assert_eq!(buy.status(), StatusCode::BAD_REQUEST);

    let valid = client
        .put(format!("{base}/market/profile"))
        .bearer_auth(&buyer)
        .json(&json!({ "phone": "5551234567", "gst_number": "22AAAAA0000A1Z5" }))
        .send()
        .await
        .unwrap();
    assert_eq!(valid.status(), StatusCode::OK);
}
