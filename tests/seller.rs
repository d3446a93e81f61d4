mod common;

use common::{create_product, register_and_login, spawn_app};
use reqwest::StatusCode;
use serde_json::{json, Value};

#[tokio::test]
async fn test_duplicate_product_name_per_seller() {
    let base = spawn_app().await;
    let client = reqwest::Client::new();

    let seller = register_and_login(&client, &base, "seller1", "s1@example.com", "seller").await;
    create_product(&client, &base, &seller, "twice", 1.0, 1, "misc").await;

    let duplicate = client
        .post(format!("{base}/market/seller/products"))
        .bearer_auth(&seller)
        .json(&json!({
            "name": "twice",
            "description": "again",
            "price": 2.0,
            "category": "misc",
            "stock": 2
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(duplicate.status(), StatusCode::BAD_REQUEST);

    //A different seller may use the same name.
    let other = register_and_login(&client, &base, "seller1b", "s1b@example.com", "seller").await;
    create_product(&client, &base, &other, "twice", 1.0, 1, "misc").await;
}

#[tokio::test]
async fn test_my_products_lists_only_own() {
    let base = spawn_app().await;
    let client = reqwest::Client::new();

    let seller_a = register_and_login(&client, &base, "seller2a", "s2a@example.com", "seller").await;
    let seller_b = register_and_login(&client, &base, "seller2b", "s2b@example.com", "seller").await;
    create_product(&client, &base, &seller_a, "mine", 1.0, 1, "misc").await;
    create_product(&client, &base, &seller_b, "theirs", 1.0, 1, "misc").await;

    let mine = client
        .get(format!("{base}/market/seller/products"))
        .bearer_auth(&seller_a)
        .send()
        .await
        .unwrap()
        .json::<Value>()
        .await
        .unwrap();
    let mine = mine.as_array().unwrap();
    assert_eq!(mine.len(), 1);
    assert_eq!(mine[0]["name"], "mine");
}

#[tokio::test]
async fn test_edit_and_delete_are_owner_scoped() {
    let base = spawn_app().await;
    let client = reqwest::Client::new();

    let owner = register_and_login(&client, &base, "seller3", "s3@example.com", "seller").await;
    let intruder = register_and_login(&client, &base, "seller3x", "s3x@example.com", "seller").await;
    let product = create_product(&client, &base, &owner, "guarded", 5.0, 5, "misc").await;

    let foreign_edit = client
        .put(format!("{base}/market/seller/products/{product}"))
        .bearer_auth(&intruder)
        .json(&json!({ "price": 1.0 }))
        .send()
        .await
        .unwrap();
    assert_eq!(foreign_edit.status(), StatusCode::NOT_FOUND);

    let foreign_delete = client
        .delete(format!("{base}/market/seller/products/{product}"))
        .bearer_auth(&intruder)
        .send()
        .await
        .unwrap();
    assert_eq!(foreign_delete.status(), StatusCode::NOT_FOUND);

    let own_edit = client
        .put(format!("{base}/market/seller/products/{product}"))
        .bearer_auth(&owner)
        .json(&json!({ "price": 6.5, "stock": 7 }))
        .send()
        .await
        .unwrap();
    assert_eq!(own_edit.status(), StatusCode::OK);

    let detail = client
        .get(format!("{base}/market/products/{product}"))
        .send()
        .await
        .unwrap()
        .json::<Value>()
        .await
        .unwrap();
    assert_eq!(detail["price"], 6.5);
    assert_eq!(detail["stock"], 7);

    let own_delete = client
        .delete(format!("{base}/market/seller/products/{product}"))
        .bearer_auth(&owner)
        .send()
        .await
        .unwrap();
    assert_eq!(own_delete.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_sales_history_shows_own_items_and_earnings() {
    let base = spawn_app().await;
    let client = reqwest::Client::new();

    let seller_a = register_and_login(&client, &base, "seller4a", "s4a@example.com", "seller").await;
    let seller_b = register_and_login(&client, &base, "seller4b", "s4b@example.com", "seller").await;
    let buyer = register_and_login(&client, &base, "buyer4", "b4@example.com", "buyer").await;

    let from_a = create_product(&client, &base, &seller_a, "from-a", 10.0, 5, "misc").await;
    let from_b = create_product(&client, &base, &seller_b, "from-b", 7.0, 5, "misc").await;

    let profile = client
        .put(format!("{base}/market/profile"))
        .bearer_auth(&buyer)
        .json(&json!({ "street": "1 Main St" }))
        .send()
        .await
        .unwrap();
    assert_eq!(profile.status(), StatusCode::OK);

    for (product, qty) in [(from_a, 2), (from_b, 1)] {
        let add = client
            .post(format!("{base}/market/cart"))
            .bearer_auth(&buyer)
            .json(&json!({ "product_id": product, "quantity": qty }))
            .send()
            .await
            .unwrap();
        assert_eq!(add.status(), StatusCode::CREATED);
    }

    let buy = client
        .post(format!("{base}/market/buy"))
        .bearer_auth(&buyer)
        .send()
        .await
        .unwrap();
    assert_eq!(buy.status(), StatusCode::OK);

    //Seller A sees only the from-a item, with earnings 10 * 2.
    let history = client
        .get(format!("{base}/market/seller/history"))
        .bearer_auth(&seller_a)
        .send()
        .await
        .unwrap()
        .json::<Value>()
        .await
        .unwrap();
    let history = history.as_array().unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0]["total_earnings"], 20.0);
    let items = history[0]["items_sold"].as_array().unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0]["name"], "from-a");
    assert_eq!(history[0]["buyer"]["username"], "buyer4");

    //A seller with no sales sees an empty history.
    let fresh = register_and_login(&client, &base, "seller4c", "s4c@example.com", "seller").await;
    let empty = client
        .get(format!("{base}/market/seller/history"))
        .bearer_auth(&fresh)
        .send()
        .await
        .unwrap()
        .json::<Value>()
        .await
        .unwrap();
    assert!(empty.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_buyer_token_cannot_use_seller_routes() {
    let base = spawn_app().await;
    let client = reqwest::Client::new();

    let buyer = register_and_login(&client, &base, "buyer5", "b5@example.com", "buyer").await;

    let response = client
        .post(format!("{base}/market/seller/products"))
        .bearer_auth(&buyer)
        .json(&json!({
            "name": "nope",
            "description": "nope",
            "price": 1.0,
            "category": "misc",
            "stock": 1
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_create_product_rejects_missing_image() {
    let base = spawn_app().await;
    let client = reqwest::Client::new();

    let seller = register_and_login(&client, &base, "seller6", "s6@example.com", "seller").await;

    let response = client
        .post(format!("{base}/market/seller/products"))
        .bearer_auth(&seller)
        .json(&json!({
            "name": "pictureless",
            "description": "x",
            "price": 1.0,
            "category": "misc",
            "stock": 1,
            "image_id": 4242
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
