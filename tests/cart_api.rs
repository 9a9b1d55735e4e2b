#![allow(clippy::unwrap_used, clippy::expect_used)]

mod util;

use axum::http::StatusCode;
use serde_json::json;
use util::{test_app, TestApp};

/// Create a product with one variant holding `stock` units; returns the variant id.
async fn variant(app: &TestApp, sku: &str, stock: i64) -> i64 {
    let (status, body) = app
        .post(
            "/api/v1/products",
            json!({
                "name": format!("Item {sku}"),
                "base_price": 12.5,
                "variants": [{ "sku": sku, "stock_quantity": stock, "option1_name": "Color", "option1_value": "Red" }]
            }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    body["data"]["variants"][0]["id"].as_i64().unwrap()
}

async fn ticket_type(app: &TestApp, event_id: i64, name: &str, total: i64) -> i64 {
    let (status, body) = app
        .post(
            &format!("/api/v1/organizer/events/{event_id}/ticket-types"),
            json!({ "name": name, "price": 40, "quantity_total": total }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    body["data"]["id"].as_i64().unwrap()
}

fn add_product(variant_id: i64, quantity: i64) -> serde_json::Value {
    json!({ "item_type": "products", "product_variant_id": variant_id, "quantity": quantity })
}

fn add_ticket(ticket_type_id: i64) -> serde_json::Value {
    json!({ "item_type": "ticket_types", "ticket_type_id": ticket_type_id })
}

#[tokio::test]
async fn empty_cart_has_no_id() {
    let app = test_app().await;
    let (status, body) = app.get("/api/v1/cart").await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["data"]["id"].is_null());
    assert_eq!(body["data"]["user_id"], 1);
    assert!(body["data"]["items"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn adding_the_same_variant_increments_the_line() {
    let app = test_app().await;
    let v = variant(&app, "CAP-RED", 5).await;

    let (status, body) = app.post("/api/v1/cart", add_product(v, 2)).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    let line_id = body["data"]["id"].as_i64().unwrap();
    assert_eq!(body["data"]["quantity"], 2);
    assert_eq!(body["data"]["item_type"], "products");

    let (_, body) = app.post("/api/v1/cart", add_product(v, 1)).await;
    assert_eq!(body["data"]["id"], line_id);
    assert_eq!(body["data"]["quantity"], 3);

    let (_, body) = app.get("/api/v1/cart").await;
    let cart = &body["data"];
    assert!(cart["id"].is_i64());
    let items = cart["items"].as_array().unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0]["quantity"], 3);
    assert_eq!(items[0]["product_variant"]["sku"], "CAP-RED");
    assert_eq!(items[0]["product_variant"]["product"]["name"], "Item CAP-RED");
    assert!(items[0].get("ticket_type").is_none());
}

#[tokio::test]
async fn stock_limits_are_enforced() {
    let app = test_app().await;
    let v = variant(&app, "PIN", 3).await;
    app.post("/api/v1/cart", add_product(v, 2)).await;

    let (status, body) = app.post("/api/v1/cart", add_product(v, 2)).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "CART/INSUFFICIENT_STOCK");
    assert_eq!(body["context"]["remaining"], "1");

    let (status, body) = app.post("/api/v1/cart", add_product(v, 0)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["context"]["field"], "quantity");

    let (status, body) = app.post("/api/v1/cart", add_product(9999, 1)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "PRODUCTS/VARIANT_NOT_FOUND");

    let (status, body) = app
        .post("/api/v1/cart", json!({ "item_type": "coupons", "code": "X" }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "JSON/INVALID_BODY");
}

#[tokio::test]
async fn huge_quantity_on_existing_line_is_out_of_stock() {
    let app = test_app().await;
    let v = variant(&app, "STICKER", 5).await;
    let (_, body) = app.post("/api/v1/cart", add_product(v, 1)).await;
    let line = body["data"]["id"].as_i64().unwrap();

    let (status, body) = app.post("/api/v1/cart", add_product(v, i64::MAX)).await;
    assert_eq!(status, StatusCode::CONFLICT, "{body}");
    assert_eq!(body["code"], "CART/INSUFFICIENT_STOCK");
    assert_eq!(body["context"]["remaining"], "4");

    let (_, body) = app.get("/api/v1/cart").await;
    assert_eq!(body["data"]["items"][0]["id"], line);
    assert_eq!(body["data"]["items"][0]["quantity"], 1);
}

#[tokio::test]
async fn tickets_are_single_and_one_per_event() {
    let app = test_app().await;
    let event = app.create_event("Gig").await;
    let ga = ticket_type(&app, event, "GA", 10).await;
    let vip = ticket_type(&app, event, "VIP", 1).await;

    sqlx::query("UPDATE ticket_types SET quantity_sold = 1 WHERE id = ?")
        .bind(vip)
        .execute(&app.pool)
        .await
        .unwrap();
    let (status, body) = app.post("/api/v1/cart", add_ticket(vip)).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "CART/SOLD_OUT");

    let (status, body) = app.post("/api/v1/cart", add_ticket(ga)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["quantity"], 1);
    let line = body["data"]["id"].as_i64().unwrap();

    let (status, body) = app.post("/api/v1/cart", add_ticket(ga)).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "CART/DUPLICATE_EVENT_TICKET");

    let (status, body) = app
        .patch(&format!("/api/v1/cart/items/{line}"), json!({ "quantity": 2 }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "VALIDATION/TICKET_QUANTITY_FIXED");

    let (_, body) = app.get("/api/v1/cart").await;
    let ticket = &body["data"]["items"][0]["ticket_type"];
    assert_eq!(ticket["name"], "GA");
    assert_eq!(ticket["event_title"], "Gig");

    let (status, _) = app.post("/api/v1/cart", add_ticket(4242)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn quantity_updates_check_stock() {
    let app = test_app().await;
    let v = variant(&app, "BAG", 4).await;
    let (_, body) = app.post("/api/v1/cart", add_product(v, 1)).await;
    let line = body["data"]["id"].as_i64().unwrap();
    let uri = format!("/api/v1/cart/items/{line}");

    let (status, body) = app.patch(&uri, json!({ "quantity": 4 })).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["quantity"], 4);

    let (status, body) = app.patch(&uri, json!({ "quantity": 5 })).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "CART/INSUFFICIENT_STOCK");

    let (status, _) = app.patch(&uri, json!({})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = app
        .patch("/api/v1/cart/items/777", json!({ "quantity": 1 }))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "CART/ITEM_NOT_FOUND");
}

#[tokio::test]
async fn lines_can_be_removed_and_cart_cleared() {
    let app = test_app().await;
    let first = variant(&app, "A", 5).await;
    let second = variant(&app, "B", 5).await;
    let (_, body) = app.post("/api/v1/cart", add_product(first, 1)).await;
    let first_line = body["data"]["id"].as_i64().unwrap();
    app.post("/api/v1/cart", add_product(second, 1)).await;

    let (_, body) = app.get("/api/v1/cart").await;
    let items = body["data"]["items"].as_array().unwrap();
    assert_eq!(items.len(), 2);
    assert_eq!(items[0]["product_variant_id"], second);

    let uri = format!("/api/v1/cart/items/{first_line}");
    assert_eq!(app.delete(&uri).await.0, StatusCode::NO_CONTENT);
    let (status, body) = app.delete(&uri).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "CART/ITEM_NOT_FOUND");

    let (status, body) = app.delete("/api/v1/cart").await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    assert!(body.is_null());
    let (_, body) = app.get("/api/v1/cart").await;
    assert!(body["data"]["id"].is_i64());
    assert!(body["data"]["items"].as_array().unwrap().is_empty());
}
