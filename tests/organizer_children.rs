#![allow(clippy::unwrap_used, clippy::expect_used)]

mod util;

use axum::http::StatusCode;
use serde_json::json;
use util::{test_app, TestApp};

fn base(event_id: i64, child: &str) -> String {
    format!("/api/v1/organizer/events/{event_id}/{child}")
}

async fn ticket_type(app: &TestApp, event_id: i64, name: &str, total: i64) -> i64 {
    let (status, body) = app
        .post(
            &base(event_id, "ticket-types"),
            json!({ "name": name, "price": 25.5, "quantity_total": total }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    body["data"]["id"].as_i64().unwrap()
}

#[tokio::test]
async fn ticket_types_crud_and_rules() {
    let app = test_app().await;
    let event = app.create_event("Concert").await;
    let uri = base(event, "ticket-types");

    let (status, body) = app.post(&uri, json!({ "price": 1, "quantity_total": 1 })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["context"]["field"], "name");

    let (status, body) = app
        .post(&uri, json!({ "name": "Cheap", "price": -1, "quantity_total": 1 }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "VALIDATION/INVALID_FIELD");

    let (status, body) = app
        .post(
            &uri,
            json!({ "name": "Late", "price": 1, "quantity_total": 1, "sale_start": 50, "sale_end": 10 }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "VALIDATION/TIME_RANGE");

    let vip = ticket_type(&app, event, "VIP", 10).await;
    let (status, body) = app
        .post(&uri, json!({ "name": "VIP", "price": 1, "quantity_total": 1 }))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "TICKET_TYPES/CONFLICT");

    sqlx::query("UPDATE ticket_types SET quantity_sold = 6 WHERE id = ?")
        .bind(vip)
        .execute(&app.pool)
        .await
        .unwrap();
    let (status, body) = app
        .put(&format!("{uri}/{vip}"), json!({ "quantity_total": 5 }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "VALIDATION/QUANTITY_BELOW_SOLD");

    let (status, body) = app
        .put(&format!("{uri}/{vip}"), json!({ "quantity_total": 20, "price": 99 }))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["quantity_total"], 20);
    assert_eq!(body["data"]["price"], 99.0);
    assert_eq!(body["data"]["name"], "VIP");

    let (_, body) = app.get(&uri).await;
    assert_eq!(body["data"].as_array().unwrap().len(), 1);

    assert_eq!(app.delete(&format!("{uri}/{vip}")).await.0, StatusCode::NO_CONTENT);
    assert_eq!(app.delete(&format!("{uri}/{vip}")).await.0, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn children_are_scoped_to_their_event() {
    let app = test_app().await;
    let first = app.create_event("First").await;
    let second = app.create_event("Second").await;
    let tt = ticket_type(&app, first, "GA", 5).await;

    let (status, body) = app
        .put(&format!("{}/{tt}", base(second, "ticket-types")), json!({ "price": 1 }))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "TICKET_TYPES/NOT_FOUND");

    let (status, body) = app
        .post(
            &base(second, "guests"),
            json!({ "name": "Ann", "email": "ann@example.com", "ticket_type_id": tt }),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "TICKET_TYPES/NOT_FOUND");

    let (status, body) = app
        .delete(&format!("{}/abc", base(first, "coupons")))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["context"]["field"], "couponId");
}

#[tokio::test]
async fn guests_are_normalized_and_checked_in_once() {
    let app = test_app().await;
    let event = app.create_event("Meetup").await;
    let tt = ticket_type(&app, event, "GA", 50).await;
    let uri = base(event, "guests");

    let (status, body) = app
        .post(&uri, json!({ "name": "Bo", "email": "not-an-email" }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["context"]["field"], "email");

    let (status, body) = app
        .post(
            &uri,
            json!({ "name": " Bo ", "email": "  Bo@Example.COM ", "ticket_type_id": tt }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let guest = &body["data"];
    assert_eq!(guest["name"], "Bo");
    assert_eq!(guest["email"], "bo@example.com");
    assert_eq!(guest["checked_in"], false);
    let guest_id = guest["id"].as_i64().unwrap();

    let (status, body) = app
        .post(&uri, json!({ "name": "Bo again", "email": "BO@example.com" }))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "GUESTS/CONFLICT");

    let (status, body) = app
        .post(&format!("{uri}/{guest_id}/check-in"), json!({}))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["checked_in"], true);
    let first_time = body["data"]["checked_in_at"].as_i64().unwrap();

    tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    let (_, body) = app
        .post(&format!("{uri}/{guest_id}/check-in"), json!({}))
        .await;
    assert_eq!(body["data"]["checked_in_at"].as_i64().unwrap(), first_time);

    let (status, body) = app
        .put(
            &format!("{uri}/{guest_id}"),
            json!({ "phone": "555-0100", "ticket_type_id": null }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["phone"], "555-0100");
    assert!(body["data"]["ticket_type_id"].is_null());

    assert_eq!(
        app.delete(&format!("{uri}/{guest_id}")).await.0,
        StatusCode::NO_CONTENT
    );
    let (_, body) = app.get(&uri).await;
    assert!(body["data"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn coupons_enforce_discount_rules() {
    let app = test_app().await;
    let event = app.create_event("Sale").await;
    let uri = base(event, "coupons");

    let (status, _) = app
        .post(
            &uri,
            json!({ "code": "half", "discount_type": "PERCENT", "discount_value": 150 }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app
        .post(
            &uri,
            json!({ "code": "x", "discount_type": "FIXED", "discount_value": 5 }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = app
        .post(
            &uri,
            json!({
                "code": " early-bird ",
                "discount_type": "PERCENT",
                "discount_value": 20,
                "usage_limit": 10,
                "valid_from": 100,
                "valid_until": 200
            }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["data"]["code"], "EARLY-BIRD");
    assert_eq!(body["data"]["used_count"], 0);
    let coupon_id = body["data"]["id"].as_i64().unwrap();

    let (status, body) = app
        .post(
            &uri,
            json!({ "code": "EARLY-BIRD", "discount_type": "FIXED", "discount_value": 5 }),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "COUPONS/CONFLICT");

    sqlx::query("UPDATE coupons SET used_count = 4 WHERE id = ?")
        .bind(coupon_id)
        .execute(&app.pool)
        .await
        .unwrap();
    let (status, _) = app
        .put(&format!("{uri}/{coupon_id}"), json!({ "usage_limit": 3 }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = app
        .put(
            &format!("{uri}/{coupon_id}"),
            json!({ "discount_type": "FIXED", "discount_value": 300, "usage_limit": null }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["discount_type"], "FIXED");
    assert!(body["data"]["usage_limit"].is_null());

    assert_eq!(
        app.delete(&format!("{uri}/{coupon_id}")).await.0,
        StatusCode::NO_CONTENT
    );
}

#[tokio::test]
async fn attachments_validate_and_guess_mime() {
    let app = test_app().await;
    let event = app.create_event("Workshop").await;
    let uri = base(event, "attachments");

    let (status, _) = app
        .post(&uri, json!({ "file_name": "../secret.pdf", "url": "https://cdn/x.pdf" }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app
        .post(&uri, json!({ "file_name": "x.pdf", "url": "https://cdn/../x.pdf" }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app
        .post(
            &uri,
            json!({ "file_name": "x.pdf", "url": "https://cdn/x.pdf", "size_bytes": -1 }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = app
        .post(
            &uri,
            json!({ "file_name": "agenda.pdf", "url": "https://cdn/agenda.pdf", "size_bytes": 2048 }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["data"]["mime_type"], "application/pdf");
    let first = body["data"]["id"].as_i64().unwrap();

    let (status, body) = app
        .post(&uri, json!({ "file_name": "copy.pdf", "url": "https://cdn/agenda.pdf" }))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "ATTACHMENTS/CONFLICT");

    let (_, body) = app
        .post(
            &uri,
            json!({ "file_name": "map", "url": "https://cdn/map", "mime_type": "image/png" }),
        )
        .await;
    let second = body["data"]["id"].as_i64().unwrap();

    let (_, body) = app.get(&uri).await;
    let ids: Vec<i64> = body["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|a| a["id"].as_i64().unwrap())
        .collect();
    assert_eq!(ids, vec![second, first]);

    assert_eq!(app.delete(&format!("{uri}/{first}")).await.0, StatusCode::NO_CONTENT);
    assert_eq!(app.delete(&format!("{uri}/{first}")).await.0, StatusCode::NOT_FOUND);
}
