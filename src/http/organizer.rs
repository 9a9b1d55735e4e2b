use axum::{
    extract::{rejection::JsonRejection, Path, State},
    response::Response,
    routing::{get, post, put},
    Json, Router,
};

use super::response::{created, json_body, no_content, ok};
use crate::{
    attachments::{self, AttachmentCreate},
    coupons::{self, CouponCreate, CouponUpdate},
    events::{self, Event, EventCreate, EventUpdate},
    guests::{self, GuestCreate, GuestUpdate},
    state::AppState,
    ticket_types::{self, TicketTypeCreate, TicketTypeUpdate},
    validation::parse_id,
    AppResult,
};

/// Routes mounted under `/api/v1/organizer`.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/events", get(list_events).post(create_event))
        .route(
            "/events/:eventId",
            get(get_event).put(update_event).delete(delete_event),
        )
        .route("/events/:eventId/copy", post(copy_event))
        .route(
            "/events/:eventId/ticket-types",
            get(list_ticket_types).post(create_ticket_type),
        )
        .route(
            "/events/:eventId/ticket-types/:ticketTypeId",
            put(update_ticket_type).delete(delete_ticket_type),
        )
        .route("/events/:eventId/guests", get(list_guests).post(create_guest))
        .route(
            "/events/:eventId/guests/:guestId",
            put(update_guest).delete(delete_guest),
        )
        .route("/events/:eventId/guests/:guestId/check-in", post(check_in_guest))
        .route("/events/:eventId/coupons", get(list_coupons).post(create_coupon))
        .route(
            "/events/:eventId/coupons/:couponId",
            put(update_coupon).delete(delete_coupon),
        )
        .route(
            "/events/:eventId/attachments",
            get(list_attachments).post(create_attachment),
        )
        .route(
            "/events/:eventId/attachments/:attachmentId",
            axum::routing::delete(delete_attachment),
        )
}

/// Parse `:eventId` and make sure the organizer can see that event.
async fn visible_event(state: &AppState, raw_event_id: &str) -> AppResult<Event> {
    let event_id = parse_id(raw_event_id, "eventId")?;
    events::require_event(&state.pool, state.organizer_id(), event_id).await
}

// events

async fn list_events(State(state): State<AppState>) -> AppResult<Response> {
    let events = events::list_events(&state.pool, state.organizer_id()).await?;
    Ok(ok(events))
}

async fn create_event(
    State(state): State<AppState>,
    payload: Result<Json<EventCreate>, JsonRejection>,
) -> AppResult<Response> {
    let body = json_body(payload)?;
    let event = events::create_draft(&state.pool, state.organizer_id(), body).await?;
    Ok(created(event))
}

async fn get_event(
    State(state): State<AppState>,
    Path(event_id): Path<String>,
) -> AppResult<Response> {
    Ok(ok(visible_event(&state, &event_id).await?))
}

async fn update_event(
    State(state): State<AppState>,
    Path(event_id): Path<String>,
    payload: Result<Json<EventUpdate>, JsonRejection>,
) -> AppResult<Response> {
    let event_id = parse_id(&event_id, "eventId")?;
    let patch = json_body(payload)?;
    let event = events::update_event(&state.pool, state.organizer_id(), event_id, patch).await?;
    Ok(ok(event))
}

async fn delete_event(
    State(state): State<AppState>,
    Path(event_id): Path<String>,
) -> AppResult<Response> {
    let event_id = parse_id(&event_id, "eventId")?;
    events::delete_event(&state.pool, state.organizer_id(), event_id).await?;
    Ok(no_content())
}

async fn copy_event(
    State(state): State<AppState>,
    Path(event_id): Path<String>,
) -> AppResult<Response> {
    let event_id = parse_id(&event_id, "eventId")?;
    let copy = events::copy_event(&state.pool, state.organizer_id(), event_id).await?;
    Ok(created(copy))
}

// ticket types

async fn list_ticket_types(
    State(state): State<AppState>,
    Path(event_id): Path<String>,
) -> AppResult<Response> {
    let event = visible_event(&state, &event_id).await?;
    Ok(ok(ticket_types::list(&state.pool, event.id).await?))
}

async fn create_ticket_type(
    State(state): State<AppState>,
    Path(event_id): Path<String>,
    payload: Result<Json<TicketTypeCreate>, JsonRejection>,
) -> AppResult<Response> {
    let event = visible_event(&state, &event_id).await?;
    let body = json_body(payload)?;
    Ok(created(ticket_types::create(&state.pool, event.id, body).await?))
}

async fn update_ticket_type(
    State(state): State<AppState>,
    Path((event_id, ticket_type_id)): Path<(String, String)>,
    payload: Result<Json<TicketTypeUpdate>, JsonRejection>,
) -> AppResult<Response> {
    let event = visible_event(&state, &event_id).await?;
    let id = parse_id(&ticket_type_id, "ticketTypeId")?;
    let patch = json_body(payload)?;
    Ok(ok(ticket_types::update(&state.pool, event.id, id, patch).await?))
}

async fn delete_ticket_type(
    State(state): State<AppState>,
    Path((event_id, ticket_type_id)): Path<(String, String)>,
) -> AppResult<Response> {
    let event = visible_event(&state, &event_id).await?;
    let id = parse_id(&ticket_type_id, "ticketTypeId")?;
    ticket_types::delete(&state.pool, event.id, id).await?;
    Ok(no_content())
}

// guests

async fn list_guests(
    State(state): State<AppState>,
    Path(event_id): Path<String>,
) -> AppResult<Response> {
    let event = visible_event(&state, &event_id).await?;
    Ok(ok(guests::list(&state.pool, event.id).await?))
}

async fn create_guest(
    State(state): State<AppState>,
    Path(event_id): Path<String>,
    payload: Result<Json<GuestCreate>, JsonRejection>,
) -> AppResult<Response> {
    let event = visible_event(&state, &event_id).await?;
    let body = json_body(payload)?;
    Ok(created(guests::create(&state.pool, event.id, body).await?))
}

async fn update_guest(
    State(state): State<AppState>,
    Path((event_id, guest_id)): Path<(String, String)>,
    payload: Result<Json<GuestUpdate>, JsonRejection>,
) -> AppResult<Response> {
    let event = visible_event(&state, &event_id).await?;
    let id = parse_id(&guest_id, "guestId")?;
    let patch = json_body(payload)?;
    Ok(ok(guests::update(&state.pool, event.id, id, patch).await?))
}

async fn check_in_guest(
    State(state): State<AppState>,
    Path((event_id, guest_id)): Path<(String, String)>,
) -> AppResult<Response> {
    let event = visible_event(&state, &event_id).await?;
    let id = parse_id(&guest_id, "guestId")?;
    Ok(ok(guests::check_in(&state.pool, event.id, id).await?))
}

async fn delete_guest(
    State(state): State<AppState>,
    Path((event_id, guest_id)): Path<(String, String)>,
) -> AppResult<Response> {
    let event = visible_event(&state, &event_id).await?;
    let id = parse_id(&guest_id, "guestId")?;
    guests::delete(&state.pool, event.id, id).await?;
    Ok(no_content())
}

// coupons

async fn list_coupons(
    State(state): State<AppState>,
    Path(event_id): Path<String>,
) -> AppResult<Response> {
    let event = visible_event(&state, &event_id).await?;
    Ok(ok(coupons::list(&state.pool, event.id).await?))
}

async fn create_coupon(
    State(state): State<AppState>,
    Path(event_id): Path<String>,
    payload: Result<Json<CouponCreate>, JsonRejection>,
) -> AppResult<Response> {
    let event = visible_event(&state, &event_id).await?;
    let body = json_body(payload)?;
    Ok(created(coupons::create(&state.pool, event.id, body).await?))
}

async fn update_coupon(
    State(state): State<AppState>,
    Path((event_id, coupon_id)): Path<(String, String)>,
    payload: Result<Json<CouponUpdate>, JsonRejection>,
) -> AppResult<Response> {
    let event = visible_event(&state, &event_id).await?;
    let id = parse_id(&coupon_id, "couponId")?;
    let patch = json_body(payload)?;
    Ok(ok(coupons::update(&state.pool, event.id, id, patch).await?))
}

async fn delete_coupon(
    State(state): State<AppState>,
    Path((event_id, coupon_id)): Path<(String, String)>,
) -> AppResult<Response> {
    let event = visible_event(&state, &event_id).await?;
    let id = parse_id(&coupon_id, "couponId")?;
    coupons::delete(&state.pool, event.id, id).await?;
    Ok(no_content())
}

// attachments

async fn list_attachments(
    State(state): State<AppState>,
    Path(event_id): Path<String>,
) -> AppResult<Response> {
    let event = visible_event(&state, &event_id).await?;
    Ok(ok(attachments::list(&state.pool, event.id).await?))
}

async fn create_attachment(
    State(state): State<AppState>,
    Path(event_id): Path<String>,
    payload: Result<Json<AttachmentCreate>, JsonRejection>,
) -> AppResult<Response> {
    let event = visible_event(&state, &event_id).await?;
    let body = json_body(payload)?;
    Ok(created(attachments::create(&state.pool, event.id, body).await?))
}

async fn delete_attachment(
    State(state): State<AppState>,
    Path((event_id, attachment_id)): Path<(String, String)>,
) -> AppResult<Response> {
    let event = visible_event(&state, &event_id).await?;
    let id = parse_id(&attachment_id, "attachmentId")?;
    attachments::delete(&state.pool, event.id, id).await?;
    Ok(no_content())
}
