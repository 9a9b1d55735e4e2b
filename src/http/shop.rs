use axum::{
    extract::{rejection::JsonRejection, Path, State},
    response::Response,
    routing::{get, patch},
    Json, Router,
};

use super::response::{created, json_body, no_content, ok};
use crate::{
    cart::{self, AddToCart, QuantityUpdate},
    products::{self, ProductCreate, ProductUpdate},
    state::AppState,
    validation::parse_id,
    AppResult,
};

/// Routes mounted under `/api/v1/products`.
pub fn products_router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_products).post(create_product))
        .route(
            "/:id",
            get(get_product).put(update_product).delete(delete_product),
        )
}

/// Routes mounted under `/api/v1/cart`.
pub fn cart_router() -> Router<AppState> {
    Router::new()
        .route("/", get(get_cart).post(add_to_cart).delete(clear_cart))
        .route(
            "/items/:cartItemId",
            patch(update_cart_item).delete(remove_cart_item),
        )
}

async fn list_products(State(state): State<AppState>) -> AppResult<Response> {
    Ok(ok(products::list(&state.pool).await?))
}

async fn get_product(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Response> {
    let id = parse_id(&id, "id")?;
    Ok(ok(products::get(&state.pool, id).await?))
}

async fn create_product(
    State(state): State<AppState>,
    payload: Result<Json<ProductCreate>, JsonRejection>,
) -> AppResult<Response> {
    let body = json_body(payload)?;
    Ok(created(products::create(&state.pool, body).await?))
}

async fn update_product(
    State(state): State<AppState>,
    Path(id): Path<String>,
    payload: Result<Json<ProductUpdate>, JsonRejection>,
) -> AppResult<Response> {
    let id = parse_id(&id, "id")?;
    let patch = json_body(payload)?;
    Ok(ok(products::update(&state.pool, id, patch).await?))
}

async fn delete_product(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Response> {
    let id = parse_id(&id, "id")?;
    Ok(ok(products::delete(&state.pool, id).await?))
}

async fn get_cart(State(state): State<AppState>) -> AppResult<Response> {
    Ok(ok(cart::get_cart(&state.pool, state.user_id()).await?))
}

async fn add_to_cart(
    State(state): State<AppState>,
    payload: Result<Json<AddToCart>, JsonRejection>,
) -> AppResult<Response> {
    let request = json_body(payload)?;
    Ok(ok(cart::add_item(&state.pool, state.user_id(), request).await?))
}

async fn update_cart_item(
    State(state): State<AppState>,
    Path(item_id): Path<String>,
    payload: Result<Json<QuantityUpdate>, JsonRejection>,
) -> AppResult<Response> {
    let item_id = parse_id(&item_id, "cartItemId")?;
    let update = json_body(payload)?;
    Ok(ok(
        cart::update_quantity(&state.pool, state.user_id(), item_id, update).await?,
    ))
}

async fn remove_cart_item(
    State(state): State<AppState>,
    Path(item_id): Path<String>,
) -> AppResult<Response> {
    let item_id = parse_id(&item_id, "cartItemId")?;
    cart::remove_item(&state.pool, state.user_id(), item_id).await?;
    Ok(no_content())
}

async fn clear_cart(State(state): State<AppState>) -> AppResult<Response> {
    cart::clear(&state.pool, state.user_id()).await?;
    Ok(no_content())
}
