use futures::FutureExt;
use serde::{Deserialize, Serialize};
use sqlx::{sqlite::SqliteRow, Row, SqliteConnection, SqlitePool};
use std::str::FromStr;
use thiserror::Error;

use crate::{db::run_in_tx, products, ticket_types, time::now_ms, AppError, AppResult};

pub const CART_AREA: &str = "CART";
pub const CART_INSUFFICIENT_STOCK: &str = "CART/INSUFFICIENT_STOCK";
pub const CART_SOLD_OUT: &str = "CART/SOLD_OUT";
pub const CART_DUPLICATE_EVENT_TICKET: &str = "CART/DUPLICATE_EVENT_TICKET";
pub const CART_ITEM_NOT_FOUND: &str = "CART/ITEM_NOT_FOUND";
pub const VALIDATION_TICKET_QUANTITY_FIXED: &str = "VALIDATION/TICKET_QUANTITY_FIXED";

const ITEM_COLUMNS: &str =
    "ci.id, ci.cart_id, ci.item_type, ci.product_variant_id, ci.ticket_type_id, ci.quantity, ci.added_at";

/// Cart rule violations. Each maps onto a stable `CART/*` code.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CartError {
    #[error("Not enough stock left for this item")]
    InsufficientStock {
        product_variant_id: i64,
        requested: i64,
        remaining: i64,
    },
    #[error("This ticket type is sold out")]
    SoldOut { ticket_type_id: i64 },
    #[error("Your cart already holds a ticket for this event")]
    DuplicateEventTicket { event_id: i64 },
    #[error("Cart item not found")]
    ItemNotFound { cart_item_id: i64 },
    #[error("Ticket lines always hold exactly one ticket")]
    TicketQuantityFixed { cart_item_id: i64 },
}

impl CartError {
    pub fn code(&self) -> &'static str {
        match self {
            CartError::InsufficientStock { .. } => CART_INSUFFICIENT_STOCK,
            CartError::SoldOut { .. } => CART_SOLD_OUT,
            CartError::DuplicateEventTicket { .. } => CART_DUPLICATE_EVENT_TICKET,
            CartError::ItemNotFound { .. } => CART_ITEM_NOT_FOUND,
            CartError::TicketQuantityFixed { .. } => VALIDATION_TICKET_QUANTITY_FIXED,
        }
    }
}

impl From<CartError> for AppError {
    fn from(err: CartError) -> Self {
        let base = AppError::new(err.code(), err.to_string());
        match err {
            CartError::InsufficientStock {
                product_variant_id,
                requested,
                remaining,
            } => base.with_contexts([
                ("product_variant_id", product_variant_id.to_string()),
                ("requested", requested.to_string()),
                ("remaining", remaining.to_string()),
            ]),
            CartError::SoldOut { ticket_type_id } => {
                base.with_context("ticket_type_id", ticket_type_id.to_string())
            }
            CartError::DuplicateEventTicket { event_id } => {
                base.with_context("event_id", event_id.to_string())
            }
            CartError::ItemNotFound { cart_item_id }
            | CartError::TicketQuantityFixed { cart_item_id } => {
                base.with_context("cart_item_id", cart_item_id.to_string())
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CartItemType {
    Products,
    TicketTypes,
}

impl CartItemType {
    pub const fn as_str(self) -> &'static str {
        match self {
            CartItemType::Products => "products",
            CartItemType::TicketTypes => "ticket_types",
        }
    }
}

impl FromStr for CartItemType {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "products" => Ok(CartItemType::Products),
            "ticket_types" => Ok(CartItemType::TicketTypes),
            other => Err(AppError::new("CART/DECODE", "Unknown cart item type")
                .with_context("value", other.to_string())),
        }
    }
}

/// Body of `POST /api/v1/cart`, discriminated by `item_type`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "item_type", rename_all = "snake_case")]
pub enum AddToCart {
    Products {
        product_variant_id: i64,
        quantity: i64,
    },
    TicketTypes {
        ticket_type_id: i64,
    },
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct QuantityUpdate {
    #[serde(default)]
    pub quantity: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartItem {
    pub id: i64,
    pub cart_id: i64,
    pub item_type: CartItemType,
    pub product_variant_id: Option<i64>,
    pub ticket_type_id: Option<i64>,
    pub quantity: i64,
    pub added_at: i64,
}

impl TryFrom<&SqliteRow> for CartItem {
    type Error = AppError;

    fn try_from(row: &SqliteRow) -> Result<Self, Self::Error> {
        let item_type: String = row.try_get("item_type").map_err(AppError::from)?;
        Ok(Self {
            id: row.try_get("id").map_err(AppError::from)?,
            cart_id: row.try_get("cart_id").map_err(AppError::from)?,
            item_type: item_type.parse()?,
            product_variant_id: row.try_get("product_variant_id").map_err(AppError::from)?,
            ticket_type_id: row.try_get("ticket_type_id").map_err(AppError::from)?,
            quantity: row.try_get("quantity").map_err(AppError::from)?,
            added_at: row.try_get("added_at").map_err(AppError::from)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CartProduct {
    pub id: i64,
    pub name: String,
    pub base_price: f64,
    pub image_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CartVariant {
    pub id: i64,
    pub option1_name: Option<String>,
    pub option1_value: Option<String>,
    pub option2_name: Option<String>,
    pub option2_value: Option<String>,
    pub sku: Option<String>,
    pub stock_quantity: i64,
    pub price_offset: f64,
    pub product: CartProduct,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CartTicket {
    pub id: i64,
    pub event_id: i64,
    pub name: String,
    pub price: f64,
    pub event_title: String,
}

/// A cart line with the thing it points at embedded.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CartLine {
    #[serde(flatten)]
    pub item: CartItem,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub product_variant: Option<CartVariant>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ticket_type: Option<CartTicket>,
}

impl TryFrom<&SqliteRow> for CartLine {
    type Error = AppError;

    fn try_from(row: &SqliteRow) -> Result<Self, Self::Error> {
        let item = CartItem::try_from(row)?;
        let product_variant = match item.product_variant_id {
            Some(id) if item.item_type == CartItemType::Products => Some(CartVariant {
                id,
                option1_name: row.try_get("option1_name").map_err(AppError::from)?,
                option1_value: row.try_get("option1_value").map_err(AppError::from)?,
                option2_name: row.try_get("option2_name").map_err(AppError::from)?,
                option2_value: row.try_get("option2_value").map_err(AppError::from)?,
                sku: row.try_get("sku").map_err(AppError::from)?,
                stock_quantity: row.try_get("stock_quantity").map_err(AppError::from)?,
                price_offset: row.try_get("price_offset").map_err(AppError::from)?,
                product: CartProduct {
                    id: row.try_get("product_id").map_err(AppError::from)?,
                    name: row.try_get("product_name").map_err(AppError::from)?,
                    base_price: row.try_get("base_price").map_err(AppError::from)?,
                    image_url: row.try_get("image_url").map_err(AppError::from)?,
                },
            }),
            _ => None,
        };
        let ticket_type = match item.ticket_type_id {
            Some(id) if item.item_type == CartItemType::TicketTypes => Some(CartTicket {
                id,
                event_id: row.try_get("event_id").map_err(AppError::from)?,
                name: row.try_get("ticket_name").map_err(AppError::from)?,
                price: row.try_get("ticket_price").map_err(AppError::from)?,
                event_title: row.try_get("event_title").map_err(AppError::from)?,
            }),
            _ => None,
        };
        Ok(Self {
            item,
            product_variant,
            ticket_type,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Cart {
    pub id: Option<i64>,
    pub user_id: i64,
    pub items: Vec<CartLine>,
}

async fn ensure_cart(conn: &mut SqliteConnection, user_id: i64) -> AppResult<i64> {
    let now = now_ms();
    sqlx::query(
        "INSERT INTO carts (user_id, created_at, updated_at) VALUES (?1, ?2, ?2) \
         ON CONFLICT(user_id) DO NOTHING",
    )
    .bind(user_id)
    .bind(now)
    .execute(&mut *conn)
    .await
    .map_err(|err| AppError::from(err).with_context("operation", "cart_ensure"))?;
    sqlx::query_scalar::<_, i64>("SELECT id FROM carts WHERE user_id = ?")
        .bind(user_id)
        .fetch_one(&mut *conn)
        .await
        .map_err(|err| AppError::from(err).with_context("operation", "cart_ensure"))
}

async fn touch_cart(conn: &mut SqliteConnection, cart_id: i64) -> AppResult<()> {
    sqlx::query("UPDATE carts SET updated_at = ? WHERE id = ?")
        .bind(now_ms())
        .bind(cart_id)
        .execute(&mut *conn)
        .await
        .map_err(|err| AppError::from(err).with_context("operation", "cart_touch"))?;
    Ok(())
}

async fn find_user_item(
    conn: &mut SqliteConnection,
    user_id: i64,
    item_id: i64,
) -> AppResult<CartItem> {
    let sql = format!(
        "SELECT {ITEM_COLUMNS} FROM cart_items ci JOIN carts c ON c.id = ci.cart_id \
         WHERE ci.id = ? AND c.user_id = ?"
    );
    let row = sqlx::query(&sql)
        .bind(item_id)
        .bind(user_id)
        .fetch_optional(&mut *conn)
        .await
        .map_err(|err| AppError::from(err).with_context("operation", "cart_item_get"))?;
    match row {
        Some(row) => CartItem::try_from(&row),
        None => Err(CartError::ItemNotFound {
            cart_item_id: item_id,
        }
        .into()),
    }
}

fn check_quantity(quantity: i64) -> AppResult<()> {
    if quantity < 1 {
        return Err(
            AppError::invalid_field("quantity", "Quantity must be at least 1")
                .with_context("value", quantity.to_string()),
        );
    }
    Ok(())
}

fn check_stock(variant_id: i64, stock: i64, already: i64, requested: i64) -> Result<(), CartError> {
    if already.checked_add(requested).map_or(true, |total| total > stock) {
        return Err(CartError::InsufficientStock {
            product_variant_id: variant_id,
            requested,
            remaining: (stock - already).max(0),
        });
    }
    Ok(())
}

async fn add_product(
    conn: &mut SqliteConnection,
    cart_id: i64,
    variant_id: i64,
    quantity: i64,
) -> AppResult<CartItem> {
    let variant = products::find_variant(&mut *conn, variant_id).await?;
    let sql = format!(
        "SELECT {ITEM_COLUMNS} FROM cart_items ci \
         WHERE ci.cart_id = ? AND ci.item_type = 'products' AND ci.product_variant_id = ?"
    );
    let existing = sqlx::query(&sql)
        .bind(cart_id)
        .bind(variant_id)
        .fetch_optional(&mut *conn)
        .await
        .map_err(|err| AppError::from(err).with_context("operation", "cart_item_lookup"))?
        .as_ref()
        .map(CartItem::try_from)
        .transpose()?;

    let already = existing.as_ref().map_or(0, |item| item.quantity);
    check_stock(variant_id, variant.stock_quantity, already, quantity)?;

    match existing {
        Some(mut item) => {
            item.quantity = item.quantity.checked_add(quantity).ok_or(
                CartError::InsufficientStock {
                    product_variant_id: variant_id,
                    requested: quantity,
                    remaining: (variant.stock_quantity - already).max(0),
                },
            )?;
            sqlx::query("UPDATE cart_items SET quantity = ? WHERE id = ?")
                .bind(item.quantity)
                .bind(item.id)
                .execute(&mut *conn)
                .await
                .map_err(|err| AppError::from(err).with_context("operation", "cart_item_increment"))?;
            Ok(item)
        }
        None => {
            let now = now_ms();
            let res = sqlx::query(
                "INSERT INTO cart_items (cart_id, item_type, product_variant_id, ticket_type_id, quantity, added_at) \
                 VALUES (?1, 'products', ?2, NULL, ?3, ?4)",
            )
            .bind(cart_id)
            .bind(variant_id)
            .bind(quantity)
            .bind(now)
            .execute(&mut *conn)
            .await
            .map_err(|err| AppError::from(err).with_context("operation", "cart_item_insert"))?;
            Ok(CartItem {
                id: res.last_insert_rowid(),
                cart_id,
                item_type: CartItemType::Products,
                product_variant_id: Some(variant_id),
                ticket_type_id: None,
                quantity,
                added_at: now,
            })
        }
    }
}

async fn add_ticket(
    conn: &mut SqliteConnection,
    cart_id: i64,
    ticket_type_id: i64,
) -> AppResult<CartItem> {
    let ticket = ticket_types::get_by_id(&mut *conn, ticket_type_id)
        .await?
        .ok_or_else(|| {
            AppError::not_found(ticket_types::TICKET_TYPES_AREA, "Ticket type not found")
                .with_context("ticket_type_id", ticket_type_id.to_string())
        })?;
    if ticket.remaining() == 0 {
        return Err(CartError::SoldOut { ticket_type_id }.into());
    }

    let duplicate: Option<i64> = sqlx::query_scalar(
        "SELECT ci.id FROM cart_items ci JOIN ticket_types tt ON tt.id = ci.ticket_type_id \
         WHERE ci.cart_id = ? AND ci.item_type = 'ticket_types' AND tt.event_id = ? LIMIT 1",
    )
    .bind(cart_id)
    .bind(ticket.event_id)
    .fetch_optional(&mut *conn)
    .await
    .map_err(|err| AppError::from(err).with_context("operation", "cart_ticket_lookup"))?;
    if duplicate.is_some() {
        return Err(CartError::DuplicateEventTicket {
            event_id: ticket.event_id,
        }
        .into());
    }

    let now = now_ms();
    let res = sqlx::query(
        "INSERT INTO cart_items (cart_id, item_type, product_variant_id, ticket_type_id, quantity, added_at) \
         VALUES (?1, 'ticket_types', NULL, ?2, 1, ?3)",
    )
    .bind(cart_id)
    .bind(ticket_type_id)
    .bind(now)
    .execute(&mut *conn)
    .await
    .map_err(|err| AppError::from(err).with_context("operation", "cart_item_insert"))?;
    Ok(CartItem {
        id: res.last_insert_rowid(),
        cart_id,
        item_type: CartItemType::TicketTypes,
        product_variant_id: None,
        ticket_type_id: Some(ticket_type_id),
        quantity: 1,
        added_at: now,
    })
}

/// Add a product variant or a ticket to the user's cart, creating the cart on first use.
pub async fn add_item(pool: &SqlitePool, user_id: i64, request: AddToCart) -> AppResult<CartItem> {
    if let AddToCart::Products { quantity, .. } = &request {
        check_quantity(*quantity)?;
    }
    let item = run_in_tx(pool, move |tx| {
        async move {
            let cart_id = ensure_cart(&mut **tx, user_id).await?;
            let item = match request {
                AddToCart::Products {
                    product_variant_id,
                    quantity,
                } => add_product(&mut **tx, cart_id, product_variant_id, quantity).await?,
                AddToCart::TicketTypes { ticket_type_id } => {
                    add_ticket(&mut **tx, cart_id, ticket_type_id).await?
                }
            };
            touch_cart(&mut **tx, cart_id).await?;
            Ok::<_, AppError>(item)
        }
        .boxed()
    })
    .await?;
    tracing::info!(
        target: "linkup",
        event = "cart_item_added",
        user_id,
        cart_item_id = item.id,
        item_type = item.item_type.as_str(),
        quantity = item.quantity
    );
    Ok(item)
}

pub async fn get_cart(pool: &SqlitePool, user_id: i64) -> AppResult<Cart> {
    let cart_id: Option<i64> = sqlx::query_scalar("SELECT id FROM carts WHERE user_id = ?")
        .bind(user_id)
        .fetch_optional(pool)
        .await
        .map_err(|err| AppError::from(err).with_context("operation", "cart_get"))?;
    let Some(cart_id) = cart_id else {
        return Ok(Cart {
            id: None,
            user_id,
            items: Vec::new(),
        });
    };

    let sql = format!(
        "SELECT {ITEM_COLUMNS}, \
                pv.option1_name, pv.option1_value, pv.option2_name, pv.option2_value, pv.sku, \
                pv.stock_quantity, pv.price_offset, \
                p.id AS product_id, p.name AS product_name, p.base_price, p.image_url, \
                tt.event_id, tt.name AS ticket_name, tt.price AS ticket_price, \
                e.title AS event_title \
         FROM cart_items ci \
         LEFT JOIN product_variants pv ON pv.id = ci.product_variant_id \
         LEFT JOIN products p ON p.id = pv.product_id \
         LEFT JOIN ticket_types tt ON tt.id = ci.ticket_type_id \
         LEFT JOIN events e ON e.id = tt.event_id \
         WHERE ci.cart_id = ? \
         ORDER BY ci.added_at DESC, ci.id DESC"
    );
    let rows = sqlx::query(&sql)
        .bind(cart_id)
        .fetch_all(pool)
        .await
        .map_err(|err| AppError::from(err).with_context("operation", "cart_items_list"))?;
    let items = rows
        .iter()
        .map(CartLine::try_from)
        .collect::<AppResult<Vec<_>>>()?;
    Ok(Cart {
        id: Some(cart_id),
        user_id,
        items,
    })
}

/// Set the quantity of a product line. Ticket lines are fixed at one.
pub async fn update_quantity(
    pool: &SqlitePool,
    user_id: i64,
    item_id: i64,
    update: QuantityUpdate,
) -> AppResult<CartItem> {
    let quantity = update
        .quantity
        .ok_or_else(|| AppError::missing_field("quantity"))?;
    check_quantity(quantity)?;

    run_in_tx(pool, move |tx| {
        async move {
            let mut item = find_user_item(&mut **tx, user_id, item_id).await?;
            let variant_id = match (item.item_type, item.product_variant_id) {
                (CartItemType::Products, Some(id)) => id,
                _ => {
                    return Err(AppError::from(CartError::TicketQuantityFixed {
                        cart_item_id: item_id,
                    }))
                }
            };
            let variant = products::find_variant(&mut **tx, variant_id).await?;
            check_stock(variant_id, variant.stock_quantity, 0, quantity).map_err(AppError::from)?;

            sqlx::query("UPDATE cart_items SET quantity = ? WHERE id = ?")
                .bind(quantity)
                .bind(item_id)
                .execute(&mut **tx)
                .await
                .map_err(|err| AppError::from(err).with_context("operation", "cart_item_update"))?;
            touch_cart(&mut **tx, item.cart_id).await?;
            item.quantity = quantity;
            Ok::<_, AppError>(item)
        }
        .boxed()
    })
    .await
}

pub async fn remove_item(pool: &SqlitePool, user_id: i64, item_id: i64) -> AppResult<()> {
    let res = sqlx::query(
        "DELETE FROM cart_items WHERE id = ? AND cart_id IN (SELECT id FROM carts WHERE user_id = ?)",
    )
    .bind(item_id)
    .bind(user_id)
    .execute(pool)
    .await
    .map_err(|err| AppError::from(err).with_context("operation", "cart_item_delete"))?;
    if res.rows_affected() == 0 {
        return Err(CartError::ItemNotFound {
            cart_item_id: item_id,
        }
        .into());
    }
    Ok(())
}

/// Empty the user's cart. The cart row itself is kept.
pub async fn clear(pool: &SqlitePool, user_id: i64) -> AppResult<u64> {
    let res = sqlx::query(
        "DELETE FROM cart_items WHERE cart_id IN (SELECT id FROM carts WHERE user_id = ?)",
    )
    .bind(user_id)
    .execute(pool)
    .await
    .map_err(|err| AppError::from(err).with_context("operation", "cart_clear"))?;
    tracing::info!(target: "linkup", event = "cart_cleared", user_id, removed = res.rows_affected());
    Ok(res.rows_affected())
}
