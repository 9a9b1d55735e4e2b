use futures::FutureExt;
use serde::{Deserialize, Serialize};
use sqlx::{sqlite::SqliteRow, Row, SqliteConnection, SqlitePool};
use std::collections::HashMap;

use crate::{
    db::run_in_tx,
    error::map_unique_violation,
    time::now_ms,
    validation::{self, nullable},
    AppError, AppResult,
};

pub const PRODUCTS_AREA: &str = "PRODUCTS";
pub const PRODUCTS_VARIANT_NOT_FOUND: &str = "PRODUCTS/VARIANT_NOT_FOUND";

const PRODUCT_COLUMNS: &str = "id, name, base_price, description, image_url, created_at, updated_at";
const VARIANT_COLUMNS: &str = "id, product_id, option1_name, option1_value, option2_name, \
     option2_value, sku, stock_quantity, price_offset";

const DUPLICATE_SKU: &str = "A product variant with this SKU already exists";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductVariant {
    pub id: i64,
    pub product_id: i64,
    pub option1_name: Option<String>,
    pub option1_value: Option<String>,
    pub option2_name: Option<String>,
    pub option2_value: Option<String>,
    pub sku: Option<String>,
    pub stock_quantity: i64,
    pub price_offset: f64,
}

impl TryFrom<&SqliteRow> for ProductVariant {
    type Error = AppError;

    fn try_from(row: &SqliteRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.try_get("id").map_err(AppError::from)?,
            product_id: row.try_get("product_id").map_err(AppError::from)?,
            option1_name: row.try_get("option1_name").map_err(AppError::from)?,
            option1_value: row.try_get("option1_value").map_err(AppError::from)?,
            option2_name: row.try_get("option2_name").map_err(AppError::from)?,
            option2_value: row.try_get("option2_value").map_err(AppError::from)?,
            sku: row.try_get("sku").map_err(AppError::from)?,
            stock_quantity: row.try_get("stock_quantity").map_err(AppError::from)?,
            price_offset: row.try_get("price_offset").map_err(AppError::from)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub id: i64,
    pub name: String,
    pub base_price: f64,
    pub description: Option<String>,
    pub image_url: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
    pub variants: Vec<ProductVariant>,
}

impl TryFrom<&SqliteRow> for Product {
    type Error = AppError;

    fn try_from(row: &SqliteRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.try_get("id").map_err(AppError::from)?,
            name: row.try_get("name").map_err(AppError::from)?,
            base_price: row.try_get("base_price").map_err(AppError::from)?,
            description: row.try_get("description").map_err(AppError::from)?,
            image_url: row.try_get("image_url").map_err(AppError::from)?,
            created_at: row.try_get("created_at").map_err(AppError::from)?,
            updated_at: row.try_get("updated_at").map_err(AppError::from)?,
            variants: Vec::new(),
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VariantInput {
    #[serde(default)]
    pub option1_name: Option<String>,
    #[serde(default)]
    pub option1_value: Option<String>,
    #[serde(default)]
    pub option2_name: Option<String>,
    #[serde(default)]
    pub option2_value: Option<String>,
    #[serde(default)]
    pub sku: Option<String>,
    #[serde(default)]
    pub stock_quantity: Option<i64>,
    #[serde(default)]
    pub price_offset: f64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProductCreate {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub base_price: Option<f64>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub image_url: Option<String>,
    pub variants: Vec<VariantInput>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProductUpdate {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub base_price: Option<f64>,
    #[serde(default, deserialize_with = "nullable")]
    pub description: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable")]
    pub image_url: Option<Option<String>>,
    #[serde(default)]
    pub variants: Option<Vec<VariantInput>>,
}

/// A variant that passed validation and is ready to insert.
#[derive(Debug, Clone)]
struct NewVariant {
    option1_name: Option<String>,
    option1_value: Option<String>,
    option2_name: Option<String>,
    option2_value: Option<String>,
    sku: Option<String>,
    stock_quantity: i64,
    price_offset: f64,
}

fn blank_to_none(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn validate_variants(inputs: Vec<VariantInput>) -> AppResult<Vec<NewVariant>> {
    inputs
        .into_iter()
        .enumerate()
        .map(|(idx, input)| {
            let field = format!("variants[{idx}].stock_quantity");
            let stock_quantity = input
                .stock_quantity
                .ok_or_else(|| AppError::missing_field(&field))?;
            validation::non_negative_i64(stock_quantity, &field)?;
            if !input.price_offset.is_finite() {
                return Err(AppError::invalid_field(
                    &format!("variants[{idx}].price_offset"),
                    "Price offset must be a finite number",
                ));
            }
            Ok(NewVariant {
                option1_name: blank_to_none(input.option1_name),
                option1_value: blank_to_none(input.option1_value),
                option2_name: blank_to_none(input.option2_name),
                option2_value: blank_to_none(input.option2_value),
                sku: blank_to_none(input.sku),
                stock_quantity,
                price_offset: input.price_offset,
            })
        })
        .collect()
}

fn product_not_found(id: i64) -> AppError {
    AppError::not_found(PRODUCTS_AREA, "Product not found").with_context("product_id", id.to_string())
}

async fn load_variants(conn: &mut SqliteConnection, product_id: i64) -> AppResult<Vec<ProductVariant>> {
    let sql = format!("SELECT {VARIANT_COLUMNS} FROM product_variants WHERE product_id = ? ORDER BY id");
    let rows = sqlx::query(&sql)
        .bind(product_id)
        .fetch_all(&mut *conn)
        .await
        .map_err(|err| AppError::from(err).with_context("operation", "product_variants_list"))?;
    rows.iter().map(ProductVariant::try_from).collect()
}

async fn fetch_product(conn: &mut SqliteConnection, id: i64) -> AppResult<Option<Product>> {
    let sql = format!("SELECT {PRODUCT_COLUMNS} FROM products WHERE id = ?");
    let row = sqlx::query(&sql)
        .bind(id)
        .fetch_optional(&mut *conn)
        .await
        .map_err(|err| AppError::from(err).with_context("operation", "products_get"))?;
    let Some(row) = row else {
        return Ok(None);
    };
    let mut product = Product::try_from(&row)?;
    product.variants = load_variants(conn, id).await?;
    Ok(Some(product))
}

async fn insert_variants(
    conn: &mut SqliteConnection,
    product_id: i64,
    variants: &[NewVariant],
) -> AppResult<Vec<ProductVariant>> {
    let mut inserted = Vec::with_capacity(variants.len());
    for v in variants {
        let res = sqlx::query(
            "INSERT INTO product_variants (product_id, option1_name, option1_value, option2_name, option2_value, sku, stock_quantity, price_offset) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        )
        .bind(product_id)
        .bind(&v.option1_name)
        .bind(&v.option1_value)
        .bind(&v.option2_name)
        .bind(&v.option2_value)
        .bind(&v.sku)
        .bind(v.stock_quantity)
        .bind(v.price_offset)
        .execute(&mut *conn)
        .await
        .map_err(|err| {
            let mut mapped = map_unique_violation(err, PRODUCTS_AREA, DUPLICATE_SKU);
            if let Some(sku) = &v.sku {
                mapped = mapped.with_context("sku", sku.clone());
            }
            mapped
        })?;
        inserted.push(ProductVariant {
            id: res.last_insert_rowid(),
            product_id,
            option1_name: v.option1_name.clone(),
            option1_value: v.option1_value.clone(),
            option2_name: v.option2_name.clone(),
            option2_value: v.option2_value.clone(),
            sku: v.sku.clone(),
            stock_quantity: v.stock_quantity,
            price_offset: v.price_offset,
        });
    }
    Ok(inserted)
}

pub async fn list(pool: &SqlitePool) -> AppResult<Vec<Product>> {
    let sql = format!("SELECT {PRODUCT_COLUMNS} FROM products ORDER BY id");
    let rows = sqlx::query(&sql)
        .fetch_all(pool)
        .await
        .map_err(|err| AppError::from(err).with_context("operation", "products_list"))?;
    let mut products = rows
        .iter()
        .map(Product::try_from)
        .collect::<AppResult<Vec<_>>>()?;

    let sql = format!("SELECT {VARIANT_COLUMNS} FROM product_variants ORDER BY product_id, id");
    let variant_rows = sqlx::query(&sql)
        .fetch_all(pool)
        .await
        .map_err(|err| AppError::from(err).with_context("operation", "product_variants_list"))?;
    let mut by_product: HashMap<i64, Vec<ProductVariant>> = HashMap::new();
    for row in &variant_rows {
        let variant = ProductVariant::try_from(row)?;
        by_product.entry(variant.product_id).or_default().push(variant);
    }
    for product in &mut products {
        product.variants = by_product.remove(&product.id).unwrap_or_default();
    }
    Ok(products)
}

pub async fn get(pool: &SqlitePool, id: i64) -> AppResult<Product> {
    let mut conn = pool.acquire().await.map_err(AppError::from)?;
    fetch_product(&mut conn, id)
        .await?
        .ok_or_else(|| product_not_found(id))
}

/// Look up one variant by id on an open connection.
pub async fn find_variant(
    conn: &mut SqliteConnection,
    variant_id: i64,
) -> AppResult<ProductVariant> {
    let sql = format!("SELECT {VARIANT_COLUMNS} FROM product_variants WHERE id = ?");
    let row = sqlx::query(&sql)
        .bind(variant_id)
        .fetch_optional(&mut *conn)
        .await
        .map_err(|err| AppError::from(err).with_context("operation", "product_variants_get"))?;
    match row {
        Some(row) => ProductVariant::try_from(&row),
        None => Err(AppError::new(PRODUCTS_VARIANT_NOT_FOUND, "Product variant not found")
            .with_context("product_variant_id", variant_id.to_string())),
    }
}

pub async fn create(pool: &SqlitePool, payload: ProductCreate) -> AppResult<Product> {
    let name = validation::required_text(payload.name.as_deref(), "name")?;
    let base_price = payload
        .base_price
        .ok_or_else(|| AppError::missing_field("base_price"))?;
    validation::positive_f64(base_price, "base_price")?;
    let variants = validate_variants(payload.variants)?;
    let description = blank_to_none(payload.description);
    let image_url = blank_to_none(payload.image_url);

    let product = run_in_tx(pool, move |tx| {
        async move {
            let now = now_ms();
            let res = sqlx::query(
                "INSERT INTO products (name, base_price, description, image_url, created_at, updated_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            )
            .bind(&name)
            .bind(base_price)
            .bind(&description)
            .bind(&image_url)
            .bind(now)
            .bind(now)
            .execute(&mut **tx)
            .await
            .map_err(|err| AppError::from(err).with_context("operation", "products_create"))?;
            let id = res.last_insert_rowid();
            let variants = insert_variants(&mut **tx, id, &variants).await?;
            Ok::<_, AppError>(Product {
                id,
                name,
                base_price,
                description,
                image_url,
                created_at: now,
                updated_at: now,
                variants,
            })
        }
        .boxed()
    })
    .await?;

    tracing::info!(
        target: "linkup",
        event = "product_created",
        product_id = product.id,
        variants = product.variants.len()
    );
    Ok(product)
}

/// Partial update. A present `variants` list replaces every existing variant.
pub async fn update(pool: &SqlitePool, id: i64, patch: ProductUpdate) -> AppResult<Product> {
    let name = validation::optional_non_blank(patch.name.as_deref(), "name")?;
    if let Some(price) = patch.base_price {
        validation::positive_f64(price, "base_price")?;
    }
    let variants = patch.variants.map(validate_variants).transpose()?;
    let base_price = patch.base_price;
    let description = patch.description.map(blank_to_none);
    let image_url = patch.image_url.map(blank_to_none);

    run_in_tx(pool, move |tx| {
        async move {
            let mut product = fetch_product(&mut **tx, id)
                .await?
                .ok_or_else(|| product_not_found(id))?;
            if let Some(name) = name {
                product.name = name;
            }
            if let Some(price) = base_price {
                product.base_price = price;
            }
            if let Some(description) = description {
                product.description = description;
            }
            if let Some(image_url) = image_url {
                product.image_url = image_url;
            }
            product.updated_at = now_ms();

            sqlx::query(
                "UPDATE products SET name = ?1, base_price = ?2, description = ?3, image_url = ?4, \
                 updated_at = ?5 WHERE id = ?6",
            )
            .bind(&product.name)
            .bind(product.base_price)
            .bind(&product.description)
            .bind(&product.image_url)
            .bind(product.updated_at)
            .bind(id)
            .execute(&mut **tx)
            .await
            .map_err(|err| AppError::from(err).with_context("operation", "products_update"))?;

            if let Some(variants) = variants {
                sqlx::query("DELETE FROM product_variants WHERE product_id = ?")
                    .bind(id)
                    .execute(&mut **tx)
                    .await
                    .map_err(|err| {
                        AppError::from(err).with_context("operation", "product_variants_replace")
                    })?;
                product.variants = insert_variants(&mut **tx, id, &variants).await?;
            }
            Ok::<_, AppError>(product)
        }
        .boxed()
    })
    .await
}

/// Delete a product and its variants, returning what was removed.
pub async fn delete(pool: &SqlitePool, id: i64) -> AppResult<Product> {
    let product = run_in_tx(pool, move |tx| {
        async move {
            let product = fetch_product(&mut **tx, id)
                .await?
                .ok_or_else(|| product_not_found(id))?;
            sqlx::query("DELETE FROM products WHERE id = ?")
                .bind(id)
                .execute(&mut **tx)
                .await
                .map_err(|err| AppError::from(err).with_context("operation", "products_delete"))?;
            Ok::<_, AppError>(product)
        }
        .boxed()
    })
    .await?;
    tracing::info!(target: "linkup", event = "product_deleted", product_id = id);
    Ok(product)
}
