// kloven_storefront/src/services/store.rs

//! Postgres access for catalog, orders and promo codes.
//!
//! Every multi-row write runs in a single transaction; stock and promo
//! counters are only ever changed with conditional, atomic updates.

use async_trait::async_trait;
use mockall::automock;
use sqlx::PgPool;
use std::collections::HashMap;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::errors::{AppError, Result as AppResult};
use crate::models::{
  NewOrder, NewPromoCode, Order, OrderItem, OrderStatus, OrderWithItems, Product, ProductFilter, ProductInput,
  ProductRemoval, ProductVariant, ProductWithVariants, PromoCode,
};

/// A provider status observation to apply to an order.
#[derive(Debug, Clone, PartialEq)]
pub struct PaymentStatusUpdate {
  pub order_id: Uuid,
  pub payment_id: String,
  pub status: OrderStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordOutcome {
  /// Applied; `previous` is the order status it replaced.
  Recorded { previous: OrderStatus },
  /// This `(payment_id, status)` pair was already applied.
  Duplicate,
  OrderNotFound,
}

#[automock]
#[async_trait]
pub trait OrderStore: Send + Sync {
  async fn fetch_products(&self, ids: Vec<Uuid>) -> AppResult<Vec<Product>>;

  async fn fetch_variants(&self, ids: Vec<Uuid>) -> AppResult<Vec<ProductVariant>>;

  /// Active code with this (already uppercased) text, whatever its expiry
  /// or remaining uses.
  async fn find_active_promo(&self, code: String) -> AppResult<Option<PromoCode>>;

  /// Writes the pending order, its items, the stock decrements and the promo
  /// redemption atomically. Fails with `InsufficientStock` when a decrement
  /// would go negative.
  async fn create_order(&self, order: NewOrder) -> AppResult<Uuid>;

  /// Undoes `create_order` for an order that is still pending. Returns
  /// whether anything was undone.
  async fn abandon_order(&self, order_id: Uuid) -> AppResult<bool>;

  async fn record_payment_status(&self, update: PaymentStatusUpdate) -> AppResult<RecordOutcome>;

  async fn order_with_items(&self, order_id: Uuid) -> AppResult<Option<OrderWithItems>>;

  /// Adds every item quantity of the order back to its variant. Returns the
  /// number of variants touched.
  async fn restore_stock(&self, order_id: Uuid) -> AppResult<u64>;

  async fn award_loyalty_points(&self, user_id: Uuid, order_id: Uuid, points: i64) -> AppResult<()>;

  async fn list_products(&self, filter: ProductFilter) -> AppResult<Vec<Product>>;

  /// Active product with its active variants.
  async fn product_by_slug(&self, slug: String) -> AppResult<Option<ProductWithVariants>>;

  async fn update_order_status(&self, order_id: Uuid, status: OrderStatus) -> AppResult<Option<Order>>;

  async fn list_promo_codes(&self) -> AppResult<Vec<PromoCode>>;

  async fn create_promo_code(&self, promo: NewPromoCode) -> AppResult<PromoCode>;

  async fn set_promo_active(&self, promo_id: Uuid, active: bool) -> AppResult<Option<PromoCode>>;

  /// Every product, active or not, newest first, with all its variants.
  async fn admin_list_products(&self) -> AppResult<Vec<ProductWithVariants>>;

  async fn admin_product(&self, product_id: Uuid) -> AppResult<Option<ProductWithVariants>>;

  async fn create_product(&self, input: ProductInput) -> AppResult<ProductWithVariants>;

  /// Variants are matched on `(size, color)`: matches are updated in place,
  /// new ones inserted, and the rest removed, or deactivated when orders
  /// reference them.
  async fn update_product(&self, product_id: Uuid, input: ProductInput) -> AppResult<Option<ProductWithVariants>>;

  /// Deletes the product and its variants, or only deactivates them when
  /// order items reference the product.
  async fn delete_product(&self, product_id: Uuid) -> AppResult<Option<ProductRemoval>>;
}

#[derive(Debug, Clone)]
pub struct PgOrderStore {
  pool: PgPool,
}

impl PgOrderStore {
  pub fn new(pool: PgPool) -> Self {
    Self { pool }
  }
}

/// Slug and SKU clashes are the admin's to fix, not a server failure.
fn catalog_conflict(err: sqlx::Error) -> AppError {
  match err {
    sqlx::Error::Database(ref db_err) if db_err.is_unique_violation() => {
      let message = match db_err.constraint() {
        Some("products_slug_key") => "El slug ya existe",
        Some("product_variants_sku_key") => "SKU duplicado",
        _ => "Variante duplicada",
      };
      AppError::Validation(message.to_string())
    }
    other => AppError::Sqlx(other),
  }
}

impl PgOrderStore {
  async fn variants_of(&self, product_ids: &[Uuid]) -> AppResult<HashMap<Uuid, Vec<ProductVariant>>> {
    let variants = sqlx::query_as::<_, ProductVariant>(
      r#"
      SELECT id, product_id, size, color, stock, sku, active
      FROM product_variants
      WHERE product_id = ANY($1)
      ORDER BY sku
      "#,
    )
    .bind(product_ids)
    .fetch_all(&self.pool)
    .await?;

    let mut grouped: HashMap<Uuid, Vec<ProductVariant>> = HashMap::new();
    for variant in variants {
      grouped.entry(variant.product_id).or_default().push(variant);
    }
    Ok(grouped)
  }
}

const RESTOCK_ORDER_SQL: &str = r#"
  UPDATE product_variants v
  SET stock = v.stock + oi.qty
  FROM (
    SELECT variant_id, SUM(quantity)::INT AS qty
    FROM order_items
    WHERE order_id = $1
    GROUP BY variant_id
  ) oi
  WHERE v.id = oi.variant_id
"#;

#[async_trait]
impl OrderStore for PgOrderStore {
  #[instrument(name = "store::fetch_products", skip_all, fields(count = ids.len()), err(Display))]
  async fn fetch_products(&self, ids: Vec<Uuid>) -> AppResult<Vec<Product>> {
    let products = sqlx::query_as::<_, Product>(
      r#"
      SELECT id, name, slug, description, price, category, image_url, material, fit,
             featured, active, created_at, updated_at
      FROM products
      WHERE id = ANY($1)
      "#,
    )
    .bind(&ids)
    .fetch_all(&self.pool)
    .await?;
    Ok(products)
  }

  #[instrument(name = "store::fetch_variants", skip_all, fields(count = ids.len()), err(Display))]
  async fn fetch_variants(&self, ids: Vec<Uuid>) -> AppResult<Vec<ProductVariant>> {
    let variants = sqlx::query_as::<_, ProductVariant>(
      r#"
      SELECT id, product_id, size, color, stock, sku, active
      FROM product_variants
      WHERE id = ANY($1)
      "#,
    )
    .bind(&ids)
    .fetch_all(&self.pool)
    .await?;
    Ok(variants)
  }

  #[instrument(name = "store::find_active_promo", skip(self), err(Display))]
  async fn find_active_promo(&self, code: String) -> AppResult<Option<PromoCode>> {
    let promo = sqlx::query_as::<_, PromoCode>(
      r#"
      SELECT id, code, discount_percent, max_uses, current_uses, expires_at, active, created_at
      FROM promo_codes
      WHERE code = $1 AND active = TRUE
      "#,
    )
    .bind(&code)
    .fetch_optional(&self.pool)
    .await?;
    Ok(promo)
  }

  #[instrument(
    name = "store::create_order",
    skip_all,
    fields(items = order.items.len(), total = order.total, promo = ?order.promo_code_used),
    err(Display)
  )]
  async fn create_order(&self, order: NewOrder) -> AppResult<Uuid> {
    let mut tx = self.pool.begin().await?;

    let order_id: Uuid = sqlx::query_scalar(
      r#"
      INSERT INTO orders (
        user_id, status, payer_name, payer_email, payer_phone,
        shipping_address, shipping_city, shipping_zip,
        subtotal, shipping_cost, discount_amount, promo_code_used, total
      )
      VALUES ($1, 'pending', $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
      RETURNING id
      "#,
    )
    .bind(order.user_id)
    .bind(&order.payer_name)
    .bind(&order.payer_email)
    .bind(&order.payer_phone)
    .bind(&order.shipping_address)
    .bind(&order.shipping_city)
    .bind(&order.shipping_zip)
    .bind(order.subtotal)
    .bind(order.shipping_cost)
    .bind(order.discount_amount)
    .bind(&order.promo_code_used)
    .bind(order.total)
    .fetch_one(&mut *tx)
    .await?;

    for item in &order.items {
      sqlx::query(
        r#"
        INSERT INTO order_items (order_id, product_id, variant_id, product_name, size, color, quantity, unit_price)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        "#,
      )
      .bind(order_id)
      .bind(item.product_id)
      .bind(item.variant_id)
      .bind(&item.product_name)
      .bind(&item.size)
      .bind(&item.color)
      .bind(item.quantity)
      .bind(item.unit_price)
      .execute(&mut *tx)
      .await?;

      let decremented = sqlx::query("UPDATE product_variants SET stock = stock - $1 WHERE id = $2 AND stock >= $1")
        .bind(item.quantity)
        .bind(item.variant_id)
        .execute(&mut *tx)
        .await?
        .rows_affected();

      if decremented == 0 {
        warn!(variant_id = %item.variant_id, quantity = item.quantity, "Stock changed before decrement, rolling back.");
        tx.rollback().await?;
        return Err(AppError::InsufficientStock {
          product: item.product_name.clone(),
          size: item.size.clone(),
          color: item.color.clone(),
        });
      }
    }

    if let Some(code) = &order.promo_code_used {
      let redeemed = sqlx::query(
        r#"
        UPDATE promo_codes
        SET current_uses = current_uses + 1
        WHERE code = $1
          AND active = TRUE
          AND (expires_at IS NULL OR expires_at >= now())
          AND (max_uses = 0 OR current_uses < max_uses)
        "#,
      )
      .bind(code)
      .execute(&mut *tx)
      .await?
      .rows_affected();

      if redeemed == 0 {
        warn!(promo_code = %code, "Promo code no longer redeemable, rolling back.");
        tx.rollback().await?;
        return Err(AppError::PromoExhausted(code.clone()));
      }
    }

    tx.commit().await?;
    info!(%order_id, "Pending order created.");
    Ok(order_id)
  }

  #[instrument(name = "store::abandon_order", skip(self), err(Display))]
  async fn abandon_order(&self, order_id: Uuid) -> AppResult<bool> {
    let mut tx = self.pool.begin().await?;

    let cancelled: Option<(Option<String>,)> = sqlx::query_as(
      r#"
      UPDATE orders
      SET status = 'cancelled', updated_at = now()
      WHERE id = $1 AND status = 'pending'
      RETURNING promo_code_used
      "#,
    )
    .bind(order_id)
    .fetch_optional(&mut *tx)
    .await?;

    let Some((promo_code_used,)) = cancelled else {
      tx.rollback().await?;
      debug!("Order is not pending, nothing to abandon.");
      return Ok(false);
    };

    sqlx::query(RESTOCK_ORDER_SQL).bind(order_id).execute(&mut *tx).await?;

    if let Some(code) = promo_code_used {
      sqlx::query("UPDATE promo_codes SET current_uses = GREATEST(current_uses - 1, 0) WHERE code = $1")
        .bind(&code)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;
    info!("Pending order abandoned and reservations released.");
    Ok(true)
  }

  #[instrument(
    name = "store::record_payment_status",
    skip_all,
    fields(order_id = %update.order_id, payment_id = %update.payment_id, status = %update.status),
    err(Display)
  )]
  async fn record_payment_status(&self, update: PaymentStatusUpdate) -> AppResult<RecordOutcome> {
    let mut tx = self.pool.begin().await?;

    let previous: Option<(OrderStatus,)> = sqlx::query_as(
      r#"
      WITH prev AS (
        SELECT id, status FROM orders WHERE id = $4 FOR UPDATE
      )
      UPDATE orders o
      SET status = $1, mp_payment_id = $2, mp_status = $3, updated_at = now()
      FROM prev
      WHERE o.id = prev.id
      RETURNING prev.status
      "#,
    )
    .bind(update.status)
    .bind(&update.payment_id)
    .bind(update.status.as_str())
    .bind(update.order_id)
    .fetch_optional(&mut *tx)
    .await?;

    let Some((previous,)) = previous else {
      tx.rollback().await?;
      return Ok(RecordOutcome::OrderNotFound);
    };

    let inserted = sqlx::query(
      r#"
      INSERT INTO processed_payment_events (payment_id, status, order_id)
      VALUES ($1, $2, $3)
      ON CONFLICT (payment_id, status) DO NOTHING
      "#,
    )
    .bind(&update.payment_id)
    .bind(update.status.as_str())
    .bind(update.order_id)
    .execute(&mut *tx)
    .await?
    .rows_affected();

    if inserted == 0 {
      tx.rollback().await?;
      return Ok(RecordOutcome::Duplicate);
    }

    tx.commit().await?;
    Ok(RecordOutcome::Recorded { previous })
  }

  #[instrument(name = "store::order_with_items", skip(self), err(Display))]
  async fn order_with_items(&self, order_id: Uuid) -> AppResult<Option<OrderWithItems>> {
    let order = sqlx::query_as::<_, Order>(
      r#"
      SELECT id, user_id, status, mp_payment_id, mp_status, payer_name, payer_email, payer_phone,
             shipping_address, shipping_city, shipping_zip, subtotal, shipping_cost,
             discount_amount, promo_code_used, total, created_at, updated_at
      FROM orders
      WHERE id = $1
      "#,
    )
    .bind(order_id)
    .fetch_optional(&self.pool)
    .await?;

    let Some(order) = order else {
      return Ok(None);
    };

    let order_items = sqlx::query_as::<_, OrderItem>(
      r#"
      SELECT id, order_id, product_id, variant_id, product_name, size, color, quantity, unit_price
      FROM order_items
      WHERE order_id = $1
      "#,
    )
    .bind(order_id)
    .fetch_all(&self.pool)
    .await?;

    Ok(Some(OrderWithItems { order, order_items }))
  }

  #[instrument(name = "store::restore_stock", skip(self), err(Display))]
  async fn restore_stock(&self, order_id: Uuid) -> AppResult<u64> {
    let mut tx = self.pool.begin().await?;
    let touched = sqlx::query(RESTOCK_ORDER_SQL)
      .bind(order_id)
      .execute(&mut *tx)
      .await?
      .rows_affected();
    tx.commit().await?;
    Ok(touched)
  }

  #[instrument(name = "store::award_loyalty_points", skip(self), err(Display))]
  async fn award_loyalty_points(&self, user_id: Uuid, order_id: Uuid, points: i64) -> AppResult<()> {
    sqlx::query("SELECT award_order_points($1, $2, $3)")
      .bind(user_id)
      .bind(order_id)
      .bind(points)
      .execute(&self.pool)
      .await?;
    Ok(())
  }

  #[instrument(name = "store::list_products", skip(self), err(Display))]
  async fn list_products(&self, filter: ProductFilter) -> AppResult<Vec<Product>> {
    let products = sqlx::query_as::<_, Product>(
      r#"
      SELECT id, name, slug, description, price, category, image_url, material, fit,
             featured, active, created_at, updated_at
      FROM products
      WHERE active = TRUE
        AND ($1::TEXT IS NULL OR category = $1)
        AND (NOT $2 OR featured = TRUE)
      ORDER BY created_at DESC
      "#,
    )
    .bind(&filter.category)
    .bind(filter.featured)
    .fetch_all(&self.pool)
    .await?;
    Ok(products)
  }

  #[instrument(name = "store::product_by_slug", skip(self), err(Display))]
  async fn product_by_slug(&self, slug: String) -> AppResult<Option<ProductWithVariants>> {
    let product = sqlx::query_as::<_, Product>(
      r#"
      SELECT id, name, slug, description, price, category, image_url, material, fit,
             featured, active, created_at, updated_at
      FROM products
      WHERE slug = $1 AND active = TRUE
      "#,
    )
    .bind(&slug)
    .fetch_optional(&self.pool)
    .await?;

    let Some(product) = product else {
      return Ok(None);
    };

    let product_variants = sqlx::query_as::<_, ProductVariant>(
      r#"
      SELECT id, product_id, size, color, stock, sku, active
      FROM product_variants
      WHERE product_id = $1 AND active = TRUE
      ORDER BY sku
      "#,
    )
    .bind(product.id)
    .fetch_all(&self.pool)
    .await?;

    Ok(Some(ProductWithVariants {
      product,
      product_variants,
    }))
  }

  #[instrument(name = "store::update_order_status", skip(self), err(Display))]
  async fn update_order_status(&self, order_id: Uuid, status: OrderStatus) -> AppResult<Option<Order>> {
    let order = sqlx::query_as::<_, Order>(
      r#"
      UPDATE orders
      SET status = $1, updated_at = now()
      WHERE id = $2
      RETURNING id, user_id, status, mp_payment_id, mp_status, payer_name, payer_email, payer_phone,
                shipping_address, shipping_city, shipping_zip, subtotal, shipping_cost,
                discount_amount, promo_code_used, total, created_at, updated_at
      "#,
    )
    .bind(status)
    .bind(order_id)
    .fetch_optional(&self.pool)
    .await?;
    Ok(order)
  }

  #[instrument(name = "store::list_promo_codes", skip(self), err(Display))]
  async fn list_promo_codes(&self) -> AppResult<Vec<PromoCode>> {
    let promos = sqlx::query_as::<_, PromoCode>(
      r#"
      SELECT id, code, discount_percent, max_uses, current_uses, expires_at, active, created_at
      FROM promo_codes
      ORDER BY created_at DESC
      "#,
    )
    .fetch_all(&self.pool)
    .await?;
    Ok(promos)
  }

  #[instrument(name = "store::create_promo_code", skip_all, fields(code = %promo.code), err(Display))]
  async fn create_promo_code(&self, promo: NewPromoCode) -> AppResult<PromoCode> {
    let created = sqlx::query_as::<_, PromoCode>(
      r#"
      INSERT INTO promo_codes (code, discount_percent, max_uses, expires_at, active)
      VALUES ($1, $2, $3, $4, $5)
      RETURNING id, code, discount_percent, max_uses, current_uses, expires_at, active, created_at
      "#,
    )
    .bind(&promo.code)
    .bind(promo.discount_percent)
    .bind(promo.max_uses)
    .bind(promo.expires_at)
    .bind(promo.active)
    .fetch_one(&self.pool)
    .await
    .map_err(|e| match e {
      sqlx::Error::Database(ref db_err) if db_err.is_unique_violation() => {
        AppError::Validation(format!("El codigo {} ya existe", promo.code))
      }
      other => AppError::Sqlx(other),
    })?;
    Ok(created)
  }

  #[instrument(name = "store::set_promo_active", skip(self), err(Display))]
  async fn set_promo_active(&self, promo_id: Uuid, active: bool) -> AppResult<Option<PromoCode>> {
    let promo = sqlx::query_as::<_, PromoCode>(
      r#"
      UPDATE promo_codes
      SET active = $1
      WHERE id = $2
      RETURNING id, code, discount_percent, max_uses, current_uses, expires_at, active, created_at
      "#,
    )
    .bind(active)
    .bind(promo_id)
    .fetch_optional(&self.pool)
    .await?;
    Ok(promo)
  }

  #[instrument(name = "store::admin_list_products", skip(self), err(Display))]
  async fn admin_list_products(&self) -> AppResult<Vec<ProductWithVariants>> {
    let products = sqlx::query_as::<_, Product>(
      r#"
      SELECT id, name, slug, description, price, category, image_url, material, fit,
             featured, active, created_at, updated_at
      FROM products
      ORDER BY created_at DESC
      "#,
    )
    .fetch_all(&self.pool)
    .await?;

    let ids: Vec<Uuid> = products.iter().map(|p| p.id).collect();
    let mut variants = self.variants_of(&ids).await?;
    Ok(
      products
        .into_iter()
        .map(|product| {
          let product_variants = variants.remove(&product.id).unwrap_or_default();
          ProductWithVariants {
            product,
            product_variants,
          }
        })
        .collect(),
    )
  }

  #[instrument(name = "store::admin_product", skip(self), err(Display))]
  async fn admin_product(&self, product_id: Uuid) -> AppResult<Option<ProductWithVariants>> {
    let product = sqlx::query_as::<_, Product>(
      r#"
      SELECT id, name, slug, description, price, category, image_url, material, fit,
             featured, active, created_at, updated_at
      FROM products
      WHERE id = $1
      "#,
    )
    .bind(product_id)
    .fetch_optional(&self.pool)
    .await?;

    let Some(product) = product else {
      return Ok(None);
    };
    let product_variants = self.variants_of(&[product.id]).await?.remove(&product.id).unwrap_or_default();
    Ok(Some(ProductWithVariants {
      product,
      product_variants,
    }))
  }

  #[instrument(name = "store::create_product", skip_all, fields(slug = %input.slug), err(Display))]
  async fn create_product(&self, input: ProductInput) -> AppResult<ProductWithVariants> {
    let mut tx = self.pool.begin().await?;

    let product = sqlx::query_as::<_, Product>(
      r#"
      INSERT INTO products (name, slug, description, price, category, image_url, material, fit, featured, active)
      VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
      RETURNING id, name, slug, description, price, category, image_url, material, fit,
                featured, active, created_at, updated_at
      "#,
    )
    .bind(&input.name)
    .bind(&input.slug)
    .bind(&input.description)
    .bind(input.price)
    .bind(&input.category)
    .bind(&input.image_url)
    .bind(&input.material)
    .bind(&input.fit)
    .bind(input.featured)
    .bind(input.active)
    .fetch_one(&mut *tx)
    .await
    .map_err(catalog_conflict)?;

    let mut product_variants = Vec::new();
    for variant in input.variants.iter().flatten() {
      let created = sqlx::query_as::<_, ProductVariant>(
        r#"
        INSERT INTO product_variants (product_id, size, color, stock, sku, active)
        VALUES ($1, $2, $3, $4, $5, $6)
        RETURNING id, product_id, size, color, stock, sku, active
        "#,
      )
      .bind(product.id)
      .bind(&variant.size)
      .bind(&variant.color)
      .bind(variant.stock)
      .bind(&variant.sku)
      .bind(variant.active)
      .fetch_one(&mut *tx)
      .await
      .map_err(catalog_conflict)?;
      product_variants.push(created);
    }

    tx.commit().await?;
    info!(product_id = %product.id, variants = product_variants.len(), "Product created.");
    Ok(ProductWithVariants {
      product,
      product_variants,
    })
  }

  #[instrument(name = "store::update_product", skip(self, input), err(Display))]
  async fn update_product(&self, product_id: Uuid, input: ProductInput) -> AppResult<Option<ProductWithVariants>> {
    let mut tx = self.pool.begin().await?;

    let product = sqlx::query_as::<_, Product>(
      r#"
      UPDATE products
      SET name = $1, slug = $2, description = $3, price = $4, category = $5, image_url = $6,
          material = $7, fit = $8, featured = $9, active = $10, updated_at = now()
      WHERE id = $11
      RETURNING id, name, slug, description, price, category, image_url, material, fit,
                featured, active, created_at, updated_at
      "#,
    )
    .bind(&input.name)
    .bind(&input.slug)
    .bind(&input.description)
    .bind(input.price)
    .bind(&input.category)
    .bind(&input.image_url)
    .bind(&input.material)
    .bind(&input.fit)
    .bind(input.featured)
    .bind(input.active)
    .bind(product_id)
    .fetch_optional(&mut *tx)
    .await
    .map_err(catalog_conflict)?;

    let Some(product) = product else {
      tx.rollback().await?;
      return Ok(None);
    };

    if let Some(variants) = &input.variants {
      let mut kept = Vec::with_capacity(variants.len());
      for variant in variants {
        let (id,): (Uuid,) = sqlx::query_as(
          r#"
          INSERT INTO product_variants (product_id, size, color, stock, sku, active)
          VALUES ($1, $2, $3, $4, $5, $6)
          ON CONFLICT (product_id, size, color)
          DO UPDATE SET stock = EXCLUDED.stock, sku = EXCLUDED.sku, active = EXCLUDED.active
          RETURNING id
          "#,
        )
        .bind(product_id)
        .bind(&variant.size)
        .bind(&variant.color)
        .bind(variant.stock)
        .bind(&variant.sku)
        .bind(variant.active)
        .fetch_one(&mut *tx)
        .await
        .map_err(catalog_conflict)?;
        kept.push(id);
      }

      // Variants already sold stay behind, hidden, so order history keeps its rows.
      sqlx::query(
        r#"
        DELETE FROM product_variants v
        WHERE v.product_id = $1
          AND v.id <> ALL($2)
          AND NOT EXISTS (SELECT 1 FROM order_items oi WHERE oi.variant_id = v.id)
        "#,
      )
      .bind(product_id)
      .bind(&kept)
      .execute(&mut *tx)
      .await?;
      sqlx::query("UPDATE product_variants SET active = FALSE WHERE product_id = $1 AND id <> ALL($2)")
        .bind(product_id)
        .bind(&kept)
        .execute(&mut *tx)
        .await?;
    }

    let product_variants = sqlx::query_as::<_, ProductVariant>(
      r#"
      SELECT id, product_id, size, color, stock, sku, active
      FROM product_variants
      WHERE product_id = $1
      ORDER BY sku
      "#,
    )
    .bind(product_id)
    .fetch_all(&mut *tx)
    .await?;

    tx.commit().await?;
    info!("Product updated.");
    Ok(Some(ProductWithVariants {
      product,
      product_variants,
    }))
  }

  #[instrument(name = "store::delete_product", skip(self), err(Display))]
  async fn delete_product(&self, product_id: Uuid) -> AppResult<Option<ProductRemoval>> {
    let mut tx = self.pool.begin().await?;

    // Holding the row blocks order items from referencing it until we are done.
    let locked: Option<(Uuid,)> = sqlx::query_as("SELECT id FROM products WHERE id = $1 FOR UPDATE")
      .bind(product_id)
      .fetch_optional(&mut *tx)
      .await?;
    if locked.is_none() {
      tx.rollback().await?;
      return Ok(None);
    }

    let referenced: bool = sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM order_items WHERE product_id = $1)")
      .bind(product_id)
      .fetch_one(&mut *tx)
      .await?;

    let removal = if referenced {
      sqlx::query("UPDATE products SET active = FALSE, updated_at = now() WHERE id = $1")
        .bind(product_id)
        .execute(&mut *tx)
        .await?;
      sqlx::query("UPDATE product_variants SET active = FALSE WHERE product_id = $1")
        .bind(product_id)
        .execute(&mut *tx)
        .await?;
      ProductRemoval::Deactivated
    } else {
      sqlx::query("DELETE FROM products WHERE id = $1")
        .bind(product_id)
        .execute(&mut *tx)
        .await?;
      ProductRemoval::Deleted
    };

    tx.commit().await?;
    info!(?removal, "Product removed.");
    Ok(Some(removal))
  }
}
