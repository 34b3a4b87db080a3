// tests/common/mod.rs
#![allow(dead_code)]

//! In-memory stand-ins for the database and the two external providers,
//! plus builders for catalog fixtures and a ready `AppState`.

pub mod pg;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use kloven_flow::FlowRegistry;
use kloven_storefront::config::AppConfig;
use kloven_storefront::errors::{AppError, Result as AppResult};
use kloven_storefront::models::{
  CheckoutLine, CheckoutRequest, NewOrder, NewPromoCode, Order, OrderItem, OrderStatus, OrderWithItems, Product,
  ProductFilter, ProductInput, ProductRemoval, ProductVariant, ProductWithVariants, PromoCode,
};
use kloven_storefront::pipelines::register_all_pipelines;
use kloven_storefront::services::payment_gateway::{PaymentDetails, PreferenceRequest, PreferenceResponse};
use kloven_storefront::services::{
  Mailer, OrderStore, OutgoingEmail, PaymentGateway, PaymentStatusUpdate, RecordOutcome,
};
use kloven_storefront::state::AppState;
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use uuid::Uuid;

static TRACING: Lazy<()> = Lazy::new(|| {
  let _ = tracing_subscriber::fmt()
    .with_env_filter(tracing_subscriber::EnvFilter::new("kloven_storefront=debug,kloven_flow=debug"))
    .with_test_writer()
    .try_init();
});

pub fn setup_tracing() {
  Lazy::force(&TRACING);
}

// --- Store ---

#[derive(Default)]
pub struct StoreState {
  pub products: HashMap<Uuid, Product>,
  pub variants: HashMap<Uuid, ProductVariant>,
  pub promos: Vec<PromoCode>,
  pub orders: HashMap<Uuid, OrderWithItems>,
  pub processed_events: HashSet<(String, String)>,
  pub loyalty_awards: HashMap<Uuid, (Uuid, i64)>,
  /// Makes `record_payment_status` fail like a lost connection.
  pub fail_record: bool,
  /// Promo lookups report zero uses, as if another checkout redeemed the code
  /// after this one read it.
  pub stale_promo_reads: bool,
}

#[derive(Default)]
pub struct FakeStore {
  pub state: Mutex<StoreState>,
}

impl FakeStore {
  pub fn stock(&self, variant_id: Uuid) -> i32 {
    self.state.lock().variants[&variant_id].stock
  }

  pub fn order(&self, order_id: Uuid) -> OrderWithItems {
    self.state.lock().orders[&order_id].clone()
  }

  pub fn order_count(&self) -> usize {
    self.state.lock().orders.len()
  }

  pub fn promo_uses(&self, code: &str) -> i32 {
    self
      .state
      .lock()
      .promos
      .iter()
      .find(|p| p.code == code)
      .map_or(-1, |p| p.current_uses)
  }

  /// Inserts a pending order directly, reserving nothing.
  pub fn seed_order(&self, user_id: Option<Uuid>, lines: &[(&ProductVariant, i32, i64)]) -> Uuid {
    let order_id = Uuid::new_v4();
    let order_items: Vec<OrderItem> = lines
      .iter()
      .map(|(variant, quantity, unit_price)| OrderItem {
        id: Uuid::new_v4(),
        order_id,
        product_id: variant.product_id,
        variant_id: variant.id,
        product_name: "Remera Box Fit".to_string(),
        size: variant.size.clone(),
        color: variant.color.clone(),
        quantity: *quantity,
        unit_price: *unit_price,
      })
      .collect();
    let subtotal: i64 = order_items.iter().map(|i| i.unit_price * i64::from(i.quantity)).sum();
    let order = Order {
      id: order_id,
      user_id,
      status: OrderStatus::Pending,
      mp_payment_id: None,
      mp_status: None,
      payer_name: "Ana".to_string(),
      payer_email: "ana@example.com".to_string(),
      payer_phone: String::new(),
      shipping_address: "Av. Corrientes 1234".to_string(),
      shipping_city: "CABA".to_string(),
      shipping_zip: "1043".to_string(),
      subtotal,
      shipping_cost: 5_000,
      discount_amount: 0,
      promo_code_used: None,
      total: subtotal + 5_000,
      created_at: Utc::now(),
      updated_at: Utc::now(),
    };
    self
      .state
      .lock()
      .orders
      .insert(order_id, OrderWithItems { order, order_items });
    order_id
  }
}

fn with_variants(state: &StoreState, product: Product) -> ProductWithVariants {
  let mut product_variants: Vec<ProductVariant> = state
    .variants
    .values()
    .filter(|v| v.product_id == product.id)
    .cloned()
    .collect();
  product_variants.sort_by(|a, b| a.sku.cmp(&b.sku));
  ProductWithVariants {
    product,
    product_variants,
  }
}

fn sold(state: &StoreState, matches: impl Fn(&OrderItem) -> bool) -> bool {
  state.orders.values().flat_map(|o| &o.order_items).any(matches)
}

fn slug_taken(state: &StoreState, slug: &str, except: Option<Uuid>) -> bool {
  state.products.values().any(|p| p.slug == slug && Some(p.id) != except)
}

fn restock(state: &mut StoreState, order_id: Uuid) -> u64 {
  let mut per_variant: HashMap<Uuid, i32> = HashMap::new();
  if let Some(order) = state.orders.get(&order_id) {
    for item in &order.order_items {
      *per_variant.entry(item.variant_id).or_default() += item.quantity;
    }
  }
  let mut touched = 0;
  for (variant_id, quantity) in per_variant {
    if let Some(variant) = state.variants.get_mut(&variant_id) {
      variant.stock += quantity;
      touched += 1;
    }
  }
  touched
}

#[async_trait]
impl OrderStore for FakeStore {
  async fn fetch_products(&self, ids: Vec<Uuid>) -> AppResult<Vec<Product>> {
    let state = self.state.lock();
    Ok(ids.iter().filter_map(|id| state.products.get(id).cloned()).collect())
  }

  async fn fetch_variants(&self, ids: Vec<Uuid>) -> AppResult<Vec<ProductVariant>> {
    let state = self.state.lock();
    Ok(ids.iter().filter_map(|id| state.variants.get(id).cloned()).collect())
  }

  async fn find_active_promo(&self, code: String) -> AppResult<Option<PromoCode>> {
    let state = self.state.lock();
    let found = state.promos.iter().find(|p| p.code == code && p.active).cloned();
    Ok(found.map(|mut promo| {
      if state.stale_promo_reads {
        promo.current_uses = 0;
      }
      promo
    }))
  }

  async fn create_order(&self, order: NewOrder) -> AppResult<Uuid> {
    let mut state = self.state.lock();

    // Work on a copy so a failure leaves nothing behind, like a rollback.
    let mut variants = state.variants.clone();
    for item in &order.items {
      let variant = variants
        .get_mut(&item.variant_id)
        .filter(|v| v.stock >= item.quantity)
        .ok_or_else(|| AppError::InsufficientStock {
          product: item.product_name.clone(),
          size: item.size.clone(),
          color: item.color.clone(),
        })?;
      variant.stock -= item.quantity;
    }

    let mut promos = state.promos.clone();
    if let Some(code) = &order.promo_code_used {
      let now = Utc::now();
      let promo = promos
        .iter_mut()
        .find(|p| &p.code == code && p.is_redeemable(now))
        .ok_or_else(|| AppError::PromoExhausted(code.clone()))?;
      promo.current_uses += 1;
    }

    let order_id = Uuid::new_v4();
    let order_items = order
      .items
      .iter()
      .map(|item| OrderItem {
        id: Uuid::new_v4(),
        order_id,
        product_id: item.product_id,
        variant_id: item.variant_id,
        product_name: item.product_name.clone(),
        size: item.size.clone(),
        color: item.color.clone(),
        quantity: item.quantity,
        unit_price: item.unit_price,
      })
      .collect();
    let row = Order {
      id: order_id,
      user_id: order.user_id,
      status: OrderStatus::Pending,
      mp_payment_id: None,
      mp_status: None,
      payer_name: order.payer_name,
      payer_email: order.payer_email,
      payer_phone: order.payer_phone,
      shipping_address: order.shipping_address,
      shipping_city: order.shipping_city,
      shipping_zip: order.shipping_zip,
      subtotal: order.subtotal,
      shipping_cost: order.shipping_cost,
      discount_amount: order.discount_amount,
      promo_code_used: order.promo_code_used,
      total: order.total,
      created_at: Utc::now(),
      updated_at: Utc::now(),
    };

    state.variants = variants;
    state.promos = promos;
    state.orders.insert(order_id, OrderWithItems { order: row, order_items });
    Ok(order_id)
  }

  async fn abandon_order(&self, order_id: Uuid) -> AppResult<bool> {
    let mut state = self.state.lock();
    let promo_code = match state.orders.get_mut(&order_id) {
      Some(o) if o.order.status == OrderStatus::Pending => {
        o.order.status = OrderStatus::Cancelled;
        o.order.promo_code_used.clone()
      }
      _ => return Ok(false),
    };
    restock(&mut state, order_id);
    if let Some(code) = promo_code {
      if let Some(promo) = state.promos.iter_mut().find(|p| p.code == code) {
        promo.current_uses = (promo.current_uses - 1).max(0);
      }
    }
    Ok(true)
  }

  async fn record_payment_status(&self, update: PaymentStatusUpdate) -> AppResult<RecordOutcome> {
    let mut state = self.state.lock();
    if state.fail_record {
      return Err(AppError::Sqlx(sqlx::Error::PoolTimedOut));
    }
    if !state.orders.contains_key(&update.order_id) {
      return Ok(RecordOutcome::OrderNotFound);
    }
    let key = (update.payment_id.clone(), update.status.as_str().to_string());
    if !state.processed_events.insert(key) {
      return Ok(RecordOutcome::Duplicate);
    }
    let Some(order) = state.orders.get_mut(&update.order_id) else {
      return Ok(RecordOutcome::OrderNotFound);
    };
    let previous = order.order.status;
    order.order.status = update.status;
    order.order.mp_payment_id = Some(update.payment_id);
    order.order.mp_status = Some(update.status.as_str().to_string());
    order.order.updated_at = Utc::now();
    Ok(RecordOutcome::Recorded { previous })
  }

  async fn order_with_items(&self, order_id: Uuid) -> AppResult<Option<OrderWithItems>> {
    Ok(self.state.lock().orders.get(&order_id).cloned())
  }

  async fn restore_stock(&self, order_id: Uuid) -> AppResult<u64> {
    Ok(restock(&mut self.state.lock(), order_id))
  }

  async fn award_loyalty_points(&self, user_id: Uuid, order_id: Uuid, points: i64) -> AppResult<()> {
    self
      .state
      .lock()
      .loyalty_awards
      .entry(order_id)
      .or_insert((user_id, points));
    Ok(())
  }

  async fn list_products(&self, filter: ProductFilter) -> AppResult<Vec<Product>> {
    let state = self.state.lock();
    let mut products: Vec<Product> = state
      .products
      .values()
      .filter(|p| p.active)
      .filter(|p| filter.category.as_ref().map_or(true, |c| &p.category == c))
      .filter(|p| !filter.featured || p.featured)
      .cloned()
      .collect();
    products.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    Ok(products)
  }

  async fn product_by_slug(&self, slug: String) -> AppResult<Option<ProductWithVariants>> {
    let state = self.state.lock();
    let Some(product) = state.products.values().find(|p| p.slug == slug && p.active).cloned() else {
      return Ok(None);
    };
    let product_variants = state
      .variants
      .values()
      .filter(|v| v.product_id == product.id && v.active)
      .cloned()
      .collect();
    Ok(Some(ProductWithVariants {
      product,
      product_variants,
    }))
  }

  async fn update_order_status(&self, order_id: Uuid, status: OrderStatus) -> AppResult<Option<Order>> {
    let mut state = self.state.lock();
    Ok(state.orders.get_mut(&order_id).map(|o| {
      o.order.status = status;
      o.order.clone()
    }))
  }

  async fn list_promo_codes(&self) -> AppResult<Vec<PromoCode>> {
    Ok(self.state.lock().promos.clone())
  }

  async fn create_promo_code(&self, promo: NewPromoCode) -> AppResult<PromoCode> {
    let created = PromoCode {
      id: Uuid::new_v4(),
      code: promo.code,
      discount_percent: promo.discount_percent,
      max_uses: promo.max_uses,
      current_uses: 0,
      expires_at: promo.expires_at,
      active: promo.active,
      created_at: Utc::now(),
    };
    self.state.lock().promos.push(created.clone());
    Ok(created)
  }

  async fn set_promo_active(&self, promo_id: Uuid, active: bool) -> AppResult<Option<PromoCode>> {
    let mut state = self.state.lock();
    Ok(state.promos.iter_mut().find(|p| p.id == promo_id).map(|p| {
      p.active = active;
      p.clone()
    }))
  }

  async fn admin_list_products(&self) -> AppResult<Vec<ProductWithVariants>> {
    let state = self.state.lock();
    let mut products: Vec<Product> = state.products.values().cloned().collect();
    products.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    Ok(products.into_iter().map(|p| with_variants(&state, p)).collect())
  }

  async fn admin_product(&self, product_id: Uuid) -> AppResult<Option<ProductWithVariants>> {
    let state = self.state.lock();
    Ok(state.products.get(&product_id).cloned().map(|p| with_variants(&state, p)))
  }

  async fn create_product(&self, input: ProductInput) -> AppResult<ProductWithVariants> {
    let mut state = self.state.lock();
    if slug_taken(&state, &input.slug, None) {
      return Err(AppError::Validation("El slug ya existe".to_string()));
    }
    let now = Utc::now();
    let product = Product {
      id: Uuid::new_v4(),
      name: input.name,
      slug: input.slug,
      description: input.description,
      price: input.price,
      category: input.category,
      image_url: input.image_url,
      material: input.material,
      fit: input.fit,
      featured: input.featured,
      active: input.active,
      created_at: now,
      updated_at: now,
    };
    for variant in input.variants.into_iter().flatten() {
      let id = Uuid::new_v4();
      state.variants.insert(
        id,
        ProductVariant {
          id,
          product_id: product.id,
          size: variant.size,
          color: variant.color,
          stock: variant.stock,
          sku: variant.sku,
          active: variant.active,
        },
      );
    }
    state.products.insert(product.id, product.clone());
    Ok(with_variants(&state, product))
  }

  async fn update_product(&self, product_id: Uuid, input: ProductInput) -> AppResult<Option<ProductWithVariants>> {
    let mut state = self.state.lock();
    if !state.products.contains_key(&product_id) {
      return Ok(None);
    }
    if slug_taken(&state, &input.slug, Some(product_id)) {
      return Err(AppError::Validation("El slug ya existe".to_string()));
    }

    if let Some(variants) = input.variants {
      let mut kept = HashSet::new();
      for variant in variants {
        let existing = state
          .variants
          .values()
          .find(|v| v.product_id == product_id && v.size == variant.size && v.color == variant.color)
          .map(|v| v.id);
        let id = existing.unwrap_or_else(Uuid::new_v4);
        state.variants.insert(
          id,
          ProductVariant {
            id,
            product_id,
            size: variant.size,
            color: variant.color,
            stock: variant.stock,
            sku: variant.sku,
            active: variant.active,
          },
        );
        kept.insert(id);
      }
      let dropped: Vec<Uuid> = state
        .variants
        .values()
        .filter(|v| v.product_id == product_id && !kept.contains(&v.id))
        .map(|v| v.id)
        .collect();
      for id in dropped {
        if sold(&state, |item| item.variant_id == id) {
          if let Some(variant) = state.variants.get_mut(&id) {
            variant.active = false;
          }
        } else {
          state.variants.remove(&id);
        }
      }
    }

    let Some(product) = state.products.get_mut(&product_id) else {
      return Ok(None);
    };
    product.name = input.name;
    product.slug = input.slug;
    product.description = input.description;
    product.price = input.price;
    product.category = input.category;
    product.image_url = input.image_url;
    product.material = input.material;
    product.fit = input.fit;
    product.featured = input.featured;
    product.active = input.active;
    product.updated_at = Utc::now();
    let product = product.clone();
    Ok(Some(with_variants(&state, product)))
  }

  async fn delete_product(&self, product_id: Uuid) -> AppResult<Option<ProductRemoval>> {
    let mut state = self.state.lock();
    if !state.products.contains_key(&product_id) {
      return Ok(None);
    }
    if sold(&state, |item| item.product_id == product_id) {
      if let Some(product) = state.products.get_mut(&product_id) {
        product.active = false;
      }
      for variant in state.variants.values_mut().filter(|v| v.product_id == product_id) {
        variant.active = false;
      }
      return Ok(Some(ProductRemoval::Deactivated));
    }
    state.products.remove(&product_id);
    state.variants.retain(|_, v| v.product_id != product_id);
    Ok(Some(ProductRemoval::Deleted))
  }
}

// --- Payment provider ---

pub struct FakeGateway {
  pub init_point: Option<String>,
  pub fail_preference: bool,
  pub fail_lookup: bool,
  pub preferences: Mutex<Vec<PreferenceRequest>>,
  pub payments: Mutex<HashMap<String, PaymentDetails>>,
  pub lookups: Mutex<Vec<String>>,
}

impl Default for FakeGateway {
  fn default() -> Self {
    Self {
      init_point: Some("https://www.mercadopago.com.ar/checkout/v1/redirect?pref_id=123".to_string()),
      fail_preference: false,
      fail_lookup: false,
      preferences: Mutex::new(Vec::new()),
      payments: Mutex::new(HashMap::new()),
      lookups: Mutex::new(Vec::new()),
    }
  }
}

impl FakeGateway {
  pub fn set_payment(&self, payment_id: &str, status: &str, external_reference: Option<String>) {
    self.payments.lock().insert(
      payment_id.to_string(),
      PaymentDetails {
        status: Some(status.to_string()),
        external_reference,
      },
    );
  }
}

#[async_trait]
impl PaymentGateway for FakeGateway {
  async fn create_preference(&self, preference: PreferenceRequest) -> AppResult<PreferenceResponse> {
    self.preferences.lock().push(preference);
    if self.fail_preference {
      return Err(AppError::Gateway("preference creation failed with status 503".to_string()));
    }
    Ok(PreferenceResponse {
      id: Some("pref-123".to_string()),
      init_point: self.init_point.clone(),
    })
  }

  async fn get_payment(&self, payment_id: &str) -> AppResult<PaymentDetails> {
    self.lookups.lock().push(payment_id.to_string());
    if self.fail_lookup {
      return Err(AppError::Gateway("payment lookup failed with status 500".to_string()));
    }
    self
      .payments
      .lock()
      .get(payment_id)
      .cloned()
      .ok_or_else(|| AppError::Gateway("payment lookup failed with status 404".to_string()))
  }
}

// --- Email provider ---

#[derive(Default)]
pub struct FakeMailer {
  pub fail: bool,
  pub sent: Mutex<Vec<OutgoingEmail>>,
}

#[async_trait]
impl Mailer for FakeMailer {
  async fn send(&self, email: OutgoingEmail) -> AppResult<()> {
    if self.fail {
      return Err(AppError::Email("send failed with status 500".to_string()));
    }
    self.sent.lock().push(email);
    Ok(())
  }
}

// --- Fixtures ---

pub const ADMIN_PASSWORD: &str = "kloven-admin";

pub fn test_config() -> AppConfig {
  AppConfig {
    server_host: "127.0.0.1".to_string(),
    server_port: 8080,
    database_url: "postgres://unused".to_string(),
    app_base_url: "https://kloven.test".to_string(),
    mp_access_token: "TEST-token".to_string(),
    mp_api_base: "https://api.mercadopago.test".to_string(),
    resend_api_key: "re_test".to_string(),
    resend_from_email: "Kloven <onboarding@resend.dev>".to_string(),
    admin_password: Some(ADMIN_PASSWORD.to_string()),
    shipping_free_threshold: 50_000,
    shipping_flat_fee: 5_000,
    loyalty_points_divisor: 100,
    run_migrations: false,
  }
}

pub struct Harness {
  pub store: Arc<FakeStore>,
  pub gateway: Arc<FakeGateway>,
  pub mailer: Arc<FakeMailer>,
  pub state: AppState,
}

/// Flows registered and wired to whichever store and providers the test picks.
pub fn app_state(store: Arc<dyn OrderStore>, payments: Arc<dyn PaymentGateway>, mailer: Arc<dyn Mailer>) -> AppState {
  let flows = Arc::new(FlowRegistry::<AppError>::new());
  register_all_pipelines(&flows);
  AppState {
    store,
    payments,
    mailer,
    flows,
    config: Arc::new(test_config()),
  }
}

pub fn harness_with(gateway: FakeGateway, mailer: FakeMailer) -> Harness {
  setup_tracing();
  let store = Arc::new(FakeStore::default());
  let gateway = Arc::new(gateway);
  let mailer = Arc::new(mailer);
  let state = app_state(store.clone(), gateway.clone(), mailer.clone());
  Harness {
    store,
    gateway,
    mailer,
    state,
  }
}

pub fn harness() -> Harness {
  harness_with(FakeGateway::default(), FakeMailer::default())
}

/// Adds an active product with one variant and returns both.
pub fn add_catalog_item(store: &FakeStore, name: &str, price: i64, stock: i32) -> (Product, ProductVariant) {
  let product = Product {
    id: Uuid::new_v4(),
    name: name.to_string(),
    slug: name.to_lowercase().replace(' ', "-"),
    description: String::new(),
    price,
    category: "remeras".to_string(),
    image_url: String::new(),
    material: "Algodon".to_string(),
    fit: "Box".to_string(),
    featured: false,
    active: true,
    created_at: Utc::now(),
    updated_at: Utc::now(),
  };
  let variant = ProductVariant {
    id: Uuid::new_v4(),
    product_id: product.id,
    size: "M".to_string(),
    color: "Negro".to_string(),
    stock,
    sku: format!("SKU-{}", product.slug),
    active: true,
  };
  let mut state = store.state.lock();
  state.products.insert(product.id, product.clone());
  state.variants.insert(variant.id, variant.clone());
  (product, variant)
}

pub fn add_promo(
  store: &FakeStore,
  code: &str,
  discount_percent: i32,
  max_uses: i32,
  current_uses: i32,
  expires_at: Option<DateTime<Utc>>,
) -> PromoCode {
  let promo = PromoCode {
    id: Uuid::new_v4(),
    code: code.to_string(),
    discount_percent,
    max_uses,
    current_uses,
    expires_at,
    active: true,
    created_at: Utc::now(),
  };
  store.state.lock().promos.push(promo.clone());
  promo
}

pub fn checkout_request(lines: &[(&ProductVariant, i32)], promo_code: Option<&str>) -> CheckoutRequest {
  CheckoutRequest {
    items: lines
      .iter()
      .map(|(variant, quantity)| CheckoutLine {
        product_id: variant.product_id,
        variant_id: variant.id,
        quantity: *quantity,
      })
      .collect(),
    name: "Ana Gomez".to_string(),
    email: "ana@example.com".to_string(),
    phone: "1155555555".to_string(),
    address: "Av. Corrientes 1234".to_string(),
    city: "CABA".to_string(),
    zip: "1043".to_string(),
    promo_code: promo_code.map(str::to_string),
    user_id: None,
  }
}

pub fn payment_notification(payment_id: &str) -> actix_web::web::Bytes {
  actix_web::web::Bytes::from(format!(r#"{{"type":"payment","data":{{"id":"{}"}}}}"#, payment_id))
}
