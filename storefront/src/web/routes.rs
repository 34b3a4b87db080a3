// kloven_storefront/src/web/routes.rs

use actix_web::web;

use crate::errors::AppError;
use crate::web::handlers::{
  admin_handlers, checkout_handlers, order_handlers, product_handlers, promo_handlers, webhook_handlers,
};

/// Mounted by `main.rs` and by the HTTP tests.
pub fn configure_app_routes(cfg: &mut web::ServiceConfig) {
  // Malformed bodies answer with the same `{error}` shape as everything else.
  cfg.app_data(
    web::JsonConfig::default()
      .error_handler(|err, _req| AppError::Validation(format!("Cuerpo invalido: {}", err)).into()),
  );

  cfg.service(
    web::scope("/api")
      .route("/health", web::get().to(product_handlers::health_check_handler))
      .route("/checkout", web::post().to(checkout_handlers::checkout_handler))
      .route(
        "/webhooks/mercadopago",
        web::post().to(webhook_handlers::mercadopago_webhook_handler),
      )
      .route("/orders/{id}", web::get().to(order_handlers::get_order_handler))
      .route("/promo/validate", web::post().to(promo_handlers::validate_promo_handler))
      .route("/shipping", web::get().to(product_handlers::shipping_info_handler))
      .service(
        web::scope("/products")
          .route("", web::get().to(product_handlers::list_products_handler))
          .route("/{slug}", web::get().to(product_handlers::get_product_handler)),
      )
      .service(
        web::scope("/admin")
          .route("/auth", web::post().to(admin_handlers::auth_handler))
          .service(
            web::resource("/products")
              .route(web::get().to(admin_handlers::list_products_handler))
              .route(web::post().to(admin_handlers::create_product_handler)),
          )
          .service(
            web::resource("/products/{id}")
              .route(web::get().to(admin_handlers::get_product_handler))
              .route(web::put().to(admin_handlers::update_product_handler))
              .route(web::delete().to(admin_handlers::delete_product_handler)),
          )
          .service(
            web::resource("/orders/{id}")
              .route(web::get().to(admin_handlers::get_order_handler))
              .route(web::put().to(admin_handlers::update_order_handler)),
          )
          .service(
            web::resource("/promo")
              .route(web::get().to(admin_handlers::list_promo_codes_handler))
              .route(web::post().to(admin_handlers::create_promo_code_handler))
              .route(web::put().to(admin_handlers::toggle_promo_code_handler)),
          ),
      ),
  );
}
