// settlement/server/src/web/routes.rs

use actix_web::web;

use crate::web::handlers::{checkout_handlers, delivery_handlers, order_handlers, webhook_handlers};

async fn health_check_handler() -> actix_web::HttpResponse {
  actix_web::HttpResponse::Ok().json(serde_json::json!({ "status": "ok" }))
}

pub fn configure_app_routes(cfg: &mut web::ServiceConfig) {
  cfg.service(
    web::scope("/api/v1")
      .route("/health", web::get().to(health_check_handler))
      .route("/checkout", web::post().to(checkout_handlers::checkout_handler))
      .route("/delivery/quote", web::post().to(delivery_handlers::delivery_quote_handler))
      .service(
        web::scope("/payments").route("/webhook", web::post().to(webhook_handlers::payment_webhook_handler)),
      )
      .service(
        web::scope("/orders")
          .route("/{order_number}", web::get().to(order_handlers::get_order_handler))
          .route(
            "/{order_number}/status",
            web::post().to(order_handlers::change_order_status_handler),
          )
          .route(
            "/{order_number}/payment",
            web::post().to(checkout_handlers::retry_payment_handler),
          ),
      ),
  );
}
