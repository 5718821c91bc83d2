/// HTTP handlers for the image resizer
pub mod health;
pub mod resize;

use actix_web::web;

pub use health::health;
pub use resize::{resize, resize_async, ResizeQuery};

/// Register all routes. Expects `web::Data<ResizerService>` in app data.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/resize", web::get().to(resize))
        .route("/resize-async", web::get().to(resize_async))
        .route("/health", web::get().to(health));
}
