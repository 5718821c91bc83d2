use crate::services::ResizerService;
use actix_web::{web, HttpResponse};
use serde_json::json;

/// GET /health
pub async fn health(service: web::Data<ResizerService>) -> HttpResponse {
    HttpResponse::Ok().json(json!({
        "status": "ok",
        "async": service.supports_async(),
        "cache": service.has_cache(),
    }))
}
