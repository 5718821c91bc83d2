/// Resize endpoints
///
/// - GET /resize: resize inline and return the image bytes
/// - GET /resize-async: queue a resize job and return 202
use crate::error::AppError;
use crate::models::ResizeRequest;
use crate::services::ResizerService;
use actix_web::{web, HttpResponse};
use serde::Deserialize;
use serde_json::json;

/// Raw query string parameters. Kept as strings so parse failures can be
/// reported per parameter.
#[derive(Debug, Default, Deserialize)]
pub struct ResizeQuery {
    pub url: Option<String>,
    pub width: Option<String>,
    pub height: Option<String>,
}

impl ResizeQuery {
    pub fn into_request(self) -> Result<ResizeRequest, AppError> {
        let (Some(url), Some(width), Some(height)) = (
            non_empty(self.url),
            non_empty(self.width),
            non_empty(self.height),
        ) else {
            return Err(AppError::MissingParams);
        };

        let width = width
            .parse::<i64>()
            .map_err(|_| AppError::InvalidParam("width"))?;
        let height = height
            .parse::<i64>()
            .map_err(|_| AppError::InvalidParam("height"))?;

        Ok(ResizeRequest::new(url, width, height))
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

/// GET /resize?url=&width=&height=
pub async fn resize(
    service: web::Data<ResizerService>,
    query: web::Query<ResizeQuery>,
) -> Result<HttpResponse, AppError> {
    let req = query.into_inner().into_request()?;

    let image = service.get_resized(&req).await.map_err(AppError::Resize)?;

    Ok(HttpResponse::Ok()
        .content_type(image.mime_type)
        .body(image.data))
}

/// GET /resize-async?url=&width=&height=
pub async fn resize_async(
    service: web::Data<ResizerService>,
    query: web::Query<ResizeQuery>,
) -> Result<HttpResponse, AppError> {
    let req = query.into_inner().into_request()?;

    // Same rules as the sync path, checked before anything is queued
    req.validate().map_err(AppError::Resize)?;

    if !service.supports_async() {
        return Err(AppError::AsyncUnavailable);
    }

    service
        .enqueue_resize_task(&req.url, req.width, req.height)
        .await?;

    Ok(HttpResponse::Accepted().json(json!({
        "status": "queued",
        "message": "Resize task queued successfully"
    })))
}
