//! Queue consumer side of the async path
//!
//! `ResizeTaskHandler` turns a `resize_image` envelope back into a
//! `ResizeRequest` and runs it through the same pipeline as `/resize`.
//! The result is only logged; the cache write is the lasting effect.

use crate::models::{ResizeRequest, ResizeTask};
use crate::services::ResizerService;
use async_trait::async_trait;
use std::sync::Arc;
use task_queue::{TaskEnvelope, TaskError, TaskHandler};
use tracing::{error, info};

pub struct ResizeTaskHandler {
    service: Arc<ResizerService>,
}

impl ResizeTaskHandler {
    pub fn new(service: Arc<ResizerService>) -> Self {
        Self { service }
    }
}

#[async_trait]
impl TaskHandler for ResizeTaskHandler {
    async fn handle(&self, envelope: &TaskEnvelope) -> Result<(), TaskError> {
        let task: ResizeTask = serde_json::from_str(&envelope.payload).map_err(|e| {
            error!(task_id = %envelope.id, error = %e, "Failed to unmarshal task payload");
            TaskError::InvalidPayload(e.to_string())
        })?;

        info!(
            task_id = %envelope.id,
            url = %task.url,
            width = task.width,
            height = task.height,
            attempt = envelope.retried + 1,
            "Processing resize task"
        );

        let req = ResizeRequest::from(task);
        match self.service.get_resized(&req).await {
            Ok(image) => {
                info!(
                    task_id = %envelope.id,
                    url = %req.url,
                    size = image.data.len(),
                    mime_type = %image.mime_type,
                    "Resize task completed"
                );
                Ok(())
            }
            Err(e) if e.is_validation() => {
                error!(task_id = %envelope.id, url = %req.url, error = %e, "Resize task rejected");
                Err(TaskError::Rejected(e.to_string()))
            }
            Err(e) => {
                error!(task_id = %envelope.id, url = %req.url, error = %e, "Resize task failed");
                Err(TaskError::Failed(e.to_string()))
            }
        }
    }
}
