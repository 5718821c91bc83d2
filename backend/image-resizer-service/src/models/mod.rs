/// Data models for the image resizer
///
/// - `ResizeRequest`: one synchronous resize call
/// - `ResizedImage`: encoded output of the pipeline
/// - `ResizeTask`: queue payload for the async path
use crate::error::{ResizeError, Result};
use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Task kind under which resize jobs travel through the queue
pub const RESIZE_TASK_KIND: &str = "resize_image";

/// Content type reported when a cached payload has lost its metadata
pub const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// Largest output accepted, in pixels (width * height). Bounds the resize
/// buffer to roughly 160 MB of RGBA.
pub const MAX_OUTPUT_PIXELS: u64 = 40_000_000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResizeRequest {
    pub url: String,
    pub width: i64,
    pub height: i64,
}

impl ResizeRequest {
    pub fn new(url: impl Into<String>, width: i64, height: i64) -> Self {
        Self {
            url: url.into(),
            width,
            height,
        }
    }

    /// Both dimensions must be strictly positive and the output area must not
    /// exceed [`MAX_OUTPUT_PIXELS`].
    pub fn validate(&self) -> Result<()> {
        if self.width <= 0 {
            return Err(ResizeError::Validation(
                "width must be greater than 0".to_string(),
            ));
        }
        if self.height <= 0 {
            return Err(ResizeError::Validation(
                "height must be greater than 0".to_string(),
            ));
        }
        let (Ok(width), Ok(height)) = (u32::try_from(self.width), u32::try_from(self.height))
        else {
            return Err(ResizeError::Validation(
                "dimensions exceed the supported range".to_string(),
            ));
        };
        if u64::from(width) * u64::from(height) > MAX_OUTPUT_PIXELS {
            return Err(ResizeError::Validation(format!(
                "output exceeds {MAX_OUTPUT_PIXELS} pixels"
            )));
        }
        Ok(())
    }

    /// Dimensions as pixel counts. Only meaningful after `validate`.
    pub fn dimensions(&self) -> (u32, u32) {
        (
            u32::try_from(self.width).unwrap_or(0),
            u32::try_from(self.height).unwrap_or(0),
        )
    }
}

/// Encoded image with its MIME type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResizedImage {
    pub data: Bytes,
    pub mime_type: String,
}

/// Payload of a queued resize job. Carries no correlation back to the submitter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResizeTask {
    pub url: String,
    pub width: i64,
    pub height: i64,
}

impl From<ResizeTask> for ResizeRequest {
    fn from(task: ResizeTask) -> Self {
        Self {
            url: task.url,
            width: task.width,
            height: task.height,
        }
    }
}
