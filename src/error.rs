use thiserror::Error;

/// Failures of a single analysis request.
#[derive(Error, Debug)]
pub enum PostureError {
    #[error("No image provided")]
    MissingInput,
    #[error("Invalid request body: {0}")]
    InvalidRequest(String),
    #[error("No pose detected in image")]
    NoPoseDetected,
    #[error("Failed to decode image: {0}")]
    Decode(String),
    #[error("Pose estimation failed: {0}")]
    Inference(String),
    #[error("Internal error: {0}")]
    Internal(String),
}

impl PostureError {
    /// Client mistakes, as opposed to failures on our side.
    pub fn is_client_error(&self) -> bool {
        matches!(self, PostureError::MissingInput | PostureError::InvalidRequest(_))
    }
}

impl From<base64::DecodeError> for PostureError {
    fn from(err: base64::DecodeError) -> Self {
        PostureError::Decode(err.to_string())
    }
}

impl From<image::ImageError> for PostureError {
    fn from(err: image::ImageError) -> Self {
        PostureError::Decode(err.to_string())
    }
}
